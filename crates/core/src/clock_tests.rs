use super::*;

#[test]
fn fake_clock_advances_both_timelines() {
    let clock = FakeClock::new();
    let start_mono = clock.now();
    let start_wall = clock.now_utc();

    clock.advance(Duration::from_secs(30));

    assert_eq!(clock.now() - start_mono, Duration::from_secs(30));
    assert_eq!(clock.now_utc() - start_wall, chrono::Duration::seconds(30));
}

#[test]
fn fake_clock_set_utc_does_not_move_monotonic() {
    let clock = FakeClock::new();
    let start_mono = clock.now();
    clock.set_utc(Utc::now());
    assert_eq!(clock.now(), start_mono);
}
