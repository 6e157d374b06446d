// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ltap-engine: the concurrent capture engine's control logic — dispatch,
//! retry scheduling, task supervision, stream admission, and
//! self-monitoring detection. I/O specifics (filesystem, container
//! runtime, concrete sinks) live in `ltap-adapters`, which depends on
//! this crate's traits.

pub mod dispatcher;
pub mod feedback_guard;
pub mod retry_queue;
pub mod sink;
pub mod stream_pool;
pub mod task_manager;

pub use dispatcher::{DispatchError, Dispatcher, DispatcherConfig, DispatcherStats};
pub use feedback_guard::{ExclusionSink, FeedbackGuard};
pub use retry_queue::{EnqueueOutcome, RetryQueue, RetryQueueConfig};
pub use sink::{DeadLetterQueue, Sink, SinkError};
pub use stream_pool::{AtCapacity, StreamPool};
pub use task_manager::{TaskHealth, TaskManager, UnhealthyTask};
