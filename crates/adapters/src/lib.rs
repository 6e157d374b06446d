// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ltap-adapters: concrete I/O bound to `ltap-engine`'s traits —
//! filesystem tailing, container runtime access, and the reference
//! sink/DLQ implementations used by the daemon and by tests.

pub mod container_supervisor;
pub mod file_supervisor;
pub mod fs_notifier;
pub mod host_info;
pub mod runtime_client;
pub mod sink;

pub use container_supervisor::{ContainerSupervisor, ContainerSupervisorStats};
pub use file_supervisor::{FileSupervisor, FileSupervisorError, FileSupervisorStats};
pub use fs_notifier::{FsChangeEvent, FsNotifier, FsNotifierError, FsOp, NotifyFsNotifier};
pub use runtime_client::{BollardRuntimeClient, ContainerRuntimeClient, RuntimeClientError};
pub use sink::{MemoryDeadLetterQueue, NullSink};
