//! Task progress tracking
//!
//! A request that runs a conversion writes its milestones into the
//! [`TaskRegistry`] through a [`ConversionInvoker`]. A second request
//! subscribes to the same task id through the [`ProgressReporter`] and
//! receives those milestones as a stream. The [`CleanupScheduler`] drops the
//! entry a short while after the task finished.

mod cleanup;
mod invoker;
mod registry;
mod reporter;
mod types;

pub use cleanup::CleanupScheduler;
pub use invoker::{ConversionInvoker, TaskProgress};
pub use registry::{Observed, TaskRegistry};
pub use reporter::{ProgressReporter, TIMEOUT_MESSAGE};
pub use types::{InvalidTaskId, ProgressRecord, TaskId, TaskStatus};
