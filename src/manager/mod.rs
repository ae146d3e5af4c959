//! Task manager and task policy
//!
//! The manager owns the qadapters declared in `manager.yml`, picks the
//! adapter and parallel configuration for a job, writes the submission
//! script and hands it to the queue backend.

mod policy;
mod task_manager;

pub use policy::{AutoparalPriority, Precedence, TaskPolicy};
pub use task_manager::{TaskManager, SIMPLE_MANAGER};
