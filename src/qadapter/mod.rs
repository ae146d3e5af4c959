//! Queue adapters
//!
//! A queue adapter pairs the hardware of a partition with the parameters
//! needed to submit jobs to it: queue engine and name, job environment and
//! resource limits. It keeps the resources chosen for the next launch and
//! renders the corresponding submission script.

mod adapter;
pub mod backend;
mod hardware;
mod job;
mod limits;
mod queue;
mod script;

pub use adapter::{QueueAdapter, QueueAdapterSpec};
pub use backend::{backend_for, PbsProBackend, QueueBackend, QueueJob, ShellBackend, SlurmBackend};
pub use hardware::Hardware;
pub use job::{EnvVars, JobSection};
pub use limits::{Allocation, Limits};
pub use queue::{QueueSection, QueueType};
pub use script::ScriptEditor;
