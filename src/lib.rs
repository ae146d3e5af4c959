//! # abiqueue - Queue adapters and task manager for ab-initio workflows
//!
//! abiqueue describes the queues of a machine in a `manager.yml` file, picks
//! the adapter and the parallel configuration able to run a job, renders the
//! submission script and submits it through the shell, Slurm or PBS Pro.
//!
//! ## Features
//!
//! - **Queue adapters**: Hardware, limits and job environment per queue
//! - **Autoparal selection**: Filter and order the parallel configurations
//!   proposed by the simulation code
//! - **Script rendering**: Scheduler headers, modules, OpenMP and MPI setup
//! - **Escalation**: More cores, memory or time after a failure
//! - **Scheduler**: Submit a list of jobs without flooding the queue
//!
//! ## Quick Start
//!
//! ```no_run
//! use abiqueue::{JobRequest, TaskManager};
//!
//! // manager.yml from the working directory or ~/.abinit/abipy
//! let mut manager = TaskManager::from_user_config().unwrap();
//!
//! let req = JobRequest::new("scf", "/scratch/scf", "abinit").with_args(["run.abi"]);
//! println!("{}", manager.qadapter().get_script_str(&req));
//!
//! let job = manager.launch(&req).unwrap();
//! println!("Submitted {} with id {}", job.name, job.qid);
//! ```
//!
//! ## Autoparal
//!
//! ```no_run
//! use abiqueue::{ParalHints, TaskManager};
//! use std::path::Path;
//!
//! let mut manager = TaskManager::from_file("manager.yml").unwrap();
//! let hints = ParalHints::parse_file(Path::new("autoparal.abo")).unwrap();
//!
//! let pconf = manager.select_qadapter(&hints).unwrap();
//! println!("Using qadapter {} with {}", manager.qadpos(), pconf);
//! ```
//!
//! ## Scheduler
//!
//! ```no_run
//! use abiqueue::{JobList, Scheduler, SchedulerConfig, TaskManager};
//!
//! let jobs = JobList::from_file("jobs.yml").unwrap();
//! let mut scheduler = Scheduler::new(
//!     SchedulerConfig::from_user_config().unwrap(),
//!     TaskManager::from_user_config().unwrap(),
//!     jobs.jobs,
//! )
//! .unwrap();
//!
//! let summary = scheduler.run().unwrap();
//! println!("{} completed, {} failed", summary.completed, summary.failed);
//! ```

#![warn(clippy::all)]

pub mod condition;
pub mod config;
pub mod error;
pub mod job;
pub mod manager;
pub mod paral;
pub mod qadapter;
pub mod scheduler;
pub mod system;
pub mod units;

// Re-export commonly used types
pub use error::{AbiQueueError, Result};
pub use job::{JobRequest, JobStatus, SubmittedJob};
pub use manager::{TaskManager, TaskPolicy};
pub use paral::{ParalConf, ParalHints};
pub use qadapter::{QueueAdapter, QueueType};
pub use scheduler::{JobList, Scheduler, SchedulerConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use abiqueue::prelude::*;
    //! ```

    pub use crate::condition::Condition;
    pub use crate::error::{AbiQueueError, Result};
    pub use crate::job::{JobRequest, JobStatus, SubmittedJob};
    pub use crate::manager::{AutoparalPriority, Precedence, TaskManager, TaskPolicy};
    pub use crate::paral::{ParalConf, ParalHints};
    pub use crate::qadapter::{backend_for, Allocation, Hardware, QueueAdapter, QueueBackend, QueueType};
    pub use crate::scheduler::{JobList, RunSummary, Scheduler, SchedulerConfig, StopReason};
    pub use crate::system::{ConfigCheck, EnvReport, LocalMachine};
    pub use crate::units::{Memory, TimeLimit};
}
