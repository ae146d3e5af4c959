//! Inspection of the machine and of the user environment

mod check;
mod env;
mod local;

pub use check::{which, ConfigCheck, FileStatus};
pub use env::{EnvReport, ENV_VARS};
pub use local::LocalMachine;
