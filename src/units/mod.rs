//! Physical quantities used in manager files
//!
//! Memory is always carried in megabytes, time limits in whole seconds.

mod memory;
mod time;

pub use memory::Memory;
pub use time::{format_pbs_time, format_slurm_time, parse_timestr, TimeLimit};
