//! Parallel configurations reported by the autoparal dry run
//!
//! The simulation code prints a `--- !Autoparal` YAML document listing the
//! MPI/OpenMP layouts it can use, with estimated memory and efficiency.
//! This module parses that document, filters it and orders it according to
//! the task policy.

mod conf;
mod hints;
mod histogram;

pub use conf::ParalConf;
pub use hints::{ParalHints, AUTOPARAL_TAG};
pub use histogram::SparseHistogram;
