//! A single parallel configuration

use crate::condition::{FieldSource, FieldValue};
use crate::units::Memory;
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::fmt;

fn default_omp_ncpus() -> u32 {
    1
}

/// One of the parallel configurations proposed by autoparal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParalConf {
    /// Total number of CPUs, as reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tot_ncpus: Option<u32>,
    /// Number of MPI processes
    pub mpi_ncpus: u32,
    /// Number of OpenMP threads
    #[serde(default = "default_omp_ncpus")]
    pub omp_ncpus: u32,
    /// Estimated memory per MPI process in megabytes (0 if unknown)
    #[serde(default)]
    pub mem_per_cpu: f64,
    /// Parallel efficiency, 1.0 is ideal strong scaling
    pub efficiency: f64,
    /// Input variables that must be set to use this configuration
    #[serde(default)]
    pub vars: Mapping,
}

impl ParalConf {
    /// Configuration with the given layout, unit efficiency and no variables
    pub fn new(mpi_procs: u32, omp_threads: u32) -> Self {
        Self {
            tot_ncpus: Some(mpi_procs.saturating_mul(omp_threads)),
            mpi_ncpus: mpi_procs,
            omp_ncpus: omp_threads,
            mem_per_cpu: 0.0,
            efficiency: 1.0,
            vars: Mapping::new(),
        }
    }

    /// Set the estimated memory per process
    pub fn with_mem_per_proc(mut self, mem: Memory) -> Self {
        self.mem_per_cpu = mem.mb();
        self
    }

    /// Set the parallel efficiency
    pub fn with_efficiency(mut self, efficiency: f64) -> Self {
        self.efficiency = efficiency;
        self
    }

    pub fn mpi_procs(&self) -> u32 {
        self.mpi_ncpus
    }

    pub fn omp_threads(&self) -> u32 {
        self.omp_ncpus
    }

    pub fn num_cores(&self) -> u32 {
        self.mpi_ncpus.saturating_mul(self.omp_ncpus)
    }

    /// Reject layouts and estimates no run can have
    pub fn validate(&self) -> Result<(), String> {
        if self.mpi_ncpus == 0 || self.omp_ncpus == 0 {
            return Err(format!("mpi_ncpus and omp_ncpus must be > 0 in {{{}}}", self));
        }
        if self.mpi_ncpus.checked_mul(self.omp_ncpus).is_none() {
            return Err(format!("too many cores: {} x {}", self.mpi_ncpus, self.omp_ncpus));
        }
        if !self.efficiency.is_finite() || self.efficiency < 0.0 {
            return Err(format!("invalid efficiency {}", self.efficiency));
        }
        if !self.mem_per_cpu.is_finite() || self.mem_per_cpu < 0.0 {
            return Err(format!("invalid mem_per_cpu {}", self.mem_per_cpu));
        }
        Ok(())
    }

    pub fn mem_per_proc(&self) -> Memory {
        Memory::from_mb(self.mem_per_cpu)
    }

    /// Estimated speedup
    pub fn speedup(&self) -> f64 {
        self.efficiency * self.num_cores() as f64
    }

    /// Estimated total memory
    pub fn tot_mem(&self) -> Memory {
        self.mem_per_proc() * self.mpi_ncpus as f64
    }
}

impl FieldSource for ParalConf {
    fn field(&self, name: &str) -> Option<FieldValue> {
        let number = |v: f64| Some(FieldValue::Number(v));
        match name {
            "tot_ncpus" => self.tot_ncpus.and_then(|n| number(n as f64)),
            "mpi_ncpus" | "mpi_procs" => number(self.mpi_ncpus as f64),
            "omp_ncpus" | "omp_threads" => number(self.omp_ncpus as f64),
            "mem_per_cpu" | "mem_per_proc" => number(self.mem_per_cpu),
            "efficiency" => number(self.efficiency),
            "num_cores" => number(self.num_cores() as f64),
            "speedup" => number(self.speedup()),
            "tot_mem" => number(self.tot_mem().mb()),
            _ => None,
        }
    }
}

impl fmt::Display for ParalConf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mpi_procs: {}, omp_threads: {}, efficiency: {:.2}, speedup: {:.2}, mem_per_proc: {}",
            self.mpi_ncpus,
            self.omp_ncpus,
            self.efficiency,
            self.speedup(),
            self.mem_per_proc()
        )?;
        if !self.vars.is_empty() {
            let vars = serde_json::to_string(&self.vars).unwrap_or_default();
            write!(f, ", vars: {}", vars)?;
        }
        Ok(())
    }
}
