//! Hardware description of a partition

use crate::error::{AbiQueueError, Result};
use crate::units::Memory;
use serde::{Deserialize, Serialize};

/// Nodes available behind a queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Hardware {
    /// Number of nodes available on this queue
    pub num_nodes: u32,
    /// Number of sockets per node
    pub sockets_per_node: u32,
    /// Number of cores per socket
    pub cores_per_socket: u32,
    /// Total memory per node
    pub mem_per_node: Memory,
}

impl Hardware {
    /// Check that every quantity is positive
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("num_nodes", self.num_nodes),
            ("sockets_per_node", self.sockets_per_node),
            ("cores_per_socket", self.cores_per_socket),
        ] {
            if value == 0 {
                return Err(AbiQueueError::config(format!("hardware.{} must be > 0", name)));
            }
        }
        if self.mem_per_node.mb() <= 0.0 {
            return Err(AbiQueueError::config("hardware.mem_per_node must be > 0"));
        }
        let total = self
            .num_nodes
            .checked_mul(self.sockets_per_node)
            .and_then(|n| n.checked_mul(self.cores_per_socket));
        if total.is_none() {
            return Err(AbiQueueError::config(format!(
                "hardware: {} nodes x {} sockets x {} cores is too large",
                self.num_nodes, self.sockets_per_node, self.cores_per_socket
            )));
        }
        Ok(())
    }

    pub fn cores_per_node(&self) -> u32 {
        self.sockets_per_node.saturating_mul(self.cores_per_socket)
    }

    /// Total number of cores in the partition
    pub fn num_cores(&self) -> u32 {
        self.num_nodes.saturating_mul(self.cores_per_node())
    }

    pub fn mem_per_core(&self) -> Memory {
        self.mem_per_node / self.cores_per_node() as f64
    }

    /// OpenMP threads must fit in a single node
    pub fn can_use_omp_threads(&self, omp_threads: u32) -> bool {
        self.cores_per_node() >= omp_threads
    }

    /// Number of full nodes and remaining cores needed by a layout
    pub fn divmod_node(&self, mpi_procs: u32, omp_threads: u32) -> (u32, u32) {
        let cores = mpi_procs.saturating_mul(omp_threads);
        (cores / self.cores_per_node(), cores % self.cores_per_node())
    }
}
