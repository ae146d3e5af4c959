//! Detection of the local machine

use crate::error::Result;
use crate::manager::TaskManager;
use crate::qadapter::Hardware;
use crate::units::Memory;
use serde::Serialize;
use std::fmt;
use sysinfo::System;

/// Cores and memory of the machine we are running on
#[derive(Debug, Clone, Serialize)]
pub struct LocalMachine {
    /// Host name
    pub hostname: String,
    /// Logical cores
    pub num_cores: u32,
    /// Physical cores
    pub physical_cores: u32,
    /// Total memory
    pub mem_total: Memory,
    /// CPU model
    pub cpu_model: String,
}

impl LocalMachine {
    pub fn detect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string());

        let cpu_model = sys
            .cpus()
            .first()
            .map(|c| c.brand().trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Unknown".to_string());

        Self {
            hostname,
            num_cores: num_cpus::get() as u32,
            physical_cores: num_cpus::get_physical() as u32,
            mem_total: Memory::from_bytes(sys.total_memory()),
            cpu_model,
        }
    }

    /// The machine as a single node
    pub fn hardware(&self) -> Hardware {
        Hardware {
            num_nodes: 1,
            sockets_per_node: 1,
            cores_per_socket: self.num_cores.max(1),
            mem_per_node: Memory::from_mb(self.mem_total.mb().floor().max(1.0)),
        }
    }

    /// A manager file running jobs through the shell on this machine
    pub fn manager_yaml(&self) -> String {
        let hw = self.hardware();
        format!(
            r#"qadapters:
    - priority: 1
      queue:
            qtype: shell
            qname: {host}
      job:
            mpi_runner: mpirun
      limits:
            timelimit: 1:00:00
            max_cores: {cores}
      hardware:
            num_nodes: {nodes}
            sockets_per_node: {sockets}
            cores_per_socket: {cores}
            mem_per_node: {mem} Mb
"#,
            host = self.hostname,
            nodes = hw.num_nodes,
            sockets = hw.sockets_per_node,
            cores = hw.cores_per_socket,
            mem = hw.mem_per_node.whole_mb(),
        )
    }

    pub fn manager(&self) -> Result<TaskManager> {
        self.manager_yaml().parse()
    }
}

impl fmt::Display for LocalMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Host: {}", self.hostname)?;
        writeln!(f, "CPU: {}", self.cpu_model)?;
        writeln!(f, "Cores: {} logical, {} physical", self.num_cores, self.physical_cores)?;
        write!(f, "Memory: {}", self.mem_total.human())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> LocalMachine {
        LocalMachine {
            hostname: "node01".to_string(),
            num_cores: 8,
            physical_cores: 4,
            mem_total: Memory::from_gb(16.0),
            cpu_model: "test".to_string(),
        }
    }

    #[test]
    fn test_generated_manager_loads() {
        let manager = machine().manager().unwrap();
        let qad = manager.qadapter();
        assert_eq!(qad.qname(), "node01");
        assert_eq!(qad.max_cores(), 8);
        assert_eq!(qad.hardware().mem_per_node.gb(), 16.0);
        assert!(!manager.has_queue());
    }

    #[test]
    fn test_hardware() {
        let hw = machine().hardware();
        assert_eq!(hw.num_cores(), 8);
        assert!(hw.validate().is_ok());
    }

    #[test]
    fn test_detect() {
        let local = LocalMachine::detect();
        assert!(local.num_cores >= 1);
        assert!(local.manager().is_ok());
    }
}
