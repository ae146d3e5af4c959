//! Queue engine and queue parameters

use crate::config::yaml::scalar_to_string;
use crate::error::{AbiQueueError, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::fmt;
use std::str::FromStr;

/// Queue engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueType {
    /// Jobs run in the background on the local machine
    Shell,
    /// Slurm Workload Manager
    Slurm,
    /// PBS Pro
    #[serde(rename = "pbspro")]
    PbsPro,
}

/// Header directives of Slurm, in the order they are written
const SLURM_DIRECTIVES: &[(&str, &str)] = &[
    ("partition", "--partition="),
    ("job_name", "--job-name="),
    ("nodes", "--nodes="),
    ("ntasks", "--ntasks="),
    ("ntasks_per_node", "--ntasks-per-node="),
    ("cpus_per_task", "--cpus-per-task="),
    ("mem", "--mem="),
    ("mem_per_cpu", "--mem-per-cpu="),
    ("hint", "--hint="),
    ("time", "--time="),
    ("exclude", "--exclude="),
    ("account", "--account="),
    ("mail_user", "--mail-user="),
    ("mail_type", "--mail-type="),
    ("constraint", "--constraint="),
    ("gres", "--gres="),
    ("requeue", "--requeue="),
    ("nodelist", "--nodelist="),
    ("propagate", "--propagate="),
    ("licenses", "--licenses="),
    ("output", "--output="),
    ("error", "--error="),
    ("qos", "--qos="),
];

const SLURM_RESERVED: &[&str] = &[
    "partition",
    "job_name",
    "nodes",
    "ntasks",
    "ntasks_per_node",
    "cpus_per_task",
    "mem_per_cpu",
    "time",
    "exclude",
    "output",
    "error",
];

const PBSPRO_DIRECTIVES: &[(&str, &str)] = &[
    ("queue", "-q "),
    ("job_name", "-N "),
    ("account", "-A "),
    ("select", "-l select="),
    ("walltime", "-l walltime="),
    ("model", "-l model="),
    ("place", "-l place="),
    ("group_list", "-W group_list="),
    ("mail_user", "-M "),
    ("mail_type", "-m "),
    ("output", "-o "),
    ("error", "-e "),
];

const PBSPRO_RESERVED: &[&str] = &["queue", "job_name", "select", "walltime", "output", "error"];

impl QueueType {
    pub fn name(&self) -> &'static str {
        match self {
            QueueType::Shell => "shell",
            QueueType::Slurm => "slurm",
            QueueType::PbsPro => "pbspro",
        }
    }

    /// Jobs go through a queue manager
    pub fn is_queue(&self) -> bool {
        !matches!(self, QueueType::Shell)
    }

    /// Prefix of the header lines
    pub fn directive(&self) -> Option<&'static str> {
        match self {
            QueueType::Shell => None,
            QueueType::Slurm => Some("#SBATCH"),
            QueueType::PbsPro => Some("#PBS"),
        }
    }

    /// Known header keys with the option they produce, in output order
    pub fn header_keys(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            QueueType::Shell => &[],
            QueueType::Slurm => SLURM_DIRECTIVES,
            QueueType::PbsPro => PBSPRO_DIRECTIVES,
        }
    }

    /// Header keys computed by the adapter that `qparams` cannot override
    pub fn reserved_keys(&self) -> &'static [&'static str] {
        match self {
            QueueType::Shell => &[],
            QueueType::Slurm => SLURM_RESERVED,
            QueueType::PbsPro => PBSPRO_RESERVED,
        }
    }

    /// Commands that must be on `PATH` to use this engine
    pub fn commands(&self) -> &'static [&'static str] {
        match self {
            QueueType::Shell => &["bash"],
            QueueType::Slurm => &["sbatch", "scancel", "squeue", "sacct"],
            QueueType::PbsPro => &["qsub", "qdel", "qstat"],
        }
    }
}

impl fmt::Display for QueueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for QueueType {
    type Err = AbiQueueError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "shell" => Ok(QueueType::Shell),
            "slurm" => Ok(QueueType::Slurm),
            "pbspro" => Ok(QueueType::PbsPro),
            other => Err(AbiQueueError::config(format!("Unknown qtype '{}'", other))),
        }
    }
}

/// The `queue` section of a qadapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueSection {
    pub qtype: QueueType,
    /// Partition or queue name
    #[serde(default)]
    pub qname: String,
    /// Extra header parameters
    #[serde(default)]
    pub qparams: Mapping,
    /// Text appended verbatim to the header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qverbatim: Option<String>,
}

impl QueueSection {
    /// Check `qname` and `qparams` against the engine and return the
    /// parameters as strings
    pub(crate) fn validated_params(&self) -> std::result::Result<Vec<(String, String)>, String> {
        if self.qtype.is_queue() && self.qname.trim().is_empty() {
            return Err(format!("qname is required by the {} engine", self.qtype));
        }

        if !self.qtype.is_queue() {
            if !self.qparams.is_empty() {
                tracing::warn!("qparams are ignored by the shell engine");
            }
            return Ok(Vec::new());
        }

        let known = self.qtype.header_keys();
        let reserved = self.qtype.reserved_keys();

        let mut params = Vec::with_capacity(self.qparams.len());
        for (key, value) in &self.qparams {
            let key = key
                .as_str()
                .ok_or_else(|| format!("qparams keys must be strings, got {:?}", key))?;
            if reserved.contains(&key) {
                return Err(format!("qparams.{} is set by the adapter and cannot be overridden", key));
            }
            if !known.iter().any(|(k, _)| *k == key) {
                return Err(format!("qparams.{} is not supported by the {} engine", key, self.qtype));
            }
            let value = scalar_to_string(value)
                .ok_or_else(|| format!("qparams.{} must be a scalar", key))?;
            params.push((key.to_string(), value));
        }
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(yaml: &str) -> QueueSection {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_qtype_names() {
        assert_eq!("PbsPro".parse::<QueueType>().unwrap(), QueueType::PbsPro);
        assert!("lsf".parse::<QueueType>().is_err());
        assert_eq!(section("qtype: slurm\nqname: debug").qtype, QueueType::Slurm);
    }

    #[test]
    fn test_qparams_validation() {
        let ok = section("qtype: slurm\nqname: main\nqparams: {account: chem, qos: 3}");
        let params = ok.validated_params().unwrap();
        assert_eq!(params[1], ("qos".to_string(), "3".to_string()));

        let reserved = section("qtype: slurm\nqname: main\nqparams: {ntasks: 3}");
        assert!(reserved.validated_params().unwrap_err().contains("set by the adapter"));

        let unknown = section("qtype: pbspro\nqname: main\nqparams: {gres: gpu}");
        assert!(unknown.validated_params().unwrap_err().contains("not supported"));

        let noname = section("qtype: pbspro");
        assert!(noname.validated_params().is_err());

        let shell = section("qtype: shell\nqparams: {anything: 1}");
        assert!(shell.validated_params().unwrap().is_empty());
    }
}
