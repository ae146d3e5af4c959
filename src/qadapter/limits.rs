//! Resource limits of a qadapter

use crate::condition::Condition;
use crate::units::{Memory, TimeLimit};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How cores are requested from the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Allocation {
    /// Cores may be spread over partially used nodes
    #[default]
    Shared,
    /// Prefer configurations filling whole nodes
    Nodes,
    /// Only run configurations filling whole nodes
    ForceNodes,
}

impl Allocation {
    pub fn whole_nodes(&self) -> bool {
        !matches!(self, Allocation::Shared)
    }
}

impl fmt::Display for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Allocation::Shared => "shared",
            Allocation::Nodes => "nodes",
            Allocation::ForceNodes => "force_nodes",
        })
    }
}

fn default_min_cores() -> u32 {
    1
}

fn default_max_num_launches() -> u32 {
    5
}

/// The `limits` section. Missing optional values are derived from the
/// hardware when the adapter is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Limits {
    /// Time limit requested at submission
    pub timelimit: TimeLimit,
    /// Upper bound when the time limit is increased (default: `timelimit`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timelimit_hard: Option<TimeLimit>,
    #[serde(default = "default_min_cores")]
    pub min_cores: u32,
    pub max_cores: u32,
    /// Largest core count proposed to autoparal (default: `max_cores`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint_cores: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_mem_per_proc: Option<Memory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_mem_per_proc: Option<Memory>,
    #[serde(default = "default_max_num_launches")]
    pub max_num_launches: u32,
    /// Extra filter on the parallel configurations
    #[serde(default, skip_serializing_if = "Condition::is_empty")]
    pub condition: Condition,
    #[serde(default)]
    pub allocation: Allocation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let limits: Limits = serde_yaml::from_str("timelimit: '1:00:00'\nmax_cores: 16").unwrap();
        assert_eq!(limits.min_cores, 1);
        assert_eq!(limits.max_num_launches, 5);
        assert_eq!(limits.allocation, Allocation::Shared);
        assert!(limits.hint_cores.is_none());
        assert!(limits.condition.is_empty());
        assert_eq!(limits.timelimit.as_secs(), 3600);
    }

    #[test]
    fn test_allocation_names() {
        let limits: Limits =
            serde_yaml::from_str("timelimit: 60\nmax_cores: 4\nallocation: force_nodes").unwrap();
        assert_eq!(limits.allocation, Allocation::ForceNodes);
        assert!(limits.allocation.whole_nodes());
        assert!(serde_yaml::from_str::<Limits>("timelimit: 60\nmax_cores: 4\nallocation: all").is_err());
    }
}
