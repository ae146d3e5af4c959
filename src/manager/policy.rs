//! Task policy: how autoparal configurations are filtered and ranked

use crate::condition::Condition;
use crate::error::{AbiQueueError, Result};
use crate::units::TimeLimit;
use serde::{Deserialize, Serialize};
use std::fmt;

const META_CUTOFF: &str = "highest_speedup_minimum_efficiency_cutoff";

/// Criterion used to rank parallel configurations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPriority", into = "RawPriority")]
pub enum AutoparalPriority {
    /// Highest efficiency first
    Efficiency,
    /// Highest speedup first
    Speedup,
    /// Lowest memory per process first
    MemPerProc,
    /// Keep configurations with efficiency above the cutoff, highest speedup first
    HighestSpeedupMinimumEfficiencyCutoff { minimum_efficiency: f64 },
}

/// YAML spelling: a plain name or a `meta_priority` mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawPriority {
    Name(String),
    Meta {
        meta_priority: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum_efficiency: Option<f64>,
    },
}

impl TryFrom<RawPriority> for AutoparalPriority {
    type Error = String;

    fn try_from(raw: RawPriority) -> std::result::Result<Self, String> {
        match raw {
            RawPriority::Name(name) => match name.as_str() {
                "efficiency" => Ok(Self::Efficiency),
                "speedup" => Ok(Self::Speedup),
                "mem_per_proc" => Ok(Self::MemPerProc),
                other => Err(format!("unknown autoparal priority '{}'", other)),
            },
            RawPriority::Meta {
                meta_priority,
                minimum_efficiency,
            } if meta_priority == META_CUTOFF => Ok(Self::HighestSpeedupMinimumEfficiencyCutoff {
                minimum_efficiency: minimum_efficiency.unwrap_or(1.0),
            }),
            RawPriority::Meta { meta_priority, .. } => {
                Err(format!("unknown meta_priority '{}'", meta_priority))
            }
        }
    }
}

impl From<AutoparalPriority> for RawPriority {
    fn from(priority: AutoparalPriority) -> Self {
        match priority {
            AutoparalPriority::Efficiency => RawPriority::Name("efficiency".to_string()),
            AutoparalPriority::Speedup => RawPriority::Name("speedup".to_string()),
            AutoparalPriority::MemPerProc => RawPriority::Name("mem_per_proc".to_string()),
            AutoparalPriority::HighestSpeedupMinimumEfficiencyCutoff { minimum_efficiency } => {
                RawPriority::Meta {
                    meta_priority: META_CUTOFF.to_string(),
                    minimum_efficiency: Some(minimum_efficiency),
                }
            }
        }
    }
}

/// Which choice wins when selecting a qadapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precedence {
    /// Adapters are tried in priority order
    Qadapter,
    /// Configurations are tried in ranking order
    #[default]
    AutoparalConf,
}

/// The `policy` section of `manager.yml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaskPolicy {
    /// 0 disables autoparal
    pub autoparal: u32,
    /// Filter on the parallel configurations
    #[serde(skip_serializing_if = "Condition::is_empty")]
    pub condition: Condition,
    /// Filter on the input variables of each configuration
    #[serde(skip_serializing_if = "Condition::is_empty")]
    pub vars_condition: Condition,
    pub precedence: Precedence,
    pub autoparal_priorities: Vec<AutoparalPriority>,
    /// A running job whose output does not change for this long is frozen
    pub frozen_timeout: TimeLimit,
}

impl Default for TaskPolicy {
    fn default() -> Self {
        Self {
            autoparal: 1,
            condition: Condition::empty(),
            vars_condition: Condition::empty(),
            precedence: Precedence::default(),
            autoparal_priorities: vec![AutoparalPriority::Speedup],
            frozen_timeout: TimeLimit::from_secs(3600),
        }
    }
}

impl TaskPolicy {
    pub fn uses_autoparal(&self) -> bool {
        self.autoparal != 0
    }

    /// Meta priorities cannot be mixed with other priorities
    pub fn validate(&self) -> Result<()> {
        if self.autoparal > 1 {
            return Err(AbiQueueError::config(format!(
                "policy.autoparal must be 0 or 1, got {}",
                self.autoparal
            )));
        }
        let has_meta = self
            .autoparal_priorities
            .iter()
            .any(|p| matches!(p, AutoparalPriority::HighestSpeedupMinimumEfficiencyCutoff { .. }));
        if has_meta && self.autoparal_priorities.len() > 1 {
            return Err(AbiQueueError::config(
                "policy.autoparal_priorities: a meta_priority must be the only entry",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for TaskPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let priorities: Vec<String> = self
            .autoparal_priorities
            .iter()
            .map(|p| match p {
                AutoparalPriority::Efficiency => "efficiency".to_string(),
                AutoparalPriority::Speedup => "speedup".to_string(),
                AutoparalPriority::MemPerProc => "mem_per_proc".to_string(),
                AutoparalPriority::HighestSpeedupMinimumEfficiencyCutoff { minimum_efficiency } => {
                    format!("{}({})", META_CUTOFF, minimum_efficiency)
                }
            })
            .collect();
        writeln!(f, "autoparal: {}", self.autoparal)?;
        writeln!(f, "condition: {}", self.condition)?;
        writeln!(f, "vars_condition: {}", self.vars_condition)?;
        writeln!(
            f,
            "precedence: {}",
            match self.precedence {
                Precedence::Qadapter => "qadapter",
                Precedence::AutoparalConf => "autoparal_conf",
            }
        )?;
        writeln!(f, "autoparal_priorities: [{}]", priorities.join(", "))?;
        write!(f, "frozen_timeout: {}", self.frozen_timeout.to_slurm())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy: TaskPolicy = serde_yaml::from_str("{}").unwrap();
        assert_eq!(policy, TaskPolicy::default());
        assert!(policy.uses_autoparal());
        assert_eq!(policy.precedence, Precedence::AutoparalConf);
        assert_eq!(policy.autoparal_priorities, vec![AutoparalPriority::Speedup]);
        assert_eq!(policy.frozen_timeout.as_secs(), 3600);
    }

    #[test]
    fn test_priorities() {
        let policy: TaskPolicy = serde_yaml::from_str(
            "precedence: qadapter\nautoparal_priorities: [{meta_priority: highest_speedup_minimum_efficiency_cutoff}]",
        )
        .unwrap();
        assert_eq!(policy.precedence, Precedence::Qadapter);
        assert_eq!(
            policy.autoparal_priorities,
            vec![AutoparalPriority::HighestSpeedupMinimumEfficiencyCutoff { minimum_efficiency: 1.0 }]
        );
        assert!(policy.validate().is_ok());

        assert!(serde_yaml::from_str::<TaskPolicy>("autoparal_priorities: [memory]").is_err());
        assert!(serde_yaml::from_str::<TaskPolicy>("precedence: random").is_err());
    }

    #[test]
    fn test_unknown_keys_and_validation() {
        assert!(serde_yaml::from_str::<TaskPolicy>("max_ncpus: 4").is_err());

        let policy: TaskPolicy = serde_yaml::from_str(
            "autoparal_priorities: [speedup, {meta_priority: highest_speedup_minimum_efficiency_cutoff, minimum_efficiency: 0.5}]",
        )
        .unwrap();
        assert!(policy.validate().is_err());

        let policy: TaskPolicy = serde_yaml::from_str("autoparal: 2").unwrap();
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_frozen_timeout_forms() {
        let policy: TaskPolicy = serde_yaml::from_str("frozen_timeout: 0-2:00:00").unwrap();
        assert_eq!(policy.frozen_timeout.as_secs(), 7200);
        let policy: TaskPolicy = serde_yaml::from_str("frozen_timeout: 600").unwrap();
        assert_eq!(policy.frozen_timeout.as_secs(), 600);
    }
}
