//! The list of parallel configurations and its ordering

use super::conf::ParalConf;
use super::histogram::SparseHistogram;
use crate::condition::Condition;
use crate::error::{AbiQueueError, IoResultExt, Result};
use crate::manager::{AutoparalPriority, TaskPolicy};
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::path::Path;

/// YAML tag of the autoparal document in the log file
pub const AUTOPARAL_TAG: &str = "!Autoparal";

/// Parallel configurations reported by autoparal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParalHints {
    /// The `info` section (version, max_ncpus, ...)
    #[serde(default)]
    pub info: Mapping,
    #[serde(rename = "configurations")]
    confs: Vec<ParalConf>,
}

impl ParalHints {
    pub fn new(info: Mapping, confs: Vec<ParalConf>) -> Self {
        Self { info, confs }
    }

    /// Read the autoparal section from a log file
    pub fn parse_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_path(path)?;
        Self::parse_str(&text)
            .map_err(|e| e.with_context(format!("reading {}", path.display())))
    }

    /// Extract the document tagged `!Autoparal` from text.
    ///
    /// Only the first tagged document is used.
    pub fn parse_str(text: &str) -> Result<Self> {
        let doc = extract_tagged_doc(text, AUTOPARAL_TAG).ok_or_else(|| {
            AbiQueueError::ParalHintsError(format!("no document tagged {} found", AUTOPARAL_TAG))
        })?;
        Self::from_yaml_doc(&doc)
    }

    /// Parse the body of the document (without tag)
    pub fn from_yaml_doc(doc: &str) -> Result<Self> {
        let hints: Self = serde_yaml::from_str(doc)
            .map_err(|e| AbiQueueError::ParalHintsError(format!("wrong YAML doc:\n{}\n\n{}", doc, e)))?;
        for conf in &hints.confs {
            conf.validate().map_err(AbiQueueError::ParalHintsError)?;
        }
        Ok(hints)
    }

    /// Cartesian product of MPI and OpenMP counts with unit efficiency.
    ///
    /// Mainly useful for benchmarks.
    pub fn from_mpi_omp_lists(mpi_procs: &[u32], omp_threads: &[u32]) -> Self {
        let confs = mpi_procs
            .iter()
            .flat_map(|&p| omp_threads.iter().map(move |&t| ParalConf::new(p, t)))
            .collect();
        Self::new(Mapping::new(), confs)
    }

    pub fn confs(&self) -> &[ParalConf] {
        &self.confs
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ParalConf> {
        self.confs.iter()
    }

    pub fn len(&self) -> usize {
        self.confs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.confs.is_empty()
    }

    pub fn first(&self) -> Option<&ParalConf> {
        self.confs.first()
    }

    /// Maximum number of cores
    pub fn max_cores(&self) -> Option<u32> {
        self.iter().map(ParalConf::num_cores).max()
    }

    /// Maximum memory per MPI process in megabytes
    pub fn max_mem_per_proc(&self) -> Option<f64> {
        self.iter().map(|c| c.mem_per_cpu).reduce(f64::max)
    }

    pub fn max_speedup(&self) -> Option<f64> {
        self.iter().map(ParalConf::speedup).reduce(f64::max)
    }

    pub fn max_efficiency(&self) -> Option<f64> {
        self.iter().map(|c| c.efficiency).reduce(f64::max)
    }

    /// Highest efficiency first
    pub fn sort_by_efficiency(&mut self) -> &mut Self {
        self.confs.sort_by(|a, b| b.efficiency.total_cmp(&a.efficiency));
        self
    }

    /// Highest speedup first
    pub fn sort_by_speedup(&mut self) -> &mut Self {
        self.confs.sort_by(|a, b| b.speedup().total_cmp(&a.speedup()));
        self
    }

    /// Lowest memory first; left untouched when no memory estimate is available
    pub fn sort_by_mem_per_proc(&mut self) -> &mut Self {
        if self.iter().any(|c| c.mem_per_cpu > 0.0) {
            self.confs.sort_by(|a, b| a.mem_per_cpu.total_cmp(&b.mem_per_cpu));
        }
        self
    }

    /// Remove the configurations that do not satisfy `condition`.
    ///
    /// With `on_vars` the condition is evaluated on the `vars` mapping.
    pub fn select_with_condition(&mut self, condition: &Condition, on_vars: bool) {
        self.confs.retain(|conf| {
            if on_vars {
                condition.matches(&conf.vars)
            } else {
                condition.matches(conf)
            }
        });
    }

    /// Keep the best bin for each priority in turn
    pub fn multidimensional_optimization(&self, priorities: &[AutoparalPriority]) -> Result<Self> {
        let mut opt_confs = self.confs.clone();

        for priority in priorities {
            if opt_confs.is_empty() {
                break;
            }
            let hist = match priority {
                AutoparalPriority::Speedup => {
                    SparseHistogram::with_step(&opt_confs, ParalConf::speedup, 1.0)
                }
                AutoparalPriority::Efficiency => {
                    SparseHistogram::with_step(&opt_confs, |c| c.efficiency, 0.1)
                }
                AutoparalPriority::MemPerProc => {
                    SparseHistogram::with_step(&opt_confs, |c| c.mem_per_cpu, 1024.0)
                }
                AutoparalPriority::HighestSpeedupMinimumEfficiencyCutoff { .. } => {
                    return Err(AbiQueueError::config(
                        "meta priorities cannot be combined with other autoparal priorities",
                    ))
                }
            };

            let mut bins = hist.values;
            opt_confs = if *priority == AutoparalPriority::MemPerProc {
                bins.swap_remove(0)
            } else {
                bins.pop().unwrap_or_default()
            };
        }

        Ok(Self::new(self.info.clone(), opt_confs))
    }

    /// New list ordered according to the policy, best configuration first
    pub fn get_ordered_with_policy(&self, policy: &TaskPolicy, max_ncpus: u32) -> Result<Self> {
        let mut hints = Self::new(
            self.info.clone(),
            self.iter()
                .filter(|c| c.num_cores() <= max_ncpus)
                .cloned()
                .collect(),
        );

        for (condition, on_vars, name) in [
            (&policy.condition, false, "condition"),
            (&policy.vars_condition, true, "vars_condition"),
        ] {
            if condition.is_empty() {
                continue;
            }
            tracing::info!("Applying {} {}", name, condition);
            let backup = hints.clone();
            hints.select_with_condition(condition, on_vars);

            // Undo the filter if no configuration fulfills the requirements.
            if hints.is_empty() {
                tracing::warn!("Empty list of configurations after policy.{}", name);
                hints = backup;
            }
        }

        match policy.autoparal_priorities.as_slice() {
            [] => {}
            [single] => match single {
                AutoparalPriority::Efficiency => {
                    hints.sort_by_efficiency();
                }
                AutoparalPriority::Speedup => {
                    hints.sort_by_speedup();
                }
                AutoparalPriority::MemPerProc => {
                    hints.sort_by_mem_per_proc();
                }
                AutoparalPriority::HighestSpeedupMinimumEfficiencyCutoff { minimum_efficiency } => {
                    let min_eff = *minimum_efficiency;
                    hints.confs.retain(|c| c.efficiency >= min_eff);
                    hints.sort_by_speedup();
                }
            },
            many => {
                hints = hints.multidimensional_optimization(many)?;
                if hints.is_empty() {
                    return Err(AbiQueueError::ParalHintsError(
                        "no configuration left after multidimensional optimization".to_string(),
                    ));
                }
            }
        }

        Ok(hints)
    }
}

impl<'a> IntoIterator for &'a ParalHints {
    type Item = &'a ParalConf;
    type IntoIter = std::slice::Iter<'a, ParalConf>;

    fn into_iter(self) -> Self::IntoIter {
        self.confs.iter()
    }
}

fn extract_tagged_doc(text: &str, tag: &str) -> Option<String> {
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let is_start = line
            .trim()
            .strip_prefix("---")
            .map(|rest| rest.trim() == tag)
            .unwrap_or(false);
        if !is_start {
            continue;
        }

        let body: Vec<&str> = lines
            .by_ref()
            .take_while(|l| {
                let l = l.trim_end();
                l != "..." && !l.starts_with("---")
            })
            .collect();
        return Some(body.join("\n"));
    }

    None
}
