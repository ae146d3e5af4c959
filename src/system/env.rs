//! Environment variables read by the jobs

use std::env;
use std::fmt;
use std::path::Path;

/// Variables reported by [`EnvReport`]
pub const ENV_VARS: [&str; 5] = [
    "HDF5_DIR",
    "NETCDF4_DIR",
    "OPENBLAS_NUM_THREADS",
    "OMP_NUM_THREADS",
    "PMG_MAPI_KEY",
];

const DIR_VARS: [&str; 2] = ["HDF5_DIR", "NETCDF4_DIR"];
const THREAD_VARS: [&str; 2] = ["OPENBLAS_NUM_THREADS", "OMP_NUM_THREADS"];
const SECRET_VARS: [&str; 1] = ["PMG_MAPI_KEY"];

/// Values of [`ENV_VARS`] and the problems found with them
#[derive(Debug, Clone, Default)]
pub struct EnvReport {
    /// Name and value of each variable, in [`ENV_VARS`] order
    pub vars: Vec<(&'static str, Option<String>)>,
    /// Human readable warnings
    pub warnings: Vec<String>,
}

impl EnvReport {
    /// Inspect the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Inspect the variables returned by `lookup`
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars: Vec<_> = ENV_VARS.iter().map(|&name| (name, lookup(name))).collect();
        let mut warnings = Vec::new();

        for (name, value) in &vars {
            let Some(value) = value else {
                continue;
            };
            if DIR_VARS.contains(name) && !Path::new(value).is_dir() {
                warnings.push(format!("{} points to `{}` which is not a directory", name, value));
            }
            if THREAD_VARS.contains(name) {
                match value.trim().parse::<u32>() {
                    Ok(0) => warnings.push(format!("{} is zero", name)),
                    Ok(n) if n > 1 => warnings.push(format!(
                        "{} = {}: threaded libraries may oversubscribe the cores of MPI jobs",
                        name, n
                    )),
                    Ok(_) => {}
                    Err(_) => warnings.push(format!("{} = `{}` is not an integer", name, value)),
                }
            }
        }

        Self { vars, warnings }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(n, _)| *n == name)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Hide all but the first characters of a secret
fn mask(value: &str) -> String {
    let shown: String = value.chars().take(2).collect();
    format!("{}{}", shown, "*".repeat(value.chars().count().saturating_sub(2).max(4)))
}

impl fmt::Display for EnvReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.vars {
            match value {
                Some(v) if SECRET_VARS.contains(name) => writeln!(f, "{}: {}", name, mask(v))?,
                Some(v) => writeln!(f, "{}: {}", name, v)?,
                None => writeln!(f, "{}: (not set)", name)?,
            }
        }
        for warning in &self.warnings {
            writeln!(f, "Warning: {}", warning)?;
        }
        Ok(())
    }
}
