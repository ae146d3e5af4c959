//! The `job` section: runner, environment and extra commands

use crate::config::yaml::{scalar_to_string, string_or_list};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Runners that receive the number of processes with `-n`
const MPI_LAUNCHERS: &[&str] = &["mpirun", "mpiexec", "srun"];

/// Environment variables in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvVars(Vec<(String, String)>);

impl EnvVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set a variable, keeping its position if already declared
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for EnvVars {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for EnvVars {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EnvVisitor;

        impl<'de> Visitor<'de> for EnvVisitor {
            type Value = EnvVars;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of environment variables")
            }

            fn visit_unit<E: de::Error>(self) -> Result<EnvVars, E> {
                Ok(EnvVars::new())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<EnvVars, A::Error> {
                let mut vars = EnvVars::new();
                while let Some((key, value)) = access.next_entry::<String, serde_yaml::Value>()? {
                    let value = scalar_to_string(&value).ok_or_else(|| {
                        de::Error::custom(format!("value of {} must be a scalar", key))
                    })?;
                    vars.set(key, value);
                }
                Ok(vars)
            }
        }

        deserializer.deserialize_any(EnvVisitor)
    }
}

/// Treat a missing runner and the literal `None` the same way
fn optional_runner<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| {
        let s = s.trim();
        !s.is_empty() && s != "None"
    }))
}

/// Present `shell_runner`, where null and `None` mean no runner at all
fn explicit_runner<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Option<String>>, D::Error> {
    optional_runner(deserializer).map(Some)
}

/// How the executable is run and what is done around it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSection {
    /// MPI launcher or wrapper script
    #[serde(default, deserialize_with = "optional_runner")]
    pub mpi_runner: Option<String>,
    #[serde(default)]
    pub mpi_runner_options: String,
    /// Runner replacing `mpi_runner` when jobs run on the frontend,
    /// `Some(None)` to run the executable directly
    #[serde(
        default,
        deserialize_with = "explicit_runner",
        skip_serializing_if = "Option::is_none"
    )]
    pub shell_runner: Option<Option<String>>,
    #[serde(default)]
    pub shell_runner_options: String,
    #[serde(default)]
    pub shell_env: EnvVars,
    #[serde(default)]
    pub omp_env: EnvVars,
    #[serde(default, deserialize_with = "string_or_list")]
    pub modules: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub setup: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub pre_run: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub post_run: Vec<String>,
}

/// Files redirected on the run line
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Redirects<'a> {
    pub stdin: Option<&'a str>,
    pub stdout: Option<&'a str>,
    pub stderr: Option<&'a str>,
}

impl JobSection {
    /// OpenMP is configured through `omp_env`
    pub fn has_omp(&self) -> bool {
        !self.omp_env.is_empty()
    }

    /// Run on the frontend: `shell_runner`, when given, replaces `mpi_runner`
    pub(crate) fn use_shell_runner(&mut self) {
        if let Some(runner) = self.shell_runner.take() {
            self.mpi_runner = runner;
            self.mpi_runner_options = std::mem::take(&mut self.shell_runner_options);
        }
    }

    /// The command line running `executable` with `mpi_procs` processes
    pub(crate) fn run_line(&self, mpi_procs: u32, executable: &str, args: &[String], io: Redirects<'_>) -> String {
        let mut parts: Vec<String> = Vec::new();

        if let Some(runner) = &self.mpi_runner {
            let basename = runner.rsplit('/').next().unwrap_or(runner);
            parts.push(runner.clone());
            if MPI_LAUNCHERS.contains(&basename) {
                if !self.mpi_runner_options.trim().is_empty() {
                    parts.push(self.mpi_runner_options.trim().to_string());
                }
                parts.push(format!("-n {}", mpi_procs));
            }
        }

        parts.push(executable.to_string());
        parts.extend(args.iter().cloned());

        if let Some(stdin) = io.stdin {
            parts.push(format!("< {}", stdin));
        }
        if let Some(stdout) = io.stdout {
            parts.push(format!("> {}", stdout));
        }
        if let Some(stderr) = io.stderr {
            parts.push(format!("2> {}", stderr));
        }

        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(yaml: &str) -> JobSection {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_env_keeps_yaml_order() {
        let job = job("shell_env:\n  ZZZ: 1\n  PATH: /opt/bin:$PATH\n  AAA: yes\n");
        let keys: Vec<_> = job.shell_env.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["ZZZ", "PATH", "AAA"]);
        assert_eq!(job.shell_env.get("ZZZ"), Some("1"));
    }

    #[test]
    fn test_mpi_launcher_line() {
        let job = job("mpi_runner: /usr/bin/mpirun\nmpi_runner_options: --bind-to none");
        let io = Redirects {
            stdin: Some("run.abi"),
            stdout: Some("run.log"),
            stderr: Some("run.err"),
        };
        assert_eq!(
            job.run_line(8, "abinit", &[], io),
            "/usr/bin/mpirun --bind-to none -n 8 abinit < run.abi > run.log 2> run.err"
        );
    }

    #[test]
    fn test_wrapper_and_bare_executable() {
        let wrapper = job("mpi_runner: run_abinit.sh");
        let args = vec!["--timelimit 0-01:00:00".to_string()];
        assert_eq!(
            wrapper.run_line(4, "abinit", &args, Redirects::default()),
            "run_abinit.sh abinit --timelimit 0-01:00:00"
        );

        let bare = job("mpi_runner: None\nmodules: intel");
        assert!(bare.mpi_runner.is_none());
        assert_eq!(bare.modules, vec!["intel"]);
        assert_eq!(bare.run_line(1, "abinit", &[], Redirects::default()), "abinit");
    }

    #[test]
    fn test_shell_runner_replaces_mpi_runner() {
        let mut srun = job("mpi_runner: srun\nshell_runner: None");
        srun.use_shell_runner();
        assert!(srun.mpi_runner.is_none());

        for null in ["~", "null"] {
            let mut direct = job(&format!("mpi_runner: srun\nshell_runner: {}", null));
            assert_eq!(direct.shell_runner, Some(None));
            direct.use_shell_runner();
            assert!(direct.mpi_runner.is_none());
            assert_eq!(direct.run_line(2, "abinit", &[], Redirects::default()), "abinit");
        }

        let mut wrapped = job("mpi_runner: srun\nshell_runner: mpirun\nshell_runner_options: --oversubscribe");
        wrapped.use_shell_runner();
        assert_eq!(wrapped.run_line(2, "abinit", &[], Redirects::default()), "mpirun --oversubscribe -n 2 abinit");

        let mut untouched = job("mpi_runner: srun");
        untouched.use_shell_runner();
        assert_eq!(untouched.mpi_runner.as_deref(), Some("srun"));
    }

    #[test]
    fn test_omp_detection() {
        assert!(!job("{}").has_omp());
        assert!(job("omp_env: {OMP_NUM_THREADS: 2}").has_omp());
    }
}
