//! Job requests and submitted jobs

use crate::qadapter::QueueType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the submission script written in the job directory
pub const JOB_FILE: &str = "job.sh";
/// Standard output of the queue manager
pub const QOUT_FILE: &str = "queue.qout";
/// Standard error of the queue manager
pub const QERR_FILE: &str = "queue.qerr";

/// What to run and where
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobRequest {
    /// Job name, used by the queue manager
    pub name: String,
    /// Directory where the script is written and executed
    pub workdir: PathBuf,
    /// Program to run
    pub executable: String,
    /// Arguments passed to the program
    #[serde(default, deserialize_with = "crate::config::yaml::string_or_list")]
    pub exec_args: Vec<String>,
    /// File redirected to the standard input
    #[serde(default)]
    pub stdin: Option<PathBuf>,
    /// File receiving the standard output
    #[serde(default)]
    pub stdout: Option<PathBuf>,
    /// File receiving the standard error
    #[serde(default)]
    pub stderr: Option<PathBuf>,
    /// Append `--timelimit` to the arguments
    #[serde(default)]
    pub pass_timelimit: bool,
    /// Locked requests are never submitted
    #[serde(default)]
    pub locked: bool,
    /// Log file holding the autoparal section of a dry run
    #[serde(default)]
    pub autoparal: Option<PathBuf>,
    /// Fixed number of MPI processes
    #[serde(default)]
    pub mpi_procs: Option<u32>,
    /// Fixed number of OpenMP threads
    #[serde(default)]
    pub omp_threads: Option<u32>,
}

impl JobRequest {
    /// Request running `executable` in `workdir` with no redirections
    pub fn new(name: impl Into<String>, workdir: impl Into<PathBuf>, executable: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            workdir: workdir.into(),
            executable: executable.into(),
            exec_args: Vec::new(),
            stdin: None,
            stdout: None,
            stderr: None,
            pass_timelimit: false,
            locked: false,
            autoparal: None,
            mpi_procs: None,
            omp_threads: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exec_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_stdin(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    pub fn with_stdout(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    pub fn with_stderr(mut self, path: impl Into<PathBuf>) -> Self {
        self.stderr = Some(path.into());
        self
    }

    pub fn job_file(&self) -> PathBuf {
        self.workdir.join(JOB_FILE)
    }

    pub fn qout_path(&self) -> PathBuf {
        self.workdir.join(QOUT_FILE)
    }

    pub fn qerr_path(&self) -> PathBuf {
        self.workdir.join(QERR_FILE)
    }

    /// Resolve the working directory and the autoparal file against `base`.
    ///
    /// Redirections stay relative to the working directory, where the script runs.
    pub fn rebase(&mut self, base: &Path) {
        for path in [Some(&mut self.workdir), self.autoparal.as_mut()].into_iter().flatten() {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

/// State of a job as reported by the queue engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Unknown,
}

impl JobStatus {
    /// The job will not change state anymore
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Record of a successful submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedJob {
    pub name: String,
    pub qtype: QueueType,
    /// Identifier assigned by the queue engine (pid for the shell engine)
    pub qid: String,
    pub script: PathBuf,
    /// Priority of the adapter used for the submission
    pub priority: i64,
    pub mpi_procs: u32,
    pub omp_threads: u32,
    pub num_cores: u32,
    pub submitted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_from_yaml() {
        let req: JobRequest = serde_yaml::from_str(
            "name: scf\nworkdir: run/scf\nexecutable: abinit\nexec_args: run.abi\nstdout: run.log",
        )
        .unwrap();
        assert_eq!(req.exec_args, vec!["run.abi"]);
        assert!(!req.locked);
        assert_eq!(req.job_file(), PathBuf::from("run/scf/job.sh"));
        assert_eq!(req.qerr_path(), PathBuf::from("run/scf/queue.qerr"));
    }

    #[test]
    fn test_rebase_keeps_redirections() {
        let mut req = JobRequest::new("a", "work", "abinit").with_stdout("out.log");
        req.autoparal = Some(PathBuf::from("/abs/dry.abo"));
        req.rebase(Path::new("/base"));
        assert_eq!(req.workdir, PathBuf::from("/base/work"));
        assert_eq!(req.autoparal, Some(PathBuf::from("/abs/dry.abo")));
        assert_eq!(req.stdout, Some(PathBuf::from("out.log")));

        req.rebase(Path::new("/other"));
        assert_eq!(req.workdir, PathBuf::from("/base/work"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = serde_yaml::from_str::<JobRequest>("name: a\nworkdir: w\nexecutable: x\nqueue: debug");
        assert!(err.is_err());
    }
}
