//! Queue engine integration
//!
//! Each backend submits job scripts, cancels jobs and queries their state
//! through the command line tools of its engine. Output parsing is kept in
//! free functions so it can be tested without a cluster.

use super::queue::QueueType;
use crate::error::{AbiQueueError, Result};
use crate::job::{JobStatus, QERR_FILE, QOUT_FILE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs::File;
use std::path::Path;
use std::process::{Child, Command, Output, Stdio};
use std::sync::Mutex;

/// A job accepted by a queue engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueJob {
    pub qtype: QueueType,
    pub qid: String,
}

/// Operations offered by a queue engine
pub trait QueueBackend: Send + Sync {
    fn qtype(&self) -> QueueType;

    /// Submit the script and return the job identifier
    fn submit(&self, script: &Path) -> Result<QueueJob>;

    fn cancel(&self, qid: &str) -> Result<()>;

    /// Jobs of `username` (default: current user) in the queue, `None` if unknown
    fn njobs_in_queue(&self, username: Option<&str>) -> Result<Option<usize>>;

    fn status(&self, qid: &str) -> Result<JobStatus>;
}

/// Backend for a queue type
pub fn backend_for(qtype: QueueType) -> Box<dyn QueueBackend> {
    match qtype {
        QueueType::Shell => Box::new(ShellBackend::new()),
        QueueType::Slurm => Box::new(SlurmBackend),
        QueueType::PbsPro => Box::new(PbsProBackend),
    }
}

fn current_user() -> String {
    env::var("USER")
        .or_else(|_| env::var("LOGNAME"))
        .unwrap_or_default()
}

/// Run `cmd args` and return its output, failing on a non-zero exit status
fn run(cmd: &str, args: &[&str], cwd: Option<&Path>) -> Result<Output> {
    let mut command = Command::new(cmd);
    command.args(args);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }
    tracing::debug!("Running {} {}", cmd, args.join(" "));

    let output = command
        .output()
        .map_err(|e| AbiQueueError::queue_command(cmd, e.to_string()))?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(AbiQueueError::queue_command(
            format!("{} {}", cmd, args.join(" ")),
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ))
    }
}

fn script_str(script: &Path) -> Result<&str> {
    script
        .to_str()
        .ok_or_else(|| AbiQueueError::config(format!("non UTF-8 script path {}", script.display())))
}

// Shell

/// Runs scripts with `bash` in the background on the local machine
#[derive(Debug, Default)]
pub struct ShellBackend {
    children: Mutex<HashMap<String, Child>>,
}

impl ShellBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueueBackend for ShellBackend {
    fn qtype(&self) -> QueueType {
        QueueType::Shell
    }

    fn submit(&self, script: &Path) -> Result<QueueJob> {
        let workdir = script.parent().unwrap_or_else(|| Path::new("."));
        let create = |name: &str| {
            let path = workdir.join(name);
            File::create(&path).map_err(|e| AbiQueueError::io(path, e))
        };
        let qout = create(QOUT_FILE)?;
        let qerr = create(QERR_FILE)?;

        let child = Command::new("bash")
            .arg(script)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(qout)
            .stderr(qerr)
            .spawn()
            .map_err(|e| AbiQueueError::queue_command("bash", e.to_string()))?;

        let qid = child.id().to_string();
        tracing::info!("Started {} with pid {}", script.display(), qid);
        self.children
            .lock()
            .map_err(|_| AbiQueueError::queue_command("bash", "process table poisoned"))?
            .insert(qid.clone(), child);

        Ok(QueueJob {
            qtype: QueueType::Shell,
            qid,
        })
    }

    fn cancel(&self, qid: &str) -> Result<()> {
        let mut children = self
            .children
            .lock()
            .map_err(|_| AbiQueueError::queue_command("kill", "process table poisoned"))?;
        match children.get_mut(qid) {
            Some(child) => child
                .kill()
                .map_err(|e| AbiQueueError::queue_command("kill", e.to_string())),
            None => run("kill", &[qid], None).map(|_| ()),
        }
    }

    fn njobs_in_queue(&self, _username: Option<&str>) -> Result<Option<usize>> {
        let mut children = self
            .children
            .lock()
            .map_err(|_| AbiQueueError::queue_command("ps", "process table poisoned"))?;
        let mut running = 0;
        for child in children.values_mut() {
            if let Ok(None) = child.try_wait() {
                running += 1;
            }
        }
        Ok(Some(running))
    }

    /// Exited processes are reaped: their final status is reported once,
    /// then the pid is unknown
    fn status(&self, qid: &str) -> Result<JobStatus> {
        let mut children = self
            .children
            .lock()
            .map_err(|_| AbiQueueError::queue_command("ps", "process table poisoned"))?;
        let Some(child) = children.get_mut(qid) else {
            return Ok(JobStatus::Unknown);
        };
        let status = match child.try_wait() {
            Ok(None) => return Ok(JobStatus::Running),
            Ok(Some(status)) if status.success() => JobStatus::Completed,
            Ok(Some(status)) if status.code().is_none() => JobStatus::Cancelled,
            Ok(Some(_)) => JobStatus::Failed,
            Err(_) => return Ok(JobStatus::Unknown),
        };
        children.remove(qid);
        Ok(status)
    }
}

// Slurm

/// Slurm through `sbatch`, `scancel`, `squeue` and `sacct`
#[derive(Debug, Default, Clone, Copy)]
pub struct SlurmBackend;

/// Job id from `Submitted batch job 12345`
pub fn parse_sbatch_output(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .find(|line| line.contains("Submitted batch job"))
        .and_then(|line| line.split_whitespace().last())
        .filter(|id| id.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

/// Map a Slurm state name (squeue `%T` or sacct `State`) to a status
pub fn parse_slurm_state(state: &str) -> JobStatus {
    // sacct prints "CANCELLED by 1234"
    let state = state.split_whitespace().next().unwrap_or("").to_uppercase();
    match state.trim_end_matches('+') {
        "PENDING" | "CONFIGURING" | "REQUEUED" | "SUSPENDED" => JobStatus::Pending,
        "RUNNING" | "COMPLETING" => JobStatus::Running,
        "COMPLETED" => JobStatus::Completed,
        "FAILED" | "TIMEOUT" | "NODE_FAIL" | "OUT_OF_MEMORY" | "BOOT_FAIL" => JobStatus::Failed,
        "CANCELLED" | "PREEMPTED" => JobStatus::Cancelled,
        _ => JobStatus::Unknown,
    }
}

/// Number of non-empty lines (one job id per line)
pub fn count_job_lines(stdout: &str) -> usize {
    stdout.lines().filter(|l| !l.trim().is_empty()).count()
}

impl QueueBackend for SlurmBackend {
    fn qtype(&self) -> QueueType {
        QueueType::Slurm
    }

    fn submit(&self, script: &Path) -> Result<QueueJob> {
        let output = run("sbatch", &[script_str(script)?], script.parent())?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let qid = parse_sbatch_output(&stdout)
            .ok_or_else(|| AbiQueueError::queue_command("sbatch", format!("unexpected output: {}", stdout.trim())))?;
        tracing::info!("Submitted {} to slurm with id {}", script.display(), qid);
        Ok(QueueJob {
            qtype: QueueType::Slurm,
            qid,
        })
    }

    fn cancel(&self, qid: &str) -> Result<()> {
        run("scancel", &[qid], None).map(|_| ())
    }

    fn njobs_in_queue(&self, username: Option<&str>) -> Result<Option<usize>> {
        let user = username.map(str::to_string).unwrap_or_else(current_user);
        match run("squeue", &["-o", "%i", "-h", "-u", &user], None) {
            Ok(output) => Ok(Some(count_job_lines(&String::from_utf8_lossy(&output.stdout)))),
            Err(e) => {
                tracing::warn!("Cannot count jobs in queue: {}", e);
                Ok(None)
            }
        }
    }

    fn status(&self, qid: &str) -> Result<JobStatus> {
        if let Ok(output) = run("squeue", &["-j", qid, "-h", "-o", "%T"], None) {
            let state = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !state.is_empty() {
                return Ok(parse_slurm_state(&state));
            }
        }

        // Finished jobs leave squeue, sacct still knows them.
        let output = run("sacct", &["-j", qid, "-n", "-X", "-o", "State"], None)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(parse_slurm_state)
            .unwrap_or(JobStatus::Unknown))
    }
}

// PBS Pro

/// PBS Pro through `qsub`, `qdel` and `qstat`
#[derive(Debug, Default, Clone, Copy)]
pub struct PbsProBackend;

/// Numeric job id from `12345.server`
pub fn parse_qsub_output(stdout: &str) -> Option<String> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let id = line.split('.').next()?;
    (!id.is_empty() && id.chars().all(|c| c.is_ascii_digit())).then(|| id.to_string())
}

/// Status from the state column of `qstat <id>`
pub fn parse_pbs_qstat(stdout: &str) -> JobStatus {
    for line in stdout.lines().skip(2) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() >= 5 {
            return match fields[4] {
                "Q" | "W" | "H" | "T" => JobStatus::Pending,
                "R" | "E" | "B" => JobStatus::Running,
                "F" | "C" => JobStatus::Completed,
                _ => JobStatus::Unknown,
            };
        }
    }
    JobStatus::Unknown
}

/// Jobs of `username` in the output of `qstat -a -u <username>`
pub fn count_pbs_jobs(stdout: &str, username: &str) -> usize {
    stdout
        .lines()
        .filter(|line| line.split_whitespace().nth(1) == Some(username))
        .count()
}

impl QueueBackend for PbsProBackend {
    fn qtype(&self) -> QueueType {
        QueueType::PbsPro
    }

    fn submit(&self, script: &Path) -> Result<QueueJob> {
        let output = run("qsub", &[script_str(script)?], script.parent())?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let qid = parse_qsub_output(&stdout)
            .ok_or_else(|| AbiQueueError::queue_command("qsub", format!("unexpected output: {}", stdout.trim())))?;
        tracing::info!("Submitted {} to PBS with id {}", script.display(), qid);
        Ok(QueueJob {
            qtype: QueueType::PbsPro,
            qid,
        })
    }

    fn cancel(&self, qid: &str) -> Result<()> {
        run("qdel", &[qid], None).map(|_| ())
    }

    fn njobs_in_queue(&self, username: Option<&str>) -> Result<Option<usize>> {
        let user = username.map(str::to_string).unwrap_or_else(current_user);
        match run("qstat", &["-a", "-u", &user], None) {
            Ok(output) => Ok(Some(count_pbs_jobs(&String::from_utf8_lossy(&output.stdout), &user))),
            Err(e) => {
                tracing::warn!("Cannot count jobs in queue: {}", e);
                Ok(None)
            }
        }
    }

    fn status(&self, qid: &str) -> Result<JobStatus> {
        // qstat without -x forgets finished jobs
        match run("qstat", &["-x", qid], None) {
            Ok(output) => Ok(parse_pbs_qstat(&String::from_utf8_lossy(&output.stdout))),
            Err(_) => Ok(JobStatus::Unknown),
        }
    }
}
