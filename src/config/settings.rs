//! Command line arguments

use crate::error::Result;
use crate::job::JobRequest;
use crate::manager::TaskManager;
use crate::scheduler::SchedulerConfig;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// abiqueue - Submit ab-initio jobs through shell, Slurm and PBS Pro
#[derive(Parser, Debug, Clone)]
#[command(name = "abiqueue")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Submit ab-initio jobs through shell, Slurm and PBS Pro queues")]
#[command(long_about = r#"
abiqueue reads a task manager (manager.yml) describing the queues available
on a machine, picks the adapter able to run a job, writes the submission
script and hands it to the queue. A scheduler (scheduler.yml) submits a list
of jobs a few at a time.

Configuration files are looked for in the working directory, then in
~/.abinit/abipy (override with ABIQUEUE_CONFIG_DIR).

Examples:
  abiqueue check                                # Validate the configuration
  abiqueue doc manager                          # Document manager.yml
  abiqueue select --hints run.abo               # Choose a parallel configuration
  abiqueue script --workdir w0 abinit run.abi   # Print the submission script
  abiqueue submit --workdir w0 --mpi-procs 4 abinit run.abi
  abiqueue run --jobs jobs.yml                  # Submit a list of jobs
"#)]
pub struct CliArgs {
    /// Manager file or YAML string (default: manager.yml)
    #[arg(short = 'm', long, global = true, value_name = "PATH")]
    pub manager: Option<String>,

    /// Scheduler file (default: scheduler.yml)
    #[arg(short = 's', long, global = true, value_name = "PATH")]
    pub scheduler: Option<PathBuf>,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

impl CliArgs {
    /// Task manager named by `--manager`, or the user configuration
    pub fn load_manager(&self) -> Result<TaskManager> {
        TaskManager::as_manager(self.manager.as_deref())
    }

    /// Scheduler named by `--scheduler`, or the user configuration
    pub fn load_scheduler(&self) -> Result<SchedulerConfig> {
        match &self.scheduler {
            Some(path) => SchedulerConfig::from_file(path),
            None => SchedulerConfig::from_user_config(),
        }
    }
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Validate manager.yml and scheduler.yml and the environment
    #[command(name = "check")]
    Check,

    /// Document the configuration files
    #[command(name = "doc")]
    Doc {
        /// Section to document
        #[arg(value_enum)]
        topic: DocTopic,
    },

    /// Write a manager.yml running jobs on this machine
    #[command(name = "init")]
    Init {
        /// Target directory (default: user configuration directory)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show the queue adapters of the manager
    #[command(name = "show")]
    Show {
        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Select an adapter and a parallel configuration from autoparal hints
    #[command(name = "select")]
    Select {
        /// Output file of the autoparal run
        #[arg(long, value_name = "FILE")]
        hints: PathBuf,
    },

    /// Print the submission script of a job
    #[command(name = "script")]
    Script(JobArgs),

    /// Submit a job
    #[command(name = "submit")]
    Submit(JobArgs),

    /// Submit the jobs of a list, a few at a time
    #[command(name = "run")]
    Run {
        /// YAML file with a `jobs` list
        #[arg(long, value_name = "FILE")]
        jobs: PathBuf,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Number of jobs in the queue
    #[command(name = "queue")]
    Queue {
        /// Owner of the jobs (default: current user)
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Cancel a job
    #[command(name = "cancel")]
    Cancel {
        /// Queue identifier
        qid: String,
    },
}

/// Sections documented by `abiqueue doc`
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocTopic {
    /// Layout of manager.yml
    Manager,
    /// Keys of scheduler.yml
    Scheduler,
    /// Keys of one queue adapter
    Qadapter,
    /// Keys of the task policy
    Policy,
}

/// Description of a single job on the command line
#[derive(Args, Debug, Clone)]
pub struct JobArgs {
    /// Executable to run
    #[arg(value_name = "EXECUTABLE")]
    pub executable: String,

    /// Arguments passed to the executable
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Working directory of the job
    #[arg(short, long, default_value = ".", value_name = "DIR")]
    pub workdir: PathBuf,

    /// Job name (default: name of the working directory)
    #[arg(long)]
    pub name: Option<String>,

    /// File connected to standard input
    #[arg(long, value_name = "PATH")]
    pub stdin: Option<PathBuf>,

    /// File receiving standard output
    #[arg(long, value_name = "PATH")]
    pub stdout: Option<PathBuf>,

    /// File receiving standard error
    #[arg(long, value_name = "PATH")]
    pub stderr: Option<PathBuf>,

    /// Fixed number of MPI processes
    #[arg(long, value_name = "NUM")]
    pub mpi_procs: Option<u32>,

    /// Fixed number of OpenMP threads
    #[arg(long, value_name = "NUM")]
    pub omp_threads: Option<u32>,

    /// Autoparal output used to select the parallel configuration
    #[arg(long, value_name = "FILE")]
    pub hints: Option<PathBuf>,

    /// Pass the time limit to the executable
    #[arg(long)]
    pub pass_timelimit: bool,
}

impl JobArgs {
    pub fn to_request(&self) -> JobRequest {
        let name = self.name.clone().unwrap_or_else(|| {
            std::fs::canonicalize(&self.workdir)
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .unwrap_or_else(|| "job".to_string())
        });

        let mut req = JobRequest::new(name, &self.workdir, &self.executable).with_args(&self.args);
        req.stdin = self.stdin.clone();
        req.stdout = self.stdout.clone();
        req.stderr = self.stderr.clone();
        req.mpi_procs = self.mpi_procs;
        req.omp_threads = self.omp_threads;
        req.autoparal = self.hints.clone();
        req.pass_timelimit = self.pass_timelimit;
        req
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_submit_args() {
        let args = CliArgs::parse_from([
            "abiqueue", "-v", "submit", "--workdir", "/tmp/w0", "--mpi-procs", "4", "abinit", "run.abi", "--dry",
        ]);
        assert_eq!(args.verbose, 1);
        let Commands::Submit(job) = args.command else {
            panic!("expected submit");
        };
        let req = job.to_request();
        assert_eq!(req.executable, "abinit");
        assert_eq!(req.exec_args, vec!["run.abi", "--dry"]);
        assert_eq!(req.mpi_procs, Some(4));
        assert_eq!(req.workdir, PathBuf::from("/tmp/w0"));
    }

    #[test]
    fn test_global_manager_option() {
        let args = CliArgs::parse_from(["abiqueue", "show", "--json", "--manager", "m.yml"]);
        assert_eq!(args.manager.as_deref(), Some("m.yml"));
        assert!(matches!(args.command, Commands::Show { json: true }));

        let args = CliArgs::parse_from(["abiqueue", "doc", "policy"]);
        assert!(matches!(args.command, Commands::Doc { topic: DocTopic::Policy }));
    }
}
