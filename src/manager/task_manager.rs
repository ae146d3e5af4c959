//! Loading, selection, submission and escalation

use super::policy::{Precedence, TaskPolicy};
use crate::config::yaml::from_document;
use crate::config::{locate, Lookup, MANAGER_FILE};
use crate::error::{AbiQueueError, IoResultExt, Result};
use crate::job::{JobRequest, SubmittedJob};
use crate::paral::{ParalConf, ParalHints};
use crate::qadapter::{backend_for, Allocation, QueueAdapter, QueueAdapterSpec, QueueBackend, QueueType};
use crate::units::Memory;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Minimal manager for a laptop with the shell engine
pub const SIMPLE_MANAGER: &str = r#"qadapters:
    # List of qadapters objects
    - priority: 1
      queue:
            qtype: shell       # We are using the shell to "submit" jobs
            qname: localhost
      job:
        mpi_runner: mpirun
        pre_run:
            # Shell commands executed before running the executable
            - export PATH=$HOME/abinit/_build/src/98_main:$PATH
      limits:
            timelimit: 1:00:00
            max_cores: 2
      hardware:
            num_nodes: 1
            sockets_per_node: 1
            cores_per_socket: 2
            mem_per_node: 4 GB
"#;

/// Top-level layout of `manager.yml`. Other keys only hold YAML anchors.
#[derive(Debug, Deserialize, Serialize)]
struct ManagerFile {
    #[serde(default)]
    policy: Option<TaskPolicy>,
    qadapters: Vec<QueueAdapterSpec>,
}

/// Qadapters sorted by priority, the selected one and the task policy
#[derive(Debug, Clone)]
pub struct TaskManager {
    policy: TaskPolicy,
    specs: Vec<QueueAdapterSpec>,
    qads: Vec<QueueAdapter>,
    qadpos: usize,
}

impl TaskManager {
    /// Build the manager. Disabled adapters and adapters with priority 0
    /// are skipped.
    pub fn new(policy: TaskPolicy, specs: Vec<QueueAdapterSpec>) -> Result<Self> {
        policy.validate()?;

        let mut qads = Vec::with_capacity(specs.len());
        for spec in &specs {
            if !spec.enabled {
                tracing::debug!("Skipping disabled qadapter with priority {}", spec.priority);
                continue;
            }
            match spec.priority {
                p if p < 0 => {
                    return Err(AbiQueueError::config(format!(
                        "qadapter cannot have negative priority: {}",
                        p
                    )))
                }
                0 => continue,
                _ => qads.push(QueueAdapter::from_spec(spec.clone())?),
            }
        }

        if qads.is_empty() {
            return Err(AbiQueueError::config("Received empty list of qadapters"));
        }

        qads.sort_by_key(|q| q.priority());
        if qads.windows(2).any(|w| w[0].priority() == w[1].priority()) {
            return Err(AbiQueueError::config(
                "Two or more qadapters have same priority. Check manager.yml",
            ));
        }

        Ok(Self {
            policy,
            specs,
            qads,
            qadpos: 0,
        })
    }

    /// Read `manager.yml`
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).with_path(path)?;
        Self::from_yaml(&text, &path.display().to_string())
            .map_err(|e| e.with_context(format!("reading manager from {}", path.display())))
    }

    fn from_yaml(text: &str, origin: &str) -> Result<Self> {
        let file: ManagerFile = from_document(text, origin)?;
        Self::new(file.policy.unwrap_or_default(), file.qadapters)
    }

    /// Look for `manager.yml` in the working directory, then in the user
    /// configuration directory
    pub fn from_user_config() -> Result<Self> {
        Self::from_lookup(locate(MANAGER_FILE))
    }

    pub(crate) fn from_lookup(lookup: Lookup) -> Result<Self> {
        match lookup.found {
            Some(path) => Self::from_file(path),
            None => Err(AbiQueueError::MissingConfig {
                filename: MANAGER_FILE.to_string(),
                searched: lookup.user_path,
                example: SIMPLE_MANAGER.to_string(),
            }),
        }
    }

    /// A path to a manager file, a YAML string, or the user configuration
    /// when `None`
    pub fn as_manager(obj: Option<&str>) -> Result<Self> {
        match obj {
            None => Self::from_user_config(),
            Some(s) if Path::new(s).is_file() => Self::from_file(s),
            Some(s) => s.parse(),
        }
    }

    pub fn policy(&self) -> &TaskPolicy {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut TaskPolicy {
        &mut self.policy
    }

    /// Adapters sorted by priority, highest first
    pub fn qads(&self) -> &[QueueAdapter] {
        &self.qads
    }

    /// The adapter used to submit jobs
    pub fn qadapter(&self) -> &QueueAdapter {
        &self.qads[self.qadpos]
    }

    pub fn qadapter_mut(&mut self) -> &mut QueueAdapter {
        &mut self.qads[self.qadpos]
    }

    /// Index of the selected adapter in `qads`
    pub fn qadpos(&self) -> usize {
        self.qadpos
    }

    pub fn has_queue(&self) -> bool {
        self.qadapter().qtype().is_queue()
    }

    pub fn has_omp(&self) -> bool {
        self.qadapter().has_omp()
    }

    pub fn num_cores(&self) -> u32 {
        self.qadapter().num_cores()
    }

    pub fn mpi_procs(&self) -> u32 {
        self.qadapter().mpi_procs()
    }

    pub fn omp_threads(&self) -> u32 {
        self.qadapter().omp_threads()
    }

    pub fn mem_per_proc(&self) -> Memory {
        self.qadapter().mem_per_proc()
    }

    /// Largest core count any adapter accepts, used to bound autoparal
    pub fn max_cores(&self) -> u32 {
        self.qads.iter().map(QueueAdapter::hint_cores).max().unwrap_or(0)
    }

    pub fn set_mpi_procs(&mut self, mpi_procs: u32) {
        self.qadapter_mut().set_mpi_procs(mpi_procs);
    }

    pub fn set_omp_threads(&mut self, omp_threads: u32) {
        self.qadapter_mut().set_omp_threads(omp_threads);
    }

    pub fn set_mem_per_proc(&mut self, mem: Memory) -> Result<()> {
        self.qadapter_mut().set_mem_per_proc(mem)
    }

    /// Choose the adapter and the configuration for a run and apply the
    /// configuration to the adapter
    pub fn select_qadapter(&mut self, hints: &ParalHints) -> Result<ParalConf> {
        let pconfs = hints.get_ordered_with_policy(&self.policy, self.max_cores())?;

        let choice = match self.policy.precedence {
            Precedence::Qadapter => self.qads.iter().enumerate().find_map(|(pos, qad)| {
                let possible: Vec<&ParalConf> = pconfs.iter().filter(|pc| qad.can_run_pconf(pc)).collect();
                let preferred = if qad.allocation() == Allocation::Nodes {
                    possible.iter().find(|pc| fills_nodes(qad, pc)).copied()
                } else {
                    None
                };
                preferred.or_else(|| possible.first().copied()).map(|pc| (pos, pc.clone()))
            }),
            Precedence::AutoparalConf => pconfs.iter().find_map(|pconf| {
                self.qads
                    .iter()
                    .position(|qad| {
                        if qad.allocation() == Allocation::Nodes && !fills_nodes(qad, pconf) {
                            return false;
                        }
                        qad.can_run_pconf(pconf)
                    })
                    .map(|pos| (pos, pconf.clone()))
            }),
        };

        let (pos, pconf) = choice.ok_or(AbiQueueError::NoQadapter)?;
        self.use_qadpos_pconf(pos, &pconf);
        tracing::info!(
            "Selected qadapter {} ({}) with {}",
            self.qadapter().priority(),
            self.qadapter().qtype(),
            pconf
        );
        Ok(pconf)
    }

    fn use_qadpos_pconf(&mut self, pos: usize, pconf: &ParalConf) {
        self.qadpos = pos;
        self.set_mpi_procs(pconf.mpi_procs());
        if self.has_omp() {
            self.set_omp_threads(pconf.omp_threads());
        }
    }

    /// Same configuration with every adapter turned into a shell adapter
    /// running `mpi_procs` processes.
    ///
    /// When the file declares shell adapters only those are kept.
    pub fn to_shell_manager(&self, mpi_procs: u32) -> Result<Self> {
        let mut specs = self.specs.clone();
        if specs.iter().any(|s| s.queue.qtype == QueueType::Shell) {
            specs.retain(|s| s.queue.qtype == QueueType::Shell);
        }

        for spec in &mut specs {
            spec.queue.qtype = QueueType::Shell;
            spec.queue.qparams.clear();
            spec.queue.qverbatim = None;
            spec.limits.min_cores = mpi_procs;
            spec.limits.max_cores = mpi_procs;
            spec.limits.hint_cores = None;
            spec.job.use_shell_runner();
        }

        let policy = TaskPolicy {
            autoparal: 0,
            ..self.policy.clone()
        };
        let mut new = Self::new(policy, specs)?;
        new.set_mpi_procs(mpi_procs);
        Ok(new)
    }

    /// Copy with autoparal disabled and a fixed layout on every adapter
    pub fn new_with_fixed_mpi_omp(&self, mpi_procs: u32, omp_threads: u32) -> Self {
        let mut new = self.clone();
        new.policy.autoparal = 0;
        new.set_mpi_procs(mpi_procs);
        new.set_omp_threads(omp_threads);
        for qad in &mut new.qads {
            qad.fix_cores(mpi_procs.saturating_mul(omp_threads));
        }
        new
    }

    /// Copy configured for `req`: the fixed layout of the request if any,
    /// then the autoparal hints it points to
    pub fn for_request(&self, req: &JobRequest) -> Result<Self> {
        let mut manager = match (req.mpi_procs, req.omp_threads) {
            (None, None) => self.clone(),
            (mpi, omp) => self.new_with_fixed_mpi_omp(mpi.unwrap_or(1), omp.unwrap_or(1)),
        };
        manager.select_for(req)?;
        Ok(manager)
    }

    /// Run the adapter selection on the hints of `req` when autoparal is on
    pub fn select_for(&mut self, req: &JobRequest) -> Result<Option<ParalConf>> {
        match &req.autoparal {
            Some(path) if self.policy.uses_autoparal() => {
                let hints = ParalHints::parse_file(path)?;
                self.select_qadapter(&hints).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Write the submission script of `req`, executable by the owner
    pub fn write_jobfile(&self, req: &JobRequest) -> Result<PathBuf> {
        fs::create_dir_all(&req.workdir).with_path(&req.workdir)?;
        let mut req = req.clone();
        req.workdir = fs::canonicalize(&req.workdir).with_path(&req.workdir)?;

        let script = self.qadapter().get_script_str(&req);
        let path = req.job_file();
        fs::write(&path, script).with_path(&path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o740)).with_path(&path)?;
        }

        tracing::debug!("Wrote {}", path.display());
        Ok(path)
    }

    /// Submit `req` with the backend of the selected adapter
    pub fn launch(&mut self, req: &JobRequest) -> Result<SubmittedJob> {
        let backend = backend_for(self.qadapter().qtype());
        self.launch_with(req, backend.as_ref())
    }

    /// Write the script of `req` and submit it through `backend`
    pub fn launch_with(&mut self, req: &JobRequest, backend: &dyn QueueBackend) -> Result<SubmittedJob> {
        if req.locked {
            return Err(AbiQueueError::LockedJob(req.name.clone()));
        }
        self.qadapter().check_launch()?;

        let mut req = req.clone();
        if req.pass_timelimit {
            req.exec_args.push("--timelimit".to_string());
            req.exec_args.push(self.qadapter().timelimit().to_slurm());
        }

        let script = self.write_jobfile(&req)?;
        let qjob = backend
            .submit(&script)
            .map_err(|e| e.with_context(format!("submitting {}", req.name)))?;

        let qad = self.qadapter_mut();
        qad.record_launch()?;

        Ok(SubmittedJob {
            name: req.name.clone(),
            qtype: qjob.qtype,
            qid: qjob.qid,
            script,
            priority: qad.priority(),
            mpi_procs: qad.mpi_procs(),
            omp_threads: qad.omp_threads(),
            num_cores: qad.num_cores(),
            submitted_at: Utc::now(),
        })
    }

    /// Cancel a job of the selected adapter
    pub fn cancel(&self, qid: &str) -> Result<()> {
        backend_for(self.qadapter().qtype()).cancel(qid)
    }

    /// Jobs of `username` in the queue, `None` when the engine cannot tell
    pub fn njobs_in_queue(&self, username: Option<&str>) -> Result<Option<usize>> {
        backend_for(self.qadapter().qtype()).njobs_in_queue(username)
    }

    fn escalate<T>(&mut self, what: &str, op: impl FnOnce(&mut QueueAdapter) -> Result<T>) -> Result<T> {
        op(self.qadapter_mut()).map_err(|e| {
            tracing::warn!("Cannot {}: {}", what, e);
            AbiQueueError::ManagerIncrease(what.to_string())
        })
    }

    pub fn increase_mem(&mut self) -> Result<Memory> {
        self.escalate("increase mem", QueueAdapter::more_mem_per_proc)
    }

    pub fn increase_ncpus(&mut self) -> Result<u32> {
        self.escalate("increase ncpu", QueueAdapter::more_cores)
    }

    /// More cores if possible, otherwise more memory
    pub fn increase_resources(&mut self) -> Result<()> {
        if self.qadapter_mut().more_cores().is_ok() {
            return Ok(());
        }
        self.escalate("increase resources", |qad| qad.more_mem_per_proc().map(|_| ()))
    }

    pub fn exclude_nodes<S: AsRef<str>>(&mut self, nodes: &[S]) -> Result<()> {
        self.escalate("exclude nodes", |qad| qad.exclude_nodes(nodes))
    }

    pub fn increase_time(&mut self) -> Result<()> {
        self.escalate("increase time", |qad| qad.more_time().map(|_| ()))
    }

    /// Machine-readable description of the manager
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::json!({
            "policy": serde_json::to_value(&self.policy)?,
            "selected": self.qadpos,
            "qadapters": serde_json::to_value(&self.qads)?,
        }))
    }
}

fn fills_nodes(qad: &QueueAdapter, pconf: &ParalConf) -> bool {
    pconf.num_cores() % qad.hardware().cores_per_node() == 0
}

impl FromStr for TaskManager {
    type Err = AbiQueueError;

    /// Parse the YAML text of a manager file
    fn from_str(s: &str) -> Result<Self> {
        Self::from_yaml(s, "<string>")
    }
}

impl fmt::Display for TaskManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, qad) in self.qads.iter().enumerate() {
            writeln!(f, "[Qadapter {}]\n{}", i, qad)?;
        }
        write!(f, "Qadapter selected: {}", self.qadpos)
    }
}
