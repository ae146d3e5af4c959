//! Queue adapter: validated configuration plus the resources of the next launch

use super::hardware::Hardware;
use super::job::{JobSection, Redirects};
use super::limits::{Allocation, Limits};
use super::queue::{QueueSection, QueueType};
use super::script::{render_header, ScriptEditor};
use crate::condition::Condition;
use crate::config::yaml::bool_like;
use crate::error::{AbiQueueError, Result};
use crate::job::JobRequest;
use crate::paral::ParalConf;
use crate::units::{Memory, TimeLimit};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Memory added by each call to `more_mem_per_proc`, in megabytes
const MEM_INCREMENT_MB: f64 = 2000.0;

fn default_enabled() -> bool {
    true
}

/// One entry of the `qadapters` list, as written in `manager.yml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueAdapterSpec {
    /// 1 is the highest priority, 0 disables the adapter
    pub priority: i64,
    #[serde(default = "default_enabled", deserialize_with = "bool_like")]
    pub enabled: bool,
    pub queue: QueueSection,
    #[serde(default)]
    pub job: JobSection,
    pub limits: Limits,
    pub hardware: Hardware,
}

/// A validated qadapter.
///
/// Besides the static configuration it tracks the layout chosen for the next
/// submission (MPI processes, OpenMP threads, memory, time limit) and how many
/// times it has been launched.
#[derive(Debug, Clone, Serialize)]
pub struct QueueAdapter {
    #[serde(flatten)]
    spec: QueueAdapterSpec,
    #[serde(skip)]
    qparams: Vec<(String, String)>,
    min_cores: u32,
    max_cores: u32,
    hint_cores: u32,
    timelimit_hard: TimeLimit,
    min_mem_per_proc: Memory,
    max_mem_per_proc: Memory,
    mpi_procs: u32,
    omp_threads: u32,
    mem_per_proc: Memory,
    timelimit: TimeLimit,
    num_launches: u32,
    excluded_nodes: Vec<String>,
}

impl QueueAdapter {
    /// Validate `spec` and derive the missing limits from the hardware
    pub fn from_spec(spec: QueueAdapterSpec) -> Result<Self> {
        let invalid = |msg: String| {
            AbiQueueError::config(format!(
                "qadapter with priority {} ({}): {}",
                spec.priority, spec.queue.qname, msg
            ))
        };

        spec.hardware.validate().map_err(|e| invalid(e.to_string()))?;
        let qparams = spec.queue.validated_params().map_err(&invalid)?;

        let hw = &spec.hardware;
        let limits = &spec.limits;

        let min_cores = limits.min_cores;
        let max_cores = limits.max_cores;
        let hint_cores = limits.hint_cores.unwrap_or(max_cores);
        let timelimit_hard = limits.timelimit_hard.unwrap_or(limits.timelimit);
        let min_mem_per_proc = limits.min_mem_per_proc.unwrap_or_else(|| hw.mem_per_core());
        let max_mem_per_proc = limits.max_mem_per_proc.unwrap_or(hw.mem_per_node);

        if min_cores < 1 {
            return Err(invalid(format!("min_cores {} must be >= 1", min_cores)));
        }
        if max_cores < min_cores {
            return Err(invalid(format!("max_cores {} < min_cores {}", max_cores, min_cores)));
        }
        if max_cores > hw.num_cores() {
            return Err(invalid(format!(
                "max_cores {} exceeds the {} cores of the partition",
                max_cores,
                hw.num_cores()
            )));
        }
        if hint_cores < min_cores || hint_cores > max_cores {
            return Err(invalid(format!(
                "hint_cores {} not in [min_cores {}, max_cores {}]",
                hint_cores, min_cores, max_cores
            )));
        }
        if limits.timelimit > timelimit_hard {
            return Err(invalid(format!(
                "timelimit {} > timelimit_hard {}",
                limits.timelimit.to_slurm(),
                timelimit_hard.to_slurm()
            )));
        }
        if min_mem_per_proc > max_mem_per_proc {
            return Err(invalid(format!(
                "min_mem_per_proc {} > max_mem_per_proc {}",
                min_mem_per_proc, max_mem_per_proc
            )));
        }
        if max_mem_per_proc > hw.mem_per_node {
            return Err(invalid(format!(
                "max_mem_per_proc {} > mem_per_node {}",
                max_mem_per_proc, hw.mem_per_node
            )));
        }

        let omp_threads = match spec.job.omp_env.get("OMP_NUM_THREADS") {
            Some(value) => value
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| invalid(format!("invalid OMP_NUM_THREADS '{}'", value)))?,
            None => 1,
        };
        if !hw.can_use_omp_threads(omp_threads) {
            return Err(invalid(format!(
                "OMP_NUM_THREADS {} exceeds the {} cores of a node",
                omp_threads,
                hw.cores_per_node()
            )));
        }

        let timelimit = limits.timelimit;
        Ok(Self {
            qparams,
            min_cores,
            max_cores,
            hint_cores,
            timelimit_hard,
            min_mem_per_proc,
            max_mem_per_proc,
            mpi_procs: min_cores,
            omp_threads,
            mem_per_proc: min_mem_per_proc,
            timelimit,
            num_launches: 0,
            excluded_nodes: Vec::new(),
            spec,
        })
    }

    fn limit_error(&self, message: impl Into<String>) -> AbiQueueError {
        AbiQueueError::QueueAdapterLimit {
            qname: self.spec.queue.qname.clone(),
            priority: self.spec.priority,
            message: message.into(),
        }
    }

    pub fn spec(&self) -> &QueueAdapterSpec {
        &self.spec
    }

    pub fn priority(&self) -> i64 {
        self.spec.priority
    }

    pub fn qtype(&self) -> QueueType {
        self.spec.queue.qtype
    }

    pub fn qname(&self) -> &str {
        &self.spec.queue.qname
    }

    pub fn hardware(&self) -> &Hardware {
        &self.spec.hardware
    }

    pub fn job(&self) -> &JobSection {
        &self.spec.job
    }

    pub fn allocation(&self) -> Allocation {
        self.spec.limits.allocation
    }

    pub fn condition(&self) -> &Condition {
        &self.spec.limits.condition
    }

    pub fn min_cores(&self) -> u32 {
        self.min_cores
    }

    pub fn max_cores(&self) -> u32 {
        self.max_cores
    }

    pub fn hint_cores(&self) -> u32 {
        self.hint_cores
    }

    pub fn min_mem_per_proc(&self) -> Memory {
        self.min_mem_per_proc
    }

    pub fn max_mem_per_proc(&self) -> Memory {
        self.max_mem_per_proc
    }

    pub fn timelimit(&self) -> TimeLimit {
        self.timelimit
    }

    pub fn timelimit_hard(&self) -> TimeLimit {
        self.timelimit_hard
    }

    pub fn max_num_launches(&self) -> u32 {
        self.spec.limits.max_num_launches
    }

    pub fn num_launches(&self) -> u32 {
        self.num_launches
    }

    pub fn excluded_nodes(&self) -> &[String] {
        &self.excluded_nodes
    }

    pub fn has_omp(&self) -> bool {
        self.spec.job.has_omp()
    }

    pub fn mpi_procs(&self) -> u32 {
        self.mpi_procs
    }

    pub fn omp_threads(&self) -> u32 {
        self.omp_threads
    }

    pub fn num_cores(&self) -> u32 {
        self.mpi_procs.saturating_mul(self.omp_threads)
    }

    pub fn mem_per_proc(&self) -> Memory {
        self.mem_per_proc
    }

    /// Whether this adapter could run `pconf` at all
    pub fn can_run_pconf(&self, pconf: &ParalConf) -> bool {
        let hw = &self.spec.hardware;
        let num_cores = pconf.num_cores();

        if num_cores < self.min_cores || num_cores > self.hint_cores {
            return false;
        }
        if !hw.can_use_omp_threads(pconf.omp_threads()) {
            return false;
        }
        if pconf.mem_per_proc() > hw.mem_per_node {
            return false;
        }
        if self.allocation() == Allocation::ForceNodes && num_cores % hw.cores_per_node() != 0 {
            return false;
        }
        self.spec.limits.condition.matches(pconf)
    }

    pub fn set_mpi_procs(&mut self, mpi_procs: u32) {
        self.mpi_procs = mpi_procs;
    }

    /// Set the OpenMP threads, exported as `OMP_NUM_THREADS`
    pub fn set_omp_threads(&mut self, omp_threads: u32) {
        self.omp_threads = omp_threads;
        self.spec
            .job
            .omp_env
            .set("OMP_NUM_THREADS", omp_threads.to_string());
    }

    pub fn set_mem_per_proc(&mut self, mem: Memory) -> Result<()> {
        if mem > self.max_mem_per_proc {
            return Err(self.limit_error(format!(
                "mem_per_proc {} > max_mem_per_proc {}",
                mem, self.max_mem_per_proc
            )));
        }
        self.mem_per_proc = mem;
        Ok(())
    }

    pub fn set_timelimit(&mut self, timelimit: TimeLimit) -> Result<()> {
        if timelimit > self.timelimit_hard {
            return Err(self.limit_error(format!(
                "timelimit {} > timelimit_hard {}",
                timelimit.to_slurm(),
                self.timelimit_hard.to_slurm()
            )));
        }
        self.timelimit = timelimit;
        Ok(())
    }

    /// Pin the number of cores, bypassing the limits of the file
    pub(crate) fn fix_cores(&mut self, num_cores: u32) {
        self.min_cores = num_cores;
        self.max_cores = num_cores;
        self.hint_cores = num_cores;
    }

    /// Raise `hint_cores`. Returns the new value.
    pub fn more_cores(&mut self) -> Result<u32> {
        if self.hint_cores >= self.max_cores {
            return Err(self.limit_error(format!("hint_cores reached max_cores {}", self.max_cores)));
        }
        let base = 4 * (self.max_cores / 40).max(1);
        self.hint_cores = self.hint_cores.saturating_add(base).min(self.max_cores);
        tracing::info!("qadapter {}: hint_cores -> {}", self.priority(), self.hint_cores);
        Ok(self.hint_cores)
    }

    /// Raise the memory per process. Returns the new value.
    pub fn more_mem_per_proc(&mut self) -> Result<Memory> {
        if self.mem_per_proc >= self.max_mem_per_proc {
            return Err(self.limit_error(format!(
                "mem_per_proc reached max_mem_per_proc {}",
                self.max_mem_per_proc
            )));
        }
        let mem = Memory::from_mb((self.mem_per_proc.mb() + MEM_INCREMENT_MB).min(self.max_mem_per_proc.mb()));
        self.set_mem_per_proc(mem)?;
        tracing::info!("qadapter {}: mem_per_proc -> {}", self.priority(), mem);
        Ok(mem)
    }

    /// Raise the time limit by a tenth of the hard limit. Returns the new value.
    pub fn more_time(&mut self) -> Result<TimeLimit> {
        if self.timelimit >= self.timelimit_hard {
            return Err(self.limit_error(format!(
                "timelimit reached timelimit_hard {}",
                self.timelimit_hard.to_slurm()
            )));
        }
        let hard = self.timelimit_hard.as_secs();
        let step = (hard / 10).max(1);
        let timelimit = TimeLimit::from_secs((self.timelimit.as_secs() + step).min(hard));
        self.set_timelimit(timelimit)?;
        tracing::info!("qadapter {}: timelimit -> {}", self.priority(), timelimit.to_slurm());
        Ok(timelimit)
    }

    /// Keep the next jobs away from `nodes`
    pub fn exclude_nodes<S: AsRef<str>>(&mut self, nodes: &[S]) -> Result<()> {
        if self.qtype() != QueueType::Slurm {
            return Err(self.limit_error(format!("the {} engine cannot exclude nodes", self.qtype())));
        }
        for node in nodes {
            let node = node.as_ref().trim();
            if !node.is_empty() && !self.excluded_nodes.iter().any(|n| n == node) {
                self.excluded_nodes.push(node.to_string());
            }
        }
        Ok(())
    }

    /// Fails once `max_num_launches` is reached
    pub fn check_launch(&self) -> Result<()> {
        if self.num_launches >= self.max_num_launches() {
            return Err(AbiQueueError::MaxNumLaunches {
                num_launches: self.num_launches,
                max_num_launches: self.max_num_launches(),
            });
        }
        Ok(())
    }

    /// Count a new launch, refusing once `max_num_launches` is reached
    pub fn record_launch(&mut self) -> Result<()> {
        self.check_launch()?;
        self.num_launches += 1;
        Ok(())
    }

    /// Nodes needed when the layout fills whole nodes
    fn whole_nodes(&self) -> Option<u32> {
        let (nodes, rest) = self.spec.hardware.divmod_node(self.mpi_procs, self.omp_threads);
        (self.allocation().whole_nodes() && rest == 0 && nodes > 0 && self.mpi_procs % nodes == 0)
            .then_some(nodes)
    }

    /// Header parameters: user `qparams` first, then the values computed from
    /// the current layout
    fn header_params(&self, req: &JobRequest) -> Vec<(String, String)> {
        let mut params = self.qparams.clone();
        let mut set = |k: &str, v: String| params.push((k.to_string(), v));

        let qout = req.qout_path().display().to_string();
        let qerr = req.qerr_path().display().to_string();
        let mem_mb = self.mem_per_proc.whole_mb();

        match self.qtype() {
            QueueType::Shell => {}
            QueueType::Slurm => {
                set("partition", self.qname().to_string());
                set("job_name", req.name.clone());
                match self.whole_nodes() {
                    Some(nodes) => {
                        set("nodes", nodes.to_string());
                        set("ntasks_per_node", (self.mpi_procs / nodes).to_string());
                    }
                    None => set("ntasks", self.mpi_procs.to_string()),
                }
                set("cpus_per_task", self.omp_threads.to_string());
                if mem_mb > 0 {
                    set("mem_per_cpu", mem_mb.to_string());
                }
                set("time", self.timelimit.to_slurm());
                if !self.excluded_nodes.is_empty() {
                    set("exclude", self.excluded_nodes.join(","));
                }
                set("output", qout);
                set("error", qerr);
            }
            QueueType::PbsPro => {
                set("queue", self.qname().to_string());
                set("job_name", req.name.clone());
                let select = match self.whole_nodes() {
                    Some(nodes) => {
                        let procs_per_node = self.mpi_procs / nodes;
                        format!(
                            "{}:ncpus={}:mpiprocs={}:ompthreads={}:mem={}mb",
                            nodes,
                            self.spec.hardware.cores_per_node(),
                            procs_per_node,
                            self.omp_threads,
                            mem_mb.saturating_mul(procs_per_node as u64)
                        )
                    }
                    None => format!(
                        "{}:ncpus={}:mpiprocs=1:ompthreads={}:mem={}mb",
                        self.mpi_procs, self.omp_threads, self.omp_threads, mem_mb
                    ),
                };
                set("select", select);
                set("walltime", self.timelimit.to_pbs());
                set("output", qout);
                set("error", qerr);
            }
        }
        params
    }

    /// The submission script running `req` with the current layout
    pub fn get_script_str(&self, req: &JobRequest) -> String {
        let header = render_header(
            self.qtype(),
            &self.header_params(req),
            self.spec.queue.qverbatim.as_deref(),
        );

        let job = &self.spec.job;
        let mut se = ScriptEditor::new();
        se.add_line(format!("cd {}", req.workdir.display()));

        if !job.setup.is_empty() {
            se.add_comment("Setup section");
            se.add_lines(job.setup.iter().cloned());
            se.add_emptyline();
        }

        if !job.modules.is_empty() {
            se.add_comment("Load Modules");
            se.add_line("module purge");
            se.load_modules(&job.modules);
            se.add_emptyline();
        }

        se.add_comment("OpenMp Environment");
        if job.has_omp() {
            se.declare_vars(&job.omp_env);
            se.add_emptyline();
        } else {
            se.declare_var("OMP_NUM_THREADS", "1");
        }

        if !job.shell_env.is_empty() {
            se.add_comment("Shell Environment");
            se.declare_vars(&job.shell_env);
            se.add_emptyline();
        }

        if !job.pre_run.is_empty() {
            se.add_comment("Commands before execution");
            se.add_lines(job.pre_run.iter().cloned());
            se.add_emptyline();
        }

        let stdin = req.stdin.as_ref().map(|p| p.display().to_string());
        let stdout = req.stdout.as_ref().map(|p| p.display().to_string());
        let stderr = req.stderr.as_ref().map(|p| p.display().to_string());
        let io = Redirects {
            stdin: stdin.as_deref(),
            stdout: stdout.as_deref(),
            stderr: stderr.as_deref(),
        };
        se.add_line(job.run_line(self.mpi_procs, &req.executable, &req.exec_args, io));

        if !job.post_run.is_empty() {
            se.add_emptyline();
            se.add_comment("Commands after execution");
            se.add_lines(job.post_run.iter().cloned());
        }

        format!("{}{}\n", header, se.script_str())
    }
}

impl fmt::Display for QueueAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hw = &self.spec.hardware;
        writeln!(
            f,
            "[{}] qname: {}, priority: {}",
            self.qtype(),
            if self.qname().is_empty() { "-" } else { self.qname() },
            self.priority()
        )?;
        writeln!(
            f,
            "  hardware: {} nodes x {} sockets x {} cores, {} per node",
            hw.num_nodes,
            hw.sockets_per_node,
            hw.cores_per_socket,
            hw.mem_per_node.human()
        )?;
        writeln!(
            f,
            "  cores: min {}, hint {}, max {}, allocation: {}",
            self.min_cores,
            self.hint_cores,
            self.max_cores,
            self.allocation()
        )?;
        write!(
            f,
            "  mpi_procs: {}, omp_threads: {}, mem_per_proc: {}, timelimit: {} (hard: {}), launches: {}/{}",
            self.mpi_procs,
            self.omp_threads,
            self.mem_per_proc,
            self.timelimit.to_slurm(),
            self.timelimit_hard.to_slurm(),
            self.num_launches,
            self.max_num_launches()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml::Value;

    const SLURM: &str = r#"
priority: 1
queue: {qtype: slurm, qname: main, qparams: {account: chem}}
job:
  mpi_runner: mpirun
  modules: [intel/2023]
  shell_env: {PATH: "/opt/abinit/bin:$PATH"}
  pre_run: "ulimit -s unlimited"
limits:
  timelimit: "1:00:00"
  timelimit_hard: "10:00:00"
  min_cores: 2
  max_cores: 48
  hint_cores: 40
  min_mem_per_proc: 1000
  max_mem_per_proc: 4000
hardware: {num_nodes: 2, sockets_per_node: 2, cores_per_socket: 12, mem_per_node: 96 GB}
"#;

    fn spec_with(section: &str, key: &str, value: &str) -> QueueAdapterSpec {
        let mut doc: Value = serde_yaml::from_str(SLURM).unwrap();
        doc[section][key] = serde_yaml::from_str(value).unwrap();
        serde_yaml::from_value(doc).unwrap()
    }

    fn adapter() -> QueueAdapter {
        QueueAdapter::from_spec(serde_yaml::from_str(SLURM).unwrap()).unwrap()
    }

    fn request() -> JobRequest {
        JobRequest::new("scf", "/tmp/run", "abinit")
            .with_stdin("run.abi")
            .with_stdout("run.log")
            .with_stderr("run.err")
    }

    #[test]
    fn test_initial_state() {
        let qad = adapter();
        assert!(qad.spec().enabled);
        assert_eq!(qad.mpi_procs(), 2);
        assert_eq!(qad.omp_threads(), 1);
        assert_eq!(qad.mem_per_proc().mb(), 1000.0);
        assert_eq!(qad.timelimit_hard().as_secs(), 36000);
        assert!(!qad.has_omp());
    }

    #[test]
    fn test_defaults_from_hardware() {
        let mut spec = spec_with("limits", "hint_cores", "~");
        spec.limits.min_mem_per_proc = None;
        spec.limits.max_mem_per_proc = None;
        spec.limits.timelimit_hard = None;
        let qad = QueueAdapter::from_spec(spec).unwrap();
        assert_eq!(qad.hint_cores(), 48);
        assert_eq!(qad.min_mem_per_proc().mb(), 4096.0);
        assert_eq!(qad.max_mem_per_proc().gb(), 96.0);
        assert_eq!(qad.timelimit_hard(), qad.timelimit());
    }

    #[test]
    fn test_validation_rejects_inconsistent_limits() {
        let cases = [
            ("limits", "min_cores", "0"),
            ("limits", "max_cores", "1"),
            ("limits", "max_cores", "49"),
            ("limits", "hint_cores", "50"),
            ("limits", "hint_cores", "1"),
            ("limits", "timelimit_hard", "'0:30:00'"),
            ("limits", "min_mem_per_proc", "5000"),
            ("limits", "max_mem_per_proc", "200 GB"),
            ("queue", "qname", "''"),
            ("job", "omp_env", "{OMP_NUM_THREADS: 64}"),
            ("job", "omp_env", "{OMP_NUM_THREADS: many}"),
        ];
        for (section, key, value) in cases {
            let err = QueueAdapter::from_spec(spec_with(section, key, value));
            let msg = err.expect_err(&format!("{}.{} = {} accepted", section, key, value)).to_string();
            assert!(msg.contains("priority 1 (main)") || msg.contains("priority 1 ()"), "{}", msg);
        }
    }

    #[test]
    fn test_can_run_pconf() {
        let mut qad = adapter();
        assert!(qad.can_run_pconf(&ParalConf::new(2, 1)));
        assert!(!qad.can_run_pconf(&ParalConf::new(1, 1)));
        assert!(!qad.can_run_pconf(&ParalConf::new(48, 1)));
        assert!(!qad.can_run_pconf(&ParalConf::new(1, 30)));
        assert!(!qad.can_run_pconf(&ParalConf::new(4, 1).with_mem_per_proc(Memory::from_gb(100.0))));

        qad.spec.limits.allocation = Allocation::ForceNodes;
        assert!(qad.can_run_pconf(&ParalConf::new(24, 1)));
        assert!(!qad.can_run_pconf(&ParalConf::new(12, 1)));

        qad.spec.limits.allocation = Allocation::Shared;
        qad.spec.limits.condition = Condition::parse("{num_cores: {$divisible: 4}}").unwrap();
        assert!(qad.can_run_pconf(&ParalConf::new(8, 1)));
        assert!(!qad.can_run_pconf(&ParalConf::new(6, 1)));
    }

    #[test]
    fn test_more_cores_is_clamped() {
        let mut qad = adapter();
        assert_eq!(qad.more_cores().unwrap(), 44);
        assert_eq!(qad.more_cores().unwrap(), 48);
        assert!(matches!(qad.more_cores(), Err(AbiQueueError::QueueAdapterLimit { priority: 1, .. })));
    }

    #[test]
    fn test_more_mem_is_clamped() {
        let mut qad = adapter();
        assert_eq!(qad.more_mem_per_proc().unwrap().mb(), 3000.0);
        assert_eq!(qad.more_mem_per_proc().unwrap().mb(), 4000.0);
        assert!(qad.more_mem_per_proc().is_err());
        assert!(qad.set_mem_per_proc(Memory::from_mb(4001.0)).is_err());
    }

    #[test]
    fn test_more_time_until_hard_limit() {
        let mut qad = adapter();
        let mut increments = 0;
        while qad.more_time().is_ok() {
            increments += 1;
        }
        assert_eq!(increments, 9);
        assert_eq!(qad.timelimit(), qad.timelimit_hard());
        assert!(qad.set_timelimit(TimeLimit::from_secs(36001)).is_err());
    }

    #[test]
    fn test_max_num_launches() {
        let mut qad = adapter();
        for _ in 0..5 {
            qad.record_launch().unwrap();
        }
        let err = qad.record_launch().unwrap_err();
        assert_eq!(err.to_string(), "num_launches 5 == max_num_launches 5");
    }

    #[test]
    fn test_slurm_script() {
        let mut qad = adapter();
        qad.set_mpi_procs(24);
        qad.exclude_nodes(&["node01", "node02", "node01"]).unwrap();
        let script = qad.get_script_str(&request());

        let expected_header = "#!/bin/bash\n\
            #SBATCH --partition=main\n\
            #SBATCH --job-name=scf\n\
            #SBATCH --ntasks=24\n\
            #SBATCH --cpus-per-task=1\n\
            #SBATCH --mem-per-cpu=1000\n\
            #SBATCH --time=0-01:00:00\n\
            #SBATCH --exclude=node01,node02\n\
            #SBATCH --account=chem\n\
            #SBATCH --output=/tmp/run/queue.qout\n\
            #SBATCH --error=/tmp/run/queue.qerr\n\
            cd /tmp/run\n";
        assert!(script.starts_with(expected_header), "{}", script);
        assert!(script.contains("module purge\nmodule load intel/2023 2>> mods.err\n"));
        assert!(script.contains("# OpenMp Environment\nexport OMP_NUM_THREADS=1\n"));
        assert!(script.contains("export PATH=/opt/abinit/bin:$PATH\n"));
        assert!(script.ends_with("ulimit -s unlimited\n\nmpirun -n 24 abinit < run.abi > run.log 2> run.err\n"));
    }

    #[test]
    fn test_slurm_whole_nodes() {
        let mut qad = QueueAdapter::from_spec(spec_with("limits", "allocation", "nodes")).unwrap();
        qad.set_mpi_procs(24);
        qad.set_omp_threads(2);
        let script = qad.get_script_str(&request());
        assert!(script.contains("#SBATCH --nodes=2\n#SBATCH --ntasks-per-node=12\n"));
        assert!(!script.contains("--ntasks=24"));
        assert!(script.contains("export OMP_NUM_THREADS=2\n\n"));
    }

    #[test]
    fn test_pbspro_script() {
        let mut spec: QueueAdapterSpec = serde_yaml::from_str(SLURM).unwrap();
        spec.queue = serde_yaml::from_str("{qtype: pbspro, qname: workq}").unwrap();
        let mut qad = QueueAdapter::from_spec(spec).unwrap();
        qad.set_mpi_procs(4);
        assert!(qad.exclude_nodes(&["n1"]).is_err());

        let script = qad.get_script_str(&request());
        assert!(script.starts_with("#!/bin/bash\n#PBS -q workq\n#PBS -N scf\n"));
        assert!(script.contains("#PBS -l select=4:ncpus=1:mpiprocs=1:ompthreads=1:mem=1000mb\n"));
        assert!(script.contains("#PBS -l walltime=01:00:00\n"));
    }

    #[test]
    fn test_shell_script_with_post_run() {
        let mut spec: QueueAdapterSpec = serde_yaml::from_str(SLURM).unwrap();
        spec.queue = serde_yaml::from_str("{qtype: shell}").unwrap();
        spec.job.modules.clear();
        spec.job.post_run = vec!["echo done".to_string()];
        let qad = QueueAdapter::from_spec(spec).unwrap();

        let script = qad.get_script_str(&JobRequest::new("a", "/w", "abinit"));
        assert!(script.starts_with("#!/bin/bash\ncd /w\n# OpenMp Environment\n"));
        assert!(script.ends_with("mpirun -n 2 abinit\n\n# Commands after execution\necho done\n"));
    }

    #[test]
    fn test_disabled_flag_spellings() {
        let spec = spec_with("queue", "qname", "main");
        assert!(spec.enabled);
        let mut doc: Value = serde_yaml::from_str(SLURM).unwrap();
        doc["enabled"] = Value::String("no".to_string());
        let spec: QueueAdapterSpec = serde_yaml::from_value(doc).unwrap();
        assert!(!spec.enabled);
    }
}
