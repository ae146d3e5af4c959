//! The polling loop

use super::config::SchedulerConfig;
use crate::config::yaml::from_document;
use crate::error::{AbiQueueError, IoResultExt, Result};
use crate::job::{JobRequest, JobStatus, SubmittedJob};
use crate::manager::TaskManager;
use crate::qadapter::{backend_for, QueueBackend, QueueType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// Jobs handled by the scheduler, read from a YAML file with a `jobs` list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobList {
    pub jobs: Vec<JobRequest>,
}

impl JobList {
    /// Read the list; relative paths are resolved against the file directory
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).with_path(path)?;
        let mut list: Self = from_document(&text, &path.display().to_string())?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for job in &mut list.jobs {
            job.rebase(base);
        }
        Ok(list)
    }
}

impl FromStr for JobList {
    type Err = AbiQueueError;

    fn from_str(s: &str) -> Result<Self> {
        from_document(s, "<string>")
    }
}

/// A job and its progress through the queue
#[derive(Debug, Clone)]
pub struct JobEntry {
    /// What to run
    pub request: JobRequest,
    /// Last known state, `None` while waiting for submission
    pub status: Option<JobStatus>,
    /// Last submission
    pub submitted: Option<SubmittedJob>,
    /// Number of submissions
    pub launches: u32,
    /// Manager configured for this job, kept across resubmissions
    manager: Option<TaskManager>,
}

impl JobEntry {
    fn new(request: JobRequest) -> Self {
        Self {
            request,
            status: None,
            submitted: None,
            launches: 0,
            manager: None,
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.status.is_none()
    }

    /// Submitted and not finished
    pub fn is_active(&self) -> bool {
        self.status.map(|s| !s.is_finished()).unwrap_or(false)
    }

    pub fn is_finished(&self) -> bool {
        self.status.map(|s| s.is_finished()).unwrap_or(false)
    }

    fn num_cores(&self) -> u32 {
        self.submitted.as_ref().map(|s| s.num_cores).unwrap_or(0)
    }
}

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every job reached a final state
    AllDone,
    /// Submission errors exceeded `max_num_pyexcs`
    TooManyErrors,
    /// Failed jobs exceeded `max_num_abierrs`
    TooManyFailures,
    /// Launches exceeded `safety_ratio` times the number of jobs
    SafetyRatio,
    /// The shutdown flag was raised
    Shutdown,
}

/// Final report of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub reason: StopReason,
    pub iterations: usize,
    pub num_launches: usize,
    pub num_errors: u32,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub waiting: usize,
    pub elapsed: Duration,
}

/// Number of jobs that may be launched in one iteration
pub fn admission_slots(config: &SchedulerConfig, njobs_inqueue: usize) -> usize {
    let slots = config.max_njobs_inqueue.saturating_sub(njobs_inqueue);
    match config.max_nlaunches() {
        Some(max) => slots.min(max),
        None => slots,
    }
}

/// Manager to submit `entry` with: the one of the previous launch, whose
/// limits may have been raised, or a copy of `base` configured for the request
fn prepare_manager(base: &TaskManager, entry: &mut JobEntry) -> Result<TaskManager> {
    match entry.manager.take() {
        Some(mut manager) => {
            manager.select_for(&entry.request)?;
            Ok(manager)
        }
        None => base.for_request(&entry.request),
    }
}

/// Whether the output of a running job has not changed for `timeout`
fn is_frozen(req: &JobRequest, timeout: Duration) -> bool {
    let Some(stdout) = &req.stdout else {
        return false;
    };
    let path = req.workdir.join(stdout);
    fs::metadata(&path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
        .map(|age| age > timeout)
        .unwrap_or(false)
}

/// Queue backends by engine, created on first use
#[derive(Default)]
struct Backends {
    by_qtype: HashMap<QueueType, Box<dyn QueueBackend>>,
}

impl Backends {
    fn get(&mut self, qtype: QueueType) -> &dyn QueueBackend {
        &**self.by_qtype.entry(qtype).or_insert_with(|| backend_for(qtype))
    }

    fn insert(&mut self, backend: Box<dyn QueueBackend>) {
        self.by_qtype.insert(backend.qtype(), backend);
    }
}

/// Submits a list of jobs through a task manager, a few at a time
pub struct Scheduler {
    config: SchedulerConfig,
    manager: TaskManager,
    backends: Backends,
    jobs: Vec<JobEntry>,
    shutdown: Arc<AtomicBool>,
    iterations: usize,
    num_launches: usize,
    num_errors: u32,
    started: Instant,
    last_report: Instant,
}

impl Scheduler {
    /// Jobs are submitted through the engine of the adapter selected for each of them
    pub fn new(config: SchedulerConfig, manager: TaskManager, requests: Vec<JobRequest>) -> Result<Self> {
        config.validate()?;
        let now = Instant::now();
        Ok(Self {
            config,
            manager,
            backends: Backends::default(),
            jobs: requests.into_iter().map(JobEntry::new).collect(),
            shutdown: Arc::new(AtomicBool::new(false)),
            iterations: 0,
            num_launches: 0,
            num_errors: 0,
            started: now,
            last_report: now,
        })
    }

    /// Use `backend` for the jobs of its queue type
    pub fn with_backend(mut self, backend: Box<dyn QueueBackend>) -> Self {
        self.backends.insert(backend);
        self
    }

    /// Raise the flag to stop the loop at the next iteration
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn jobs(&self) -> &[JobEntry] {
        &self.jobs
    }

    fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status == Some(status)).count()
    }

    fn ncores_in_use(&self) -> u32 {
        self.jobs.iter().filter(|j| j.is_active()).map(JobEntry::num_cores).sum()
    }

    fn num_active(&self, qtype: QueueType) -> usize {
        self.jobs
            .iter()
            .filter(|j| j.is_active() && j.submitted.as_ref().map(|s| s.qtype) == Some(qtype))
            .count()
    }

    /// Jobs in the queues of every engine the manager can submit to
    fn njobs_inqueue(&mut self) -> usize {
        let mut qtypes: Vec<QueueType> = Vec::new();
        for qad in self.manager.qads() {
            if !qtypes.contains(&qad.qtype()) {
                qtypes.push(qad.qtype());
            }
        }

        let mut total = 0;
        for qtype in qtypes {
            let counted = self.backends.get(qtype).njobs_in_queue(None);
            total += match counted {
                Ok(Some(n)) => n,
                Ok(None) => self.num_active(qtype),
                Err(e) => {
                    tracing::warn!("Cannot count jobs in {} queue: {}", qtype, e);
                    self.num_errors += 1;
                    self.num_active(qtype)
                }
            };
        }
        total
    }

    /// Poll until every job is done, too many errors occur or shutdown
    pub fn run(&mut self) -> Result<RunSummary> {
        let interval = self.config.interval();
        tracing::info!(
            "Scheduler started with {} jobs, polling every {}",
            self.jobs.len(),
            humantime::format_duration(interval)
        );
        if let Some(mailto) = &self.config.mailto {
            tracing::debug!("mailto {} is recorded but no mail is sent", mailto);
        }

        let ticker = crossbeam::channel::tick(interval);
        let reason = loop {
            if let Some(reason) = self.tick()? {
                break reason;
            }
            if ticker.recv().is_err() || self.shutdown.load(Ordering::SeqCst) {
                break StopReason::Shutdown;
            }
        };

        Ok(self.finish(reason))
    }

    /// One iteration: refresh, check stop conditions, launch
    pub fn tick(&mut self) -> Result<Option<StopReason>> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Ok(Some(StopReason::Shutdown));
        }
        self.iterations += 1;
        self.refresh();

        let failed = self.count(JobStatus::Failed);
        if failed > self.config.max_num_abierrs as usize {
            tracing::error!("{} failed jobs > max_num_abierrs {}", failed, self.config.max_num_abierrs);
            return Ok(Some(StopReason::TooManyFailures));
        }
        if self.num_errors > self.config.max_num_pyexcs {
            tracing::error!(
                "{} submission errors > max_num_pyexcs {}",
                self.num_errors,
                self.config.max_num_pyexcs
            );
            return Ok(Some(StopReason::TooManyErrors));
        }
        if self.jobs.iter().all(JobEntry::is_finished) {
            return Ok(Some(StopReason::AllDone));
        }

        let njobs_inqueue = self.njobs_inqueue();
        let slots = admission_slots(&self.config, njobs_inqueue);
        let max_launches = (self.config.safety_ratio as usize).saturating_mul(self.jobs.len());
        let mut ncores_used = self.ncores_in_use();
        let mut launched = 0;

        for idx in 0..self.jobs.len() {
            if launched >= slots {
                break;
            }
            if !self.jobs[idx].is_waiting() {
                continue;
            }
            if self.num_launches >= max_launches {
                tracing::error!("{} launches reached the safety limit {}", self.num_launches, max_launches);
                return Ok(Some(StopReason::SafetyRatio));
            }

            let entry = &mut self.jobs[idx];
            let mut manager = match prepare_manager(&self.manager, entry) {
                Ok(manager) => manager,
                Err(e) => {
                    tracing::error!("Cannot configure {}: {}", entry.request.name, e);
                    entry.status = Some(JobStatus::Failed);
                    self.num_errors += 1;
                    continue;
                }
            };

            let cores = manager.num_cores();
            if let Some(max) = self.config.max_ncores_used {
                if cores > max {
                    tracing::error!(
                        "{} needs {} cores, more than max_ncores_used {}",
                        entry.request.name,
                        cores,
                        max
                    );
                    entry.status = Some(JobStatus::Failed);
                    self.num_errors += 1;
                    continue;
                }
                if ncores_used + cores > max {
                    tracing::debug!("{} + {} cores would exceed max_ncores_used {}", ncores_used, cores, max);
                    entry.manager = Some(manager);
                    break;
                }
            }

            let backend = self.backends.get(manager.qadapter().qtype());
            match manager.launch_with(&entry.request, backend) {
                Ok(job) => {
                    tracing::info!("Submitted {} with id {} ({} cores)", job.name, job.qid, job.num_cores);
                    ncores_used += job.num_cores;
                    entry.status = Some(JobStatus::Pending);
                    entry.submitted = Some(job);
                    entry.launches += 1;
                    launched += 1;
                    self.num_launches += 1;
                }
                Err(e) => {
                    tracing::error!("Cannot submit {}: {}", entry.request.name, e);
                    self.num_errors += 1;
                    if !e.is_recoverable() {
                        entry.status = Some(JobStatus::Failed);
                    }
                }
            }
            entry.manager = Some(manager);
        }

        if launched > 0 || self.config.verbose > 0 {
            tracing::info!(
                "Iteration {}: {} launched, {} in queue, {} completed, {} failed",
                self.iterations,
                launched,
                njobs_inqueue + launched,
                self.count(JobStatus::Completed),
                self.count(JobStatus::Failed)
            );
        }
        self.remind();
        Ok(None)
    }

    /// Update the state of submitted jobs, resubmitting failed ones with more
    /// resources when `fix_qcritical` is set
    fn refresh(&mut self) {
        let frozen_timeout = self.manager.policy().frozen_timeout.as_duration();

        for entry in self.jobs.iter_mut().filter(|j| j.is_active()) {
            let Some(job) = &entry.submitted else {
                continue;
            };
            let backend = self.backends.get(job.qtype);
            let mut status = match backend.status(&job.qid) {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!("Cannot get status of {} ({}): {}", job.name, job.qid, e);
                    continue;
                }
            };

            if status == JobStatus::Running && is_frozen(&entry.request, frozen_timeout) {
                tracing::warn!("{} looks frozen, cancelling {}", job.name, job.qid);
                if let Err(e) = backend.cancel(&job.qid) {
                    tracing::warn!("Cannot cancel {}: {}", job.qid, e);
                }
                status = JobStatus::Failed;
            }

            if status == JobStatus::Failed && self.config.fix_qcritical {
                if let Some(manager) = entry.manager.as_mut() {
                    match manager.increase_resources() {
                        Ok(()) => {
                            tracing::info!("Resubmitting {} with more resources", job.name);
                            entry.status = None;
                            continue;
                        }
                        Err(e) => tracing::warn!("{}: {}", job.name, e),
                    }
                }
            }

            if entry.status != Some(status) {
                tracing::debug!("{} ({}): {:?}", job.name, job.qid, status);
            }
            entry.status = Some(status);
        }
    }

    fn remind(&mut self) {
        if self.last_report.elapsed() < Duration::from_secs(self.config.remindme_s) {
            return;
        }
        self.last_report = Instant::now();
        tracing::info!(
            "Running for {}: {} waiting, {} active, {} completed, {} failed",
            humantime::format_duration(Duration::from_secs(self.started.elapsed().as_secs())),
            self.jobs.iter().filter(|j| j.is_waiting()).count(),
            self.jobs.iter().filter(|j| j.is_active()).count(),
            self.count(JobStatus::Completed),
            self.count(JobStatus::Failed)
        );
    }

    /// Cleanup and report
    fn finish(&mut self, reason: StopReason) -> RunSummary {
        let on_errors = matches!(
            reason,
            StopReason::TooManyErrors | StopReason::TooManyFailures | StopReason::SafetyRatio
        );

        if on_errors && self.config.killjobs_if_errors {
            for entry in self.jobs.iter_mut().filter(|j| j.is_active()) {
                if let Some(job) = &entry.submitted {
                    match self.backends.get(job.qtype).cancel(&job.qid) {
                        Ok(()) => entry.status = Some(JobStatus::Cancelled),
                        Err(e) => tracing::warn!("Cannot cancel {}: {}", job.qid, e),
                    }
                }
            }
        }

        if reason == StopReason::AllDone
            && self.config.rmflow
            && self.jobs.iter().all(|j| j.status == Some(JobStatus::Completed))
        {
            for entry in &self.jobs {
                let workdir = &entry.request.workdir;
                if let Err(e) = fs::remove_dir_all(workdir) {
                    tracing::warn!("Cannot remove {}: {}", workdir.display(), e);
                }
            }
        }

        let summary = RunSummary {
            reason,
            iterations: self.iterations,
            num_launches: self.num_launches,
            num_errors: self.num_errors,
            completed: self.count(JobStatus::Completed),
            failed: self.count(JobStatus::Failed),
            cancelled: self.count(JobStatus::Cancelled),
            waiting: self.jobs.iter().filter(|j| j.is_waiting()).count(),
            elapsed: self.started.elapsed(),
        };
        tracing::info!("Scheduler stopped ({:?}) after {} iterations", reason, summary.iterations);
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qadapter::{QueueJob, QueueType};
    use std::collections::HashMap;
    use std::sync::Mutex;

    const MANAGER: &str = r#"
qadapters:
  - priority: 1
    queue: {qtype: shell}
    limits: {timelimit: 600, min_cores: 2, max_cores: 4, min_mem_per_proc: 1000, max_mem_per_proc: 2000}
    hardware: {num_nodes: 1, sockets_per_node: 1, cores_per_socket: 4, mem_per_node: 8 GB}
"#;

    #[derive(Default)]
    struct QueueState {
        statuses: HashMap<String, JobStatus>,
        cancelled: Vec<String>,
    }

    /// Queue whose job states are set by the test
    #[derive(Clone)]
    struct FakeQueue {
        qtype: QueueType,
        state: Arc<Mutex<QueueState>>,
    }

    impl Default for FakeQueue {
        fn default() -> Self {
            Self::of(QueueType::Shell)
        }
    }

    impl FakeQueue {
        fn of(qtype: QueueType) -> Self {
            Self {
                qtype,
                state: Arc::default(),
            }
        }

        fn num_submitted(&self) -> usize {
            self.state.lock().unwrap().statuses.len()
        }

        fn set_all(&self, status: JobStatus) {
            let mut state = self.state.lock().unwrap();
            for s in state.statuses.values_mut() {
                *s = status;
            }
        }

        fn set(&self, qid: &str, status: JobStatus) {
            self.state.lock().unwrap().statuses.insert(qid.to_string(), status);
        }
    }

    impl QueueBackend for FakeQueue {
        fn qtype(&self) -> QueueType {
            self.qtype
        }

        fn submit(&self, _script: &Path) -> Result<QueueJob> {
            let mut state = self.state.lock().unwrap();
            let qid = (state.statuses.len() + 1).to_string();
            state.statuses.insert(qid.clone(), JobStatus::Pending);
            Ok(QueueJob {
                qtype: self.qtype,
                qid,
            })
        }

        fn cancel(&self, qid: &str) -> Result<()> {
            self.state.lock().unwrap().cancelled.push(qid.to_string());
            Ok(())
        }

        fn njobs_in_queue(&self, _username: Option<&str>) -> Result<Option<usize>> {
            let state = self.state.lock().unwrap();
            Ok(Some(state.statuses.values().filter(|s| !s.is_finished()).count()))
        }

        fn status(&self, qid: &str) -> Result<JobStatus> {
            Ok(self.state.lock().unwrap().statuses.get(qid).copied().unwrap_or(JobStatus::Unknown))
        }
    }

    fn requests(dir: &Path, n: usize) -> Vec<JobRequest> {
        (0..n)
            .map(|i| JobRequest::new(format!("t{}", i), dir.join(format!("t{}", i)), "abinit"))
            .collect()
    }

    fn scheduler(config: &str, n: usize, dir: &Path) -> (Scheduler, FakeQueue) {
        let queue = FakeQueue::default();
        let scheduler = Scheduler::new(config.parse().unwrap(), MANAGER.parse().unwrap(), requests(dir, n))
            .unwrap()
            .with_backend(Box::new(queue.clone()));
        (scheduler, queue)
    }

    #[test]
    fn test_admission_slots() {
        let mut config = SchedulerConfig::every(1);
        config.max_njobs_inqueue = 10;
        assert_eq!(admission_slots(&config, 4), 6);
        assert_eq!(admission_slots(&config, 12), 0);
        config.max_nlaunches = 2;
        assert_eq!(admission_slots(&config, 4), 2);
        config.max_nlaunches = 0;
        assert_eq!(admission_slots(&config, 0), 0);
    }

    #[test]
    fn test_queue_limit_throttles_launches() {
        let dir = tempfile::tempdir().unwrap();
        let (mut scheduler, queue) = scheduler("seconds: 1\nmax_njobs_inqueue: 2", 3, dir.path());

        assert_eq!(scheduler.tick().unwrap(), None);
        assert_eq!(scheduler.jobs().iter().filter(|j| j.is_active()).count(), 2);
        assert!(scheduler.jobs()[2].is_waiting());

        // Still two jobs in the queue, nothing else is launched
        assert_eq!(scheduler.tick().unwrap(), None);
        assert!(scheduler.jobs()[2].is_waiting());

        queue.set_all(JobStatus::Completed);
        assert_eq!(scheduler.tick().unwrap(), None);
        assert!(scheduler.jobs()[2].is_active());

        queue.set_all(JobStatus::Completed);
        assert_eq!(scheduler.tick().unwrap(), Some(StopReason::AllDone));
        assert!(dir.path().join("t2").join("job.sh").is_file());
    }

    #[test]
    fn test_core_budget() {
        let dir = tempfile::tempdir().unwrap();
        let (mut scheduler, _queue) = scheduler("seconds: 1\nmax_ncores_used: 5", 3, dir.path());

        scheduler.tick().unwrap();
        // Each job uses min_cores = 2
        assert_eq!(scheduler.jobs().iter().filter(|j| j.is_active()).count(), 2);
        assert_eq!(scheduler.ncores_in_use(), 4);
    }

    #[test]
    fn test_job_larger_than_core_budget_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (mut scheduler, queue) = scheduler("seconds: 1\nmax_ncores_used: 1\nmax_num_pyexcs: 5", 1, dir.path());

        assert_eq!(scheduler.tick().unwrap(), None);
        assert_eq!(scheduler.jobs()[0].status, Some(JobStatus::Failed));
        assert_eq!(scheduler.num_errors, 1);
        assert_eq!(queue.num_submitted(), 0);
        assert_eq!(scheduler.tick().unwrap(), Some(StopReason::TooManyFailures));
    }

    #[test]
    fn test_each_job_uses_the_engine_of_its_adapter() {
        const MIXED: &str = r#"
policy: {autoparal: 1}
qadapters:
  - priority: 1
    queue: {qtype: slurm, qname: small}
    limits: {timelimit: 600, min_cores: 1, max_cores: 2}
    hardware: {num_nodes: 1, sockets_per_node: 1, cores_per_socket: 8, mem_per_node: 8 GB}
  - priority: 2
    queue: {qtype: shell}
    limits: {timelimit: 600, min_cores: 1, max_cores: 8}
    hardware: {num_nodes: 1, sockets_per_node: 1, cores_per_socket: 8, mem_per_node: 8 GB}
"#;
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("dry.abo");
        fs::write(
            &log,
            "--- !Autoparal\ninfo: {version: 1}\nconfigurations:\n\
             \x20   - {tot_ncpus: 6, mpi_ncpus: 6, efficiency: 0.9, mem_per_cpu: 100}\n...\n",
        )
        .unwrap();

        let mut reqs = requests(dir.path(), 2);
        reqs[1].autoparal = Some(log);

        let slurm = FakeQueue::of(QueueType::Slurm);
        let shell = FakeQueue::of(QueueType::Shell);
        let mut scheduler = Scheduler::new("seconds: 1".parse().unwrap(), MIXED.parse().unwrap(), reqs)
            .unwrap()
            .with_backend(Box::new(slurm.clone()))
            .with_backend(Box::new(shell.clone()));

        scheduler.tick().unwrap();
        let first = scheduler.jobs()[0].submitted.as_ref().unwrap();
        let second = scheduler.jobs()[1].submitted.as_ref().unwrap();
        assert_eq!(first.qtype, QueueType::Slurm);
        assert_eq!(second.qtype, QueueType::Shell);
        assert_eq!(second.num_cores, 6);
        assert_eq!(slurm.num_submitted(), 1);
        assert_eq!(shell.num_submitted(), 1);

        // Statuses are read from the engine each job was submitted to
        slurm.set_all(JobStatus::Completed);
        assert_eq!(scheduler.tick().unwrap(), None);
        assert!(scheduler.jobs()[0].is_finished());
        assert!(scheduler.jobs()[1].is_active());

        shell.set_all(JobStatus::Completed);
        assert_eq!(scheduler.tick().unwrap(), Some(StopReason::AllDone));
    }

    #[test]
    fn test_failures_stop_and_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let (mut scheduler, queue) = scheduler("seconds: 1\nfix_qcritical: no", 2, dir.path());

        scheduler.tick().unwrap();
        queue.set("1", JobStatus::Failed);
        queue.set("2", JobStatus::Running);
        assert_eq!(scheduler.tick().unwrap(), Some(StopReason::TooManyFailures));

        let summary = scheduler.finish(StopReason::TooManyFailures);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(queue.state.lock().unwrap().cancelled, vec!["2".to_string()]);
    }

    #[test]
    fn test_failed_job_is_resubmitted_with_more_resources() {
        let dir = tempfile::tempdir().unwrap();
        let (mut scheduler, queue) = scheduler("seconds: 1", 1, dir.path());

        scheduler.tick().unwrap();
        queue.set("1", JobStatus::Failed);
        assert_eq!(scheduler.tick().unwrap(), None);

        let entry = &scheduler.jobs()[0];
        assert_eq!(entry.launches, 2);
        assert_eq!(entry.submitted.as_ref().unwrap().qid, "2");
        // hint_cores was already max_cores, memory went up instead
        assert_eq!(entry.manager.as_ref().unwrap().mem_per_proc().mb(), 2000.0);

        // No more room: the next failure is final
        queue.set("2", JobStatus::Failed);
        assert_eq!(scheduler.tick().unwrap(), Some(StopReason::TooManyFailures));
    }

    #[test]
    fn test_fixed_layout_and_bad_autoparal() {
        let dir = tempfile::tempdir().unwrap();
        let mut reqs = requests(dir.path(), 2);
        reqs[0].mpi_procs = Some(3);
        reqs[1].autoparal = Some(dir.path().join("missing.log"));

        let queue = FakeQueue::default();
        let mut scheduler = Scheduler::new(
            "seconds: 1\nmax_num_abierrs: 5\nmax_num_pyexcs: 5".parse().unwrap(),
            MANAGER.parse().unwrap(),
            reqs,
        )
        .unwrap()
        .with_backend(Box::new(queue));

        scheduler.tick().unwrap();
        assert_eq!(scheduler.jobs()[0].submitted.as_ref().unwrap().num_cores, 3);
        assert_eq!(scheduler.jobs()[1].status, Some(JobStatus::Failed));
        assert_eq!(scheduler.num_errors, 1);
    }

    #[test]
    fn test_run_until_done_and_rmflow() {
        let dir = tempfile::tempdir().unwrap();
        let (mut scheduler, queue) = scheduler("seconds: 1\nrmflow: yes", 2, dir.path());

        scheduler.tick().unwrap();
        queue.set_all(JobStatus::Completed);
        let summary = scheduler.run().unwrap();

        assert_eq!(summary.reason, StopReason::AllDone);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.num_launches, 2);
        assert!(!dir.path().join("t0").exists());
    }

    #[test]
    fn test_shutdown_flag() {
        let dir = tempfile::tempdir().unwrap();
        let (mut scheduler, _queue) = scheduler("hours: 1", 1, dir.path());
        scheduler.shutdown_flag().store(true, Ordering::SeqCst);
        let summary = scheduler.run().unwrap();
        assert_eq!(summary.reason, StopReason::Shutdown);
        assert_eq!(summary.num_launches, 0);
    }

    #[test]
    fn test_job_list_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.yml");
        fs::write(&path, "jobs:\n  - {name: scf, workdir: w/scf, executable: abinit}\n").unwrap();
        let list = JobList::from_file(&path).unwrap();
        assert_eq!(list.jobs[0].workdir, dir.path().join("w/scf"));
        assert!("jobs: [{name: a}]".parse::<JobList>().is_err());
    }
}
