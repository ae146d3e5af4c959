//! Text printed by `abiqueue doc`

use super::settings::DocTopic;
use crate::manager::SIMPLE_MANAGER;
use crate::scheduler::SIMPLE_SCHEDULER;

const QADAPTER_DOC: &str = r#"# Queue adapter
priority:  1     # Positive integer, lower is tried first. 0 disables the adapter.
enabled:   yes   # `no` disables the adapter (default: yes).

queue:
    qtype:     shell | slurm | pbspro
    qname:     Name of the queue (partition). Required by slurm and pbspro.
    qparams:   Extra header options, e.g. {account: abc, qos: debug}.
               Options computed by the adapter (nodes, time, ...) are rejected.
    qverbatim: Lines appended to the header as they are.

job:
    mpi_runner:           mpirun, mpiexec or srun. "None" runs the executable directly.
    mpi_runner_options:   Options passed to the runner.
    shell_runner:         Runner used by shell jobs, replaces mpi_runner (null: no runner).
    shell_runner_options: Options of the shell runner.
    shell_env:            Variables exported before running, e.g. {PATH: ...}.
    omp_env:              OpenMP variables, OMP_NUM_THREADS is set by the adapter.
    modules:              Modules to load.
    setup:                Commands executed after `cd` into the working directory.
    pre_run:              Commands executed before the run line.
    post_run:             Commands executed after the run line.

limits:
    timelimit:        Time limit of the jobs ([D-]HH:MM:SS, MM:SS or seconds).
    timelimit_hard:   Upper bound when the time limit is increased (default: timelimit).
    min_cores:        Minimum number of cores (default: 1).
    max_cores:        Maximum number of cores.
    hint_cores:       Cores used by autoparal selection (default: max_cores).
    min_mem_per_proc: Minimum memory per process (default: mem_per_node / cores_per_node).
    max_mem_per_proc: Maximum memory per process (default: mem_per_node).
    max_num_launches: Submissions allowed through this adapter (default: 5).
    condition:        Filter on parallel configurations, e.g. {num_cores: {$divisible: 4}}.
    allocation:       shared, nodes (prefer whole nodes) or force_nodes (whole nodes only).

hardware:
    num_nodes:        Nodes available on the queue.
    sockets_per_node: Sockets per node.
    cores_per_socket: Cores per socket.
    mem_per_node:     Memory per node, e.g. "96 GB" or "2000 Mb".
"#;

const POLICY_DOC: &str = r#"# Task policy
policy:
    autoparal: 1                # 1 selects the parallel configuration from autoparal, 0 disables it
    precedence: autoparal_conf  # autoparal_conf: best configuration first, qadapter: adapter order first
    condition: {}               # Filter on the autoparal configurations
    vars_condition: {}          # Filter on the variables of the configurations
    autoparal_priorities:       # Ordering keys: efficiency, speedup, mem_per_proc, or alone
        - speedup               # {meta_priority: highest_speedup_minimum_efficiency_cutoff, minimum_efficiency: 0.7}
    frozen_timeout: 0-1:00:00   # Running jobs whose output is older than this are cancelled
"#;

const SCHEDULER_DOC: &str = r#"# Scheduler
weeks: 0              # The poll interval is the sum of these values.
days: 0               # At least one of them must be positive.
hours: 0
minutes: 0
seconds: 5
max_njobs_inqueue: 200        # Jobs allowed in the queue at the same time
max_ncores_used:              # Cores used by active jobs (default: unlimited)
max_nlaunches: -1             # Launches per iteration, -1 is unlimited
max_num_pyexcs: 0             # Submission errors tolerated before stopping
max_num_abierrs: 0            # Failed jobs tolerated before stopping
safety_ratio: 5               # Stop after safety_ratio * number of jobs launches
mailto:                       # Recorded, no mail is sent
verbose: 0                    # Log every iteration when > 0
fix_qcritical: yes            # Resubmit failed jobs with more resources
rmflow: no                    # Remove the working directories when every job completed
debug: 0
remindme_s: 86400             # Seconds between two status reports
killjobs_if_errors: yes       # Cancel active jobs when stopping on errors
"#;

/// Documentation of `topic`
pub fn doc(topic: DocTopic) -> String {
    match topic {
        DocTopic::Manager => format!(
            "# manager.yml holds an optional `policy` and a list of `qadapters`.\n\
             # Other top-level keys are ignored and can hold YAML anchors.\n\
             # Minimal example:\n\n{}\n\
             # Run `abiqueue doc qadapter` and `abiqueue doc policy` for the keys.\n",
            SIMPLE_MANAGER
        ),
        DocTopic::Scheduler => format!("{}\n# Minimal example:\n{}", SCHEDULER_DOC, SIMPLE_SCHEDULER),
        DocTopic::Qadapter => QADAPTER_DOC.to_string(),
        DocTopic::Policy => POLICY_DOC.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::TaskPolicy;
    use crate::scheduler::SchedulerConfig;
    use serde::Deserialize;

    #[test]
    fn test_documented_examples_load() {
        let config: SchedulerConfig = SCHEDULER_DOC.parse().unwrap();
        assert_eq!(config.seconds, 5);
        assert!(config.fix_qcritical);

        #[derive(Deserialize)]
        struct Wrapper {
            policy: TaskPolicy,
        }
        let wrapper: Wrapper = serde_yaml::from_str(POLICY_DOC).unwrap();
        assert_eq!(wrapper.policy.autoparal, 1);
        assert_eq!(wrapper.policy.frozen_timeout.as_secs(), 3600);
    }

    #[test]
    fn test_manager_doc_has_example() {
        assert!(doc(DocTopic::Manager).contains("qadapters:"));
        assert!(doc(DocTopic::Qadapter).contains("max_num_launches"));
    }
}
