//! Benchmarks for adapter selection and script rendering
//!
//! Run with: cargo bench

use abiqueue::job::JobRequest;
use abiqueue::manager::TaskManager;
use abiqueue::paral::{ParalConf, ParalHints};
use abiqueue::units::Memory;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_yaml::Mapping;

const MANAGER: &str = r#"
hardware: &hardware
   num_nodes: 64
   sockets_per_node: 2
   cores_per_socket: 16
   mem_per_node: 128 GB

job: &job
    mpi_runner: srun
    modules: [intel/2023, intel-mpi]

qadapters:
  - priority: 1
    queue: {qtype: slurm, qname: debug}
    limits: {timelimit: 0:30:00, min_cores: 1, max_cores: 64}
    hardware: *hardware
    job: *job
  - priority: 2
    queue: {qtype: slurm, qname: large}
    limits: {timelimit: 1-0:00:00, min_cores: 32, max_cores: 1024, allocation: nodes}
    hardware: *hardware
    job: *job
"#;

/// Hints with `n` configurations of decreasing efficiency
fn make_hints(n: u32) -> ParalHints {
    let confs = (1..=n)
        .map(|i| {
            ParalConf::new(i, 1)
                .with_efficiency(1.0 - i as f64 / (2 * n) as f64)
                .with_mem_per_proc(Memory::from_mb(500.0 + i as f64))
        })
        .collect();
    ParalHints::new(Mapping::new(), confs)
}

fn bench_select_qadapter(c: &mut Criterion) {
    let manager: TaskManager = MANAGER.parse().unwrap();
    let mut group = c.benchmark_group("select_qadapter");

    for n in [16u32, 128, 1024].iter() {
        let hints = make_hints(*n);
        group.throughput(Throughput::Elements(*n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &hints, |b, hints| {
            b.iter(|| {
                let mut manager = manager.clone();
                black_box(manager.select_qadapter(hints).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_script(c: &mut Criterion) {
    let mut manager: TaskManager = MANAGER.parse().unwrap();
    manager.select_qadapter(&make_hints(256)).unwrap();
    let req = JobRequest::new("scf", "/scratch/scf", "abinit")
        .with_args(["run.abi"])
        .with_stdout("run.log");

    c.bench_function("get_script_str", |b| {
        b.iter(|| black_box(manager.qadapter().get_script_str(black_box(&req))));
    });
}

fn bench_parse_hints(c: &mut Criterion) {
    let hints = make_hints(256);
    let text = format!("--- !Autoparal\n{}...\n", serde_yaml::to_string(&hints).unwrap());

    c.bench_function("parse_hints_256", |b| {
        b.iter(|| black_box(ParalHints::parse_str(black_box(&text)).unwrap()));
    });
}

criterion_group!(benches, bench_select_qadapter, bench_script, bench_parse_hints);
criterion_main!(benches);
