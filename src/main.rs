//! abiqueue CLI - Queue adapters and task manager for ab-initio jobs

use abiqueue::config::{doc, user_config_dir, CliArgs, Commands, JobArgs, MANAGER_FILE, SCHEDULER_FILE};
use abiqueue::error::{AbiQueueError, IoResultExt, Result};
use abiqueue::job::JobRequest;
use abiqueue::paral::ParalHints;
use abiqueue::scheduler::{JobList, Scheduler, StopReason, SIMPLE_SCHEDULER};
use abiqueue::system::{ConfigCheck, LocalMachine};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // RUST_LOG wins over -v
    let level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .init();

    // Handle result
    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &CliArgs) -> Result<()> {
    match &args.command {
        Commands::Check => cmd_check(),
        Commands::Doc { topic } => {
            println!("{}", doc(*topic));
            Ok(())
        }
        Commands::Init { dir, force } => cmd_init(dir.as_deref(), *force),
        Commands::Show { json } => cmd_show(args, *json),
        Commands::Select { hints } => cmd_select(args, hints),
        Commands::Script(job) => cmd_script(args, job),
        Commands::Submit(job) => cmd_submit(args, job),
        Commands::Run { jobs, json } => cmd_run(args, jobs, *json),
        Commands::Queue { user } => {
            let manager = args.load_manager()?;
            match manager.njobs_in_queue(user.as_deref())? {
                Some(n) => println!("{}", n),
                None => println!("unknown"),
            }
            Ok(())
        }
        Commands::Cancel { qid } => {
            args.load_manager()?.cancel(qid)?;
            println!("Cancelled {}", qid);
            Ok(())
        }
    }
}

fn cmd_check() -> Result<()> {
    let check = ConfigCheck::run();
    println!("{}", check);
    if !check.is_ok() {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_init(dir: Option<&Path>, force: bool) -> Result<()> {
    let dir = dir.map(Path::to_path_buf).unwrap_or_else(user_config_dir);
    fs::create_dir_all(&dir).with_path(&dir)?;

    let path = dir.join(MANAGER_FILE);
    if path.exists() && !force {
        return Err(AbiQueueError::config(format!(
            "{} already exists, use --force to overwrite it",
            path.display()
        )));
    }

    let local = LocalMachine::detect();
    println!("{}\n", local);
    // Make sure what we write can be read back
    local.manager()?;
    fs::write(&path, local.manager_yaml()).with_path(&path)?;
    println!("Wrote {}", path.display());

    let scheduler = dir.join(SCHEDULER_FILE);
    if !scheduler.exists() {
        fs::write(&scheduler, SIMPLE_SCHEDULER).with_path(&scheduler)?;
        println!("Wrote {}", scheduler.display());
    }
    Ok(())
}

fn cmd_show(args: &CliArgs, json: bool) -> Result<()> {
    let manager = args.load_manager()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&manager.to_json()?)?);
    } else {
        println!("[Policy]\n{}\n", manager.policy());
        println!("{}", manager);
    }
    Ok(())
}

fn cmd_select(args: &CliArgs, hints: &Path) -> Result<()> {
    let mut manager = args.load_manager()?;
    let hints = ParalHints::parse_file(hints)?;
    println!("{} parallel configurations", hints.len());
    println!(
        "  max cores {}, max speedup {:.2}, max efficiency {:.2}, max mem/proc {:.0} Mb",
        hints.max_cores().unwrap_or(0),
        hints.max_speedup().unwrap_or(0.0),
        hints.max_efficiency().unwrap_or(0.0),
        hints.max_mem_per_proc().unwrap_or(0.0)
    );

    let pconf = manager.select_qadapter(&hints)?;
    let qad = manager.qadapter();
    println!(
        "Selected qadapter {} ({}, {}) with {}",
        qad.priority(),
        qad.qtype(),
        qad.qname(),
        pconf
    );
    Ok(())
}

/// Request with an absolute working directory
fn job_request(job: &JobArgs) -> Result<JobRequest> {
    let mut req = job.to_request();
    let cwd = std::env::current_dir().map_err(|e| AbiQueueError::io(PathBuf::from("."), e))?;
    req.rebase(&cwd);
    Ok(req)
}

fn cmd_script(args: &CliArgs, job: &JobArgs) -> Result<()> {
    let req = job_request(job)?;
    let manager = args.load_manager()?.for_request(&req)?;
    println!("{}", manager.qadapter().get_script_str(&req));
    Ok(())
}

fn cmd_submit(args: &CliArgs, job: &JobArgs) -> Result<()> {
    let req = job_request(job)?;
    let mut manager = args.load_manager()?.for_request(&req)?;
    let submitted = manager.launch(&req)?;
    println!(
        "Submitted {} to {} with id {} ({} mpi procs x {} omp threads)",
        submitted.name, submitted.qtype, submitted.qid, submitted.mpi_procs, submitted.omp_threads
    );
    println!("Script: {}", submitted.script.display());
    Ok(())
}

fn cmd_run(args: &CliArgs, jobs: &Path, json: bool) -> Result<()> {
    let config = args.load_scheduler()?;
    let manager = args.load_manager()?;
    let list = JobList::from_file(jobs)?;

    let mut scheduler = Scheduler::new(config, manager, list.jobs)?;
    let summary = scheduler.run()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("=== Scheduler Summary ===");
        println!("Stopped:    {:?}", summary.reason);
        println!("Iterations: {}", summary.iterations);
        println!("Launches:   {}", summary.num_launches);
        println!("Completed:  {}", summary.completed);
        println!("Failed:     {}", summary.failed);
        println!("Cancelled:  {}", summary.cancelled);
        println!("Waiting:    {}", summary.waiting);
        println!("Errors:     {}", summary.num_errors);
        println!("Elapsed:    {}", humantime::format_duration(std::time::Duration::from_secs(summary.elapsed.as_secs())));
    }

    if summary.reason != StopReason::AllDone {
        std::process::exit(1);
    }
    Ok(())
}
