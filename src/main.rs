//! dbgtap: capture live OS debug output and serve it to filtered sessions.
//!
//! The default mode hosts the capture manager behind an MCP stdio server.
//! `tail` streams filtered events straight to the terminal, and `processes`
//! lists pids/names for building filters.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dbgtap::ringlog::DEFAULT_CAPACITY;
use dbgtap::{CaptureConfig, CaptureManager, FilterSpec};

#[derive(Parser)]
#[command(name = "dbgtap")]
#[command(about = "Capture and filter live OS debug output")]
#[command(version)]
struct Cli {
    /// Path to the native capture executable. Defaults to
    /// $DBGTAP_CAPTURE_EXE, then to a capture binary next to this one.
    #[arg(long)]
    capture_exe: Option<PathBuf>,

    /// Ring log capacity, in events
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    capacity: usize,

    /// Capture from all login sessions (requires elevation)
    #[arg(long)]
    global: bool,

    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve capture sessions as MCP tools over stdio (the default)
    Serve,

    /// Stream filtered debug output to stdout until Ctrl-C
    Tail {
        /// Include regex; may be repeated, events matching any are shown
        #[arg(short, long)]
        include: Vec<String>,

        /// Exclude regex; may be repeated, overrides includes
        #[arg(short = 'x', long)]
        exclude: Vec<String>,

        /// Only show events from these pids
        #[arg(short, long)]
        pid: Vec<u32>,

        /// Process-name regex; may be repeated
        #[arg(long)]
        process_name: Vec<String>,
    },

    /// List running processes, optionally filtered by name substring
    Processes { name_filter: Option<String> },
}

fn init_tracing(verbose: bool) {
    // Logs go to stderr: stdout is the MCP transport in serve mode and the
    // event stream in tail mode.
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_serve(manager: Arc<CaptureManager>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(dbgtap::mcp::run_mcp_server(manager))
}

fn run_tail(manager: Arc<CaptureManager>, filters: FilterSpec) -> Result<()> {
    let (session_id, _) = manager.create_session(Some("tail".to_string()))?;
    if !filters.is_empty() {
        manager.set_filters(&session_id, filters)?;
    }

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    ctrlc::set_handler(move || stop_flag.store(true, Ordering::Release))?;

    while !stop.load(Ordering::Acquire) {
        let Some((events, _)) = manager.get_output(&session_id, Some(500)) else {
            break;
        };
        for event in events {
            let name = event.process_name.as_deref().unwrap_or("<unknown>");
            println!("{:>8} {:>6} {:<20} {}", event.seq, event.pid, name, event.text);
        }
        if !manager.is_running() {
            tracing::warn!("capture subprocess exited; stopping tail");
            break;
        }
        std::thread::sleep(Duration::from_millis(200));
    }

    manager.destroy_session(&session_id);
    manager.stop_capture();
    Ok(())
}

fn run_processes(manager: &CaptureManager, name_filter: Option<&str>) -> Result<()> {
    let processes = manager.list_processes(name_filter);
    for process in &processes {
        println!("{:>8}  {}", process.pid, process.name);
    }
    tracing::debug!("{} processes listed", processes.len());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = CaptureConfig {
        capacity: cli.capacity,
        global_scope: cli.global,
        ..CaptureConfig::default()
    };
    if let Some(exe) = cli.capture_exe {
        config.capture_exe = exe;
    }
    let manager = Arc::new(CaptureManager::new(config));

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_serve(manager),
        Commands::Tail {
            include,
            exclude,
            pid,
            process_name,
        } => run_tail(
            manager,
            FilterSpec {
                include,
                exclude,
                process_pids: pid,
                process_names: process_name,
            },
        ),
        Commands::Processes { name_filter } => run_processes(&manager, name_filter.as_deref()),
    }
}
