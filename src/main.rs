use clap::{Parser, Subcommand};
use git_timemachine::commands::*;
use git_timemachine::core::{
    error::{Result, TimeMachineError},
    print_error,
};
use std::env;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "git-timemachine")]
#[command(about = "Automatic snapshots of your working tree, kept apart from your git history")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the snapshot store for this repository
    Init,
    /// Watch the working tree and snapshot changes until Ctrl-C
    Start,
    /// Take a snapshot now
    Snapshot {
        /// Snapshot message (defaults to a timestamp)
        #[arg(short, long)]
        message: Option<String>,
    },
    /// List snapshots, newest first
    List {
        /// Maximum number of snapshots to show (0 for all)
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
        /// Only snapshots that touched this path
        path: Option<PathBuf>,
    },
    /// Show a snapshot and the files it changed
    Show {
        /// Snapshot id (full or abbreviated)
        id: String,
    },
    /// Restore working tree files from a snapshot
    Restore {
        /// Snapshot id (full or abbreviated)
        id: String,
        /// Files to restore (all files when omitted)
        files: Vec<PathBuf>,
    },
    /// Show snapshot store and branch status
    Status,
    /// Prune old snapshots and compact the store
    Clean,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Configure logging based on --debug flag
    if cli.debug {
        env::set_var("RUST_LOG", "debug");
    } else {
        env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let result = match cli.command {
        Commands::Init => execute_init(),
        Commands::Start => execute_start(),
        Commands::Snapshot { message } => execute_snapshot(message),
        Commands::List { limit, path } => execute_list(limit, path),
        Commands::Show { id } => execute_show(&id),
        Commands::Restore { id, files } => execute_restore(&id, files),
        Commands::Status => execute_status(),
        Commands::Clean => execute_clean(),
    };

    if let Err(e) = result {
        if let TimeMachineError::NotInGitRepo = e {
            print_error("Not in a git repository");
        } else {
            print_error(&e.to_string());
        }
        // environment problems are the caller's to fix; anything else failed mid-run
        if e.is_environment_error() {
            std::process::exit(2);
        }
        log::debug!("{e:?}");
        std::process::exit(1);
    }

    Ok(())
}
