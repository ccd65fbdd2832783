//! vqpu Command-Line Interface
//!
//! Launches virtual QPU workers: single-process groups, rank groups, socket
//! workers and quantum-communication executors/members.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;

use vqpu_worker::{WorkerConfig, init_tracing};

mod commands;

use commands::{executor, member, qpu, ranks, run};

/// vqpu - co-execution of distributed quantum tasks on virtual QPUs
#[derive(Parser)]
#[command(name = "vqpu")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Worker configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Co-execute tasks in one process and one combined register
    Run {
        /// Task documents (JSON)
        #[arg(short, long, required = true, num_args = 1..)]
        task: Vec<String>,

        /// Output file for the result document
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Run a classical-communication group in-process, one rank per task
    Ranks {
        /// Task documents (JSON)
        #[arg(short, long, required = true, num_args = 1..)]
        task: Vec<String>,

        /// Output file for the result documents
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Run one task as a socket-connected worker
    Qpu {
        /// Task document (JSON)
        #[arg(short, long)]
        task: String,

        /// Job identifier shared by all workers of the group
        #[arg(long)]
        job_id: String,

        /// Output file for the result document
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Host a quantum-communication group
    Executor {
        /// Job identifier shared by the group
        #[arg(long)]
        job_id: String,

        /// Number of members to wait for
        #[arg(long)]
        group_size: usize,
    },

    /// Join a quantum-communication group and submit one task
    Member {
        /// Task document (JSON)
        #[arg(short, long)]
        task: String,

        /// Job identifier shared by the group
        #[arg(long)]
        job_id: String,

        /// Position of this member in the group
        #[arg(long)]
        local_id: String,

        /// Output file for the result document
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match WorkerConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            std::process::exit(1);
        }
    };
    init_tracing(&config.logging, cli.verbose)?;

    // Execute command
    let result = match cli.command {
        Commands::Run { task, output } => run::execute(&task, output.as_deref(), &config).await,

        Commands::Ranks { task, output } => {
            ranks::execute(&task, output.as_deref(), &config).await
        }

        Commands::Qpu {
            task,
            job_id,
            output,
        } => qpu::execute(&task, &job_id, output.as_deref(), &config).await,

        Commands::Executor { job_id, group_size } => {
            executor::execute(&job_id, group_size, &config).await
        }

        Commands::Member {
            task,
            job_id,
            local_id,
            output,
        } => member::execute(&task, &job_id, &local_id, output.as_deref(), &config).await,
    };

    // Handle errors
    if let Err(e) = result {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
