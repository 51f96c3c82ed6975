mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use packops_core::policy::PolicyMode;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "packops",
    about = "Research pipeline and policy-driven orchestration for compliance packs",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .packops/)
    #[arg(long, global = true, env = "PACKOPS_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize packops in the current project
    Init,

    /// Run the fixed pipeline (intake, validation, scoring, deep research, summary)
    RunPack { slug: String },

    /// Run one policy-driven episode for a work item
    Orchestrate {
        slug: String,

        /// static, rule or rl
        #[arg(long, default_value = "rule")]
        policy: PolicyMode,

        /// Step budget (default: loop.max_steps from config)
        #[arg(long)]
        max_steps: Option<u32>,

        /// Sample RL actions from a softmax instead of taking the argmax
        #[arg(long)]
        softmax: bool,

        /// Seed for softmax sampling
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Run several episodes to seed the telemetry logs
    Batch {
        /// Number of runs
        #[arg(long, default_value = "10")]
        count: usize,

        /// Run every episode on this work item (default: round-robin over the catalog)
        #[arg(long)]
        slug: Option<String>,

        #[arg(long, default_value = "rule")]
        policy: PolicyMode,

        #[arg(long)]
        max_steps: Option<u32>,
    },

    /// Fold completed runs into the RL weight table
    Train {
        #[arg(long)]
        learning_rate: Option<f64>,

        /// Newest runs considered in this pass
        #[arg(long)]
        max_runs: Option<usize>,
    },

    /// Show the action a policy would choose next, without running it
    Next {
        slug: String,

        #[arg(long, default_value = "rule")]
        policy: PolicyMode,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::RunPack { .. } | Commands::Orchestrate { .. } | Commands::Batch { .. } => {
            tracing::Level::INFO
        }
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::RunPack { slug } => cmd::run_pack::run(&root, &slug, cli.json),
        Commands::Orchestrate {
            slug,
            policy,
            max_steps,
            softmax,
            seed,
        } => cmd::orchestrate::run(
            &root,
            &slug,
            cmd::orchestrate::RunOptions {
                policy,
                max_steps,
                softmax,
                seed,
            },
            cli.json,
        ),
        Commands::Batch {
            count,
            slug,
            policy,
            max_steps,
        } => cmd::batch::run(&root, count, slug.as_deref(), policy, max_steps, cli.json),
        Commands::Train {
            learning_rate,
            max_runs,
        } => cmd::train::run(&root, learning_rate, max_runs, cli.json),
        Commands::Next { slug, policy } => cmd::next::run(&root, &slug, policy, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
