//! poolscale — operator CLI.
//!
//! Works directly against the autoscaler's state store and pool config
//! files; nothing here talks to a cloud provider or a scheduler.
//!
//! # Usage
//!
//! ```text
//! poolscale pause --cluster norcal --pool batch --until 1700000000
//! poolscale history --cluster norcal --pool batch --metric cpus_total
//! poolscale prune-history --before 1690000000
//! poolscale check-config --pool-config pools/batch.mesos.toml --defaults defaults.toml
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;

use commands::PoolArgs;

#[derive(Parser)]
#[command(
    name = "poolscale",
    about = "poolscale — cluster pool autoscaler",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to the autoscaler state store.
    #[arg(long, global = true, default_value = "/var/lib/poolscale/state.redb")]
    state: PathBuf,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Pause autoscaling for a pool
    Pause {
        #[command(flatten)]
        pool: PoolArgs,
        /// Resume automatically at this unix timestamp
        #[arg(long)]
        until: Option<u64>,
    },
    /// Resume autoscaling for a pool
    Resume {
        #[command(flatten)]
        pool: PoolArgs,
    },
    /// Show whether autoscaling is paused for a pool
    Paused {
        #[command(flatten)]
        pool: PoolArgs,
    },
    /// Print recorded metadata history for a pool
    History {
        #[command(flatten)]
        pool: PoolArgs,
        /// Metadata metric, e.g. non_orphan_fulfilled_capacity or cpus_total
        #[arg(short, long)]
        metric: String,
        /// Start of the window (unix seconds); defaults to one week ago
        #[arg(long)]
        start: Option<u64>,
        /// End of the window (unix seconds); defaults to now
        #[arg(long)]
        end: Option<u64>,
        /// Number of non-zero points to average
        #[arg(long, default_value = "5")]
        smoothing: usize,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Delete recorded metadata history older than a timestamp
    PruneHistory {
        /// Unix timestamp; defaults to one week ago
        #[arg(long)]
        before: Option<u64>,
    },
    /// Load, resolve and validate a pool config
    CheckConfig {
        /// Pool config file
        #[arg(long)]
        pool_config: PathBuf,
        /// Cluster-wide defaults file
        #[arg(long)]
        defaults: Option<PathBuf>,
        #[command(flatten)]
        pool: PoolArgs,
        /// Resolve a manual target: "min", "max" or a number
        #[arg(long)]
        target: Option<String>,
    },
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("poolscale=info".parse()?);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    match cli.command {
        Commands::Pause { pool, until } => commands::pause::pause(&cli.state, &pool, until),
        Commands::Resume { pool } => commands::pause::resume(&cli.state, &pool),
        Commands::Paused { pool } => commands::pause::status(&cli.state, &pool),
        Commands::History {
            pool,
            metric,
            start,
            end,
            smoothing,
            format,
        } => commands::history::history(
            &cli.state,
            &pool,
            &metric,
            commands::history::Window { start, end, smoothing },
            &format,
        ),
        Commands::PruneHistory { before } => commands::history::prune(&cli.state, before),
        Commands::CheckConfig {
            pool_config,
            defaults,
            pool,
            target,
        } => commands::config::check_config(
            &pool_config,
            defaults.as_deref(),
            &pool,
            target.as_deref(),
        ),
    }
}
