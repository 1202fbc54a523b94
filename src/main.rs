//! # Idea Hunter CLI (`hunt`)
//!
//! ## Usage
//!
//! ```bash
//! hunt --config ./config/hunt.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `hunt init` | Create the SQLite database and run schema migrations |
//! | `hunt sources` | List configured sources |
//! | `hunt run` | Collect, filter and generate ideas |
//! | `hunt stats` | Summarise what is stored |
//! | `hunt guard <file>` | Check a usage-sample file against the token ceiling |

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use idea_hunter::config;
use idea_hunter::cost_guard::CostGuard;
use idea_hunter::fetch::Fetcher;
use idea_hunter::generator::IdeaGenerator;
use idea_hunter::llm;
use idea_hunter::migrate;
use idea_hunter::pipeline::Pipeline;
use idea_hunter::progress::ProgressMode;
use idea_hunter::prompts;
use idea_hunter::source::SourceRegistry;
use idea_hunter::sources;
use idea_hunter::sqlite_store::SqliteStore;
use idea_hunter::stats;

/// Idea Hunter: complaints in, scored product ideas out.
#[derive(Parser)]
#[command(name = "hunt", version, about = "Idea Hunter — complaints in, scored product ideas out")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/hunt.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// List configured sources and whether they are enabled.
    Sources,

    /// Run the pipeline once: collect, filter, generate.
    Run {
        /// Stop starting new generations once the running mean exceeds the ceiling.
        #[arg(long)]
        preemptive_guard: bool,

        /// Print the run statistics as JSON instead of a summary.
        #[arg(long)]
        json: bool,

        /// Exit with status 2 when the cost guard trips or the daily budget is spent.
        #[arg(long)]
        fail_on_guard: bool,

        /// Progress output on stderr. Defaults to human on a TTY, off otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
    },

    /// Summarise stored complaints, ideas and errors.
    Stats,

    /// Check a JSON usage-sample file against the token ceiling.
    ///
    /// Exits with status 2 when the mean exceeds the ceiling.
    Guard {
        /// JSON array of `{ "tokens_used": N, "idea_generated": bool }`.
        samples: PathBuf,

        /// Override `cost_guard.token_ceiling`.
        #[arg(long)]
        ceiling: Option<f64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("idea_hunter=info,hunt=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Run {
            preemptive_guard,
            json,
            fail_on_guard,
            progress,
        } => {
            let store = Arc::new(SqliteStore::open(&cfg).await?);
            let fetcher = Arc::new(Fetcher::new(&cfg.fetch)?);
            let registry = SourceRegistry::from_config(&cfg, fetcher);
            if registry.is_empty() {
                warn!("No sources enabled; only the generation backlog will be processed");
            }

            let generator = if cfg.generation.is_enabled() {
                let model = llm::create_model(&cfg.generation)?;
                let template = prompts::load_template(cfg.generation.prompt_path.as_deref())?;
                Some(IdeaGenerator::new(model, template))
            } else {
                info!("Generation provider disabled; skipping idea generation");
                None
            };

            let mode = progress
                .map(ProgressMode::from)
                .unwrap_or_else(ProgressMode::default_for_tty);
            let pipeline = Pipeline::new(&cfg, store.clone(), registry, generator)
                .with_progress(mode.reporter())
                .with_preemptive_guard(preemptive_guard || cfg.cost_guard.preemptive);

            let stop = pipeline.stop_signal();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Stop requested; finishing in-flight work");
                    stop.cancel();
                }
            });

            let run = pipeline.run().await;
            store.close().await;

            if json {
                println!("{}", serde_json::to_string_pretty(&run)?);
            } else {
                stats::print_run_stats(&run);
            }

            if fail_on_guard && (run.guard_tripped || run.budget_exhausted) {
                std::process::exit(2);
            }
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Guard { samples, ceiling } => {
            let mut guard = CostGuard::new(&cfg.cost_guard);
            if let Some(ceiling) = ceiling {
                guard = guard.with_ceiling(ceiling);
            }
            let report = guard.check_sample_file(&samples)?;
            println!(
                "samples: {}  mean tokens: {:.1}  ceiling: {:.0}  est. cost: ${:.4}",
                report.samples, report.mean_tokens, report.ceiling, report.estimated_cost_usd
            );
            if report.tripped {
                println!("cost guard TRIPPED");
                std::process::exit(2);
            }
            println!("cost guard ok");
        }
    }

    Ok(())
}
