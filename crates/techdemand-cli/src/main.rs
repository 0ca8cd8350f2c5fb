use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use techdemand_client::ReqwestFetcher;
use techdemand_core::output::write_report;
use techdemand_core::pacing::Pacing;
use techdemand_core::traits::CountExtractor;
use techdemand_core::{
    AppConfig, Executor, SearchCountsExtractor, TracingRunReporter, build_report, build_tasks,
};

#[derive(Parser)]
#[command(
    name = "techdemand",
    version,
    about = "Count job vacancies per technology and city"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every (technology, city) count and write the report
    Run(RunArgs),

    /// Validate the configuration and list the queries without fetching
    Plan {
        /// Path to config.yaml (otherwise TECHDEMAND_CONFIG_PATH, then the configs directories)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Extract the vacancy count from a saved search page
    Extract {
        /// HTML file to scan
        file: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Path to config.yaml (otherwise TECHDEMAND_CONFIG_PATH, then the configs directories)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for report files
    #[arg(short, long, env = "TECHDEMAND_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Maximum number of queries in flight
    #[arg(long, env = "TECHDEMAND_MAX_CONCURRENCY")]
    max_concurrency: Option<usize>,

    /// Total attempts per query
    #[arg(long, env = "TECHDEMAND_RETRIES")]
    retries: Option<u32>,

    /// Per-request timeout in seconds
    #[arg(long, env = "TECHDEMAND_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Request pacing: off, attempts or launches
    #[arg(long, env = "TECHDEMAND_PACING")]
    pacing: Option<Pacing>,

    /// Pacing interval in milliseconds
    #[arg(long, env = "TECHDEMAND_RATE_LIMIT_MS")]
    rate_limit_ms: Option<u64>,

    /// Write a report even if some queries failed
    #[arg(long, default_value_t = false)]
    allow_partial: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("techdemand=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => cmd_run(args).await?,
        Commands::Plan { config } => cmd_plan(config.as_deref())?,
        Commands::Extract { file } => cmd_extract(&file)?,
    }

    Ok(())
}

/// Load the config from `path` or the first discovered location.
fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => AppConfig::discover()?,
    };
    tracing::info!(path = %path.display(), "Loading configuration");
    AppConfig::from_path(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

impl RunArgs {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(dir) = &self.output_dir {
            config.output.directory = dir.clone();
        }
        if let Some(n) = self.max_concurrency {
            config.parser.max_concurrency = n;
        }
        if let Some(n) = self.retries {
            config.parser.retry_count = n;
        }
        if let Some(secs) = self.timeout_secs {
            config.parser.timeout_seconds = secs;
        }
        if let Some(pacing) = self.pacing {
            config.parser.pacing = pacing;
        }
        if let Some(ms) = self.rate_limit_ms {
            config.parser.rate_limit_ms = ms;
        }
        if self.allow_partial {
            config.parser.allow_partial = true;
        }
    }
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    let cities = config.enabled_cities();
    let technologies = config.enabled_technologies();
    let tasks = build_tasks(&cities, &technologies);

    let fetcher = ReqwestFetcher::with_options(config.parser.timeout(), &config.parser.user_agent)
        .context("Failed to create HTTP client")?;
    let executor = Executor::new(fetcher, SearchCountsExtractor, config.run_config()?);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after in-flight requests");
            ctrl_c.cancel();
        }
    });

    let started = Local::now();
    println!(
        "Started at {} ({} queries, up to {} at once)",
        started.format("%Y-%m-%d %H:%M:%S"),
        tasks.len(),
        config.parser.max_concurrency
    );

    let run = executor
        .run(tasks, cancel, &TracingRunReporter)
        .await
        .context("Run did not complete")?;

    if config.parser.allow_partial {
        let failed = run.failures().count();
        if failed > 0 {
            tracing::warn!(failed, "Writing partial report");
        }
    } else {
        run.ensure_complete()?;
    }

    let report = build_report(&run.tasks, &cities, &technologies, Utc::now())?;
    let written = write_report(&report, &config.output)?;

    let finished = Local::now();
    println!("Finished at {}", finished.format("%Y-%m-%d %H:%M:%S"));
    println!("Duration: {:.2?}", run.elapsed);
    println!("Total vacancies: {}", report.summary.total);
    for path in &written {
        println!("  wrote {}", path.display());
    }

    Ok(())
}

fn cmd_plan(config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    config.validate()?;

    let run_config = config.run_config()?;
    let tasks = build_tasks(&config.enabled_cities(), &config.enabled_technologies());

    println!(
        "{} queries (max_concurrency={}, attempts={}, pacing={})\n",
        tasks.len(),
        run_config.max_concurrency,
        run_config.max_attempts,
        run_config.pacing
    );
    for task in &tasks {
        println!(
            "  {:<20} {:>6}  {}",
            task.technology_name,
            task.city_code,
            run_config
                .url_template
                .render(&task.search_term, task.city_code)
        );
    }

    Ok(())
}

fn cmd_extract(file: &Path) -> Result<()> {
    let body = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let count = SearchCountsExtractor.extract(&body)?;
    println!("{count}");
    Ok(())
}
