#![deny(
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used
)]
#![allow(clippy::print_stdout)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use bd_client::{BorrowDirectError, CatalogClient, HttpCatalogClient};
use bd_harness::{
    config::Config,
    db::setup_database,
    logging,
    pipeline::{
        run_worker, shutdown_on_ctrl_c, ResultAggregator, TestJobDispatcher, TestJobWorker,
        WorkerOptions,
    },
    queue::PgJobQueue,
    store::PgResultStore,
};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bd-harness", version, about = "Batch ISBN tests against the BorrowDirect API")]
struct Cli {
    /// YAML config file; BDH_* environment variables override it.
    #[arg(long, default_value = "config.yaml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enqueue one test job per distinct identifier.
    Enqueue {
        /// JSON array of identifiers (defaults to batch.input_path).
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Claim and run test jobs.
    Work {
        #[arg(long)]
        concurrency: Option<usize>,
        /// Exit when the queue is empty instead of polling.
        #[arg(long)]
        burst: bool,
    },
    /// Write every stored entry of the batch namespace to a JSON report.
    Report {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Authenticate and authorize a patron without touching the catalog.
    CheckPatron {
        /// Barcode to check (defaults to patrons.good_barcode).
        #[arg(long, conflicts_with = "bad")]
        barcode: Option<String>,
        /// Check that patrons.bad_barcode is refused.
        #[arg(long)]
        bad: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Load and validate configuration first (fail-fast)
    let config = Config::load_from(&cli.config).map_err(|e| anyhow!("{e}"))?;
    logging::init(&config.logging)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "bd-harness starting up");

    match cli.command {
        Command::Enqueue { input } => enqueue(&config, input).await,
        Command::Work { concurrency, burst } => work(&config, concurrency, burst).await,
        Command::Report { output } => report(&config, output).await,
        Command::CheckPatron { barcode, bad } => {
            if bad {
                check_rejected_patron(&config).await
            } else {
                check_patron(&config, barcode).await
            }
        }
    }
}

fn catalog_client(config: &Config) -> anyhow::Result<HttpCatalogClient> {
    let http = reqwest::Client::builder()
        .timeout(config.borrowdirect.request_timeout())
        .build()
        .context("building HTTP client")?;
    Ok(HttpCatalogClient::with_client(
        http,
        config.borrowdirect.client_settings(),
    ))
}

async fn enqueue(config: &Config, input: Option<PathBuf>) -> anyhow::Result<()> {
    config.validate_database().map_err(|e| anyhow!("{e}"))?;
    let path = input
        .or_else(|| config.batch.input_path.as_ref().map(PathBuf::from))
        .ok_or_else(|| anyhow!("no input file: pass --input or set batch.input_path"))?;

    let pool = setup_database(&config.database).await?;
    let dispatcher = TestJobDispatcher::new(
        Arc::new(PgJobQueue::new(pool.clone(), config.batch.max_attempts)),
        Arc::new(PgResultStore::new(pool)),
        config.batch.queue_name.clone(),
        config.batch.namespace.clone(),
        config.batch.job_timeout(),
    );

    let dispatched = dispatcher.dispatch(&path).await?;
    println!("enqueued {} jobs on {}", dispatched.len(), config.batch.queue_name);
    Ok(())
}

async fn work(config: &Config, concurrency: Option<usize>, burst: bool) -> anyhow::Result<()> {
    config.validate_database().map_err(|e| anyhow!("{e}"))?;
    let patron = config.job_patron().map_err(|e| anyhow!("{e}"))?;

    let pool = setup_database(&config.database).await?;
    let worker = TestJobWorker::new(
        Arc::new(catalog_client(config)?),
        Arc::new(PgResultStore::new(pool.clone())),
        config.batch.namespace.clone(),
        patron,
        config.batch.settle_delay(),
    );
    let options = WorkerOptions {
        concurrency: concurrency.unwrap_or(config.batch.concurrency),
        poll_interval: config.batch.poll_interval(),
        burst,
    };

    let summary = run_worker(
        Arc::new(PgJobQueue::new(pool, config.batch.max_attempts)),
        Arc::new(worker),
        &config.batch.queue_name,
        options,
        shutdown_on_ctrl_c(),
    )
    .await?;

    println!(
        "completed {}, failed {}, superseded {}",
        summary.completed, summary.failed, summary.superseded
    );
    Ok(())
}

async fn report(config: &Config, output: Option<PathBuf>) -> anyhow::Result<()> {
    config.validate_database().map_err(|e| anyhow!("{e}"))?;
    let path = output.unwrap_or_else(|| PathBuf::from(&config.batch.output_path));

    let pool = setup_database(&config.database).await?;
    let aggregator = ResultAggregator::new(
        Arc::new(PgResultStore::new(pool)),
        config.batch.namespace.clone(),
    );

    let report = aggregator.write_report(&path).await?;
    println!("wrote {} entries to {}", report.len(), path.display());
    Ok(())
}

async fn check_patron(config: &Config, barcode: Option<String>) -> anyhow::Result<()> {
    let barcode = match barcode {
        Some(barcode) => barcode,
        None => config.job_patron().map_err(|e| anyhow!("{e}"))?.to_string(),
    };

    let outcome = catalog_client(config)?.run_auth_nz(&barcode).await?;
    println!(
        "patron valid: {} (authorization id {})",
        outcome.valid, outcome.authorization_id
    );
    Ok(())
}

async fn check_rejected_patron(config: &Config) -> anyhow::Result<()> {
    let barcode = config.rejected_patron().map_err(|e| anyhow!("{e}"))?;

    match catalog_client(config)?.run_auth_nz(barcode).await {
        Err(BorrowDirectError::Authentication { message }) => {
            println!("bad patron refused: {message}");
            Ok(())
        }
        Ok(outcome) if !outcome.valid => {
            println!("bad patron refused at authorization");
            Ok(())
        }
        Ok(_) => Err(anyhow!("patrons.bad_barcode was accepted by the service")),
        Err(err) => Err(err.into()),
    }
}
