use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use clap::{Parser, Subcommand};
use isic_submission_core::config_file::{
    self, ConfigFile, ExtractionConfig, LinksConfig, PhaseConfig, WorkersConfig,
};
use isic_submission_core::{Config, MemoryStorage, SubmissionId};
use isic_submission_processor::{AbstractPool, JobEvent, JobObserver, ScoreHook, SubmissionScored};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod output;

use output::ColorMode;

/// ISIC challenge submission tools - extract PDF abstracts from scored submissions
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show which PDF would be extracted from a submission ZIP
    Inspect {
        /// Path to the submission ZIP
        zip_path: PathBuf,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Run post-scoring processing for submissions in a platform snapshot
    Process {
        /// JSON snapshot of platform records
        #[arg(long)]
        state: PathBuf,

        /// Ids of the submissions to treat as freshly scored
        #[arg(required = true)]
        submission_ids: Vec<String>,

        /// Where to write the updated snapshot (default: overwrite --state)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Public API base URL used in documentation links
        #[arg(long)]
        api_base_url: Option<String>,

        /// Number of extraction workers
        #[arg(long)]
        workers: Option<usize>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Print the resolved configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Inspect { zip_path, no_color } => inspect(&zip_path, ColorMode(!no_color)),
        Command::Process {
            state,
            submission_ids,
            output,
            api_base_url,
            workers,
            no_color,
        } => {
            let config = resolve_config(api_base_url, workers);
            process(
                state,
                submission_ids,
                output,
                config,
                ColorMode(!no_color),
            )
            .await
        }
        Command::Config => {
            let config = resolve_config(None, None);
            print!("{}", toml::to_string_pretty(&to_config_file(&config))?);
            Ok(())
        }
    }
}

/// Resolve configuration: CLI flags > env vars > config files > defaults
fn resolve_config(api_base_url: Option<String>, workers: Option<usize>) -> Config {
    let mut config = Config::from_file(&config_file::load_config());

    if let Some(url) = api_base_url.or_else(|| std::env::var("ISIC_API_BASE_URL").ok()) {
        config.api_base_url = url;
    }
    if let Some(n) = workers.or_else(|| {
        std::env::var("ISIC_NUM_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
    }) && n > 0
    {
        config.num_workers = n;
    }

    config
}

fn to_config_file(config: &Config) -> ConfigFile {
    ConfigFile {
        phase: Some(PhaseConfig {
            meta_key: Some(config.phase_meta_key.clone()),
            meta_value: Some(config.phase_meta_value.clone()),
        }),
        extraction: Some(ExtractionConfig {
            abstract_folder_name: Some(config.abstract_folder_name.clone()),
            read_chunk_size: Some(config.read_chunk_size),
            max_archive_size_mb: Some(config.max_archive_size / 1024 / 1024),
        }),
        links: Some(LinksConfig {
            api_base_url: Some(config.api_base_url.clone()),
        }),
        workers: Some(WorkersConfig {
            num_workers: Some(config.num_workers),
        }),
    }
}

fn inspect(zip_path: &Path, color: ColorMode) -> anyhow::Result<()> {
    let data = std::fs::read(zip_path)
        .with_context(|| format!("failed to read {}", zip_path.display()))?;
    let mut out = std::io::stdout().lock();

    output::print_header(&mut out, zip_path, data.len())?;
    let entries = match isic_submission_ingest::list_entries(&data) {
        Ok(entries) => entries,
        Err(e) => {
            output::print_rejected(&mut out, &e.to_string(), color)?;
            return Ok(());
        }
    };
    output::print_entries(&mut out, &entries, color)?;

    match isic_submission_ingest::extract_single_pdf(&data) {
        Ok(pdf) => output::print_selected(&mut out, &pdf, color)?,
        Err(e) => output::print_rejected(&mut out, &e.to_string(), color)?,
    }
    Ok(())
}

async fn process(
    state: PathBuf,
    submission_ids: Vec<String>,
    output_path: Option<PathBuf>,
    config: Config,
    color: ColorMode,
) -> anyhow::Result<()> {
    let storage = Arc::new(
        MemoryStorage::load_json(&state)
            .with_context(|| format!("failed to load snapshot {}", state.display()))?,
    );
    let config = Arc::new(config);
    tracing::info!(
        submissions = submission_ids.len(),
        workers = config.num_workers,
        "processing scored submissions"
    );

    let events: Arc<Mutex<Vec<JobEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let observer: JobObserver = Arc::new(move |event| {
        sink.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    });

    let pool = AbstractPool::new(
        storage.clone(),
        config.clone(),
        CancellationToken::new(),
        config.num_workers,
        Some(observer),
    );
    let hook = ScoreHook::new(storage.clone(), config.clone(), &pool);

    let (tx, rx) = async_channel::unbounded();
    for id in submission_ids {
        tx.send(SubmissionScored {
            submission_id: SubmissionId::new(id),
        })
        .await
        .context("score event channel closed")?;
    }
    drop(tx);

    let stats = hook.listen(rx).await;
    pool.shutdown().await;

    let events = events
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    let mut out = std::io::stdout().lock();
    output::print_summary(&mut out, &stats, &events, color)?;

    let target = output_path.unwrap_or(state);
    storage
        .save_json(&target)
        .with_context(|| format!("failed to write snapshot {}", target.display()))?;
    writeln!(out, "Wrote snapshot to {}", target.display())?;

    Ok(())
}
