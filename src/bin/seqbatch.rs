use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use seqbatch::args::extract_jobs;
use seqbatch::cache::FileCache;
use seqbatch::config::Config;
use seqbatch::error::PipelineError;
use seqbatch::jobs::{Job, Services};
use seqbatch::storage::GcsHttpClient;
use seqbatch::toolbox::SystemToolbox;

#[derive(Parser)]
#[command(name = "seqbatch")]
#[command(about = "Run genomics batch jobs (alignment, deduplication, flagstat) against bucket storage")]
#[command(version, author)]
struct Cli {
    /// Root of the local file-cache mirror shared by all jobs.
    #[arg(long)]
    cache_dir: Option<Utf8PathBuf>,

    /// Working directory for per-job intermediate files.
    #[arg(long)]
    work_dir: Option<Utf8PathBuf>,

    /// Parse and log the job list without executing anything.
    #[arg(long)]
    dry_run: bool,

    /// Job blocks: `<job-kind> [flags…]`, repeated. Job kinds: dna_align,
    /// rna_align, umi_dedup, mark_dedup, flagstat.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    jobs: Vec<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<PipelineError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PipelineError) -> u8 {
    match error {
        PipelineError::UnknownJob(_) | PipelineError::InvalidJobArguments(_) => 2,
        PipelineError::StorageHttp(_)
        | PipelineError::StorageStatus { .. }
        | PipelineError::ToolFailed(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("starting seqbatch");

    let cli = Cli::parse();

    tracing::info!("extracting jobs from arguments");
    let jobs = extract_jobs(&cli.jobs).into_diagnostic()?;
    if jobs.is_empty() {
        tracing::warn!("no jobs detected");
        return Ok(());
    }

    if cli.dry_run {
        for job in &jobs {
            tracing::info!("dry run: would execute {} job", job.kind().name());
        }
        tracing::info!("finished dry run");
        return Ok(());
    }

    let config = Config::resolve(cli.cache_dir, cli.work_dir).into_diagnostic()?;
    let token = std::env::var("GCS_OAUTH_TOKEN").ok();
    let client = GcsHttpClient::new(token).into_diagnostic()?;
    let cache = FileCache::new(config.cache_dir.clone(), client);
    let toolbox = SystemToolbox::new().into_diagnostic()?;
    let services = Services {
        cache,
        toolbox,
        work_dir: config.work_dir.clone(),
    };

    let failed = run_jobs(&jobs, &services);

    tracing::info!("finished seqbatch");
    if failed > 0 {
        return Err(miette::Report::msg(format!(
            "{failed} of {} jobs failed",
            jobs.len()
        )));
    }
    Ok(())
}

/// Jobs run strictly sequentially in submission order. A failed job is
/// logged and the runner moves on to the next one.
fn run_jobs<C, T>(jobs: &[Job], services: &Services<C, T>) -> usize
where
    C: seqbatch::storage::ObjectStoreClient,
    T: seqbatch::toolbox::Toolbox,
{
    let mut failed = 0usize;
    for job in jobs {
        if let Err(err) = job.execute(services) {
            tracing::error!("{} job failed: {err}", job.kind().name());
            failed += 1;
        }
    }
    failed
}
