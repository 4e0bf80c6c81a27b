use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use artisync_core::{config, Config, Job, JobKey};
use artisync_sync::{default_workers, ExclusionSet, Ledger, SyncReport, Synchronizer};

use crate::error::{io_err, DaemonError};
use crate::paths::{artifacts_dir, ledger_path, package_path, DEFAULT_POLL_INTERVAL};
use crate::source::{ArtifactSource, GithubSource, GITHUB_API};

/// Runtime knobs supplied by the entry binary.
#[derive(Debug, Clone)]
pub struct Options {
    pub interval: Duration,
    pub workers: usize,
    pub api_base: String,
    /// Run a single cycle and exit.
    pub once: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            workers: default_workers(),
            api_base: GITHUB_API.to_string(),
            once: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// A job with its exclusion rules compiled.
#[derive(Debug, Clone)]
pub struct PreparedJob {
    pub job: Job,
    pub key: JobKey,
    pub exclusions: ExclusionSet,
}

impl PreparedJob {
    pub fn new(job: Job) -> Self {
        let key = job.key();
        let exclusions = ExclusionSet::compile(&job.excludes);
        tracing::info!(
            job = %key,
            deploy_path = %job.deploy_path.display(),
            excludes = exclusions.len(),
            "job loaded"
        );
        Self {
            job,
            key,
            exclusions,
        }
    }
}

/// Everything a cycle needs besides the ledger. Immutable once built.
pub struct Context {
    root: PathBuf,
    jobs: Vec<PreparedJob>,
    source: Box<dyn ArtifactSource>,
    synchronizer: Synchronizer,
}

impl Context {
    pub fn new(
        root: PathBuf,
        config: &Config,
        source: Box<dyn ArtifactSource>,
        workers: usize,
    ) -> Result<Self, DaemonError> {
        Ok(Self {
            root,
            jobs: config.jobs.iter().cloned().map(PreparedJob::new).collect(),
            source,
            synchronizer: Synchronizer::new(workers)?,
        })
    }

    pub fn jobs(&self) -> &[PreparedJob] {
        &self.jobs
    }
}

/// What happened to one job in one cycle.
#[derive(Debug)]
pub enum JobOutcome {
    /// The provider has no usable artifact with the job's name.
    NoArtifact,
    /// The newest version was already retrieved.
    UpToDate { version: DateTime<Utc> },
    /// A new version was retrieved and applied.
    Applied {
        version: DateTime<Utc>,
        report: SyncReport,
    },
    /// The job was skipped this cycle.
    Failed { error: DaemonError },
}

/// Check one job for a new artifact version and apply it.
///
/// Order: list, compare with the ledger, download, record in the ledger,
/// synchronize. A crash during synchronization therefore leaves the version
/// recorded as applied.
pub fn run_job(ctx: &Context, prepared: &PreparedJob, ledger: &mut Ledger) -> JobOutcome {
    let key = &prepared.key;

    let version = match ctx.source.latest(&prepared.job) {
        Ok(Some(version)) => version,
        Ok(None) => {
            tracing::info!(job = %key, "no artifact available");
            return JobOutcome::NoArtifact;
        }
        Err(error) => {
            tracing::warn!(job = %key, error = %error, "artifact listing failed");
            return JobOutcome::Failed { error };
        }
    };

    if version.is_same_version(ledger.get(key)) {
        tracing::debug!(job = %key, version = %version.created_at, "up to date");
        return JobOutcome::UpToDate {
            version: version.created_at,
        };
    }

    let package = package_path(&ctx.root, key);
    tracing::info!(
        job = %key,
        version = %version.created_at,
        artifact_id = version.id,
        "new artifact version"
    );
    let bytes = match ctx.source.download(&prepared.job, &version, &package) {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::warn!(job = %key, error = %error, "artifact download failed");
            return JobOutcome::Failed { error };
        }
    };
    tracing::debug!(job = %key, bytes, package = %package.display(), "package stored");

    if let Err(err) = ledger.set(key, version.created_at) {
        tracing::error!(job = %key, error = %err, "ledger update failed");
        return JobOutcome::Failed { error: err.into() };
    }

    match ctx
        .synchronizer
        .synchronize(&package, &prepared.job.deploy_path, &prepared.exclusions)
    {
        Ok(report) => {
            tracing::info!(
                job = %key,
                written = report.written(),
                unchanged = report.skipped(),
                excluded = report.excluded.len(),
                failed = report.failed(),
                "artifact applied"
            );
            JobOutcome::Applied {
                version: version.created_at,
                report,
            }
        }
        Err(err) => {
            tracing::error!(job = %key, error = %err, "synchronization failed");
            JobOutcome::Failed { error: err.into() }
        }
    }
}

/// Run every job once, in configuration order.
///
/// `stop` is checked between jobs; a job that has started always finishes.
pub fn run_cycle(ctx: &Context, ledger: &mut Ledger, stop: &AtomicBool) -> Vec<(JobKey, JobOutcome)> {
    let started = Instant::now();
    let mut outcomes = Vec::with_capacity(ctx.jobs.len());
    for prepared in &ctx.jobs {
        if stop.load(Ordering::SeqCst) {
            tracing::info!("shutdown requested, skipping remaining jobs");
            break;
        }
        outcomes.push((prepared.key.clone(), run_job(ctx, prepared, ledger)));
    }

    let applied = outcomes
        .iter()
        .filter(|(_, o)| matches!(o, JobOutcome::Applied { .. }))
        .count();
    let failed = outcomes
        .iter()
        .filter(|(_, o)| matches!(o, JobOutcome::Failed { .. }))
        .count();
    tracing::info!(
        jobs = outcomes.len(),
        applied,
        failed,
        duration_ms = started.elapsed().as_millis() as u64,
        "cycle complete"
    );
    outcomes
}

// ---------------------------------------------------------------------------
// Control loop
// ---------------------------------------------------------------------------

/// Start the runtime and block the current thread until it exits.
pub fn start_blocking(root: &Path, options: Options) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(root.to_path_buf(), options))
}

/// Load configuration and ledger from `root`, then poll until Ctrl-C (or
/// after one cycle with [`Options::once`]).
pub async fn run(root: PathBuf, options: Options) -> Result<(), DaemonError> {
    let config = config::load_at(&root)?;
    ensure_runtime_dirs(&root)?;
    let ledger = Ledger::load_at(&ledger_path(&root))?;
    tracing::info!(
        root = %root.display(),
        jobs = config.jobs.len(),
        ledger_entries = ledger.len(),
        "starting"
    );

    let source = GithubSource::with_api_base(config.secrets.clone(), options.api_base.clone());
    let ctx = Arc::new(Context::new(root, &config, Box::new(source), options.workers)?);
    run_with(ctx, ledger, &options).await?;
    tracing::info!("stopped");
    Ok(())
}

/// Poll with an already-built context. Returns the ledger on exit.
pub async fn run_with(
    ctx: Arc<Context>,
    ledger: Ledger,
    options: &Options,
) -> Result<Ledger, DaemonError> {
    let (shutdown_tx, _) = broadcast::channel::<()>(4);
    let stop = Arc::new(AtomicBool::new(false));

    let loop_handle = {
        let shutdown_rx = shutdown_tx.subscribe();
        let stop = stop.clone();
        let options = options.clone();
        tokio::spawn(poll_loop(ctx, ledger, options, stop, shutdown_rx))
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        let stop = stop.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, finishing current job");
                            stop.store(true, Ordering::SeqCst);
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Runtime(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let ledger = handle_join("poll_loop", loop_handle.await)?;
    let _ = shutdown_tx.send(());
    handle_join("signal_handler", signal_handle.await)?;
    Ok(ledger)
}

/// Run a cycle immediately and then once per `options.interval`.
pub async fn poll_loop(
    ctx: Arc<Context>,
    mut ledger: Ledger,
    options: Options,
    stop: Arc<AtomicBool>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<Ledger, DaemonError> {
    let mut interval = tokio::time::interval(options.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {}
        }

        ledger = run_cycle_blocking(ctx.clone(), ledger, stop.clone()).await?;

        if options.once || stop.load(Ordering::SeqCst) {
            break;
        }
    }
    Ok(ledger)
}

/// The ledger moves into the blocking task and comes back with it.
async fn run_cycle_blocking(
    ctx: Arc<Context>,
    mut ledger: Ledger,
    stop: Arc<AtomicBool>,
) -> Result<Ledger, DaemonError> {
    tokio::task::spawn_blocking(move || {
        run_cycle(&ctx, &mut ledger, &stop);
        ledger
    })
    .await
    .map_err(|err| DaemonError::Runtime(format!("cycle task join error: {err}")))
}

fn ensure_runtime_dirs(root: &Path) -> Result<(), DaemonError> {
    let artifacts = artifacts_dir(root);
    if !artifacts.exists() {
        fs::create_dir_all(&artifacts).map_err(|e| io_err(&artifacts, e))?;
    }
    Ok(())
}

fn handle_join<T>(
    task: &str,
    result: Result<Result<T, DaemonError>, tokio::task::JoinError>,
) -> Result<T, DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Runtime(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
