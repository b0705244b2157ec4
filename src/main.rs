use anyhow::{Context, bail};
use arrsweep::{
    AppError, ArrClient, Cli, ClientFactory, Commands, HttpClient, HttpClientFactory, HttpSettings,
    InstanceLockGuard, InstanceType, LogFormat, SweepConfig, Sweeper, TracingEventSink,
    load_snapshot,
};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let result = match cli.command {
        Commands::Run { config, dry_run } => run_once(&config, dry_run),
        Commands::Daemon {
            config,
            dry_run,
            interval,
        } => run_daemon(&config, dry_run, interval),
        Commands::Check { config } => run_check(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Loads a snapshot, forcing dry-run when requested on the command line.
fn load_config(config_path: &Path, dry_run: bool) -> anyhow::Result<Arc<SweepConfig>> {
    let mut config = load_snapshot(config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    if dry_run && !config.general.dry_run {
        Arc::make_mut(&mut config).general.dry_run = true;
    }
    Ok(config)
}

fn acquire_lock(config_path: &Path) -> anyhow::Result<InstanceLockGuard> {
    match InstanceLockGuard::try_lock(config_path) {
        Ok(guard) => {
            tracing::debug!("Acquired lock {}", guard.lock_path().display());
            Ok(guard)
        }
        Err(AppError::InstanceLocked {
            config,
            owner_pid,
            owner_host,
            locked_for,
        }) => bail!(
            "Configuration {config} is in use by process {owner_pid} on {owner_host} \
             (running for {locked_for:?}). Another instance is already sweeping these services."
        ),
        Err(e) => Err(e).context("Failed to acquire instance lock"),
    }
}

fn new_sweeper(config: &SweepConfig) -> Sweeper {
    Sweeper::new(
        &config.general,
        Arc::new(TracingEventSink),
        Arc::new(HttpClientFactory),
    )
}

fn run_once(config_path: &Path, dry_run: bool) -> anyhow::Result<()> {
    tracing::info!("Loading configuration from: {}", config_path.display());
    let config = load_config(config_path, dry_run)?;
    let _lock = acquire_lock(config_path)?;

    let report = new_sweeper(&config).run_cycle(config)?;
    if report.removal_failures > 0 {
        tracing::warn!("{} removals failed", report.removal_failures);
    }
    Ok(())
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    path.metadata().and_then(|m| m.modified()).ok()
}

fn run_daemon(config_path: &Path, dry_run: bool, interval: u64) -> anyhow::Result<()> {
    tracing::info!(
        "Starting daemon mode (interval: {}s, config: {})",
        interval,
        config_path.display()
    );

    let mut config = load_config(config_path, dry_run)?;
    let _lock = acquire_lock(config_path)?;
    let sweeper = new_sweeper(&config);
    let mut config_mtime = modified_at(config_path);

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("Received interrupt signal, shutting down gracefully...");
        r.store(false, Ordering::SeqCst);
    }) {
        tracing::warn!("Failed to set Ctrl-C handler: {e}");
    }

    let mut run_number = 1;
    while running.load(Ordering::SeqCst) {
        tracing::info!("===== Daemon run #{run_number} =====");

        let mtime = modified_at(config_path);
        if run_number > 1 && mtime != config_mtime {
            match load_config(config_path, dry_run) {
                Ok(reloaded) => {
                    tracing::info!("Configuration changed, reloaded {}", config_path.display());
                    config = reloaded;
                    config_mtime = mtime;
                    sweeper.reload_blocklists();
                }
                Err(e) => tracing::error!("Keeping previous configuration: {e:#}"),
            }
        }

        if let Err(e) = sweeper.run_cycle(Arc::clone(&config)) {
            tracing::error!("Cycle failed: {e}");
        }

        if !running.load(Ordering::SeqCst) {
            break;
        }

        tracing::info!("Sleeping for {interval} seconds until next run...");
        for _ in 0..interval {
            if !running.load(Ordering::SeqCst) {
                break;
            }
            std::thread::sleep(Duration::from_secs(1));
        }

        run_number += 1;
    }

    tracing::info!("Daemon stopped gracefully");
    Ok(())
}

/// Validates configuration, then logs in to every client and fetches one
/// queue page per media-manager instance.
fn run_check(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path, false)?;
    tracing::info!("Configuration {} is valid", config_path.display());

    let http = Arc::new(HttpClient::new(&HttpSettings::from(&config.general))?);
    let factory = HttpClientFactory;
    let mut failures = 0usize;

    for client_config in config.enabled_clients() {
        let outcome = factory
            .download_client(client_config, &http)
            .and_then(|driver| driver.login());
        match outcome {
            Ok(()) => tracing::info!("{} ({}): OK", client_config.name, client_config.client_type),
            Err(e) => {
                failures += 1;
                tracing::error!("{} ({}): {e}", client_config.name, client_config.client_type);
            }
        }
    }

    for kind in InstanceType::ALL {
        let client: Arc<dyn ArrClient> = factory.arr_client(kind, &http);
        for instance in config.arr(kind).enabled_instances() {
            match client.queue_page(instance, 1, 1) {
                Ok(page) => tracing::info!(
                    "{kind} {}: OK, {} items queued",
                    instance.name,
                    page.total_records
                ),
                Err(e) => {
                    failures += 1;
                    tracing::error!("{kind} {}: {e}", instance.name);
                }
            }
        }
    }

    if failures > 0 {
        bail!("{failures} services failed the connectivity check");
    }
    Ok(())
}
