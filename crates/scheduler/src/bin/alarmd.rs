//! alarmd: standalone alarm scheduling daemon.
//!
//! Seeds the alarms declared in the config file, fires them with tokio
//! timers, "delivers" them through a logging transport and periodically
//! logs a JSON diagnostics snapshot.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use alarmd_core::{config::load_dotenv, AlarmConfig, AlarmError, Clock, SystemClock};
use alarmd_scheduler::{
    AlarmHandle, AlarmManager, AlarmService, Collaborators, LoggingTransport, LoggingWakeLock,
    TokioTimeSource,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Alarm scheduling daemon.
#[derive(Parser, Debug)]
#[command(name = "alarmd", version, about)]
struct Cli {
    /// Path to alarmd.toml config file.
    #[arg(long, env = "ALARMD_CONFIG", default_value = "config/alarmd.toml")]
    config: String,

    /// Diagnostics snapshot interval in seconds (0 disables).
    #[arg(long, env = "ALARMD_SNAPSHOT_INTERVAL", default_value_t = 60)]
    snapshot_interval: u64,

    /// Shutdown timeout in seconds.
    #[arg(long, env = "ALARMD_SHUTDOWN_TIMEOUT", default_value_t = 10)]
    shutdown_timeout: u64,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match AlarmConfig::from_file(&cli.config) {
        Ok(cfg) => {
            info!(path = %cli.config, "loaded alarmd config");
            cfg
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                path = %cli.config,
                "failed to load config, using local defaults"
            );
            AlarmConfig::local()
        }
    };
    config.log_summary();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let (handle, rx) = AlarmHandle::channel();

    let manager = AlarmManager::new(
        config.scheduler.clone(),
        Collaborators {
            clock: clock.clone(),
            time_source: Box::new(TokioTimeSource::new(handle.clone(), clock.clone())),
            transport: Box::new(LoggingTransport::new(
                handle.clone(),
                Duration::from_millis(config.delivery.simulated_latency_ms),
            )),
            wake_resource: Box::new(LoggingWakeLock::new()),
        },
    );
    let service = AlarmService::new(manager, rx).spawn();

    seed_alarms(&handle, &config, clock.as_ref()).await?;

    info!("alarmd running, press Ctrl-C to stop");
    let mut ticker = (cli.snapshot_interval > 0)
        .then(|| tokio::time::interval(Duration::from_secs(cli.snapshot_interval)));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = async {
                match ticker.as_mut() {
                    Some(t) => { t.tick().await; }
                    None => std::future::pending::<()>().await,
                }
            } => {
                let snapshot = handle.snapshot().await?;
                info!(snapshot = %serde_json::to_string(&snapshot)?, "scheduler snapshot");
            }
        }
    }

    info!("shutting down");
    handle.shutdown()?;
    match tokio::time::timeout(Duration::from_secs(cli.shutdown_timeout), service).await {
        Ok(Ok(manager)) => {
            let snapshot = manager.snapshot();
            info!(
                pending = snapshot.pending_len(),
                in_flight = snapshot.in_flight.len(),
                "alarmd exited cleanly"
            );
        }
        Ok(Err(e)) => tracing::error!(error = %e, "alarm service task failed"),
        Err(_) => tracing::warn!("alarm service did not stop in time"),
    }

    Ok(())
}

async fn seed_alarms(
    handle: &AlarmHandle,
    config: &AlarmConfig,
    clock: &dyn Clock,
) -> anyhow::Result<()> {
    for seed in &config.alarms {
        let request = seed.request(clock.now(seed.class));
        let result = if seed.inexact {
            handle.schedule_inexact(request).await
        } else {
            handle.schedule(request).await
        };
        match result {
            Ok(()) => info!(
                principal = %seed.principal,
                class = %seed.class,
                delay_ms = seed.delay_ms,
                interval_ms = seed.interval_ms,
                inexact = seed.inexact,
                "seeded alarm"
            ),
            Err(AlarmError::ServiceClosed) => return Err(AlarmError::ServiceClosed.into()),
            Err(e) => tracing::warn!(principal = %seed.principal, error = %e, "failed to seed alarm"),
        }
    }
    Ok(())
}
