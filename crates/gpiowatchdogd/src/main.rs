//! GPIO Safety Watchdog Daemon
//!
//! Main entry point for gpiowatchdogd. Loads the pin policy table, probes
//! the GPIO backend, then samples pins until SIGINT or SIGTERM.

use anyhow::{anyhow, Context};
use clap::{Parser, ValueEnum};
use gpiowatchdogd::{
    parse_duration, resolve, CliOverrides, ConfigFile, GpioBackend, PolicyOverride,
    StatusReporter, Watchdog, DEFAULT_CONFIG_PATH,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::signal;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// GPIO safety watchdog for the gate controller
#[derive(Parser, Debug)]
#[command(name = "gpiowatchdogd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (missing file means built-in defaults)
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log corrections instead of writing pins
    #[arg(long)]
    dry_run: bool,

    /// Pause between sampling passes, e.g. 500ms
    #[arg(long, value_parser = parse_duration)]
    sampling_interval: Option<Duration>,

    /// Pause between status summaries, e.g. 60s
    #[arg(long, value_parser = parse_duration)]
    status_interval: Option<Duration>,

    /// Upper bound on a single pin read or write
    #[arg(long, value_parser = parse_duration)]
    gpio_timeout: Option<Duration>,

    /// Re-send an ineffective correction every N samples
    #[arg(long)]
    retry_ticks: Option<u32>,

    /// Time a correction may take before it is reported as failed
    #[arg(long, value_parser = parse_duration)]
    correction_grace: Option<Duration>,

    /// Pin policy override, PIN=FIELD:VALUE[,...] (fields: hazard, max, correct)
    #[arg(short = 'p', long = "pin", value_name = "OVERRIDE")]
    pins: Vec<PolicyOverride>,

    /// GPIO access backend
    #[arg(long, value_enum)]
    backend: Option<GpioBackend>,

    /// Drive every pin to its safe level before monitoring
    #[arg(long)]
    init_safe: bool,

    /// Log level or filter directive (RUST_LOG takes precedence)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Write the resolved configuration to PATH and exit without touching pins
    #[arg(long, value_name = "PATH")]
    write_config: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            dry_run: self.dry_run,
            sampling_interval: self.sampling_interval,
            status_interval: self.status_interval,
            gpio_timeout: self.gpio_timeout,
            correction_retry_ticks: self.retry_ticks,
            correction_grace: self.correction_grace,
            initialize_safe: self.init_safe,
            backend: self.backend,
            pins: self.pins.clone(),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&args.log_level, args.log_format) {
        eprintln!("gpiowatchdogd: {e:#}");
        return ExitCode::FAILURE;
    }

    info!("gpiowatchdogd: Starting GPIO safety watchdog");

    match run_daemon(args).await {
        Ok(()) => {
            info!("gpiowatchdogd: Daemon exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "gpiowatchdogd: Daemon exiting with error");
            ExitCode::FAILURE
        }
    }
}

/// Initialize structured logging
fn init_logging(level: &str, format: LogFormat) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid log level '{level}'"))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = match format {
        LogFormat::Text => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| anyhow!("Failed to set logger: {e}"))
}

/// Startup sequence followed by the watchdog loop
async fn run_daemon(args: Args) -> anyhow::Result<()> {
    let file = ConfigFile::load_or_default(&args.config)?;
    let resolved = resolve(file, &args.overrides())?;

    if let Some(path) = &args.write_config {
        ConfigFile::from(&resolved)
            .save(path)
            .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "gpiowatchdogd: Resolved configuration written");
        return Ok(());
    }

    let config = resolved.watchdog;

    info!(
        backend = %config.backend,
        sampling_ms = config.sampling_interval.as_millis() as u64,
        status_secs = config.status_interval.as_secs(),
        pins = resolved.policies.len(),
        "gpiowatchdogd: Configuration loaded"
    );
    if config.dry_run {
        warn!("gpiowatchdogd: DRY-RUN mode, no pin will be written");
    }

    let gpio = config.backend.build(config.gpio_timeout);
    let status_interval = config.status_interval;
    let initialize_safe = config.initialize_safe;
    let watchdog = Watchdog::new(gpio, resolved.policies, config);

    let readable = watchdog.probe().await?;
    info!("gpiowatchdogd: {} of {} pins accessible", readable, watchdog.trackers().len());

    if initialize_safe {
        let written = watchdog.initialize_safe_levels().await;
        info!("gpiowatchdogd: Safe-state initialization wrote {} pins", written);
    }

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });

    let reporter = StatusReporter::new(status_interval, Instant::now());
    let snapshot = watchdog.run(reporter, shutdown).await;
    info!(
        ticks = snapshot.ticks,
        uptime_secs = snapshot.uptime.as_secs(),
        "gpiowatchdogd: Watchdog stopped"
    );
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("gpiowatchdogd: Received SIGINT"),
        _ = terminate => info!("gpiowatchdogd: Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["gpiowatchdogd"]).unwrap();
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(!args.dry_run);
        assert_eq!(args.log_format, LogFormat::Text);
        let overrides = args.overrides();
        assert!(overrides.sampling_interval.is_none());
        assert!(overrides.pins.is_empty());
    }

    #[test]
    fn test_flags() {
        let args = Args::try_parse_from([
            "gpiowatchdogd",
            "--dry-run",
            "--sampling-interval",
            "250ms",
            "--backend",
            "simulated",
            "--pin",
            "4=max:1s",
            "--pin",
            "17=hazard:high,max:3s",
            "--retry-ticks",
            "5",
        ])
        .unwrap();
        let overrides = args.overrides();
        assert!(overrides.dry_run);
        assert_eq!(overrides.sampling_interval, Some(Duration::from_millis(250)));
        assert_eq!(overrides.backend, Some(GpioBackend::Simulated));
        assert_eq!(overrides.correction_retry_ticks, Some(5));
        assert_eq!(overrides.pins.len(), 2);
        assert!(args.write_config.is_none());
    }

    #[tokio::test]
    async fn test_write_config_exits_before_probe() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("resolved.toml");
        let args = Args::try_parse_from([
            "gpiowatchdogd",
            "--config",
            "/nonexistent/gpiowatchdogd.toml",
            "--backend",
            "raspi-gpio",
            "--pin",
            "4=max:1s",
            "--write-config",
            out.to_str().unwrap(),
        ])
        .unwrap();

        // The raspi-gpio helper is never run
        run_daemon(args).await.unwrap();

        let written = ConfigFile::load_or_default(&out).unwrap();
        let lock = written.pins.iter().find(|p| p.pin.bcm() == 4).unwrap();
        assert_eq!(lock.max_hazard_duration, Duration::from_secs(1));
        assert_eq!(written.watchdog.backend, GpioBackend::RaspiGpio);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Args::try_parse_from(["gpiowatchdogd", "--sampling-interval", "fast"]).is_err());
        assert!(Args::try_parse_from(["gpiowatchdogd", "--pin", "4"]).is_err());
        assert!(Args::try_parse_from(["gpiowatchdogd", "--backend", "sysfs"]).is_err());
    }
}
