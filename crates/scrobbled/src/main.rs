// # scrobbled - Scrobble Delivery Daemon
//
// Thin integration layer around scrobble-core. All delivery logic lives in
// the library; this binary only:
//
// 1. Reads configuration from environment variables
// 2. Registers the compiled-in destinations and builds the clients
// 3. Runs the heartbeat
// 4. Feeds plays read from stdin into the registry
// 5. Shuts down on SIGTERM / SIGINT
//
// ## Configuration
//
// - `SCROBBLE_CONFIG_FILE`: JSON list of destination configs (optional)
// - `SCROBBLE_CONFIG_DIR`: Directory holding `<type>.json` fallback files
// - `SCROBBLE_HEARTBEAT_INTERVAL_SECS`: Heartbeat interval, 5..=3600 (default 60)
// - `SCROBBLE_INTAKE`: `dispatch` (default) delivers each line immediately,
//   `queue` hands plays to the clients' monitoring loops
// - `SCROBBLE_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// Destination credentials can also come from `<TYPE>_URL` and
// `<TYPE>_API_KEY`, e.g. `MALOJA_URL` and `MALOJA_API_KEY`.
//
// ## Input
//
// One JSON play, or a JSON array of plays, per line:
//
// ```json
// {"artists": ["Artist"], "title": "Song", "playedAt": "2025-01-09T12:00:00Z"}
// ```

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use scrobble_core::{ClientRegistry, DestinationConfig, DispatchOptions, HeartbeatTask, PlayEvent};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum ScrobbledExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<ScrobbledExitCode> for ExitCode {
    fn from(code: ScrobbledExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// How plays read from stdin reach the clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntakeMode {
    Dispatch,
    Queue,
}

/// Application configuration
#[derive(Debug)]
struct Config {
    config_file: Option<PathBuf>,
    config_dir: Option<PathBuf>,
    heartbeat_interval_secs: u64,
    intake: IntakeMode,
    log_level: String,
}

impl Config {
    fn from_env() -> Result<Self> {
        Self::from_vars(&env::vars().collect())
    }

    fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let heartbeat_interval_secs = match get("SCROBBLE_HEARTBEAT_INTERVAL_SECS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("SCROBBLE_HEARTBEAT_INTERVAL_SECS is not a number: {}", raw))?,
            None => 60,
        };

        let intake = match get("SCROBBLE_INTAKE").map(str::to_lowercase).as_deref() {
            None | Some("dispatch") => IntakeMode::Dispatch,
            Some("queue") => IntakeMode::Queue,
            Some(other) => anyhow::bail!(
                "SCROBBLE_INTAKE '{}' is not valid. Valid modes: dispatch, queue",
                other
            ),
        };

        Ok(Self {
            config_file: get("SCROBBLE_CONFIG_FILE").map(PathBuf::from),
            config_dir: get("SCROBBLE_CONFIG_DIR").map(PathBuf::from),
            heartbeat_interval_secs,
            intake,
            log_level: get("SCROBBLE_LOG_LEVEL").unwrap_or("info").to_lowercase(),
        })
    }

    fn validate(&self) -> Result<()> {
        if !(5..=3600).contains(&self.heartbeat_interval_secs) {
            anyhow::bail!(
                "SCROBBLE_HEARTBEAT_INTERVAL_SECS must be between 5 and 3600 seconds. Got: {}",
                self.heartbeat_interval_secs
            );
        }

        if let Some(dir) = &self.config_dir
            && !dir.is_dir()
        {
            anyhow::bail!("SCROBBLE_CONFIG_DIR is not a directory: {}", dir.display());
        }

        if self.log_level_filter().is_none() {
            anyhow::bail!(
                "SCROBBLE_LOG_LEVEL '{}' is not valid. Valid levels: trace, debug, info, warn, error",
                self.log_level
            );
        }

        Ok(())
    }

    fn log_level_filter(&self) -> Option<Level> {
        match self.log_level.as_str() {
            "trace" => Some(Level::TRACE),
            "debug" => Some(Level::DEBUG),
            "info" => Some(Level::INFO),
            "warn" => Some(Level::WARN),
            "error" => Some(Level::ERROR),
            _ => None,
        }
    }

    /// Destination configs from `SCROBBLE_CONFIG_FILE`, if set
    fn load_destinations(&self) -> Result<Vec<DestinationConfig>> {
        let Some(path) = &self.config_file else {
            return Ok(Vec::new());
        };
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let configs = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(configs)
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ScrobbledExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return ScrobbledExitCode::ConfigError.into();
    }

    let log_level = config.log_level_filter().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ScrobbledExitCode::ConfigError.into();
    }

    info!("Starting scrobbled daemon");

    let destinations = match config.load_destinations() {
        Ok(destinations) => destinations,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return ScrobbledExitCode::ConfigError.into();
        }
    };

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ScrobbledExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config, destinations).await {
            error!("Daemon error: {:#}", e);
            ScrobbledExitCode::RuntimeError
        } else {
            ScrobbledExitCode::CleanShutdown
        }
    });

    result.into()
}

async fn run_daemon(config: Config, destinations: Vec<DestinationConfig>) -> Result<()> {
    let registry = Arc::new(ClientRegistry::new());

    #[cfg(feature = "maloja")]
    {
        info!("Registering Maloja destination");
        scrobble_destination_maloja::register(&registry);
    }

    let built = registry.build(&destinations, config.config_dir.as_deref());
    info!(
        "{} client(s) built from {} registered destination type(s)",
        built,
        registry.list_factories().len()
    );

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let heartbeat = HeartbeatTask::new(
        Arc::clone(&registry),
        Duration::from_secs(config.heartbeat_interval_secs),
    )
    .spawn(async move {
        while shutdown_rx.changed().await.is_ok() {
            if *shutdown_rx.borrow() {
                break;
            }
        }
    });

    let intake = read_plays(Arc::clone(&registry), config.intake);
    tokio::pin!(intake);

    let received = tokio::select! {
        received = wait_for_shutdown() => received?,
        result = &mut intake => {
            result?;
            info!("Input closed, waiting for shutdown signal");
            wait_for_shutdown().await?
        }
    };
    info!("Received shutdown signal: {}", received);

    let _ = shutdown_tx.send(true);
    registry.shutdown();

    match tokio::time::timeout(Duration::from_secs(10), heartbeat).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Heartbeat task ended abnormally: {}", e),
        Err(_) => warn!("Heartbeat did not stop within 10s"),
    }

    info!("Shutting down daemon");
    Ok(())
}

/// Read plays from stdin until it closes
async fn read_plays(registry: Arc<ClientRegistry>, mode: IntakeMode) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = LinesStream::new(stdin.lines());

    while let Some(line) = lines.next().await {
        let line = line.context("Failed to read stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let plays = match parse_plays(line) {
            Ok(plays) => plays,
            Err(e) => {
                warn!("Ignoring unreadable input line: {:#}", e);
                continue;
            }
        };

        match mode {
            IntakeMode::Dispatch => {
                let attempted = registry.scrobble(plays, DispatchOptions::default()).await;
                debug!("Dispatch attempted {} play(s)", attempted.len());
            }
            IntakeMode::Queue => registry.queue_scrobble(plays),
        }
    }
    Ok(())
}

/// Parse one input line: a play object or an array of plays
fn parse_plays(line: &str) -> Result<Vec<PlayEvent>> {
    let value: Value = serde_json::from_str(line).context("not JSON")?;
    let plays = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    Ok(plays)
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let received = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(received)
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
