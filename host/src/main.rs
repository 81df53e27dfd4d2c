//! `chessist-host` entry point.
//!
//! Launched by the browser with the extension origin as its first argument.
//! Stdout belongs to the framing protocol, so logs go to stderr or to a
//! rolling file in `--log-dir`.

use std::path::PathBuf;
use std::time::Duration;

use chessist_host::bridge::{self, ExitReason};
use chessist_host::config::{self, EngineMode, StopPolicy};
use chessist_host::framing::FrameWriter;
use chessist_host::session::{self, EngineLocator, SessionConfig};
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// How long pending blocking work (the stdin reader) may hold up exit.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(
    name = "chessist-host",
    version,
    about = "Native messaging bridge to a local UCI chess engine"
)]
struct Cli {
    /// Extension origin passed by the browser (logged only).
    origin: Option<String>,

    /// Native window handle passed by some browsers on Windows (logged only).
    #[arg(long, hide = true)]
    parent_window: Option<String>,

    /// Engine binary to run. Overrides STOCKFISH_PATH.
    #[arg(long, value_name = "PATH")]
    engine_path: Option<PathBuf>,

    /// Extra argument passed to the engine. Repeatable.
    #[arg(long = "engine-arg", value_name = "ARG", allow_hyphen_values = true)]
    engine_args: Vec<String>,

    /// `Threads` option sent after the handshake.
    #[arg(long)]
    threads: Option<u32>,

    /// `Hash` option in MB sent after the handshake.
    #[arg(long)]
    hash_mb: Option<u32>,

    /// Reuse one engine or respawn it for every request.
    #[arg(long, value_enum)]
    engine_mode: Option<EngineMode>,

    /// What a `stop` from the extension does to the engine.
    #[arg(long, value_enum)]
    stop_policy: Option<StopPolicy>,

    /// Shallowest `info` depth forwarded to the extension.
    #[arg(long)]
    min_depth: Option<u32>,

    /// Write daily-rotated logs here instead of stderr.
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
}

impl Cli {
    /// Environment defaults overlaid with the flags given on the command line.
    fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::from_env();

        config.locator = EngineLocator::Discover {
            explicit: self.engine_path.clone().or_else(config::get_engine_path),
            args: self.engine_args.clone(),
        };
        if let Some(threads) = self.threads {
            config.threads = config::clamp_threads(threads);
        }
        if let Some(hash_mb) = self.hash_mb {
            config.hash_mb = config::clamp_hash_mb(hash_mb);
        }
        if let Some(mode) = self.engine_mode {
            config.engine_mode = mode;
        }
        if let Some(policy) = self.stop_policy {
            config.stop_policy = policy;
        }
        if let Some(min_depth) = self.min_depth {
            config.min_depth = min_depth;
        }
        config
    }
}

/// Install the global subscriber. The returned guard flushes the file writer
/// on drop and must outlive the runtime.
fn init_tracing(log_dir: Option<PathBuf>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            let file_appender = tracing_appender::rolling::daily(&dir, "chessist-host");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true)
                        .with_line_number(true),
                )
                .with(filter)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr).with_ansi(false))
                .with(filter)
                .init();
            Ok(None)
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.clone().or_else(config::get_log_dir))?;

    tracing::info!(
        origin = cli.origin.as_deref().unwrap_or("-"),
        parent_window = cli.parent_window.as_deref().unwrap_or("-"),
        "Native host starting"
    );

    let session_config = cli.session_config();
    tracing::debug!("Session config: {:?}", session_config);

    // Built by hand so a stdin read still blocked at exit cannot hang shutdown
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run(session_config));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);

    match result {
        Ok(reason) => {
            tracing::info!("Native host exiting: {:?}", reason);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Native host failed: {}", e);
            Err(e.into())
        }
    }
}

async fn run(session_config: SessionConfig) -> Result<ExitReason, bridge::BridgeError> {
    let out = FrameWriter::new(tokio::io::stdout());
    let session = session::spawn_session(session_config, out.clone());

    // Warm the engine up before the first request arrives
    session.start().await?;

    bridge::run_bridge(tokio::io::stdin(), out, session).await
}
