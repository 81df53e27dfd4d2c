//! Analysis session coordinator.
//!
//! A single actor task owns the [`state::SessionState`], the engine
//! [`Supervisor`], and the receiving end of the engine event channel. Host
//! commands arrive through a [`SessionHandle`]; engine events arrive from the
//! supervisor's output reader. Both are processed one at a time, so state
//! transitions are totally ordered without shared locks.

mod actor;
mod commands;
mod handle;
mod state;

pub use commands::{AnalysisRequest, SessionError, SessionStatus};
pub use handle::SessionHandle;
pub use state::SessionPhase;

use engine::{EngineSpec, Supervisor};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::{self, EngineMode, StopPolicy};
use crate::framing::FrameWriter;

/// How the engine binary is found each time it needs to be (re)started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineLocator {
    /// Explicit path first, then well-known locations and `PATH`.
    Discover {
        explicit: Option<PathBuf>,
        args: Vec<String>,
    },
    /// Exactly this binary, if it exists.
    Fixed(EngineSpec),
}

impl EngineLocator {
    pub fn locate(&self) -> Option<EngineSpec> {
        match self {
            EngineLocator::Discover { explicit, args } => {
                engine::discovery::find_stockfish_path_with(explicit.as_deref())
                    .map(|path| EngineSpec::new(path).with_args(args.clone()))
            }
            EngineLocator::Fixed(spec) => spec.path.is_file().then(|| spec.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub locator: EngineLocator,
    pub engine_mode: EngineMode,
    pub stop_policy: StopPolicy,
    pub threads: u32,
    pub hash_mb: u32,
    pub min_depth: u32,
    pub ready_timeout: Duration,
    pub shutdown_grace: Duration,
    pub max_restarts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            locator: EngineLocator::Discover {
                explicit: None,
                args: Vec::new(),
            },
            engine_mode: EngineMode::default(),
            stop_policy: StopPolicy::default(),
            threads: config::DEFAULT_THREADS,
            hash_mb: config::DEFAULT_HASH_MB,
            min_depth: config::DEFAULT_MIN_DEPTH,
            ready_timeout: Duration::from_millis(config::DEFAULT_READY_TIMEOUT_MS),
            shutdown_grace: Duration::from_millis(config::DEFAULT_SHUTDOWN_GRACE_MS),
            max_restarts: config::DEFAULT_MAX_RESTARTS,
        }
    }
}

impl SessionConfig {
    /// Defaults overlaid with the environment.
    pub fn from_env() -> Self {
        Self {
            locator: EngineLocator::Discover {
                explicit: config::get_engine_path(),
                args: Vec::new(),
            },
            engine_mode: config::get_engine_mode(),
            stop_policy: config::get_stop_policy(),
            threads: config::get_threads(),
            hash_mb: config::get_hash_mb(),
            min_depth: config::get_min_depth(),
            ready_timeout: config::get_ready_timeout(),
            shutdown_grace: config::get_shutdown_grace(),
            max_restarts: config::get_max_restarts(),
        }
    }
}

/// Spawn the session actor. Outbound messages are written to `outbound`.
pub fn spawn_session(config: SessionConfig, outbound: FrameWriter) -> SessionHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (event_tx, event_rx) = mpsc::channel(256);
    let supervisor = Supervisor::new(None, event_tx, config.shutdown_grace);
    let state = state::SessionState::new(config, supervisor);
    tokio::spawn(actor::run_session_actor(state, cmd_rx, event_rx, outbound));
    SessionHandle::new(cmd_tx)
}
