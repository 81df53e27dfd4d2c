pub mod discovery;
pub mod stockfish;
pub mod supervisor;
pub mod uci;

pub use discovery::find_stockfish_path;
pub use stockfish::{EngineSpec, StockfishProcess};
pub use supervisor::{StartOutcome, Supervisor};
pub use uci::{parse_uci_message, UciCommand, UciError, UciMessage};

use std::path::PathBuf;

/// Errors raised while locating, spawning, or talking to the engine process.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Stockfish not found. Install it, add it to PATH, or set STOCKFISH_PATH")]
    NotFound,
    #[error("Failed to spawn engine at {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Engine pipe closed: {0}")]
    Pipe(#[source] std::io::Error),
    #[error("Engine is not running")]
    NotRunning,
    #[error("Engine has no stdin")]
    NoStdin,
    #[error("Engine has no stdout")]
    NoStdout,
    #[error(transparent)]
    Uci(#[from] UciError),
}

/// Events produced from engine output, consumed by the session coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// `uciok`: handshake finished, the engine accepts configuration.
    UciOk,
    /// `readyok`
    Ready,
    Progress(Progress),
    /// `None` when the engine had no legal move to report.
    BestMove(Option<String>),
    /// The reader hit end-of-stream or the process exited.
    Crashed,
}

/// An engine event tagged with the generation of the process that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineMessage {
    pub generation: u64,
    pub event: EngineEvent,
}

/// Search progress extracted from an `info depth ...` line.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub depth: u32,
    pub score: Score,
    pub nps: Option<u64>,
    /// Principal variation; the first move is the best move found so far.
    pub pv: Vec<String>,
}

impl Progress {
    pub fn best_move(&self) -> Option<&str> {
        self.pv.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Centipawns(i32),
    Mate(i32), // Negative for being mated
}
