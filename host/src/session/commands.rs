use std::time::Duration;
use tokio::sync::oneshot;

use crate::messages::ErrorCode;

use super::state::SessionPhase;

#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error("Stockfish not found. Please install Stockfish and add it to PATH or set STOCKFISH_PATH environment variable.")]
    EngineNotFound,
    #[error("Failed to start Stockfish: {0}")]
    Spawn(String),
    #[error("Engine pipe error: {0}")]
    Pipe(String),
    #[error("Engine did not become ready within {0:?}")]
    EngineTimeout(Duration),
    #[error("Engine crashed: {0}")]
    EngineCrash(String),
    #[error("Invalid engine command: {0}")]
    InvalidCommand(String),
    #[error("Session actor closed")]
    SessionClosed,
}

impl SessionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::EngineNotFound => ErrorCode::EngineNotFound,
            SessionError::Spawn(_) => ErrorCode::SpawnFailure,
            SessionError::Pipe(_) | SessionError::SessionClosed => ErrorCode::PipeError,
            SessionError::EngineTimeout(_) => ErrorCode::EngineTimeout,
            SessionError::EngineCrash(_) => ErrorCode::EngineCrash,
            SessionError::InvalidCommand(_) => ErrorCode::InvalidMessage,
        }
    }
}

/// One analysis job: an opaque position and the depth to search it to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub fen: String,
    pub depth: u32,
}

/// Point-in-time view of the coordinator, for status queries and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub generation: u64,
    pub engine_pid: Option<u32>,
    pub active: Option<AnalysisRequest>,
    pub pending: Option<AnalysisRequest>,
    pub owed_bestmoves: u32,
}

/// Commands sent to the session actor.
///
/// Outcomes of engine commands are pushed to the host as outbound frames, so
/// only queries and shutdown carry a reply channel.
#[derive(Debug)]
pub enum SessionCommand {
    Start,
    Evaluate(AnalysisRequest),
    Stop,
    Reset,
    SetOption {
        name: String,
        value: String,
    },
    GetStatus {
        reply: oneshot::Sender<SessionStatus>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}
