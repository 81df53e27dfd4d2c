use engine::Supervisor;
use std::time::Instant;

use super::commands::{AnalysisRequest, SessionStatus};
use super::SessionConfig;

/// Coordinator lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No engine process.
    Stopped,
    /// Spawned and `uci` sent, waiting for `uciok`.
    Starting,
    /// Configured and `isready` sent, waiting for `readyok`.
    AwaitingReady,
    /// Ready, no search running.
    Idle,
    /// A `go` for `active` is outstanding.
    Analyzing,
}

/// Internal mutable state, owned entirely by the session actor. No locks.
pub(crate) struct SessionState {
    pub config: SessionConfig,
    pub supervisor: Supervisor,
    pub phase: SessionPhase,
    pub phase_since: Instant,
    /// Request the outstanding `go` belongs to.
    pub active: Option<AnalysisRequest>,
    /// Newest request waiting for the engine to become ready.
    pub pending: Option<AnalysisRequest>,
    /// `bestmove` lines still owed by searches we stopped; they are dropped.
    pub owed_bestmoves: u32,
    pub stop_sent_at: Option<Instant>,
    /// A host `stop` is still outstanding; a crash now does not auto-restart.
    pub halted: bool,
    pub restart_attempts: u32,
    /// Options applied to a live engine, replayed after each handshake.
    pub options: Vec<(String, String)>,
}

impl SessionState {
    pub fn new(config: SessionConfig, supervisor: Supervisor) -> Self {
        Self {
            config,
            supervisor,
            phase: SessionPhase::Stopped,
            phase_since: Instant::now(),
            active: None,
            pending: None,
            owed_bestmoves: 0,
            stop_sent_at: None,
            halted: false,
            restart_attempts: 0,
            options: Vec::new(),
        }
    }

    pub fn set_phase(&mut self, phase: SessionPhase) {
        if self.phase != phase {
            tracing::debug!("Session phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
            self.phase_since = Instant::now();
        }
    }

    /// Forget everything tied to the current engine process.
    pub fn clear_engine_state(&mut self) {
        self.active = None;
        self.owed_bestmoves = 0;
        self.stop_sent_at = None;
        self.set_phase(SessionPhase::Stopped);
    }

    /// Account for a `stop` sent while a search is running.
    pub fn mark_search_stopped(&mut self) {
        self.owed_bestmoves += 1;
        self.active = None;
        self.stop_sent_at.get_or_insert_with(Instant::now);
    }

    /// Returns true if this `bestmove` belonged to a stopped search.
    pub fn take_owed_bestmove(&mut self) -> bool {
        if self.owed_bestmoves == 0 {
            return false;
        }
        self.owed_bestmoves -= 1;
        if self.owed_bestmoves == 0 {
            self.stop_sent_at = None;
            self.halted = false;
        }
        true
    }

    pub fn remember_option(&mut self, name: &str, value: &str) {
        match self
            .options
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => self.options.push((name.to_string(), value.to_string())),
        }
    }

    pub fn is_waiting_for_engine(&self) -> bool {
        matches!(self.phase, SessionPhase::Starting | SessionPhase::AwaitingReady)
    }

    pub fn watchdog_armed(&self) -> bool {
        self.is_waiting_for_engine() || self.stop_sent_at.is_some()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            phase: self.phase,
            generation: self.supervisor.generation(),
            engine_pid: self.supervisor.pid(),
            active: self.active.clone(),
            pending: self.pending.clone(),
            owed_bestmoves: self.owed_bestmoves,
        }
    }
}
