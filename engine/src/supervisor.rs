use crate::stockfish::{EngineSpec, StockfishProcess};
use crate::uci::UciCommand;
use crate::{EngineError, EngineMessage};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Result of [`Supervisor::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    AlreadyRunning,
    Started { path: PathBuf },
}

/// Owns at most one live engine process and restarts it on request.
///
/// Every spawn bumps the generation; events from older generations belong to
/// processes that are gone and should be dropped by the consumer.
pub struct Supervisor {
    spec: Option<EngineSpec>,
    process: Option<StockfishProcess>,
    generation: u64,
    events: mpsc::Sender<EngineMessage>,
    grace: Duration,
}

impl Supervisor {
    pub fn new(
        spec: Option<EngineSpec>,
        events: mpsc::Sender<EngineMessage>,
        grace: Duration,
    ) -> Self {
        Self {
            spec,
            process: None,
            generation: 0,
            events,
            grace,
        }
    }

    pub fn set_spec(&mut self, spec: Option<EngineSpec>) {
        self.spec = spec;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_live(&self) -> bool {
        self.process.as_ref().is_some_and(|p| p.is_alive())
    }

    /// True if `generation` belongs to the process currently held.
    pub fn is_current(&self, generation: u64) -> bool {
        self.process
            .as_ref()
            .is_some_and(|p| p.generation() == generation)
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(|p| p.pid())
    }

    /// Spawn the engine and send `uci`. A no-op if one is already live.
    #[tracing::instrument(level = "info", skip(self), fields(generation = self.generation + 1))]
    pub async fn start(&mut self) -> Result<StartOutcome, EngineError> {
        if self.is_live() {
            tracing::debug!("Engine already running");
            return Ok(StartOutcome::AlreadyRunning);
        }
        // A dead handle may still be held if the crash was not processed yet
        if let Some(dead) = self.process.take() {
            dead.shutdown(self.grace).await;
        }

        let spec = self.spec.as_ref().ok_or(EngineError::NotFound)?;
        self.generation += 1;
        let process = StockfishProcess::spawn(spec, self.generation, self.events.clone())?;
        let path = process.path().to_path_buf();

        if let Err(e) = process.write(&UciCommand::Uci).await {
            tracing::error!("Failed to send 'uci': {}", e);
            process.shutdown(self.grace).await;
            return Err(e);
        }

        tracing::info!("Engine started at {}", path.display());
        self.process = Some(process);
        Ok(StartOutcome::Started { path })
    }

    /// Graceful quit, bounded by the grace period, then force-kill.
    pub async fn stop(&mut self) {
        if let Some(process) = self.process.take() {
            tracing::info!(generation = process.generation(), "Stopping engine");
            process.shutdown(self.grace).await;
        }
    }

    pub async fn write(&self, cmd: &UciCommand) -> Result<(), EngineError> {
        let process = self.process.as_ref().ok_or(EngineError::NotRunning)?;
        process.write(cmd).await
    }
}
