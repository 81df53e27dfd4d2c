use crate::uci::{parse_uci_message, UciCommand, UciMessage};
use crate::{EngineError, EngineEvent, EngineMessage};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// What to launch: the engine binary and any extra arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSpec {
    pub path: PathBuf,
    pub args: Vec<String>,
}

impl EngineSpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

/// One running engine process.
///
/// Output is read by a dedicated task that turns lines into [`EngineMessage`]s
/// tagged with this process's generation. When the output stream ends the
/// task posts exactly one [`EngineEvent::Crashed`], unless the process was
/// shut down on purpose first.
pub struct StockfishProcess {
    generation: u64,
    path: PathBuf,
    child: Child,
    stdin: Mutex<ChildStdin>,
    alive: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl StockfishProcess {
    /// Spawn the engine. Must be called from within a tokio runtime.
    #[tracing::instrument(level = "info", skip(events))]
    pub fn spawn(
        spec: &EngineSpec,
        generation: u64,
        events: mpsc::Sender<EngineMessage>,
    ) -> Result<Self, EngineError> {
        tracing::debug!("Spawning engine process");
        let mut child = tokio::process::Command::new(&spec.path)
            .args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                tracing::error!("Failed to spawn engine: {}", source);
                EngineError::Spawn {
                    path: spec.path.clone(),
                    source,
                }
            })?;

        let stdin = child.stdin.take().ok_or(EngineError::NoStdin)?;
        let stdout = child.stdout.take().ok_or(EngineError::NoStdout)?;

        let alive = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(read_output(stdout, generation, alive.clone(), events));

        tracing::info!(pid = ?child.id(), "Engine process spawned");
        Ok(Self {
            generation,
            path: spec.path.clone(),
            child,
            stdin: Mutex::new(stdin),
            alive,
            reader,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Write one command line and flush it.
    ///
    /// Writers are serialized by the stdin lock so lines never interleave.
    pub async fn write(&self, cmd: &UciCommand) -> Result<(), EngineError> {
        cmd.validate()?;
        if !self.is_alive() {
            return Err(EngineError::Pipe(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "engine process has exited",
            )));
        }

        let line = format!("{}\n", cmd);
        let mut stdin = self.stdin.lock().await;
        tracing::trace!("UCI >> {}", cmd);
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(EngineError::Pipe)?;
        stdin.flush().await.map_err(EngineError::Pipe)
    }

    /// Ask the engine to quit, then kill it if it is still around after `grace`.
    pub async fn shutdown(mut self, grace: Duration) {
        // Stop reading first so an intentional exit is not reported as a crash
        self.reader.abort();

        if self.is_alive() {
            if let Err(e) = self.write(&UciCommand::Quit).await {
                tracing::debug!("Could not send quit: {}", e);
            }
        }
        self.alive.store(false, Ordering::SeqCst);

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => tracing::info!("Engine exited with {}", status),
            Ok(Err(e)) => tracing::warn!("Failed to wait for engine: {}", e),
            Err(_) => {
                tracing::warn!("Engine did not exit within {:?}, killing", grace);
                if let Err(e) = self.child.kill().await {
                    tracing::error!("Failed to kill engine: {}", e);
                }
            }
        }
    }
}

async fn read_output(
    stdout: ChildStdout,
    generation: u64,
    alive: Arc<AtomicBool>,
    events: mpsc::Sender<EngineMessage>,
) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                tracing::warn!(generation, "Engine stdout EOF - engine closed");
                break;
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                tracing::trace!("UCI << {}", trimmed);

                let event = match parse_uci_message(trimmed) {
                    Some(UciMessage::UciOk) => EngineEvent::UciOk,
                    Some(UciMessage::ReadyOk) => EngineEvent::Ready,
                    Some(UciMessage::BestMove { mv }) => EngineEvent::BestMove(mv),
                    Some(UciMessage::Info(progress)) => EngineEvent::Progress(progress),
                    None => continue,
                };

                if events.send(EngineMessage { generation, event }).await.is_err() {
                    tracing::debug!("Event receiver dropped, output reader exiting");
                    alive.store(false, Ordering::SeqCst);
                    return;
                }
            }
            Err(e) => {
                tracing::error!("Error reading from engine stdout: {}", e);
                break;
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
    let _ = events
        .send(EngineMessage {
            generation,
            event: EngineEvent::Crashed,
        })
        .await;
    tracing::info!(generation, "Output reader task exiting");
}
