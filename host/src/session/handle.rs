use tokio::sync::{mpsc, oneshot};

use super::commands::*;

/// Cheap, cloneable handle to the session actor.
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub(crate) fn new(cmd_tx: mpsc::Sender<SessionCommand>) -> Self {
        Self { cmd_tx }
    }

    /// Start the engine if it is not running yet.
    pub async fn start(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Start).await
    }

    pub async fn evaluate(&self, request: AnalysisRequest) -> Result<(), SessionError> {
        self.send(SessionCommand::Evaluate(request)).await
    }

    pub async fn stop(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Stop).await
    }

    pub async fn reset(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Reset).await
    }

    pub async fn set_option(&self, name: String, value: String) -> Result<(), SessionError> {
        self.send(SessionCommand::SetOption { name, value }).await
    }

    pub async fn status(&self) -> Result<SessionStatus, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::GetStatus { reply: tx }).await?;
        rx.await.map_err(|_| SessionError::SessionClosed)
    }

    /// Stop the engine and wait for the actor to exit.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(SessionCommand::Shutdown { reply: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    async fn send(&self, cmd: SessionCommand) -> Result<(), SessionError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| SessionError::SessionClosed)
    }
}
