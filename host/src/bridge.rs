//! Inbound command loop.
//!
//! Reads one frame at a time and hands the decoded command to the session.
//! Outbound traffic is pushed by the session actor as engine output arrives;
//! this loop never waits on it.

use tokio::io::AsyncRead;

use crate::framing::{FrameError, FrameReader, FrameWriter};
use crate::messages::{ErrorCode, HostCommand, MessageError, OutboundMessage};
use crate::session::{SessionError, SessionHandle};

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The inbound stream is desynchronized and cannot be resumed.
    #[error("Inbound framing error: {0}")]
    Framing(#[from] FrameError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// How the loop ended when it ended cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Quit,
    HostClosed,
}

/// Run until `quit`, end-of-stream, or an unrecoverable framing error.
/// The session is shut down before this returns.
pub async fn run_bridge<R>(
    reader: R,
    out: FrameWriter,
    session: SessionHandle,
) -> Result<ExitReason, BridgeError>
where
    R: AsyncRead + Unpin,
{
    let mut frames = FrameReader::new(reader);
    let result = read_loop(&mut frames, &out, &session).await;

    if let Err(BridgeError::Framing(ref e)) = result {
        tracing::error!("Inbound stream unusable: {}", e);
        send(&out, OutboundMessage::error(ErrorCode::FramingError, e.to_string())).await;
    }

    session.shutdown().await;
    result
}

async fn read_loop<R>(
    frames: &mut FrameReader<R>,
    out: &FrameWriter,
    session: &SessionHandle,
) -> Result<ExitReason, BridgeError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let Some(frame) = frames.read_frame().await? else {
            tracing::info!("Host closed the channel");
            return Ok(ExitReason::HostClosed);
        };

        let cmd = match HostCommand::from_frame(&frame) {
            Ok(cmd) => cmd,
            Err(MessageError::UnknownType(kind)) => {
                tracing::debug!("Ignoring unknown message type {}", kind);
                let notice = format!("Ignoring unknown message type '{}'", kind);
                send(out, OutboundMessage::debug(notice)).await;
                continue;
            }
            Err(e) => {
                tracing::warn!("Dropping malformed frame: {}", e);
                send(out, OutboundMessage::error(ErrorCode::InvalidMessage, e.to_string())).await;
                continue;
            }
        };

        tracing::debug!("Host command: {:?}", cmd);
        match cmd {
            HostCommand::Evaluate(request) => session.evaluate(request).await?,
            HostCommand::Stop => session.stop().await?,
            HostCommand::Reset => session.reset().await?,
            HostCommand::SetOption { name, value } => session.set_option(name, value).await?,
            HostCommand::Quit => {
                tracing::info!("Quit requested");
                return Ok(ExitReason::Quit);
            }
        }
    }
}

async fn send(out: &FrameWriter, msg: OutboundMessage) {
    if let Err(e) = out.send(&msg).await {
        tracing::error!("Failed to write outbound message: {}", e);
    }
}
