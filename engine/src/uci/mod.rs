pub mod parser;

pub use parser::{parse_uci_message, UciMessage};

use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum UciError {
    #[error("Invalid argument for '{command}': {reason}")]
    InvalidArgument {
        command: &'static str,
        reason: &'static str,
    },
}

/// Commands written to the engine's stdin, one per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UciCommand {
    Uci,
    IsReady,
    SetOption { name: String, value: String },
    Position { fen: String },
    GoDepth(u32),
    Stop,
    NewGame,
    Quit,
}

impl UciCommand {
    /// Reject arguments that would split into more than one engine line.
    pub fn validate(&self) -> Result<(), UciError> {
        let (command, fields): (&'static str, Vec<&str>) = match self {
            UciCommand::SetOption { name, value } => ("setoption", vec![name.as_str(), value.as_str()]),
            UciCommand::Position { fen } => ("position", vec![fen.as_str()]),
            _ => return Ok(()),
        };
        if fields.iter().any(|f| f.contains(['\n', '\r'])) {
            return Err(UciError::InvalidArgument {
                command,
                reason: "contains a line break",
            });
        }
        if let UciCommand::SetOption { name, .. } = self {
            if name.trim().is_empty() {
                return Err(UciError::InvalidArgument {
                    command,
                    reason: "option name is empty",
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for UciCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UciCommand::Uci => f.write_str("uci"),
            UciCommand::IsReady => f.write_str("isready"),
            UciCommand::SetOption { name, value } => {
                write!(f, "setoption name {} value {}", name, value)
            }
            UciCommand::Position { fen } => write!(f, "position fen {}", fen),
            UciCommand::GoDepth(depth) => write!(f, "go depth {}", depth),
            UciCommand::Stop => f.write_str("stop"),
            UciCommand::NewGame => f.write_str("ucinewgame"),
            UciCommand::Quit => f.write_str("quit"),
        }
    }
}
