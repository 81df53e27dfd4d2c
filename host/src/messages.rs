//! JSON messages carried inside frames.
//!
//! Inbound: `{"type": "evaluate" | "stop" | "reset" | "set_option" | "quit", ...}`.
//! Outbound: `{"type": "started" | "uciok" | "ready" | "analyzing" | "eval" |
//! "bestmove" | "error" | "debug", ...}` with the payload fields flattened
//! into the same object.

use engine::{Progress, Score};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::AnalysisRequest;

/// Search depth used when `evaluate` does not name one.
pub const DEFAULT_DEPTH: u32 = 18;

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("Frame is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("Missing field '{0}'")]
    MissingField(&'static str),
    #[error("Invalid field '{field}': {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("Unknown message type '{0}'")]
    UnknownType(String),
}

/// A validated command from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    Evaluate(AnalysisRequest),
    Stop,
    Reset,
    SetOption { name: String, value: String },
    Quit,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawCommand {
    Evaluate {
        fen: Option<String>,
        depth: Option<i64>,
    },
    Stop,
    Reset,
    SetOption {
        name: Option<String>,
        value: Option<Value>,
    },
    Quit,
}

const KNOWN_TYPES: &[&str] = &["evaluate", "stop", "reset", "set_option", "quit"];

impl HostCommand {
    /// Decode and validate one frame payload.
    pub fn from_frame(payload: &[u8]) -> Result<Self, MessageError> {
        let text = std::str::from_utf8(payload)?;
        let value: Value = serde_json::from_str(text)?;

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(MessageError::MissingField("type"))?;
        if !KNOWN_TYPES.contains(&kind) {
            return Err(MessageError::UnknownType(kind.to_string()));
        }

        match serde_json::from_value(value)? {
            RawCommand::Evaluate { fen, depth } => {
                let fen = fen
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty())
                    .ok_or(MessageError::MissingField("fen"))?;
                reject_line_breaks("fen", &fen)?;

                let depth = match depth {
                    None => DEFAULT_DEPTH,
                    Some(d) => u32::try_from(d)
                        .ok()
                        .filter(|d| *d > 0)
                        .ok_or(MessageError::InvalidField {
                            field: "depth",
                            reason: "must be a positive integer",
                        })?,
                };
                Ok(HostCommand::Evaluate(AnalysisRequest { fen, depth }))
            }
            RawCommand::Stop => Ok(HostCommand::Stop),
            RawCommand::Reset => Ok(HostCommand::Reset),
            RawCommand::SetOption { name, value } => {
                let name = name
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty())
                    .ok_or(MessageError::MissingField("name"))?;
                let value = match value {
                    Some(Value::String(s)) => s,
                    Some(Value::Number(n)) => n.to_string(),
                    Some(Value::Bool(b)) => b.to_string(),
                    Some(Value::Null) | None => return Err(MessageError::MissingField("value")),
                    Some(_) => {
                        return Err(MessageError::InvalidField {
                            field: "value",
                            reason: "must be a string, number, or boolean",
                        })
                    }
                };
                reject_line_breaks("name", &name)?;
                reject_line_breaks("value", &value)?;
                Ok(HostCommand::SetOption { name, value })
            }
            RawCommand::Quit => Ok(HostCommand::Quit),
        }
    }
}

fn reject_line_breaks(field: &'static str, value: &str) -> Result<(), MessageError> {
    if value.contains(['\n', '\r']) {
        return Err(MessageError::InvalidField {
            field,
            reason: "must not contain line breaks",
        });
    }
    Ok(())
}

/// Error categories reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    EngineNotFound,
    SpawnFailure,
    PipeError,
    FramingError,
    InvalidMessage,
    EngineTimeout,
    EngineCrash,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Started {
        path: String,
    },
    #[serde(rename = "uciok")]
    UciOk,
    Ready,
    Analyzing {
        fen: String,
        depth: u32,
    },
    Eval(EvalPayload),
    #[serde(rename = "bestmove")]
    BestMove {
        #[serde(rename = "move")]
        mv: Option<String>,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
    Debug {
        message: String,
    },
}

impl OutboundMessage {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        OutboundMessage::Error {
            code,
            message: message.into(),
        }
    }

    pub fn debug(message: impl Into<String>) -> Self {
        OutboundMessage::Debug {
            message: message.into(),
        }
    }
}

/// Search progress as the host sees it; `cp` and `mate` never both appear.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalPayload {
    pub depth: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cp: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mate: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nps: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_move: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pv: Vec<String>,
}

impl From<&Progress> for EvalPayload {
    fn from(progress: &Progress) -> Self {
        let (cp, mate) = match progress.score {
            Score::Centipawns(cp) => (Some(cp), None),
            Score::Mate(m) => (None, Some(m)),
        };
        Self {
            depth: progress.depth,
            cp,
            mate,
            nps: progress.nps,
            best_move: progress.best_move().map(str::to_string),
            pv: progress.pv.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Result<HostCommand, MessageError> {
        HostCommand::from_frame(value.to_string().as_bytes())
    }

    #[test]
    fn test_evaluate_with_default_depth() {
        let cmd = parse(json!({"type": "evaluate", "fen": "8/8/8/8/8/8/8/K6k w - - 0 1"})).unwrap();
        assert_eq!(
            cmd,
            HostCommand::Evaluate(AnalysisRequest {
                fen: "8/8/8/8/8/8/8/K6k w - - 0 1".into(),
                depth: DEFAULT_DEPTH,
            })
        );
    }

    #[test]
    fn test_evaluate_rejects_bad_input() {
        assert!(matches!(
            parse(json!({"type": "evaluate"})),
            Err(MessageError::MissingField("fen"))
        ));
        assert!(matches!(
            parse(json!({"type": "evaluate", "fen": "x", "depth": 0})),
            Err(MessageError::InvalidField { field: "depth", .. })
        ));
        assert!(matches!(
            parse(json!({"type": "evaluate", "fen": "x\nquit"})),
            Err(MessageError::InvalidField { field: "fen", .. })
        ));
    }

    #[test]
    fn test_set_option_value_types() {
        let cmd = parse(json!({"type": "set_option", "name": "Threads", "value": 4})).unwrap();
        assert_eq!(
            cmd,
            HostCommand::SetOption {
                name: "Threads".into(),
                value: "4".into()
            }
        );

        let cmd = parse(json!({"type": "set_option", "name": "UCI_ShowWDL", "value": true})).unwrap();
        assert!(matches!(cmd, HostCommand::SetOption { ref value, .. } if value == "true"));

        assert!(matches!(
            parse(json!({"type": "set_option", "name": "Hash"})),
            Err(MessageError::MissingField("value"))
        ));
    }

    #[test]
    fn test_unknown_and_malformed_frames() {
        assert!(matches!(
            parse(json!({"type": "ponder"})),
            Err(MessageError::UnknownType(t)) if t == "ponder"
        ));
        assert!(matches!(
            parse(json!({"fen": "x"})),
            Err(MessageError::MissingField("type"))
        ));
        assert!(matches!(
            HostCommand::from_frame(b"{not json"),
            Err(MessageError::InvalidJson(_))
        ));
        assert!(matches!(
            HostCommand::from_frame(&[0xff, 0xfe]),
            Err(MessageError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn test_eval_payload_is_flattened() {
        let progress = Progress {
            depth: 12,
            score: Score::Mate(-2),
            nps: Some(1000),
            pv: vec!["e2e4".into(), "e7e5".into()],
        };
        let msg = OutboundMessage::Eval(EvalPayload::from(&progress));
        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(
            value,
            json!({
                "type": "eval",
                "depth": 12,
                "mate": -2,
                "nps": 1000,
                "bestMove": "e2e4",
                "pv": ["e2e4", "e7e5"]
            })
        );
        assert!(value.get("cp").is_none());
    }

    #[test]
    fn test_outbound_type_names() {
        let value = serde_json::to_value(OutboundMessage::BestMove { mv: None }).unwrap();
        assert_eq!(value, json!({"type": "bestmove", "move": null}));

        let value = serde_json::to_value(OutboundMessage::UciOk).unwrap();
        assert_eq!(value, json!({"type": "uciok"}));

        let value =
            serde_json::to_value(OutboundMessage::error(ErrorCode::EngineNotFound, "missing")).unwrap();
        assert_eq!(
            value,
            json!({"type": "error", "code": "engine_not_found", "message": "missing"})
        );
    }
}
