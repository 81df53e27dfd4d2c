use crate::{Progress, Score};

/// Incoming message from a UCI engine that the bridge acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum UciMessage {
    UciOk,
    ReadyOk,
    BestMove { mv: Option<String> },
    Info(Progress),
}

/// Parse one line of engine output.
///
/// Returns `None` for lines the bridge does not act on: `id`/`option`
/// declarations, `info string`, `info` lines without a score, and anything
/// else engines print.
pub fn parse_uci_message(line: &str) -> Option<UciMessage> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    match tokens.as_slice() {
        ["uciok"] => Some(UciMessage::UciOk),
        ["readyok"] => Some(UciMessage::ReadyOk),
        ["bestmove", rest @ ..] => Some(UciMessage::BestMove {
            mv: rest.first().and_then(|mv| parse_move_token(mv)),
        }),
        ["info", "depth", ..] => parse_info_line(&tokens[1..]).map(UciMessage::Info),
        _ => None,
    }
}

/// `(none)` and `0000` are how engines spell "no move".
fn parse_move_token(token: &str) -> Option<String> {
    match token {
        "(none)" | "0000" => None,
        mv => Some(mv.to_string()),
    }
}

/// Parse the fields of an `info` line; only lines carrying a score count.
fn parse_info_line(tokens: &[&str]) -> Option<Progress> {
    let mut depth = None;
    let mut score = None;
    let mut nps = None;
    let mut pv = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        match tokens[i] {
            "depth" => {
                i += 1;
                depth = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "nps" => {
                i += 1;
                nps = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "score" => {
                i += 1;
                if let Some(&score_type) = tokens.get(i) {
                    i += 1;
                    if let Some(value_str) = tokens.get(i) {
                        score = match score_type {
                            "cp" => value_str.parse().ok().map(Score::Centipawns),
                            "mate" => value_str.parse().ok().map(Score::Mate),
                            _ => None,
                        };
                    }
                }
            }
            "pv" => {
                // Collect all moves until next keyword
                i += 1;
                while i < tokens.len() && !is_keyword(tokens[i]) {
                    pv.push(tokens[i].to_string());
                    i += 1;
                }
                continue; // Don't increment i again
            }
            "string" => break, // free text until end of line
            _ => {
                // seldepth, nodes, time, bounds, ...
            }
        }
        i += 1;
    }

    Some(Progress {
        depth: depth?,
        score: score?,
        nps,
        pv,
    })
}

fn is_keyword(token: &str) -> bool {
    matches!(
        token,
        "depth"
            | "seldepth"
            | "time"
            | "nodes"
            | "score"
            | "pv"
            | "multipv"
            | "currmove"
            | "currmovenumber"
            | "hashfull"
            | "nps"
            | "tbhits"
            | "sbhits"
            | "cpuload"
            | "string"
            | "refutation"
            | "currline"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(line: &str) -> Progress {
        match parse_uci_message(line) {
            Some(UciMessage::Info(info)) => info,
            other => panic!("expected info, got {:?}", other),
        }
    }

    #[test]
    fn test_handshake_tokens() {
        assert_eq!(parse_uci_message("uciok"), Some(UciMessage::UciOk));
        assert_eq!(parse_uci_message("readyok\r"), Some(UciMessage::ReadyOk));
        assert_eq!(parse_uci_message("uciokay"), None);
    }

    #[test]
    fn test_parse_bestmove() {
        let msg = parse_uci_message("bestmove e2e4 ponder e7e5");
        assert_eq!(
            msg,
            Some(UciMessage::BestMove {
                mv: Some("e2e4".into())
            })
        );
    }

    #[test]
    fn test_parse_bestmove_none() {
        assert_eq!(
            parse_uci_message("bestmove (none)"),
            Some(UciMessage::BestMove { mv: None })
        );
        assert_eq!(
            parse_uci_message("bestmove"),
            Some(UciMessage::BestMove { mv: None })
        );
    }

    #[test]
    fn test_parse_info() {
        let info = info(
            "info depth 12 seldepth 17 multipv 1 score cp 35 nodes 15234 nps 812000 hashfull 4 tbhits 0 time 19 pv e2e4 e7e5 g1f3",
        );
        assert_eq!(info.depth, 12);
        assert_eq!(info.score, Score::Centipawns(35));
        assert_eq!(info.nps, Some(812000));
        assert_eq!(info.pv, vec!["e2e4", "e7e5", "g1f3"]);
        assert_eq!(info.best_move(), Some("e2e4"));
    }

    #[test]
    fn test_parse_negative_mate_keeps_sign() {
        let info = info("info depth 20 score mate -3 nodes 100 pv h7h8q");
        assert_eq!(info.score, Score::Mate(-3));
    }

    #[test]
    fn test_score_at_end_of_line() {
        let info = info("info depth 7 score cp -48");
        assert_eq!(info.score, Score::Centipawns(-48));
        assert_eq!(info.nps, None);
        assert!(info.pv.is_empty());

        let info = self::info("info depth 9 score cp 12 nps 5400");
        assert_eq!(info.nps, Some(5400));
    }

    #[test]
    fn test_bound_tokens_do_not_break_parsing() {
        let info = info("info depth 15 score cp 40 lowerbound nodes 9 nps 77 pv d2d4");
        assert_eq!(info.score, Score::Centipawns(40));
        assert_eq!(info.nps, Some(77));
        assert_eq!(info.pv, vec!["d2d4"]);
    }

    #[test]
    fn test_info_without_score_is_discarded() {
        assert_eq!(parse_uci_message("info depth 3 currmove e2e4 currmovenumber 1"), None);
        assert_eq!(parse_uci_message("info string NNUE evaluation enabled"), None);
        assert_eq!(parse_uci_message("info nodes 10 score cp 3"), None);
    }

    #[test]
    fn test_unrecognized_lines_are_ignored() {
        assert_eq!(parse_uci_message("Stockfish 16 by the Stockfish developers"), None);
        assert_eq!(parse_uci_message("id name Stockfish 16"), None);
        assert_eq!(parse_uci_message("option name Hash type spin default 16 min 1 max 33554432"), None);
        assert_eq!(parse_uci_message(""), None);
    }
}
