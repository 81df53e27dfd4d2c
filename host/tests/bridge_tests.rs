//! End-to-end tests: frames in, engine subprocess, frames out.
//!
//! The engine is a small POSIX shell script whose searches take about a
//! second, long enough for a second request or a `stop` to interrupt them.
#![cfg(unix)]

use std::time::{Duration, Instant};

use chessist_host::bridge::{run_bridge, BridgeError, ExitReason};
use chessist_host::framing::{FrameReader, FrameWriter};
use chessist_host::session::{spawn_session, EngineLocator, SessionConfig};
use engine::EngineSpec;
use serde_json::{json, Value};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const WHITE_TO_MOVE: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
const BLACK_TO_MOVE: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";

/// Plays e2e4 for white and e7e5 for black. A search answers after one
/// second unless `stop` cuts it short. Exits once on `go` when
/// `<script>.crash` exists.
const SLOW_ENGINE: &str = r#"
mv=e2e4
n=0
flag=""
while IFS= read -r line; do
  case "$line" in
    uci) echo "id name slow"; echo "uciok" ;;
    isready) echo "readyok" ;;
    "position fen "*" b "*) mv=e7e5 ;;
    "position fen "*) mv=e2e4 ;;
    "go depth "*)
      if [ -f "$0.crash" ]; then rm -f "$0.crash"; exit 3; fi
      echo "info depth 3 score cp 10 pv $mv"
      echo "info depth 7 score cp 30 nps 1200 pv $mv"
      n=$((n + 1))
      flag="$0.search$n"
      : > "$flag"
      ( sleep 1; if [ -f "$flag" ]; then rm -f "$flag"; echo "bestmove $mv"; fi ) &
      ;;
    stop)
      if [ -f "$flag" ]; then rm -f "$flag"; echo "bestmove $mv"; fi ;;
    quit) exit 0 ;;
  esac
done
"#;

struct Host {
    input: DuplexStream,
    output: mpsc::UnboundedReceiver<Value>,
    task: JoinHandle<Result<ExitReason, BridgeError>>,
    dir: tempfile::TempDir,
}

impl Host {
    async fn spawn() -> Self {
        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("engine.sh");
        std::fs::write(&script, SLOW_ENGINE).unwrap();

        let config = SessionConfig {
            locator: EngineLocator::Fixed(
                EngineSpec::new("/bin/sh").with_args(vec![script.display().to_string()]),
            ),
            shutdown_grace: Duration::from_millis(500),
            ..SessionConfig::default()
        };

        let (input, host_in) = tokio::io::duplex(64 * 1024);
        let (host_out, output_stream) = tokio::io::duplex(64 * 1024);

        let out = FrameWriter::new(host_out);
        let session = spawn_session(config, out.clone());
        session.start().await.unwrap();
        let task = tokio::spawn(run_bridge(host_in, out, session));

        let (tx, output) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut frames = FrameReader::new(output_stream);
            while let Ok(Some(frame)) = frames.read_frame().await {
                let value: Value = serde_json::from_slice(&frame).unwrap();
                if tx.send(value).is_err() {
                    break;
                }
            }
        });

        Host {
            input,
            output,
            task,
            dir,
        }
    }

    async fn send(&mut self, message: Value) {
        let payload = serde_json::to_vec(&message).unwrap();
        self.input
            .write_all(&(payload.len() as u32).to_le_bytes())
            .await
            .unwrap();
        self.input.write_all(&payload).await.unwrap();
    }

    async fn evaluate(&mut self, fen: &str) {
        self.send(json!({"type": "evaluate", "fen": fen, "depth": 12}))
            .await;
    }

    async fn next_of(&mut self, kind: &str) -> Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), self.output.recv())
                .await
                .expect("timed out waiting for outbound message")
                .expect("outbound stream closed");
            if msg["type"] == kind {
                return msg;
            }
        }
    }

    /// Send `quit`, wait for the bridge to finish, and return everything
    /// written after this point.
    async fn quit(mut self) -> (ExitReason, Vec<Value>) {
        self.send(json!({"type": "quit"})).await;
        let reason = tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("bridge did not exit")
            .unwrap()
            .unwrap();

        let mut rest = Vec::new();
        while let Some(msg) = self.output.recv().await {
            rest.push(msg);
        }
        (reason, rest)
    }
}

fn count(messages: &[Value], kind: &str) -> usize {
    messages.iter().filter(|m| m["type"] == kind).count()
}

#[tokio::test]
async fn test_evaluate_produces_progress_then_one_bestmove() {
    let mut host = Host::spawn().await;
    host.next_of("ready").await;

    host.evaluate(WHITE_TO_MOVE).await;
    let analyzing = host.next_of("analyzing").await;
    assert_eq!(analyzing["fen"], WHITE_TO_MOVE);
    assert_eq!(analyzing["depth"], 12);

    let eval = host.next_of("eval").await;
    assert_eq!(eval["depth"], 7);
    assert_eq!(eval["cp"], 30);
    assert_eq!(eval["bestMove"], "e2e4");
    assert_eq!(eval["pv"], json!(["e2e4"]));

    let best = host.next_of("bestmove").await;
    assert_eq!(best["move"], "e2e4");

    let (reason, rest) = host.quit().await;
    assert_eq!(reason, ExitReason::Quit);
    assert_eq!(count(&rest, "bestmove"), 0);
}

#[tokio::test]
async fn test_new_position_supersedes_running_search() {
    let mut host = Host::spawn().await;
    host.next_of("ready").await;

    host.evaluate(WHITE_TO_MOVE).await;
    host.next_of("analyzing").await;

    host.evaluate(BLACK_TO_MOVE).await;
    let analyzing = host.next_of("analyzing").await;
    assert_eq!(analyzing["fen"], BLACK_TO_MOVE);

    // The stopped search's e2e4 is swallowed
    let best = host.next_of("bestmove").await;
    assert_eq!(best["move"], "e7e5");

    tokio::time::sleep(Duration::from_millis(300)).await;
    let (_, rest) = host.quit().await;
    assert_eq!(count(&rest, "bestmove"), 0);
}

#[tokio::test]
async fn test_crash_during_search_is_retried() {
    let mut host = Host::spawn().await;
    host.next_of("ready").await;

    std::fs::write(host.dir.path().join("engine.sh.crash"), "").unwrap();
    host.evaluate(WHITE_TO_MOVE).await;
    host.next_of("analyzing").await;

    // Restarted engine picks the same request back up
    host.next_of("started").await;
    let analyzing = host.next_of("analyzing").await;
    assert_eq!(analyzing["fen"], WHITE_TO_MOVE);
    assert_eq!(host.next_of("bestmove").await["move"], "e2e4");

    let (_, rest) = host.quit().await;
    assert_eq!(count(&rest, "error"), 0);
}

#[tokio::test]
async fn test_stop_then_quit_exits_promptly() {
    let mut host = Host::spawn().await;
    host.next_of("ready").await;

    host.evaluate(WHITE_TO_MOVE).await;
    host.next_of("analyzing").await;

    let begin = Instant::now();
    host.send(json!({"type": "stop"})).await;
    let (reason, rest) = host.quit().await;

    assert_eq!(reason, ExitReason::Quit);
    assert!(begin.elapsed() < Duration::from_secs(2));
    assert_eq!(count(&rest, "error"), 0);
    // The stopped search still answers, but its move is never forwarded
    assert_eq!(count(&rest, "bestmove"), 0);
}

#[tokio::test]
async fn test_bad_frame_does_not_end_session() {
    let mut host = Host::spawn().await;
    host.next_of("ready").await;

    host.send(json!({"type": "evaluate", "fen": "a\nb"})).await;
    assert_eq!(host.next_of("error").await["code"], "invalid_message");

    host.evaluate(WHITE_TO_MOVE).await;
    assert_eq!(host.next_of("bestmove").await["move"], "e2e4");

    let (reason, _) = host.quit().await;
    assert_eq!(reason, ExitReason::Quit);
}

#[tokio::test]
async fn test_host_eof_shuts_down() {
    let mut host = Host::spawn().await;
    host.next_of("ready").await;

    drop(host.input);
    let reason = tokio::time::timeout(Duration::from_secs(5), host.task)
        .await
        .expect("bridge did not exit")
        .unwrap()
        .unwrap();
    assert_eq!(reason, ExitReason::HostClosed);
}
