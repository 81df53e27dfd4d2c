use engine::{EngineError, EngineEvent, EngineMessage, StartOutcome, UciCommand};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;
use tracing::Instrument;

use crate::config::{EngineMode, StopPolicy};
use crate::framing::FrameWriter;
use crate::messages::{ErrorCode, EvalPayload, OutboundMessage};

use super::commands::*;
use super::state::{SessionPhase, SessionState};

const WATCHDOG_INTERVAL: Duration = Duration::from_millis(250);

/// The main session actor loop.
/// Owns all mutable state. Processes commands and engine events sequentially.
pub(crate) async fn run_session_actor(
    state: SessionState,
    cmd_rx: mpsc::Receiver<SessionCommand>,
    event_rx: mpsc::Receiver<EngineMessage>,
    out: FrameWriter,
) {
    run_session_actor_inner(state, cmd_rx, event_rx, out)
        .instrument(tracing::info_span!("session"))
        .await;
}

async fn run_session_actor_inner(
    mut state: SessionState,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    mut event_rx: mpsc::Receiver<EngineMessage>,
    out: FrameWriter,
) {
    tracing::info!("Session actor started");

    let mut watchdog = time::interval(WATCHDOG_INTERVAL);
    watchdog.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(SessionCommand::Shutdown { reply }) => {
                        tracing::info!("Session actor shutting down");
                        shutdown_engine(&mut state).await;
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        tracing::info!("All session handles dropped, shutting down");
                        shutdown_engine(&mut state).await;
                        break;
                    }
                    Some(cmd) => handle_command(&mut state, cmd, &out).await,
                }
            }

            Some(msg) = event_rx.recv() => {
                handle_engine_event(&mut state, msg, &out).await;
            }

            _ = watchdog.tick(), if state.watchdog_armed() => {
                check_deadlines(&mut state, &out).await;
            }
        }
    }

    tracing::info!("Session actor exited");
}

async fn emit(out: &FrameWriter, msg: OutboundMessage) {
    if let Err(e) = out.send(&msg).await {
        tracing::error!("Failed to write outbound {:?}: {}", msg, e);
    }
}

async fn emit_error(out: &FrameWriter, err: &SessionError) {
    emit(out, OutboundMessage::error(err.code(), err.to_string())).await;
}

async fn handle_command(state: &mut SessionState, cmd: SessionCommand, out: &FrameWriter) {
    match cmd {
        SessionCommand::Start => {
            if let Err(e) = start_engine(state, out).await {
                tracing::error!("Engine start failed: {}", e);
                emit_error(out, &e).await;
            }
        }
        SessionCommand::Evaluate(request) => evaluate(state, request, out).await,
        SessionCommand::Stop => stop_analysis(state, out).await,
        SessionCommand::Reset => reset(state, out).await,
        SessionCommand::SetOption { name, value } => set_option(state, name, value, out).await,
        SessionCommand::GetStatus { reply } => {
            let _ = reply.send(state.status());
        }
        // Intercepted by the actor loop
        SessionCommand::Shutdown { .. } => {}
    }
}

/// Spawn the engine unless one is live. Re-runs discovery for each spawn.
async fn start_engine(state: &mut SessionState, out: &FrameWriter) -> Result<(), SessionError> {
    if state.supervisor.is_live() {
        return Ok(());
    }

    let spec = state.config.locator.locate();
    if spec.is_none() {
        tracing::warn!("No engine binary found");
    }
    state.supervisor.set_spec(spec);

    match state.supervisor.start().await {
        Ok(StartOutcome::AlreadyRunning) => Ok(()),
        Ok(StartOutcome::Started { path }) => {
            state.clear_engine_state();
            state.set_phase(SessionPhase::Starting);
            emit(
                out,
                OutboundMessage::Started {
                    path: path.display().to_string(),
                },
            )
            .await;
            Ok(())
        }
        Err(e) => {
            state.clear_engine_state();
            Err(match e {
                EngineError::NotFound => SessionError::EngineNotFound,
                other => SessionError::Spawn(other.to_string()),
            })
        }
    }
}

async fn shutdown_engine(state: &mut SessionState) {
    state.supervisor.stop().await;
    state.clear_engine_state();
}

/// Write to the engine; pipe failures are returned for the caller to recover from.
async fn write(state: &SessionState, cmd: UciCommand) -> Result<(), SessionError> {
    state.supervisor.write(&cmd).await.map_err(|e| match e {
        EngineError::Uci(e) => SessionError::InvalidCommand(e.to_string()),
        other => SessionError::Pipe(other.to_string()),
    })
}

/// Run several writes, recovering from the first pipe failure.
async fn write_all(state: &mut SessionState, cmds: Vec<UciCommand>, out: &FrameWriter) -> bool {
    for cmd in cmds {
        match write(state, cmd).await {
            Ok(()) => {}
            Err(SessionError::InvalidCommand(reason)) => {
                emit(out, OutboundMessage::error(ErrorCode::InvalidMessage, reason)).await;
                return false;
            }
            Err(e) => {
                tracing::warn!("Engine write failed: {}", e);
                emit(out, OutboundMessage::debug(format!("{}; restarting engine", e))).await;
                recover_from_crash(state, out).await;
                return false;
            }
        }
    }
    true
}

/// Send `position` + `go` for `request` and make it the active search.
async fn issue_search(state: &mut SessionState, request: AnalysisRequest, out: &FrameWriter) {
    // Survives a pipe failure below so recovery re-runs it
    state.pending = Some(request.clone());
    let cmds = vec![
        UciCommand::Position {
            fen: request.fen.clone(),
        },
        UciCommand::GoDepth(request.depth),
    ];
    if !write_all(state, cmds, out).await {
        return;
    }

    state.pending = None;
    tracing::info!(depth = request.depth, "Analyzing {}", request.fen);
    emit(
        out,
        OutboundMessage::Analyzing {
            fen: request.fen.clone(),
            depth: request.depth,
        },
    )
    .await;
    state.active = Some(request);
    state.set_phase(SessionPhase::Analyzing);
}

async fn evaluate(state: &mut SessionState, request: AnalysisRequest, out: &FrameWriter) {
    let preview: String = request.fen.chars().take(30).collect();
    emit(out, OutboundMessage::debug(format!("Received evaluate: {}...", preview))).await;
    state.halted = false;

    if state.config.engine_mode == EngineMode::Fresh && state.supervisor.is_live() {
        tracing::debug!("Fresh engine per request, restarting");
        shutdown_engine(state).await;
    }

    match state.phase {
        SessionPhase::Stopped => {
            state.restart_attempts = 0;
            state.pending = Some(request);
            if let Err(e) = start_engine(state, out).await {
                tracing::error!("Cannot evaluate: {}", e);
                state.pending = None;
                emit_error(out, &e).await;
            }
        }
        SessionPhase::Starting | SessionPhase::AwaitingReady => {
            if state.pending.is_some() {
                tracing::debug!("Replacing queued request before engine is ready");
            }
            state.pending = Some(request);
        }
        SessionPhase::Idle => issue_search(state, request, out).await,
        SessionPhase::Analyzing => {
            tracing::debug!("Superseding running search");
            if !write_all(state, vec![UciCommand::Stop], out).await {
                // Recovery re-queued the old request; the new one wins if a
                // replacement engine is on its way
                if state.phase == SessionPhase::Starting {
                    state.pending = Some(request);
                } else {
                    tracing::warn!("Dropping request, engine could not be recovered");
                }
                return;
            }
            state.mark_search_stopped();
            issue_search(state, request, out).await;
        }
    }
}

async fn stop_analysis(state: &mut SessionState, out: &FrameWriter) {
    state.pending = None;

    match state.config.stop_policy {
        StopPolicy::KeepWarm => {
            if state.phase != SessionPhase::Analyzing {
                // Still halted if an earlier stop has not drained yet
                state.halted = state.owed_bestmoves > 0;
                return;
            }
            // Held until the stopped search's bestmove drains
            state.halted = true;
            if !write_all(state, vec![UciCommand::Stop], out).await {
                return;
            }
            state.mark_search_stopped();
            state.set_phase(SessionPhase::Idle);
        }
        StopPolicy::Kill => {
            if state.supervisor.is_live() {
                tracing::info!("Stop requested, killing engine");
            }
            shutdown_engine(state).await;
        }
    }
}

async fn reset(state: &mut SessionState, out: &FrameWriter) {
    state.pending = None;
    state.halted = false;

    let restart = state.config.engine_mode == EngineMode::Fresh
        || state.phase == SessionPhase::Stopped;
    if restart {
        shutdown_engine(state).await;
        if let Err(e) = start_engine(state, out).await {
            emit_error(out, &e).await;
        }
        return;
    }

    if state.phase == SessionPhase::Starting {
        // Handshake still running; the fresh process has no history to clear
        return;
    }

    let mut cmds = Vec::new();
    if state.phase == SessionPhase::Analyzing {
        cmds.push(UciCommand::Stop);
    }
    cmds.push(UciCommand::NewGame);
    // An outstanding isready already answers for the new game
    if state.phase != SessionPhase::AwaitingReady {
        cmds.push(UciCommand::IsReady);
    }

    let was_analyzing = state.phase == SessionPhase::Analyzing;
    if write_all(state, cmds, out).await {
        if was_analyzing {
            state.mark_search_stopped();
        }
        state.set_phase(SessionPhase::AwaitingReady);
    }
}

async fn set_option(state: &mut SessionState, name: String, value: String, out: &FrameWriter) {
    if !state.supervisor.is_live() {
        emit(
            out,
            OutboundMessage::debug(format!("No engine running, option '{}' not applied", name)),
        )
        .await;
        return;
    }

    let cmd = UciCommand::SetOption {
        name: name.clone(),
        value: value.clone(),
    };
    if write_all(state, vec![cmd], out).await {
        tracing::info!("Set option {} = {}", name, value);
        state.remember_option(&name, &value);
    }
}

async fn handle_engine_event(state: &mut SessionState, msg: EngineMessage, out: &FrameWriter) {
    if !state.supervisor.is_current(msg.generation) {
        tracing::debug!(
            generation = msg.generation,
            "Dropping event from previous engine: {:?}",
            msg.event
        );
        return;
    }

    match msg.event {
        EngineEvent::UciOk => {
            emit(out, OutboundMessage::UciOk).await;
            if state.phase != SessionPhase::Starting {
                tracing::debug!("Unexpected uciok in {:?}", state.phase);
                return;
            }
            configure_engine(state, out).await;
        }
        EngineEvent::Ready => {
            // A re-queued request may be what crashed the engine; only a
            // completed search proves the restart worked
            if state.pending.is_none() {
                state.restart_attempts = 0;
            }
            match state.phase {
                SessionPhase::Starting | SessionPhase::AwaitingReady | SessionPhase::Idle => {
                    state.set_phase(SessionPhase::Idle);
                    match state.pending.take() {
                        Some(request) => issue_search(state, request, out).await,
                        None => emit(out, OutboundMessage::Ready).await,
                    }
                }
                SessionPhase::Analyzing | SessionPhase::Stopped => {
                    tracing::debug!("Ignoring readyok in {:?}", state.phase);
                }
            }
        }
        EngineEvent::Progress(progress) => {
            if state.phase != SessionPhase::Analyzing || state.owed_bestmoves > 0 {
                tracing::trace!("Dropping info from a stopped search");
                return;
            }
            if progress.depth < state.config.min_depth {
                return;
            }
            emit(out, OutboundMessage::Eval(EvalPayload::from(&progress))).await;
        }
        EngineEvent::BestMove(mv) => {
            if state.take_owed_bestmove() {
                emit(
                    out,
                    OutboundMessage::debug(format!(
                        "Discarded bestmove {} from a stopped search",
                        mv.as_deref().unwrap_or("(none)")
                    )),
                )
                .await;
                return;
            }
            if state.phase != SessionPhase::Analyzing {
                tracing::debug!("Unexpected bestmove in {:?}", state.phase);
                return;
            }

            tracing::info!("Stockfish bestmove: {:?}", mv);
            emit(out, OutboundMessage::BestMove { mv }).await;
            state.restart_attempts = 0;
            state.active = None;
            state.set_phase(SessionPhase::Idle);
            if let Some(request) = state.pending.take() {
                issue_search(state, request, out).await;
            }
        }
        EngineEvent::Crashed => {
            tracing::warn!(generation = msg.generation, "Engine exited unexpectedly");
            recover_from_crash(state, out).await;
        }
    }
}

/// Send Threads, Hash, and remembered options, then `isready`.
async fn configure_engine(state: &mut SessionState, out: &FrameWriter) {
    let mut cmds = vec![
        UciCommand::SetOption {
            name: "Threads".into(),
            value: state.config.threads.to_string(),
        },
        UciCommand::SetOption {
            name: "Hash".into(),
            value: state.config.hash_mb.to_string(),
        },
    ];
    cmds.extend(
        state
            .options
            .iter()
            .map(|(name, value)| UciCommand::SetOption {
                name: name.clone(),
                value: value.clone(),
            }),
    );
    cmds.push(UciCommand::IsReady);

    if write_all(state, cmds, out).await {
        state.set_phase(SessionPhase::AwaitingReady);
    }
}

/// Tear down a dead engine and, unless the host stopped us, start a new one.
async fn recover_from_crash(state: &mut SessionState, out: &FrameWriter) {
    if state.pending.is_none() {
        state.pending = state.active.take();
    }
    shutdown_engine(state).await;
    emit(out, OutboundMessage::debug("Engine exited unexpectedly")).await;

    if state.halted {
        tracing::info!("Host stopped analysis, not restarting engine");
        state.halted = false;
        state.pending = None;
        return;
    }

    if state.restart_attempts >= state.config.max_restarts {
        let err = SessionError::EngineCrash(format!(
            "gave up after {} restart attempts",
            state.restart_attempts
        ));
        tracing::error!("{}", err);
        state.pending = None;
        emit_error(out, &err).await;
        return;
    }

    state.restart_attempts += 1;
    emit(
        out,
        OutboundMessage::debug(format!(
            "Restarting engine (attempt {} of {})",
            state.restart_attempts, state.config.max_restarts
        )),
    )
    .await;
    if let Err(e) = start_engine(state, out).await {
        tracing::error!("Engine restart failed: {}", e);
        state.pending = None;
        emit_error(out, &e).await;
    }
}

async fn check_deadlines(state: &mut SessionState, out: &FrameWriter) {
    let timeout = state.config.ready_timeout;

    if state.is_waiting_for_engine() && state.phase_since.elapsed() > timeout {
        let err = SessionError::EngineTimeout(timeout);
        tracing::error!("{}", err);
        state.pending = None;
        shutdown_engine(state).await;
        emit_error(out, &err).await;
        return;
    }

    if let Some(sent_at) = state.stop_sent_at {
        if sent_at.elapsed() > timeout {
            tracing::warn!("Engine ignored stop for {:?}, treating as crashed", timeout);
            recover_from_crash(state, out).await;
        }
    }
}
