//! Runtime configuration for the native host.
//!
//! Every tunable has a compile-time default and can be overridden at runtime
//! via a dedicated environment variable. Command-line flags (see `main.rs`)
//! take precedence over both.

use std::path::PathBuf;
use std::time::Duration;

/// Default `Threads` option sent after the handshake.
pub const DEFAULT_THREADS: u32 = 1;

/// Default `Hash` option in MB.
pub const DEFAULT_HASH_MB: u32 = 16;

/// Shallower `info` lines are not forwarded to the host.
pub const DEFAULT_MIN_DEPTH: u32 = 5;

/// How long the engine may take to answer the handshake or a `stop`.
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 5000;

/// How long a quitting engine gets before it is killed.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 1000;

/// Consecutive automatic restarts before a crash is reported as an error.
pub const DEFAULT_MAX_RESTARTS: u32 = 3;

const MAX_THREADS: u32 = 512;
const MAX_HASH_MB: u32 = 33_554_432;

/// Whether one engine is reused across requests or respawned for each.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum EngineMode {
    /// Keep one warm engine; supersede searches with `stop`.
    #[default]
    Persistent,
    /// Kill and respawn the engine for every request and reset.
    Fresh,
}

/// What an explicit `stop` from the host does to the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum StopPolicy {
    /// Stop the search, keep the process.
    #[default]
    KeepWarm,
    /// Stop the process.
    Kill,
}

/// Get the explicit engine path.
///
/// Priority:
/// 1. `STOCKFISH_PATH` env variable if set
/// 2. `None` (discovery searches well-known locations and `PATH`)
pub fn get_engine_path() -> Option<PathBuf> {
    std::env::var_os(engine::discovery::STOCKFISH_PATH_ENV).map(PathBuf::from)
}

/// Get the `Threads` option, clamped to 1..=512.
///
/// Priority:
/// 1. `CHESSIST_THREADS` env variable if set and parseable
/// 2. `1` as fallback
pub fn get_threads() -> u32 {
    clamp_threads(env_or("CHESSIST_THREADS", DEFAULT_THREADS))
}

/// Get the `Hash` option in MB, clamped to 1..=33554432.
///
/// Priority:
/// 1. `CHESSIST_HASH_MB` env variable if set and parseable
/// 2. `16` as fallback
pub fn get_hash_mb() -> u32 {
    clamp_hash_mb(env_or("CHESSIST_HASH_MB", DEFAULT_HASH_MB))
}

pub fn clamp_threads(threads: u32) -> u32 {
    threads.clamp(1, MAX_THREADS)
}

pub fn clamp_hash_mb(hash_mb: u32) -> u32 {
    hash_mb.clamp(1, MAX_HASH_MB)
}

/// Get the engine mode from `CHESSIST_ENGINE_MODE` (`persistent` or `fresh`).
pub fn get_engine_mode() -> EngineMode {
    env_value_enum("CHESSIST_ENGINE_MODE")
}

/// Get the stop policy from `CHESSIST_STOP_POLICY` (`keep-warm` or `kill`).
pub fn get_stop_policy() -> StopPolicy {
    env_value_enum("CHESSIST_STOP_POLICY")
}

/// Get the minimum depth of forwarded `eval` messages from `CHESSIST_MIN_DEPTH`.
pub fn get_min_depth() -> u32 {
    env_or("CHESSIST_MIN_DEPTH", DEFAULT_MIN_DEPTH)
}

/// Get the readiness timeout from `CHESSIST_READY_TIMEOUT_MS`.
pub fn get_ready_timeout() -> Duration {
    Duration::from_millis(env_or("CHESSIST_READY_TIMEOUT_MS", DEFAULT_READY_TIMEOUT_MS))
}

/// Get the shutdown grace period from `CHESSIST_SHUTDOWN_GRACE_MS`.
pub fn get_shutdown_grace() -> Duration {
    Duration::from_millis(env_or(
        "CHESSIST_SHUTDOWN_GRACE_MS",
        DEFAULT_SHUTDOWN_GRACE_MS,
    ))
}

/// Get the restart budget from `CHESSIST_MAX_RESTARTS`.
pub fn get_max_restarts() -> u32 {
    env_or("CHESSIST_MAX_RESTARTS", DEFAULT_MAX_RESTARTS)
}

/// Get the directory for log files.
///
/// Priority:
/// 1. `CHESSIST_LOG_DIR` env variable if set
/// 2. `None`: logs go to stderr, never stdout (stdout carries frames)
pub fn get_log_dir() -> Option<PathBuf> {
    std::env::var_os("CHESSIST_LOG_DIR").map(PathBuf::from)
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(value) => value.trim().parse().unwrap_or(default),
        Err(_) => default,
    }
}

fn env_value_enum<T: clap::ValueEnum + Default>(key: &str) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| T::from_str(value.trim(), true).ok())
        .unwrap_or_default()
}
