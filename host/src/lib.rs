//! Native messaging host that puts a local UCI engine behind a browser
//! extension.
//!
//! The browser talks length-prefixed JSON over the process's stdin/stdout
//! (see [`framing`] and [`messages`]). [`bridge::run_bridge`] decodes
//! inbound frames and forwards them to the [`session`] actor, which owns the
//! engine process and writes every outbound message.

pub mod bridge;
pub mod config;
pub mod framing;
pub mod messages;
pub mod session;
