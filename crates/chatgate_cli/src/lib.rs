//! Terminal chat front-end for the `chatgate` session core.
//!
//! ## Backend selection
//!
//! - `CHATGATE_BACKEND=claude-cli` (default) spawns the generation CLI named by
//!   `CHATGATE_CLI_PATH` (default `claude`).
//! - `CHATGATE_BACKEND=mock` streams a scripted demo reply.
//!
//! ## Other environment
//!
//! - `CHATGATE_CONFIG_DIR` overrides where settings, saved chats and the log
//!   file live (default `<platform config dir>/chatgate`).
//! - `CHATGATE_MODEL` picks the initial model by alias or identifier.
//! - `CHATGATE_IDLE_WARN_SECS` / `CHATGATE_IDLE_EXPIRE_SECS` tune the
//!   inactivity countdowns (defaults 240 / 300).
//! - `RUST_LOG` filters the log file (default `info`).

pub mod backends;
pub mod config;
pub mod logging;
pub mod runtime;
pub mod terminal;
