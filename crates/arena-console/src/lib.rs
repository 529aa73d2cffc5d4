//! # arena-console
//!
//! Interactive operator console for the arena game server.
//!
//! - [`api`]: login and bearer-authenticated REST calls
//! - [`session`]: token and live channel owned by the console
//! - [`commands`]: command table, line parsing, operator-facing errors
//! - [`console`]: dispatcher and command implementations
//! - [`output`]: stdout or captured output
//! - [`logging`]: tracing subscriber for the binary

#![deny(unsafe_code)]

pub mod api;
pub mod commands;
pub mod console;
pub mod logging;
pub mod output;
pub mod session;

pub use api::{ApiClient, ApiError, ApiReply};
pub use commands::{CommandError, CommandKind, CommandSpec, CommandTable, Invocation};
pub use console::{Console, Flow, GREETING, channel_options};
pub use output::Printer;
pub use session::Session;
