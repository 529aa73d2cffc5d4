//! Command table, line parsing and command errors.

use std::fmt;

use arena_channel::ChannelError;
use indexmap::IndexMap;
use thiserror::Error;

use crate::api::ApiError;

/// What a command does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandKind {
    /// List commands.
    Help,
    /// Obtain a bearer token.
    Login,
    /// Open the duplex channel.
    Connect,
    /// Login followed by connect.
    Setup,
    /// Close the channel gracefully.
    Disconnect,
    /// Quit without closing the channel.
    Kill,
    /// Ask for the current scores.
    Scores,
    /// Subscribe to a match.
    Join,
    /// Create a match and subscribe to it.
    CreateMatch,
    /// Fire a test event.
    TestEvent,
    /// Leave the console.
    Exit,
}

/// One entry of the command table.
#[derive(Clone, Copy, Debug)]
pub struct CommandSpec {
    /// Name typed by the operator.
    pub name: &'static str,
    /// Argument synopsis.
    pub usage: &'static str,
    /// One-line description shown by `help`.
    pub description: &'static str,
    /// Whether a live channel must exist before running.
    pub requires_channel: bool,
    /// Handler selector.
    pub kind: CommandKind,
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.name, self.description)
    }
}

const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "help",
        usage: "help [command]",
        description: "Prints helpful information",
        requires_channel: false,
        kind: CommandKind::Help,
    },
    CommandSpec {
        name: "login",
        usage: "login <player> [password]",
        description: "Performs login for a player",
        requires_channel: false,
        kind: CommandKind::Login,
    },
    CommandSpec {
        name: "connect",
        usage: "connect",
        description: "Connects to the server via websockets",
        requires_channel: false,
        kind: CommandKind::Connect,
    },
    CommandSpec {
        name: "kill",
        usage: "kill",
        description: "Exits connection without proper disconnect",
        requires_channel: true,
        kind: CommandKind::Kill,
    },
    CommandSpec {
        name: "setup",
        usage: "setup <player> [password]",
        description: "Equivalent to running login followed by connect",
        requires_channel: false,
        kind: CommandKind::Setup,
    },
    CommandSpec {
        name: "disconnect",
        usage: "disconnect",
        description: "Closes the connection to the server",
        requires_channel: true,
        kind: CommandKind::Disconnect,
    },
    CommandSpec {
        name: "scores",
        usage: "scores",
        description: "Retrieves the current scores from the server",
        requires_channel: true,
        kind: CommandKind::Scores,
    },
    CommandSpec {
        name: "join",
        usage: "join <match_id>",
        description: "Subscribes to an existing match",
        requires_channel: true,
        kind: CommandKind::Join,
    },
    CommandSpec {
        name: "create_match",
        usage: "create_match [max_players]",
        description: "Creates a public match and joins it",
        requires_channel: true,
        kind: CommandKind::CreateMatch,
    },
    CommandSpec {
        name: "test_event",
        usage: "test_event [data]",
        description: "Sends a test event to the server",
        requires_channel: true,
        kind: CommandKind::TestEvent,
    },
    CommandSpec {
        name: "exit",
        usage: "exit",
        description: "Causes the program to exit",
        requires_channel: false,
        kind: CommandKind::Exit,
    },
];

/// Commands by name, in help order.
pub struct CommandTable {
    commands: IndexMap<&'static str, CommandSpec>,
}

impl CommandTable {
    /// The console's built-in commands.
    pub fn builtin() -> Self {
        Self {
            commands: COMMANDS.iter().map(|spec| (spec.name, *spec)).collect(),
        }
    }

    /// Look up a command by name.
    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.get(name)
    }

    /// Whether `name` is a known command.
    pub fn has_command(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// All commands in help order.
    pub fn iter(&self) -> impl Iterator<Item = &CommandSpec> {
        self.commands.values()
    }

    /// Number of commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// A parsed input line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation<'a> {
    /// Command name.
    pub name: &'a str,
    /// Space-delimited arguments.
    pub args: Vec<&'a str>,
}

impl<'a> Invocation<'a> {
    /// Split a line on whitespace. Blank lines yield `None`.
    pub fn parse(line: &'a str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let name = words.next()?;
        Some(Self {
            name,
            args: words.collect(),
        })
    }

    /// Argument at `index`, if present.
    pub fn arg(&self, index: usize) -> Option<&'a str> {
        self.args.get(index).copied()
    }
}

/// Why a command did not complete.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Unknown command name.
    #[error("Command not found")]
    NotFound,

    /// Missing or invalid arguments.
    #[error("Usage: {0}")]
    Usage(&'static str),

    /// `connect` before `login`.
    #[error("Need to login first, use: login <player>")]
    NotLoggedIn,

    /// No password given and none configured for the player.
    #[error("No password known for player '{0}', use: login <player> <password>")]
    UnknownPlayer(String),

    /// HTTP API failure.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Channel failure.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl CommandError {
    /// The line shown to the operator.
    pub fn operator_message(&self) -> String {
        match self {
            Self::Channel(ChannelError::NotConnected) => {
                r#"A valid connection is required, run "connect" first"#.to_string()
            }
            Self::Channel(ChannelError::ConnectionRefused { reason }) => {
                format!("Connection was refused: {reason}")
            }
            Self::Channel(ChannelError::Timeout { event, .. }) => {
                format!("Request timed out waiting for {event}")
            }
            Self::Channel(ChannelError::ChannelClosed) => {
                "Connection closed before the server replied".to_string()
            }
            Self::Api(ApiError::AuthFailure { status, body }) if body.is_empty() => {
                format!("Could not login to api (status {status})")
            }
            Self::Api(ApiError::AuthFailure { status, body }) => {
                format!("Could not login to api (status {status}): {body}")
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── CommandTable ──

    #[test]
    fn builtin_has_all_commands() {
        let table = CommandTable::builtin();
        for name in [
            "help",
            "login",
            "connect",
            "kill",
            "setup",
            "disconnect",
            "scores",
            "join",
            "create_match",
            "test_event",
            "exit",
        ] {
            assert!(table.has_command(name), "missing {name}");
        }
        assert_eq!(table.len(), 11);
    }

    #[test]
    fn help_order_is_table_order() {
        let table = CommandTable::builtin();
        let names: Vec<&str> = table.iter().map(|c| c.name).collect();
        assert_eq!(names.first(), Some(&"help"));
        assert_eq!(names.last(), Some(&"exit"));
    }

    #[test]
    fn channel_requirements() {
        let table = CommandTable::builtin();
        let requiring: Vec<&str> = table
            .iter()
            .filter(|c| c.requires_channel)
            .map(|c| c.name)
            .collect();
        assert_eq!(
            requiring,
            vec!["kill", "disconnect", "scores", "join", "create_match", "test_event"]
        );
    }

    #[test]
    fn display_is_name_dash_description() {
        let table = CommandTable::builtin();
        assert_eq!(
            table.get("help").unwrap().to_string(),
            "help - Prints helpful information"
        );
    }

    #[test]
    fn unknown_command_is_absent() {
        let table = CommandTable::builtin();
        assert!(table.get("dance").is_none());
    }

    // ── Invocation ──

    #[test]
    fn parse_name_and_args() {
        let inv = Invocation::parse("login momo 1234").unwrap();
        assert_eq!(inv.name, "login");
        assert_eq!(inv.args, vec!["momo", "1234"]);
        assert_eq!(inv.arg(1), Some("1234"));
        assert_eq!(inv.arg(2), None);
    }

    #[test]
    fn parse_collapses_whitespace() {
        let inv = Invocation::parse("  join   42  ").unwrap();
        assert_eq!(inv.name, "join");
        assert_eq!(inv.args, vec!["42"]);
    }

    #[test]
    fn parse_blank_is_none() {
        assert!(Invocation::parse("").is_none());
        assert!(Invocation::parse("   \t").is_none());
    }

    // ── CommandError ──

    #[test]
    fn not_connected_message() {
        let err = CommandError::from(ChannelError::NotConnected);
        assert_eq!(
            err.operator_message(),
            r#"A valid connection is required, run "connect" first"#
        );
    }

    #[test]
    fn timeout_message_names_event() {
        let err = CommandError::from(ChannelError::Timeout {
            event: "get_scores".into(),
            timeout_ms: 30_000,
        });
        assert_eq!(
            err.operator_message(),
            "Request timed out waiting for get_scores"
        );
    }

    #[test]
    fn plain_messages_use_display() {
        assert_eq!(CommandError::NotFound.operator_message(), "Command not found");
        assert_eq!(
            CommandError::NotLoggedIn.operator_message(),
            "Need to login first, use: login <player>"
        );
        assert_eq!(
            CommandError::Usage("join <match_id>").operator_message(),
            "Usage: join <match_id>"
        );
    }

    #[test]
    fn auth_failure_message() {
        let err = CommandError::from(ApiError::AuthFailure {
            status: 401,
            body: String::new(),
        });
        assert_eq!(err.operator_message(), "Could not login to api (status 401)");
    }
}
