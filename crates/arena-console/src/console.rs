//! Command dispatcher and command implementations.

use std::time::Duration;

use arena_channel::{Channel, ChannelOptions, PushHandlers};
use arena_settings::{ChannelSettings, ConsoleSettings};
use reqwest::Method;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::api::{ApiClient, ApiReply};
use crate::commands::{CommandError, CommandKind, CommandTable, Invocation};
use crate::output::Printer;
use crate::session::Session;

/// Printed once when the console starts.
pub const GREETING: &str = "For a list of commands type 'help'";

/// What the read loop should do after a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Read the next line.
    Continue,
    /// Leave the loop and shut down gracefully.
    Exit,
    /// Leave the process immediately; the channel has been aborted.
    Kill,
}

/// Channel tunables from settings.
pub fn channel_options(settings: &ChannelSettings) -> ChannelOptions {
    ChannelOptions {
        exchange_timeout: Duration::from_millis(settings.exchange_timeout_ms),
        connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
        outbound_capacity: settings.outbound_capacity,
        disconnect_grace: Duration::from_millis(settings.disconnect_grace_ms),
    }
}

/// The interactive console: command table, session and collaborators.
pub struct Console {
    settings: ConsoleSettings,
    api: ApiClient,
    table: CommandTable,
    session: Session,
    handlers: PushHandlers,
    out: Printer,
}

impl Console {
    /// Build a console writing to `out`.
    pub fn new(settings: ConsoleSettings, out: Printer) -> Self {
        let api = ApiClient::new(&settings.server.base_url, &settings.server.api_path);
        let handlers = PushHandlers::new();
        let ping_out = out.clone();
        handlers.register("ping", move |args: &[Value]| {
            let message = args
                .first()
                .map(|payload| payload.get("message").unwrap_or(payload))
                .map(render)
                .unwrap_or_default();
            ping_out.line(format!("Received: {message}"));
        });

        Self {
            settings,
            api,
            table: CommandTable::builtin(),
            session: Session::new(),
            handlers,
            out,
        }
    }

    /// Connection state.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Push handlers handed to every new channel.
    pub fn handlers(&self) -> &PushHandlers {
        &self.handlers
    }

    /// Output sink.
    pub fn printer(&self) -> &Printer {
        &self.out
    }

    /// Run one input line. Failures are reported to the operator, never
    /// propagated.
    pub async fn execute(&mut self, line: &str) -> Flow {
        let Some(invocation) = Invocation::parse(line) else {
            return Flow::Continue;
        };
        debug!(command = invocation.name, "executing");
        match self.dispatch(&invocation).await {
            Ok(flow) => flow,
            Err(err) => {
                debug!(command = invocation.name, error = %err, "command failed");
                self.out.line(err.operator_message());
                Flow::Continue
            }
        }
    }

    /// Close the channel gracefully, if one is open.
    pub async fn shutdown(&mut self) {
        if let Some(channel) = self.session.detach() {
            channel.disconnect().await;
            self.out.line("disconnected");
        }
    }

    /// Drop the channel without notifying the server.
    pub fn kill(&mut self) {
        if let Some(channel) = self.session.detach() {
            channel.abort();
        }
    }

    async fn dispatch(&mut self, invocation: &Invocation<'_>) -> Result<Flow, CommandError> {
        let spec = *self
            .table
            .get(invocation.name)
            .ok_or(CommandError::NotFound)?;
        if spec.requires_channel {
            let _ = self.session.channel()?;
        }

        match spec.kind {
            CommandKind::Help => self.help(invocation.arg(0)),
            CommandKind::Login => self.login(invocation).await?,
            CommandKind::Connect => self.connect().await?,
            CommandKind::Setup => {
                self.login(invocation).await?;
                self.connect().await?;
            }
            CommandKind::Disconnect => self.shutdown().await,
            CommandKind::Kill => {
                self.kill();
                return Ok(Flow::Kill);
            }
            CommandKind::Scores => self.scores().await?,
            CommandKind::Join => {
                let match_id = invocation
                    .arg(0)
                    .ok_or(CommandError::Usage(spec.usage))?;
                self.subscribe(match_id_value(match_id)).await?;
            }
            CommandKind::CreateMatch => {
                let max_players = match invocation.arg(0) {
                    Some(raw) => raw
                        .parse::<u32>()
                        .ok()
                        .filter(|n| *n > 0)
                        .ok_or(CommandError::Usage(spec.usage))?,
                    None => self.settings.new_match.max_players,
                };
                self.create_match(max_players).await?;
            }
            CommandKind::TestEvent => {
                let data = test_event_payload(&invocation.args);
                self.session.channel()?.emit("test_event", data).await?;
            }
            CommandKind::Exit => return Ok(Flow::Exit),
        }
        Ok(Flow::Continue)
    }

    fn help(&self, topic: Option<&str>) {
        if let Some(name) = topic {
            if let Some(spec) = self.table.get(name) {
                self.out.line(spec.to_string());
                return;
            }
            self.out.line(CommandError::NotFound.operator_message());
        }
        self.out.line("Available commands:");
        for spec in self.table.iter() {
            self.out.line(spec.to_string());
        }
    }

    async fn login(&mut self, invocation: &Invocation<'_>) -> Result<(), CommandError> {
        let player = invocation
            .arg(0)
            .ok_or(CommandError::Usage("login <player> [password]"))?;
        let password = match invocation.arg(1) {
            Some(password) => password,
            None => self
                .settings
                .password_for(player)
                .ok_or_else(|| CommandError::UnknownPlayer(player.to_string()))?,
        };

        let token = self.api.login(player, password).await?;
        self.session.set_login(player, token);
        info!(player, "logged in");
        self.out.line("Logged in to api");
        Ok(())
    }

    async fn connect(&mut self) -> Result<(), CommandError> {
        let token = self.session.token().ok_or(CommandError::NotLoggedIn)?;
        if let Some(sid) = self.session.sid() {
            self.out.line(format!("Already connected... sid: {sid}"));
            return Ok(());
        }

        let channel = Channel::connect(
            self.settings.server.channel_url(),
            token,
            self.handlers.clone(),
            channel_options(&self.settings.channel),
        )
        .await?;
        self.out.line(format!("connected... sid: {}", channel.sid()));
        if let Some(stale) = self.session.attach(channel) {
            stale.abort();
        }
        Ok(())
    }

    async fn scores(&self) -> Result<(), CommandError> {
        let outcome = self.session.channel()?.request("get_scores", None).await?;
        self.out.line(format!("Scores: {}", render(&outcome.result)));
        Ok(())
    }

    async fn subscribe(&self, match_id: Value) -> Result<(), CommandError> {
        let outcome = self
            .session
            .channel()?
            .request("subscribe", Some(json!({ "match_id": match_id })))
            .await?;
        if outcome.is_success() {
            self.out.line("Successfully joined");
        } else {
            let reason = outcome.message.as_deref().unwrap_or("no reason given");
            self.out.line(format!("Failed to join: {reason}"));
        }
        Ok(())
    }

    async fn create_match(&self, max_players: u32) -> Result<(), CommandError> {
        let token = self.session.token().ok_or(CommandError::NotLoggedIn)?;
        let body = json!({
            "isPublic": self.settings.new_match.is_public,
            "maxPlayers": max_players,
        });

        match self
            .api
            .authenticated(Method::POST, "/matches", token, Some(&body))
            .await?
        {
            ApiReply::Body(created) => match created.get("id") {
                Some(id) => {
                    self.out.line(format!("Created game {}", render(id)));
                    self.subscribe(id.clone()).await?;
                }
                None => self
                    .out
                    .line(format!("Server created a match without an id: {created}")),
            },
            ApiReply::Accepted => self.out.line("Server created a match without an id"),
            ApiReply::Rejected { status, .. } => {
                self.out
                    .line(format!("Could not create match (status {status})"));
            }
        }
        Ok(())
    }
}

/// Strings are shown bare, everything else as JSON.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Numeric match ids travel as JSON numbers.
fn match_id_value(raw: &str) -> Value {
    raw.parse::<i64>()
        .map_or_else(|_| Value::String(raw.to_string()), Value::from)
}

/// Arguments are rejoined and sent as JSON when they parse, else as text.
fn test_event_payload(args: &[&str]) -> Option<Value> {
    if args.is_empty() {
        return None;
    }
    let text = args.join(" ");
    Some(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_id_numeric_is_number() {
        assert_eq!(match_id_value("42"), json!(42));
        assert_eq!(match_id_value("-1"), json!(-1));
    }

    #[test]
    fn match_id_other_is_string() {
        assert_eq!(match_id_value("abc-42"), json!("abc-42"));
    }

    #[test]
    fn test_event_payload_variants() {
        assert_eq!(test_event_payload(&[]), None);
        assert_eq!(test_event_payload(&["hello", "there"]), Some(json!("hello there")));
        assert_eq!(test_event_payload(&[r#"{"a":1}"#]), Some(json!({"a": 1})));
        assert_eq!(test_event_payload(&["7"]), Some(json!(7)));
    }

    #[test]
    fn render_strings_bare() {
        assert_eq!(render(&json!("hi")), "hi");
        assert_eq!(render(&json!({"alice": 3})), r#"{"alice":3}"#);
    }

    #[test]
    fn channel_options_from_settings() {
        let opts = channel_options(&ChannelSettings::default());
        assert_eq!(opts.exchange_timeout, Duration::from_secs(30));
        assert_eq!(opts.connect_timeout, Duration::from_secs(10));
        assert_eq!(opts.outbound_capacity, 64);
        assert_eq!(opts.disconnect_grace, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn blank_line_is_ignored() {
        let out = Printer::capture();
        let mut console = Console::new(ConsoleSettings::default(), out.clone());
        assert_eq!(console.execute("   ").await, Flow::Continue);
        assert!(out.captured().is_empty());
    }

    #[tokio::test]
    async fn exit_leaves_loop() {
        let mut console = Console::new(ConsoleSettings::default(), Printer::capture());
        assert_eq!(console.execute("exit").await, Flow::Exit);
    }

    #[tokio::test]
    async fn ping_handler_prints_message() {
        let out = Printer::capture();
        let console = Console::new(ConsoleSettings::default(), out.clone());
        assert!(console
            .handlers()
            .dispatch("ping", &[json!({"message": "hello"})]));
        assert_eq!(out.captured(), vec!["Received: hello"]);
    }
}
