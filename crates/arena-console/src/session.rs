//! Connection state shared by every command.

use arena_channel::{Channel, ChannelError};

/// Login token and live channel, owned by the console.
///
/// Written only by `login`/`connect`/`disconnect`; every command needing an
/// authenticated channel reads it through [`Session::channel`].
#[derive(Default)]
pub struct Session {
    player: Option<String>,
    token: Option<String>,
    channel: Option<Channel>,
}

impl Session {
    /// Create an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful login.
    pub fn set_login(&mut self, player: &str, token: String) {
        self.player = Some(player.to_string());
        self.token = Some(token);
    }

    /// Bearer token from the last login.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Player of the last login.
    pub fn player(&self) -> Option<&str> {
        self.player.as_deref()
    }

    /// Install a freshly connected channel, returning the one it replaces.
    pub fn attach(&mut self, channel: Channel) -> Option<Channel> {
        self.channel.replace(channel)
    }

    /// Take the channel out of the session.
    pub fn detach(&mut self) -> Option<Channel> {
        self.channel.take()
    }

    /// The live channel, or [`ChannelError::NotConnected`].
    pub fn channel(&self) -> Result<&Channel, ChannelError> {
        match &self.channel {
            Some(channel) if channel.is_connected() => Ok(channel),
            _ => Err(ChannelError::NotConnected),
        }
    }

    /// Whether a live channel exists.
    pub fn is_connected(&self) -> bool {
        self.channel().is_ok()
    }

    /// Session id of the live channel.
    pub fn sid(&self) -> Option<&str> {
        self.channel().ok().map(Channel::sid)
    }
}
