//! # arena-channel
//!
//! Duplex Socket.IO channel to the game server, with a correlated
//! request/reply primitive layered over its acknowledgements.
//!
//! - [`Channel`] owns one WebSocket connection and a delivery task.
//! - [`Channel::request`] emits an event and waits, bounded, for the reply
//!   matched by ack id, decoded into an [`ExchangeOutcome`].
//! - [`PushHandlers`] receive unsolicited server events independently of
//!   any pending exchange.

#![deny(unsafe_code)]

pub mod channel;
pub mod codec;
pub mod errors;
pub mod exchange;
pub mod handlers;
pub mod registry;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use channel::{Channel, ChannelOptions, socket_url};
pub use codec::AckId;
pub use errors::{ChannelError, Result};
pub use exchange::{ExchangeOutcome, ReplyStatus};
pub use handlers::{PushHandler, PushHandlers};
pub use registry::{PendingExchanges, ReplyHandler};
