//! Duplex Socket.IO channel over `tokio-tungstenite`.
//!
//! One delivery task owns the socket. It writes queued frames, answers
//! heartbeats, hands acknowledgements to their waiters and pushed events to
//! their handlers. Callers never touch the socket directly.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, Request, header::AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::codec::{AckId, DEFAULT_NAMESPACE, EnginePacket, PacketBody, SocketPacket};
use crate::errors::{ChannelError, Result};
use crate::exchange::ExchangeOutcome;
use crate::handlers::PushHandlers;
use crate::registry::{PendingExchanges, ReplyHandler};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Tunables for a channel.
#[derive(Clone, Debug)]
pub struct ChannelOptions {
    /// Bounded wait for a correlated reply.
    pub exchange_timeout: Duration,
    /// Bound on the whole connect handshake.
    pub connect_timeout: Duration,
    /// Capacity of the outbound frame queue.
    pub outbound_capacity: usize,
    /// How long a graceful disconnect waits for the delivery task.
    pub disconnect_grace: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            exchange_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            outbound_capacity: 64,
            disconnect_grace: Duration::from_secs(2),
        }
    }
}

enum Outbound {
    Frame(String),
    Shutdown,
}

/// A live Socket.IO connection on the default namespace.
pub struct Channel {
    sid: String,
    outbound: mpsc::Sender<Outbound>,
    pending: Arc<Mutex<PendingExchanges>>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    delivery: Option<JoinHandle<()>>,
    options: ChannelOptions,
}

impl Channel {
    /// Open a channel to the game server at `base_url`, authenticating the
    /// upgrade with `token`.
    ///
    /// Resolves once the server has acknowledged the namespace CONNECT.
    pub async fn connect(
        base_url: &str,
        token: &str,
        handlers: PushHandlers,
        options: ChannelOptions,
    ) -> Result<Self> {
        let url = socket_url(base_url)?;
        if url.scheme() == "wss" {
            // rustls needs a process-wide provider before the first handshake.
            let _ = rustls::crypto::ring::default_provider().install_default();
        }
        let mut request = url.as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
            ChannelError::ConnectionRefused {
                reason: format!("token is not a valid header value: {e}"),
            }
        })?;
        let _ = request.headers_mut().insert(AUTHORIZATION, bearer);

        debug!(%url, "opening channel");
        let (ws, sid) = tokio::time::timeout(options.connect_timeout, handshake(request))
            .await
            .map_err(|_| ChannelError::ConnectionRefused {
                reason: format!(
                    "handshake timed out after {}ms",
                    millis(options.connect_timeout)
                ),
            })??;
        info!(%sid, "channel connected");

        let (outbound, outbound_rx) = mpsc::channel(options.outbound_capacity.max(1));
        let pending = Arc::new(Mutex::new(PendingExchanges::new()));
        let connected = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();
        let delivery = tokio::spawn(delivery_loop(
            ws,
            outbound_rx,
            DeliveryContext {
                pending: pending.clone(),
                handlers,
                connected: connected.clone(),
                cancel: cancel.clone(),
            },
        ));

        Ok(Self {
            sid,
            outbound,
            pending,
            connected,
            cancel,
            delivery: Some(delivery),
            options,
        })
    }

    /// Socket.IO session id assigned by the server.
    pub fn sid(&self) -> &str {
        &self.sid
    }

    /// Whether the connection is still up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Number of exchanges still waiting for a reply.
    pub fn pending_exchanges(&self) -> usize {
        self.pending.lock().len()
    }

    /// Send an event without waiting for any reply.
    pub async fn emit(&self, event: &str, payload: Option<Value>) -> Result<()> {
        self.ensure_connected()?;
        self.queue(SocketPacket::event(event, payload.into_iter().collect(), None))
            .await
    }

    /// Send an event and have `handler` invoked with the server's
    /// acknowledgement.
    ///
    /// The handler runs at most once, on the delivery task. It is dropped
    /// without being called if the channel closes first, or if this future
    /// is dropped before the frame is queued.
    pub async fn emit_with_ack(
        &self,
        event: &str,
        payload: Option<Value>,
        handler: ReplyHandler,
    ) -> Result<AckId> {
        self.ensure_connected()?;
        let registration = Registration::new(&self.pending, event, handler);
        let args = payload.into_iter().collect();
        let packet = SocketPacket::event(event, args, Some(registration.id));

        let queued = self.queue(packet).await;
        if queued.is_err() || !self.is_connected() {
            return Err(ChannelError::ChannelClosed);
        }
        Ok(registration.keep())
    }

    /// Send an event and wait for its decoded reply, bounded by the
    /// configured exchange timeout.
    pub async fn request(&self, event: &str, payload: Option<Value>) -> Result<ExchangeOutcome> {
        self.request_with_timeout(event, payload, self.options.exchange_timeout)
            .await
    }

    /// Like [`Channel::request`] with an explicit bound.
    ///
    /// The bound covers queueing the frame as well as waiting for the reply.
    pub async fn request_with_timeout(
        &self,
        event: &str,
        payload: Option<Value>,
        timeout: Duration,
    ) -> Result<ExchangeOutcome> {
        let deadline = Instant::now() + timeout;
        let (tx, rx) = oneshot::channel();
        let handler: ReplyHandler = Box::new(move |args| {
            let _ = tx.send(ExchangeOutcome::from_reply(args));
        });

        let queued = self.emit_with_ack(event, payload, handler);
        let Ok(id) = tokio::time::timeout_at(deadline, queued).await else {
            warn!(event, "outbound queue stayed full, exchange timed out");
            return Err(timed_out(event, timeout));
        };
        let id = id?;

        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(outcome)) => {
                debug!(event, ack = %id, status = ?outcome.status, "exchange resolved");
                Ok(outcome)
            }
            Ok(Err(_)) => Err(ChannelError::ChannelClosed),
            Err(_) => {
                let _ = self.pending.lock().cancel(id);
                warn!(event, ack = %id, "exchange timed out");
                Err(timed_out(event, timeout))
            }
        }
    }

    /// Close gracefully: notify the server, then wait up to the grace
    /// period for the delivery task to finish.
    pub async fn disconnect(mut self) {
        if self.outbound.send(Outbound::Shutdown).await.is_err() {
            debug!("delivery task already stopped");
        }
        if let Some(handle) = self.delivery.take() {
            let abort = handle.abort_handle();
            if tokio::time::timeout(self.options.disconnect_grace, handle)
                .await
                .is_err()
            {
                warn!("delivery task did not stop within the grace period, aborting");
                abort.abort();
            }
        }
        self.connected.store(false, Ordering::SeqCst);
        info!(sid = %self.sid, "channel disconnected");
    }

    /// Stop immediately without notifying the server.
    pub fn abort(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.delivery.take() {
            handle.abort();
        }
        self.connected.store(false, Ordering::SeqCst);
        self.pending.lock().cancel_all();
        info!(sid = %self.sid, "channel aborted");
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ChannelError::NotConnected)
        }
    }

    async fn queue(&self, packet: SocketPacket) -> Result<()> {
        let frame = EnginePacket::Message(packet).encode();
        debug!(%frame, "queueing frame");
        self.outbound
            .send(Outbound::Frame(frame))
            .await
            .map_err(|_| ChannelError::ChannelClosed)
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("sid", &self.sid)
            .field("connected", &self.is_connected())
            .field("pending", &self.pending_exchanges())
            .finish_non_exhaustive()
    }
}

/// A registered exchange, released again unless [`Registration::keep`] runs.
struct Registration<'a> {
    pending: &'a Mutex<PendingExchanges>,
    id: AckId,
    armed: bool,
}

impl<'a> Registration<'a> {
    fn new(pending: &'a Mutex<PendingExchanges>, event: &str, handler: ReplyHandler) -> Self {
        let id = pending.lock().register(event, handler);
        Self {
            pending,
            id,
            armed: true,
        }
    }

    fn keep(mut self) -> AckId {
        self.armed = false;
        self.id
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.pending.lock().cancel(self.id);
        }
    }
}

/// Build the Socket.IO WebSocket URL for a game server base URL.
pub fn socket_url(base_url: &str) -> Result<Url> {
    let mut url =
        Url::parse(base_url).map_err(|e| ChannelError::InvalidUrl(format!("{base_url}: {e}")))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ChannelError::InvalidUrl(format!(
                "unsupported scheme '{other}'"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| ChannelError::InvalidUrl(format!("cannot use {scheme} for {base_url}")))?;
    url.set_path("/socket.io/");
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn timed_out(event: &str, timeout: Duration) -> ChannelError {
    ChannelError::Timeout {
        event: event.to_string(),
        timeout_ms: millis(timeout),
    }
}

// ─── Handshake ───────────────────────────────────────────────────────────────

async fn handshake(request: Request<()>) -> Result<(WsStream, String)> {
    let (mut ws, _) = connect_async(request).await.map_err(|e| {
        let reason = match &e {
            tokio_tungstenite::tungstenite::Error::Http(resp) => {
                format!("upgrade rejected with HTTP {}", resp.status())
            }
            other => other.to_string(),
        };
        warn!(%reason, "channel upgrade failed");
        ChannelError::ConnectionRefused { reason }
    })?;

    let sid = negotiate(&mut ws).await.map_err(|e| match e {
        refused @ ChannelError::ConnectionRefused { .. } => refused,
        other => {
            warn!(error = %other, "channel handshake failed");
            ChannelError::ConnectionRefused {
                reason: other.to_string(),
            }
        }
    })?;
    Ok((ws, sid))
}

/// Engine.IO open followed by the namespace CONNECT. Yields the session id.
async fn negotiate(ws: &mut WsStream) -> Result<String> {
    let open = loop {
        match next_packet(ws).await? {
            EnginePacket::Open(open) => break open,
            EnginePacket::Ping => send_frame(ws, EnginePacket::Pong).await?,
            other => debug!(?other, "ignoring frame before open"),
        }
    };
    debug!(engine_sid = %open.sid, ping_interval = open.ping_interval, "engine.io open");

    send_frame(ws, EnginePacket::Message(SocketPacket::connect())).await?;

    loop {
        match next_packet(ws).await? {
            EnginePacket::Message(packet) if packet.namespace == DEFAULT_NAMESPACE => {
                match packet.body {
                    PacketBody::Connect(data) => {
                        let sid = data
                            .as_ref()
                            .and_then(|d| d.get("sid"))
                            .and_then(Value::as_str)
                            .map_or_else(|| open.sid.clone(), String::from);
                        return Ok(sid);
                    }
                    PacketBody::ConnectError(data) => {
                        let reason = data
                            .get("message")
                            .and_then(Value::as_str)
                            .map_or_else(|| data.to_string(), String::from);
                        warn!(%reason, "server refused the namespace connect");
                        return Err(ChannelError::ConnectionRefused { reason });
                    }
                    other => debug!(?other, "ignoring packet before connect ack"),
                }
            }
            EnginePacket::Ping => send_frame(ws, EnginePacket::Pong).await?,
            EnginePacket::Close => {
                return Err(ChannelError::ConnectionRefused {
                    reason: "server closed the connection during the handshake".into(),
                });
            }
            other => debug!(?other, "ignoring frame before connect ack"),
        }
    }
}

async fn next_packet(ws: &mut WsStream) -> Result<EnginePacket> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return EnginePacket::decode(text.as_str()),
            Some(Ok(Message::Close(_))) | None => {
                return Err(ChannelError::ConnectionRefused {
                    reason: "connection closed during the handshake".into(),
                });
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

async fn send_frame(ws: &mut WsStream, packet: EnginePacket) -> Result<()> {
    ws.send(Message::text(packet.encode())).await?;
    Ok(())
}

// ─── Delivery task ───────────────────────────────────────────────────────────

struct DeliveryContext {
    pending: Arc<Mutex<PendingExchanges>>,
    handlers: PushHandlers,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
}

// Runs however the delivery task ends: loop exit, abort or a panicking
// handler.
impl Drop for DeliveryContext {
    fn drop(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        let abandoned = {
            let mut pending = self.pending.lock();
            let count = pending.len();
            pending.cancel_all();
            count
        };
        info!(abandoned, "channel closed");
    }
}

enum Step {
    Continue,
    Reply(String),
    Stop,
}

async fn delivery_loop(
    ws: WsStream,
    mut outbound: mpsc::Receiver<Outbound>,
    ctx: DeliveryContext,
) {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => {
                debug!("delivery task cancelled");
                break;
            }
            cmd = outbound.recv() => {
                match cmd {
                    Some(Outbound::Frame(frame)) => {
                        if let Err(e) = sink.send(Message::text(frame)).await {
                            warn!(error = %e, "failed to write frame");
                            break;
                        }
                    }
                    Some(Outbound::Shutdown) => {
                        let bye = EnginePacket::Message(SocketPacket::disconnect()).encode();
                        let _ = sink.send(Message::text(bye)).await;
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                    None => break,
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match handle_frame(text.as_str(), &ctx) {
                        Step::Continue => {}
                        Step::Reply(frame) => {
                            if let Err(e) = sink.send(Message::text(frame)).await {
                                warn!(error = %e, "failed to write frame");
                                break;
                            }
                        }
                        Step::Stop => break,
                    },
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "server closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket read failed");
                        break;
                    }
                    None => break,
                }
            }
        }
    }
}

fn handle_frame(text: &str, ctx: &DeliveryContext) -> Step {
    let packet = match EnginePacket::decode(text) {
        Ok(packet) => packet,
        Err(e) => {
            warn!(error = %e, frame = text, "dropping malformed frame");
            return Step::Continue;
        }
    };

    match packet {
        EnginePacket::Ping => Step::Reply(EnginePacket::Pong.encode()),
        EnginePacket::Close => Step::Stop,
        EnginePacket::Message(packet) => handle_packet(packet, ctx),
        other => {
            debug!(?other, "ignoring engine frame");
            Step::Continue
        }
    }
}

fn handle_packet(packet: SocketPacket, ctx: &DeliveryContext) -> Step {
    if packet.namespace != DEFAULT_NAMESPACE {
        debug!(namespace = %packet.namespace, "ignoring packet for another namespace");
        return Step::Continue;
    }

    match packet.body {
        PacketBody::Ack { id, args } => {
            let claimed = ctx.pending.lock().claim(id);
            match claimed {
                Some(waiter) => {
                    debug!(ack = %id, event = waiter.event(), "reply received");
                    waiter.deliver(args);
                }
                None => debug!(ack = %id, "discarding stale reply"),
            }
            Step::Continue
        }
        PacketBody::Event { ack, name, args } => {
            if !ctx.handlers.dispatch(&name, &args) {
                debug!(event = %name, "no handler for pushed event");
            }
            match ack {
                Some(id) => {
                    Step::Reply(EnginePacket::Message(SocketPacket::ack(id, Vec::new())).encode())
                }
                None => Step::Continue,
            }
        }
        PacketBody::Disconnect => {
            info!("server disconnected the channel");
            Step::Stop
        }
        PacketBody::ConnectError(data) => {
            warn!(%data, "server reported a connect error");
            Step::Stop
        }
        PacketBody::Connect(_) => {
            debug!("ignoring repeated connect ack");
            Step::Continue
        }
    }
}
