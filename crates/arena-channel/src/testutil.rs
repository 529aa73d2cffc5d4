//! Scripted in-process Socket.IO server for tests.
//!
//! Speaks just enough Engine.IO/Socket.IO to accept one namespace CONNECT,
//! record what the client sends and answer acknowledgements according to
//! a per-event script.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;

use crate::codec::{AckId, EnginePacket, Handshake, PacketBody, SocketPacket};

/// How the server answers an event that asks for an acknowledgement.
#[derive(Clone, Debug)]
pub enum ScriptedReply {
    /// Acknowledge after `delay` with `args`.
    After {
        /// Wait before answering.
        delay: Duration,
        /// Reply arguments.
        args: Vec<Value>,
    },
    /// Acknowledge the same id twice.
    Twice(Vec<Value>),
    /// Never acknowledge.
    Never,
}

/// An event the client emitted.
#[derive(Clone, Debug, PartialEq)]
pub struct ReceivedEvent {
    /// Event name.
    pub name: String,
    /// Event arguments.
    pub args: Vec<Value>,
    /// Ack id, if the client asked for a reply.
    pub ack: Option<AckId>,
}

#[derive(Clone, Default)]
struct Script {
    sid: String,
    replies: HashMap<String, ScriptedReply>,
    reject_upgrade: Option<u16>,
    reject_connect: Option<Value>,
    open_frame: Option<String>,
    stall: bool,
}

enum ServerFrame {
    Text(String),
    Close,
}

#[derive(Default)]
struct ServerState {
    authorization: Option<String>,
    path: Option<String>,
    received: Vec<ReceivedEvent>,
    acks: Vec<AckId>,
    pongs: usize,
    disconnects: usize,
    dropped: usize,
    conn: Option<mpsc::UnboundedSender<ServerFrame>>,
}

/// Builder for [`FakeServer`].
pub struct FakeServerBuilder {
    script: Script,
}

impl FakeServerBuilder {
    /// Socket.IO session id handed out on CONNECT.
    pub fn sid(mut self, sid: &str) -> Self {
        self.script.sid = sid.to_string();
        self
    }

    /// Acknowledge `event` immediately with `reply`.
    pub fn reply(self, event: &str, reply: Value) -> Self {
        self.reply_after(event, Duration::ZERO, reply)
    }

    /// Acknowledge `event` with `reply` after `delay`.
    pub fn reply_after(mut self, event: &str, delay: Duration, reply: Value) -> Self {
        let _ = self.script.replies.insert(
            event.to_string(),
            ScriptedReply::After {
                delay,
                args: vec![reply],
            },
        );
        self
    }

    /// Acknowledge `event` twice with the same `reply`.
    pub fn twice(mut self, event: &str, reply: Value) -> Self {
        let _ = self
            .script
            .replies
            .insert(event.to_string(), ScriptedReply::Twice(vec![reply]));
        self
    }

    /// Never acknowledge `event`.
    pub fn never(mut self, event: &str) -> Self {
        let _ = self
            .script
            .replies
            .insert(event.to_string(), ScriptedReply::Never);
        self
    }

    /// Reject the WebSocket upgrade with an HTTP status.
    pub fn reject_upgrade(mut self, status: u16) -> Self {
        self.script.reject_upgrade = Some(status);
        self
    }

    /// Answer the namespace CONNECT with CONNECT_ERROR.
    pub fn reject_connect(mut self, data: Value) -> Self {
        self.script.reject_connect = Some(data);
        self
    }

    /// Send `frame` in place of the Engine.IO open handshake.
    pub fn open_frame(mut self, frame: &str) -> Self {
        self.script.open_frame = Some(frame.to_string());
        self
    }

    /// Accept the upgrade but never send the open handshake.
    pub fn stall(mut self) -> Self {
        self.script.stall = true;
        self
    }

    /// Bind to an ephemeral local port and start serving.
    pub async fn start(self) -> FakeServer {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake server");
        let addr = listener.local_addr().expect("fake server addr");
        let script = Arc::new(self.script);
        let state = Arc::new(Mutex::new(ServerState::default()));

        let accept_state = state.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let _ = tokio::spawn(serve(stream, script.clone(), accept_state.clone()));
            }
        });

        FakeServer { addr, state, task }
    }
}

/// In-process Socket.IO server.
pub struct FakeServer {
    addr: SocketAddr,
    state: Arc<Mutex<ServerState>>,
    task: JoinHandle<()>,
}

impl FakeServer {
    /// Start building a server script.
    pub fn builder() -> FakeServerBuilder {
        FakeServerBuilder {
            script: Script {
                sid: "fake-sid".to_string(),
                ..Script::default()
            },
        }
    }

    /// HTTP base URL of the server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// `Authorization` header of the last upgrade request.
    pub fn authorization(&self) -> Option<String> {
        self.state.lock().authorization.clone()
    }

    /// Request path (with query) of the last upgrade request.
    pub fn path(&self) -> Option<String> {
        self.state.lock().path.clone()
    }

    /// Events the client has emitted, in order.
    pub fn received(&self) -> Vec<ReceivedEvent> {
        self.state.lock().received.clone()
    }

    /// Ack ids the client has answered.
    pub fn acks(&self) -> Vec<AckId> {
        self.state.lock().acks.clone()
    }

    /// Heartbeat answers received.
    pub fn pongs(&self) -> usize {
        self.state.lock().pongs
    }

    /// Socket.IO DISCONNECT packets received.
    pub fn disconnects(&self) -> usize {
        self.state.lock().disconnects
    }

    /// Connections that ended without a DISCONNECT packet.
    pub fn dropped(&self) -> usize {
        self.state.lock().dropped
    }

    /// Push an event to the connected client.
    pub fn push(&self, event: &str, payload: Value) {
        self.send(EnginePacket::Message(SocketPacket::event(event, vec![payload], None)).encode());
    }

    /// Push an event that asks the client for an acknowledgement.
    pub fn push_with_ack(&self, event: &str, payload: Value, id: AckId) {
        self.send(
            EnginePacket::Message(SocketPacket::event(event, vec![payload], Some(id))).encode(),
        );
    }

    /// Send an Engine.IO heartbeat.
    pub fn ping(&self) {
        self.send(EnginePacket::Ping.encode());
    }

    /// Close the current connection without a DISCONNECT packet.
    pub fn close(&self) {
        if let Some(conn) = self.state.lock().conn.as_ref() {
            let _ = conn.send(ServerFrame::Close);
        }
    }

    /// Poll `check` for up to two seconds.
    pub async fn eventually(&self, check: impl Fn(&Self) -> bool) -> bool {
        for _ in 0..200 {
            if check(self) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        check(self)
    }

    fn send(&self, frame: String) {
        if let Some(conn) = self.state.lock().conn.as_ref() {
            let _ = conn.send(ServerFrame::Text(frame));
        }
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(stream: TcpStream, script: Arc<Script>, state: Arc<Mutex<ServerState>>) {
    let upgrade_state = state.clone();
    let reject = script.reject_upgrade;
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        {
            let mut st = upgrade_state.lock();
            st.authorization = req
                .headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            st.path = Some(req.uri().to_string());
        }
        if let Some(code) = reject {
            let mut err = ErrorResponse::new(Some("rejected".to_string()));
            *err.status_mut() = StatusCode::from_u16(code).unwrap_or(StatusCode::UNAUTHORIZED);
            return Err(err);
        }
        Ok(resp)
    };
    let Ok(ws) = accept_hdr_async(stream, callback).await else {
        return;
    };
    let (mut sink, mut stream) = ws.split();

    if script.stall {
        while stream.next().await.is_some() {}
        return;
    }

    let open = script.open_frame.clone().unwrap_or_else(|| {
        EnginePacket::Open(Handshake {
            sid: format!("engine-{}", script.sid),
            upgrades: Vec::new(),
            ping_interval: 25_000,
            ping_timeout: 20_000,
            max_payload: 1_000_000,
        })
        .encode()
    });
    if sink.send(Message::text(open)).await.is_err() {
        return;
    }

    // Wait for the namespace CONNECT.
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) if text.as_str().starts_with("40") => break,
            Some(Ok(_)) => {}
            _ => return,
        }
    }

    if let Some(data) = script.reject_connect.clone() {
        let refuse = SocketPacket {
            namespace: "/".to_string(),
            body: PacketBody::ConnectError(data),
        };
        let _ = sink.send(Message::text(EnginePacket::Message(refuse).encode())).await;
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    state.lock().conn = Some(tx.clone());

    let accepted = SocketPacket {
        namespace: "/".to_string(),
        body: PacketBody::Connect(Some(json!({"sid": script.sid}))),
    };
    if sink
        .send(Message::text(EnginePacket::Message(accepted).encode()))
        .await
        .is_err()
    {
        return;
    }

    let mut said_goodbye = false;
    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Some(ServerFrame::Text(text)) => {
                    if sink.send(Message::text(text)).await.is_err() {
                        break;
                    }
                }
                Some(ServerFrame::Close) => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                None => break,
            },
            msg = stream.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };
                match EnginePacket::decode(text.as_str()) {
                    Ok(EnginePacket::Pong) => state.lock().pongs += 1,
                    Ok(EnginePacket::Message(packet)) => match packet.body {
                        PacketBody::Disconnect => {
                            state.lock().disconnects += 1;
                            said_goodbye = true;
                            break;
                        }
                        PacketBody::Ack { id, .. } => state.lock().acks.push(id),
                        PacketBody::Event { ack, name, args } => {
                            if let Some(id) = ack {
                                schedule_reply(script.replies.get(&name).cloned(), id, &tx);
                            }
                            state.lock().received.push(ReceivedEvent { name, args, ack });
                        }
                        _ => {}
                    },
                    _ => {}
                }
            }
        }
    }

    let mut st = state.lock();
    st.conn = None;
    if !said_goodbye {
        st.dropped += 1;
    }
}

fn schedule_reply(
    reply: Option<ScriptedReply>,
    id: AckId,
    tx: &mpsc::UnboundedSender<ServerFrame>,
) {
    let ack = |args: Vec<Value>| EnginePacket::Message(SocketPacket::ack(id, args)).encode();
    match reply {
        Some(ScriptedReply::After { delay, args }) => {
            let tx = tx.clone();
            let frame = ack(args);
            let _ = tokio::spawn(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let _ = tx.send(ServerFrame::Text(frame));
            });
        }
        Some(ScriptedReply::Twice(args)) => {
            let frame = ack(args);
            let _ = tx.send(ServerFrame::Text(frame.clone()));
            let _ = tx.send(ServerFrame::Text(frame));
        }
        Some(ScriptedReply::Never) => {}
        // Unscripted events get an empty acknowledgement.
        None => {
            let _ = tx.send(ServerFrame::Text(ack(Vec::new())));
        }
    }
}
