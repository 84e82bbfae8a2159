//! WebSocket transport session to the relay server.
//!
//! One session owns one connection. After the handshake it sends the
//! `{"type":"simulation"}` identification and spawns a receive task that
//! parses inbound text messages and pushes control messages onto the shared
//! [`ControlQueue`]. Transport failures never surface as errors: they move the
//! [`ConnectionState`] to `Failed`, which callers observe via
//! [`TransportSession::is_connected`].

use crate::codec::{decode_message, encode_message};
use crate::connection::{ConnectionState, SharedConnectionState};
use crate::protocol::{FrameMessage, FrameTimestamps, WireMessage};
use crate::queue::ControlQueue;
use anyhow::{Context, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

type RelayStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Relay endpoint and timeouts for a [`TransportSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Relay host name or address.
    pub host: String,
    /// Relay TCP port.
    pub port: u16,
    /// Upper bound on TCP connect + WebSocket handshake + identification.
    pub connect_timeout: Duration,
    /// Upper bound on a single message write.
    pub send_timeout: Duration,
    /// Upper bound on the close handshake and receive task shutdown.
    pub close_timeout: Duration,
}

impl SessionConfig {
    /// Endpoint with default timeouts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// `ws://host:port` URL of the relay.
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            connect_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_secs(2),
            close_timeout: Duration::from_secs(2),
        }
    }
}

/// Async session with the relay server.
///
/// Must be driven from within a tokio runtime; the receive task is spawned on
/// the runtime that calls [`TransportSession::connect`].
pub struct TransportSession {
    config: SessionConfig,
    state: SharedConnectionState,
    queue: ControlQueue,
    sink: Option<SplitSink<RelayStream, Message>>,
    receiver: Option<JoinHandle<()>>,
    timestamps: FrameTimestamps,
    frames_sent: u64,
}

impl TransportSession {
    /// Create a disconnected session that will feed `queue`.
    pub fn new(config: SessionConfig, queue: ControlQueue) -> Self {
        Self {
            config,
            state: SharedConnectionState::new(),
            queue,
            sink: None,
            receiver: None,
            timestamps: FrameTimestamps::new(),
            frames_sent: 0,
        }
    }

    /// Read-only view of the connection state.
    pub fn state(&self) -> SharedConnectionState {
        self.state.clone()
    }

    /// Whether the session is connected.
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Frames written successfully since the session was created.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Connect, identify as the simulation and start the receive task.
    ///
    /// Returns `true` if the session ends up connected. On failure the state
    /// is `Failed` and no receive task is running.
    pub async fn connect(&mut self) -> bool {
        if self.state.is_connected() {
            return true;
        }
        self.teardown();

        let url = self.config.url();
        info!("Connecting to relay at {}", url);
        self.state.set(ConnectionState::Connecting);

        match timeout(self.config.connect_timeout, self.open(&url)).await {
            Ok(Ok(())) => {
                info!("Connected to relay at {}", url);
                true
            }
            Ok(Err(err)) => {
                warn!("Failed to connect to relay at {}: {:#}", url, err);
                self.teardown();
                self.state.set(ConnectionState::Failed);
                false
            }
            Err(_) => {
                warn!(
                    "Timed out connecting to relay at {} after {:?}",
                    url, self.config.connect_timeout
                );
                self.teardown();
                self.state.set(ConnectionState::Failed);
                false
            }
        }
    }

    async fn open(&mut self, url: &str) -> Result<()> {
        let (stream, _response) = connect_async(url)
            .await
            .context("WebSocket handshake failed")?;
        let (mut sink, stream) = stream.split();

        let identification = encode_message(&WireMessage::Simulation)?;
        sink.send(Message::Text(identification))
            .await
            .context("Failed to send identification")?;

        // Connected must be visible before the receive task can observe a
        // peer close, otherwise its Connected -> Failed transition is lost.
        self.state.set(ConnectionState::Connected);
        self.sink = Some(sink);
        self.receiver = Some(tokio::spawn(receive_loop(
            stream,
            self.queue.clone(),
            self.state.clone(),
        )));
        Ok(())
    }

    /// Serialize and write one message.
    ///
    /// Silently dropped when not connected. A write failure or timeout marks
    /// the session `Failed` and stops the receive task.
    pub async fn send(&mut self, msg: &WireMessage) -> bool {
        if !self.state.is_connected() {
            trace!("Dropping {} message: not connected", msg.kind());
            return false;
        }
        let text = match encode_message(msg) {
            Ok(text) => text,
            Err(err) => {
                warn!("Dropping unencodable {} message: {}", msg.kind(), err);
                return false;
            }
        };

        let Some(sink) = self.sink.as_mut() else {
            return false;
        };
        match timeout(self.config.send_timeout, sink.send(Message::Text(text))).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                warn!("Relay write failed: {}", err);
                self.fail();
                false
            }
            Err(_) => {
                warn!("Relay write timed out after {:?}", self.config.send_timeout);
                self.fail();
                false
            }
        }
    }

    /// Wrap already-encoded frame text in a timestamped frame message and
    /// send it.
    pub async fn send_frame(&mut self, encoded: String) -> bool {
        if !self.state.is_connected() {
            return false;
        }
        let msg = WireMessage::Frame(FrameMessage {
            frame: encoded,
            timestamp: self.timestamps.next(),
        });
        let sent = self.send(&msg).await;
        if sent {
            self.frames_sent += 1;
        }
        sent
    }

    /// Close the connection and stop the receive task.
    ///
    /// Idempotent; safe on a session that never connected or already failed.
    pub async fn close(&mut self) {
        let previous = self.state.get();
        self.state.set(ConnectionState::Disconnected);

        if let Some(mut sink) = self.sink.take() {
            if previous == ConnectionState::Connected {
                match timeout(self.config.close_timeout, sink.close()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => debug!("Relay close handshake failed: {}", err),
                    Err(_) => warn!("Relay close timed out after {:?}", self.config.close_timeout),
                }
            }
        }

        if let Some(mut receiver) = self.receiver.take() {
            if timeout(self.config.close_timeout, &mut receiver).await.is_err() {
                debug!("Receive task still running after close, aborting");
                receiver.abort();
            }
        }

        if previous != ConnectionState::Disconnected {
            info!("Disconnected from relay ({} before close)", previous);
        }
    }

    fn fail(&mut self) {
        self.state.set(ConnectionState::Failed);
        self.teardown();
    }

    fn teardown(&mut self) {
        self.sink = None;
        if let Some(receiver) = self.receiver.take() {
            receiver.abort();
        }
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            receiver.abort();
        }
    }
}

/// Background reader: parse inbound messages and queue control commands.
///
/// Terminates on read error or peer close, marking the session `Failed`
/// unless it was closed locally first.
async fn receive_loop(
    mut stream: SplitStream<RelayStream>,
    queue: ControlQueue,
    state: SharedConnectionState,
) {
    while let Some(next) = stream.next().await {
        match next {
            Ok(Message::Text(text)) => handle_text(&text, &queue),
            Ok(Message::Binary(bytes)) => {
                debug!("Ignoring {} byte binary message from relay", bytes.len())
            }
            Ok(Message::Close(frame)) => debug!("Relay sent close: {:?}", frame),
            Ok(_) => {}
            Err(err) => {
                if state.transition(ConnectionState::Connected, ConnectionState::Failed) {
                    warn!("Relay read failed: {}", err);
                }
                return;
            }
        }
    }

    if state.transition(ConnectionState::Connected, ConnectionState::Failed) {
        warn!("Relay closed the connection");
    }
}

fn handle_text(text: &str, queue: &ControlQueue) {
    match decode_message(text) {
        Ok(WireMessage::Control(control)) => {
            debug!("Queued control: {}", control.action.as_str());
            queue.push(control);
        }
        Ok(other) => trace!("Ignoring {} message from relay", other.kind()),
        Err(err) => warn!("Ignoring malformed relay message: {}", err),
    }
}
