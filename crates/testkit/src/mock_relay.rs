//! Scriptable in-process relay endpoint.
//!
//! [`MockRelay`] owns its own runtime so synchronous tests can drive it
//! alongside a blocking client. Everything the relay sees is recorded in a
//! [`RelayLog`] that tests wait on with [`MockRelay::wait_until`].

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use simrelay_net::{
    decode_message, encode_message, ControlMessage, FrameMessage, WireMessage,
};
use std::net::SocketAddr;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::debug;

/// Everything observed by a [`MockRelay`].
#[derive(Debug, Clone, Default)]
pub struct RelayLog {
    /// WebSocket handshakes accepted.
    pub connections: usize,
    /// Text messages received, in arrival order.
    pub messages: Vec<String>,
    /// Close frames received from clients.
    pub clean_closes: usize,
    /// Connections whose stream has ended.
    pub disconnects: usize,
}

impl RelayLog {
    /// Received messages that decode as protocol messages.
    pub fn decoded(&self) -> Vec<WireMessage> {
        self.messages
            .iter()
            .filter_map(|text| decode_message(text).ok())
            .collect()
    }

    /// Received frame messages.
    pub fn frames(&self) -> Vec<FrameMessage> {
        self.decoded()
            .into_iter()
            .filter_map(|msg| match msg {
                WireMessage::Frame(frame) => Some(frame),
                _ => None,
            })
            .collect()
    }
}

enum Command {
    Text(String),
    Close,
}

#[derive(Default)]
struct Shared {
    log: Mutex<RelayLog>,
    changed: Condvar,
    clients: Mutex<Vec<mpsc::UnboundedSender<Command>>>,
}

impl Shared {
    fn update(&self, apply: impl FnOnce(&mut RelayLog)) {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut log);
        self.changed.notify_all();
    }
}

/// Loopback relay that records traffic and can push messages to clients.
pub struct MockRelay {
    runtime: Option<Runtime>,
    addr: SocketAddr,
    shared: Arc<Shared>,
}

impl MockRelay {
    /// Bind to an ephemeral loopback port and start accepting.
    pub fn start() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .context("Failed to build mock relay runtime")?;
        let listener = runtime
            .block_on(TcpListener::bind("127.0.0.1:0"))
            .context("Failed to bind mock relay")?;
        let addr = listener.local_addr()?;
        let shared = Arc::new(Shared::default());
        runtime.spawn(accept_loop(listener, shared.clone()));
        debug!("Mock relay listening on {}", addr);

        Ok(Self {
            runtime: Some(runtime),
            addr,
            shared,
        })
    }

    /// Bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Bound port.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Snapshot of the log.
    pub fn log(&self) -> RelayLog {
        self.shared
            .log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Block until `done` holds for the log, or `timeout` passes.
    pub fn wait_until(
        &self,
        timeout: Duration,
        done: impl Fn(&RelayLog) -> bool,
    ) -> Option<RelayLog> {
        let deadline = Instant::now() + timeout;
        let mut log = self.shared.log.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if done(&log) {
                return Some(log.clone());
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .shared
                .changed
                .wait_timeout(log, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            log = guard;
        }
    }

    /// Send raw text to the most recent client. `false` if there is none.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        let clients = self
            .shared
            .clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        clients
            .last()
            .is_some_and(|client| client.send(Command::Text(text.into())).is_ok())
    }

    /// Send a control message to the most recent client.
    pub fn send_control(&self, control: &ControlMessage) -> Result<bool> {
        let text = encode_message(&WireMessage::Control(control.clone()))?;
        Ok(self.send_text(text))
    }

    /// Start a close handshake with every client.
    pub fn close_clients(&self) {
        let clients = self
            .shared
            .clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for client in clients.iter() {
            let _ = client.send(Command::Close);
        }
    }
}

impl Drop for MockRelay {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("Mock relay accepted {}", peer);
                tokio::spawn(serve_client(stream, shared.clone()));
            }
            Err(err) => {
                debug!("Mock relay accept failed: {}", err);
                return;
            }
        }
    }
}

async fn serve_client(stream: TcpStream, shared: Arc<Shared>) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(err) => {
            debug!("Mock relay handshake failed: {}", err);
            return;
        }
    };
    let (commands, mut inbox) = mpsc::unbounded_channel();
    shared
        .clients
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(commands);
    shared.update(|log| log.connections += 1);

    let (mut sink, mut stream) = ws.split();
    let mut inbox_open = true;
    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => shared.update(move |log| log.messages.push(text)),
                Some(Ok(Message::Close(_))) => shared.update(|log| log.clean_closes += 1),
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!("Mock relay read failed: {}", err);
                    break;
                }
                None => break,
            },
            command = inbox.recv(), if inbox_open => match command {
                Some(Command::Text(text)) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Some(Command::Close) => {
                    let _ = sink.close().await;
                }
                None => inbox_open = false,
            },
        }
    }
    shared.update(|log| log.disconnects += 1);
}
