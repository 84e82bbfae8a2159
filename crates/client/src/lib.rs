#![warn(missing_docs)]
//! Synchronous relay façade for a single-threaded simulation tick loop.
//!
//! [`SyncRelay`] owns one long-lived worker thread running a current-thread
//! tokio runtime. The worker owns the [`TransportSession`]; every façade call
//! that needs the network is a blocking handoff over a request channel, and
//! the session's receive task runs on the same runtime in between. Control
//! messages reach the tick loop through the shared [`ControlQueue`], which is
//! polled without touching the worker at all.
//!
//! The façade blocks its caller, so it must not be used from inside an async
//! runtime.

use anyhow::{Context, Result};
use simrelay_core::{FrameError, ImageFrame};
use simrelay_net::{
    ConnectionState, ControlMessage, ControlQueue, FrameEncoder, SessionConfig,
    SharedConnectionState, TransportSession, DEFAULT_JPEG_QUALITY,
};
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Settings for a [`SyncRelay`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayClientConfig {
    /// Relay endpoint and timeouts.
    pub session: SessionConfig,
    /// JPEG quality for streamed frames.
    pub jpeg_quality: u8,
}

impl RelayClientConfig {
    /// Endpoint with default quality and timeouts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            session: SessionConfig::new(host, port),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl Default for RelayClientConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Façade lifecycle, layered over [`ConnectionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// `connect()` has not succeeded yet.
    Uninitialized,
    /// Connected; frames are transmitted.
    Ready,
    /// Disconnected locally or the transport failed.
    Closed,
}

enum Request {
    Connect(oneshot::Sender<bool>),
    SendFrame(String, oneshot::Sender<bool>),
    Close(oneshot::Sender<()>),
}

struct Worker {
    requests: mpsc::UnboundedSender<Request>,
    connection: SharedConnectionState,
    thread: JoinHandle<()>,
}

impl Worker {
    fn spawn(config: SessionConfig, queue: ControlQueue) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to build relay runtime")?;
        let session = TransportSession::new(config, queue);
        let connection = session.state();
        let (requests, inbox) = mpsc::unbounded_channel();

        let thread = std::thread::Builder::new()
            .name("simrelay-worker".to_string())
            .spawn(move || runtime.block_on(serve(session, inbox)))
            .context("Failed to spawn relay worker thread")?;

        Ok(Self {
            requests,
            connection,
            thread,
        })
    }

    /// Hand a request to the worker and block until it replies.
    ///
    /// `None` if the worker is gone.
    fn call<T>(&self, request: impl FnOnce(oneshot::Sender<T>) -> Request) -> Option<T> {
        let (reply, response) = oneshot::channel();
        self.requests.send(request(reply)).ok()?;
        response.blocking_recv().ok()
    }

    fn shutdown(self) {
        if self.call(Request::Close).is_none() {
            debug!("Relay worker already stopped");
        }
        drop(self.requests);
        if self.thread.join().is_err() {
            warn!("Relay worker thread panicked");
        }
    }
}

async fn serve(mut session: TransportSession, mut inbox: mpsc::UnboundedReceiver<Request>) {
    while let Some(request) = inbox.recv().await {
        match request {
            Request::Connect(reply) => {
                let connected = session.connect().await;
                let _ = reply.send(connected);
            }
            Request::SendFrame(frame, reply) => {
                let sent = session.send_frame(frame).await;
                let _ = reply.send(sent);
            }
            Request::Close(reply) => {
                session.close().await;
                let _ = reply.send(());
                return;
            }
        }
    }
    session.close().await;
}

/// Blocking relay handle for the simulation tick loop.
pub struct SyncRelay {
    config: RelayClientConfig,
    encoder: FrameEncoder,
    queue: ControlQueue,
    worker: Option<Worker>,
    phase: RelayState,
}

impl SyncRelay {
    /// Create an unconnected relay handle. No thread is started until
    /// [`SyncRelay::connect`].
    pub fn new(config: RelayClientConfig) -> Self {
        let encoder = FrameEncoder::new(config.jpeg_quality);
        Self {
            config,
            encoder,
            queue: ControlQueue::new(),
            worker: None,
            phase: RelayState::Uninitialized,
        }
    }

    /// Connect to the relay and identify as the simulation.
    ///
    /// Blocks for the duration of the handshake (bounded by the connect
    /// timeout). Returns whether the relay is now connected. Calling it again
    /// after a failure retries on the same worker.
    pub fn connect(&mut self) -> bool {
        if self.worker.is_none() {
            match Worker::spawn(self.config.session.clone(), self.queue.clone()) {
                Ok(worker) => self.worker = Some(worker),
                Err(err) => {
                    warn!("Relay unavailable: {:#}", err);
                    return false;
                }
            }
        }

        let connected = self
            .worker
            .as_ref()
            .and_then(|worker| worker.call(Request::Connect))
            .unwrap_or(false);
        if connected {
            self.phase = RelayState::Ready;
            info!("Relay ready at {}", self.config.session.url());
        }
        connected
    }

    /// Encode and send one frame, blocking until the write completes.
    ///
    /// A no-op unless the relay is ready. Transport failures are absorbed
    /// (the relay moves to [`RelayState::Closed`]); only a frame the encoder
    /// cannot handle is reported.
    pub fn stream_frame(&mut self, frame: &ImageFrame) -> Result<(), FrameError> {
        if self.state() != RelayState::Ready {
            self.sync_phase();
            return Ok(());
        }
        let Some(worker) = self.worker.as_ref() else {
            return Ok(());
        };

        let encoded = self.encoder.encode(frame)?;
        let sent = worker
            .call(|reply| Request::SendFrame(encoded, reply))
            .unwrap_or(false);
        if !sent {
            self.sync_phase();
        }
        Ok(())
    }

    /// Next queued control message, without waiting.
    pub fn get_control(&self) -> Option<ControlMessage> {
        self.queue.try_pop()
    }

    /// Close the connection and stop the worker thread.
    ///
    /// Idempotent.
    pub fn disconnect(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
            self.phase = RelayState::Closed;
        }
    }

    /// Whether frames are currently transmitted.
    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Transport-level connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.worker
            .as_ref()
            .map(|worker| worker.connection.get())
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Façade lifecycle state.
    pub fn state(&self) -> RelayState {
        match self.phase {
            RelayState::Ready if !self.is_connected() => RelayState::Closed,
            phase => phase,
        }
    }

    /// Number of control messages waiting to be read.
    pub fn pending_controls(&self) -> usize {
        self.queue.len()
    }

    /// Relay settings.
    pub fn config(&self) -> &RelayClientConfig {
        &self.config
    }

    fn sync_phase(&mut self) {
        if self.phase == RelayState::Ready && !self.is_connected() {
            warn!("Relay connection lost; frames will be dropped");
            self.phase = RelayState::Closed;
        }
    }
}

impl Drop for SyncRelay {
    fn drop(&mut self) {
        self.disconnect();
    }
}
