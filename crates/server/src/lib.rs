#![warn(missing_docs)]
//! WebSocket relay between one simulation and any number of viewers.
//!
//! Peers identify themselves with `{"type":"simulation"}` or
//! `{"type":"viewer"}`. Frames from the simulation are forwarded verbatim to
//! every viewer; control messages from any peer are forwarded verbatim to the
//! simulation. Nothing is buffered for peers that are not connected.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use simrelay_net::{decode_message, WireMessage};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, instrument, warn};

/// Counters exposed by a running relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Frame messages delivered to viewers (one per viewer per frame).
    pub frames_forwarded: u64,
    /// Control messages delivered to the simulation.
    pub controls_forwarded: u64,
    /// Registered viewers.
    pub viewers: usize,
    /// Whether a simulation is registered.
    pub simulation_connected: bool,
}

type PeerId = u64;
type Outbox = mpsc::UnboundedSender<Message>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Unregistered,
    Simulation,
    Viewer,
}

#[derive(Default)]
struct Peers {
    simulation: Option<(PeerId, Outbox)>,
    viewers: BTreeMap<PeerId, Outbox>,
}

#[derive(Default)]
struct Routes {
    peers: Mutex<Peers>,
    next_peer: AtomicU64,
    frames_forwarded: AtomicU64,
    controls_forwarded: AtomicU64,
}

impl Routes {
    fn peers(&self) -> MutexGuard<'_, Peers> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_peer(&self) -> PeerId {
        self.next_peer.fetch_add(1, Ordering::Relaxed)
    }

    fn stats(&self) -> RelayStats {
        let peers = self.peers();
        RelayStats {
            frames_forwarded: self.frames_forwarded.load(Ordering::Relaxed),
            controls_forwarded: self.controls_forwarded.load(Ordering::Relaxed),
            viewers: peers.viewers.len(),
            simulation_connected: peers.simulation.is_some(),
        }
    }

    fn unregister(&self, id: PeerId) {
        let mut peers = self.peers();
        if peers.simulation.as_ref().is_some_and(|(sim, _)| *sim == id) {
            peers.simulation = None;
            info!(peer = id, "Simulation disconnected");
        }
        if peers.viewers.remove(&id).is_some() {
            info!(peer = id, viewers = peers.viewers.len(), "Viewer disconnected");
        }
    }

    /// Apply one text message from peer `id`.
    fn route(&self, id: PeerId, role: &mut Role, outbox: &Outbox, text: String) {
        let msg = match decode_message(&text) {
            Ok(msg) => msg,
            Err(err) => {
                warn!(peer = id, "Ignoring malformed message: {}", err);
                return;
            }
        };

        match msg {
            WireMessage::Simulation => {
                self.unregister(id);
                let mut peers = self.peers();
                if let Some((previous, _)) = peers.simulation.replace((id, outbox.clone())) {
                    warn!(peer = id, previous, "Replacing registered simulation");
                }
                *role = Role::Simulation;
                info!(peer = id, "Simulation registered");
            }
            WireMessage::Viewer => {
                self.unregister(id);
                let mut peers = self.peers();
                peers.viewers.insert(id, outbox.clone());
                *role = Role::Viewer;
                info!(peer = id, viewers = peers.viewers.len(), "Viewer registered");
            }
            WireMessage::Frame(_) => {
                let peers = self.peers();
                if !peers.simulation.as_ref().is_some_and(|(sim, _)| *sim == id) {
                    debug!(peer = id, ?role, "Dropping frame from non-simulation peer");
                    return;
                }
                let delivered = peers
                    .viewers
                    .values()
                    .filter(|viewer| viewer.send(Message::Text(text.clone())).is_ok())
                    .count();
                self.frames_forwarded
                    .fetch_add(delivered as u64, Ordering::Relaxed);
            }
            WireMessage::Control(control) => {
                let peers = self.peers();
                let Some((_, sim)) = &peers.simulation else {
                    debug!(peer = id, "No simulation for control message");
                    return;
                };
                if sim.send(Message::Text(text)).is_ok() {
                    self.controls_forwarded.fetch_add(1, Ordering::Relaxed);
                    debug!(peer = id, action = control.action.as_str(), "Control forwarded");
                }
            }
        }
    }
}

/// Bound relay, not yet accepting.
pub struct RelayServer {
    listener: TcpListener,
    routes: Arc<Routes>,
}

impl RelayServer {
    /// Bind the listening socket.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .context("Failed to bind relay listener")?;
        info!("Relay server bound to {}", listener.local_addr()?);
        Ok(Self {
            listener,
            routes: Arc::new(Routes::default()),
        })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Current counters.
    pub fn stats(&self) -> RelayStats {
        self.routes.stats()
    }

    /// Accept and serve peers until the task is cancelled.
    ///
    /// Dropping the returned future closes every peer connection.
    pub async fn run(self) -> Result<()> {
        let mut peers = JoinSet::new();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, addr) = accepted.context("Failed to accept relay peer")?;
                    let routes = self.routes.clone();
                    peers.spawn(serve_peer(stream, addr, routes));
                }
                Some(finished) = peers.join_next() => {
                    if let Err(err) = finished {
                        warn!("Relay peer task failed: {}", err);
                    }
                }
            }
        }
    }

    /// Run on the current tokio runtime.
    pub fn spawn(self) -> Result<RelayServerHandle> {
        let addr = self.local_addr()?;
        let routes = self.routes.clone();
        let task = tokio::spawn(self.run());
        Ok(RelayServerHandle { addr, routes, task })
    }
}

/// Handle to a relay running in the background.
pub struct RelayServerHandle {
    addr: SocketAddr,
    routes: Arc<Routes>,
    task: JoinHandle<Result<()>>,
}

impl RelayServerHandle {
    /// Address peers connect to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Current counters.
    pub fn stats(&self) -> RelayStats {
        self.routes.stats()
    }

    /// Stop accepting and drop every peer connection.
    pub async fn shutdown(self) {
        self.task.abort();
        match self.task.await {
            Ok(Err(err)) => warn!("Relay server stopped with error: {:#}", err),
            Ok(Ok(())) => {}
            Err(err) if err.is_cancelled() => {}
            Err(err) => warn!("Relay server task failed: {}", err),
        }
        info!("Relay server on {} shut down", self.addr);
    }
}

#[instrument(skip(stream, routes), fields(addr = %addr))]
async fn serve_peer(stream: TcpStream, addr: SocketAddr, routes: Arc<Routes>) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(err) => {
            warn!("WebSocket handshake failed: {}", err);
            return;
        }
    };
    let id = routes.next_peer();
    debug!(peer = id, "Peer connected");

    let (outbox, mut inbox) = mpsc::unbounded_channel();
    let (mut sink, mut stream) = ws.split();
    let mut role = Role::Unregistered;
    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => routes.route(id, &mut role, &outbox, text),
                Some(Ok(Message::Close(_))) => debug!(peer = id, "Peer closing"),
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(peer = id, "Peer read failed: {}", err);
                    break;
                }
                None => break,
            },
            Some(outgoing) = inbox.recv() => {
                if let Err(err) = sink.send(outgoing).await {
                    debug!(peer = id, "Peer write failed: {}", err);
                    break;
                }
            }
        }
    }
    routes.unregister(id);
    debug!(peer = id, ?role, "Peer gone");
}

#[cfg(test)]
mod tests {
    use super::*;
    use simrelay_net::{encode_message, ControlMessage};

    fn outbox() -> (Outbox, mpsc::UnboundedReceiver<Message>) {
        mpsc::unbounded_channel()
    }

    #[test]
    fn frames_reach_every_viewer_verbatim() {
        let routes = Routes::default();
        let (sim_out, _sim_in) = outbox();
        let (a_out, mut a_in) = outbox();
        let (b_out, mut b_in) = outbox();
        let mut sim = Role::Unregistered;
        let mut a = Role::Unregistered;
        let mut b = Role::Unregistered;

        routes.route(0, &mut sim, &sim_out, r#"{"type":"simulation"}"#.into());
        routes.route(1, &mut a, &a_out, r#"{"type":"viewer"}"#.into());
        routes.route(2, &mut b, &b_out, r#"{"type":"viewer"}"#.into());

        let frame = r#"{"type":"frame","frame":"AAAA","timestamp":"2024-01-01T00:00:00.000001Z"}"#;
        routes.route(0, &mut sim, &sim_out, frame.into());

        assert_eq!(a_in.try_recv().unwrap(), Message::Text(frame.into()));
        assert_eq!(b_in.try_recv().unwrap(), Message::Text(frame.into()));
        assert_eq!(
            routes.stats(),
            RelayStats {
                frames_forwarded: 2,
                controls_forwarded: 0,
                viewers: 2,
                simulation_connected: true,
            }
        );
    }

    #[test]
    fn viewers_cannot_publish_frames() {
        let routes = Routes::default();
        let (out, mut inbox) = outbox();
        let mut role = Role::Unregistered;
        routes.route(1, &mut role, &out, r#"{"type":"viewer"}"#.into());
        routes.route(
            1,
            &mut role,
            &out,
            r#"{"type":"frame","frame":"AAAA","timestamp":"t"}"#.into(),
        );
        assert!(inbox.try_recv().is_err());
        assert_eq!(routes.stats().frames_forwarded, 0);
    }

    #[test]
    fn controls_go_to_the_simulation_only() {
        let routes = Routes::default();
        let (sim_out, mut sim_in) = outbox();
        let (viewer_out, mut viewer_in) = outbox();
        let mut sim = Role::Unregistered;
        let mut viewer = Role::Unregistered;
        routes.route(0, &mut sim, &sim_out, r#"{"type":"simulation"}"#.into());
        routes.route(1, &mut viewer, &viewer_out, r#"{"type":"viewer"}"#.into());

        let control =
            encode_message(&WireMessage::Control(ControlMessage::keyboard("left"))).unwrap();
        routes.route(1, &mut viewer, &viewer_out, control.clone());

        assert_eq!(sim_in.try_recv().unwrap(), Message::Text(control));
        assert!(viewer_in.try_recv().is_err());
        assert_eq!(routes.stats().controls_forwarded, 1);
    }

    #[test]
    fn malformed_and_orphan_messages_are_ignored() {
        let routes = Routes::default();
        let (out, mut inbox) = outbox();
        let mut role = Role::Unregistered;
        routes.route(3, &mut role, &out, "not json".into());
        routes.route(3, &mut role, &out, r#"{"type":"control","action":"pause"}"#.into());
        assert_eq!(role, Role::Unregistered);
        assert!(inbox.try_recv().is_err());
        assert_eq!(routes.stats(), RelayStats::default());
    }

    #[test]
    fn unregister_clears_roles() {
        let routes = Routes::default();
        let (out, _inbox) = outbox();
        let mut sim = Role::Unregistered;
        let mut viewer = Role::Unregistered;
        routes.route(0, &mut sim, &out, r#"{"type":"simulation"}"#.into());
        routes.route(1, &mut viewer, &out, r#"{"type":"viewer"}"#.into());

        routes.unregister(0);
        routes.unregister(1);
        routes.unregister(1);
        let stats = routes.stats();
        assert!(!stats.simulation_connected);
        assert_eq!(stats.viewers, 0);
    }

    #[test]
    fn a_new_simulation_replaces_the_old_one() {
        let routes = Routes::default();
        let (old_out, mut old_in) = outbox();
        let (new_out, mut new_in) = outbox();
        let mut old = Role::Unregistered;
        let mut new = Role::Unregistered;
        routes.route(0, &mut old, &old_out, r#"{"type":"simulation"}"#.into());
        routes.route(1, &mut new, &new_out, r#"{"type":"simulation"}"#.into());

        let control = r#"{"type":"control","action":"reset"}"#;
        routes.route(2, &mut Role::Viewer, &old_out, control.into());
        assert!(old_in.try_recv().is_err());
        assert_eq!(new_in.try_recv().unwrap(), Message::Text(control.into()));
    }

    #[test]
    fn replaced_simulation_can_no_longer_publish_frames() {
        let routes = Routes::default();
        let (old_out, _old_in) = outbox();
        let (new_out, _new_in) = outbox();
        let (viewer_out, mut viewer_in) = outbox();
        let mut old = Role::Unregistered;
        let mut new = Role::Unregistered;
        let mut viewer = Role::Unregistered;
        routes.route(0, &mut old, &old_out, r#"{"type":"simulation"}"#.into());
        routes.route(2, &mut viewer, &viewer_out, r#"{"type":"viewer"}"#.into());
        routes.route(1, &mut new, &new_out, r#"{"type":"simulation"}"#.into());

        let stale = r#"{"type":"frame","frame":"AAAA","timestamp":"t"}"#;
        routes.route(0, &mut old, &old_out, stale.into());
        assert!(viewer_in.try_recv().is_err());
        assert_eq!(routes.stats().frames_forwarded, 0);

        let fresh = r#"{"type":"frame","frame":"BBBB","timestamp":"t"}"#;
        routes.route(1, &mut new, &new_out, fresh.into());
        assert_eq!(viewer_in.try_recv().unwrap(), Message::Text(fresh.into()));
        assert_eq!(routes.stats().frames_forwarded, 1);
    }
}
