use crate::config::RelayConfig;
use crate::event_log::{EventRecord, JsonlSink};
use crate::sim::PatternSim;
use anyhow::{Context, Result};
use simrelay_client::SyncRelay;
use simrelay_net::{ControlAction, ControlMessage};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const STATUS_EVERY: u64 = 100;
const PAUSED_IDLE: Duration = Duration::from_millis(10);

pub struct HeadlessConfig {
    pub relay: RelayConfig,
    pub max_ticks: Option<u64>,
    pub event_log: Option<PathBuf>,
}

/// Totals reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub steps: u64,
    pub frames_streamed: u64,
    pub controls_applied: u64,
}

pub fn run(cfg: HeadlessConfig) -> Result<RunSummary> {
    let events = cfg
        .event_log
        .as_deref()
        .map(JsonlSink::create)
        .transpose()
        .context("failed to open event log")?;

    let relay = if cfg.relay.enabled {
        let mut relay = SyncRelay::new(cfg.relay.client_config());
        if !relay.connect() {
            warn!(
                "Relay at {} unavailable; continuing without it",
                relay.config().session.url()
            );
        }
        Some(relay)
    } else {
        info!("Relay disabled");
        None
    };

    let mut tick_loop = TickLoop::new(&cfg.relay, relay, events);
    let status = if tick_loop.relay_connected() {
        "connected"
    } else {
        "offline"
    };
    tick_loop.record("connect", status)?;

    let pacing = Duration::from_millis(cfg.relay.tick_interval_ms);
    while cfg.max_ticks.map_or(true, |max| tick_loop.summary.ticks < max) {
        let started = Instant::now();
        tick_loop.tick()?;
        if let Some(rest) = pacing.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    tick_loop.finish()
}

/// Per-tick glue between the simulation and the relay.
struct TickLoop {
    sim: PatternSim,
    relay: Option<SyncRelay>,
    events: Option<JsonlSink>,
    stream_every: u64,
    paused: bool,
    summary: RunSummary,
}

impl TickLoop {
    fn new(cfg: &RelayConfig, relay: Option<SyncRelay>, events: Option<JsonlSink>) -> Self {
        Self {
            sim: PatternSim::new(cfg.width, cfg.height, cfg.speed_scale),
            relay,
            events,
            stream_every: cfg.stream_every,
            paused: false,
            summary: RunSummary::default(),
        }
    }

    fn relay_connected(&self) -> bool {
        self.relay.as_ref().is_some_and(SyncRelay::is_connected)
    }

    fn tick(&mut self) -> Result<()> {
        self.summary.ticks += 1;

        if let Some(control) = self.relay.as_ref().and_then(SyncRelay::get_control) {
            self.apply_control(&control)?;
        }
        if self.paused {
            std::thread::sleep(PAUSED_IDLE);
        } else {
            self.sim.step();
            self.summary.steps += 1;
            if self.sim.count().is_multiple_of(STATUS_EVERY) {
                self.log_status();
            }
        }

        // A paused scene keeps streaming its frozen view.
        if self.sim.count().is_multiple_of(self.stream_every) {
            self.stream_camera();
        }
        Ok(())
    }

    fn log_status(&self) {
        let pose = self.sim.pose();
        let command = self.sim.teleop().command();
        info!(
            step = self.sim.count().0,
            time = self.sim.time(),
            x = pose.x,
            y = pose.y,
            yaw = pose.yaw,
            vx = command.linear_x,
            vy = command.linear_y,
            wz = command.angular_z,
            relay = self.relay_connected(),
            "Simulation status"
        );
    }

    fn stream_camera(&mut self) {
        let Some(relay) = self.relay.as_mut() else {
            return;
        };
        if !relay.is_connected() {
            return;
        }
        let frame = match self.sim.camera_frame() {
            Ok(frame) => frame,
            Err(err) => {
                warn!("Camera frame unavailable: {}", err);
                return;
            }
        };
        // The relay drops frames silently once its session has failed.
        match relay.stream_frame(&frame) {
            Ok(()) if relay.is_connected() => self.summary.frames_streamed += 1,
            Ok(()) => debug!("Relay lost while streaming; frame dropped"),
            Err(err) => warn!("Skipping frame: {}", err),
        }
    }

    fn apply_control(&mut self, control: &ControlMessage) -> Result<()> {
        let detail = match control.action {
            ControlAction::Reset => {
                self.sim.reset();
                info!("Simulation reset");
                "reset".to_string()
            }
            ControlAction::Pause => {
                self.paused = !self.paused;
                info!("Simulation {}", if self.paused { "paused" } else { "resumed" });
                format!("pause:{}", self.paused)
            }
            ControlAction::Stand => {
                self.sim.stand();
                info!("Robot standing");
                "stand".to_string()
            }
            ControlAction::Keyboard => match control.key() {
                Some(key) => {
                    self.sim.teleop_mut().update_from_keyboard(key);
                    format!("keyboard:{key}")
                }
                None => {
                    warn!("Keyboard control without a key");
                    return Ok(());
                }
            },
        };
        self.summary.controls_applied += 1;
        self.record("control", &detail)
    }

    fn record(&mut self, kind: &str, detail: &str) -> Result<()> {
        if let Some(events) = self.events.as_mut() {
            events.write(&EventRecord {
                tick: self.sim.count(),
                sim_time: self.sim.time(),
                kind,
                detail,
            })?;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<RunSummary> {
        if let Some(mut relay) = self.relay.take() {
            relay.disconnect();
        }
        if let Some(events) = self.events.as_mut() {
            events.flush()?;
        }
        info!(
            ticks = self.summary.ticks,
            steps = self.summary.steps,
            frames = self.summary.frames_streamed,
            controls = self.summary.controls_applied,
            "Tick loop finished"
        );
        Ok(self.summary)
    }
}
