//! simrelay - headless simulation tick loop with a remote frame/control relay
//!
//! Steps a placeholder simulation, streams its camera to a WebSocket relay
//! and applies control messages sent back by viewers.

mod config;
mod event_log;
mod headless;
mod sim;

use anyhow::Result;
use config::RelayConfig;
use headless::HeadlessConfig;
use std::str::FromStr;
use std::{env, path::PathBuf};
use tracing::info;

fn main() -> Result<()> {
    // Initialize tracing with WARN level by default (can be overridden via RUST_LOG env var)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    info!("Starting simrelay v{}", env!("CARGO_PKG_VERSION"));

    let cli = CliOptions::parse(env::args().skip(1));
    let mut relay = match cli.config.as_deref() {
        Some(path) => RelayConfig::load_from_path(path),
        None => RelayConfig::load(),
    };
    cli.apply(&mut relay);

    let summary = headless::run(HeadlessConfig {
        relay,
        max_ticks: cli.max_ticks,
        event_log: cli.event_log,
    })?;
    info!(
        "Ran {} ticks ({} steps), streamed {} frames, applied {} controls",
        summary.ticks, summary.steps, summary.frames_streamed, summary.controls_applied
    );
    Ok(())
}

#[derive(Debug, Default, PartialEq)]
struct CliOptions {
    config: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    quality: Option<u8>,
    stream_every: Option<u64>,
    max_ticks: Option<u64>,
    no_relay: bool,
    speed_scale: Option<f32>,
    width: Option<usize>,
    height: Option<usize>,
    tick_ms: Option<u64>,
    event_log: Option<PathBuf>,
}

impl CliOptions {
    fn parse<I: Iterator<Item = String>>(mut args: I) -> Self {
        let mut opts = CliOptions::default();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => opts.config = path_arg(&arg, args.next()),
                "--host" => match args.next() {
                    Some(host) => opts.host = Some(host),
                    None => tracing::error!("--host requires a hostname"),
                },
                "--port" => opts.port = number_arg(&arg, args.next()),
                "--quality" => opts.quality = number_arg(&arg, args.next()),
                "--stream-every" => opts.stream_every = number_arg(&arg, args.next()),
                "--max-ticks" => opts.max_ticks = number_arg(&arg, args.next()),
                "--no-relay" => opts.no_relay = true,
                "--speed-scale" => opts.speed_scale = number_arg(&arg, args.next()),
                "--width" => opts.width = number_arg(&arg, args.next()),
                "--height" => opts.height = number_arg(&arg, args.next()),
                "--tick-ms" => opts.tick_ms = number_arg(&arg, args.next()),
                "--event-log" => opts.event_log = path_arg(&arg, args.next()),
                other => tracing::warn!("Ignoring unknown argument {other}"),
            }
        }

        opts
    }

    /// Overlay command-line values on the file configuration.
    fn apply(&self, cfg: &mut RelayConfig) {
        if self.no_relay {
            cfg.enabled = false;
        }
        if let Some(host) = &self.host {
            cfg.host = host.clone();
        }
        if let Some(port) = self.port {
            cfg.port = port;
        }
        if let Some(quality) = self.quality {
            cfg.jpeg_quality = quality;
        }
        if let Some(every) = self.stream_every {
            cfg.stream_every = every;
        }
        if let Some(scale) = self.speed_scale {
            cfg.speed_scale = scale;
        }
        if let Some(width) = self.width {
            cfg.width = width;
        }
        if let Some(height) = self.height {
            cfg.height = height;
        }
        if let Some(ms) = self.tick_ms {
            cfg.tick_interval_ms = ms;
        }
    }
}

fn path_arg(flag: &str, value: Option<String>) -> Option<PathBuf> {
    if value.is_none() {
        tracing::error!("{flag} requires a path");
    }
    value.map(PathBuf::from)
}

fn number_arg<T>(flag: &str, value: Option<String>) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = value else {
        tracing::error!("{flag} requires a value");
        return None;
    };
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::error!(%err, value = %raw, "{flag} must be a number");
            None
        }
    }
}
