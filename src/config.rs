use serde::{Deserialize, Serialize};
use simrelay_client::RelayClientConfig;
use simrelay_core::teleop::DEFAULT_SPEED_SCALE;
use simrelay_net::{SessionConfig, DEFAULT_JPEG_QUALITY};
use std::{fs, path::Path, time::Duration};
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "config/relay.toml";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// Whether to connect to a relay at all.
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// JPEG quality (1-100).
    pub jpeg_quality: u8,
    /// Stream one frame every N simulation steps (0 disables streaming).
    pub stream_every: u64,
    /// Teleop velocity magnitude per key.
    pub speed_scale: f32,
    /// Camera width in pixels.
    pub width: usize,
    /// Camera height in pixels.
    pub height: usize,
    /// Wall-clock pacing per tick; 0 runs as fast as possible.
    pub tick_interval_ms: u64,
    pub connect_timeout_ms: u64,
    pub send_timeout_ms: u64,
    pub close_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            enabled: true,
            host: session.host,
            port: session.port,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            stream_every: 2,
            speed_scale: DEFAULT_SPEED_SCALE,
            width: 640,
            height: 480,
            tick_interval_ms: 0,
            connect_timeout_ms: session.connect_timeout.as_millis() as u64,
            send_timeout_ms: session.send_timeout.as_millis() as u64,
            close_timeout_ms: session.close_timeout.as_millis() as u64,
        }
    }
}

impl RelayConfig {
    /// Load relay configuration from the default path.
    pub fn load() -> Self {
        Self::load_from_path(Path::new(DEFAULT_CONFIG_PATH))
    }

    /// Load configuration from an explicit path, falling back to defaults on errors.
    pub fn load_from_path(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<RelayConfig>(&contents) {
                Ok(cfg) => cfg,
                Err(err) => {
                    warn!("Failed to parse {}: {err}. Using defaults", path.display());
                    RelayConfig::default()
                }
            },
            Err(err) => {
                if path != Path::new(DEFAULT_CONFIG_PATH)
                    || err.kind() != std::io::ErrorKind::NotFound
                {
                    warn!("Failed to read {}: {err}. Using defaults", path.display());
                } else {
                    warn!("Relay config not found at {}. Using defaults", path.display());
                }
                RelayConfig::default()
            }
        }
    }

    /// Settings for the relay façade.
    pub fn client_config(&self) -> RelayClientConfig {
        let mut session = SessionConfig::new(self.host.clone(), self.port);
        session.connect_timeout = Duration::from_millis(self.connect_timeout_ms);
        session.send_timeout = Duration::from_millis(self.send_timeout_ms);
        session.close_timeout = Duration::from_millis(self.close_timeout_ms);
        RelayClientConfig {
            session,
            jpeg_quality: self.jpeg_quality,
        }
    }
}
