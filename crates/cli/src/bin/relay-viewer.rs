use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use simrelay_net::{
    decode_frame, decode_frame_bytes, decode_message, encode_message, ControlAction,
    ControlMessage, WireMessage,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless viewer for a simulation relay", long_about = None)]
struct Args {
    /// Relay address (host:port)
    #[arg(short, long, default_value = "localhost:8080")]
    server: String,

    /// Directory to write received frames to as JPEG files
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Control action to send once registered (reset, pause, stand, keyboard)
    #[arg(long)]
    send: Option<String>,

    /// Key for a keyboard control
    #[arg(long)]
    key: Option<String>,
}

fn control_from_args(action: &str, key: Option<&str>) -> Result<ControlMessage> {
    let Some(action) = ControlAction::parse(action) else {
        bail!("unknown control action '{action}'");
    };
    match (action, key) {
        (ControlAction::Keyboard, Some(key)) => Ok(ControlMessage::keyboard(key)),
        (ControlAction::Keyboard, None) => bail!("--send keyboard requires --key"),
        (action, _) => Ok(ControlMessage::new(action)),
    }
}

fn write_frame(dir: &Path, index: u64, jpeg: &[u8]) -> Result<PathBuf> {
    let path = dir.join(format!("frame_{index:05}.jpg"));
    fs::write(&path, jpeg).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let control = args
        .send
        .as_deref()
        .map(|action| control_from_args(action, args.key.as_deref()))
        .transpose()?;
    if let Some(dir) = &args.out {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let url = format!("ws://{}", args.server);
    let (ws, _) = connect_async(url.as_str())
        .await
        .with_context(|| format!("failed to connect to {url}"))?;
    let (mut sink, mut stream) = ws.split();
    sink.send(Message::Text(encode_message(&WireMessage::Viewer)?))
        .await
        .context("failed to register as viewer")?;
    info!("Watching {}", url);

    if let Some(control) = control {
        sink.send(Message::Text(encode_message(&WireMessage::Control(control.clone()))?))
            .await
            .context("failed to send control")?;
        info!("Sent {} control", control.action.as_str());
    }

    let mut received = 0u64;
    while let Some(msg) = stream.next().await {
        let text = match msg.context("relay connection failed")? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let frame = match decode_message(&text) {
            Ok(WireMessage::Frame(frame)) => frame,
            Ok(other) => {
                debug!("Ignoring {} message", other.kind());
                continue;
            }
            Err(err) => {
                warn!("Ignoring malformed message: {}", err);
                continue;
            }
        };

        match decode_frame(&frame.frame) {
            Ok(image) => info!(
                "Frame {} at {}: {}x{}",
                received,
                frame.timestamp,
                image.width(),
                image.height()
            ),
            Err(err) => {
                warn!("Undecodable frame at {}: {:#}", frame.timestamp, err);
                continue;
            }
        }
        if let Some(dir) = &args.out {
            let path = write_frame(dir, received, &decode_frame_bytes(&frame.frame)?)?;
            debug!("Wrote {}", path.display());
        }

        received += 1;
        if args.max_frames.is_some_and(|max| received >= max) {
            break;
        }
    }

    let _ = sink.close().await;
    info!("Received {} frames", received);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyboard_control_needs_a_key() {
        assert!(control_from_args("keyboard", None).is_err());
        assert_eq!(
            control_from_args("keyboard", Some("left")).unwrap(),
            ControlMessage::keyboard("left")
        );
    }

    #[test]
    fn plain_actions_ignore_key() {
        assert_eq!(
            control_from_args("pause", Some("left")).unwrap(),
            ControlMessage::new(ControlAction::Pause)
        );
        assert!(control_from_args("jump", None).is_err());
    }

    #[test]
    fn frames_are_numbered() {
        let dir = std::env::temp_dir().join(format!("simrelay-viewer-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = write_frame(&dir, 7, &[0xFF, 0xD8]).unwrap();
        assert!(path.ends_with("frame_00007.jpg"));
        assert_eq!(fs::read(&path).unwrap(), vec![0xFF, 0xD8]);
        let _ = fs::remove_dir_all(&dir);
    }
}
