use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use simrelay_server::RelayServer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "WebSocket relay between a simulation and its viewers",
    long_about = None
)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    listen: String,

    /// Seconds between traffic summaries in the log (0 disables)
    #[arg(long, default_value_t = 30)]
    stats_every: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let server = RelayServer::bind(args.listen.as_str())
        .await
        .with_context(|| format!("failed to listen on {}", args.listen))?;
    let handle = server.spawn()?;
    info!("Relay listening on ws://{}", handle.local_addr());

    let mut summary = tokio::time::interval(Duration::from_secs(args.stats_every.max(1)));
    summary.tick().await;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to wait for ctrl-c")?;
                break;
            }
            _ = summary.tick(), if args.stats_every > 0 => {
                let stats = handle.stats();
                info!(
                    frames = stats.frames_forwarded,
                    controls = stats.controls_forwarded,
                    viewers = stats.viewers,
                    simulation = stats.simulation_connected,
                    "Relay traffic"
                );
            }
        }
    }

    let stats = handle.stats();
    handle.shutdown().await;
    info!(
        "Relay stopped after forwarding {} frames and {} controls",
        stats.frames_forwarded, stats.controls_forwarded
    );
    Ok(())
}
