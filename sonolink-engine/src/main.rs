//! sonolink-engine - Main entry point
//!
//! Audio delivery engine: plays queued clips to the local device and/or
//! remote listeners connected over TCP, with crossfaded splicing, paced
//! remote delivery, and spectrum analysis for music.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sonolink_engine::net::registry::TcpRemoteListener;
use sonolink_engine::playback::queue::SourceKind;
use sonolink_engine::{AudioEngine, EngineConfig};

/// Command-line arguments for sonolink-engine
#[derive(Parser, Debug)]
#[command(name = "sonolink-engine")]
#[command(about = "Audio delivery engine for local and remote playback")]
#[command(version)]
struct Args {
    /// Configuration file (TOML); falls back to the standard locations
    #[arg(short, long, env = "SONOLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Local output device name (overrides configuration)
    #[arg(short, long)]
    device: Option<String>,

    /// Accept remote listeners on this address, e.g. 0.0.0.0:5600
    #[arg(short, long, env = "SONOLINK_LISTEN")]
    listen: Option<SocketAddr>,

    /// Treat the given files as music (runs the spectrum analyzer)
    #[arg(long)]
    music: bool,

    /// Audio files to play in order
    files: Vec<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sonolink_engine=debug,sonolink_common=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = EngineConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if args.device.is_some() {
        config.local_device = args.device.clone();
    }

    let engine = Arc::new(AudioEngine::new(config).context("Failed to initialize engine")?);
    info!("Engine initialized");

    if let Some(addr) = args.listen {
        spawn_accept_loop(addr, Arc::clone(&engine))?;
    }

    let source = if args.music {
        SourceKind::Music
    } else {
        SourceKind::Effect
    };
    for file in &args.files {
        let label = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file.display().to_string());
        info!(file = %file.display(), "queueing");
        engine.submit_file(file.clone(), source, 0, &label);
    }

    if !args.files.is_empty() {
        // Generous bound: pacing keeps remote delivery near real time
        if !engine.wait_until_idle(Duration::from_secs(args.files.len() as u64 * 600)) {
            warn!("playback did not finish in time");
        }
        if args.listen.is_none() {
            engine.shutdown();
            return Ok(());
        }
    }

    if args.listen.is_some() || args.files.is_empty() {
        info!("Running until Ctrl+C");
        wait_for_shutdown();
    }

    engine.shutdown();
    info!("Shutdown complete");
    Ok(())
}

/// Accept TCP listeners and hand them to the device registry. The
/// signaling/authentication layer that normally fronts this is out of
/// scope here; any connection is treated as a playback endpoint.
fn spawn_accept_loop(addr: SocketAddr, engine: Arc<AudioEngine>) -> Result<()> {
    let listener =
        std::net::TcpListener::bind(addr).with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "accepting remote listeners");

    std::thread::Builder::new()
        .name("listener-accept".to_string())
        .spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!("set_nodelay failed: {}", e);
                        }
                        engine
                            .registry()
                            .register(Arc::new(TcpRemoteListener::new(stream)));
                    }
                    Err(e) => warn!("accept failed: {}", e),
                }
            }
        })
        .context("Failed to spawn accept thread")?;
    Ok(())
}

fn wait_for_shutdown() {
    let (tx, rx) = std::sync::mpsc::channel::<()>();
    if ctrlc_handler(tx).is_err() {
        // No signal handling available; park forever
        loop {
            std::thread::sleep(Duration::from_secs(3600));
        }
    }
    let _ = rx.recv();
}

fn ctrlc_handler(tx: std::sync::mpsc::Sender<()>) -> Result<()> {
    // Minimal Ctrl+C handling without an async runtime: a throwaway tokio
    // current-thread runtime drives the signal future.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()?;
    std::thread::Builder::new()
        .name("signal".to_string())
        .spawn(move || {
            runtime.block_on(async {
                let _ = tokio::signal::ctrl_c().await;
            });
            let _ = tx.send(());
        })?;
    Ok(())
}
