//! Mission control server: entry point.
//!
//! Drives a wall of LED matrices from WebSocket clients.  Exactly one mode
//! (draw, pattern, ...) owns the displays at a time; admins switch modes and
//! rearrange the layout, players interact with the active mode.
//!
//! # Usage
//!
//! ```text
//! mission-control [OPTIONS]
//!
//! Options:
//!   --config    <PATH>   Config file [default: <config dir>/mission-control/config.toml]
//!   --ws-port   <PORT>   WebSocket listener port (overrides the file)
//!   --bind      <ADDR>   WebSocket bind address (overrides the file)
//!   --fps       <FPS>    Device frame rate (overrides the file)
//!   --log-level <LEVEL>  Log filter when RUST_LOG is unset (overrides the file)
//! ```
//!
//! Each option also reads an environment variable (`MISSION_CONFIG`,
//! `MISSION_WS_PORT`, `MISSION_BIND`, `MISSION_FPS`, `MISSION_LOG_LEVEL`).
//! Command-line values win over the environment, which wins over the file.
//!
//! # Architecture overview
//!
//! ```text
//! WebSocket clients (JSON envelopes)
//!       ↕
//! mission-control  ← this process
//!   application/     router, mode coordinator, device reconciler
//!   modes/           draw, pattern
//!   infrastructure/
//!     ws_server      accept WebSocket connections
//!     network/       PixelPusher discovery + UDP pixel sender
//!     storage/       TOML config
//!       ↕
//! PixelPusher LED controllers (UDP)
//! ```

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mission_control::application::mission_control::{MissionControl, MissionSettings};
use mission_control::infrastructure::network::discovery::{
    run_device_binder, start_discovery_listener,
};
use mission_control::infrastructure::storage::config::{load_config, AppConfig};
use mission_control::infrastructure::{run_server, WsServerConfig};
use mission_control::modes::builtin_modes;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Mission control server for pixel-addressable LED displays.
#[derive(Debug, Parser)]
#[command(
    name = "mission-control",
    about = "Mode-switching control server for LED matrix walls",
    version
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, env = "MISSION_CONFIG")]
    config: Option<PathBuf>,

    /// TCP port for the WebSocket server.
    #[arg(long, env = "MISSION_WS_PORT")]
    ws_port: Option<u16>,

    /// IP address to bind the WebSocket server to.
    #[arg(long, env = "MISSION_BIND")]
    bind: Option<String>,

    /// Frames per second pushed to every device.
    #[arg(long, env = "MISSION_FPS")]
    fps: Option<u32>,

    /// Log filter used when `RUST_LOG` is not set, e.g. `debug`.
    #[arg(long, env = "MISSION_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// Overwrites the file's values with any given on the command line.
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(port) = self.ws_port {
            config.server.ws_port = port;
        }
        if let Some(bind) = &self.bind {
            config.server.bind_address = bind.clone();
        }
        if let Some(fps) = self.fps {
            config.render.fps = fps;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
    }

    /// Loads the config file and applies the command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting configuration is invalid.
    fn into_app_config(self) -> anyhow::Result<AppConfig> {
        let mut config = load_config(self.config.as_deref()).context("failed to load config")?;
        self.apply_overrides(&mut config);
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_app_config()?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    // ── Mission control ───────────────────────────────────────────────────────
    let modes = builtin_modes(&config.modes.enabled)?;
    let settings = MissionSettings {
        default_mode: config.modes.default.clone(),
        fps: config.render.fps,
    };
    let mission = Arc::new(tokio::sync::Mutex::new(
        MissionControl::new(settings, modes).context("failed to start mission control")?,
    ));
    let ws_config = WsServerConfig::from_config(&config.server)?;

    info!(
        "mission control starting: ws={}, discovery={}",
        ws_config.bind_addr,
        if config.discovery.enabled {
            format!("udp/{}", config.discovery.port)
        } else {
            "off".to_string()
        }
    );

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // ── Device discovery ──────────────────────────────────────────────────────
    if config.discovery.enabled {
        match start_discovery_listener(
            config.discovery.port,
            config.discovery.device_timeout(),
            Arc::clone(&running),
        ) {
            Ok(events) => {
                tokio::spawn(run_device_binder(events, Arc::clone(&mission)));
            }
            Err(e) => warn!("device discovery disabled: {e}"),
        }
    }

    // ── Main server loop ───────────────────────────────────────────────────────
    run_server(ws_config, Arc::clone(&mission), running).await?;

    mission.lock().await.shutdown();
    info!("mission control stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
