//! UDP discovery listener for PixelPusher controllers.
//!
//! Controllers broadcast a beacon on the discovery port about once a second
//! for as long as they are powered.  The listener decodes each beacon and
//! reports only the interesting ones:
//!
//! - [`DiscoveryEvent::Found`] for a MAC never seen before, a MAC that went
//!   quiet for longer than the device timeout, or a MAC that now announces
//!   from a different address or port (the controller was replaced or got a
//!   new DHCP lease).
//! - [`DiscoveryEvent::Lost`] once a known MAC has been quiet for longer
//!   than the device timeout.
//!
//! Every other beacon only refreshes the last-seen time.
//!
//! # Threading
//!
//! The receive loop runs on a dedicated OS thread with a blocking socket and
//! a short read timeout, checking the `running` flag between reads.  Events
//! cross into the Tokio world through an `mpsc` channel.

use std::collections::HashMap;
use std::net::{SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use mission_core::protocol::{decode_discovery, DiscoveryPacket, ProtocolError};

use crate::application::mission_control::SharedMissionControl;
use crate::infrastructure::network::pixel_device::PixelPusherDevice;

/// Default UDP port PixelPusher beacons are broadcast to.
pub const DEFAULT_DISCOVERY_PORT: u16 = 7331;

const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Error type for the discovery listener.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The UDP socket could not be bound.
    #[error("failed to bind discovery socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The listener thread could not be started.
    #[error("failed to spawn discovery thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// What the listener reports to the application.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    /// A controller appeared (or reappeared) and should be bound.
    Found(DiscoveryPacket),
    /// The controller with this hardware id stopped announcing.
    Lost(String),
}

// ── Tracker ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Seen {
    addr: SocketAddrV4,
    last_seen: Instant,
}

/// Reconnect-aware de-duplication of discovery beacons, keyed by MAC.
#[derive(Debug)]
pub struct DiscoveryTracker {
    seen: HashMap<String, Seen>,
    timeout: Duration,
}

impl DiscoveryTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            seen: HashMap::new(),
            timeout,
        }
    }

    /// Records a beacon received at `now`.  Returns `true` if it should be
    /// reported as [`DiscoveryEvent::Found`].
    pub fn observe(&mut self, packet: &DiscoveryPacket, now: Instant) -> bool {
        let addr = SocketAddrV4::new(packet.ip, packet.data_port());
        let hardware_id = packet.hardware_id();

        let fresh = match self.seen.get(&hardware_id) {
            None => true,
            Some(seen) => {
                seen.addr != addr || now.saturating_duration_since(seen.last_seen) > self.timeout
            }
        };
        self.seen.insert(hardware_id, Seen { addr, last_seen: now });
        fresh
    }

    /// Forgets and returns every hardware id quiet for longer than the
    /// timeout at `now`.
    pub fn expire(&mut self, now: Instant) -> Vec<String> {
        let timeout = self.timeout;
        let expired: Vec<String> = self
            .seen
            .iter()
            .filter(|(_, s)| now.saturating_duration_since(s.last_seen) > timeout)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.seen.remove(id);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

// ── Listener ──────────────────────────────────────────────────────────────────

/// Binds `0.0.0.0:port` and starts the listener thread.
///
/// # Errors
///
/// [`DiscoveryError::BindFailed`] if the port is taken and
/// [`DiscoveryError::Spawn`] if the thread cannot start.
pub fn start_discovery_listener(
    port: u16,
    device_timeout: Duration,
    running: Arc<AtomicBool>,
) -> Result<mpsc::Receiver<DiscoveryEvent>, DiscoveryError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let socket =
        UdpSocket::bind(addr).map_err(|source| DiscoveryError::BindFailed { addr, source })?;
    socket.set_read_timeout(Some(READ_TIMEOUT)).ok();

    let (tx, rx) = mpsc::channel(64);
    std::thread::Builder::new()
        .name("pixelpusher-discovery".to_string())
        .spawn(move || {
            discovery_loop(socket, DiscoveryTracker::new(device_timeout), tx, running);
        })
        .map_err(DiscoveryError::Spawn)?;

    info!("discovery listening on UDP {addr}");
    Ok(rx)
}

fn discovery_loop(
    socket: UdpSocket,
    mut tracker: DiscoveryTracker,
    tx: mpsc::Sender<DiscoveryEvent>,
    running: Arc<AtomicBool>,
) {
    let mut buf = vec![0u8; 1500];

    while running.load(Ordering::Relaxed) {
        let received = match socket.recv_from(&mut buf) {
            Ok(pair) => Some(pair),
            Err(e) if is_timeout_error(&e) => None,
            Err(e) => {
                error!("discovery recv error: {e}");
                None
            }
        };

        let now = Instant::now();
        let mut events = Vec::new();

        if let Some((len, src)) = received {
            match decode_discovery(&buf[..len]) {
                Ok(packet) => {
                    if tracker.observe(&packet, now) {
                        debug!(
                            hardware_id = %packet.hardware_id(),
                            "new beacon from {src}: {} strips x {} pixels",
                            packet.strips_attached,
                            packet.pixels_per_strip
                        );
                        events.push(DiscoveryEvent::Found(packet));
                    }
                }
                Err(ProtocolError::UnsupportedDeviceType(t)) => {
                    debug!("ignoring beacon from {src}: device type {t}");
                }
                Err(e) => debug!("undecodable beacon from {src}: {e}"),
            }
        }

        for hardware_id in tracker.expire(now) {
            info!(hardware_id = %hardware_id, "device stopped announcing");
            events.push(DiscoveryEvent::Lost(hardware_id));
        }

        for event in events {
            if tx.blocking_send(event).is_err() {
                info!("discovery receiver dropped; stopping listener");
                return;
            }
        }
    }

    info!("discovery listener stopped");
}

/// Turns discovery events into device bindings until the listener stops.
///
/// Each `Found` opens a [`PixelPusherDevice`] and hands it to
/// `MissionControl::discover`; each `Lost` stops that device's render loop.
pub async fn run_device_binder(
    mut events: mpsc::Receiver<DiscoveryEvent>,
    mission: SharedMissionControl,
) {
    while let Some(event) = events.recv().await {
        match event {
            DiscoveryEvent::Found(packet) => match PixelPusherDevice::connect(&packet).await {
                Ok(device) => {
                    let display_id = mission.lock().await.discover(Arc::new(device));
                    info!(hardware_id = %packet.hardware_id(), display_id = %display_id, "controller bound");
                }
                Err(e) => warn!(hardware_id = %packet.hardware_id(), "cannot drive controller: {e}"),
            },
            DiscoveryEvent::Lost(hardware_id) => {
                mission.lock().await.device_lost(&hardware_id);
            }
        }
    }
    debug!("discovery event stream ended");
}

/// Returns `true` for OS timeout / would-block errors that should be retried.
fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
