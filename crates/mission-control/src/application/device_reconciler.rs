//! Device reconciler: binds physical pixel devices to logical displays and
//! drives one render loop per device.
//!
//! # Why a keyed registry? (for beginners)
//!
//! When an LED controller reboots it is rediscovered as a brand-new object
//! with a new socket and a new handle.  Comparing handles would treat it as a
//! new device and add a second display to the layout.  Instead every binding
//! is keyed by the controller's hardware id (its MAC address), which never
//! changes, so a reconnect swaps the handle and keeps the logical display,
//! its id, and its position.
//!
//! # Render loop
//!
//! Each bound device gets its own Tokio task with its own interval timer:
//!
//! ```text
//! tick ─► source.render_frame() ─► frame[display.id] ─► device.push_buffer()
//! ```
//!
//! The loop only reads shared state; it never takes the dispatch timeline,
//! so a slow device cannot delay message routing.  A push error is logged
//! and the loop carries on with the next tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use mission_core::{DisplayError, DisplayId, Frame, LayoutRegistry, LogicalDisplay, PixelBuffer, Resolution};

/// Default target frame rate of every render loop.
pub const DEFAULT_FPS: u32 = 30;

/// Errors a device reports when a push fails.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("device has stopped accepting pixels")]
    Stopped,

    #[error("device reports unusable dimensions: {0}")]
    Dimensions(#[from] DisplayError),
}

/// One physical pixel device as handed over by discovery.
#[async_trait]
pub trait PixelDevice: Send + Sync {
    /// Stable identity, e.g. the controller's MAC address.
    fn hardware_id(&self) -> &str;

    /// Native pixel dimensions.
    fn pixel_dimensions(&self) -> Resolution;

    /// Pushes one RGBA buffer to the hardware.
    async fn push_buffer(&self, buffer: &PixelBuffer) -> Result<(), DeviceError>;

    /// Releases the device; later pushes may fail.
    fn stop_pushing(&self);
}

/// Source of the full cross-display frame, usually the active mode.
pub trait FrameSource: Send + Sync {
    fn render_frame(&self) -> Frame;
}

/// A device currently driven by a render loop.
struct Binding {
    device: Arc<dyn PixelDevice>,
    task: JoinHandle<()>,
}

impl Binding {
    fn release(self) {
        self.task.abort();
        self.device.stop_pushing();
    }
}

/// Keyed registries `hardware id -> display` and `hardware id -> binding`,
/// plus the render loops.
///
/// A display is remembered for the life of the reconciler, even after its
/// device stops, so a controller that comes back gets the same display.
pub struct DeviceReconciler {
    displays: HashMap<String, LogicalDisplay>,
    bindings: HashMap<String, Binding>,
    source: Arc<dyn FrameSource>,
    frame_interval: Duration,
}

impl DeviceReconciler {
    /// Creates an empty reconciler rendering at `fps` frames per second
    /// (clamped to at least 1).
    pub fn new(source: Arc<dyn FrameSource>, fps: u32) -> Self {
        Self {
            displays: HashMap::new(),
            bindings: HashMap::new(),
            source,
            frame_interval: Duration::from_secs(1) / fps.max(1),
        }
    }

    /// Binds a discovered device and (re)starts its render loop.
    ///
    /// - Unknown hardware id: a fresh matrix display sized to the device is
    ///   created and added at the right edge of the layout.
    /// - Known hardware id, whether still bound or stopped earlier: the same
    ///   display is reused and any old handle's loop is stopped.  The layout
    ///   is only touched if the display was removed from it in the meantime.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn discover(&mut self, device: Arc<dyn PixelDevice>, layout: &mut LayoutRegistry) -> DisplayId {
        let hardware_id = device.hardware_id().to_string();

        if let Some(old) = self.bindings.remove(&hardware_id) {
            old.release();
        }

        let logical = match self.displays.get(&hardware_id) {
            Some(known) => {
                let logical = known.clone();
                if device.pixel_dimensions() != logical.resolution {
                    warn!(
                        hardware_id = %hardware_id,
                        display_id = %logical.id,
                        "device reconnected with different dimensions; keeping its display"
                    );
                }
                if !layout.has(&logical.id) && !layout.add_at_right_edge(logical.clone()) {
                    warn!(hardware_id = %hardware_id, "no room left in the layout for the display");
                }
                info!(hardware_id = %hardware_id, display_id = %logical.id, "device rebound");
                logical
            }
            None => {
                let logical = LogicalDisplay::matrix(device.pixel_dimensions());
                if !layout.add_at_right_edge(logical.clone()) {
                    warn!(hardware_id = %hardware_id, "no room left in the layout for the display");
                }
                info!(hardware_id = %hardware_id, display_id = %logical.id, "device bound to new display");
                self.displays.insert(hardware_id.clone(), logical.clone());
                logical
            }
        };

        let task = tokio::spawn(render_loop(
            logical.clone(),
            Arc::clone(&device),
            Arc::clone(&self.source),
            self.frame_interval,
        ));
        self.bindings.insert(hardware_id, Binding { device, task });
        logical.id
    }

    /// Cancels the loop for `hardware_id` and releases its device.
    ///
    /// The logical display stays in the layout, and stays assigned to
    /// `hardware_id`, so a later reconnect finds it where the user left it.
    /// Returns `false` if nothing was bound.
    pub fn stop(&mut self, hardware_id: &str) -> bool {
        match self.bindings.remove(hardware_id) {
            Some(binding) => {
                info!(hardware_id, "device stopped");
                binding.release();
                true
            }
            None => false,
        }
    }

    /// Stops every loop.
    pub fn shutdown_all(&mut self) {
        for (_, binding) in self.bindings.drain() {
            binding.release();
        }
    }

    /// Display assigned to `hardware_id`, bound or not.
    pub fn display_for(&self, hardware_id: &str) -> Option<&LogicalDisplay> {
        self.displays.get(hardware_id)
    }

    /// Number of devices with a running render loop.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Drop for DeviceReconciler {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}

/// Pulls a frame and pushes this display's buffer, once per tick, forever.
async fn render_loop(
    logical: LogicalDisplay,
    device: Arc<dyn PixelDevice>,
    source: Arc<dyn FrameSource>,
    period: Duration,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let display_id = logical.id.to_string();
    let (width, height) = (logical.resolution.width(), logical.resolution.height());

    loop {
        ticker.tick().await;

        let frame = source.render_frame();
        let Some(buffer) = frame.get(&logical.id) else {
            continue;
        };
        if buffer.resolution() != logical.resolution {
            warn!(
                hardware_id = device.hardware_id(),
                display_id = %display_id,
                "skipping frame: buffer is {}x{}, display is {width}x{height}",
                buffer.width(),
                buffer.height(),
            );
            continue;
        }
        if let Err(e) = device.push_buffer(buffer).await {
            warn!(hardware_id = device.hardware_id(), "push failed: {e}");
        } else {
            debug!(hardware_id = device.hardware_id(), "frame pushed");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mission_core::{LayoutSource, Position};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeDevice {
        id: String,
        dims: Resolution,
        pushes: AtomicUsize,
        stopped: AtomicBool,
    }

    impl FakeDevice {
        fn new(id: &str, w: u32, h: u32) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                dims: Resolution::new(w, h).unwrap(),
                pushes: AtomicUsize::new(0),
                stopped: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl PixelDevice for FakeDevice {
        fn hardware_id(&self) -> &str {
            &self.id
        }

        fn pixel_dimensions(&self) -> Resolution {
            self.dims
        }

        async fn push_buffer(&self, _buffer: &PixelBuffer) -> Result<(), DeviceError> {
            self.pushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stop_pushing(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    /// Frame source that always returns an empty frame.
    struct EmptySource;

    impl FrameSource for EmptySource {
        fn render_frame(&self) -> Frame {
            Frame::new()
        }
    }

    fn reconciler() -> DeviceReconciler {
        DeviceReconciler::new(Arc::new(EmptySource), 30)
    }

    #[tokio::test]
    async fn test_first_discovery_adds_display_at_right_edge() {
        // Arrange
        let mut rec = reconciler();
        let mut layout = LayoutRegistry::new();

        // Act
        let a = rec.discover(FakeDevice::new("aa", 64, 64), &mut layout);
        let b = rec.discover(FakeDevice::new("bb", 32, 8), &mut layout);

        // Assert
        let snapshot = layout.get();
        assert_eq!(snapshot.get(&a).unwrap().position, Position::new(0, 0));
        assert_eq!(snapshot.get(&b).unwrap().position, Position::new(64, 0));
        assert_eq!(snapshot.get(&b).unwrap().display.resolution, Resolution::new(32, 8).unwrap());
        assert_eq!(rec.len(), 2);
    }

    #[tokio::test]
    async fn test_rediscovery_keeps_display_and_releases_old_handle() {
        // Arrange
        let mut rec = reconciler();
        let mut layout = LayoutRegistry::new();
        let first = FakeDevice::new("aa", 64, 64);
        let id = rec.discover(first.clone(), &mut layout);
        let notifications = Arc::new(AtomicUsize::new(0));
        let n = Arc::clone(&notifications);
        layout.subscribe(Box::new(move |_: &mission_core::Layout| {
            n.fetch_add(1, Ordering::SeqCst);
        }));

        // Act
        let again = rec.discover(FakeDevice::new("aa", 64, 64), &mut layout);

        // Assert
        assert_eq!(again, id);
        assert_eq!(layout.layout().len(), 1);
        assert!(first.stopped.load(Ordering::SeqCst));
        assert_eq!(notifications.load(Ordering::SeqCst), 0, "layout must not change");
    }

    #[tokio::test]
    async fn test_rediscovery_re_adds_removed_display() {
        // Arrange
        let mut rec = reconciler();
        let mut layout = LayoutRegistry::new();
        let id = rec.discover(FakeDevice::new("aa", 8, 8), &mut layout);
        layout.remove(&id);

        // Act
        let again = rec.discover(FakeDevice::new("aa", 8, 8), &mut layout);

        // Assert
        assert_eq!(again, id);
        assert!(layout.has(&id));
    }

    #[tokio::test]
    async fn test_stop_keeps_display_in_layout() {
        // Arrange
        let mut rec = reconciler();
        let mut layout = LayoutRegistry::new();
        let device = FakeDevice::new("aa", 8, 8);
        let id = rec.discover(device.clone(), &mut layout);

        // Act
        let stopped = rec.stop("aa");

        // Assert
        assert!(stopped);
        assert!(device.stopped.load(Ordering::SeqCst));
        assert!(layout.has(&id));
        assert!(rec.is_empty());
        assert!(!rec.stop("aa"));
    }

    #[tokio::test]
    async fn test_rediscovery_after_stop_reuses_display() {
        // Arrange
        let mut rec = reconciler();
        let mut layout = LayoutRegistry::new();
        let id = rec.discover(FakeDevice::new("aa", 8, 8), &mut layout);
        rec.discover(FakeDevice::new("bb", 8, 8), &mut layout);
        layout.move_display(&id, Position::new(0, 8));
        rec.stop("aa");

        // Act
        let again = rec.discover(FakeDevice::new("aa", 8, 8), &mut layout);

        // Assert
        assert_eq!(again, id);
        assert_eq!(layout.layout().len(), 2);
        assert_eq!(layout.layout().get(&id).unwrap().position, Position::new(0, 8));
        assert_eq!(rec.len(), 2);
        assert_eq!(rec.display_for("aa").map(|d| d.id.clone()), Some(id));
    }

    #[tokio::test]
    async fn test_missing_frame_entry_is_a_noop_tick() {
        // Arrange
        let mut rec = reconciler();
        let mut layout = LayoutRegistry::new();
        let device = FakeDevice::new("aa", 8, 8);
        rec.discover(device.clone(), &mut layout);

        // Act
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Assert
        assert_eq!(device.pushes.load(Ordering::SeqCst), 0);
    }
}
