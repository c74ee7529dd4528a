//! `MissionControl`: the single event timeline.
//!
//! Every routing decision, mode switch, layout mutation and device binding
//! goes through `&mut MissionControl`.  The server wraps it in one
//! `tokio::sync::Mutex` ([`SharedMissionControl`]), which gives the global
//! ordering: no two dispatches, switches or layout changes ever interleave.
//!
//! Device render loops are the exception.  They read through
//! [`RenderSource`], which holds its own small cells (the active mode handle
//! and a layout snapshot kept current by a registry subscriber) and never
//! waits for the timeline.
//!
//! # Wiring at construction
//!
//! ```text
//! LayoutRegistry subscribers, in order:
//!   1. snapshot cell for RenderSource
//!   2. broadcast {channel:"layout"} to every connection
//!   3. one per mode, filtered by "is this mode active?" (Conditional)
//! ChannelRouter:
//!   global  ping, mode, layout
//!   Mode(m) every channel m defines
//! ```

use std::sync::{Arc, PoisonError, RwLock};

use serde_json::json;
use tracing::{info, warn};

use mission_core::{
    Conditional, DisplayId, Envelope, Frame, Layout, LayoutRegistry, LayoutSource,
};

use super::channel_router::{ChannelContext, ChannelRouter, DispatchOutcome, DropReason};
use super::connections::{Connection, ConnectionId, ConnectionSet};
use super::device_reconciler::{DeviceReconciler, FrameSource, PixelDevice, DEFAULT_FPS};
use super::mode_coordinator::{
    ActiveMode, CurrentMode, ModeBroadcaster, ModeContext, ModeCoordinator, ModeFactory,
    StartupError, SwitchError,
};
use super::system_channels;

/// `MissionControl` behind the timeline lock.
pub type SharedMissionControl = Arc<tokio::sync::Mutex<MissionControl>>;

/// Construction-time settings.
#[derive(Debug, Clone)]
pub struct MissionSettings {
    /// Mode activated at startup; the first registered mode when `None`.
    pub default_mode: Option<String>,
    /// Target frame rate of every device render loop.
    pub fps: u32,
}

impl Default for MissionSettings {
    fn default() -> Self {
        Self {
            default_mode: None,
            fps: DEFAULT_FPS,
        }
    }
}

// ── Render source ─────────────────────────────────────────────────────────────

/// Renders the active mode against the latest layout without touching the
/// timeline lock.
pub struct RenderSource {
    current: CurrentMode,
    layout: Arc<RwLock<Layout>>,
}

impl FrameSource for RenderSource {
    fn render_frame(&self) -> Frame {
        let Some(mode) = self.current.get() else {
            return Frame::new();
        };
        let layout = self
            .layout
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        mode.render(&layout)
    }
}

// ── MissionControl ────────────────────────────────────────────────────────────

pub struct MissionControl {
    router: ChannelRouter,
    coordinator: ModeCoordinator,
    layout: LayoutRegistry,
    connections: Arc<ConnectionSet>,
    reconciler: DeviceReconciler,
    render_source: Arc<RenderSource>,
}

impl MissionControl {
    /// Builds every mode, registers every channel and activates the default
    /// mode.
    ///
    /// # Errors
    ///
    /// - [`StartupError::NoModes`] if `modes` is empty.
    /// - [`StartupError::UnknownDefaultMode`] if the configured default is
    ///   not among `modes`.
    /// - [`StartupError::DuplicateMode`] or [`StartupError::Router`] if two
    ///   registrations clash.
    pub fn new(
        settings: MissionSettings,
        modes: Vec<(String, ModeFactory)>,
    ) -> Result<Self, StartupError> {
        if modes.is_empty() {
            return Err(StartupError::NoModes);
        }

        let active = ActiveMode::new();
        let connections = Arc::new(ConnectionSet::new());

        let built = modes
            .into_iter()
            .map(|(name, factory)| {
                let ctx = ModeContext {
                    name: name.clone(),
                    broadcaster: ModeBroadcaster::new(
                        name.clone(),
                        active.clone(),
                        Arc::clone(&connections),
                    ),
                };
                (name, factory(ctx))
            })
            .collect();
        let mut coordinator = ModeCoordinator::new(built, active.clone())?;

        // ── Channels ──────────────────────────────────────────────────────────
        let mut router = ChannelRouter::new();
        router.register_global(system_channels::ping())?;
        router.register_global(system_channels::mode(coordinator.names()))?;
        router.register_global(system_channels::layout())?;
        for (name, mode) in coordinator.modes() {
            router.register_for_mode(name, mode.channels())?;
        }

        // ── Layout subscribers ────────────────────────────────────────────────
        let mut layout = LayoutRegistry::new();
        let snapshot = Arc::new(RwLock::new(Layout::new()));
        let snap = Arc::clone(&snapshot);
        layout.subscribe(Box::new(move |l: &Layout| {
            *snap.write().unwrap_or_else(PoisonError::into_inner) = l.clone();
        }));

        let conns = Arc::clone(&connections);
        layout.subscribe(Box::new(move |l: &Layout| {
            broadcast_layout(&conns, l);
        }));

        for (name, mode) in coordinator.modes() {
            let active = active.clone();
            let name = name.to_string();
            let mode = Arc::clone(mode);
            Conditional::new(&mut layout, move || active.is(&name))
                .subscribe(Box::new(move |l: &Layout| mode.on_layout_changed(l)));
        }

        // ── Initial mode ──────────────────────────────────────────────────────
        let default = match settings.default_mode {
            Some(name) => name,
            None => coordinator.names().into_iter().next().ok_or(StartupError::NoModes)?,
        };
        coordinator
            .switch_to(&default, layout.layout())
            .map_err(|_| StartupError::UnknownDefaultMode(default.clone()))?;

        let render_source = Arc::new(RenderSource {
            current: coordinator.current_cell(),
            layout: snapshot,
        });
        let reconciler = DeviceReconciler::new(
            Arc::clone(&render_source) as Arc<dyn FrameSource>,
            settings.fps,
        );

        info!(
            modes = ?coordinator.names(),
            active = %default,
            channels = router.len(),
            "mission control ready"
        );

        Ok(Self {
            router,
            coordinator,
            layout,
            connections,
            reconciler,
            render_source,
        })
    }

    // ── Connections ───────────────────────────────────────────────────────────

    /// Admits a connection and sends it the current mode and layout.
    pub fn connect(&mut self, connection: Connection) -> ConnectionId {
        let id = connection.id();
        info!(connection = %id, privilege = ?connection.privilege(), "client connected");

        connection.send_envelope(&Envelope::global(
            system_channels::MODE,
            json!(self.coordinator.active_name()),
        ));
        match serde_json::to_value(self.layout.layout()) {
            Ok(v) => connection.send_envelope(&Envelope::global(system_channels::LAYOUT, v)),
            Err(e) => warn!("failed to encode layout for new connection: {e}"),
        }

        self.connections.insert(connection);
        id
    }

    /// Forgets a connection.  Returns `false` if it was not open.
    pub fn disconnect(&mut self, id: &ConnectionId) -> bool {
        let removed = self.connections.remove(id).is_some();
        if removed {
            info!(connection = %id, "client disconnected");
        }
        removed
    }

    pub fn connections(&self) -> &Arc<ConnectionSet> {
        &self.connections
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    /// Routes one inbound text frame from `from`.
    ///
    /// A `mode` request accepted by the router is carried out before this
    /// returns, still on the timeline.
    pub fn dispatch(&mut self, raw: &str, from: &ConnectionId) -> DispatchOutcome {
        let Some(connection) = self.connections.get(from) else {
            warn!(connection = %from, "dropping message from unknown connection");
            return DispatchOutcome::Dropped(DropReason::UnknownConnection);
        };
        let active = self.coordinator.active_name();

        let (outcome, switch) = {
            let mut ctx = ChannelContext::new(&connection, &self.connections, &mut self.layout);
            let outcome = self.router.dispatch(raw, active.as_deref(), &mut ctx);
            (outcome, ctx.take_switch_request())
        };

        if let Some(name) = switch {
            if let Err(e) = self.switch_mode(&name) {
                warn!("mode switch failed: {e}");
            }
        }
        outcome
    }

    // ── Modes ─────────────────────────────────────────────────────────────────

    /// Switches the active mode and tells every client.
    ///
    /// Switching to the active mode is a no-op and broadcasts nothing.
    ///
    /// # Errors
    ///
    /// [`SwitchError::UnknownMode`] if `name` is not registered.
    pub fn switch_mode(&mut self, name: &str) -> Result<bool, SwitchError> {
        let layout = self.layout.get();
        let switched = self.coordinator.switch_to(name, &layout)?;
        if switched {
            self.connections
                .broadcast(&Envelope::global(system_channels::MODE, json!(name)), None);
        }
        Ok(switched)
    }

    pub fn active_mode(&self) -> Option<String> {
        self.coordinator.active_name()
    }

    pub fn mode_names(&self) -> Vec<String> {
        self.coordinator.names()
    }

    // ── Layout ────────────────────────────────────────────────────────────────

    /// Current layout snapshot.
    pub fn layout(&self) -> Layout {
        self.layout.get()
    }

    /// Direct access to the registry, for callers on the timeline.
    pub fn layout_registry(&mut self) -> &mut LayoutRegistry {
        &mut self.layout
    }

    // ── Devices ───────────────────────────────────────────────────────────────

    /// Binds a discovered device; see [`DeviceReconciler::discover`].
    pub fn discover(&mut self, device: Arc<dyn PixelDevice>) -> DisplayId {
        self.reconciler.discover(device, &mut self.layout)
    }

    /// Stops the render loop for a device that went away.  Its display keeps
    /// its place in the layout and is reused if the device returns.
    pub fn device_lost(&mut self, hardware_id: &str) -> bool {
        self.reconciler.stop(hardware_id)
    }

    pub fn device_count(&self) -> usize {
        self.reconciler.len()
    }

    /// The frame source the render loops read from.
    pub fn render_source(&self) -> Arc<RenderSource> {
        Arc::clone(&self.render_source)
    }

    /// Stops every render loop and the active mode.
    pub fn shutdown(&mut self) {
        self.reconciler.shutdown_all();
        self.coordinator.stop_active();
        info!("mission control stopped");
    }
}

fn broadcast_layout(connections: &ConnectionSet, layout: &Layout) {
    match serde_json::to_value(layout) {
        Ok(v) => {
            connections.broadcast(&Envelope::global(system_channels::LAYOUT, v), None);
        }
        Err(e) => warn!("failed to encode layout: {e}"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
