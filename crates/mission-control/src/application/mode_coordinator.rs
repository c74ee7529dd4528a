//! Mode coordinator: the single-active-mode state machine.
//!
//! # Lifecycle (for beginners)
//!
//! ```text
//!            start(layout)
//!  dormant ───────────────► active
//!     ▲                        │
//!     └────────── stop() ──────┘
//! ```
//!
//! Exactly one registered mode is active at a time.  [`ModeCoordinator::switch_to`]
//! performs the transition in three strictly ordered steps:
//!
//! 1. `old.stop()`: the active-mode cell is cleared first, so anything that
//!    checks liveness while the old mode shuts down sees "no mode".
//! 2. The active-mode cell is set to the new mode's name.
//! 3. `new.start(layout)`.
//!
//! The coordinator is only ever driven from the dispatch timeline (see
//! `mission_control`), so two switches can never interleave.
//!
//! Modes talk to clients through a [`ModeBroadcaster`], which tags every
//! envelope with the mode's name and silently drops the call if that mode is
//! not active at the moment of the call.  A timer left running in a dormant
//! mode therefore cannot leak messages.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use mission_core::{Envelope, Frame, Layout};

use super::channel_router::{ChannelSpec, RouterError};
use super::connections::{BroadcastReport, ConnectionId, ConnectionSet};

// ── Mode contract ─────────────────────────────────────────────────────────────

/// An exclusive, switchable activity that owns rendering while active.
///
/// All methods take `&self`: every device render loop calls [`render`]
/// concurrently, so a mode guards its own state internally.
///
/// [`render`]: Mode::render
pub trait Mode: Send + Sync {
    /// Called when the mode becomes active.
    fn start(&self, layout: &Layout);

    /// Called when the mode is switched away from.  Must cancel every timer
    /// or task the mode started; no broadcast may happen after it returns.
    fn stop(&self);

    /// Renders one frame for the given layout.
    fn render(&self, layout: &Layout) -> Frame;

    /// The channels this mode serves while active.
    fn channels(&self) -> Vec<ChannelSpec>;

    /// Called on every layout change while this mode is active.
    fn on_layout_changed(&self, _layout: &Layout) {}
}

/// Builds a mode once its context is known.
pub type ModeFactory = Box<dyn FnOnce(ModeContext) -> Arc<dyn Mode> + Send>;

/// What a mode receives at construction.
pub struct ModeContext {
    pub name: String,
    pub broadcaster: ModeBroadcaster,
}

// ── Shared cells ──────────────────────────────────────────────────────────────

/// Name of the active mode, shared with broadcasters and layout filters.
#[derive(Clone, Default)]
pub struct ActiveMode(Arc<RwLock<Option<String>>>);

impl ActiveMode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<String> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Returns `true` if `name` is the active mode right now.
    pub fn is(&self, name: &str) -> bool {
        self.0.read().unwrap_or_else(PoisonError::into_inner).as_deref() == Some(name)
    }

    fn set(&self, name: Option<String>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = name;
    }
}

impl fmt::Debug for ActiveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ActiveMode").field(&self.get()).finish()
    }
}

/// Handle to the active mode object, read by the render source.
#[derive(Clone, Default)]
pub struct CurrentMode(Arc<RwLock<Option<Arc<dyn Mode>>>>);

impl CurrentMode {
    pub fn get(&self) -> Option<Arc<dyn Mode>> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set(&self, mode: Option<Arc<dyn Mode>>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = mode;
    }
}

// ── Broadcaster ───────────────────────────────────────────────────────────────

/// A mode's outbound voice.  Every envelope is tagged with the mode's name.
#[derive(Clone)]
pub struct ModeBroadcaster {
    mode: String,
    active: ActiveMode,
    connections: Arc<ConnectionSet>,
}

impl ModeBroadcaster {
    pub fn new(mode: impl Into<String>, active: ActiveMode, connections: Arc<ConnectionSet>) -> Self {
        Self {
            mode: mode.into(),
            active,
            connections,
        }
    }

    /// Sends to every open connection.
    pub fn broadcast(&self, channel: &str, message: Value) -> BroadcastReport {
        self.send(channel, message, None)
    }

    /// Sends only to the connections in `only_to`.
    pub fn send_to(
        &self,
        channel: &str,
        message: Value,
        only_to: &HashSet<ConnectionId>,
    ) -> BroadcastReport {
        self.send(channel, message, Some(only_to))
    }

    fn send(
        &self,
        channel: &str,
        message: Value,
        only_to: Option<&HashSet<ConnectionId>>,
    ) -> BroadcastReport {
        if !self.active.is(&self.mode) {
            debug!(mode = %self.mode, channel, "swallowing broadcast from inactive mode");
            return BroadcastReport::default();
        }
        self.connections
            .broadcast(&Envelope::for_mode(self.mode.as_str(), channel, message), only_to)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Fatal errors while assembling the system.  The server must not start.
#[derive(Debug, Error, PartialEq)]
pub enum StartupError {
    #[error("no modes registered")]
    NoModes,

    #[error("default mode {0:?} is not registered")]
    UnknownDefaultMode(String),

    #[error("mode {0:?} registered twice")]
    DuplicateMode(String),

    #[error("unknown built-in mode {0:?}")]
    UnknownBuiltinMode(String),

    #[error(transparent)]
    Router(#[from] RouterError),
}

/// Errors from a mode switch request.
#[derive(Debug, Error, PartialEq)]
pub enum SwitchError {
    #[error("mode {0:?} is not registered")]
    UnknownMode(String),
}

// ── Coordinator ───────────────────────────────────────────────────────────────

/// Owner of the registered modes and of the single-active-mode invariant.
pub struct ModeCoordinator {
    modes: Vec<(String, Arc<dyn Mode>)>,
    active: ActiveMode,
    current: CurrentMode,
}

impl ModeCoordinator {
    /// Creates a coordinator with every mode dormant.
    ///
    /// # Errors
    ///
    /// [`StartupError::NoModes`] for an empty list and
    /// [`StartupError::DuplicateMode`] for a repeated name.
    pub fn new(modes: Vec<(String, Arc<dyn Mode>)>, active: ActiveMode) -> Result<Self, StartupError> {
        if modes.is_empty() {
            return Err(StartupError::NoModes);
        }
        for (i, (name, _)) in modes.iter().enumerate() {
            if modes[..i].iter().any(|(n, _)| n == name) {
                return Err(StartupError::DuplicateMode(name.clone()));
            }
        }
        Ok(Self {
            modes,
            active,
            current: CurrentMode::default(),
        })
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn Mode>> {
        self.modes.iter().find(|(n, _)| n == name).map(|(_, m)| m)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Registered mode names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.modes.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Registered modes in registration order.
    pub fn modes(&self) -> impl Iterator<Item = (&str, &Arc<dyn Mode>)> {
        self.modes.iter().map(|(n, m)| (n.as_str(), m))
    }

    pub fn active_name(&self) -> Option<String> {
        self.active.get()
    }

    pub fn active_cell(&self) -> ActiveMode {
        self.active.clone()
    }

    pub fn current_cell(&self) -> CurrentMode {
        self.current.clone()
    }

    /// Activates `name`.  If another mode is active it is stopped first.
    ///
    /// Returns `Ok(false)` without touching anything if `name` is already
    /// active.
    ///
    /// # Errors
    ///
    /// [`SwitchError::UnknownMode`] if `name` is not registered; the current
    /// mode stays active.
    pub fn switch_to(&mut self, name: &str, layout: &Layout) -> Result<bool, SwitchError> {
        let next = self
            .find(name)
            .cloned()
            .ok_or_else(|| SwitchError::UnknownMode(name.to_string()))?;

        let previous = self.active.get();
        if previous.as_deref() == Some(name) {
            debug!(mode = name, "switch ignored: mode already active");
            return Ok(false);
        }

        // Step 1: stop the old mode with no mode marked active.
        self.active.set(None);
        if let Some(old) = self.current.get() {
            old.stop();
        }
        self.current.set(None);

        // Step 2 and 3.
        self.active.set(Some(name.to_string()));
        self.current.set(Some(Arc::clone(&next)));
        next.start(layout);

        info!(
            from = previous.as_deref().unwrap_or("<none>"),
            to = name,
            "mode switched"
        );
        Ok(true)
    }

    /// Stops the active mode, leaving every mode dormant.
    pub fn stop_active(&mut self) {
        self.active.set(None);
        if let Some(old) = self.current.get() {
            old.stop();
        }
        self.current.set(None);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
