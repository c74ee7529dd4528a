//! Application layer: routing, mode switching and device binding.
//!
//! # What lives here? (for beginners)
//!
//! This layer sits between the pure domain in `mission_core` and the
//! sockets in `infrastructure`.  It depends only on traits
//! ([`connections::ConnectionSink`], [`device_reconciler::PixelDevice`]) so
//! every use case can be exercised in unit tests without a network.
//!
//! # Sub-modules
//!
//! - **`connections`** – The set of open client connections and fan-out.
//! - **`channel_router`** – Turns an inbound envelope into a handler call,
//!   after privilege and mode-liveness checks.
//! - **`system_channels`** – The always-present `ping`, `mode` and `layout`
//!   channels.
//! - **`mode_coordinator`** – The single-active-mode state machine and the
//!   per-mode broadcaster.
//! - **`device_reconciler`** – Hardware id to logical display bindings and
//!   the per-device render loops.
//! - **`mission_control`** – Wires all of the above into one timeline.

pub mod channel_router;
pub mod connections;
pub mod device_reconciler;
pub mod mission_control;
pub mod mode_coordinator;
pub mod system_channels;
