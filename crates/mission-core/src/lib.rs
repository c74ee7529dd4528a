//! # mission-core
//!
//! Shared library for mission control containing the display and layout
//! domain entities, the observable layout registry, frame buffers, and the
//! wire codecs (JSON envelope for clients, PixelPusher packets for devices).
//!
//! It has zero dependencies on sockets, async runtimes, or OS APIs.
//!
//! # Architecture overview
//!
//! Mission control drives a wall of LED matrices and strips.  Clients connect
//! over a WebSocket and send commands; exactly one "mode" (an activity such as
//! a drawing canvas) owns the displays at any time.  This crate is the shared
//! foundation:
//!
//! - **`domain`** – Pure business logic.  The most important pieces are the
//!   [`Layout`] (where each logical display sits in 2-D space) and the
//!   [`LayoutRegistry`] that owns the current layout and notifies observers
//!   on every change.
//!
//! - **`protocol`** – How bytes travel over the network.  The client-facing
//!   [`Envelope`] is JSON; the device-facing PixelPusher packets are a compact
//!   little-endian binary format.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `mission_core::Layout` instead of `mission_core::domain::layout::Layout`.
pub use domain::display::{DisplayError, DisplayId, DisplayKind, LogicalDisplay, Resolution};
pub use domain::frame::{Frame, FrameError, PixelBuffer};
pub use domain::layout::{Bounds, Layout, LayoutError, Placement, Position, MAX_EXTENT};
pub use domain::layout_registry::{
    Conditional, LayoutHandler, LayoutRegistry, LayoutSource, SubscriptionId,
};
pub use domain::privilege::Privilege;
pub use protocol::envelope::{Envelope, EnvelopeError};
pub use protocol::sequence::SequenceCounter;
