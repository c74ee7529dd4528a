//! Domain layer: pure business logic with no I/O.
//!
//! - **`display`** – Logical displays (an LED matrix or strip) and their
//!   resolution.
//! - **`layout`** – The arrangement of displays in 2-D space, its bounding box
//!   and normalisation.
//! - **`layout_registry`** – The single mutable, observable owner of the
//!   current layout.
//! - **`frame`** – RGBA pixel buffers and the per-display frame a mode renders.
//! - **`privilege`** – The coarse privilege tag attached to each connection.

pub mod display;
pub mod frame;
pub mod layout;
pub mod layout_registry;
pub mod privilege;
