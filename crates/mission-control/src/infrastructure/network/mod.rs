//! Network infrastructure facing the LED controllers.
//!
//! # Sub-modules
//!
//! - **`discovery`** – Listens for PixelPusher beacons on UDP and reports
//!   controllers that appear, reappear at a new address, or go quiet.
//!
//! - **`pixel_device`** – `PixelPusherDevice`, the UDP implementation of the
//!   application's `PixelDevice` trait.

pub mod discovery;
pub mod pixel_device;
