//! Wire formats.
//!
//! - **`envelope`** – the JSON envelope exchanged with WebSocket clients.
//! - **`pixelpusher`** – the binary UDP protocol spoken by PixelPusher LED
//!   controllers (discovery beacons in, pixel packets out).
//! - **`sequence`** – the packet sequence counter used by the pixel sender.

pub mod envelope;
pub mod pixelpusher;
pub mod sequence;

pub use envelope::{Envelope, EnvelopeError};
pub use pixelpusher::{decode_discovery, encode_pixel_packets, DiscoveryPacket, ProtocolError};
pub use sequence::SequenceCounter;
