//! PixelPusher UDP protocol codec.
//!
//! PixelPusher LED controllers announce themselves by broadcasting a
//! discovery beacon roughly once per second and accept pixel data as UDP
//! packets on a data port.
//!
//! Discovery beacon (all multi-byte integers little-endian):
//!
//! ```text
//! common header, 24 bytes:
//!   [mac:6][ip:4][device_type:1][protocol_version:1][vendor_id:2][product_id:2]
//!   [hw_revision:2][sw_revision:2][link_speed:4]
//! PixelPusher block (device_type == 2), 30 bytes:
//!   [strips_attached:1][max_strips_per_packet:1][pixels_per_strip:2]
//!   [update_period:4][power_total:4][delta_sequence:4][controller_ordinal:4]
//!   [group_ordinal:4][artnet_universe:2][artnet_channel:2][my_port:2]
//! ```
//!
//! Pixel packet:
//!
//! ```text
//! [sequence:4] then up to max_strips_per_packet times [strip_index:1][rgb:3 * pixels_per_strip]
//! ```

use std::net::Ipv4Addr;

use thiserror::Error;

use crate::domain::display::{DisplayError, Resolution};
use crate::domain::frame::PixelBuffer;
use crate::protocol::sequence::SequenceCounter;

/// Size of the header shared by every device type.
pub const COMMON_HEADER_SIZE: usize = 24;

/// Minimum size of a PixelPusher beacon (header + PixelPusher block).
pub const PIXELPUSHER_BEACON_SIZE: usize = COMMON_HEADER_SIZE + 30;

/// `device_type` value identifying a PixelPusher.
pub const DEVICE_TYPE_PIXELPUSHER: u8 = 2;

/// Data port used when a beacon advertises `my_port == 0`.
pub const DEFAULT_DATA_PORT: u16 = 9897;

/// Errors that can occur when decoding a discovery beacon.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The datagram is shorter than the structure it claims to carry.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The beacon came from a device family this server does not drive.
    #[error("unsupported device type: {0}")]
    UnsupportedDeviceType(u8),
}

/// A decoded PixelPusher discovery beacon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryPacket {
    pub mac: [u8; 6],
    pub ip: Ipv4Addr,
    pub protocol_version: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub hw_revision: u16,
    pub sw_revision: u16,
    pub link_speed: u32,
    pub strips_attached: u8,
    pub max_strips_per_packet: u8,
    pub pixels_per_strip: u16,
    pub update_period: u32,
    pub power_total: u32,
    pub delta_sequence: u32,
    pub controller_ordinal: i32,
    pub group_ordinal: i32,
    pub artnet_universe: u16,
    pub artnet_channel: u16,
    pub my_port: u16,
}

impl DiscoveryPacket {
    /// MAC address as lowercase colon-separated hex, e.g. `d8:80:39:66:4b:de`.
    ///
    /// The MAC is the only field that stays the same when a controller
    /// reboots or gets a new DHCP lease, so it is the hardware identity.
    pub fn hardware_id(&self) -> String {
        self.mac
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(":")
    }

    /// UDP port the device accepts pixel packets on.
    pub fn data_port(&self) -> u16 {
        if self.my_port == 0 {
            DEFAULT_DATA_PORT
        } else {
            self.my_port
        }
    }

    /// Pixel dimensions: one row per strip.
    ///
    /// # Errors
    ///
    /// Returns [`DisplayError::ZeroResolution`] for a controller reporting
    /// no strips or zero-length strips.
    pub fn pixel_dimensions(&self) -> Result<Resolution, DisplayError> {
        Resolution::new(u32::from(self.pixels_per_strip), u32::from(self.strips_attached))
    }
}

/// Decodes a discovery beacon.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] for truncated datagrams and
/// [`ProtocolError::UnsupportedDeviceType`] for non-PixelPusher devices.
pub fn decode_discovery(bytes: &[u8]) -> Result<DiscoveryPacket, ProtocolError> {
    require_len(bytes, COMMON_HEADER_SIZE)?;

    let device_type = bytes[10];
    if device_type != DEVICE_TYPE_PIXELPUSHER {
        return Err(ProtocolError::UnsupportedDeviceType(device_type));
    }
    require_len(bytes, PIXELPUSHER_BEACON_SIZE)?;

    let mut mac = [0u8; 6];
    mac.copy_from_slice(&bytes[0..6]);
    let p = COMMON_HEADER_SIZE;

    Ok(DiscoveryPacket {
        mac,
        ip: Ipv4Addr::new(bytes[6], bytes[7], bytes[8], bytes[9]),
        protocol_version: bytes[11],
        vendor_id: read_u16(bytes, 12),
        product_id: read_u16(bytes, 14),
        hw_revision: read_u16(bytes, 16),
        sw_revision: read_u16(bytes, 18),
        link_speed: read_u32(bytes, 20),
        strips_attached: bytes[p],
        max_strips_per_packet: bytes[p + 1],
        pixels_per_strip: read_u16(bytes, p + 2),
        update_period: read_u32(bytes, p + 4),
        power_total: read_u32(bytes, p + 8),
        delta_sequence: read_u32(bytes, p + 12),
        controller_ordinal: read_u32(bytes, p + 16) as i32,
        group_ordinal: read_u32(bytes, p + 20) as i32,
        artnet_universe: read_u16(bytes, p + 24),
        artnet_channel: read_u16(bytes, p + 26),
        my_port: read_u16(bytes, p + 28),
    })
}

/// Splits a display buffer into PixelPusher data packets.
///
/// Row `y` of the buffer drives strip `y`; alpha is dropped.  Each packet
/// takes the next sequence number and carries at most
/// `max_strips_per_packet` strips (a value of 0 is treated as 1).  Strip
/// indices are a single byte, so rows past 255 are not sent.
pub fn encode_pixel_packets(
    sequence: &SequenceCounter,
    buffer: &PixelBuffer,
    max_strips_per_packet: u8,
) -> Vec<Vec<u8>> {
    let per_packet = usize::from(max_strips_per_packet.max(1));
    let strips: Vec<(u8, Vec<u8>)> = buffer
        .rgb_rows()
        .take(usize::from(u8::MAX) + 1)
        .enumerate()
        .map(|(i, row)| (i as u8, row))
        .collect();

    strips
        .chunks(per_packet)
        .map(|chunk| {
            let body: usize = chunk.iter().map(|(_, row)| 1 + row.len()).sum();
            let mut packet = Vec::with_capacity(4 + body);
            packet.extend_from_slice(&sequence.next().to_le_bytes());
            for (index, row) in chunk {
                packet.push(*index);
                packet.extend_from_slice(row);
            }
            packet
        })
        .collect()
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn require_len(bytes: &[u8], needed: usize) -> Result<(), ProtocolError> {
    if bytes.len() < needed {
        return Err(ProtocolError::InsufficientData {
            needed,
            available: bytes.len(),
        });
    }
    Ok(())
}

// Callers check the length first.
fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

// ── Tests ─────────────────────────────────────────────────────────────────────
