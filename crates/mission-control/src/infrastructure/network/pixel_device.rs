//! `PixelPusherDevice`: a [`PixelDevice`] that streams pixels over UDP.
//!
//! One device owns one ephemeral UDP socket and its own packet sequence
//! counter.  Every push encodes the buffer into as many packets as the
//! controller's `max_strips_per_packet` requires and sends them back to back.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::debug;

use mission_core::protocol::{encode_pixel_packets, DiscoveryPacket};
use mission_core::{PixelBuffer, Resolution, SequenceCounter};

use crate::application::device_reconciler::{DeviceError, PixelDevice};

pub struct PixelPusherDevice {
    hardware_id: String,
    dimensions: Resolution,
    target: SocketAddr,
    max_strips_per_packet: u8,
    socket: UdpSocket,
    sequence: SequenceCounter,
    stopped: AtomicBool,
}

impl PixelPusherDevice {
    /// Opens an ephemeral UDP socket for the controller described by
    /// `packet`.
    ///
    /// # Errors
    ///
    /// [`DeviceError::Dimensions`] if the controller reports zero strips or
    /// zero-length strips, [`DeviceError::Io`] if the socket cannot be bound.
    pub async fn connect(packet: &DiscoveryPacket) -> Result<Self, DeviceError> {
        let dimensions = packet.pixel_dimensions()?;
        let socket = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], 0))).await?;
        Ok(Self {
            hardware_id: packet.hardware_id(),
            dimensions,
            target: SocketAddr::from((packet.ip, packet.data_port())),
            max_strips_per_packet: packet.max_strips_per_packet,
            socket,
            sequence: SequenceCounter::new(),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

#[async_trait]
impl PixelDevice for PixelPusherDevice {
    fn hardware_id(&self) -> &str {
        &self.hardware_id
    }

    fn pixel_dimensions(&self) -> Resolution {
        self.dimensions
    }

    async fn push_buffer(&self, buffer: &PixelBuffer) -> Result<(), DeviceError> {
        if self.stopped.load(Ordering::Relaxed) {
            return Err(DeviceError::Stopped);
        }
        for packet in encode_pixel_packets(&self.sequence, buffer, self.max_strips_per_packet) {
            self.socket.send_to(&packet, self.target).await?;
        }
        Ok(())
    }

    fn stop_pushing(&self) {
        if !self.stopped.swap(true, Ordering::Relaxed) {
            debug!(hardware_id = %self.hardware_id, "device released");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use tokio::time::timeout;

    fn packet(strips: u8, pixels: u16, max_per_packet: u8, port: u16) -> DiscoveryPacket {
        DiscoveryPacket {
            mac: [0xd8, 0x80, 0x39, 0x66, 0x4b, 0xde],
            ip: Ipv4Addr::LOCALHOST,
            protocol_version: 1,
            vendor_id: 2,
            product_id: 1,
            hw_revision: 3,
            sw_revision: 122,
            link_speed: 100_000_000,
            strips_attached: strips,
            max_strips_per_packet: max_per_packet,
            pixels_per_strip: pixels,
            update_period: 1000,
            power_total: 0,
            delta_sequence: 0,
            controller_ordinal: 0,
            group_ordinal: 0,
            artnet_universe: 0,
            artnet_channel: 0,
            my_port: port,
        }
    }

    #[tokio::test]
    async fn test_connect_takes_identity_from_beacon() {
        let device = PixelPusherDevice::connect(&packet(8, 64, 2, 0)).await.unwrap();

        assert_eq!(device.hardware_id(), "d8:80:39:66:4b:de");
        assert_eq!(device.pixel_dimensions(), Resolution::new(64, 8).unwrap());
        assert_eq!(device.target().port(), 9897);
    }

    #[tokio::test]
    async fn test_connect_rejects_zero_strips() {
        let result = PixelPusherDevice::connect(&packet(0, 64, 2, 0)).await;
        assert!(matches!(result, Err(DeviceError::Dimensions(_))));
    }

    #[tokio::test]
    async fn test_push_sends_strips_to_data_port() {
        // Arrange: a fake controller listening on localhost
        let controller = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = controller.local_addr().unwrap().port();
        let device = PixelPusherDevice::connect(&packet(2, 2, 2, port)).await.unwrap();
        let mut buffer = PixelBuffer::new(Resolution::new(2, 2).unwrap());
        buffer.put_pixel(1, 1, [10, 20, 30, 255]);

        // Act
        device.push_buffer(&buffer).await.unwrap();

        // Assert
        let mut buf = [0u8; 64];
        let (len, _) = timeout(Duration::from_secs(2), controller.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            &buf[..len],
            &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 10, 20, 30]
        );
    }

    #[tokio::test]
    async fn test_push_after_stop_fails() {
        let device = PixelPusherDevice::connect(&packet(1, 1, 1, 0)).await.unwrap();
        device.stop_pushing();

        let result = device.push_buffer(&PixelBuffer::new(Resolution::new(1, 1).unwrap())).await;

        assert!(matches!(result, Err(DeviceError::Stopped)));
    }
}
