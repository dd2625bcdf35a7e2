//! Packets: immutable units of decoded media.
//!
//! A packet is produced once by a [`PacketSource`](crate::source::PacketSource)
//! and never mutated afterwards. The payload is a [`Bytes`] buffer, so
//! handing a packet to several holders (the prefetch window, the
//! "last served" slots, the caller) only bumps a reference count.

use bytes::Bytes;

/// Label written into ground-truth masks for pixels outside the evaluated region.
pub const OUT_OF_SCOPE_VALUE: u8 = 85;

/// Label written into ground-truth masks for pixels with unknown classification.
pub const UNKNOWN_VALUE: u8 = 170;

/// Label written into ground-truth masks for shadow pixels.
pub const SHADOW_VALUE: u8 = 50;

/// Pixel layout of a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameGeometry {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Interleaved channels per pixel (1 = gray, 3 = RGB, 4 = RGBA).
    pub channels: u8,
}

impl FrameGeometry {
    /// Create a new geometry.
    pub fn new(width: u32, height: u32, channels: u8) -> Self {
        Self {
            width,
            height,
            channels,
        }
    }

    /// Number of pixels in one frame.
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Size in bytes of one frame with this geometry.
    pub fn byte_len(&self) -> usize {
        self.area() * self.channels as usize
    }
}

/// One decoded frame or image.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Packet {
    data: Bytes,
    geometry: Option<FrameGeometry>,
}

impl Packet {
    /// Wrap raw bytes with no known geometry.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            geometry: None,
        }
    }

    /// Wrap a decoded frame.
    pub fn with_geometry(data: impl Into<Bytes>, geometry: FrameGeometry) -> Self {
        Self {
            data: data.into(),
            geometry: Some(geometry),
        }
    }

    /// A frame filled with a single value (used for placeholder ground truth).
    pub fn filled(geometry: FrameGeometry, value: u8) -> Self {
        Self::with_geometry(vec![value; geometry.byte_len()], geometry)
    }

    /// An empty packet.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The payload.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Frame geometry, if the source knows it.
    pub fn geometry(&self) -> Option<FrameGeometry> {
        self.geometry
    }

    /// Payload size in bytes.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// True when the packet carries no data.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_byte_len() {
        let geometry = FrameGeometry::new(320, 240, 3);
        assert_eq!(geometry.area(), 76_800);
        assert_eq!(geometry.byte_len(), 230_400);
    }

    #[test]
    fn test_filled_packet_matches_geometry() {
        let geometry = FrameGeometry::new(4, 2, 1);
        let packet = Packet::filled(geometry, OUT_OF_SCOPE_VALUE);

        assert_eq!(packet.byte_len(), 8);
        assert!(packet.data().iter().all(|&b| b == OUT_OF_SCOPE_VALUE));
        assert_eq!(packet.geometry(), Some(geometry));
    }

    #[test]
    fn test_clone_shares_payload() {
        let packet = Packet::new(vec![1u8, 2, 3]);
        let clone = packet.clone();

        assert_eq!(packet.data().as_ptr(), clone.data().as_ptr());
    }

    #[test]
    fn test_empty_packet() {
        let packet = Packet::empty();
        assert!(packet.is_empty());
        assert_eq!(packet.byte_len(), 0);
        assert_eq!(packet.geometry(), None);
    }
}
