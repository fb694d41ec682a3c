//! Still frame taken from the live surface, ready for transport.

use chrono::{DateTime, Utc};

/// One encoded still frame.
///
/// Width and height are the device's reported resolution at the moment
/// of capture. The frame is consumed by the identification call and not
/// retained afterwards.
#[derive(Clone)]
pub struct CapturedFrame {
    /// Compressed image bytes.
    encoded: Vec<u8>,
    /// Frame width in pixels.
    width: u32,
    /// Frame height in pixels.
    height: u32,
    /// Capture timestamp.
    captured_at: DateTime<Utc>,
}

impl CapturedFrame {
    /// Creates a frame from already encoded bytes.
    pub fn new(encoded: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            encoded,
            width,
            height,
            captured_at: Utc::now(),
        }
    }

    /// Returns the encoded bytes.
    #[inline]
    pub fn encoded_bytes(&self) -> &[u8] {
        &self.encoded
    }

    /// Returns the frame width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the frame height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the capture timestamp.
    #[inline]
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Returns true if the frame carries no image data.
    pub fn is_empty(&self) -> bool {
        self.encoded.is_empty() || self.width == 0 || self.height == 0
    }

    /// Consumes the frame, yielding the transport payload.
    pub fn into_bytes(self) -> Vec<u8> {
        self.encoded
    }
}

impl std::fmt::Debug for CapturedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("encoded_bytes", &self.encoded.len())
            .field("captured_at", &self.captured_at)
            .finish()
    }
}
