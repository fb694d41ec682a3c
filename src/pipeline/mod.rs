//! Still-frame capture and encoding.
//!
//! The pipeline copies one frame off the active device at the size the
//! device currently reports, then JPEG-encodes it for transport. Encoding
//! runs on the blocking pool so the cooperative flow is only suspended,
//! never stalled.

use crate::capture::{CaptureDevice, CapturedFrame, DeviceError, Resolution};
use crate::session::{CaptureSession, SessionState};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;
use thiserror::Error;

/// Default JPEG quality, 0.8 of maximum.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Errors that can occur while producing a frame.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("no active capture device")]
    NoActiveDevice,

    #[error("device reported an empty frame size")]
    EmptyFrame,

    #[error("snapshot failed: {0}")]
    Device(#[from] DeviceError),

    #[error("failed to encode frame: {0}")]
    Encode(String),
}

/// Pixels copied off the live surface, not yet encoded.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pixels: RgbImage,
}

impl RawFrame {
    /// Frame size in pixels.
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.pixels.width(), self.pixels.height())
    }
}

/// Produces encoded still frames from the active device.
#[derive(Debug, Clone, Copy)]
pub struct FrameCapturePipeline {
    quality: u8,
}

impl FrameCapturePipeline {
    /// Creates a pipeline encoding at `quality` (clamped to 1-100).
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    /// JPEG quality in use.
    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Copies one frame off the session's device.
    ///
    /// The buffer has exactly the resolution the device reports right now;
    /// a delivered frame of another size is rescaled to it.
    pub fn snapshot<D: CaptureDevice>(
        &self,
        session: &mut CaptureSession<D>,
    ) -> Result<RawFrame, PipelineError> {
        if session.state() != SessionState::Active {
            return Err(PipelineError::NoActiveDevice);
        }
        let device = session.device_mut().ok_or(PipelineError::NoActiveDevice)?;

        let reported = device.settings().resolution;
        if reported.is_empty() {
            return Err(PipelineError::EmptyFrame);
        }

        let mut pixels = device.snapshot()?;
        if pixels.dimensions() != (reported.width, reported.height) {
            tracing::trace!(
                from = ?pixels.dimensions(),
                to = %reported,
                "Rescaling frame to reported size"
            );
            pixels = imageops::resize(&pixels, reported.width, reported.height, FilterType::Triangle);
        }

        Ok(RawFrame { pixels })
    }

    /// Encodes a raw frame to JPEG.
    pub async fn encode(&self, raw: RawFrame) -> Result<CapturedFrame, PipelineError> {
        let quality = self.quality;
        tokio::task::spawn_blocking(move || encode_jpeg(&raw.pixels, quality))
            .await
            .map_err(|e| PipelineError::Encode(e.to_string()))?
    }

    /// Snapshots and encodes in one step.
    pub async fn capture<D: CaptureDevice>(
        &self,
        session: &mut CaptureSession<D>,
    ) -> Result<CapturedFrame, PipelineError> {
        let raw = self.snapshot(session)?;
        self.encode(raw).await
    }
}

impl Default for FrameCapturePipeline {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

fn encode_jpeg(pixels: &RgbImage, quality: u8) -> Result<CapturedFrame, PipelineError> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(pixels)
        .map_err(|e| PipelineError::Encode(e.to_string()))?;

    tracing::trace!(
        width = pixels.width(),
        height = pixels.height(),
        bytes = buffer.len(),
        "Encoded frame"
    );
    Ok(CapturedFrame::new(buffer, pixels.width(), pixels.height()))
}
