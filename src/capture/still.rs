//! A still image file presented as a capture device.
//!
//! Lets the full session flow run without camera hardware: the image is
//! decoded on open and served as every frame. The device reports the
//! image's own resolution, so hard size constraints that differ from it
//! are rejected like an overconstrained camera would reject them.

use super::{
    CaptureBackend, CaptureDevice, ConstraintProfile, DeviceError, DeviceErrorKind,
    DeviceSettings, Resolution,
};
use image::RgbImage;
use std::future::Future;
use std::path::PathBuf;

/// Backend that opens a still image file.
#[derive(Debug, Clone)]
pub struct StillImageBackend {
    path: PathBuf,
}

impl StillImageBackend {
    /// Creates a backend serving the image at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CaptureBackend for StillImageBackend {
    type Device = StillImageDevice;

    async fn open(&self, profile: &ConstraintProfile) -> Result<StillImageDevice, DeviceError> {
        let path = self.path.clone();
        let decoded = tokio::task::spawn_blocking(move || image::open(&path))
            .await
            .map_err(|e| DeviceError::new(DeviceErrorKind::Other, e.to_string()))?;

        let image = match decoded {
            Ok(image) => image.to_rgb8(),
            Err(image::ImageError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DeviceError::new(
                    DeviceErrorKind::DeviceNotFound,
                    format!("{}: {}", self.path.display(), e),
                ));
            }
            Err(image::ImageError::IoError(e))
                if e.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                return Err(DeviceError::new(
                    DeviceErrorKind::PermissionDenied,
                    format!("{}: {}", self.path.display(), e),
                ));
            }
            Err(e) => {
                return Err(DeviceError::new(
                    DeviceErrorKind::Other,
                    format!("{}: {}", self.path.display(), e),
                ));
            }
        };

        let resolution = Resolution::new(image.width(), image.height());
        if let Some(exact) = profile.exact {
            if exact != resolution {
                return Err(DeviceError::new(
                    DeviceErrorKind::OverconstrainedProfile,
                    format!("image is {resolution}, profile requires {exact}"),
                ));
            }
        }

        tracing::debug!(path = %self.path.display(), %resolution, "Opened still image device");
        Ok(StillImageDevice {
            image: Some(image),
            resolution,
        })
    }
}

/// Device serving a decoded still image.
#[derive(Debug)]
pub struct StillImageDevice {
    image: Option<RgbImage>,
    resolution: Resolution,
}

impl CaptureDevice for StillImageDevice {
    fn ready(&mut self) -> impl Future<Output = Result<(), DeviceError>> + 'static {
        // Decoded on open, so always ready.
        std::future::ready(Ok(()))
    }

    fn settings(&self) -> DeviceSettings {
        DeviceSettings {
            facing: None,
            resolution: self.resolution,
        }
    }

    fn snapshot(&mut self) -> Result<RgbImage, DeviceError> {
        self.image
            .clone()
            .ok_or_else(|| DeviceError::new(DeviceErrorKind::Other, "device released"))
    }

    fn release(&mut self) {
        self.image = None;
    }
}
