//! Platform capture API abstraction.
//!
//! A [`CaptureBackend`] opens devices for a [`ConstraintProfile`]; the
//! resulting [`CaptureDevice`] is the exclusively owned handle the session
//! controller holds while active. Real hardware, a still image and the
//! test mock all sit behind the same pair of traits.

use super::{ConstraintProfile, FacingMode, Resolution};
use image::RgbImage;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use thiserror::Error;

/// Categories of platform errors the controller distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceErrorKind {
    /// The user or the OS refused access to the camera.
    PermissionDenied,
    /// No device matches the request.
    DeviceNotFound,
    /// The device exists but another client holds it.
    DeviceBusy,
    /// The device cannot satisfy the requested constraints.
    OverconstrainedProfile,
    /// Capture is not allowed from the current context.
    SecurityContextInvalid,
    /// Anything else.
    Other,
}

impl DeviceErrorKind {
    /// Short user-facing description.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "camera permission was denied",
            Self::DeviceNotFound => "no camera device was found",
            Self::DeviceBusy => "the camera is in use by another application",
            Self::OverconstrainedProfile => "the camera does not support the requested settings",
            Self::SecurityContextInvalid => "camera access is not allowed from this context",
            Self::Other => "the camera reported an error",
        }
    }
}

impl fmt::Display for DeviceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Error reported by the platform capture API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct DeviceError {
    /// Error category.
    pub kind: DeviceErrorKind,
    /// Platform detail.
    pub message: String,
}

impl DeviceError {
    /// Creates a device error.
    pub fn new(kind: DeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Settings read from a device once its surface is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSettings {
    /// Facing direction the device reports, if it reports one.
    pub facing: Option<FacingMode>,
    /// Native frame size.
    pub resolution: Resolution,
}

/// Platform capability that opens capture devices.
#[allow(async_fn_in_trait)]
pub trait CaptureBackend {
    /// Handle type produced by [`open`](Self::open).
    type Device: CaptureDevice;

    /// Opens a device honouring `profile`.
    async fn open(&self, profile: &ConstraintProfile) -> Result<Self::Device, DeviceError>;
}

/// An open capture device with a live surface.
#[allow(async_fn_in_trait)]
pub trait CaptureDevice {
    /// Signal that resolves once the live surface delivers frames.
    ///
    /// The returned future does not borrow the device, so the device can
    /// be released while the wait is pending.
    fn ready(&mut self) -> impl Future<Output = Result<(), DeviceError>> + 'static;

    /// Reads the device's current settings.
    fn settings(&self) -> DeviceSettings;

    /// Copies the current frame off the live surface.
    fn snapshot(&mut self) -> Result<RgbImage, DeviceError>;

    /// Stops the stream and releases the device.
    ///
    /// Must be idempotent.
    fn release(&mut self);
}
