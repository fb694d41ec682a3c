//! Capture devices, profiles and frames.
//!
//! This module defines the platform capture API the session controller
//! consumes, the profiles it negotiates with, and the still frames it
//! produces. Backends for a still image file, a scriptable mock and (with
//! the `camera` feature) real webcams live here too.

mod config;
mod device;
mod frame;
mod mock;
#[cfg(feature = "camera")]
mod native;
mod profile;
mod still;

pub use config::{
    CaptureConfig, ConfigError, IdentificationConfig, OutputConfig, ScannerConfig,
    MAX_UPLOAD_BYTES,
};
pub use device::{
    CaptureBackend, CaptureDevice, DeviceError, DeviceErrorKind, DeviceSettings,
};
pub use frame::CapturedFrame;
pub use mock::{MockBackend, MockDevice, Readiness};
#[cfg(feature = "camera")]
pub use native::{NokhwaBackend, NokhwaDevice};
pub use profile::{default_profiles, ConstraintProfile, FacingMode, NegotiatedProfile, Resolution};
pub use still::{StillImageBackend, StillImageDevice};
