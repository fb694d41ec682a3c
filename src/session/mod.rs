//! The capture session and its controller.
//!
//! One [`CaptureSession`] value is owned by the
//! [`CaptureSessionController`]; nothing else reads or mutates the device
//! handle it holds.
//!
//! ```text
//!   Idle --start--> Acquiring --ready--> Active --capture--> Capturing
//!    ^                  |                  ^  |                  |
//!    |   fail/timeout   |                  |  +---- outcome -----+
//!    +------------------+                  |
//!    +<------------- stop (any state) -----+---- Error <-- runtime fault
//! ```
//!
//! # Example
//!
//! ```no_run
//! use cover_scan::capture::{IdentificationConfig, MockBackend};
//! use cover_scan::identification::IdentificationClient;
//! use cover_scan::presenter::LogPresenter;
//! use cover_scan::session::CaptureSessionController;
//!
//! # async fn run() {
//! let client = IdentificationClient::new(IdentificationConfig::default()).unwrap();
//! let controller = CaptureSessionController::new(MockBackend::new(), client, LogPresenter);
//!
//! controller.start().await.unwrap();
//! if let Ok(Some(outcome)) = controller.capture().await {
//!     println!("{outcome}");
//! }
//! controller.stop();
//! # }
//! ```

mod controller;
mod state;

pub use controller::{CaptureSessionController, DEFAULT_READY_TIMEOUT};
pub use state::{CaptureSession, SessionState};

use crate::capture::{DeviceError, DeviceErrorKind, DeviceSettings, NegotiatedProfile};
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by session operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("no camera configuration was accepted")]
    NegotiationFailed,

    #[error("camera did not become ready within {}s", .0.as_secs())]
    AcquisitionTimeout(Duration),

    #[error("{0}")]
    DeviceFault(DeviceError),

    #[error("no active capture device")]
    NoActiveDevice,

    #[error("capture session has faulted and must be stopped first")]
    Faulted,
}

impl SessionError {
    /// Platform error category, for device faults.
    pub fn device_kind(&self) -> Option<DeviceErrorKind> {
        match self {
            Self::DeviceFault(e) => Some(e.kind),
            _ => None,
        }
    }
}

/// State-change notification for the presenter.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The session is idle and holds no device.
    Idle,
    /// A device is open and ready.
    Active {
        /// The profile the device was opened with.
        profile: NegotiatedProfile,
        /// Settings read once the device became ready.
        settings: DeviceSettings,
    },
    /// Something went wrong; the message is user-visible.
    Error(SessionError),
}
