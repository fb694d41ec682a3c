//! Book Cover Scanning Library
//!
//! Drives a camera through a single capture session, grabs still frames of
//! a book cover and has a remote recognition service identify them.
//!
//! # Architecture
//!
//! The system follows an explicit data flow:
//!
//! ```text
//! negotiation → session → pipeline → identification → presenter
//!                  ↑          ↓
//!               capture (device backends)
//! ```
//!
//! # Design Principles
//!
//! - **One device at a time**: the session owns the only live handle
//! - **Fail soft**: identification problems are outcomes, not errors
//! - **Single-threaded**: operations interleave only at await points
//! - **No retries**: a failed identification is retried by capturing again
//!
//! # Example
//!
//! ```no_run
//! use cover_scan::{
//!     capture::{MockBackend, ScannerConfig},
//!     identification::IdentificationClient,
//!     presenter::LogPresenter,
//!     session::CaptureSessionController,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ScannerConfig::default();
//! let client = IdentificationClient::new(config.identification.clone())?;
//! let controller =
//!     CaptureSessionController::from_config(MockBackend::new(), client, LogPresenter, &config.capture);
//!
//! controller.start().await?;
//! if let Some(outcome) = controller.capture().await? {
//!     println!("{outcome}");
//! }
//! controller.stop();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod identification;
pub mod metrics;
pub mod negotiation;
pub mod pipeline;
pub mod presenter;
pub mod session;

// Re-export commonly used types at crate root
pub use capture::{
    CaptureBackend, CaptureDevice, CapturedFrame, ConstraintProfile, MockBackend, ScannerConfig,
};
pub use identification::{BookMatch, ConfidenceTier, IdentificationClient, IdentificationOutcome};
pub use negotiation::ConstraintNegotiator;
pub use pipeline::FrameCapturePipeline;
pub use presenter::{LogPresenter, Presenter};
pub use session::{CaptureSessionController, SessionError, SessionEvent, SessionState};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
