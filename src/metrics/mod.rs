//! Prometheus metrics for capture sessions.
//!
//! The registry implements [`Presenter`](crate::presenter::Presenter), so
//! it is attached to a controller next to the user-facing presenter and
//! counts what that presenter is shown. With the `metrics` feature the
//! registry can be served over HTTP.
//!
//! # Metrics Exposed
//!
//! ## Session Metrics
//! - `cover_scan_session_active` - Whether a device is held (1=active, 0=idle)
//! - `cover_scan_sessions_started_total` - Sessions that reached `Active`
//! - `cover_scan_session_errors_total{reason}` - Errors by reason
//!   (`negotiation`, `timeout`, `device`, `state`)
//!
//! ## Capture Metrics
//! - `cover_scan_captures_total` - Captures that produced an outcome
//! - `cover_scan_outcomes_total{kind}` - Outcomes by kind
//!   (`success`, `unknown_book`, `failure`)
//! - `cover_scan_last_similarity_score` - Score of the latest match
//!
//! # Example
//!
//! ```no_run
//! use cover_scan::identification::{BookMatch, IdentificationOutcome};
//! use cover_scan::metrics::MetricsRegistry;
//! use cover_scan::presenter::Presenter;
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//! registry.outcome(&IdentificationOutcome::Success(BookMatch::new("Dune", 88.0)));
//! assert_eq!(registry.outcomes("success"), 1);
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, ServerError};
