//! Metrics collection and registry.

use crate::identification::IdentificationOutcome;
use crate::presenter::Presenter;
use crate::session::{SessionError, SessionEvent};
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Prometheus metrics registry for capture sessions.
///
/// Fed as a [`Presenter`], so it sees exactly what the user sees.
pub struct MetricsRegistry {
    registry: Registry,

    // Session metrics
    session_active: IntGauge,
    sessions_started: IntCounter,
    session_errors: IntCounterVec,

    // Capture metrics
    captures_total: IntCounter,
    outcomes_total: IntCounterVec,
    last_similarity: Gauge,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all session metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let session_active = IntGauge::new(
            "cover_scan_session_active",
            "Whether a capture device is currently held (1=active, 0=idle)",
        )?;
        let sessions_started = IntCounter::new(
            "cover_scan_sessions_started_total",
            "Capture sessions that reached the active state",
        )?;
        let session_errors = IntCounterVec::new(
            Opts::new("cover_scan_session_errors_total", "Session errors by reason"),
            &["reason"],
        )?;

        let captures_total = IntCounter::new(
            "cover_scan_captures_total",
            "Captures that produced an identification outcome",
        )?;
        let outcomes_total = IntCounterVec::new(
            Opts::new("cover_scan_outcomes_total", "Identification outcomes by kind"),
            &["kind"],
        )?;
        let last_similarity = Gauge::new(
            "cover_scan_last_similarity_score",
            "Similarity score of the most recent successful match",
        )?;

        registry.register(Box::new(session_active.clone()))?;
        registry.register(Box::new(sessions_started.clone()))?;
        registry.register(Box::new(session_errors.clone()))?;
        registry.register(Box::new(captures_total.clone()))?;
        registry.register(Box::new(outcomes_total.clone()))?;
        registry.register(Box::new(last_similarity.clone()))?;

        // Pre-create label sets so every series shows up at zero
        for kind in ["success", "unknown_book", "failure"] {
            outcomes_total.with_label_values(&[kind]);
        }
        for reason in ["negotiation", "timeout", "device", "state"] {
            session_errors.with_label_values(&[reason]);
        }

        Ok(Self {
            registry,
            session_active,
            sessions_started,
            session_errors,
            captures_total,
            outcomes_total,
            last_similarity,
        })
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Returns true while a capture device is held.
    pub fn session_active(&self) -> bool {
        self.session_active.get() == 1
    }

    /// Number of captures recorded so far.
    pub fn captures(&self) -> u64 {
        self.captures_total.get()
    }

    /// Number of outcomes of the given kind (`success`, `unknown_book`, `failure`).
    pub fn outcomes(&self, kind: &str) -> u64 {
        self.outcomes_total.with_label_values(&[kind]).get()
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn error_reason(error: &SessionError) -> &'static str {
    match error {
        SessionError::NegotiationFailed => "negotiation",
        SessionError::AcquisitionTimeout(_) => "timeout",
        SessionError::DeviceFault(_) => "device",
        SessionError::NoActiveDevice | SessionError::Faulted => "state",
    }
}

impl Presenter for MetricsRegistry {
    fn session_changed(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Idle => self.session_active.set(0),
            SessionEvent::Active { .. } => {
                self.session_active.set(1);
                self.sessions_started.inc();
            }
            SessionEvent::Error(error) => {
                self.session_active.set(0);
                self.session_errors
                    .with_label_values(&[error_reason(error)])
                    .inc();
            }
        }
    }

    fn outcome(&self, outcome: &IdentificationOutcome) {
        self.captures_total.inc();
        self.outcomes_total
            .with_label_values(&[outcome.kind()])
            .inc();
        if let IdentificationOutcome::Success(book) = outcome {
            self.last_similarity.set(book.similarity_score);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{
        ConstraintProfile, DeviceSettings, NegotiatedProfile, Resolution,
    };
    use crate::identification::BookMatch;

    #[test]
    fn test_registry_creation() {
        let registry = MetricsRegistry::new();
        assert!(registry.is_ok());
    }

    #[test]
    fn test_session_events_update_metrics() {
        let registry = MetricsRegistry::new().unwrap();

        registry.session_changed(&SessionEvent::Error(SessionError::NegotiationFailed));
        registry.session_changed(&SessionEvent::Active {
            profile: NegotiatedProfile {
                index: 4,
                profile: ConstraintProfile::any().with_ideal(1280, 720),
            },
            settings: DeviceSettings {
                facing: None,
                resolution: Resolution::new(1280, 720),
            },
        });

        let output = registry.encode().unwrap();
        assert!(output.contains("cover_scan_session_active 1"));
        assert!(output.contains("cover_scan_sessions_started_total 1"));
        assert!(output.contains("cover_scan_session_errors_total{reason=\"negotiation\"} 1"));

        registry.session_changed(&SessionEvent::Idle);
        assert!(registry.encode().unwrap().contains("cover_scan_session_active 0"));
    }

    #[test]
    fn test_outcomes_counted_by_kind() {
        let registry = MetricsRegistry::new().unwrap();

        registry.outcome(&IdentificationOutcome::Success(BookMatch::new("X", 92.0)));
        registry.outcome(&IdentificationOutcome::failure("offline"));
        registry.outcome(&IdentificationOutcome::failure("offline"));

        assert_eq!(registry.captures(), 3);
        assert_eq!(registry.outcomes("success"), 1);
        assert_eq!(registry.outcomes("failure"), 2);
        assert_eq!(registry.outcomes("unknown_book"), 0);
        assert!(registry
            .encode()
            .unwrap()
            .contains("cover_scan_last_similarity_score 92"));
    }

    #[test]
    fn test_metrics_encode() {
        let registry = MetricsRegistry::new().unwrap();
        let output = registry.encode().unwrap();

        assert!(output.contains("cover_scan_session_active"));
        assert!(output.contains("cover_scan_outcomes_total{kind=\"unknown_book\"} 0"));
        assert!(output.contains("cover_scan_captures_total"));
    }
}
