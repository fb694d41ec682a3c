//! Capture profile negotiation.
//!
//! Walks a fixed, ordered list of [`ConstraintProfile`]s against a
//! [`CaptureBackend`] until one opens. Each candidate is probed and the
//! trial device released straight away, so no handle is held across the
//! whole walk; the session then opens the winning profile a second time.
//!
//! # Example
//!
//! ```no_run
//! use cover_scan::capture::{default_profiles, MockBackend};
//! use cover_scan::negotiation::ConstraintNegotiator;
//!
//! # async fn run() {
//! let negotiator = ConstraintNegotiator::new(default_profiles());
//! let backend = MockBackend::new();
//! let (accepted, _device) = negotiator.acquire(&backend).await.unwrap();
//! assert_eq!(accepted.index, 0);
//! # }
//! ```

use crate::capture::{
    default_profiles, CaptureBackend, CaptureDevice, ConstraintProfile, DeviceError,
    NegotiatedProfile,
};
use thiserror::Error;

/// Errors that can occur during negotiation.
#[derive(Debug, Clone, Error)]
pub enum NegotiationError {
    #[error("no capture profile was accepted")]
    NotAvailable,

    #[error("negotiated profile could not be reopened: {0}")]
    Device(#[from] DeviceError),
}

/// Tries profiles in priority order.
#[derive(Debug, Clone)]
pub struct ConstraintNegotiator {
    profiles: Vec<ConstraintProfile>,
}

impl ConstraintNegotiator {
    /// Creates a negotiator over `profiles`, highest priority first.
    pub fn new(profiles: Vec<ConstraintProfile>) -> Self {
        Self { profiles }
    }

    /// The profile list in priority order.
    pub fn profiles(&self) -> &[ConstraintProfile] {
        &self.profiles
    }

    /// Finds the first profile the backend accepts.
    ///
    /// Profiles are tried one at a time, strictly in order. A trial device
    /// is released before this returns. Platform errors only decide
    /// pass/fail; their detail is dropped.
    pub async fn negotiate<B: CaptureBackend>(
        &self,
        backend: &B,
    ) -> Result<NegotiatedProfile, NegotiationError> {
        for (index, profile) in self.profiles.iter().enumerate() {
            match backend.open(profile).await {
                Ok(mut trial) => {
                    trial.release();
                    tracing::debug!(profile = index, %profile, "Profile accepted");
                    return Ok(NegotiatedProfile {
                        index,
                        profile: *profile,
                    });
                }
                Err(e) => {
                    tracing::debug!(profile = index, kind = ?e.kind, "Profile rejected");
                }
            }
        }

        tracing::warn!(tried = self.profiles.len(), "No capture profile accepted");
        Err(NegotiationError::NotAvailable)
    }

    /// Negotiates, then opens the accepted profile for keeps.
    ///
    /// This is the only entry point the session uses, so the two-phase
    /// open can later collapse into one without touching callers.
    pub async fn acquire<B: CaptureBackend>(
        &self,
        backend: &B,
    ) -> Result<(NegotiatedProfile, B::Device), NegotiationError> {
        let accepted = self.negotiate(backend).await?;
        let device = backend.open(&accepted.profile).await.map_err(|e| {
            tracing::warn!(profile = accepted.index, error = %e, "Reopen failed");
            NegotiationError::Device(e)
        })?;
        Ok((accepted, device))
    }
}

impl Default for ConstraintNegotiator {
    fn default() -> Self {
        Self::new(default_profiles())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{DeviceErrorKind, FacingMode, MockBackend, Resolution};
    use proptest::prelude::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[tokio::test]
    async fn test_first_profile_accepted() {
        let negotiator = ConstraintNegotiator::default();
        let backend = MockBackend::new();

        let accepted = negotiator.negotiate(&backend).await.unwrap();

        assert_eq!(accepted.index, 0);
        assert_eq!(accepted.profile.facing, FacingMode::Environment);
        assert_eq!(accepted.profile.ideal, Some(Resolution::new(1920, 1080)));
        assert_eq!(backend.attempts().len(), 1);
        assert_eq!(backend.live_devices(), 0);
    }

    #[tokio::test]
    async fn test_falls_back_past_overconstrained() {
        let negotiator = ConstraintNegotiator::default();
        let backend = MockBackend::with_policy(|p| match p.facing {
            FacingMode::Environment => Err(DeviceErrorKind::OverconstrainedProfile),
            FacingMode::Unspecified => Ok(()),
        });

        let accepted = negotiator.negotiate(&backend).await.unwrap();

        assert_eq!(accepted.index, 4);
        assert_eq!(backend.attempts(), negotiator.profiles()[..5].to_vec());
    }

    #[tokio::test]
    async fn test_all_rejected() {
        let negotiator = ConstraintNegotiator::default();
        let backend = MockBackend::rejecting_all(DeviceErrorKind::DeviceNotFound);

        let result = negotiator.negotiate(&backend).await;

        assert!(matches!(result, Err(NegotiationError::NotAvailable)));
        assert_eq!(backend.attempts(), default_profiles());
    }

    #[tokio::test]
    async fn test_empty_list_not_available() {
        let negotiator = ConstraintNegotiator::new(Vec::new());
        let backend = MockBackend::new();
        assert!(matches!(
            negotiator.negotiate(&backend).await,
            Err(NegotiationError::NotAvailable)
        ));
        assert!(backend.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_acquire_opens_twice_holding_one() {
        let negotiator = ConstraintNegotiator::default();
        let backend = MockBackend::new();

        let (accepted, device) = negotiator.acquire(&backend).await.unwrap();

        assert_eq!(accepted.index, 0);
        assert_eq!(backend.attempts(), vec![accepted.profile, accepted.profile]);
        assert_eq!(backend.live_devices(), 1);
        assert_eq!(backend.max_live_devices(), 1);
        drop(device);
        assert_eq!(backend.live_devices(), 0);
    }

    #[tokio::test]
    async fn test_acquire_reopen_failure() {
        let negotiator = ConstraintNegotiator::default();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        // Accept the probe, refuse the reopen.
        let backend = MockBackend::with_policy(move |_| {
            counter.set(counter.get() + 1);
            if counter.get() == 1 {
                Ok(())
            } else {
                Err(DeviceErrorKind::DeviceBusy)
            }
        });

        let result = negotiator.acquire(&backend).await;

        match result {
            Err(NegotiationError::Device(e)) => assert_eq!(e.kind, DeviceErrorKind::DeviceBusy),
            other => panic!("unexpected result: {:?}", other.map(|(p, _)| p)),
        }
        assert_eq!(calls.get(), 2);
        assert_eq!(backend.live_devices(), 0);
    }

    proptest! {
        #[test]
        fn prop_visits_in_order_and_halts(accepts in proptest::collection::vec(any::<bool>(), 0..12)) {
            let profiles: Vec<ConstraintProfile> = (0..accepts.len() as u32)
                .map(|i| ConstraintProfile::any().with_exact(100 + i, 100))
                .collect();
            let table = accepts.clone();
            let backend = MockBackend::with_policy(move |p| {
                let i = (p.exact.map(|r| r.width).unwrap_or(0) - 100) as usize;
                if table[i] { Ok(()) } else { Err(DeviceErrorKind::Other) }
            });
            let negotiator = ConstraintNegotiator::new(profiles.clone());

            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let result = runtime.block_on(negotiator.negotiate(&backend));

            let first = accepts.iter().position(|a| *a);
            match first {
                Some(i) => {
                    prop_assert_eq!(result.unwrap().index, i);
                    prop_assert_eq!(backend.attempts(), profiles[..=i].to_vec());
                }
                None => {
                    prop_assert!(result.is_err());
                    prop_assert_eq!(backend.attempts(), profiles);
                }
            }
            prop_assert_eq!(backend.live_devices(), 0);
        }
    }
}
