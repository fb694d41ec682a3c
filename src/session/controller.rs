//! Capture session state machine.

use super::{CaptureSession, SessionError, SessionEvent, SessionState};
use crate::capture::{CaptureBackend, CaptureConfig, CaptureDevice, NegotiatedProfile};
use crate::identification::{IdentificationOutcome, Identify};
use crate::negotiation::{ConstraintNegotiator, NegotiationError};
use crate::pipeline::{FrameCapturePipeline, PipelineError};
use crate::presenter::Presenter;
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::time::Duration;
use tokio::sync::Notify;

/// Default upper bound on the device readiness wait.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Drives one capture session from start to stop.
///
/// Runs on a single-threaded cooperative executor: operations take `&self`
/// and may be interleaved at their suspension points (device open,
/// readiness wait, encode, network round trip). The session is borrowed
/// only between suspension points, so the `Capturing` state alone keeps
/// two captures from overlapping.
pub struct CaptureSessionController<B: CaptureBackend, I, P> {
    backend: B,
    negotiator: ConstraintNegotiator,
    pipeline: FrameCapturePipeline,
    identifier: I,
    presenter: P,
    ready_timeout: Duration,
    session: RefCell<CaptureSession<B::Device>>,
    stop_signal: Notify,
}

impl<B, I, P> CaptureSessionController<B, I, P>
where
    B: CaptureBackend,
    I: Identify,
    P: Presenter,
{
    /// Creates a controller with the default profiles, quality and timeout.
    pub fn new(backend: B, identifier: I, presenter: P) -> Self {
        Self {
            backend,
            negotiator: ConstraintNegotiator::default(),
            pipeline: FrameCapturePipeline::default(),
            identifier,
            presenter,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            session: RefCell::new(CaptureSession::new()),
            stop_signal: Notify::new(),
        }
    }

    /// Creates a controller from capture configuration.
    pub fn from_config(backend: B, identifier: I, presenter: P, config: &CaptureConfig) -> Self {
        Self::new(backend, identifier, presenter)
            .with_negotiator(ConstraintNegotiator::new(config.profiles()))
            .with_pipeline(FrameCapturePipeline::new(config.jpeg_quality))
            .with_ready_timeout(config.ready_timeout())
    }

    /// Replaces the negotiator.
    pub fn with_negotiator(mut self, negotiator: ConstraintNegotiator) -> Self {
        self.negotiator = negotiator;
        self
    }

    /// Replaces the frame pipeline.
    pub fn with_pipeline(mut self, pipeline: FrameCapturePipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Sets the readiness timeout.
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.session.borrow().state()
    }

    /// The profile the active device was opened with.
    pub fn active_profile(&self) -> Option<NegotiatedProfile> {
        self.session.borrow().active_profile()
    }

    /// When the current session became active.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.session.borrow().started_at()
    }

    /// Read-only view of the session.
    pub fn inspect<R>(&self, f: impl FnOnce(&CaptureSession<B::Device>) -> R) -> R {
        f(&self.session.borrow())
    }

    /// The capture backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The identification client.
    pub fn identifier(&self) -> &I {
        &self.identifier
    }

    /// The presenter.
    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    /// Acquires a device and makes the session `Active`.
    ///
    /// A no-op returning the current state if a device is already held or
    /// being acquired. On failure the session is back in `Idle`, any opened
    /// device has been released and the presenter has been told why. If
    /// [`stop`](Self::stop) lands while this start is suspended, the start
    /// gives up, releases whatever it opened and returns `Ok(Idle)`.
    pub async fn start(&self) -> Result<SessionState, SessionError> {
        let epoch = {
            let mut session = self.session.borrow_mut();
            match session.state() {
                SessionState::Idle => session.begin_acquiring(),
                SessionState::Error => return Err(SessionError::Faulted),
                current => {
                    tracing::debug!(state = %current, "Start ignored");
                    return Ok(current);
                }
            }
        };
        tracing::info!("Acquiring capture device");

        match self.acquire(epoch).await {
            Ok(Some((profile, device))) => Ok(self.commit(profile, device)),
            Ok(None) => {
                tracing::info!("Session stopped while acquiring, device released");
                Ok(SessionState::Idle)
            }
            Err(error) => {
                let aborted = self.session.borrow_mut().abort_acquiring(epoch);
                if !aborted {
                    tracing::debug!(error = %error, "Start failed after the session was stopped");
                    return Ok(SessionState::Idle);
                }
                tracing::warn!(error = %error, "Capture session failed to start");
                self.presenter
                    .session_changed(&SessionEvent::Error(error.clone()));
                Err(error)
            }
        }
    }

    /// Negotiates, reopens and waits for readiness.
    ///
    /// While the wait is pending the device sits in the session, so a stop
    /// releases it at once. Returns `Ok(None)` if that happened.
    async fn acquire(
        &self,
        epoch: u64,
    ) -> Result<Option<(NegotiatedProfile, B::Device)>, SessionError> {
        let (profile, mut device) =
            self.negotiator
                .acquire(&self.backend)
                .await
                .map_err(|e| match e {
                    NegotiationError::NotAvailable => SessionError::NegotiationFailed,
                    NegotiationError::Device(e) => SessionError::DeviceFault(e),
                })?;

        let ready = device.ready();
        let parked = self.session.borrow_mut().hold_pending(epoch, device);
        if let Err(mut device) = parked {
            device.release();
            return Ok(None);
        }

        let stopped = self.stop_signal.notified();
        let waited = tokio::select! {
            waited = tokio::time::timeout(self.ready_timeout, ready) => Some(waited),
            _ = stopped => None,
        };

        let pending = self.session.borrow_mut().take_pending(epoch);
        let Some(mut device) = pending else {
            return Ok(None);
        };
        match waited {
            Some(Ok(Ok(()))) => Ok(Some((profile, device))),
            Some(Ok(Err(e))) => {
                device.release();
                Err(SessionError::DeviceFault(e))
            }
            Some(Err(_)) => {
                device.release();
                Err(SessionError::AcquisitionTimeout(self.ready_timeout))
            }
            None => {
                device.release();
                Ok(None)
            }
        }
    }

    /// `Acquiring -> Active` with a device that just became ready.
    fn commit(&self, profile: NegotiatedProfile, device: B::Device) -> SessionState {
        let settings = self.session.borrow_mut().activate(device, profile);

        tracing::info!(
            profile = profile.index,
            constraints = %profile.profile,
            "Capture session active"
        );
        self.presenter
            .session_changed(&SessionEvent::Active { profile, settings });
        SessionState::Active
    }

    /// Releases the device and returns to `Idle`.
    ///
    /// Safe from any state and idempotent. A pending start is abandoned
    /// and its device released before this returns. A capture whose
    /// identification request is already out is not aborted; its outcome
    /// still reaches the presenter but no longer touches the session.
    pub fn stop(&self) -> SessionState {
        let released = self.session.borrow_mut().release();
        self.stop_signal.notify_waiters();
        if released {
            tracing::info!("Capture session stopped");
            self.presenter.session_changed(&SessionEvent::Idle);
        }
        SessionState::Idle
    }

    /// Captures one frame and identifies it.
    ///
    /// Returns `Ok(None)` without doing anything if a capture is already in
    /// flight. Identification problems come back as a `Failure` outcome and
    /// leave the session `Active`; only device faults are errors. A stop
    /// before the frame is encoded drops it with `NoActiveDevice`, so
    /// nothing is uploaded once the device is gone.
    pub async fn capture(&self) -> Result<Option<IdentificationOutcome>, SessionError> {
        let (epoch, raw) = {
            let mut session = self.session.borrow_mut();
            match session.state() {
                SessionState::Active => {}
                SessionState::Capturing => {
                    tracing::debug!("Capture already in flight, ignoring");
                    return Ok(None);
                }
                state => {
                    tracing::debug!(%state, "Capture rejected");
                    return Err(SessionError::NoActiveDevice);
                }
            }

            let snapshot = self.pipeline.snapshot(&mut *session);
            match snapshot {
                Ok(raw) => {
                    session.begin_capture();
                    (session.epoch(), raw)
                }
                Err(PipelineError::Device(fault)) => {
                    session.fail(fault.clone());
                    drop(session);
                    let error = SessionError::DeviceFault(fault);
                    tracing::warn!(error = %error, "Device fault during capture");
                    self.presenter.session_changed(&SessionEvent::Error(error.clone()));
                    return Err(error);
                }
                Err(PipelineError::NoActiveDevice) => return Err(SessionError::NoActiveDevice),
                Err(e) => {
                    drop(session);
                    let outcome = IdentificationOutcome::failure(e.to_string());
                    tracing::warn!(error = %e, "Frame capture failed");
                    self.presenter.outcome(&outcome);
                    return Ok(Some(outcome));
                }
            }
        };

        let encoded = self.pipeline.encode(raw).await;
        if self.session.borrow().epoch() != epoch {
            tracing::info!("Session stopped during encode, identification skipped");
            return Err(SessionError::NoActiveDevice);
        }

        let outcome = match encoded {
            Ok(frame) => {
                tracing::trace!(
                    width = frame.width(),
                    height = frame.height(),
                    bytes = frame.encoded_bytes().len(),
                    "Frame captured"
                );
                self.identifier.identify(frame.into_bytes()).await
            }
            Err(e) => {
                tracing::warn!(error = %e, "Frame encoding failed");
                IdentificationOutcome::failure(e.to_string())
            }
        };

        let applied = self.session.borrow_mut().finish_capture(epoch);
        if !applied {
            tracing::info!("Session stopped during capture, outcome delivered without state change");
        }
        self.presenter.outcome(&outcome);
        Ok(Some(outcome))
    }
}
