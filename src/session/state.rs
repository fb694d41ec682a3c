//! The owned capture session value.

use crate::capture::{CaptureDevice, DeviceError, DeviceSettings, NegotiatedProfile};
use chrono::{DateTime, Utc};
use std::fmt;

/// Lifecycle state of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No device held.
    #[default]
    Idle,
    /// Negotiating and waiting for the device to become ready.
    Acquiring,
    /// Device ready; captures may be issued.
    Active,
    /// A capture and its identification are in flight.
    Capturing,
    /// The device faulted at runtime; only `stop()` leaves this state.
    Error,
}

impl SessionState {
    /// Returns true in the states that own a device handle.
    pub fn holds_device(&self) -> bool {
        matches!(self, Self::Active | Self::Capturing)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Acquiring => "acquiring",
            Self::Active => "active",
            Self::Capturing => "capturing",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// The single capture session tracked by the controller.
///
/// Holds the device handle exclusively. The handle is present exactly
/// when the state is `Active` or `Capturing`; while `Acquiring`, a device
/// waiting for readiness is parked in a separate slot so a stop can
/// release it. Every mutation goes through the crate-private transition
/// methods below, which the controller drives.
#[derive(Debug)]
pub struct CaptureSession<D> {
    state: SessionState,
    device: Option<D>,
    pending: Option<D>,
    active_profile: Option<NegotiatedProfile>,
    settings: Option<DeviceSettings>,
    started_at: Option<DateTime<Utc>>,
    fault: Option<DeviceError>,
    /// Bumped on every stop; in-flight work compares it before applying.
    epoch: u64,
}

impl<D> CaptureSession<D> {
    /// Creates an idle session.
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            device: None,
            pending: None,
            active_profile: None,
            settings: None,
            started_at: None,
            fault: None,
            epoch: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The profile the device was opened with.
    pub fn active_profile(&self) -> Option<NegotiatedProfile> {
        self.active_profile
    }

    /// Settings read from the device when it became ready.
    pub fn settings(&self) -> Option<DeviceSettings> {
        self.settings
    }

    /// When the session became active.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// The runtime fault that put the session into `Error`.
    pub fn fault(&self) -> Option<&DeviceError> {
        self.fault.as_ref()
    }

    /// Returns true while a device handle is held.
    pub fn has_device(&self) -> bool {
        self.device.is_some()
    }

    /// Returns true while a device opened for this session awaits readiness.
    pub fn has_pending_device(&self) -> bool {
        self.pending.is_some()
    }

    /// Returns true if the handle/state invariant holds.
    pub fn is_consistent(&self) -> bool {
        self.device.is_some() == self.state.holds_device()
            && (self.pending.is_none() || self.state == SessionState::Acquiring)
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn device_mut(&mut self) -> Option<&mut D> {
        self.device.as_mut()
    }

    /// `Idle -> Acquiring`. Returns the epoch the acquisition runs under.
    pub(crate) fn begin_acquiring(&mut self) -> u64 {
        debug_assert_eq!(self.state, SessionState::Idle);
        self.state = SessionState::Acquiring;
        self.epoch
    }

    /// Parks a device opened under `epoch` while it becomes ready.
    ///
    /// Hands the device back if the session was stopped meanwhile.
    pub(crate) fn hold_pending(&mut self, epoch: u64, device: D) -> Result<(), D> {
        if self.epoch != epoch || self.state != SessionState::Acquiring || self.pending.is_some() {
            return Err(device);
        }
        self.pending = Some(device);
        Ok(())
    }

    /// Takes back the parked device, unless a stop already released it.
    pub(crate) fn take_pending(&mut self, epoch: u64) -> Option<D> {
        if self.epoch != epoch {
            return None;
        }
        self.pending.take()
    }

    /// `Acquiring -> Idle` after a failed start, unless the session moved on.
    pub(crate) fn abort_acquiring(&mut self, epoch: u64) -> bool {
        if self.epoch != epoch || self.state != SessionState::Acquiring {
            return false;
        }
        self.state = SessionState::Idle;
        true
    }

    /// `Active -> Capturing`.
    pub(crate) fn begin_capture(&mut self) {
        debug_assert_eq!(self.state, SessionState::Active);
        self.state = SessionState::Capturing;
    }

    /// `Capturing -> Active`, unless the session was stopped meanwhile.
    pub(crate) fn finish_capture(&mut self, epoch: u64) -> bool {
        if self.epoch != epoch || self.state != SessionState::Capturing {
            return false;
        }
        self.state = SessionState::Active;
        true
    }
}

impl<D: CaptureDevice> CaptureSession<D> {
    /// `Acquiring -> Active`, taking ownership of a ready device.
    ///
    /// Device settings are read here, once, after readiness resolved.
    pub(crate) fn activate(&mut self, device: D, profile: NegotiatedProfile) -> DeviceSettings {
        debug_assert_eq!(self.state, SessionState::Acquiring);
        let settings = device.settings();
        self.settings = Some(settings);
        self.device = Some(device);
        self.active_profile = Some(profile);
        self.started_at = Some(Utc::now());
        self.fault = None;
        self.state = SessionState::Active;
        settings
    }

    /// Any state `-> Error` on a runtime device fault. Releases the device.
    pub(crate) fn fail(&mut self, fault: DeviceError) {
        self.drop_device();
        self.fault = Some(fault);
        self.state = SessionState::Error;
    }

    /// Any state `-> Idle`. Releases the device synchronously.
    ///
    /// Returns false if the session was already idle.
    pub(crate) fn release(&mut self) -> bool {
        if self.state == SessionState::Idle {
            return false;
        }
        self.drop_device();
        self.fault = None;
        self.state = SessionState::Idle;
        self.epoch += 1;
        true
    }

    fn drop_device(&mut self) {
        for mut device in self.device.take().into_iter().chain(self.pending.take()) {
            device.release();
        }
        self.active_profile = None;
        self.settings = None;
        self.started_at = None;
    }
}

impl<D> Default for CaptureSession<D> {
    fn default() -> Self {
        Self::new()
    }
}
