//! Scriptable capture backend for tests and demos.
//!
//! The backend decides per profile whether an open succeeds, and keeps
//! shared counters so callers can check which profiles were tried and how
//! many device handles are alive at once.

use super::{
    CaptureBackend, CaptureDevice, ConstraintProfile, DeviceError, DeviceErrorKind,
    DeviceSettings, FacingMode, Resolution,
};
use image::{Rgb, RgbImage};
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

/// Resolution reported when a profile asks for none.
const DEFAULT_RESOLUTION: Resolution = Resolution::new(1280, 720);

type Policy = Box<dyn Fn(&ConstraintProfile) -> Result<(), DeviceErrorKind>>;

/// How a mock device's readiness wait resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Ready as soon as it is awaited.
    Immediate,
    /// Ready after the given delay.
    After(Duration),
    /// Never becomes ready.
    Never,
    /// Fails with the given kind.
    Fail(DeviceErrorKind),
}

#[derive(Debug, Default)]
struct Shared {
    attempts: RefCell<Vec<ConstraintProfile>>,
    live: Cell<usize>,
    max_live: Cell<usize>,
    releases: Cell<usize>,
    snapshots: Cell<usize>,
}

/// Mock backend producing synthetic devices.
pub struct MockBackend {
    policy: Policy,
    readiness: Readiness,
    open_delay: Option<Duration>,
    frame_size: Option<Resolution>,
    snapshot_fault: Option<DeviceErrorKind>,
    shared: Rc<Shared>,
}

impl MockBackend {
    /// A backend that accepts every profile.
    pub fn new() -> Self {
        Self::with_policy(|_| Ok(()))
    }

    /// A backend that decides per profile.
    pub fn with_policy(
        policy: impl Fn(&ConstraintProfile) -> Result<(), DeviceErrorKind> + 'static,
    ) -> Self {
        Self {
            policy: Box::new(policy),
            readiness: Readiness::Immediate,
            open_delay: None,
            frame_size: None,
            snapshot_fault: None,
            shared: Rc::new(Shared::default()),
        }
    }

    /// A backend that rejects every profile with `kind`.
    pub fn rejecting_all(kind: DeviceErrorKind) -> Self {
        Self::with_policy(move |_| Err(kind))
    }

    /// Sets how opened devices become ready.
    pub fn with_readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = readiness;
        self
    }

    /// Makes every open take `delay`, like a permission prompt.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    /// Makes devices deliver frames of a size other than the one they report.
    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = Some(Resolution::new(width, height));
        self
    }

    /// Makes every snapshot fail with `kind`.
    pub fn with_snapshot_fault(mut self, kind: DeviceErrorKind) -> Self {
        self.snapshot_fault = Some(kind);
        self
    }

    /// Profiles passed to `open`, in call order.
    pub fn attempts(&self) -> Vec<ConstraintProfile> {
        self.shared.attempts.borrow().clone()
    }

    /// Devices currently open.
    pub fn live_devices(&self) -> usize {
        self.shared.live.get()
    }

    /// Most devices ever open at the same time.
    pub fn max_live_devices(&self) -> usize {
        self.shared.max_live.get()
    }

    /// Number of device releases.
    pub fn release_count(&self) -> usize {
        self.shared.releases.get()
    }

    /// Number of frames snapshotted.
    pub fn snapshot_count(&self) -> usize {
        self.shared.snapshots.get()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for MockBackend {
    type Device = MockDevice;

    async fn open(&self, profile: &ConstraintProfile) -> Result<MockDevice, DeviceError> {
        self.shared.attempts.borrow_mut().push(*profile);
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }

        if let Err(kind) = (self.policy)(profile) {
            tracing::debug!(?kind, %profile, "MockBackend rejected profile");
            return Err(DeviceError::new(kind, format!("mock rejected {profile}")));
        }

        let live = self.shared.live.get() + 1;
        self.shared.live.set(live);
        self.shared.max_live.set(self.shared.max_live.get().max(live));

        let resolution = profile.requested_resolution().unwrap_or(DEFAULT_RESOLUTION);
        let facing = match profile.facing {
            FacingMode::Environment => Some(FacingMode::Environment),
            FacingMode::Unspecified => None,
        };

        Ok(MockDevice {
            settings: DeviceSettings { facing, resolution },
            frame_size: self.frame_size.unwrap_or(resolution),
            readiness: self.readiness,
            snapshot_fault: self.snapshot_fault,
            sequence: 0,
            released: false,
            shared: Rc::clone(&self.shared),
        })
    }
}

/// Device handed out by [`MockBackend`].
#[derive(Debug)]
pub struct MockDevice {
    settings: DeviceSettings,
    frame_size: Resolution,
    readiness: Readiness,
    snapshot_fault: Option<DeviceErrorKind>,
    sequence: u32,
    released: bool,
    shared: Rc<Shared>,
}

impl MockDevice {
    /// Returns true once the device was released.
    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl CaptureDevice for MockDevice {
    fn ready(&mut self) -> impl Future<Output = Result<(), DeviceError>> + 'static {
        let readiness = self.readiness;
        async move {
            match readiness {
                Readiness::Immediate => Ok(()),
                Readiness::After(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(())
                }
                Readiness::Never => std::future::pending().await,
                Readiness::Fail(kind) => Err(DeviceError::new(kind, "mock surface failed")),
            }
        }
    }

    fn settings(&self) -> DeviceSettings {
        self.settings
    }

    fn snapshot(&mut self) -> Result<RgbImage, DeviceError> {
        if self.released {
            return Err(DeviceError::new(DeviceErrorKind::Other, "device released"));
        }
        if let Some(kind) = self.snapshot_fault {
            return Err(DeviceError::new(kind, "mock snapshot failed"));
        }

        self.sequence += 1;
        self.shared.snapshots.set(self.shared.snapshots.get() + 1);

        // Deterministic pattern, shifted per frame
        let seq = self.sequence;
        let Resolution { width, height } = self.frame_size;
        Ok(RgbImage::from_fn(width, height, |x, y| {
            Rgb([
                (x.wrapping_add(seq) % 256) as u8,
                (y % 256) as u8,
                ((x ^ y) % 256) as u8,
            ])
        }))
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.shared.live.set(self.shared.live.get().saturating_sub(1));
        self.shared.releases.set(self.shared.releases.get() + 1);
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_device_lifecycle() {
        let backend = MockBackend::new();
        let profile = ConstraintProfile::environment().with_ideal(1920, 1080);

        let mut device = backend.open(&profile).await.unwrap();
        assert_eq!(backend.live_devices(), 1);

        device.ready().await.unwrap();
        let settings = device.settings();
        assert_eq!(settings.resolution, Resolution::new(1920, 1080));
        assert_eq!(settings.facing, Some(FacingMode::Environment));

        let frame = device.snapshot().unwrap();
        assert_eq!(frame.dimensions(), (1920, 1080));

        device.release();
        device.release();
        assert_eq!(backend.live_devices(), 0);
        assert_eq!(backend.release_count(), 1);
        assert!(device.snapshot().is_err());
    }

    #[tokio::test]
    async fn test_policy_rejection_is_recorded() {
        let backend = MockBackend::rejecting_all(DeviceErrorKind::DeviceBusy);
        let err = backend.open(&ConstraintProfile::any()).await.unwrap_err();

        assert_eq!(err.kind, DeviceErrorKind::DeviceBusy);
        assert_eq!(backend.attempts(), vec![ConstraintProfile::any()]);
        assert_eq!(backend.live_devices(), 0);
    }

    #[tokio::test]
    async fn test_drop_releases() {
        let backend = MockBackend::new();
        {
            let _device = backend.open(&ConstraintProfile::any()).await.unwrap();
            assert_eq!(backend.live_devices(), 1);
        }
        assert_eq!(backend.live_devices(), 0);
    }
}
