//! Webcam backend built on nokhwa.
//!
//! nokhwa's calls block, so each opened camera lives on its own capture
//! thread. The thread opens the stream, reports back over oneshot
//! channels and then keeps the most recent frame in a shared slot;
//! nothing on the async side ever waits on the camera itself.
//!
//! Desktop cameras do not report a facing direction, so a facing
//! preference is treated as a hint and the reported facing is `None`.

use super::{
    CaptureBackend, CaptureDevice, ConstraintProfile, DeviceError, DeviceErrorKind,
    DeviceSettings, Resolution,
};
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
};
use nokhwa::{Buffer, Camera, NokhwaError};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::oneshot;

/// Frame rate requested alongside a resolution.
const REQUESTED_FPS: u32 = 30;

/// Pause between reads while the stream warms up.
const WARMUP_RETRY: Duration = Duration::from_millis(10);

/// Backend opening the camera at a fixed index.
#[derive(Debug, Clone)]
pub struct NokhwaBackend {
    index: u32,
    // Capture thread of the last device opened. The next open waits for it
    // so the same camera is never streamed twice.
    last_worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl NokhwaBackend {
    /// Creates a backend for the camera at `index`.
    pub fn new(index: u32) -> Self {
        Self {
            index,
            last_worker: Arc::new(Mutex::new(None)),
        }
    }
}

fn classify(error: &NokhwaError) -> DeviceErrorKind {
    let text = error.to_string().to_lowercase();
    if text.contains("permission") || text.contains("not authorized") {
        return DeviceErrorKind::PermissionDenied;
    }
    if text.contains("busy") || text.contains("in use") {
        return DeviceErrorKind::DeviceBusy;
    }
    match error {
        NokhwaError::OpenDeviceError(..) => DeviceErrorKind::DeviceNotFound,
        NokhwaError::SetPropertyError { .. } | NokhwaError::GetPropertyError { .. } => {
            DeviceErrorKind::OverconstrainedProfile
        }
        _ => DeviceErrorKind::Other,
    }
}

fn device_error(error: NokhwaError) -> DeviceError {
    DeviceError::new(classify(&error), error.to_string())
}

fn thread_gone() -> DeviceError {
    DeviceError::new(DeviceErrorKind::Other, "capture thread exited")
}

fn requested_format(profile: &ConstraintProfile) -> RequestedFormat<'static> {
    let format_type = match (profile.exact, profile.ideal) {
        (Some(exact), _) => RequestedFormatType::Exact(CameraFormat::new(
            nokhwa::utils::Resolution::new(exact.width, exact.height),
            FrameFormat::MJPEG,
            REQUESTED_FPS,
        )),
        (None, Some(ideal)) => RequestedFormatType::Closest(CameraFormat::new(
            nokhwa::utils::Resolution::new(ideal.width, ideal.height),
            FrameFormat::MJPEG,
            REQUESTED_FPS,
        )),
        (None, None) => RequestedFormatType::None,
    };
    RequestedFormat::new::<RgbFormat>(format_type)
}

/// State shared between a device handle and its capture thread.
#[derive(Default)]
struct FrameSlot {
    latest: Mutex<Option<Result<Buffer, DeviceError>>>,
    stopped: AtomicBool,
}

impl FrameSlot {
    fn store(&self, frame: Result<Buffer, DeviceError>) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
    }

    fn latest(&self) -> Option<Result<Buffer, DeviceError>> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// Everything the capture thread needs.
struct Worker {
    index: u32,
    format: RequestedFormat<'static>,
    exact: Option<Resolution>,
    previous: Option<JoinHandle<()>>,
    slot: Arc<FrameSlot>,
}

fn open_camera(
    index: u32,
    format: RequestedFormat<'static>,
    exact: Option<Resolution>,
) -> Result<Camera, DeviceError> {
    let mut camera = Camera::new(CameraIndex::Index(index), format).map_err(device_error)?;

    if let Some(exact) = exact {
        let actual = camera.resolution();
        if actual.width() != exact.width || actual.height() != exact.height {
            return Err(DeviceError::new(
                DeviceErrorKind::OverconstrainedProfile,
                format!("camera negotiated {}x{}", actual.width(), actual.height()),
            ));
        }
    }

    camera.open_stream().map_err(device_error)?;
    Ok(camera)
}

impl Worker {
    fn run(
        mut self,
        opened: oneshot::Sender<Result<Resolution, DeviceError>>,
        ready: oneshot::Sender<Result<(), DeviceError>>,
    ) {
        if let Some(previous) = self.previous.take() {
            let _ = previous.join();
        }

        let mut camera = match open_camera(self.index, self.format, self.exact) {
            Ok(camera) => camera,
            Err(e) => {
                let _ = opened.send(Err(e));
                return;
            }
        };
        let actual = camera.resolution();
        if opened
            .send(Ok(Resolution::new(actual.width(), actual.height())))
            .is_err()
        {
            tracing::debug!(index = self.index, "Open abandoned, closing camera");
            close(&mut camera);
            return;
        }

        let mut ready = Some(ready);
        while !self.slot.is_stopped() {
            match camera.frame() {
                Ok(buffer) => {
                    self.slot.store(Ok(buffer));
                    if let Some(tx) = ready.take() {
                        let _ = tx.send(Ok(()));
                    }
                }
                Err(NokhwaError::ReadFrameError(e)) if ready.is_some() => {
                    tracing::trace!(error = %e, "Camera not ready yet");
                    thread::sleep(WARMUP_RETRY);
                }
                Err(e) => {
                    let error = device_error(e);
                    tracing::warn!(index = self.index, error = %error, "Camera stream failed");
                    match ready.take() {
                        Some(tx) => {
                            let _ = tx.send(Err(error));
                        }
                        None => self.slot.store(Err(error)),
                    }
                    break;
                }
            }
        }

        close(&mut camera);
        tracing::debug!(index = self.index, "Capture thread finished");
    }
}

fn close(camera: &mut Camera) {
    if let Err(e) = camera.stop_stream() {
        tracing::warn!(error = %e, "Failed to stop camera stream");
    }
}

impl CaptureBackend for NokhwaBackend {
    type Device = NokhwaDevice;

    async fn open(&self, profile: &ConstraintProfile) -> Result<NokhwaDevice, DeviceError> {
        let (opened_tx, opened_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let slot = Arc::new(FrameSlot::default());

        let mut last_worker = self
            .last_worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let worker = Worker {
            index: self.index,
            format: requested_format(profile),
            exact: profile.exact,
            previous: last_worker.take(),
            slot: Arc::clone(&slot),
        };
        let handle = thread::Builder::new()
            .name(format!("camera-{}", self.index))
            .spawn(move || worker.run(opened_tx, ready_tx))
            .map_err(|e| {
                DeviceError::new(
                    DeviceErrorKind::Other,
                    format!("failed to spawn capture thread: {e}"),
                )
            })?;
        *last_worker = Some(handle);
        drop(last_worker);

        let resolution = opened_rx.await.map_err(|_| thread_gone())??;
        tracing::debug!(index = self.index, %profile, %resolution, "Opened camera stream");
        Ok(NokhwaDevice {
            slot,
            ready: Some(ready_rx),
            resolution,
            released: false,
        })
    }
}

/// An open nokhwa camera stream, fed by its capture thread.
pub struct NokhwaDevice {
    slot: Arc<FrameSlot>,
    ready: Option<oneshot::Receiver<Result<(), DeviceError>>>,
    resolution: Resolution,
    released: bool,
}

impl CaptureDevice for NokhwaDevice {
    fn ready(&mut self) -> impl Future<Output = Result<(), DeviceError>> + 'static {
        // The first frame marks the surface ready. Later calls resolve at once.
        let ready = self.ready.take();
        async move {
            match ready {
                Some(rx) => rx.await.unwrap_or_else(|_| Err(thread_gone())),
                None => Ok(()),
            }
        }
    }

    fn settings(&self) -> DeviceSettings {
        DeviceSettings {
            facing: None,
            resolution: self.resolution,
        }
    }

    fn snapshot(&mut self) -> Result<RgbImage, DeviceError> {
        if self.released {
            return Err(DeviceError::new(DeviceErrorKind::Other, "device released"));
        }
        let buffer = match self.slot.latest() {
            Some(frame) => frame?,
            None => {
                return Err(DeviceError::new(
                    DeviceErrorKind::Other,
                    "no frame received yet",
                ))
            }
        };
        let decoded = buffer.decode_image::<RgbFormat>().map_err(device_error)?;
        let (width, height) = (decoded.width(), decoded.height());
        RgbImage::from_raw(width, height, decoded.into_raw()).ok_or_else(|| {
            DeviceError::new(DeviceErrorKind::Other, "decoded frame has wrong length")
        })
    }

    fn release(&mut self) {
        // The capture thread closes the stream after its current read.
        self.slot.stopped.store(true, Ordering::Release);
        self.released = true;
    }
}

impl Drop for NokhwaDevice {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ready_resolves_from_capture_thread() {
        let (tx, rx) = oneshot::channel();
        let mut device = NokhwaDevice {
            slot: Arc::new(FrameSlot::default()),
            ready: Some(rx),
            resolution: Resolution::new(640, 480),
            released: false,
        };

        let ready = device.ready();
        thread::spawn(move || {
            let _ = tx.send(Ok(()));
        });
        assert_eq!(ready.await, Ok(()));
        assert_eq!(device.ready().await, Ok(()));
    }

    #[tokio::test]
    async fn test_ready_fails_when_capture_thread_exits() {
        let (tx, rx) = oneshot::channel::<Result<(), DeviceError>>();
        let mut device = NokhwaDevice {
            slot: Arc::new(FrameSlot::default()),
            ready: Some(rx),
            resolution: Resolution::new(640, 480),
            released: false,
        };
        drop(tx);

        let error = device.ready().await.unwrap_err();
        assert_eq!(error.kind, DeviceErrorKind::Other);
    }

    #[test]
    fn test_snapshot_reports_stream_fault_and_release() {
        let slot = Arc::new(FrameSlot::default());
        let mut device = NokhwaDevice {
            slot: Arc::clone(&slot),
            ready: None,
            resolution: Resolution::new(640, 480),
            released: false,
        };
        assert!(device.snapshot().is_err());

        slot.store(Err(DeviceError::new(DeviceErrorKind::DeviceNotFound, "unplugged")));
        assert_eq!(
            device.snapshot().unwrap_err().kind,
            DeviceErrorKind::DeviceNotFound
        );

        device.release();
        assert!(slot.is_stopped());
        assert!(device.snapshot().is_err());
    }
}
