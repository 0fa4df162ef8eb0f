//! Single-still capture on demand.

use crate::camera::{Camera, CameraError};
use gymgate_core::Snapshot;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Buffers dequeued per still before giving up on a dark stream.
const MAX_STILL_ATTEMPTS: usize = 5;

/// A live camera that yields one JPEG still per call.
///
/// Implementations never buffer frames between calls or queue captures.
pub trait CaptureSource: Send + Sync + 'static {
    /// Grab the current frame as a data-URL snapshot.
    fn capture(&self) -> impl Future<Output = Result<Snapshot, CameraError>> + Send;

    /// Close the underlying device. The next `capture` reopens it.
    fn release(&self);
}

/// Device and encoding parameters for [`V4lCapture`].
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub device: String,
    pub width: u32,
    pub height: u32,
    /// Frames discarded right after opening (auto-exposure settling).
    pub warmup_frames: usize,
    pub jpeg_quality: u8,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            device: "/dev/video0".into(),
            width: 640,
            height: 480,
            warmup_frames: 4,
            jpeg_quality: 85,
        }
    }
}

/// Parking spot for the open device between captures.
///
/// A capture checks the device out for the duration of its I/O, so
/// `release` never waits on the hardware. `epoch` is bumped by every
/// release; a device checked out before a release is closed on return
/// instead of being parked again.
#[derive(Debug)]
struct Slot<T> {
    parked: Option<T>,
    epoch: u64,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            parked: None,
            epoch: 0,
        }
    }
}

impl<T> Slot<T> {
    fn check_out(&mut self) -> (Option<T>, u64) {
        (self.parked.take(), self.epoch)
    }

    /// Park `device` again, or hand it back if a release happened since
    /// it was checked out.
    fn check_in(&mut self, device: T, epoch: u64) -> Option<T> {
        if self.epoch != epoch || self.parked.is_some() {
            return Some(device);
        }
        self.parked = Some(device);
        None
    }

    fn release(&mut self) -> Option<T> {
        self.epoch += 1;
        self.parked.take()
    }
}

struct Shared {
    /// Serializes device I/O between concurrent captures.
    io: Mutex<()>,
    slot: Mutex<Slot<Camera>>,
}

/// V4L2-backed capture source. Opens the device lazily on first capture.
pub struct V4lCapture {
    settings: CaptureSettings,
    shared: Arc<Shared>,
}

impl V4lCapture {
    pub fn new(settings: CaptureSettings) -> Self {
        Self {
            settings,
            shared: Arc::new(Shared {
                io: Mutex::new(()),
                slot: Mutex::new(Slot::default()),
            }),
        }
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// True while an open device is parked between captures.
    pub fn is_open(&self) -> bool {
        self.shared.slot().parked.is_some()
    }
}

impl Shared {
    fn slot(&self) -> MutexGuard<'_, Slot<Camera>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn open_camera(settings: &CaptureSettings) -> Result<Camera, CameraError> {
    let camera = Camera::open(&settings.device, settings.width, settings.height)?;
    camera.warm_up(settings.warmup_frames)?;
    Ok(camera)
}

fn capture_blocking(shared: &Shared, settings: &CaptureSettings) -> Result<Snapshot, CameraError> {
    let _io = shared.io.lock().unwrap_or_else(PoisonError::into_inner);
    let (parked, epoch) = shared.slot().check_out();
    let camera = match parked {
        Some(camera) => camera,
        None => open_camera(settings)?,
    };

    let result = camera
        .capture_still(MAX_STILL_ATTEMPTS)
        .and_then(|frame| {
            frame
                .to_jpeg(settings.jpeg_quality)
                .map_err(CameraError::from)
        });
    if let Some(camera) = shared.slot().check_in(camera, epoch) {
        tracing::info!(device = %camera.device_path, "camera released during capture");
    }

    let jpeg = result?;
    tracing::debug!(bytes = jpeg.len(), "captured still");
    Ok(Snapshot::from_jpeg(&jpeg))
}

impl CaptureSource for V4lCapture {
    async fn capture(&self) -> Result<Snapshot, CameraError> {
        let shared = Arc::clone(&self.shared);
        let settings = self.settings.clone();
        tokio::task::spawn_blocking(move || capture_blocking(&shared, &settings))
            .await
            .map_err(|e| CameraError::CaptureFailed(format!("capture task failed: {e}")))?
    }

    fn release(&self) {
        let released = self.shared.slot().release();
        if let Some(camera) = released {
            tracing::info!(device = %camera.device_path, "camera released");
        }
    }
}
