//! gymgate-hw: Hardware abstraction for webcam capture.
//!
//! Provides V4L2-based camera access and the [`CaptureSource`] seam the
//! kiosk uses to pull a single JPEG still on demand.

pub mod camera;
pub mod capture;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use capture::{CaptureSettings, CaptureSource, V4lCapture};
pub use frame::Frame;
