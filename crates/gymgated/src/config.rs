use crate::poller::PollerConfig;
use crate::router::View;
use gymgate_hw::CaptureSettings;
use std::time::Duration;

/// Kiosk configuration, loaded from environment variables.
pub struct Config {
    /// Base URL of the gym API (default: http://localhost:5000/api).
    pub api_url: String,
    /// Per-request timeout for API calls.
    pub request_timeout_secs: u64,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Requested capture resolution.
    pub capture_width: u32,
    pub capture_height: u32,
    /// Number of frames to discard after opening the camera.
    pub warmup_frames: usize,
    /// JPEG quality for captured stills (1–100).
    pub jpeg_quality: u8,
    /// Access poll cadence in milliseconds.
    pub poll_interval_ms: u64,
    /// How long a granted result stays on screen.
    pub granted_dwell_ms: u64,
    /// How long a denied result stays on screen.
    pub denied_dwell_ms: u64,
    /// Screen shown at startup.
    pub initial_view: View,
}

impl Config {
    /// Load configuration from `GYMGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let initial_view = std::env::var("GYMGATE_INITIAL_VIEW")
            .ok()
            .and_then(|v| match v.parse() {
                Ok(view) => Some(view),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring GYMGATE_INITIAL_VIEW");
                    None
                }
            })
            .unwrap_or(View::Clients);

        Self {
            api_url: std::env::var("GYMGATE_API_URL")
                .unwrap_or_else(|_| gymgate_core::DEFAULT_API_URL.to_string()),
            request_timeout_secs: env_parse("GYMGATE_REQUEST_TIMEOUT_SECS", 10),
            camera_device: std::env::var("GYMGATE_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            capture_width: env_parse("GYMGATE_CAPTURE_WIDTH", 640),
            capture_height: env_parse("GYMGATE_CAPTURE_HEIGHT", 480),
            warmup_frames: env_parse("GYMGATE_WARMUP_FRAMES", 4),
            jpeg_quality: env_parse("GYMGATE_JPEG_QUALITY", 85),
            poll_interval_ms: env_parse("GYMGATE_POLL_INTERVAL_MS", 2000),
            granted_dwell_ms: env_parse("GYMGATE_GRANTED_DWELL_MS", 9500),
            denied_dwell_ms: env_parse("GYMGATE_DENIED_DWELL_MS", 8000),
            initial_view,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            device: self.camera_device.clone(),
            width: self.capture_width,
            height: self.capture_height,
            warmup_frames: self.warmup_frames,
            jpeg_quality: self.jpeg_quality,
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(self.poll_interval_ms),
            granted_dwell: Duration::from_millis(self.granted_dwell_ms),
            denied_dwell: Duration::from_millis(self.denied_dwell_ms),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
