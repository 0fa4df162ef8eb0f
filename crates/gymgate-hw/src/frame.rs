//! Frame type and pixel handling: YUYV conversion, dark detection, JPEG encoding.

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

/// Pixel layout of a captured frame's `data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameData {
    /// Packed 8-bit RGB (3 bytes/pixel).
    Rgb8,
    /// 8-bit grayscale (1 byte/pixel, IR cameras).
    Gray8,
    /// Already JPEG-compressed (MJPEG cameras).
    Jpeg,
}

/// A single captured camera frame.
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub layout: FrameData,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl Frame {
    /// True if the frame is almost entirely black (sensor still settling).
    ///
    /// JPEG frames are never reported dark; decoding them just to check is
    /// not worth the cost.
    pub fn is_dark(&self, threshold_pct: f32) -> bool {
        match self.layout {
            FrameData::Gray8 => is_dark_frame(&self.data, threshold_pct),
            FrameData::Rgb8 => {
                let luma: Vec<u8> = self.data.chunks_exact(3).map(rgb_luma).collect();
                is_dark_frame(&luma, threshold_pct)
            }
            FrameData::Jpeg => false,
        }
    }

    /// Encode the frame as a baseline JPEG at `quality` (1–100).
    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>, FrameError> {
        let color = match self.layout {
            FrameData::Jpeg => return Ok(self.data.clone()),
            FrameData::Rgb8 => ExtendedColorType::Rgb8,
            FrameData::Gray8 => ExtendedColorType::L8,
        };

        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
        encoder
            .encode(&self.data, self.width, self.height, color)
            .map_err(|e| FrameError::Encode(e.to_string()))?;
        Ok(out)
    }
}

fn rgb_luma(px: &[u8]) -> u8 {
    // BT.601 weights in 8.8 fixed point.
    ((77 * px[0] as u32 + 150 * px[1] as u32 + 29 * px[2] as u32) >> 8) as u8
}

/// Convert packed YUYV (4:2:2) to packed RGB using BT.601 coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share
/// the chroma pair.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let u = chunk[1] as i32 - 128;
        let v = chunk[3] as i32 - 128;
        for y in [chunk[0], chunk[2]] {
            let c = y as i32 - 16;
            let r = (298 * c + 409 * v + 128) >> 8;
            let g = (298 * c - 100 * u - 208 * v + 128) >> 8;
            let b = (298 * c + 516 * u + 128) >> 8;
            rgb.push(r.clamp(0, 255) as u8);
            rgb.push(g.clamp(0, 255) as u8);
            rgb.push(b.clamp(0, 255) as u8);
        }
    }
    Ok(rgb)
}

/// Check if a grayscale buffer is dark.
///
/// Returns true if more than `threshold_pct` of pixels fall in the darkest
/// bucket (0–31).
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark_count = gray.iter().filter(|&&p| p < 32).count();
    (dark_count as f32 / gray.len() as f32) > threshold_pct
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("JPEG encoding failed: {0}")]
    Encode(String),
}
