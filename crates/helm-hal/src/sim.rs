//! Deterministic simulated camera for tests and hardware-free dry runs.

use helm_types::{HelmError, Rect};
use tracing::debug;

use crate::camera::{Camera, CameraFrame};

/// A bright rectangular subject placed on a dark background.
#[derive(Debug, Clone, Copy)]
pub struct Blob {
    /// Normalized region the blob covers.
    pub region: Rect,
    /// Pixel intensity of the blob (0–255, applied to all three channels).
    pub intensity: u8,
}

/// Camera that renders a flat background plus an optional movable [`Blob`].
///
/// Frames are fully deterministic: two captures with the same state produce
/// identical bytes. The `encoded` payload is the raw pixel buffer (this
/// driver does not compress), which is sufficient for artifact writing and
/// content-addressed caching in tests.
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    background: u8,
    blob: Option<Blob>,
    frames_captured: u64,
    released: bool,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            background: 16,
            blob: None,
            frames_captured: 0,
            released: false,
        }
    }

    /// Place (or move) the subject. `None` clears it.
    pub fn set_blob(&mut self, blob: Option<Blob>) {
        self.blob = blob;
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured
    }

    fn render(&self) -> Vec<u8> {
        let mut pixels = vec![self.background; (self.width * self.height * 3) as usize];
        if let Some(blob) = &self.blob {
            let x0 = (blob.region.x * self.width as f64).round() as u32;
            let y0 = (blob.region.y * self.height as f64).round() as u32;
            let x1 = ((blob.region.x + blob.region.w) * self.width as f64).round() as u32;
            let y1 = ((blob.region.y + blob.region.h) * self.height as f64).round() as u32;
            for y in y0..y1.min(self.height) {
                for x in x0..x1.min(self.width) {
                    let idx = ((y * self.width + x) * 3) as usize;
                    pixels[idx] = blob.intensity;
                    pixels[idx + 1] = blob.intensity;
                    pixels[idx + 2] = blob.intensity;
                }
            }
        }
        pixels
    }
}

impl Camera for SyntheticCamera {
    fn id(&self) -> &str {
        "synthetic"
    }

    fn capture(&mut self) -> Result<CameraFrame, HelmError> {
        if self.released {
            return Err(HelmError::Hardware {
                component: "synthetic_camera".to_string(),
                details: "capture after release".to_string(),
            });
        }
        self.frames_captured += 1;
        let pixels = self.render();
        Ok(CameraFrame {
            width: self.width,
            height: self.height,
            encoded: pixels.clone(),
            pixels,
        })
    }

    fn release(&mut self) {
        if !self.released {
            debug!(frames = self.frames_captured, "synthetic camera released");
        }
        self.released = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_scene_is_uniform_background() {
        let mut cam = SyntheticCamera::new(8, 8);
        let frame = cam.capture().unwrap();
        assert!(frame.pixels.iter().all(|&p| p == 16));
    }

    #[test]
    fn blob_renders_at_expected_pixels() {
        let mut cam = SyntheticCamera::new(10, 10);
        cam.set_blob(Some(Blob {
            region: Rect {
                x: 0.5,
                y: 0.5,
                w: 0.2,
                h: 0.2,
            },
            intensity: 240,
        }));
        let frame = cam.capture().unwrap();
        // Center of the blob is bright, far corner stays background.
        assert!(frame.luma(5, 5) > 200.0);
        assert!(frame.luma(0, 0) < 30.0);
    }

    #[test]
    fn captures_are_deterministic() {
        let mut cam = SyntheticCamera::new(6, 6);
        let a = cam.capture().unwrap();
        let b = cam.capture().unwrap();
        assert_eq!(a.pixels, b.pixels);
        assert_eq!(cam.frames_captured(), 2);
    }

    #[test]
    fn capture_after_release_is_a_hardware_fault() {
        let mut cam = SyntheticCamera::new(4, 4);
        cam.release();
        assert!(matches!(
            cam.capture(),
            Err(HelmError::Hardware { .. })
        ));
    }

    #[test]
    fn release_is_idempotent() {
        let mut cam = SyntheticCamera::new(4, 4);
        cam.release();
        cam.release();
    }
}
