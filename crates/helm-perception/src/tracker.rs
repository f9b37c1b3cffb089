//! Motion-based subject tracker.
//!
//! Maintains a per-instance exponentially-updated background luminance model
//! and reports the largest moving region of each frame as a normalized
//! bounding box. Single-writer, stateful: one tracker per camera.
//!
//! # Pipeline
//!
//! crop to ROI (full-frame fallback when the crop is under
//! [`MIN_ROI_PX`] pixels in either axis) → luminance → 5×5 box blur →
//! background subtraction + threshold → morphological open (3×3) and dilate
//! (5×5) → largest 4-connected region → normalized [`BBox`].
//!
//! "Nothing detected" is `bbox = None`, never an error.

use helm_hal::CameraFrame;
use helm_types::{BBox, Rect, TrackerOutput, geometry::clamp};
use tracing::trace;

/// ROI crops narrower than this (pixels, either axis) fall back to the full
/// frame.
pub const MIN_ROI_PX: u32 = 10;

/// Regions at or below this pixel area are treated as noise.
pub const MIN_REGION_AREA_PX: usize = 50;

/// Absolute luma difference that marks a pixel as foreground.
const DIFF_THRESHOLD: f32 = 25.0;

/// Blend rate of the exponential background update.
const BACKGROUND_ALPHA: f32 = 0.05;

/// Saturating detection-strength proxy: `clamp(area * 10, 0.05, 0.95)`.
///
/// Monotonic in the detected area, deliberately not a calibrated
/// probability.
pub fn confidence_from_area(area_norm: f64) -> f64 {
    clamp(area_norm * 10.0, 0.05, 0.95)
}

// ────────────────────────────────────────────────────────────────────────────
// Background model
// ────────────────────────────────────────────────────────────────────────────

struct BackgroundModel {
    crop_w: u32,
    crop_h: u32,
    luma: Vec<f32>,
}

// ────────────────────────────────────────────────────────────────────────────
// MotionTracker
// ────────────────────────────────────────────────────────────────────────────

/// Stateful motion detector. Construct once per camera and feed every frame
/// through [`MotionTracker::update`].
pub struct MotionTracker {
    background: Option<BackgroundModel>,
}

impl Default for MotionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionTracker {
    pub fn new() -> Self {
        Self { background: None }
    }

    /// Process one frame and report what moved inside `roi`.
    pub fn update(&mut self, frame: &CameraFrame, roi: &Rect) -> TrackerOutput {
        let (w, h) = (frame.width, frame.height);
        if w == 0 || h == 0 {
            return TrackerOutput::absent("empty_frame");
        }

        // Crop bounds in pixels; degenerate crops fall back to the full frame.
        let rx = clamp(roi.x, 0.0, 1.0);
        let ry = clamp(roi.y, 0.0, 1.0);
        let mut x0 = (rx * w as f64) as u32;
        let mut y0 = (ry * h as f64) as u32;
        let mut x1 = (clamp(roi.x + roi.w, 0.0, 1.0) * w as f64) as u32;
        let mut y1 = (clamp(roi.y + roi.h, 0.0, 1.0) * h as f64) as u32;
        if x1.saturating_sub(x0) < MIN_ROI_PX || y1.saturating_sub(y0) < MIN_ROI_PX {
            (x0, y0, x1, y1) = (0, 0, w, h);
        }
        let (cw, ch) = (x1 - x0, y1 - y0);

        // Luminance of the crop, blurred to suppress sensor noise.
        let mut luma = Vec::with_capacity((cw * ch) as usize);
        for y in y0..y1 {
            for x in x0..x1 {
                luma.push(frame.luma(x, y));
            }
        }
        let luma = box_blur_5(&luma, cw as usize, ch as usize);

        // First frame (or crop geometry change) seeds the model; nothing can
        // be called "motion" yet.
        let bg = match &mut self.background {
            Some(bg) if bg.crop_w == cw && bg.crop_h == ch => bg,
            _ => {
                self.background = Some(BackgroundModel {
                    crop_w: cw,
                    crop_h: ch,
                    luma,
                });
                return TrackerOutput::absent("background_seeded");
            }
        };

        // Foreground mask before the model absorbs the new frame.
        let mask: Vec<bool> = luma
            .iter()
            .zip(bg.luma.iter())
            .map(|(cur, prev)| (cur - prev).abs() > DIFF_THRESHOLD)
            .collect();
        for (prev, cur) in bg.luma.iter_mut().zip(luma.iter()) {
            *prev = (1.0 - BACKGROUND_ALPHA) * *prev + BACKGROUND_ALPHA * cur;
        }

        // Remove speckle, then bridge gaps.
        let mask = dilate(&erode(&mask, cw as usize, ch as usize, 1), cw as usize, ch as usize, 1);
        let mask = dilate(&mask, cw as usize, ch as usize, 2);

        let region = match largest_region(&mask, cw as usize, ch as usize) {
            Some(r) if r.area > MIN_REGION_AREA_PX => r,
            _ => return TrackerOutput::absent("no_motion_region"),
        };

        // Map back to full-frame normalized coordinates.
        let fx = (x0 + region.min_x as u32) as f64 / w as f64;
        let fy = (y0 + region.min_y as u32) as f64 / h as f64;
        let fw = (region.max_x - region.min_x + 1) as f64 / w as f64;
        let fh = (region.max_y - region.min_y + 1) as f64 / h as f64;
        let bbox = match BBox::clamped(fx, fy, fw, fh) {
            Some(b) => b,
            None => return TrackerOutput::absent("degenerate_region"),
        };

        let area_norm = bbox.area();
        let confidence = confidence_from_area(area_norm);

        let margin = clamp(
            (bbox.x - roi.x)
                .min(bbox.y - roi.y)
                .min((roi.x + roi.w) - (bbox.x + bbox.w))
                .min((roi.y + roi.h) - (bbox.y + bbox.h)),
            0.0,
            1.0,
        );

        trace!(area_norm, confidence, margin, "motion region detected");

        let mut debug = std::collections::BTreeMap::new();
        debug.insert("area_norm".to_string(), format!("{area_norm:.6}"));
        debug.insert("region_px".to_string(), region.area.to_string());
        TrackerOutput {
            bbox: Some(bbox),
            visibility_confidence: confidence,
            edge_margin: margin,
            debug,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Image ops
// ────────────────────────────────────────────────────────────────────────────

/// Separable 5-tap box blur with clamped borders.
fn box_blur_5(src: &[f32], w: usize, h: usize) -> Vec<f32> {
    let mut tmp = vec![0.0f32; src.len()];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for dx in -2isize..=2 {
                let sx = (x as isize + dx).clamp(0, w as isize - 1) as usize;
                acc += src[y * w + sx];
            }
            tmp[y * w + x] = acc / 5.0;
        }
    }
    let mut out = vec![0.0f32; src.len()];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for dy in -2isize..=2 {
                let sy = (y as isize + dy).clamp(0, h as isize - 1) as usize;
                acc += tmp[sy * w + x];
            }
            out[y * w + x] = acc / 5.0;
        }
    }
    out
}

/// Morphological erosion with a square structuring element of radius `r`.
fn erode(mask: &[bool], w: usize, h: usize, r: isize) -> Vec<bool> {
    morph(mask, w, h, r, true)
}

/// Morphological dilation with a square structuring element of radius `r`.
fn dilate(mask: &[bool], w: usize, h: usize, r: isize) -> Vec<bool> {
    morph(mask, w, h, r, false)
}

fn morph(mask: &[bool], w: usize, h: usize, r: isize, require_all: bool) -> Vec<bool> {
    let mut out = vec![false; mask.len()];
    for y in 0..h as isize {
        for x in 0..w as isize {
            let mut all = true;
            let mut any = false;
            'window: for dy in -r..=r {
                for dx in -r..=r {
                    let (sx, sy) = (x + dx, y + dy);
                    let set = sx >= 0
                        && sy >= 0
                        && sx < w as isize
                        && sy < h as isize
                        && mask[(sy * w as isize + sx) as usize];
                    all &= set;
                    any |= set;
                    if require_all && !all {
                        break 'window;
                    }
                }
            }
            out[(y * w as isize + x) as usize] = if require_all { all } else { any };
        }
    }
    out
}

struct Region {
    area: usize,
    min_x: usize,
    min_y: usize,
    max_x: usize,
    max_y: usize,
}

/// Largest 4-connected foreground region, or `None` for an empty mask.
fn largest_region(mask: &[bool], w: usize, h: usize) -> Option<Region> {
    let mut visited = vec![false; mask.len()];
    let mut best: Option<Region> = None;
    let mut stack = Vec::new();

    for start in 0..mask.len() {
        if !mask[start] || visited[start] {
            continue;
        }
        let mut region = Region {
            area: 0,
            min_x: usize::MAX,
            min_y: usize::MAX,
            max_x: 0,
            max_y: 0,
        };
        visited[start] = true;
        stack.push(start);
        while let Some(idx) = stack.pop() {
            let (x, y) = (idx % w, idx / w);
            region.area += 1;
            region.min_x = region.min_x.min(x);
            region.min_y = region.min_y.min(y);
            region.max_x = region.max_x.max(x);
            region.max_y = region.max_y.max(y);
            let neighbors = [
                (x > 0).then(|| idx - 1),
                (x + 1 < w).then(|| idx + 1),
                (y > 0).then(|| idx - w),
                (y + 1 < h).then(|| idx + w),
            ];
            for n in neighbors.into_iter().flatten() {
                if mask[n] && !visited[n] {
                    visited[n] = true;
                    stack.push(n);
                }
            }
        }
        if best.as_ref().map(|b| region.area > b.area).unwrap_or(true) {
            best = Some(region);
        }
    }
    best
}
