//! Normalized frame geometry: [`Rect`] regions and detection [`BBox`]es.
//!
//! Every coordinate in this module lives in the unit square: `x`, `y`, `w`
//! and `h` are fractions of the full camera frame, so the same region
//! description works regardless of capture resolution.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Clamp helper used throughout the geometry code.
pub fn clamp(v: f64, lo: f64, hi: f64) -> f64 {
    v.clamp(lo, hi)
}

// ────────────────────────────────────────────────────────────────────────────
// Rect
// ────────────────────────────────────────────────────────────────────────────

/// A normalized region of the camera frame (ROI), e.g. the area the robot is
/// allowed to operate in or the "home" area it resets to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    /// The whole frame.
    pub fn full() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            w: 1.0,
            h: 1.0,
        }
    }

    /// Center point of the region.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// `true` when `inner` lies entirely inside this region.
    pub fn contains(&self, inner: &BBox) -> bool {
        inner.x >= self.x
            && inner.y >= self.y
            && (inner.x + inner.w) <= (self.x + self.w)
            && (inner.y + inner.h) <= (self.y + self.h)
    }

    /// Parse a `{x, y, w, h}` JSON object into a valid normalized rect,
    /// falling back to `default` when any field is missing, non-numeric, or
    /// the sanitized region would be empty.
    pub fn from_value_or(value: &serde_json::Value, default: Rect) -> Rect {
        let obj = match value.as_object() {
            Some(o) => o,
            None => return default,
        };
        let mut fields = [0.0f64; 4];
        for (slot, key) in fields.iter_mut().zip(["x", "y", "w", "h"]) {
            match obj.get(key).and_then(|v| v.as_f64()) {
                Some(n) => *slot = n,
                None => return default,
            }
        }
        let x = clamp(fields[0], 0.0, 1.0);
        let y = clamp(fields[1], 0.0, 1.0);
        let w = clamp(fields[2], 0.0, 1.0 - x);
        let h = clamp(fields[3], 0.0, 1.0 - y);
        if w <= 0.0 || h <= 0.0 {
            return default;
        }
        Rect { x, y, w, h }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// BBox
// ────────────────────────────────────────────────────────────────────────────

/// A detection bounding box in normalized full-frame coordinates.
///
/// Invariants (enforced by [`BBox::clamped`]): `0 ≤ x`, `0 ≤ y`,
/// `x + w ≤ 1`, `y + h ≤ 1`, `w > 0`, `h > 0`. Immutable value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl BBox {
    /// Build a box from raw coordinates, clamping into the unit square.
    /// Returns `None` when the clamped box would have no area.
    pub fn clamped(x: f64, y: f64, w: f64, h: f64) -> Option<Self> {
        let x = clamp(x, 0.0, 1.0);
        let y = clamp(y, 0.0, 1.0);
        let w = clamp(w, 0.0, 1.0 - x);
        let h = clamp(h, 0.0, 1.0 - y);
        if w <= 0.0 || h <= 0.0 {
            return None;
        }
        Some(Self { x, y, w, h })
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    pub fn area(&self) -> f64 {
        self.w * self.h
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamped_box_respects_unit_square() {
        let b = BBox::clamped(0.8, 0.9, 0.5, 0.5).unwrap();
        assert!(b.x >= 0.0 && b.y >= 0.0);
        assert!(b.x + b.w <= 1.0 + 1e-12);
        assert!(b.y + b.h <= 1.0 + 1e-12);
    }

    #[test]
    fn clamped_rejects_empty_boxes() {
        assert!(BBox::clamped(0.5, 0.5, 0.0, 0.2).is_none());
        assert!(BBox::clamped(1.0, 0.0, 0.5, 0.5).is_none());
        assert!(BBox::clamped(0.2, 0.2, -0.1, 0.3).is_none());
    }

    #[test]
    fn bbox_center_and_area() {
        let b = BBox::clamped(0.2, 0.2, 0.4, 0.2).unwrap();
        let (cx, cy) = b.center();
        assert!((cx - 0.4).abs() < 1e-12);
        assert!((cy - 0.3).abs() < 1e-12);
        assert!((b.area() - 0.08).abs() < 1e-12);
    }

    #[test]
    fn rect_contains_inner_box() {
        let roi = Rect {
            x: 0.1,
            y: 0.1,
            w: 0.8,
            h: 0.8,
        };
        let inside = BBox::clamped(0.3, 0.3, 0.2, 0.2).unwrap();
        let outside = BBox::clamped(0.0, 0.0, 0.2, 0.2).unwrap();
        assert!(roi.contains(&inside));
        assert!(!roi.contains(&outside));
    }

    #[test]
    fn rect_contains_is_inclusive_at_edges() {
        let roi = Rect::full();
        let edge = BBox::clamped(0.0, 0.0, 1.0, 1.0).unwrap();
        assert!(roi.contains(&edge));
    }

    #[test]
    fn from_value_accepts_valid_rect() {
        let v = serde_json::json!({"x": 0.25, "y": 0.25, "w": 0.5, "h": 0.5});
        let r = Rect::from_value_or(&v, Rect::full());
        assert!((r.x - 0.25).abs() < 1e-12);
        assert!((r.w - 0.5).abs() < 1e-12);
    }

    #[test]
    fn from_value_falls_back_on_garbage() {
        let default = Rect::full();
        assert_eq!(
            Rect::from_value_or(&serde_json::json!("nope"), default),
            default
        );
        assert_eq!(
            Rect::from_value_or(&serde_json::json!({"x": 0.1, "y": 0.1, "w": "wide"}), default),
            default
        );
        // Zero-area after clamping → fallback.
        assert_eq!(
            Rect::from_value_or(&serde_json::json!({"x": 1.0, "y": 0.0, "w": 0.5, "h": 0.5}), default),
            default
        );
    }

    #[test]
    fn rect_roundtrips_through_json() {
        let r = Rect {
            x: 0.3,
            y: 0.25,
            w: 0.4,
            h: 0.5,
        };
        let json = serde_json::to_string(&r).unwrap();
        let back: Rect = serde_json::from_str(&json).unwrap();
        assert_eq!(r, back);
    }
}
