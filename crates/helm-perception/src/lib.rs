//! `helm-perception` – turns camera frames into normalized observations.
//!
//! # Modules
//!
//! - [`tracker`] – [`MotionTracker`][tracker::MotionTracker]: background-
//!   subtraction motion detector producing a normalized bounding box with a
//!   saturating confidence proxy and an ROI edge margin.
//! - [`cache`] – [`PerceptionCache`][cache::PerceptionCache]: time-bounded
//!   memoization over the external [`VisionService`][cache::VisionService]
//!   fallback, used only when the tracker itself sees nothing.

pub mod cache;
pub mod tracker;

pub use cache::{CachedPerception, DEFAULT_MAX_AGE_MS, PerceptionCache, VisionService};
pub use tracker::{MotionTracker, confidence_from_area};
