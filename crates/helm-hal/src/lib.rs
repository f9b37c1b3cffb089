//! `helm-hal` – hardware abstraction for image capture.
//!
//! # Modules
//!
//! - [`camera`] – the [`Camera`][camera::Camera] trait hardware drivers
//!   implement, and [`CameraFrame`][camera::CameraFrame] carrying both raw
//!   pixels and the driver's encoded image bytes.
//! - [`sim`] – [`SyntheticCamera`][sim::SyntheticCamera]: a deterministic
//!   software camera rendering a movable bright blob, used by tests and
//!   hardware-free dry runs.

pub mod camera;
pub mod sim;

pub use camera::{Camera, CameraFrame};
pub use sim::{Blob, SyntheticCamera};
