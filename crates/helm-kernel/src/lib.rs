//! `helm-kernel` – safety & semantics rules.
//!
//! The kernel does not think; it enforces rules. Everything here is pure:
//! no I/O, no clocks, no services.
//!
//! # Modules
//!
//! - [`shield`] – [`maybe_override`][shield::maybe_override]: the safety
//!   decision function evaluated before the planner on every step; it can
//!   veto any planned action with a safe recovery plan. Also
//!   [`home_ok`][shield::home_ok] and the shield-side argument synthesis
//!   [`choose_arg_values`][shield::choose_arg_values].
//! - [`semantics`] – heuristic classification of manifest commands into the
//!   closed [`KNOWN_TAGS`][semantics::KNOWN_TAGS] vocabulary, and
//!   [`infer_capabilities`][semantics::infer_capabilities] deriving the
//!   abstract-action → (node, token) [`CapabilityMapping`][semantics::CapabilityMapping].

pub mod semantics;
pub mod shield;

pub use semantics::{
    CapabilityMapping, KNOWN_TAGS, SemanticsMap, SemanticsRecord, SemanticsSource,
    classify_heuristic, infer_capabilities, infer_tags_heuristic,
};
pub use shield::{Steer, choose_arg_values, home_ok, maybe_override};
