//! The component oracle seam.
//!
//! A component is the neighbourhood of code affected by a change, as
//! computed by an external analyser. The sampler only needs two things from
//! it: build one from a before/after pair, and compare two of them.

use crate::error::OracleError;

/// An opaque code component.
pub trait Component: Send + Sync {
    /// Shared fraction of `other`, in `[0, 1]`.
    fn overlap_ratio(&self, other: &Self) -> f64;
}

/// Computes components from code changes.
pub trait ComponentOracle: Send + Sync {
    type Component: Component;

    /// Component touched by the change `before → after`, expanded `hops`
    /// steps through the dependency graph.
    fn extract_component(
        &self,
        before: &str,
        after: &str,
        language: &str,
        hops: u32,
    ) -> Result<Self::Component, OracleError>;
}

/// Force an overlap value into `[0, 1]`; NaN counts as no overlap.
pub fn clamp_overlap(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
