//! MapOpt Core Library
//!
//! Feature model, viewport culling and priority-aware sampling for dense map
//! feature layers. Everything here is pure and deterministic; the adaptive
//! control loop that decides *how much* to keep lives in `mapopt-render`.

pub mod error;
pub mod types;
pub mod cull;
pub mod sample;

// Re-export commonly used types and functions
pub use error::{CoreError, CoreResult};
pub use types::{BoundingBox, Feature, FeatureCollection, FeatureProperties, Geometry, Position};
pub use cull::{is_visible, CullResult, ViewportCuller};
pub use sample::{priority_score, FeatureSampler, PriorityTier, SamplingStrategy};

/// Version information for the MapOpt core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
