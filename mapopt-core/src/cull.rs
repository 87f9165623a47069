//! Viewport culling
//!
//! Splits a feature collection into visible and culled sets against a
//! buffered viewport. Visibility is a vertex-in-box test: a line or polygon is
//! visible when at least one of its vertices falls inside the expanded bounds.
//! A shape that fully encloses the viewport without a vertex inside it is
//! therefore culled.

use crate::types::{BoundingBox, Feature, Geometry};
use rayon::prelude::*;

/// Collections at or above this size are tested in parallel
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 4096;

/// Result of a culling pass, borrowing from the input collection
#[derive(Debug, Clone, Default)]
pub struct CullResult<'a> {
    pub visible: Vec<&'a Feature>,
    pub culled: Vec<&'a Feature>,
}

impl CullResult<'_> {
    pub fn total(&self) -> usize {
        self.visible.len() + self.culled.len()
    }
}

/// Filters features against a buffered viewport
#[derive(Debug, Clone)]
pub struct ViewportCuller {
    parallel_threshold: usize,
}

impl Default for ViewportCuller {
    fn default() -> Self {
        Self::new(DEFAULT_PARALLEL_THRESHOLD)
    }
}

impl ViewportCuller {
    pub fn new(parallel_threshold: usize) -> Self {
        Self { parallel_threshold }
    }

    /// Cull `features` against `bounds` grown by `buffer_ratio` on every side.
    /// Input order is preserved in both output sets.
    pub fn cull<'a>(&self, features: &'a [Feature], bounds: &BoundingBox, buffer_ratio: f64) -> CullResult<'a> {
        let expanded = bounds.expanded(buffer_ratio.max(0.0));

        let mask: Vec<bool> = if features.len() >= self.parallel_threshold {
            features.par_iter().map(|f| is_visible(f, &expanded)).collect()
        } else {
            features.iter().map(|f| is_visible(f, &expanded)).collect()
        };

        let mut result = CullResult {
            visible: Vec::with_capacity(features.len()),
            culled: Vec::new(),
        };
        for (feature, visible) in features.iter().zip(mask) {
            if visible {
                result.visible.push(feature);
            } else {
                result.culled.push(feature);
            }
        }

        log::trace!(
            "Culled {} of {} features against {}",
            result.culled.len(),
            features.len(),
            expanded
        );
        result
    }
}

/// Visibility of a single feature against already-expanded bounds.
///
/// Features without geometry or without any usable vertex are not visible.
/// Geometry types the culler does not understand are always visible.
pub fn is_visible(feature: &Feature, bounds: &BoundingBox) -> bool {
    match &feature.geometry {
        None => false,
        Some(Geometry::Point(p)) => bounds.contains(p),
        Some(Geometry::LineString(line)) => line.iter().any(|p| bounds.contains(p)),
        Some(Geometry::Polygon(rings)) => rings
            .first()
            .map(|outer| outer.iter().any(|p| bounds.contains(p)))
            .unwrap_or(false),
        Some(Geometry::Unknown { .. }) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Position;

    fn viewport() -> BoundingBox {
        BoundingBox::new(10.0, 0.0, 10.0, 0.0).unwrap()
    }

    #[test]
    fn test_center_point_always_visible() {
        let bounds = viewport();
        let center = bounds.center();
        let feature = Feature::point(center.lng, center.lat);
        for ratio in [0.0, 0.1, 0.5, 2.0] {
            let result = ViewportCuller::default().cull(std::slice::from_ref(&feature), &bounds, ratio);
            assert_eq!(result.visible.len(), 1, "ratio {ratio}");
        }
    }

    #[test]
    fn test_buffer_controls_edge_visibility() {
        let bounds = viewport();
        let outside = [Feature::point(10.5, 5.0)];
        let culler = ViewportCuller::default();

        assert_eq!(culler.cull(&outside, &bounds, 0.0).culled.len(), 1);
        assert_eq!(culler.cull(&outside, &bounds, 0.1).visible.len(), 1);
    }

    #[test]
    fn test_line_and_polygon_vertex_rules() {
        let bounds = viewport();
        let crossing_line = Feature::line_string(&[(-5.0, 5.0), (5.0, 5.0)]);
        let outside_line = Feature::line_string(&[(-5.0, -5.0), (-1.0, -1.0)]);
        let touching_polygon = Feature::polygon(&[(9.0, 9.0), (20.0, 9.0), (20.0, 20.0)]);
        // Encloses the viewport but has no vertex inside it
        let enclosing_polygon = Feature::polygon(&[(-50.0, -50.0), (50.0, -50.0), (50.0, 50.0), (-50.0, 50.0)]);

        let features = vec![crossing_line, outside_line, touching_polygon, enclosing_polygon];
        let result = ViewportCuller::default().cull(&features, &bounds, 0.0);

        assert!(std::ptr::eq(result.visible[0], &features[0]));
        assert!(std::ptr::eq(result.visible[1], &features[2]));
        assert_eq!(result.visible.len(), 2);
        assert_eq!(result.culled.len(), 2);
    }

    #[test]
    fn test_polygon_uses_outer_ring_only() {
        let bounds = viewport();
        let mut polygon = Feature::polygon(&[(-5.0, -5.0), (-4.0, -5.0), (-4.0, -4.0)]);
        if let Some(Geometry::Polygon(rings)) = polygon.geometry.as_mut() {
            rings.push(vec![Position::new(5.0, 5.0)]);
        }
        assert!(!is_visible(&polygon, &bounds));
    }

    #[test]
    fn test_missing_and_unknown_geometry() {
        let bounds = viewport();
        let missing = Feature::new(None);
        let empty_line = Feature::line_string(&[]);
        let unknown = Feature::new(Some(Geometry::Unknown {
            kind: "MultiPolygon".into(),
            raw: serde_json::json!({ "type": "MultiPolygon", "coordinates": [] }),
        }));

        assert!(!is_visible(&missing, &bounds));
        assert!(!is_visible(&empty_line, &bounds));
        assert!(is_visible(&unknown, &bounds));
    }

    #[test]
    fn test_parallel_path_matches_serial() {
        let bounds = viewport();
        let features: Vec<Feature> = (0..500)
            .map(|i| Feature::point((i % 40) as f64 - 15.0, (i % 23) as f64 - 6.0))
            .collect();

        let serial = ViewportCuller::new(usize::MAX).cull(&features, &bounds, 0.05);
        let parallel = ViewportCuller::new(1).cull(&features, &bounds, 0.05);

        assert_eq!(serial.visible, parallel.visible);
        assert_eq!(serial.culled, parallel.culled);
        assert_eq!(parallel.total(), features.len());
    }
}
