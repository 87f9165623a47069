//! Seeded synthetic feature layers for the simulator

use mapopt_core::{BoundingBox, Feature};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const KINDS: [&str; 5] = ["CCTV", "sensor", "patrol", "bus", "crowd"];
const STATUSES: [&str; 4] = ["red", "orange", "yellow", "green"];
const IMPORTANCE: [&str; 4] = ["critical", "high", "medium", "low"];

/// Generates a reproducible mix of points, short routes and zones
pub struct FeatureGenerator {
    rng: StdRng,
    area: BoundingBox,
}

impl FeatureGenerator {
    /// Features are scattered over `area` expanded by half its span, so a
    /// viewport equal to `area` culls a realistic share of them.
    pub fn new(seed: u64, area: BoundingBox) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            area: area.expanded(0.5),
        }
    }

    pub fn generate(&mut self, count: usize) -> Vec<Feature> {
        (0..count).map(|id| self.feature(id)).collect()
    }

    fn feature(&mut self, id: usize) -> Feature {
        let roll: f64 = self.rng.gen();
        let feature = if roll < 0.8 {
            let (lng, lat) = self.position();
            Feature::point(lng, lat)
        } else if roll < 0.95 {
            let (lng, lat) = self.position();
            let route: Vec<(f64, f64)> = (0..4)
                .map(|step| (lng + step as f64 * 0.002, lat + self.rng.gen_range(-0.002..0.002)))
                .collect();
            Feature::line_string(&route)
        } else {
            let (lng, lat) = self.position();
            let d = 0.003;
            Feature::polygon(&[(lng, lat), (lng + d, lat), (lng + d, lat + d), (lng, lat + d), (lng, lat)])
        };

        let mut feature = feature
            .with_id(id as u64)
            .with_kind(self.pick(&KINDS))
            .with_active(self.rng.gen_bool(0.6));
        if self.rng.gen_bool(0.3) {
            feature = feature.with_status(self.pick(&STATUSES));
        }
        if self.rng.gen_bool(0.2) {
            feature = feature.with_importance(self.pick(&IMPORTANCE));
        }
        feature
    }

    fn position(&mut self) -> (f64, f64) {
        let lng = self.rng.gen_range(self.area.west..=self.area.east);
        let lat = self.rng.gen_range(self.area.south..=self.area.north);
        (lng, lat)
    }

    fn pick(&mut self, options: &[&'static str]) -> &'static str {
        options[self.rng.gen_range(0..options.len())]
    }
}
