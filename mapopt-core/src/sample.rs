//! Feature downsampling
//!
//! Reduces an over-budget collection to a target count. The strategy is picked
//! from the quality factor of the active level:
//!
//! - `q >= 0.8`: priority-stratified sampling (keeps the most important features)
//! - `0.5 <= q < 0.8`: uniform stride sampling (even spatial/temporal coverage)
//! - `q < 0.5`: truncation (cheapest, keeps input order)
//!
//! Every strategy is deterministic and returns exactly `min(n, max_features)`
//! items. The input slice is never reordered.

use crate::types::Feature;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Score at or above which a feature is high priority
pub const HIGH_PRIORITY_SCORE: u32 = 5;
/// Score at or above which a feature is at least medium priority
pub const MEDIUM_PRIORITY_SCORE: u32 = 2;

/// Downsampling strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStrategy {
    PriorityStratified,
    UniformStride,
    Truncation,
}

impl SamplingStrategy {
    pub fn for_quality(quality_factor: f64) -> Self {
        if quality_factor >= 0.8 {
            SamplingStrategy::PriorityStratified
        } else if quality_factor >= 0.5 {
            SamplingStrategy::UniformStride
        } else {
            SamplingStrategy::Truncation
        }
    }
}

impl fmt::Display for SamplingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SamplingStrategy::PriorityStratified => "priority-stratified",
            SamplingStrategy::UniformStride => "uniform-stride",
            SamplingStrategy::Truncation => "truncation",
        };
        f.write_str(name)
    }
}

/// Priority tier derived from a feature's score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriorityTier {
    High,
    Medium,
    Low,
}

impl PriorityTier {
    pub fn from_score(score: u32) -> Self {
        if score >= HIGH_PRIORITY_SCORE {
            PriorityTier::High
        } else if score >= MEDIUM_PRIORITY_SCORE {
            PriorityTier::Medium
        } else {
            PriorityTier::Low
        }
    }

    fn index(self) -> usize {
        match self {
            PriorityTier::High => 0,
            PriorityTier::Medium => 1,
            PriorityTier::Low => 2,
        }
    }
}

/// Additive priority score from status, type, importance and activity.
///
/// Status counts once (red > orange > yellow); every other attribute adds its
/// own weight independently.
pub fn priority_score(feature: &Feature) -> u32 {
    let props = &feature.properties;
    let mut score = 0;

    score += match props.status.as_deref() {
        Some("red") => 10,
        Some("orange") => 5,
        Some("yellow") => 3,
        _ => 0,
    };

    let kind = props.kind.as_deref();
    if kind == Some("CCTV") {
        score += 4;
    }
    if kind == Some("sensor") {
        score += 3;
    }
    if kind == Some("patrol") {
        score += 2;
    }
    if kind == Some("bus") {
        score += 2;
    }

    score += match props.importance.as_deref() {
        Some("critical") => 8,
        Some("high") => 5,
        Some("medium") => 2,
        _ => 0,
    };

    if props.active == Some(true) {
        score += 1;
    }

    score
}

/// Quality-driven downsampler
#[derive(Debug, Clone)]
pub struct FeatureSampler {
    /// Share of the budget reserved for high-priority features, in percent
    high_share: usize,
    /// Share of the budget reserved for medium-priority features, in percent
    medium_share: usize,
}

impl Default for FeatureSampler {
    fn default() -> Self {
        Self {
            high_share: 60,
            medium_share: 30,
        }
    }
}

impl FeatureSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample with the strategy implied by `quality_factor`
    pub fn sample<T>(&self, features: &[T], max_features: usize, quality_factor: f64) -> Vec<T>
    where
        T: Borrow<Feature> + Clone,
    {
        self.sample_with(SamplingStrategy::for_quality(quality_factor), features, max_features)
    }

    pub fn sample_with<T>(&self, strategy: SamplingStrategy, features: &[T], max_features: usize) -> Vec<T>
    where
        T: Borrow<Feature> + Clone,
    {
        if features.len() <= max_features {
            return features.to_vec();
        }

        match strategy {
            SamplingStrategy::PriorityStratified => self.stratified(features, max_features),
            SamplingStrategy::UniformStride => stride(features, max_features),
            SamplingStrategy::Truncation => features[..max_features].to_vec(),
        }
    }

    /// Tiered quotas: high gets `high_share` percent of the budget, medium
    /// `medium_share` percent and low the remainder. Capacity a tier cannot use
    /// is handed to the next non-exhausted tier in priority order, so the result
    /// always fills the budget.
    fn stratified<T>(&self, features: &[T], max_features: usize) -> Vec<T>
    where
        T: Borrow<Feature> + Clone,
    {
        let mut tiers: [Vec<(u32, &T)>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        for item in features {
            let score = priority_score(item.borrow());
            tiers[PriorityTier::from_score(score).index()].push((score, item));
        }
        for tier in tiers.iter_mut() {
            // Stable: equal scores keep input order
            tier.sort_by(|a, b| b.0.cmp(&a.0));
        }

        let high = tiers[0].len().min(max_features * self.high_share / 100);
        let medium = tiers[1].len().min(max_features * self.medium_share / 100);
        let low = tiers[2].len().min(max_features - high - medium);
        let mut quotas = [high, medium, low];

        let mut spare = max_features.min(features.len()) - quotas.iter().sum::<usize>();
        for (quota, tier) in quotas.iter_mut().zip(tiers.iter()) {
            let extra = (tier.len() - *quota).min(spare);
            *quota += extra;
            spare -= extra;
        }

        log::trace!(
            "Stratified quotas high={} medium={} low={} (tier sizes {}/{}/{})",
            quotas[0],
            quotas[1],
            quotas[2],
            tiers[0].len(),
            tiers[1].len(),
            tiers[2].len()
        );

        tiers
            .iter()
            .zip(quotas)
            .flat_map(|(tier, quota)| tier[..quota].iter().map(|(_, item)| (*item).clone()))
            .collect()
    }
}

/// Evenly spaced selection: index `floor(i * n / max)` for `i in 0..max`
fn stride<T: Clone>(features: &[T], max_features: usize) -> Vec<T> {
    if max_features == 0 {
        return Vec::new();
    }
    let step = features.len() as f64 / max_features as f64;
    (0..max_features)
        .map(|i| (i as f64 * step).floor() as usize)
        .filter_map(|index| features.get(index).cloned())
        .collect()
}
