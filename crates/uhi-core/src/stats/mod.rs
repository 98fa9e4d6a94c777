//! Spatial statistics engine: Gi* and Local Moran's I on the z-scored
//! sample vote counts over an 8-nearest-neighbour graph.
//!
//! The engine never fails: too few samples is reported as
//! `SpatialStatsOutcome::InsufficientSamples` so callers can still publish
//! the preliminary result.

pub mod getis_ord;
pub mod moran;
pub mod weights;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::AnalysisConfig;
use crate::sampler::SamplePoint;

pub use getis_ord::{local_gi_star, GiStar};
pub use moran::{local_moran, LocalMoran, Quadrant};
pub use weights::KnnWeights;

/// Statistics for one sample point, keyed by the sample's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointStats {
    pub id: usize,
    pub lon: f64,
    pub lat: f64,
    /// z-scored vote count the statistics were computed on.
    pub value: f64,
    pub gi_z: f64,
    pub gi_p: f64,
    pub gi_hotspot: bool,
    pub moran_i: f64,
    pub moran_p: f64,
    pub moran_significant: bool,
    pub quadrant: Quadrant,
}

impl PointStats {
    /// Gi* hotspot, significant Local Moran, and a high-high cluster.
    pub fn doubly_significant(&self) -> bool {
        self.gi_hotspot && self.moran_significant && self.quadrant == Quadrant::HighHigh
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialStatsResult {
    pub n: usize,
    /// In sample order.
    pub points: Vec<PointStats>,
}

impl SpatialStatsResult {
    pub fn doubly_significant(&self) -> impl Iterator<Item = &PointStats> {
        self.points.iter().filter(|p| p.doubly_significant())
    }

    pub fn hotspot_count(&self) -> usize {
        self.points.iter().filter(|p| p.gi_hotspot).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SpatialStatsOutcome {
    Computed(SpatialStatsResult),
    InsufficientSamples { n: usize, required: usize },
}

impl SpatialStatsOutcome {
    pub fn computed(&self) -> Option<&SpatialStatsResult> {
        match self {
            SpatialStatsOutcome::Computed(r) => Some(r),
            SpatialStatsOutcome::InsufficientSamples { .. } => None,
        }
    }

    /// Column-oriented report in the layout of `spatial_stats.json`.
    pub fn report(&self) -> serde_json::Value {
        match self {
            SpatialStatsOutcome::InsufficientSamples { n, required } => json!({
                "error": "Insufficient samples for spatial statistics",
                "n": n,
                "required": required,
            }),
            SpatialStatsOutcome::Computed(r) => json!({
                "n": r.n,
                "ids": column(&r.points, |p| json!(p.id)),
                "gi": {
                    "z_scores": column(&r.points, |p| json!(p.gi_z)),
                    "p_values": column(&r.points, |p| json!(p.gi_p)),
                    "hotspot_95_mask": column(&r.points, |p| json!(u8::from(p.gi_hotspot))),
                },
                "moran": {
                    "Is": column(&r.points, |p| json!(p.moran_i)),
                    "p_values": column(&r.points, |p| json!(p.moran_p)),
                    "significant_95_mask": column(&r.points, |p| json!(u8::from(p.moran_significant))),
                    "q": column(&r.points, |p| json!(u8::from(p.quadrant))),
                }
            }),
        }
    }
}

fn column<F: Fn(&PointStats) -> serde_json::Value>(points: &[PointStats], f: F) -> serde_json::Value {
    serde_json::Value::Array(points.iter().map(f).collect())
}

/// z-score with `eps` added to the (population) standard deviation.
pub fn standardize(values: &[f64], eps: f64) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    values.iter().map(|v| (v - mean) / (std + eps)).collect()
}

/// Run Gi* and Local Moran's I over the sample's vote counts.
pub fn run_spatial_stats(samples: &[SamplePoint], config: &AnalysisConfig) -> SpatialStatsOutcome {
    if samples.len() < config.min_samples {
        log::warn!(
            "insufficient samples for spatial statistics: {} < {}",
            samples.len(),
            config.min_samples
        );
        return SpatialStatsOutcome::InsufficientSamples {
            n: samples.len(),
            required: config.min_samples,
        };
    }

    let raw: Vec<f64> = samples.iter().map(|s| s.vote_count as f64).collect();
    let x = standardize(&raw, config.std_epsilon);
    let coords: Vec<[f64; 2]> = samples.iter().map(|s| [s.lon, s.lat]).collect();
    let weights = KnnWeights::from_coords(&coords, config.k_neighbors);

    let gi = local_gi_star(&x, &weights);
    let lm = local_moran(&x, &weights, config.permutations, config.seed);

    let points: Vec<PointStats> = samples
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let (gi_z, gi_p) = (gi.z_scores[i], gi.p_values[i]);
            PointStats {
                id: s.id,
                lon: s.lon,
                lat: s.lat,
                value: x[i],
                gi_z,
                gi_p,
                gi_hotspot: gi_z > config.z_critical && gi_p < config.significance,
                moran_i: lm.is[i],
                moran_p: lm.p_values[i],
                moran_significant: lm.p_values[i] < config.significance,
                quadrant: lm.quadrants[i],
            }
        })
        .collect();

    let result = SpatialStatsResult { n: points.len(), points };
    log::info!(
        "spatial statistics on {} samples: {} Gi* hotspots, {} doubly significant",
        result.n,
        result.hotspot_count(),
        result.doubly_significant().count()
    );
    SpatialStatsOutcome::Computed(result)
}

/// Standard normal CDF, Abramowitz & Stegun 26.2.17 (|error| < 7.5e-8).
pub fn normal_cdf(x: f64) -> f64 {
    if x < -8.0 {
        return 0.0;
    }
    if x > 8.0 {
        return 1.0;
    }
    let t = 1.0 / (1.0 + 0.231_641_9 * x.abs());
    let d = 0.398_942_280_401_432_7 * (-x * x / 2.0).exp();
    let p = d * t * (0.319_381_53 + t * (-0.356_563_782 + t * (1.781_477_937 + t * (-1.821_255_978 + t * 1.330_274_429))));
    if x > 0.0 {
        1.0 - p
    } else {
        p
    }
}

/// Two-sided p-value of a standard normal z-score.
pub fn normal_two_sided_p(z: f64) -> f64 {
    (2.0 * normal_cdf(-z.abs())).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Square lattice of samples with a block of high votes.
    fn lattice_samples(n: usize, hot: impl Fn(usize, usize) -> bool) -> Vec<SamplePoint> {
        (0..n * n)
            .map(|i| {
                let (r, c) = (i / n, i % n);
                SamplePoint {
                    id: i,
                    lon: c as f64 * 0.01,
                    lat: r as f64 * 0.01,
                    vote_count: if hot(r, c) { 7 } else { 2 },
                    temperature: None,
                    vegetation: None,
                    night_light: None,
                }
            })
            .collect()
    }

    fn line_samples(count: usize) -> Vec<SamplePoint> {
        (0..count)
            .map(|i| SamplePoint {
                id: i,
                lon: (i % 10) as f64,
                lat: (i / 10) as f64,
                vote_count: (i % 9) as u8,
                temperature: None,
                vegetation: None,
                night_light: None,
            })
            .collect()
    }

    #[test]
    fn normal_cdf_reference_values() {
        assert_abs_diff_eq!(normal_cdf(0.0), 0.5, epsilon = 1e-7);
        assert_abs_diff_eq!(normal_cdf(1.96), 0.975, epsilon = 1e-4);
        assert_abs_diff_eq!(normal_two_sided_p(1.96), 0.05, epsilon = 2e-4);
        assert_abs_diff_eq!(normal_two_sided_p(-1.96), 0.05, epsilon = 2e-4);
    }

    #[test]
    fn standardize_gives_zero_mean_unit_variance() {
        let x = standardize(&[1.0, 2.0, 3.0, 4.0, 10.0], 1e-9);
        let mean = x.iter().sum::<f64>() / 5.0;
        let var = x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 5.0;
        assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(var, 1.0, epsilon = 1e-6);
        // Constant input stays finite thanks to the epsilon.
        assert!(standardize(&[4.0; 3], 1e-9).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn forty_nine_samples_are_insufficient() {
        let cfg = AnalysisConfig::default();
        let outcome = run_spatial_stats(&line_samples(49), &cfg);
        assert_eq!(outcome, SpatialStatsOutcome::InsufficientSamples { n: 49, required: 50 });
        assert!(outcome.computed().is_none());
        assert!(outcome.report().get("error").is_some());
    }

    #[test]
    fn fifty_samples_give_full_arrays() {
        let cfg = AnalysisConfig::default();
        let outcome = run_spatial_stats(&line_samples(50), &cfg);
        let result = outcome.computed().expect("50 samples are enough");
        assert_eq!(result.n, 50);
        assert_eq!(result.points.len(), 50);
        let report = outcome.report();
        for key in ["z_scores", "p_values", "hotspot_95_mask"] {
            assert_eq!(report["gi"][key].as_array().unwrap().len(), 50);
        }
        for key in ["Is", "p_values", "significant_95_mask", "q"] {
            assert_eq!(report["moran"][key].as_array().unwrap().len(), 50);
        }
    }

    #[test]
    fn gi_hotspots_land_only_inside_the_cluster() {
        let cfg = AnalysisConfig::default();
        let in_block = |r: usize, c: usize| (3..7).contains(&r) && (3..7).contains(&c);
        let samples = lattice_samples(10, in_block);
        let result = match run_spatial_stats(&samples, &cfg) {
            SpatialStatsOutcome::Computed(r) => r,
            other => panic!("unexpected {other:?}"),
        };

        let flagged: Vec<usize> = result.points.iter().filter(|p| p.gi_hotspot).map(|p| p.id).collect();
        assert!(!flagged.is_empty());
        for p in &result.points {
            let (r, c) = (p.id / 10, p.id % 10);
            if p.gi_hotspot {
                assert!(in_block(r, c), "hotspot outside cluster at ({r}, {c})");
                assert!(p.gi_z > 1.96 && p.gi_p < 0.05);
            }
        }
        // Cluster centre is doubly significant.
        assert!(result.points[44].doubly_significant());
    }

    #[test]
    fn point_stats_keep_sample_ids() {
        let cfg = AnalysisConfig::default();
        let mut samples = line_samples(60);
        for (k, s) in samples.iter_mut().enumerate() {
            s.id = 1000 + 3 * k;
        }
        let result = run_spatial_stats(&samples, &cfg);
        let ids: Vec<usize> = result.computed().unwrap().points.iter().map(|p| p.id).collect();
        assert_eq!(ids, samples.iter().map(|s| s.id).collect::<Vec<_>>());
    }
}
