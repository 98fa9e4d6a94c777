//! Run configuration. Every design constant of the analysis lives here so a
//! run can be reproduced from its serialized config alone.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, UhiError};

/// Analysis constants. Defaults reproduce the reference method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Ground sampling distance (m) of the common grid conditions are voted on.
    pub analysis_scale_m: f64,
    /// Minimum vote count (of 8) for a preliminary hotspot.
    pub vote_threshold: u8,
    /// IGBP land-cover code for "urban and built-up".
    pub urban_class: u8,
    /// Pixels higher than AOI mean elevation + this margin (m) are excluded.
    pub elevation_margin_m: f32,
    /// Reduction scale (m) for the AOI mean elevation.
    pub elevation_scale_m: f64,
    /// Fixed distance-to-water condition (m).
    pub water_distance_m: f32,
    /// A percentile over fewer valid pixels than this is undefined.
    pub min_valid_pixels: usize,
    /// Number of points drawn by the sampler.
    pub sample_count: usize,
    /// Sampling lattice spacing (m).
    pub sample_scale_m: f64,
    pub seed: u64,
    /// Neighbours per point in the spatial weights graph.
    pub k_neighbors: usize,
    /// Fewer valid samples than this yields `InsufficientSamples`.
    pub min_samples: usize,
    /// Conditional permutations for the Local Moran pseudo p-value.
    pub permutations: usize,
    pub significance: f64,
    /// Gi* z-score a hotspot must exceed.
    pub z_critical: f64,
    /// Added to the standard deviation when z-scoring sample values.
    pub std_epsilon: f64,
    /// Radius (m) of the influence field around doubly significant points.
    pub influence_radius_m: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            analysis_scale_m: 100.0,
            vote_threshold: 6,
            urban_class: 13,
            elevation_margin_m: 200.0,
            elevation_scale_m: 90.0,
            water_distance_m: 500.0,
            min_valid_pixels: 10,
            sample_count: 1500,
            sample_scale_m: 300.0,
            seed: 42,
            k_neighbors: 8,
            min_samples: 50,
            permutations: 999,
            significance: 0.05,
            z_critical: 1.96,
            std_epsilon: 1e-9,
            influence_radius_m: 500.0,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("analysis_scale_m", self.analysis_scale_m),
            ("elevation_scale_m", self.elevation_scale_m),
            ("sample_scale_m", self.sample_scale_m),
            ("influence_radius_m", self.influence_radius_m),
        ];
        for (name, v) in positive {
            if !(v.is_finite() && v > 0.0) {
                return Err(UhiError::InvalidConfig(format!("{name} must be > 0, got {v}")));
            }
        }
        if self.vote_threshold == 0 || self.vote_threshold > 8 {
            return Err(UhiError::InvalidConfig(format!(
                "vote_threshold must be in 1..=8, got {}",
                self.vote_threshold
            )));
        }
        if self.k_neighbors == 0 || self.k_neighbors >= self.min_samples {
            return Err(UhiError::InvalidConfig(format!(
                "k_neighbors ({}) must be in 1..min_samples ({})",
                self.k_neighbors, self.min_samples
            )));
        }
        if !(0.0..1.0).contains(&self.significance) || self.significance == 0.0 {
            return Err(UhiError::InvalidConfig(format!(
                "significance must be in (0, 1), got {}",
                self.significance
            )));
        }
        if self.permutations == 0 {
            return Err(UhiError::InvalidConfig("permutations must be > 0".into()));
        }
        if self.min_valid_pixels == 0 {
            return Err(UhiError::InvalidConfig("min_valid_pixels must be > 0".into()));
        }
        Ok(())
    }
}

/// Startup configuration for a data provider, passed in explicitly at
/// construction rather than held in process-wide state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Root of the layer store (`<root>/<year>/<kind>.json`, ...).
    pub data_root: PathBuf,
    /// GeoJSON FeatureCollection of city boundaries.
    pub boundaries: PathBuf,
    /// Upstream project / account identifier, recorded for provenance.
    pub project: Option<String>,
}

impl ProviderConfig {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        let data_root = data_root.into();
        Self {
            boundaries: data_root.join("boundaries.geojson"),
            data_root,
            project: None,
        }
    }
}
