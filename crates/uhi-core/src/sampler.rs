//! Reproducible point sample of the AOI for the spatial statistics.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::aoi::Aoi;
use crate::config::AnalysisConfig;
use crate::layers::{LayerSet, RasterLayer};
use crate::provider::RegionOps;
use crate::voting::VoteCountLayer;

/// Attribute name of the vote count in sampled records.
pub const VOTE_ATTRIBUTE: &str = "count_true";

/// A sampled location with the value of each requested layer there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub lon: f64,
    pub lat: f64,
    pub attributes: BTreeMap<String, Option<f32>>,
}

/// One valid sample point.
///
/// `id` is the point's position in the drawn sequence, so it survives the
/// removal of invalid draws and keys every later join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    pub id: usize,
    pub lon: f64,
    pub lat: f64,
    pub vote_count: u8,
    pub temperature: Option<f32>,
    pub vegetation: Option<f32>,
    pub night_light: Option<f32>,
}

/// Draw up to `count` distinct `scale_m` lattice sites inside the AOI,
/// uniformly at random with a fixed seed. Sites come back in row-major
/// lattice order, so identical geometry and seed give an identical sequence.
pub fn draw_sites(aoi: &Aoi, scale_m: f64, count: usize, seed: u64) -> Vec<(f64, f64)> {
    let lattice = aoi.lattice(scale_m);
    let mut candidates = Vec::with_capacity(lattice.count_present());
    for r in 0..lattice.height {
        for c in 0..lattice.width {
            if lattice.get(r, c).is_some() {
                candidates.push(lattice.pixel_center(r, c));
            }
        }
    }
    if candidates.len() <= count {
        return candidates;
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut picked = rand::seq::index::sample(&mut rng, candidates.len(), count).into_vec();
    picked.sort_unstable();
    picked.into_iter().map(|i| candidates[i]).collect()
}

/// Sample the named layers at reproducible random sites inside the AOI.
pub fn sample_region(
    layers: &[(&str, &RasterLayer)],
    aoi: &Aoi,
    scale_m: f64,
    count: usize,
    seed: u64,
) -> Vec<SampleRecord> {
    draw_sites(aoi, scale_m, count, seed)
        .into_iter()
        .map(|(lon, lat)| SampleRecord {
            lon,
            lat,
            attributes: layers
                .iter()
                .map(|(name, layer)| (name.to_string(), layer.sample_nearest(lon, lat).filter(|v| v.is_finite())))
                .collect(),
        })
        .collect()
}

/// Sample vote count plus temperature, vegetation and night light.
///
/// Draws without a vote are discarded; the rest keep their draw order.
pub fn sample_points<R: RegionOps + ?Sized>(
    regions: &R,
    aoi: &Aoi,
    votes: &VoteCountLayer,
    layers: &LayerSet,
    config: &AnalysisConfig,
) -> Vec<SamplePoint> {
    let votes_f32: RasterLayer = votes.map(|v| Some(v as f32));
    let records = regions.sample_region(
        &[
            (VOTE_ATTRIBUTE, &votes_f32),
            ("lst", &layers.temperature),
            ("ndvi", &layers.vegetation),
            ("ntl", &layers.nightlight),
        ],
        aoi,
        config.sample_scale_m,
        config.sample_count,
        config.seed,
    );
    let drawn = records.len();
    let points = points_from_records(records);
    if points.len() < drawn {
        log::warn!("discarded {} of {drawn} samples with no vote count", drawn - points.len());
    }
    log::info!("sampled {} points (seed {})", points.len(), config.seed);
    points
}

/// Keep records with a vote, preserving order and draw position.
pub fn points_from_records(records: Vec<SampleRecord>) -> Vec<SamplePoint> {
    records
        .into_iter()
        .enumerate()
        .filter_map(|(id, rec)| {
            let attr = |name: &str| rec.attributes.get(name).copied().flatten();
            let vote = attr(VOTE_ATTRIBUTE)?;
            Some(SamplePoint {
                id,
                lon: rec.lon,
                lat: rec.lat,
                vote_count: vote.round().clamp(0.0, 8.0) as u8,
                temperature: attr("lst"),
                vegetation: attr("ndvi"),
                night_light: attr("ntl"),
            })
        })
        .collect()
}
