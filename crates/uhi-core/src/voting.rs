//! Threshold & voting engine.
//!
//! Seven variables are thresholded at an AOI-local percentile, each in its
//! hot-indicative direction and at a reduction scale matching the layer's
//! native resolution. An eighth, fixed condition flags pixels far from water.
//! The per-pixel count of true conditions is the vote, 0..=8.

use serde::{Deserialize, Serialize};

use crate::aoi::Aoi;
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::grid::Grid;
use crate::layers::{LayerKind, LayerSet, RasterLayer};
use crate::provider::RegionOps;
use crate::reduce::Reducer;

/// Per-pixel vote count, 0..=8.
pub type VoteCountLayer = Grid<u8>;

/// Number of conditions in the vote.
pub const N_CONDITIONS: usize = 8;

/// Which side of the threshold indicates heat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Above,
    Below,
}

impl Direction {
    #[inline]
    pub fn exceeds(self, value: f32, threshold: f64) -> bool {
        match self {
            Direction::Above => value as f64 > threshold,
            Direction::Below => (value as f64) < threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    Temperature,
    Vegetation,
    NightLight,
    Albedo,
    Imperviousness,
    BuildingDensity,
    Population,
}

/// How one variable is thresholded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdRule {
    pub variable: Variable,
    pub layer: LayerKind,
    pub percentile: f64,
    pub direction: Direction,
    /// Reduction scale (m), matched to the source's meaningful resolution.
    pub scale_m: f64,
}

/// Fixed rule table. Order is the condition order of the vote.
pub const THRESHOLD_RULES: [ThresholdRule; 7] = [
    ThresholdRule { variable: Variable::Temperature, layer: LayerKind::Temperature, percentile: 80.0, direction: Direction::Above, scale_m: 1_000.0 },
    ThresholdRule { variable: Variable::Vegetation, layer: LayerKind::Vegetation, percentile: 20.0, direction: Direction::Below, scale_m: 300.0 },
    ThresholdRule { variable: Variable::Albedo, layer: LayerKind::Albedo, percentile: 20.0, direction: Direction::Below, scale_m: 500.0 },
    ThresholdRule { variable: Variable::Imperviousness, layer: LayerKind::Imperviousness, percentile: 80.0, direction: Direction::Above, scale_m: 100.0 },
    ThresholdRule { variable: Variable::BuildingDensity, layer: LayerKind::BuildingDensity, percentile: 80.0, direction: Direction::Above, scale_m: 300.0 },
    ThresholdRule { variable: Variable::Population, layer: LayerKind::Population, percentile: 80.0, direction: Direction::Above, scale_m: 300.0 },
    ThresholdRule { variable: Variable::NightLight, layer: LayerKind::NightLight, percentile: 80.0, direction: Direction::Above, scale_m: 500.0 },
];

/// AOI-local thresholds, one per variable. Serialized with the keys of the
/// output bundle (`lst80`, `ndvi20`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(rename = "lst80")]
    pub temperature: f64,
    #[serde(rename = "ndvi20")]
    pub vegetation: f64,
    #[serde(rename = "ntl80")]
    pub night_light: f64,
    #[serde(rename = "albedo20")]
    pub albedo: f64,
    #[serde(rename = "imperv80")]
    pub imperviousness: f64,
    #[serde(rename = "bld80")]
    pub building_density: f64,
    #[serde(rename = "pop80")]
    pub population: f64,
}

impl Thresholds {
    pub fn get(&self, variable: Variable) -> f64 {
        match variable {
            Variable::Temperature => self.temperature,
            Variable::Vegetation => self.vegetation,
            Variable::NightLight => self.night_light,
            Variable::Albedo => self.albedo,
            Variable::Imperviousness => self.imperviousness,
            Variable::BuildingDensity => self.building_density,
            Variable::Population => self.population,
        }
    }

    fn set(&mut self, variable: Variable, value: f64) {
        let slot = match variable {
            Variable::Temperature => &mut self.temperature,
            Variable::Vegetation => &mut self.vegetation,
            Variable::NightLight => &mut self.night_light,
            Variable::Albedo => &mut self.albedo,
            Variable::Imperviousness => &mut self.imperviousness,
            Variable::BuildingDensity => &mut self.building_density,
            Variable::Population => &mut self.population,
        };
        *slot = value;
    }
}

/// Compute every threshold independently over this AOI.
pub fn compute_thresholds<R: RegionOps + ?Sized>(
    regions: &R,
    aoi: &Aoi,
    layers: &LayerSet,
    config: &AnalysisConfig,
) -> Result<Thresholds> {
    let mut t = Thresholds {
        temperature: f64::NAN,
        vegetation: f64::NAN,
        night_light: f64::NAN,
        albedo: f64::NAN,
        imperviousness: f64::NAN,
        building_density: f64::NAN,
        population: f64::NAN,
    };
    for rule in &THRESHOLD_RULES {
        let value = regions.reduce_region(
            rule.layer,
            layers.get(rule.layer),
            Reducer::Percentile(rule.percentile),
            aoi,
            rule.scale_m,
            config.min_valid_pixels,
        )?;
        t.set(rule.variable, value);
    }
    Ok(t)
}

/// What a condition layer tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionKind {
    Threshold(Variable),
    /// Fixed: distance to water greater than the configured metres.
    FarFromWater,
}

/// Boolean layer on the analysis grid: true where the variable crosses its
/// threshold in the hot-indicative direction, no value where the input has none.
#[derive(Debug, Clone)]
pub struct ConditionLayer {
    pub kind: ConditionKind,
    pub mask: Grid<bool>,
}

/// Compare a layer already on the analysis grid against a threshold.
pub fn condition_mask(layer: &RasterLayer, threshold: f64, direction: Direction) -> Grid<bool> {
    layer.map(|v| v.is_finite().then(|| direction.exceeds(v, threshold)))
}

/// All eight condition layers, resampled onto `lattice`.
pub fn build_conditions(
    lattice: &Grid<bool>,
    layers: &LayerSet,
    thresholds: &Thresholds,
    config: &AnalysisConfig,
) -> Vec<ConditionLayer> {
    let mut out = Vec::with_capacity(N_CONDITIONS);
    for rule in &THRESHOLD_RULES {
        let on_grid = layers.get(rule.layer).resample_like(lattice, rule.layer.resampling());
        out.push(ConditionLayer {
            kind: ConditionKind::Threshold(rule.variable),
            mask: condition_mask(&on_grid, thresholds.get(rule.variable), rule.direction),
        });
    }
    let water = layers
        .water_distance
        .resample_like(lattice, LayerKind::WaterDistance.resampling());
    out.push(ConditionLayer {
        kind: ConditionKind::FarFromWater,
        mask: condition_mask(&water, config.water_distance_m as f64, Direction::Above),
    });
    out
}

/// Pixelwise count of true conditions.
///
/// A pixel has a vote when it lies inside the AOI and at least one condition
/// is defined there; undefined conditions count as false.
pub fn vote_count(lattice: &Grid<bool>, conditions: &[ConditionLayer]) -> Result<VoteCountLayer> {
    for cond in conditions {
        lattice.ensure_same_geometry(&cond.mask, "condition layer")?;
    }
    let mut votes = Grid::empty(lattice.width, lattice.height, lattice.bounds);
    for (i, inside) in lattice.data.iter().enumerate() {
        if inside.is_none() {
            continue;
        }
        let mut defined = false;
        let mut count = 0u8;
        for cond in conditions {
            if let Some(flag) = cond.mask.data[i] {
                defined = true;
                count += u8::from(flag);
            }
        }
        if defined {
            votes.data[i] = Some(count);
        }
    }
    Ok(votes)
}

/// Pixels per vote value 0..=8.
pub fn vote_histogram(votes: &VoteCountLayer) -> [usize; N_CONDITIONS + 1] {
    let mut bins = [0usize; N_CONDITIONS + 1];
    for v in votes.values() {
        bins[(v as usize).min(N_CONDITIONS)] += 1;
    }
    bins
}

/// Thresholds, conditions and votes for one run.
#[derive(Debug, Clone)]
pub struct VotingResult {
    pub thresholds: Thresholds,
    pub conditions: Vec<ConditionLayer>,
    pub vote_count: VoteCountLayer,
}

/// Run the whole engine on the analysis lattice.
pub fn run_voting<R: RegionOps + ?Sized>(
    regions: &R,
    aoi: &Aoi,
    lattice: &Grid<bool>,
    layers: &LayerSet,
    config: &AnalysisConfig,
) -> Result<VotingResult> {
    let thresholds = compute_thresholds(regions, aoi, layers, config)?;
    log::info!(
        "thresholds: lst80={:.2} ndvi20={:.3} ntl80={:.2} albedo20={:.3} imperv80={:.2} bld80={:.1} pop80={:.1}",
        thresholds.temperature,
        thresholds.vegetation,
        thresholds.night_light,
        thresholds.albedo,
        thresholds.imperviousness,
        thresholds.building_density,
        thresholds.population,
    );
    let conditions = build_conditions(lattice, layers, &thresholds, config);
    for cond in &conditions {
        log::debug!("{:?}: {} px true", cond.kind, cond.mask.values().filter(|&b| b).count());
    }
    let vote_count = vote_count(lattice, &conditions)?;
    Ok(VotingResult { thresholds, conditions, vote_count })
}
