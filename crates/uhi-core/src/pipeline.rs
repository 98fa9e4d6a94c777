//! Pipeline orchestrator: runs every analysis stage in order.
//!
//! `analyze_hotspots` is the pure core: layers in, analysis out, nothing
//! written anywhere. `HotspotPipeline` adds geocoding and layer loading
//! through a `LayerProvider`, and lets that provider answer the region
//! reductions and the point sample.

use serde::{Deserialize, Serialize};

use crate::aoi::Aoi;
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::fusion::{fuse, FusionOutcome, FusionSkipReason};
use crate::layers::LayerSet;
use crate::mask::{build_preliminary, HotspotMask};
use crate::provider::{LayerProvider, LocalRegionOps, RegionOps};
use crate::sampler::{sample_points, SamplePoint};
use crate::stats::{run_spatial_stats, SpatialStatsOutcome};
use crate::voting::{run_voting, vote_histogram, Thresholds, VoteCountLayer, N_CONDITIONS};

// ── Results ───────────────────────────────────────────────────────────────────

/// Everything one (city, year) run produces.
#[derive(Debug, Clone)]
pub struct HotspotAnalysis {
    pub city: String,
    pub year: i32,
    pub thresholds: Thresholds,
    pub vote_count: VoteCountLayer,
    /// AOI mean elevation behind the elevation exclusion.
    pub mean_elevation: f64,
    pub preliminary: HotspotMask,
    pub samples: Vec<SamplePoint>,
    pub spatial_stats: SpatialStatsOutcome,
    pub fusion: FusionOutcome,
}

impl HotspotAnalysis {
    /// The validated mask, absent when fusion was skipped.
    pub fn validated(&self) -> Option<&HotspotMask> {
        self.fusion.validated()
    }

    pub fn vote_histogram(&self) -> [usize; N_CONDITIONS + 1] {
        vote_histogram(&self.vote_count)
    }

    pub fn summary(&self) -> AnalysisSummary {
        AnalysisSummary {
            city: self.city.clone(),
            year: self.year,
            vote_histogram: self.vote_histogram(),
            mean_elevation_m: self.mean_elevation,
            preliminary_px: self.preliminary.count_present(),
            samples: self.samples.len(),
            validated_px: self.validated().map(|m| m.count_present()),
            fusion_skipped: match &self.fusion {
                FusionOutcome::Validated(_) => None,
                FusionOutcome::Skipped(reason) => Some(*reason),
            },
        }
    }
}

/// Headline numbers of a run, serialized as `summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub city: String,
    pub year: i32,
    /// Pixel count per vote value 0..=8.
    pub vote_histogram: [usize; N_CONDITIONS + 1],
    pub mean_elevation_m: f64,
    pub preliminary_px: usize,
    pub samples: usize,
    pub validated_px: Option<usize>,
    pub fusion_skipped: Option<FusionSkipReason>,
}

// ── Pure core ─────────────────────────────────────────────────────────────────

/// Run the analysis on already-loaded layers.
///
/// Stage order:
///   1. Thresholds and vote count on the analysis lattice
///   2. Preliminary mask
///   3. Point sample
///   4. Spatial statistics
///   5. Consensus fusion
///
/// Reductions and sampling are computed locally.
pub fn analyze_hotspots(year: i32, aoi: &Aoi, layers: &LayerSet, config: &AnalysisConfig) -> Result<HotspotAnalysis> {
    analyze_hotspots_with(&LocalRegionOps, year, aoi, layers, config)
}

/// `analyze_hotspots` with thresholds, the mean elevation and the point
/// sample delegated to `regions`.
pub fn analyze_hotspots_with<R: RegionOps + ?Sized>(
    regions: &R,
    year: i32,
    aoi: &Aoi,
    layers: &LayerSet,
    config: &AnalysisConfig,
) -> Result<HotspotAnalysis> {
    config.validate()?;

    // ── 1. Voting ───────────────────────────────────────────────────────────
    let lattice = aoi.lattice(config.analysis_scale_m);
    log::info!(
        "analysing {} for {year} on a {}×{} lattice at {} m",
        aoi.name,
        lattice.width,
        lattice.height,
        config.analysis_scale_m
    );
    let voting = run_voting(regions, aoi, &lattice, layers, config)?;
    log::info!("vote histogram: {:?}", vote_histogram(&voting.vote_count));

    // ── 2. Preliminary mask ─────────────────────────────────────────────────
    let preliminary = build_preliminary(regions, aoi, &voting.vote_count, layers, config)?;

    // ── 3. Sampling ─────────────────────────────────────────────────────────
    let samples = sample_points(regions, aoi, &voting.vote_count, layers, config);

    // ── 4. Spatial statistics ───────────────────────────────────────────────
    let spatial_stats = run_spatial_stats(&samples, config);

    // ── 5. Fusion ───────────────────────────────────────────────────────────
    let fusion = fuse(&preliminary.mask, &spatial_stats, config)?;

    Ok(HotspotAnalysis {
        city: aoi.name.clone(),
        year,
        thresholds: voting.thresholds,
        vote_count: voting.vote_count,
        mean_elevation: preliminary.mean_elevation,
        preliminary: preliminary.mask,
        samples,
        spatial_stats,
        fusion,
    })
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub city: String,
    pub country: Option<String>,
    pub year: i32,
}

/// Geocode, load, analyse.
pub struct HotspotPipeline<P> {
    provider: P,
    config: AnalysisConfig,
}

impl<P: LayerProvider> HotspotPipeline<P> {
    pub fn new(provider: P, config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { provider, config })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Run one request. Any failed stage aborts with no partial analysis.
    pub fn run(&self, request: &RunRequest) -> Result<HotspotAnalysis> {
        let aoi = self
            .provider
            .geocode_boundary(&request.city, request.country.as_deref())?;
        log::info!("loading layers for {} ({})", aoi.name, request.year);
        let layers = self.provider.load_layers(request.year, &aoi)?;
        analyze_hotspots_with(&self.provider, request.year, &aoi, &layers, &self.config)
    }
}
