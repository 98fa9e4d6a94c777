//! Urban heat island hotspot detection.
//!
//! Percentile voting over eight hot-indicative conditions gives a preliminary
//! raster mask; local spatial statistics on a point sample confirm which
//! parts of it are genuine clusters.

pub mod aoi;
pub mod config;
pub mod error;
pub mod fusion;
pub mod grid;
pub mod layers;
pub mod mask;
pub mod pipeline;
pub mod provider;
pub mod reduce;
pub mod sampler;
pub mod stats;
pub mod voting;

pub use aoi::Aoi;
pub use config::{AnalysisConfig, ProviderConfig};
pub use error::{Result, UhiError};
pub use fusion::{FusionOutcome, FusionSkipReason};
pub use grid::{GeoBounds, Grid};
pub use layers::{LayerKind, LayerSet, RasterLayer};
pub use mask::HotspotMask;
pub use pipeline::{analyze_hotspots, analyze_hotspots_with, AnalysisSummary, HotspotAnalysis, HotspotPipeline, RunRequest};
pub use provider::{DirectoryProvider, LayerProvider, LocalRegionOps, RegionOps, SyntheticProvider};
pub use sampler::SamplePoint;
pub use stats::{SpatialStatsOutcome, SpatialStatsResult};
pub use voting::{Thresholds, VoteCountLayer};
