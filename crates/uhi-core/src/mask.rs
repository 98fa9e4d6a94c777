//! Preliminary hotspot mask: strong vote agreement, on urban land, not a
//! high-elevation outlier.
//!
//! High pixels are excluded because cool uplands can collect votes through
//! indirect correlates (low albedo, sparse vegetation).

use crate::aoi::Aoi;
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::grid::Grid;
use crate::layers::{LayerKind, LayerSet, RasterLayer};
use crate::provider::RegionOps;
use crate::reduce::Reducer;
use crate::voting::VoteCountLayer;

/// Self-masked boolean layer: present cells are hotspots, everything else
/// has no value.
pub type HotspotMask = Grid<bool>;

/// `(votes ≥ threshold) ∧ urban ∧ (elevation ≤ ceiling)`, self-masked.
///
/// All three inputs must already be on the same grid. A pixel missing any
/// input is not a candidate.
pub fn preliminary_mask(
    votes: &VoteCountLayer,
    landcover: &RasterLayer,
    elevation: &RasterLayer,
    elevation_ceiling: f64,
    config: &AnalysisConfig,
) -> Result<HotspotMask> {
    votes.ensure_same_geometry(landcover, "landcover")?;
    votes.ensure_same_geometry(elevation, "elevation")?;

    let mut mask = Grid::empty(votes.width, votes.height, votes.bounds);
    for i in 0..votes.data.len() {
        let (Some(vote), Some(class), Some(elev)) = (votes.data[i], landcover.data[i], elevation.data[i]) else {
            continue;
        };
        let urban = class.round() as i64 == config.urban_class as i64;
        let low_enough = (elev as f64) <= elevation_ceiling;
        if vote >= config.vote_threshold && urban && low_enough {
            mask.data[i] = Some(true);
        }
    }
    Ok(mask)
}

#[derive(Debug, Clone)]
pub struct PreliminaryResult {
    pub mask: HotspotMask,
    /// AOI mean elevation (m) the exclusion ceiling was derived from.
    pub mean_elevation: f64,
}

/// Resample land cover and elevation onto the vote grid and build the mask.
pub fn build_preliminary<R: RegionOps + ?Sized>(
    regions: &R,
    aoi: &Aoi,
    votes: &VoteCountLayer,
    layers: &LayerSet,
    config: &AnalysisConfig,
) -> Result<PreliminaryResult> {
    let mean_elevation = regions.reduce_region(
        LayerKind::Elevation,
        &layers.elevation,
        Reducer::Mean,
        aoi,
        config.elevation_scale_m,
        config.min_valid_pixels,
    )?;
    let ceiling = mean_elevation + config.elevation_margin_m as f64;

    let landcover = layers.landcover.resample_like(votes, LayerKind::LandCover.resampling());
    let elevation = layers.elevation.resample_like(votes, LayerKind::Elevation.resampling());
    let mask = preliminary_mask(votes, &landcover, &elevation, ceiling, config)?;

    log::info!(
        "preliminary hotspots: {} px (mean elevation {mean_elevation:.1} m, ceiling {ceiling:.1} m)",
        mask.count_present()
    );
    Ok(PreliminaryResult { mask, mean_elevation })
}
