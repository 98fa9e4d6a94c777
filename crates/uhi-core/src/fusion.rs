//! Consensus fusion: keep only preliminary hotspot pixels that lie within the
//! influence radius of a statistically confirmed sample point.

use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::error::{Result, UhiError};
use crate::grid::Grid;
use crate::mask::HotspotMask;
use crate::stats::SpatialStatsOutcome;

/// Why no validated mask was produced. None of these end the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionSkipReason {
    /// The statistics engine had too few samples to run.
    InsufficientSamples,
    /// No point was both a Gi* hotspot and a significant high-high cluster.
    NoSignificantPoints,
}

impl std::fmt::Display for FusionSkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FusionSkipReason::InsufficientSamples => write!(f, "insufficient samples for spatial statistics"),
            FusionSkipReason::NoSignificantPoints => write!(f, "no doubly significant sample points"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum FusionOutcome {
    Validated(HotspotMask),
    Skipped(FusionSkipReason),
}

impl FusionOutcome {
    pub fn validated(&self) -> Option<&HotspotMask> {
        match self {
            FusionOutcome::Validated(mask) => Some(mask),
            FusionOutcome::Skipped(_) => None,
        }
    }
}

/// Burn points onto `template`'s grid, summing the points per cell.
/// Cells without a point have no value; points off the grid are dropped.
pub fn rasterize_points<T: Copy>(template: &Grid<T>, points: impl IntoIterator<Item = (f64, f64)>) -> Grid<f32> {
    let mut out = Grid::empty(template.width, template.height, template.bounds);
    for (lon, lat) in points {
        if let Some((r, c)) = template.locate(lon, lat) {
            out.set(r, c, Some(out.get(r, c).unwrap_or(0.0) + 1.0));
        }
    }
    out
}

/// Cell offsets `(dr, dc)` of a disc of `radius_m` metres, given the cell
/// size as (east-west, north-south) metres. The centre is always included.
pub fn circular_offsets(cell_size_m: (f64, f64), radius_m: f64) -> Vec<(isize, isize)> {
    let (cx, cy) = cell_size_m;
    let rx = (radius_m / cx).floor() as isize;
    let ry = (radius_m / cy).floor() as isize;
    let r_sq = radius_m * radius_m;

    let mut offsets = Vec::new();
    for dr in -ry..=ry {
        for dc in -rx..=rx {
            let (ex, ny) = (dc as f64 * cx, dr as f64 * cy);
            if ex * ex + ny * ny <= r_sq {
                offsets.push((dr, dc));
            }
        }
    }
    offsets
}

/// Focal maximum over a window of `offsets`. A cell with no valued cell in
/// its window has no value.
pub fn focal_max(grid: &Grid<f32>, offsets: &[(isize, isize)]) -> Grid<f32> {
    let (w, h) = (grid.width as isize, grid.height as isize);
    Grid::from_fn(grid.width, grid.height, grid.bounds, |r, c, _, _| {
        let mut best: Option<f32> = None;
        for &(dr, dc) in offsets {
            let (nr, nc) = (r as isize + dr, c as isize + dc);
            if nr < 0 || nc < 0 || nr >= h || nc >= w {
                continue;
            }
            if let Some(v) = grid.get(nr as usize, nc as usize) {
                best = Some(best.map_or(v, |b| b.max(v)));
            }
        }
        best
    })
}

/// `preliminary ∧ influence > 0`, self-masked.
pub fn validate_mask(preliminary: &HotspotMask, influence: &Grid<f32>) -> Result<HotspotMask> {
    let validated = preliminary.zip_with(influence, |p, inf| match (p, inf) {
        (Some(true), Some(v)) if v > 0.0 => Some(true),
        _ => None,
    })?;
    Ok(validated.self_mask())
}

/// Fuse the preliminary mask with the doubly significant sample points.
pub fn fuse(preliminary: &HotspotMask, stats: &SpatialStatsOutcome, config: &AnalysisConfig) -> Result<FusionOutcome> {
    if !(config.influence_radius_m > 0.0) {
        return Err(UhiError::InvalidConfig(format!(
            "influence radius must be positive, got {}",
            config.influence_radius_m
        )));
    }
    let Some(result) = stats.computed() else {
        log::warn!("fusion skipped: {}", FusionSkipReason::InsufficientSamples);
        return Ok(FusionOutcome::Skipped(FusionSkipReason::InsufficientSamples));
    };

    let significant: Vec<(f64, f64)> = result.doubly_significant().map(|p| (p.lon, p.lat)).collect();
    if significant.is_empty() {
        log::warn!("fusion skipped: {}", FusionSkipReason::NoSignificantPoints);
        return Ok(FusionOutcome::Skipped(FusionSkipReason::NoSignificantPoints));
    }

    let points = rasterize_points(preliminary, significant.iter().copied());
    let offsets = circular_offsets(preliminary.cell_size_m(), config.influence_radius_m);
    let influence = focal_max(&points, &offsets);
    let validated = validate_mask(preliminary, &influence)?;

    log::info!(
        "fusion: {} significant points, {} of {} preliminary px validated",
        significant.len(),
        validated.count_present(),
        preliminary.count_present()
    );
    Ok(FusionOutcome::Validated(validated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GeoBounds;
    use crate::stats::{PointStats, Quadrant, SpatialStatsResult};

    fn point(id: usize, lon: f64, lat: f64, significant: bool) -> PointStats {
        PointStats {
            id,
            lon,
            lat,
            value: 1.0,
            gi_z: if significant { 3.0 } else { 0.5 },
            gi_p: if significant { 0.003 } else { 0.6 },
            gi_hotspot: significant,
            moran_i: 0.8,
            moran_p: if significant { 0.01 } else { 0.4 },
            moran_significant: significant,
            quadrant: Quadrant::HighHigh,
        }
    }

    fn computed(points: Vec<PointStats>) -> SpatialStatsOutcome {
        SpatialStatsOutcome::Computed(SpatialStatsResult { n: points.len(), points })
    }

    /// 40×40 grid of ~100 m cells on the equator, all preliminary.
    fn full_mask() -> HotspotMask {
        let deg = 100.0 / crate::grid::METRES_PER_DEGREE;
        let bounds = GeoBounds::new(0.0, 40.0 * deg, 0.0, 40.0 * deg);
        Grid::new(40, 40, bounds, Some(true))
    }

    #[test]
    fn circular_offsets_form_a_disc() {
        let offsets = circular_offsets((100.0, 100.0), 500.0);
        assert!(offsets.contains(&(0, 0)));
        assert!(offsets.contains(&(5, 0)) && offsets.contains(&(0, -5)));
        assert!(offsets.contains(&(3, 4)));
        assert!(!offsets.contains(&(4, 4)));
        // Cells coarser than the radius still keep the centre.
        assert_eq!(circular_offsets((1000.0, 1000.0), 500.0), vec![(0, 0)]);
    }

    #[test]
    fn rasterize_sums_points_per_cell() {
        let mask = full_mask();
        let (lon, lat) = mask.pixel_center(10, 10);
        let grid = rasterize_points(&mask, [(lon, lat), (lon, lat), (-5.0, -5.0)]);
        assert_eq!(grid.get(10, 10), Some(2.0));
        assert_eq!(grid.count_present(), 1);
    }

    #[test]
    fn focal_max_spreads_within_window() {
        let mask = full_mask();
        let mut grid: Grid<f32> = Grid::empty(mask.width, mask.height, mask.bounds);
        grid.set(20, 20, Some(1.0));
        grid.set(21, 20, Some(3.0));
        let out = focal_max(&grid, &circular_offsets((100.0, 100.0), 100.0));
        assert_eq!(out.get(20, 20), Some(3.0));
        assert_eq!(out.get(19, 20), Some(1.0));
        assert_eq!(out.get(20, 22), None);
    }

    #[test]
    fn validated_is_subset_near_significant_points() {
        let mut prelim = full_mask();
        // Hole in the preliminary mask right next to the point.
        prelim.set(20, 21, None);
        let (lon, lat) = prelim.pixel_center(20, 20);
        let far = prelim.pixel_center(0, 39);
        let stats = computed(vec![point(0, lon, lat, true), point(1, far.0, far.1, false)]);

        let outcome = fuse(&prelim, &stats, &AnalysisConfig::default()).unwrap();
        let validated = outcome.validated().expect("fusion ran");

        assert_eq!(validated.get(20, 20), Some(true));
        assert_eq!(validated.get(20, 25), Some(true));
        assert_eq!(validated.get(20, 21), None);
        // Outside the 500 m radius.
        assert_eq!(validated.get(20, 26), None);
        assert_eq!(validated.get(0, 0), None);
        for r in 0..prelim.height {
            for c in 0..prelim.width {
                if validated.get(r, c).is_some() {
                    assert_eq!(prelim.get(r, c), Some(true));
                }
            }
        }
    }

    #[test]
    fn no_significant_points_skips() {
        let prelim = full_mask();
        let stats = computed(vec![point(0, 0.001, 0.001, false)]);
        let outcome = fuse(&prelim, &stats, &AnalysisConfig::default()).unwrap();
        assert!(matches!(outcome, FusionOutcome::Skipped(FusionSkipReason::NoSignificantPoints)));
    }

    #[test]
    fn insufficient_samples_skip() {
        let stats = SpatialStatsOutcome::InsufficientSamples { n: 12, required: 50 };
        let outcome = fuse(&full_mask(), &stats, &AnalysisConfig::default()).unwrap();
        assert!(matches!(outcome, FusionOutcome::Skipped(FusionSkipReason::InsufficientSamples)));
    }

    #[test]
    fn zero_radius_is_rejected() {
        let cfg = AnalysisConfig { influence_radius_m: 0.0, ..AnalysisConfig::default() };
        let stats = computed(vec![point(0, 0.001, 0.001, true)]);
        assert!(matches!(fuse(&full_mask(), &stats, &cfg), Err(UhiError::InvalidConfig(_))));
    }
}
