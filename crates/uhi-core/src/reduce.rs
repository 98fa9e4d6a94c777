//! Region reductions: a layer summarised to one number over the AOI at a
//! chosen ground sampling distance.

use serde::{Deserialize, Serialize};

use crate::aoi::Aoi;
use crate::error::{Result, UhiError};
use crate::layers::{LayerKind, RasterLayer};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Reducer {
    Mean,
    /// Percentile in 0..=100.
    Percentile(f64),
}

impl std::fmt::Display for Reducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reducer::Mean => f.write_str("mean"),
            Reducer::Percentile(p) => write!(f, "p{p}"),
        }
    }
}

/// Values of `layer` on a `scale_m` lattice over the AOI, nearest-neighbour,
/// missing and non-finite values dropped.
pub fn region_values(layer: &RasterLayer, aoi: &Aoi, scale_m: f64) -> Vec<f64> {
    let lattice = aoi.lattice(scale_m);
    let mut out = Vec::with_capacity(lattice.count_present());
    for r in 0..lattice.height {
        for c in 0..lattice.width {
            if lattice.get(r, c).is_none() {
                continue;
            }
            let (lon, lat) = lattice.pixel_center(r, c);
            if let Some(v) = layer.sample_nearest(lon, lat) {
                if v.is_finite() {
                    out.push(v as f64);
                }
            }
        }
    }
    out
}

/// Reduce `layer` over the AOI at `scale_m`.
///
/// Fails with `UndefinedReduction` when fewer than `min_valid` values remain;
/// an empty region never silently reduces to zero.
pub fn reduce_region(
    kind: LayerKind,
    layer: &RasterLayer,
    reducer: Reducer,
    aoi: &Aoi,
    scale_m: f64,
    min_valid: usize,
) -> Result<f64> {
    let mut values = region_values(layer, aoi, scale_m);
    if values.len() < min_valid.max(1) {
        return Err(UhiError::UndefinedReduction {
            layer: kind,
            reducer,
            valid: values.len(),
            required: min_valid.max(1),
        });
    }
    let value = match reducer {
        Reducer::Mean => values.iter().sum::<f64>() / values.len() as f64,
        Reducer::Percentile(p) => {
            if !(0.0..=100.0).contains(&p) {
                return Err(UhiError::InvalidConfig(format!("percentile must be in 0..=100, got {p}")));
            }
            values.sort_unstable_by(f64::total_cmp);
            percentile_sorted(&values, p)
        }
    };
    log::debug!("{kind} {reducer:?} @ {scale_m} m over {} px = {value:.4}", values.len());
    Ok(value)
}

/// Percentile of ascending-sorted `values` with linear interpolation between
/// order statistics. `values` must be non-empty.
pub fn percentile_sorted(values: &[f64], p: f64) -> f64 {
    let rank = p / 100.0 * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    values[lo] + (values[hi] - values[lo]) * frac
}
