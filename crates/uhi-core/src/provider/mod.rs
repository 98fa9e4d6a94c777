//! Layer providers: where boundaries and raster layers come from.
//!
//! A provider is built from explicit startup configuration; nothing here
//! touches process-wide state, so tests can swap in `SyntheticProvider`.

pub mod directory;
pub mod synthetic;

use crate::aoi::Aoi;
use crate::error::Result;
use crate::layers::{LayerKind, LayerSet, RasterLayer};
use crate::reduce::{self, Reducer};
use crate::sampler::{self, SampleRecord};

pub use directory::DirectoryProvider;
pub use synthetic::SyntheticProvider;

/// Region reductions and point sampling over an AOI.
///
/// Every analysis stage that summarises or samples a layer goes through this
/// trait, so a provider backed by a remote catalog can answer server-side.
/// The defaults compute locally.
pub trait RegionOps {
    fn reduce_region(
        &self,
        kind: LayerKind,
        layer: &RasterLayer,
        reducer: Reducer,
        aoi: &Aoi,
        scale_m: f64,
        min_valid: usize,
    ) -> Result<f64> {
        reduce::reduce_region(kind, layer, reducer, aoi, scale_m, min_valid)
    }

    fn sample_region(
        &self,
        layers: &[(&str, &RasterLayer)],
        aoi: &Aoi,
        scale_m: f64,
        count: usize,
        seed: u64,
    ) -> Vec<SampleRecord> {
        sampler::sample_region(layers, aoi, scale_m, count, seed)
    }
}

/// Region operations computed in-process on the loaded grids.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalRegionOps;

impl RegionOps for LocalRegionOps {}

impl<R: RegionOps + ?Sized> RegionOps for &R {
    fn reduce_region(
        &self,
        kind: LayerKind,
        layer: &RasterLayer,
        reducer: Reducer,
        aoi: &Aoi,
        scale_m: f64,
        min_valid: usize,
    ) -> Result<f64> {
        (**self).reduce_region(kind, layer, reducer, aoi, scale_m, min_valid)
    }

    fn sample_region(
        &self,
        layers: &[(&str, &RasterLayer)],
        aoi: &Aoi,
        scale_m: f64,
        count: usize,
        seed: u64,
    ) -> Vec<SampleRecord> {
        (**self).sample_region(layers, aoi, scale_m, count, seed)
    }
}

pub trait LayerProvider: RegionOps {
    /// Resolve a city to its boundary. `NotFound` when it cannot be resolved.
    fn geocode_boundary(&self, city: &str, country: Option<&str>) -> Result<Aoi>;

    /// Load one layer clipped to the AOI. Implementations may fall back to a
    /// secondary source; only "no source at all" is an error.
    fn load_layer(&self, kind: LayerKind, year: i32, aoi: &Aoi) -> Result<RasterLayer>;

    /// All ten layers for `year`. Stops at the first layer with no source.
    fn load_layers(&self, year: i32, aoi: &Aoi) -> Result<LayerSet> {
        LayerSet::try_from_fn(|kind| {
            let layer = self.load_layer(kind, year, aoi)?;
            log::debug!(
                "loaded {kind} for {year}: {}×{} px, {} valid",
                layer.width,
                layer.height,
                layer.count_present()
            );
            Ok(layer)
        })
    }
}

impl<P: LayerProvider + ?Sized> LayerProvider for &P {
    fn geocode_boundary(&self, city: &str, country: Option<&str>) -> Result<Aoi> {
        (**self).geocode_boundary(city, country)
    }

    fn load_layer(&self, kind: LayerKind, year: i32, aoi: &Aoi) -> Result<RasterLayer> {
        (**self).load_layer(kind, year, aoi)
    }

    fn load_layers(&self, year: i32, aoi: &Aoi) -> Result<LayerSet> {
        (**self).load_layers(year, aoi)
    }
}

/// Case- and whitespace-insensitive name comparison for geocoding.
pub(crate) fn same_place(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// "City, Country" for error messages.
pub(crate) fn place_query(city: &str, country: Option<&str>) -> String {
    match country {
        Some(country) => format!("{city}, {country}"),
        None => city.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aoi::square;
    use approx::assert_relative_eq;

    #[test]
    fn default_region_ops_compute_locally() {
        let aoi = square("box", 0.0, 0.0, 0.05).unwrap();
        let provider = SyntheticProvider::new(3);
        let layer = provider.load_layer(LayerKind::Temperature, 2023, &aoi).unwrap();

        let via_trait = provider
            .reduce_region(LayerKind::Temperature, &layer, Reducer::Percentile(80.0), &aoi, 300.0, 10)
            .unwrap();
        let direct = reduce::reduce_region(LayerKind::Temperature, &layer, Reducer::Percentile(80.0), &aoi, 300.0, 10)
            .unwrap();
        assert_relative_eq!(via_trait, direct);

        let records = provider.sample_region(&[("lst", &layer)], &aoi, 300.0, 20, 42);
        assert_eq!(records.len(), 20);
        assert!(records.iter().all(|r| r.attributes["lst"].is_some()));
    }

    #[test]
    fn place_matching_ignores_case_and_padding() {
        assert!(same_place(" Phoenix", "phoenix "));
        assert!(!same_place("Phoenix", "Tucson"));
        assert_eq!(place_query("Phoenix", Some("USA")), "Phoenix, USA");
    }
}
