//! Deterministic synthetic city: a radial urban core on fBm texture.
//!
//! Every layer is a function of the same urban-intensity field, so hot,
//! bare, bright-at-night, dense pixels coincide in the core the way they do
//! in a real city. Used by tests and by `uhi --synthetic`.

use std::collections::BTreeSet;

use noise::{NoiseFn, Perlin};

use super::{place_query, same_place, LayerProvider, RegionOps};
use crate::aoi::Aoi;
use crate::error::{Result, UhiError};
use crate::grid::{Grid, METRES_PER_DEGREE};
use crate::layers::{LayerKind, RasterLayer};

/// Wavelength (m) of the lowest noise octave.
const NOISE_WAVELENGTH_M: f64 = 4000.0;

/// IGBP classes the generator emits.
const URBAN: f32 = 13.0;
const CROPLAND: f32 = 12.0;
const WETLAND: f32 = 11.0;
const MIXED_FOREST: f32 = 5.0;

/// Perlin octaves summed into the texture.
const TEXTURE_OCTAVES: usize = 5;

/// Amplitude ratio between successive octaves (frequency doubles each time).
const OCTAVE_FALLOFF: f64 = 0.594_603_557_501_360_5; // 2^-0.75

/// Multi-octave Perlin texture over the city, roughly ±1.
struct Texture(Perlin);

impl Texture {
    fn new(seed: u32) -> Self {
        Self(Perlin::new(seed))
    }

    /// Texture at `(x, y)` metres from the AOI's south-west corner.
    fn at(&self, x: f64, y: f64) -> f64 {
        let (u, v) = (x / NOISE_WAVELENGTH_M, y / NOISE_WAVELENGTH_M);
        let (sum, _, _) = (0..TEXTURE_OCTAVES).fold((0.0, 1.0, 1.0), |(sum, amp, freq): (f64, f64, f64), _| {
            (sum + amp * self.0.get([u * freq, v * freq]), amp * OCTAVE_FALLOFF, freq * 2.0)
        });
        sum
    }
}

/// Which release of a layer is being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Release {
    Primary,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    seed: u32,
    scale_m: f64,
    cities: Vec<(String, Option<String>, Aoi)>,
    primary_failures: BTreeSet<LayerKind>,
    unavailable: BTreeSet<LayerKind>,
}

impl SyntheticProvider {
    pub fn new(seed: u32) -> Self {
        Self {
            seed,
            scale_m: 100.0,
            cities: Vec::new(),
            primary_failures: BTreeSet::new(),
            unavailable: BTreeSet::new(),
        }
    }

    /// Native resolution (m) of generated layers.
    pub fn with_scale(mut self, scale_m: f64) -> Self {
        self.scale_m = scale_m;
        self
    }

    /// Register a boundary for `geocode_boundary`.
    pub fn with_city(mut self, name: &str, country: Option<&str>, aoi: Aoi) -> Self {
        self.cities.push((name.to_string(), country.map(str::to_string), aoi));
        self
    }

    /// Make the primary source of `kind` fail so the fallback release is used.
    pub fn with_primary_failure(mut self, kind: LayerKind) -> Self {
        self.primary_failures.insert(kind);
        self
    }

    /// Make `kind` unavailable from every source.
    pub fn with_unavailable(mut self, kind: LayerKind) -> Self {
        self.unavailable.insert(kind);
        self
    }

    fn generate(&self, kind: LayerKind, year: i32, aoi: &Aoi, release: Release) -> RasterLayer {
        let bounds = aoi.bounds();
        let (w, h) = bounds.dims_at_scale(self.scale_m);
        let salt = LayerKind::ALL.iter().position(|k| *k == kind).unwrap_or(0) as u32;
        let release_salt = match release {
            Release::Primary => 0,
            Release::Fallback => 7919,
        };
        let texture = Texture::new(self.seed.wrapping_add(salt * 101 + release_salt));
        let city = CityModel::new(bounds.lon_extent(), bounds.lat_extent(), bounds.mid_lat());

        Grid::from_fn(w, h, bounds, |_, _, lon, lat| {
            if !aoi.contains(lon, lat) {
                return None;
            }
            let (x, y) = city.to_metres(lon - bounds.min_lon, lat - bounds.min_lat);
            Some(city.value(kind, year, x, y, texture.at(x, y)) as f32)
        })
    }
}

/// City geometry in metres from the AOI's south-west corner.
struct CityModel {
    width_m: f64,
    height_m: f64,
    cos_lat: f64,
    core_radius_m: f64,
}

impl CityModel {
    fn new(lon_extent: f64, lat_extent: f64, mid_lat: f64) -> Self {
        let cos_lat = mid_lat.to_radians().cos();
        let width_m = lon_extent * METRES_PER_DEGREE * cos_lat;
        let height_m = lat_extent * METRES_PER_DEGREE;
        Self { width_m, height_m, cos_lat, core_radius_m: 0.25 * width_m.min(height_m) }
    }

    fn to_metres(&self, dlon: f64, dlat: f64) -> (f64, f64) {
        (dlon * METRES_PER_DEGREE * self.cos_lat, dlat * METRES_PER_DEGREE)
    }

    /// 1 at the centre, falling off as a Gaussian.
    fn core(&self, x: f64, y: f64) -> f64 {
        let (dx, dy) = (x - 0.5 * self.width_m, y - 0.5 * self.height_m);
        (-(dx * dx + dy * dy) / (self.core_radius_m * self.core_radius_m)).exp()
    }

    /// Distance (m) to a river meandering across the northern part.
    fn water_distance(&self, x: f64, y: f64) -> f64 {
        let phase = x / self.width_m * std::f64::consts::TAU;
        let river_y = self.height_m * (0.85 + 0.03 * phase.sin());
        (y - river_y).abs()
    }

    /// Upland rising toward the north-east corner.
    fn upland(&self, x: f64, y: f64) -> f64 {
        let t = ((x / self.width_m - 0.6) / 0.4).clamp(0.0, 1.0);
        t * t * (3.0 - 2.0 * t) * (y / self.height_m)
    }

    fn value(&self, kind: LayerKind, year: i32, x: f64, y: f64, n: f64) -> f64 {
        let u = (self.core(x, y) + 0.1 * n).clamp(0.0, 1.0);
        let water = self.water_distance(x, y);
        match kind {
            LayerKind::Temperature => 28.0 + 9.0 * u + 1.2 * n + 0.03 * (year - 2000) as f64,
            LayerKind::Vegetation => {
                let riparian = if water < 300.0 { 0.1 } else { 0.0 };
                (0.75 - 0.6 * u + 0.08 * n + riparian).clamp(-1.0, 1.0)
            }
            LayerKind::LandCover => {
                let class = if u > 0.45 {
                    URBAN
                } else if water < 300.0 {
                    WETLAND
                } else if n > 0.2 {
                    MIXED_FOREST
                } else {
                    CROPLAND
                };
                class as f64
            }
            LayerKind::NightLight => 60.0 * u * u + 1.5 * n.abs(),
            LayerKind::Albedo => 0.24 - 0.1 * u + 0.015 * n,
            LayerKind::Imperviousness => (1.05 * u - 0.05 + 0.05 * n).clamp(0.0, 1.0),
            LayerKind::BuildingDensity => (0.85 * u + 0.04 * n).clamp(0.0, 1.0),
            LayerKind::Population => (6000.0 * u * u + 300.0 * (n + 1.0)).max(0.0),
            LayerKind::WaterDistance => water,
            LayerKind::Elevation => 120.0 + 40.0 * n + 900.0 * self.upland(x, y),
        }
    }
}

impl RegionOps for SyntheticProvider {}

impl LayerProvider for SyntheticProvider {
    fn geocode_boundary(&self, city: &str, country: Option<&str>) -> Result<Aoi> {
        self.cities
            .iter()
            .find(|(name, c, _)| {
                same_place(name, city)
                    && match (country, c) {
                        (Some(wanted), Some(have)) => same_place(wanted, have),
                        _ => true,
                    }
            })
            .map(|(_, _, aoi)| aoi.clone())
            .ok_or_else(|| UhiError::NotFound { query: place_query(city, country) })
    }

    fn load_layer(&self, kind: LayerKind, year: i32, aoi: &Aoi) -> Result<RasterLayer> {
        if self.unavailable.contains(&kind) {
            return Err(UhiError::upstream(kind.name(), "no synthetic source configured"));
        }
        let release = if self.primary_failures.contains(&kind) {
            log::warn!("{kind} primary source unavailable, using fallback release");
            Release::Fallback
        } else {
            Release::Primary
        };
        Ok(self.generate(kind, year, aoi, release))
    }
}
