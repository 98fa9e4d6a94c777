use serde::{Deserialize, Serialize};

use crate::grid::{GeoBounds, Grid};

/// A scalar raster clipped to the AOI.
pub type RasterLayer = Grid<f32>;

/// The ten input layers a run consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    /// Summer daytime land-surface temperature (°C).
    Temperature,
    /// NDVI, -1..1.
    Vegetation,
    /// IGBP land-cover class code.
    LandCover,
    /// Night-time light radiance.
    NightLight,
    /// White-sky shortwave albedo, 0..1.
    Albedo,
    /// Built-up surface fraction.
    Imperviousness,
    /// Building footprint density.
    BuildingDensity,
    /// Population count per pixel.
    Population,
    /// Distance to nearest surface water (m).
    WaterDistance,
    /// Elevation above sea level (m).
    Elevation,
}

/// How a layer is brought onto another grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resampling {
    Nearest,
    Bilinear,
}

impl LayerKind {
    pub const ALL: [LayerKind; 10] = [
        LayerKind::Temperature,
        LayerKind::Vegetation,
        LayerKind::LandCover,
        LayerKind::NightLight,
        LayerKind::Albedo,
        LayerKind::Imperviousness,
        LayerKind::BuildingDensity,
        LayerKind::Population,
        LayerKind::WaterDistance,
        LayerKind::Elevation,
    ];

    /// Stable identifier used for file names and logs.
    pub fn name(self) -> &'static str {
        match self {
            LayerKind::Temperature => "temperature",
            LayerKind::Vegetation => "vegetation",
            LayerKind::LandCover => "landcover",
            LayerKind::NightLight => "nightlight",
            LayerKind::Albedo => "albedo",
            LayerKind::Imperviousness => "imperviousness",
            LayerKind::BuildingDensity => "building_density",
            LayerKind::Population => "population",
            LayerKind::WaterDistance => "water_distance",
            LayerKind::Elevation => "elevation",
        }
    }

    /// Layers that do not change with the analysis year.
    pub fn is_static(self) -> bool {
        matches!(self, LayerKind::WaterDistance | LayerKind::Elevation)
    }

    /// Categorical layers must never be interpolated.
    pub fn resampling(self) -> Resampling {
        match self {
            LayerKind::LandCover => Resampling::Nearest,
            _ => Resampling::Bilinear,
        }
    }
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One loaded layer per kind, all clipped to the same AOI.
#[derive(Debug, Clone)]
pub struct LayerSet {
    pub temperature: RasterLayer,
    pub vegetation: RasterLayer,
    pub landcover: RasterLayer,
    pub nightlight: RasterLayer,
    pub albedo: RasterLayer,
    pub imperviousness: RasterLayer,
    pub building_density: RasterLayer,
    pub population: RasterLayer,
    pub water_distance: RasterLayer,
    pub elevation: RasterLayer,
}

impl LayerSet {
    /// Build from a loader called once per kind, in `LayerKind::ALL` order.
    pub fn try_from_fn<E, F>(mut load: F) -> Result<Self, E>
    where
        F: FnMut(LayerKind) -> Result<RasterLayer, E>,
    {
        Ok(Self {
            temperature: load(LayerKind::Temperature)?,
            vegetation: load(LayerKind::Vegetation)?,
            landcover: load(LayerKind::LandCover)?,
            nightlight: load(LayerKind::NightLight)?,
            albedo: load(LayerKind::Albedo)?,
            imperviousness: load(LayerKind::Imperviousness)?,
            building_density: load(LayerKind::BuildingDensity)?,
            population: load(LayerKind::Population)?,
            water_distance: load(LayerKind::WaterDistance)?,
            elevation: load(LayerKind::Elevation)?,
        })
    }

    pub fn get(&self, kind: LayerKind) -> &RasterLayer {
        match kind {
            LayerKind::Temperature => &self.temperature,
            LayerKind::Vegetation => &self.vegetation,
            LayerKind::LandCover => &self.landcover,
            LayerKind::NightLight => &self.nightlight,
            LayerKind::Albedo => &self.albedo,
            LayerKind::Imperviousness => &self.imperviousness,
            LayerKind::BuildingDensity => &self.building_density,
            LayerKind::Population => &self.population,
            LayerKind::WaterDistance => &self.water_distance,
            LayerKind::Elevation => &self.elevation,
        }
    }
}

impl Grid<f32> {
    /// Resample onto a `width × height` grid over `bounds`, keeping only cells
    /// whose centre passes `keep` (typically AOI containment).
    pub fn resample<F>(&self, width: usize, height: usize, bounds: GeoBounds, method: Resampling, keep: F) -> Grid<f32>
    where
        F: Fn(usize, usize) -> bool,
    {
        Grid::from_fn(width, height, bounds, |r, c, lon, lat| {
            if !keep(r, c) {
                return None;
            }
            match method {
                Resampling::Nearest => self.sample_nearest(lon, lat),
                Resampling::Bilinear => self.sample_bilinear(lon, lat),
            }
        })
    }

    /// Resample onto the geometry of `template`, keeping cells where it has a value.
    /// A layer already on that grid is copied cell for cell.
    pub fn resample_like<T: Copy>(&self, template: &Grid<T>, method: Resampling) -> Grid<f32> {
        if self.same_geometry(template) {
            return Grid::from_fn(self.width, self.height, self.bounds, |r, c, _, _| {
                template.get(r, c).and(self.get(r, c))
            });
        }
        self.resample(template.width, template.height, template.bounds, method, |r, c| {
            template.get(r, c).is_some()
        })
    }
}
