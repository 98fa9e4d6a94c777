//! Area of interest: the geocoded city boundary every layer is clipped to.

use geo::{BoundingRect, Contains, MultiPolygon, Point, Rect};
use geojson::GeoJson;

use crate::error::{Result, UhiError};
use crate::grid::{GeoBounds, Grid};

/// An immutable city boundary in EPSG:4326.
#[derive(Debug, Clone, PartialEq)]
pub struct Aoi {
    pub name: String,
    geometry: MultiPolygon<f64>,
    bounds: GeoBounds,
}

impl Aoi {
    /// Wrap a boundary polygon. Fails on an empty geometry.
    pub fn new(name: impl Into<String>, geometry: MultiPolygon<f64>) -> Result<Self> {
        let name = name.into();
        let Some(rect) = geometry.bounding_rect() else {
            return Err(UhiError::upstream(name, "boundary geometry is empty"));
        };
        let bounds = GeoBounds::new(rect.min().x, rect.max().x, rect.min().y, rect.max().y);
        Ok(Self { name, geometry, bounds })
    }

    /// Rectangular AOI, used when a geocoder only returns a bounding box.
    pub fn from_bounds(name: impl Into<String>, bounds: GeoBounds) -> Result<Self> {
        let rect = Rect::new(
            geo::coord! { x: bounds.min_lon, y: bounds.min_lat },
            geo::coord! { x: bounds.max_lon, y: bounds.max_lat },
        );
        Self::new(name, MultiPolygon(vec![rect.to_polygon()]))
    }

    /// Parse a GeoJSON `Polygon` / `MultiPolygon` geometry.
    pub fn from_geojson(name: impl Into<String>, geojson: &geojson::Geometry) -> Result<Self> {
        let name = name.into();
        let geometry = geometry_to_multipolygon(geojson)
            .ok_or_else(|| UhiError::upstream(name.clone(), "boundary is not a polygon"))?;
        Self::new(name, geometry)
    }

    /// Parse a GeoJSON document holding a bare polygon geometry.
    pub fn from_geojson_str(name: impl Into<String>, text: &str) -> Result<Self> {
        let name = name.into();
        let parsed: GeoJson = text
            .parse()
            .map_err(|e| UhiError::upstream(name.clone(), e))?;
        match parsed {
            GeoJson::Geometry(geom) => Self::from_geojson(name, &geom),
            _ => Err(UhiError::upstream(name, "expected a GeoJSON geometry")),
        }
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    pub fn bounds(&self) -> GeoBounds {
        self.bounds
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.bounds.contains(lon, lat) && self.geometry.contains(&Point::new(lon, lat))
    }

    /// Mask over the AOI bounding box at `scale_m`: `Some(true)` inside the
    /// boundary, no value outside.
    pub fn lattice(&self, scale_m: f64) -> Grid<bool> {
        let (w, h) = self.bounds.dims_at_scale(scale_m);
        Grid::from_fn(w, h, self.bounds, |_, _, lon, lat| self.contains(lon, lat).then_some(true))
    }

    /// Drop values of cells whose centre falls outside the boundary.
    pub fn clip<T: Copy>(&self, grid: &Grid<T>) -> Grid<T> {
        Grid::from_fn(grid.width, grid.height, grid.bounds, |r, c, lon, lat| {
            if self.contains(lon, lat) {
                grid.get(r, c)
            } else {
                None
            }
        })
    }
}

pub(crate) fn geometry_to_multipolygon(geom: &geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geo_geom: geo::Geometry<f64> = geom.clone().try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

/// Square AOI helper for tests and synthetic runs.
pub fn square(name: &str, min_lon: f64, min_lat: f64, size_deg: f64) -> Result<Aoi> {
    Aoi::from_bounds(name, GeoBounds::new(min_lon, min_lon + size_deg, min_lat, min_lat + size_deg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Polygon;

    fn polygon_of(points: &[(f64, f64)]) -> Polygon<f64> {
        Polygon::new(points.to_vec().into(), vec![])
    }

    #[test]
    fn rectangle_contains_interior_points_only() {
        let aoi = square("box", 10.0, 20.0, 1.0).unwrap();
        assert!(aoi.contains(10.5, 20.5));
        assert!(!aoi.contains(9.5, 20.5));
        assert!(!aoi.contains(10.5, 21.5));
    }

    #[test]
    fn triangle_excludes_corner_of_its_bbox() {
        let tri = polygon_of(&[(0.0, 0.0), (2.0, 0.0), (0.0, 2.0), (0.0, 0.0)]);
        let aoi = Aoi::new("tri", MultiPolygon(vec![tri])).unwrap();
        assert_eq!(aoi.bounds(), GeoBounds::new(0.0, 2.0, 0.0, 2.0));
        assert!(aoi.contains(0.5, 0.5));
        assert!(!aoi.contains(1.8, 1.8));
    }

    #[test]
    fn lattice_masks_outside_points() {
        let tri = polygon_of(&[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (0.0, 0.0)]);
        let aoi = Aoi::new("tri", MultiPolygon(vec![tri])).unwrap();
        let lattice = aoi.lattice(11_132.0);
        assert_eq!((lattice.width, lattice.height), (10, 10));
        let inside = lattice.count_present();
        assert!(inside > 30 && inside < 70, "inside = {inside}");
    }

    #[test]
    fn clip_keeps_grid_and_drops_outside_values() {
        let tri = polygon_of(&[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (0.0, 0.0)]);
        let aoi = Aoi::new("tri", MultiPolygon(vec![tri])).unwrap();
        let grid: Grid<f32> = Grid::new(4, 4, GeoBounds::new(0.0, 1.0, 0.0, 1.0), Some(1.0));
        let clipped = aoi.clip(&grid);
        assert!(clipped.same_geometry(&grid));
        assert_eq!(clipped.get(0, 0), Some(1.0));
        assert_eq!(clipped.get(3, 3), None);
    }

    #[test]
    fn parses_geojson_polygon() {
        let text = r#"{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}"#;
        let aoi = Aoi::from_geojson_str("sq", text).unwrap();
        assert!(aoi.contains(0.5, 0.5));
    }

    #[test]
    fn rejects_point_geometry() {
        let text = r#"{"type":"Point","coordinates":[0,0]}"#;
        assert!(matches!(
            Aoi::from_geojson_str("pt", text),
            Err(UhiError::UpstreamData { .. })
        ));
    }
}
