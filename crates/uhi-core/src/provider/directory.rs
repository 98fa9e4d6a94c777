//! Provider backed by pre-exported files on disk.
//!
//! Layout under the data root:
//!
//! ```text
//! <root>/<year>/<kind>.json      primary yearly layer
//! <root>/fallback/<kind>.json    year-independent fallback release
//! <root>/static/<kind>.json      water distance, elevation
//! ```
//!
//! Each layer file is a serialized `Grid<f32>`. Boundaries come from a GeoJSON
//! FeatureCollection whose features carry `name` and optional `country`.

use std::fs;
use std::path::{Path, PathBuf};

use geojson::GeoJson;

use super::{place_query, same_place, LayerProvider, RegionOps};
use crate::aoi::Aoi;
use crate::config::ProviderConfig;
use crate::error::{Result, UhiError};
use crate::grid::Grid;
use crate::layers::{LayerKind, RasterLayer};

#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    config: ProviderConfig,
}

impl DirectoryProvider {
    pub fn new(config: ProviderConfig) -> Self {
        if let Some(project) = &config.project {
            log::info!("directory provider for project {project} at {}", config.data_root.display());
        }
        Self { config }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn primary_path(&self, kind: LayerKind, year: i32) -> PathBuf {
        if kind.is_static() {
            self.static_path(kind)
        } else {
            self.config.data_root.join(year.to_string()).join(file_name(kind))
        }
    }

    pub fn fallback_path(&self, kind: LayerKind) -> PathBuf {
        self.config.data_root.join("fallback").join(file_name(kind))
    }

    fn static_path(&self, kind: LayerKind) -> PathBuf {
        self.config.data_root.join("static").join(file_name(kind))
    }

    fn read_catalog(&self) -> Result<geojson::FeatureCollection> {
        let path = &self.config.boundaries;
        let text = fs::read_to_string(path)
            .map_err(|e| UhiError::upstream(path.display().to_string(), e))?;
        match text.parse::<GeoJson>() {
            Ok(GeoJson::FeatureCollection(fc)) => Ok(fc),
            Ok(_) => Err(UhiError::upstream(
                path.display().to_string(),
                "boundary catalog is not a FeatureCollection",
            )),
            Err(e) => Err(UhiError::upstream(path.display().to_string(), e)),
        }
    }
}

fn file_name(kind: LayerKind) -> String {
    format!("{}.json", kind.name())
}

/// Read and validate one serialized grid.
pub fn read_layer(path: &Path) -> Result<RasterLayer> {
    let text = fs::read_to_string(path)?;
    let raw: RasterLayer = serde_json::from_str(&text)?;
    Grid::from_cells(raw.width, raw.height, raw.bounds, raw.data)
}

/// Write a grid in the format `read_layer` expects.
pub fn write_layer(path: &Path, layer: &RasterLayer) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec(layer)?)?;
    Ok(())
}

fn property_str<'a>(feature: &'a geojson::Feature, key: &str) -> Option<&'a str> {
    feature.property(key).and_then(|v| v.as_str())
}

impl RegionOps for DirectoryProvider {}

impl LayerProvider for DirectoryProvider {
    fn geocode_boundary(&self, city: &str, country: Option<&str>) -> Result<Aoi> {
        let catalog = self.read_catalog()?;
        let found = catalog.features.iter().find(|f| {
            let name_ok = property_str(f, "name").is_some_and(|n| same_place(n, city));
            let country_ok = match (country, property_str(f, "country")) {
                (Some(wanted), Some(have)) => same_place(wanted, have),
                _ => true,
            };
            name_ok && country_ok
        });
        let query = place_query(city, country);
        let Some(feature) = found else {
            return Err(UhiError::NotFound { query });
        };
        let geometry = feature
            .geometry
            .as_ref()
            .ok_or_else(|| UhiError::upstream(query.clone(), "boundary feature has no geometry"))?;
        let aoi = Aoi::from_geojson(query, geometry)?;
        log::info!("geocoded {} from {}", aoi.name, self.config.boundaries.display());
        Ok(aoi)
    }

    fn load_layer(&self, kind: LayerKind, year: i32, aoi: &Aoi) -> Result<RasterLayer> {
        let primary = self.primary_path(kind, year);
        let layer = match read_layer(&primary) {
            Ok(layer) => layer,
            Err(err) if kind.is_static() => return Err(UhiError::upstream(kind.name(), err)),
            Err(primary_err) => {
                let fallback = self.fallback_path(kind);
                log::warn!(
                    "{kind} primary source {} unavailable ({primary_err}), trying {}",
                    primary.display(),
                    fallback.display()
                );
                read_layer(&fallback).map_err(|fallback_err| {
                    UhiError::upstream(
                        kind.name(),
                        format!("primary: {primary_err}; fallback: {fallback_err}"),
                    )
                })?
            }
        };

        let clipped = aoi.clip(&layer);
        if clipped.count_present() == 0 {
            return Err(UhiError::upstream(kind.name(), format!("no coverage over {}", aoi.name)));
        }
        Ok(clipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aoi::square;
    use crate::grid::GeoBounds;

    struct TempRoot(PathBuf);

    impl TempRoot {
        fn new(tag: &str) -> Self {
            let dir = std::env::temp_dir().join(format!("uhi-directory-{tag}-{}", std::process::id()));
            let _ = fs::remove_dir_all(&dir);
            fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }
    }

    impl Drop for TempRoot {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    const CATALOG: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"name": "Springfield", "country": "USA"},
                "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}
            },
            {
                "type": "Feature",
                "properties": {"name": "Springfield", "country": "Australia"},
                "geometry": {"type": "Polygon", "coordinates": [[[150,-30],[151,-30],[151,-29],[150,-29],[150,-30]]]}
            }
        ]
    }"#;

    fn provider(root: &TempRoot) -> DirectoryProvider {
        fs::write(root.0.join("boundaries.geojson"), CATALOG).unwrap();
        DirectoryProvider::new(ProviderConfig::new(&root.0))
    }

    fn flat(value: f32) -> RasterLayer {
        Grid::new(10, 10, GeoBounds::new(0.0, 1.0, 0.0, 1.0), Some(value))
    }

    #[test]
    fn geocodes_by_name_and_country() {
        let root = TempRoot::new("geocode");
        let p = provider(&root);
        let aoi = p.geocode_boundary("springfield", Some("australia")).unwrap();
        assert!(aoi.contains(150.5, -29.5));
        let aoi = p.geocode_boundary("Springfield", None).unwrap();
        assert!(aoi.contains(0.5, 0.5));
        assert!(matches!(
            p.geocode_boundary("Shelbyville", None),
            Err(UhiError::NotFound { .. })
        ));
    }

    #[test]
    fn missing_catalog_is_upstream_error() {
        let root = TempRoot::new("nocatalog");
        let p = DirectoryProvider::new(ProviderConfig::new(&root.0));
        assert!(matches!(
            p.geocode_boundary("Springfield", None),
            Err(UhiError::UpstreamData { .. })
        ));
    }

    #[test]
    fn falls_back_then_fails_when_both_missing() {
        let root = TempRoot::new("fallback");
        let p = provider(&root);
        let aoi = square("box", 0.0, 0.0, 1.0).unwrap();

        write_layer(&p.primary_path(LayerKind::Temperature, 2023), &flat(31.0)).unwrap();
        write_layer(&p.fallback_path(LayerKind::NightLight), &flat(7.0)).unwrap();

        let lst = p.load_layer(LayerKind::Temperature, 2023, &aoi).unwrap();
        assert_eq!(lst.get(5, 5), Some(31.0));
        let ntl = p.load_layer(LayerKind::NightLight, 2023, &aoi).unwrap();
        assert_eq!(ntl.get(5, 5), Some(7.0));
        assert!(matches!(
            p.load_layer(LayerKind::Population, 2023, &aoi),
            Err(UhiError::UpstreamData { .. })
        ));
    }

    #[test]
    fn static_layers_ignore_year_and_fallback() {
        let root = TempRoot::new("static");
        let p = provider(&root);
        let aoi = square("box", 0.0, 0.0, 1.0).unwrap();
        assert_eq!(p.primary_path(LayerKind::Elevation, 2001), p.primary_path(LayerKind::Elevation, 2023));

        write_layer(&p.fallback_path(LayerKind::Elevation), &flat(10.0)).unwrap();
        assert!(p.load_layer(LayerKind::Elevation, 2023, &aoi).is_err());
        write_layer(&p.primary_path(LayerKind::Elevation, 2023), &flat(10.0)).unwrap();
        assert!(p.load_layer(LayerKind::Elevation, 2023, &aoi).is_ok());
    }

    #[test]
    fn layer_outside_aoi_has_no_coverage() {
        let root = TempRoot::new("coverage");
        let p = provider(&root);
        let far = square("far", 40.0, 40.0, 1.0).unwrap();
        write_layer(&p.primary_path(LayerKind::Albedo, 2023), &flat(0.2)).unwrap();
        assert!(p.load_layer(LayerKind::Albedo, 2023, &far).is_err());
    }

    #[test]
    fn truncated_grid_is_rejected() {
        let root = TempRoot::new("truncated");
        let path = root.0.join("bad.json");
        let mut layer = flat(1.0);
        layer.data.truncate(50);
        fs::write(&path, serde_json::to_vec(&layer).unwrap()).unwrap();
        assert!(matches!(read_layer(&path), Err(UhiError::GridMismatch(_))));
    }
}
