use serde::{Deserialize, Serialize};

use crate::error::{Result, UhiError};

/// Metres per degree of latitude (and of longitude at the equator).
pub const METRES_PER_DEGREE: f64 = 111_320.0;

/// Geographic bounding box in EPSG:4326 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl GeoBounds {
    pub fn new(min_lon: f64, max_lon: f64, min_lat: f64, max_lat: f64) -> Self {
        Self { min_lon, max_lon, min_lat, max_lat }
    }

    pub fn lon_extent(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn lat_extent(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn mid_lat(&self) -> f64 {
        (self.min_lat + self.max_lat) / 2.0
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    /// Grid dimensions that give pixels of roughly `scale_m` metres.
    ///
    /// East-west spacing is corrected by cos(mid_lat). Always at least 1×1.
    pub fn dims_at_scale(&self, scale_m: f64) -> (usize, usize) {
        let cos_lat = self.mid_lat().to_radians().cos().max(1e-6);
        let w = (self.lon_extent() * METRES_PER_DEGREE * cos_lat / scale_m).round();
        let h = (self.lat_extent() * METRES_PER_DEGREE / scale_m).round();
        ((w as usize).max(1), (h as usize).max(1))
    }
}

/// A georeferenced raster of optional cells, row-major.
///
/// Row 0 is the southern edge (`min_lat`); column 0 is the western edge.
/// Cells are area-registered: cell `(r, c)` covers
/// `[min_lon + c·dx, min_lon + (c+1)·dx) × [min_lat + r·dy, min_lat + (r+1)·dy)`.
/// `None` means "no value" (outside the AOI, nodata, or masked out).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid<T> {
    pub data: Vec<Option<T>>,
    pub width: usize,
    pub height: usize,
    pub bounds: GeoBounds,
}

impl<T: Copy> Grid<T> {
    /// Create a grid with every cell set to `fill`.
    pub fn new(width: usize, height: usize, bounds: GeoBounds, fill: Option<T>) -> Self {
        Self {
            data: vec![fill; width * height],
            width,
            height,
            bounds,
        }
    }

    /// Create a grid where every cell has no value.
    pub fn empty(width: usize, height: usize, bounds: GeoBounds) -> Self {
        Self::new(width, height, bounds, None)
    }

    /// Build a grid by evaluating `f(row, col, lon, lat)` at every pixel centre.
    pub fn from_fn<F>(width: usize, height: usize, bounds: GeoBounds, mut f: F) -> Self
    where
        F: FnMut(usize, usize, f64, f64) -> Option<T>,
    {
        let mut grid = Self::empty(width, height, bounds);
        for r in 0..height {
            for c in 0..width {
                let (lon, lat) = grid.pixel_center(r, c);
                grid.data[r * width + c] = f(r, c, lon, lat);
            }
        }
        grid
    }

    /// Wrap raw row-major cells, checking the length.
    pub fn from_cells(width: usize, height: usize, bounds: GeoBounds, data: Vec<Option<T>>) -> Result<Self> {
        if data.len() != width * height {
            return Err(UhiError::GridMismatch(format!(
                "{} cells for a {width}×{height} grid",
                data.len()
            )));
        }
        Ok(Self { data, width, height, bounds })
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        self.data[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: Option<T>) {
        self.data[row * self.width + col] = val;
    }

    /// Pixel size in degrees: (dx, dy).
    pub fn pixel_size_deg(&self) -> (f64, f64) {
        (
            self.bounds.lon_extent() / self.width as f64,
            self.bounds.lat_extent() / self.height as f64,
        )
    }

    /// Pixel size in metres at the grid's mid latitude: (east-west, north-south).
    pub fn cell_size_m(&self) -> (f64, f64) {
        let (dx, dy) = self.pixel_size_deg();
        let cos_lat = self.bounds.mid_lat().to_radians().cos();
        (dx * METRES_PER_DEGREE * cos_lat, dy * METRES_PER_DEGREE)
    }

    /// (lon, lat) of the centre of cell `(row, col)`.
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let (dx, dy) = self.pixel_size_deg();
        (
            self.bounds.min_lon + (col as f64 + 0.5) * dx,
            self.bounds.min_lat + (row as f64 + 0.5) * dy,
        )
    }

    /// Cell containing (lon, lat), or None outside the bounds.
    pub fn locate(&self, lon: f64, lat: f64) -> Option<(usize, usize)> {
        if !self.bounds.contains(lon, lat) || self.width == 0 || self.height == 0 {
            return None;
        }
        let (dx, dy) = self.pixel_size_deg();
        let col = (((lon - self.bounds.min_lon) / dx).floor() as usize).min(self.width - 1);
        let row = (((lat - self.bounds.min_lat) / dy).floor() as usize).min(self.height - 1);
        Some((row, col))
    }

    /// Value of the cell containing (lon, lat).
    pub fn sample_nearest(&self, lon: f64, lat: f64) -> Option<T> {
        self.locate(lon, lat).and_then(|(r, c)| self.get(r, c))
    }

    pub fn same_geometry<U>(&self, other: &Grid<U>) -> bool {
        self.width == other.width && self.height == other.height && self.bounds == other.bounds
    }

    pub fn ensure_same_geometry<U>(&self, other: &Grid<U>, what: &str) -> Result<()> {
        if self.same_geometry(other) {
            Ok(())
        } else {
            Err(UhiError::GridMismatch(format!(
                "{what}: {}×{} {:?} vs {}×{} {:?}",
                self.width, self.height, self.bounds, other.width, other.height, other.bounds
            )))
        }
    }

    /// Apply `f` to every present value; absent cells stay absent.
    pub fn map<U: Copy, F: Fn(T) -> Option<U>>(&self, f: F) -> Grid<U> {
        Grid {
            data: self.data.iter().map(|v| v.and_then(&f)).collect(),
            width: self.width,
            height: self.height,
            bounds: self.bounds,
        }
    }

    /// Combine two grids of identical geometry cell by cell.
    pub fn zip_with<U: Copy, V: Copy, F>(&self, other: &Grid<U>, f: F) -> Result<Grid<V>>
    where
        F: Fn(Option<T>, Option<U>) -> Option<V>,
    {
        self.ensure_same_geometry(other, "zip_with")?;
        Ok(Grid {
            data: self.data.iter().zip(&other.data).map(|(&a, &b)| f(a, b)).collect(),
            width: self.width,
            height: self.height,
            bounds: self.bounds,
        })
    }

    /// Present values in row-major order.
    pub fn values(&self) -> impl Iterator<Item = T> + '_ {
        self.data.iter().filter_map(|v| *v)
    }

    pub fn count_present(&self) -> usize {
        self.data.iter().filter(|v| v.is_some()).count()
    }
}

impl Grid<f32> {
    /// Bilinear interpolation between the four surrounding pixel centres.
    ///
    /// Falls back to nearest-neighbour near edges and where any of the four
    /// neighbours has no value.
    pub fn sample_bilinear(&self, lon: f64, lat: f64) -> Option<f32> {
        let nearest = self.sample_nearest(lon, lat)?;
        let (dx, dy) = self.pixel_size_deg();
        let fx = (lon - self.bounds.min_lon) / dx - 0.5;
        let fy = (lat - self.bounds.min_lat) / dy - 0.5;
        if fx < 0.0 || fy < 0.0 {
            return Some(nearest);
        }
        let x0 = fx.floor() as usize;
        let y0 = fy.floor() as usize;
        if x0 + 1 >= self.width || y0 + 1 >= self.height {
            return Some(nearest);
        }

        let (Some(v00), Some(v10), Some(v01), Some(v11)) = (
            self.get(y0, x0),
            self.get(y0, x0 + 1),
            self.get(y0 + 1, x0),
            self.get(y0 + 1, x0 + 1),
        ) else {
            return Some(nearest);
        };

        let tx = (fx - x0 as f64) as f32;
        let ty = (fy - y0 as f64) as f32;
        Some(
            v00 * (1.0 - tx) * (1.0 - ty)
                + v10 * tx * (1.0 - ty)
                + v01 * (1.0 - tx) * ty
                + v11 * tx * ty,
        )
    }
}

impl Grid<bool> {
    /// Keep only `true` cells; `false` becomes "no value".
    pub fn self_mask(&self) -> Grid<bool> {
        self.map(|v| v.then_some(true))
    }
}
