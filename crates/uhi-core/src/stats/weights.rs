//! k-nearest-neighbour spatial weights, row-standardized.

use rstar::primitives::GeomWithData;
use rstar::RTree;

type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// Each point's `k` nearest other points, each weighted `1/k`.
///
/// Distances are planar on the coordinates as given.
#[derive(Debug, Clone)]
pub struct KnnWeights {
    k: usize,
    neighbors: Vec<Vec<usize>>,
}

impl KnnWeights {
    /// Build the graph. Requires `coords.len() > k`.
    pub fn from_coords(coords: &[[f64; 2]], k: usize) -> Self {
        let tree = RTree::bulk_load(
            coords
                .iter()
                .enumerate()
                .map(|(i, &c)| IndexedPoint::new(c, i))
                .collect(),
        );
        let neighbors = coords
            .iter()
            .enumerate()
            .map(|(i, c)| {
                tree.nearest_neighbor_iter(c)
                    .filter(|p| p.data != i)
                    .take(k)
                    .map(|p| p.data)
                    .collect()
            })
            .collect();
        Self { k, neighbors }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn neighbors(&self, i: usize) -> &[usize] {
        &self.neighbors[i]
    }

    /// Spatial lag: row-standardized weighted mean of `values` over i's neighbours.
    pub fn lag(&self, values: &[f64], i: usize) -> f64 {
        let nb = &self.neighbors[i];
        if nb.is_empty() {
            return 0.0;
        }
        nb.iter().map(|&j| values[j]).sum::<f64>() / nb.len() as f64
    }
}
