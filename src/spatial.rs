//! Uniform-grid spatial index.
//!
//! [`SpatialGrid`] buckets points into cubic cells whose edge length is
//! chosen close to the query radius, so a radius query only has to visit the
//! cells overlapping the query ball. Building and querying are separate
//! steps: an index over an immutable reference set is built once and then
//! queried concurrently from many threads (`&self` queries only).
//!
//! Radius queries walk the grid. k-nearest queries, whose extent is not
//! known up front, go through a k-d tree over the same points that is built
//! on the first such query and dropped on [`SpatialGrid::rebuild`].
//!
//! # Example
//!
//! ```
//! use wlop::spatial::SpatialGrid;
//! use nalgebra::Point3;
//!
//! let points = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(0.1, 0.0, 0.0),
//!     Point3::new(5.0, 0.0, 0.0),
//! ];
//! let grid = SpatialGrid::build(&points, 0.5);
//!
//! let near = grid.within_radius(&points[0], 0.5);
//! assert_eq!(near.len(), 2); // includes the query point itself
//!
//! let nearest = grid.k_nearest(&Point3::new(4.0, 0.0, 0.0), 1);
//! assert_eq!(nearest[0].index, 2);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Point3;

type CellKey = (i64, i64, i64);

/// A point returned by a neighbor query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index of the point in the indexed set.
    pub index: usize,
    /// Euclidean distance from the query position.
    pub distance: f64,
}

/// Uniform grid over a 3D point set.
#[derive(Clone)]
pub struct SpatialGrid {
    cell_size: f64,
    points: Vec<Point3<f64>>,
    /// Point indices grouped by cell.
    order: Vec<usize>,
    /// Range into `order` for each occupied cell.
    cells: HashMap<CellKey, (usize, usize)>,
    /// Nearest-neighbor tree, built lazily.
    tree: OnceLock<KdTree<f64, 3>>,
}

impl fmt::Debug for SpatialGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialGrid")
            .field("cell_size", &self.cell_size)
            .field("points", &self.points.len())
            .field("cells", &self.cells.len())
            .field("tree_built", &self.tree.get().is_some())
            .finish()
    }
}

impl SpatialGrid {
    /// Create an empty grid with the given cell size.
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size: sanitize_cell_size(cell_size),
            points: Vec::new(),
            order: Vec::new(),
            cells: HashMap::new(),
            tree: OnceLock::new(),
        }
    }

    /// Build a grid over `points` with cells of edge length `cell_size`.
    ///
    /// A non-positive or non-finite cell size falls back to 1.0.
    pub fn build(points: &[Point3<f64>], cell_size: f64) -> Self {
        let mut grid = Self::new(cell_size);
        grid.rebuild(points, cell_size);
        grid
    }

    /// Re-index a (possibly different) point set, reusing allocations.
    pub fn rebuild(&mut self, points: &[Point3<f64>], cell_size: f64) {
        self.cell_size = sanitize_cell_size(cell_size);
        self.points.clear();
        self.points.extend_from_slice(points);
        self.order.clear();
        self.cells.clear();
        self.tree = OnceLock::new();

        let mut keyed: Vec<(CellKey, usize)> = points
            .iter()
            .enumerate()
            .map(|(i, p)| (self.cell_of(p), i))
            .collect();
        keyed.sort_unstable();

        let mut start = 0;
        while start < keyed.len() {
            let key = keyed[start].0;
            let mut end = start;
            while end < keyed.len() && keyed[end].0 == key {
                self.order.push(keyed[end].1);
                end += 1;
            }
            self.cells.insert(key, (start, end));
            start = end;
        }
    }

    /// Number of indexed points.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the grid indexes no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Edge length of a grid cell.
    #[inline]
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// The indexed positions, in their original order.
    #[inline]
    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    /// Position of an indexed point.
    #[inline]
    pub fn point(&self, index: usize) -> &Point3<f64> {
        &self.points[index]
    }

    /// Visit every point within `radius` of `query` (inclusive).
    ///
    /// The callback receives the point index and its distance to `query`.
    /// Visiting order is unspecified.
    pub fn for_each_within<F>(&self, query: &Point3<f64>, radius: f64, mut f: F)
    where
        F: FnMut(usize, f64),
    {
        if self.is_empty() || radius.is_nan() || radius < 0.0 || !is_finite_point(query) {
            return;
        }

        let reach = (radius / self.cell_size).ceil();
        let span = 2.0 * reach + 1.0;

        // Scanning every point in cell order is cheaper than walking a block
        // larger than the occupied cells.
        if !reach.is_finite() || span * span * span > self.cells.len() as f64 {
            self.visit_range(0, self.order.len(), query, radius, &mut f);
            return;
        }

        let reach = reach as i64;
        let (cx, cy, cz) = self.cell_of(query);
        for dx in -reach..=reach {
            for dy in -reach..=reach {
                for dz in -reach..=reach {
                    let key = (
                        cx.saturating_add(dx),
                        cy.saturating_add(dy),
                        cz.saturating_add(dz),
                    );
                    if let Some(&(start, end)) = self.cells.get(&key) {
                        self.visit_range(start, end, query, radius, &mut f);
                    }
                }
            }
        }
    }

    /// All points within `radius` of `query`, inclusive of a point located
    /// exactly at `query`.
    pub fn within_radius(&self, query: &Point3<f64>, radius: f64) -> Vec<Neighbor> {
        let mut out = Vec::new();
        self.within_radius_into(query, radius, &mut out);
        out
    }

    /// Like [`within_radius`](Self::within_radius) but writes into `out`
    /// (cleared first) to avoid allocation in hot loops.
    pub fn within_radius_into(&self, query: &Point3<f64>, radius: f64, out: &mut Vec<Neighbor>) {
        out.clear();
        self.for_each_within(query, radius, |index, distance| {
            out.push(Neighbor { index, distance });
        });
    }

    /// Count points within `radius` of `query`.
    pub fn count_within(&self, query: &Point3<f64>, radius: f64) -> usize {
        let mut count = 0;
        self.for_each_within(query, radius, |_, _| count += 1);
        count
    }

    /// The `k` points nearest to `query`, sorted by increasing distance.
    ///
    /// Returns fewer than `k` neighbors only when the grid holds fewer
    /// (finite) points.
    pub fn k_nearest(&self, query: &Point3<f64>, k: usize) -> Vec<Neighbor> {
        let wanted = k.min(self.len());
        if wanted == 0 || !is_finite_point(query) {
            return Vec::new();
        }

        let tree = self.tree.get_or_init(|| {
            let mut tree = KdTree::new();
            for (i, p) in self.points.iter().enumerate() {
                if is_finite_point(p) {
                    tree.add(&[p.x, p.y, p.z], i as u64);
                }
            }
            tree
        });

        let mut found: Vec<Neighbor> = tree
            .nearest_n::<SquaredEuclidean>(&[query.x, query.y, query.z], wanted)
            .into_iter()
            .map(|n| Neighbor {
                index: n.item as usize,
                distance: n.distance.sqrt(),
            })
            .collect();
        found.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.index.cmp(&b.index))
        });
        found
    }

    /// The single nearest point to `query`.
    pub fn nearest(&self, query: &Point3<f64>) -> Option<Neighbor> {
        self.k_nearest(query, 1).into_iter().next()
    }

    fn visit_range<F>(&self, start: usize, end: usize, query: &Point3<f64>, radius: f64, f: &mut F)
    where
        F: FnMut(usize, f64),
    {
        for &index in &self.order[start..end] {
            let distance = (self.points[index] - query).norm();
            if distance <= radius {
                f(index, distance);
            }
        }
    }

    #[inline]
    fn cell_of(&self, p: &Point3<f64>) -> CellKey {
        let inv = 1.0 / self.cell_size;
        (
            (p.x * inv).floor() as i64,
            (p.y * inv).floor() as i64,
            (p.z * inv).floor() as i64,
        )
    }
}

fn sanitize_cell_size(cell_size: f64) -> f64 {
    if cell_size > 0.0 && cell_size.is_finite() {
        cell_size
    } else {
        1.0
    }
}

#[inline]
fn is_finite_point(p: &Point3<f64>) -> bool {
    p.x.is_finite() && p.y.is_finite() && p.z.is_finite()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_points(n: usize, seed: u64) -> Vec<Point3<f64>> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n)
            .map(|_| Point3::new(rng.gen::<f64>(), rng.gen::<f64>(), rng.gen::<f64>()))
            .collect()
    }

    fn brute_force_within(points: &[Point3<f64>], q: &Point3<f64>, r: f64) -> Vec<usize> {
        let mut v: Vec<usize> = points
            .iter()
            .enumerate()
            .filter(|(_, p)| (*p - q).norm() <= r)
            .map(|(i, _)| i)
            .collect();
        v.sort_unstable();
        v
    }

    #[test]
    fn test_radius_query_matches_brute_force() {
        let points = random_points(500, 7);
        let grid = SpatialGrid::build(&points, 0.1);

        for (qi, q) in points.iter().enumerate().step_by(17) {
            for &r in &[0.05, 0.1, 0.25] {
                let mut got: Vec<usize> = grid.within_radius(q, r).iter().map(|n| n.index).collect();
                got.sort_unstable();
                assert_eq!(got, brute_force_within(&points, q, r), "query {} radius {}", qi, r);
                assert!(got.contains(&qi), "query point should be its own neighbor");
            }
        }
    }

    #[test]
    fn test_large_radius_scans_everything() {
        let points = random_points(50, 3);
        let grid = SpatialGrid::build(&points, 0.01);
        assert_eq!(grid.count_within(&Point3::origin(), 100.0), 50);
    }

    #[test]
    fn test_degenerate_inputs() {
        let empty = SpatialGrid::build(&[], 0.5);
        assert!(empty.is_empty());
        assert!(empty.within_radius(&Point3::origin(), 1.0).is_empty());
        assert!(empty.k_nearest(&Point3::origin(), 3).is_empty());
        assert!(empty.nearest(&Point3::origin()).is_none());

        let single = SpatialGrid::build(&[Point3::new(1.0, 2.0, 3.0)], 0.5);
        let hits = single.within_radius(&Point3::new(1.0, 2.0, 3.0), 0.1);
        assert_eq!(hits, vec![Neighbor { index: 0, distance: 0.0 }]);
        assert_eq!(single.k_nearest(&Point3::origin(), 5).len(), 1);
    }

    #[test]
    fn test_invalid_cell_size_falls_back() {
        let grid = SpatialGrid::build(&random_points(10, 1), -2.0);
        assert_eq!(grid.cell_size(), 1.0);
        let grid = SpatialGrid::build(&random_points(10, 1), f64::NAN);
        assert_eq!(grid.cell_size(), 1.0);
    }

    #[test]
    fn test_k_nearest_sorted_and_correct() {
        let points = random_points(300, 11);
        let grid = SpatialGrid::build(&points, 0.05);
        let q = Point3::new(0.5, 0.5, 0.5);

        let knn = grid.k_nearest(&q, 8);
        assert_eq!(knn.len(), 8);
        for pair in knn.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }

        let mut all: Vec<f64> = points.iter().map(|p| (p - q).norm()).collect();
        all.sort_by(f64::total_cmp);
        for (n, d) in knn.iter().zip(&all) {
            assert!((n.distance - d).abs() < 1e-12);
            assert!(((points[n.index] - q).norm() - n.distance).abs() < 1e-12);
        }
    }

    #[test]
    fn test_k_nearest_follows_rebuild() {
        let mut grid = SpatialGrid::build(&random_points(50, 2), 0.1);
        assert_eq!(grid.k_nearest(&Point3::origin(), 50).len(), 50);

        let moved = vec![Point3::new(5.0, 5.0, 5.0), Point3::new(1.0, 1.0, 1.0)];
        grid.rebuild(&moved, 0.1);
        let knn = grid.k_nearest(&Point3::origin(), 10);
        assert_eq!(knn.len(), 2);
        assert_eq!(knn[0].index, 1);
        assert!((knn[0].distance - 3f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_duplicates_are_all_returned() {
        let p = Point3::new(0.3, 0.3, 0.3);
        let grid = SpatialGrid::build(&[p, p, p], 0.2);
        assert_eq!(grid.count_within(&p, 0.0), 3);
    }

    #[test]
    fn test_rebuild_replaces_contents() {
        let mut grid = SpatialGrid::build(&random_points(20, 5), 0.2);
        grid.rebuild(&[Point3::new(10.0, 10.0, 10.0)], 0.5);
        assert_eq!(grid.len(), 1);
        assert_eq!(grid.cell_size(), 0.5);
        assert_eq!(grid.nearest(&Point3::origin()).map(|n| n.index), Some(0));
    }

    #[test]
    fn test_non_finite_query_is_empty() {
        let grid = SpatialGrid::build(&random_points(20, 5), 0.2);
        let q = Point3::new(f64::NAN, 0.0, 0.0);
        assert!(grid.within_radius(&q, 1.0).is_empty());
        assert!(grid.k_nearest(&q, 3).is_empty());
    }
}
