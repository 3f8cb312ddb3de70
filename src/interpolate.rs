//! Regularization of irregular simulator output onto a fixed grid.
//!
//! The forward simulator reports its surfaces on an irregular node cloud, while
//! likelihood scoring needs them on the same regular grid as the observed
//! reference. Each grid node takes the inverse-distance-weighted average of its
//! three nearest samples; a node that lands exactly on a sample takes that
//! sample's value unchanged.

use itertools::izip;
use ndarray::Array2;
use thiserror::Error;

use crate::math::linspace;
use crate::surface::Surface;

/// Samples averaged into each grid node.
const NEIGHBORS: usize = 3;

#[derive(Error, Debug)]
pub enum InterpolationError {
    #[error("need at least 3 sample points, got {0}")]
    TooFewPoints(usize),
    #[error("no grid spacing could be derived from the sample x-coordinates")]
    DegenerateSpacing,
    #[error("sample points collapse to a single grid row or column")]
    DegenerateExtent,
    #[error("field length {field} does not match sample count {points}")]
    FieldLengthMismatch { field: usize, points: usize },
}

/// Interpolation plan from one point cloud onto a regular grid.
///
/// The neighbor set and weights are resolved once per grid node when the plan is
/// built, so any number of co-located fields can be resampled with identical
/// weights via [`CloudInterpolator::apply`].
///
/// The grid cell size is the spacing between the first two distinct sample
/// x-coordinates, and the grid spans the bounding box of the cloud with
/// `(max - min) / spacing + 1` nodes per axis.
pub struct CloudInterpolator {
    shape: (usize, usize),
    points: usize,
    nodes: Vec<NodeWeights>,
}

enum NodeWeights {
    /// Node coincides with a sample; its value passes through untouched.
    Exact(usize),
    Weighted {
        ids: [usize; NEIGHBORS],
        weights: [f64; NEIGHBORS],
    },
}

impl CloudInterpolator {
    pub fn new(coords: &[[f64; 2]]) -> Result<Self, InterpolationError> {
        if coords.len() < NEIGHBORS {
            return Err(InterpolationError::TooFewPoints(coords.len()));
        }
        let spacing = grid_spacing(coords)?;

        let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
        for p in coords {
            min_x = min_x.min(p[0]);
            max_x = max_x.max(p[0]);
            min_y = min_y.min(p[1]);
            max_y = max_y.max(p[1]);
        }

        let nx = ((max_x - min_x) / spacing + 1.0) as usize;
        let ny = ((max_y - min_y) / spacing + 1.0) as usize;
        if nx < 2 || ny < 2 {
            return Err(InterpolationError::DegenerateExtent);
        }

        let xs = linspace(min_x, max_x, nx);
        let ys = linspace(min_y, max_y, ny);
        let index = BucketIndex::new(coords, spacing);

        let mut nodes = Vec::with_capacity(nx * ny);
        for &y in &ys {
            for &x in &xs {
                let (ids, distances) = index.nearest([x, y]);
                if distances[0] == 0.0 {
                    nodes.push(NodeWeights::Exact(ids[0]));
                    continue;
                }
                let raw = distances.map(|d| 1.0 / d);
                let total: f64 = raw.iter().sum();
                nodes.push(NodeWeights::Weighted {
                    ids,
                    weights: raw.map(|w| w / total),
                });
            }
        }

        Ok(Self {
            shape: (ny, nx),
            points: coords.len(),
            nodes,
        })
    }

    /// `(rows, columns)` of the output grid.
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    /// Resample one scalar field from the cloud onto the grid.
    pub fn apply(&self, field: &[f64]) -> Result<Surface, InterpolationError> {
        if field.len() != self.points {
            return Err(InterpolationError::FieldLengthMismatch {
                field: field.len(),
                points: self.points,
            });
        }
        let mut grid = Array2::zeros(self.shape);
        for (node, value) in izip!(&self.nodes, grid.iter_mut()) {
            *value = match node {
                NodeWeights::Exact(id) => field[*id],
                NodeWeights::Weighted { ids, weights } => izip!(ids, weights)
                    .map(|(&id, &w)| w * field[id])
                    .sum(),
            };
        }
        Ok(grid)
    }
}

/// Spacing between the first two distinct sample x-coordinates.
fn grid_spacing(coords: &[[f64; 2]]) -> Result<f64, InterpolationError> {
    let first = coords[0][0];
    let spacing = coords
        .iter()
        .map(|p| (p[0] - first).abs())
        .find(|d| *d > 0.0)
        .ok_or(InterpolationError::DegenerateSpacing)?;
    if !spacing.is_finite() {
        return Err(InterpolationError::DegenerateSpacing);
    }
    Ok(spacing)
}

/// Uniform bucket grid over the point cloud for nearest-neighbor queries.
struct BucketIndex<'a> {
    points: &'a [[f64; 2]],
    origin: [f64; 2],
    cell: f64,
    cols: usize,
    rows: usize,
    buckets: Vec<Vec<u32>>,
}

impl<'a> BucketIndex<'a> {
    fn new(points: &'a [[f64; 2]], cell: f64) -> Self {
        let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
        for p in points {
            min_x = min_x.min(p[0]);
            max_x = max_x.max(p[0]);
            min_y = min_y.min(p[1]);
            max_y = max_y.max(p[1]);
        }
        let cols = ((max_x - min_x) / cell) as usize + 1;
        let rows = ((max_y - min_y) / cell) as usize + 1;
        let mut index = Self {
            points,
            origin: [min_x, min_y],
            cell,
            cols,
            rows,
            buckets: vec![Vec::new(); cols * rows],
        };
        for (i, p) in points.iter().enumerate() {
            let (cx, cy) = index.cell_of(*p);
            index.buckets[cy * cols + cx].push(i as u32);
        }
        index
    }

    fn cell_of(&self, p: [f64; 2]) -> (usize, usize) {
        let cx = ((p[0] - self.origin[0]) / self.cell).max(0.0) as usize;
        let cy = ((p[1] - self.origin[1]) / self.cell).max(0.0) as usize;
        (cx.min(self.cols - 1), cy.min(self.rows - 1))
    }

    /// The three nearest samples to `q`, ascending by distance.
    ///
    /// Buckets are visited in expanding Chebyshev rings; a ring at radius `r`
    /// cannot hold a point closer than `(r - 1) * cell`, which bounds the search
    /// once three candidates are known.
    fn nearest(&self, q: [f64; 2]) -> ([usize; NEIGHBORS], [f64; NEIGHBORS]) {
        let (cx, cy) = self.cell_of(q);
        let mut ids = [0usize; NEIGHBORS];
        let mut distances = [f64::INFINITY; NEIGHBORS];
        let mut found = 0usize;

        let max_ring = self.cols.max(self.rows);
        for ring in 0..=max_ring {
            if found >= NEIGHBORS && (ring as f64 - 1.0) * self.cell > distances[NEIGHBORS - 1] {
                break;
            }
            self.visit_ring(cx, cy, ring, |id| {
                let p = self.points[id];
                let d = ((p[0] - q[0]).powi(2) + (p[1] - q[1]).powi(2)).sqrt();
                if d < distances[NEIGHBORS - 1] {
                    let mut k = NEIGHBORS - 1;
                    distances[k] = d;
                    ids[k] = id;
                    while k > 0 && distances[k] < distances[k - 1] {
                        distances.swap(k, k - 1);
                        ids.swap(k, k - 1);
                        k -= 1;
                    }
                    if found < NEIGHBORS {
                        found += 1;
                    }
                }
            });
        }
        (ids, distances)
    }

    fn visit_ring(&self, cx: usize, cy: usize, ring: usize, mut visit: impl FnMut(usize)) {
        let x0 = cx.saturating_sub(ring);
        let x1 = (cx + ring).min(self.cols - 1);
        let y0 = cy.saturating_sub(ring);
        let y1 = (cy + ring).min(self.rows - 1);
        for y in y0..=y1 {
            for x in x0..=x1 {
                if x.abs_diff(cx).max(y.abs_diff(cy)) != ring {
                    continue;
                }
                for &id in &self.buckets[y * self.cols + x] {
                    visit(id as usize);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use pretty_assertions::assert_eq;

    /// Integer lattice cloud with spacing 10, row-major like simulator output.
    fn lattice(side: usize) -> Vec<[f64; 2]> {
        let mut coords = Vec::with_capacity(side * side);
        for iy in 0..side {
            for ix in 0..side {
                coords.push([ix as f64 * 10.0, iy as f64 * 10.0]);
            }
        }
        coords
    }

    #[test]
    fn lattice_nodes_pass_through_exactly() {
        let coords = lattice(5);
        let field: Vec<f64> = coords.iter().map(|p| 3.0 * p[0] - 0.5 * p[1]).collect();
        let plan = CloudInterpolator::new(&coords).unwrap();
        assert_eq!(plan.shape(), (5, 5));
        let grid = plan.apply(&field).unwrap();
        for (iy, ix) in (0..5).flat_map(|iy| (0..5).map(move |ix| (iy, ix))) {
            assert_eq!(grid[(iy, ix)], field[iy * 5 + ix]);
        }
    }

    #[test]
    fn coincident_node_ignores_neighbors() {
        let mut coords = lattice(4);
        let mut field = vec![1.0; coords.len()];
        // An outlier next to node (20, 20) must not bleed into it.
        field[2 * 4 + 2] = -7.25;
        coords.push([21.0, 20.0]);
        field.push(1.0e9);
        let plan = CloudInterpolator::new(&coords).unwrap();
        let grid = plan.apply(&field).unwrap();
        assert_eq!(grid[(2, 2)], -7.25);
    }

    #[test]
    fn paired_fields_share_weights() {
        let mut coords = lattice(4);
        // Shift one interior sample off the lattice so at least one node is
        // genuinely averaged.
        coords[2 * 4 + 1] = [13.0, 22.0];
        let field: Vec<f64> = coords.iter().map(|p| p[0] + p[1]).collect();
        let doubled: Vec<f64> = field.iter().map(|v| 2.0 * v).collect();
        let plan = CloudInterpolator::new(&coords).unwrap();
        let first = plan.apply(&field).unwrap();
        let second = plan.apply(&doubled).unwrap();
        for (a, b) in first.iter().zip(second.iter()) {
            assert_abs_diff_eq!(2.0 * a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn weighted_nodes_interpolate_between_samples() {
        let coords = lattice(3);
        let field: Vec<f64> = coords.iter().map(|p| p[0]).collect();
        let mut jittered = coords.clone();
        jittered[4] = [15.0, 10.0];
        let plan = CloudInterpolator::new(&jittered).unwrap();
        let grid = plan.apply(&field).unwrap();
        // Node (10, 10) now averages samples at x = 0, 15, 20 with 1/d weights.
        let value = grid[(1, 1)];
        assert!(value.is_finite());
        assert!(value > 0.0 && value < 20.0);
    }

    #[test]
    fn rejects_too_few_points() {
        let coords = [[0.0, 0.0], [10.0, 0.0]];
        assert!(matches!(
            CloudInterpolator::new(&coords),
            Err(InterpolationError::TooFewPoints(2))
        ));
    }

    #[test]
    fn rejects_single_column_cloud() {
        let coords = [[5.0, 0.0], [5.0, 10.0], [5.0, 20.0]];
        assert!(matches!(
            CloudInterpolator::new(&coords),
            Err(InterpolationError::DegenerateSpacing)
        ));
    }

    #[test]
    fn rejects_collinear_cloud() {
        let coords = [[0.0, 5.0], [10.0, 5.0], [20.0, 5.0]];
        assert!(matches!(
            CloudInterpolator::new(&coords),
            Err(InterpolationError::DegenerateExtent)
        ));
    }

    #[test]
    fn rejects_mismatched_field_length() {
        let plan = CloudInterpolator::new(&lattice(3)).unwrap();
        assert!(matches!(
            plan.apply(&[1.0, 2.0]),
            Err(InterpolationError::FieldLengthMismatch { field: 2, points: 9 })
        ));
    }
}
