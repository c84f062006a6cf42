// Regular tiling of an N-dimensional bounding box into grid cells.

use crate::axes::NeighbourhoodSpec;
use crate::error::{AnalysisError, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GridCell {
    // half-open voxel interval [min, max)
    pub min: Vec<usize>,
    pub max: Vec<usize>,
    // index of the cell within the tiling
    pub position: Vec<usize>,
}

impl GridCell {
    pub fn ndim(&self) -> usize {
        self.min.len()
    }

    pub fn extent(&self, d: usize) -> usize {
        self.max[d] - self.min[d]
    }

    pub fn voxel_count(&self) -> usize {
        (0..self.ndim()).map(|d| self.extent(d)).product()
    }

    pub fn contains(&self, index: &[usize]) -> bool {
        index.len() == self.ndim()
            && index
                .iter()
                .zip(self.min.iter().zip(&self.max))
                .all(|(&i, (&lo, &hi))| lo <= i && i < hi)
    }
}

// Number of cells along each dimension.
pub fn grid_shape(dims: &[usize], cell: &[usize]) -> Vec<usize> {
    dims.iter()
        .zip(cell)
        .map(|(&n, &c)| n.div_ceil(c))
        .collect()
}

// Tile [0, dims) with cells of the given extent. Dimension 0 varies fastest.
// Trailing cells are clamped to the volume boundary.
pub fn partition(dims: &[usize], spec: &NeighbourhoodSpec) -> Result<Vec<GridCell>> {
    if spec.ndim() != dims.len() {
        return Err(AnalysisError::DimensionMismatch {
            expected: dims.to_vec(),
            got: spec.extents().to_vec(),
        });
    }
    let cell = spec.extents();
    if let Some(axis) = cell.iter().position(|&c| c == 0) {
        return Err(AnalysisError::InvalidNeighbourhood { axis, extent: 0 });
    }

    let shape = grid_shape(dims, cell);
    let ncells: usize = shape.iter().product();
    let mut cells = Vec::with_capacity(ncells);
    if ncells == 0 {
        return Ok(cells);
    }

    let ndim = dims.len();
    let mut position = vec![0; ndim];
    loop {
        let min: Vec<usize> = (0..ndim).map(|d| position[d] * cell[d]).collect();
        let max: Vec<usize> = (0..ndim)
            .map(|d| (min[d] + cell[d]).min(dims[d]))
            .collect();
        cells.push(GridCell {
            min,
            max,
            position: position.clone(),
        });

        let mut d = 0;
        loop {
            if d == ndim {
                return Ok(cells);
            }
            position[d] += 1;
            if position[d] < shape[d] {
                break;
            }
            position[d] = 0;
            d += 1;
        }
    }
}
