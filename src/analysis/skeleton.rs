// Junction and end point detection on a binary skeleton, one grid cell at a
// time.

use indicatif::ProgressBar;
use log::trace;
use ndarray::{s, ArrayView3};

use crate::distribute::Worker;
use crate::error::{AnalysisError, Result};
use crate::grid::GridCell;
use crate::table::{ResultRow, ResultTable};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PointKind {
    Junction,
    End,
}

impl PointKind {
    pub fn label(&self) -> &'static str {
        match self {
            PointKind::Junction => "Junction",
            PointKind::End => "End",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SkeletonPoint {
    // [x, y, z] relative to whatever view was classified
    pub position: [usize; 3],
    pub kind: PointKind,
}

pub trait SkeletonExtractor: Sync {
    fn classify(&self, cell: ArrayView3<'_, bool>) -> Result<Vec<SkeletonPoint>>;
}

/// Classifies skeleton voxels by their number of 26-connected skeleton
/// neighbours within the cell: at most one is an end point, more than two
/// a junction. Junctions are listed before end points.
#[derive(Copy, Clone, Debug, Default)]
pub struct NeighbourCountExtractor;

impl NeighbourCountExtractor {
    fn neighbours(cell: &ArrayView3<'_, bool>, x: usize, y: usize, z: usize) -> usize {
        let shape = cell.shape();
        let range = |i: usize, n: usize| i.saturating_sub(1)..(i + 2).min(n);
        let mut count = 0;
        for i in range(x, shape[0]) {
            for j in range(y, shape[1]) {
                for k in range(z, shape[2]) {
                    if (i, j, k) != (x, y, z) && cell[[i, j, k]] {
                        count += 1;
                    }
                }
            }
        }
        count
    }
}

impl SkeletonExtractor for NeighbourCountExtractor {
    fn classify(&self, cell: ArrayView3<'_, bool>) -> Result<Vec<SkeletonPoint>> {
        let mut junctions = Vec::new();
        let mut ends = Vec::new();
        for ((x, y, z), &on) in cell.indexed_iter() {
            if !on {
                continue;
            }
            match Self::neighbours(&cell, x, y, z) {
                0 | 1 => ends.push(SkeletonPoint {
                    position: [x, y, z],
                    kind: PointKind::End,
                }),
                2 => {}
                _ => junctions.push(SkeletonPoint {
                    position: [x, y, z],
                    kind: PointKind::Junction,
                }),
            }
        }
        junctions.extend(ends);
        Ok(junctions)
    }
}

// Holds the cell copy handed to the extractor and clears it when dropped, so
// the buffer is released after every cell whether or not extraction succeeds.
struct Scratch<'b> {
    buffer: &'b mut Vec<bool>,
}

impl Drop for Scratch<'_> {
    fn drop(&mut self) {
        self.buffer.clear();
    }
}

pub struct SkeletonPartitionWorker<'a, E> {
    skeleton: ArrayView3<'a, bool>,
    extractor: &'a E,
}

impl<'a, E: SkeletonExtractor> SkeletonPartitionWorker<'a, E> {
    pub fn new(skeleton: ArrayView3<'a, bool>, extractor: &'a E) -> Self {
        SkeletonPartitionWorker { skeleton, extractor }
    }

    fn classify_cell(&self, cell: &GridCell, buffer: &mut Vec<bool>) -> Result<Vec<SkeletonPoint>> {
        let view = self.skeleton.slice(s![
            cell.min[0]..cell.max[0],
            cell.min[1]..cell.max[1],
            cell.min[2]..cell.max[2]
        ]);
        let shape = (view.shape()[0], view.shape()[1], view.shape()[2]);

        let scratch = Scratch { buffer };
        scratch.buffer.extend(view.iter().copied());
        let local = ArrayView3::from_shape(shape, scratch.buffer.as_slice())
            .map_err(|err| AnalysisError::Extractor(err.to_string()))?;
        self.extractor.classify(local)
    }
}

impl<E: SkeletonExtractor> Worker<GridCell> for SkeletonPartitionWorker<'_, E> {
    fn process(
        &self,
        cells: &[GridCell],
        table: &mut ResultTable,
        progress: &ProgressBar,
    ) -> Result<()> {
        let mut buffer = Vec::new();
        for cell in cells {
            let points = self.classify_cell(cell, &mut buffer)?;
            trace!("cell {:?}: {} skeleton points", cell.position, points.len());

            for point in points {
                let mut row = ResultRow::new();
                let global = point.position.iter().zip(&cell.min).map(|(&p, &o)| p + o);
                for (axis, p) in ["X", "Y", "Z"].iter().zip(global) {
                    row.set(axis, p);
                }
                row.set("Type", point.kind.label());
                table.push(row);
            }
            progress.inc(1);
        }
        Ok(())
    }
}
