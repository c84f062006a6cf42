use indicatif::ProgressBar;
use log::{trace, warn};

use super::write_cell_centre;
use crate::axes::{AxisModel, NeighbourhoodSpec};
use crate::distribute::Worker;
use crate::error::Result;
use crate::grid::GridCell;
use crate::stats::DescriptiveStats;
use crate::table::{ResultRow, ResultTable};
use crate::volume::Volume;

// One row of univariate statistics per grid cell.
pub struct CellStatisticsWorker<'a, V> {
    volume: &'a V,
    axes: &'a AxisModel,
    spec: &'a NeighbourhoodSpec,
    channel_axis: usize,
}

impl<'a, V: Volume> CellStatisticsWorker<'a, V> {
    pub fn new(
        volume: &'a V,
        axes: &'a AxisModel,
        spec: &'a NeighbourhoodSpec,
        channel_axis: usize,
    ) -> Self {
        CellStatisticsWorker {
            volume,
            axes,
            spec,
            channel_axis,
        }
    }
}

impl<V: Volume> Worker<GridCell> for CellStatisticsWorker<'_, V> {
    fn process(
        &self,
        cells: &[GridCell],
        table: &mut ResultTable,
        progress: &ProgressBar,
    ) -> Result<()> {
        let mut stats = DescriptiveStats::new();
        for cell in cells {
            stats.clear();

            let mut row = ResultRow::new();
            write_cell_centre(&mut row, self.axes, self.spec, cell);
            row.set("Channel", cell.min[self.channel_axis]);

            self.volume
                .visit_interval(&cell.min, &cell.max, |_, value| stats.add(value));

            let expected = cell.voxel_count();
            if stats.len() < expected {
                warn!(
                    "Cell {:?}: {} of {} voxels could not be sampled",
                    cell.position,
                    expected - stats.len(),
                    expected
                );
            }
            trace!("cell {:?}: {} voxels", cell.position, stats.len());

            stats.summarize().write_into(&mut row, "");
            table.push(row);
            progress.inc(1);
        }
        Ok(())
    }
}
