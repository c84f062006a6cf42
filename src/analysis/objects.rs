use indicatif::ProgressBar;
use log::{trace, warn};

use crate::axes::AxisModel;
use crate::distribute::Worker;
use crate::error::Result;
use crate::params::ObjectGrouping;
use crate::regions::LabelRegion;
use crate::stats::DescriptiveStats;
use crate::table::{ResultRow, ResultTable};
use crate::volume::Volume;

// Per-channel statistics over the voxels of labelled regions.
pub struct ObjectStatisticsWorker<'a, V> {
    volume: &'a V,
    axes: &'a AxisModel,
    channel_axis: usize,
    channel_names: &'a [String],
    grouping: ObjectGrouping,
    detection_channel: Option<&'a str>,
}

impl<'a, V: Volume> ObjectStatisticsWorker<'a, V> {
    pub fn new(
        volume: &'a V,
        axes: &'a AxisModel,
        channel_axis: usize,
        channel_names: &'a [String],
        grouping: ObjectGrouping,
        detection_channel: Option<&'a str>,
    ) -> Self {
        ObjectStatisticsWorker {
            volume,
            axes,
            channel_axis,
            channel_names,
            grouping,
            detection_channel,
        }
    }

    fn region_row<R: LabelRegion>(&self, region: &R, site_dims: &[usize]) -> ResultRow {
        let mut row = ResultRow::new();
        row.set("Object ID", region.label());
        if let Some(detection) = self.detection_channel {
            row.set("Detection Channel", detection);
        }
        for (&d, &c) in site_dims.iter().zip(region.centroid()) {
            row.set(self.axes.label(d), c * self.axes.scale(d));
        }
        row
    }

    // Fill `stats` with the region's values in channel `c`, returning how
    // many voxels fell outside the volume.
    fn accumulate<R: LabelRegion>(
        &self,
        region: &R,
        c: usize,
        site_dims: &[usize],
        index: &mut [usize],
        stats: &mut DescriptiveStats,
    ) -> usize {
        stats.clear();
        index[self.channel_axis] = c;
        let mut skipped = 0;
        for voxel in region.voxels() {
            for (&d, &x) in site_dims.iter().zip(voxel) {
                index[d] = x;
            }
            match self.volume.sample(index) {
                Some(v) => stats.add(v),
                None => {
                    trace!("object {}: voxel {:?} outside the volume", region.label(), voxel);
                    skipped += 1;
                }
            }
        }
        skipped
    }
}

impl<V, R> Worker<R> for ObjectStatisticsWorker<'_, V>
where
    V: Volume,
    R: LabelRegion + Sync,
{
    fn process(
        &self,
        regions: &[R],
        table: &mut ResultTable,
        progress: &ProgressBar,
    ) -> Result<()> {
        let site_dims = self.axes.site_dims();
        let mut index = vec![0; self.volume.shape().len()];
        let mut stats = DescriptiveStats::new();

        for region in regions {
            let mut row = self.region_row(region, &site_dims);
            for (c, name) in self.channel_names.iter().enumerate() {
                let skipped = self.accumulate(region, c, &site_dims, &mut index, &mut stats);
                if skipped > 0 {
                    warn!(
                        "Object {} channel {}: skipped {} voxels outside the volume",
                        region.label(),
                        name,
                        skipped
                    );
                }

                match self.grouping {
                    ObjectGrouping::PerRegion => {
                        stats.summarize().write_into(&mut row, &format!("{}_", name));
                    }
                    ObjectGrouping::PerRegionChannel => {
                        let mut channel_row = row.clone();
                        channel_row.set("Channel", name.as_str());
                        stats.summarize().write_into(&mut channel_row, "");
                        table.push(channel_row);
                    }
                }
            }
            if self.grouping == ObjectGrouping::PerRegion {
                table.push(row);
            }
            progress.inc(1);
        }
        Ok(())
    }
}
