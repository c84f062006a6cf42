// Partition-and-measure entry points. Each one validates its configuration,
// builds the list of work items, and hands them to the worker pool.

pub mod cells;
pub mod coloc;
pub mod objects;
pub mod skeleton;

use log::{info, warn};
use ndarray::ArrayView3;

use crate::axes::{AxisModel, NeighbourhoodSpec};
use crate::distribute::{run_partitioned, RunOptions, RunReport};
use crate::error::{AnalysisError, Result};
use crate::grid::{partition, GridCell};
use crate::params::AnalysisParams;
use crate::regions::LabelRegion;
use crate::table::ResultRow;
use crate::volume::Volume;

use cells::CellStatisticsWorker;
use coloc::{ColocalizationWorker, CorrelationMaps};
use objects::ObjectStatisticsWorker;
use skeleton::{SkeletonExtractor, SkeletonPartitionWorker};

pub struct ColocalizationOutput {
    pub report: RunReport,
    pub maps: CorrelationMaps,
}

// Axis model, neighbourhood and volume must agree on dimensionality, and
// the axis model must name a channel axis. Returns the channel dimension.
fn validate<V: Volume>(
    volume: &V,
    axes: &AxisModel,
    spec: Option<&NeighbourhoodSpec>,
) -> Result<usize> {
    let shape = volume.shape();
    if axes.ndim() != shape.len() {
        return Err(AnalysisError::DimensionMismatch {
            expected: vec![axes.ndim()],
            got: shape.to_vec(),
        });
    }
    if let Some(spec) = spec {
        if spec.ndim() != shape.len() {
            return Err(AnalysisError::DimensionMismatch {
                expected: shape.to_vec(),
                got: spec.extents().to_vec(),
            });
        }
    }
    axes.channel_axis()
}

// Grid cells never span channels.
fn single_channel_cells(spec: &NeighbourhoodSpec, channel_axis: usize) -> NeighbourhoodSpec {
    if spec.extent(channel_axis) != 1 {
        warn!(
            "Ignoring channel extent {}; each grid cell covers a single channel",
            spec.extent(channel_axis)
        );
    }
    spec.with_unit_extent(channel_axis)
}

// Physical position of a grid cell along every non-channel axis:
// (grid index + 1) * scale * nominal extent / 2.
fn write_cell_centre(
    row: &mut ResultRow,
    axes: &AxisModel,
    spec: &NeighbourhoodSpec,
    cell: &GridCell,
) {
    for d in axes.site_dims() {
        let centre = (cell.position[d] + 1) as f64 * axes.scale(d) * spec.extent(d) as f64 / 2.0;
        row.set(axes.label(d), centre);
    }
}

/// Descriptive statistics for every grid cell of every channel.
pub fn analyze_grid<V: Volume>(
    volume: &V,
    axes: &AxisModel,
    spec: &NeighbourhoodSpec,
    opts: &RunOptions,
) -> Result<RunReport> {
    let channel_axis = validate(volume, axes, Some(spec))?;
    let spec = single_channel_cells(spec, channel_axis);
    let cells = partition(volume.shape(), &spec)?;
    info!("Measuring intensities in {} grid cells", cells.len());
    opts.progress.set_length(cells.len() as u64);

    let worker = CellStatisticsWorker::new(volume, axes, &spec, channel_axis);
    let report = run_partitioned(&cells, &worker, opts)?;
    report.log_failures("grid statistics");
    Ok(report)
}

/// Pairwise Pearson and Spearman correlation between channels for every
/// spatial grid cell, both as table rows and as dense maps.
pub fn analyze_colocalization<V: Volume>(
    volume: &V,
    axes: &AxisModel,
    spec: &NeighbourhoodSpec,
    opts: &RunOptions,
) -> Result<ColocalizationOutput> {
    let channel_axis = validate(volume, axes, Some(spec))?;
    let spec = single_channel_cells(spec, channel_axis);
    let cells = partition(volume.shape(), &spec)?;
    let maps = CorrelationMaps::new(axes, volume.shape(), &spec);
    info!(
        "Colocalising {} channels over {} grid cells",
        volume.shape()[channel_axis],
        cells.len()
    );
    opts.progress.set_length(cells.len() as u64);

    let worker = ColocalizationWorker::new(volume, axes, &spec, channel_axis, &maps);
    let report = run_partitioned(&cells, &worker, opts)?;
    report.log_failures("colocalisation");
    Ok(ColocalizationOutput { report, maps })
}

/// Per-channel statistics over the voxels of every labelled region.
pub fn analyze_objects<V, R>(
    volume: &V,
    axes: &AxisModel,
    regions: &[R],
    params: &AnalysisParams,
    detection_channel: Option<&str>,
    opts: &RunOptions,
) -> Result<RunReport>
where
    V: Volume,
    R: LabelRegion + Sync,
{
    let channel_axis = validate(volume, axes, None)?;
    let site_ndim = axes.site_dims().len();
    if let Some(region) = regions.iter().find(|r| r.centroid().len() != site_ndim) {
        return Err(AnalysisError::DimensionMismatch {
            expected: vec![site_ndim],
            got: vec![region.centroid().len()],
        });
    }

    let channel_names = params.channel_names_for(volume.shape()[channel_axis]);
    info!("Measuring {} objects", regions.len());
    opts.progress.set_length(regions.len() as u64);

    let worker = ObjectStatisticsWorker::new(
        volume,
        axes,
        channel_axis,
        &channel_names,
        params.grouping,
        detection_channel,
    );
    let report = run_partitioned(regions, &worker, opts)?;
    report.log_failures("object statistics");
    Ok(report)
}

/// Junction and end points of a skeleton volume indexed [x, y, z], found
/// cell by cell. Cell extents are clamped to the volume.
pub fn analyze_skeleton<'a, E: SkeletonExtractor>(
    skeleton: ArrayView3<'a, bool>,
    spec: &NeighbourhoodSpec,
    extractor: &'a E,
    opts: &RunOptions,
) -> Result<RunReport> {
    if spec.ndim() != 3 {
        return Err(AnalysisError::DimensionMismatch {
            expected: vec![3],
            got: vec![spec.ndim()],
        });
    }
    let dims = skeleton.shape().to_vec();
    let spec = spec.clamped(&dims);
    let cells = partition(&dims, &spec)?;
    info!("Analysing skeleton in {} grid cells", cells.len());
    opts.progress.set_length(cells.len() as u64);

    let worker = SkeletonPartitionWorker::new(skeleton, extractor);
    let report = run_partitioned(&cells, &worker, opts)?;
    report.log_failures("skeleton analysis");
    Ok(report)
}
