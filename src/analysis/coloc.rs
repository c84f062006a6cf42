// Channel colocalisation: Pearson and Spearman correlation between every
// pair of channels inside each spatial grid cell.

use std::sync::atomic::{AtomicU32, Ordering};

use indicatif::ProgressBar;
use log::warn;
use ndarray::{ArrayD, Dimension, IxDyn};

use super::write_cell_centre;
use crate::axes::{AxisModel, NeighbourhoodSpec};
use crate::distribute::Worker;
use crate::error::Result;
use crate::grid::{grid_shape, GridCell};
use crate::stats::{pearson, spearman};
use crate::table::{ResultRow, ResultTable};
use crate::volume::Volume;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CorrelationKind {
    Pearson,
    Spearman,
}

impl CorrelationKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            CorrelationKind::Pearson => "PC",
            CorrelationKind::Spearman => "SC",
        }
    }

    pub fn column(&self, c1: usize, c2: usize) -> String {
        format!("{}_{}_{}", self.prefix(), c1, c2)
    }
}

// Dense f32 map over spatial grid positions, initialised to NaN and shared by
// all workers. Each position is written by exactly one grid cell.
#[derive(Debug)]
pub struct CorrelationMap {
    shape: Vec<usize>,
    data: Vec<AtomicU32>,
}

impl CorrelationMap {
    pub fn new(shape: Vec<usize>) -> Self {
        let n: usize = shape.iter().product();
        let data = (0..n).map(|_| AtomicU32::new(f32::NAN.to_bits())).collect();
        CorrelationMap { shape, data }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    // row-major
    fn offset(&self, position: &[usize]) -> Option<usize> {
        if position.len() != self.shape.len() {
            return None;
        }
        let mut offset = 0;
        for (&p, &n) in position.iter().zip(&self.shape) {
            if p >= n {
                return None;
            }
            offset = offset * n + p;
        }
        Some(offset)
    }

    pub fn set(&self, position: &[usize], value: f32) -> bool {
        match self.offset(position) {
            Some(i) => {
                self.data[i].store(value.to_bits(), Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, position: &[usize]) -> Option<f32> {
        self.offset(position)
            .map(|i| f32::from_bits(self.data[i].load(Ordering::Relaxed)))
    }

    pub fn to_array(&self) -> ArrayD<f32> {
        ArrayD::from_shape_fn(IxDyn(&self.shape), |ix| {
            self.get(ix.slice()).unwrap_or(f32::NAN)
        })
    }

    // Long-format table: one row per grid position, coordinates then value.
    pub fn to_table(&self, labels: &[String]) -> ResultTable {
        let mut table = ResultTable::new();
        for (position, value) in self.to_array().indexed_iter() {
            let mut row = ResultRow::new();
            for (label, &p) in labels.iter().zip(position.slice()) {
                row.set(label, p);
            }
            row.set("Value", *value);
            table.push(row);
        }
        table
    }
}

#[derive(Debug)]
pub struct CorrelationMaps {
    pairs: Vec<(usize, usize)>,
    pearson: Vec<CorrelationMap>,
    spearman: Vec<CorrelationMap>,
    // physical dimensions the maps are indexed by, and their labels
    site_dims: Vec<usize>,
    site_labels: Vec<String>,
}

impl CorrelationMaps {
    pub fn new(axes: &AxisModel, dims: &[usize], spec: &NeighbourhoodSpec) -> Self {
        let site_dims = axes.site_dims();
        let site_labels = site_dims.iter().map(|&d| axes.label(d).to_string()).collect();
        let nchannels = axes.channel_axis().map(|c| dims[c]).unwrap_or(1);

        let full_shape = grid_shape(dims, spec.extents());
        let shape: Vec<usize> = site_dims.iter().map(|&d| full_shape[d]).collect();

        let mut pairs = Vec::new();
        for c1 in 0..nchannels {
            for c2 in (c1 + 1)..nchannels {
                pairs.push((c1, c2));
            }
        }

        let pearson = pairs.iter().map(|_| CorrelationMap::new(shape.clone())).collect();
        let spearman = pairs.iter().map(|_| CorrelationMap::new(shape.clone())).collect();

        CorrelationMaps {
            pairs,
            pearson,
            spearman,
            site_dims,
            site_labels,
        }
    }

    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    pub fn site_labels(&self) -> &[String] {
        &self.site_labels
    }

    pub fn by_index(&self, kind: CorrelationKind, index: usize) -> &CorrelationMap {
        match kind {
            CorrelationKind::Pearson => &self.pearson[index],
            CorrelationKind::Spearman => &self.spearman[index],
        }
    }

    pub fn map(&self, kind: CorrelationKind, c1: usize, c2: usize) -> Option<&CorrelationMap> {
        let (a, b) = if c1 < c2 { (c1, c2) } else { (c2, c1) };
        self.pairs
            .iter()
            .position(|&p| p == (a, b))
            .map(|i| self.by_index(kind, i))
    }

    // Every map with its column-style name, Pearson first.
    pub fn iter(&self) -> impl Iterator<Item = (String, &CorrelationMap)> {
        [CorrelationKind::Pearson, CorrelationKind::Spearman]
            .into_iter()
            .flat_map(move |kind| {
                self.pairs
                    .iter()
                    .enumerate()
                    .map(move |(i, &(c1, c2))| (kind.column(c1, c2), self.by_index(kind, i)))
            })
    }

    fn site_position(&self, cell: &GridCell) -> Vec<usize> {
        self.site_dims.iter().map(|&d| cell.position[d]).collect()
    }
}

pub struct ColocalizationWorker<'a, V> {
    volume: &'a V,
    axes: &'a AxisModel,
    spec: &'a NeighbourhoodSpec,
    channel_axis: usize,
    maps: &'a CorrelationMaps,
}

impl<'a, V: Volume> ColocalizationWorker<'a, V> {
    pub fn new(
        volume: &'a V,
        axes: &'a AxisModel,
        spec: &'a NeighbourhoodSpec,
        channel_axis: usize,
        maps: &'a CorrelationMaps,
    ) -> Self {
        ColocalizationWorker {
            volume,
            axes,
            spec,
            channel_axis,
            maps,
        }
    }
}

impl<V: Volume> Worker<GridCell> for ColocalizationWorker<'_, V> {
    fn process(
        &self,
        cells: &[GridCell],
        table: &mut ResultTable,
        progress: &ProgressBar,
    ) -> Result<()> {
        let c = self.channel_axis;
        let nchannels = self.volume.shape()[c];
        let mut sequences: Vec<Vec<f64>> = vec![Vec::new(); nchannels];
        let mut sample = vec![0.0; nchannels];
        let mut index = vec![0; self.volume.shape().len()];

        for cell in cells {
            progress.inc(1);
            // a spatial location is visited once, from its channel 0 cell
            if cell.position[c] != 0 {
                continue;
            }

            for seq in sequences.iter_mut() {
                seq.clear();
            }

            // walk channel 0 and read the other channels at the same site
            let mut min = cell.min.clone();
            let mut max = cell.max.clone();
            min[c] = 0;
            max[c] = 1;
            let mut skipped = 0;
            self.volume.visit_interval(&min, &max, |coord, first| {
                index.copy_from_slice(coord);
                sample[0] = first;
                for (ch, s) in sample.iter_mut().enumerate().skip(1) {
                    index[c] = ch;
                    match self.volume.sample(&index) {
                        Some(v) => *s = v,
                        None => {
                            skipped += 1;
                            return;
                        }
                    }
                }
                for (seq, &v) in sequences.iter_mut().zip(sample.iter()) {
                    seq.push(v);
                }
            });
            if skipped > 0 {
                warn!("Cell {:?}: skipped {} sites outside the volume", cell.position, skipped);
            }

            let mut row = ResultRow::new();
            write_cell_centre(&mut row, self.axes, self.spec, cell);

            let position = self.maps.site_position(cell);
            for (i, &(c1, c2)) in self.maps.pairs().iter().enumerate() {
                let r = pearson(&sequences[c1], &sequences[c2]);
                let rho = spearman(&sequences[c1], &sequences[c2]);

                self.maps.by_index(CorrelationKind::Pearson, i).set(&position, r as f32);
                self.maps.by_index(CorrelationKind::Spearman, i).set(&position, rho as f32);

                row.set(&CorrelationKind::Pearson.column(c1, c2), r);
                row.set(&CorrelationKind::Spearman.column(c1, c2), rho);
            }
            table.push(row);
        }
        Ok(())
    }
}
