// Labelled regions produced by upstream segmentation. The engine only reads
// them: a label, a centre of mass, and the member voxel coordinates.

use std::collections::BTreeMap;

use ndarray::{ArrayBase, Data, Dimension, IxDyn};

pub trait LabelRegion {
    fn label(&self) -> u32;

    // Centre of mass in voxel coordinates over the channel-free dimensions.
    fn centroid(&self) -> &[f64];

    // Member voxel coordinates; every call starts a fresh enumeration.
    fn voxels(&self) -> impl Iterator<Item = &[usize]> + '_;

    fn size(&self) -> usize;
}

#[derive(Clone, Debug, PartialEq)]
pub struct VoxelRegion {
    label: u32,
    ndim: usize,
    // flattened coordinates, `ndim` per voxel
    coords: Vec<usize>,
    centroid: Vec<f64>,
}

impl VoxelRegion {
    pub fn new(label: u32, ndim: usize, coords: Vec<usize>) -> VoxelRegion {
        assert!(ndim > 0 && coords.len() % ndim == 0);
        let n = coords.len() / ndim;
        let mut centroid = vec![0.0; ndim];
        for voxel in coords.chunks_exact(ndim) {
            for (c, &x) in centroid.iter_mut().zip(voxel) {
                *c += x as f64;
            }
        }
        if n > 0 {
            for c in centroid.iter_mut() {
                *c /= n as f64;
            }
        } else {
            centroid.fill(f64::NAN);
        }

        VoxelRegion {
            label,
            ndim,
            coords,
            centroid,
        }
    }

    pub fn ndim(&self) -> usize {
        self.ndim
    }
}

impl LabelRegion for VoxelRegion {
    fn label(&self) -> u32 {
        self.label
    }

    fn centroid(&self) -> &[f64] {
        &self.centroid
    }

    fn voxels(&self) -> impl Iterator<Item = &[usize]> + '_ {
        self.coords.chunks_exact(self.ndim)
    }

    fn size(&self) -> usize {
        self.coords.len() / self.ndim
    }
}

// Group a labelled volume (0 is background) into regions, ordered by label.
pub fn regions_from_labels<S, T>(labels: &ArrayBase<S, IxDyn>) -> Vec<VoxelRegion>
where
    S: Data<Elem = T>,
    T: Copy + Into<u32>,
{
    let ndim = labels.ndim();
    let mut members: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (index, &value) in labels.indexed_iter() {
        let label: u32 = value.into();
        if label != 0 {
            members
                .entry(label)
                .or_default()
                .extend_from_slice(index.slice());
        }
    }

    members
        .into_iter()
        .map(|(label, coords)| VoxelRegion::new(label, ndim, coords))
        .collect()
}
