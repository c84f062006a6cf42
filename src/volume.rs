// Read-only scalar volumes. Workers share a single volume by reference and
// read it concurrently without synchronization.

use ndarray::{ArrayBase, ArrayView3, ArrayViewD, Axis, Data, Dimension, Ix3, IxDyn, Slice};
use num_traits::AsPrimitive;

use crate::axes::{AxisModel, AxisRole};
use crate::error::{AnalysisError, Result};

pub trait Volume: Sync {
    fn shape(&self) -> &[usize];

    // None for an index outside the volume.
    fn sample(&self, index: &[usize]) -> Option<f64>;

    // Visit every voxel in the half-open box [min, max), passing the global
    // coordinate and its value. Order is fixed for a given box.
    fn visit_interval<F>(&self, min: &[usize], max: &[usize], mut f: F)
    where
        F: FnMut(&[usize], f64),
    {
        let ndim = min.len();
        if (0..ndim).any(|d| min[d] >= max[d]) {
            return;
        }

        let mut index = min.to_vec();
        loop {
            if let Some(value) = self.sample(&index) {
                f(&index, value);
            }

            // odometer, last dimension fastest
            let mut d = ndim;
            loop {
                if d == 0 {
                    return;
                }
                d -= 1;
                index[d] += 1;
                if index[d] < max[d] {
                    break;
                }
                index[d] = min[d];
            }
        }
    }
}

impl<S, T> Volume for ArrayBase<S, IxDyn>
where
    S: Data<Elem = T> + Sync,
    T: AsPrimitive<f64>,
{
    fn shape(&self) -> &[usize] {
        ArrayBase::shape(self)
    }

    fn sample(&self, index: &[usize]) -> Option<f64> {
        if index.len() != self.ndim() {
            return None;
        }
        self.get(index).map(|v| (*v).as_())
    }

    fn visit_interval<F>(&self, min: &[usize], max: &[usize], mut f: F)
    where
        F: FnMut(&[usize], f64),
    {
        let shape = ArrayBase::shape(self);
        if min.len() != shape.len()
            || (0..shape.len()).any(|d| min[d] >= max[d].min(shape[d]))
        {
            return;
        }

        let view = self.slice_each_axis(|ax| {
            let d = ax.axis.index();
            Slice::from(min[d]..max[d].min(shape[d]))
        });

        let mut global = min.to_vec();
        for (local, value) in view.indexed_iter() {
            for (g, (&l, &m)) in global.iter_mut().zip(local.slice().iter().zip(min)) {
                *g = l + m;
            }
            f(&global, (*value).as_());
        }
    }
}

// Append a unit channel dimension when the axis model had to synthesize one.
pub fn with_channel_axis<'a, T>(view: ArrayViewD<'a, T>, axes: &AxisModel) -> ArrayViewD<'a, T> {
    let n = view.ndim();
    if n + 1 == axes.ndim() {
        view.insert_axis(Axis(n))
    } else {
        view
    }
}

// Reorder a channel-free view so that it is indexed [x, y, z]. A missing Z
// axis becomes a unit dimension. Other axes are not supported here.
pub fn xyz_view<'a, T>(view: ArrayViewD<'a, T>, axes: &AxisModel) -> Result<ArrayView3<'a, T>> {
    let site_dims = axes.site_dims();
    if view.ndim() != site_dims.len() {
        return Err(AnalysisError::DimensionMismatch {
            expected: site_dims.clone(),
            got: view.shape().to_vec(),
        });
    }
    if let Some(&d) = site_dims.iter().find(|&&d| axes.role(d) == AxisRole::Other) {
        return Err(AnalysisError::DimensionMismatch {
            expected: axes.spatial_dims(),
            got: vec![d],
        });
    }

    let position = |role: AxisRole| -> Option<usize> {
        let d = axes.index(role)?;
        site_dims.iter().position(|&s| s == d)
    };

    let x = position(AxisRole::X).ok_or(AnalysisError::MissingAxis(AxisRole::X))?;
    let y = position(AxisRole::Y).ok_or(AnalysisError::MissingAxis(AxisRole::Y))?;
    let view = match position(AxisRole::Z) {
        Some(z) => view.permuted_axes(vec![x, y, z]),
        None => view.permuted_axes(vec![x, y]).insert_axis(Axis(2)),
    };

    let ndim = view.ndim();
    view.into_dimensionality::<Ix3>()
        .map_err(|_| AnalysisError::DimensionMismatch {
            expected: vec![3],
            got: vec![ndim],
        })
}
