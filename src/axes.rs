// Axis roles, calibration, and the conversion from a physical neighbourhood
// size into per-dimension voxel extents.

use log::warn;

use crate::error::{AnalysisError, Result};
use crate::params::AnalysisParams;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AxisRole {
    X,
    Y,
    Z,
    Channel,
    Other,
}

impl AxisRole {
    pub fn from_label(label: &str) -> AxisRole {
        match label.trim().to_ascii_lowercase().as_str() {
            "x" => AxisRole::X,
            "y" => AxisRole::Y,
            "z" => AxisRole::Z,
            "c" | "channel" | "ch" => AxisRole::Channel,
            _ => AxisRole::Other,
        }
    }

    pub fn is_spatial(&self) -> bool {
        matches!(self, AxisRole::X | AxisRole::Y | AxisRole::Z)
    }

    // slot in the logical lookup table, Other has none
    fn slot(&self) -> Option<usize> {
        match self {
            AxisRole::X => Some(0),
            AxisRole::Y => Some(1),
            AxisRole::Z => Some(2),
            AxisRole::Channel => Some(3),
            AxisRole::Other => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CalibratedAxis {
    pub label: String,
    // physical units per voxel
    pub scale: f64,
    pub origin: f64,
}

impl CalibratedAxis {
    pub fn new(label: &str, scale: f64) -> CalibratedAxis {
        CalibratedAxis {
            label: label.to_string(),
            scale,
            origin: 0.0,
        }
    }

    // Physical length to voxel count, measured from the origin at zero.
    pub fn raw_value(&self, physical: f64) -> f64 {
        physical / self.scale
    }
}

/// Physical dimension layout of a volume: the role each dimension plays,
/// its calibration, and the reverse lookup from role to dimension index.
#[derive(Clone, Debug)]
pub struct AxisModel {
    axes: Vec<CalibratedAxis>,
    roles: Vec<AxisRole>,
    order: [Option<usize>; 4],
}

impl AxisModel {
    pub fn new(axes: Vec<CalibratedAxis>) -> Result<AxisModel> {
        let mut order = [None; 4];
        let mut roles = Vec::with_capacity(axes.len());
        for (d, axis) in axes.iter().enumerate() {
            let mut role = AxisRole::from_label(&axis.label);
            if let Some(slot) = role.slot() {
                if order[slot].is_some() {
                    warn!(
                        "Axis '{}' at dimension {} repeats role {:?}; treating it as other",
                        axis.label, d, role
                    );
                    role = AxisRole::Other;
                } else {
                    order[slot] = Some(d);
                }
            }
            roles.push(role);
        }

        for required in [AxisRole::X, AxisRole::Y] {
            if required.slot().and_then(|slot| order[slot]).is_none() {
                return Err(AnalysisError::MissingAxis(required));
            }
        }

        Ok(AxisModel { axes, roles, order })
    }

    // Single channel data has no channel axis; add one of extent 1 at the end.
    pub fn with_channel_axis(mut self) -> AxisModel {
        if self.order[3].is_none() {
            self.order[3] = Some(self.axes.len());
            self.axes.push(CalibratedAxis::new("Channel", 1.0));
            self.roles.push(AxisRole::Channel);
        }
        self
    }

    pub fn ndim(&self) -> usize {
        self.axes.len()
    }

    pub fn role(&self, d: usize) -> AxisRole {
        self.roles[d]
    }

    pub fn label(&self, d: usize) -> &str {
        &self.axes[d].label
    }

    pub fn scale(&self, d: usize) -> f64 {
        self.axes[d].scale
    }

    pub fn axis(&self, d: usize) -> &CalibratedAxis {
        &self.axes[d]
    }

    pub fn index(&self, role: AxisRole) -> Option<usize> {
        role.slot().and_then(|slot| self.order[slot])
    }

    pub fn require(&self, role: AxisRole) -> Result<usize> {
        self.index(role).ok_or(AnalysisError::MissingAxis(role))
    }

    pub fn channel_axis(&self) -> Result<usize> {
        self.require(AxisRole::Channel)
    }

    // Every dimension except the channel, in physical order. These address
    // a single site (voxel or grid position) independent of channel.
    pub fn site_dims(&self) -> Vec<usize> {
        (0..self.ndim())
            .filter(|&d| self.roles[d] != AxisRole::Channel)
            .collect()
    }

    pub fn spatial_dims(&self) -> Vec<usize> {
        (0..self.ndim()).filter(|&d| self.roles[d].is_spatial()).collect()
    }

    pub fn labels(&self) -> Vec<String> {
        self.axes.iter().map(|a| a.label.clone()).collect()
    }
}

/// Voxel extent of a grid cell along every physical dimension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NeighbourhoodSpec {
    extents: Vec<usize>,
}

impl NeighbourhoodSpec {
    pub fn new(extents: Vec<usize>) -> Result<NeighbourhoodSpec> {
        if let Some(axis) = extents.iter().position(|&e| e == 0) {
            return Err(AnalysisError::InvalidNeighbourhood { axis, extent: 0 });
        }
        Ok(NeighbourhoodSpec { extents })
    }

    // X, Y and Z take round(size / scale) voxels; the channel axis, Z in 2D
    // mode, and any other axis take a single voxel.
    pub fn from_physical(axes: &AxisModel, params: &AnalysisParams) -> Result<NeighbourhoodSpec> {
        let mut extents = Vec::with_capacity(axes.ndim());
        for d in 0..axes.ndim() {
            let size = match axes.role(d) {
                AxisRole::X => Some(params.neighbourhood[0]),
                AxisRole::Y => Some(params.neighbourhood[1]),
                AxisRole::Z if params.do_3d => Some(params.neighbourhood[2]),
                _ => None,
            };

            let extent = match size {
                Some(size) => {
                    let raw = axes.axis(d).raw_value(size).round();
                    if !raw.is_finite() || raw < 1.0 {
                        return Err(AnalysisError::InvalidNeighbourhood {
                            axis: d,
                            extent: if raw.is_finite() { raw as i64 } else { 0 },
                        });
                    }
                    raw as usize
                }
                None => 1,
            };
            extents.push(extent);
        }
        Ok(NeighbourhoodSpec { extents })
    }

    pub fn extent(&self, d: usize) -> usize {
        self.extents[d]
    }

    pub fn extents(&self) -> &[usize] {
        &self.extents
    }

    pub fn ndim(&self) -> usize {
        self.extents.len()
    }

    // Restrict to a subset of dimensions, in the order given.
    pub fn select(&self, dims: &[usize]) -> NeighbourhoodSpec {
        NeighbourhoodSpec {
            extents: dims.iter().map(|&d| self.extents[d]).collect(),
        }
    }

    pub fn with_unit_extent(&self, d: usize) -> NeighbourhoodSpec {
        let mut extents = self.extents.clone();
        extents[d] = 1;
        NeighbourhoodSpec { extents }
    }

    // Limit each extent to the volume extent along that dimension.
    pub fn clamped(&self, dims: &[usize]) -> NeighbourhoodSpec {
        NeighbourhoodSpec {
            extents: self
                .extents
                .iter()
                .zip(dims)
                .map(|(&e, &n)| e.min(n.max(1)))
                .collect(),
        }
    }
}
