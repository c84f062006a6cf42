// Raw little-endian volumes, optionally gzipped, in row-major order.

use clap::ValueEnum;
use flate2::read::GzDecoder;
use log::info;
use ndarray::{ArrayD, IxDyn};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{AnalysisError, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum RawDtype {
    U8,
    U16,
    U32,
    F32,
}

impl RawDtype {
    pub fn size(&self) -> usize {
        match self {
            RawDtype::U8 => 1,
            RawDtype::U16 => 2,
            RawDtype::U32 | RawDtype::F32 => 4,
        }
    }

    fn decode(&self, bytes: &[u8]) -> f64 {
        match self {
            RawDtype::U8 => bytes[0] as f64,
            RawDtype::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as f64,
            RawDtype::U32 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
            RawDtype::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
        }
    }
}

fn read_bytes(path: &Path, shape: &[usize], dtype: RawDtype) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut bytes = Vec::new();
    if path.to_string_lossy().ends_with(".gz") {
        GzDecoder::new(file).read_to_end(&mut bytes)?;
    } else {
        file.read_to_end(&mut bytes)?;
    }

    let expected = shape.iter().product::<usize>() * dtype.size();
    if bytes.len() != expected {
        return Err(AnalysisError::RawSize {
            path: path.display().to_string(),
            expected,
            got: bytes.len(),
        });
    }
    Ok(bytes)
}

fn read_raw<T, F>(path: &Path, shape: &[usize], dtype: RawDtype, convert: F) -> Result<ArrayD<T>>
where
    F: Fn(f64) -> T,
{
    let bytes = read_bytes(path, shape, dtype)?;
    let values: Vec<T> = bytes
        .chunks_exact(dtype.size())
        .map(|b| convert(dtype.decode(b)))
        .collect();
    info!("Read {:?} {:?} volume from {}", shape, dtype, path.display());

    ArrayD::from_shape_vec(IxDyn(shape), values).map_err(|_| AnalysisError::DimensionMismatch {
        expected: shape.to_vec(),
        got: vec![bytes.len() / dtype.size()],
    })
}

pub fn read_raw_volume(path: &Path, shape: &[usize], dtype: RawDtype) -> Result<ArrayD<f32>> {
    read_raw(path, shape, dtype, |v| v as f32)
}

// Label volumes, 0 is background.
pub fn read_raw_labels(path: &Path, shape: &[usize], dtype: RawDtype) -> Result<ArrayD<u32>> {
    read_raw(path, shape, dtype, |v| v as u32)
}

// Binary masks: any nonzero voxel is set.
pub fn read_raw_mask(path: &Path, shape: &[usize], dtype: RawDtype) -> Result<ArrayD<bool>> {
    read_raw(path, shape, dtype, |v| v != 0.0)
}
