//! Compute context abstraction.
//!
//! The core only talks to a [`ComputeContext`]: allocate buffers, upload host
//! samples, copy Z-planes, filter, resample, project and download. Device
//! selection, shader compilation and context lifetime belong to the backend.
//!
//! Two backends are provided:
//! - [`CpuContext`] - host-memory reference implementation, parallel per Z-plane
//! - `WgpuContext` - WGSL compute shaders on a wgpu device (feature `wgpu`)

mod cpu;
#[cfg(feature = "wgpu")]
mod gpu;

use std::fmt;

use glam::DAffine3;
use serde::{Deserialize, Serialize};

pub use cpu::{CpuBuffer, CpuContext};
#[cfg(feature = "wgpu")]
pub use gpu::{Gpu, GpuVolume, WgpuContext};

use crate::error::{Error, Result};
use crate::sample::{SampleBuffer, SampleSlice, SampleType};

/// Shape and element type of a device buffer. A 2-D buffer has depth 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VolumeDesc {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub sample_type: SampleType,
}

impl VolumeDesc {
    pub fn new(width: u32, height: u32, depth: u32, sample_type: SampleType) -> Self {
        Self {
            width,
            height,
            depth,
            sample_type,
        }
    }

    pub fn plane(width: u32, height: u32, sample_type: SampleType) -> Self {
        Self::new(width, height, 1, sample_type)
    }

    /// Returns a single-plane descriptor with the same width, height and type.
    pub fn plane_desc(&self) -> Self {
        Self::plane(self.width, self.height, self.sample_type)
    }

    pub fn with_depth(self, depth: u32) -> Self {
        Self { depth, ..self }
    }

    pub fn plane_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn len(&self) -> usize {
        self.plane_len() * self.depth as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for VolumeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}x{} {}",
            self.width, self.height, self.depth, self.sample_type
        )
    }
}

/// Sampling used by the affine resample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Nearest neighbor sampling.
    Nearest,
    /// Trilinear interpolation.
    #[default]
    Linear,
}

/// Host-readable copy of a device buffer, planes stored consecutively.
#[derive(Debug, Clone, PartialEq)]
pub struct HostVolume {
    pub desc: VolumeDesc,
    pub samples: SampleBuffer,
}

impl HostVolume {
    pub fn new(desc: VolumeDesc, samples: SampleBuffer) -> Result<Self> {
        if samples.sample_type() != desc.sample_type || samples.len() != desc.len() {
            return Err(Error::PipelineShapeMismatch {
                operation: "host_volume",
                expected: desc,
                actual: VolumeDesc::new(desc.width, desc.height, 0, samples.sample_type()),
            });
        }
        Ok(Self { desc, samples })
    }

    /// Returns Z-plane `z`.
    pub fn plane(&self, z: u32) -> SampleSlice<'_> {
        let len = self.desc.plane_len();
        let start = z as usize * len;
        self.samples.range(start..start + len)
    }

    pub fn planes(&self) -> impl Iterator<Item = SampleSlice<'_>> {
        (0..self.desc.depth).map(move |z| self.plane(z))
    }
}

/// A device-resident buffer with a known shape.
pub trait DeviceBuffer: fmt::Debug {
    fn desc(&self) -> &VolumeDesc;
}

/// GPU compute capability consumed by the stack pipeline.
///
/// Every call is synchronous from the caller's point of view: once a method
/// returns, later calls observe its result. Implementations must never let an
/// operation read and write the same buffer; the signatures enforce it by taking
/// the output as `&mut` next to a shared input.
pub trait ComputeContext {
    type Buffer: DeviceBuffer;

    /// Allocates a zero-filled buffer.
    fn create_buffer(&self, desc: VolumeDesc) -> Result<Self::Buffer>;

    /// Replaces the whole content of `target` with host samples.
    fn upload(&self, samples: SampleSlice<'_>, target: &mut Self::Buffer) -> Result<()>;

    /// Copies a single-plane buffer into Z-plane `z` of `volume`.
    fn copy_slice(&self, plane: &Self::Buffer, volume: &mut Self::Buffer, z: u32) -> Result<()>;

    /// Applies a 2-D box median of the given radius to every Z-plane independently.
    fn median_slicewise(
        &self,
        input: &Self::Buffer,
        output: &mut Self::Buffer,
        radius: u32,
    ) -> Result<()>;

    /// Resamples `input` through the forward transform `transform`:
    /// `output(p) = input(transform⁻¹ · p)`, zero outside the input.
    fn affine_transform(
        &self,
        input: &Self::Buffer,
        output: &mut Self::Buffer,
        transform: &DAffine3,
        filter: FilterMode,
    ) -> Result<()>;

    /// Writes the per-pixel maximum over all Z-planes of `input` into a single-plane `output`.
    fn max_z_projection(&self, input: &Self::Buffer, output: &mut Self::Buffer) -> Result<()>;

    /// Downloads the buffer into host memory.
    fn download(&self, buffer: &Self::Buffer) -> Result<HostVolume>;

    /// Releases device memory held by the buffer.
    fn release(&self, buffer: Self::Buffer) {
        drop(buffer);
    }
}

pub(crate) fn ensure_same_desc(
    operation: &'static str,
    expected: &VolumeDesc,
    actual: &VolumeDesc,
) -> Result<()> {
    if expected != actual {
        return Err(Error::PipelineShapeMismatch {
            operation,
            expected: *expected,
            actual: *actual,
        });
    }
    Ok(())
}

pub(crate) fn ensure_upload_fits(samples: &SampleSlice<'_>, target: &VolumeDesc) -> Result<()> {
    let actual = VolumeDesc::new(
        target.width,
        target.height,
        target.depth,
        samples.sample_type(),
    );
    if samples.sample_type() != target.sample_type || samples.len() != target.len() {
        return Err(Error::PipelineShapeMismatch {
            operation: "upload",
            expected: *target,
            actual: if samples.len() == target.len() {
                actual
            } else {
                actual.with_depth(0)
            },
        });
    }
    Ok(())
}

pub(crate) fn ensure_slice_fits(plane: &VolumeDesc, volume: &VolumeDesc, z: u32) -> Result<()> {
    ensure_same_desc("copy_slice", &volume.plane_desc(), plane)?;
    if z >= volume.depth {
        return Err(Error::PipelineShapeMismatch {
            operation: "copy_slice",
            expected: *volume,
            actual: volume.with_depth(z + 1),
        });
    }
    Ok(())
}

pub(crate) fn ensure_projection_fits(input: &VolumeDesc, output: &VolumeDesc) -> Result<()> {
    ensure_same_desc("max_z_projection", &input.plane_desc(), output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_desc_sizes() {
        let desc = VolumeDesc::new(4, 3, 5, SampleType::U16);
        assert_eq!(desc.plane_len(), 12);
        assert_eq!(desc.len(), 60);
        assert_eq!(desc.plane_desc(), VolumeDesc::plane(4, 3, SampleType::U16));
        assert_eq!(desc.to_string(), "4x3x5 u16");
    }

    #[test]
    fn test_host_volume_rejects_wrong_length() {
        let desc = VolumeDesc::new(2, 2, 2, SampleType::U8);
        let result = HostVolume::new(desc, SampleBuffer::U8(vec![0; 7]));
        assert!(matches!(result, Err(Error::PipelineShapeMismatch { .. })));
    }

    #[test]
    fn test_host_volume_planes() {
        let desc = VolumeDesc::new(2, 1, 3, SampleType::U8);
        let volume = HostVolume::new(desc, SampleBuffer::U8(vec![1, 2, 3, 4, 5, 6])).unwrap();
        let planes: Vec<_> = volume.planes().map(|p| p.to_buffer()).collect();
        assert_eq!(
            planes,
            vec![
                SampleBuffer::U8(vec![1, 2]),
                SampleBuffer::U8(vec![3, 4]),
                SampleBuffer::U8(vec![5, 6]),
            ]
        );
    }

    #[test]
    fn test_slice_index_out_of_range() {
        let volume = VolumeDesc::new(2, 2, 3, SampleType::F32);
        let plane = volume.plane_desc();
        assert!(ensure_slice_fits(&plane, &volume, 2).is_ok());
        assert!(ensure_slice_fits(&plane, &volume, 3).is_err());
        assert!(ensure_slice_fits(&plane.with_depth(2), &volume, 0).is_err());
    }
}
