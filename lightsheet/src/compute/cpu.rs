//! Host-memory reference backend.
//!
//! Buffers keep their native element type. Whole-volume operations run one
//! Z-plane per rayon task.

use std::cmp::Ordering;

use glam::{DAffine3, DVec3};
use rayon::prelude::*;

use super::{
    ensure_projection_fits, ensure_same_desc, ensure_slice_fits, ensure_upload_fits,
    ComputeContext, DeviceBuffer, FilterMode, HostVolume, VolumeDesc,
};
use crate::error::{Error, Result};
use crate::sample::{Sample, SampleBuffer, SampleSlice};

/// Volume stored in host memory.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuBuffer {
    desc: VolumeDesc,
    samples: SampleBuffer,
}

impl CpuBuffer {
    pub fn samples(&self) -> SampleSlice<'_> {
        self.samples.as_slice()
    }
}

impl DeviceBuffer for CpuBuffer {
    fn desc(&self) -> &VolumeDesc {
        &self.desc
    }
}

/// Compute context that runs every operation on the CPU.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuContext;

impl CpuContext {
    pub fn new() -> Self {
        Self
    }
}

/// Runs `$body` with `$src`/`$dst` bound to same-typed sample vectors.
macro_rules! with_sample_pair {
    ($operation:literal, $input:expr, $output:expr, |$src:ident, $dst:ident| $body:expr) => {{
        let expected = $output.desc;
        let actual = $input.desc;
        match (&$input.samples, &mut $output.samples) {
            (SampleBuffer::U8($src), SampleBuffer::U8($dst)) => $body,
            (SampleBuffer::U16($src), SampleBuffer::U16($dst)) => $body,
            (SampleBuffer::F32($src), SampleBuffer::F32($dst)) => $body,
            _ => {
                return Err(Error::PipelineShapeMismatch {
                    operation: $operation,
                    expected,
                    actual,
                })
            }
        }
    }};
}

impl ComputeContext for CpuContext {
    type Buffer = CpuBuffer;

    fn create_buffer(&self, desc: VolumeDesc) -> Result<CpuBuffer> {
        Ok(CpuBuffer {
            desc,
            samples: SampleBuffer::zeroed(desc.sample_type, desc.len()),
        })
    }

    fn upload(&self, samples: SampleSlice<'_>, target: &mut CpuBuffer) -> Result<()> {
        ensure_upload_fits(&samples, &target.desc)?;
        target.samples = samples.to_buffer();
        Ok(())
    }

    fn copy_slice(&self, plane: &CpuBuffer, volume: &mut CpuBuffer, z: u32) -> Result<()> {
        ensure_slice_fits(&plane.desc, &volume.desc, z)?;

        let len = volume.desc.plane_len();
        let start = z as usize * len;
        with_sample_pair!("copy_slice", plane, volume, |src, dst| {
            dst[start..start + len].copy_from_slice(src)
        });
        Ok(())
    }

    fn median_slicewise(&self, input: &CpuBuffer, output: &mut CpuBuffer, radius: u32) -> Result<()> {
        ensure_same_desc("median_slicewise", &input.desc, &output.desc)?;

        let desc = input.desc;
        with_sample_pair!("median_slicewise", input, output, |src, dst| {
            median_planes(src, dst, &desc, radius)
        });
        Ok(())
    }

    fn affine_transform(
        &self,
        input: &CpuBuffer,
        output: &mut CpuBuffer,
        transform: &DAffine3,
        filter: FilterMode,
    ) -> Result<()> {
        ensure_same_desc("affine_transform", &input.desc, &output.desc)?;

        // Backward mapping: every output voxel pulls from the inverse-mapped input position.
        let inverse = transform.inverse();
        let desc = input.desc;
        with_sample_pair!("affine_transform", input, output, |src, dst| {
            affine_planes(src, dst, &desc, &inverse, filter)
        });
        Ok(())
    }

    fn max_z_projection(&self, input: &CpuBuffer, output: &mut CpuBuffer) -> Result<()> {
        ensure_projection_fits(&input.desc, &output.desc)?;

        let desc = input.desc;
        with_sample_pair!("max_z_projection", input, output, |src, dst| {
            max_projection(src, dst, &desc)
        });
        Ok(())
    }

    fn download(&self, buffer: &CpuBuffer) -> Result<HostVolume> {
        HostVolume::new(buffer.desc, buffer.samples.clone())
    }
}

fn median_planes<T: Sample>(input: &[T], output: &mut [T], desc: &VolumeDesc, radius: u32) {
    let plane_len = desc.plane_len();
    if plane_len == 0 {
        return;
    }

    output
        .par_chunks_mut(plane_len)
        .zip(input.par_chunks(plane_len))
        .for_each(|(dst, src)| {
            median_plane(src, dst, desc.width as usize, desc.height as usize, radius)
        });
}

/// Box median with clamp-to-edge borders. The window is always full, so its
/// length is odd and the median is a single sample.
fn median_plane<T: Sample>(src: &[T], dst: &mut [T], width: usize, height: usize, radius: u32) {
    let r = radius as isize;
    let side = 2 * radius as usize + 1;
    let mut window: Vec<T> = Vec::with_capacity(side * side);

    for y in 0..height {
        for x in 0..width {
            window.clear();
            for dy in -r..=r {
                let sy = (y as isize + dy).clamp(0, height as isize - 1) as usize;
                let row = &src[sy * width..(sy + 1) * width];
                for dx in -r..=r {
                    let sx = (x as isize + dx).clamp(0, width as isize - 1) as usize;
                    window.push(row[sx]);
                }
            }

            let mid = window.len() / 2;
            let (_, median, _) = window
                .select_nth_unstable_by(mid, |a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
            dst[y * width + x] = *median;
        }
    }
}

fn affine_planes<T: Sample>(
    input: &[T],
    output: &mut [T],
    desc: &VolumeDesc,
    inverse: &DAffine3,
    filter: FilterMode,
) {
    let plane_len = desc.plane_len();
    if plane_len == 0 {
        return;
    }

    let width = desc.width as usize;
    output
        .par_chunks_mut(plane_len)
        .enumerate()
        .for_each(|(z, dst)| {
            for (i, out) in dst.iter_mut().enumerate() {
                let p = DVec3::new((i % width) as f64, (i / width) as f64, z as f64);
                let src = inverse.transform_point3(p);
                let value = match filter {
                    FilterMode::Nearest => sample_nearest(input, desc, src),
                    FilterMode::Linear => sample_linear(input, desc, src),
                };
                *out = T::from_f64(value);
            }
        });
}

fn voxel<T: Sample>(input: &[T], desc: &VolumeDesc, x: i64, y: i64, z: i64) -> Option<T> {
    let in_bounds = x >= 0
        && y >= 0
        && z >= 0
        && x < desc.width as i64
        && y < desc.height as i64
        && z < desc.depth as i64;
    if !in_bounds {
        return None;
    }
    let index = (z as usize * desc.height as usize + y as usize) * desc.width as usize + x as usize;
    Some(input[index])
}

fn sample_nearest<T: Sample>(input: &[T], desc: &VolumeDesc, p: DVec3) -> f64 {
    // Halves round up, matching the shader's floor(p + 0.5)
    let p = (p + DVec3::splat(0.5)).floor();
    voxel(input, desc, p.x as i64, p.y as i64, p.z as i64)
        .map(Sample::as_f64)
        .unwrap_or(0.0)
}

/// Trilinear sample, zero outside the volume. Corners with zero weight are
/// skipped so integer positions reproduce the input exactly.
fn sample_linear<T: Sample>(input: &[T], desc: &VolumeDesc, p: DVec3) -> f64 {
    let base = p.floor();
    let frac = p - base;
    let (x0, y0, z0) = (base.x as i64, base.y as i64, base.z as i64);

    let mut acc = 0.0;
    for (dz, wz) in [(0, 1.0 - frac.z), (1, frac.z)] {
        if wz == 0.0 {
            continue;
        }
        for (dy, wy) in [(0, 1.0 - frac.y), (1, frac.y)] {
            if wy == 0.0 {
                continue;
            }
            for (dx, wx) in [(0, 1.0 - frac.x), (1, frac.x)] {
                if wx == 0.0 {
                    continue;
                }
                if let Some(v) = voxel(input, desc, x0 + dx, y0 + dy, z0 + dz) {
                    acc += v.as_f64() * wx * wy * wz;
                }
            }
        }
    }
    acc
}

fn max_projection<T: Sample>(input: &[T], output: &mut [T], desc: &VolumeDesc) {
    let plane_len = desc.plane_len();
    if plane_len == 0 || desc.depth == 0 {
        return;
    }

    output.copy_from_slice(&input[..plane_len]);
    for plane in input.chunks_exact(plane_len).skip(1) {
        for (max, &v) in output.iter_mut().zip(plane) {
            if v > *max {
                *max = v;
            }
        }
    }
}
