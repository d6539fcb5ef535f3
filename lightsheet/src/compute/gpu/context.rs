use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::DAffine3;
use wgpu::util::DeviceExt;

use super::pipeline::{
    AffinePipeline, MaxProjectionPipeline, MedianPipeline, PipelineCache, VolumeKernel,
};
use super::{Gpu, GpuVolume};
use crate::compute::{
    ensure_projection_fits, ensure_same_desc, ensure_slice_fits, ensure_upload_fits,
    ComputeContext, FilterMode, HostVolume, VolumeDesc,
};
use crate::error::Result;
use crate::sample::{SampleBuffer, SampleSlice};

const WORKGROUP_SIZE: u32 = 16;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct VolumeParams {
    width: u32,
    height: u32,
    depth: u32,
    // Median radius, padding for the projection kernel
    extra: u32,
}

/// Must match the WGSL struct exactly (80 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct AffineParams {
    inv_x: [f32; 4],
    inv_y: [f32; 4],
    inv_z: [f32; 4],
    inv_t: [f32; 4],
    width: u32,
    height: u32,
    depth: u32,
    filter_mode: u32,
}

impl AffineParams {
    fn new(transform: &DAffine3, desc: &VolumeDesc, filter: FilterMode) -> Self {
        let inv = transform.inverse();
        let column = |v: glam::DVec3| [v.x as f32, v.y as f32, v.z as f32, 0.0];
        Self {
            inv_x: column(inv.matrix3.x_axis),
            inv_y: column(inv.matrix3.y_axis),
            inv_z: column(inv.matrix3.z_axis),
            inv_t: column(inv.translation),
            width: desc.width,
            height: desc.height,
            depth: desc.depth,
            filter_mode: match filter {
                FilterMode::Nearest => 0,
                FilterMode::Linear => 1,
            },
        }
    }
}

/// [`ComputeContext`] backed by WGSL compute shaders.
///
/// Every operation is submitted and waited on before returning, so errors are
/// reported by the call that caused them.
///
/// Device buffers hold f32 samples whatever the logical sample type, so one
/// set of shaders serves u8, u16 and f32 volumes. The type stays in the
/// [`VolumeDesc`] and is restored on download: floats come back bit-exact and
/// integers are rounded and clamped. The cost is device memory: a u8 volume
/// takes four times its host size and a u16 volume twice, which counts
/// against `max_storage_buffer_binding_size` when sizing stacks.
#[derive(Debug, Clone)]
pub struct WgpuContext {
    gpu: Gpu,
    pipelines: Arc<PipelineCache>,
}

impl WgpuContext {
    /// Creates a context on the default high-performance adapter.
    pub fn new() -> Result<Self> {
        Ok(Self::with_gpu(Gpu::new()?))
    }

    pub fn with_gpu(gpu: Gpu) -> Self {
        Self {
            gpu,
            pipelines: Arc::new(PipelineCache::default()),
        }
    }

    pub fn gpu(&self) -> &Gpu {
        &self.gpu
    }

    fn dispatch(
        &self,
        kernel: &VolumeKernel,
        params: &[u8],
        input: &GpuVolume,
        output: &GpuVolume,
        workgroups: (u32, u32, u32),
    ) -> Result<()> {
        let device = self.gpu.device();

        self.gpu.scoped(kernel.label, || {
            let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("volume_params_buffer"),
                contents: params,
                usage: wgpu::BufferUsages::UNIFORM,
            });

            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(kernel.label),
                layout: &kernel.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: input.buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: output.buffer.as_entire_binding(),
                    },
                ],
            });

            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(kernel.label),
            });

            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(kernel.label),
                    timestamp_writes: None,
                });

                pass.set_pipeline(&kernel.pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                let (x, y, z) = workgroups;
                pass.dispatch_workgroups(x, y, z);
            }

            self.gpu.queue().submit(std::iter::once(encoder.finish()));
            Ok(())
        })?;

        self.gpu.wait()
    }
}

fn plane_workgroups(desc: &VolumeDesc, depth: u32) -> (u32, u32, u32) {
    (
        desc.width.div_ceil(WORKGROUP_SIZE),
        desc.height.div_ceil(WORKGROUP_SIZE),
        depth,
    )
}

impl ComputeContext for WgpuContext {
    type Buffer = GpuVolume;

    fn create_buffer(&self, desc: VolumeDesc) -> Result<GpuVolume> {
        GpuVolume::new_empty(&self.gpu, desc)
    }

    fn upload(&self, samples: SampleSlice<'_>, target: &mut GpuVolume) -> Result<()> {
        ensure_upload_fits(&samples, &target.desc)?;
        if samples.is_empty() {
            return Ok(());
        }

        let values = samples.to_f32_vec();
        self.gpu.scoped("upload", || {
            self.gpu
                .queue()
                .write_buffer(&target.buffer, 0, bytemuck::cast_slice(&values));
            self.gpu.queue().submit(std::iter::empty());
            Ok(())
        })?;
        self.gpu.wait()
    }

    fn copy_slice(&self, plane: &GpuVolume, volume: &mut GpuVolume, z: u32) -> Result<()> {
        ensure_slice_fits(&plane.desc, &volume.desc, z)?;

        let size = volume.plane_byte_size();
        if size == 0 {
            return Ok(());
        }

        let device = self.gpu.device();
        self.gpu.scoped("copy_slice", || {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("copy_slice_encoder"),
            });
            encoder.copy_buffer_to_buffer(&plane.buffer, 0, &volume.buffer, z as u64 * size, size);
            self.gpu.queue().submit(std::iter::once(encoder.finish()));
            Ok(())
        })?;
        self.gpu.wait()
    }

    fn median_slicewise(&self, input: &GpuVolume, output: &mut GpuVolume, radius: u32) -> Result<()> {
        ensure_same_desc("median_slicewise", &input.desc, &output.desc)?;

        let pipeline = self.pipelines.get_or_create(&self.gpu, MedianPipeline::new)?;
        let desc = input.desc;
        let params = VolumeParams {
            width: desc.width,
            height: desc.height,
            depth: desc.depth,
            extra: radius,
        };

        self.dispatch(
            &pipeline.0,
            bytemuck::bytes_of(&params),
            input,
            output,
            plane_workgroups(&desc, desc.depth),
        )
    }

    fn affine_transform(
        &self,
        input: &GpuVolume,
        output: &mut GpuVolume,
        transform: &DAffine3,
        filter: FilterMode,
    ) -> Result<()> {
        ensure_same_desc("affine_transform", &input.desc, &output.desc)?;

        let pipeline = self.pipelines.get_or_create(&self.gpu, AffinePipeline::new)?;
        let desc = input.desc;
        let params = AffineParams::new(transform, &desc, filter);

        self.dispatch(
            &pipeline.0,
            bytemuck::bytes_of(&params),
            input,
            output,
            plane_workgroups(&desc, desc.depth),
        )
    }

    fn max_z_projection(&self, input: &GpuVolume, output: &mut GpuVolume) -> Result<()> {
        ensure_projection_fits(&input.desc, &output.desc)?;

        let pipeline = self
            .pipelines
            .get_or_create(&self.gpu, MaxProjectionPipeline::new)?;
        let desc = input.desc;
        let params = VolumeParams {
            width: desc.width,
            height: desc.height,
            depth: desc.depth,
            extra: 0,
        };

        self.dispatch(
            &pipeline.0,
            bytemuck::bytes_of(&params),
            input,
            output,
            plane_workgroups(&desc, 1),
        )
    }

    fn download(&self, buffer: &GpuVolume) -> Result<HostVolume> {
        let desc = buffer.desc;
        if desc.is_empty() {
            return HostVolume::new(desc, SampleBuffer::zeroed(desc.sample_type, 0));
        }

        let size = desc.len() as u64 * GpuVolume::SAMPLE_SIZE;
        let values: Vec<f32> = self.gpu.read_buffer(&buffer.buffer, size)?;
        HostVolume::new(desc, SampleBuffer::from_f32(desc.sample_type, &values))
    }

    fn release(&self, buffer: GpuVolume) {
        buffer.buffer.destroy();
    }
}
