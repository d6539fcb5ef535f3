use super::Gpu;
use crate::compute::{DeviceBuffer, VolumeDesc};
use crate::error::{Error, Result};

/// Volume stored on the GPU as a flat buffer of f32 samples.
///
/// The descriptor keeps the logical sample type. Integer samples are widened
/// on upload and rounded back on download.
#[derive(Debug)]
pub struct GpuVolume {
    pub(crate) buffer: wgpu::Buffer,
    pub(crate) desc: VolumeDesc,
}

impl GpuVolume {
    pub(crate) const SAMPLE_SIZE: u64 = std::mem::size_of::<f32>() as u64;

    /// Creates a zero-filled volume.
    pub(crate) fn new_empty(gpu: &Gpu, desc: VolumeDesc) -> Result<Self> {
        let size = Self::byte_size(&desc);
        let max_binding = gpu.device().limits().max_storage_buffer_binding_size as u64;
        if size > max_binding {
            return Err(Error::Gpu(format!(
                "volume {} needs {} bytes, device allows {}",
                desc, size, max_binding
            )));
        }

        // wgpu zero-initializes new buffers
        let buffer = gpu.scoped("create_buffer", || {
            Ok(gpu.device().create_buffer(&wgpu::BufferDescriptor {
                label: Some("gpu_volume_buffer"),
                size,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }))
        })?;

        Ok(Self { buffer, desc })
    }

    /// Buffer size in bytes. Never zero so empty shapes still bind.
    pub(crate) fn byte_size(desc: &VolumeDesc) -> u64 {
        desc.len().max(1) as u64 * Self::SAMPLE_SIZE
    }

    pub(crate) fn plane_byte_size(&self) -> u64 {
        self.desc.plane_len() as u64 * Self::SAMPLE_SIZE
    }
}

impl DeviceBuffer for GpuVolume {
    fn desc(&self) -> &VolumeDesc {
        &self.desc
    }
}
