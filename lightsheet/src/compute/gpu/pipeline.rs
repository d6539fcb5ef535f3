use std::any::{Any, TypeId};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;

use super::Gpu;
use crate::error::{Error, Result};

/// Trait marker for GPU pipelines that can be cached.
pub(crate) trait GpuPipeline: Any + std::fmt::Debug + Send + Sync {}

/// Cache for GPU pipelines keyed by their type.
///
/// Pipelines are built lazily on first use, so operations that are never
/// enabled never compile their shaders.
#[derive(Debug, Default)]
pub(crate) struct PipelineCache {
    pipelines: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl PipelineCache {
    /// Returns the pipeline of type T, creating it with `create` if needed.
    pub(crate) fn get_or_create<T, F>(&self, gpu: &Gpu, create: F) -> Result<Arc<T>>
    where
        T: GpuPipeline,
        F: FnOnce(&Gpu) -> Result<T>,
    {
        let type_id = TypeId::of::<T>();
        let mut pipelines = self.pipelines.lock();

        let entry = match pipelines.get(&type_id) {
            Some(entry) => Arc::clone(entry),
            None => {
                let pipeline: Arc<dyn Any + Send + Sync> = Arc::new(create(gpu)?);
                pipelines.insert(type_id, Arc::clone(&pipeline));
                pipeline
            }
        };

        entry
            .downcast::<T>()
            .map_err(|_| Error::Gpu("pipeline cache type mismatch".to_string()))
    }

    pub(crate) fn len(&self) -> usize {
        self.pipelines.lock().len()
    }
}

/// Compute shader with the common layout: uniform params at binding 0, a
/// read-only input volume at binding 1 and a writable output at binding 2.
#[derive(Debug)]
pub(crate) struct VolumeKernel {
    pub(crate) label: &'static str,
    pub(crate) pipeline: wgpu::ComputePipeline,
    pub(crate) bind_group_layout: wgpu::BindGroupLayout,
}

impl VolumeKernel {
    fn new(gpu: &Gpu, label: &'static str, source: &'static str) -> Result<Self> {
        gpu.scoped(label, || {
            let device = gpu.device();

            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });

            let bind_group_layout =
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(label),
                    entries: &[
                        // Params uniform buffer
                        wgpu::BindGroupLayoutEntry {
                            binding: 0,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: None,
                            },
                            count: None,
                        },
                        // Input volume (read-only)
                        wgpu::BindGroupLayoutEntry {
                            binding: 1,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Storage { read_only: true },
                                has_dynamic_offset: false,
                                min_binding_size: None,
                            },
                            count: None,
                        },
                        // Output volume (read-write)
                        wgpu::BindGroupLayoutEntry {
                            binding: 2,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Storage { read_only: false },
                                has_dynamic_offset: false,
                                min_binding_size: None,
                            },
                            count: None,
                        },
                    ],
                });

            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[&bind_group_layout],
                ..Default::default()
            });

            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            });

            Ok(Self {
                label,
                pipeline,
                bind_group_layout,
            })
        })
    }
}

#[derive(Debug)]
pub(crate) struct MedianPipeline(pub(crate) VolumeKernel);

impl MedianPipeline {
    pub(crate) fn new(gpu: &Gpu) -> Result<Self> {
        VolumeKernel::new(gpu, "median_slicewise", include_str!("median.wgsl")).map(Self)
    }
}

impl GpuPipeline for MedianPipeline {}

#[derive(Debug)]
pub(crate) struct AffinePipeline(pub(crate) VolumeKernel);

impl AffinePipeline {
    pub(crate) fn new(gpu: &Gpu) -> Result<Self> {
        VolumeKernel::new(gpu, "affine_transform", include_str!("affine.wgsl")).map(Self)
    }
}

impl GpuPipeline for AffinePipeline {}

#[derive(Debug)]
pub(crate) struct MaxProjectionPipeline(pub(crate) VolumeKernel);

impl MaxProjectionPipeline {
    pub(crate) fn new(gpu: &Gpu) -> Result<Self> {
        VolumeKernel::new(gpu, "max_z_projection", include_str!("max_projection.wgsl")).map(Self)
    }
}

impl GpuPipeline for MaxProjectionPipeline {}
