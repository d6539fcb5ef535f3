//! Whole-volume post-processing: median denoise, then deskew.

mod deskew;
mod ping_pong;

pub use deskew::{cot_degrees, deskew_transform, shear_factor, sin_cos_degrees};
pub use ping_pong::PingPong;

use crate::compute::{ComputeContext, DeviceBuffer, FilterMode};
use crate::config::ProcessingConfig;
use crate::error::Result;

/// A single enabled processing stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stage {
    /// Slice-wise box median.
    Denoise { radius: u32 },
    /// Shear resample along Z->X.
    Deskew {
        angle_degrees: f64,
        offset_x: f64,
        filter: FilterMode,
    },
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Denoise { .. } => "denoise",
            Stage::Deskew { .. } => "deskew",
        }
    }
}

/// Ordered list of enabled stages built from the processing configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessingPipeline {
    stages: Vec<Stage>,
}

impl ProcessingPipeline {
    /// Validates `config` and collects the enabled stages in their fixed order.
    pub fn from_config(config: &ProcessingConfig) -> Result<Self> {
        config.validate()?;

        let mut stages = Vec::with_capacity(2);
        if config.denoise_enabled {
            stages.push(Stage::Denoise {
                radius: config.denoise_median_radius,
            });
        }
        if config.deskew_enabled {
            stages.push(Stage::Deskew {
                angle_degrees: config.deskew_angle_degrees,
                offset_x: config.deskew_offset_x,
                filter: config.interpolation,
            });
        }

        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs every stage over `input`, consuming it.
    ///
    /// With no stages the input is returned as is. On error every buffer owned
    /// by the pipeline has been released.
    pub fn process<C: ComputeContext>(
        &self,
        ctx: &C,
        input: C::Buffer,
        timepoint: u64,
    ) -> Result<C::Buffer> {
        let mut chain = PingPong::new(input);

        for stage in &self.stages {
            tracing::debug!(timepoint, stage = stage.name(), "running stage");

            chain = match *stage {
                Stage::Denoise { radius } => {
                    chain.run_stage(ctx, "denoise", |ctx, input, output| {
                        ctx.median_slicewise(input, output, radius)
                    })?
                }
                Stage::Deskew {
                    angle_degrees,
                    offset_x,
                    filter,
                } => {
                    let width = chain.current().desc().width;
                    let transform = match deskew_transform(width, angle_degrees, offset_x) {
                        Ok(transform) => transform,
                        Err(err) => {
                            ctx.release(chain.finish(ctx));
                            return Err(err);
                        }
                    };
                    chain.run_stage(ctx, "deskew", |ctx, input, output| {
                        ctx.affine_transform(input, output, &transform, filter)
                    })?
                }
            };
        }

        Ok(chain.finish(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{CpuBuffer, CpuContext, VolumeDesc};
    use crate::error::Error;
    use crate::sample::{SampleBuffer, SampleSlice, SampleType};

    fn config(denoise: bool, deskew: bool) -> ProcessingConfig {
        ProcessingConfig {
            denoise_enabled: denoise,
            deskew_enabled: deskew,
            ..Default::default()
        }
    }

    fn volume(ctx: &CpuContext, width: u32, height: u32, samples: &[u16]) -> CpuBuffer {
        let depth = samples.len() as u32 / (width * height);
        let mut buffer = ctx
            .create_buffer(VolumeDesc::new(width, height, depth, SampleType::U16))
            .unwrap();
        ctx.upload(SampleSlice::U16(samples), &mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_stage_order_is_fixed() {
        let pipeline = ProcessingPipeline::from_config(&config(true, true)).unwrap();
        let names: Vec<_> = pipeline.stages().iter().map(Stage::name).collect();
        assert_eq!(names, vec!["denoise", "deskew"]);

        assert!(ProcessingPipeline::from_config(&config(false, false))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_invalid_radius_is_rejected() {
        let mut config = config(true, false);
        config.denoise_median_radius = 2;
        assert!(matches!(
            ProcessingPipeline::from_config(&config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_empty_pipeline_passes_input_through() {
        let ctx = CpuContext::new();
        let samples: Vec<u16> = (0..18).collect();
        let input = volume(&ctx, 3, 3, &samples);

        let pipeline = ProcessingPipeline::from_config(&config(false, false)).unwrap();
        let output = pipeline.process(&ctx, input.clone(), 0).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_deskew_at_90_with_centering_offset_is_identity() {
        let ctx = CpuContext::new();
        let samples: Vec<u16> = (0..24).collect();
        let input = volume(&ctx, 4, 3, &samples);

        let mut config = config(false, true);
        config.deskew_angle_degrees = 90.0;
        config.deskew_offset_x = -2.0;
        let pipeline = ProcessingPipeline::from_config(&config).unwrap();

        let output = pipeline.process(&ctx, input, 0).unwrap();
        assert_eq!(
            ctx.download(&output).unwrap().samples,
            SampleBuffer::U16(samples)
        );
    }

    #[test]
    fn test_deskew_at_45_shifts_planes_by_z() {
        let ctx = CpuContext::new();
        // 4 wide, 1 high, 3 deep, every plane [1, 2, 3, 4]
        let samples: Vec<u16> = [1, 2, 3, 4].repeat(3);
        let input = volume(&ctx, 4, 1, &samples);

        let mut config = config(false, true);
        config.deskew_angle_degrees = 45.0;
        config.deskew_offset_x = -2.0;
        let pipeline = ProcessingPipeline::from_config(&config).unwrap();

        let output = pipeline.process(&ctx, input, 0).unwrap();
        assert_eq!(
            ctx.download(&output).unwrap().samples,
            SampleBuffer::U16(vec![1, 2, 3, 4, 0, 1, 2, 3, 0, 0, 1, 2])
        );
    }

    #[test]
    fn test_denoise_then_deskew() {
        let ctx = CpuContext::new();
        let mut samples = vec![5u16; 5 * 5 * 2];
        samples[12] = 900;
        samples[37] = 900;
        let input = volume(&ctx, 5, 5, &samples);

        let mut config = config(true, true);
        config.denoise_median_radius = 1;
        config.deskew_angle_degrees = 90.0;
        config.deskew_offset_x = -2.5;
        let pipeline = ProcessingPipeline::from_config(&config).unwrap();

        let output = pipeline.process(&ctx, input, 3).unwrap();
        assert_eq!(
            ctx.download(&output).unwrap().samples,
            SampleBuffer::U16(vec![5; 50])
        );
    }
}
