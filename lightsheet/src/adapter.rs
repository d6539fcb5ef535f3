use crate::compute::{ComputeContext, VolumeDesc};
use crate::error::{Error, Result};
use crate::frame::Frame;

/// Moves a host frame into a single-plane device buffer of the same element type.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameAdapter;

impl FrameAdapter {
    /// Allocates a `width x height` buffer on `ctx` and uploads the frame samples.
    ///
    /// The returned buffer belongs to the caller, who must release it.
    pub fn adapt<C: ComputeContext>(ctx: &C, frame: &Frame<'_>) -> Result<C::Buffer> {
        let samples = frame.pixels.samples()?;

        let expected = frame.pixel_count();
        if samples.len() != expected {
            return Err(Error::FrameSizeMismatch {
                width: frame.width,
                height: frame.height,
                expected,
                actual: samples.len(),
            });
        }

        let desc = VolumeDesc::plane(frame.width, frame.height, samples.sample_type());
        let mut buffer = ctx.create_buffer(desc)?;
        if let Err(err) = ctx.upload(samples, &mut buffer) {
            ctx.release(buffer);
            return Err(err);
        }

        Ok(buffer)
    }
}
