use crate::compute::{ensure_same_desc, ComputeContext, DeviceBuffer};
use crate::error::Result;

/// Two owned buffer slots for chaining whole-volume stages.
///
/// Each stage reads `current` and writes `scratch`, then the slots swap. The
/// scratch buffer is allocated on the first stage and reused for the rest.
#[derive(Debug)]
pub struct PingPong<B> {
    current: B,
    scratch: Option<B>,
}

impl<B: DeviceBuffer> PingPong<B> {
    pub fn new(input: B) -> Self {
        Self {
            current: input,
            scratch: None,
        }
    }

    pub fn current(&self) -> &B {
        &self.current
    }

    /// Runs `stage` from the current buffer into the scratch buffer and swaps.
    ///
    /// On error both buffers are released.
    pub fn run_stage<C, F>(mut self, ctx: &C, name: &'static str, stage: F) -> Result<Self>
    where
        C: ComputeContext<Buffer = B>,
        F: FnOnce(&C, &B, &mut B) -> Result<()>,
    {
        let mut output = match self.scratch.take() {
            Some(scratch) => scratch,
            None => match ctx.create_buffer(*self.current.desc()) {
                Ok(buffer) => buffer,
                Err(err) => {
                    ctx.release(self.current);
                    return Err(err);
                }
            },
        };

        let result = ensure_same_desc(name, self.current.desc(), output.desc())
            .and_then(|()| stage(ctx, &self.current, &mut output));
        if let Err(err) = result {
            ctx.release(output);
            ctx.release(self.current);
            return Err(err);
        }

        tracing::trace!(stage = name, desc = %output.desc(), "stage complete");
        Ok(Self {
            current: output,
            scratch: Some(self.current),
        })
    }

    /// Releases the scratch buffer and returns the last stage output.
    pub fn finish<C>(self, ctx: &C) -> B
    where
        C: ComputeContext<Buffer = B>,
    {
        if let Some(scratch) = self.scratch {
            ctx.release(scratch);
        }
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{CpuBuffer, CpuContext, VolumeDesc};
    use crate::error::Error;
    use crate::sample::{SampleBuffer, SampleSlice, SampleType};

    fn volume(ctx: &CpuContext, samples: &[u16]) -> CpuBuffer {
        let desc = VolumeDesc::new(samples.len() as u32, 1, 1, SampleType::U16);
        let mut buffer = ctx.create_buffer(desc).unwrap();
        ctx.upload(SampleSlice::U16(samples), &mut buffer).unwrap();
        buffer
    }

    fn add_one(ctx: &CpuContext, input: &CpuBuffer, output: &mut CpuBuffer) -> Result<()> {
        let host = ctx.download(input)?;
        let SampleBuffer::U16(values) = host.samples else {
            unreachable!()
        };
        let values: Vec<u16> = values.iter().map(|v| v + 1).collect();
        ctx.upload(SampleSlice::U16(&values), output)
    }

    #[test]
    fn test_no_stages_returns_input() {
        let ctx = CpuContext::new();
        let input = volume(&ctx, &[1, 2, 3]);

        let output = PingPong::new(input.clone()).finish(&ctx);
        assert_eq!(output, input);
    }

    #[test]
    fn test_stages_chain_through_swapped_buffers() {
        let ctx = CpuContext::new();
        let input = volume(&ctx, &[1, 2, 3]);

        let output = PingPong::new(input)
            .run_stage(&ctx, "first", add_one)
            .unwrap()
            .run_stage(&ctx, "second", add_one)
            .unwrap()
            .run_stage(&ctx, "third", add_one)
            .unwrap()
            .finish(&ctx);

        assert_eq!(
            ctx.download(&output).unwrap().samples,
            SampleBuffer::U16(vec![4, 5, 6])
        );
    }

    #[test]
    fn test_stage_error_propagates() {
        let ctx = CpuContext::new();
        let input = volume(&ctx, &[1, 2, 3]);

        let result = PingPong::new(input).run_stage(&ctx, "failing", |_, _, _| {
            Err(Error::Gpu("device lost".to_string()))
        });
        assert!(matches!(result, Err(Error::Gpu(_))));
    }
}
