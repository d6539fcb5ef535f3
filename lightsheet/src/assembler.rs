//! Slice-by-slice stack assembly.
//!
//! Frames fill a volume at `frame_index % depth`. The volume is handed out when
//! the last plane of a stack arrives and a fresh zero-filled one is allocated for
//! the next stack, so a missed frame leaves a zero plane instead of stale data.
//! When the closing frame itself is missed, the incomplete volume is dropped as
//! soon as a frame of a later stack arrives.

use crate::compute::{ComputeContext, DeviceBuffer};
use crate::error::{Error, Result};

/// A fully populated stack ready for processing.
#[derive(Debug)]
pub struct CompletedStack<B> {
    pub volume: B,
    pub timepoint: u64,
}

/// Owns the in-flight volume between stack completions.
#[derive(Debug)]
pub struct StackAssembler<B> {
    volume: Option<B>,
    /// Timepoint the in-flight volume belongs to.
    timepoint: u64,
}

impl<B> Default for StackAssembler<B> {
    fn default() -> Self {
        Self {
            volume: None,
            timepoint: 0,
        }
    }
}

impl<B: DeviceBuffer> StackAssembler<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies `slice` into the in-flight volume at `frame_index % depth`.
    ///
    /// Returns the volume and its timepoint when `frame_index` closes a stack.
    pub fn collect<C>(
        &mut self,
        ctx: &C,
        slice: &B,
        frame_index: u64,
        depth: u32,
    ) -> Result<Option<CompletedStack<B>>>
    where
        C: ComputeContext<Buffer = B>,
    {
        if depth == 0 {
            return Err(Error::InvalidStackDepth {
                depth: 0.0,
                top_um: f64::NAN,
                bottom_um: f64::NAN,
                step_um: f64::NAN,
            });
        }

        let timepoint = frame_index / depth as u64;
        if self.timepoint != timepoint {
            if let Some(stale) = self.volume.take() {
                tracing::warn!(
                    timepoint = self.timepoint,
                    "stack never received its last plane, discarding it"
                );
                ctx.release(stale);
            }
        }

        let volume = match self.volume.take() {
            Some(volume) => volume,
            None => {
                let desc = slice.desc().with_depth(depth);
                tracing::debug!(%desc, timepoint, "allocating stack volume");
                ctx.create_buffer(desc)?
            }
        };
        // Still owned by the assembler if the copy fails
        let volume = self.volume.insert(volume);
        self.timepoint = timepoint;

        let depth = depth as u64;
        let z = (frame_index % depth) as u32;
        ctx.copy_slice(slice, volume, z)?;

        if (frame_index + 1) % depth != 0 {
            return Ok(None);
        }

        Ok(self
            .volume
            .take()
            .map(|volume| CompletedStack { volume, timepoint }))
    }

    pub fn has_volume(&self) -> bool {
        self.volume.is_some()
    }

    /// Releases the in-flight volume, if any.
    pub fn clear<C>(&mut self, ctx: &C)
    where
        C: ComputeContext<Buffer = B>,
    {
        if let Some(volume) = self.volume.take() {
            ctx.release(volume);
        }
    }
}
