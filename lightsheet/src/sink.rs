use std::path::{Path, PathBuf};

use crate::compute::{ComputeContext, DeviceBuffer};
use crate::error::{Error, Result};
use crate::tiff_io::write_volume_tiff;

pub const STACK_DIR: &str = "default";
pub const PROJECTION_DIR: &str = "max_proj";

/// File name for a timepoint: at least six zero-padded digits, wider past 999999.
pub fn timepoint_filename(timepoint: u64) -> String {
    format!("{:06}.tif", timepoint)
}

/// Writes processed stacks and their projections under one dataset directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSink {
    dataset_dir: PathBuf,
}

impl OutputSink {
    pub fn new(dataset_dir: impl Into<PathBuf>) -> Self {
        Self {
            dataset_dir: dataset_dir.into(),
        }
    }

    pub fn dataset_dir(&self) -> &Path {
        &self.dataset_dir
    }

    pub fn stack_dir(&self) -> PathBuf {
        self.dataset_dir.join(STACK_DIR)
    }

    pub fn projection_dir(&self) -> PathBuf {
        self.dataset_dir.join(PROJECTION_DIR)
    }

    pub fn stack_path(&self, timepoint: u64) -> PathBuf {
        self.stack_dir().join(timepoint_filename(timepoint))
    }

    pub fn projection_path(&self, timepoint: u64) -> PathBuf {
        self.projection_dir().join(timepoint_filename(timepoint))
    }

    /// Downloads `volume` and writes it as a multi-page TIFF.
    pub fn save<C: ComputeContext>(
        &self,
        ctx: &C,
        volume: &C::Buffer,
        timepoint: u64,
    ) -> Result<PathBuf> {
        let path = self.stack_path(timepoint);
        write_buffer(ctx, volume, &path)?;
        tracing::debug!(timepoint, path = %path.display(), "stack saved");
        Ok(path)
    }

    /// Computes the maximum projection of `volume` over Z and writes it.
    pub fn save_projection<C: ComputeContext>(
        &self,
        ctx: &C,
        volume: &C::Buffer,
        timepoint: u64,
    ) -> Result<PathBuf> {
        let mut projection = ctx.create_buffer(volume.desc().plane_desc())?;
        let result = ctx
            .max_z_projection(volume, &mut projection)
            .and_then(|()| {
                let path = self.projection_path(timepoint);
                write_buffer(ctx, &projection, &path).map(|()| path)
            });
        ctx.release(projection);

        let path = result?;
        tracing::debug!(timepoint, path = %path.display(), "projection saved");
        Ok(path)
    }
}

fn write_buffer<C: ComputeContext>(ctx: &C, buffer: &C::Buffer, path: &Path) -> Result<()> {
    let host = ctx.download(buffer)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    write_volume_tiff(path, &host)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::compute::{CpuContext, VolumeDesc};
    use crate::sample::{SampleBuffer, SampleSlice, SampleType};
    use crate::tiff_io::read_tiff_pages;

    #[test]
    fn test_timepoint_filename() {
        assert_eq!(timepoint_filename(0), "000000.tif");
        assert_eq!(timepoint_filename(7), "000007.tif");
        assert_eq!(timepoint_filename(999_999), "999999.tif");
        assert_eq!(timepoint_filename(1_000_000), "1000000.tif");
    }

    #[test]
    fn test_save_writes_stack_and_projection() {
        let dir = TempDir::new().unwrap();
        let sink = OutputSink::new(dir.path().join("dataset"));
        let ctx = CpuContext::new();

        let desc = VolumeDesc::new(2, 1, 3, SampleType::U8);
        let mut volume = ctx.create_buffer(desc).unwrap();
        ctx.upload(SampleSlice::U8(&[1, 6, 4, 2, 3, 5]), &mut volume)
            .unwrap();

        let stack = sink.save(&ctx, &volume, 12).unwrap();
        let projection = sink.save_projection(&ctx, &volume, 12).unwrap();

        assert_eq!(stack, dir.path().join("dataset/default/000012.tif"));
        assert_eq!(projection, dir.path().join("dataset/max_proj/000012.tif"));
        assert_eq!(read_tiff_pages(&stack).unwrap().len(), 3);
        assert_eq!(
            read_tiff_pages(&projection).unwrap(),
            vec![(2, 1, SampleBuffer::U8(vec![4, 6]))]
        );
    }

    #[test]
    fn test_directory_creation_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let sink = OutputSink::new(dir.path());
        let ctx = CpuContext::new();
        let volume = ctx
            .create_buffer(VolumeDesc::plane(1, 1, SampleType::U16))
            .unwrap();

        sink.save(&ctx, &volume, 0).unwrap();
        sink.save(&ctx, &volume, 1).unwrap();
        assert!(sink.stack_path(0).exists());
        assert!(sink.stack_path(1).exists());
        assert!(!sink.projection_dir().exists());
    }

    #[test]
    fn test_save_reports_io_failure() {
        let dir = TempDir::new().unwrap();
        // A file where the dataset directory should be
        let blocker = dir.path().join("dataset");
        std::fs::write(&blocker, b"").unwrap();

        let sink = OutputSink::new(&blocker);
        let ctx = CpuContext::new();
        let volume = ctx
            .create_buffer(VolumeDesc::plane(1, 1, SampleType::U8))
            .unwrap();

        let err = sink.save(&ctx, &volume, 0).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
