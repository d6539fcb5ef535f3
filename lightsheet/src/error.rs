//! Error types for stack assembly, processing and output.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::compute::VolumeDesc;

/// Errors that can occur while turning a frame stream into saved stacks.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Unsupported pixel encoding: {0}")]
    UnsupportedPixelEncoding(String),

    #[error("Frame has {actual} samples, expected {width}x{height} = {expected}")]
    FrameSizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid stack depth {depth} from z-range top={top_um} bottom={bottom_um} step={step_um}")]
    InvalidStackDepth {
        depth: f64,
        top_um: f64,
        bottom_um: f64,
        step_um: f64,
    },

    #[error("Shape mismatch in {operation}: expected {expected}, got {actual}")]
    PipelineShapeMismatch {
        operation: &'static str,
        expected: VolumeDesc,
        actual: VolumeDesc,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("TIFF error at '{path}': {source}")]
    Tiff {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("No run started, call reset() first")]
    NotStarted,

    #[error("Run aborted after an internal error, call reset() to start a new run")]
    RunAborted,
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn tiff(path: impl Into<PathBuf>, source: tiff::TiffError) -> Self {
        Error::Tiff {
            path: path.into(),
            source,
        }
    }

    /// Returns true for errors that leave the run in an undefined state.
    pub fn aborts_run(&self) -> bool {
        matches!(self, Error::PipelineShapeMismatch { .. } | Error::Gpu(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleType;

    #[test]
    fn test_unsupported_encoding_message() {
        let err = Error::UnsupportedPixelEncoding("rgb32".to_string());
        assert_eq!(err.to_string(), "Unsupported pixel encoding: rgb32");
    }

    #[test]
    fn test_shape_mismatch_message() {
        let err = Error::PipelineShapeMismatch {
            operation: "median",
            expected: VolumeDesc::new(4, 4, 3, SampleType::U16),
            actual: VolumeDesc::new(4, 4, 2, SampleType::U16),
        };
        let msg = err.to_string();
        assert!(msg.contains("median"));
        assert!(msg.contains("4x4x3 u16"));
        assert!(msg.contains("4x4x2 u16"));
        assert!(err.aborts_run());
    }

    #[test]
    fn test_io_error_source_chain() {
        use std::error::Error as StdError;

        let err = Error::io(
            "/data/run/default/000000.tif",
            io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
        );
        assert!(err.to_string().contains("/data/run/default/000000.tif"));
        assert!(err.source().is_some());
        assert!(!err.aborts_run());
    }
}
