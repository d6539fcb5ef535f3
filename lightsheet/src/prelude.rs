// Error handling
pub use crate::error::{Error, Result};

// Frames and samples
pub use crate::frame::{Frame, FrameMetadata, RawPixels};
pub use crate::sample::{Sample, SampleBuffer, SampleSlice, SampleType};

// Configuration
pub use crate::config::{ProcessingConfig, SessionConfig, ZRange};

// Compute backends
pub use crate::compute::{
    ComputeContext, CpuBuffer, CpuContext, DeviceBuffer, FilterMode, HostVolume, VolumeDesc,
};
#[cfg(feature = "wgpu")]
pub use crate::compute::{Gpu, GpuVolume, WgpuContext};

// Assembly and processing
pub use crate::adapter::FrameAdapter;
pub use crate::assembler::{CompletedStack, StackAssembler};
pub use crate::pipeline::{
    cot_degrees, deskew_transform, shear_factor, sin_cos_degrees, PingPong, ProcessingPipeline,
    Stage,
};

// Output
pub use crate::sink::{timepoint_filename, OutputSink, PROJECTION_DIR, STACK_DIR};
pub use crate::tiff_io::{
    imagej_description, read_description, read_frame_tiff, read_tiff_pages, write_volume_tiff,
};

// Session
pub use crate::session::{FrameOutcome, RunSession, StackReport, DATASET_TIMESTAMP_FORMAT};
