use std::borrow::Cow;

use crate::error::{Error, Result};
use crate::sample::{SampleSlice, SampleType};

/// Raw pixel storage as delivered by the acquisition source.
///
/// Each supported variant is either an owned array or a borrowed view over the
/// same row-major layout. Anything else arrives as `Other` and is rejected when
/// the frame is adapted.
#[derive(Debug, Clone)]
pub enum RawPixels<'a> {
    U8(Cow<'a, [u8]>),
    U16(Cow<'a, [u16]>),
    F32(Cow<'a, [f32]>),
    Other {
        encoding: String,
        bytes: Cow<'a, [u8]>,
    },
}

impl RawPixels<'_> {
    /// Resolves the storage into one of the supported sample encodings.
    pub fn samples(&self) -> Result<SampleSlice<'_>> {
        match self {
            RawPixels::U8(s) => Ok(SampleSlice::U8(s)),
            RawPixels::U16(s) => Ok(SampleSlice::U16(s)),
            RawPixels::F32(s) => Ok(SampleSlice::F32(s)),
            RawPixels::Other { encoding, .. } => {
                Err(Error::UnsupportedPixelEncoding(encoding.clone()))
            }
        }
    }

    pub fn sample_type(&self) -> Option<SampleType> {
        self.samples().ok().map(|s| s.sample_type())
    }
}

impl From<Vec<u8>> for RawPixels<'static> {
    fn from(samples: Vec<u8>) -> Self {
        RawPixels::U8(Cow::Owned(samples))
    }
}

impl From<Vec<u16>> for RawPixels<'static> {
    fn from(samples: Vec<u16>) -> Self {
        RawPixels::U16(Cow::Owned(samples))
    }
}

impl From<Vec<f32>> for RawPixels<'static> {
    fn from(samples: Vec<f32>) -> Self {
        RawPixels::F32(Cow::Owned(samples))
    }
}

impl<'a> From<&'a [u8]> for RawPixels<'a> {
    fn from(samples: &'a [u8]) -> Self {
        RawPixels::U8(Cow::Borrowed(samples))
    }
}

impl<'a> From<&'a [u16]> for RawPixels<'a> {
    fn from(samples: &'a [u16]) -> Self {
        RawPixels::U16(Cow::Borrowed(samples))
    }
}

impl<'a> From<&'a [f32]> for RawPixels<'a> {
    fn from(samples: &'a [f32]) -> Self {
        RawPixels::F32(Cow::Borrowed(samples))
    }
}

/// Per-frame metadata. Read for logging, never modified.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameMetadata {
    pub z_position_um: Option<f64>,
    pub elapsed_time_ms: Option<f64>,
}

/// A single camera frame.
#[derive(Debug, Clone)]
pub struct Frame<'a> {
    pub width: u32,
    pub height: u32,
    pub pixels: RawPixels<'a>,
    pub metadata: FrameMetadata,
}

impl<'a> Frame<'a> {
    pub fn new(width: u32, height: u32, pixels: impl Into<RawPixels<'a>>) -> Self {
        Self {
            width,
            height,
            pixels: pixels.into(),
            metadata: FrameMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: FrameMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owned_and_borrowed_resolve_to_same_samples() {
        let data: Vec<u16> = vec![1, 2, 3, 4];
        let owned = Frame::new(2, 2, data.clone());
        let borrowed = Frame::new(2, 2, data.as_slice());

        let a = owned.pixels.samples().unwrap().to_buffer();
        let b = borrowed.pixels.samples().unwrap().to_buffer();
        assert_eq!(a, b);
        assert_eq!(owned.pixels.sample_type(), Some(SampleType::U16));
    }

    #[test]
    fn test_other_encoding_is_rejected() {
        let frame = Frame::new(
            1,
            1,
            RawPixels::Other {
                encoding: "rgb32".to_string(),
                bytes: Cow::Owned(vec![0; 4]),
            },
        );
        let err = frame.pixels.samples().unwrap_err();
        assert!(matches!(err, Error::UnsupportedPixelEncoding(ref e) if e == "rgb32"));
        assert_eq!(frame.pixels.sample_type(), None);
    }
}
