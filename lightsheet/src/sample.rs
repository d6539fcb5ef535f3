use std::fmt;

use bytemuck::Pod;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Element type of a frame, slice or volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    U8,
    U16,
    F32,
}

impl SampleType {
    pub fn byte_size(self) -> usize {
        match self {
            SampleType::U8 => 1,
            SampleType::U16 => 2,
            SampleType::F32 => 4,
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleType::U8 => "u8",
            SampleType::U16 => "u16",
            SampleType::F32 => "f32",
        };
        f.write_str(name)
    }
}

/// Scalar sample stored in host buffers.
pub trait Sample: Pod + PartialOrd + ToPrimitive + Send + Sync + 'static {
    const TYPE: SampleType;

    fn as_f64(self) -> f64 {
        ToPrimitive::to_f64(&self).unwrap_or(0.0)
    }

    /// Converts an interpolated value back to this type, rounding and saturating integers.
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_int_sample {
    ($ty:ty, $variant:ident) => {
        impl Sample for $ty {
            const TYPE: SampleType = SampleType::$variant;

            fn from_f64(value: f64) -> Self {
                if value.is_nan() {
                    return 0;
                }
                value
                    .round()
                    .clamp(<$ty>::MIN as f64, <$ty>::MAX as f64) as $ty
            }
        }
    };
}

impl_int_sample!(u8, U8);
impl_int_sample!(u16, U16);

impl Sample for f32 {
    const TYPE: SampleType = SampleType::F32;

    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

/// Borrowed view over row-major samples of one of the supported types.
#[derive(Debug, Clone, Copy)]
pub enum SampleSlice<'a> {
    U8(&'a [u8]),
    U16(&'a [u16]),
    F32(&'a [f32]),
}

impl SampleSlice<'_> {
    pub fn sample_type(&self) -> SampleType {
        match self {
            SampleSlice::U8(_) => SampleType::U8,
            SampleSlice::U16(_) => SampleType::U16,
            SampleSlice::F32(_) => SampleType::F32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SampleSlice::U8(s) => s.len(),
            SampleSlice::U16(s) => s.len(),
            SampleSlice::F32(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_buffer(&self) -> SampleBuffer {
        match self {
            SampleSlice::U8(s) => SampleBuffer::U8(s.to_vec()),
            SampleSlice::U16(s) => SampleBuffer::U16(s.to_vec()),
            SampleSlice::F32(s) => SampleBuffer::F32(s.to_vec()),
        }
    }

    /// Widens every sample to f32. Exact for all u8 and u16 values.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        match self {
            SampleSlice::U8(s) => s.iter().map(|&v| v as f32).collect(),
            SampleSlice::U16(s) => s.iter().map(|&v| v as f32).collect(),
            SampleSlice::F32(s) => s.to_vec(),
        }
    }
}

/// Owned row-major samples of one of the supported types.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleBuffer {
    U8(Vec<u8>),
    U16(Vec<u16>),
    F32(Vec<f32>),
}

impl SampleBuffer {
    /// Creates a zero-filled buffer.
    pub fn zeroed(sample_type: SampleType, len: usize) -> Self {
        match sample_type {
            SampleType::U8 => SampleBuffer::U8(vec![0; len]),
            SampleType::U16 => SampleBuffer::U16(vec![0; len]),
            SampleType::F32 => SampleBuffer::F32(vec![0.0; len]),
        }
    }

    /// Narrows f32 values to `sample_type`, rounding and saturating integers.
    pub fn from_f32(sample_type: SampleType, values: &[f32]) -> Self {
        match sample_type {
            SampleType::U8 => {
                SampleBuffer::U8(values.iter().map(|&v| u8::from_f64(v as f64)).collect())
            }
            SampleType::U16 => {
                SampleBuffer::U16(values.iter().map(|&v| u16::from_f64(v as f64)).collect())
            }
            SampleType::F32 => SampleBuffer::F32(values.to_vec()),
        }
    }

    pub fn sample_type(&self) -> SampleType {
        self.as_slice().sample_type()
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> SampleSlice<'_> {
        match self {
            SampleBuffer::U8(v) => SampleSlice::U8(v),
            SampleBuffer::U16(v) => SampleSlice::U16(v),
            SampleBuffer::F32(v) => SampleSlice::F32(v),
        }
    }

    /// Returns the samples in `range` as a borrowed view.
    pub fn range(&self, range: std::ops::Range<usize>) -> SampleSlice<'_> {
        match self {
            SampleBuffer::U8(v) => SampleSlice::U8(&v[range]),
            SampleBuffer::U16(v) => SampleSlice::U16(&v[range]),
            SampleBuffer::F32(v) => SampleSlice::F32(&v[range]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_from_f64_rounds_and_saturates() {
        assert_eq!(u8::from_f64(12.4), 12);
        assert_eq!(u8::from_f64(12.6), 13);
        assert_eq!(u8::from_f64(-3.0), 0);
        assert_eq!(u8::from_f64(300.0), 255);
        assert_eq!(u16::from_f64(70000.0), u16::MAX);
        assert_eq!(u16::from_f64(f64::NAN), 0);
    }

    #[test]
    fn test_widen_is_exact_for_u16() {
        let samples: Vec<u16> = vec![0, 1, 4095, 65535];
        let widened = SampleSlice::U16(&samples).to_f32_vec();
        let narrowed = SampleBuffer::from_f32(SampleType::U16, &widened);
        assert_eq!(narrowed, SampleBuffer::U16(samples));
    }

    #[test]
    fn test_zeroed_buffer_type_and_len() {
        let buf = SampleBuffer::zeroed(SampleType::F32, 6);
        assert_eq!(buf.sample_type(), SampleType::F32);
        assert_eq!(buf.len(), 6);
        assert_eq!(buf.range(2..4).len(), 2);
    }
}
