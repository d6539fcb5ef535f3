//! TIFF encoding of host volumes and decoding of single frames.

use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, Write};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, TiffEncoder, TiffValue};
use tiff::tags::Tag;

use crate::compute::HostVolume;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::sample::{SampleBuffer, SampleSlice};

/// ImageJ hyperstack description, so multi-page files open as a Z-stack.
pub fn imagej_description(depth: u32) -> String {
    format!("ImageJ=1.53t\nimages={depth}\nslices={depth}\n")
}

/// Writes every Z-plane of `volume` as one page of a TIFF file at `path`.
pub fn write_volume_tiff(path: &Path, volume: &HostVolume) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut writer = BufWriter::new(file);

    encode_volume(&mut writer, volume).map_err(|e| Error::tiff(path, e))?;
    writer.flush().map_err(|e| Error::io(path, e))?;

    Ok(())
}

fn encode_volume<W: Write + Seek>(writer: &mut W, volume: &HostVolume) -> tiff::TiffResult<()> {
    let mut encoder = TiffEncoder::new(writer)?;
    let desc = volume.desc;
    let description = (desc.depth > 1).then(|| imagej_description(desc.depth));

    for (z, plane) in volume.planes().enumerate() {
        let description = if z == 0 { description.as_deref() } else { None };
        match plane {
            SampleSlice::U8(data) => write_page::<colortype::Gray8, _>(
                &mut encoder,
                desc.width,
                desc.height,
                data,
                description,
            )?,
            SampleSlice::U16(data) => write_page::<colortype::Gray16, _>(
                &mut encoder,
                desc.width,
                desc.height,
                data,
                description,
            )?,
            SampleSlice::F32(data) => write_page::<colortype::Gray32Float, _>(
                &mut encoder,
                desc.width,
                desc.height,
                data,
                description,
            )?,
        }
    }

    Ok(())
}

fn write_page<CT, W>(
    encoder: &mut TiffEncoder<W>,
    width: u32,
    height: u32,
    data: &[CT::Inner],
    description: Option<&str>,
) -> tiff::TiffResult<()>
where
    CT: colortype::ColorType,
    [CT::Inner]: TiffValue,
    W: Write + Seek,
{
    let mut image = encoder.new_image::<CT>(width, height)?;
    if let Some(description) = description {
        image
            .encoder()
            .write_tag(Tag::ImageDescription, description)?;
    }
    image.write_data(data)
}

/// Decodes every page of a grayscale TIFF.
pub fn read_tiff_pages(path: &Path) -> Result<Vec<(u32, u32, SampleBuffer)>> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut decoder = Decoder::new(BufReader::new(file))
        .map_err(|e| Error::tiff(path, e))?
        .with_limits(Limits::unlimited());

    let mut pages = Vec::new();
    loop {
        let (width, height) = decoder.dimensions().map_err(|e| Error::tiff(path, e))?;
        let samples = match decoder.read_image().map_err(|e| Error::tiff(path, e))? {
            DecodingResult::U8(data) => SampleBuffer::U8(data),
            DecodingResult::U16(data) => SampleBuffer::U16(data),
            DecodingResult::F32(data) => SampleBuffer::F32(data),
            other => {
                return Err(Error::UnsupportedPixelEncoding(format!(
                    "{} ({})",
                    decoding_name(&other),
                    path.display()
                )))
            }
        };

        if samples.len() != width as usize * height as usize {
            return Err(Error::UnsupportedPixelEncoding(format!(
                "multi-channel image ({})",
                path.display()
            )));
        }
        pages.push((width, height, samples));

        if !decoder.more_images() {
            break;
        }
        decoder.next_image().map_err(|e| Error::tiff(path, e))?;
    }

    Ok(pages)
}

fn decoding_name(result: &DecodingResult) -> &'static str {
    match result {
        DecodingResult::U8(_) => "u8",
        DecodingResult::U16(_) => "u16",
        DecodingResult::U32(_) => "u32",
        DecodingResult::U64(_) => "u64",
        DecodingResult::I8(_) => "i8",
        DecodingResult::I16(_) => "i16",
        DecodingResult::I32(_) => "i32",
        DecodingResult::I64(_) => "i64",
        DecodingResult::F32(_) => "f32",
        DecodingResult::F64(_) => "f64",
        _ => "unknown",
    }
}

/// Reads the first page of a grayscale TIFF as an owned frame.
pub fn read_frame_tiff(path: &Path) -> Result<Frame<'static>> {
    let (width, height, samples) = read_tiff_pages(path)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::UnsupportedPixelEncoding(format!("empty TIFF ({})", path.display())))?;

    Ok(match samples {
        SampleBuffer::U8(data) => Frame::new(width, height, data),
        SampleBuffer::U16(data) => Frame::new(width, height, data),
        SampleBuffer::F32(data) => Frame::new(width, height, data),
    })
}

/// Returns the ImageDescription tag of the first page, if present.
pub fn read_description(path: &Path) -> Result<Option<String>> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut decoder = Decoder::new(BufReader::new(file)).map_err(|e| Error::tiff(path, e))?;
    decoder
        .find_tag(Tag::ImageDescription)
        .map_err(|e| Error::tiff(path, e))?
        .map(|value| value.into_string())
        .transpose()
        .map_err(|e| Error::tiff(path, e))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::compute::VolumeDesc;
    use crate::sample::SampleType;

    #[test]
    fn test_volume_roundtrip_keeps_planes_and_type() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stack.tif");

        let desc = VolumeDesc::new(3, 2, 4, SampleType::U16);
        let samples: Vec<u16> = (0..24).map(|v| v * 1000).collect();
        let volume = HostVolume::new(desc, SampleBuffer::U16(samples.clone())).unwrap();

        write_volume_tiff(&path, &volume).unwrap();

        let pages = read_tiff_pages(&path).unwrap();
        assert_eq!(pages.len(), 4);
        for (z, (width, height, page)) in pages.iter().enumerate() {
            assert_eq!((*width, *height), (3, 2));
            assert_eq!(page, &SampleBuffer::U16(samples[z * 6..(z + 1) * 6].to_vec()));
        }

        assert_eq!(
            read_description(&path).unwrap().as_deref(),
            Some("ImageJ=1.53t\nimages=4\nslices=4\n")
        );
    }

    #[test]
    fn test_single_plane_has_no_description() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("proj.tif");

        let desc = VolumeDesc::plane(2, 2, SampleType::F32);
        let volume =
            HostVolume::new(desc, SampleBuffer::F32(vec![0.5, -1.0, 2.0, 1e6])).unwrap();
        write_volume_tiff(&path, &volume).unwrap();

        let pages = read_tiff_pages(&path).unwrap();
        assert_eq!(pages, vec![(2, 2, SampleBuffer::F32(vec![0.5, -1.0, 2.0, 1e6]))]);
        assert_eq!(read_description(&path).unwrap(), None);
    }

    #[test]
    fn test_read_frame_tiff() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frame.tif");

        let desc = VolumeDesc::plane(4, 1, SampleType::U8);
        let volume = HostVolume::new(desc, SampleBuffer::U8(vec![1, 2, 3, 4])).unwrap();
        write_volume_tiff(&path, &volume).unwrap();

        let frame = read_frame_tiff(&path).unwrap();
        assert_eq!((frame.width, frame.height), (4, 1));
        assert_eq!(frame.pixels.samples().unwrap().to_buffer(), SampleBuffer::U8(vec![1, 2, 3, 4]));
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("000000.tif");

        let desc = VolumeDesc::plane(1, 1, SampleType::U8);
        let volume = HostVolume::new(desc, SampleBuffer::U8(vec![0])).unwrap();
        let err = write_volume_tiff(&path, &volume).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
