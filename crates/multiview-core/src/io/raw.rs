use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
use memmap2::Mmap;
use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::error::{FusionError, Result};
use crate::view::ImageSource;

/// Sample type of a raw volume file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelType {
    U8,
    #[default]
    U16,
    F32,
}

impl PixelType {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::F32 => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    #[default]
    Little,
    Big,
}

/// Layout of a headerless volume: x fastest, then y, then z.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawLayout {
    pub dims: [usize; 3],
    pub pixel_type: PixelType,
    pub endian: Endian,
    /// Bytes to skip before the first sample.
    pub offset: usize,
}

impl RawLayout {
    pub fn new(dims: [usize; 3], pixel_type: PixelType, endian: Endian) -> Self {
        Self {
            dims,
            pixel_type,
            endian,
            offset: 0,
        }
    }

    pub fn data_size(&self) -> Option<usize> {
        self.dims
            .iter()
            .try_fold(self.pixel_type.bytes_per_sample(), |acc, &d| acc.checked_mul(d))
    }
}

/// Memory-mapped raw volume. Samples are decoded on access.
pub struct RawVolume {
    mmap: Mmap,
    layout: RawLayout,
}

impl RawVolume {
    /// Map `path` and check it is large enough for `layout`.
    pub fn open(path: &Path, layout: RawLayout) -> Result<Self> {
        if layout.dims.iter().any(|&d| d == 0) {
            return Err(FusionError::InvalidVolume(format!(
                "{}: dimensions must be positive, got {:?}",
                path.display(),
                layout.dims
            )));
        }
        let data_size = layout.data_size().ok_or_else(|| {
            FusionError::InvalidVolume(format!("{}: volume size overflows", path.display()))
        })?;

        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        let expected = layout.offset + data_size;
        if mmap.len() < expected {
            return Err(FusionError::InvalidVolume(format!(
                "{}: file truncated, expected at least {} bytes, got {}",
                path.display(),
                expected,
                mmap.len()
            )));
        }

        Ok(Self { mmap, layout })
    }

    pub fn layout(&self) -> &RawLayout {
        &self.layout
    }

    /// Decode the whole volume, shape (z, y, x).
    pub fn to_array(&self) -> Array3<f32> {
        let [w, h, d] = self.layout.dims;
        Array3::from_shape_fn((d, h, w), |(z, y, x)| self.get([x, y, z]))
    }

    fn decode(&self, index: usize) -> f32 {
        let bps = self.layout.pixel_type.bytes_per_sample();
        let start = self.layout.offset + index * bps;
        let bytes = &self.mmap[start..start + bps];
        match (self.layout.pixel_type, self.layout.endian) {
            (PixelType::U8, _) => bytes[0] as f32,
            (PixelType::U16, Endian::Little) => LittleEndian::read_u16(bytes) as f32,
            (PixelType::U16, Endian::Big) => BigEndian::read_u16(bytes) as f32,
            (PixelType::F32, Endian::Little) => LittleEndian::read_f32(bytes),
            (PixelType::F32, Endian::Big) => BigEndian::read_f32(bytes),
        }
    }
}

impl ImageSource for RawVolume {
    fn dims(&self) -> [usize; 3] {
        self.layout.dims
    }

    fn get(&self, pos: [usize; 3]) -> f32 {
        let [w, h, _] = self.layout.dims;
        self.decode((pos[2] * h + pos[1]) * w + pos[0])
    }
}

/// Write a (z, y, x) volume as headerless raw samples. Values are rounded
/// and clamped for integer pixel types.
pub fn write_raw_volume(
    data: &Array3<f32>,
    path: &Path,
    pixel_type: PixelType,
    endian: Endian,
) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    for &v in data.iter() {
        match endian {
            Endian::Little => write_sample::<LittleEndian>(&mut writer, v, pixel_type)?,
            Endian::Big => write_sample::<BigEndian>(&mut writer, v, pixel_type)?,
        }
    }
    writer.flush()?;
    Ok(())
}

fn write_sample<B: ByteOrder>(w: &mut impl Write, v: f32, pixel_type: PixelType) -> Result<()> {
    match pixel_type {
        PixelType::U8 => w.write_u8(v.round().clamp(0.0, u8::MAX as f32) as u8)?,
        PixelType::U16 => w.write_u16::<B>(v.round().clamp(0.0, u16::MAX as f32) as u16)?,
        PixelType::F32 => w.write_f32::<B>(v)?,
    }
    Ok(())
}
