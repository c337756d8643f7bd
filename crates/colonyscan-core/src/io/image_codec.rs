//! Raw-byte payload codec for one image (all little-endian).
//!
//! Layout: height u32, width u32, bit depth u8 (0 = unset), color flag u8,
//! optional color plane (u16 * h*w*3), gray plane (f32 * h*w), enhanced
//! plane (f32 * h*w), object-map entry count u32 + (row u32, col u32,
//! label u32) triplets, then the three metadata tiers as counted
//! length-prefixed typed entries.

use std::collections::BTreeMap;
use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::{Array2, Array3};

use crate::error::{ColonyError, Result};
use crate::image::metadata::{MetadataStore, MetaValue};
use crate::image::rasters::RasterStore;
use crate::image::sparse::{MapEntry, SparseMap};
use crate::image::Image;

const TAG_STR: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_FLOAT: u8 = 2;
const TAG_BOOL: u8 = 3;

pub fn encode_image(image: &Image) -> Result<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::new();
    let (h, w) = image.shape();

    buf.write_u32::<LittleEndian>(h as u32)?;
    buf.write_u32::<LittleEndian>(w as u32)?;
    buf.write_u8(image.bit_depth().unwrap_or(0))?;

    match image.color().get() {
        Ok(color) => {
            buf.write_u8(1)?;
            for &v in color.iter() {
                buf.write_u16::<LittleEndian>(v)?;
            }
        }
        Err(_) => buf.write_u8(0)?,
    }

    if !image.is_empty() {
        for &v in image.gray().get()?.iter() {
            buf.write_f32::<LittleEndian>(v)?;
        }
        for &v in image.enh_gray().get()?.iter() {
            buf.write_f32::<LittleEndian>(v)?;
        }
    }

    let entries = image.rasters.objmap().entries();
    buf.write_u32::<LittleEndian>(entries.len() as u32)?;
    for e in entries {
        buf.write_u32::<LittleEndian>(e.row)?;
        buf.write_u32::<LittleEndian>(e.col)?;
        buf.write_u32::<LittleEndian>(e.label)?;
    }

    let (private, protected, public) = image.metadata().tier_entries();
    write_tier(&mut buf, private)?;
    write_tier(&mut buf, protected)?;
    write_tier(&mut buf, public)?;

    Ok(buf)
}

pub fn decode_image(bytes: &[u8]) -> Result<Image> {
    let mut cursor = Cursor::new(bytes);

    let h = cursor.read_u32::<LittleEndian>()? as usize;
    let w = cursor.read_u32::<LittleEndian>()? as usize;
    let bit_depth = match cursor.read_u8()? {
        0 => None,
        d => Some(d),
    };
    let has_color = cursor.read_u8()? != 0;

    let color = if has_color {
        let mut values = Vec::with_capacity(h * w * 3);
        for _ in 0..h * w * 3 {
            values.push(cursor.read_u16::<LittleEndian>()?);
        }
        Some(
            Array3::from_shape_vec((h, w, 3), values)
                .map_err(|e| ColonyError::InvalidArchive(e.to_string()))?,
        )
    } else {
        None
    };

    let gray = read_f32_matrix(&mut cursor, h, w)?;
    let enh_gray = read_f32_matrix(&mut cursor, h, w)?;

    let nnz = cursor.read_u32::<LittleEndian>()? as usize;
    let mut entries = Vec::with_capacity(nnz);
    for _ in 0..nnz {
        let row = cursor.read_u32::<LittleEndian>()?;
        let col = cursor.read_u32::<LittleEndian>()?;
        let label = cursor.read_u32::<LittleEndian>()?;
        entries.push(MapEntry { row, col, label });
    }
    let objmap = SparseMap::from_entries((h, w), entries);

    let private = read_tier(&mut cursor)?;
    let protected = read_tier(&mut cursor)?;
    let public = read_tier(&mut cursor)?;

    let rasters = RasterStore::from_parts(color, gray, enh_gray, objmap, bit_depth);
    let metadata = MetadataStore::from_tiers(private, protected, public);
    Ok(Image::from_parts(rasters, metadata))
}

fn read_f32_matrix(cursor: &mut Cursor<&[u8]>, h: usize, w: usize) -> Result<Array2<f32>> {
    let mut values = Vec::with_capacity(h * w);
    for _ in 0..h * w {
        values.push(cursor.read_f32::<LittleEndian>()?);
    }
    Array2::from_shape_vec((h, w), values).map_err(|e| ColonyError::InvalidArchive(e.to_string()))
}

fn write_tier(buf: &mut Vec<u8>, tier: &BTreeMap<String, MetaValue>) -> Result<()> {
    buf.write_u32::<LittleEndian>(tier.len() as u32)?;
    for (key, value) in tier {
        write_string(buf, key)?;
        match value {
            MetaValue::Str(s) => {
                buf.write_u8(TAG_STR)?;
                write_string(buf, s)?;
            }
            MetaValue::Int(v) => {
                buf.write_u8(TAG_INT)?;
                buf.write_i64::<LittleEndian>(*v)?;
            }
            MetaValue::Float(v) => {
                buf.write_u8(TAG_FLOAT)?;
                buf.write_f64::<LittleEndian>(*v)?;
            }
            MetaValue::Bool(v) => {
                buf.write_u8(TAG_BOOL)?;
                buf.write_u8(*v as u8)?;
            }
        }
    }
    Ok(())
}

fn read_tier(cursor: &mut Cursor<&[u8]>) -> Result<BTreeMap<String, MetaValue>> {
    let count = cursor.read_u32::<LittleEndian>()? as usize;
    let mut tier = BTreeMap::new();
    for _ in 0..count {
        let key = read_string(cursor)?;
        let value = match cursor.read_u8()? {
            TAG_STR => MetaValue::Str(read_string(cursor)?),
            TAG_INT => MetaValue::Int(cursor.read_i64::<LittleEndian>()?),
            TAG_FLOAT => MetaValue::Float(cursor.read_f64::<LittleEndian>()?),
            TAG_BOOL => MetaValue::Bool(cursor.read_u8()? != 0),
            tag => {
                return Err(ColonyError::InvalidArchive(format!(
                    "unknown metadata value tag {tag}"
                )))
            }
        };
        tier.insert(key, value);
    }
    Ok(tier)
}

pub(crate) fn write_string(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    let bytes = s.as_bytes();
    if bytes.len() > u16::MAX as usize {
        return Err(ColonyError::InvalidArchive(format!(
            "string too long to encode ({} bytes)",
            bytes.len()
        )));
    }
    buf.write_u16::<LittleEndian>(bytes.len() as u16)?;
    buf.extend_from_slice(bytes);
    Ok(())
}

pub(crate) fn read_string(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let len = cursor.read_u16::<LittleEndian>()? as usize;
    let pos = cursor.position() as usize;
    let bytes = cursor
        .get_ref()
        .get(pos..pos + len)
        .ok_or_else(|| ColonyError::InvalidArchive("truncated string".to_string()))?;
    let s = String::from_utf8(bytes.to_vec())
        .map_err(|_| ColonyError::InvalidArchive("invalid utf-8 string".to_string()))?;
    cursor.set_position((pos + len) as u64);
    Ok(s)
}
