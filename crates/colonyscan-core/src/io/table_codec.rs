//! Column-wise measurement-table codec (all little-endian).
//!
//! Layout: row capacity u32, logical row count u32, column count u32, the
//! label index block (u32 * capacity), then per column: name (u16 len +
//! utf8), dtype tag u8, fixed string width u16 (string columns only), a
//! validity byte per reserved row, and a fixed-size data block per reserved
//! row. Fixed-size blocks are what make the logical length independent of
//! the allocated capacity: [`append_rows`] fills reserved rows in place and
//! bumps the length without moving any column.

use std::io::Cursor;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{ColonyError, Result};
use crate::table::{Column, MeasurementTable};

use super::image_codec::{read_string, write_string};

const TAG_FLOAT: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_BOOL: u8 = 2;
const TAG_STR: u8 = 3;

const CAPACITY_OFFSET: usize = 0;
const LEN_OFFSET: usize = 4;
const NCOLS_OFFSET: usize = 8;
const LABELS_OFFSET: usize = 12;

/// Encode a table, reserving `reserve_rows` extra row slots for later
/// in-place appends.
pub fn encode_table(table: &MeasurementTable, reserve_rows: usize) -> Result<Vec<u8>> {
    let len = table.n_rows();
    let capacity = len + reserve_rows;

    let mut buf: Vec<u8> = Vec::new();
    buf.write_u32::<LittleEndian>(capacity as u32)?;
    buf.write_u32::<LittleEndian>(len as u32)?;
    buf.write_u32::<LittleEndian>(table.n_cols() as u32)?;

    for &label in table.labels() {
        buf.write_u32::<LittleEndian>(label)?;
    }
    for _ in len..capacity {
        buf.write_u32::<LittleEndian>(0)?;
    }

    for (name, column) in table.columns() {
        write_string(&mut buf, name)?;
        match column {
            Column::Float(values) => {
                buf.write_u8(TAG_FLOAT)?;
                write_validity(&mut buf, values.iter().map(Option::is_some), capacity)?;
                for v in values {
                    buf.write_f64::<LittleEndian>(v.unwrap_or(0.0))?;
                }
                for _ in len..capacity {
                    buf.write_f64::<LittleEndian>(0.0)?;
                }
            }
            Column::Int(values) => {
                buf.write_u8(TAG_INT)?;
                write_validity(&mut buf, values.iter().map(Option::is_some), capacity)?;
                for v in values {
                    buf.write_i64::<LittleEndian>(v.unwrap_or(0))?;
                }
                for _ in len..capacity {
                    buf.write_i64::<LittleEndian>(0)?;
                }
            }
            Column::Bool(values) => {
                buf.write_u8(TAG_BOOL)?;
                write_validity(&mut buf, values.iter().map(Option::is_some), capacity)?;
                for v in values {
                    buf.write_u8(v.unwrap_or(false) as u8)?;
                }
                for _ in len..capacity {
                    buf.write_u8(0)?;
                }
            }
            Column::Str(values) => {
                buf.write_u8(TAG_STR)?;
                let width = values
                    .iter()
                    .flatten()
                    .map(|s| s.len())
                    .max()
                    .unwrap_or(0)
                    .max(1);
                if width > u16::MAX as usize {
                    return Err(ColonyError::Table(format!(
                        "string column value too long ({width} bytes)"
                    )));
                }
                buf.write_u16::<LittleEndian>(width as u16)?;
                write_validity(&mut buf, values.iter().map(Option::is_some), capacity)?;
                for v in values {
                    write_fixed_string(&mut buf, v.as_deref().unwrap_or(""), width)?;
                }
                for _ in len..capacity {
                    write_fixed_string(&mut buf, "", width)?;
                }
            }
        }
    }

    Ok(buf)
}

/// Decode the logical rows of an encoded table.
pub fn decode_table(bytes: &[u8]) -> Result<MeasurementTable> {
    let layout = parse_layout(bytes)?;
    let len = layout.len;

    let mut labels = Vec::with_capacity(len);
    for row in 0..len {
        labels.push(LittleEndian::read_u32(
            slice(bytes, LABELS_OFFSET + 4 * row, 4)?,
        ));
    }

    let mut columns = Vec::with_capacity(layout.columns.len());
    for col in &layout.columns {
        let valid =
            |row: usize| -> Result<bool> { Ok(slice(bytes, col.validity_offset + row, 1)?[0] != 0) };
        let column = match col.tag {
            TAG_FLOAT => {
                let mut values = Vec::with_capacity(len);
                for row in 0..len {
                    let v = LittleEndian::read_f64(slice(bytes, col.data_offset + 8 * row, 8)?);
                    values.push(valid(row)?.then_some(v));
                }
                Column::Float(values)
            }
            TAG_INT => {
                let mut values = Vec::with_capacity(len);
                for row in 0..len {
                    let v = LittleEndian::read_i64(slice(bytes, col.data_offset + 8 * row, 8)?);
                    values.push(valid(row)?.then_some(v));
                }
                Column::Int(values)
            }
            TAG_BOOL => {
                let mut values = Vec::with_capacity(len);
                for row in 0..len {
                    let v = slice(bytes, col.data_offset + row, 1)?[0] != 0;
                    values.push(valid(row)?.then_some(v));
                }
                Column::Bool(values)
            }
            TAG_STR => {
                let mut values = Vec::with_capacity(len);
                for row in 0..len {
                    let raw = slice(bytes, col.data_offset + col.width * row, col.width)?;
                    let trimmed: &[u8] = match raw.iter().position(|&b| b == 0) {
                        Some(end) => &raw[..end],
                        None => raw,
                    };
                    let s = String::from_utf8(trimmed.to_vec()).map_err(|_| {
                        ColonyError::InvalidArchive("invalid utf-8 in string column".to_string())
                    })?;
                    values.push(valid(row)?.then_some(s));
                }
                Column::Str(values)
            }
            tag => {
                return Err(ColonyError::InvalidArchive(format!(
                    "unknown column dtype tag {tag}"
                )))
            }
        };
        columns.push((col.name.clone(), column));
    }

    MeasurementTable::from_raw_parts(labels, columns)
}

/// Append rows into a previously encoded buffer, in place, within the
/// reserved capacity. The appended table must match the stored schema, and
/// string values must fit the stored fixed width.
pub fn append_rows(bytes: &mut [u8], rows: &MeasurementTable) -> Result<()> {
    let layout = parse_layout(bytes)?;
    let new_rows = rows.n_rows();
    if layout.len + new_rows > layout.capacity {
        return Err(ColonyError::Table(format!(
            "table capacity exhausted ({} reserved rows)",
            layout.capacity
        )));
    }
    if rows.column_names() != layout.columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>() {
        return Err(ColonyError::Table(
            "appended rows do not match the stored column set".to_string(),
        ));
    }

    for (row_idx, &label) in rows.labels().iter().enumerate() {
        let at = LABELS_OFFSET + 4 * (layout.len + row_idx);
        LittleEndian::write_u32(&mut bytes[at..at + 4], label);
    }

    for (col_layout, (_, column)) in layout.columns.iter().zip(rows.columns()) {
        for row_idx in 0..new_rows {
            let target = layout.len + row_idx;
            let validity_at = col_layout.validity_offset + target;
            match (col_layout.tag, column) {
                (TAG_FLOAT, Column::Float(values)) => {
                    bytes[validity_at] = values[row_idx].is_some() as u8;
                    let at = col_layout.data_offset + 8 * target;
                    LittleEndian::write_f64(&mut bytes[at..at + 8], values[row_idx].unwrap_or(0.0));
                }
                (TAG_INT, Column::Int(values)) => {
                    bytes[validity_at] = values[row_idx].is_some() as u8;
                    let at = col_layout.data_offset + 8 * target;
                    LittleEndian::write_i64(&mut bytes[at..at + 8], values[row_idx].unwrap_or(0));
                }
                (TAG_BOOL, Column::Bool(values)) => {
                    bytes[validity_at] = values[row_idx].is_some() as u8;
                    bytes[col_layout.data_offset + target] =
                        values[row_idx].unwrap_or(false) as u8;
                }
                (TAG_STR, Column::Str(values)) => {
                    let s = values[row_idx].as_deref().unwrap_or("");
                    if s.len() > col_layout.width {
                        return Err(ColonyError::Table(format!(
                            "string '{s}' exceeds the stored fixed width {}",
                            col_layout.width
                        )));
                    }
                    bytes[validity_at] = values[row_idx].is_some() as u8;
                    let at = col_layout.data_offset + col_layout.width * target;
                    bytes[at..at + col_layout.width].fill(0);
                    bytes[at..at + s.len()].copy_from_slice(s.as_bytes());
                }
                _ => {
                    return Err(ColonyError::Table(format!(
                        "appended column '{}' has a different dtype than stored",
                        col_layout.name
                    )))
                }
            }
        }
    }

    LittleEndian::write_u32(
        &mut bytes[LEN_OFFSET..LEN_OFFSET + 4],
        (layout.len + new_rows) as u32,
    );
    Ok(())
}

struct TableLayout {
    capacity: usize,
    len: usize,
    columns: Vec<ColumnLayout>,
}

struct ColumnLayout {
    name: String,
    tag: u8,
    /// Fixed byte width; only meaningful for string columns.
    width: usize,
    validity_offset: usize,
    data_offset: usize,
}

fn parse_layout(bytes: &[u8]) -> Result<TableLayout> {
    let capacity = LittleEndian::read_u32(slice(bytes, CAPACITY_OFFSET, 4)?) as usize;
    let len = LittleEndian::read_u32(slice(bytes, LEN_OFFSET, 4)?) as usize;
    let ncols = LittleEndian::read_u32(slice(bytes, NCOLS_OFFSET, 4)?) as usize;
    if len > capacity {
        return Err(ColonyError::InvalidArchive(format!(
            "table length {len} exceeds capacity {capacity}"
        )));
    }

    let mut cursor = Cursor::new(bytes);
    cursor.set_position((LABELS_OFFSET + 4 * capacity) as u64);

    let mut columns = Vec::with_capacity(ncols);
    for _ in 0..ncols {
        let name = read_string(&mut cursor)?;
        let tag = cursor.read_u8()?;
        let width = match tag {
            TAG_STR => cursor.read_u16::<LittleEndian>()? as usize,
            _ => 0,
        };
        let validity_offset = cursor.position() as usize;
        let data_offset = validity_offset + capacity;
        let data_size = match tag {
            TAG_FLOAT | TAG_INT => 8 * capacity,
            TAG_BOOL => capacity,
            TAG_STR => width * capacity,
            t => {
                return Err(ColonyError::InvalidArchive(format!(
                    "unknown column dtype tag {t}"
                )))
            }
        };
        let end = data_offset + data_size;
        if end > bytes.len() {
            return Err(ColonyError::InvalidArchive(
                "truncated table payload".to_string(),
            ));
        }
        cursor.set_position(end as u64);
        columns.push(ColumnLayout {
            name,
            tag,
            width,
            validity_offset,
            data_offset,
        });
    }

    Ok(TableLayout {
        capacity,
        len,
        columns,
    })
}

fn write_validity(
    buf: &mut Vec<u8>,
    valid: impl Iterator<Item = bool>,
    capacity: usize,
) -> Result<()> {
    let mut written = 0;
    for v in valid {
        buf.write_u8(v as u8)?;
        written += 1;
    }
    for _ in written..capacity {
        buf.write_u8(0)?;
    }
    Ok(())
}

fn write_fixed_string(buf: &mut Vec<u8>, s: &str, width: usize) -> Result<()> {
    let bytes = s.as_bytes();
    if bytes.len() > width {
        return Err(ColonyError::Table(format!(
            "string '{s}' exceeds the fixed width {width}"
        )));
    }
    buf.extend_from_slice(bytes);
    for _ in bytes.len()..width {
        buf.push(0);
    }
    Ok(())
}

fn slice(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    bytes
        .get(offset..offset + len)
        .ok_or_else(|| ColonyError::InvalidArchive("truncated table payload".to_string()))
}
