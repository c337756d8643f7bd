//! Single-file plate-set archive.
//!
//! One file holds every image of a named set plus its measurement tables.
//! The header records the slot capacity and the logical image count
//! separately, so the index can be preallocated and filled by appending
//! within the reserved capacity. Payloads are append-only: overwriting an
//! image appends a fresh payload and repoints the slot, then updates the
//! header, then flushes — one image committed per flush.
//!
//! Access discipline is single-writer / multi-reader by construction: only
//! [`ArchiveWriter`] ever opens the file writable, and any number of
//! memory-mapped [`ArchiveReader`]s may coexist with it. A reader sees the
//! file as of its open; reopen to observe later commits.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use memmap2::Mmap;
use tracing::debug;

use crate::error::{ColonyError, Result};
use crate::image::Image;
use crate::table::MeasurementTable;

use super::image_codec::{decode_image, encode_image};
use super::table_codec::{decode_table, encode_table};

pub const ARCHIVE_MAGIC: &[u8; 9] = b"COLONYSET";
pub const ARCHIVE_VERSION: u16 = 1;
pub const HEADER_SIZE: usize = 9 + 2 + 4 + 4 + 8;
pub const NAME_SLOT_LEN: usize = 64;
pub const SLOT_SIZE: usize = NAME_SLOT_LEN + 4 * 8;

#[derive(Clone, Debug, Default)]
struct SlotEntry {
    name: String,
    image_offset: u64,
    image_len: u64,
    meas_offset: u64,
    meas_len: u64,
}

impl SlotEntry {
    fn is_used(&self) -> bool {
        !self.name.is_empty()
    }
}

struct Header {
    capacity: u32,
    len: u32,
    index_offset: u64,
}

fn parse_header(buf: &[u8]) -> Result<Header> {
    if buf.len() < HEADER_SIZE {
        return Err(ColonyError::InvalidArchive(
            "file too small for archive header".to_string(),
        ));
    }
    if &buf[0..9] != ARCHIVE_MAGIC {
        return Err(ColonyError::InvalidArchive(
            "missing COLONYSET magic".to_string(),
        ));
    }
    let version = LittleEndian::read_u16(&buf[9..11]);
    if version != ARCHIVE_VERSION {
        return Err(ColonyError::InvalidArchive(format!(
            "unsupported archive version {version}"
        )));
    }
    let capacity = LittleEndian::read_u32(&buf[11..15]);
    let len = LittleEndian::read_u32(&buf[15..19]);
    let index_offset = LittleEndian::read_u64(&buf[19..27]);
    if len > capacity {
        return Err(ColonyError::InvalidArchive(format!(
            "length {len} exceeds capacity {capacity}"
        )));
    }
    Ok(Header {
        capacity,
        len,
        index_offset,
    })
}

fn parse_slot(buf: &[u8]) -> Result<SlotEntry> {
    let name_bytes = &buf[..NAME_SLOT_LEN];
    let end = name_bytes
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(NAME_SLOT_LEN);
    let name = String::from_utf8(name_bytes[..end].to_vec())
        .map_err(|_| ColonyError::InvalidArchive("invalid utf-8 slot name".to_string()))?;
    Ok(SlotEntry {
        name,
        image_offset: LittleEndian::read_u64(&buf[NAME_SLOT_LEN..NAME_SLOT_LEN + 8]),
        image_len: LittleEndian::read_u64(&buf[NAME_SLOT_LEN + 8..NAME_SLOT_LEN + 16]),
        meas_offset: LittleEndian::read_u64(&buf[NAME_SLOT_LEN + 16..NAME_SLOT_LEN + 24]),
        meas_len: LittleEndian::read_u64(&buf[NAME_SLOT_LEN + 24..NAME_SLOT_LEN + 32]),
    })
}

fn encode_slot(slot: &SlotEntry) -> Result<[u8; SLOT_SIZE]> {
    let mut buf = [0u8; SLOT_SIZE];
    let name_bytes = slot.name.as_bytes();
    if name_bytes.len() > NAME_SLOT_LEN {
        return Err(ColonyError::InvalidArchive(format!(
            "image name '{}' exceeds {NAME_SLOT_LEN} bytes",
            slot.name
        )));
    }
    buf[..name_bytes.len()].copy_from_slice(name_bytes);
    LittleEndian::write_u64(&mut buf[NAME_SLOT_LEN..NAME_SLOT_LEN + 8], slot.image_offset);
    LittleEndian::write_u64(
        &mut buf[NAME_SLOT_LEN + 8..NAME_SLOT_LEN + 16],
        slot.image_len,
    );
    LittleEndian::write_u64(
        &mut buf[NAME_SLOT_LEN + 16..NAME_SLOT_LEN + 24],
        slot.meas_offset,
    );
    LittleEndian::write_u64(
        &mut buf[NAME_SLOT_LEN + 24..NAME_SLOT_LEN + 32],
        slot.meas_len,
    );
    Ok(buf)
}

/// The sole write handle for a plate-set archive.
pub struct ArchiveWriter {
    file: File,
    capacity: u32,
    len: u32,
    slots: Vec<SlotEntry>,
}

impl ArchiveWriter {
    /// Create a fresh archive with `capacity` preallocated index slots.
    pub fn create(path: &Path, capacity: u32) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        file.write_all(ARCHIVE_MAGIC)?;
        file.write_u16::<LittleEndian>(ARCHIVE_VERSION)?;
        file.write_u32::<LittleEndian>(capacity)?;
        file.write_u32::<LittleEndian>(0)?;
        file.write_u64::<LittleEndian>(HEADER_SIZE as u64)?;
        let zero_slot = [0u8; SLOT_SIZE];
        for _ in 0..capacity {
            file.write_all(&zero_slot)?;
        }
        file.sync_data()?;

        Ok(Self {
            file,
            capacity,
            len: 0,
            slots: vec![SlotEntry::default(); capacity as usize],
        })
    }

    /// Open an existing archive for writing.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let mut header_buf = vec![0u8; HEADER_SIZE];
        file.read_exact(&mut header_buf)?;
        let header = parse_header(&header_buf)?;

        file.seek(SeekFrom::Start(header.index_offset))?;
        let mut index_buf = vec![0u8; SLOT_SIZE * header.capacity as usize];
        file.read_exact(&mut index_buf)?;
        let slots = index_buf
            .chunks_exact(SLOT_SIZE)
            .map(parse_slot)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            file,
            capacity: header.capacity,
            len: header.len,
            slots,
        })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Logical number of named images, as opposed to the slot capacity.
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn names(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter(|s| s.is_used())
            .map(|s| s.name.clone())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.iter().any(|s| s.name == name)
    }

    /// Write (or overwrite) the image payload for a name and flush. The
    /// payload is appended first and the slot repointed after, so a
    /// concurrent reader never sees a slot aimed at unwritten bytes.
    pub fn write_image(&mut self, name: &str, image: &Image) -> Result<()> {
        let payload = encode_image(image)?;
        let offset = self.append_payload(&payload)?;
        let idx = self.claim_slot(name)?;
        self.slots[idx].image_offset = offset;
        self.slots[idx].image_len = payload.len() as u64;
        self.commit_slot(idx)?;
        debug!(name, bytes = payload.len(), "archive image write");
        Ok(())
    }

    /// Write (or overwrite) the measurement table for a name and flush.
    pub fn write_measurements(&mut self, name: &str, table: &MeasurementTable) -> Result<()> {
        let payload = encode_table(table, 0)?;
        let offset = self.append_payload(&payload)?;
        let idx = self.claim_slot(name)?;
        self.slots[idx].meas_offset = offset;
        self.slots[idx].meas_len = payload.len() as u64;
        self.commit_slot(idx)?;
        debug!(name, bytes = payload.len(), "archive measurement write");
        Ok(())
    }

    /// Flush and close.
    pub fn finalize(self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn append_payload(&mut self, payload: &[u8]) -> Result<u64> {
        let offset = self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(payload)?;
        Ok(offset)
    }

    fn claim_slot(&mut self, name: &str) -> Result<usize> {
        if let Some(idx) = self.slots.iter().position(|s| s.name == name) {
            return Ok(idx);
        }
        let idx = self
            .slots
            .iter()
            .position(|s| !s.is_used())
            .ok_or(ColonyError::CapacityExhausted(self.capacity))?;
        self.slots[idx].name = name.to_string();
        self.len += 1;
        Ok(idx)
    }

    fn commit_slot(&mut self, idx: usize) -> Result<()> {
        let encoded = encode_slot(&self.slots[idx])?;
        self.file
            .seek(SeekFrom::Start((HEADER_SIZE + idx * SLOT_SIZE) as u64))?;
        self.file.write_all(&encoded)?;
        self.file.seek(SeekFrom::Start(15))?;
        self.file.write_u32::<LittleEndian>(self.len)?;
        self.file.sync_data()?;
        Ok(())
    }
}

/// Memory-mapped read-only view of a plate-set archive. Many readers may
/// coexist with the single writer; each sees the file as of its open.
pub struct ArchiveReader {
    mmap: Mmap,
    capacity: u32,
    len: u32,
    slots: Vec<SlotEntry>,
}

impl ArchiveReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        let header = parse_header(&mmap)?;
        let index_end = header.index_offset as usize + SLOT_SIZE * header.capacity as usize;
        if mmap.len() < index_end {
            return Err(ColonyError::InvalidArchive(format!(
                "file truncated: expected at least {index_end} bytes, got {}",
                mmap.len()
            )));
        }

        let mut slots = Vec::with_capacity(header.capacity as usize);
        for idx in 0..header.capacity as usize {
            let start = header.index_offset as usize + idx * SLOT_SIZE;
            let slot = parse_slot(&mmap[start..start + SLOT_SIZE])?;
            if slot.is_used() {
                let image_end = slot.image_offset + slot.image_len;
                let meas_end = slot.meas_offset + slot.meas_len;
                if image_end > mmap.len() as u64 || meas_end > mmap.len() as u64 {
                    return Err(ColonyError::InvalidArchive(format!(
                        "slot '{}' points past the end of the file",
                        slot.name
                    )));
                }
            }
            slots.push(slot);
        }

        Ok(Self {
            mmap,
            capacity: header.capacity,
            len: header.len,
            slots,
        })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn names(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter(|s| s.is_used())
            .map(|s| s.name.clone())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.iter().any(|s| s.name == name)
    }

    pub fn image(&self, name: &str) -> Result<Image> {
        let slot = self.slot(name)?;
        if slot.image_len == 0 {
            return Err(ColonyError::ImageNotFound(name.to_string()));
        }
        let start = slot.image_offset as usize;
        decode_image(&self.mmap[start..start + slot.image_len as usize])
    }

    pub fn measurements(&self, name: &str) -> Result<Option<MeasurementTable>> {
        let slot = self.slot(name)?;
        if slot.meas_len == 0 {
            return Ok(None);
        }
        let start = slot.meas_offset as usize;
        decode_table(&self.mmap[start..start + slot.meas_len as usize]).map(Some)
    }

    /// On-disk byte size of a name's payloads; the memory-admission proxy.
    pub fn payload_size(&self, name: &str) -> Result<u64> {
        let slot = self.slot(name)?;
        Ok(slot.image_len + slot.meas_len)
    }

    fn slot(&self, name: &str) -> Result<&SlotEntry> {
        self.slots
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ColonyError::ImageNotFound(name.to_string()))
    }
}
