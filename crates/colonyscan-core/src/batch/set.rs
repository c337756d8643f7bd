//! A named collection of plate images backed by one archive file.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::consts::ACCEPTED_IMAGE_EXTENSIONS;
use crate::error::{ColonyError, Result};
use crate::image::Image;
use crate::io::archive::{ArchiveReader, ArchiveWriter};
use crate::io::image_io::load_image;
use crate::table::MeasurementTable;

/// Handle to a plate-set archive. Functions open a fresh reader or writer
/// per call rather than holding handles, so the single-writer discipline
/// stays scoped to each operation.
#[derive(Clone, Debug)]
pub struct PlateSet {
    name: String,
    path: PathBuf,
}

impl PlateSet {
    /// Create a new archive from in-memory images. Slot capacity defaults
    /// to the image count; pass `extra_capacity` to reserve room for later
    /// additions. Unnamed images are named `image_NNNN` by position.
    pub fn create(
        name: &str,
        path: &Path,
        images: &[Image],
        extra_capacity: u32,
    ) -> Result<Self> {
        let capacity = images.len() as u32 + extra_capacity;
        let mut writer = ArchiveWriter::create(path, capacity)?;
        for (idx, image) in images.iter().enumerate() {
            let image_name = effective_name(image, idx);
            writer.write_image(&image_name, image)?;
        }
        writer.finalize()?;
        info!(set = name, images = images.len(), path = %path.display(), "plate set created");
        Ok(Self {
            name: name.to_string(),
            path: path.to_path_buf(),
        })
    }

    /// Build a set by importing every accepted image file from a directory
    /// (sorted by file name).
    pub fn from_directory(name: &str, dir: &Path, out_path: &Path) -> Result<Self> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| {
                        let lower = e.to_ascii_lowercase();
                        ACCEPTED_IMAGE_EXTENSIONS.contains(&lower.as_str())
                    })
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(ColonyError::InvalidArchive(format!(
                "no importable images under {}",
                dir.display()
            )));
        }

        let images = files
            .iter()
            .map(|p| load_image(p))
            .collect::<Result<Vec<_>>>()?;
        Self::create(name, out_path, &images, 0)
    }

    /// Connect to an existing archive. The set name is the file stem.
    pub fn open(path: &Path) -> Result<Self> {
        // Validate up front so a bad path fails here, not mid-batch.
        ArchiveReader::open(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Self {
            name,
            path: path.to_path_buf(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn image_names(&self) -> Result<Vec<String>> {
        Ok(self.reader()?.names())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.reader()?.len() as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.reader()?.is_empty())
    }

    pub fn get_image(&self, name: &str) -> Result<Image> {
        self.reader()?.image(name)
    }

    pub fn measurements(&self, name: &str) -> Result<Option<MeasurementTable>> {
        self.reader()?.measurements(name)
    }

    /// Add or overwrite one image.
    pub fn insert_image(&self, image: &Image) -> Result<()> {
        let name = effective_name(image, usize::MAX);
        let mut writer = self.writer()?;
        writer.write_image(&name, image)?;
        writer.finalize()
    }

    /// Concatenate every stored measurement table (shared schema assumed).
    pub fn all_measurements(&self) -> Result<MeasurementTable> {
        let reader = self.reader()?;
        let mut aggregated = MeasurementTable::new();
        for name in reader.names() {
            if let Some(table) = reader.measurements(&name)? {
                aggregated = aggregated.concat_rows(&table)?;
            }
        }
        Ok(aggregated)
    }

    pub fn reader(&self) -> Result<ArchiveReader> {
        ArchiveReader::open(&self.path)
    }

    pub(crate) fn writer(&self) -> Result<ArchiveWriter> {
        ArchiveWriter::open(&self.path)
    }
}

fn effective_name(image: &Image, idx: usize) -> String {
    let name = image.name();
    if name.is_empty() {
        format!("image_{idx:04}")
    } else {
        name
    }
}
