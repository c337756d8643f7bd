//! Derived view over the detected objects of an image.
//!
//! Nothing here is cached: every call recomputes from the live object map,
//! so the view always reflects the latest detector/refiner output.

use crate::error::{ColonyError, Result};
use crate::image::labeling::{region_stats, RegionStats};
use crate::image::metadata::MetaValue;
use crate::image::Image;
use crate::table::{Column, MeasurementTable};

/// Column names emitted by [`Objects::info`].
pub mod columns {
    pub const AREA: &str = "Area";
    pub const BBOX_CENTER_RR: &str = "Bbox_CenterRR";
    pub const BBOX_CENTER_CC: &str = "Bbox_CenterCC";
    pub const BBOX_MIN_RR: &str = "Bbox_MinRR";
    pub const BBOX_MIN_CC: &str = "Bbox_MinCC";
    pub const BBOX_MAX_RR: &str = "Bbox_MaxRR";
    pub const BBOX_MAX_CC: &str = "Bbox_MaxCC";
}

/// Read-only accessor over the labeled objects of an [`Image`].
pub struct Objects<'a> {
    pub(crate) image: &'a Image,
}

impl Objects<'_> {
    /// Number of distinct positive labels currently present.
    pub fn len(&self) -> usize {
        self.image.rasters.objmap().labels().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted distinct labels.
    pub fn labels(&self) -> Vec<u32> {
        self.image.rasters.objmap().labels()
    }

    /// Region statistics (label, area, bbox, centroid) for every object,
    /// recomputed from the live map, ordered by ascending label.
    pub fn stats(&self) -> Result<Vec<RegionStats>> {
        if self.image.is_empty() {
            return Err(ColonyError::EmptyImage);
        }
        Ok(region_stats(&self.image.rasters.objmap().to_dense()))
    }

    /// Crop out one object by positional index (ascending-label order).
    ///
    /// The crop is the object's bounding-box slice of the parent with all
    /// foreign labels zeroed and metadata marked `ImageType=Object`.
    pub fn get(&self, index: usize) -> Result<Image> {
        let stats = self.stats()?;
        if stats.is_empty() {
            return Err(ColonyError::NoObjects);
        }
        let total = stats.len();
        let region = stats
            .into_iter()
            .nth(index)
            .ok_or(ColonyError::ObjectIndexOutOfRange { index, total })?;
        self.crop_region(&region)
    }

    /// Crop out one object by its label value.
    pub fn crop(&self, label: u32) -> Result<Image> {
        let stats = self.stats()?;
        let region = stats
            .into_iter()
            .find(|r| r.label == label)
            .ok_or(ColonyError::UnknownLabel(label))?;
        self.crop_region(&region)
    }

    /// Lazy, restartable iterator of per-object crops. Statistics are
    /// recomputed at each call, never across mutations.
    pub fn iter(&self) -> impl Iterator<Item = Image> + '_ {
        let stats = self.stats().unwrap_or_default();
        stats
            .into_iter()
            .filter_map(move |region| self.crop_region(&region).ok())
    }

    /// Tabulate label, area, centroid, and bounding box for every object.
    /// With `include_metadata`, the image's protected and public metadata
    /// are prepended as constant columns.
    pub fn info(&self, include_metadata: bool) -> Result<MeasurementTable> {
        let stats = self.stats()?;
        let mut table = MeasurementTable::with_labels(stats.iter().map(|r| r.label).collect());

        table.add_int_column(columns::AREA, stats.iter().map(|r| r.area as i64).collect())?;
        table.add_float_column(
            columns::BBOX_CENTER_RR,
            stats.iter().map(|r| r.centroid.0).collect(),
        )?;
        table.add_float_column(
            columns::BBOX_CENTER_CC,
            stats.iter().map(|r| r.centroid.1).collect(),
        )?;
        table.add_int_column(
            columns::BBOX_MIN_RR,
            stats.iter().map(|r| r.bbox.0 as i64).collect(),
        )?;
        table.add_int_column(
            columns::BBOX_MIN_CC,
            stats.iter().map(|r| r.bbox.2 as i64).collect(),
        )?;
        table.add_int_column(
            columns::BBOX_MAX_RR,
            stats.iter().map(|r| r.bbox.1 as i64).collect(),
        )?;
        table.add_int_column(
            columns::BBOX_MAX_CC,
            stats.iter().map(|r| r.bbox.3 as i64).collect(),
        )?;

        if include_metadata {
            insert_metadata_columns(self.image, &mut table)?;
        }
        Ok(table)
    }

    fn crop_region(&self, region: &RegionStats) -> Result<Image> {
        let (min_row, max_row, min_col, max_col) = region.bbox;
        let mut child = self.image.crop(min_row..max_row + 1, min_col..max_col + 1)?;

        // Keep only this object's label in the crop.
        let dense = child.objmap().dense()?;
        let own = dense.mapv(|v| if v == region.label { v } else { 0 });
        child.objmap_mut().set(&own)?;

        let parent_name = self.image.name();
        child
            .metadata_mut()
            .set_protected(crate::image::metadata::keys::PARENT_IMAGE_NAME, parent_name.as_str());
        child
            .metadata_mut()
            .set_protected(crate::image::metadata::keys::IMAGE_TYPE, "Object");
        child
            .metadata_mut()
            .set_name(&format!("{parent_name}_obj{}", region.label));
        Ok(child)
    }
}

/// Prepend the image's protected + public metadata as constant columns.
fn insert_metadata_columns(image: &Image, table: &mut MeasurementTable) -> Result<()> {
    let n = table.n_rows();
    let entries: Vec<(String, MetaValue)> = image
        .metadata()
        .entries()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();

    // Reverse so the first metadata key ends up leftmost.
    for (key, value) in entries.into_iter().rev() {
        if table.has_column(&key) {
            continue;
        }
        let column = match value {
            MetaValue::Str(s) => Column::Str(vec![Some(s); n]),
            MetaValue::Int(v) => Column::Int(vec![Some(v); n]),
            MetaValue::Float(v) => Column::Float(vec![Some(v); n]),
            MetaValue::Bool(v) => Column::Bool(vec![Some(v); n]),
        };
        table.insert_column(0, key, column)?;
    }
    Ok(())
}
