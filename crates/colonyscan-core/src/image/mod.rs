//! The mutable image container: a multi-representation raster store plus a
//! sparse labeled object map and a three-tier metadata store, with every
//! read and write mediated by accessor structs.

pub mod accessors;
pub mod labeling;
pub mod metadata;
pub mod objects;
pub mod rasters;
pub mod sparse;

use std::ops::Range;

use crate::error::{ColonyError, Result};
use accessors::{
    Color, EnhGray, EnhGrayMut, Gray, GrayMut, ObjMap, ObjMapMut, ObjMask, ObjMaskMut,
};
use labeling::Connectivity;
use metadata::{keys, MetadataStore};
use objects::Objects;
use rasters::{ImageInput, RasterFormat, RasterStore};

/// A single plate image.
///
/// Owns the raster representations exclusively; operations never touch the
/// raster fields directly — all mutation goes through the accessors returned
/// by [`Image::gray_mut`], [`Image::enh_gray_mut`], [`Image::objmap_mut`]
/// and [`Image::objmask_mut`], which is where the invalidation rules are
/// enforced. Accessors are created fresh on each call and never outlive the
/// image.
#[derive(Clone, Debug)]
pub struct Image {
    pub(crate) rasters: RasterStore,
    metadata: MetadataStore,
}

impl Default for Image {
    fn default() -> Self {
        Self::new()
    }
}

impl Image {
    /// An empty, unnamed image.
    pub fn new() -> Self {
        Self {
            rasters: RasterStore::default(),
            metadata: MetadataStore::new(None),
        }
    }

    pub fn with_name(name: &str) -> Self {
        Self {
            rasters: RasterStore::default(),
            metadata: MetadataStore::new(Some(name)),
        }
    }

    /// An empty image with the bit depth fixed up front instead of inferred
    /// from the first array. Only 8 and 16 are valid.
    pub fn with_bit_depth(name: &str, bit_depth: u8) -> Result<Self> {
        if bit_depth != 8 && bit_depth != 16 {
            return Err(ColonyError::RangeError(format!(
                "bit depth must be 8 or 16, got {bit_depth}"
            )));
        }
        let mut image = Self::with_name(name);
        image.rasters.set_bit_depth(bit_depth);
        image
            .metadata
            .set_protected(keys::BIT_DEPTH, bit_depth as i64);
        Ok(image)
    }

    /// Build an image from a raw array (see [`ImageInput`] for accepted
    /// dtypes and [`rasters::RasterFormat`] for the rank/channel rules).
    pub fn from_array(input: impl Into<ImageInput>) -> Result<Self> {
        let mut image = Self::new();
        image.set_image(input)?;
        Ok(image)
    }

    pub fn from_array_named(name: &str, input: impl Into<ImageInput>) -> Result<Self> {
        let mut image = Self::with_name(name);
        image.set_image(input)?;
        Ok(image)
    }

    /// Deep copy of another image: rasters and protected/public metadata are
    /// cloned; the copy gets its own unique id.
    pub fn from_image(other: &Image) -> Self {
        let mut image = Self::new();
        image.set_from_image(other);
        image
    }

    /// Deep copy (alias for [`Image::from_image`]).
    pub fn copy(&self) -> Self {
        Self::from_image(self)
    }

    /// Replace the raster contents from a raw array. Format and bit depth
    /// are detected and recorded in protected metadata; the object map is
    /// always cleared by a raster replacement.
    pub fn set_image(&mut self, input: impl Into<ImageInput>) -> Result<()> {
        let format = self.rasters.set_input(input.into())?;
        self.record_raster_metadata(format);
        Ok(())
    }

    pub fn set_from_image(&mut self, other: &Image) {
        self.rasters.copy_from(&other.rasters);
        self.metadata.copy_from(other.metadata());
    }

    /// Clear all raster data. Bit depth, once inferred, stays fixed.
    pub fn clear(&mut self) {
        self.rasters.clear();
        self.metadata
            .set_protected(keys::IMAGE_FORMAT, RasterFormat::Empty.as_str());
    }

    pub fn name(&self) -> String {
        self.metadata.name()
    }

    pub fn rename(&mut self, name: &str) {
        self.metadata.set_name(name);
    }

    pub fn is_empty(&self) -> bool {
        self.rasters.is_empty()
    }

    /// Shape shared by `gray`, `enh_gray`, and the object map.
    pub fn shape(&self) -> (usize, usize) {
        self.rasters.shape()
    }

    /// Bit depth inferred from the first array set on this image.
    pub fn bit_depth(&self) -> Option<u8> {
        self.rasters.bit_depth()
    }

    pub fn num_objects(&self) -> usize {
        self.objects().len()
    }

    /// Force connected-component renumbering of the object map without
    /// changing membership topology (for structural edits made outside the
    /// standard accessor path).
    pub fn relabel_objects(&mut self, connectivity: Connectivity) -> Result<()> {
        self.objmap_mut().relabel(connectivity)
    }

    // ---------------------------------------------------------- accessors

    pub fn gray(&self) -> Gray<'_> {
        Gray { image: self }
    }

    pub fn gray_mut(&mut self) -> GrayMut<'_> {
        GrayMut { image: self }
    }

    pub fn enh_gray(&self) -> EnhGray<'_> {
        EnhGray { image: self }
    }

    pub fn enh_gray_mut(&mut self) -> EnhGrayMut<'_> {
        EnhGrayMut { image: self }
    }

    pub fn color(&self) -> Color<'_> {
        Color { image: self }
    }

    pub fn objmap(&self) -> ObjMap<'_> {
        ObjMap { image: self }
    }

    pub fn objmap_mut(&mut self) -> ObjMapMut<'_> {
        ObjMapMut { image: self }
    }

    pub fn objmask(&self) -> ObjMask<'_> {
        ObjMask { image: self }
    }

    pub fn objmask_mut(&mut self) -> ObjMaskMut<'_> {
        ObjMaskMut {
            image: self,
            connectivity: Connectivity::default(),
        }
    }

    pub fn objects(&self) -> Objects<'_> {
        Objects { image: self }
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut MetadataStore {
        &mut self.metadata
    }

    // ------------------------------------------------------------- misc

    /// Rectangular sub-image: all representations sliced to the window,
    /// object labels carried over, metadata copied with `ImageType=Crop`.
    pub fn crop(&self, rows: Range<usize>, cols: Range<usize>) -> Result<Image> {
        if self.is_empty() {
            return Err(ColonyError::EmptyImage);
        }
        let (h, w) = self.shape();
        if rows.end > h || cols.end > w || rows.start >= rows.end || cols.start >= cols.end {
            return Err(ColonyError::ShapeMismatch {
                expected: (h, w),
                got: (rows.end, cols.end),
            });
        }

        let mut child = Image::new();
        child.rasters = self.rasters.crop(rows, cols);
        child.metadata.copy_from(&self.metadata);
        child
            .metadata
            .set_protected(keys::PARENT_IMAGE_NAME, self.name().as_str());
        child.metadata.set_protected(keys::IMAGE_TYPE, "Crop");
        Ok(child)
    }

    /// Crate-internal constructor used by the archive codec.
    pub(crate) fn from_parts(rasters: RasterStore, metadata: MetadataStore) -> Self {
        Self { rasters, metadata }
    }

    fn record_raster_metadata(&mut self, format: RasterFormat) {
        self.metadata
            .set_protected(keys::IMAGE_FORMAT, format.as_str());
        if let Some(depth) = self.rasters.bit_depth() {
            self.metadata.set_protected(keys::BIT_DEPTH, depth as i64);
        }
    }
}
