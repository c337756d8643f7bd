//! Accessor structs mediating every read and write of the raster fields.
//!
//! Accessors are constructed fresh on each [`Image`](crate::image::Image)
//! method call and never cached or stored, so the cross-field invalidation
//! rules live in exactly one place:
//!
//! - writing `gray` resets `enh_gray` (copy of the new gray) and clears the
//!   object map;
//! - writing `enh_gray` clears the object map only;
//! - writing the object map preserves the caller's labels (zeros are
//!   eliminated from the sparse store);
//! - writing the object mask relabels connected components from scratch.
//!
//! Writes validate shape and range before mutating, so a failed write never
//! leaves a partial update behind.

use std::ops::Range;

use ndarray::{s, Array2, Array3};

use crate::error::{ColonyError, Result};
use crate::image::labeling::{label_components, Connectivity};
use crate::image::sparse::SparseMap;
use crate::image::Image;

fn check_window(shape: (usize, usize), rows: &Range<usize>, cols: &Range<usize>) -> Result<()> {
    if rows.end > shape.0 || cols.end > shape.1 || rows.start > rows.end || cols.start > cols.end {
        return Err(ColonyError::ShapeMismatch {
            expected: shape,
            got: (rows.end, cols.end),
        });
    }
    Ok(())
}

fn check_value_shape(window: (usize, usize), value: (usize, usize)) -> Result<()> {
    if window != value {
        return Err(ColonyError::ShapeMismatch {
            expected: window,
            got: value,
        });
    }
    Ok(())
}

fn check_unit_range(values: &Array2<f32>) -> Result<()> {
    for &v in values.iter() {
        if !(0.0..=1.0).contains(&v) {
            return Err(ColonyError::RangeError(format!(
                "gray value {v} outside [0, 1]"
            )));
        }
    }
    Ok(())
}

fn check_unit_scalar(v: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&v) {
        return Err(ColonyError::RangeError(format!(
            "gray value {v} outside [0, 1]"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------- gray

/// Read access to the canonical grayscale raster.
pub struct Gray<'a> {
    pub(crate) image: &'a Image,
}

impl Gray<'_> {
    pub fn get(&self) -> Result<&Array2<f32>> {
        if self.is_empty() {
            return Err(ColonyError::EmptyImage);
        }
        Ok(self.image.rasters.gray())
    }

    pub fn copy(&self) -> Result<Array2<f32>> {
        self.get().cloned()
    }

    pub fn window(&self, rows: Range<usize>, cols: Range<usize>) -> Result<Array2<f32>> {
        let gray = self.get()?;
        check_window(gray.dim(), &rows, &cols)?;
        Ok(gray.slice(s![rows, cols]).to_owned())
    }

    pub fn is_empty(&self) -> bool {
        self.image.rasters.is_empty()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.image.rasters.shape()
    }
}

/// Write access to the canonical grayscale raster.
pub struct GrayMut<'a> {
    pub(crate) image: &'a mut Image,
}

impl GrayMut<'_> {
    /// Replace the whole gray raster. A new shape is allowed; the enhanced
    /// copy and object map are re-derived for it.
    pub fn set(&mut self, value: &Array2<f32>) -> Result<()> {
        check_unit_range(value)?;
        self.image.rasters.replace_gray(value.clone());
        Ok(())
    }

    /// Overwrite a rectangular window with a same-shape array.
    pub fn set_window(
        &mut self,
        rows: Range<usize>,
        cols: Range<usize>,
        value: &Array2<f32>,
    ) -> Result<()> {
        if self.image.rasters.is_empty() {
            return Err(ColonyError::EmptyImage);
        }
        check_window(self.image.rasters.shape(), &rows, &cols)?;
        check_value_shape((rows.len(), cols.len()), value.dim())?;
        check_unit_range(value)?;
        self.image
            .rasters
            .gray_mut()
            .slice_mut(s![rows, cols])
            .assign(value);
        self.image.rasters.cascade_after_gray_write();
        Ok(())
    }

    /// Fill a rectangular window with one value.
    pub fn fill_window(&mut self, rows: Range<usize>, cols: Range<usize>, value: f32) -> Result<()> {
        if self.image.rasters.is_empty() {
            return Err(ColonyError::EmptyImage);
        }
        check_window(self.image.rasters.shape(), &rows, &cols)?;
        check_unit_scalar(value)?;
        self.image
            .rasters
            .gray_mut()
            .slice_mut(s![rows, cols])
            .fill(value);
        self.image.rasters.cascade_after_gray_write();
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.image.rasters.is_empty()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.image.rasters.shape()
    }
}

// ------------------------------------------------------------ enh_gray

/// Read access to the enhanced (working-copy) grayscale raster.
pub struct EnhGray<'a> {
    pub(crate) image: &'a Image,
}

impl EnhGray<'_> {
    pub fn get(&self) -> Result<&Array2<f32>> {
        if self.is_empty() {
            return Err(ColonyError::EmptyImage);
        }
        Ok(self.image.rasters.enh_gray())
    }

    pub fn copy(&self) -> Result<Array2<f32>> {
        self.get().cloned()
    }

    pub fn window(&self, rows: Range<usize>, cols: Range<usize>) -> Result<Array2<f32>> {
        let enh = self.get()?;
        check_window(enh.dim(), &rows, &cols)?;
        Ok(enh.slice(s![rows, cols]).to_owned())
    }

    pub fn is_empty(&self) -> bool {
        self.image.rasters.is_empty()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.image.rasters.shape()
    }
}

/// Write access to the enhanced grayscale raster. Enhancement output is not
/// range-restricted; only the canonical gray carries the [0,1] contract.
pub struct EnhGrayMut<'a> {
    pub(crate) image: &'a mut Image,
}

impl EnhGrayMut<'_> {
    /// Replace the whole enhanced raster. The shape must match the canonical
    /// gray; the object map is cleared.
    pub fn set(&mut self, value: &Array2<f32>) -> Result<()> {
        if self.image.rasters.is_empty() {
            return Err(ColonyError::EmptyImage);
        }
        check_value_shape(self.image.rasters.shape(), value.dim())?;
        self.image.rasters.replace_enh_gray(value.clone());
        Ok(())
    }

    pub fn set_window(
        &mut self,
        rows: Range<usize>,
        cols: Range<usize>,
        value: &Array2<f32>,
    ) -> Result<()> {
        if self.image.rasters.is_empty() {
            return Err(ColonyError::EmptyImage);
        }
        check_window(self.image.rasters.shape(), &rows, &cols)?;
        check_value_shape((rows.len(), cols.len()), value.dim())?;
        self.image
            .rasters
            .enh_gray_mut()
            .slice_mut(s![rows, cols])
            .assign(value);
        self.image.rasters.cascade_after_enh_write();
        Ok(())
    }

    pub fn fill_window(&mut self, rows: Range<usize>, cols: Range<usize>, value: f32) -> Result<()> {
        if self.image.rasters.is_empty() {
            return Err(ColonyError::EmptyImage);
        }
        check_window(self.image.rasters.shape(), &rows, &cols)?;
        self.image
            .rasters
            .enh_gray_mut()
            .slice_mut(s![rows, cols])
            .fill(value);
        self.image.rasters.cascade_after_enh_write();
        Ok(())
    }

    /// Restore the enhanced raster to a copy of the canonical gray. Counts
    /// as a write: the object map is cleared.
    pub fn reset(&mut self) -> Result<()> {
        if self.image.rasters.is_empty() {
            return Err(ColonyError::EmptyImage);
        }
        self.image.rasters.reset_enh_gray();
        self.image.rasters.cascade_after_enh_write();
        Ok(())
    }
}

// --------------------------------------------------------------- color

/// Read access to the full-color raster. Color replacement goes through
/// [`Image::set_image`](crate::image::Image::set_image); there is no partial
/// color write path.
pub struct Color<'a> {
    pub(crate) image: &'a Image,
}

impl Color<'_> {
    pub fn get(&self) -> Result<&Array3<u16>> {
        self.image.rasters.color().ok_or(ColonyError::EmptyImage)
    }

    pub fn copy(&self) -> Result<Array3<u16>> {
        self.get().cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.image.rasters.color().is_none()
    }

    pub fn shape(&self) -> Option<(usize, usize, usize)> {
        self.image.rasters.color().map(|c| c.dim())
    }
}

// -------------------------------------------------------------- objmap

/// Read access to the labeled object map.
pub struct ObjMap<'a> {
    pub(crate) image: &'a Image,
}

impl ObjMap<'_> {
    /// Materialize the dense label matrix (0 = background).
    pub fn dense(&self) -> Result<Array2<u32>> {
        if self.image.rasters.is_empty() {
            return Err(ColonyError::EmptyImage);
        }
        Ok(self.image.rasters.objmap().to_dense())
    }

    pub fn window(&self, rows: Range<usize>, cols: Range<usize>) -> Result<Array2<u32>> {
        let dense = self.dense()?;
        check_window(dense.dim(), &rows, &cols)?;
        Ok(dense.slice(s![rows, cols]).to_owned())
    }

    /// Sorted distinct positive labels.
    pub fn labels(&self) -> Vec<u32> {
        self.image.rasters.objmap().labels()
    }

    pub fn num_objects(&self) -> usize {
        self.labels().len()
    }

    /// True when every pixel is background.
    pub fn is_blank(&self) -> bool {
        self.image.rasters.objmap().is_blank()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.image.rasters.objmap().shape()
    }
}

/// Write access to the labeled object map. Writes preserve the caller's
/// label values; explicit zeros are eliminated from the sparse store.
pub struct ObjMapMut<'a> {
    pub(crate) image: &'a mut Image,
}

impl ObjMapMut<'_> {
    /// Replace the whole map with the given label matrix.
    pub fn set(&mut self, map: &Array2<u32>) -> Result<()> {
        if self.image.rasters.is_empty() {
            return Err(ColonyError::EmptyImage);
        }
        check_value_shape(self.image.rasters.shape(), map.dim())?;
        self.image.rasters.replace_objmap(SparseMap::from_dense(map));
        Ok(())
    }

    pub fn set_window(
        &mut self,
        rows: Range<usize>,
        cols: Range<usize>,
        value: &Array2<u32>,
    ) -> Result<()> {
        let mut dense = self.dense()?;
        check_window(dense.dim(), &rows, &cols)?;
        check_value_shape((rows.len(), cols.len()), value.dim())?;
        dense.slice_mut(s![rows, cols]).assign(value);
        self.image
            .rasters
            .replace_objmap(SparseMap::from_dense(&dense));
        Ok(())
    }

    /// Scalar write: a uniform label fill of the addressed window.
    pub fn fill_window(&mut self, rows: Range<usize>, cols: Range<usize>, label: u32) -> Result<()> {
        let mut dense = self.dense()?;
        check_window(dense.dim(), &rows, &cols)?;
        dense.slice_mut(s![rows, cols]).fill(label);
        self.image
            .rasters
            .replace_objmap(SparseMap::from_dense(&dense));
        Ok(())
    }

    /// Clear the map to all-background.
    pub fn reset(&mut self) {
        let shape = self.image.rasters.shape();
        self.image.rasters.replace_objmap(SparseMap::empty(shape));
    }

    /// Recompute labels from the foreground's connected components without
    /// changing membership topology. Touching objects with distinct labels
    /// will merge; that is the documented relabel semantic.
    pub fn relabel(&mut self, connectivity: Connectivity) -> Result<()> {
        let dense = self.dense()?;
        let mask = dense.mapv(|v| v > 0);
        let relabeled = label_components(&mask, connectivity);
        self.image
            .rasters
            .replace_objmap(SparseMap::from_dense(&relabeled));
        Ok(())
    }

    fn dense(&self) -> Result<Array2<u32>> {
        if self.image.rasters.is_empty() {
            return Err(ColonyError::EmptyImage);
        }
        Ok(self.image.rasters.objmap().to_dense())
    }
}

// ------------------------------------------------------------- objmask

/// Read access to the boolean view of the object map.
pub struct ObjMask<'a> {
    pub(crate) image: &'a Image,
}

impl ObjMask<'_> {
    pub fn dense(&self) -> Result<Array2<bool>> {
        if self.image.rasters.is_empty() {
            return Err(ColonyError::EmptyImage);
        }
        Ok(self.image.rasters.objmap().to_dense().mapv(|v| v > 0))
    }

    pub fn shape(&self) -> (usize, usize) {
        self.image.rasters.objmap().shape()
    }
}

/// Write access to the boolean object mask. Every write recomputes
/// connected components over the updated mask and replaces the object map's
/// labels entirely — a stronger reset than plain object-map writes.
pub struct ObjMaskMut<'a> {
    pub(crate) image: &'a mut Image,
    pub(crate) connectivity: Connectivity,
}

impl ObjMaskMut<'_> {
    /// Choose the connectivity used for the relabel triggered by writes.
    pub fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    /// Replace the whole mask.
    pub fn set(&mut self, mask: &Array2<bool>) -> Result<()> {
        if self.image.rasters.is_empty() {
            return Err(ColonyError::EmptyImage);
        }
        check_value_shape(self.image.rasters.shape(), mask.dim())?;
        self.install(mask);
        Ok(())
    }

    pub fn set_window(
        &mut self,
        rows: Range<usize>,
        cols: Range<usize>,
        value: &Array2<bool>,
    ) -> Result<()> {
        let mut mask = self.current()?;
        check_window(mask.dim(), &rows, &cols)?;
        check_value_shape((rows.len(), cols.len()), value.dim())?;
        mask.slice_mut(s![rows, cols]).assign(value);
        self.install(&mask);
        Ok(())
    }

    pub fn fill_window(&mut self, rows: Range<usize>, cols: Range<usize>, value: bool) -> Result<()> {
        let mut mask = self.current()?;
        check_window(mask.dim(), &rows, &cols)?;
        mask.slice_mut(s![rows, cols]).fill(value);
        self.install(&mask);
        Ok(())
    }

    pub fn reset(&mut self) {
        let shape = self.image.rasters.shape();
        self.image.rasters.replace_objmap(SparseMap::empty(shape));
    }

    fn current(&self) -> Result<Array2<bool>> {
        if self.image.rasters.is_empty() {
            return Err(ColonyError::EmptyImage);
        }
        Ok(self.image.rasters.objmap().to_dense().mapv(|v| v > 0))
    }

    fn install(&mut self, mask: &Array2<bool>) {
        let labeled = label_components(mask, self.connectivity);
        self.image
            .rasters
            .replace_objmap(SparseMap::from_dense(&labeled));
    }
}
