use ndarray::{Array2, Array3, ArrayD, ArrayView2, Ix2, Ix3};

use crate::consts::{LUMINANCE_B, LUMINANCE_G, LUMINANCE_R};
use crate::error::{ColonyError, Result};
use crate::image::sparse::SparseMap;

/// Raw input accepted by [`crate::image::Image::set_image`]. The dtype
/// decides the inferred bit depth on first use; the rank and channel count
/// decide the detected format.
#[derive(Clone, Debug)]
pub enum ImageInput {
    U8(ArrayD<u8>),
    U16(ArrayD<u16>),
    F32(ArrayD<f32>),
}

impl From<Array2<u8>> for ImageInput {
    fn from(arr: Array2<u8>) -> Self {
        Self::U8(arr.into_dyn())
    }
}

impl From<Array3<u8>> for ImageInput {
    fn from(arr: Array3<u8>) -> Self {
        Self::U8(arr.into_dyn())
    }
}

impl From<Array2<u16>> for ImageInput {
    fn from(arr: Array2<u16>) -> Self {
        Self::U16(arr.into_dyn())
    }
}

impl From<Array3<u16>> for ImageInput {
    fn from(arr: Array3<u16>) -> Self {
        Self::U16(arr.into_dyn())
    }
}

impl From<Array2<f32>> for ImageInput {
    fn from(arr: Array2<f32>) -> Self {
        Self::F32(arr.into_dyn())
    }
}

impl From<Array3<f32>> for ImageInput {
    fn from(arr: Array3<f32>) -> Self {
        Self::F32(arr.into_dyn())
    }
}

impl ImageInput {
    fn shape(&self) -> &[usize] {
        match self {
            Self::U8(a) => a.shape(),
            Self::U16(a) => a.shape(),
            Self::F32(a) => a.shape(),
        }
    }
}

/// Raster format detected from array rank and channel count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RasterFormat {
    Empty,
    Grayscale,
    GrayscaleSingleChannel,
    Rgb,
    Rgba,
}

impl RasterFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "Empty",
            Self::Grayscale => "Grayscale",
            Self::GrayscaleSingleChannel => "Grayscale (single channel)",
            Self::Rgb => "RGB",
            Self::Rgba => "RGBA",
        }
    }

    pub fn is_color(&self) -> bool {
        matches!(self, Self::Rgb | Self::Rgba)
    }

    fn detect(shape: &[usize]) -> Result<Self> {
        match shape.len() {
            2 => Ok(Self::Grayscale),
            3 => match shape[2] {
                1 => Ok(Self::GrayscaleSingleChannel),
                3 => Ok(Self::Rgb),
                4 => Ok(Self::Rgba),
                c => Err(ColonyError::UnsupportedFormat(format!(
                    "{c}-channel image"
                ))),
            },
            d => Err(ColonyError::UnsupportedFormat(format!(
                "{d}-dimensional array"
            ))),
        }
    }
}

/// Owns the four raster representations of one plate image.
///
/// `gray` is authoritative for the single-channel view ([0,1] floats,
/// derived via BT.601 luminance when color is present), `enh_gray` is the
/// disposable working copy, and the object map lives in a sparse store.
/// Every raster replacement re-derives `enh_gray` and clears the object map.
#[derive(Clone, Debug)]
pub struct RasterStore {
    color: Option<Array3<u16>>,
    gray: Array2<f32>,
    enh_gray: Array2<f32>,
    objmap: SparseMap,
    bit_depth: Option<u8>,
}

impl Default for RasterStore {
    fn default() -> Self {
        Self {
            color: None,
            gray: Array2::zeros((0, 0)),
            enh_gray: Array2::zeros((0, 0)),
            objmap: SparseMap::empty((0, 0)),
            bit_depth: None,
        }
    }
}

impl RasterStore {
    pub fn is_empty(&self) -> bool {
        self.gray.is_empty()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.gray.dim()
    }

    pub fn bit_depth(&self) -> Option<u8> {
        self.bit_depth
    }

    pub(crate) fn set_bit_depth(&mut self, bit_depth: u8) {
        self.bit_depth = Some(bit_depth);
    }

    pub(crate) fn color(&self) -> Option<&Array3<u16>> {
        self.color.as_ref()
    }

    pub(crate) fn gray(&self) -> &Array2<f32> {
        &self.gray
    }

    pub(crate) fn enh_gray(&self) -> &Array2<f32> {
        &self.enh_gray
    }

    pub(crate) fn objmap(&self) -> &SparseMap {
        &self.objmap
    }

    /// Reset all representations to the empty state. Bit depth, once
    /// inferred, is kept.
    pub(crate) fn clear(&mut self) {
        self.color = None;
        self.gray = Array2::zeros((0, 0));
        self.enh_gray = Array2::zeros((0, 0));
        self.objmap = SparseMap::empty((0, 0));
    }

    /// Ingest a raw array: detect the format, infer the bit depth on first
    /// use, convert to the canonical representations, and reset the derived
    /// fields. Returns the detected format.
    pub(crate) fn set_input(&mut self, input: ImageInput) -> Result<RasterFormat> {
        let format = RasterFormat::detect(input.shape())?;

        if self.bit_depth.is_none() {
            self.bit_depth = Some(match &input {
                ImageInput::U8(_) => 8,
                ImageInput::U16(_) => 16,
                ImageInput::F32(_) => 16,
            });
        }
        let depth_max = depth_max(self.bit_depth.unwrap_or(16));

        match (input, format) {
            (ImageInput::U8(a), RasterFormat::Grayscale) => {
                let m = a.into_dimensionality::<Ix2>().map_err(bad_shape)?;
                self.install_gray(int_matrix_to_gray(&m.view(), u8::MAX as f32));
            }
            (ImageInput::U16(a), RasterFormat::Grayscale) => {
                let m = a.into_dimensionality::<Ix2>().map_err(bad_shape)?;
                self.install_gray(int_matrix_to_gray(&m.view(), u16::MAX as f32));
            }
            (ImageInput::F32(a), RasterFormat::Grayscale) => {
                let m = a.into_dimensionality::<Ix2>().map_err(bad_shape)?;
                validate_unit_range(&m)?;
                self.install_gray(m);
            }
            (input, RasterFormat::GrayscaleSingleChannel) => {
                // Drop the trailing channel axis and re-dispatch as 2-D.
                let squeezed = match input {
                    ImageInput::U8(a) => ImageInput::U8(drop_channel(a)?),
                    ImageInput::U16(a) => ImageInput::U16(drop_channel(a)?),
                    ImageInput::F32(a) => ImageInput::F32(drop_channel(a)?),
                };
                self.set_input(squeezed)?;
            }
            (ImageInput::U8(a), RasterFormat::Rgb) => {
                let c = a.into_dimensionality::<Ix3>().map_err(bad_shape)?;
                let color = c.mapv(|v| v as u16);
                self.install_color(color, u8::MAX as f32);
            }
            (ImageInput::U16(a), RasterFormat::Rgb) => {
                let c = a.into_dimensionality::<Ix3>().map_err(bad_shape)?;
                self.install_color(c, u16::MAX as f32);
            }
            (ImageInput::F32(a), RasterFormat::Rgb) => {
                let c = a.into_dimensionality::<Ix3>().map_err(bad_shape)?;
                validate_unit_range(&c)?;
                let color = c.mapv(|v| (v * depth_max).round() as u16);
                self.install_color(color, depth_max);
            }
            (ImageInput::U8(a), RasterFormat::Rgba) => {
                let c = a.into_dimensionality::<Ix3>().map_err(bad_shape)?;
                let float = c.mapv(|v| v as f32 / u8::MAX as f32);
                let composited = composite_over_white(&float);
                let color = composited.mapv(|v| (v * depth_max).round() as u16);
                self.install_color(color, depth_max);
            }
            (ImageInput::U16(a), RasterFormat::Rgba) => {
                let c = a.into_dimensionality::<Ix3>().map_err(bad_shape)?;
                let float = c.mapv(|v| v as f32 / u16::MAX as f32);
                let composited = composite_over_white(&float);
                let color = composited.mapv(|v| (v * depth_max).round() as u16);
                self.install_color(color, depth_max);
            }
            (ImageInput::F32(a), RasterFormat::Rgba) => {
                let c = a.into_dimensionality::<Ix3>().map_err(bad_shape)?;
                validate_unit_range(&c)?;
                let composited = composite_over_white(&c);
                let color = composited.mapv(|v| (v * depth_max).round() as u16);
                self.install_color(color, depth_max);
            }
            (_, RasterFormat::Empty) => unreachable!("detect never returns Empty"),
        }

        Ok(format)
    }

    /// Deep-copy every representation (and bit depth) from another store.
    pub(crate) fn copy_from(&mut self, other: &RasterStore) {
        self.color = other.color.clone();
        self.gray = other.gray.clone();
        self.enh_gray = other.enh_gray.clone();
        self.objmap = other.objmap.clone();
        self.bit_depth = other.bit_depth;
    }

    /// Replace the grayscale raster. Color is left untouched; `enh_gray`
    /// becomes a copy of the new gray and the object map is cleared to
    /// all-background of the new shape.
    pub(crate) fn replace_gray(&mut self, gray: Array2<f32>) {
        let shape = gray.dim();
        self.gray = gray;
        self.enh_gray = self.gray.clone();
        self.objmap = SparseMap::empty(shape);
    }

    /// Replace the enhanced grayscale raster; clears the object map only.
    pub(crate) fn replace_enh_gray(&mut self, enh: Array2<f32>) {
        self.enh_gray = enh;
        self.objmap = SparseMap::empty(self.gray.dim());
    }

    pub(crate) fn replace_objmap(&mut self, objmap: SparseMap) {
        self.objmap = objmap;
    }

    pub(crate) fn reset_enh_gray(&mut self) {
        self.enh_gray = self.gray.clone();
    }

    pub(crate) fn gray_mut(&mut self) -> &mut Array2<f32> {
        &mut self.gray
    }

    pub(crate) fn enh_gray_mut(&mut self) -> &mut Array2<f32> {
        &mut self.enh_gray
    }

    /// Invalidation after an in-place gray edit: the enhanced copy is
    /// re-derived and the object map cleared.
    pub(crate) fn cascade_after_gray_write(&mut self) {
        self.enh_gray = self.gray.clone();
        self.objmap = SparseMap::empty(self.gray.dim());
    }

    /// Invalidation after an in-place enhanced-gray edit: the object map is
    /// cleared; the canonical gray is untouched.
    pub(crate) fn cascade_after_enh_write(&mut self) {
        self.objmap = SparseMap::empty(self.gray.dim());
    }

    /// Crate-internal constructor used by the archive codec.
    pub(crate) fn from_parts(
        color: Option<Array3<u16>>,
        gray: Array2<f32>,
        enh_gray: Array2<f32>,
        objmap: SparseMap,
        bit_depth: Option<u8>,
    ) -> Self {
        Self {
            color,
            gray,
            enh_gray,
            objmap,
            bit_depth,
        }
    }

    /// Rectangular sub-store: every representation sliced to the window.
    /// Object labels are carried over as-is.
    pub(crate) fn crop(
        &self,
        rows: std::ops::Range<usize>,
        cols: std::ops::Range<usize>,
    ) -> RasterStore {
        use ndarray::s;
        let gray = self.gray.slice(s![rows.clone(), cols.clone()]).to_owned();
        let enh_gray = self.enh_gray.slice(s![rows.clone(), cols.clone()]).to_owned();
        let color = self
            .color
            .as_ref()
            .map(|c| c.slice(s![rows.clone(), cols.clone(), ..]).to_owned());
        let dense = self.objmap.to_dense();
        let objmap = SparseMap::from_dense(&dense.slice(s![rows, cols]).to_owned());
        RasterStore {
            color,
            gray,
            enh_gray,
            objmap,
            bit_depth: self.bit_depth,
        }
    }

    fn install_gray(&mut self, gray: Array2<f32>) {
        self.color = None;
        self.replace_gray(gray);
    }

    fn install_color(&mut self, color: Array3<u16>, depth_max: f32) {
        let gray = luminance(&color, depth_max);
        self.color = Some(color);
        self.replace_gray(gray);
    }
}

pub(crate) fn depth_max(bit_depth: u8) -> f32 {
    match bit_depth {
        8 => u8::MAX as f32,
        _ => u16::MAX as f32,
    }
}

/// BT.601 luminance of a color plane, normalized to [0,1].
fn luminance(color: &Array3<u16>, depth_max: f32) -> Array2<f32> {
    let (h, w, _) = color.dim();
    let mut gray = Array2::<f32>::zeros((h, w));
    for row in 0..h {
        for col in 0..w {
            let r = color[[row, col, 0]] as f32 / depth_max;
            let g = color[[row, col, 1]] as f32 / depth_max;
            let b = color[[row, col, 2]] as f32 / depth_max;
            gray[[row, col]] = (LUMINANCE_R * r + LUMINANCE_G * g + LUMINANCE_B * b).min(1.0);
        }
    }
    gray
}

fn int_matrix_to_gray<T>(arr: &ArrayView2<'_, T>, max: f32) -> Array2<f32>
where
    T: Copy + 'static + num_traits::AsPrimitive<f32>,
{
    arr.mapv(|v| v.as_() / max)
}

/// Blend RGBA (floats in [0,1]) over a white background, yielding RGB.
fn composite_over_white(rgba: &Array3<f32>) -> Array3<f32> {
    let (h, w, _) = rgba.dim();
    let mut rgb = Array3::<f32>::zeros((h, w, 3));
    for row in 0..h {
        for col in 0..w {
            let alpha = rgba[[row, col, 3]];
            for ch in 0..3 {
                rgb[[row, col, ch]] = alpha * rgba[[row, col, ch]] + (1.0 - alpha);
            }
        }
    }
    rgb
}

fn validate_unit_range<D: ndarray::Dimension>(arr: &ndarray::Array<f32, D>) -> Result<()> {
    for &v in arr.iter() {
        if !(0.0..=1.0).contains(&v) {
            return Err(ColonyError::RangeError(format!(
                "float raster value {v} outside [0, 1]"
            )));
        }
    }
    Ok(())
}

fn drop_channel<T: Clone>(arr: ArrayD<T>) -> Result<ArrayD<T>> {
    let a = arr.into_dimensionality::<Ix3>().map_err(bad_shape)?;
    Ok(a.index_axis(ndarray::Axis(2), 0).to_owned().into_dyn())
}

fn bad_shape(e: ndarray::ShapeError) -> ColonyError {
    ColonyError::UnsupportedFormat(e.to_string())
}
