//! Plate image file import/export via the `image` crate.

use std::path::Path;

use image::DynamicImage;
use ndarray::{Array2, Array3};

use crate::error::{ColonyError, Result};
use crate::image::Image;

/// Load a plate image from a PNG/TIFF/JPEG file. 16-bit grayscale and RGB
/// sources keep their depth; everything else is read as 8-bit. The image is
/// named after the file stem.
pub fn load_image(path: &Path) -> Result<Image> {
    let decoded = image::open(path)?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut img = Image::with_name(&name);
    match decoded {
        DynamicImage::ImageLuma8(buf) => {
            let (w, h) = buf.dimensions();
            let arr = Array2::from_shape_vec((h as usize, w as usize), buf.into_raw())
                .map_err(|e| ColonyError::UnsupportedFormat(e.to_string()))?;
            img.set_image(arr)?;
        }
        DynamicImage::ImageLuma16(buf) => {
            let (w, h) = buf.dimensions();
            let arr = Array2::from_shape_vec((h as usize, w as usize), buf.into_raw())
                .map_err(|e| ColonyError::UnsupportedFormat(e.to_string()))?;
            img.set_image(arr)?;
        }
        DynamicImage::ImageRgb16(buf) => {
            let (w, h) = buf.dimensions();
            let arr = Array3::from_shape_vec((h as usize, w as usize, 3), buf.into_raw())
                .map_err(|e| ColonyError::UnsupportedFormat(e.to_string()))?;
            img.set_image(arr)?;
        }
        DynamicImage::ImageRgba8(buf) => {
            let (w, h) = buf.dimensions();
            let arr = Array3::from_shape_vec((h as usize, w as usize, 4), buf.into_raw())
                .map_err(|e| ColonyError::UnsupportedFormat(e.to_string()))?;
            img.set_image(arr)?;
        }
        other => {
            let buf = other.to_rgb8();
            let (w, h) = buf.dimensions();
            let arr = Array3::from_shape_vec((h as usize, w as usize, 3), buf.into_raw())
                .map_err(|e| ColonyError::UnsupportedFormat(e.to_string()))?;
            img.set_image(arr)?;
        }
    }
    Ok(img)
}

/// Save the canonical grayscale as an 8- or 16-bit PNG/TIFF, per the
/// image's bit depth.
pub fn save_gray(img: &Image, path: &Path) -> Result<()> {
    let gray_raster = img.gray();
    let gray = gray_raster.get()?;
    let (h, w) = gray.dim();

    match img.bit_depth() {
        Some(8) => {
            let data: Vec<u8> = gray.iter().map(|&v| (v * 255.0).round() as u8).collect();
            let buf = image::GrayImage::from_raw(w as u32, h as u32, data)
                .ok_or_else(|| ColonyError::UnsupportedFormat("buffer size mismatch".into()))?;
            buf.save(path)?;
        }
        _ => {
            let data: Vec<u16> = gray.iter().map(|&v| (v * 65535.0).round() as u16).collect();
            let buf = image::ImageBuffer::<image::Luma<u16>, _>::from_raw(w as u32, h as u32, data)
                .ok_or_else(|| ColonyError::UnsupportedFormat("buffer size mismatch".into()))?;
            buf.save(path)?;
        }
    }
    Ok(())
}
