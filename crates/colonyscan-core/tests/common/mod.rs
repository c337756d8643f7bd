use ndarray::Array2;

use colonyscan_core::batch::PlateSet;
use colonyscan_core::image::Image;

/// Build a grayscale plate image with a uniform background.
pub fn gray_plate(name: &str, h: usize, w: usize, background: f32) -> Image {
    let data = Array2::<f32>::from_elem((h, w), background);
    Image::from_array_named(name, data).expect("build gray plate")
}

/// Build a plate with bright square colonies on a dim background. Each
/// colony is given as (top, left, side).
pub fn plate_with_colonies(name: &str, h: usize, w: usize, colonies: &[(usize, usize, usize)]) -> Image {
    let mut data = Array2::<f32>::from_elem((h, w), 0.1);
    for &(top, left, side) in colonies {
        for row in top..(top + side).min(h) {
            for col in left..(left + side).min(w) {
                data[[row, col]] = 0.9;
            }
        }
    }
    Image::from_array_named(name, data).expect("build colony plate")
}

/// Create an archive-backed plate set of n synthetic colony plates, each
/// with two colonies, in a temp directory.
pub fn synthetic_set(dir: &tempfile::TempDir, n: usize) -> PlateSet {
    let images: Vec<Image> = (0..n)
        .map(|i| {
            plate_with_colonies(
                &format!("plate_{i:02}"),
                48,
                48,
                &[(8, 8, 6), (24, 30, 8)],
            )
        })
        .collect();
    let path = dir.path().join("plates.cset");
    PlateSet::create("plates", &path, &images, 0).expect("create plate set")
}
