mod common;

use approx::assert_abs_diff_eq;
use ndarray::{Array2, Array3};

use colonyscan_core::error::ColonyError;
use colonyscan_core::image::metadata::{keys, MetaValue};
use colonyscan_core::image::Image;

#[test]
fn format_detection_from_rank_and_channels() {
    let gray = Image::from_array(Array2::<u8>::zeros((4, 6))).unwrap();
    assert_eq!(
        gray.metadata().get(keys::IMAGE_FORMAT).unwrap(),
        &MetaValue::Str("Grayscale".into())
    );
    assert!(gray.color().is_empty());

    let single = Image::from_array(Array3::<u8>::zeros((4, 6, 1))).unwrap();
    assert_eq!(
        single.metadata().get(keys::IMAGE_FORMAT).unwrap(),
        &MetaValue::Str("Grayscale (single channel)".into())
    );
    assert_eq!(single.shape(), (4, 6));

    let rgb = Image::from_array(Array3::<u8>::zeros((4, 6, 3))).unwrap();
    assert_eq!(
        rgb.metadata().get(keys::IMAGE_FORMAT).unwrap(),
        &MetaValue::Str("RGB".into())
    );
    assert!(!rgb.color().is_empty());

    assert!(matches!(
        Image::from_array(Array3::<u8>::zeros((4, 6, 5))),
        Err(ColonyError::UnsupportedFormat(_))
    ));
}

#[test]
fn bit_depth_inferred_once_and_immutable() {
    let mut img = Image::from_array(Array2::<u8>::zeros((4, 4))).unwrap();
    assert_eq!(img.bit_depth(), Some(8));

    // A second set with a different dtype does not change the depth.
    img.set_image(Array2::<u16>::zeros((4, 4))).unwrap();
    assert_eq!(img.bit_depth(), Some(8));

    let img16 = Image::from_array(Array2::<f32>::zeros((4, 4))).unwrap();
    assert_eq!(img16.bit_depth(), Some(16));
}

#[test]
fn float_color_scaled_to_bit_depth() {
    // 4x4 of 0.5 everywhere on an 8-bit image: stored value is 0.5 * 255.
    let mut img = Image::with_bit_depth("plate", 8).unwrap();
    img.set_image(Array3::<f32>::from_elem((4, 4, 3), 0.5)).unwrap();

    assert_eq!(img.bit_depth(), Some(8));
    let color = img.color().copy().unwrap();
    let stored = color[[0, 0, 0]];
    assert!(
        stored == 127 || stored == 128,
        "expected 127 or 128, got {stored}"
    );
    assert_abs_diff_eq!(img.gray().get().unwrap()[[2, 2]], 0.5, epsilon = 0.01);
}

#[test]
fn rgba_is_composited_over_white() {
    let mut rgba = Array3::<u8>::zeros((2, 2, 4));
    // Fully transparent pixel reads as white; opaque black stays black.
    rgba[[0, 0, 3]] = 0;
    rgba[[1, 1, 3]] = 255;
    let img = Image::from_array(rgba).unwrap();
    let color = img.color().copy().unwrap();
    assert_eq!(color[[0, 0, 0]], 255);
    assert_eq!(color[[1, 1, 0]], 0);
}

#[test]
fn integer_gray_is_normalized() {
    let mut data = Array2::<u8>::zeros((3, 3));
    data[[1, 1]] = 255;
    let img = Image::from_array(data).unwrap();
    assert_abs_diff_eq!(img.gray().get().unwrap()[[1, 1]], 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(img.gray().get().unwrap()[[0, 0]], 0.0, epsilon = 1e-6);
}

#[test]
fn raster_shapes_stay_equal_after_writes() {
    let mut img = common::gray_plate("p", 8, 10, 0.2);
    assert_eq!(img.shape(), (8, 10));
    assert_eq!(img.enh_gray().shape(), (8, 10));
    assert_eq!(img.objmap().shape(), (8, 10));

    // Full gray replacement with a new shape resets everything to it.
    img.gray_mut().set(&Array2::<f32>::zeros((5, 7))).unwrap();
    assert_eq!(img.shape(), (5, 7));
    assert_eq!(img.enh_gray().shape(), (5, 7));
    assert_eq!(img.objmap().shape(), (5, 7));
}

#[test]
fn gray_write_resets_enh_and_objmap() {
    let mut img = common::gray_plate("p", 10, 10, 0.2);
    img.enh_gray_mut().fill_window(0..10, 0..10, 0.7).unwrap();
    img.objmask_mut().fill_window(2..4, 2..4, true).unwrap();
    assert_eq!(img.num_objects(), 1);

    img.gray_mut().fill_window(5..6, 5..6, 0.9).unwrap();

    // enh_gray is bit-for-bit the new gray, and the map is background-only.
    assert_eq!(
        img.enh_gray().get().unwrap(),
        img.gray().get().unwrap()
    );
    assert_eq!(img.num_objects(), 0);
    assert!(img.objmap().is_blank());
}

#[test]
fn enh_write_resets_objmap_but_not_gray() {
    let mut img = common::gray_plate("p", 10, 10, 0.2);
    img.objmask_mut().fill_window(2..4, 2..4, true).unwrap();
    assert_eq!(img.num_objects(), 1);

    let gray_before = img.gray().copy().unwrap();
    img.enh_gray_mut().fill_window(0..3, 0..3, 0.8).unwrap();

    assert_eq!(img.gray().get().unwrap(), &gray_before);
    assert_eq!(img.num_objects(), 0);
}

#[test]
fn gray_range_violation_is_rejected_without_partial_write() {
    let mut img = common::gray_plate("p", 6, 6, 0.2);
    img.objmask_mut().fill_window(1..3, 1..3, true).unwrap();
    let gray_before = img.gray().copy().unwrap();

    let bad = Array2::<f32>::from_elem((2, 2), 1.5);
    assert!(matches!(
        img.gray_mut().set_window(0..2, 0..2, &bad),
        Err(ColonyError::RangeError(_))
    ));

    // Nothing moved: gray untouched, objects still present.
    assert_eq!(img.gray().get().unwrap(), &gray_before);
    assert_eq!(img.num_objects(), 1);
}

#[test]
fn shape_mismatch_is_rejected() {
    let mut img = common::gray_plate("p", 6, 6, 0.2);
    let wrong = Array2::<f32>::zeros((3, 3));
    assert!(matches!(
        img.gray_mut().set_window(0..2, 0..2, &wrong),
        Err(ColonyError::ShapeMismatch { .. })
    ));
}

#[test]
fn set_image_clears_object_map() {
    let mut img = common::gray_plate("p", 6, 6, 0.2);
    img.objmask_mut().fill_window(1..4, 1..4, true).unwrap();
    assert_eq!(img.num_objects(), 1);

    img.set_image(Array2::<u8>::zeros((6, 6))).unwrap();
    assert_eq!(img.num_objects(), 0);
}

#[test]
fn deep_copy_is_independent_and_keeps_own_uuid() {
    let mut original = common::plate_with_colonies("orig", 20, 20, &[(4, 4, 5)]);
    original.metadata_mut().set("Strain", "BY4741").unwrap();

    let mut copy = original.copy();
    assert_eq!(copy.name(), "orig");
    assert_eq!(
        copy.metadata().get("Strain").unwrap(),
        &MetaValue::Str("BY4741".into())
    );
    assert_ne!(copy.metadata().uuid(), original.metadata().uuid());

    // Mutating the copy leaves the original alone.
    copy.gray_mut().fill_window(0..20, 0..20, 0.0).unwrap();
    assert_abs_diff_eq!(original.gray().get().unwrap()[[5, 5]], 0.9, epsilon = 1e-6);
}

#[test]
fn empty_image_reads_fail() {
    let img = Image::new();
    assert!(img.is_empty());
    assert!(matches!(img.gray().get(), Err(ColonyError::EmptyImage)));
    assert!(matches!(
        img.objmap().dense(),
        Err(ColonyError::EmptyImage)
    ));
    assert!(matches!(
        img.objects().info(true),
        Err(ColonyError::EmptyImage)
    ));
}

#[test]
fn crop_carries_rasters_and_marks_type() {
    let img = common::plate_with_colonies("parent", 20, 20, &[(4, 4, 6)]);
    let crop = img.crop(2..12, 2..12).unwrap();
    assert_eq!(crop.shape(), (10, 10));
    assert_eq!(
        crop.metadata().get(keys::IMAGE_TYPE).unwrap(),
        &MetaValue::Str("Crop".into())
    );
    assert_eq!(
        crop.metadata().get(keys::PARENT_IMAGE_NAME).unwrap(),
        &MetaValue::Str("parent".into())
    );
    assert_abs_diff_eq!(crop.gray().get().unwrap()[[3, 3]], 0.9, epsilon = 1e-6);
}
