mod common;

use ndarray::Array2;

use colonyscan_core::error::ColonyError;
use colonyscan_core::image::labeling::Connectivity;
use colonyscan_core::image::metadata::MetaValue;
use colonyscan_core::image::objects::columns;

#[test]
fn mask_write_labels_connected_components() {
    // 10x10 all-zero grayscale; paint a 3x3 mask block.
    let mut img = common::gray_plate("p", 10, 10, 0.0);
    img.objmask_mut().fill_window(2..5, 2..5, true).unwrap();

    assert_eq!(img.objects().len(), 1);
    let map = img.objmap().dense().unwrap();
    assert_eq!(map[[3, 3]], 1);
    assert_eq!(map[[0, 0]], 0);

    let info = img.objects().info(false).unwrap();
    assert_eq!(info.n_rows(), 1);
    assert_eq!(info.int_value(1, columns::AREA), Some(9));
}

#[test]
fn mask_write_replaces_labels_entirely() {
    let mut img = common::gray_plate("p", 12, 12, 0.0);

    // Two blobs -> labels 1 and 2 in scan order.
    let mut mask = Array2::<bool>::from_elem((12, 12), false);
    for row in 1..3 {
        for col in 1..3 {
            mask[[row, col]] = true;
        }
    }
    for row in 8..11 {
        for col in 8..11 {
            mask[[row, col]] = true;
        }
    }
    img.objmask_mut().set(&mask).unwrap();
    assert_eq!(img.objmap().labels(), vec![1, 2]);

    // Clearing one blob through the mask relabels the survivor to 1.
    img.objmask_mut().fill_window(1..3, 1..3, false).unwrap();
    assert_eq!(img.objmap().labels(), vec![1]);
    assert_eq!(img.objmap().dense().unwrap()[[9, 9]], 1);
}

#[test]
fn objmap_write_preserves_given_labels() {
    let mut img = common::gray_plate("p", 8, 8, 0.0);
    let mut map = Array2::<u32>::zeros((8, 8));
    map[[1, 1]] = 7;
    map[[5, 5]] = 3;
    img.objmap_mut().set(&map).unwrap();

    // Labels are taken as given, not renumbered.
    assert_eq!(img.objmap().labels(), vec![3, 7]);

    // Relabeling compacts them via connected components.
    img.objmap_mut().relabel(Connectivity::Eight).unwrap();
    assert_eq!(img.objmap().labels(), vec![1, 2]);
}

#[test]
fn objmap_scalar_write_is_uniform_fill() {
    let mut img = common::gray_plate("p", 8, 8, 0.0);
    img.objmap_mut().fill_window(2..4, 2..6, 5).unwrap();
    let map = img.objmap().dense().unwrap();
    assert_eq!(map[[2, 2]], 5);
    assert_eq!(map[[3, 5]], 5);
    assert_eq!(img.objects().len(), 1);
}

#[test]
fn info_row_count_matches_len_and_unique_labels() {
    let mut img = common::gray_plate("p", 20, 20, 0.0);
    img.objmask_mut().fill_window(1..4, 1..4, true).unwrap();
    img.objmask_mut().fill_window(10..14, 10..14, true).unwrap();
    img.objmask_mut().fill_window(16..18, 3..6, true).unwrap();

    let info = img.objects().info(false).unwrap();
    assert_eq!(info.n_rows(), img.objects().len());
    assert_eq!(info.n_rows(), img.objmap().labels().len());
    assert_eq!(info.labels(), &[1, 2, 3]);
}

#[test]
fn info_bbox_and_centroid_columns() {
    let mut img = common::gray_plate("p", 10, 10, 0.0);
    img.objmask_mut().fill_window(2..5, 4..8, true).unwrap();

    let info = img.objects().info(false).unwrap();
    assert_eq!(info.int_value(1, columns::BBOX_MIN_RR), Some(2));
    assert_eq!(info.int_value(1, columns::BBOX_MAX_RR), Some(4));
    assert_eq!(info.int_value(1, columns::BBOX_MIN_CC), Some(4));
    assert_eq!(info.int_value(1, columns::BBOX_MAX_CC), Some(7));
    assert_eq!(info.float_value(1, columns::BBOX_CENTER_RR), Some(3.0));
    assert_eq!(info.float_value(1, columns::BBOX_CENTER_CC), Some(5.5));
}

#[test]
fn info_can_merge_metadata_columns() {
    let mut img = common::gray_plate("plate_a", 10, 10, 0.0);
    img.metadata_mut().set("Medium", "YPD").unwrap();
    img.objmask_mut().fill_window(2..5, 2..5, true).unwrap();

    let info = img.objects().info(true).unwrap();
    assert_eq!(info.str_value(1, "ImageName"), Some("plate_a"));
    assert_eq!(info.str_value(1, "Medium"), Some("YPD"));

    let bare = img.objects().info(false).unwrap();
    assert!(!bare.has_column("ImageName"));
}

#[test]
fn object_crops_isolate_one_label() {
    let mut img = common::plate_with_colonies("parent", 20, 20, &[(2, 2, 3), (10, 10, 4)]);
    img.objmask_mut().fill_window(2..5, 2..5, true).unwrap();
    img.objmask_mut().fill_window(10..14, 10..14, true).unwrap();

    let crops: Vec<_> = img.objects().iter().collect();
    assert_eq!(crops.len(), 2);

    let first = &crops[0];
    assert_eq!(first.shape(), (3, 3));
    assert_eq!(
        first.metadata().get("ImageType").unwrap(),
        &MetaValue::Str("Object".into())
    );
    assert_eq!(first.name(), "parent_obj1");
    // Only its own label survives in the crop.
    assert_eq!(first.objmap().labels(), vec![1]);

    let second = &crops[1];
    assert_eq!(second.shape(), (4, 4));
    assert_eq!(second.objmap().labels(), vec![2]);
}

#[test]
fn objects_view_is_never_stale() {
    let mut img = common::gray_plate("p", 10, 10, 0.0);
    img.objmask_mut().fill_window(1..3, 1..3, true).unwrap();
    assert_eq!(img.objects().len(), 1);

    img.objmask_mut().fill_window(6..9, 6..9, true).unwrap();
    assert_eq!(img.objects().len(), 2);

    img.objmap_mut().reset();
    assert_eq!(img.objects().len(), 0);
    let info = img.objects().info(false).unwrap();
    assert_eq!(info.n_rows(), 0);
    assert!(info.has_column(columns::AREA));
}

#[test]
fn connectivity_controls_component_count() {
    // Two squares touching only at a corner.
    let mut mask = Array2::<bool>::from_elem((8, 8), false);
    for row in 0..3 {
        for col in 0..3 {
            mask[[row, col]] = true;
        }
    }
    for row in 3..6 {
        for col in 3..6 {
            mask[[row, col]] = true;
        }
    }

    let mut img = common::gray_plate("p", 8, 8, 0.0);
    img.objmask_mut()
        .with_connectivity(Connectivity::Four)
        .set(&mask)
        .unwrap();
    assert_eq!(img.objects().len(), 2);

    img.objmask_mut()
        .with_connectivity(Connectivity::Eight)
        .set(&mask)
        .unwrap();
    assert_eq!(img.objects().len(), 1);
}

#[test]
fn positional_access_errors() {
    let img = common::gray_plate("p", 6, 6, 0.0);
    assert!(matches!(
        img.objects().get(0),
        Err(ColonyError::NoObjects)
    ));

    let mut img = common::gray_plate("p", 6, 6, 0.0);
    img.objmask_mut().fill_window(1..3, 1..3, true).unwrap();
    assert!(matches!(
        img.objects().get(5),
        Err(ColonyError::ObjectIndexOutOfRange { index: 5, total: 1 })
    ));
    assert!(matches!(
        img.objects().crop(9),
        Err(ColonyError::UnknownLabel(9))
    ));
}
