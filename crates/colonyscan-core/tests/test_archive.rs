mod common;

use ndarray::Array3;
use tempfile::TempDir;

use colonyscan_core::error::ColonyError;
use colonyscan_core::image::metadata::MetaValue;
use colonyscan_core::image::Image;
use colonyscan_core::io::archive::{ArchiveReader, ArchiveWriter};
use colonyscan_core::io::table_codec::{append_rows, decode_table, encode_table};
use colonyscan_core::table::{Column, MeasurementTable};

#[test]
fn image_round_trips_through_archive() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("set.cset");

    let mut original = common::plate_with_colonies("plate_a", 24, 24, &[(4, 4, 5)]);
    original.metadata_mut().set("Medium", "YPD").unwrap();
    original.metadata_mut().set("Replicate", 3i64).unwrap();
    original.objmask_mut().fill_window(4..9, 4..9, true).unwrap();

    let mut writer = ArchiveWriter::create(&path, 4).unwrap();
    writer.write_image("plate_a", &original).unwrap();
    writer.finalize().unwrap();

    let reader = ArchiveReader::open(&path).unwrap();
    let loaded = reader.image("plate_a").unwrap();

    assert_eq!(loaded.name(), "plate_a");
    assert_eq!(loaded.shape(), (24, 24));
    assert_eq!(loaded.bit_depth(), Some(16));
    assert_eq!(loaded.gray().get().unwrap(), original.gray().get().unwrap());
    assert_eq!(
        loaded.enh_gray().get().unwrap(),
        original.enh_gray().get().unwrap()
    );
    assert_eq!(
        loaded.objmap().dense().unwrap(),
        original.objmap().dense().unwrap()
    );
    assert_eq!(
        loaded.metadata().get("Medium").unwrap(),
        &MetaValue::Str("YPD".into())
    );
    assert_eq!(
        loaded.metadata().get("Replicate").unwrap(),
        &MetaValue::Int(3)
    );
    assert_eq!(loaded.metadata().uuid(), original.metadata().uuid());
}

#[test]
fn color_image_round_trips() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("set.cset");

    let mut rgb = Array3::<u8>::zeros((6, 8, 3));
    rgb[[2, 3, 0]] = 200;
    rgb[[2, 3, 1]] = 100;
    let original = Image::from_array_named("rgb_plate", rgb).unwrap();

    let mut writer = ArchiveWriter::create(&path, 1).unwrap();
    writer.write_image("rgb_plate", &original).unwrap();
    writer.finalize().unwrap();

    let loaded = ArchiveReader::open(&path).unwrap().image("rgb_plate").unwrap();
    assert_eq!(
        loaded.color().copy().unwrap(),
        original.color().copy().unwrap()
    );
    assert_eq!(loaded.bit_depth(), Some(8));
}

#[test]
fn overwrite_returns_newest_payload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("set.cset");

    let first = common::gray_plate("p", 8, 8, 0.2);
    let second = common::gray_plate("p", 8, 8, 0.7);

    let mut writer = ArchiveWriter::create(&path, 2).unwrap();
    writer.write_image("p", &first).unwrap();
    writer.write_image("p", &second).unwrap();
    assert_eq!(writer.len(), 1, "overwrite must not consume a second slot");
    writer.finalize().unwrap();

    let reader = ArchiveReader::open(&path).unwrap();
    assert_eq!(reader.len(), 1);
    let loaded = reader.image("p").unwrap();
    assert!((loaded.gray().get().unwrap()[[0, 0]] - 0.7).abs() < 1e-6);
}

#[test]
fn capacity_exhaustion_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("set.cset");

    let mut writer = ArchiveWriter::create(&path, 1).unwrap();
    writer
        .write_image("a", &common::gray_plate("a", 4, 4, 0.1))
        .unwrap();
    assert!(matches!(
        writer.write_image("b", &common::gray_plate("b", 4, 4, 0.1)),
        Err(ColonyError::CapacityExhausted(1))
    ));
}

#[test]
fn missing_image_and_bad_magic_are_detected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("set.cset");

    let mut writer = ArchiveWriter::create(&path, 1).unwrap();
    writer
        .write_image("a", &common::gray_plate("a", 4, 4, 0.1))
        .unwrap();
    writer.finalize().unwrap();

    let reader = ArchiveReader::open(&path).unwrap();
    assert!(matches!(
        reader.image("nope"),
        Err(ColonyError::ImageNotFound(_))
    ));

    let bogus = dir.path().join("bogus.cset");
    std::fs::write(&bogus, b"definitely not an archive").unwrap();
    assert!(matches!(
        ArchiveReader::open(&bogus),
        Err(ColonyError::InvalidArchive(_))
    ));
}

#[test]
fn measurements_written_per_image() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("set.cset");

    let mut table = MeasurementTable::with_labels(vec![1, 2]);
    table.add_int_column("Size_Area", vec![25, 36]).unwrap();

    let mut writer = ArchiveWriter::create(&path, 1).unwrap();
    writer
        .write_image("a", &common::gray_plate("a", 4, 4, 0.1))
        .unwrap();
    writer.write_measurements("a", &table).unwrap();
    writer.finalize().unwrap();

    let reader = ArchiveReader::open(&path).unwrap();
    let loaded = reader.measurements("a").unwrap().expect("table present");
    assert_eq!(loaded, table);
    assert!(reader.payload_size("a").unwrap() > 0);
}

#[test]
fn table_codec_preserves_dtypes_and_nulls() {
    let mut table = MeasurementTable::with_labels(vec![1, 2, 3]);
    table
        .add_column(
            "f",
            Column::Float(vec![Some(1.5), None, Some(-2.25)]),
        )
        .unwrap();
    table
        .add_column("i", Column::Int(vec![Some(-7), Some(0), None]))
        .unwrap();
    table
        .add_column("b", Column::Bool(vec![Some(true), None, Some(false)]))
        .unwrap();
    table
        .add_column(
            "s",
            Column::Str(vec![Some("colony".into()), Some("".into()), None]),
        )
        .unwrap();

    let encoded = encode_table(&table, 0).unwrap();
    let decoded = decode_table(&encoded).unwrap();
    assert_eq!(decoded, table);
}

#[test]
fn table_append_fills_reserved_capacity() {
    let mut base = MeasurementTable::with_labels(vec![1, 2]);
    base.add_float_column("x", vec![1.0, 2.0]).unwrap();
    base.add_str_column("tag", vec!["aa".into(), "bb".into()])
        .unwrap();

    // Reserve room for two more rows.
    let mut encoded = encode_table(&base, 2).unwrap();
    let before_len = encoded.len();

    let mut extra = MeasurementTable::with_labels(vec![3]);
    extra.add_float_column("x", vec![3.0]).unwrap();
    extra.add_str_column("tag", vec!["cc".into()]).unwrap();
    append_rows(&mut encoded, &extra).unwrap();

    // Append is in place: the buffer did not grow.
    assert_eq!(encoded.len(), before_len);

    let decoded = decode_table(&encoded).unwrap();
    assert_eq!(decoded.n_rows(), 3);
    assert_eq!(decoded.float_value(3, "x"), Some(3.0));
    assert_eq!(decoded.str_value(3, "tag"), Some("cc"));

    // One more row fits, then the reserved capacity is gone.
    let mut last = MeasurementTable::with_labels(vec![4]);
    last.add_float_column("x", vec![4.0]).unwrap();
    last.add_str_column("tag", vec!["dd".into()]).unwrap();
    append_rows(&mut encoded, &last).unwrap();

    let mut overflow = MeasurementTable::with_labels(vec![5]);
    overflow.add_float_column("x", vec![5.0]).unwrap();
    overflow.add_str_column("tag", vec!["ee".into()]).unwrap();
    assert!(matches!(
        append_rows(&mut encoded, &overflow),
        Err(ColonyError::Table(_))
    ));
}

#[test]
fn reader_lists_names_and_len_vs_capacity() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("set.cset");

    let mut writer = ArchiveWriter::create(&path, 8).unwrap();
    for name in ["a", "b", "c"] {
        writer
            .write_image(name, &common::gray_plate(name, 4, 4, 0.1))
            .unwrap();
    }
    writer.finalize().unwrap();

    let reader = ArchiveReader::open(&path).unwrap();
    assert_eq!(reader.capacity(), 8);
    assert_eq!(reader.len(), 3);
    assert_eq!(reader.names(), vec!["a", "b", "c"]);
}
