mod common;

use ndarray::Array2;

use colonyscan_core::detect::threshold::ThresholdMethod;
use colonyscan_core::detect::ThresholdDetector;
use colonyscan_core::enhance::GaussianSmooth;
use colonyscan_core::error::ColonyError;
use colonyscan_core::image::labeling::Connectivity;
use colonyscan_core::image::Image;
use colonyscan_core::measure::{MeasureIntensity, MeasureSize};
use colonyscan_core::ops::grid::{GridGate, GridLayout};
use colonyscan_core::ops::{Operation, OperationKind, ParamValue, Params};
use colonyscan_core::pipeline::{PipelineConfig, PipelineSpec};
use colonyscan_core::refine::SmallObjectFilter;
use colonyscan_core::table::MergePolicy;

fn detector() -> ThresholdDetector {
    ThresholdDetector {
        method: ThresholdMethod::Fixed(0.5),
        sigma_multiplier: 3.0,
        opening: false,
        connectivity: Connectivity::Eight,
    }
}

#[test]
fn apply_returns_processed_copy_and_leaves_input_untouched() {
    let img = common::plate_with_colonies("p", 32, 32, &[(4, 4, 5), (20, 20, 6)]);

    let pipeline = PipelineSpec::builder()
        .op(detector())
        .measure(MeasureSize)
        .build();

    let processed = pipeline.apply(&img).unwrap();
    assert_eq!(processed.num_objects(), 2);
    assert_eq!(img.num_objects(), 0, "caller's image must stay untouched");
}

#[test]
fn stages_execute_in_kind_order_regardless_of_insertion() {
    // Detector added before the enhancement; the build step orders by kind.
    let pipeline = PipelineSpec::builder()
        .op(detector())
        .op(GaussianSmooth { sigma: 1.0 })
        .build();

    let kinds: Vec<OperationKind> = pipeline.steps().iter().map(|s| s.kind()).collect();
    assert_eq!(
        kinds,
        vec![OperationKind::Enhancement, OperationKind::Detection]
    );
}

#[test]
fn measure_merges_on_label_with_full_outer_join() {
    let img = common::plate_with_colonies("p", 32, 32, &[(4, 4, 5), (20, 20, 6)]);

    let pipeline = PipelineSpec::builder()
        .op(detector())
        .measure(MeasureSize)
        .measure(MeasureIntensity)
        .build();

    let (_, table) = pipeline.apply_and_measure(&img).unwrap();
    assert_eq!(table.n_rows(), 2);
    assert!(table.has_column("Area"));
    assert!(table.has_column("Size_Area"));
    assert!(table.has_column("Intensity_Mean"));
    assert_eq!(table.int_value(1, "Size_Area"), Some(25));
    assert_eq!(table.int_value(2, "Size_Area"), Some(36));
    let mean = table.float_value(1, "Intensity_Mean").unwrap();
    assert!((mean - 0.9).abs() < 1e-5);
}

#[test]
fn measurer_order_changes_column_order_not_values() {
    let img = common::plate_with_colonies("p", 32, 32, &[(4, 4, 5)]);

    let a = PipelineSpec::builder()
        .op(detector())
        .measure(MeasureSize)
        .measure(MeasureIntensity)
        .build();
    let b = PipelineSpec::builder()
        .op(detector())
        .measure(MeasureIntensity)
        .measure(MeasureSize)
        .build();

    let (_, ta) = a.apply_and_measure(&img).unwrap();
    let (_, tb) = b.apply_and_measure(&img).unwrap();

    let mut cols_a = ta.column_names();
    let mut cols_b = tb.column_names();
    cols_a.sort_unstable();
    cols_b.sort_unstable();
    assert_eq!(cols_a, cols_b);
    for col in ["Size_Area", "Size_EquivDiameter", "Intensity_Mean"] {
        assert_eq!(ta.float_value(1, col), tb.float_value(1, col), "{col}");
    }
    assert_eq!(ta.int_value(1, "Size_Area"), tb.int_value(1, "Size_Area"));
}

#[test]
fn detector_plus_measurer_pipeline_is_deterministic() {
    let img = common::plate_with_colonies("p", 40, 40, &[(5, 5, 6), (25, 12, 7)]);

    let pipeline = PipelineSpec::builder()
        .op(detector())
        .op(SmallObjectFilter {
            min_area: 4,
            connectivity: Connectivity::Eight,
        })
        .measure(MeasureSize)
        .measure(MeasureIntensity)
        .build();

    let (_, first) = pipeline.apply_and_measure(&img).unwrap();
    let (_, second) = pipeline.apply_and_measure(&img).unwrap();
    assert_eq!(first, second);
}

#[test]
fn zero_objects_yield_empty_but_well_formed_table() {
    let img = common::gray_plate("blank", 16, 16, 0.1);

    let pipeline = PipelineSpec::builder()
        .op(detector())
        .measure(MeasureSize)
        .measure(MeasureIntensity)
        .build();

    let (processed, table) = pipeline.apply_and_measure(&img).unwrap();
    assert_eq!(processed.num_objects(), 0);
    assert_eq!(table.n_rows(), 0);
    assert!(table.has_column("Area"));
    assert!(table.has_column("Size_Area"));
    assert!(table.has_column("Intensity_Mean"));
}

#[test]
fn failing_step_reports_position_and_operation() {
    struct FailingDetector;
    impl Operation for FailingDetector {
        fn name(&self) -> &'static str {
            "FailingDetector"
        }
        fn kind(&self) -> OperationKind {
            OperationKind::Detection
        }
        fn configured_parameters(&self) -> Params {
            Params::new()
        }
        fn operate(&self, _image: &mut Image, _params: &Params) -> colonyscan_core::error::Result<()> {
            Err(ColonyError::NoObjects)
        }
    }

    let img = common::gray_plate("p", 16, 16, 0.1);
    let pipeline = PipelineSpec::builder()
        .op(GaussianSmooth { sigma: 1.0 })
        .op(FailingDetector)
        .build();

    match pipeline.apply(&img) {
        Err(ColonyError::Pipeline {
            step, operation, ..
        }) => {
            assert_eq!(step, 1);
            assert_eq!(operation, "FailingDetector");
        }
        other => panic!("expected pipeline error, got {other:?}"),
    }
}

#[test]
fn missing_parameter_identifies_operation_and_name() {
    // configured_parameters forgets the name `operate` asks for.
    struct Misconfigured;
    impl Operation for Misconfigured {
        fn name(&self) -> &'static str {
            "Misconfigured"
        }
        fn kind(&self) -> OperationKind {
            OperationKind::Enhancement
        }
        fn configured_parameters(&self) -> Params {
            Params::new()
        }
        fn operate(&self, _image: &mut Image, params: &Params) -> colonyscan_core::error::Result<()> {
            let _sigma = params.get_float(self.name(), "sigma")?;
            Ok(())
        }
    }

    let img = common::gray_plate("p", 8, 8, 0.1);
    let pipeline = PipelineSpec::builder().op(Misconfigured).build();
    match pipeline.apply(&img) {
        Err(ColonyError::Pipeline { source, .. }) => match *source {
            ColonyError::MissingParameter {
                operation,
                parameter,
            } => {
                assert_eq!(operation, "Misconfigured");
                assert_eq!(parameter, "sigma");
            }
            other => panic!("expected MissingParameter, got {other:?}"),
        },
        other => panic!("expected pipeline error, got {other:?}"),
    }
}

#[test]
fn enhancement_touching_gray_violates_contract() {
    struct RogueEnhancer;
    impl Operation for RogueEnhancer {
        fn name(&self) -> &'static str {
            "RogueEnhancer"
        }
        fn kind(&self) -> OperationKind {
            OperationKind::Enhancement
        }
        fn configured_parameters(&self) -> Params {
            Params::new()
        }
        fn operate(&self, image: &mut Image, _params: &Params) -> colonyscan_core::error::Result<()> {
            image.gray_mut().fill_window(0..1, 0..1, 0.0)
        }
    }

    let img = common::gray_plate("p", 8, 8, 0.5);
    let result = RogueEnhancer.apply(&img);
    match result {
        Err(ColonyError::Pipeline { .. }) => panic!("should not be wrapped here"),
        Err(ColonyError::ContractViolation { operation, field }) => {
            assert_eq!(operation, "RogueEnhancer");
            assert_eq!(field, "gray");
        }
        other => panic!("expected contract violation, got {other:?}"),
    }
}

#[test]
fn grid_gate_requires_layout_metadata() {
    let img = common::plate_with_colonies("p", 24, 24, &[(4, 4, 5)]);
    let gated = GridGate::new(detector());

    assert!(matches!(
        gated.apply(&img),
        Err(ColonyError::GridImageRequired)
    ));

    let mut gridded = img.copy();
    GridLayout { rows: 8, cols: 12 }.store(&mut gridded).unwrap();
    let processed = gated.apply(&gridded).unwrap();
    assert_eq!(processed.num_objects(), 1);
    assert_eq!(
        GridLayout::from_metadata(&gridded).unwrap(),
        GridLayout { rows: 8, cols: 12 }
    );
}

#[test]
fn frozen_params_are_what_operate_sees() {
    let det = detector();
    let params = det.configured_parameters();
    assert_eq!(
        params.get_str("ThresholdDetector", "method").unwrap(),
        "fixed"
    );
    assert_eq!(
        params
            .get_float("ThresholdDetector", "fixed_value")
            .unwrap(),
        0.5
    );

    // Operating with a doctored map uses the map, not the instance fields.
    let mut doctored = params.clone();
    doctored.insert("fixed_value", ParamValue::Float(10.0)); // above every pixel
    let mut img = common::plate_with_colonies("p", 16, 16, &[(4, 4, 5)]);
    det.operate(&mut img, &doctored).unwrap();
    assert_eq!(img.num_objects(), 0);
}

#[test]
fn config_round_trips_through_toml_and_builds() {
    let config = PipelineConfig {
        normalize: true,
        min_area: Some(9),
        drop_border: true,
        merge: MergePolicy {
            suffix: "_alt".to_string(),
        },
        ..PipelineConfig::default()
    };

    let text = serde_round_trip(&config);
    assert_eq!(text.min_area, Some(9));
    assert_eq!(text.merge.suffix, "_alt");

    let pipeline = text.build();
    // normalize + smooth + detect + small-object + border = 5 steps.
    assert_eq!(pipeline.steps().len(), 5);
    assert_eq!(pipeline.measures().len(), 2);

    let img = common::plate_with_colonies("p", 32, 32, &[(6, 6, 6)]);
    let (processed, table) = pipeline.apply_and_measure(&img).unwrap();
    assert_eq!(processed.num_objects(), 1);
    assert_eq!(table.n_rows(), 1);
}

fn serde_round_trip(config: &PipelineConfig) -> PipelineConfig {
    let json = serde_json::to_string(config).unwrap();
    serde_json::from_str(&json).unwrap()
}

#[test]
fn refiners_prune_and_relabel() {
    let mut img = common::gray_plate("p", 24, 24, 0.0);
    let mut map = Array2::<u32>::zeros((24, 24));
    // A large blob and a 2-pixel speck.
    for row in 4..10 {
        for col in 4..10 {
            map[[row, col]] = 1;
        }
    }
    map[[20, 20]] = 2;
    map[[20, 21]] = 2;
    img.objmap_mut().set(&map).unwrap();

    SmallObjectFilter {
        min_area: 4,
        connectivity: Connectivity::Eight,
    }
    .apply_inplace(&mut img)
    .unwrap();

    assert_eq!(img.objmap().labels(), vec![1]);
    assert_eq!(img.objmap().dense().unwrap()[[5, 5]], 1);
    assert_eq!(img.objmap().dense().unwrap()[[20, 20]], 0);
}
