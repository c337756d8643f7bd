//! Per-colony measurement extractors. Each produces a table keyed by object
//! label; the pipeline engine merges them on that index.

use std::f64::consts::PI;

use crate::error::Result;
use crate::image::Image;
use crate::ops::{Measure, Params};
use crate::table::MeasurementTable;

/// Size descriptors: pixel area, equivalent circular diameter, and how much
/// of the bounding box the colony fills.
#[derive(Clone, Debug, Default)]
pub struct MeasureSize;

impl Measure for MeasureSize {
    fn name(&self) -> &'static str {
        "MeasureSize"
    }

    fn measure(&self, image: &Image, _params: &Params) -> Result<MeasurementTable> {
        let stats = image.objects().stats()?;
        let mut table = MeasurementTable::with_labels(stats.iter().map(|r| r.label).collect());

        table.add_int_column("Size_Area", stats.iter().map(|r| r.area as i64).collect())?;
        table.add_float_column(
            "Size_EquivDiameter",
            stats
                .iter()
                .map(|r| 2.0 * (r.area as f64 / PI).sqrt())
                .collect(),
        )?;
        table.add_float_column(
            "Size_BboxFill",
            stats
                .iter()
                .map(|r| r.area as f64 / (r.bbox_height() * r.bbox_width()) as f64)
                .collect(),
        )?;
        Ok(table)
    }
}

/// Intensity descriptors over the canonical grayscale within each colony.
#[derive(Clone, Debug, Default)]
pub struct MeasureIntensity;

impl Measure for MeasureIntensity {
    fn name(&self) -> &'static str {
        "MeasureIntensity"
    }

    fn measure(&self, image: &Image, _params: &Params) -> Result<MeasurementTable> {
        let labels = image.objmap().labels();
        let mut table = MeasurementTable::with_labels(labels.clone());
        if labels.is_empty() {
            table.add_float_column("Intensity_Mean", vec![])?;
            table.add_float_column("Intensity_Min", vec![])?;
            table.add_float_column("Intensity_Max", vec![])?;
            table.add_float_column("Intensity_Std", vec![])?;
            return Ok(table);
        }

        let gray_raster = image.gray();
        let gray = gray_raster.get()?;
        let map = image.objmap().dense()?;

        // One accumulation pass over the raster for all labels.
        let index_of: std::collections::HashMap<u32, usize> = labels
            .iter()
            .enumerate()
            .map(|(i, &l)| (l, i))
            .collect();
        let n = labels.len();
        let mut count = vec![0usize; n];
        let mut sum = vec![0.0f64; n];
        let mut sum_sq = vec![0.0f64; n];
        let mut min = vec![f64::MAX; n];
        let mut max = vec![f64::MIN; n];

        for (idx, &label) in map.indexed_iter() {
            if label == 0 {
                continue;
            }
            let i = index_of[&label];
            let v = gray[idx] as f64;
            count[i] += 1;
            sum[i] += v;
            sum_sq[i] += v * v;
            min[i] = min[i].min(v);
            max[i] = max[i].max(v);
        }

        let mean: Vec<f64> = (0..n).map(|i| sum[i] / count[i] as f64).collect();
        let std: Vec<f64> = (0..n)
            .map(|i| {
                let m = mean[i];
                (sum_sq[i] / count[i] as f64 - m * m).max(0.0).sqrt()
            })
            .collect();

        table.add_float_column("Intensity_Mean", mean)?;
        table.add_float_column("Intensity_Min", min)?;
        table.add_float_column("Intensity_Max", max)?;
        table.add_float_column("Intensity_Std", std)?;
        Ok(table)
    }
}
