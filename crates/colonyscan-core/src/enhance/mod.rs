//! Enhancement operations: they reshape the disposable enhanced grayscale
//! and must leave the canonical gray and color planes untouched.

pub mod gaussian;

use crate::error::Result;
use crate::image::Image;
use crate::ops::{Operation, OperationKind, ParamValue, Params};
use gaussian::gaussian_blur_array;

/// Gaussian smoothing of the enhanced grayscale, for noise suppression
/// ahead of thresholding.
#[derive(Clone, Debug)]
pub struct GaussianSmooth {
    pub sigma: f32,
}

impl Default for GaussianSmooth {
    fn default() -> Self {
        Self { sigma: 2.0 }
    }
}

impl Operation for GaussianSmooth {
    fn name(&self) -> &'static str {
        "GaussianSmooth"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Enhancement
    }

    fn configured_parameters(&self) -> Params {
        Params::new().with("sigma", ParamValue::Float(self.sigma as f64))
    }

    fn operate(&self, image: &mut Image, params: &Params) -> Result<()> {
        let sigma = params.get_float(self.name(), "sigma")? as f32;
        let enh = image.enh_gray().copy()?;
        let blurred = gaussian_blur_array(&enh, sigma);
        image.enh_gray_mut().set(&blurred)
    }
}

/// Percentile contrast stretch of the enhanced grayscale: values at or
/// below the low percentile map to 0, at or above the high percentile to 1.
#[derive(Clone, Debug)]
pub struct ContrastStretch {
    pub low_percentile: f32,
    pub high_percentile: f32,
}

impl Default for ContrastStretch {
    fn default() -> Self {
        Self {
            low_percentile: 2.0,
            high_percentile: 98.0,
        }
    }
}

impl Operation for ContrastStretch {
    fn name(&self) -> &'static str {
        "ContrastStretch"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Enhancement
    }

    fn configured_parameters(&self) -> Params {
        Params::new()
            .with("low_percentile", ParamValue::Float(self.low_percentile as f64))
            .with(
                "high_percentile",
                ParamValue::Float(self.high_percentile as f64),
            )
    }

    fn operate(&self, image: &mut Image, params: &Params) -> Result<()> {
        let name = self.name();
        let low_pct = params.get_float(name, "low_percentile")? as f32;
        let high_pct = params.get_float(name, "high_percentile")? as f32;

        let enh = image.enh_gray().copy()?;
        let mut sorted: Vec<f32> = enh.iter().copied().collect();
        sorted.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let low = percentile(&sorted, low_pct);
        let high = percentile(&sorted, high_pct);
        let span = high - low;

        let stretched = if span > f32::EPSILON {
            enh.mapv(|v| ((v - low) / span).clamp(0.0, 1.0))
        } else {
            enh.mapv(|_| 0.0)
        };
        image.enh_gray_mut().set(&stretched)
    }
}

fn percentile(sorted: &[f32], pct: f32) -> f32 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((pct / 100.0) * (sorted.len() - 1) as f32).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
