//! Colony detectors: enhanced grayscale in, labeled object map out.

pub mod morphology;
pub mod threshold;

use tracing::debug;

use crate::error::Result;
use crate::image::labeling::{label_components, Connectivity};
use crate::image::Image;
use crate::ops::{Operation, OperationKind, ParamValue, Params};
use morphology::morphological_opening;
use threshold::{compute_threshold, ThresholdMethod};

/// Global-threshold colony detector.
///
/// Pipeline: threshold the enhanced grayscale -> optional 3x3 morphological
/// opening -> connected-component labeling into the object map.
#[derive(Clone, Debug)]
pub struct ThresholdDetector {
    pub method: ThresholdMethod,
    /// Sigma multiplier for the MeanPlusSigma method.
    pub sigma_multiplier: f32,
    /// Drop single-pixel noise before labeling.
    pub opening: bool,
    pub connectivity: Connectivity,
}

impl Default for ThresholdDetector {
    fn default() -> Self {
        Self {
            method: ThresholdMethod::default(),
            sigma_multiplier: 3.0,
            opening: true,
            connectivity: Connectivity::default(),
        }
    }
}

impl Operation for ThresholdDetector {
    fn name(&self) -> &'static str {
        "ThresholdDetector"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Detection
    }

    fn configured_parameters(&self) -> Params {
        let fixed = match self.method {
            ThresholdMethod::Fixed(v) => v as f64,
            _ => 0.0,
        };
        Params::new()
            .with("method", ParamValue::Str(self.method.tag().to_string()))
            .with("fixed_value", ParamValue::Float(fixed))
            .with(
                "sigma_multiplier",
                ParamValue::Float(self.sigma_multiplier as f64),
            )
            .with("opening", ParamValue::Bool(self.opening))
            .with(
                "eight_connectivity",
                ParamValue::Bool(self.connectivity == Connectivity::Eight),
            )
    }

    fn operate(&self, image: &mut Image, params: &Params) -> Result<()> {
        let name = self.name();
        let method = match params.get_str(name, "method")? {
            "mean_plus_sigma" => ThresholdMethod::MeanPlusSigma,
            "fixed" => ThresholdMethod::Fixed(params.get_float(name, "fixed_value")? as f32),
            _ => ThresholdMethod::Otsu,
        };
        let sigma_mul = params.get_float(name, "sigma_multiplier")? as f32;
        let opening = params.get_bool(name, "opening")?;
        let connectivity = if params.get_bool(name, "eight_connectivity")? {
            Connectivity::Eight
        } else {
            Connectivity::Four
        };

        let enh = image.enh_gray().copy()?;
        let threshold = compute_threshold(&enh, &method, sigma_mul);
        let mut mask = enh.mapv(|v| v > threshold);
        if opening {
            mask = morphological_opening(&mask);
        }

        let labeled = label_components(&mask, connectivity);
        image.objmap_mut().set(&labeled)?;
        debug!(
            image = %image.name(),
            threshold,
            objects = image.num_objects(),
            "threshold detection"
        );
        Ok(())
    }
}
