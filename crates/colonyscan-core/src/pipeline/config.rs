use serde::{Deserialize, Serialize};

use crate::correct::NormalizeIntensity;
use crate::detect::threshold::ThresholdMethod;
use crate::detect::ThresholdDetector;
use crate::enhance::{ContrastStretch, GaussianSmooth};
use crate::image::labeling::Connectivity;
use crate::measure::{MeasureIntensity, MeasureSize};
use crate::refine::{BorderObjectFilter, SmallObjectFilter};
use crate::table::MergePolicy;

use super::spec::{PipelineBuilder, PipelineSpec};

/// Declarative pipeline configuration (TOML-friendly); converts into a
/// frozen [`PipelineSpec`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Rescale gray to the full [0,1] range before enhancement.
    #[serde(default)]
    pub normalize: bool,
    /// Gaussian sigma for pre-threshold smoothing; 0 disables the step.
    #[serde(default = "default_smooth_sigma")]
    pub smooth_sigma: f32,
    pub contrast: Option<ContrastConfig>,
    #[serde(default)]
    pub threshold: ThresholdMethod,
    /// Sigma multiplier for the MeanPlusSigma threshold method.
    #[serde(default = "default_sigma_multiplier")]
    pub sigma_multiplier: f32,
    /// Morphological opening before labeling.
    #[serde(default = "default_true")]
    pub opening: bool,
    #[serde(default)]
    pub connectivity: Connectivity,
    /// Minimum colony area in pixels; None keeps everything.
    pub min_area: Option<usize>,
    /// Drop colonies touching the plate border.
    #[serde(default)]
    pub drop_border: bool,
    #[serde(default = "default_true")]
    pub measure_size: bool,
    #[serde(default = "default_true")]
    pub measure_intensity: bool,
    #[serde(default)]
    pub merge: MergePolicy,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContrastConfig {
    pub low_percentile: f32,
    pub high_percentile: f32,
}

fn default_smooth_sigma() -> f32 {
    2.0
}

fn default_sigma_multiplier() -> f32 {
    3.0
}

fn default_true() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            normalize: false,
            smooth_sigma: default_smooth_sigma(),
            contrast: None,
            threshold: ThresholdMethod::default(),
            sigma_multiplier: default_sigma_multiplier(),
            opening: true,
            connectivity: Connectivity::default(),
            min_area: None,
            drop_border: false,
            measure_size: true,
            measure_intensity: true,
            merge: MergePolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn build(&self) -> PipelineSpec {
        let mut builder = PipelineBuilder::default().merge_policy(self.merge.clone());

        if self.normalize {
            builder = builder.op(NormalizeIntensity::default());
        }
        if self.smooth_sigma > 0.0 {
            builder = builder.op(GaussianSmooth {
                sigma: self.smooth_sigma,
            });
        }
        if let Some(contrast) = &self.contrast {
            builder = builder.op(ContrastStretch {
                low_percentile: contrast.low_percentile,
                high_percentile: contrast.high_percentile,
            });
        }

        builder = builder.op(ThresholdDetector {
            method: self.threshold.clone(),
            sigma_multiplier: self.sigma_multiplier,
            opening: self.opening,
            connectivity: self.connectivity,
        });

        if let Some(min_area) = self.min_area {
            builder = builder.op(SmallObjectFilter {
                min_area,
                connectivity: self.connectivity,
            });
        }
        if self.drop_border {
            builder = builder.op(BorderObjectFilter {
                connectivity: self.connectivity,
            });
        }

        if self.measure_size {
            builder = builder.measure(MeasureSize);
        }
        if self.measure_intensity {
            builder = builder.measure(MeasureIntensity);
        }

        builder.build()
    }
}
