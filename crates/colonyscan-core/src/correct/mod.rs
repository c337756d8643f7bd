//! Correction operations: the only pipeline stage allowed to rewrite the
//! canonical grayscale. A correction runs first, so the cascading reset of
//! `enh_gray` and the object map it triggers is the intended effect.

use crate::error::Result;
use crate::image::Image;
use crate::ops::{Operation, OperationKind, ParamValue, Params};

/// Linear rescale of the canonical gray to the full [0,1] range, evening
/// out exposure differences between plates before enhancement.
#[derive(Clone, Debug, Default)]
pub struct NormalizeIntensity {
    /// Skip rescaling when the dynamic range is already at least this wide.
    pub min_span: f32,
}

impl Operation for NormalizeIntensity {
    fn name(&self) -> &'static str {
        "NormalizeIntensity"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Correction
    }

    fn configured_parameters(&self) -> Params {
        Params::new().with("min_span", ParamValue::Float(self.min_span as f64))
    }

    fn operate(&self, image: &mut Image, params: &Params) -> Result<()> {
        let min_span = params.get_float(self.name(), "min_span")? as f32;

        let gray = image.gray().copy()?;
        let mut lo = f32::MAX;
        let mut hi = f32::MIN;
        for &v in gray.iter() {
            lo = lo.min(v);
            hi = hi.max(v);
        }
        let span = hi - lo;
        if span <= f32::EPSILON || span >= min_span.max(1.0) {
            return Ok(());
        }

        let rescaled = gray.mapv(|v| ((v - lo) / span).clamp(0.0, 1.0));
        image.gray_mut().set(&rescaled)
    }
}
