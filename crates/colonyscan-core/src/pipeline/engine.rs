use tracing::{debug, info};

use crate::error::{ColonyError, Result};
use crate::image::Image;
use crate::ops::apply_checked;
use crate::table::MeasurementTable;

use super::spec::PipelineSpec;

impl PipelineSpec {
    /// Run every operation step in sequence against a copy of the image and
    /// return the processed copy. The caller's image is untouched.
    pub fn apply(&self, image: &Image) -> Result<Image> {
        let mut processed = image.copy();
        self.apply_inplace(&mut processed)?;
        Ok(processed)
    }

    /// Run every operation step in sequence, mutating the image in place.
    ///
    /// A failing step is not retried; the error carries the step position
    /// and operation name and no partial result is returned.
    pub fn apply_inplace(&self, image: &mut Image) -> Result<()> {
        info!(image = %image.name(), steps = self.steps.len(), "applying pipeline");
        for (idx, step) in self.steps.iter().enumerate() {
            debug!(step = idx, operation = %step.name, kind = %step.kind(), "pipeline step");
            apply_checked(step.op.as_ref(), image, &step.params).map_err(|e| {
                ColonyError::Pipeline {
                    step: idx,
                    operation: step.name.clone(),
                    source: Box::new(e),
                }
            })?;
        }
        Ok(())
    }

    /// Run every measurer against the (already processed) image and merge
    /// their per-object tables on the label index.
    ///
    /// The base table is the objects view's `info()` (with metadata
    /// columns), so an image with zero detected objects still yields an
    /// empty but fully-columned table.
    pub fn measure(&self, image: &Image) -> Result<MeasurementTable> {
        let mut merged = image.objects().info(true)?;

        for (idx, step) in self.measures.iter().enumerate() {
            let step_idx = self.steps.len() + idx;
            let table = step
                .measure
                .measure(image, &step.params)
                .map_err(|e| ColonyError::Pipeline {
                    step: step_idx,
                    operation: step.name.clone(),
                    source: Box::new(e),
                })?;

            // A measurer must report on exactly the objects the image has.
            if table.labels() != image.objmap().labels().as_slice() {
                return Err(ColonyError::ContractViolation {
                    operation: step.name.clone(),
                    field: "ObjectLabel",
                });
            }

            merged = merged.merge(&table, &self.merge_policy);
        }

        Ok(merged)
    }

    /// Apply the pipeline to a copy of the image, then measure the result.
    pub fn apply_and_measure(&self, image: &Image) -> Result<(Image, MeasurementTable)> {
        let processed = self.apply(image)?;
        let table = self.measure(&processed)?;
        Ok((processed, table))
    }
}
