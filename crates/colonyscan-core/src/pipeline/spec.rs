use std::sync::Arc;

use crate::ops::{Measure, Operation, OperationKind, Params};
use crate::table::MergePolicy;

/// One frozen pipeline step: the operation, its unique step name, and the
/// parameter map captured once at build time. The same frozen `Params` is
/// what worker threads execute against — nothing is re-derived per task.
pub struct PipelineStep {
    pub(crate) name: String,
    pub(crate) op: Arc<dyn Operation>,
    pub(crate) params: Params,
}

impl PipelineStep {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> OperationKind {
        self.op.kind()
    }

    pub fn params(&self) -> &Params {
        &self.params
    }
}

/// One frozen measurement step.
pub struct MeasureStep {
    pub(crate) name: String,
    pub(crate) measure: Arc<dyn Measure>,
    pub(crate) params: Params,
}

impl MeasureStep {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// An immutable, ordered pipeline: corrections, then enhancements, then
/// detections, then refinements, followed by the measurement extractors.
/// Safe to share across worker threads behind an `Arc`.
pub struct PipelineSpec {
    pub(crate) steps: Vec<PipelineStep>,
    pub(crate) measures: Vec<MeasureStep>,
    pub(crate) merge_policy: MergePolicy,
}

impl PipelineSpec {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    pub fn measures(&self) -> &[MeasureStep] {
        &self.measures
    }

    pub fn merge_policy(&self) -> &MergePolicy {
        &self.merge_policy
    }
}

/// Accumulates operations and measurers, then freezes them into a
/// [`PipelineSpec`]. Operations are bucketed by their
/// [`OperationKind`], so the staged execution order holds regardless of
/// insertion order; insertion order is kept within a stage.
#[derive(Default)]
pub struct PipelineBuilder {
    corrections: Vec<Arc<dyn Operation>>,
    enhancements: Vec<Arc<dyn Operation>>,
    detections: Vec<Arc<dyn Operation>>,
    refinements: Vec<Arc<dyn Operation>>,
    measures: Vec<Arc<dyn Measure>>,
    merge_policy: MergePolicy,
}

impl PipelineBuilder {
    pub fn op(mut self, op: impl Operation + 'static) -> Self {
        let op: Arc<dyn Operation> = Arc::new(op);
        match op.kind() {
            OperationKind::Correction => self.corrections.push(op),
            OperationKind::Enhancement => self.enhancements.push(op),
            OperationKind::Detection => self.detections.push(op),
            OperationKind::Refinement => self.refinements.push(op),
        }
        self
    }

    pub fn measure(mut self, measure: impl Measure + 'static) -> Self {
        self.measures.push(Arc::new(measure));
        self
    }

    pub fn merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }

    /// Freeze every operation's configuration and assign unique step names.
    pub fn build(self) -> PipelineSpec {
        let ordered: Vec<Arc<dyn Operation>> = self
            .corrections
            .into_iter()
            .chain(self.enhancements)
            .chain(self.detections)
            .chain(self.refinements)
            .collect();

        let names = make_unique(ordered.iter().map(|op| op.name().to_string()).collect());
        let steps = ordered
            .into_iter()
            .zip(names)
            .map(|(op, name)| {
                let params = op.configured_parameters();
                PipelineStep { name, op, params }
            })
            .collect();

        let measure_names =
            make_unique(self.measures.iter().map(|m| m.name().to_string()).collect());
        let measures = self
            .measures
            .into_iter()
            .zip(measure_names)
            .map(|(measure, name)| {
                let params = measure.configured_parameters();
                MeasureStep {
                    name,
                    measure,
                    params,
                }
            })
            .collect();

        PipelineSpec {
            steps,
            measures,
            merge_policy: self.merge_policy,
        }
    }
}

/// Disambiguate repeated step names with numeric suffixes.
fn make_unique(names: Vec<String>) -> Vec<String> {
    let mut seen: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    let mut result = Vec::with_capacity(names.len());

    for name in names {
        match seen.get(&name).copied() {
            None => {
                seen.insert(name.clone(), 0);
                result.push(name);
            }
            Some(count) => {
                let mut next = count + 1;
                let mut candidate = format!("{name}_{next}");
                while seen.contains_key(&candidate) {
                    next += 1;
                    candidate = format!("{name}_{next}");
                }
                seen.insert(name.clone(), next);
                seen.insert(candidate.clone(), 0);
                result.push(candidate);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_step_names_get_suffixes() {
        let names = make_unique(vec![
            "Detect".to_string(),
            "Detect".to_string(),
            "Detect".to_string(),
        ]);
        assert_eq!(names, vec!["Detect", "Detect_1", "Detect_2"]);
    }
}
