//! The polymorphic operation and measurement contracts.
//!
//! Every operation freezes its configuration into a [`Params`] map once, at
//! pipeline construction, via [`Operation::configured_parameters`]; the same
//! frozen map is what worker threads receive, so there is no per-task
//! re-derivation and no reflection. `operate` reads its arguments back out
//! of the map with the typed getters, which fail with `MissingParameter`
//! when a required name is absent.

pub mod grid;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ColonyError, Result};
use crate::image::Image;
use crate::table::MeasurementTable;

/// A single configured parameter value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Str(String),
}

/// Frozen name→value map shipped with an operation to the execution site.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Params {
    entries: BTreeMap<String, ParamValue>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: ParamValue) -> Self {
        self.entries.insert(name.to_string(), value);
        self
    }

    pub fn insert(&mut self, name: &str, value: ParamValue) {
        self.entries.insert(name.to_string(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get(&self, operation: &str, name: &str) -> Result<&ParamValue> {
        self.entries
            .get(name)
            .ok_or_else(|| ColonyError::MissingParameter {
                operation: operation.to_string(),
                parameter: name.to_string(),
            })
    }

    pub fn get_float(&self, operation: &str, name: &str) -> Result<f64> {
        match self.get(operation, name)? {
            ParamValue::Float(v) => Ok(*v),
            ParamValue::Int(v) => Ok(*v as f64),
            _ => Err(ColonyError::InvalidParameter {
                operation: operation.to_string(),
                parameter: name.to_string(),
                expected: "float",
            }),
        }
    }

    pub fn get_int(&self, operation: &str, name: &str) -> Result<i64> {
        match self.get(operation, name)? {
            ParamValue::Int(v) => Ok(*v),
            _ => Err(ColonyError::InvalidParameter {
                operation: operation.to_string(),
                parameter: name.to_string(),
                expected: "int",
            }),
        }
    }

    pub fn get_usize(&self, operation: &str, name: &str) -> Result<usize> {
        let v = self.get_int(operation, name)?;
        usize::try_from(v).map_err(|_| ColonyError::InvalidParameter {
            operation: operation.to_string(),
            parameter: name.to_string(),
            expected: "non-negative int",
        })
    }

    pub fn get_bool(&self, operation: &str, name: &str) -> Result<bool> {
        match self.get(operation, name)? {
            ParamValue::Bool(v) => Ok(*v),
            _ => Err(ColonyError::InvalidParameter {
                operation: operation.to_string(),
                parameter: name.to_string(),
                expected: "bool",
            }),
        }
    }

    pub fn get_str(&self, operation: &str, name: &str) -> Result<&str> {
        match self.get(operation, name)? {
            ParamValue::Str(v) => Ok(v.as_str()),
            _ => Err(ColonyError::InvalidParameter {
                operation: operation.to_string(),
                parameter: name.to_string(),
                expected: "str",
            }),
        }
    }
}

/// Which pipeline stage an operation belongs to. The kind also decides
/// which raster fields the operation is forbidden to modify.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Correction,
    Enhancement,
    Detection,
    Refinement,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Correction => write!(f, "correction"),
            Self::Enhancement => write!(f, "enhancement"),
            Self::Detection => write!(f, "detection"),
            Self::Refinement => write!(f, "refinement"),
        }
    }
}

/// An image-transforming pipeline step.
pub trait Operation: Send + Sync {
    fn name(&self) -> &'static str;

    fn kind(&self) -> OperationKind;

    /// Freeze the instance configuration into a parameter map. Called once
    /// when the pipeline is built.
    fn configured_parameters(&self) -> Params;

    /// Mutate the image using only `params` for configuration.
    fn operate(&self, image: &mut Image, params: &Params) -> Result<()>;

    /// Run against the image in place, with the contract checks for this
    /// operation's kind.
    fn apply_inplace(&self, image: &mut Image) -> Result<()> {
        let params = self.configured_parameters();
        apply_checked(self, image, &params)
    }

    /// Run against a deep copy, leaving the caller's image untouched, and
    /// return the mutated copy (never nothing, so call sites can chain).
    fn apply(&self, image: &Image) -> Result<Image> {
        let mut copy = image.copy();
        self.apply_inplace(&mut copy)?;
        Ok(copy)
    }
}

/// Run one operation with its frozen params and verify it only touched the
/// raster fields its kind permits.
pub fn apply_checked(
    op: &(impl Operation + ?Sized),
    image: &mut Image,
    params: &Params,
) -> Result<()> {
    let guard = IntegrityGuard::capture(op.kind(), image);
    op.operate(image, params)?;
    guard.verify(op.name(), image)
}

/// Pre-operation snapshot of the raster fields an operation must not touch.
struct IntegrityGuard {
    gray: Option<ndarray::Array2<f32>>,
    enh_gray: Option<ndarray::Array2<f32>>,
    color: Option<Option<ndarray::Array3<u16>>>,
}

impl IntegrityGuard {
    fn capture(kind: OperationKind, image: &Image) -> Self {
        let protect_gray = matches!(
            kind,
            OperationKind::Enhancement | OperationKind::Detection | OperationKind::Refinement
        );
        let protect_enh = matches!(kind, OperationKind::Detection | OperationKind::Refinement);
        Self {
            gray: protect_gray.then(|| image.gray().copy().unwrap_or_default()),
            enh_gray: protect_enh.then(|| image.enh_gray().copy().unwrap_or_default()),
            color: protect_gray.then(|| image.color().get().ok().cloned()),
        }
    }

    fn verify(self, operation: &str, image: &Image) -> Result<()> {
        if let Some(before) = self.gray {
            let after = image.gray().copy().unwrap_or_default();
            if before != after {
                return Err(ColonyError::ContractViolation {
                    operation: operation.to_string(),
                    field: "gray",
                });
            }
        }
        if let Some(before) = self.enh_gray {
            let after = image.enh_gray().copy().unwrap_or_default();
            if before != after {
                return Err(ColonyError::ContractViolation {
                    operation: operation.to_string(),
                    field: "enh_gray",
                });
            }
        }
        if let Some(before) = self.color {
            let after = image.color().get().ok().cloned();
            if before != after {
                return Err(ColonyError::ContractViolation {
                    operation: operation.to_string(),
                    field: "color",
                });
            }
        }
        Ok(())
    }
}

/// A per-object measurement extractor. Output tables are keyed by object
/// label; the pipeline engine verifies the labels match the measured image.
pub trait Measure: Send + Sync {
    fn name(&self) -> &'static str;

    fn configured_parameters(&self) -> Params {
        Params::new()
    }

    fn measure(&self, image: &Image, params: &Params) -> Result<MeasurementTable>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_parameter_names_operation_and_parameter() {
        let params = Params::new().with("sigma", ParamValue::Float(2.0));
        assert_eq!(params.get_float("GaussianSmooth", "sigma").unwrap(), 2.0);
        match params.get_float("GaussianSmooth", "radius") {
            Err(ColonyError::MissingParameter {
                operation,
                parameter,
            }) => {
                assert_eq!(operation, "GaussianSmooth");
                assert_eq!(parameter, "radius");
            }
            other => panic!("expected MissingParameter, got {other:?}"),
        }
    }

    #[test]
    fn typed_getters_reject_wrong_types() {
        let params = Params::new().with("flag", ParamValue::Bool(true));
        assert!(matches!(
            params.get_float("Op", "flag"),
            Err(ColonyError::InvalidParameter { .. })
        ));
        assert!(params.get_bool("Op", "flag").unwrap());
    }
}
