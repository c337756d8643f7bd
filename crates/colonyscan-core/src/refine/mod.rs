//! Refinement operations: prune the detected object map without touching
//! any grayscale plane.

use tracing::debug;

use crate::error::Result;
use crate::image::labeling::Connectivity;
use crate::image::Image;
use crate::ops::{Operation, OperationKind, ParamValue, Params};

/// Remove labeled components smaller than a minimum pixel area, then
/// relabel so the surviving labels are compact again.
#[derive(Clone, Debug)]
pub struct SmallObjectFilter {
    pub min_area: usize,
    pub connectivity: Connectivity,
}

impl Default for SmallObjectFilter {
    fn default() -> Self {
        Self {
            min_area: 16,
            connectivity: Connectivity::default(),
        }
    }
}

impl Operation for SmallObjectFilter {
    fn name(&self) -> &'static str {
        "SmallObjectFilter"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Refinement
    }

    fn configured_parameters(&self) -> Params {
        Params::new()
            .with("min_area", ParamValue::Int(self.min_area as i64))
            .with(
                "eight_connectivity",
                ParamValue::Bool(self.connectivity == Connectivity::Eight),
            )
    }

    fn operate(&self, image: &mut Image, params: &Params) -> Result<()> {
        let name = self.name();
        let min_area = params.get_usize(name, "min_area")?;
        let connectivity = if params.get_bool(name, "eight_connectivity")? {
            Connectivity::Eight
        } else {
            Connectivity::Four
        };

        let stats = image.objects().stats()?;
        let drop: Vec<u32> = stats
            .iter()
            .filter(|r| r.area < min_area)
            .map(|r| r.label)
            .collect();
        if drop.is_empty() {
            return Ok(());
        }

        let dense = image.objmap().dense()?;
        let pruned = dense.mapv(|v| if drop.contains(&v) { 0 } else { v });
        image.objmap_mut().set(&pruned)?;
        image.objmap_mut().relabel(connectivity)?;
        debug!(image = %image.name(), dropped = drop.len(), "small-object filter");
        Ok(())
    }
}

/// Remove components whose bounding box touches the image border — partial
/// colonies at the plate edge bias size and intensity measurements.
#[derive(Clone, Debug)]
pub struct BorderObjectFilter {
    pub connectivity: Connectivity,
}

impl Default for BorderObjectFilter {
    fn default() -> Self {
        Self {
            connectivity: Connectivity::default(),
        }
    }
}

impl Operation for BorderObjectFilter {
    fn name(&self) -> &'static str {
        "BorderObjectFilter"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Refinement
    }

    fn configured_parameters(&self) -> Params {
        Params::new().with(
            "eight_connectivity",
            ParamValue::Bool(self.connectivity == Connectivity::Eight),
        )
    }

    fn operate(&self, image: &mut Image, params: &Params) -> Result<()> {
        let connectivity = if params.get_bool(self.name(), "eight_connectivity")? {
            Connectivity::Eight
        } else {
            Connectivity::Four
        };

        let (h, w) = image.shape();
        let stats = image.objects().stats()?;
        let drop: Vec<u32> = stats
            .iter()
            .filter(|r| r.touches_border(h, w))
            .map(|r| r.label)
            .collect();
        if drop.is_empty() {
            return Ok(());
        }

        let dense = image.objmap().dense()?;
        let pruned = dense.mapv(|v| if drop.contains(&v) { 0 } else { v });
        image.objmap_mut().set(&pruned)?;
        image.objmap_mut().relabel(connectivity)?;
        debug!(image = %image.name(), dropped = drop.len(), "border-object filter");
        Ok(())
    }
}
