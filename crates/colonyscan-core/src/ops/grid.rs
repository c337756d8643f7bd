//! Grid-aware operation gating.
//!
//! Plates arrayed as a pinning grid carry their layout in public metadata
//! (`Grid_RowNum` / `Grid_ColNum`). Grid-specialized operations require that
//! layout before doing anything; wrapping an operation in [`GridGate`] adds
//! the precondition check ahead of the generic apply path.

use crate::error::{ColonyError, Result};
use crate::image::metadata::{keys, MetaValue};
use crate::image::Image;
use crate::ops::{Operation, OperationKind, Params};

/// Row/column layout of a gridded plate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridLayout {
    pub rows: usize,
    pub cols: usize,
}

impl GridLayout {
    /// Read the layout from image metadata. Missing or non-positive values
    /// fail with [`ColonyError::GridImageRequired`].
    pub fn from_metadata(image: &Image) -> Result<Self> {
        let rows = read_dim(image, keys::GRID_ROW_NUM)?;
        let cols = read_dim(image, keys::GRID_COL_NUM)?;
        Ok(Self { rows, cols })
    }

    /// Record the layout into public metadata.
    pub fn store(&self, image: &mut Image) -> Result<()> {
        image.metadata_mut().set(keys::GRID_ROW_NUM, self.rows as i64)?;
        image.metadata_mut().set(keys::GRID_COL_NUM, self.cols as i64)?;
        Ok(())
    }

    pub fn sections(&self) -> usize {
        self.rows * self.cols
    }
}

fn read_dim(image: &Image, key: &str) -> Result<usize> {
    match image.metadata().try_get(key) {
        Some(MetaValue::Int(v)) if *v > 0 => Ok(*v as usize),
        _ => Err(ColonyError::GridImageRequired),
    }
}

/// Wraps any operation with the grid-layout precondition.
pub struct GridGate<O> {
    inner: O,
}

impl<O: Operation> GridGate<O> {
    pub fn new(inner: O) -> Self {
        Self { inner }
    }
}

impl<O: Operation> Operation for GridGate<O> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn kind(&self) -> OperationKind {
        self.inner.kind()
    }

    fn configured_parameters(&self) -> Params {
        self.inner.configured_parameters()
    }

    fn operate(&self, image: &mut Image, params: &Params) -> Result<()> {
        GridLayout::from_metadata(image)?;
        self.inner.operate(image, params)
    }
}
