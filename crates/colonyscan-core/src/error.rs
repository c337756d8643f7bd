use thiserror::Error;

#[derive(Error, Debug)]
pub enum ColonyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image format error: {0}")]
    ImageFormat(#[from] image::ImageError),

    #[error("Unsupported raster format: {0}")]
    UnsupportedFormat(String),

    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("Value out of range: {0}")]
    RangeError(String),

    #[error("Image has no raster data")]
    EmptyImage,

    #[error("No objects detected; run a detector first")]
    NoObjects,

    #[error("Object label {0} not present in the object map")]
    UnknownLabel(u32),

    #[error("Object index {index} out of range (total: {total})")]
    ObjectIndexOutOfRange { index: usize, total: usize },

    #[error("Operation {operation} is missing parameter '{parameter}'")]
    MissingParameter {
        operation: String,
        parameter: String,
    },

    #[error("Operation {operation} parameter '{parameter}' is not a {expected}")]
    InvalidParameter {
        operation: String,
        parameter: String,
        expected: &'static str,
    },

    #[error("Operation {operation} violated its contract: modified '{field}'")]
    ContractViolation {
        operation: String,
        field: &'static str,
    },

    #[error("Image lacks grid layout metadata (Grid_RowNum / Grid_ColNum)")]
    GridImageRequired,

    #[error("Metadata key '{0}' not found")]
    MetadataKey(String),

    #[error("Metadata key '{0}' is not writable")]
    MetadataAccess(String),

    #[error("Pipeline step {step} ({operation}) failed: {source}")]
    Pipeline {
        step: usize,
        operation: String,
        #[source]
        source: Box<ColonyError>,
    },

    #[error("Invalid plate archive: {0}")]
    InvalidArchive(String),

    #[error("Image '{0}' not found in the plate archive")]
    ImageNotFound(String),

    #[error("Archive slot capacity exhausted ({0} slots)")]
    CapacityExhausted(u32),

    #[error("Measurement table error: {0}")]
    Table(String),

    #[error("Batch machinery error: {0}")]
    Batch(String),
}

pub type Result<T> = std::result::Result<T, ColonyError>;
