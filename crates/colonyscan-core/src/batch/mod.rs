pub mod processor;
pub mod set;

pub use processor::{BatchConfig, BatchProcessor, BatchReport, MemoryProbe, SystemMemoryProbe, WorkerInit};
pub use set::PlateSet;
