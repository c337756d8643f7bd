//! Parallel batch execution of one pipeline over a plate set.
//!
//! Topology: one coordinator, N worker threads, one writer thread. Workers
//! pull image names from a shared task deque (pre-loaded with every name
//! plus one shutdown sentinel per worker), each opens its own read-only
//! view of the archive from an explicit [`WorkerInit`] handed over at
//! spawn, and sends results over a channel. The writer thread owns the
//! archive's sole write handle and commits one image (payload + table +
//! flush) at a time. It stops only after every worker has reported done and
//! the channel is drained, so no finished result is ever dropped.
//!
//! Before loading an image a worker asks the [`MemoryProbe`] for available
//! memory and proceeds only when `available >= ram_ratio * payload_size`;
//! otherwise the task goes back to the front of the queue (ahead of the
//! shutdown sentinels) and the worker naps — backpressure, not failure.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use crate::consts::{ADMISSION_RETRY_PAUSE_MS, DEFAULT_RAM_RATIO, QUEUE_POLL_INTERVAL_MS};
use crate::error::{ColonyError, Result};
use crate::image::Image;
use crate::io::archive::{ArchiveReader, ArchiveWriter};
use crate::pipeline::PipelineSpec;
use crate::table::MeasurementTable;

use super::set::PlateSet;

/// Source of the available-memory figure used for admission control.
/// Injected so tests can script admission outcomes.
pub trait MemoryProbe: Send + Sync {
    /// Bytes of currently available system memory, if known. `None` admits
    /// unconditionally.
    fn available_bytes(&self) -> Option<u64>;
}

/// Reads `MemAvailable` from `/proc/meminfo`; admits unconditionally on
/// platforms without it.
pub struct SystemMemoryProbe;

impl MemoryProbe for SystemMemoryProbe {
    fn available_bytes(&self) -> Option<u64> {
        let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
        for line in meminfo.lines() {
            if let Some(rest) = line.strip_prefix("MemAvailable:") {
                let kb: u64 = rest.trim().trim_end_matches(" kB").trim().parse().ok()?;
                return Some(kb * 1024);
            }
        }
        None
    }
}

#[derive(Clone, Debug)]
pub struct BatchConfig {
    pub num_workers: usize,
    /// Admission threshold: proceed when `available >= ram_ratio * size`.
    pub ram_ratio: f64,
    pub admission_pause: Duration,
    pub queue_poll: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            num_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            ram_ratio: DEFAULT_RAM_RATIO,
            admission_pause: Duration::from_millis(ADMISSION_RETRY_PAUSE_MS),
            queue_poll: Duration::from_millis(QUEUE_POLL_INTERVAL_MS),
        }
    }
}

/// Outcome of a batch run. Per-image failures are fail-soft: compare
/// `processed` against `submitted` to reconcile.
#[derive(Clone, Debug, Default)]
pub struct BatchReport {
    pub submitted: usize,
    pub processed: usize,
    pub failed: Vec<(String, String)>,
}

/// The one-time spawn handoff a worker receives: where the data lives, and
/// nothing else. The pipeline itself arrives separately as a shared
/// immutable reference.
#[derive(Clone, Debug)]
pub struct WorkerInit {
    pub archive_path: PathBuf,
    pub set_key: String,
}

enum Task {
    Image(String),
    Shutdown,
}

enum WorkerMessage {
    Done {
        name: String,
        image: Box<Image>,
        table: MeasurementTable,
    },
    Failed {
        name: String,
        reason: String,
    },
    WorkerExit,
}

/// Applies one [`PipelineSpec`] to every image in a [`PlateSet`], in
/// parallel, writing results back through a single writer.
pub struct BatchProcessor {
    config: BatchConfig,
    probe: Arc<dyn MemoryProbe>,
}

impl Default for BatchProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchProcessor {
    pub fn new() -> Self {
        Self {
            config: BatchConfig::default(),
            probe: Arc::new(SystemMemoryProbe),
        }
    }

    pub fn with_config(config: BatchConfig) -> Self {
        Self {
            config,
            probe: Arc::new(SystemMemoryProbe),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Process the whole set. Blocks until every image is either written or
    /// recorded as failed.
    pub fn process(&self, set: &PlateSet, pipeline: &Arc<PipelineSpec>) -> Result<BatchReport> {
        self.process_with_shutdown(set, pipeline, Arc::new(AtomicBool::new(false)))
    }

    /// Process the set with an external shutdown flag. The flag is polled,
    /// never preemptive: in-flight images finish before a worker exits.
    pub fn process_with_shutdown(
        &self,
        set: &PlateSet,
        pipeline: &Arc<PipelineSpec>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<BatchReport> {
        self.process_reported(set, pipeline, shutdown, &|_done| {})
    }

    /// Like [`BatchProcessor::process_with_shutdown`], with a callback
    /// invoked with the number of settled images (written or failed) after
    /// each commit — for progress bars and logging.
    pub fn process_reported(
        &self,
        set: &PlateSet,
        pipeline: &Arc<PipelineSpec>,
        shutdown: Arc<AtomicBool>,
        on_progress: &(dyn Fn(usize) + Sync),
    ) -> Result<BatchReport> {
        let names = set.image_names()?;
        let submitted = names.len();
        let num_workers = self.config.num_workers.max(1);

        // Opening the sole write handle up front makes "archive cannot be
        // opened" a machinery failure of the whole call, not a per-image one.
        let writer = set.writer()?;

        info!(
            set = set.name(),
            images = submitted,
            workers = num_workers,
            "batch processing start"
        );

        let queue: Arc<Mutex<VecDeque<Task>>> = Arc::new(Mutex::new(
            names
                .into_iter()
                .map(Task::Image)
                .chain((0..num_workers).map(|_| Task::Shutdown))
                .collect(),
        ));

        let (tx, rx) = mpsc::channel::<WorkerMessage>();
        let init = WorkerInit {
            archive_path: set.path().to_path_buf(),
            set_key: set.name().to_string(),
        };

        let (processed, failed) = std::thread::scope(|scope| -> Result<_> {
            let writer_handle = std::thread::Builder::new()
                .name("colonyscan-writer".into())
                .spawn_scoped(scope, move || {
                    writer_loop(writer, rx, num_workers, on_progress)
                })
                .map_err(|e| ColonyError::Batch(format!("failed to spawn writer: {e}")))?;

            let mut worker_handles = Vec::with_capacity(num_workers);
            for worker_idx in 0..num_workers {
                let handle = std::thread::Builder::new()
                    .name(format!("colonyscan-worker-{worker_idx}"))
                    .spawn_scoped(scope, {
                        let init = init.clone();
                        let queue = Arc::clone(&queue);
                        let tx = tx.clone();
                        let shutdown = Arc::clone(&shutdown);
                        let probe = Arc::clone(&self.probe);
                        let pipeline = Arc::clone(pipeline);
                        let config = self.config.clone();
                        move || worker_loop(init, queue, tx, shutdown, probe, pipeline, config)
                    })
                    .map_err(|e| ColonyError::Batch(format!("failed to spawn worker: {e}")))?;
                worker_handles.push(handle);
            }
            drop(tx);

            for handle in worker_handles {
                handle
                    .join()
                    .map_err(|_| ColonyError::Batch("worker thread panicked".to_string()))?;
            }
            writer_handle
                .join()
                .map_err(|_| ColonyError::Batch("writer thread panicked".to_string()))
        })?;

        info!(
            set = set.name(),
            processed,
            failed = failed.len(),
            "batch processing finished"
        );

        Ok(BatchReport {
            submitted,
            processed,
            failed,
        })
    }
}

fn worker_loop(
    init: WorkerInit,
    queue: Arc<Mutex<VecDeque<Task>>>,
    tx: mpsc::Sender<WorkerMessage>,
    shutdown: Arc<AtomicBool>,
    probe: Arc<dyn MemoryProbe>,
    pipeline: Arc<PipelineSpec>,
    config: BatchConfig,
) {
    // Each worker opens its own read-only view exactly once.
    let reader = match ArchiveReader::open(&init.archive_path) {
        Ok(r) => r,
        Err(e) => {
            warn!(set = %init.set_key, "worker could not open archive: {e}");
            let _ = tx.send(WorkerMessage::WorkerExit);
            return;
        }
    };

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        let task = queue.lock().ok().and_then(|mut q| q.pop_front());
        let name = match task {
            Some(Task::Shutdown) => break,
            Some(Task::Image(name)) => name,
            None => {
                std::thread::sleep(config.queue_poll);
                continue;
            }
        };

        // Memory admission: re-enqueue at the front (ahead of the shutdown
        // sentinels) and nap when the node is too loaded to take this image.
        let size = match reader.payload_size(&name) {
            Ok(size) => size,
            Err(e) => {
                let _ = tx.send(WorkerMessage::Failed {
                    name,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if let Some(available) = probe.available_bytes() {
            if (available as f64) < config.ram_ratio * size as f64 {
                if let Ok(mut q) = queue.lock() {
                    q.push_front(Task::Image(name));
                }
                std::thread::sleep(config.admission_pause);
                continue;
            }
        }

        let image = match reader.image(&name) {
            Ok(image) => image,
            Err(e) => {
                let _ = tx.send(WorkerMessage::Failed {
                    name,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        match pipeline.apply_and_measure(&image) {
            Ok((processed, table)) => {
                let _ = tx.send(WorkerMessage::Done {
                    name,
                    image: Box::new(processed),
                    table,
                });
            }
            Err(e) => {
                let _ = tx.send(WorkerMessage::Failed {
                    name,
                    reason: e.to_string(),
                });
            }
        }
    }

    let _ = tx.send(WorkerMessage::WorkerExit);
}

/// Single-writer loop: the only actor holding a write handle. Commits one
/// image at a time and flushes after each, so concurrent readers observe
/// new data promptly. Exits once every worker has reported done — channel
/// ordering guarantees all their results were received first.
fn writer_loop(
    mut writer: ArchiveWriter,
    rx: mpsc::Receiver<WorkerMessage>,
    num_workers: usize,
    on_progress: &(dyn Fn(usize) + Sync),
) -> (usize, Vec<(String, String)>) {
    let mut processed = 0usize;
    let mut failed: Vec<(String, String)> = Vec::new();
    let mut exited = 0usize;

    while exited < num_workers {
        let message = match rx.recv() {
            Ok(message) => message,
            Err(_) => break, // every sender dropped
        };
        match message {
            WorkerMessage::Done { name, image, table } => {
                let committed = writer
                    .write_image(&name, &image)
                    .and_then(|_| writer.write_measurements(&name, &table));
                match committed {
                    Ok(()) => processed += 1,
                    Err(e) => {
                        warn!(name = %name, "writer failed to commit result: {e}");
                        failed.push((name, e.to_string()));
                    }
                }
                on_progress(processed + failed.len());
            }
            WorkerMessage::Failed { name, reason } => {
                warn!(name = %name, reason = %reason, "image failed; continuing batch");
                failed.push((name, reason));
                on_progress(processed + failed.len());
            }
            WorkerMessage::WorkerExit => exited += 1,
        }
    }

    let _ = writer.finalize();
    (processed, failed)
}
