/// ITU-R BT.601 luminance coefficient for the red channel.
pub const LUMINANCE_R: f32 = 0.299;

/// ITU-R BT.601 luminance coefficient for the green channel.
pub const LUMINANCE_G: f32 = 0.587;

/// ITU-R BT.601 luminance coefficient for the blue channel.
pub const LUMINANCE_B: f32 = 0.114;

/// Number of bins used by Otsu threshold histograms.
pub const OTSU_HISTOGRAM_BINS: usize = 256;

/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Free-memory multiplier a worker must satisfy before loading an image:
/// proceed only when `available >= ratio * payload_size`.
pub const DEFAULT_RAM_RATIO: f64 = 1.25;

/// How long a worker naps after a failed memory-admission check before the
/// re-enqueued task can be retried.
pub const ADMISSION_RETRY_PAUSE_MS: u64 = 200;

/// Bounded wait used when polling the task queue so workers can observe the
/// shutdown flag instead of blocking indefinitely.
pub const QUEUE_POLL_INTERVAL_MS: u64 = 25;

/// File extensions accepted when importing plate images from a directory.
pub const ACCEPTED_IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "tif", "tiff"];
