use thiserror::Error;

/// Errors that can occur when opening a slide source.
///
/// Reading individual regions never produces an error: a failed read is
/// reported as `None` and the tile simply stays uncached.
#[derive(Debug, Clone, Error)]
pub enum SlideError {
    /// The backing raster could not be opened or decoded
    #[error("Failed to decode image: {0}")]
    Image(String),

    /// Slide has a zero width or height
    #[error("Invalid slide dimensions: {width}x{height}")]
    InvalidDimensions { width: u64, height: u64 },

    /// Level downsample list is empty, not starting at 1.0, or not increasing
    #[error("Invalid pyramid: {reason}")]
    InvalidPyramid { reason: String },
}

/// Errors raised by the background tile loader.
#[derive(Debug, Clone, Error)]
pub enum PoolError {
    /// The operating system refused to spawn a worker thread
    #[error("Failed to spawn tile worker {index}: {message}")]
    Spawn { index: usize, message: String },

    /// A pool must have at least one worker
    #[error("Tile loader needs at least one worker thread")]
    NoWorkers,
}

impl From<image::ImageError> for SlideError {
    fn from(err: image::ImageError) -> Self {
        SlideError::Image(err.to_string())
    }
}
