//! SlideSource trait for format-agnostic slide access.
//!
//! This module defines the `SlideSource` trait, the only boundary between the
//! rendering core and whatever decodes slide pixels. It combines two
//! collaborator contracts:
//!
//! - **Level geometry**: level count, per-level downsample and dimensions.
//!   Queried read-only and assumed stable for the lifetime of a slide.
//! - **Region decoding**: `read_region` turns a level-0 origin plus a size in
//!   level pixels into an owned RGBA8 buffer.
//!
//! Implementations must be safe to call concurrently from several tile
//! workers at once.

use serde::Serialize;

/// Bytes per decoded pixel (RGBA8).
pub const BYTES_PER_PIXEL: usize = 4;

// =============================================================================
// Level Information
// =============================================================================

/// Information about a single pyramid level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelInfo {
    /// Width of this level in pixels
    pub width: u64,

    /// Height of this level in pixels
    pub height: u64,

    /// Downsample factor relative to level 0
    ///
    /// Level 0 has downsample 1.0, level 1 might have 2.0, etc.
    pub downsample: f64,
}

impl LevelInfo {
    /// Number of tiles in X and Y direction for the given tile edge length.
    pub fn tile_count(&self, tile_size: u32) -> (u64, u64) {
        let tile_size = u64::from(tile_size.max(1));
        (
            self.width.div_ceil(tile_size),
            self.height.div_ceil(tile_size),
        )
    }
}

// =============================================================================
// SlideSource Trait
// =============================================================================

/// Format-agnostic interface for reading pixels from a pyramidal slide.
///
/// # Example
///
/// ```
/// use wsi_viewer::slide::{SlideSource, SyntheticSlide};
///
/// let slide = SyntheticSlide::new(4096, 2048);
/// assert_eq!(slide.level_dimensions(0), Some((4096, 2048)));
///
/// // Read a 256x256 region at level 1, starting at level-0 pixel (512, 0)
/// let pixels = slide.read_region(1, 512, 0, 256, 256).unwrap();
/// assert_eq!(pixels.len(), 256 * 256 * 4);
/// ```
pub trait SlideSource: Send + Sync {
    /// Get the number of pyramid levels.
    ///
    /// Level 0 is always the highest resolution (full size).
    fn level_count(&self) -> usize;

    /// Get the downsample factor for a level.
    ///
    /// Returns `None` if level is out of range.
    fn level_downsample(&self, level: usize) -> Option<f64>;

    /// Get dimensions of a specific level.
    ///
    /// Returns `(width, height)` in pixels, or `None` if level is out of range.
    fn level_dimensions(&self, level: usize) -> Option<(u64, u64)>;

    /// Get dimensions of the full-resolution (level 0) image.
    fn dimensions(&self) -> Option<(u64, u64)> {
        self.level_dimensions(0)
    }

    /// Get complete information about a level.
    ///
    /// Returns `None` if level is out of range.
    fn level_info(&self, level: usize) -> Option<LevelInfo> {
        let (width, height) = self.level_dimensions(level)?;
        let downsample = self.level_downsample(level)?;

        Some(LevelInfo {
            width,
            height,
            downsample,
        })
    }

    /// Read a region of a level as RGBA8 pixels.
    ///
    /// `x` and `y` are the top-left corner in level-0 coordinates; `width` and
    /// `height` are measured in pixels of `level`. The returned buffer holds
    /// exactly `width * height * 4` bytes in row-major order.
    ///
    /// Returns `None` on any failure (out of bounds, I/O, corrupt data).
    fn read_region(&self, level: usize, x: i64, y: i64, width: u32, height: u32)
        -> Option<Vec<u8>>;
}

/// Check a downsample list: non-empty, starts at 1.0, strictly increasing.
pub(crate) fn validate_downsamples(downsamples: &[f64]) -> Result<(), String> {
    let first = downsamples.first().ok_or("no levels")?;
    if (*first - 1.0).abs() > f64::EPSILON {
        return Err(format!("level 0 downsample must be 1.0, got {first}"));
    }
    for pair in downsamples.windows(2) {
        if !(pair[1] > pair[0]) || !pair[1].is_finite() {
            return Err(format!(
                "downsamples must be strictly increasing, got {} after {}",
                pair[1], pair[0]
            ));
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
