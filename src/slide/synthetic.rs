//! Procedurally generated slide.
//!
//! `SyntheticSlide` needs no file on disk: every pixel is computed from its
//! level-0 coordinate, so the same slide-space point has the same colour at
//! every pyramid level. That makes it a convenient stand-in for a real
//! decoder in demos, benchmarks and tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crate::error::SlideError;

use super::reader::{validate_downsamples, SlideSource, BYTES_PER_PIXEL};

/// Edge length of one checkerboard cell in level-0 pixels.
pub const CHECKER_CELL: u64 = 256;

/// A checkerboard pyramid computed on the fly.
#[derive(Debug)]
pub struct SyntheticSlide {
    width: u64,
    height: u64,
    downsamples: Vec<f64>,
    latency: Option<Duration>,
    reads: AtomicUsize,
}

impl SyntheticSlide {
    /// Create a slide with power-of-two levels down to a single 512px tile.
    pub fn new(width: u64, height: u64) -> Self {
        let mut downsamples = vec![1.0];
        let mut ds = 1.0_f64;
        while (width as f64 / ds) > 512.0 || (height as f64 / ds) > 512.0 {
            ds *= 2.0;
            downsamples.push(ds);
        }

        Self {
            width,
            height,
            downsamples,
            latency: None,
            reads: AtomicUsize::new(0),
        }
    }

    /// Create a slide with an explicit list of level downsamples.
    ///
    /// The list must start at 1.0 and be strictly increasing; it does not
    /// need to consist of powers of two.
    pub fn with_downsamples(
        width: u64,
        height: u64,
        downsamples: Vec<f64>,
    ) -> Result<Self, SlideError> {
        if width == 0 || height == 0 {
            return Err(SlideError::InvalidDimensions { width, height });
        }
        validate_downsamples(&downsamples)
            .map_err(|reason| SlideError::InvalidPyramid { reason })?;

        Ok(Self {
            width,
            height,
            downsamples,
            latency: None,
            reads: AtomicUsize::new(0),
        })
    }

    /// Sleep for `latency` on every region read, simulating slow storage.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of `read_region` calls served so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// Colour of the level-0 pixel at `(x, y)`.
    pub fn pixel_at(x: u64, y: u64) -> [u8; 4] {
        let dark = ((x / CHECKER_CELL) + (y / CHECKER_CELL)) % 2 == 1;
        let tint = ((x / CHECKER_CELL) * 37 % 200) as u8;
        if dark {
            [40, 40u8.saturating_add(tint / 2), 90, 255]
        } else {
            [230, 220u8.saturating_sub(tint / 4), 200, 255]
        }
    }
}

impl SlideSource for SyntheticSlide {
    fn level_count(&self) -> usize {
        self.downsamples.len()
    }

    fn level_downsample(&self, level: usize) -> Option<f64> {
        self.downsamples.get(level).copied()
    }

    fn level_dimensions(&self, level: usize) -> Option<(u64, u64)> {
        let ds = self.level_downsample(level)?;
        Some((
            (self.width as f64 / ds).ceil() as u64,
            (self.height as f64 / ds).ceil() as u64,
        ))
    }

    fn read_region(
        &self,
        level: usize,
        x: i64,
        y: i64,
        width: u32,
        height: u32,
    ) -> Option<Vec<u8>> {
        let ds = self.level_downsample(level)?;
        let (level_width, level_height) = self.level_dimensions(level)?;

        if x < 0 || y < 0 || width == 0 || height == 0 {
            return None;
        }

        let left = (x as f64 / ds).round() as u64;
        let top = (y as f64 / ds).round() as u64;
        if left + u64::from(width) > level_width || top + u64::from(height) > level_height {
            return None;
        }

        self.reads.fetch_add(1, Ordering::Relaxed);
        if let Some(latency) = self.latency {
            thread::sleep(latency);
        }

        let mut pixels = Vec::with_capacity(width as usize * height as usize * BYTES_PER_PIXEL);
        for row in 0..u64::from(height) {
            let y0 = ((top + row) as f64 * ds) as u64;
            for col in 0..u64::from(width) {
                let x0 = ((left + col) as f64 * ds) as u64;
                pixels.extend_from_slice(&Self::pixel_at(x0, y0));
            }
        }

        Some(pixels)
    }
}
