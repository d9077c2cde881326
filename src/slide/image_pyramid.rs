//! Slide source backed by an ordinary raster image.
//!
//! The image is decoded once with the `image` crate and halved repeatedly to
//! build an in-memory pyramid. This is only practical for images that fit in
//! memory, but it exercises the full renderer path with real pixel data.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};
use tracing::debug;

use crate::error::SlideError;

use super::reader::SlideSource;

/// In-memory pyramid built from a decoded raster.
pub struct ImagePyramid {
    levels: Vec<RgbaImage>,
    downsamples: Vec<f64>,
}

impl ImagePyramid {
    /// Decode `path` and build levels until the coarsest fits in `tile_size`.
    pub fn open(path: impl AsRef<Path>, tile_size: u32) -> Result<Self, SlideError> {
        let image = image::open(path.as_ref())?;
        Self::from_image(image, tile_size)
    }

    /// Build a pyramid from an already decoded image.
    pub fn from_image(image: DynamicImage, tile_size: u32) -> Result<Self, SlideError> {
        let base = image.into_rgba8();
        let (width, height) = base.dimensions();
        if width == 0 || height == 0 {
            return Err(SlideError::InvalidDimensions {
                width: u64::from(width),
                height: u64::from(height),
            });
        }

        let tile_size = tile_size.max(1);
        let mut levels = vec![base];
        let mut downsamples = vec![1.0];

        loop {
            let (w, h) = levels[levels.len() - 1].dimensions();
            if (w <= tile_size && h <= tile_size) || (w == 1 && h == 1) {
                break;
            }
            let next_w = w.div_ceil(2);
            let next_h = h.div_ceil(2);
            let next = imageops::resize(&levels[levels.len() - 1], next_w, next_h, FilterType::Triangle);
            downsamples.push(downsamples[downsamples.len() - 1] * 2.0);
            levels.push(next);
        }

        debug!(
            width = width,
            height = height,
            levels = levels.len(),
            "Built in-memory image pyramid"
        );

        Ok(Self {
            levels,
            downsamples,
        })
    }
}

impl SlideSource for ImagePyramid {
    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn level_downsample(&self, level: usize) -> Option<f64> {
        self.downsamples.get(level).copied()
    }

    fn level_dimensions(&self, level: usize) -> Option<(u64, u64)> {
        let (w, h) = self.levels.get(level)?.dimensions();
        Some((u64::from(w), u64::from(h)))
    }

    fn read_region(
        &self,
        level: usize,
        x: i64,
        y: i64,
        width: u32,
        height: u32,
    ) -> Option<Vec<u8>> {
        let image = self.levels.get(level)?;
        let ds = self.downsamples[level];

        if x < 0 || y < 0 || width == 0 || height == 0 {
            return None;
        }

        let left = u32::try_from((x as f64 / ds).round() as u64).ok()?;
        let top = u32::try_from((y as f64 / ds).round() as u64).ok()?;
        if left.checked_add(width)? > image.width() || top.checked_add(height)? > image.height() {
            return None;
        }

        let region = imageops::crop_imm(image, left, top, width, height).to_image();
        Some(region.into_raw())
    }
}
