//! Test utilities for integration tests.
//!
//! This module provides a configurable mock slide source that records every
//! region read, a presenter that records uploads and draws, and small helpers
//! for building tiles and viewports.

use std::collections::HashSet;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use wsi_viewer::render::{PixelRect, Presenter};
use wsi_viewer::slide::{SlideSource, BYTES_PER_PIXEL};
use wsi_viewer::tile::TileData;
use wsi_viewer::viewport::{AnimationMode, Vec2, Viewport};

// =============================================================================
// Mock Slide Source
// =============================================================================

/// One recorded `read_region` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionRead {
    pub level: usize,
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

/// A slide source with explicit level downsamples that records every read.
///
/// Every pixel of level `n` is `[n, 0, 0, 255]`, so the level a tile came
/// from can be told from its pixels.
pub struct MockSlide {
    width: u64,
    height: u64,
    downsamples: Vec<f64>,
    failing_levels: HashSet<usize>,
    delay: Option<Duration>,
    reads: Mutex<Vec<RegionRead>>,
}

impl MockSlide {
    pub fn new(width: u64, height: u64, downsamples: Vec<f64>) -> Self {
        Self {
            width,
            height,
            downsamples,
            failing_levels: HashSet::new(),
            delay: None,
            reads: Mutex::new(Vec::new()),
        }
    }

    /// Make every read at `level` fail.
    pub fn failing_level(mut self, level: usize) -> Self {
        self.failing_levels.insert(level);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn reads(&self) -> Vec<RegionRead> {
        self.reads.lock().clone()
    }

    pub fn read_count(&self) -> usize {
        self.reads.lock().len()
    }
}

impl SlideSource for MockSlide {
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
        self.reads.lock().push(RegionRead {
            level,
            x,
            y,
            width,
            height,
        });

        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }

        if self.failing_levels.contains(&level) {
            return None;
        }

        Some([level as u8, 0, 0, 255].repeat(width as usize * height as usize))
    }
}

// =============================================================================
// Recording Presenter
// =============================================================================

/// One recorded `render_copy` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    pub handle: usize,
    pub source: Option<PixelRect>,
    pub dest: PixelRect,
}

/// A presenter that hands out numbered handles and records what it is asked
/// to do.
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    pub uploads: Vec<(u32, u32)>,
    pub draws: Vec<DrawCall>,
    pub released: Vec<usize>,
}

impl RecordingPresenter {
    pub fn live_handles(&self) -> usize {
        self.uploads.len() - self.released.len()
    }
}

impl Presenter for RecordingPresenter {
    type Handle = usize;

    fn upload(&mut self, pixels: &[u8], width: u32, height: u32) -> Option<usize> {
        assert_eq!(pixels.len(), width as usize * height as usize * BYTES_PER_PIXEL);
        self.uploads.push((width, height));
        Some(self.uploads.len() - 1)
    }

    fn render_copy(&mut self, handle: &usize, source: Option<PixelRect>, dest: PixelRect) {
        self.draws.push(DrawCall {
            handle: *handle,
            source,
            dest,
        });
    }

    fn release(&mut self, handle: usize) {
        self.released.push(handle);
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// An opaque tile filled with one colour.
pub fn solid_tile(width: u32, height: u32, value: u8) -> TileData {
    let pixels = [value, value, value, 255].repeat(width as usize * height as usize);
    TileData::from_rgba(width, height, pixels).unwrap()
}

/// A viewport at zoom ~1.0 with its top-left corner on the slide origin.
pub fn viewport_at_origin(window_width: u32, window_height: u32, slide_width: u64, slide_height: u64) -> Viewport {
    let mut viewport = Viewport::new(window_width, window_height, slide_width, slide_height);
    let factor = 1.0 / viewport.zoom();
    viewport.zoom_at_point(Vec2::new(0.0, 0.0), factor, AnimationMode::Instant);
    viewport.pan(Vec2::new(-1e9, -1e9), AnimationMode::Instant);
    viewport
}

/// Poll `condition` until it holds or `timeout` expires.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}
