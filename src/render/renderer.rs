//! Per-frame tile orchestration.
//!
//! # Frame
//!
//! ```text
//!  Viewport ──► select_level ──► enumerate_visible_tiles
//!                                       │
//!                       for each key    ▼
//!          ┌────────────── load_and_render_tile ─────────────┐
//!          │                     │                            │
//!      cache hit          miss + fallback              miss, nothing cached
//!    draw tile as-is    draw cropped coarse tile        draw nothing
//!                        submit VISIBLE load            submit URGENT load
//!                                       │
//!                                       ▼
//!                   prefetch ring (ADJACENT) ──► prune textures
//! ```
//!
//! Workers report finished tiles through a callback that only touches the
//! renderer's pending set (own mutex) and a channel. Everything else here
//! runs on the render thread.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::PoolError;
use crate::slide::SlideSource;
use crate::tile::{
    CacheStats, TileCache, TileData, TileKey, TileLoadPriority, TileLoadRequest,
    TileLoadThreadPool, DEFAULT_TILE_CACHE_CAPACITY, DEFAULT_TILE_SIZE, DEFAULT_WORKER_THREADS,
};
use crate::viewport::{Rect, Vec2, Viewport};

use super::fallback::{fallback_crop, fallback_key, tile_footprint, FallbackCrop};
use super::presenter::{PixelRect, Presenter};

/// Default width of the prefetch ring around the visible tiles.
pub const DEFAULT_PREFETCH_MARGIN: u32 = 1;

// =============================================================================
// Configuration
// =============================================================================

/// Settings for a [`SlideRenderer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererConfig {
    /// Tile cache budget in bytes
    pub cache_memory: usize,

    /// Number of decode workers
    pub workers: usize,

    /// Tile edge length in level pixels
    pub tile_size: u32,

    /// Rings of tiles around the visible range to prefetch (0 disables)
    pub prefetch_margin: u32,

    /// How many coarser levels to search for a fallback (`None` = all)
    pub max_fallback_depth: Option<usize>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            cache_memory: DEFAULT_TILE_CACHE_CAPACITY,
            workers: DEFAULT_WORKER_THREADS,
            tile_size: DEFAULT_TILE_SIZE,
            prefetch_margin: DEFAULT_PREFETCH_MARGIN,
            max_fallback_depth: None,
        }
    }
}

impl RendererConfig {
    pub fn with_cache_memory(mut self, bytes: usize) -> Self {
        self.cache_memory = bytes;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size.max(1);
        self
    }

    pub fn with_prefetch_margin(mut self, margin: u32) -> Self {
        self.prefetch_margin = margin;
        self
    }

    pub fn with_max_fallback_depth(mut self, depth: Option<usize>) -> Self {
        self.max_fallback_depth = depth;
        self
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// How one visible tile was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileOutcome {
    /// Drawn from the cache at full resolution
    Hit,

    /// Drawn from a coarser cached tile while the real one loads
    Fallback,

    /// Nothing drawn; an urgent load was requested
    Missing,
}

/// Counters for a single rendered frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameStats {
    pub level: usize,
    pub visible_tiles: usize,
    pub cache_hits: usize,
    pub fallbacks: usize,
    pub missing: usize,
    pub prefetched: usize,
}

impl FrameStats {
    /// Whether every visible tile was drawn at full resolution.
    pub fn is_complete(&self) -> bool {
        self.cache_hits == self.visible_tiles
    }
}

/// Snapshot of renderer state.
#[derive(Debug, Clone, Serialize)]
pub struct RendererStats {
    pub cache: CacheStats,
    pub pending_tiles: usize,
    pub queued_requests: usize,
    pub active_workers: usize,
    pub textures: usize,
    pub level: usize,
}

/// Inclusive tile index range at one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TileRange {
    level: u32,
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl TileRange {
    fn contains(&self, x: u32, y: u32) -> bool {
        (self.x0..=self.x1).contains(&x) && (self.y0..=self.y1).contains(&y)
    }

    /// Row-major keys.
    fn keys(&self) -> impl Iterator<Item = TileKey> + '_ {
        (self.y0..=self.y1)
            .flat_map(move |y| (self.x0..=self.x1).map(move |x| TileKey::new(self.level, x, y)))
    }
}

struct Fallback {
    key: TileKey,
    tile: Arc<TileData>,
    crop: FallbackCrop,
    /// The crop fills the whole target footprint
    complete: bool,
}

// =============================================================================
// Renderer
// =============================================================================

/// Draws the visible part of a slide, one tile at a time.
///
/// Owns the tile loader and a per-tile texture cache in the presenter. The
/// tile cache is shared and may outlive the renderer.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use wsi_viewer::render::{Canvas, RendererConfig, SlideRenderer};
/// use wsi_viewer::slide::SyntheticSlide;
/// use wsi_viewer::viewport::Viewport;
///
/// let slide = Arc::new(SyntheticSlide::new(8192, 8192));
/// let viewport = Viewport::new(640, 480, 8192, 8192);
/// let config = RendererConfig::default().with_workers(2);
///
/// let mut renderer = SlideRenderer::new(slide, Canvas::new(640, 480), config).unwrap();
/// renderer.initialize().unwrap();
///
/// // First frame only requests tiles; later frames draw them
/// let mut frame = renderer.render(&viewport);
/// for _ in 0..50 {
///     if frame.is_complete() {
///         break;
///     }
///     renderer.wait_ready(Duration::from_millis(100));
///     frame = renderer.render(&viewport);
/// }
/// assert!(frame.is_complete());
/// ```
pub struct SlideRenderer<S, P>
where
    S: SlideSource + ?Sized + 'static,
    P: Presenter,
{
    source: Arc<S>,
    cache: Arc<TileCache>,
    pool: TileLoadThreadPool<S>,
    presenter: P,
    config: RendererConfig,

    textures: HashMap<TileKey, P::Handle>,

    /// Keys this renderer submitted that have not reported ready
    pending: Arc<Mutex<HashSet<TileKey>>>,
    ready: Receiver<TileKey>,

    current_level: usize,
}

impl<S, P> SlideRenderer<S, P>
where
    S: SlideSource + ?Sized + 'static,
    P: Presenter,
{
    /// Create a renderer with its own tile cache sized by `config`.
    pub fn new(source: Arc<S>, presenter: P, config: RendererConfig) -> Result<Self, PoolError> {
        let cache = Arc::new(TileCache::with_capacity(config.cache_memory));
        Self::with_cache(source, cache, presenter, config)
    }

    /// Create a renderer drawing from an existing tile cache.
    ///
    /// `config.cache_memory` is ignored.
    pub fn with_cache(
        source: Arc<S>,
        cache: Arc<TileCache>,
        presenter: P,
        config: RendererConfig,
    ) -> Result<Self, PoolError> {
        let pending: Arc<Mutex<HashSet<TileKey>>> = Arc::new(Mutex::new(HashSet::new()));
        let (ready_tx, ready_rx) = crossbeam_channel::unbounded();

        let on_ready_pending = Arc::clone(&pending);
        let pool = TileLoadThreadPool::builder(Arc::clone(&source), Arc::clone(&cache))
            .workers(config.workers)
            .tile_size(config.tile_size)
            .on_tile_ready(move |key| {
                // Worker thread: pending set and channel only
                on_ready_pending.lock().remove(&key);
                let _ = ready_tx.send(key);
            })
            .build()?;

        Ok(Self {
            source,
            cache,
            pool,
            presenter,
            config,
            textures: HashMap::new(),
            pending,
            ready: ready_rx,
            current_level: 0,
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start the tile loader. Calling it again is a no-op.
    pub fn initialize(&mut self) -> Result<(), PoolError> {
        if self.pool.is_running() {
            return Ok(());
        }

        self.pool.start()?;
        info!(
            levels = self.source.level_count(),
            tile_size = self.config.tile_size,
            workers = self.config.workers,
            "Slide renderer initialized"
        );
        Ok(())
    }

    /// Stop the loader and release every texture. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        self.pool.stop();
        self.pending.lock().clear();
        while self.ready.try_recv().is_ok() {}

        for (_, handle) in self.textures.drain() {
            self.presenter.release(handle);
        }
    }

    // =========================================================================
    // Frame
    // =========================================================================

    /// Draw one frame for `viewport`.
    ///
    /// Never blocks on decoding: missing tiles are requested and show up on a
    /// later frame.
    pub fn render(&mut self, viewport: &Viewport) -> FrameStats {
        // This frame draws every tile that has landed so far
        let arrived = self.drain_ready();

        let mut stats = FrameStats::default();
        if self.source.level_count() == 0 {
            return stats;
        }

        let level = self.select_level(viewport.zoom());
        self.current_level = level;
        stats.level = level;

        let range = self.visible_tile_range(viewport, level);
        if let Some(range) = range {
            for key in range.keys() {
                stats.visible_tiles += 1;
                match self.load_and_render_tile(key, viewport, level) {
                    TileOutcome::Hit => stats.cache_hits += 1,
                    TileOutcome::Fallback => stats.fallbacks += 1,
                    TileOutcome::Missing => stats.missing += 1,
                }
            }

            stats.prefetched = self.prefetch_around(&range);
        }

        self.prune_textures();
        self.prune_pending();

        debug!(
            level = stats.level,
            visible = stats.visible_tiles,
            hits = stats.cache_hits,
            fallbacks = stats.fallbacks,
            missing = stats.missing,
            prefetched = stats.prefetched,
            arrived = arrived,
            "Frame rendered"
        );

        stats
    }

    /// Pick the level whose downsample is closest to `1 / zoom`.
    ///
    /// On a tie the finer level (smaller downsample) wins.
    pub fn select_level(&self, zoom: f64) -> usize {
        if !(zoom > 0.0 && zoom.is_finite()) {
            return 0;
        }

        let target = 1.0 / zoom;
        let mut best: Option<(usize, f64, f64)> = None;

        for level in 0..self.source.level_count() {
            let Some(downsample) = self.source.level_downsample(level) else {
                continue;
            };
            let diff = (downsample - target).abs();

            let better = match best {
                None => true,
                Some((_, best_diff, best_downsample)) => {
                    diff < best_diff || (diff == best_diff && downsample < best_downsample)
                }
            };
            if better {
                best = Some((level, diff, downsample));
            }
        }

        best.map_or(0, |(level, _, _)| level)
    }

    /// Keys of every tile at `level` that overlaps the visible region,
    /// row-major.
    pub fn enumerate_visible_tiles(&self, viewport: &Viewport, level: usize) -> Vec<TileKey> {
        self.visible_tile_range(viewport, level)
            .map(|range| range.keys().collect())
            .unwrap_or_default()
    }

    fn visible_tile_range(&self, viewport: &Viewport, level: usize) -> Option<TileRange> {
        let info = self.source.level_info(level)?;
        if info.width == 0 || info.height == 0 || !(info.downsample > 0.0) {
            return None;
        }

        let region = viewport.visible_region();
        let x0 = region.x / info.downsample;
        let y0 = region.y / info.downsample;
        let x1 = region.right() / info.downsample;
        let y1 = region.bottom() / info.downsample;

        let width = info.width as f64;
        let height = info.height as f64;
        if x1 <= 0.0 || y1 <= 0.0 || x0 >= width || y0 >= height {
            return None;
        }

        let tile_size = f64::from(self.config.tile_size);
        let (tiles_x, tiles_y) = info.tile_count(self.config.tile_size);
        let last_x = tiles_x.saturating_sub(1) as f64;
        let last_y = tiles_y.saturating_sub(1) as f64;

        // Clamp to the level, then to the last tile so an exact right edge
        // does not enumerate a tile past the end
        let index = |value: f64, extent: f64, last: f64| -> u32 {
            (value.clamp(0.0, extent) / tile_size).floor().min(last) as u32
        };

        Some(TileRange {
            level: level as u32,
            x0: index(x0, width, last_x),
            y0: index(y0, height, last_y),
            x1: index(x1, width, last_x),
            y1: index(y1, height, last_y),
        })
    }

    /// Draw one tile, or the best stand-in for it, and request it if missing.
    pub fn load_and_render_tile(
        &mut self,
        key: TileKey,
        viewport: &Viewport,
        level: usize,
    ) -> TileOutcome {
        let Some(downsample) = self.source.level_downsample(level) else {
            return TileOutcome::Missing;
        };

        if let Some(tile) = self.cache.get(&key) {
            let footprint =
                tile_footprint(key, downsample, self.config.tile_size, tile.width(), tile.height());
            self.draw(key, &tile, None, screen_rect(viewport, &footprint));
            return TileOutcome::Hit;
        }

        let target = self.target_footprint(key, level, downsample);
        let (outcome, priority) = match self.find_best_fallback(key, level, downsample, &target) {
            Some(fallback) => {
                let dest = screen_rect(viewport, &fallback.crop.target);
                self.draw(fallback.key, &fallback.tile, Some(fallback.crop.source), dest);

                // Part of the footprint is still blank on screen
                let priority = if fallback.complete {
                    TileLoadPriority::Visible
                } else {
                    TileLoadPriority::Urgent
                };
                (TileOutcome::Fallback, priority)
            }
            None => (TileOutcome::Missing, TileLoadPriority::Urgent),
        };
        self.request_tile(key, priority);

        outcome
    }

    /// Slide-space footprint of `key`, cut at the level's right/bottom edge.
    fn target_footprint(&self, key: TileKey, level: usize, downsample: f64) -> Rect {
        let tile_size = self.config.tile_size;
        let (width, height) = match self.source.level_dimensions(level) {
            Some((level_width, level_height)) => (
                edge_extent(level_width, key.tile_x, tile_size),
                edge_extent(level_height, key.tile_y, tile_size),
            ),
            None => (tile_size, tile_size),
        };
        tile_footprint(key, downsample, tile_size, width, height)
    }

    /// Search coarser levels for a cached tile covering `target`.
    ///
    /// The nearest level whose tile covers the whole footprint wins. If none
    /// does, the nearest partial cover is used.
    fn find_best_fallback(
        &self,
        key: TileKey,
        level: usize,
        downsample: f64,
        target: &Rect,
    ) -> Option<Fallback> {
        let level_count = self.source.level_count();
        let last = match self.config.max_fallback_depth {
            Some(depth) => (level + 1).saturating_add(depth).min(level_count),
            None => level_count,
        };

        let mut best: Option<Fallback> = None;
        for fallback_level in (level + 1)..last {
            let Some(fallback_downsample) = self.source.level_downsample(fallback_level) else {
                continue;
            };
            let Some(candidate) =
                fallback_key(key, downsample, fallback_level as u32, fallback_downsample)
            else {
                continue;
            };

            // Probe without touching recency or the hit/miss counters
            let Some(tile) = self.cache.peek(&candidate) else {
                continue;
            };
            let Some(crop) = fallback_crop(
                *target,
                candidate,
                fallback_downsample,
                self.config.tile_size,
                tile.width(),
                tile.height(),
            ) else {
                continue;
            };

            let complete = crop.covers(target);
            if complete || best.is_none() {
                best = Some(Fallback {
                    key: candidate,
                    tile,
                    crop,
                    complete,
                });
            }
            if complete {
                break;
            }
        }

        // Touch the chosen tile only
        let chosen = best?;
        self.cache.get(&chosen.key);
        Some(chosen)
    }

    /// Submit `key` unless it is already on its way. Returns `true` if queued.
    fn request_tile(&self, key: TileKey, priority: TileLoadPriority) -> bool {
        if self.pool.is_pending(&key) {
            return false;
        }

        self.pending.lock().insert(key);
        if self.pool.submit_request(TileLoadRequest::new(key, priority)) {
            true
        } else {
            self.pending.lock().remove(&key);
            false
        }
    }

    /// Request the ring of tiles around `visible` at adjacent priority.
    fn prefetch_around(&self, visible: &TileRange) -> usize {
        let margin = self.config.prefetch_margin;
        if margin == 0 {
            return 0;
        }

        let Some(info) = self.source.level_info(visible.level as usize) else {
            return 0;
        };
        let (tiles_x, tiles_y) = info.tile_count(self.config.tile_size);
        if tiles_x == 0 || tiles_y == 0 {
            return 0;
        }

        let ring = TileRange {
            level: visible.level,
            x0: visible.x0.saturating_sub(margin),
            y0: visible.y0.saturating_sub(margin),
            x1: (u64::from(visible.x1) + u64::from(margin)).min(tiles_x - 1) as u32,
            y1: (u64::from(visible.y1) + u64::from(margin)).min(tiles_y - 1) as u32,
        };

        ring.keys()
            .filter(|key| !visible.contains(key.tile_x, key.tile_y))
            .filter(|key| !self.cache.has_tile(key))
            .filter(|key| self.request_tile(*key, TileLoadPriority::Adjacent))
            .count()
    }

    fn draw(&mut self, key: TileKey, tile: &TileData, source: Option<PixelRect>, dest: PixelRect) {
        let handle = match self.textures.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                match self
                    .presenter
                    .upload(tile.pixels(), tile.width(), tile.height())
                {
                    Some(handle) => entry.insert(handle),
                    None => {
                        debug!(tile = %key, "Presenter rejected tile upload");
                        return;
                    }
                }
            }
        };

        self.presenter.render_copy(handle, source, dest);
    }

    /// Release textures whose tiles have left the cache.
    fn prune_textures(&mut self) {
        let stale: Vec<TileKey> = self
            .textures
            .keys()
            .filter(|key| !self.cache.has_tile(key))
            .copied()
            .collect();

        for key in stale {
            if let Some(handle) = self.textures.remove(&key) {
                self.presenter.release(handle);
            }
        }
    }

    /// Forget keys the loader dropped without a ready notification.
    fn prune_pending(&self) {
        let tracked: Vec<TileKey> = self.pending.lock().iter().copied().collect();
        let dropped: Vec<TileKey> = tracked
            .into_iter()
            .filter(|key| !self.pool.is_pending(key))
            .collect();

        if !dropped.is_empty() {
            let mut pending = self.pending.lock();
            for key in &dropped {
                pending.remove(key);
            }
        }
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Number of tiles that became ready since the last call or frame.
    ///
    /// [`render`](Self::render) consumes notifications itself, so a host
    /// that only renders never lets them pile up.
    pub fn drain_ready(&self) -> usize {
        self.ready.try_iter().count()
    }

    /// Wait up to `timeout` for at least one tile, then drain.
    ///
    /// Returns the number of tiles that became ready.
    pub fn wait_ready(&self, timeout: Duration) -> usize {
        match self.ready.recv_timeout(timeout) {
            Ok(_) => 1 + self.drain_ready(),
            Err(_) => 0,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn stats(&self) -> RendererStats {
        RendererStats {
            cache: self.cache.stats(),
            pending_tiles: self.pending.lock().len(),
            queued_requests: self.pool.queued_count(),
            active_workers: self.pool.active_count(),
            textures: self.textures.len(),
            level: self.current_level,
        }
    }

    /// Whether any tile is queued or decoding.
    pub fn has_pending_tiles(&self) -> bool {
        self.pool.pending_count() > 0
    }

    pub fn is_pending(&self, key: &TileKey) -> bool {
        self.pending.lock().contains(key)
    }

    pub fn is_initialized(&self) -> bool {
        self.pool.is_running()
    }

    pub fn current_level(&self) -> usize {
        self.current_level
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<TileCache> {
        &self.cache
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
}

impl<S, P> Drop for SlideRenderer<S, P>
where
    S: SlideSource + ?Sized + 'static,
    P: Presenter,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn screen_rect(viewport: &Viewport, slide: &Rect) -> PixelRect {
    PixelRect::from_corners(
        viewport.slide_to_screen(Vec2::new(slide.x, slide.y)),
        viewport.slide_to_screen(Vec2::new(slide.right(), slide.bottom())),
    )
}

/// Pixels of a tile along one axis, cut at the level edge.
fn edge_extent(level_extent: u64, index: u32, tile_size: u32) -> u32 {
    let start = u64::from(index) * u64::from(tile_size);
    level_extent.saturating_sub(start).min(u64::from(tile_size)) as u32
}
