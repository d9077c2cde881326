//! Background tile loading.
//!
//! `TileLoadThreadPool` keeps slide decoding off the render thread. Requests
//! are queued by priority; a fixed set of worker threads pops them, reads the
//! region from the [`SlideSource`], inserts the result into the shared
//! [`TileCache`] and reports the key through a ready callback.
//!
//! # Locking
//!
//! The queue, the pending set and the cache each have their own lock and no
//! code path holds two of them at once. Workers sleep on a condition variable
//! paired with the queue lock.
//!
//! # Failure
//!
//! A region that cannot be read is dropped without retry. Its key leaves the
//! pending set, so the renderer requests it again the next time the tile is
//! visible.

use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::error::PoolError;
use crate::slide::SlideSource;

use super::cache::{TileCache, TileData, TileKey};
use super::request::TileLoadRequest;

/// Default number of decode workers.
pub const DEFAULT_WORKER_THREADS: usize = 4;

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 512;

/// Invoked from a worker thread once a tile is in the cache.
pub type TileReadyCallback = Arc<dyn Fn(TileKey) + Send + Sync>;

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`TileLoadThreadPool`].
///
/// The source and cache are required up front, so a pool can never be
/// started without them.
pub struct TileLoadThreadPoolBuilder<S: ?Sized> {
    source: Arc<S>,
    cache: Arc<TileCache>,
    on_tile_ready: Option<TileReadyCallback>,
    num_workers: usize,
    tile_size: u32,
}

impl<S: SlideSource + ?Sized + 'static> TileLoadThreadPoolBuilder<S> {
    /// Set the number of worker threads (default 4).
    pub fn workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    /// Set the tile edge length in level pixels (default 512).
    pub fn tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    /// Register the callback invoked after each tile lands in the cache.
    pub fn on_tile_ready<F>(mut self, callback: F) -> Self
    where
        F: Fn(TileKey) + Send + Sync + 'static,
    {
        self.on_tile_ready = Some(Arc::new(callback));
        self
    }

    /// Build the pool. Workers are not running until [`TileLoadThreadPool::start`].
    pub fn build(self) -> Result<TileLoadThreadPool<S>, PoolError> {
        if self.num_workers == 0 {
            return Err(PoolError::NoWorkers);
        }

        Ok(TileLoadThreadPool {
            shared: Arc::new(Shared {
                source: self.source,
                cache: self.cache,
                on_tile_ready: self.on_tile_ready,
                tile_size: self.tile_size.max(1),
                queue: Mutex::new(BinaryHeap::new()),
                available: Condvar::new(),
                pending: Mutex::new(HashMap::new()),
                next_sequence: AtomicU64::new(0),
                running: AtomicBool::new(false),
                active: AtomicUsize::new(0),
            }),
            workers: Vec::new(),
            num_workers: self.num_workers,
        })
    }
}

// =============================================================================
// Shared State
// =============================================================================

struct Shared<S: ?Sized> {
    source: Arc<S>,
    cache: Arc<TileCache>,
    on_tile_ready: Option<TileReadyCallback>,
    tile_size: u32,

    queue: Mutex<BinaryHeap<TileLoadRequest>>,
    available: Condvar,

    /// Keys that are queued or being decoded, mapped to the sequence of the
    /// one request that owns them. Queue entries with another sequence are
    /// leftovers of a cancelled request.
    pending: Mutex<HashMap<TileKey, u64>>,
    next_sequence: AtomicU64,

    running: AtomicBool,
    active: AtomicUsize,
}

impl<S: SlideSource + ?Sized> Shared<S> {
    /// Block until a request is available; `None` once the pool stops.
    fn next_request(&self) -> Option<TileLoadRequest> {
        let mut queue = self.queue.lock();
        loop {
            if !self.running.load(Ordering::Acquire) {
                return None;
            }
            if let Some(request) = queue.pop() {
                return Some(request);
            }
            self.available.wait(&mut queue);
        }
    }

    fn worker_loop(&self, index: usize) {
        debug!(worker = index, "Tile worker started");

        while let Some(request) = self.next_request() {
            if !self.owns(&request) {
                debug!(tile = %request.key, "Skipping cancelled tile request");
                continue;
            }

            self.active.fetch_add(1, Ordering::AcqRel);
            self.process(&request);
            self.active.fetch_sub(1, Ordering::AcqRel);

            let mut pending = self.pending.lock();
            if pending.get(&request.key) == Some(&request.sequence) {
                pending.remove(&request.key);
            }
        }

        debug!(worker = index, "Tile worker exiting");
    }

    /// Whether `request` is still the outstanding request for its key.
    fn owns(&self, request: &TileLoadRequest) -> bool {
        self.pending.lock().get(&request.key) == Some(&request.sequence)
    }

    fn process(&self, request: &TileLoadRequest) {
        let key = request.key;

        // A cancelled decode of the same key may have finished meanwhile
        if self.cache.has_tile(&key) {
            self.notify_ready(key);
            return;
        }

        let level = key.level as usize;
        let (Some(downsample), Some((level_width, level_height))) = (
            self.source.level_downsample(level),
            self.source.level_dimensions(level),
        ) else {
            debug!(tile = %key, "Tile level out of range");
            return;
        };

        let tile_size = u64::from(self.tile_size);
        let level_x = u64::from(key.tile_x) * tile_size;
        let level_y = u64::from(key.tile_y) * tile_size;
        if level_x >= level_width || level_y >= level_height {
            debug!(tile = %key, "Tile outside level bounds");
            return;
        }

        // Edge tiles are cut to the level size
        let width = (level_width - level_x).min(tile_size) as u32;
        let height = (level_height - level_y).min(tile_size) as u32;

        // Region origin is addressed in level-0 coordinates
        let x0 = (level_x as f64 * downsample) as i64;
        let y0 = (level_y as f64 * downsample) as i64;

        let Some(pixels) = self.source.read_region(level, x0, y0, width, height) else {
            debug!(tile = %key, "Tile decode failed, dropping request");
            return;
        };

        let Some(tile) = TileData::from_rgba(width, height, pixels) else {
            warn!(
                tile = %key,
                width = width,
                height = height,
                "Decoder returned a buffer of the wrong size"
            );
            return;
        };

        self.cache.insert(key, tile);
        self.notify_ready(key);
    }

    fn notify_ready(&self, key: TileKey) {
        if let Some(callback) = &self.on_tile_ready {
            callback(key);
        }
    }
}

// =============================================================================
// Thread Pool
// =============================================================================

/// Fixed pool of tile decode workers fed by a priority queue.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use wsi_viewer::slide::SyntheticSlide;
/// use wsi_viewer::tile::{TileCache, TileKey, TileLoadPriority, TileLoadRequest, TileLoadThreadPool};
///
/// let cache = Arc::new(TileCache::with_capacity(64 * 1024 * 1024));
/// let (tx, rx) = std::sync::mpsc::channel();
///
/// let mut pool = TileLoadThreadPool::builder(Arc::new(SyntheticSlide::new(2048, 2048)), cache.clone())
///     .workers(2)
///     .on_tile_ready(move |key| {
///         let _ = tx.send(key);
///     })
///     .build()
///     .unwrap();
/// pool.start().unwrap();
///
/// let key = TileKey::new(0, 1, 1);
/// pool.submit_request(TileLoadRequest::new(key, TileLoadPriority::Urgent));
///
/// assert_eq!(rx.recv().unwrap(), key);
/// assert!(cache.has_tile(&key));
/// pool.stop();
/// ```
pub struct TileLoadThreadPool<S: SlideSource + ?Sized + 'static> {
    shared: Arc<Shared<S>>,
    workers: Vec<JoinHandle<()>>,
    num_workers: usize,
}

impl<S: SlideSource + ?Sized + 'static> TileLoadThreadPool<S> {
    /// Start building a pool that decodes from `source` into `cache`.
    pub fn builder(source: Arc<S>, cache: Arc<TileCache>) -> TileLoadThreadPoolBuilder<S> {
        TileLoadThreadPoolBuilder {
            source,
            cache,
            on_tile_ready: None,
            num_workers: DEFAULT_WORKER_THREADS,
            tile_size: DEFAULT_TILE_SIZE,
        }
    }

    /// Spawn the worker threads. Does nothing if already running.
    pub fn start(&mut self) -> Result<(), PoolError> {
        if !self.workers.is_empty() {
            return Ok(());
        }

        {
            let _queue = self.shared.queue.lock();
            self.shared.running.store(true, Ordering::Release);
        }

        for index in 0..self.num_workers {
            let shared = Arc::clone(&self.shared);
            let spawned = thread::Builder::new()
                .name(format!("wsi-tile-worker-{}", index))
                .spawn(move || shared.worker_loop(index));

            match spawned {
                Ok(handle) => self.workers.push(handle),
                Err(e) => {
                    self.stop();
                    return Err(PoolError::Spawn {
                        index,
                        message: e.to_string(),
                    });
                }
            }
        }

        // Requests submitted before start are waiting in the queue
        self.shared.available.notify_all();

        info!(workers = self.num_workers, "Tile loader started");
        Ok(())
    }

    /// Stop all workers and discard queued work.
    ///
    /// Blocks until every worker has exited. A decode already in progress is
    /// finished (and its tile cached) first; nothing new is dequeued. The
    /// queue and pending set are emptied so a later `start` begins clean.
    pub fn stop(&mut self) {
        {
            let _queue = self.shared.queue.lock();
            self.shared.running.store(false, Ordering::Release);
        }
        self.shared.available.notify_all();

        let had_workers = !self.workers.is_empty();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("Tile worker panicked");
            }
        }

        self.shared.queue.lock().clear();
        self.shared.pending.lock().clear();

        if had_workers {
            info!("Tile loader stopped");
        }
    }

    /// Queue a tile for decoding.
    ///
    /// Nothing happens if the key is already pending or already cached.
    /// Returns `true` if the request was queued.
    pub fn submit_request(&self, mut request: TileLoadRequest) -> bool {
        let sequence = self.shared.next_sequence.fetch_add(1, Ordering::Relaxed);
        {
            let mut pending = self.shared.pending.lock();
            if pending.contains_key(&request.key) {
                return false;
            }
            pending.insert(request.key, sequence);
        }

        if self.shared.cache.has_tile(&request.key) {
            let mut pending = self.shared.pending.lock();
            if pending.get(&request.key) == Some(&sequence) {
                pending.remove(&request.key);
            }
            return false;
        }

        request.sequence = sequence;
        self.shared.queue.lock().push(request);

        self.shared.available.notify_one();
        true
    }

    /// Cancel a request that has not started yet.
    ///
    /// The queue entry stays behind and is skipped when a worker pops it,
    /// even if the key has been submitted again since. A decode already in
    /// progress completes normally.
    pub fn cancel_request(&self, key: &TileKey) -> bool {
        self.shared.pending.lock().remove(key).is_some()
    }

    /// Drop every queued request.
    pub fn cancel_all_requests(&self) {
        self.shared.queue.lock().clear();
        self.shared.pending.lock().clear();
    }

    /// Check if a tile is queued or being decoded.
    pub fn is_pending(&self, key: &TileKey) -> bool {
        self.shared.pending.lock().contains_key(key)
    }

    /// Number of keys queued or in flight.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Current queue depth, including cancelled entries not yet popped.
    pub fn queued_count(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Number of workers currently decoding.
    pub fn active_count(&self) -> usize {
        self.shared.active.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        !self.workers.is_empty()
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn tile_size(&self) -> u32 {
        self.shared.tile_size
    }

    pub fn cache(&self) -> &Arc<TileCache> {
        &self.shared.cache
    }
}

impl<S: SlideSource + ?Sized + 'static> Drop for TileLoadThreadPool<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// Tests
// =============================================================================
