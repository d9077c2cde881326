//! Tile cache for decoded RGBA tiles.
//!
//! This module provides an LRU cache for decoded tiles, so that a tile read
//! once from the slide can be drawn on every following frame without touching
//! the decoder again.
//!
//! # Cache Key
//!
//! Tiles are cached by a composite key:
//! - Pyramid level
//! - Tile X coordinate
//! - Tile Y coordinate
//!
//! # Size-Based Eviction
//!
//! Tiles at different levels (and edge tiles) have different pixel
//! dimensions, so the cache budget is counted in bytes rather than entries.
//! Least-recently-used entries are evicted until the incoming tile fits. A
//! tile that is larger than the whole budget is still admitted once the cache
//! has been emptied: the budget is a soft target, refusing the tile would make
//! its level permanently unrenderable.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::slide::BYTES_PER_PIXEL;

/// Default cache capacity: 512MB
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 512 * 1024 * 1024;

// =============================================================================
// Cache Key
// =============================================================================

/// Identifies one fixed-size tile within one pyramid level's grid.
///
/// Keys order by level, then X, then Y.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileKey {
    /// Pyramid level (0 = highest resolution)
    pub level: u32,

    /// Tile X coordinate (0-indexed from left)
    pub tile_x: u32,

    /// Tile Y coordinate (0-indexed from top)
    pub tile_y: u32,
}

impl TileKey {
    /// Create a new tile key.
    pub const fn new(level: u32, tile_x: u32, tile_y: u32) -> Self {
        Self {
            level,
            tile_x,
            tile_y,
        }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}/{}_{}", self.level, self.tile_x, self.tile_y)
    }
}

// =============================================================================
// Tile Data
// =============================================================================

/// A decoded RGBA8 tile.
///
/// `TileData` is deliberately not `Clone`: a tile has exactly one owner, and
/// a copy would be counted twice against the cache budget.
#[derive(Debug)]
pub struct TileData {
    pixels: Box<[u8]>,
    width: u32,
    height: u32,
}

impl TileData {
    /// Wrap a decoded buffer.
    ///
    /// Returns `None` if `pixels` is not exactly `width * height * 4` bytes.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(BYTES_PER_PIXEL)?;
        if pixels.len() != expected {
            return None;
        }

        Some(Self {
            pixels: pixels.into_boxed_slice(),
            width,
            height,
        })
    }

    /// Row-major RGBA8 pixels.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes charged against the cache budget.
    pub fn memory_size(&self) -> usize {
        self.pixels.len()
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub tile_count: usize,
    pub memory_usage: usize,
    pub max_memory: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

// =============================================================================
// Tile Cache
// =============================================================================

struct CacheState {
    /// Recency-ordered entries; the lru crate keeps the map and list in step
    entries: LruCache<TileKey, Arc<TileData>>,

    /// Sum of `memory_size` over all entries
    memory_usage: usize,
}

/// Thread-safe LRU cache for decoded tiles with a byte budget.
///
/// Lookups that only test presence (`has_tile`, `peek`) take a shared lock.
/// `get` must update recency and therefore takes the exclusive lock, as do
/// `insert` and `clear`; all of them hold it only for O(1) work plus
/// eviction.
///
/// # Example
///
/// ```
/// use wsi_viewer::tile::{TileCache, TileData, TileKey};
///
/// let cache = TileCache::with_capacity(1024 * 1024);
/// let key = TileKey::new(0, 1, 2);
///
/// let tile = TileData::from_rgba(2, 2, vec![0u8; 16]).unwrap();
/// cache.insert(key, tile);
///
/// let cached = cache.get(&key).unwrap();
/// assert_eq!(cached.width(), 2);
/// assert_eq!(cache.hit_count(), 1);
/// ```
pub struct TileCache {
    state: RwLock<CacheState>,

    /// Maximum total size in bytes
    max_memory: usize,

    hits: AtomicU64,
    misses: AtomicU64,
}

impl TileCache {
    /// Create a new tile cache with default capacity (512MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Create a new tile cache with the specified capacity in bytes.
    pub fn with_capacity(max_memory: usize) -> Self {
        debug!(max_memory_mb = max_memory / (1024 * 1024), "Tile cache created");

        Self {
            state: RwLock::new(CacheState {
                entries: LruCache::unbounded(),
                memory_usage: 0,
            }),
            max_memory,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get a tile from the cache.
    ///
    /// On a hit the entry becomes the most recently used and the hit counter
    /// is incremented; on a miss the miss counter is incremented.
    pub fn get(&self, key: &TileKey) -> Option<Arc<TileData>> {
        let mut state = self.state.write();
        match state.entries.get(key) {
            Some(tile) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(tile))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Get a tile without updating recency or statistics.
    pub fn peek(&self, key: &TileKey) -> Option<Arc<TileData>> {
        self.state.read().entries.peek(key).cloned()
    }

    /// Check if a tile is in the cache without updating LRU order.
    pub fn has_tile(&self, key: &TileKey) -> bool {
        self.state.read().entries.contains(key)
    }

    /// Store a tile in the cache, taking ownership of it.
    ///
    /// If the key is already present the new data is dropped and the existing
    /// entry is only marked as recently used (first writer wins). Otherwise
    /// least-recently-used entries are evicted until the tile fits, or until
    /// the cache is empty.
    ///
    /// Returns `true` if the tile was inserted.
    pub fn insert(&self, key: TileKey, data: TileData) -> bool {
        let size = data.memory_size();
        let mut state = self.state.write();

        if state.entries.contains(&key) {
            state.entries.promote(&key);
            return false;
        }

        while state.memory_usage + size > self.max_memory {
            match state.entries.pop_lru() {
                Some((evicted_key, evicted)) => {
                    state.memory_usage = state.memory_usage.saturating_sub(evicted.memory_size());
                    debug!(tile = %evicted_key, bytes = evicted.memory_size(), "Evicted tile");
                }
                None => break,
            }
        }

        state.entries.put(key, Arc::new(data));
        state.memory_usage += size;
        true
    }

    /// Clear all entries from the cache.
    ///
    /// Hit and miss counters are kept.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.entries.clear();
        state.memory_usage = 0;
    }

    /// Get the current number of cached tiles.
    pub fn tile_count(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Get the current total size of cached tiles in bytes.
    pub fn memory_usage(&self) -> usize {
        self.state.read().memory_usage
    }

    /// Get the maximum capacity in bytes.
    pub fn max_memory(&self) -> usize {
        self.max_memory
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Fraction of `get` calls that were hits, 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hit_count();
        let total = hits + self.miss_count();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Snapshot all counters at once.
    pub fn stats(&self) -> CacheStats {
        let (tile_count, memory_usage) = {
            let state = self.state.read();
            (state.entries.len(), state.memory_usage)
        };

        CacheStats {
            tile_count,
            memory_usage,
            max_memory: self.max_memory,
            hits: self.hit_count(),
            misses: self.miss_count(),
            hit_rate: self.hit_rate(),
        }
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TileCache {
    fn drop(&mut self) {
        debug!(
            requests = self.hit_count() + self.miss_count(),
            hits = self.hit_count(),
            misses = self.miss_count(),
            hit_rate = self.hit_rate(),
            "Tile cache dropped"
        );
    }
}

// =============================================================================
// Tests
// =============================================================================
