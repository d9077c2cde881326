//! Tile caching and background loading.
//!
//! # Architecture
//!
//! ```text
//!  render thread                          worker threads (N)
//! ┌──────────────────┐  submit_request  ┌────────────────────────┐
//! │  SlideRenderer   │ ───────────────► │   TileLoadThreadPool   │
//! │                  │                  │  priority queue        │
//! │                  │                  │  pending-key set       │
//! └────────┬─────────┘                  └───────────┬────────────┘
//!          │ get / has_tile                         │ read_region
//!          ▼                                        ▼
//! ┌──────────────────┐      insert      ┌────────────────────────┐
//! │    TileCache     │ ◄─────────────── │      SlideSource       │
//! │ (LRU, byte cap)  │                  └────────────────────────┘
//! └──────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileCache`]: byte-budgeted LRU store of decoded tiles
//! - [`TileKey`]: `(level, tile_x, tile_y)` identity of a tile
//! - [`TileData`]: owned RGBA8 pixels of one tile
//! - [`TileLoadRequest`]: a queued decode with its [`TileLoadPriority`]
//! - [`TileLoadThreadPool`]: workers that turn requests into cached tiles

mod cache;
mod pool;
mod request;

pub use cache::{CacheStats, TileCache, TileData, TileKey, DEFAULT_TILE_CACHE_CAPACITY};
pub use pool::{
    TileLoadThreadPool, TileLoadThreadPoolBuilder, TileReadyCallback, DEFAULT_TILE_SIZE,
    DEFAULT_WORKER_THREADS,
};
pub use request::{TileLoadPriority, TileLoadRequest};
