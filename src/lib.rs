//! # WSI Viewer
//!
//! Rendering core for gigapixel pyramidal Whole Slide Images (WSI).
//!
//! A slide is far larger than any texture or frame buffer, and decoding
//! full-resolution pixels is too slow to do on the render path. This crate
//! splits the slide into fixed-size tiles per pyramid level, decodes them on
//! background threads, and draws whatever is available each frame, filling
//! gaps with cropped tiles from coarser levels until the real ones arrive.
//!
//! ## Features
//!
//! - **Byte-budgeted LRU cache**: decoded tiles accounted by memory, not count
//! - **Prioritized loading**: urgent (nothing on screen) before visible
//!   (placeholder on screen) before adjacent (prefetch)
//! - **Progressive rendering**: coarse-level fallback with exact crop geometry
//! - **Viewport model**: screen/slide transforms, zoom limits, bounds clamping
//!   and eased transitions driven by the caller's frame clock
//!
//! ## Architecture
//!
//! - [`viewport`] - Camera state and coordinate transforms
//! - [`tile`] - Tile cache, load requests and the worker pool
//! - [`render`] - Per-frame renderer and the presentation collaborator
//! - [`slide`] - Slide source trait and built-in sources
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use wsi_viewer::{AnimationMode, Canvas, RendererConfig, SlideRenderer, SyntheticSlide, Vec2, Viewport};
//!
//! let slide = Arc::new(SyntheticSlide::new(100_000, 60_000));
//! let mut viewport = Viewport::new(1280, 800, 100_000, 60_000);
//! let mut renderer = SlideRenderer::new(slide, Canvas::new(1280, 800), RendererConfig::default())?;
//! renderer.initialize()?;
//!
//! viewport.zoom_at_point(Vec2::new(640.0, 400.0), 16.0, AnimationMode::Instant);
//! while !renderer.render(&viewport).is_complete() {
//!     renderer.wait_ready(Duration::from_millis(50));
//! }
//! renderer.presenter().save("frame.png")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod error;
pub mod render;
pub mod slide;
pub mod tile;
pub mod viewport;

// Re-export commonly used types
pub use config::{Cli, Command, InfoConfig, RenderConfig, SlideArgs};
pub use error::{PoolError, SlideError};
pub use render::{
    Canvas, FrameStats, PixelRect, Presenter, RendererConfig, RendererStats, SlideRenderer,
    TileOutcome,
};
pub use slide::{ImagePyramid, LevelInfo, SlideSource, SyntheticSlide};
pub use tile::{
    CacheStats, TileCache, TileData, TileKey, TileLoadPriority, TileLoadRequest,
    TileLoadThreadPool, DEFAULT_TILE_CACHE_CAPACITY, DEFAULT_TILE_SIZE, DEFAULT_WORKER_THREADS,
};
pub use viewport::{AnimationMode, Rect, TransitionHandle, Vec2, ViewTarget, Viewport};
