//! Slide abstraction layer.
//!
//! This module provides the collaborator boundary between the rendering core
//! and whatever produces slide pixels.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │      SlideRenderer / TileLoadThreadPool │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           SlideSource Trait             │
//! │  (level geometry + region decoding)     │
//! └────────────────────┬────────────────────┘
//!                      │
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │ SyntheticSlide  │    │   ImagePyramid      │
//! │ (procedural)    │    │ (decoded raster)    │
//! └─────────────────┘    └─────────────────────┘
//! ```

mod image_pyramid;
mod reader;
mod synthetic;

pub use image_pyramid::ImagePyramid;
pub use reader::{LevelInfo, SlideSource, BYTES_PER_PIXEL};
pub use synthetic::{SyntheticSlide, CHECKER_CELL};
