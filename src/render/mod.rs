//! Frame rendering.
//!
//! - [`SlideRenderer`]: level selection, visible-tile enumeration, the
//!   hit / fallback / missing branch, and load submission
//! - [`Presenter`]: the drawing collaborator; [`Canvas`] is a CPU
//!   implementation backed by an RGBA framebuffer
//! - [`fallback`]: slide-space footprints and coarse-tile crop geometry

mod canvas;
pub mod fallback;
mod presenter;
mod renderer;

pub use canvas::{Canvas, TextureId};
pub use fallback::{fallback_crop, fallback_key, tile_footprint, FallbackCrop};
pub use presenter::{PixelRect, Presenter};
pub use renderer::{
    FrameStats, RendererConfig, RendererStats, SlideRenderer, TileOutcome,
    DEFAULT_PREFETCH_MARGIN,
};
