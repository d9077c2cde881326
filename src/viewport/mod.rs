//! Camera state and coordinate transforms.
//!
//! Slide space is the level-0 pixel grid of the slide; screen space is the
//! window's pixel grid. A [`Viewport`] maps between them and enforces the
//! zoom range and the keep-the-slide-on-screen clamp.
//!
//! - [`Viewport`]: position, zoom and navigation operations
//! - [`Vec2`] / [`Rect`]: geometry primitives
//! - [`AnimationMode`] / [`TransitionHandle`]: instant or eased navigation

mod camera;
mod geometry;
mod transition;

pub use camera::{Viewport, DEFAULT_MIN_ZOOM, FIT_MARGIN, MAX_ZOOM};
pub use geometry::{Rect, Vec2};
pub use transition::{
    ease_in_out_cubic, AnimationMode, TransitionHandle, ViewTarget, DEFAULT_TRANSITION,
    RESET_TRANSITION,
};
