//! Presentation collaborator.
//!
//! The renderer never talks to a graphics API directly. It uploads RGBA8
//! buffers through a [`Presenter`], gets back an opaque handle, and later asks
//! for (possibly cropped) copies of that handle into screen space.

use serde::Serialize;

use crate::viewport::Vec2;

/// Integer rectangle in screen or texture pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl PixelRect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Snap a real-valued rectangle given by two corners to the pixel grid.
    ///
    /// Corners are floored independently, so rectangles that share an edge
    /// in real coordinates share it exactly after snapping.
    pub fn from_corners(top_left: Vec2, bottom_right: Vec2) -> Self {
        let x0 = top_left.x.floor() as i32;
        let y0 = top_left.y.floor() as i32;
        let x1 = bottom_right.x.floor() as i32;
        let y1 = bottom_right.y.floor() as i32;
        Self::new(x0, y0, x1 - x0, y1 - y0)
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Overlapping part of two rectangles, `None` if they do not overlap.
    pub fn intersection(&self, other: &PixelRect) -> Option<PixelRect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());

        let rect = PixelRect::new(x0, y0, x1 - x0, y1 - y0);
        (!rect.is_empty()).then_some(rect)
    }
}

/// Turns pixel buffers into drawable handles and draws them.
///
/// Only called from the render thread. A handle stays valid until it is
/// passed back to [`release`](Presenter::release).
pub trait Presenter {
    type Handle;

    /// Upload a `width * height` RGBA8 buffer.
    ///
    /// Returns `None` if the presenter cannot create a handle (bad size,
    /// out of memory); the tile is then skipped for this frame.
    fn upload(&mut self, pixels: &[u8], width: u32, height: u32) -> Option<Self::Handle>;

    /// Draw `source` (the whole handle when `None`) stretched onto `dest`.
    fn render_copy(&mut self, handle: &Self::Handle, source: Option<PixelRect>, dest: PixelRect);

    /// Free a handle. The default simply drops it.
    fn release(&mut self, handle: Self::Handle) {
        drop(handle);
    }
}
