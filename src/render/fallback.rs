//! Tile footprints and coarse-level fallback geometry.
//!
//! All footprints are expressed in slide space (level-0 pixels). Downsample
//! ratios between levels are real-valued, so pyramids whose levels are not
//! powers of two apart work the same way.

use crate::tile::TileKey;
use crate::viewport::Rect;

use super::presenter::PixelRect;

/// Slide-space area covered by a tile of `width x height` level pixels.
pub fn tile_footprint(key: TileKey, downsample: f64, tile_size: u32, width: u32, height: u32) -> Rect {
    let span = f64::from(tile_size) * downsample;
    Rect::new(
        f64::from(key.tile_x) * span,
        f64::from(key.tile_y) * span,
        f64::from(width) * downsample,
        f64::from(height) * downsample,
    )
}

/// Key of the tile at a coarser level whose grid cell holds the top-left
/// corner of `key`.
///
/// Returns `None` if the downsamples do not give a positive finite ratio.
pub fn fallback_key(
    key: TileKey,
    target_downsample: f64,
    fallback_level: u32,
    fallback_downsample: f64,
) -> Option<TileKey> {
    let ratio = fallback_downsample / target_downsample;
    if !(ratio > 0.0 && ratio.is_finite()) {
        return None;
    }

    Some(TileKey::new(
        fallback_level,
        (f64::from(key.tile_x) / ratio).floor() as u32,
        (f64::from(key.tile_y) / ratio).floor() as u32,
    ))
}

/// A drawable piece of a coarser tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackCrop {
    /// Region of the coarse tile's pixels to sample
    pub source: PixelRect,

    /// Slide-space area that region covers
    pub target: Rect,
}

impl FallbackCrop {
    /// Whether the crop covers all of `footprint`, up to rounding.
    pub fn covers(&self, footprint: &Rect) -> bool {
        const EPSILON: f64 = 1e-6;
        self.target.x <= footprint.x + EPSILON
            && self.target.y <= footprint.y + EPSILON
            && self.target.right() >= footprint.right() - EPSILON
            && self.target.bottom() >= footprint.bottom() - EPSILON
    }
}

/// Crop a cached coarse tile down to the part that covers `target`.
///
/// `target` is the slide-space footprint of the tile being substituted. The
/// source rectangle is clamped to `[0, fallback_width] x [0, fallback_height]`;
/// the returned target is the part of the footprint the coarse tile actually
/// covers. Returns `None` if they do not overlap.
pub fn fallback_crop(
    target: Rect,
    fallback: TileKey,
    fallback_downsample: f64,
    tile_size: u32,
    fallback_width: u32,
    fallback_height: u32,
) -> Option<FallbackCrop> {
    if !(fallback_downsample > 0.0 && fallback_downsample.is_finite()) {
        return None;
    }

    let coarse = tile_footprint(
        fallback,
        fallback_downsample,
        tile_size,
        fallback_width,
        fallback_height,
    );

    let x0 = target.x.max(coarse.x);
    let y0 = target.y.max(coarse.y);
    let x1 = target.right().min(coarse.right());
    let y1 = target.bottom().min(coarse.bottom());
    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    let to_source = |value: f64, origin: f64, limit: u32| -> i32 {
        ((value - origin) / fallback_downsample).clamp(0.0, f64::from(limit)) as i32
    };

    let sx0 = to_source(x0, coarse.x, fallback_width);
    let sy0 = to_source(y0, coarse.y, fallback_height);
    let sx1 = to_source(x1, coarse.x, fallback_width).max(sx0 + 1);
    let sy1 = to_source(y1, coarse.y, fallback_height).max(sy0 + 1);

    let source = PixelRect::new(sx0, sy0, sx1 - sx0, sy1 - sy0)
        .intersection(&PixelRect::new(0, 0, fallback_width as i32, fallback_height as i32))?;

    Some(FallbackCrop {
        source,
        target: Rect::new(x0, y0, x1 - x0, y1 - y0),
    })
}
