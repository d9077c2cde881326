use std::path::Path;

use image::{ImageResult, RgbaImage};

use crate::slide::BYTES_PER_PIXEL;

use super::presenter::{PixelRect, Presenter};

/// Handle to a texture uploaded into a [`Canvas`].
#[derive(Debug, PartialEq, Eq)]
pub struct TextureId(usize);

struct Texture {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

/// CPU framebuffer presenter.
///
/// Textures live in a slab; released slots are reused. Blits are clipped to
/// the framebuffer and scaled with nearest-neighbour sampling.
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    textures: Vec<Option<Texture>>,
    free_slots: Vec<usize>,
}

impl Canvas {
    /// Create a canvas cleared to opaque black.
    pub fn new(width: u32, height: u32) -> Self {
        let mut canvas = Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * BYTES_PER_PIXEL],
            textures: Vec::new(),
            free_slots: Vec::new(),
        };
        canvas.clear([0, 0, 0, 255]);
        canvas
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Framebuffer contents, RGBA8 row-major.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        let mut rgba = [0; 4];
        rgba.copy_from_slice(&self.pixels[offset..offset + BYTES_PER_PIXEL]);
        Some(rgba)
    }

    pub fn clear(&mut self, color: [u8; 4]) {
        for pixel in self.pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
            pixel.copy_from_slice(&color);
        }
    }

    /// Number of live textures.
    pub fn texture_count(&self) -> usize {
        self.textures.iter().filter(|slot| slot.is_some()).count()
    }

    /// Write the framebuffer to an image file; the format follows the extension.
    pub fn save(&self, path: impl AsRef<Path>) -> ImageResult<()> {
        image::save_buffer(
            path,
            &self.pixels,
            self.width,
            self.height,
            image::ColorType::Rgba8,
        )
    }

    pub fn to_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
    }

    fn bounds(&self) -> PixelRect {
        PixelRect::new(0, 0, self.width as i32, self.height as i32)
    }
}

impl Presenter for Canvas {
    type Handle = TextureId;

    fn upload(&mut self, pixels: &[u8], width: u32, height: u32) -> Option<TextureId> {
        if width == 0
            || height == 0
            || pixels.len() != width as usize * height as usize * BYTES_PER_PIXEL
        {
            return None;
        }

        let texture = Texture {
            width,
            height,
            pixels: pixels.to_vec(),
        };

        match self.free_slots.pop() {
            Some(slot) => {
                self.textures[slot] = Some(texture);
                Some(TextureId(slot))
            }
            None => {
                self.textures.push(Some(texture));
                Some(TextureId(self.textures.len() - 1))
            }
        }
    }

    fn render_copy(&mut self, handle: &TextureId, source: Option<PixelRect>, dest: PixelRect) {
        let Some(Some(texture)) = self.textures.get(handle.0) else {
            return;
        };

        let full = PixelRect::new(0, 0, texture.width as i32, texture.height as i32);
        let Some(src) = source.unwrap_or(full).intersection(&full) else {
            return;
        };
        if dest.is_empty() {
            return;
        }
        let Some(visible) = dest.intersection(&self.bounds()) else {
            return;
        };

        let canvas_width = self.width as usize;
        let texture_width = texture.width as usize;

        for y in visible.y..visible.bottom() {
            // Sample at the centre of the destination pixel
            let v = (2 * i64::from(y - dest.y) + 1) * i64::from(src.height)
                / (2 * i64::from(dest.height));
            let sy = (src.y as i64 + v) as usize;

            for x in visible.x..visible.right() {
                let u = (2 * i64::from(x - dest.x) + 1) * i64::from(src.width)
                    / (2 * i64::from(dest.width));
                let sx = (src.x as i64 + u) as usize;

                let from = (sy * texture_width + sx) * BYTES_PER_PIXEL;
                let to = (y as usize * canvas_width + x as usize) * BYTES_PER_PIXEL;
                self.pixels[to..to + BYTES_PER_PIXEL]
                    .copy_from_slice(&texture.pixels[from..from + BYTES_PER_PIXEL]);
            }
        }
    }

    fn release(&mut self, handle: TextureId) {
        if let Some(slot) = self.textures.get_mut(handle.0) {
            if slot.take().is_some() {
                self.free_slots.push(handle.0);
            }
        }
    }
}
