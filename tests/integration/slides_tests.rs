//! End-to-end rendering of real pixel sources into a [`Canvas`].
//!
//! Tests verify:
//! - An image file opened as a pyramid renders its own pixels
//! - A synthetic slide renders the same colours at every zoom

use std::sync::Arc;
use std::time::Duration;

use image::{Rgba, RgbaImage};

use wsi_viewer::render::{Canvas, RendererConfig, SlideRenderer};
use wsi_viewer::slide::{ImagePyramid, SlideSource, SyntheticSlide};
use wsi_viewer::viewport::{AnimationMode, Vec2, Viewport};

use super::test_utils::viewport_at_origin;

const RED: [u8; 4] = [255, 0, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];

/// Render frames until every visible tile is drawn at full resolution.
fn render_until_complete<S: SlideSource + ?Sized + 'static>(
    renderer: &mut SlideRenderer<S, Canvas>,
    viewport: &Viewport,
) {
    for _ in 0..200 {
        if renderer.render(viewport).is_complete() {
            return;
        }
        renderer.wait_ready(Duration::from_millis(50));
    }
    panic!("tiles did not finish loading");
}

#[test]
fn test_image_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("slide.png");

    // Left half red, right half blue
    let image = RgbaImage::from_fn(600, 400, |x, _| Rgba(if x < 300 { RED } else { BLUE }));
    image.save(&path).unwrap();

    let pyramid = ImagePyramid::open(&path, 256).unwrap();
    assert_eq!(pyramid.dimensions(), Some((600, 400)));
    assert_eq!(pyramid.level_count(), 3);

    let viewport = Viewport::new(600, 400, 600, 400);
    let config = RendererConfig::default().with_tile_size(256).with_workers(2);
    let mut renderer = SlideRenderer::new(Arc::new(pyramid), Canvas::new(600, 400), config).unwrap();
    renderer.initialize().unwrap();

    render_until_complete(&mut renderer, &viewport);
    assert_eq!(renderer.current_level(), 0);

    let canvas = renderer.presenter();
    assert_eq!(canvas.pixel(150, 200), Some(RED));
    assert_eq!(canvas.pixel(450, 200), Some(BLUE));

    // The fitted slide leaves a margin of untouched background
    assert_eq!(canvas.pixel(2, 200), Some([0, 0, 0, 255]));
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(ImagePyramid::open(dir.path().join("missing.png"), 256).is_err());
}

#[test]
fn test_synthetic_slide_colours_match_source() {
    let slide = Arc::new(SyntheticSlide::new(8192, 8192));
    let config = RendererConfig::default().with_tile_size(512).with_workers(4);
    let mut renderer =
        SlideRenderer::new(Arc::clone(&slide), Canvas::new(640, 480), config).unwrap();
    renderer.initialize().unwrap();

    // Full resolution: screen pixel (x, y) is slide pixel (x, y)
    let viewport = viewport_at_origin(640, 480, 8192, 8192);
    render_until_complete(&mut renderer, &viewport);

    for (x, y) in [(10u32, 10u32), (300, 20), (600, 400)] {
        let slide_point = viewport.screen_to_slide(Vec2::new(f64::from(x) + 0.5, f64::from(y) + 0.5));
        let expected = SyntheticSlide::pixel_at(slide_point.x as u64, slide_point.y as u64);
        assert_eq!(renderer.presenter().pixel(x, y), Some(expected));
    }

    // Zoomed out to the whole slide, a coarser level is used
    let mut overview = Viewport::new(640, 480, 8192, 8192);
    overview.reset_view(AnimationMode::Instant);
    render_until_complete(&mut renderer, &overview);
    assert!(renderer.current_level() > 0);
    assert!(renderer.stats().cache.tile_count > 0);
}
