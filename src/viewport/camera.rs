use std::time::Duration;

use tracing::debug;

use super::geometry::{Rect, Vec2};
use super::transition::{
    ActiveTransition, AnimationMode, TransitionHandle, ViewTarget, RESET_TRANSITION,
};

/// Maximum useful magnification (screen pixels per level-0 pixel).
pub const MAX_ZOOM: f64 = 4.0;

/// Minimum zoom used when the window or slide has no area.
pub const DEFAULT_MIN_ZOOM: f64 = 0.01;

/// Fraction of the window the whole slide occupies at minimum zoom.
pub const FIT_MARGIN: f64 = 0.95;

/// Camera into a slide.
///
/// `position` is the slide-space (level-0) coordinate shown at the window's
/// top-left corner and `zoom` is screen pixels per slide pixel:
///
/// ```text
/// slide  = screen / zoom + position
/// screen = (slide - position) * zoom
/// ```
///
/// Every navigation call computes a target, clamps it, and either applies it
/// at once or starts a transition towards it.
///
/// # Example
///
/// ```
/// use wsi_viewer::viewport::{AnimationMode, Vec2, Viewport};
///
/// let mut viewport = Viewport::new(800, 600, 100_000, 50_000);
/// viewport.zoom_at_point(Vec2::new(400.0, 300.0), 8.0, AnimationMode::Instant);
///
/// let visible = viewport.visible_region();
/// assert!(visible.width < 100_000.0);
/// ```
#[derive(Debug, Clone)]
pub struct Viewport {
    window_width: u32,
    window_height: u32,

    slide_width: u64,
    slide_height: u64,

    position: Vec2,
    zoom: f64,

    min_zoom: f64,
    max_zoom: f64,

    transition: Option<ActiveTransition>,
    next_transition_id: u64,
}

impl Viewport {
    /// Create a viewport showing the whole slide.
    pub fn new(window_width: u32, window_height: u32, slide_width: u64, slide_height: u64) -> Self {
        let mut viewport = Self {
            window_width,
            window_height,
            slide_width,
            slide_height,
            position: Vec2::default(),
            zoom: 1.0,
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: MAX_ZOOM,
            transition: None,
            next_transition_id: 1,
        };
        viewport.calculate_zoom_limits();
        viewport.reset_view(AnimationMode::Instant);
        viewport
    }

    // =========================================================================
    // Window and slide geometry
    // =========================================================================

    pub fn set_window_size(&mut self, width: u32, height: u32) {
        self.window_width = width;
        self.window_height = height;
        self.calculate_zoom_limits();
        self.zoom = self.zoom.clamp(self.min_zoom, self.max_zoom);
        self.clamp_to_bounds();
    }

    /// Switch to a new slide extent and show all of it.
    pub fn set_slide_dimensions(&mut self, width: u64, height: u64) {
        self.slide_width = width;
        self.slide_height = height;
        self.transition = None;
        self.calculate_zoom_limits();
        self.reset_view(AnimationMode::Instant);
    }

    pub fn window_size(&self) -> (u32, u32) {
        (self.window_width, self.window_height)
    }

    pub fn slide_dimensions(&self) -> (u64, u64) {
        (self.slide_width, self.slide_height)
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn min_zoom(&self) -> f64 {
        self.min_zoom
    }

    pub fn max_zoom(&self) -> f64 {
        self.max_zoom
    }

    // =========================================================================
    // Coordinate transforms
    // =========================================================================

    pub fn screen_to_slide(&self, screen: Vec2) -> Vec2 {
        screen / self.zoom + self.position
    }

    pub fn slide_to_screen(&self, slide: Vec2) -> Vec2 {
        (slide - self.position) * self.zoom
    }

    /// Slide-space rectangle covered by the window.
    pub fn visible_region(&self) -> Rect {
        Rect::new(
            self.position.x,
            self.position.y,
            f64::from(self.window_width) / self.zoom,
            f64::from(self.window_height) / self.zoom,
        )
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Zoom by `factor`, keeping the slide point under `screen_point` fixed.
    ///
    /// Returns `None` when applied instantly or when the zoom is already at
    /// the relevant limit.
    pub fn zoom_at_point(
        &mut self,
        screen_point: Vec2,
        factor: f64,
        mode: AnimationMode,
    ) -> Option<TransitionHandle> {
        if !(factor > 0.0 && factor.is_finite()) {
            return None;
        }

        let slide_point = self.screen_to_slide(screen_point);
        let target_zoom = (self.zoom * factor).clamp(self.min_zoom, self.max_zoom);
        if target_zoom == self.zoom {
            return None;
        }

        let target_position = slide_point - screen_point / target_zoom;
        self.move_to(target_position, target_zoom, mode)
    }

    /// Move the camera by `delta` slide pixels. A non-finite delta is ignored.
    pub fn pan(&mut self, delta: Vec2, mode: AnimationMode) -> Option<TransitionHandle> {
        self.move_to(self.position + delta, self.zoom, mode)
    }

    /// Put `slide_point` at the centre of the window, keeping the zoom.
    pub fn center_on(&mut self, slide_point: Vec2, mode: AnimationMode) -> Option<TransitionHandle> {
        let half_view = Vec2::new(
            f64::from(self.window_width) / self.zoom,
            f64::from(self.window_height) / self.zoom,
        ) / 2.0;
        self.move_to(slide_point - half_view, self.zoom, mode)
    }

    /// Zoom out to `min_zoom` with the slide centred.
    pub fn reset_view(&mut self, mode: AnimationMode) -> Option<TransitionHandle> {
        let view = Vec2::new(
            f64::from(self.window_width) / self.min_zoom,
            f64::from(self.window_height) / self.min_zoom,
        );
        let slide = Vec2::new(self.slide_width as f64, self.slide_height as f64);
        let mode = match mode {
            AnimationMode::Smooth(_) => AnimationMode::Smooth(RESET_TRANSITION),
            AnimationMode::Instant => AnimationMode::Instant,
        };
        self.move_to((slide - view) / 2.0, self.min_zoom, mode)
    }

    fn move_to(
        &mut self,
        position: Vec2,
        zoom: f64,
        mode: AnimationMode,
    ) -> Option<TransitionHandle> {
        // Non-finite targets would poison every later transform
        if !(position.x.is_finite() && position.y.is_finite() && zoom.is_finite()) {
            return None;
        }

        let target = ViewTarget {
            position: self.clamped_position(position, zoom),
            zoom,
        };

        match mode {
            AnimationMode::Instant => {
                self.transition = None;
                self.position = target.position;
                self.zoom = target.zoom;
                self.clamp_to_bounds();
                None
            }
            AnimationMode::Smooth(duration) => Some(self.begin_transition(target, duration)),
        }
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Start moving from the current state towards `target`.
    ///
    /// The target is taken as given; navigation methods clamp it first.
    pub fn begin_transition(&mut self, target: ViewTarget, duration: Duration) -> TransitionHandle {
        let id = self.next_transition_id;
        self.next_transition_id += 1;

        self.transition = Some(ActiveTransition {
            id,
            from: ViewTarget {
                position: self.position,
                zoom: self.zoom,
            },
            to: target,
        });

        TransitionHandle::new(id, duration)
    }

    /// Apply the transition at progress `t` (0 = start, 1 = end).
    ///
    /// Intermediate frames are not clamped. The final frame snaps to the
    /// target and clamps. Returns `true` once the transition is over, which
    /// includes handles superseded by a newer transition.
    pub fn apply_frame(&mut self, handle: &TransitionHandle, t: f64) -> bool {
        let Some(active) = self.transition.filter(|active| active.id == handle.id) else {
            return true;
        };

        if t >= 1.0 || t.is_nan() {
            self.position = active.to.position;
            self.zoom = active.to.zoom;
            self.transition = None;
            self.clamp_to_bounds();
            return true;
        }

        let frame = active.sample(t.max(0.0));
        self.position = frame.position;
        self.zoom = frame.zoom;
        false
    }

    pub fn is_animating(&self) -> bool {
        self.transition.is_some()
    }

    /// Stop the running transition where it is and re-clamp.
    pub fn cancel_transition(&mut self) {
        if self.transition.take().is_some() {
            self.clamp_to_bounds();
        }
    }

    // =========================================================================
    // Bounds
    // =========================================================================

    /// Keep the view on the slide.
    ///
    /// On an axis where the view is larger than the slide the slide is
    /// centred (position may be negative); otherwise the position is clamped
    /// to `[0, slide - view]`. Idempotent.
    pub fn clamp_to_bounds(&mut self) {
        self.position = self.clamped_position(self.position, self.zoom);
    }

    fn clamped_position(&self, position: Vec2, zoom: f64) -> Vec2 {
        if !(zoom > 0.0 && zoom.is_finite()) {
            return position;
        }

        Vec2::new(
            clamp_axis(position.x, f64::from(self.window_width) / zoom, self.slide_width as f64),
            clamp_axis(position.y, f64::from(self.window_height) / zoom, self.slide_height as f64),
        )
    }

    /// Recompute `min_zoom` (slide fits the window) and `max_zoom`.
    pub fn calculate_zoom_limits(&mut self) {
        self.max_zoom = MAX_ZOOM;

        if self.slide_width == 0
            || self.slide_height == 0
            || self.window_width == 0
            || self.window_height == 0
        {
            self.min_zoom = DEFAULT_MIN_ZOOM;
            return;
        }

        let zoom_x = f64::from(self.window_width) / self.slide_width as f64;
        let zoom_y = f64::from(self.window_height) / self.slide_height as f64;
        self.min_zoom = (zoom_x.min(zoom_y) * FIT_MARGIN).min(self.max_zoom);

        debug!(
            min_zoom = self.min_zoom,
            max_zoom = self.max_zoom,
            "Viewport zoom limits"
        );
    }
}

fn clamp_axis(position: f64, view: f64, slide: f64) -> f64 {
    if view >= slide {
        -(view - slide) / 2.0
    } else {
        position.clamp(0.0, slide - view)
    }
}
