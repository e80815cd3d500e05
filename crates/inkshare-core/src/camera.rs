//! Viewport camera: maps pointer input in screen pixels onto the board.

use crate::config::WhiteboardConfig;
use kurbo::{Affine, Point, Vec2};

/// Pan offset and zoom of one participant's view of the board.
///
/// Only the local view moves. Nothing here is recorded or synchronized.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Screen-space translation applied after scaling.
    pub offset: Vec2,
    /// 1.0 shows the board at its natural size.
    pub zoom: f64,
    min_zoom: f64,
    max_zoom: f64,
    step: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self::from_config(&WhiteboardConfig::default())
    }
}

impl Camera {
    /// Camera at the origin with the zoom limits and step of `config`.
    pub fn from_config(config: &WhiteboardConfig) -> Self {
        Self {
            offset: Vec2::ZERO,
            zoom: 1.0,
            min_zoom: config.min_zoom,
            max_zoom: config.max_zoom,
            step: config.zoom_step,
        }
    }

    /// Board-to-screen transform for renderers.
    pub fn view_transform(&self) -> Affine {
        Affine::translate(self.offset) * Affine::scale(self.zoom)
    }

    pub fn screen_to_world(&self, screen: Point) -> Point {
        self.view_transform().inverse() * screen
    }

    pub fn world_to_screen(&self, world: Point) -> Point {
        self.view_transform() * world
    }

    /// A distance in screen pixels expressed in board units.
    pub fn world_tolerance(&self, pixels: f64) -> f64 {
        pixels / self.zoom
    }

    pub fn pan(&mut self, delta: Vec2) {
        self.offset += delta;
    }

    /// Zoom in one step around `anchor`.
    pub fn step_in(&mut self, anchor: Point) -> bool {
        self.zoom_at(anchor, self.step)
    }

    /// Zoom out one step around `anchor`.
    pub fn step_out(&mut self, anchor: Point) -> bool {
        self.zoom_at(anchor, 1.0 / self.step)
    }

    /// Scale by `factor` within the limits, keeping the board point under
    /// `anchor` in place. Returns false when already at the limit.
    pub fn zoom_at(&mut self, anchor: Point, factor: f64) -> bool {
        let zoom = (self.zoom * factor).clamp(self.min_zoom, self.max_zoom);
        if (zoom - self.zoom).abs() < f64::EPSILON {
            return false;
        }
        let pinned = self.screen_to_world(anchor);
        self.zoom = zoom;
        self.offset += anchor - self.world_to_screen(pinned);
        true
    }

    /// Back to the origin at natural size. Limits are kept.
    pub fn reset(&mut self) {
        self.offset = Vec2::ZERO;
        self.zoom = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_near(a: Point, b: Point) {
        assert!((a - b).hypot() < 1e-9, "{a:?} != {b:?}");
    }

    #[test]
    fn test_identity_view() {
        let camera = Camera::default();
        assert_near(camera.screen_to_world(Point::new(100.0, 200.0)), Point::new(100.0, 200.0));
        assert!((camera.world_tolerance(4.0) - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pan_and_zoom_map_input() {
        let mut camera = Camera::default();
        camera.pan(Vec2::new(50.0, 100.0));
        assert_near(camera.screen_to_world(Point::new(100.0, 200.0)), Point::new(50.0, 100.0));

        camera.zoom = 2.0;
        assert_near(camera.screen_to_world(Point::new(150.0, 300.0)), Point::new(50.0, 100.0));
        assert!((camera.world_tolerance(4.0) - 2.0).abs() < f64::EPSILON);
        let world = Point::new(12.5, -3.0);
        assert_near(camera.screen_to_world(camera.world_to_screen(world)), world);
    }

    #[test]
    fn test_steps_follow_config() {
        let config = WhiteboardConfig {
            zoom_step: 2.0,
            min_zoom: 0.5,
            max_zoom: 4.0,
            ..WhiteboardConfig::default()
        };
        let mut camera = Camera::from_config(&config);
        let anchor = Point::new(400.0, 300.0);
        let pinned = camera.screen_to_world(anchor);

        assert!(camera.step_in(anchor));
        assert!(camera.step_in(anchor));
        assert!((camera.zoom - 4.0).abs() < f64::EPSILON);
        assert!(!camera.step_in(anchor));
        assert_near(camera.screen_to_world(anchor), pinned);

        for _ in 0..4 {
            camera.step_out(anchor);
        }
        assert!((camera.zoom - 0.5).abs() < f64::EPSILON);

        camera.reset();
        assert_eq!(camera.offset, Vec2::ZERO);
        assert!((camera.zoom - 1.0).abs() < f64::EPSILON);
    }
}
