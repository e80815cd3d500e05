//! Ghost outline shown while dragging out a shape.
//!
//! The preview lives in the scene without an ObjectId, so it is never
//! serialized, written remotely or touched by reconciliation.

use crate::commands::ShapeTool;
use crate::scene::SceneAdapter;
use crate::shapes::{SerializableColor, Shape, ShapeId, ShapeStyle, StrokeStyle};
use kurbo::Point;

/// Opacity of the ghost outline.
pub const PREVIEW_OPACITY: f64 = 0.7;

/// Thinnest outline drawn for a preview.
pub const PREVIEW_MIN_STROKE: f64 = 2.0;

/// Dashed, translucent version of the brush.
pub fn preview_style(color: SerializableColor, width: f64) -> ShapeStyle {
    ShapeStyle {
        stroke_style: StrokeStyle::Dashed,
        opacity: PREVIEW_OPACITY,
        ..ShapeStyle::stroked(color, width.max(PREVIEW_MIN_STROKE))
    }
}

/// An in-progress shape drag.
#[derive(Debug, Clone)]
pub struct Preview {
    tool: ShapeTool,
    start: Point,
    current: Point,
    handle: ShapeId,
    style: ShapeStyle,
    min_size: f64,
}

impl Preview {
    /// Add the ghost for a drag starting at `start`.
    pub fn start(
        scene: &mut dyn SceneAdapter,
        tool: ShapeTool,
        start: Point,
        color: SerializableColor,
        width: f64,
        min_size: f64,
    ) -> Self {
        let style = preview_style(color, width);
        let shape = Self::ghost(tool, start, start, style.clone(), min_size);
        let handle = scene.add(shape, None);
        Self {
            tool,
            start,
            current: start,
            handle,
            style,
            min_size,
        }
    }

    fn ghost(tool: ShapeTool, start: Point, end: Point, style: ShapeStyle, min_size: f64) -> Shape {
        let mut shape = tool.build(start, end, style, min_size);
        if let Shape::Circle(circle) = &mut shape {
            circle.radius = circle.radius.max(min_size);
        }
        shape
    }

    /// Redraw the ghost between the start point and `point`.
    pub fn update(&mut self, scene: &mut dyn SceneAdapter, point: Point) {
        self.current = point;
        self.redraw(scene);
    }

    /// Apply new brush settings to the ghost.
    pub fn restyle(&mut self, scene: &mut dyn SceneAdapter, color: SerializableColor, width: f64) {
        self.style = preview_style(color, width);
        self.redraw(scene);
    }

    fn redraw(&mut self, scene: &mut dyn SceneAdapter) {
        scene.remove(self.handle);
        let shape = Self::ghost(self.tool, self.start, self.current, self.style.clone(), self.min_size);
        self.handle = scene.add(shape, None);
    }

    /// Remove the ghost. Returns the drag endpoints.
    pub fn end(self, scene: &mut dyn SceneAdapter) -> (Point, Point) {
        scene.remove(self.handle);
        (self.start, self.current)
    }

    pub fn tool(&self) -> ShapeTool {
        self.tool
    }

    pub fn handle(&self) -> ShapeId {
        self.handle
    }

    /// Distance dragged so far.
    pub fn drag_distance(&self) -> f64 {
        self.start.distance(self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Scene;

    #[test]
    fn test_preview_lifecycle_is_scene_local() {
        let mut scene = Scene::new();
        let mut preview = Preview::start(
            &mut scene,
            ShapeTool::Rectangle,
            Point::new(0.0, 0.0),
            SerializableColor::black(),
            1.0,
            3.0,
        );
        assert_eq!(scene.len(), 1);
        assert!(scene.tagged().is_empty());

        preview.update(&mut scene, Point::new(20.0, 10.0));
        assert_eq!(scene.len(), 1);
        let style = scene.get(preview.handle()).unwrap().style().clone();
        assert_eq!(style.stroke_style, StrokeStyle::Dashed);
        assert!((style.opacity - PREVIEW_OPACITY).abs() < f64::EPSILON);
        assert!((style.stroke_width - PREVIEW_MIN_STROKE).abs() < f64::EPSILON);

        let (start, end) = preview.end(&mut scene);
        assert_eq!(start, Point::new(0.0, 0.0));
        assert_eq!(end, Point::new(20.0, 10.0));
        assert!(scene.is_empty());
    }

    #[test]
    fn test_preview_minimum_sizes() {
        let mut scene = Scene::new();
        let preview = Preview::start(
            &mut scene,
            ShapeTool::Circle,
            Point::new(0.0, 0.0),
            SerializableColor::black(),
            4.0,
            3.0,
        );
        match scene.get(preview.handle()) {
            Some(Shape::Circle(c)) => assert!((c.radius - 3.0).abs() < f64::EPSILON),
            other => panic!("unexpected shape {other:?}"),
        }
    }
}
