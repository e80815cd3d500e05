//! Text shape.

use super::{ShapeId, ShapeStyle, ShapeTrait};
use kurbo::{Affine, BezPath, Point, Rect, Shape as KurboShape};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Approximate glyph advance as a fraction of the font size.
const CHAR_WIDTH_FACTOR: f64 = 0.6;
/// Line height as a multiple of the font size.
const LINE_HEIGHT_FACTOR: f64 = 1.2;

/// A single- or multi-line text label. The stroke color is the text color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub(crate) id: ShapeId,
    /// Position (top-left corner of the text box).
    pub position: Point,
    /// The text content.
    pub content: String,
    /// Font size in pixels.
    pub font_size: f64,
    /// Style properties.
    pub style: ShapeStyle,
}

impl Text {
    /// Default font size.
    pub const DEFAULT_FONT_SIZE: f64 = 20.0;

    /// Create a new text shape.
    pub fn new(position: Point, content: String, font_size: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            position,
            content,
            font_size,
            style: ShapeStyle::default(),
        }
    }

    /// Approximate layout size. The real metrics belong to the rendering engine.
    pub fn approx_size(&self) -> (f64, f64) {
        let lines: Vec<&str> = self.content.lines().collect();
        let longest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0).max(1);
        let line_count = lines.len().max(1);
        (
            longest as f64 * self.font_size * CHAR_WIDTH_FACTOR,
            line_count as f64 * self.font_size * LINE_HEIGHT_FACTOR,
        )
    }

    /// Content with surrounding whitespace removed; empty means the label is discardable.
    pub fn trimmed(&self) -> &str {
        self.content.trim()
    }
}

impl ShapeTrait for Text {
    fn id(&self) -> ShapeId {
        self.id
    }

    fn bounds(&self) -> Rect {
        let (width, height) = self.approx_size();
        Rect::new(
            self.position.x,
            self.position.y,
            self.position.x + width,
            self.position.y + height,
        )
    }

    fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        self.bounds().inflate(tolerance, tolerance).contains(point)
    }

    fn outline(&self) -> Vec<Point> {
        let r = self.bounds();
        vec![
            Point::new(r.x0, r.y0),
            Point::new(r.x1, r.y0),
            Point::new(r.x1, r.y1),
            Point::new(r.x0, r.y1),
            Point::new(r.x0, r.y0),
        ]
    }

    fn to_path(&self) -> BezPath {
        // Glyphs are laid out by the renderer; the path is the text box.
        self.bounds().to_path(0.1)
    }

    fn style(&self) -> &ShapeStyle {
        &self.style
    }

    fn style_mut(&mut self) -> &mut ShapeStyle {
        &mut self.style
    }

    fn transform(&mut self, affine: Affine) {
        self.position = affine * self.position;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_grow_with_content() {
        let short = Text::new(Point::ZERO, "a".to_string(), 20.0);
        let long = Text::new(Point::ZERO, "abcdef".to_string(), 20.0);
        assert!(long.bounds().width() > short.bounds().width());
    }

    #[test]
    fn test_multiline_height() {
        let text = Text::new(Point::ZERO, "one\ntwo".to_string(), 10.0);
        let (_, height) = text.approx_size();
        assert!((height - 24.0).abs() < 1e-9);
    }

    #[test]
    fn test_trimmed() {
        let text = Text::new(Point::ZERO, "  \n ".to_string(), 20.0);
        assert!(text.trimmed().is_empty());
    }
}
