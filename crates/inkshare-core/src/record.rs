//! Serialized object records and the ObjectIds that key them.
//!
//! A record is the JSON shape stored in the remote drawing namespace:
//!
//! ```text
//! { "type": "rect", "left": 10, "top": 10, "width": 40, "height": 30,
//!   "stroke": "#FF0000", "strokeWidth": 3, "fill": "transparent" }
//! ```

use crate::shapes::{
    Circle, Freehand, Line, Rectangle, SerializableColor, Shape, ShapeKind, ShapeStyle, Text,
};
use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[cfg(target_arch = "wasm32")]
use web_time::{SystemTime, UNIX_EPOCH};
#[cfg(not(target_arch = "wasm32"))]
use std::time::{SystemTime, UNIX_EPOCH};

/// Fill value written for every kind; shapes are outline-only.
pub const TRANSPARENT: &str = "transparent";

/// Globally unique key joining a scene object to its remote entry.
///
/// Generated ids follow `{userId}_{millis}_{rand}`; ids received from the
/// store are accepted verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh id for an object created by `user_id`.
    pub fn generate(user_id: &str) -> Self {
        let millis = unix_millis();
        let rand = Uuid::new_v4().simple().to_string();
        Self(format!("{}_{}_{}", user_id, millis, &rand[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Milliseconds since the Unix epoch, zero if the clock is before it.
pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Errors turning a record into a shape.
#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("Malformed record: {0}")]
    Malformed(String),
    #[error("Invalid color: {0}")]
    InvalidColor(String),
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),
}

/// Kind-specific geometry, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Geometry {
    Path {
        points: Vec<[f64; 2]>,
    },
    Rect {
        left: f64,
        top: f64,
        width: f64,
        height: f64,
    },
    Circle {
        left: f64,
        top: f64,
        radius: f64,
    },
    Line {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
    },
    Text {
        left: f64,
        top: f64,
        text: String,
        #[serde(rename = "fontSize", default = "default_font_size")]
        font_size: f64,
    },
}

fn default_font_size() -> f64 {
    Text::DEFAULT_FONT_SIZE
}

fn default_fill() -> String {
    TRANSPARENT.to_string()
}

/// Stroke defaults applied to records that omit them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StyleDefaults {
    pub stroke_color: SerializableColor,
    pub stroke_width: f64,
}

impl Default for StyleDefaults {
    fn default() -> Self {
        Self {
            stroke_color: SerializableColor::black(),
            stroke_width: 5.0,
        }
    }
}

/// The remote representation of a drawable object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRecord {
    #[serde(flatten)]
    pub geometry: Geometry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(default = "default_fill")]
    pub fill: String,
}

impl ObjectRecord {
    /// Freehand record from raw captured points.
    pub fn path(points: &[Point], stroke: Option<SerializableColor>, stroke_width: Option<f64>) -> Self {
        Self {
            geometry: Geometry::Path {
                points: points.iter().map(|p| [p.x, p.y]).collect(),
            },
            stroke: stroke.map(|c| c.to_hex()),
            stroke_width,
            fill: default_fill(),
        }
    }

    pub fn kind(&self) -> ShapeKind {
        match self.geometry {
            Geometry::Path { .. } => ShapeKind::Path,
            Geometry::Rect { .. } => ShapeKind::Rectangle,
            Geometry::Circle { .. } => ShapeKind::Circle,
            Geometry::Line { .. } => ShapeKind::Line,
            Geometry::Text { .. } => ShapeKind::Text,
        }
    }

    /// Serialize a scene shape.
    pub fn from_shape(shape: &Shape) -> Self {
        let style = shape.style();
        let geometry = match shape {
            Shape::Freehand(f) => Geometry::Path {
                points: f.points.iter().map(|p| [p.x, p.y]).collect(),
            },
            Shape::Rectangle(r) => Geometry::Rect {
                left: r.position.x,
                top: r.position.y,
                width: r.width,
                height: r.height,
            },
            Shape::Circle(c) => Geometry::Circle {
                left: c.center.x - c.radius,
                top: c.center.y - c.radius,
                radius: c.radius,
            },
            Shape::Line(l) => Geometry::Line {
                x1: l.start.x,
                y1: l.start.y,
                x2: l.end.x,
                y2: l.end.y,
            },
            Shape::Text(t) => Geometry::Text {
                left: t.position.x,
                top: t.position.y,
                text: t.content.clone(),
                font_size: t.font_size,
            },
        };
        Self {
            geometry,
            stroke: Some(style.stroke_color.to_hex()),
            stroke_width: Some(style.stroke_width),
            fill: style
                .fill_color
                .map(|c| c.to_hex())
                .unwrap_or_else(default_fill),
        }
    }

    /// Build a scene shape (with a fresh engine handle) from this record.
    pub fn to_shape(&self, defaults: &StyleDefaults) -> Result<Shape, RecordError> {
        let stroke_color = match &self.stroke {
            Some(hex) if !hex.is_empty() => SerializableColor::from_hex(hex)
                .ok_or_else(|| RecordError::InvalidColor(hex.clone()))?,
            _ => defaults.stroke_color,
        };
        let stroke_width = match self.stroke_width {
            Some(w) if w > 0.0 && w.is_finite() => w,
            Some(w) if !w.is_finite() => {
                return Err(RecordError::InvalidGeometry(format!("stroke width {w}")));
            }
            _ => defaults.stroke_width,
        };
        let fill_color = match self.fill.as_str() {
            "" | TRANSPARENT => None,
            hex => Some(
                SerializableColor::from_hex(hex)
                    .ok_or_else(|| RecordError::InvalidColor(hex.to_string()))?,
            ),
        };
        let style = ShapeStyle {
            fill_color,
            ..ShapeStyle::stroked(stroke_color, stroke_width)
        };

        let shape = match &self.geometry {
            Geometry::Path { points } => {
                if points.is_empty() {
                    return Err(RecordError::InvalidGeometry("path has no points".into()));
                }
                let points = points.iter().map(|[x, y]| Point::new(*x, *y)).collect();
                let mut freehand = Freehand::from_points(points);
                freehand.style = style;
                Shape::Freehand(freehand)
            }
            Geometry::Rect { left, top, width, height } => {
                if *width < 0.0 || *height < 0.0 {
                    return Err(RecordError::InvalidGeometry(format!(
                        "negative size {width}x{height}"
                    )));
                }
                let mut rect = Rectangle::new(Point::new(*left, *top), *width, *height);
                rect.style = style;
                Shape::Rectangle(rect)
            }
            Geometry::Circle { left, top, radius } => {
                if *radius < 0.0 {
                    return Err(RecordError::InvalidGeometry(format!("radius {radius}")));
                }
                let center = Point::new(left + radius, top + radius);
                let mut circle = Circle::new(center, *radius);
                circle.style = style;
                Shape::Circle(circle)
            }
            Geometry::Line { x1, y1, x2, y2 } => {
                let mut line = Line::new(Point::new(*x1, *y1), Point::new(*x2, *y2));
                line.style = style;
                Shape::Line(line)
            }
            Geometry::Text { left, top, text, font_size } => {
                let mut label = Text::new(Point::new(*left, *top), text.clone(), *font_size);
                label.style = style;
                Shape::Text(label)
            }
        };

        if !shape.bounds().is_finite() {
            return Err(RecordError::InvalidGeometry("non-finite coordinates".into()));
        }
        Ok(shape)
    }

    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn from_value(value: &serde_json::Value) -> Result<Self, RecordError> {
        Self::deserialize(value).map_err(|e| RecordError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generated_id_format() {
        let id = ObjectId::generate("user42");
        let parts: Vec<&str> = id.as_str().split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "user42");
        assert!(parts[1].parse::<u128>().is_ok());
        assert_eq!(parts[2].len(), 8);
        assert_ne!(id, ObjectId::generate("user42"));
    }

    #[test]
    fn test_rect_record_wire_shape() {
        let mut rect = Rectangle::new(Point::new(10.0, 10.0), 40.0, 30.0);
        rect.style = ShapeStyle::stroked(SerializableColor::from_hex("#FF0000").unwrap(), 3.0);
        let value = ObjectRecord::from_shape(&Shape::Rectangle(rect)).to_value().unwrap();
        assert_eq!(
            value,
            json!({
                "type": "rect", "left": 10.0, "top": 10.0, "width": 40.0, "height": 30.0,
                "stroke": "#FF0000", "strokeWidth": 3.0, "fill": "transparent"
            })
        );
    }

    #[test]
    fn test_path_defaults_when_style_missing() {
        let value = json!({ "type": "path", "points": [[0, 0], [5, 5]] });
        let record = ObjectRecord::from_value(&value).unwrap();
        let shape = record.to_shape(&StyleDefaults::default()).unwrap();
        assert_eq!(shape.kind(), ShapeKind::Path);
        assert_eq!(shape.style().stroke_color, SerializableColor::black());
        assert!((shape.style().stroke_width - 5.0).abs() < f64::EPSILON);
        assert!(shape.style().fill_color.is_none());
    }

    #[test]
    fn test_circle_record_uses_left_top() {
        let value = json!({ "type": "circle", "left": 0, "top": 0, "radius": 10,
                            "stroke": "#000000", "strokeWidth": 2 });
        let shape = ObjectRecord::from_value(&value)
            .unwrap()
            .to_shape(&StyleDefaults::default())
            .unwrap();
        match shape {
            Shape::Circle(c) => {
                assert!((c.center.x - 10.0).abs() < f64::EPSILON);
                assert!((c.radius - 10.0).abs() < f64::EPSILON);
            }
            other => panic!("unexpected shape {other:?}"),
        }
    }

    #[test]
    fn test_malformed_records_rejected() {
        assert!(ObjectRecord::from_value(&json!({ "type": "hexagon" })).is_err());
        assert!(ObjectRecord::from_value(&json!({ "type": "rect", "left": 1 })).is_err());

        let empty_path = ObjectRecord::from_value(&json!({ "type": "path", "points": [] })).unwrap();
        assert!(empty_path.to_shape(&StyleDefaults::default()).is_err());

        let bad_color =
            ObjectRecord::from_value(&json!({ "type": "line", "x1": 0, "y1": 0, "x2": 1, "y2": 1,
                                              "stroke": "not-a-color" }))
                .unwrap();
        assert!(matches!(
            bad_color.to_shape(&StyleDefaults::default()),
            Err(RecordError::InvalidColor(_))
        ));
    }

    #[test]
    fn test_shape_record_roundtrip_preserves_geometry() {
        let mut text = Text::new(Point::new(3.0, 4.0), "hi".to_string(), 20.0);
        text.style = ShapeStyle::stroked(SerializableColor::new(0, 0, 255, 255), 1.0);
        let record = ObjectRecord::from_shape(&Shape::Text(text));
        let rebuilt = record.to_shape(&StyleDefaults::default()).unwrap();
        assert_eq!(ObjectRecord::from_shape(&rebuilt), record);
    }
}
