//! Whiteboard configuration.

use crate::record::StyleDefaults;
use crate::shapes::SerializableColor;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Tunables for a drawing session. Every field has a default, so a partial
/// JSON document is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhiteboardConfig {
    /// Maximum number of undoable commands.
    pub max_history_size: usize,
    /// Minimum drag distance for a shape gesture to produce a shape.
    pub shape_drag_threshold: f64,
    /// Minimum rectangle side length.
    pub min_rect_size: f64,
    /// Minimum size of the ghost outline shown while dragging.
    pub preview_min_size: f64,
    /// Stroke color for new sessions and for path records that omit one.
    pub default_stroke_color: String,
    /// Stroke width for new sessions and for path records that omit one.
    pub default_stroke_width: f64,
    /// Eraser brush width as a multiple of the current width.
    pub eraser_width_factor: f64,
    /// Douglas-Peucker tolerance applied to captured pen strokes. Zero drops only collinear points.
    pub stroke_simplify_tolerance: f64,
    /// Initial content of a new text label.
    pub text_placeholder: String,
    /// Font size for new text labels.
    pub font_size: f64,
    /// Multiplicative zoom step.
    pub zoom_step: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Hit-test tolerance for selection, in world units.
    pub hit_tolerance: f64,
}

impl Default for WhiteboardConfig {
    fn default() -> Self {
        Self {
            max_history_size: 50,
            shape_drag_threshold: 3.0,
            min_rect_size: 5.0,
            preview_min_size: 3.0,
            default_stroke_color: "#000000".to_string(),
            default_stroke_width: 5.0,
            eraser_width_factor: 2.0,
            stroke_simplify_tolerance: 2.0,
            text_placeholder: "Text".to_string(),
            font_size: 20.0,
            zoom_step: 1.2,
            min_zoom: 0.1,
            max_zoom: 5.0,
            hit_tolerance: 4.0,
        }
    }
}

impl WhiteboardConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_history_size == 0 {
            return Err(ConfigError::Invalid("max_history_size must be at least 1".into()));
        }
        if SerializableColor::from_hex(&self.default_stroke_color).is_none() {
            return Err(ConfigError::Invalid(format!(
                "default_stroke_color {:?} is not a hex color",
                self.default_stroke_color
            )));
        }
        if self.default_stroke_width <= 0.0 || self.font_size <= 0.0 {
            return Err(ConfigError::Invalid("widths and font size must be positive".into()));
        }
        if self.stroke_simplify_tolerance.is_nan() || self.stroke_simplify_tolerance < 0.0 {
            return Err(ConfigError::Invalid("stroke_simplify_tolerance must not be negative".into()));
        }
        if self.zoom_step <= 1.0 {
            return Err(ConfigError::Invalid("zoom_step must be greater than 1".into()));
        }
        if self.min_zoom <= 0.0 || self.min_zoom > self.max_zoom {
            return Err(ConfigError::Invalid(format!(
                "zoom range {}..{} is empty",
                self.min_zoom, self.max_zoom
            )));
        }
        Ok(())
    }

    /// Default stroke color, falling back to black if the configured value is unparsable.
    pub fn stroke_color(&self) -> SerializableColor {
        SerializableColor::from_hex(&self.default_stroke_color)
            .unwrap_or_else(SerializableColor::black)
    }

    pub fn style_defaults(&self) -> StyleDefaults {
        StyleDefaults {
            stroke_color: self.stroke_color(),
            stroke_width: self.default_stroke_width,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = WhiteboardConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_history_size, 50);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = WhiteboardConfig::from_json(r#"{ "max_history_size": 2 }"#).unwrap();
        assert_eq!(config.max_history_size, 2);
        assert!((config.shape_drag_threshold - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            WhiteboardConfig::from_json(r#"{ "max_history_size": 0 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            WhiteboardConfig::from_json(r#"{ "default_stroke_color": "blue" }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            WhiteboardConfig::from_json(r#"{ "stroke_simplify_tolerance": -1.0 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            WhiteboardConfig::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "text_placeholder": "Type here" }}"#).unwrap();
        let config = WhiteboardConfig::from_file(file.path()).unwrap();
        assert_eq!(config.text_placeholder, "Type here");
    }
}
