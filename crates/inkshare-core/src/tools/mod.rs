//! Tool system for the whiteboard.

use crate::commands::ShapeTool;
use crate::shapes::{SerializableColor, ShapeStyle};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Available tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    #[default]
    Pen,
    Eraser,
    Rectangle,
    Circle,
    Line,
    Text,
    Select,
    Hand,
}

impl ToolKind {
    pub const ALL: [ToolKind; 8] = [
        ToolKind::Pen,
        ToolKind::Eraser,
        ToolKind::Rectangle,
        ToolKind::Circle,
        ToolKind::Line,
        ToolKind::Text,
        ToolKind::Select,
        ToolKind::Hand,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::Pen => "pen",
            ToolKind::Eraser => "eraser",
            ToolKind::Rectangle => "rectangle",
            ToolKind::Circle => "circle",
            ToolKind::Line => "line",
            ToolKind::Text => "text",
            ToolKind::Select => "select",
            ToolKind::Hand => "hand",
        }
    }

    /// The drag-to-draw shape this tool produces, if any.
    pub fn shape_tool(&self) -> Option<ShapeTool> {
        match self {
            ToolKind::Rectangle => Some(ShapeTool::Rectangle),
            ToolKind::Circle => Some(ShapeTool::Circle),
            ToolKind::Line => Some(ShapeTool::Line),
            _ => None,
        }
    }

    /// How pointer input is captured with this tool.
    pub fn capture(&self) -> Capture {
        match self {
            ToolKind::Pen | ToolKind::Eraser => Capture::Freehand,
            ToolKind::Rectangle | ToolKind::Circle | ToolKind::Line => Capture::Drag,
            ToolKind::Text => Capture::Click,
            ToolKind::Select => Capture::Select,
            ToolKind::Hand => Capture::Pan,
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ToolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolKind::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| format!("Unknown tool: {}", s))
    }
}

/// Pointer capture strategy of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    /// Continuous stroke capture.
    Freehand,
    /// Press, drag, release with a preview.
    Drag,
    /// Single click.
    Click,
    /// Native selection and move.
    Select,
    /// Viewport panning.
    Pan,
}

/// What the controller is doing with the pointer right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InteractionMode {
    #[default]
    Idle,
    /// Capturing a pen or eraser stroke.
    Freehand,
    /// Dragging out a shape preview.
    ShapeDrag,
    /// Panning the viewport.
    Panning,
    /// Moving a selected object.
    Moving,
}

/// Keys the controller reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Held to pan with any tool.
    Space,
    /// Cancels the current gesture.
    Escape,
    Other,
}

/// Stroke style of the freehand brush for a tool.
///
/// The eraser paints a wide white stroke so the erased area reads as blank
/// while the stroke is being drawn.
pub fn brush_style(
    tool: ToolKind,
    color: SerializableColor,
    width: f64,
    eraser_width_factor: f64,
) -> ShapeStyle {
    match tool {
        ToolKind::Eraser => ShapeStyle::stroked(SerializableColor::white(), width * eraser_width_factor),
        _ => ShapeStyle::stroked(color, width),
    }
}
