//! Rectangle, circle and line commands.

use super::{Command, CommandContext, CommandError, CommandKind, point_json};
use crate::record::ObjectId;
use crate::shapes::{Circle, Line, Rectangle, SerializableColor, Shape, ShapeStyle};
use kurbo::Point;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Drag-to-draw shape tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeTool {
    Rectangle,
    Circle,
    Line,
}

impl ShapeTool {
    /// Build the shape spanned by a drag from `start` to `end`.
    pub fn build(&self, start: Point, end: Point, style: ShapeStyle, min_rect_size: f64) -> Shape {
        match self {
            ShapeTool::Rectangle => {
                let mut rect = Rectangle::from_corners(start, end, min_rect_size);
                rect.style = style;
                Shape::Rectangle(rect)
            }
            ShapeTool::Circle => {
                let mut circle = Circle::from_diameter(start, end);
                circle.style = style;
                Shape::Circle(circle)
            }
            ShapeTool::Line => {
                let mut line = Line::new(start, end);
                line.style = style;
                Shape::Line(line)
            }
        }
    }
}

/// Add a rectangle, circle or line.
#[derive(Debug)]
pub struct AddShape {
    id: ObjectId,
    tool: ShapeTool,
    start: Point,
    end: Point,
    shape: Shape,
    executed: bool,
}

impl AddShape {
    pub fn new(
        id: ObjectId,
        tool: ShapeTool,
        color: SerializableColor,
        width: f64,
        start: Point,
        end: Point,
        min_rect_size: f64,
    ) -> Self {
        let shape = tool.build(start, end, ShapeStyle::stroked(color, width), min_rect_size);
        Self {
            id,
            tool,
            start,
            end,
            shape,
            executed: false,
        }
    }

    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }
}

impl Command for AddShape {
    fn kind(&self) -> CommandKind {
        CommandKind::AddShape
    }

    fn execute(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        if self.executed {
            return Ok(());
        }
        if !self.shape.bounds().is_finite() {
            return Err(CommandError::InvalidInput("non-finite drag points".into()));
        }
        ctx.scene.add(self.shape.clone(), Some(self.id.clone()));
        ctx.write_current(&self.id);
        self.executed = true;
        Ok(())
    }

    fn undo(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        if !self.executed {
            return Ok(());
        }
        ctx.scene.remove_by_id(&self.id);
        ctx.delete(&self.id);
        self.executed = false;
        Ok(())
    }

    fn is_executed(&self) -> bool {
        self.executed
    }

    fn object_ids(&self) -> Vec<ObjectId> {
        vec![self.id.clone()]
    }

    fn describe(&self) -> serde_json::Value {
        json!({
            "objectId": self.id,
            "tool": self.tool,
            "start": point_json(self.start),
            "end": point_json(self.end),
            "stroke": self.shape.style().stroke_color.to_hex(),
            "strokeWidth": self.shape.style().stroke_width,
        })
    }
}
