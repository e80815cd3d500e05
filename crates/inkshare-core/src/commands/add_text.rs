//! Text label command.
//!
//! The remote write is deferred until the edit session ends. An empty label
//! is removed instead of written.

use super::{Command, CommandContext, CommandError, CommandKind, point_json};
use crate::record::ObjectId;
use crate::shapes::{SerializableColor, Shape, ShapeStyle, Text};
use kurbo::Point;
use serde_json::json;

/// Edit lifecycle of a text label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextState {
    /// Not yet executed.
    New,
    /// In the scene, being edited, not written remotely.
    Editing,
    /// Written remotely with non-empty content.
    Committed,
    /// Edit ended empty; the label is gone for good.
    Discarded,
}

/// Add an editable text label.
#[derive(Debug)]
pub struct AddText {
    id: ObjectId,
    position: Point,
    color: SerializableColor,
    font_size: f64,
    content: String,
    state: TextState,
    executed: bool,
}

impl AddText {
    pub fn new(
        id: ObjectId,
        position: Point,
        color: SerializableColor,
        content: String,
        font_size: f64,
    ) -> Self {
        Self {
            id,
            position,
            color,
            font_size,
            content,
            state: TextState::New,
            executed: false,
        }
    }

    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    pub fn state(&self) -> TextState {
        self.state
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    fn build(&self) -> Shape {
        let mut text = Text::new(self.position, self.content.clone(), self.font_size);
        text.style = ShapeStyle::stroked(self.color, 1.0);
        Shape::Text(text)
    }
}

impl Command for AddText {
    fn kind(&self) -> CommandKind {
        CommandKind::AddText
    }

    fn execute(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        if self.executed {
            return Ok(());
        }
        match self.state {
            TextState::Discarded => return Ok(()),
            TextState::New | TextState::Editing => {
                ctx.scene.add(self.build(), Some(self.id.clone()));
                self.state = TextState::Editing;
            }
            TextState::Committed => {
                ctx.scene.add(self.build(), Some(self.id.clone()));
                ctx.write_current(&self.id);
            }
        }
        self.executed = true;
        Ok(())
    }

    fn undo(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        if !self.executed {
            return Ok(());
        }
        ctx.scene.remove_by_id(&self.id);
        // The entry may never have been written; deleting is harmless
        ctx.delete(&self.id);
        if self.state == TextState::Editing {
            self.state = TextState::New;
        }
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
            "position": point_json(self.position),
            "text": self.content,
            "fontSize": self.font_size,
            "state": format!("{:?}", self.state),
        })
    }

    fn is_editing(&self) -> bool {
        self.executed && self.state == TextState::Editing
    }

    fn update_edit(&mut self, ctx: &mut CommandContext<'_>, content: &str) -> bool {
        if !self.is_editing() {
            return false;
        }
        self.content = content.to_string();
        let handle = ctx.scene.find(&self.id);
        if let Some(Shape::Text(text)) = handle.and_then(|h| ctx.scene.get_mut(h)) {
            text.content = self.content.clone();
        }
        true
    }

    fn finish_edit(&mut self, ctx: &mut CommandContext<'_>) -> bool {
        if !self.is_editing() {
            return false;
        }
        if self.content.trim().is_empty() {
            log::debug!("Discarding empty text {}", self.id);
            ctx.scene.remove_by_id(&self.id);
            self.state = TextState::Discarded;
            self.executed = false;
        } else {
            ctx.write_current(&self.id);
            self.state = TextState::Committed;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteOp;
    use crate::scene::{Scene, SceneAdapter};

    fn text_cmd(content: &str) -> AddText {
        AddText::new(
            ObjectId::new("t1"),
            Point::new(5.0, 5.0),
            SerializableColor::black(),
            content.to_string(),
            20.0,
        )
    }

    #[test]
    fn test_execute_defers_write() {
        let mut scene = Scene::new();
        let mut outbox = Vec::new();
        let mut cmd = text_cmd("Text");
        cmd.execute(&mut CommandContext::new(&mut scene, &mut outbox)).unwrap();
        assert!(cmd.is_editing());
        assert_eq!(scene.len(), 1);
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_commit_writes_once() {
        let mut scene = Scene::new();
        let mut outbox = Vec::new();
        let mut cmd = text_cmd("Text");
        let mut ctx = CommandContext::new(&mut scene, &mut outbox);
        cmd.execute(&mut ctx).unwrap();
        assert!(cmd.update_edit(&mut ctx, "hello"));
        assert!(cmd.finish_edit(&mut ctx));
        assert!(!cmd.finish_edit(&mut ctx));

        assert_eq!(cmd.state(), TextState::Committed);
        assert_eq!(ctx.outbox.len(), 1);
        match &ctx.outbox[0] {
            RemoteOp::Write { value, .. } => {
                assert_eq!(value["type"], "text");
                assert_eq!(value["text"], "hello");
                assert_eq!(value["fontSize"], 20.0);
            }
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn test_empty_edit_discards() {
        let mut scene = Scene::new();
        let mut outbox = Vec::new();
        let mut cmd = text_cmd("Text");
        let mut ctx = CommandContext::new(&mut scene, &mut outbox);
        cmd.execute(&mut ctx).unwrap();
        cmd.update_edit(&mut ctx, "   ");
        cmd.finish_edit(&mut ctx);

        assert!(ctx.scene.is_empty());
        assert!(ctx.outbox.is_empty());
        assert_eq!(cmd.state(), TextState::Discarded);

        // Undo and redo of a discarded label are no-ops
        cmd.undo(&mut ctx).unwrap();
        cmd.execute(&mut ctx).unwrap();
        assert!(ctx.scene.is_empty());
        assert!(ctx.outbox.is_empty());
    }

    #[test]
    fn test_undo_redo_committed() {
        let mut scene = Scene::new();
        let mut outbox = Vec::new();
        let mut cmd = text_cmd("Text");
        let mut ctx = CommandContext::new(&mut scene, &mut outbox);
        cmd.execute(&mut ctx).unwrap();
        cmd.finish_edit(&mut ctx);
        cmd.undo(&mut ctx).unwrap();
        assert!(ctx.scene.is_empty());
        assert_eq!(ctx.outbox.last(), Some(&RemoteOp::Delete { key: "t1".into() }));

        cmd.execute(&mut ctx).unwrap();
        assert_eq!(ctx.scene.len(), 1);
        assert!(!cmd.is_editing());
        assert!(matches!(ctx.outbox.last(), Some(RemoteOp::Write { .. })));
    }
}
