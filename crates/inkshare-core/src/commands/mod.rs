//! Reversible scene mutations.
//!
//! A command applies one edit to the scene and queues the matching remote
//! writes in the [`CommandContext`] outbox. `undo` reverses both. Each
//! command carries an executed flag so repeated `execute` or `undo` calls
//! are no-ops.

mod add_path;
mod add_shape;
mod add_text;
mod clear_all;
mod erase;

pub use add_path::AddPath;
pub use add_shape::{AddShape, ShapeTool};
pub use add_text::{AddText, TextState};
pub use clear_all::ClearAll;
pub use erase::Erase;

use crate::record::{ObjectId, ObjectRecord};
use crate::remote::RemoteOp;
use crate::scene::{SceneAdapter, SceneError, Ticket};
use crate::shapes::{Shape, ShapeId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Command errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CommandError {
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Diagnostic tag of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    AddPath,
    AddShape,
    AddText,
    Erase,
    ClearAll,
}

impl CommandKind {
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::AddPath => "add_path",
            CommandKind::AddShape => "add_shape",
            CommandKind::AddText => "add_text",
            CommandKind::Erase => "erase",
            CommandKind::ClearAll => "clear_all",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a command may touch while it runs.
pub struct CommandContext<'a> {
    pub scene: &'a mut dyn SceneAdapter,
    pub outbox: &'a mut Vec<RemoteOp>,
}

impl<'a> CommandContext<'a> {
    pub fn new(scene: &'a mut dyn SceneAdapter, outbox: &'a mut Vec<RemoteOp>) -> Self {
        Self { scene, outbox }
    }

    /// Queue a write of `record` under `id`.
    pub fn write(&mut self, id: &ObjectId, record: &ObjectRecord) {
        match record.to_value() {
            Ok(value) => self.outbox.push(RemoteOp::Write {
                key: id.to_string(),
                value,
            }),
            Err(e) => log::error!("Failed to serialize {}: {}", id, e),
        }
    }

    /// Queue a write of the scene object tagged `id`.
    pub fn write_current(&mut self, id: &ObjectId) {
        let record = self.scene.find(id).and_then(|h| self.scene.serialize(h));
        match record {
            Some(record) => self.write(id, &record),
            None => log::warn!("Cannot write {}: not in scene", id),
        }
    }

    pub fn delete(&mut self, id: &ObjectId) {
        self.outbox.push(RemoteOp::Delete { key: id.to_string() });
    }

    pub fn delete_all(&mut self) {
        self.outbox.push(RemoteOp::DeleteAll);
    }
}

/// A removed object, kept so it can be restored.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub id: ObjectId,
    pub shape: Shape,
    pub record: ObjectRecord,
}

impl Snapshot {
    /// Capture the object at `handle`, if it is tagged.
    pub fn capture(scene: &dyn SceneAdapter, handle: ShapeId) -> Option<Self> {
        let id = scene.object_id(handle)?.clone();
        let shape = scene.get(handle)?.clone();
        let record = scene.serialize(handle)?;
        Some(Self { id, shape, record })
    }

    /// Put the object back and queue its remote write.
    pub fn restore(&self, ctx: &mut CommandContext<'_>) {
        ctx.scene.add(self.shape.clone(), Some(self.id.clone()));
        ctx.write(&self.id, &self.record);
    }
}

/// A reversible edit.
pub trait Command: fmt::Debug {
    fn kind(&self) -> CommandKind;

    fn execute(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), CommandError>;

    fn undo(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), CommandError>;

    fn is_executed(&self) -> bool;

    /// ObjectIds this command affects.
    fn object_ids(&self) -> Vec<ObjectId>;

    /// Command data for diagnostics.
    fn describe(&self) -> serde_json::Value;

    /// Offer a resolved deserialization. Returns true if the ticket was ours.
    fn on_materialized(
        &mut self,
        _ctx: &mut CommandContext<'_>,
        _ticket: Ticket,
        _result: &Result<Shape, SceneError>,
    ) -> bool {
        false
    }

    /// Whether the command waits on an asynchronous deserialization.
    fn is_in_flight(&self) -> bool {
        false
    }

    /// Whether an interactive edit session is open.
    fn is_editing(&self) -> bool {
        false
    }

    /// Replace the content of an open edit session.
    fn update_edit(&mut self, _ctx: &mut CommandContext<'_>, _content: &str) -> bool {
        false
    }

    /// Close an open edit session. Returns true if one was open.
    fn finish_edit(&mut self, _ctx: &mut CommandContext<'_>) -> bool {
        false
    }
}

fn point_json(p: kurbo::Point) -> serde_json::Value {
    serde_json::json!([p.x, p.y])
}
