//! Clear-canvas command.

use super::{Command, CommandContext, CommandError, CommandKind, Snapshot};
use crate::record::ObjectId;
use serde_json::json;

/// Remove everything from the scene and the drawing namespace.
#[derive(Debug, Default)]
pub struct ClearAll {
    cleared: Vec<Snapshot>,
    executed: bool,
}

impl ClearAll {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cleared(&self) -> &[Snapshot] {
        &self.cleared
    }
}

impl Command for ClearAll {
    fn kind(&self) -> CommandKind {
        CommandKind::ClearAll
    }

    fn execute(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        if self.executed {
            return Ok(());
        }
        // Snapshot before anything is removed
        self.cleared = ctx
            .scene
            .tagged()
            .into_iter()
            .filter_map(|(handle, _)| Snapshot::capture(&*ctx.scene, handle))
            .collect();
        ctx.scene.clear();
        ctx.delete_all();
        log::debug!("Cleared {} objects", self.cleared.len());
        self.executed = true;
        Ok(())
    }

    fn undo(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        if !self.executed {
            return Ok(());
        }
        for snapshot in &self.cleared {
            snapshot.restore(ctx);
        }
        self.executed = false;
        Ok(())
    }

    fn is_executed(&self) -> bool {
        self.executed
    }

    fn object_ids(&self) -> Vec<ObjectId> {
        self.cleared.iter().map(|s| s.id.clone()).collect()
    }

    fn describe(&self) -> serde_json::Value {
        json!({
            "cleared": self.cleared.len(),
        })
    }
}
