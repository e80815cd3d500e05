//! Eraser command.

use super::{Command, CommandContext, CommandError, CommandKind, Snapshot};
use crate::record::ObjectId;
use crate::shapes::ShapeId;
use serde_json::json;

/// Remove every tagged object touched by a transient eraser stroke.
///
/// The stroke itself is only ever local: it is removed from the scene once
/// the victims are collected and never written remotely.
#[derive(Debug)]
pub struct Erase {
    stroke: ShapeId,
    /// Objects removed by the first execution, in z-order.
    erased: Vec<Snapshot>,
    scanned: bool,
    executed: bool,
}

impl Erase {
    pub fn new(stroke: ShapeId) -> Self {
        Self {
            stroke,
            erased: Vec::new(),
            scanned: false,
            executed: false,
        }
    }

    pub fn erased(&self) -> &[Snapshot] {
        &self.erased
    }

    fn scan(&mut self, ctx: &mut CommandContext<'_>) {
        let victims: Vec<Snapshot> = ctx
            .scene
            .tagged()
            .into_iter()
            .filter(|(handle, _)| *handle != self.stroke && ctx.scene.intersects(self.stroke, *handle))
            .filter_map(|(handle, _)| Snapshot::capture(&*ctx.scene, handle))
            .collect();
        ctx.scene.remove(self.stroke);
        self.erased = victims;
        self.scanned = true;
    }
}

impl Command for Erase {
    fn kind(&self) -> CommandKind {
        CommandKind::Erase
    }

    fn execute(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        if self.executed {
            return Ok(());
        }
        if !self.scanned {
            self.scan(ctx);
        }
        for snapshot in &self.erased {
            ctx.scene.remove_by_id(&snapshot.id);
            ctx.delete(&snapshot.id);
        }
        log::debug!("Erased {} objects", self.erased.len());
        self.executed = true;
        Ok(())
    }

    fn undo(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        if !self.executed {
            return Ok(());
        }
        for snapshot in &self.erased {
            snapshot.restore(ctx);
        }
        self.executed = false;
        Ok(())
    }

    fn is_executed(&self) -> bool {
        self.executed
    }

    fn object_ids(&self) -> Vec<ObjectId> {
        self.erased.iter().map(|s| s.id.clone()).collect()
    }

    fn describe(&self) -> serde_json::Value {
        json!({
            "erased": self.object_ids(),
        })
    }
}
