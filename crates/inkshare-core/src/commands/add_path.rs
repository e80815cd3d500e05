//! Freehand stroke command.

use super::{Command, CommandContext, CommandError, CommandKind};
use crate::record::{ObjectId, ObjectRecord};
use crate::scene::{Materialized, SceneError, Ticket};
use crate::shapes::{Shape, ShapeKind};
use serde_json::json;

/// Where an AddPath is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathState {
    Idle,
    /// Deserialization issued, shape not in the scene yet.
    InFlight(Ticket),
    Applied,
}

/// Add a freehand path from its serialized record.
#[derive(Debug)]
pub struct AddPath {
    id: ObjectId,
    record: ObjectRecord,
    state: PathState,
    executed: bool,
}

impl AddPath {
    pub fn new(record: ObjectRecord, id: ObjectId) -> Self {
        Self {
            id,
            record,
            state: PathState::Idle,
            executed: false,
        }
    }

    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    fn apply(&mut self, ctx: &mut CommandContext<'_>, shape: Shape) {
        ctx.scene.add(shape, Some(self.id.clone()));
        ctx.write_current(&self.id);
        self.state = PathState::Applied;
    }
}

impl Command for AddPath {
    fn kind(&self) -> CommandKind {
        CommandKind::AddPath
    }

    fn execute(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        if self.executed {
            return Ok(());
        }
        if self.record.kind() != ShapeKind::Path {
            return Err(CommandError::InvalidInput(format!(
                "expected a path record, got {}",
                self.record.kind().name()
            )));
        }
        match ctx.scene.deserialize(&self.record)? {
            Materialized::Ready(shape) => self.apply(ctx, shape),
            Materialized::Pending(ticket) => {
                log::debug!("Path {} pending as ticket {}", self.id, ticket);
                self.state = PathState::InFlight(ticket);
            }
        }
        self.executed = true;
        Ok(())
    }

    fn undo(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        if !self.executed {
            return Ok(());
        }
        if let PathState::InFlight(ticket) = self.state {
            // Nothing was added or written yet; the resolution is dropped
            log::debug!("Path {} undone while ticket {} in flight", self.id, ticket);
        } else {
            ctx.scene.remove_by_id(&self.id);
            ctx.delete(&self.id);
        }
        self.state = PathState::Idle;
        self.executed = false;
        Ok(())
    }

    fn is_executed(&self) -> bool {
        self.executed
    }

    /// True while the scene is still building the shape.
    fn is_in_flight(&self) -> bool {
        matches!(self.state, PathState::InFlight(_))
    }

    fn object_ids(&self) -> Vec<ObjectId> {
        vec![self.id.clone()]
    }

    fn describe(&self) -> serde_json::Value {
        let points = match &self.record.geometry {
            crate::record::Geometry::Path { points } => points.len(),
            _ => 0,
        };
        json!({
            "objectId": self.id,
            "points": points,
            "stroke": self.record.stroke,
            "strokeWidth": self.record.stroke_width,
            "inFlight": self.is_in_flight(),
        })
    }

    fn on_materialized(
        &mut self,
        ctx: &mut CommandContext<'_>,
        ticket: Ticket,
        result: &Result<Shape, SceneError>,
    ) -> bool {
        if self.state != PathState::InFlight(ticket) || !self.executed {
            return false;
        }
        match result {
            Ok(shape) => self.apply(ctx, shape.clone()),
            Err(e) => {
                log::error!("Failed to materialize path {}: {}", self.id, e);
                self.state = PathState::Idle;
                self.executed = false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteOp;
    use crate::scene::{Scene, SceneAdapter};
    use kurbo::Point;

    fn stroke() -> ObjectRecord {
        ObjectRecord::path(&[Point::new(0.0, 0.0), Point::new(10.0, 10.0)], None, None)
    }

    #[test]
    fn test_execute_adds_and_writes() {
        let mut scene = Scene::new();
        let mut outbox = Vec::new();
        let mut cmd = AddPath::new(stroke(), ObjectId::new("p1"));
        cmd.execute(&mut CommandContext::new(&mut scene, &mut outbox)).unwrap();

        assert!(scene.find(&ObjectId::new("p1")).is_some());
        assert_eq!(outbox.len(), 1);
        match &outbox[0] {
            RemoteOp::Write { key, value } => {
                assert_eq!(key, "p1");
                assert_eq!(value["type"], "path");
                assert_eq!(value["stroke"], "#000000");
                assert_eq!(value["strokeWidth"], 5.0);
            }
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn test_double_execute_is_noop() {
        let mut scene = Scene::new();
        let mut outbox = Vec::new();
        let mut cmd = AddPath::new(stroke(), ObjectId::new("p1"));
        let mut ctx = CommandContext::new(&mut scene, &mut outbox);
        cmd.execute(&mut ctx).unwrap();
        cmd.execute(&mut ctx).unwrap();
        assert_eq!(ctx.scene.len(), 1);
        assert_eq!(ctx.outbox.len(), 1);
    }

    #[test]
    fn test_undo_removes_and_deletes() {
        let mut scene = Scene::new();
        let mut outbox = Vec::new();
        let mut cmd = AddPath::new(stroke(), ObjectId::new("p1"));
        let mut ctx = CommandContext::new(&mut scene, &mut outbox);
        cmd.execute(&mut ctx).unwrap();
        cmd.undo(&mut ctx).unwrap();
        cmd.undo(&mut ctx).unwrap();
        assert!(ctx.scene.is_empty());
        assert_eq!(ctx.outbox.last(), Some(&RemoteOp::Delete { key: "p1".into() }));
        assert_eq!(ctx.outbox.len(), 2);
    }

    #[test]
    fn test_rejects_non_path_record() {
        let mut scene = Scene::new();
        let mut outbox = Vec::new();
        let record = ObjectRecord::from_value(&json!({
            "type": "line", "x1": 0, "y1": 0, "x2": 1, "y2": 1
        }))
        .unwrap();
        let mut cmd = AddPath::new(record, ObjectId::new("l"));
        let result = cmd.execute(&mut CommandContext::new(&mut scene, &mut outbox));
        assert!(matches!(result, Err(CommandError::InvalidInput(_))));
        assert!(!cmd.is_executed());
    }

    #[test]
    fn test_pending_resolution_applies() {
        let mut scene = Scene::new();
        scene.set_deferred_paths(true);
        let mut outbox = Vec::new();
        let mut cmd = AddPath::new(stroke(), ObjectId::new("p1"));
        cmd.execute(&mut CommandContext::new(&mut scene, &mut outbox)).unwrap();
        assert!(cmd.is_in_flight());
        assert!(scene.is_empty());
        assert!(outbox.is_empty());

        for (ticket, result) in scene.poll_materialized() {
            let mut ctx = CommandContext::new(&mut scene, &mut outbox);
            assert!(cmd.on_materialized(&mut ctx, ticket, &result));
        }
        assert_eq!(scene.len(), 1);
        assert_eq!(outbox.len(), 1);
    }

    #[test]
    fn test_undo_in_flight_discards_resolution() {
        let mut scene = Scene::new();
        scene.set_deferred_paths(true);
        let mut outbox = Vec::new();
        let mut cmd = AddPath::new(stroke(), ObjectId::new("p1"));
        cmd.execute(&mut CommandContext::new(&mut scene, &mut outbox)).unwrap();
        cmd.undo(&mut CommandContext::new(&mut scene, &mut outbox)).unwrap();

        for (ticket, result) in scene.poll_materialized() {
            let mut ctx = CommandContext::new(&mut scene, &mut outbox);
            assert!(!cmd.on_materialized(&mut ctx, ticket, &result));
        }
        assert!(scene.is_empty());
        assert!(outbox.is_empty());
    }
}
