//! Bounded linear undo/redo log.

use crate::commands::{Command, CommandContext, CommandKind};
use crate::scene::{SceneError, Ticket};
use crate::shapes::Shape;
use serde::{Deserialize, Serialize};

/// Maximum number of undoable commands by default.
pub const MAX_UNDO_HISTORY: usize = 50;

/// Summary of the history state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryInfo {
    pub total: usize,
    /// Index of the last applied command, -1 when none is applied.
    pub current_index: isize,
    pub can_undo: bool,
    pub can_redo: bool,
}

/// Per-command diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDetails {
    pub kind: CommandKind,
    pub executed: bool,
    pub data: serde_json::Value,
}

/// Linear history of executed commands.
///
/// The first `applied` commands are in effect; the rest were undone and can
/// be redone. Executing a new command drops the redoable tail.
#[derive(Debug)]
pub struct CommandHistory {
    commands: Vec<Box<dyn Command>>,
    applied: usize,
    max_size: usize,
    /// Commands no longer undoable that still wait on a materialization.
    detached: Vec<Box<dyn Command>>,
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new(MAX_UNDO_HISTORY)
    }
}

impl CommandHistory {
    pub fn new(max_size: usize) -> Self {
        Self {
            commands: Vec::new(),
            applied: 0,
            max_size: max_size.max(1),
            detached: Vec::new(),
        }
    }

    /// Execute a command and record it. A failing command is not recorded.
    pub fn execute_command(&mut self, mut command: Box<dyn Command>, ctx: &mut CommandContext<'_>) -> bool {
        if let Err(e) = command.execute(ctx) {
            log::error!("Failed to execute {}: {}", command.kind(), e);
            return false;
        }
        log::debug!("Executed {}", command.kind());

        self.commands.truncate(self.applied);
        self.commands.push(command);
        self.applied = self.commands.len();

        if self.commands.len() > self.max_size {
            let excess = self.commands.len() - self.max_size;
            let evicted: Vec<_> = self.commands.drain(..excess).collect();
            self.applied -= excess;
            self.detach(evicted);
        }
        true
    }

    /// Keep commands that still have to finish materializing.
    fn detach(&mut self, commands: impl IntoIterator<Item = Box<dyn Command>>) {
        for command in commands {
            if command.is_in_flight() {
                log::debug!("{} left history while in flight", command.kind());
                self.detached.push(command);
            }
        }
    }

    /// Hand a resolved deserialization to the command waiting on it.
    /// Returns false if no command claims `ticket`.
    pub fn resolve(
        &mut self,
        ctx: &mut CommandContext<'_>,
        ticket: Ticket,
        result: &Result<Shape, SceneError>,
    ) -> bool {
        if self
            .commands
            .iter_mut()
            .any(|c| c.on_materialized(ctx, ticket, result))
        {
            return true;
        }
        match self
            .detached
            .iter_mut()
            .position(|c| c.on_materialized(ctx, ticket, result))
        {
            Some(index) => {
                self.detached.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Undo the last applied command. Returns false if there is none or it fails.
    pub fn undo(&mut self, ctx: &mut CommandContext<'_>) -> bool {
        if self.applied == 0 {
            return false;
        }
        let command = &mut self.commands[self.applied - 1];
        if let Err(e) = command.undo(ctx) {
            log::error!("Failed to undo {}: {}", command.kind(), e);
            return false;
        }
        log::debug!("Undid {}", command.kind());
        self.applied -= 1;
        true
    }

    /// Redo the next undone command. Returns false if there is none or it fails.
    pub fn redo(&mut self, ctx: &mut CommandContext<'_>) -> bool {
        if self.applied >= self.commands.len() {
            return false;
        }
        let command = &mut self.commands[self.applied];
        if let Err(e) = command.execute(ctx) {
            log::error!("Failed to redo {}: {}", command.kind(), e);
            return false;
        }
        log::debug!("Redid {}", command.kind());
        self.applied += 1;
        true
    }

    pub fn can_undo(&self) -> bool {
        self.applied > 0
    }

    pub fn can_redo(&self) -> bool {
        self.applied < self.commands.len()
    }

    /// Forget every command. Ones still in flight are kept until they resolve.
    pub fn clear(&mut self) {
        let commands = std::mem::take(&mut self.commands);
        self.applied = 0;
        self.detach(commands);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Index of the last applied command, -1 when none is applied.
    pub fn current_index(&self) -> isize {
        self.applied as isize - 1
    }

    /// The last applied command.
    pub fn current(&self) -> Option<&dyn Command> {
        self.applied
            .checked_sub(1)
            .and_then(|i| self.commands.get(i))
            .map(|c| c.as_ref())
    }

    pub fn current_mut(&mut self) -> Option<&mut Box<dyn Command>> {
        let index = self.applied.checked_sub(1)?;
        self.commands.get_mut(index)
    }

    /// All recorded commands, applied or not.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Command>> {
        self.commands.iter_mut()
    }

    pub fn info(&self) -> HistoryInfo {
        HistoryInfo {
            total: self.commands.len(),
            current_index: self.current_index(),
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
        }
    }

    pub fn details(&self) -> Vec<CommandDetails> {
        self.commands
            .iter()
            .map(|c| CommandDetails {
                kind: c.kind(),
                executed: c.is_executed(),
                data: c.describe(),
            })
            .collect()
    }

    /// Number of recorded commands of `kind`.
    pub fn command_count(&self, kind: CommandKind) -> usize {
        self.commands.iter().filter(|c| c.kind() == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{AddPath, AddShape, CommandError, ShapeTool};
    use crate::record::{ObjectId, ObjectRecord};
    use crate::remote::RemoteOp;
    use crate::scene::{Scene, SceneAdapter};
    use crate::shapes::SerializableColor;
    use kurbo::Point;

    fn line(id: &str) -> Box<dyn Command> {
        Box::new(AddShape::new(
            ObjectId::new(id),
            ShapeTool::Line,
            SerializableColor::black(),
            2.0,
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            5.0,
        ))
    }

    #[derive(Debug)]
    struct Failing;

    impl Command for Failing {
        fn kind(&self) -> CommandKind {
            CommandKind::AddPath
        }
        fn execute(&mut self, _ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
            Err(CommandError::InvalidInput("always fails".into()))
        }
        fn undo(&mut self, _ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
            Ok(())
        }
        fn is_executed(&self) -> bool {
            false
        }
        fn object_ids(&self) -> Vec<ObjectId> {
            Vec::new()
        }
        fn describe(&self) -> serde_json::Value {
            serde_json::Value::Null
        }
    }

    /// Executes fine but cannot be undone.
    #[derive(Debug)]
    struct Stuck;

    impl Command for Stuck {
        fn kind(&self) -> CommandKind {
            CommandKind::ClearAll
        }
        fn execute(&mut self, _ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
            Ok(())
        }
        fn undo(&mut self, _ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
            Err(CommandError::InvalidInput("stuck".into()))
        }
        fn is_executed(&self) -> bool {
            true
        }
        fn object_ids(&self) -> Vec<ObjectId> {
            Vec::new()
        }
        fn describe(&self) -> serde_json::Value {
            serde_json::Value::Null
        }
    }

    #[test]
    fn test_empty_history() {
        let mut scene = Scene::new();
        let mut outbox: Vec<RemoteOp> = Vec::new();
        let mut ctx = CommandContext::new(&mut scene, &mut outbox);
        let mut history = CommandHistory::default();
        assert!(!history.undo(&mut ctx));
        assert!(!history.redo(&mut ctx));
        assert_eq!(history.current_index(), -1);
    }

    #[test]
    fn test_truncates_redo_tail() {
        let mut scene = Scene::new();
        let mut outbox = Vec::new();
        let mut ctx = CommandContext::new(&mut scene, &mut outbox);
        let mut history = CommandHistory::default();
        for id in ["a", "b", "c"] {
            assert!(history.execute_command(line(id), &mut ctx));
        }
        assert_eq!(history.current_index(), 2);
        history.undo(&mut ctx);
        history.undo(&mut ctx);
        assert_eq!(history.current_index(), 0);

        history.execute_command(line("d"), &mut ctx);
        assert_eq!(history.len(), 2);
        assert!(!history.can_redo());
        let ids: Vec<_> = history
            .details()
            .iter()
            .map(|d| d.data["objectId"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "d"]);
    }

    #[test]
    fn test_bounded_size_drops_oldest() {
        let mut scene = Scene::new();
        let mut outbox = Vec::new();
        let mut ctx = CommandContext::new(&mut scene, &mut outbox);
        let mut history = CommandHistory::new(2);
        for id in ["a", "b", "c"] {
            history.execute_command(line(id), &mut ctx);
        }
        assert_eq!(history.len(), 2);
        assert_eq!(history.current_index(), 1);
        assert!(history.undo(&mut ctx));
        assert!(history.undo(&mut ctx));
        assert!(!history.undo(&mut ctx));
        // "a" stays in the scene for good
        assert!(ctx.scene.find(&ObjectId::new("a")).is_some());
        assert_eq!(ctx.scene.len(), 1);
    }

    #[test]
    fn test_failed_command_not_recorded() {
        let mut scene = Scene::new();
        let mut outbox = Vec::new();
        let mut ctx = CommandContext::new(&mut scene, &mut outbox);
        let mut history = CommandHistory::default();
        assert!(!history.execute_command(Box::new(Failing), &mut ctx));
        assert!(history.is_empty());
        assert!(!history.can_undo());
    }

    #[test]
    fn test_failed_undo_keeps_cursor() {
        let mut scene = Scene::new();
        let mut outbox = Vec::new();
        let mut ctx = CommandContext::new(&mut scene, &mut outbox);
        let mut history = CommandHistory::default();
        history.execute_command(line("a"), &mut ctx);
        history.execute_command(Box::new(Stuck), &mut ctx);

        assert!(!history.undo(&mut ctx));
        assert_eq!(history.current_index(), 1);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_evicted_in_flight_path_still_resolves() {
        let mut scene = Scene::new();
        scene.set_deferred_paths(true);
        let mut outbox = Vec::new();
        let mut ctx = CommandContext::new(&mut scene, &mut outbox);
        let mut history = CommandHistory::new(1);

        let record = ObjectRecord::path(&[Point::new(0.0, 0.0), Point::new(4.0, 3.0)], None, None);
        history.execute_command(Box::new(AddPath::new(record, ObjectId::new("p"))), &mut ctx);
        history.execute_command(line("a"), &mut ctx);
        assert_eq!(history.len(), 1);

        let resolved = ctx.scene.poll_materialized();
        assert_eq!(resolved.len(), 1);
        for (ticket, result) in resolved {
            assert!(history.resolve(&mut ctx, ticket, &result));
        }
        assert!(ctx.scene.find(&ObjectId::new("p")).is_some());
        assert!(ctx
            .outbox
            .iter()
            .any(|op| matches!(op, RemoteOp::Write { key, .. } if key == "p")));
        // Claimed once only
        assert!(!history.resolve(&mut ctx, 0, &Err(SceneError::Pending(0))));
    }

    #[test]
    fn test_info_and_counts() {
        let mut scene = Scene::new();
        let mut outbox = Vec::new();
        let mut ctx = CommandContext::new(&mut scene, &mut outbox);
        let mut history = CommandHistory::default();
        history.execute_command(line("a"), &mut ctx);
        history.execute_command(line("b"), &mut ctx);
        history.undo(&mut ctx);

        let info = history.info();
        assert_eq!(info.total, 2);
        assert_eq!(info.current_index, 0);
        assert!(info.can_undo);
        assert!(info.can_redo);
        assert_eq!(history.command_count(CommandKind::AddShape), 2);
        assert_eq!(history.command_count(CommandKind::Erase), 0);

        history.clear();
        assert_eq!(history.info().current_index, -1);
    }
}
