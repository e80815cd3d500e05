//! Drawing session controller.
//!
//! `WhiteboardManager` owns the tool state, the command history and the sync
//! bridge for one session. Every public method contains its failures: they
//! are logged and reported through `bool`/`Option` returns.

use crate::camera::Camera;
use crate::collaboration::{ReconcileReport, SyncBridge};
use crate::commands::{AddPath, AddShape, AddText, ClearAll, Command, CommandContext, CommandKind, Erase};
use crate::config::WhiteboardConfig;
use crate::history::{CommandDetails, CommandHistory, HistoryInfo};
use crate::preview::Preview;
use crate::record::{ObjectId, ObjectRecord};
use crate::remote::{paths, Entries, RemoteOp, RemoteStore, Subscription};
use crate::scene::SceneAdapter;
use crate::shapes::{Freehand, SerializableColor, Shape, ShapeId, ShapeStyle};
use crate::tools::{self, Capture, InteractionMode, Key, ToolKind};
use kurbo::{Affine, Point, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Tool, color and width in effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub tool: ToolKind,
    pub color: String,
    pub width: f64,
}

/// A freehand stroke being captured.
#[derive(Debug)]
struct Stroke {
    handle: ShapeId,
    points: Vec<Point>,
}

/// A select-tool drag.
#[derive(Debug)]
struct Move {
    handle: ShapeId,
    last: Point,
}

/// Controller for one drawing session.
#[derive(Debug)]
pub struct WhiteboardManager<S: SceneAdapter, R: RemoteStore> {
    config: WhiteboardConfig,
    user_id: String,
    session_id: String,
    namespace: String,
    tool: ToolKind,
    color: SerializableColor,
    width: f64,
    history: CommandHistory,
    bridge: SyncBridge,
    preview: Option<Preview>,
    camera: Camera,
    viewport: Size,
    mode: InteractionMode,
    space_held: bool,
    last_screen: Option<Point>,
    stroke: Option<Stroke>,
    moving: Option<Move>,
    /// Label whose edit session is open.
    active_text: Option<ObjectId>,
    outbox: Vec<RemoteOp>,
    subscription: Option<Subscription>,
    scene: S,
    store: R,
}

impl<S: SceneAdapter, R: RemoteStore> WhiteboardManager<S, R> {
    pub fn new(scene: S, store: R, session_id: &str, user_id: &str) -> Self {
        Self::with_config(scene, store, session_id, user_id, WhiteboardConfig::default())
    }

    /// Controller with explicit tunables. The scene receives the configured
    /// stroke defaults for records that omit them.
    pub fn with_config(
        mut scene: S,
        store: R,
        session_id: &str,
        user_id: &str,
        config: WhiteboardConfig,
    ) -> Self {
        scene.set_style_defaults(config.style_defaults());
        Self {
            tool: ToolKind::default(),
            color: config.stroke_color(),
            width: config.default_stroke_width,
            history: CommandHistory::new(config.max_history_size),
            bridge: SyncBridge::new(),
            preview: None,
            camera: Camera::from_config(&config),
            viewport: Size::ZERO,
            mode: InteractionMode::Idle,
            space_held: false,
            last_screen: None,
            stroke: None,
            moving: None,
            active_text: None,
            outbox: Vec::new(),
            subscription: None,
            namespace: paths::drawings(session_id),
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            config,
            scene,
            store,
        }
    }

    pub fn config(&self) -> &WhiteboardConfig {
        &self.config
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Remote namespace holding this session's drawing.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    pub fn store(&self) -> &R {
        &self.store
    }

    pub fn bridge(&self) -> &SyncBridge {
        &self.bridge
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    pub fn active_text(&self) -> Option<&ObjectId> {
        self.active_text.as_ref()
    }

    // --- Settings ---

    pub fn tool(&self) -> ToolKind {
        self.tool
    }

    pub fn color(&self) -> SerializableColor {
        self.color
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    /// Switch tools. Any gesture in progress is abandoned.
    pub fn set_tool(&mut self, tool: ToolKind) {
        if tool == self.tool {
            return;
        }
        self.cancel_gesture();
        log::debug!("Tool: {} -> {}", self.tool, tool);
        self.tool = tool;
    }

    pub fn set_color(&mut self, color: SerializableColor) {
        self.color = color;
        self.restyle();
    }

    /// Set the color from a `#RRGGBB` string. Returns false if it does not parse.
    pub fn set_color_hex(&mut self, hex: &str) -> bool {
        match SerializableColor::from_hex(hex) {
            Some(color) => {
                self.set_color(color);
                true
            }
            None => {
                log::warn!("Ignoring invalid color {:?}", hex);
                false
            }
        }
    }

    pub fn set_width(&mut self, width: f64) {
        if !(width.is_finite() && width > 0.0) {
            log::warn!("Ignoring invalid stroke width {}", width);
            return;
        }
        self.width = width;
        self.restyle();
    }

    /// Style of the freehand brush for the current tool.
    pub fn brush_style(&self) -> ShapeStyle {
        tools::brush_style(self.tool, self.color, self.width, self.config.eraser_width_factor)
    }

    pub fn current_settings(&self) -> Settings {
        Settings {
            tool: self.tool,
            color: self.color.to_hex(),
            width: self.width,
        }
    }

    fn restyle(&mut self) {
        if let Some(preview) = &mut self.preview {
            preview.restyle(&mut self.scene, self.color, self.width);
        }
        if let Some(stroke) = &self.stroke {
            let style = self.brush_style();
            if let Some(shape) = self.scene.get_mut(stroke.handle) {
                *shape.style_mut() = style;
            }
        }
        self.scene.render();
    }

    // --- Preview ---

    /// Start a ghost outline at `point`. Ignored unless a shape tool is active.
    pub fn start_preview(&mut self, point: Point) -> bool {
        let Some(tool) = self.tool.shape_tool() else {
            return false;
        };
        self.discard_preview();
        self.preview = Some(Preview::start(
            &mut self.scene,
            tool,
            point,
            self.color,
            self.width,
            self.config.preview_min_size,
        ));
        self.scene.render();
        true
    }

    pub fn update_preview(&mut self, point: Point) {
        if let Some(preview) = &mut self.preview {
            preview.update(&mut self.scene, point);
            self.scene.render();
        }
    }

    /// Remove the ghost outline. Returns the drag endpoints.
    pub fn end_preview(&mut self) -> Option<(Point, Point)> {
        let preview = self.preview.take()?;
        let ends = preview.end(&mut self.scene);
        self.scene.render();
        Some(ends)
    }

    pub fn has_preview(&self) -> bool {
        self.preview.is_some()
    }

    fn discard_preview(&mut self) {
        if let Some(preview) = self.preview.take() {
            preview.end(&mut self.scene);
        }
    }

    // --- Commands ---

    /// Draw the active shape tool's shape between two world points.
    pub fn draw_shape(&mut self, start: Point, end: Point) -> Option<ObjectId> {
        let Some(tool) = self.tool.shape_tool() else {
            log::debug!("Ignoring draw_shape with tool {}", self.tool);
            return None;
        };
        self.commit_text();
        let id = ObjectId::generate(&self.user_id);
        let command = AddShape::new(
            id.clone(),
            tool,
            self.color,
            self.width,
            start,
            end,
            self.config.min_rect_size,
        );
        self.execute(Box::new(command)).then_some(id)
    }

    /// Add a text label at `point` and open its edit session.
    pub fn add_text(&mut self, point: Point, text: Option<&str>) -> Option<ObjectId> {
        self.commit_text();
        let id = ObjectId::generate(&self.user_id);
        let content = text.unwrap_or(&self.config.text_placeholder).to_string();
        let command = AddText::new(id.clone(), point, self.color, content, self.config.font_size);
        if !self.execute(Box::new(command)) {
            return None;
        }
        self.active_text = Some(id.clone());
        Some(id)
    }

    /// Replace the content of the label under edit.
    pub fn update_text(&mut self, content: &str) -> bool {
        let mut ctx = CommandContext::new(&mut self.scene, &mut self.outbox);
        let updated = self
            .history
            .iter_mut()
            .find(|c| c.is_editing())
            .is_some_and(|c| c.update_edit(&mut ctx, content));
        if updated {
            self.scene.render();
        }
        updated
    }

    /// Close the open edit session. Returns false if none was open.
    pub fn finish_text_edit(&mut self) -> bool {
        self.commit_text()
    }

    fn commit_text(&mut self) -> bool {
        if self.active_text.take().is_none() {
            return false;
        }
        let mut ctx = CommandContext::new(&mut self.scene, &mut self.outbox);
        let finished = self
            .history
            .iter_mut()
            .find(|c| c.is_editing())
            .is_some_and(|c| c.finish_edit(&mut ctx));
        self.flush();
        self.scene.render();
        finished
    }

    /// Add a freehand path from its record. A fresh id is generated if none is given.
    pub fn add_path(&mut self, record: ObjectRecord, id: Option<ObjectId>) -> Option<ObjectId> {
        self.commit_text();
        let id = id.unwrap_or_else(|| ObjectId::generate(&self.user_id));
        self.execute(Box::new(AddPath::new(record, id.clone())))
            .then_some(id)
    }

    /// Erase every tagged object crossed by the eraser stroke at `stroke`.
    pub fn erase_objects(&mut self, stroke: ShapeId) -> bool {
        self.commit_text();
        self.execute(Box::new(Erase::new(stroke)))
    }

    pub fn clear_canvas(&mut self) -> bool {
        self.commit_text();
        self.execute(Box::new(ClearAll::new()))
    }

    pub fn undo(&mut self) -> bool {
        self.commit_text();
        let mut ctx = CommandContext::new(&mut self.scene, &mut self.outbox);
        let undone = self.history.undo(&mut ctx);
        self.flush();
        self.scene.render();
        undone
    }

    pub fn redo(&mut self) -> bool {
        self.commit_text();
        let mut ctx = CommandContext::new(&mut self.scene, &mut self.outbox);
        let redone = self.history.redo(&mut ctx);
        self.flush();
        self.scene.render();
        redone
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    fn execute(&mut self, command: Box<dyn Command>) -> bool {
        let mut ctx = CommandContext::new(&mut self.scene, &mut self.outbox);
        let executed = self.history.execute_command(command, &mut ctx);
        self.flush();
        self.scene.render();
        executed
    }

    /// Send queued mutations to the store. Failures are logged and dropped.
    fn flush(&mut self) {
        for op in std::mem::take(&mut self.outbox) {
            self.bridge.note_local(&op);
            if let Err(e) = op.apply(&self.store, &self.namespace) {
                match &op {
                    RemoteOp::Write { key, .. } => log::warn!("Failed to write {}: {}", key, e),
                    RemoteOp::Delete { key } => log::warn!("Failed to delete {}: {}", key, e),
                    RemoteOp::DeleteAll => log::warn!("Failed to clear {}: {}", self.namespace, e),
                }
                self.bridge.note_failed(&op);
            }
        }
    }

    // --- Diagnostics ---

    pub fn history_info(&self) -> HistoryInfo {
        self.history.info()
    }

    pub fn history_details(&self) -> Vec<CommandDetails> {
        self.history.details()
    }

    pub fn command_count(&self, kind: CommandKind) -> usize {
        self.history.command_count(kind)
    }

    /// Forget all undoable commands. The scene is left as is.
    pub fn clear_history(&mut self) {
        self.commit_text();
        self.history.clear();
    }

    // --- Pointer and keyboard ---

    /// Size of the viewport in screen pixels, used as the zoom anchor.
    pub fn set_viewport(&mut self, size: Size) {
        self.viewport = size;
    }

    pub fn pointer_down(&mut self, screen: Point) {
        self.last_screen = Some(screen);
        if self.mode != InteractionMode::Idle {
            return;
        }
        if self.space_held || self.tool == ToolKind::Hand {
            self.mode = InteractionMode::Panning;
            return;
        }
        let world = self.camera.screen_to_world(screen);
        match self.tool.capture() {
            Capture::Freehand => {
                self.commit_text();
                self.begin_stroke(world);
            }
            Capture::Drag => {
                self.commit_text();
                if self.start_preview(world) {
                    self.mode = InteractionMode::ShapeDrag;
                }
            }
            Capture::Click => {
                self.add_text(world, None);
            }
            Capture::Select => {
                self.commit_text();
                let tolerance = self.camera.world_tolerance(self.config.hit_tolerance);
                let hit = self
                    .scene
                    .hit_test(world, tolerance)
                    .into_iter()
                    .find(|h| self.scene.object_id(*h).is_some());
                if let Some(handle) = hit {
                    self.moving = Some(Move { handle, last: world });
                    self.mode = InteractionMode::Moving;
                }
            }
            Capture::Pan => self.mode = InteractionMode::Panning,
        }
    }

    pub fn pointer_move(&mut self, screen: Point) {
        let last = self.last_screen.replace(screen);
        let world = self.camera.screen_to_world(screen);
        match self.mode {
            InteractionMode::Idle => {}
            InteractionMode::Panning => {
                if let Some(last) = last {
                    self.camera.pan(screen - last);
                    self.scene.render();
                }
            }
            InteractionMode::Freehand => {
                if let Some(stroke) = &mut self.stroke {
                    stroke.points.push(world);
                    if let Some(Shape::Freehand(freehand)) = self.scene.get_mut(stroke.handle) {
                        freehand.add_point(world);
                    }
                    self.scene.render();
                }
            }
            InteractionMode::ShapeDrag => self.update_preview(world),
            InteractionMode::Moving => {
                if let Some(moving) = &mut self.moving {
                    let delta: Vec2 = world - moving.last;
                    moving.last = world;
                    // Local only: moves are not recorded or written remotely
                    if let Some(shape) = self.scene.get_mut(moving.handle) {
                        shape.transform(Affine::translate(delta));
                    }
                    self.scene.render();
                }
            }
        }
    }

    pub fn pointer_up(&mut self, screen: Point) {
        self.pointer_move(screen);
        match std::mem::take(&mut self.mode) {
            InteractionMode::Freehand => self.end_stroke(),
            InteractionMode::ShapeDrag => {
                if let Some((start, end)) = self.end_preview() {
                    if start.distance(end) > self.config.shape_drag_threshold {
                        self.draw_shape(start, end);
                    }
                }
            }
            InteractionMode::Moving => self.moving = None,
            InteractionMode::Panning | InteractionMode::Idle => {}
        }
        self.last_screen = None;
    }

    pub fn key_down(&mut self, key: Key) {
        match key {
            Key::Space => self.space_held = true,
            Key::Escape => {
                self.cancel_gesture();
                self.commit_text();
            }
            Key::Other => {}
        }
    }

    pub fn key_up(&mut self, key: Key) {
        if key == Key::Space {
            self.space_held = false;
        }
    }

    fn begin_stroke(&mut self, world: Point) {
        let mut freehand = Freehand::from_points(vec![world]);
        freehand.style = self.brush_style();
        let handle = self.scene.add(Shape::Freehand(freehand), None);
        self.stroke = Some(Stroke {
            handle,
            points: vec![world],
        });
        self.bridge.set_drawing(true);
        self.mode = InteractionMode::Freehand;
    }

    fn end_stroke(&mut self) {
        if let Some(mut stroke) = self.stroke.take() {
            if stroke.points.len() == 1 {
                // A tap leaves a dot
                stroke.points.push(stroke.points[0]);
            }
            if self.tool == ToolKind::Eraser {
                self.erase_objects(stroke.handle);
            } else {
                self.scene.remove(stroke.handle);
                let mut path = Freehand::from_points(stroke.points);
                path.simplify(self.config.stroke_simplify_tolerance);
                let record = ObjectRecord::path(&path.points, Some(self.color), Some(self.width));
                self.add_path(record, None);
            }
        }
        self.stop_drawing();
    }

    /// Abandon any gesture without producing a command.
    fn cancel_gesture(&mut self) {
        self.discard_preview();
        if let Some(stroke) = self.stroke.take() {
            self.scene.remove(stroke.handle);
            self.stop_drawing();
        }
        self.moving = None;
        self.mode = InteractionMode::Idle;
        self.scene.render();
    }

    fn stop_drawing(&mut self) {
        if let Some(entries) = self.bridge.set_drawing(false) {
            log::debug!("Applying snapshot deferred during stroke");
            self.reconcile(&entries);
        }
    }

    // --- Viewport ---

    pub fn zoom_in(&mut self) {
        if self.camera.step_in(self.viewport_center()) {
            self.scene.render();
        }
    }

    pub fn zoom_out(&mut self) {
        if self.camera.step_out(self.viewport_center()) {
            self.scene.render();
        }
    }

    pub fn reset_zoom(&mut self) {
        self.camera.reset();
        self.scene.render();
    }

    pub fn zoom_level(&self) -> f64 {
        self.camera.zoom
    }

    fn viewport_center(&self) -> Point {
        Point::new(self.viewport.width / 2.0, self.viewport.height / 2.0)
    }

    // --- Sync ---

    pub fn is_syncing(&self) -> bool {
        self.subscription.is_some()
    }

    /// Subscribe to the drawing namespace and apply its current content.
    pub fn start_sync(&mut self) -> bool {
        if self.subscription.is_some() {
            return true;
        }
        match self.store.subscribe(&self.namespace) {
            Ok(subscription) => {
                log::info!("Syncing {}", self.namespace);
                self.subscription = Some(subscription);
                self.poll();
                true
            }
            Err(e) => {
                log::warn!("Failed to subscribe to {}: {}", self.namespace, e);
                false
            }
        }
    }

    /// Apply waiting change notifications and finished materializations.
    ///
    /// Snapshots carry the full namespace, so only the newest waiting one is
    /// reconciled.
    pub fn poll(&mut self) -> ReconcileReport {
        let latest = self
            .subscription
            .as_ref()
            .and_then(|sub| sub.drain().pop());
        let report = match latest {
            Some(entries) => self.reconcile(&entries),
            None => ReconcileReport::default(),
        };
        self.resolve_materialized();
        report
    }

    /// Unsubscribe and forget reconciliation state. The scene is kept.
    pub fn stop_sync(&mut self) {
        if self.subscription.take().is_some() {
            log::info!("Stopped syncing {}", self.namespace);
        }
        self.bridge.reset();
    }

    fn reconcile(&mut self, entries: &Entries) -> ReconcileReport {
        self.bridge
            .reconcile(&mut self.scene, entries, self.active_text.as_ref())
    }

    fn resolve_materialized(&mut self) {
        let resolved = self.scene.poll_materialized();
        if resolved.is_empty() {
            return;
        }
        for (ticket, result) in resolved {
            let mut ctx = CommandContext::new(&mut self.scene, &mut self.outbox);
            let claimed = self.history.resolve(&mut ctx, ticket, &result);
            if !claimed && !self.bridge.on_materialized(&mut self.scene, ticket, &result) {
                log::debug!("Dropping unclaimed materialization {}", ticket);
            }
        }
        self.flush();
        self.scene.render();
    }
}
