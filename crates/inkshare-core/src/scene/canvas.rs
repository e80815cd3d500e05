//! In-memory scene graph.

use super::{Materialized, SceneAdapter, SceneError, Ticket};
use crate::record::{ObjectId, ObjectRecord, StyleDefaults};
use crate::shapes::{Shape, ShapeId, ShapeKind};
use kurbo::{Point, Rect};
use std::collections::{HashMap, VecDeque};

/// A z-ordered collection of shapes keyed by engine handle, with an ObjectId
/// side table.
#[derive(Debug, Default)]
pub struct Scene {
    /// All shapes, keyed by handle.
    shapes: HashMap<ShapeId, Shape>,
    /// Z-order of shapes (back to front).
    z_order: Vec<ShapeId>,
    /// ObjectId tags.
    object_ids: HashMap<ShapeId, ObjectId>,
    /// Reverse lookup for `object_ids`.
    handles_by_id: HashMap<ObjectId, ShapeId>,
    /// Style applied to records that omit stroke fields.
    defaults: StyleDefaults,
    /// When set, path records materialize only on `poll_materialized`.
    deferred_paths: bool,
    next_ticket: Ticket,
    pending: VecDeque<(Ticket, ObjectRecord)>,
    render_count: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(defaults: StyleDefaults) -> Self {
        Self {
            defaults,
            ..Self::default()
        }
    }

    /// Resolve path records asynchronously, like engines that load paths in
    /// the background.
    pub fn set_deferred_paths(&mut self, deferred: bool) {
        self.deferred_paths = deferred;
    }

    /// Number of deserializations waiting for `poll_materialized`.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of `render()` calls so far.
    pub fn render_count(&self) -> u64 {
        self.render_count
    }

    /// Get shapes in z-order (back to front).
    pub fn shapes_ordered(&self) -> impl Iterator<Item = &Shape> {
        self.z_order.iter().filter_map(|id| self.shapes.get(id))
    }

    /// Bounding box of all shapes.
    pub fn bounds(&self) -> Option<Rect> {
        self.shapes
            .values()
            .map(Shape::bounds)
            .reduce(|a, b| a.union(b))
    }

    /// Records of every tagged shape, keyed by ObjectId.
    pub fn records(&self) -> Vec<(ObjectId, ObjectRecord)> {
        self.z_order
            .iter()
            .filter_map(|h| {
                let id = self.object_ids.get(h)?;
                let shape = self.shapes.get(h)?;
                Some((id.clone(), ObjectRecord::from_shape(shape)))
            })
            .collect()
    }

    fn materialize(&self, record: &ObjectRecord) -> Result<Shape, SceneError> {
        record
            .to_shape(&self.defaults)
            .map_err(|e| SceneError::Deserialize(e.to_string()))
    }

    fn untag(&mut self, handle: ShapeId) {
        if let Some(id) = self.object_ids.remove(&handle) {
            self.handles_by_id.remove(&id);
        }
    }
}

impl SceneAdapter for Scene {
    fn set_style_defaults(&mut self, defaults: StyleDefaults) {
        self.defaults = defaults;
    }

    fn add(&mut self, shape: Shape, object_id: Option<ObjectId>) -> ShapeId {
        if let Some(existing) = object_id.as_ref().and_then(|id| self.find(id)) {
            self.remove(existing);
        }
        let handle = shape.id();
        if self.shapes.contains_key(&handle) {
            self.remove(handle);
        }
        self.z_order.push(handle);
        self.shapes.insert(handle, shape);
        if let Some(id) = object_id {
            self.handles_by_id.insert(id.clone(), handle);
            self.object_ids.insert(handle, id);
        }
        handle
    }

    fn remove(&mut self, handle: ShapeId) -> Option<Shape> {
        self.z_order.retain(|&h| h != handle);
        self.untag(handle);
        self.shapes.remove(&handle)
    }

    fn find(&self, id: &ObjectId) -> Option<ShapeId> {
        self.handles_by_id.get(id).copied()
    }

    fn object_id(&self, handle: ShapeId) -> Option<&ObjectId> {
        self.object_ids.get(&handle)
    }

    fn get(&self, handle: ShapeId) -> Option<&Shape> {
        self.shapes.get(&handle)
    }

    fn get_mut(&mut self, handle: ShapeId) -> Option<&mut Shape> {
        self.shapes.get_mut(&handle)
    }

    fn handles(&self) -> Vec<ShapeId> {
        self.z_order.clone()
    }

    fn clear(&mut self) {
        self.shapes.clear();
        self.z_order.clear();
        self.object_ids.clear();
        self.handles_by_id.clear();
    }

    fn serialize(&self, handle: ShapeId) -> Option<ObjectRecord> {
        self.shapes.get(&handle).map(ObjectRecord::from_shape)
    }

    fn deserialize(&mut self, record: &ObjectRecord) -> Result<Materialized, SceneError> {
        if self.deferred_paths && record.kind() == ShapeKind::Path {
            self.next_ticket += 1;
            let ticket = self.next_ticket;
            self.pending.push_back((ticket, record.clone()));
            return Ok(Materialized::Pending(ticket));
        }
        self.materialize(record).map(Materialized::Ready)
    }

    fn poll_materialized(&mut self) -> Vec<(Ticket, Result<Shape, SceneError>)> {
        let pending: Vec<_> = self.pending.drain(..).collect();
        pending
            .into_iter()
            .map(|(ticket, record)| (ticket, self.materialize(&record)))
            .collect()
    }

    fn intersects(&self, stroke: ShapeId, other: ShapeId) -> bool {
        let (Some(stroke), Some(other)) = (self.shapes.get(&stroke), self.shapes.get(&other))
        else {
            return false;
        };
        other.intersects_polyline(&stroke.outline(), stroke.style().stroke_width / 2.0)
    }

    fn hit_test(&self, point: Point, tolerance: f64) -> Vec<ShapeId> {
        // Reverse z-order (front to back) for selection priority
        self.z_order
            .iter()
            .rev()
            .filter(|h| {
                self.shapes
                    .get(*h)
                    .is_some_and(|s| s.hit_test(point, tolerance))
            })
            .copied()
            .collect()
    }

    fn render(&mut self) {
        self.render_count += 1;
        log::trace!("render #{} ({} shapes)", self.render_count, self.shapes.len());
    }

    fn len(&self) -> usize {
        self.shapes.len()
    }
}
