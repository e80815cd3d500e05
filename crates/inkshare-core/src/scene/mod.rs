//! Scene adapter contract.
//!
//! The scene is the rendering engine's object graph. Everything above it
//! (commands, the sync bridge, the controller) talks to it through
//! [`SceneAdapter`], so any 2D engine that can store shapes, tag them with an
//! [`ObjectId`], hit-test and serialize them can stand in for [`Scene`].

mod canvas;

pub use canvas::Scene;

use crate::record::{ObjectId, ObjectRecord, StyleDefaults};
use crate::shapes::{Shape, ShapeId};
use kurbo::Point;
use thiserror::Error;

/// Handle for a deserialization that has not resolved yet.
pub type Ticket = u64;

/// Scene errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SceneError {
    #[error("Unknown object: {0}")]
    UnknownObject(String),
    #[error("Deserialization failed: {0}")]
    Deserialize(String),
    #[error("Materialization {0} is still pending")]
    Pending(Ticket),
}

/// Outcome of [`SceneAdapter::deserialize`].
///
/// Some engines build objects asynchronously. Callers receive either the
/// finished shape or a ticket that later shows up in
/// [`SceneAdapter::poll_materialized`].
#[derive(Debug, Clone, PartialEq)]
pub enum Materialized {
    Ready(Shape),
    Pending(Ticket),
}

/// Operations the drawing core needs from a scene graph.
pub trait SceneAdapter {
    /// Insert a shape, optionally tagged with an ObjectId, on top of the z-order.
    /// An existing object carrying the same ObjectId is replaced.
    fn add(&mut self, shape: Shape, object_id: Option<ObjectId>) -> ShapeId;

    /// Remove a shape by engine handle.
    fn remove(&mut self, handle: ShapeId) -> Option<Shape>;

    /// Remove the shape tagged with `id`.
    fn remove_by_id(&mut self, id: &ObjectId) -> Option<Shape> {
        let handle = self.find(id)?;
        self.remove(handle)
    }

    /// Engine handle of the shape tagged with `id`.
    fn find(&self, id: &ObjectId) -> Option<ShapeId>;

    /// ObjectId tag of a shape, if it has one.
    fn object_id(&self, handle: ShapeId) -> Option<&ObjectId>;

    fn get(&self, handle: ShapeId) -> Option<&Shape>;

    fn get_mut(&mut self, handle: ShapeId) -> Option<&mut Shape>;

    /// All handles, back to front.
    fn handles(&self) -> Vec<ShapeId>;

    /// Handles carrying an ObjectId, back to front.
    fn tagged(&self) -> Vec<(ShapeId, ObjectId)> {
        self.handles()
            .into_iter()
            .filter_map(|h| self.object_id(h).cloned().map(|id| (h, id)))
            .collect()
    }

    /// Remove everything, tagged or not.
    fn clear(&mut self);

    /// Serialized record of a shape.
    fn serialize(&self, handle: ShapeId) -> Option<ObjectRecord>;

    /// Build a shape from a record. The shape is not added to the scene.
    fn deserialize(&mut self, record: &ObjectRecord) -> Result<Materialized, SceneError>;

    /// Stroke color and width for records that omit them. Engines that
    /// resolve missing styles on their own may ignore this.
    fn set_style_defaults(&mut self, _defaults: StyleDefaults) {}

    /// Drain deserializations that resolved since the last call.
    fn poll_materialized(&mut self) -> Vec<(Ticket, Result<Shape, SceneError>)>;

    /// Whether the stroke `stroke` geometrically touches `other`.
    fn intersects(&self, stroke: ShapeId, other: ShapeId) -> bool;

    /// Shapes under a point, front to back.
    fn hit_test(&self, point: Point, tolerance: f64) -> Vec<ShapeId>;

    /// Request a redraw.
    fn render(&mut self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
