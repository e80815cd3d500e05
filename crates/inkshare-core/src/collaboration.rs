//! Reconciliation between the local scene and the remote drawing namespace.
//!
//! Every notification carries the full namespace content, so the bridge
//! diffs it against what the scene holds instead of replaying events. Local
//! commands mutate the scene directly; the bridge only learns about them
//! through [`SyncBridge::note_local`] so their echoes are recognized.

use crate::record::{ObjectId, ObjectRecord};
use crate::remote::{Entries, RemoteOp};
use crate::scene::{Materialized, SceneAdapter, SceneError, Ticket};
use crate::shapes::Shape;
use std::collections::{HashMap, HashSet};

/// Snapshots a local mutation may be missing from before the remote state wins.
const ECHO_GRACE: u64 = 1;

/// What one reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    /// Entries that could not be deserialized.
    pub failed: usize,
    /// Entries waiting for asynchronous materialization.
    pub pending: usize,
    /// The add pass was postponed because a stroke is being drawn.
    pub deferred: bool,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        self.added + self.updated + self.removed > 0
    }
}

/// Keeps the scene consistent with the remote namespace.
#[derive(Debug)]
pub struct SyncBridge {
    /// Ids believed present in the scene, from remote entries or local commands.
    loaded_ids: HashSet<ObjectId>,
    /// True until the first snapshot has been processed.
    is_initial_load: bool,
    /// Last remote value applied per id, for last-write-wins updates.
    remote_values: HashMap<ObjectId, serde_json::Value>,
    /// Local writes whose echo has not arrived yet, with the snapshot count
    /// at the time of the write.
    unconfirmed: HashMap<ObjectId, u64>,
    /// Local deletes not yet reflected in a snapshot, stamped the same way.
    pending_deletes: HashMap<ObjectId, u64>,
    /// Snapshots reconciled so far.
    snapshots: u64,
    /// Remote entries being materialized asynchronously.
    pending: HashMap<Ticket, ObjectId>,
    /// A freehand stroke is in progress.
    drawing: bool,
    /// Snapshot whose add pass was postponed while drawing.
    deferred: Option<Entries>,
}

impl Default for SyncBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncBridge {
    pub fn new() -> Self {
        Self {
            loaded_ids: HashSet::new(),
            is_initial_load: true,
            remote_values: HashMap::new(),
            unconfirmed: HashMap::new(),
            pending_deletes: HashMap::new(),
            snapshots: 0,
            pending: HashMap::new(),
            drawing: false,
            deferred: None,
        }
    }

    pub fn loaded_ids(&self) -> &HashSet<ObjectId> {
        &self.loaded_ids
    }

    pub fn is_initial_load(&self) -> bool {
        self.is_initial_load
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    /// Number of remote entries waiting for materialization.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Mark the start or end of a freehand stroke. Ending a stroke returns the
    /// snapshot postponed meanwhile, which the caller should reconcile.
    pub fn set_drawing(&mut self, drawing: bool) -> Option<Entries> {
        self.drawing = drawing;
        if drawing { None } else { self.deferred.take() }
    }

    /// Forget everything, e.g. when leaving a session.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Record a mutation issued by a local command.
    ///
    /// Until its echo shows up, the mutation is shielded from the next
    /// snapshot only, which may have been produced before the store saw it.
    /// Any later snapshot is authoritative.
    pub fn note_local(&mut self, op: &RemoteOp) {
        let stamp = self.snapshots;
        match op {
            RemoteOp::Write { key, .. } => {
                let id = ObjectId::new(key.as_str());
                self.pending_deletes.remove(&id);
                self.remote_values.remove(&id);
                self.loaded_ids.insert(id.clone());
                self.unconfirmed.insert(id, stamp);
            }
            RemoteOp::Delete { key } => {
                let id = ObjectId::new(key.as_str());
                self.unconfirmed.remove(&id);
                self.loaded_ids.remove(&id);
                self.remote_values.remove(&id);
                self.pending_deletes.insert(id, stamp);
            }
            RemoteOp::DeleteAll => {
                self.unconfirmed.clear();
                self.remote_values.clear();
                self.pending_deletes
                    .extend(self.loaded_ids.drain().map(|id| (id, stamp)));
            }
        }
    }

    /// Record that a local mutation never reached the store. The next
    /// reconciliation then converges on the remote state.
    pub fn note_failed(&mut self, op: &RemoteOp) {
        match op {
            RemoteOp::Write { key, .. } => {
                self.unconfirmed.remove(&ObjectId::new(key.as_str()));
            }
            RemoteOp::Delete { key } => {
                self.pending_deletes.remove(&ObjectId::new(key.as_str()));
            }
            RemoteOp::DeleteAll => self.pending_deletes.clear(),
        }
    }

    /// Apply a full namespace snapshot. `protected` is an object that must
    /// survive removal even though it is absent remotely (the label under edit).
    pub fn reconcile(
        &mut self,
        scene: &mut dyn SceneAdapter,
        entries: &Entries,
        protected: Option<&ObjectId>,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        self.snapshots += 1;
        let snapshots = self.snapshots;

        // Echoes confirm local writes; absences confirm local deletes.
        // Either expires once the grace window has passed.
        let mut confirmed = Vec::new();
        self.unconfirmed.retain(|id, stamp| {
            if entries.contains_key(id.as_str()) {
                confirmed.push(id.clone());
                return false;
            }
            let fresh = snapshots - *stamp <= ECHO_GRACE;
            if !fresh {
                log::debug!("Echo of {} never arrived", id);
            }
            fresh
        });
        for id in confirmed {
            if let Some(value) = entries.get(id.as_str()) {
                self.remote_values.insert(id, value.clone());
            }
        }
        self.pending_deletes
            .retain(|id, stamp| entries.contains_key(id.as_str()) && snapshots - *stamp <= ECHO_GRACE);

        if self.is_initial_load {
            self.add_pass(scene, entries, &mut report);
            self.is_initial_load = false;
            log::info!(
                "Initial load: {} objects ({} failed, {} pending)",
                report.added,
                report.failed,
                report.pending
            );
            scene.render();
            return report;
        }

        if entries.is_empty() {
            self.clear_unprotected(scene, protected, &mut report);
        } else {
            self.removal_pass(scene, entries, protected, &mut report);
            if self.drawing {
                self.deferred = Some(entries.clone());
                report.deferred = true;
            } else {
                self.add_pass(scene, entries, &mut report);
            }
        }

        if report.changed() {
            log::debug!(
                "Reconciled: +{} ~{} -{} ({} failed)",
                report.added,
                report.updated,
                report.removed,
                report.failed
            );
            scene.render();
        }
        report
    }

    fn is_protected(&self, id: &ObjectId, protected: Option<&ObjectId>) -> bool {
        protected == Some(id) || self.unconfirmed.contains_key(id)
    }

    fn add_pass(&mut self, scene: &mut dyn SceneAdapter, entries: &Entries, report: &mut ReconcileReport) {
        for (key, value) in entries {
            let id = ObjectId::new(key.as_str());
            if self.pending_deletes.contains_key(&id)
                || self.unconfirmed.contains_key(&id)
                || self.pending.values().any(|p| *p == id)
            {
                continue;
            }
            let known = self.loaded_ids.contains(&id) || scene.find(&id).is_some();
            if known {
                let last = self.remote_values.get(&id);
                if last == Some(value) {
                    continue;
                }
                // Present locally from a command whose echo was already consumed
                if last.is_none() && scene.find(&id).is_some() {
                    self.loaded_ids.insert(id.clone());
                    self.remote_values.insert(id, value.clone());
                    continue;
                }
            }

            let record = match ObjectRecord::from_value(value) {
                Ok(record) => record,
                Err(e) => {
                    log::warn!("Skipping remote object {}: {}", id, e);
                    report.failed += 1;
                    continue;
                }
            };
            match scene.deserialize(&record) {
                Ok(Materialized::Ready(shape)) => {
                    scene.add(shape, Some(id.clone()));
                    if known {
                        report.updated += 1;
                    } else {
                        report.added += 1;
                    }
                    self.loaded_ids.insert(id.clone());
                    self.remote_values.insert(id, value.clone());
                }
                Ok(Materialized::Pending(ticket)) => {
                    self.remote_values.insert(id.clone(), value.clone());
                    self.pending.insert(ticket, id);
                    report.pending += 1;
                }
                Err(e) => {
                    log::warn!("Skipping remote object {}: {}", id, e);
                    report.failed += 1;
                }
            }
        }
    }

    fn removal_pass(
        &mut self,
        scene: &mut dyn SceneAdapter,
        entries: &Entries,
        protected: Option<&ObjectId>,
        report: &mut ReconcileReport,
    ) {
        for (handle, id) in scene.tagged() {
            if entries.contains_key(id.as_str()) || self.is_protected(&id, protected) {
                continue;
            }
            scene.remove(handle);
            self.loaded_ids.remove(&id);
            self.remote_values.remove(&id);
            report.removed += 1;
        }
        self.loaded_ids.retain(|id| {
            entries.contains_key(id.as_str()) || protected == Some(id) || self.unconfirmed.contains_key(id)
        });
        self.pending.retain(|_, id| entries.contains_key(id.as_str()));
    }

    fn clear_unprotected(
        &mut self,
        scene: &mut dyn SceneAdapter,
        protected: Option<&ObjectId>,
        report: &mut ReconcileReport,
    ) {
        for (handle, id) in scene.tagged() {
            if !self.is_protected(&id, protected) {
                scene.remove(handle);
                report.removed += 1;
            }
        }
        let unconfirmed = &self.unconfirmed;
        self.loaded_ids
            .retain(|id| protected == Some(id) || unconfirmed.contains_key(id));
        self.remote_values.clear();
        self.pending.clear();
        self.deferred = None;
    }

    /// Finish an asynchronous materialization started by reconciliation.
    /// Returns false if the ticket is not ours.
    pub fn on_materialized(
        &mut self,
        scene: &mut dyn SceneAdapter,
        ticket: Ticket,
        result: &Result<Shape, SceneError>,
    ) -> bool {
        let Some(id) = self.pending.remove(&ticket) else {
            return false;
        };
        match result {
            Ok(shape) if !self.pending_deletes.contains_key(&id) => {
                scene.add(shape.clone(), Some(id.clone()));
                self.loaded_ids.insert(id);
                scene.render();
            }
            Ok(_) => log::debug!("Dropping {}: deleted while loading", id),
            Err(e) => {
                log::warn!("Failed to materialize remote object {}: {}", id, e);
                self.remote_values.remove(&id);
            }
        }
        true
    }
}
