//! InkShare Core Library
//!
//! Synchronized drawing core for the InkShare collaborative whiteboard:
//! reversible drawing commands, bounded undo/redo, and reconciliation of the
//! local scene against a shared key-value store.

pub mod camera;
pub mod collaboration;
pub mod commands;
pub mod config;
pub mod history;
pub mod preview;
pub mod record;
pub mod remote;
pub mod scene;
pub mod session;
pub mod shapes;
pub mod tools;
pub mod whiteboard;

pub use camera::Camera;
pub use collaboration::{ReconcileReport, SyncBridge};
pub use commands::{Command, CommandContext, CommandError, CommandKind, ShapeTool};
pub use config::{ConfigError, WhiteboardConfig};
pub use history::{CommandHistory, HistoryInfo, MAX_UNDO_HISTORY};
pub use preview::Preview;
pub use record::{ObjectId, ObjectRecord};
pub use remote::{Entries, MemoryStore, RemoteOp, RemoteStore, StoreError, Subscription};
#[cfg(not(target_arch = "wasm32"))]
pub use remote::{ConnectionState, RelayStore};
pub use scene::{Materialized, Scene, SceneAdapter, SceneError};
pub use session::{ParticipantRecord, Presence, SessionRecord};
pub use tools::{InteractionMode, Key, ToolKind};
pub use whiteboard::{Settings, WhiteboardManager};
