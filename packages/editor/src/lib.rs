//! # EaC Editor
//!
//! Graph state and revision engine for Everything-as-Code documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ UI: canvas events, inspectors (external)    │
//! └─────────────────────────────────────────────┘
//!                     ↓ UiEvent
//! ┌─────────────────────────────────────────────┐
//! │ orchestrator: live document + tombstones    │
//! │  - scope: workspace / single surface        │
//! │  - registry → capability per node Type      │
//! │  - diff: merge partial / merge delete       │
//! │  - history: snapshots, undo/redo, commit    │
//! └─────────────────────────────────────────────┘
//!                     ↓ FlowGraph
//! ┌─────────────────────────────────────────────┐
//! │ listeners: UI re-render (external)          │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Document is source of truth**: the graph is a projection, rebuilt in full
//! 2. **One handler per node type**: every structural patch comes from a capability
//! 3. **Deletes are data**: tombstones travel with every snapshot
//! 4. **No-op merges are invisible**: no history entry, no notification
//!
//! ## Usage
//!
//! ```rust,ignore
//! use eac_editor::{DocumentOrchestrator, EngineConfig, Position};
//!
//! let mut editor = DocumentOrchestrator::new(EngineConfig::default())?;
//! editor.subscribe(|graph| println!("{} nodes", graph.nodes.len()));
//!
//! editor.create_from_preset("connection", "conn-1", Position::new(10.0, 20.0))?;
//! editor.delete_node("conn-1")?;
//! editor.undo();
//!
//! editor.commit().await?;
//! ```

pub mod capabilities;
mod capability;
mod config;
pub mod diff;
pub mod document;
mod errors;
mod history;
mod listeners;
mod orchestrator;
mod registry;
mod scope;
mod scopes;
mod services;

pub use capability::{
    entry_as_code, entry_update_patch, preset_entry, CapabilityContext, NodeCapability, NodeEvent,
    PresetDescriptor, RoutedAction,
};
pub use config::{EngineConfig, DEFAULT_CONFIG_NAME, DEFAULT_MAX_HISTORY};
pub use diff::MergeOutcome;
pub use document::{
    EaC, EaCCode, FlowGraph, FlowGraphEdge, FlowGraphNode, NodeMetadata, NodeUpdate, Position,
    Proposal, ProposalStatus, StatsMap,
};
pub use errors::{EditorError, EditorResult};
pub use history::{History, Snapshot};
pub use listeners::{GraphListener, ListenerId, Listeners};
pub use orchestrator::{DocumentOrchestrator, OverlayMode, UiEvent};
pub use registry::{CapabilityRegistry, StatsTarget};
pub use scope::{EdgeChange, NodeChange, NodeChangeOutcome, ScopeKind, ScopeManager, ScopeState};
pub use scopes::{SurfaceScopeManager, WorkspaceScopeManager};
pub use services::{
    CommitStatus, EaCSummary, ProcessingState, ProposalService, RemoteDocumentService,
    TelemetryService,
};
