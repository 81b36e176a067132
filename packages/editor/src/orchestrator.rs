//! # Document Orchestrator
//!
//! Owns the live document, the tombstone document, the history and the
//! active scope. Every mutation runs the same cycle:
//!
//! ```text
//! UI event → scope → capability patch → diff engine → history → graph rebuild → listeners
//! ```
//!
//! A patch that changes nothing leaves history, graph and listeners alone.
//! Proposals are composed on top of the live document only when it is read
//! through [`DocumentOrchestrator::eac`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::capability::{NodeEvent, PresetDescriptor, RoutedAction};
use crate::config::EngineConfig;
use crate::diff::{self, deep_merge, merge_tombstones, MergeOutcome};
use crate::document::{
    entry_at, kinds, EaC, EaCCode, FlowGraph, NodeUpdate, Position, Proposal, StatsMap,
};
use crate::errors::{EditorError, EditorResult};
use crate::history::{History, Snapshot};
use crate::listeners::{ListenerId, Listeners};
use crate::registry::StatsTarget;
use crate::scope::{EdgeChange, NodeChange, ScopeKind, ScopeManager};
use crate::scopes::{SurfaceScopeManager, WorkspaceScopeManager};
use crate::services::{
    CommitStatus, EaCSummary, ProposalService, RemoteDocumentService, TelemetryService,
};

/// Which proposals [`DocumentOrchestrator::eac`] composes onto the live document
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "ids", rename_all = "camelCase")]
pub enum OverlayMode {
    #[default]
    None,
    /// Every outstanding proposal, in service order
    Pending,
    /// Explicit proposal ids, in list order
    Ids(Vec<String>),
}

/// Interaction events sent by the canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum UiEvent {
    Drop {
        #[serde(rename = "nodeType")]
        node_type: String,
        id: String,
        position: Position,
    },
    Connect {
        source: String,
        target: String,
    },
    NodeChanges {
        changes: Vec<NodeChange>,
    },
    EdgeChanges {
        changes: Vec<EdgeChange>,
    },
    Delete {
        ids: Vec<String>,
    },
}

pub struct DocumentOrchestrator {
    config: EngineConfig,
    eac: Arc<EaC>,
    tombstones: Arc<EaC>,
    history: History,
    scope: Box<dyn ScopeManager>,
    overlay: OverlayMode,
    listeners: Listeners,
    remote: Option<Arc<dyn RemoteDocumentService>>,
    telemetry: Option<Arc<dyn TelemetryService>>,
    proposals: Option<Arc<dyn ProposalService>>,
}

impl DocumentOrchestrator {
    /// Empty document in workspace scope, with one committed empty snapshot
    pub fn new(config: EngineConfig) -> EditorResult<Self> {
        let history = History::new(config.history_bound());
        let current = history.current();

        let mut orchestrator = Self {
            overlay: config.overlay.clone(),
            config,
            eac: current.document,
            tombstones: current.tombstones,
            history,
            scope: Box::new(WorkspaceScopeManager::new()?),
            listeners: Listeners::new(),
            remote: None,
            telemetry: None,
            proposals: None,
        };
        orchestrator.scope.build_graph(&orchestrator.eac);

        Ok(orchestrator)
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteDocumentService>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetryService>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn with_proposals(mut self, proposals: Arc<dyn ProposalService>) -> Self {
        self.proposals = Some(proposals);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // --- Scope -------------------------------------------------------------

    /// Swap the active scope and rebuild the graph.
    ///
    /// Surface scope needs the lookup of a surface present in the document.
    pub fn switch_to(&mut self, kind: ScopeKind, lookup: Option<&str>) -> EditorResult<()> {
        let scope: Box<dyn ScopeManager> = match kind {
            ScopeKind::Workspace => Box::new(WorkspaceScopeManager::new()?),
            ScopeKind::Surface => {
                let surface = lookup.ok_or_else(|| {
                    EditorError::NotSupported("surface scope without a surface lookup".to_string())
                })?;
                if entry_at(&self.eac, &[kinds::SURFACES, surface]).is_none() {
                    return Err(EditorError::NodeNotFound(surface.to_string()));
                }
                Box::new(SurfaceScopeManager::new(surface)?)
            }
        };

        info!(scope = ?kind, lookup = ?lookup, "Switching scope");
        self.scope = scope;
        self.scope.reset_graph();
        self.refresh();
        Ok(())
    }

    pub fn scope_kind(&self) -> ScopeKind {
        self.scope.kind()
    }

    pub fn scope_lookup(&self) -> Option<&str> {
        self.scope.lookup()
    }

    /// Graph projected for the active scope
    pub fn graph(&self) -> &FlowGraph {
        self.scope.graph()
    }

    pub fn rebuild_graph(&mut self) -> &FlowGraph {
        self.scope.build_graph(&self.eac)
    }

    // --- Merging -----------------------------------------------------------

    /// Deep-merge an additive patch. Returns whether the document changed.
    pub fn merge_partial(&mut self, partial: &EaC) -> bool {
        let outcome = diff::merge_partial(&self.eac, &self.tombstones, partial);
        self.record(outcome, "partial")
    }

    /// Accumulate a tombstone patch and apply it. Returns whether the document changed.
    pub fn merge_delete(&mut self, tombstone: &EaC) -> bool {
        let outcome = diff::merge_delete(&self.eac, &self.tombstones, tombstone);
        self.record(outcome, "delete")
    }

    fn record(&mut self, outcome: MergeOutcome, merge: &'static str) -> bool {
        if !outcome.changed {
            debug!(merge, "Merge changed nothing");
            return false;
        }

        self.eac = Arc::new(outcome.updated);
        self.tombstones = Arc::new(outcome.tombstones);
        self.history.push(Snapshot::from_shared(
            self.eac.clone(),
            self.tombstones.clone(),
        ));
        debug!(
            merge,
            history = self.history.len(),
            cursor = self.history.cursor(),
            "Recorded snapshot"
        );

        self.refresh();
        true
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.eac = snapshot.document;
        self.tombstones = snapshot.tombstones;
        self.refresh();
    }

    fn refresh(&mut self) {
        self.leave_removed_surface();
        self.scope.build_graph(&self.eac);
        self.listeners.notify(self.scope.graph());
    }

    /// History moves can remove the scoped surface; the scope then falls
    /// back to the workspace.
    fn leave_removed_surface(&mut self) {
        let Some(surface) = self.scope.lookup() else {
            return;
        };
        if entry_at(&self.eac, &[kinds::SURFACES, surface]).is_some() {
            return;
        }

        match WorkspaceScopeManager::new() {
            Ok(workspace) => {
                warn!(surface, "Scoped surface no longer exists, returning to workspace scope");
                self.scope = Box::new(workspace);
            }
            Err(err) => warn!(surface, error = %err, "Cannot build workspace scope"),
        }
    }

    // --- UI interaction ----------------------------------------------------

    /// Dispatch a canvas event. Returns whether the document changed.
    #[instrument(skip(self))]
    pub fn handle_event(&mut self, event: UiEvent) -> EditorResult<bool> {
        match event {
            UiEvent::Drop {
                node_type,
                id,
                position,
            } => self.create_from_preset(&node_type, &id, position),
            UiEvent::Connect { source, target } => self.connect(&source, &target),
            UiEvent::NodeChanges { changes } => Ok(self.apply_node_changes(&changes)),
            UiEvent::EdgeChanges { changes } => self.apply_edge_changes(&changes),
            UiEvent::Delete { ids } => self.delete_nodes(&ids),
        }
    }

    pub fn create_from_preset(
        &mut self,
        node_type: &str,
        id: &str,
        position: Position,
    ) -> EditorResult<bool> {
        let patch = self
            .scope
            .create_partial_from_preset(&self.eac, node_type, id, position)?;
        info!(node_id = %id, node_type, "Creating node from preset");
        Ok(self.merge_partial(&patch))
    }

    /// Bind `source` into `target`. Targets that do not accept the source leave
    /// the document untouched.
    pub fn connect(&mut self, source: &str, target: &str) -> EditorResult<bool> {
        match self.scope.create_connection_edge(&self.eac, source, target)? {
            Some(patch) => Ok(self.merge_partial(&patch)),
            None => {
                debug!(source, target, "Target does not accept this connection");
                Ok(false)
            }
        }
    }

    pub fn disconnect(&mut self, edge_id: &str) -> EditorResult<bool> {
        match self.scope.remove_connection_edge(&self.eac, edge_id)? {
            Some(tombstone) => Ok(self.merge_delete(&tombstone)),
            None => {
                debug!(edge_id, "No binding behind edge");
                Ok(false)
            }
        }
    }

    fn apply_edge_changes(&mut self, changes: &[EdgeChange]) -> EditorResult<bool> {
        let mut combined = Map::new();
        for change in changes {
            match change {
                EdgeChange::Remove { id } => {
                    if let Some(tombstone) = self.scope.remove_connection_edge(&self.eac, id)? {
                        merge_tombstones(&mut combined, &tombstone);
                    }
                }
            }
        }
        Ok(!combined.is_empty() && self.merge_delete(&combined))
    }

    pub fn delete_node(&mut self, id: &str) -> EditorResult<bool> {
        self.delete_nodes(&[id.to_string()])
    }

    /// Delete several nodes as one undoable step
    pub fn delete_nodes(&mut self, ids: &[String]) -> EditorResult<bool> {
        let mut combined = Map::new();
        for id in ids {
            if let Some(tombstone) = self.scope.build_partial_for_node_delete(&self.eac, id)? {
                merge_tombstones(&mut combined, &tombstone);
            }
        }

        info!(count = ids.len(), "Deleting nodes");
        Ok(!combined.is_empty() && self.merge_delete(&combined))
    }

    pub fn update_node(&mut self, id: &str, update: &NodeUpdate) -> EditorResult<bool> {
        match self.scope.update_node_patch(&self.eac, id, update)? {
            Some(patch) => Ok(self.merge_partial(&patch)),
            None => Ok(false),
        }
    }

    /// Apply canvas position/selection changes; all moved nodes land in one snapshot
    pub fn apply_node_changes(&mut self, changes: &[NodeChange]) -> bool {
        let current = self.scope.graph().nodes.clone();
        let outcome = self
            .scope
            .update_nodes_from_changes(&self.eac, changes, &current);

        let selection_changed = outcome.nodes != current;
        self.scope.state_mut().graph.nodes = outcome.nodes;

        match outcome.patch {
            Some(patch) if self.merge_partial(&patch) => true,
            _ => {
                if selection_changed {
                    self.listeners.notify(self.scope.graph());
                }
                false
            }
        }
    }

    /// Add simulator entries in one step. Only the workspace scope supports this.
    pub fn install_simulators(&mut self, simulators: &EaC) -> EditorResult<bool> {
        let patch = self.scope.install_simulators(&self.eac, simulators)?;
        Ok(self.merge_partial(&patch))
    }

    // --- Node metadata -----------------------------------------------------

    pub fn get_as_code(&self, id: &str) -> EditorResult<EaCCode> {
        let node = self
            .scope
            .resolve_node(&self.eac, id)
            .ok_or_else(|| EditorError::NodeNotFound(id.to_string()))?;

        self.scope
            .capability_for(&node)?
            .get_as_code(&node, &self.scope.context(&self.eac))
            .ok_or_else(|| EditorError::NodeNotFound(id.to_string()))
    }

    pub fn presets(&self) -> BTreeMap<String, PresetDescriptor> {
        self.scope.registry().presets()
    }

    pub fn renderer_map(&self) -> BTreeMap<String, String> {
        self.scope.registry().renderer_map()
    }

    pub fn inspector_map(&self) -> BTreeMap<String, String> {
        self.scope.registry().inspector_map()
    }

    pub fn node_config(&self, id: &str) -> EditorResult<Option<Value>> {
        let node = self
            .scope
            .resolve_node(&self.eac, id)
            .ok_or_else(|| EditorError::NodeNotFound(id.to_string()))?;

        Ok(self.scope.capability_for(&node)?.config(&node.id))
    }

    /// Route a semantic node event and apply the resulting action
    pub fn dispatch_node_event(
        &mut self,
        id: &str,
        event: &NodeEvent,
    ) -> EditorResult<Option<RoutedAction>> {
        let node = self
            .scope
            .resolve_node(&self.eac, id)
            .ok_or_else(|| EditorError::NodeNotFound(id.to_string()))?;
        let action = self.scope.capability_for(&node)?.route_event(event, &node);

        if let Some(RoutedAction::SwitchScope { scope, lookup }) = &action {
            self.switch_to(*scope, lookup.as_deref())?;
        }

        Ok(action)
    }

    // --- History -----------------------------------------------------------

    pub fn undo(&mut self) -> bool {
        match self.history.undo() {
            Some(snapshot) => {
                self.restore(snapshot);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo() {
            Some(snapshot) => {
                self.restore(snapshot);
                true
            }
            None => false,
        }
    }

    /// Return to the committed baseline as a new, undoable step
    pub fn revert_to_last_commit(&mut self) -> bool {
        match self.history.revert_to_last_commit() {
            Some(committed) => {
                self.restore(committed);
                true
            }
            None => false,
        }
    }

    /// Detached copy of the live document, without tombstones or history
    pub fn fork_runtime(&self) -> EaC {
        self.history.fork_runtime()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.history.has_unsaved_changes()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Replace all history with `snapshot` as the committed baseline
    pub fn reset_from_snapshot(&mut self, snapshot: Snapshot) {
        self.history.reset_from_snapshot(snapshot.clone());
        info!("Reset history from snapshot");
        self.restore(snapshot);
    }

    // --- Reads and overlays ------------------------------------------------

    /// The live document with the current overlay's proposals composed on top
    pub fn eac(&self) -> EaC {
        self.compose_overlay(&self.overlay)
    }

    /// The live document, shared and immutable, without overlays
    pub fn committed_eac(&self) -> Arc<EaC> {
        self.eac.clone()
    }

    pub fn tombstones(&self) -> Arc<EaC> {
        self.tombstones.clone()
    }

    pub fn overlay_mode(&self) -> &OverlayMode {
        &self.overlay
    }

    pub fn set_overlay_mode(&mut self, mode: OverlayMode) {
        self.overlay = mode;
    }

    /// Compose proposals selected by `mode` onto a copy of the live document.
    ///
    /// Later proposals win over earlier ones for the same fields.
    pub fn compose_overlay(&self, mode: &OverlayMode) -> EaC {
        let mut view = self.eac.as_ref().clone();

        for proposal in self.select_proposals(mode) {
            deep_merge(&mut view, &proposal.as_patch());
        }

        view
    }

    fn select_proposals(&self, mode: &OverlayMode) -> Vec<Proposal> {
        if *mode == OverlayMode::None {
            return Vec::new();
        }
        let Some(service) = &self.proposals else {
            warn!(?mode, "Overlay requested without a proposal service");
            return Vec::new();
        };

        match mode {
            OverlayMode::None => Vec::new(),
            OverlayMode::Pending => service.get_pending(),
            OverlayMode::Ids(ids) => ids
                .iter()
                .filter_map(|id| {
                    let proposal = service.get_by_id(id);
                    if proposal.is_none() {
                        debug!(proposal_id = %id, "Unknown proposal in overlay");
                    }
                    proposal
                })
                .collect(),
        }
    }

    // --- Listeners ---------------------------------------------------------

    /// Register a callback that receives the graph after every change
    pub fn subscribe<F>(&mut self, callback: F) -> ListenerId
    where
        F: Fn(&FlowGraph) + Send + Sync + 'static,
    {
        self.listeners.subscribe(Box::new(callback))
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    // --- Remote and telemetry ----------------------------------------------

    fn remote(&self) -> EditorResult<Arc<dyn RemoteDocumentService>> {
        self.remote
            .clone()
            .ok_or(EditorError::ServiceUnavailable("remote document service"))
    }

    fn telemetry(&self) -> EditorResult<Arc<dyn TelemetryService>> {
        self.telemetry
            .clone()
            .ok_or(EditorError::ServiceUnavailable("telemetry service"))
    }

    /// Commit the current snapshot remotely.
    ///
    /// The baseline only advances when the remote reports `Complete`; on any
    /// other state or on error the document stays dirty.
    #[instrument(skip(self))]
    pub async fn commit(&mut self) -> EditorResult<CommitStatus> {
        let remote = self.remote()?;
        let snapshot = self.history.current();

        let status = remote.commit(&snapshot).await?;
        if status.is_complete() {
            self.history.commit();
            info!("Commit complete");
        } else {
            warn!(state = ?status.processing, message = %status.message, "Commit not complete, baseline unchanged");
        }

        Ok(status)
    }

    /// Replace the document with the remote copy and start a fresh history
    #[instrument(skip(self))]
    pub async fn load(&mut self) -> EditorResult<()> {
        let remote = self.remote()?;
        let document = remote.get().await?;

        self.reset_from_snapshot(Snapshot::new(document, Map::new()));
        Ok(())
    }

    pub async fn list_for_user(&self) -> EditorResult<Vec<EaCSummary>> {
        self.remote()?.list_for_user().await
    }

    pub async fn archive(&self) -> EditorResult<()> {
        self.remote()?.archive().await
    }

    /// Stats for a node of the current graph
    pub async fn get_stats(&self, id: &str) -> EditorResult<StatsMap> {
        let telemetry = self.telemetry()?;
        let node = self
            .graph()
            .node(id)
            .ok_or_else(|| EditorError::NodeNotFound(id.to_string()))?;

        self.scope
            .registry()
            .get_stats(StatsTarget::Node(node), telemetry.as_ref())
            .await
    }

    /// Stats for a `(type, id)` pair that has no materialized node
    pub async fn get_stats_for(&self, node_type: &str, id: &str) -> EditorResult<StatsMap> {
        let telemetry = self.telemetry()?;

        self.scope
            .registry()
            .get_stats(StatsTarget::Lookup { node_type, id }, telemetry.as_ref())
            .await
    }

    /// Stats for every node of the current graph, fetched concurrently.
    ///
    /// The first failure is returned.
    pub async fn get_all_stats(&self) -> EditorResult<BTreeMap<String, StatsMap>> {
        let telemetry = self.telemetry()?;
        let registry = self.scope.registry();
        let nodes = &self.graph().nodes;

        let results = join_all(
            nodes
                .iter()
                .map(|node| registry.get_stats(StatsTarget::Node(node), telemetry.as_ref())),
        )
        .await;

        nodes
            .iter()
            .zip(results)
            .map(|(node, stats)| stats.map(|stats| (node.id.clone(), stats)))
            .collect()
    }
}

impl fmt::Debug for DocumentOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentOrchestrator")
            .field("scope", &self.scope)
            .field("overlay", &self.overlay)
            .field("history", &self.history.len())
            .field("cursor", &self.history.cursor())
            .field("listeners", &self.listeners)
            .field("remote", &self.remote.is_some())
            .field("telemetry", &self.telemetry.is_some())
            .field("proposals", &self.proposals.is_some())
            .finish()
    }
}
