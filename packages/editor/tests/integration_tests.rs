//! Integration tests for the editor crate

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use eac_editor::capabilities::{
    AGENT_TYPE, CONNECTION_TYPE, SCHEMA_TYPE, SURFACE_CONNECTION_TYPE, SURFACE_TYPE,
};
use eac_editor::{
    CommitStatus, DocumentOrchestrator, EaC, EaCSummary, EditorError, EditorResult, EngineConfig,
    NodeChange, NodeUpdate, OverlayMode, Position, ProcessingState, Proposal, ProposalService,
    ProposalStatus, RemoteDocumentService, ScopeKind, Snapshot, StatsMap, TelemetryService,
    UiEvent,
};
use serde_json::{json, Map, Value};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn editor() -> DocumentOrchestrator {
    init_tracing();
    DocumentOrchestrator::new(EngineConfig::default()).unwrap()
}

fn object(value: Value) -> EaC {
    value.as_object().cloned().unwrap()
}

// --- Mock collaborators ----------------------------------------------------

struct MockRemote {
    state: Mutex<ProcessingState>,
    fail: bool,
    document: EaC,
    commits: AtomicUsize,
}

impl MockRemote {
    fn new(state: ProcessingState) -> Self {
        Self {
            state: Mutex::new(state),
            fail: false,
            document: Map::new(),
            commits: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(ProcessingState::Complete)
        }
    }

    fn with_document(document: EaC) -> Self {
        Self {
            document,
            ..Self::new(ProcessingState::Complete)
        }
    }

    fn set_state(&self, state: ProcessingState) {
        *self.state.lock().unwrap() = state;
    }
}

#[async_trait]
impl RemoteDocumentService for MockRemote {
    async fn commit(&self, _snapshot: &Snapshot) -> EditorResult<CommitStatus> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EditorError::Remote("connection reset".to_string()));
        }
        Ok(CommitStatus {
            processing: *self.state.lock().unwrap(),
            message: String::new(),
        })
    }

    async fn get(&self) -> EditorResult<EaC> {
        Ok(self.document.clone())
    }

    async fn list_for_user(&self) -> EditorResult<Vec<EaCSummary>> {
        Ok(vec![EaCSummary {
            id: "eac-1".to_string(),
            name: "Plant floor".to_string(),
        }])
    }

    async fn archive(&self) -> EditorResult<()> {
        if self.fail {
            return Err(EditorError::Remote("archive rejected".to_string()));
        }
        Ok(())
    }
}

struct MockTelemetry;

#[async_trait]
impl TelemetryService for MockTelemetry {
    async fn get_stats(&self, node_type: &str, id: &str) -> EditorResult<StatsMap> {
        if id == "conn-broken" {
            return Err(EditorError::Telemetry("stream closed".to_string()));
        }
        let mut stats = Map::new();
        stats.insert("type".to_string(), json!(node_type));
        stats.insert("id".to_string(), json!(id));
        stats.insert("messages".to_string(), json!(42));
        Ok(stats)
    }
}

struct MockProposals(Vec<Proposal>);

impl ProposalService for MockProposals {
    fn get_pending(&self) -> Vec<Proposal> {
        self.0
            .iter()
            .filter(|p| p.status == ProposalStatus::Pending)
            .cloned()
            .collect()
    }

    fn get_by_id(&self, id: &str) -> Option<Proposal> {
        self.0.iter().find(|p| p.id == id).cloned()
    }
}

fn proposal(id: &str, proposed: Value) -> Proposal {
    Proposal {
        id: id.to_string(),
        kind: "DataConnections".to_string(),
        key: "conn-1".to_string(),
        proposed,
        status: ProposalStatus::Pending,
    }
}

// --- Document lifecycle ----------------------------------------------------

#[test]
fn test_create_connection_from_preset() {
    let mut editor = editor();

    let changed = editor
        .create_from_preset(CONNECTION_TYPE, "conn-1", Position::new(10.0, 20.0))
        .unwrap();
    assert!(changed);

    let graph = editor.graph();
    assert_eq!(graph.nodes.len(), 1);
    assert_eq!(graph.nodes[0].id, "conn-1");
    assert_eq!(graph.nodes[0].metadata.position, Position::new(10.0, 20.0));
}

#[test]
fn test_delete_connection_records_tombstone() {
    let mut editor = editor();
    editor
        .create_from_preset(CONNECTION_TYPE, "conn-1", Position::new(10.0, 20.0))
        .unwrap();

    assert!(editor.delete_node("conn-1").unwrap());

    let document = editor.committed_eac();
    assert!(eac_editor::document::value_at(&document, &["DataConnections", "conn-1"]).is_none());
    assert_eq!(
        editor.tombstones()["DataConnections"]["conn-1"],
        Value::Null
    );
    assert!(editor.graph().nodes.is_empty());
}

#[test]
fn test_undo_delete_restores_connection() {
    let mut editor = editor();
    editor
        .create_from_preset(CONNECTION_TYPE, "conn-1", Position::new(10.0, 20.0))
        .unwrap();
    editor.delete_node("conn-1").unwrap();

    assert!(editor.undo());

    let document = editor.committed_eac();
    assert_eq!(
        document["DataConnections"]["conn-1"]["Metadata"]["Position"],
        json!({"X": 10.0, "Y": 20.0})
    );
    let node = editor.graph().node("conn-1").unwrap();
    assert_eq!(node.metadata.position, Position::new(10.0, 20.0));

    assert!(editor.redo());
    assert!(editor.graph().node("conn-1").is_none());
}

#[test]
fn test_move_pushes_single_snapshot() {
    let mut editor = editor();
    editor
        .create_from_preset(CONNECTION_TYPE, "conn-1", Position::new(10.0, 20.0))
        .unwrap();
    let before = editor.history().len();

    let changed = editor
        .handle_event(UiEvent::NodeChanges {
            changes: vec![
                NodeChange::Select {
                    id: "conn-1".to_string(),
                    selected: true,
                },
                NodeChange::Position {
                    id: "conn-1".to_string(),
                    position: Position::new(30.0, 40.0),
                },
            ],
        })
        .unwrap();

    assert!(changed);
    assert_eq!(editor.history().len(), before + 1);
    assert_eq!(
        editor.committed_eac()["DataConnections"]["conn-1"]["Metadata"]["Position"],
        json!({"X": 30.0, "Y": 40.0})
    );

    let node = editor.graph().node("conn-1").unwrap();
    assert_eq!(node.metadata.position, Position::new(30.0, 40.0));
    assert!(node.selected);
}

#[test]
fn test_selection_only_changes_do_not_touch_history() {
    let mut editor = editor();
    editor
        .create_from_preset(CONNECTION_TYPE, "conn-1", Position::new(10.0, 20.0))
        .unwrap();
    let before = editor.history().len();

    let changed = editor.apply_node_changes(&[NodeChange::Select {
        id: "conn-1".to_string(),
        selected: true,
    }]);

    assert!(!changed);
    assert_eq!(editor.history().len(), before);
    assert!(editor.graph().node("conn-1").unwrap().selected);
}

#[test]
fn test_pending_overlay_later_proposal_wins() {
    init_tracing();
    let proposals = MockProposals(vec![
        proposal("p-1", json!({"Details": {"Name": "First", "Description": "kept"}})),
        proposal("p-2", json!({"Details": {"Name": "Second"}})),
    ]);
    let mut editor = DocumentOrchestrator::new(EngineConfig::default())
        .unwrap()
        .with_proposals(Arc::new(proposals));
    editor
        .create_from_preset(CONNECTION_TYPE, "conn-1", Position::new(10.0, 20.0))
        .unwrap();
    let live = editor.committed_eac();
    let history_len = editor.history().len();

    editor.set_overlay_mode(OverlayMode::Pending);
    let view = editor.eac();

    assert_eq!(view["DataConnections"]["conn-1"]["Details"]["Name"], json!("Second"));
    assert_eq!(
        view["DataConnections"]["conn-1"]["Details"]["Description"],
        json!("kept")
    );
    assert_eq!(*editor.committed_eac(), *live);
    assert_eq!(
        live["DataConnections"]["conn-1"]["Details"]["Name"],
        json!("New Connection")
    );
    assert_eq!(editor.history().len(), history_len);
}

#[test]
fn test_id_overlay_follows_list_order() {
    init_tracing();
    let proposals = MockProposals(vec![
        proposal("p-1", json!({"Details": {"Name": "First"}})),
        proposal("p-2", json!({"Details": {"Name": "Second"}})),
    ]);
    let config = EngineConfig::default().with_overlay(OverlayMode::Ids(vec![
        "p-2".to_string(),
        "p-1".to_string(),
        "p-missing".to_string(),
    ]));
    let mut editor = DocumentOrchestrator::new(config)
        .unwrap()
        .with_proposals(Arc::new(proposals));
    editor
        .create_from_preset(CONNECTION_TYPE, "conn-1", Position::default())
        .unwrap();

    assert_eq!(
        editor.eac()["DataConnections"]["conn-1"]["Details"]["Name"],
        json!("First")
    );
    assert_eq!(
        editor.compose_overlay(&OverlayMode::None),
        *editor.committed_eac()
    );
}

#[test]
fn test_recreated_entry_survives_unrelated_delete() {
    let mut editor = editor();
    editor
        .create_from_preset(CONNECTION_TYPE, "conn-1", Position::new(1.0, 1.0))
        .unwrap();
    editor.delete_node("conn-1").unwrap();

    editor
        .create_from_preset(CONNECTION_TYPE, "conn-1", Position::new(2.0, 2.0))
        .unwrap();
    editor
        .create_from_preset(CONNECTION_TYPE, "conn-2", Position::new(3.0, 3.0))
        .unwrap();
    editor.delete_node("conn-2").unwrap();

    assert!(editor.graph().node("conn-1").is_some());
    assert!(editor.graph().node("conn-2").is_none());
}

#[test]
fn test_connection_cascade_and_surface_bindings() {
    let mut editor = editor();
    editor
        .create_from_preset(SURFACE_TYPE, "s-1", Position::new(0.0, 0.0))
        .unwrap();
    editor
        .create_from_preset(CONNECTION_TYPE, "conn-1", Position::new(10.0, 0.0))
        .unwrap();
    assert!(editor.connect("conn-1", "s-1").unwrap());
    assert!(editor.graph().edge("conn-1->s-1").is_some());

    // Connecting a surface to a connection is not a binding the connection accepts
    assert!(!editor.connect("s-1", "conn-1").unwrap());

    editor.delete_node("conn-1").unwrap();
    let document = editor.committed_eac();
    assert!(eac_editor::document::value_at(&document, &["Surfaces", "s-1", "DataConnections"]).is_none());
    assert!(editor.graph().edges.is_empty());
}

#[test]
fn test_nested_surfaces_leave_workspace_canvas() -> anyhow::Result<()> {
    let mut editor = editor();
    editor.create_from_preset(SURFACE_TYPE, "s-1", Position::default())?;
    editor.create_from_preset(SURFACE_TYPE, "s-2", Position::new(200.0, 0.0))?;
    assert_eq!(editor.graph().nodes.len(), 2);

    assert!(editor.connect("s-1", "s-2")?);
    assert!(editor.graph().node("s-2").is_none());
    assert!(editor.graph().edges.is_empty());
    assert!(matches!(
        editor.connect("s-2", "s-1"),
        Err(EditorError::InvalidEdge(_))
    ));

    assert!(editor.disconnect("s-1->s-2")?);
    assert!(editor.graph().node("s-2").is_some());
    Ok(())
}

#[test]
fn test_surface_scope_workflow() {
    let mut editor = editor();
    editor
        .create_from_preset(SURFACE_TYPE, "s-1", Position::default())
        .unwrap();
    editor
        .create_from_preset(CONNECTION_TYPE, "conn-1", Position::default())
        .unwrap();
    editor.connect("conn-1", "s-1").unwrap();

    editor.switch_to(ScopeKind::Surface, Some("s-1")).unwrap();
    assert_eq!(
        editor.graph().node("s-1->conn-1").map(|n| n.node_type.as_str()),
        Some(SURFACE_CONNECTION_TYPE)
    );

    editor
        .handle_event(UiEvent::Drop {
            node_type: SCHEMA_TYPE.to_string(),
            id: "schema-1".to_string(),
            position: Position::new(100.0, 0.0),
        })
        .unwrap();
    editor
        .handle_event(UiEvent::Drop {
            node_type: AGENT_TYPE.to_string(),
            id: "agent-1".to_string(),
            position: Position::new(200.0, 0.0),
        })
        .unwrap();
    editor
        .handle_event(UiEvent::Connect {
            source: "s-1->conn-1".to_string(),
            target: "s-1->schema-1".to_string(),
        })
        .unwrap();
    editor
        .handle_event(UiEvent::Connect {
            source: "s-1->schema-1".to_string(),
            target: "s-1->agent-1".to_string(),
        })
        .unwrap();

    let edge_ids: Vec<&str> = editor.graph().edges.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(
        edge_ids,
        vec!["s-1->conn-1->s-1->schema-1", "s-1->schema-1->s-1->agent-1"]
    );

    let changed = editor
        .handle_event(UiEvent::EdgeChanges {
            changes: vec![eac_editor::EdgeChange::Remove {
                id: "s-1->schema-1->s-1->agent-1".to_string(),
            }],
        })
        .unwrap();
    assert!(changed);
    assert_eq!(editor.graph().edges.len(), 1);

    let code = editor.get_as_code("s-1->schema-1").unwrap();
    assert_eq!(code.details["DataConnectionLookup"], json!("conn-1"));

    assert!(matches!(
        editor.install_simulators(&Map::new()),
        Err(EditorError::NotSupported(_))
    ));

    editor.switch_to(ScopeKind::Workspace, None).unwrap();
    assert!(editor.graph().node("s-1").is_some());
}

#[test]
fn test_install_simulators_and_bind() {
    let mut editor = editor();
    let library = object(json!({
        "sim-1": {"Details": {"Type": "Simulator", "Name": "Weather"}},
        "sim-2": {"Details": {"Type": "Simulator", "Name": "Traffic"}}
    }));

    assert!(editor.install_simulators(&library).unwrap());
    assert_eq!(
        editor.graph().node("sim-2").unwrap().metadata.position,
        Position::new(0.0, 150.0)
    );
    // Already installed
    assert!(!editor.install_simulators(&library).unwrap());

    editor
        .create_from_preset(CONNECTION_TYPE, "conn-1", Position::default())
        .unwrap();
    editor.connect("sim-1", "conn-1").unwrap();
    assert!(editor.graph().edge("sim-1->conn-1").is_some());

    assert!(editor.disconnect("sim-1->conn-1").unwrap());
    assert!(editor.graph().edges.is_empty());
}

#[test]
fn test_update_node_and_read_back() -> anyhow::Result<()> {
    let mut editor = editor();
    editor.create_from_preset(CONNECTION_TYPE, "conn-1", Position::default())?;

    let mut details = Map::new();
    details.insert("Name".to_string(), json!("Sensors"));
    assert!(editor.update_node("conn-1", &NodeUpdate::details(details.clone()))?);
    assert!(!editor.update_node("conn-1", &NodeUpdate::details(details))?);

    let code = editor.get_as_code("conn-1")?;
    assert_eq!(code.details["Name"], json!("Sensors"));
    assert_eq!(editor.graph().node("conn-1").map(|n| n.label.as_str()), Some("Sensors"));

    assert!(matches!(
        editor.get_as_code("missing"),
        Err(EditorError::NodeNotFound(_))
    ));
    assert!(editor.node_config("conn-1")?.is_some());
    Ok(())
}

#[test]
fn test_same_position_over_integer_coordinates_is_noop() {
    let mut editor = editor();
    editor.reset_from_snapshot(Snapshot::new(
        object(json!({
            "DataConnections": {"conn-1": {
                "Details": {"Type": "DataConnection", "Name": "Sensors"},
                "Metadata": {"Position": {"X": 10, "Y": 20}, "Enabled": true}
            }}
        })),
        EaC::new(),
    ));
    let before = editor.history().len();

    let same = NodeUpdate::position(Position::new(10.0, 20.0));
    assert!(!editor.update_node("conn-1", &same).unwrap());
    assert!(!editor.merge_partial(&object(json!({
        "DataConnections": {"conn-1": {"Metadata": {"Position": {"X": 10.0, "Y": 20.0}}}}
    }))));

    assert_eq!(editor.history().len(), before);
    assert!(!editor.has_unsaved_changes());

    let moved = NodeUpdate::position(Position::new(10.0, 21.0));
    assert!(editor.update_node("conn-1", &moved).unwrap());
    assert!(editor.has_unsaved_changes());
}

#[test]
fn test_revert_is_undoable() {
    let mut editor = editor();
    editor
        .create_from_preset(CONNECTION_TYPE, "conn-1", Position::default())
        .unwrap();
    assert!(editor.has_unsaved_changes());

    assert!(editor.revert_to_last_commit());
    assert!(editor.graph().is_empty());
    assert!(!editor.has_unsaved_changes());

    assert!(editor.undo());
    assert!(editor.graph().node("conn-1").is_some());
}

#[test]
fn test_fork_runtime_is_detached() {
    let mut editor = editor();
    editor
        .create_from_preset(CONNECTION_TYPE, "conn-1", Position::default())
        .unwrap();
    editor
        .create_from_preset(CONNECTION_TYPE, "conn-2", Position::default())
        .unwrap();
    editor.delete_node("conn-2").unwrap();

    let mut fork = editor.fork_runtime();
    assert_eq!(fork, *editor.committed_eac());
    assert!(fork.get("DataConnections").unwrap().get("conn-2").is_none());

    fork.clear();
    assert!(editor.graph().node("conn-1").is_some());
}

#[test]
fn test_history_bound_from_config() {
    init_tracing();
    let mut editor = DocumentOrchestrator::new(EngineConfig::default().with_max_history(3)).unwrap();

    for i in 0..5 {
        editor
            .create_from_preset(CONNECTION_TYPE, &format!("conn-{i}"), Position::default())
            .unwrap();
    }

    assert_eq!(editor.history().len(), 3);
    assert_eq!(editor.history().cursor(), 2);
    assert!(editor.undo());
    assert!(editor.undo());
    assert!(!editor.undo());
}

#[test]
fn test_listeners_receive_graph_until_unsubscribed() {
    let mut editor = editor();
    let calls = Arc::new(AtomicUsize::new(0));
    let nodes_seen = Arc::new(AtomicUsize::new(0));

    let counter = calls.clone();
    let seen = nodes_seen.clone();
    let id = editor.subscribe(move |graph| {
        counter.fetch_add(1, Ordering::SeqCst);
        seen.store(graph.nodes.len(), Ordering::SeqCst);
    });

    editor
        .create_from_preset(CONNECTION_TYPE, "conn-1", Position::default())
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(nodes_seen.load(Ordering::SeqCst), 1);

    // No-op merge: no notification
    editor
        .create_from_preset(CONNECTION_TYPE, "conn-1", Position::default())
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert!(editor.unsubscribe(id));
    editor
        .create_from_preset(CONNECTION_TYPE, "conn-2", Position::default())
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unknown_preset_and_node_errors() {
    let mut editor = editor();

    assert!(matches!(
        editor.create_from_preset("schema", "schema-1", Position::default()),
        Err(EditorError::CapabilityNotFound(_))
    ));
    assert!(matches!(
        editor.delete_node("ghost"),
        Err(EditorError::NodeNotFound(_))
    ));
    assert!(matches!(
        editor.disconnect("a->b"),
        Err(EditorError::InvalidEdge(_))
    ));
    assert!(!editor.can_undo());
}

// --- Remote and telemetry --------------------------------------------------

#[tokio::test]
async fn test_commit_advances_baseline_only_when_complete() {
    init_tracing();
    let remote = Arc::new(MockRemote::new(ProcessingState::Queued));
    let mut editor = DocumentOrchestrator::new(EngineConfig::default())
        .unwrap()
        .with_remote(remote.clone());
    editor
        .create_from_preset(CONNECTION_TYPE, "conn-1", Position::default())
        .unwrap();

    let status = editor.commit().await.unwrap();
    assert_eq!(status.processing, ProcessingState::Queued);
    assert!(editor.has_unsaved_changes());

    remote.set_state(ProcessingState::Complete);
    editor.commit().await.unwrap();
    assert!(!editor.has_unsaved_changes());
    assert_eq!(remote.commits.load(Ordering::SeqCst), 2);

    editor
        .create_from_preset(CONNECTION_TYPE, "conn-2", Position::default())
        .unwrap();
    assert!(editor.has_unsaved_changes());
}

#[tokio::test]
async fn test_commit_failure_leaves_document_dirty() {
    init_tracing();
    let mut editor = DocumentOrchestrator::new(EngineConfig::default())
        .unwrap()
        .with_remote(Arc::new(MockRemote::failing()));
    editor
        .create_from_preset(CONNECTION_TYPE, "conn-1", Position::default())
        .unwrap();

    let result = editor.commit().await;
    assert!(matches!(result, Err(EditorError::Remote(_))));
    assert!(editor.has_unsaved_changes());
    assert!(matches!(editor.archive().await, Err(EditorError::Remote(_))));
}

#[tokio::test]
async fn test_commit_without_remote() {
    let mut editor = editor();

    let result = editor.commit().await;
    assert!(matches!(result, Err(EditorError::ServiceUnavailable(_))));
}

#[tokio::test]
async fn test_load_replaces_history() {
    init_tracing();
    let remote = MockRemote::with_document(object(json!({
        "DataConnections": {"conn-1": {"Details": {"Name": "Remote"}}},
        "Surfaces": {"s-1": {"Details": {"Name": "Main"}}}
    })));
    let mut editor = DocumentOrchestrator::new(EngineConfig::default())
        .unwrap()
        .with_remote(Arc::new(remote));
    editor
        .create_from_preset(SURFACE_TYPE, "local", Position::default())
        .unwrap();

    editor.load().await.unwrap();

    assert_eq!(editor.graph().nodes.len(), 2);
    assert!(editor.graph().node("local").is_none());
    assert!(!editor.can_undo());
    assert!(!editor.has_unsaved_changes());

    let documents = editor.list_for_user().await.unwrap();
    assert_eq!(documents[0].id, "eac-1");
}

#[tokio::test]
async fn test_stats_through_capabilities() {
    init_tracing();
    let mut editor = DocumentOrchestrator::new(EngineConfig::default())
        .unwrap()
        .with_telemetry(Arc::new(MockTelemetry));
    editor
        .create_from_preset(CONNECTION_TYPE, "conn-1", Position::default())
        .unwrap();
    editor
        .create_from_preset(SURFACE_TYPE, "s-1", Position::default())
        .unwrap();

    let stats = editor.get_stats("conn-1").await.unwrap();
    assert_eq!(stats["type"], json!("connection"));
    assert_eq!(stats["messages"], json!(42));

    assert!(matches!(
        editor.get_stats("missing").await,
        Err(EditorError::NodeNotFound(_))
    ));

    let lookup = editor.get_stats_for(SURFACE_TYPE, "s-9").await.unwrap();
    assert_eq!(lookup["id"], json!("s-9"));
    assert!(matches!(
        editor.get_stats_for("agent", "a-1").await,
        Err(EditorError::CapabilityNotFound(_))
    ));

    let all = editor.get_all_stats().await.unwrap();
    assert_eq!(all.keys().cloned().collect::<Vec<_>>(), vec!["conn-1", "s-1"]);

    editor
        .create_from_preset(CONNECTION_TYPE, "conn-broken", Position::default())
        .unwrap();
    assert!(matches!(
        editor.get_all_stats().await,
        Err(EditorError::Telemetry(_))
    ));
}
