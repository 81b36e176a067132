//! # EaC Document Model
//!
//! The Everything-as-Code document is a nested JSON object:
//!
//! ```text
//! { RecordKind: { Lookup: { Details: { Type, .. }, Metadata: { Position, Enabled }, ..nested record maps } } }
//! ```
//!
//! The document is the source of truth. [`FlowGraph`] is a projection of it,
//! rebuilt in full whenever the document changes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The declarative document (and, with the same shape, the delete-tombstone document)
pub type EaC = Map<String, Value>;

/// Metric values returned by the telemetry collaborator
pub type StatsMap = Map<String, Value>;

/// Record-kind and field names used by the built-in capabilities
pub mod kinds {
    pub const DATA_CONNECTIONS: &str = "DataConnections";
    pub const SIMULATORS: &str = "Simulators";
    pub const SURFACES: &str = "Surfaces";
    pub const SCHEMAS: &str = "Schemas";
    pub const AGENTS: &str = "Agents";

    pub const DETAILS: &str = "Details";
    pub const METADATA: &str = "Metadata";
    pub const POSITION: &str = "Position";
    pub const ENABLED: &str = "Enabled";
    pub const NAME: &str = "Name";
    pub const TYPE: &str = "Type";

    pub const SIMULATOR_LOOKUP: &str = "SimulatorLookup";
    pub const DATA_CONNECTION_LOOKUP: &str = "DataConnectionLookup";
    pub const PARENT_SURFACE_LOOKUP: &str = "ParentSurfaceLookup";
    pub const SCHEMA_LOOKUPS: &str = "SchemaLookups";
}

/// Separator used for compound node ids and edge ids
pub const ID_SEPARATOR: &str = "->";

/// 2D canvas position
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Read a position from an entry's `Metadata` object
    pub fn from_metadata(metadata: Option<&Value>) -> Option<Self> {
        metadata
            .and_then(|m| m.get(kinds::POSITION))
            .and_then(|p| serde_json::from_value(p.clone()).ok())
    }

    pub fn to_value(self) -> Value {
        let mut map = Map::new();
        map.insert("X".to_string(), Value::from(self.x));
        map.insert("Y".to_string(), Value::from(self.y));
        Value::Object(map)
    }
}

/// Layout metadata carried by graph nodes and document entries
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeMetadata {
    #[serde(default)]
    pub position: Position,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for NodeMetadata {
    fn default() -> Self {
        Self {
            position: Position::default(),
            enabled: true,
        }
    }
}

impl NodeMetadata {
    pub fn at(position: Position) -> Self {
        Self {
            position,
            enabled: true,
        }
    }

    /// Read metadata from an entry, defaulting missing fields
    pub fn from_entry(entry: &Map<String, Value>) -> Self {
        let metadata = entry.get(kinds::METADATA);
        Self {
            position: Position::from_metadata(metadata).unwrap_or_default(),
            enabled: metadata
                .and_then(|m| m.get(kinds::ENABLED))
                .and_then(Value::as_bool)
                .unwrap_or(true),
        }
    }

    pub fn to_value(self) -> Value {
        let mut map = Map::new();
        map.insert(kinds::POSITION.to_string(), self.position.to_value());
        map.insert(kinds::ENABLED.to_string(), Value::Bool(self.enabled));
        Value::Object(map)
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A node of the projected visual graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FlowGraphNode {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "Type")]
    pub node_type: String,

    pub label: String,

    pub metadata: NodeMetadata,

    /// Shallow copy of the entry's `Details`
    #[serde(default)]
    pub details: Map<String, Value>,

    /// UI selection state, not part of the document
    #[serde(default, skip_serializing_if = "is_false")]
    pub selected: bool,
}

impl FlowGraphNode {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            node_type: node_type.into(),
            metadata: NodeMetadata::default(),
            details: Map::new(),
            selected: false,
        }
    }

    /// Project a document entry into a node
    pub fn from_entry(id: &str, node_type: &str, entry: &Map<String, Value>) -> Self {
        let details = entry
            .get(kinds::DETAILS)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        Self {
            id: id.to_string(),
            node_type: node_type.to_string(),
            label: label_from_details(&details).unwrap_or_else(|| id.to_string()),
            metadata: NodeMetadata::from_entry(entry),
            details,
            selected: false,
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.metadata.position = position;
        self
    }
}

/// `Details.Name`, when present
pub fn label_from_details(details: &Map<String, Value>) -> Option<String> {
    details
        .get(kinds::NAME)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// A directed edge of the projected visual graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FlowGraphEdge {
    #[serde(rename = "ID")]
    pub id: String,

    pub source: String,

    pub target: String,
}

impl FlowGraphEdge {
    pub fn between(source: &str, target: &str) -> Self {
        Self {
            id: edge_id(source, target),
            source: source.to_string(),
            target: target.to_string(),
        }
    }
}

/// Visual projection of the document for one scope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FlowGraph {
    pub nodes: Vec<FlowGraphNode>,
    pub edges: Vec<FlowGraphEdge>,
}

impl FlowGraph {
    pub fn node(&self, id: &str) -> Option<&FlowGraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&FlowGraphEdge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// Read-only logical state of one entry, as shown by inspectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EaCCode {
    pub details: Value,
    pub metadata: Value,
}

/// A `{Details?, Metadata?}` change request for one node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl NodeUpdate {
    pub fn position(position: Position) -> Self {
        let mut metadata = Map::new();
        metadata.insert(kinds::POSITION.to_string(), position.to_value());
        Self {
            details: None,
            metadata: Some(metadata),
        }
    }

    pub fn details(details: Map<String, Value>) -> Self {
        Self {
            details: Some(details),
            metadata: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.details.is_none() && self.metadata.is_none()
    }
}

/// Lifecycle of a proposal in the proposal service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProposalStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

/// A speculative patch to one record, composed only at read time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Proposal {
    #[serde(rename = "ID")]
    pub id: String,

    /// Record-kind name, e.g. `DataConnections`
    pub kind: String,

    /// Lookup key inside the record kind
    pub key: String,

    /// Partial entry value
    pub proposed: Value,

    #[serde(default)]
    pub status: ProposalStatus,
}

impl Proposal {
    /// The proposal expressed as a document patch `{Kind: {Key: Proposed}}`
    pub fn as_patch(&self) -> EaC {
        patch_at(&[self.kind.as_str(), self.key.as_str()], self.proposed.clone())
    }
}

pub fn edge_id(source: &str, target: &str) -> String {
    format!("{source}{ID_SEPARATOR}{target}")
}

pub fn compound_id(parent: &str, child: &str) -> String {
    format!("{parent}{ID_SEPARATOR}{child}")
}

/// Build `{a: {b: {.. : value}}}` from a key path
pub fn patch_at<S: AsRef<str>>(path: &[S], value: Value) -> EaC {
    let mut current = value;
    for key in path.iter().skip(1).rev() {
        let mut map = Map::new();
        map.insert(key.as_ref().to_string(), current);
        current = Value::Object(map);
    }

    let mut root = Map::new();
    if let Some(first) = path.first() {
        root.insert(first.as_ref().to_string(), current);
    }
    root
}

/// Follow a key path through nested objects
pub fn value_at<'a, S: AsRef<str>>(eac: &'a EaC, path: &[S]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = eac.get(first.as_ref())?;
    for key in rest {
        current = current.as_object()?.get(key.as_ref())?;
    }
    Some(current)
}

/// Follow a key path to an object entry
pub fn entry_at<'a, S: AsRef<str>>(eac: &'a EaC, path: &[S]) -> Option<&'a Map<String, Value>> {
    value_at(eac, path).and_then(Value::as_object)
}

/// Keys of the record map at `path`, in document order
pub fn record_keys<S: AsRef<str>>(eac: &EaC, path: &[S]) -> Vec<String> {
    entry_at(eac, path)
        .map(|records| records.keys().cloned().collect())
        .unwrap_or_default()
}

/// String field of an entry's `Details`
pub fn detail_str<'a>(entry: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    entry
        .get(kinds::DETAILS)
        .and_then(|d| d.get(field))
        .and_then(Value::as_str)
}
