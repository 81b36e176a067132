use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::capabilities::{workspace_capabilities, CONNECTION_TYPE, SIMULATOR_TYPE, SURFACE_TYPE};
use crate::document::{entry_at, kinds, record_keys, EaC, NodeMetadata, Position};
use crate::errors::EditorResult;
use crate::registry::CapabilityRegistry;
use crate::scope::{ScopeKind, ScopeManager, ScopeState};

/// Vertical spacing between installed simulators
const SIMULATOR_SPACING: f64 = 150.0;

/// Workspace-wide scope: root connections, simulators and surfaces
#[derive(Debug, Clone)]
pub struct WorkspaceScopeManager {
    state: ScopeState,
}

impl WorkspaceScopeManager {
    pub fn new() -> EditorResult<Self> {
        Ok(Self::with_registry(CapabilityRegistry::new(
            workspace_capabilities(),
        )?))
    }

    pub fn with_registry(registry: CapabilityRegistry) -> Self {
        Self {
            state: ScopeState::new(registry),
        }
    }
}

/// Existing parent of `surface`, if it names one
fn parent_surface<'a>(eac: &'a EaC, surface: &str) -> Option<&'a str> {
    entry_at(eac, &[kinds::SURFACES, surface])?
        .get(kinds::PARENT_SURFACE_LOOKUP)
        .and_then(Value::as_str)
        .filter(|&parent| parent != surface && entry_at(eac, &[kinds::SURFACES, parent]).is_some())
}

impl ScopeManager for WorkspaceScopeManager {
    fn kind(&self) -> ScopeKind {
        ScopeKind::Workspace
    }

    fn lookup(&self) -> Option<&str> {
        None
    }

    fn state(&self) -> &ScopeState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ScopeState {
        &mut self.state
    }

    fn node_keys(&self, eac: &EaC) -> Vec<(&'static str, String)> {
        [
            (kinds::DATA_CONNECTIONS, CONNECTION_TYPE),
            (kinds::SIMULATORS, SIMULATOR_TYPE),
            (kinds::SURFACES, SURFACE_TYPE),
        ]
        .into_iter()
        .flat_map(|(kind, node_type)| {
            record_keys(eac, &[kind])
                .into_iter()
                .map(move |key| (node_type, key))
        })
        .collect()
    }

    /// Only root-level surfaces are drawn. A surface whose parent exists stays
    /// addressable by id, so it can still be edited or detached.
    fn is_projected(&self, eac: &EaC, node_type: &str, id: &str) -> bool {
        node_type != SURFACE_TYPE || parent_surface(eac, id).is_none()
    }

    /// `{Simulators: {...}}` for every simulator not yet in the document.
    ///
    /// Entries without a position are stacked below the existing simulators.
    fn install_simulators(&self, eac: &EaC, simulators: &EaC) -> EditorResult<EaC> {
        let existing = record_keys(eac, &[kinds::SIMULATORS]).len();
        let mut installed = Map::new();

        for (key, entry) in simulators {
            if entry_at(eac, &[kinds::SIMULATORS, key.as_str()]).is_some() {
                debug!(simulator = %key, "Simulator already installed");
                continue;
            }
            let Value::Object(entry) = entry else {
                warn!(simulator = %key, "Simulator entry is not an object, skipping");
                continue;
            };

            let mut entry = entry.clone();
            let slot = (existing + installed.len()) as f64;
            let metadata = entry
                .entry(kinds::METADATA.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(metadata) = metadata {
                let defaults = NodeMetadata::at(Position::new(0.0, slot * SIMULATOR_SPACING));
                if let Value::Object(defaults) = defaults.to_value() {
                    for (field, value) in defaults {
                        metadata.entry(field).or_insert(value);
                    }
                }
            }

            installed.insert(key.clone(), Value::Object(entry));
        }

        let mut patch = Map::new();
        if !installed.is_empty() {
            patch.insert(kinds::SIMULATORS.to_string(), Value::Object(installed));
        }
        Ok(patch)
    }
}
