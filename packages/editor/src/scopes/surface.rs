use crate::capabilities::{
    surface_capabilities, AGENT_TYPE, SCHEMA_TYPE, SURFACE_CONNECTION_TYPE,
};
use crate::document::{compound_id, kinds, record_keys, EaC};
use crate::errors::EditorResult;
use crate::registry::CapabilityRegistry;
use crate::scope::{ScopeKind, ScopeManager, ScopeState};

/// Single-surface scope: entries nested under one surface, with compound
/// `surface->child` ids
#[derive(Debug, Clone)]
pub struct SurfaceScopeManager {
    surface: String,
    state: ScopeState,
}

impl SurfaceScopeManager {
    pub fn new(surface: impl Into<String>) -> EditorResult<Self> {
        Ok(Self::with_registry(
            surface,
            CapabilityRegistry::new(surface_capabilities())?,
        ))
    }

    pub fn with_registry(surface: impl Into<String>, registry: CapabilityRegistry) -> Self {
        Self {
            surface: surface.into(),
            state: ScopeState::new(registry),
        }
    }

    pub fn surface(&self) -> &str {
        &self.surface
    }
}

impl ScopeManager for SurfaceScopeManager {
    fn kind(&self) -> ScopeKind {
        ScopeKind::Surface
    }

    fn lookup(&self) -> Option<&str> {
        Some(&self.surface)
    }

    fn state(&self) -> &ScopeState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ScopeState {
        &mut self.state
    }

    fn node_keys(&self, eac: &EaC) -> Vec<(&'static str, String)> {
        let surface = self.surface.as_str();
        [
            (kinds::DATA_CONNECTIONS, SURFACE_CONNECTION_TYPE),
            (kinds::SCHEMAS, SCHEMA_TYPE),
            (kinds::AGENTS, AGENT_TYPE),
        ]
        .into_iter()
        .flat_map(|(kind, node_type)| {
            record_keys(eac, &[kinds::SURFACES, surface, kind])
                .into_iter()
                .map(move |key| (node_type, compound_id(surface, &key)))
        })
        .collect()
    }
}
