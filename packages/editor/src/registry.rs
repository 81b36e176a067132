//! # Capability Registry
//!
//! Ordered set of [`NodeCapability`] handlers active in one scope.
//! Dispatch is a linear first-match scan; `Type` uniqueness is checked when
//! the registry is built so the scan order never decides the outcome.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::capability::{CapabilityContext, NodeCapability, PresetDescriptor};
use crate::document::{EaC, FlowGraphEdge, FlowGraphNode, Position, StatsMap};
use crate::errors::{EditorError, EditorResult};
use crate::services::TelemetryService;

/// What a stats request is about: a materialized node, or a bare `(type, id)` pair
#[derive(Debug, Clone, Copy)]
pub enum StatsTarget<'a> {
    Node(&'a FlowGraphNode),
    Lookup { node_type: &'a str, id: &'a str },
}

#[derive(Debug, Clone)]
pub struct CapabilityRegistry {
    capabilities: Vec<Arc<dyn NodeCapability>>,
}

impl CapabilityRegistry {
    /// Build a registry, rejecting a second handler for the same `Type`
    pub fn new(capabilities: Vec<Arc<dyn NodeCapability>>) -> EditorResult<Self> {
        let mut seen = HashSet::new();
        for capability in &capabilities {
            if !seen.insert(capability.node_type()) {
                return Err(EditorError::DuplicateCapability(
                    capability.node_type().to_string(),
                ));
            }
        }

        debug!(count = capabilities.len(), "Built capability registry");
        Ok(Self { capabilities })
    }

    pub fn capabilities(&self) -> &[Arc<dyn NodeCapability>] {
        &self.capabilities
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// First handler whose `matches` accepts the node
    pub fn capability_for(&self, node: &FlowGraphNode) -> Option<&Arc<dyn NodeCapability>> {
        self.capabilities.iter().find(|c| c.matches(node))
    }

    pub fn capability_for_type(&self, node_type: &str) -> Option<&Arc<dyn NodeCapability>> {
        self.capabilities
            .iter()
            .find(|c| c.node_type() == node_type)
    }

    pub fn build_node(
        &self,
        node_type: &str,
        id: &str,
        ctx: &CapabilityContext<'_>,
    ) -> Option<FlowGraphNode> {
        self.capability_for_type(node_type)?.build_node(id, ctx)
    }

    pub fn build_edges_for_node(
        &self,
        node: &FlowGraphNode,
        ctx: &CapabilityContext<'_>,
    ) -> Vec<FlowGraphEdge> {
        self.capability_for(node)
            .map(|c| c.build_edges_for_node(node, ctx))
            .unwrap_or_default()
    }

    pub fn build_preset_patch(
        &self,
        node_type: &str,
        id: &str,
        position: Position,
        ctx: &CapabilityContext<'_>,
    ) -> EditorResult<EaC> {
        self.capability_for_type(node_type)
            .ok_or_else(|| EditorError::CapabilityNotFound(node_type.to_string()))?
            .build_preset_patch(id, position, ctx)
    }

    /// Palette descriptors keyed by `Type`
    pub fn presets(&self) -> BTreeMap<String, PresetDescriptor> {
        self.capabilities
            .iter()
            .filter_map(|c| c.preset().map(|p| (c.node_type().to_string(), p)))
            .collect()
    }

    /// Renderer keys keyed by `Type`
    pub fn renderer_map(&self) -> BTreeMap<String, String> {
        self.capabilities
            .iter()
            .filter_map(|c| c.renderer().map(|r| (c.node_type().to_string(), r.to_string())))
            .collect()
    }

    /// Inspector keys keyed by `Type`
    pub fn inspector_map(&self) -> BTreeMap<String, String> {
        self.capabilities
            .iter()
            .filter_map(|c| c.inspector().map(|i| (c.node_type().to_string(), i.to_string())))
            .collect()
    }

    /// Forward a stats request to the handler for the target's type
    pub async fn get_stats(
        &self,
        target: StatsTarget<'_>,
        telemetry: &dyn TelemetryService,
    ) -> EditorResult<StatsMap> {
        let (node_type, id) = match target {
            StatsTarget::Node(node) => (node.node_type.as_str(), node.id.as_str()),
            StatsTarget::Lookup { node_type, id } => (node_type, id),
        };

        let capability = self
            .capability_for_type(node_type)
            .ok_or_else(|| EditorError::CapabilityNotFound(node_type.to_string()))?;

        capability.get_stats(node_type, id, telemetry).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{
        surface_capabilities, workspace_capabilities, ConnectionCapability, CONNECTION_TYPE,
        SIMULATOR_TYPE,
    };
    use serde_json::json;

    #[test]
    fn test_duplicate_type_is_rejected() {
        let result = CapabilityRegistry::new(vec![
            Arc::new(ConnectionCapability),
            Arc::new(ConnectionCapability),
        ]);

        match result {
            Err(EditorError::DuplicateCapability(node_type)) => {
                assert_eq!(node_type, CONNECTION_TYPE)
            }
            other => panic!("expected duplicate error, got {other:?}"),
        }
    }

    #[test]
    fn test_dispatch_by_type() {
        let registry = CapabilityRegistry::new(workspace_capabilities()).unwrap();

        let node = FlowGraphNode::new("sim-1", SIMULATOR_TYPE);
        assert_eq!(
            registry.capability_for(&node).map(|c| c.node_type()),
            Some(SIMULATOR_TYPE)
        );
        assert!(registry.capability_for_type("schema").is_none());
    }

    #[test]
    fn test_unknown_preset_type() {
        let registry = CapabilityRegistry::new(workspace_capabilities()).unwrap();
        let eac = EaC::new();
        let ctx = CapabilityContext::workspace(&eac);

        let result = registry.build_preset_patch("agent", "a-1", Position::default(), &ctx);
        assert!(matches!(result, Err(EditorError::CapabilityNotFound(_))));
    }

    #[test]
    fn test_ui_maps_keyed_by_type() {
        let registry = CapabilityRegistry::new(surface_capabilities()).unwrap();

        let presets = registry.presets();
        assert_eq!(
            presets.keys().cloned().collect::<Vec<_>>(),
            vec!["agent", "schema", "surface-connection"]
        );
        assert_eq!(
            registry.renderer_map().get("schema").map(String::as_str),
            Some("schema-node")
        );
        assert_eq!(registry.inspector_map().len(), 3);
    }

    #[test]
    fn test_build_node_through_registry() {
        let registry = CapabilityRegistry::new(workspace_capabilities()).unwrap();
        let eac = json!({"Simulators": {"sim-1": {"Details": {"Name": "Sim"}}}})
            .as_object()
            .cloned()
            .unwrap();
        let ctx = CapabilityContext::workspace(&eac);

        let node = registry.build_node(SIMULATOR_TYPE, "sim-1", &ctx).unwrap();
        assert_eq!(node.label, "Sim");
        assert!(registry.build_node(CONNECTION_TYPE, "sim-1", &ctx).is_none());
    }
}
