use async_trait::async_trait;
use serde_json::{Map, Value};

use super::SURFACE_CONNECTION_TYPE;
use crate::capability::{
    entry_update_patch, preset_entry, CapabilityContext, NodeCapability, PresetDescriptor,
};
use crate::diff::{deep_merge, merge_tombstones};
use crate::document::{
    detail_str, entry_at, kinds, label_from_details, patch_at, record_keys, EaC, EaCCode,
    FlowGraphNode, NodeMetadata, NodeUpdate, Position,
};
use crate::errors::{EditorError, EditorResult};

/// A connection bound into one surface.
///
/// The node merges two entries: `Details` come from the root
/// `DataConnections` entry, `Metadata` from the surface's binding.
#[derive(Debug, Default, Clone, Copy)]
pub struct SurfaceConnectionCapability;

fn root_path(key: &str) -> Vec<String> {
    vec![kinds::DATA_CONNECTIONS.to_string(), key.to_string()]
}

#[async_trait]
impl NodeCapability for SurfaceConnectionCapability {
    fn node_type(&self) -> &'static str {
        SURFACE_CONNECTION_TYPE
    }

    fn entry_path(&self, id: &str, ctx: &CapabilityContext<'_>) -> Option<Vec<String>> {
        let surface = ctx.surface?;
        Some(vec![
            kinds::SURFACES.to_string(),
            surface.to_string(),
            kinds::DATA_CONNECTIONS.to_string(),
            ctx.child_key(id).to_string(),
        ])
    }

    fn build_node(&self, id: &str, ctx: &CapabilityContext<'_>) -> Option<FlowGraphNode> {
        let binding = entry_at(ctx.eac, &self.entry_path(id, ctx)?)?;
        let root = entry_at(ctx.eac, &root_path(ctx.child_key(id)))?;

        let details = root
            .get(kinds::DETAILS)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        Some(FlowGraphNode {
            id: id.to_string(),
            node_type: SURFACE_CONNECTION_TYPE.to_string(),
            label: label_from_details(&details).unwrap_or_else(|| ctx.child_key(id).to_string()),
            metadata: NodeMetadata::from_entry(binding),
            details,
            selected: false,
        })
    }

    /// Binds the connection into the surface, creating the root connection when missing
    fn build_preset_patch(
        &self,
        id: &str,
        position: Position,
        ctx: &CapabilityContext<'_>,
    ) -> EditorResult<EaC> {
        let path = self.entry_path(id, ctx).ok_or_else(|| {
            EditorError::NotSupported("surface connections outside surface scope".to_string())
        })?;
        let key = ctx.child_key(id);

        let mut binding = Map::new();
        binding.insert(
            kinds::METADATA.to_string(),
            NodeMetadata::at(position).to_value(),
        );
        let mut patch = patch_at(&path, Value::Object(binding));

        if entry_at(ctx.eac, &root_path(key)).is_none() {
            let root = patch_at(
                &root_path(key),
                preset_entry("DataConnection", "New Connection", position),
            );
            deep_merge(&mut patch, &root);
        }

        Ok(patch)
    }

    /// `Details` go to the root connection, `Metadata` to the binding
    fn build_update_patch(
        &self,
        node: &FlowGraphNode,
        update: &NodeUpdate,
        ctx: &CapabilityContext<'_>,
    ) -> Option<EaC> {
        let binding_path = self.entry_path(&node.id, ctx)?;
        let key = ctx.child_key(&node.id);

        let details_patch = update.details.as_ref().and_then(|details| {
            entry_update_patch(ctx.eac, &root_path(key), &NodeUpdate::details(details.clone()))
        });
        let metadata_patch = update.metadata.as_ref().and_then(|metadata| {
            let update = NodeUpdate {
                details: None,
                metadata: Some(metadata.clone()),
            };
            entry_update_patch(ctx.eac, &binding_path, &update)
        });

        match (details_patch, metadata_patch) {
            (None, None) => None,
            (Some(patch), None) | (None, Some(patch)) => Some(patch),
            (Some(mut details), Some(metadata)) => {
                deep_merge(&mut details, &metadata);
                Some(details)
            }
        }
    }

    /// Unbinds the connection and clears schema references to it in this surface
    fn build_delete_patch(&self, node: &FlowGraphNode, ctx: &CapabilityContext<'_>) -> Option<EaC> {
        let surface = ctx.surface?;
        let path = self.entry_path(&node.id, ctx)?;
        entry_at(ctx.eac, &path)?;

        let key = ctx.child_key(&node.id);
        let mut tombstone = patch_at(&path, Value::Null);

        for schema in record_keys(ctx.eac, &[kinds::SURFACES, surface, kinds::SCHEMAS]) {
            let schema_path = [kinds::SURFACES, surface, kinds::SCHEMAS, schema.as_str()];
            let references = entry_at(ctx.eac, &schema_path)
                .and_then(|entry| detail_str(entry, kinds::DATA_CONNECTION_LOOKUP))
                == Some(key);
            if references {
                let lookup = [
                    kinds::SURFACES,
                    surface,
                    kinds::SCHEMAS,
                    schema.as_str(),
                    kinds::DETAILS,
                    kinds::DATA_CONNECTION_LOOKUP,
                ];
                merge_tombstones(&mut tombstone, &patch_at(&lookup, Value::Null));
            }
        }

        Some(tombstone)
    }

    fn get_as_code(&self, node: &FlowGraphNode, ctx: &CapabilityContext<'_>) -> Option<EaCCode> {
        let binding = entry_at(ctx.eac, &self.entry_path(&node.id, ctx)?)?;
        let root = entry_at(ctx.eac, &root_path(ctx.child_key(&node.id)))?;

        Some(EaCCode {
            details: root
                .get(kinds::DETAILS)
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new())),
            metadata: binding
                .get(kinds::METADATA)
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new())),
        })
    }

    fn preset(&self) -> Option<PresetDescriptor> {
        Some(PresetDescriptor::new(
            SURFACE_CONNECTION_TYPE,
            "Surface Connection",
            "link",
        ))
    }

    fn renderer(&self) -> Option<&'static str> {
        Some("connection-node")
    }

    fn inspector(&self) -> Option<&'static str> {
        Some("connection-inspector")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> EaC {
        json!({
            "DataConnections": {"conn-1": {"Details": {"Type": "DataConnection", "Name": "Sensors"}}},
            "Surfaces": {"s-1": {
                "DataConnections": {"conn-1": {"Metadata": {"Position": {"X": 5.0, "Y": 6.0}, "Enabled": true}}},
                "Schemas": {"schema-1": {"Details": {"DataConnectionLookup": "conn-1"}}}
            }}
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_node_merges_root_details_and_binding_metadata() {
        let doc = doc();
        let ctx = CapabilityContext::surface(&doc, "s-1");

        let node = SurfaceConnectionCapability.build_node("s-1->conn-1", &ctx).unwrap();
        assert_eq!(node.label, "Sensors");
        assert_eq!(node.metadata.position, Position::new(5.0, 6.0));
    }

    #[test]
    fn test_preset_creates_missing_root_connection() {
        let doc = doc();
        let ctx = CapabilityContext::surface(&doc, "s-1");

        let patch = SurfaceConnectionCapability
            .build_preset_patch("conn-2", Position::new(1.0, 2.0), &ctx)
            .unwrap();
        assert!(patch["DataConnections"].get("conn-2").is_some());
        assert!(patch["Surfaces"]["s-1"]["DataConnections"].get("conn-2").is_some());

        let existing = SurfaceConnectionCapability
            .build_preset_patch("conn-1", Position::new(1.0, 2.0), &ctx)
            .unwrap();
        assert!(existing.get("DataConnections").is_none());
    }

    #[test]
    fn test_update_routes_details_and_metadata() {
        let doc = doc();
        let ctx = CapabilityContext::surface(&doc, "s-1");
        let node = SurfaceConnectionCapability.build_node("s-1->conn-1", &ctx).unwrap();

        let mut details = Map::new();
        details.insert("Name".to_string(), json!("Renamed"));
        let mut update = NodeUpdate::position(Position::new(9.0, 9.0));
        update.details = Some(details);

        let patch = SurfaceConnectionCapability
            .build_update_patch(&node, &update, &ctx)
            .unwrap();
        assert_eq!(patch["DataConnections"]["conn-1"]["Details"]["Name"], json!("Renamed"));
        assert_eq!(
            patch["Surfaces"]["s-1"]["DataConnections"]["conn-1"]["Metadata"]["Position"],
            json!({"X": 9.0, "Y": 9.0})
        );
    }

    #[test]
    fn test_delete_unbinds_and_clears_schema_lookup() {
        let doc = doc();
        let ctx = CapabilityContext::surface(&doc, "s-1");
        let node = SurfaceConnectionCapability.build_node("s-1->conn-1", &ctx).unwrap();

        let tombstone = SurfaceConnectionCapability.build_delete_patch(&node, &ctx).unwrap();
        assert_eq!(
            Value::Object(tombstone),
            json!({"Surfaces": {"s-1": {
                "DataConnections": {"conn-1": null},
                "Schemas": {"schema-1": {"Details": {"DataConnectionLookup": null}}}
            }}})
        );
    }

    #[test]
    fn test_preset_outside_surface_scope_is_not_supported() {
        let doc = doc();
        let ctx = CapabilityContext::workspace(&doc);

        let result =
            SurfaceConnectionCapability.build_preset_patch("conn-1", Position::default(), &ctx);
        assert!(matches!(result, Err(EditorError::NotSupported(_))));
    }
}
