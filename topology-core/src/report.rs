//! Resolution report
//!
//! Serializable description of a resolved topology, for introspection of
//! what the loader negotiated and inserted.

use serde::{Deserialize, Serialize};

use crate::device_manager::{DeviceDelivery, DxvaMode};
use crate::error::ResolutionStatus;
use crate::guids::{display_name, keys};
use crate::ids::TopoId;
use crate::insertion::InsertedTransform;
use crate::media_type::{MediaType, MediaTypeSummary};
use crate::node::{NodeType, TopologyNode};
use crate::topology::Topology;

// =============================================================================
// Records
// =============================================================================

/// One node of the resolved topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeReport {
    /// Node id
    pub id: TopoId,
    /// Node kind
    pub kind: NodeType,
    /// Transform class, for transform nodes that carry one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// Inserted as a decoder
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub decoder: bool,
    /// Type consumed on input 0
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_type: Option<MediaTypeSummary>,
    /// Type produced on output 0
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_type: Option<MediaTypeSummary>,
}

/// One connection of the resolved topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionReport {
    /// Upstream node
    pub from: TopoId,
    /// Upstream output index
    pub output: u32,
    /// Downstream node
    pub to: TopoId,
    /// Downstream input index
    pub input: u32,
    /// Type negotiated on the downstream side
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaTypeSummary>,
}

/// Record of a node added by the loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertedNodeReport {
    /// Id of the inserted node
    pub id: TopoId,
    /// Transform class
    pub class: String,
    /// Upstream and downstream nodes of the bridged edge
    pub between: (TopoId, TopoId),
}

impl From<&InsertedTransform> for InsertedNodeReport {
    fn from(inserted: &InsertedTransform) -> Self {
        Self {
            id: inserted.node.id(),
            class: display_name(&inserted.class_id),
            between: (inserted.upstream, inserted.downstream),
        }
    }
}

/// What a resolution produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionReport {
    /// Id shared by the input and resolved topologies
    pub topology_id: TopoId,
    /// Outcome
    pub status: ResolutionStatus,
    /// DXVA mode the passes ran under
    pub dxva_mode: DxvaMode,
    /// Every node of the resolved topology
    pub nodes: Vec<NodeReport>,
    /// Every connection of the resolved topology
    pub connections: Vec<ConnectionReport>,
    /// Nodes added by the loader, in insertion order
    pub inserted_nodes: Vec<InsertedNodeReport>,
    /// Device manager delivery per visited node
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device_managers: Vec<DeviceDelivery>,
}

impl ResolutionReport {
    /// Describe `topology` after a successful resolution.
    pub fn build(
        topology: &Topology,
        dxva_mode: DxvaMode,
        inserted: &[InsertedTransform],
        device_managers: Vec<DeviceDelivery>,
    ) -> Self {
        let nodes = topology.nodes().iter().map(node_report).collect();
        let connections = topology
            .nodes()
            .iter()
            .flat_map(|node| {
                node.connected_outputs()
                    .into_iter()
                    .map(move |(output, downstream, input)| ConnectionReport {
                        from: node.id(),
                        output,
                        to: downstream.id(),
                        input,
                        media_type: input_type(&downstream, input).map(|t| t.summary()),
                    })
            })
            .collect();

        Self {
            topology_id: topology.id(),
            status: ResolutionStatus::Succeeded,
            dxva_mode,
            nodes,
            connections,
            inserted_nodes: inserted.iter().map(InsertedNodeReport::from).collect(),
            device_managers,
        }
    }

    /// Check if any transform was inserted.
    pub fn has_conversions(&self) -> bool {
        !self.inserted_nodes.is_empty()
    }

    /// Get the number of inserted transforms.
    pub fn conversion_count(&self) -> usize {
        self.inserted_nodes.len()
    }

    /// Type negotiated on the connection from `from` to `to`.
    pub fn connection_type(&self, from: TopoId, to: TopoId) -> Option<&MediaTypeSummary> {
        self.connections
            .iter()
            .find(|c| c.from == from && c.to == to)
            .and_then(|c| c.media_type.as_ref())
    }

    /// Report entry of node `id`.
    pub fn node(&self, id: TopoId) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

// =============================================================================
// Type lookup
// =============================================================================

fn input_type(node: &TopologyNode, input: u32) -> Option<MediaType> {
    match node.node_type() {
        NodeType::Transform => node.bound_transform().ok()?.input_current_type(input).ok(),
        NodeType::Output | NodeType::Tee => node.input_pref_type(input).ok(),
        NodeType::SourceStream => None,
    }
}

fn output_type(node: &TopologyNode) -> Option<MediaType> {
    match node.node_type() {
        NodeType::SourceStream => node
            .stream_descriptor()
            .ok()?
            .media_type_handler()
            .current_media_type()
            .ok(),
        NodeType::Transform => node.bound_transform().ok()?.output_current_type(0).ok(),
        NodeType::Tee => node.input_pref_type(0).ok(),
        NodeType::Output => None,
    }
}

fn node_report(node: &TopologyNode) -> NodeReport {
    let class = match node.node_type() {
        NodeType::Transform => node
            .get_guid(&keys::TRANSFORM_OBJECTID)
            .ok()
            .map(|g| display_name(&g)),
        _ => None,
    };
    NodeReport {
        id: node.id(),
        kind: node.node_type(),
        class,
        decoder: node.get_u32(&keys::DECODER).map(|v| v != 0).unwrap_or(false),
        input_type: input_type(node, 0).map(|t| t.summary()),
        output_type: output_type(node).map(|t| t.summary()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guids::subtypes;
    use crate::transforms::Resampler;
    use std::sync::Arc;

    #[test]
    fn test_report_lists_nodes_and_connections() {
        let mut topology = Topology::new();
        let tee = TopologyNode::new(NodeType::Tee);
        let resampler = TopologyNode::transform(Arc::new(Resampler::new()));
        resampler.set_guid(keys::TRANSFORM_OBJECTID, crate::guids::class_ids::RESAMPLER);
        topology.add_node(&tee).unwrap();
        topology.add_node(&resampler).unwrap();
        tee.connect_output(0, &resampler, 0).unwrap();
        tee.set_input_pref_type(0, Some(&MediaType::audio(subtypes::PCM))).unwrap();

        let report = ResolutionReport::build(&topology, DxvaMode::Default, &[], Vec::new());
        assert_eq!(report.topology_id, topology.id());
        assert_eq!(report.nodes.len(), 2);
        assert_eq!(report.node(resampler.id()).unwrap().class.as_deref(), Some("resampler"));
        assert_eq!(report.connections.len(), 1);
        assert!(report.connection_type(tee.id(), resampler.id()).is_none());
        assert!(!report.has_conversions());
        assert_eq!(report.conversion_count(), 0);
    }

    #[test]
    fn test_report_serializes_without_empty_fields() {
        let topology = Topology::new();
        let report = ResolutionReport::build(&topology, DxvaMode::None, &[], Vec::new());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "succeeded");
        assert_eq!(json["dxva_mode"], "none");
        assert!(json.get("device_managers").is_none());
    }
}
