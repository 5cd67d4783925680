//! Topology container
//!
//! A topology holds shared node handles. Removing a node from a topology
//! severs its connections but leaves the node itself to its other holders.

use crate::attributes::Attributes;
use crate::guids::Guid;
use crate::ids::{next_topology_id, TopoId};
use crate::node::{NodeType, TopologyNode};
use crate::{Error, Result};

/// Graph of source, transform, tee and output nodes.
#[derive(Debug)]
pub struct Topology {
    id: TopoId,
    attributes: Attributes,
    nodes: Vec<TopologyNode>,
}

impl Default for Topology {
    fn default() -> Self {
        Self::new()
    }
}

impl Topology {
    /// Empty topology with the next topology id.
    pub fn new() -> Self {
        Self {
            id: next_topology_id(),
            attributes: Attributes::new(),
            nodes: Vec::new(),
        }
    }

    /// Topology id.
    pub fn id(&self) -> TopoId {
        self.id
    }

    /// Topology attributes.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Mutable topology attributes.
    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    /// Set a 32-bit topology attribute.
    pub fn set_u32(&mut self, key: Guid, value: u32) {
        self.attributes.set_u32(key, value);
    }

    /// Get a 32-bit topology attribute.
    pub fn get_u32(&self, key: &Guid) -> Result<u32> {
        self.attributes.get_u32(key)
    }

    /// Add a node. Duplicate ids and repeated handles are refused.
    pub fn add_node(&mut self, node: &TopologyNode) -> Result<()> {
        if self.nodes.iter().any(|n| n.ptr_eq(node)) {
            return Err(Error::InvalidArgument("node already added".into()));
        }
        let id = node.id();
        if self.nodes.iter().any(|n| n.id() == id) {
            return Err(Error::InvalidArgument(format!("duplicate node id {:#x}", id)));
        }
        self.nodes.push(node.clone());
        Ok(())
    }

    /// Remove a node and sever its connections.
    pub fn remove_node(&mut self, node: &TopologyNode) -> Result<()> {
        let position = self
            .nodes
            .iter()
            .position(|n| n.ptr_eq(node))
            .ok_or_else(|| Error::InvalidArgument(format!("node {:#x} is not in the topology", node.id())))?;
        let removed = self.nodes.remove(position);
        removed.disconnect_all();
        Ok(())
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Node at `index`.
    pub fn node(&self, index: usize) -> Result<TopologyNode> {
        self.nodes
            .get(index)
            .cloned()
            .ok_or(Error::InvalidIndex(index as u32))
    }

    /// Node with id `id`.
    pub fn node_by_id(&self, id: TopoId) -> Result<TopologyNode> {
        self.nodes
            .iter()
            .find(|n| n.id() == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("node {:#x}", id)))
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> &[TopologyNode] {
        &self.nodes
    }

    /// Drop every node reference.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Source stream nodes.
    pub fn source_nodes(&self) -> Vec<TopologyNode> {
        self.nodes_of(NodeType::SourceStream)
    }

    /// Output nodes.
    pub fn output_nodes(&self) -> Vec<TopologyNode> {
        self.nodes_of(NodeType::Output)
    }

    fn nodes_of(&self, kind: NodeType) -> Vec<TopologyNode> {
        self.nodes
            .iter()
            .filter(|n| n.node_type() == kind)
            .cloned()
            .collect()
    }

    /// Replace this topology by a copy of `other`.
    ///
    /// Takes the id and attributes of `other`, creates a copy of each node
    /// (same id, shared bound object) and rebuilds the connections between
    /// the copies. Connections to nodes outside `other` are dropped.
    pub fn clone_from(&mut self, other: &Topology) -> Result<()> {
        let mut copies = Vec::with_capacity(other.nodes.len());
        for original in &other.nodes {
            let copy = TopologyNode::new(original.node_type());
            copy.clone_from(original)?;
            copy.set_id(original.id());
            copies.push(copy);
        }

        for (original, copy) in other.nodes.iter().zip(&copies) {
            for (output, downstream, input) in original.connected_outputs() {
                if let Some(target) = other.nodes.iter().position(|n| n.ptr_eq(&downstream)) {
                    copy.connect_output(output, &copies[target], input)?;
                }
            }
        }

        self.id = other.id;
        self.attributes = other.attributes.clone();
        self.nodes = copies;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guids::keys;

    #[test]
    fn test_ids_increase() {
        let a = Topology::new();
        let b = Topology::new();
        assert!(b.id() > a.id());
    }

    #[test]
    fn test_duplicate_nodes_are_refused() {
        let mut topology = Topology::new();
        let node = TopologyNode::new(NodeType::Tee);
        topology.add_node(&node).unwrap();
        assert!(matches!(topology.add_node(&node), Err(Error::InvalidArgument(_))));

        let twin = TopologyNode::new(NodeType::Tee);
        twin.set_id(node.id());
        assert!(matches!(topology.add_node(&twin), Err(Error::InvalidArgument(_))));
        assert!(matches!(topology.remove_node(&twin), Err(Error::InvalidArgument(_))));
        assert_eq!(topology.node_count(), 1);
    }

    #[test]
    fn test_remove_severs_connections() {
        let mut topology = Topology::new();
        let a = TopologyNode::new(NodeType::Transform);
        let b = TopologyNode::new(NodeType::Output);
        topology.add_node(&a).unwrap();
        topology.add_node(&b).unwrap();
        a.connect_output(0, &b, 0).unwrap();

        topology.remove_node(&b).unwrap();
        assert!(a.output(0).is_err());
        assert!(b.input(0).is_err());
        assert!(matches!(topology.node(1), Err(Error::InvalidIndex(1))));
        assert!(matches!(topology.node_by_id(b.id()), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_clone_from_rebuilds_connections() {
        let mut topology = Topology::new();
        topology.set_u32(keys::ENUMERATE_SOURCE_TYPES, 1);
        let a = TopologyNode::new(NodeType::SourceStream);
        let b = TopologyNode::new(NodeType::Output);
        topology.add_node(&a).unwrap();
        topology.add_node(&b).unwrap();
        a.connect_output(0, &b, 0).unwrap();

        let mut copy = Topology::new();
        copy.clone_from(&topology).unwrap();
        assert_eq!(copy.id(), topology.id());
        assert_eq!(copy.get_u32(&keys::ENUMERATE_SOURCE_TYPES).unwrap(), 1);
        assert_eq!(copy.node_count(), 2);

        let copied_source = copy.node_by_id(a.id()).unwrap();
        assert!(!copied_source.ptr_eq(&a));
        let (peer, _) = copied_source.output(0).unwrap();
        assert!(peer.ptr_eq(&copy.node_by_id(b.id()).unwrap()));
        assert!(a.output(0).unwrap().0.ptr_eq(&b));
    }

    #[test]
    fn test_kind_filters() {
        let mut topology = Topology::new();
        for kind in [NodeType::SourceStream, NodeType::Output, NodeType::Tee, NodeType::Output] {
            topology.add_node(&TopologyNode::new(kind)).unwrap();
        }
        assert_eq!(topology.source_nodes().len(), 1);
        assert_eq!(topology.output_nodes().len(), 2);
        topology.clear();
        assert_eq!(topology.node_count(), 0);
    }
}
