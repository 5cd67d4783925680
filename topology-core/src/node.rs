//! Topology nodes
//!
//! A [`TopologyNode`] is a shared handle: clones refer to the same node, so
//! a node added to several topologies shows attribute changes through all of
//! them. Output slots hold strong references to their downstream peers while
//! input slots hold weak back-references, so an acyclic graph is released
//! once its topologies drop it. A connection loop built by the caller keeps
//! its nodes alive until one of its edges is disconnected.
//!
//! Each operation takes at most one node lock at a time. Connecting or
//! disconnecting updates both ends in sequence.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::attributes::{AttributeValue, Attributes, SharedObject};
use crate::guids::{keys, Guid};
use crate::ids::{next_node_id, TopoId};
use crate::media_type::MediaType;
use crate::sink::{SinkActivate, StreamSink};
use crate::source::{MediaSource, PresentationDescriptor, StreamDescriptor};
use crate::transform::Transform;
use crate::{Error, Result};

/// Node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// One stream of a media source
    SourceStream,
    /// A transform
    Transform,
    /// Fan-out of one input to several outputs
    Tee,
    /// A stream sink
    Output,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeType::SourceStream => "source",
            NodeType::Transform => "transform",
            NodeType::Tee => "tee",
            NodeType::Output => "output",
        };
        f.write_str(name)
    }
}

/// Object bound to a node.
#[derive(Clone)]
pub enum NodeObject {
    /// Transform of a transform node
    Transform(Arc<dyn Transform>),
    /// Stream sink of an output node
    StreamSink(Arc<dyn StreamSink>),
    /// Unactivated sink of an output node
    SinkActivate(Arc<dyn SinkActivate>),
    /// Anything else
    Unknown(SharedObject),
}

impl NodeObject {
    /// The transform, if this is one.
    pub fn as_transform(&self) -> Option<Arc<dyn Transform>> {
        match self {
            NodeObject::Transform(t) => Some(Arc::clone(t)),
            _ => None,
        }
    }

    /// The stream sink, if this is one.
    pub fn as_stream_sink(&self) -> Option<Arc<dyn StreamSink>> {
        match self {
            NodeObject::StreamSink(s) => Some(Arc::clone(s)),
            _ => None,
        }
    }

    /// Whether both refer to the same object.
    pub fn ptr_eq(&self, other: &NodeObject) -> bool {
        match (self, other) {
            (NodeObject::Transform(a), NodeObject::Transform(b)) => Arc::ptr_eq(a, b),
            (NodeObject::StreamSink(a), NodeObject::StreamSink(b)) => Arc::ptr_eq(a, b),
            (NodeObject::SinkActivate(a), NodeObject::SinkActivate(b)) => Arc::ptr_eq(a, b),
            (NodeObject::Unknown(a), NodeObject::Unknown(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for NodeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeObject::Transform(t) => write!(f, "Transform({:p})", Arc::as_ptr(t)),
            NodeObject::StreamSink(s) => write!(f, "StreamSink({:p})", Arc::as_ptr(s)),
            NodeObject::SinkActivate(a) => write!(f, "SinkActivate({:p})", Arc::as_ptr(a)),
            NodeObject::Unknown(o) => write!(f, "Unknown({:?})", o),
        }
    }
}

// =============================================================================
// Node state
// =============================================================================

#[derive(Default)]
struct InputSlot {
    peer: Option<(Weak<NodeInner>, u32)>,
    pref: Option<MediaType>,
}

#[derive(Default)]
struct OutputSlot {
    peer: Option<(TopologyNode, u32)>,
    pref: Option<MediaType>,
}

struct NodeState {
    id: TopoId,
    attributes: Attributes,
    object: Option<NodeObject>,
    inputs: Vec<InputSlot>,
    outputs: Vec<OutputSlot>,
}

struct NodeInner {
    kind: NodeType,
    state: RwLock<NodeState>,
}

/// Shared handle to a topology node.
#[derive(Clone)]
pub struct TopologyNode(Arc<NodeInner>);

impl TopologyNode {
    /// Create a node with a fresh id.
    pub fn new(kind: NodeType) -> Self {
        Self(Arc::new(NodeInner {
            kind,
            state: RwLock::new(NodeState {
                id: next_node_id(),
                attributes: Attributes::new(),
                object: None,
                inputs: Vec::new(),
                outputs: Vec::new(),
            }),
        }))
    }

    /// Source node for stream `sd` of `source`, carrying the three
    /// back-reference attributes.
    pub fn source_stream(
        source: Arc<dyn MediaSource>,
        pd: PresentationDescriptor,
        sd: Arc<StreamDescriptor>,
    ) -> Self {
        let node = Self::new(NodeType::SourceStream);
        node.set_unknown(keys::SOURCE, SharedObject::new(source));
        node.set_unknown(keys::PRESENTATION_DESCRIPTOR, SharedObject::new(pd));
        node.set_unknown(keys::STREAM_DESCRIPTOR, SharedObject::from_arc(sd));
        node
    }

    /// Transform node bound to `transform`.
    pub fn transform(transform: Arc<dyn Transform>) -> Self {
        let node = Self::new(NodeType::Transform);
        node.set_object(Some(NodeObject::Transform(transform)));
        node
    }

    /// Output node bound to `sink`.
    pub fn output(sink: Arc<dyn StreamSink>) -> Self {
        let node = Self::new(NodeType::Output);
        node.set_object(Some(NodeObject::StreamSink(sink)));
        node
    }

    /// Node id.
    pub fn id(&self) -> TopoId {
        self.0.state.read().id
    }

    /// Overwrite the node id.
    pub fn set_id(&self, id: TopoId) {
        self.0.state.write().id = id;
    }

    /// Node kind.
    pub fn node_type(&self) -> NodeType {
        self.0.kind
    }

    /// Whether both handles refer to the same node.
    pub fn ptr_eq(&self, other: &TopologyNode) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn is(&self, inner: &Weak<NodeInner>) -> bool {
        std::ptr::eq(Arc::as_ptr(&self.0), inner.as_ptr())
    }

    // -------------------------------------------------------------------------
    // Attributes
    // -------------------------------------------------------------------------

    /// Snapshot of the node attributes.
    pub fn attributes(&self) -> Attributes {
        self.0.state.read().attributes.clone()
    }

    /// Number of attributes.
    pub fn attribute_count(&self) -> usize {
        self.0.state.read().attributes.len()
    }

    /// Set any attribute value.
    pub fn set_item(&self, key: Guid, value: AttributeValue) {
        self.0.state.write().attributes.set(key, value);
    }

    /// Remove an attribute; absent keys are ignored.
    pub fn delete_item(&self, key: &Guid) {
        self.0.state.write().attributes.delete(key);
    }

    /// Set a 32-bit attribute.
    pub fn set_u32(&self, key: Guid, value: u32) {
        self.0.state.write().attributes.set_u32(key, value);
    }

    /// Get a 32-bit attribute.
    pub fn get_u32(&self, key: &Guid) -> Result<u32> {
        self.0.state.read().attributes.get_u32(key)
    }

    /// Set a 64-bit attribute.
    pub fn set_u64(&self, key: Guid, value: u64) {
        self.0.state.write().attributes.set_u64(key, value);
    }

    /// Get a 64-bit attribute.
    pub fn get_u64(&self, key: &Guid) -> Result<u64> {
        self.0.state.read().attributes.get_u64(key)
    }

    /// Set a GUID attribute.
    pub fn set_guid(&self, key: Guid, value: Guid) {
        self.0.state.write().attributes.set_guid(key, value);
    }

    /// Get a GUID attribute.
    pub fn get_guid(&self, key: &Guid) -> Result<Guid> {
        self.0.state.read().attributes.get_guid(key)
    }

    /// Set a string attribute.
    pub fn set_string(&self, key: Guid, value: impl Into<String>) {
        self.0.state.write().attributes.set_string(key, value);
    }

    /// Get a string attribute.
    pub fn get_string(&self, key: &Guid) -> Result<String> {
        self.0.state.read().attributes.get_string(key)
    }

    /// Set an object attribute.
    pub fn set_unknown(&self, key: Guid, value: SharedObject) {
        self.0.state.write().attributes.set_unknown(key, value);
    }

    /// Get an object attribute.
    pub fn get_unknown(&self, key: &Guid) -> Result<SharedObject> {
        self.0.state.read().attributes.get_unknown(key)
    }

    /// Stream descriptor a source node was created for.
    pub fn stream_descriptor(&self) -> Result<Arc<StreamDescriptor>> {
        self.get_unknown(&keys::STREAM_DESCRIPTOR)?
            .downcast::<StreamDescriptor>()
            .ok_or_else(|| Error::NoInterface("stream descriptor".into()))
    }

    // -------------------------------------------------------------------------
    // Bound object
    // -------------------------------------------------------------------------

    /// Bind or clear the node's object.
    pub fn set_object(&self, object: Option<NodeObject>) {
        self.0.state.write().object = object;
    }

    /// Bound object, or [`Error::ObjectNotSet`].
    pub fn object(&self) -> Result<NodeObject> {
        self.0.state.read().object.clone().ok_or(Error::ObjectNotSet)
    }

    /// Bound transform.
    pub fn bound_transform(&self) -> Result<Arc<dyn Transform>> {
        self.object()?
            .as_transform()
            .ok_or_else(|| Error::NoInterface("transform".into()))
    }

    /// Bound stream sink.
    pub fn stream_sink(&self) -> Result<Arc<dyn StreamSink>> {
        self.object()?
            .as_stream_sink()
            .ok_or_else(|| Error::NoInterface("stream sink".into()))
    }

    /// Replace a bound sink activation object by the sink it produces.
    pub fn activate_sink(&self) -> Result<Arc<dyn StreamSink>> {
        match self.object()? {
            NodeObject::SinkActivate(activate) => {
                let sink = activate.activate_stream_sink()?;
                self.set_object(Some(NodeObject::StreamSink(Arc::clone(&sink))));
                Ok(sink)
            }
            NodeObject::StreamSink(sink) => Ok(sink),
            _ => Err(Error::NoInterface("sink activation".into())),
        }
    }

    // -------------------------------------------------------------------------
    // Slots and preferred types
    // -------------------------------------------------------------------------

    /// Number of input slots.
    pub fn input_count(&self) -> u32 {
        self.0.state.read().inputs.len() as u32
    }

    /// Number of output slots.
    pub fn output_count(&self) -> u32 {
        self.0.state.read().outputs.len() as u32
    }

    /// Set the preferred type of input `index`.
    pub fn set_input_pref_type(&self, index: u32, media_type: Option<&MediaType>) -> Result<()> {
        match self.0.kind {
            NodeType::SourceStream => {
                return Err(Error::NotImplemented("source nodes have no inputs".into()))
            }
            NodeType::Tee if index > 0 => {
                return Err(Error::InvalidType(format!("tee input {}", index)))
            }
            _ => {}
        }
        let mut state = self.0.state.write();
        grow(&mut state.inputs, index);
        state.inputs[index as usize].pref = media_type.cloned();
        Ok(())
    }

    /// Preferred type of input `index`.
    pub fn input_pref_type(&self, index: u32) -> Result<MediaType> {
        let state = self.0.state.read();
        let slot = state
            .inputs
            .get(index as usize)
            .ok_or_else(|| Error::InvalidArgument(format!("input {}", index)))?;
        slot.pref
            .clone()
            .ok_or_else(|| Error::NotFound(format!("preferred type of input {}", index)))
    }

    /// Set the preferred type of output `index`.
    pub fn set_output_pref_type(&self, index: u32, media_type: Option<&MediaType>) -> Result<()> {
        if self.0.kind == NodeType::Output {
            return Err(Error::NotImplemented("output nodes have no outputs".into()));
        }
        let mut state = self.0.state.write();
        grow(&mut state.outputs, index);
        state.outputs[index as usize].pref = media_type.cloned();
        Ok(())
    }

    /// Preferred type of output `index`.
    pub fn output_pref_type(&self, index: u32) -> Result<MediaType> {
        let state = self.0.state.read();
        let slot = state
            .outputs
            .get(index as usize)
            .ok_or_else(|| Error::InvalidArgument(format!("output {}", index)))?;
        slot.pref
            .clone()
            .ok_or_else(|| Error::NotFound(format!("preferred type of output {}", index)))
    }

    // -------------------------------------------------------------------------
    // Connections
    // -------------------------------------------------------------------------

    /// Connect output `output_index` to input `input_index` of `downstream`.
    ///
    /// Any previous peer of either slot is disconnected first.
    pub fn connect_output(&self, output_index: u32, downstream: &TopologyNode, input_index: u32) -> Result<()> {
        if self.0.kind == NodeType::Output {
            return Err(Error::InvalidRequest("output nodes cannot connect downstream".into()));
        }
        if downstream.0.kind == NodeType::SourceStream {
            return Err(Error::InvalidRequest("source nodes have no inputs".into()));
        }
        if self.ptr_eq(downstream) {
            return Err(Error::InvalidArgument("node cannot connect to itself".into()));
        }

        // Both slots may already point elsewhere.
        let _ = self.disconnect_output(output_index);
        let previous_upstream = downstream
            .0
            .state
            .read()
            .inputs
            .get(input_index as usize)
            .and_then(|slot| slot.peer.as_ref())
            .and_then(|(weak, index)| weak.upgrade().map(|inner| (TopologyNode(inner), *index)));
        if let Some((upstream, index)) = previous_upstream {
            let _ = upstream.disconnect_output(index);
        }

        {
            let mut state = self.0.state.write();
            grow(&mut state.outputs, output_index);
            state.outputs[output_index as usize].peer = Some((downstream.clone(), input_index));
        }
        let mut state = downstream.0.state.write();
        grow(&mut state.inputs, input_index);
        state.inputs[input_index as usize].peer = Some((Arc::downgrade(&self.0), output_index));
        Ok(())
    }

    /// Disconnect output `index` on both ends.
    pub fn disconnect_output(&self, index: u32) -> Result<()> {
        let (downstream, input_index) = {
            let mut state = self.0.state.write();
            state
                .outputs
                .get_mut(index as usize)
                .and_then(|slot| slot.peer.take())
                .ok_or_else(|| Error::NotFound(format!("output {} is not connected", index)))?
        };
        let mut state = downstream.0.state.write();
        if let Some(slot) = state.inputs.get_mut(input_index as usize) {
            let points_back = slot
                .peer
                .as_ref()
                .map(|(weak, i)| self.is(weak) && *i == index)
                .unwrap_or(false);
            if points_back {
                slot.peer = None;
            }
        }
        Ok(())
    }

    /// Downstream peer of output `index`.
    pub fn output(&self, index: u32) -> Result<(TopologyNode, u32)> {
        let state = self.0.state.read();
        let slot = state
            .outputs
            .get(index as usize)
            .ok_or_else(|| Error::InvalidArgument(format!("output {}", index)))?;
        slot.peer
            .clone()
            .ok_or_else(|| Error::NotFound(format!("output {} is not connected", index)))
    }

    /// Upstream peer of input `index`.
    pub fn input(&self, index: u32) -> Result<(TopologyNode, u32)> {
        let state = self.0.state.read();
        let slot = state
            .inputs
            .get(index as usize)
            .ok_or_else(|| Error::InvalidArgument(format!("input {}", index)))?;
        slot.peer
            .as_ref()
            .and_then(|(weak, i)| weak.upgrade().map(|inner| (TopologyNode(inner), *i)))
            .ok_or_else(|| Error::NotFound(format!("input {} is not connected", index)))
    }

    /// Connected outputs as `(output index, downstream, input index)`.
    pub fn connected_outputs(&self) -> Vec<(u32, TopologyNode, u32)> {
        self.0
            .state
            .read()
            .outputs
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| {
                slot.peer
                    .as_ref()
                    .map(|(node, input)| (i as u32, node.clone(), *input))
            })
            .collect()
    }

    /// Drop every connection of this node, in both directions.
    pub fn disconnect_all(&self) {
        for index in 0..self.output_count() {
            let _ = self.disconnect_output(index);
        }
        for index in 0..self.input_count() {
            if let Ok((upstream, output_index)) = self.input(index) {
                let _ = upstream.disconnect_output(output_index);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Cloning
    // -------------------------------------------------------------------------

    /// Copy attributes, bound object and preferred types from `other`.
    ///
    /// Connections and the id are left alone.
    pub fn clone_from(&self, other: &TopologyNode) -> Result<()> {
        if self.0.kind != other.0.kind {
            return Err(Error::InvalidRequest(format!(
                "cannot clone a {} node into a {} node",
                other.0.kind, self.0.kind
            )));
        }
        if self.ptr_eq(other) {
            return Ok(());
        }
        let (attributes, object, inputs, outputs) = {
            let source = other.0.state.read();
            (
                source.attributes.clone(),
                source.object.clone(),
                source.inputs.iter().map(|s| s.pref.clone()).collect::<Vec<_>>(),
                source.outputs.iter().map(|s| s.pref.clone()).collect::<Vec<_>>(),
            )
        };

        let mut state = self.0.state.write();
        state.attributes = attributes;
        state.object = object;
        for (i, pref) in inputs.into_iter().enumerate() {
            grow(&mut state.inputs, i as u32);
            state.inputs[i].pref = pref;
        }
        for (i, pref) in outputs.into_iter().enumerate() {
            grow(&mut state.outputs, i as u32);
            state.outputs[i].pref = pref;
        }
        Ok(())
    }
}

fn grow<T: Default>(slots: &mut Vec<T>, index: u32) {
    let needed = index as usize + 1;
    if slots.len() < needed {
        slots.resize_with(needed, T::default);
    }
}

impl fmt::Debug for TopologyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.state.read();
        f.debug_struct("TopologyNode")
            .field("id", &format_args!("{:#x}", state.id))
            .field("kind", &self.0.kind)
            .field("inputs", &state.inputs.len())
            .field("outputs", &state.outputs.len())
            .field("object", &state.object)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guids::subtypes;

    #[test]
    fn test_connection_is_symmetric() {
        let a = TopologyNode::new(NodeType::Transform);
        let b = TopologyNode::new(NodeType::Output);

        a.connect_output(1, &b, 0).unwrap();
        assert_eq!(a.output_count(), 2);
        assert_eq!(b.input_count(), 1);

        let (peer, index) = a.output(1).unwrap();
        assert!(peer.ptr_eq(&b));
        assert_eq!(index, 0);
        let (peer, index) = b.input(0).unwrap();
        assert!(peer.ptr_eq(&a));
        assert_eq!(index, 1);

        a.disconnect_output(1).unwrap();
        assert!(matches!(a.output(1), Err(Error::NotFound(_))));
        assert!(matches!(b.input(0), Err(Error::NotFound(_))));
        assert!(matches!(a.disconnect_output(1), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_reconnect_replaces_previous_peer() {
        let a = TopologyNode::new(NodeType::Transform);
        let b = TopologyNode::new(NodeType::Transform);
        let sink = TopologyNode::new(NodeType::Output);

        a.connect_output(0, &sink, 0).unwrap();
        b.connect_output(0, &sink, 0).unwrap();

        assert!(a.output(0).is_err());
        assert!(sink.input(0).unwrap().0.ptr_eq(&b));
    }

    #[test]
    fn test_connection_rules_by_kind() {
        let source = TopologyNode::new(NodeType::SourceStream);
        let output = TopologyNode::new(NodeType::Output);
        let tee = TopologyNode::new(NodeType::Tee);

        assert!(matches!(output.connect_output(0, &tee, 0), Err(Error::InvalidRequest(_))));
        assert!(matches!(tee.connect_output(0, &source, 0), Err(Error::InvalidRequest(_))));
        assert!(matches!(tee.connect_output(0, &tee, 0), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_preferred_types_by_kind() {
        let mt = MediaType::video(subtypes::NV12);

        let source = TopologyNode::new(NodeType::SourceStream);
        assert!(matches!(source.set_input_pref_type(0, Some(&mt)), Err(Error::NotImplemented(_))));
        source.set_output_pref_type(0, Some(&mt)).unwrap();

        let output = TopologyNode::new(NodeType::Output);
        assert!(matches!(output.set_output_pref_type(0, Some(&mt)), Err(Error::NotImplemented(_))));

        let tee = TopologyNode::new(NodeType::Tee);
        assert!(matches!(tee.set_input_pref_type(1, Some(&mt)), Err(Error::InvalidType(_))));
        tee.set_input_pref_type(0, Some(&mt)).unwrap();
        assert!(matches!(tee.output_pref_type(0), Err(Error::InvalidArgument(_))));
        tee.set_output_pref_type(2, Some(&MediaType::video(subtypes::RGB32))).unwrap();
        assert_eq!(tee.input_pref_type(0).unwrap(), mt);
        assert!(matches!(tee.output_pref_type(1), Err(Error::NotFound(_))));
        assert_ne!(tee.output_pref_type(2).unwrap(), mt);
    }

    #[test]
    fn test_clone_from_copies_everything_but_connections() {
        let a = TopologyNode::new(NodeType::Transform);
        let b = TopologyNode::new(NodeType::Output);
        a.connect_output(0, &b, 0).unwrap();
        a.set_u32(keys::DECODER, 1);
        a.set_output_pref_type(0, Some(&MediaType::audio(subtypes::PCM))).unwrap();

        let copy = TopologyNode::new(NodeType::Transform);
        copy.clone_from(&a).unwrap();
        assert_eq!(copy.get_u32(&keys::DECODER).unwrap(), 1);
        assert!(copy.output_pref_type(0).is_ok());
        assert!(copy.output(0).is_err());
        assert_ne!(copy.id(), a.id());

        let wrong = TopologyNode::new(NodeType::Tee);
        assert!(matches!(wrong.clone_from(&a), Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn test_inputs_do_not_keep_upstream_alive() {
        let b = TopologyNode::new(NodeType::Output);
        {
            let a = TopologyNode::new(NodeType::Transform);
            a.connect_output(0, &b, 0).unwrap();
        }
        assert!(b.input(0).is_err());
    }

    #[test]
    fn test_object_not_set() {
        let node = TopologyNode::new(NodeType::Transform);
        assert!(matches!(node.object(), Err(Error::ObjectNotSet)));
        assert!(node.bound_transform().is_err());
    }
}
