//! Graph API integration tests

mod common;

use std::sync::Arc;

use common::{chain, sink_of, source_of};
use topoload_core::guids::keys;
use topoload_core::transforms::StaticTransform;
use topoload_core::{MediaType, NodeType, Topology, TopologyNode};

#[test]
fn test_clone_keeps_ids_connections_and_objects() {
    let pcm = MediaType::audio_pcm(44100, 2, 16);
    let (src, _) = source_of(pcm.clone());
    let transform = TopologyNode::transform(Arc::new(StaticTransform::new(vec![pcm.clone()], vec![pcm.clone()])));
    let (out, _) = sink_of(pcm);
    let mut original = chain(&[&src, &transform, &out]);
    original.set_u32(keys::ENUMERATE_SOURCE_TYPES, 1);

    let mut copy = Topology::new();
    copy.clone_from(&original).unwrap();
    assert_eq!(copy.id(), original.id());
    assert_eq!(copy.node_count(), 3);
    assert_eq!(copy.get_u32(&keys::ENUMERATE_SOURCE_TYPES).unwrap(), 1);

    let copied = copy.node_by_id(transform.id()).unwrap();
    assert!(!copied.ptr_eq(&transform));
    assert!(copied.object().unwrap().ptr_eq(&transform.object().unwrap()));

    let (upstream, _) = copied.input(0).unwrap();
    assert_eq!(upstream.id(), src.id());
    assert!(!upstream.ptr_eq(&src));
    let (downstream, _) = copied.output(0).unwrap();
    assert!(downstream.ptr_eq(&copy.node_by_id(out.id()).unwrap()));

    // The original graph is untouched by edits to the copy.
    copied.disconnect_output(0).unwrap();
    assert_eq!(transform.output(0).unwrap().0.id(), out.id());
}

#[test]
fn test_reconnecting_an_input_replaces_its_peer() {
    let pcm = MediaType::audio_pcm(44100, 2, 16);
    let (first, _) = source_of(pcm.clone());
    let (second, _) = source_of(pcm.clone());
    let (out, _) = sink_of(pcm);

    first.connect_output(0, &out, 0).unwrap();
    second.connect_output(0, &out, 0).unwrap();

    assert!(first.output(0).is_err());
    assert!(out.input(0).unwrap().0.ptr_eq(&second));
}

#[test]
fn test_remove_node_keeps_the_handle_alive() {
    let pcm = MediaType::audio_pcm(44100, 2, 16);
    let (src, _) = source_of(pcm.clone());
    let tee = TopologyNode::new(NodeType::Tee);
    let (out, _) = sink_of(pcm);
    let mut topology = chain(&[&src, &tee, &out]);

    topology.remove_node(&tee).unwrap();
    assert_eq!(topology.node_count(), 2);
    assert!(src.output(0).is_err());
    assert!(out.input(0).is_err());
    assert_eq!(tee.node_type(), NodeType::Tee);
    assert!(topology.node_by_id(tee.id()).is_err());
}

#[test]
fn test_source_and_output_lists() {
    let pcm = MediaType::audio_pcm(44100, 2, 16);
    let (src, _) = source_of(pcm.clone());
    let (a, _) = sink_of(pcm.clone());
    let (b, _) = sink_of(pcm);
    let tee = TopologyNode::new(NodeType::Tee);
    let mut topology = chain(&[&src, &tee, &a]);
    topology.add_node(&b).unwrap();
    tee.connect_output(1, &b, 0).unwrap();

    assert_eq!(topology.source_nodes().len(), 1);
    let outputs: Vec<_> = topology.output_nodes().iter().map(|n| n.id()).collect();
    assert_eq!(outputs, vec![a.id(), b.id()]);
    assert_eq!(tee.connected_outputs().len(), 2);
    assert!(src.stream_descriptor().is_ok());
}

#[test]
fn test_connection_loop_lives_until_an_edge_is_cut() {
    let pcm = MediaType::audio_pcm(44100, 2, 16);
    let first_transform = Arc::new(StaticTransform::new(vec![pcm.clone()], vec![pcm.clone()]));
    let second_transform = Arc::new(StaticTransform::new(vec![pcm.clone()], vec![pcm]));
    let first = TopologyNode::transform(first_transform.clone());
    let second = TopologyNode::transform(second_transform.clone());
    first.connect_output(0, &second, 0).unwrap();
    second.connect_output(0, &first, 0).unwrap();

    drop(second);
    assert_eq!(Arc::strong_count(&second_transform), 2);

    first.disconnect_output(0).unwrap();
    assert_eq!(Arc::strong_count(&second_transform), 1);

    drop(first);
    assert_eq!(Arc::strong_count(&first_transform), 1);
}
