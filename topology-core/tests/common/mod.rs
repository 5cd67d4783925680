//! Shared builders for the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use topoload_core::device_manager::{DeviceApi, DeviceManager};
use topoload_core::guids::{keys, subtypes};
use topoload_core::handler::StreamTypeHandler;
use topoload_core::sink::SimpleStreamSink;
use topoload_core::source::{PresentationDescriptor, StaticMediaSource, StreamDescriptor};
use topoload_core::{MediaType, Topology, TopologyNode};

/// Source stream node; the handler is returned so tests can inspect it.
pub fn source(types: Vec<MediaType>, current: Option<MediaType>) -> (TopologyNode, Arc<StreamTypeHandler>) {
    let mut handler = StreamTypeHandler::new(types);
    if let Some(current) = current {
        handler = handler.with_current(current);
    }
    let handler = Arc::new(handler);
    let sd = Arc::new(StreamDescriptor::new(0, handler.clone()));
    let pd = PresentationDescriptor::new(vec![sd.clone()]);
    let media_source = Arc::new(StaticMediaSource::new(pd.clone()));
    (TopologyNode::source_stream(media_source, pd, sd), handler)
}

/// Source whose only type is current.
pub fn source_of(media_type: MediaType) -> (TopologyNode, Arc<StreamTypeHandler>) {
    source(vec![media_type.clone()], Some(media_type))
}

/// Output node over a plain sink.
pub fn sink(types: Vec<MediaType>, current: Option<MediaType>) -> (TopologyNode, Arc<StreamTypeHandler>) {
    let (sink, handler) = sink_object(types, current);
    (TopologyNode::output(Arc::new(sink)), handler)
}

/// Output node whose only type is current.
pub fn sink_of(media_type: MediaType) -> (TopologyNode, Arc<StreamTypeHandler>) {
    sink(vec![media_type.clone()], Some(media_type))
}

/// Sink object, for tests that add device awareness.
pub fn sink_object(types: Vec<MediaType>, current: Option<MediaType>) -> (SimpleStreamSink, Arc<StreamTypeHandler>) {
    let mut handler = StreamTypeHandler::new(types);
    if let Some(current) = current {
        handler = handler.with_current(current);
    }
    let handler = Arc::new(handler);
    (SimpleStreamSink::new(1, handler.clone()), handler)
}

/// Video sink aware of `api`, offering a device manager for it.
pub fn device_sink(media_type: MediaType, api: DeviceApi) -> TopologyNode {
    let (sink, _) = sink_object(vec![media_type], None);
    let sink = sink.with_device_manager(DeviceManager::new(api).token());
    let sink = match api {
        DeviceApi::Direct3D9 => sink.d3d_aware(),
        DeviceApi::Dxgi => sink.d3d11_aware(),
    };
    TopologyNode::output(Arc::new(sink))
}

/// Add `nodes` to a new topology and connect them in a chain.
pub fn chain(nodes: &[&TopologyNode]) -> Topology {
    let mut topology = Topology::new();
    for node in nodes {
        topology.add_node(node).unwrap();
    }
    for pair in nodes.windows(2) {
        pair[0].connect_output(0, pair[1], 0).unwrap();
    }
    topology
}

/// MP3 with the rate and channel count the decoder needs.
pub fn mp3(sample_rate: u32, channels: u32) -> MediaType {
    MediaType::audio(subtypes::MP3)
        .with_u32(keys::AUDIO_SAMPLES_PER_SECOND, sample_rate)
        .with_u32(keys::AUDIO_NUM_CHANNELS, channels)
}

/// H.264 with a frame size.
pub fn h264(width: u32, height: u32) -> MediaType {
    MediaType::video_frame(subtypes::H264, width, height)
}

/// Classes of the inserted nodes, in insertion order.
pub fn inserted_classes(report: &topoload_core::ResolutionReport) -> Vec<&str> {
    report.inserted_nodes.iter().map(|n| n.class.as_str()).collect()
}
