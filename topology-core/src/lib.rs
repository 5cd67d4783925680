//! Topoload Core - media topology graph and resolution engine
//!
//! A partial topology connects source streams to sinks, possibly through
//! transforms and tees, without saying which media types flow on each
//! connection. The [`TopologyLoader`] turns it into a fully resolved one:
//!
//! - negotiates a media type for every connection
//! - inserts decoders and converters where the ends cannot agree directly
//! - inserts sample copiers or hands device managers to aware transforms,
//!   depending on the topology's DXVA mode
//!
//! # Architecture
//!
//! - [`topology`], [`node`]: the graph and its nodes
//! - [`negotiation`]: per-edge media type negotiation
//! - [`insertion`]: decoder/converter chains from the [`registry`]
//! - [`device_manager`]: copier and device manager passes
//! - [`loader`]: the resolution driver
//! - [`manifest`], [`config`]: YAML/JSON topology descriptions and loader settings
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use topoload_core::guids::subtypes;
//! use topoload_core::handler::StreamTypeHandler;
//! use topoload_core::media_type::MediaType;
//! use topoload_core::sink::SimpleStreamSink;
//! use topoload_core::source::{PresentationDescriptor, StaticMediaSource, StreamDescriptor};
//! use topoload_core::{Topology, TopologyLoader, TopologyNode};
//!
//! let pcm = MediaType::audio_pcm(44100, 2, 16);
//! let handler = StreamTypeHandler::new(vec![pcm.clone()]).with_current(pcm.clone());
//! let sd = Arc::new(StreamDescriptor::new(0, Arc::new(handler)));
//! let pd = PresentationDescriptor::new(vec![sd.clone()]);
//! let source = TopologyNode::source_stream(Arc::new(StaticMediaSource::new(pd.clone())), pd, sd);
//!
//! let sink_handler = StreamTypeHandler::new(vec![pcm.clone()]);
//! let sink = TopologyNode::output(Arc::new(SimpleStreamSink::new(0, Arc::new(sink_handler))));
//!
//! let mut topology = Topology::new();
//! topology.add_node(&source).unwrap();
//! topology.add_node(&sink).unwrap();
//! source.connect_output(0, &sink, 0).unwrap();
//!
//! let resolved = TopologyLoader::new().load(&topology).unwrap();
//! assert_eq!(resolved.id(), topology.id());
//! assert_eq!(resolved.node_count(), 2);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attributes;
pub mod config;
pub mod device_manager;
pub mod error;
pub mod guids;
pub mod handler;
pub mod ids;
pub mod insertion;
pub mod loader;
pub mod manifest;
pub mod media_type;
pub mod negotiation;
pub mod node;
pub mod registry;
pub mod report;
pub mod sink;
pub mod source;
pub mod topology;
pub mod transform;
pub mod transforms;

pub use config::LoaderConfig;
pub use device_manager::{DeviceApi, DxvaMode};
pub use error::{Error, ResolutionStatus, Result};
pub use ids::TopoId;
pub use loader::TopologyLoader;
pub use manifest::Manifest;
pub use media_type::MediaType;
pub use negotiation::ConnectMethod;
pub use node::{NodeType, TopologyNode};
pub use report::ResolutionReport;
pub use topology::Topology;

/// Initialize logging for topoload
///
/// Installs a fmt subscriber filtered by `RUST_LOG` (default `info`).
/// Call once at startup.
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| Error::InvalidConfig(format!("logging already initialized: {}", e)))?;

    tracing::info!("Topoload core initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init() {
        // Should not panic
        init().ok();
    }
}
