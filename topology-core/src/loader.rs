//! Topology loader: turns a partial topology into a fully resolved one
//!
//! # Resolution
//!
//! 1. Structural checks on the input (sources, sinks, bound objects)
//! 2. Copy of the input into a new topology with the same id
//! 3. Edge negotiation, breadth-first from the source outputs
//! 4. Copier or device manager pass, depending on the DXVA mode
//! 5. Bookkeeping attributes on the resolved topology
//!
//! The input topology is never modified. Bound objects (transforms, sinks,
//! stream handlers) are shared between the input and the result, so their
//! negotiated types are visible through both.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use crate::config::LoaderConfig;
use crate::device_manager::{insert_sample_copiers, propagate_device_managers, DxvaMode};
use crate::error::ResolutionStatus;
use crate::guids::keys;
use crate::ids::TopoId;
use crate::negotiation::{resolve_edge, EdgeContext};
use crate::node::{NodeObject, NodeType, TopologyNode};
use crate::registry::{SystemTransformRegistry, TransformRegistry};
use crate::report::ResolutionReport;
use crate::topology::Topology;
use crate::{Error, Result};

/// Resolves partial topologies.
pub struct TopologyLoader {
    registry: Arc<dyn TransformRegistry>,
    config: LoaderConfig,
}

impl Default for TopologyLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TopologyLoader {
    /// Loader over the built-in transforms with the default configuration.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(SystemTransformRegistry::new()),
            config: LoaderConfig::default(),
        }
    }

    /// Use `registry` for transform insertion and instantiation.
    pub fn with_registry(mut self, registry: Arc<dyn TransformRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Use `config`.
    pub fn with_config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Resolve `input` into a new topology with the same id.
    pub fn load(&self, input: &Topology) -> Result<Topology> {
        self.load_with_report(input).map(|(topology, _)| topology)
    }

    /// Resolve `input` and describe the result.
    pub fn load_with_report(&self, input: &Topology) -> Result<(Topology, ResolutionReport)> {
        tracing::info!(
            topology = input.id(),
            nodes = input.node_count(),
            "Resolving topology"
        );

        match self.resolve(input) {
            Ok(resolved) => {
                tracing::info!(
                    topology = resolved.0.id(),
                    nodes = resolved.0.node_count(),
                    inserted = resolved.1.conversion_count(),
                    "Topology resolved"
                );
                Ok(resolved)
            }
            Err(e) => {
                tracing::warn!(
                    topology = input.id(),
                    status = ?e.status(),
                    error = %e,
                    "Topology resolution failed"
                );
                Err(e)
            }
        }
    }

    fn resolve(&self, input: &Topology) -> Result<(Topology, ResolutionReport)> {
        check_structure(input)?;

        let mut resolved = Topology::default();
        resolved.clone_from(input)?;
        self.bind_transforms(&resolved)?;

        let ctx = EdgeContext {
            registry: self.registry.as_ref(),
            enumerate_source_types: resolved.attributes().flag(&keys::ENUMERATE_SOURCE_TYPES),
            enable_xvp: self.config.enable_video_processor
                || resolved.attributes().flag(&keys::ENABLE_XVP_FOR_PLAYBACK),
            default_method: self.config.default_connect_method,
        };
        let mut inserted = negotiate_branches(&mut resolved, &ctx)?;

        let dxva_mode = match self.config.dxva_mode {
            Some(mode) => mode,
            None => DxvaMode::from_attributes(resolved.attributes())?,
        };
        let mut deliveries = Vec::new();
        match dxva_mode {
            DxvaMode::Default if self.config.insert_sample_copiers => {
                inserted.extend(insert_sample_copiers(&mut resolved)?);
            }
            DxvaMode::Full => deliveries = propagate_device_managers(&resolved)?,
            _ => {}
        }

        finish(&mut resolved)?;
        let report = ResolutionReport::build(&resolved, dxva_mode, &inserted, deliveries);
        Ok((resolved, report))
    }

    /// Give unbound transform nodes an instance of their declared class.
    fn bind_transforms(&self, topology: &Topology) -> Result<()> {
        for node in topology.nodes() {
            if node.node_type() != NodeType::Transform || node.object().is_ok() {
                continue;
            }
            let class_id = node.get_guid(&keys::TRANSFORM_OBJECTID).map_err(|_| {
                Error::UnsupportedTopology(format!("transform node {:#x} has no transform", node.id()))
            })?;
            let transform = self.registry.create(&class_id).map_err(|e| {
                Error::UnsupportedTopology(format!("transform node {:#x}: {}", node.id(), e))
            })?;
            tracing::debug!(
                node = format_args!("{:#x}", node.id()),
                class = %crate::guids::display_name(&class_id),
                "Instantiated transform"
            );
            node.set_object(Some(NodeObject::Transform(transform)));
        }
        Ok(())
    }
}

// =============================================================================
// Stages
// =============================================================================

fn is_connected_output(node: &TopologyNode) -> bool {
    (0..node.input_count()).any(|i| node.input(i).is_ok())
}

/// Reject topologies that cannot be resolved before negotiating anything.
fn check_structure(topology: &Topology) -> Result<()> {
    if topology.node_count() == 0 {
        return Err(Error::UnsupportedTopology("topology has no nodes".into()));
    }
    let sources = topology.source_nodes();
    if sources.is_empty() {
        return Err(Error::UnsupportedTopology("topology has no source node".into()));
    }
    if sources.iter().all(|s| s.connected_outputs().is_empty()) {
        return Err(Error::UnsupportedTopology("no source node is connected".into()));
    }
    if topology.output_nodes().is_empty() {
        return Err(Error::UnsupportedTopology("topology has no sink".into()));
    }

    for node in topology.nodes() {
        match node.node_type() {
            NodeType::SourceStream => {
                if node.stream_descriptor().is_err() {
                    return Err(Error::UnsupportedTopology(format!(
                        "source node {:#x} has no stream descriptor",
                        node.id()
                    )));
                }
            }
            NodeType::Output if is_connected_output(node) => match node.object() {
                Ok(NodeObject::StreamSink(_)) => {}
                Ok(NodeObject::SinkActivate(_)) => {
                    return Err(Error::SinkActivatesUnsupported(node.id()));
                }
                Ok(_) | Err(_) => {
                    return Err(Error::UnsupportedTopology(format!(
                        "output node {:#x} has no stream sink",
                        node.id()
                    )));
                }
            },
            _ => {}
        }
    }
    Ok(())
}

/// Resolve every edge reachable from the sources, upstream first.
fn negotiate_branches(
    topology: &mut Topology,
    ctx: &EdgeContext<'_>,
) -> Result<Vec<crate::insertion::InsertedTransform>> {
    let mut queue = VecDeque::new();
    let mut queued: HashSet<TopoId> = HashSet::new();
    for source in topology.source_nodes() {
        queued.insert(source.id());
        for (output, downstream, input) in source.connected_outputs() {
            queue.push_back((source.clone(), output, downstream, input));
        }
    }

    let mut inserted = Vec::new();
    while let Some((upstream, output, downstream, input)) = queue.pop_front() {
        let edge = resolve_edge(topology, ctx, &upstream, output, &downstream, input)?;
        inserted.extend(edge.inserted);

        let fans_out = matches!(downstream.node_type(), NodeType::Transform | NodeType::Tee);
        if fans_out && queued.insert(downstream.id()) {
            for (next_output, next, next_input) in downstream.connected_outputs() {
                queue.push_back((downstream.clone(), next_output, next, next_input));
            }
        }
    }
    Ok(inserted)
}

/// Bookkeeping attributes of a resolved topology.
fn finish(topology: &mut Topology) -> Result<()> {
    for node in topology.nodes() {
        match node.node_type() {
            NodeType::SourceStream => {
                if node.get_u64(&keys::MEDIASTART).is_err() {
                    node.set_u64(keys::MEDIASTART, 0);
                }
            }
            NodeType::Output => {
                if let Ok(sink) = node.stream_sink() {
                    node.set_u32(keys::STREAMID, sink.identifier()?);
                }
            }
            _ => {}
        }
    }
    topology.set_u32(keys::RESOLUTION_STATUS, ResolutionStatus::Succeeded.as_u32());
    Ok(())
}
