//! Media type negotiation across one topology edge
//!
//! An edge joins an upstream output slot (source stream, transform or tee)
//! to a downstream input slot (output, transform or tee). Negotiation walks
//! the stages the downstream node's connect method allows:
//!
//! 1. **Direct**: the downstream's current type is tried first among the
//!    upstream candidates, then the first candidate the downstream accepts.
//! 2. **Converter**: a raw-to-raw transform is spliced in.
//! 3. **Decoder**: a decoder is spliced in, followed by a converter when the
//!    decoder alone cannot reach the downstream.
//!
//! The winning type is committed on both ends.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::guids::keys;
use crate::handler::{enumerate_types, handler_types, MediaTypeHandler};
use crate::insertion::{self, InsertedTransform};
use crate::media_type::MediaType;
use crate::node::{NodeType, TopologyNode};
use crate::registry::TransformRegistry;
use crate::topology::Topology;
use crate::transform::{SetTypeFlags, Transform};
use crate::{Error, Result};

// =============================================================================
// Connect method
// =============================================================================

bitflags! {
    /// Per-node connection policy, stored in the `CONNECT_METHOD` attribute.
    ///
    /// `ALLOW_DECODER` includes the converter bit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ConnectMethod: u32 {
        /// A converter may be inserted
        const ALLOW_CONVERTER = 0x1;
        /// A decoder (and converter) may be inserted
        const ALLOW_DECODER = 0x3;
        /// Try every policy level per source type before moving on
        const RESOLVE_INDEPENDENT_OUTPUTTYPES = 0x4;
        /// Branch may be dropped when it fails
        const AS_OPTIONAL = 0x100;
        /// Branch and its downstream may be dropped when it fails
        const AS_OPTIONAL_BRANCH = 0x200;
    }
}

impl ConnectMethod {
    /// No intermediate transforms.
    pub const DIRECT: Self = Self::empty();

    const NAMES: [(&'static str, ConnectMethod); 5] = [
        ("allow_decoder", ConnectMethod::ALLOW_DECODER),
        ("allow_converter", ConnectMethod::ALLOW_CONVERTER),
        ("resolve_independent_output_types", ConnectMethod::RESOLVE_INDEPENDENT_OUTPUTTYPES),
        ("as_optional", ConnectMethod::AS_OPTIONAL),
        ("as_optional_branch", ConnectMethod::AS_OPTIONAL_BRANCH),
    ];

    /// Parse `direct`, flag names joined by `|`, or a decimal/hex number.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if let Some(hex) = text.strip_prefix("0x") {
            return u32::from_str_radix(hex, 16)
                .map(Self::from_bits_retain)
                .map_err(|e| Error::InvalidConfig(format!("connect method '{}': {}", text, e)));
        }
        if let Ok(bits) = text.parse::<u32>() {
            return Ok(Self::from_bits_retain(bits));
        }

        let mut method = Self::DIRECT;
        for part in text.split('|').map(str::trim) {
            let part = part.to_ascii_lowercase();
            if part == "direct" {
                continue;
            }
            let flag = Self::NAMES
                .iter()
                .find(|(name, _)| *name == part)
                .map(|(_, flag)| *flag)
                .ok_or_else(|| Error::InvalidConfig(format!("unknown connect method '{}'", part)))?;
            method |= flag;
        }
        Ok(method)
    }

    /// Method stored on `node`, if any.
    pub fn from_node(node: &TopologyNode) -> Option<Self> {
        node.get_u32(&keys::CONNECT_METHOD)
            .ok()
            .map(Self::from_bits_retain)
    }

    /// Stages this method allows, in attempt order.
    pub fn stages(self) -> Vec<ConnectStage> {
        let mut stages = vec![ConnectStage::Direct];
        if self.contains(Self::ALLOW_CONVERTER) {
            stages.push(ConnectStage::Converter);
        }
        if self.contains(Self::ALLOW_DECODER) {
            stages.push(ConnectStage::Decoder);
        }
        stages
    }
}

impl fmt::Display for ConnectMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::ALLOW_DECODER) {
            names.push("allow_decoder");
        } else if self.contains(Self::ALLOW_CONVERTER) {
            names.push("allow_converter");
        }
        for (name, flag) in &Self::NAMES[2..] {
            if self.contains(*flag) {
                names.push(name);
            }
        }
        if names.is_empty() {
            f.write_str("direct")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

/// One level of the connection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectStage {
    /// Same type on both ends
    Direct,
    /// Raw-to-raw transform in between
    Converter,
    /// Decoder, possibly followed by a converter, in between
    Decoder,
}

// =============================================================================
// Edge context and endpoints
// =============================================================================

/// Settings shared by every edge of one resolution.
#[derive(Clone, Copy)]
pub(crate) struct EdgeContext<'a> {
    pub registry: &'a dyn TransformRegistry,
    pub enumerate_source_types: bool,
    pub enable_xvp: bool,
    pub default_method: ConnectMethod,
}

enum UpstreamKind {
    Source(Arc<dyn MediaTypeHandler>),
    Transform(Arc<dyn Transform>),
    Tee,
}

/// Upstream end of an edge.
pub(crate) struct Upstream {
    pub node: TopologyNode,
    pub output: u32,
    kind: UpstreamKind,
}

impl Upstream {
    fn new(node: &TopologyNode, output: u32) -> Result<Self> {
        let kind = match node.node_type() {
            NodeType::SourceStream => UpstreamKind::Source(node.stream_descriptor()?.media_type_handler()),
            NodeType::Transform => UpstreamKind::Transform(node.bound_transform()?),
            NodeType::Tee => UpstreamKind::Tee,
            NodeType::Output => {
                return Err(Error::InvalidRequest("output nodes have no outputs".into()));
            }
        };
        Ok(Self {
            node: node.clone(),
            output,
            kind,
        })
    }

    /// Candidate types, and whether they came from an enumeration.
    fn candidates(&self, ctx: &EdgeContext<'_>) -> (Vec<MediaType>, bool) {
        match &self.kind {
            UpstreamKind::Source(handler) => {
                if !ctx.enumerate_source_types {
                    if let Ok(current) = handler.current_media_type() {
                        return (vec![current], false);
                    }
                }
                (handler_types(handler.as_ref()), ctx.enumerate_source_types)
            }
            UpstreamKind::Transform(transform) => match transform.output_current_type(self.output) {
                Ok(current) => (vec![current], false),
                Err(_) => (
                    enumerate_types(|i| transform.output_available_type(self.output, i)).collect(),
                    true,
                ),
            },
            UpstreamKind::Tee => (self.node.input_pref_type(0).into_iter().collect(), false),
        }
    }

    /// Whether source types are resolved type by type.
    fn independent_types(&self) -> bool {
        matches!(self.kind, UpstreamKind::Source(_))
            && ConnectMethod::from_node(&self.node)
                .map(|m| m.contains(ConnectMethod::RESOLVE_INDEPENDENT_OUTPUTTYPES))
                .unwrap_or(false)
    }

    /// Type this end currently produces.
    fn current_type(&self) -> Option<MediaType> {
        match &self.kind {
            UpstreamKind::Source(handler) => handler.current_media_type().ok(),
            UpstreamKind::Transform(transform) => transform.output_current_type(self.output).ok(),
            UpstreamKind::Tee => None,
        }
    }

    /// Check `media_type` without committing it.
    fn accepts(&self, media_type: &MediaType) -> Result<()> {
        match &self.kind {
            UpstreamKind::Transform(transform) => {
                if transform.output_current_type(self.output).ok().as_ref() == Some(media_type) {
                    return Ok(());
                }
                transform.set_output_type(self.output, Some(media_type), SetTypeFlags::TEST_ONLY)
            }
            UpstreamKind::Source(_) | UpstreamKind::Tee => Ok(()),
        }
    }

    /// Put back the type this end produced before a failed commit.
    fn restore(&self, previous: Option<&MediaType>) -> Result<()> {
        match (&self.kind, previous) {
            (UpstreamKind::Source(handler), Some(media_type)) => handler.set_current_media_type(media_type),
            (UpstreamKind::Source(handler), None) => handler.clear_current_media_type(),
            (UpstreamKind::Transform(transform), previous) => {
                transform.set_output_type(self.output, previous, SetTypeFlags::empty())
            }
            (UpstreamKind::Tee, _) => Ok(()),
        }
    }

    /// Make `media_type` the type this end produces.
    pub fn commit(&self, media_type: &MediaType) -> Result<()> {
        match &self.kind {
            UpstreamKind::Source(handler) => handler.set_current_media_type(media_type),
            UpstreamKind::Transform(transform) => {
                if transform.output_current_type(self.output).ok().as_ref() == Some(media_type) {
                    return Ok(());
                }
                transform.set_output_type(self.output, Some(media_type), SetTypeFlags::empty())
            }
            UpstreamKind::Tee => Ok(()),
        }
    }
}

enum DownstreamKind {
    Sink(Arc<dyn MediaTypeHandler>),
    Transform(Arc<dyn Transform>),
    Tee,
}

/// Downstream end of an edge.
pub(crate) struct Downstream {
    pub node: TopologyNode,
    pub input: u32,
    kind: DownstreamKind,
}

impl Downstream {
    fn new(node: &TopologyNode, input: u32) -> Result<Self> {
        let kind = match node.node_type() {
            NodeType::Output => DownstreamKind::Sink(node.stream_sink()?.media_type_handler()?),
            NodeType::Transform => DownstreamKind::Transform(node.bound_transform()?),
            NodeType::Tee => DownstreamKind::Tee,
            NodeType::SourceStream => {
                return Err(Error::InvalidRequest("source nodes have no inputs".into()));
            }
        };
        Ok(Self {
            node: node.clone(),
            input,
            kind,
        })
    }

    /// Type already selected on this end.
    pub fn current_type(&self) -> Option<MediaType> {
        match &self.kind {
            DownstreamKind::Sink(handler) => handler.current_media_type().ok(),
            DownstreamKind::Transform(transform) => transform.input_current_type(self.input).ok(),
            DownstreamKind::Tee => self.node.input_pref_type(0).ok(),
        }
    }

    /// Types this end is known to want: the current type, else whatever it
    /// enumerates. Empty when neither exists.
    pub fn target_types(&self) -> Vec<MediaType> {
        if let Some(current) = self.current_type() {
            return vec![current];
        }
        match &self.kind {
            DownstreamKind::Sink(handler) => handler_types(handler.as_ref()),
            DownstreamKind::Transform(transform) => {
                enumerate_types(|i| transform.input_available_type(self.input, i)).collect()
            }
            DownstreamKind::Tee => Vec::new(),
        }
    }

    /// Check `media_type` without committing it.
    pub fn accepts(&self, media_type: &MediaType) -> Result<()> {
        match &self.kind {
            DownstreamKind::Sink(handler) => handler.is_media_type_supported(media_type),
            DownstreamKind::Transform(transform) => {
                transform.set_input_type(self.input, Some(media_type), SetTypeFlags::TEST_ONLY)
            }
            DownstreamKind::Tee => Ok(()),
        }
    }

    /// Make `media_type` the type this end consumes.
    pub fn commit(&self, media_type: &MediaType) -> Result<()> {
        match &self.kind {
            DownstreamKind::Sink(handler) => {
                handler.set_current_media_type(media_type)?;
                self.node.set_input_pref_type(self.input, Some(media_type))
            }
            DownstreamKind::Transform(transform) => {
                if transform.input_current_type(self.input).ok().as_ref() == Some(media_type) {
                    return Ok(());
                }
                transform.set_input_type(self.input, Some(media_type), SetTypeFlags::empty())
            }
            DownstreamKind::Tee => self.node.set_input_pref_type(0, Some(media_type)),
        }
    }
}

// =============================================================================
// Edge resolution
// =============================================================================

/// Outcome of one resolved edge.
#[derive(Debug)]
pub(crate) struct ResolvedEdge {
    pub stage: ConnectStage,
    pub media_type: MediaType,
    pub inserted: Vec<InsertedTransform>,
}

/// Negotiate the edge from `output` of `upstream` to `input` of `downstream`,
/// splicing transforms into `topology` when the policy allows it.
pub(crate) fn resolve_edge(
    topology: &mut Topology,
    ctx: &EdgeContext<'_>,
    upstream: &TopologyNode,
    output: u32,
    downstream: &TopologyNode,
    input: u32,
) -> Result<ResolvedEdge> {
    let up = Upstream::new(upstream, output)?;
    let down = Downstream::new(downstream, input)?;
    let method = ConnectMethod::from_node(downstream).unwrap_or(ctx.default_method);
    let stages = method.stages();

    let (candidates, enumerated) = up.candidates(ctx);
    tracing::trace!(
        upstream = format_args!("{:#x}", upstream.id()),
        downstream = format_args!("{:#x}", downstream.id()),
        %method,
        candidates = candidates.len(),
        enumerated,
        "Negotiating edge"
    );

    if candidates.is_empty() {
        return Err(if enumerated {
            Error::NoMoreTypes
        } else {
            Error::InvalidMediaType(format!("node {:#x} offers no media type", upstream.id()))
        });
    }

    // Type-major order tries every stage on one source type before the next;
    // method-major tries one stage on every type before the next stage.
    let attempts: Vec<(ConnectStage, Vec<MediaType>)> = if up.independent_types() {
        candidates
            .iter()
            .flat_map(|c| stages.iter().map(move |s| (*s, vec![c.clone()])))
            .collect()
    } else {
        stages
            .iter()
            .flat_map(|s| match s {
                ConnectStage::Direct => vec![(*s, candidates.clone())],
                _ => candidates.iter().map(|c| (*s, vec![c.clone()])).collect(),
            })
            .collect()
    };

    let mut last_error = None;
    for (stage, types) in attempts {
        let outcome = match stage {
            ConnectStage::Direct => connect_direct(&up, &down, &types),
            _ => insertion::bridge(topology, ctx, stage, &up, &types[0], &down).map(|inserted| {
                let media_type = down.current_type().unwrap_or_else(|| types[0].clone());
                ResolvedEdge {
                    stage,
                    media_type,
                    inserted,
                }
            }),
        };
        match outcome {
            Ok(edge) => {
                tracing::debug!(
                    upstream = format_args!("{:#x}", upstream.id()),
                    output,
                    downstream = format_args!("{:#x}", downstream.id()),
                    input,
                    stage = ?edge.stage,
                    media_type = %edge.media_type,
                    inserted = edge.inserted.len(),
                    "Resolved edge"
                );
                return Ok(edge);
            }
            Err(e) => {
                tracing::trace!(stage = ?stage, error = %e, "Connect attempt failed");
                last_error = Some(e);
            }
        }
    }

    if enumerated && stages == [ConnectStage::Direct] {
        return Err(Error::NoMoreTypes);
    }
    Err(last_error.unwrap_or_else(|| Error::InvalidMediaType("no connect attempt was made".into())))
}

fn connect_direct(up: &Upstream, down: &Downstream, candidates: &[MediaType]) -> Result<ResolvedEdge> {
    let fast_path = down.current_type().and_then(|current| {
        candidates
            .iter()
            .find(|c| c.satisfies(&current) && down.accepts(c).is_ok() && up.accepts(c).is_ok())
    });
    let chosen = fast_path
        .or_else(|| {
            candidates
                .iter()
                .find(|c| down.accepts(c).is_ok() && up.accepts(c).is_ok())
        })
        .ok_or_else(|| {
            Error::InvalidMediaType(format!(
                "node {:#x} accepts none of the {} offered type(s)",
                down.node.id(),
                candidates.len()
            ))
        })?;

    let previous = up.current_type();
    up.commit(chosen)?;
    if let Err(e) = down.commit(chosen) {
        if let Err(restore) = up.restore(previous.as_ref()) {
            tracing::warn!(
                node = format_args!("{:#x}", up.node.id()),
                error = %restore,
                "Could not restore upstream type"
            );
        }
        return Err(e);
    }
    Ok(ResolvedEdge {
        stage: ConnectStage::Direct,
        media_type: chosen.clone(),
        inserted: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guids::Guid;
    use crate::handler::StreamTypeHandler;
    use crate::sink::SimpleStreamSink;
    use crate::source::{PresentationDescriptor, StaticMediaSource, StreamDescriptor};

    /// Sink handler that accepts any type but will not make one current.
    struct StubbornHandler;

    impl MediaTypeHandler for StubbornHandler {
        fn is_media_type_supported(&self, _media_type: &MediaType) -> Result<()> {
            Ok(())
        }

        fn media_type_count(&self) -> Result<u32> {
            Ok(0)
        }

        fn media_type_by_index(&self, _index: u32) -> Result<MediaType> {
            Err(Error::NoMoreTypes)
        }

        fn set_current_media_type(&self, _media_type: &MediaType) -> Result<()> {
            Err(Error::InvalidMediaType("sink is locked".into()))
        }

        fn current_media_type(&self) -> Result<MediaType> {
            Err(Error::NotInitialized)
        }

        fn major_type(&self) -> Result<Guid> {
            Err(Error::NotInitialized)
        }
    }

    fn source_node(handler: Arc<StreamTypeHandler>) -> TopologyNode {
        let sd = Arc::new(StreamDescriptor::new(0, handler));
        let pd = PresentationDescriptor::new(vec![sd.clone()]);
        TopologyNode::source_stream(Arc::new(StaticMediaSource::new(pd.clone())), pd, sd)
    }

    #[test]
    fn test_failed_sink_commit_restores_source_type() {
        let pcm = MediaType::audio_pcm(44100, 2, 16);
        let out = TopologyNode::output(Arc::new(SimpleStreamSink::new(1, Arc::new(StubbornHandler))));

        let unset = Arc::new(StreamTypeHandler::new(vec![pcm.clone()]));
        let src = source_node(unset.clone());
        let up = Upstream::new(&src, 0).unwrap();
        let down = Downstream::new(&out, 0).unwrap();
        assert!(connect_direct(&up, &down, &[pcm.clone()]).is_err());
        assert!(matches!(unset.current_media_type(), Err(Error::NotInitialized)));

        let stereo_48k = MediaType::audio_pcm(48000, 2, 16);
        let set = Arc::new(StreamTypeHandler::new(vec![pcm.clone(), stereo_48k.clone()]).with_current(pcm.clone()));
        let src = source_node(set.clone());
        let up = Upstream::new(&src, 0).unwrap();
        assert!(connect_direct(&up, &down, &[stereo_48k]).is_err());
        assert_eq!(set.current_media_type().unwrap(), pcm);
    }

    #[test]
    fn test_decoder_implies_converter() {
        assert!(ConnectMethod::ALLOW_DECODER.contains(ConnectMethod::ALLOW_CONVERTER));
        assert_eq!(
            ConnectMethod::ALLOW_DECODER.stages(),
            vec![ConnectStage::Direct, ConnectStage::Converter, ConnectStage::Decoder]
        );
        assert_eq!(ConnectMethod::DIRECT.stages(), vec![ConnectStage::Direct]);
        assert_eq!(
            ConnectMethod::ALLOW_CONVERTER.stages(),
            vec![ConnectStage::Direct, ConnectStage::Converter]
        );
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(ConnectMethod::parse("direct").unwrap(), ConnectMethod::DIRECT);
        assert_eq!(ConnectMethod::parse("0x3").unwrap(), ConnectMethod::ALLOW_DECODER);
        assert_eq!(ConnectMethod::parse("1").unwrap(), ConnectMethod::ALLOW_CONVERTER);

        let method = ConnectMethod::parse("Allow_Converter | resolve_independent_output_types").unwrap();
        assert_eq!(
            method,
            ConnectMethod::ALLOW_CONVERTER | ConnectMethod::RESOLVE_INDEPENDENT_OUTPUTTYPES
        );
        assert_eq!(method.to_string(), "allow_converter|resolve_independent_output_types");
        assert_eq!(ConnectMethod::DIRECT.to_string(), "direct");
        assert_eq!(ConnectMethod::ALLOW_DECODER.to_string(), "allow_decoder");
        assert!(ConnectMethod::parse("sideways").is_err());
    }

    #[test]
    fn test_method_read_from_node() {
        let node = TopologyNode::new(NodeType::Output);
        assert!(ConnectMethod::from_node(&node).is_none());
        node.set_u32(keys::CONNECT_METHOD, 0);
        assert_eq!(ConnectMethod::from_node(&node), Some(ConnectMethod::DIRECT));
    }
}
