//! Topology manifest parsing and validation
//!
//! A manifest describes a partial topology in YAML or JSON: the source
//! streams with their types, the transforms (registry classes or inline
//! descriptions), tees and sinks, and the connections between them.
//! [`Manifest::build`] turns it into a [`Topology`] ready for the loader.
//!
//! ```yaml
//! version: v1
//! topology:
//!   dxva_mode: full
//! nodes:
//!   - id: src
//!     kind: source
//!     types:
//!       - { major: audio, subtype: mp3 }
//!   - id: sink
//!     kind: output
//!     types:
//!       - { major: audio, subtype: pcm, sample_rate: 44100, channels: 2, bits_per_sample: 16, complete: true }
//!     current: 0
//! connections:
//!   - { from: src, to: sink }
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device_manager::{DeviceApi, DeviceManager, DxvaMode};
use crate::guids::{self, keys, Guid};
use crate::handler::StreamTypeHandler;
use crate::media_type::MediaType;
use crate::negotiation::ConnectMethod;
use crate::node::{NodeObject, NodeType, TopologyNode};
use crate::sink::{DeferredSinkActivate, SimpleStreamSink};
use crate::source::{PresentationDescriptor, StaticMediaSource, StreamDescriptor};
use crate::topology::Topology;
use crate::transform::OutputStreamFlags;
use crate::transforms::StaticTransform;
use crate::{Error, Result};

/// Topology manifest structure (v1)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Schema version
    pub version: String,

    /// Manifest metadata
    #[serde(default)]
    pub metadata: ManifestMetadata,

    /// Topology-wide flags
    #[serde(default)]
    pub topology: TopologyFlags,

    /// Nodes of the topology
    pub nodes: Vec<NodeManifest>,

    /// Connections between nodes
    #[serde(default)]
    pub connections: Vec<Connection>,
}

/// Manifest metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Topology name
    #[serde(default)]
    pub name: String,

    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Attributes set on the topology itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologyFlags {
    /// Offer every source type instead of the current one
    #[serde(default)]
    pub enumerate_source_types: bool,

    /// Allow the video processor as a converter
    #[serde(default)]
    pub enable_xvp: bool,

    /// DXVA mode; absent means the loader's default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dxva_mode: Option<DxvaMode>,
}

/// Node manifest entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeManifest {
    /// Unique node ID within the manifest
    pub id: String,

    /// Connect method for the node's input edges
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_method: Option<ConnectMethodSpec>,

    /// Kind-specific description
    #[serde(flatten)]
    pub kind: NodeKind,
}

/// Connect method written as raw bits or as flag names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConnectMethodSpec {
    /// Numeric value
    Bits(u32),
    /// `direct`, or names joined by `|`
    Names(String),
}

impl ConnectMethodSpec {
    /// Parsed method.
    pub fn resolve(&self) -> Result<ConnectMethod> {
        match self {
            ConnectMethodSpec::Bits(bits) => Ok(ConnectMethod::from_bits_retain(*bits)),
            ConnectMethodSpec::Names(names) => ConnectMethod::parse(names),
        }
    }
}

/// What a node is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// One stream of a media source
    Source(SourceSpec),
    /// A transform
    Transform(TransformSpec),
    /// Fan-out
    Tee,
    /// A stream sink
    Output(OutputSpec),
}

/// Source stream description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Types the stream offers, in preference order
    pub types: Vec<MediaTypeSpec>,

    /// Index of the current type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<usize>,

    /// Stream identifier
    #[serde(default)]
    pub stream_id: u32,

    /// Negotiate each output type independently of the connect method
    #[serde(default)]
    pub independent_output_types: bool,
}

/// Transform description: a registry class, or an inline type list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformSpec {
    /// Registry class name (e.g. `resampler`) or class id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,

    /// Accepted input types
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<MediaTypeSpec>,

    /// Available output types
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<MediaTypeSpec>,

    /// Initial input type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_input: Option<MediaTypeSpec>,

    /// Initial output type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_output: Option<MediaTypeSpec>,

    /// Device API the transform is aware of
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aware: Option<DeviceApi>,

    /// The transform allocates its own output samples
    #[serde(default)]
    pub provides_samples: bool,

    /// Fail device manager delivery
    #[serde(default)]
    pub refuse_device_manager: bool,
}

impl TransformSpec {
    fn is_inline(&self) -> bool {
        !self.inputs.is_empty()
            || !self.outputs.is_empty()
            || self.current_input.is_some()
            || self.current_output.is_some()
            || self.aware.is_some()
            || self.provides_samples
            || self.refuse_device_manager
    }
}

/// Sink stream description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSpec {
    /// Types the sink accepts
    #[serde(default)]
    pub types: Vec<MediaTypeSpec>,

    /// Index of the current type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<usize>,

    /// Accept any type not rejected
    #[serde(default)]
    pub support_any: bool,

    /// Refuse types matching this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject: Option<MediaTypeSpec>,

    /// Expose the type list to enumeration
    #[serde(default = "default_true")]
    pub enumerable: bool,

    /// Direct3D 9 aware
    #[serde(default)]
    pub d3d_aware: bool,

    /// Direct3D 11 aware
    #[serde(default)]
    pub d3d11_aware: bool,

    /// Device manager the sink offers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_manager: Option<DeviceApi>,

    /// The sink always wants copied samples (video renderer)
    #[serde(default)]
    pub requires_sample_copy: bool,

    /// Stream sink identifier
    #[serde(default)]
    pub stream_id: u32,

    /// Bind an unactivated sink activation object instead of the sink
    #[serde(default)]
    pub deferred: bool,
}

fn default_true() -> bool {
    true
}

/// Connection between nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    /// Upstream node ID
    pub from: String,

    /// Upstream output index
    #[serde(default)]
    pub output: u32,

    /// Downstream node ID
    pub to: String,

    /// Downstream input index
    #[serde(default)]
    pub input: u32,
}

// =============================================================================
// Media types
// =============================================================================

/// Media type with readable field names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaTypeSpec {
    /// Major type name (`audio`, `video`) or GUID
    pub major: String,

    /// Subtype name (`pcm`, `h264`, ...) or GUID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,

    /// Audio channel count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u32>,

    /// Audio sample rate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,

    /// Audio bits per sample
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bits_per_sample: Option<u32>,

    /// Audio block alignment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_alignment: Option<u32>,

    /// Audio average byte rate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_bytes_per_second: Option<u32>,

    /// Fill block alignment and average byte rate from the other audio fields
    #[serde(default)]
    pub complete: bool,

    /// Video frame size `[width, height]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_size: Option<[u32; 2]>,

    /// Video frame rate `[numerator, denominator]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<[u32; 2]>,

    /// Pixel aspect ratio `[numerator, denominator]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_aspect_ratio: Option<[u32; 2]>,

    /// Video interlace mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interlace_mode: Option<u32>,

    /// Further 32-bit attributes by key name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, u32>,
}

fn named_guid(kind: &str, name: &str, lookup: fn(&str) -> Option<Guid>) -> Result<Guid> {
    lookup(name)
        .or_else(|| Uuid::parse_str(name).ok())
        .ok_or_else(|| Error::InvalidManifest(format!("Unknown {}: {}", kind, name)))
}

impl MediaTypeSpec {
    /// Build the media type.
    pub fn to_media_type(&self) -> Result<MediaType> {
        let major = named_guid("major type", &self.major, guids::major_type_by_name)?;
        let mut media_type = MediaType::with_major(major);
        if let Some(subtype) = &self.subtype {
            media_type = media_type.with_guid(
                keys::SUBTYPE,
                named_guid("subtype", subtype, guids::subtype_by_name)?,
            );
        }

        let mut block_alignment = self.block_alignment;
        let mut avg_bytes = self.avg_bytes_per_second;
        if self.complete {
            if let (Some(channels), Some(bits)) = (self.channels, self.bits_per_sample) {
                let block = channels * bits / 8;
                block_alignment.get_or_insert(block);
                if let Some(rate) = self.sample_rate {
                    avg_bytes.get_or_insert(block * rate);
                }
            }
        }

        let values = [
            (keys::AUDIO_NUM_CHANNELS, self.channels),
            (keys::AUDIO_SAMPLES_PER_SECOND, self.sample_rate),
            (keys::AUDIO_AVG_BYTES_PER_SECOND, avg_bytes),
            (keys::AUDIO_BLOCK_ALIGNMENT, block_alignment),
            (keys::AUDIO_BITS_PER_SAMPLE, self.bits_per_sample),
            (keys::INTERLACE_MODE, self.interlace_mode),
        ];
        for (key, value) in values {
            if let Some(value) = value {
                media_type = media_type.with_u32(key, value);
            }
        }

        let ratios = [
            (keys::FRAME_SIZE, self.frame_size),
            (keys::FRAME_RATE, self.frame_rate),
            (keys::PIXEL_ASPECT_RATIO, self.pixel_aspect_ratio),
        ];
        for (key, value) in ratios {
            if let Some([numerator, denominator]) = value {
                media_type = media_type.with_ratio(key, numerator, denominator);
            }
        }

        for (name, value) in &self.attributes {
            let key = named_guid("attribute", name, guids::key_by_name)?;
            media_type = media_type.with_u32(key, *value);
        }
        Ok(media_type)
    }
}

fn media_types(specs: &[MediaTypeSpec]) -> Result<Vec<MediaType>> {
    specs.iter().map(MediaTypeSpec::to_media_type).collect()
}

fn current_of(types: &[MediaType], current: Option<usize>, id: &str) -> Result<Option<MediaType>> {
    match current {
        None => Ok(None),
        Some(index) => types.get(index).cloned().map(Some).ok_or_else(|| {
            Error::InvalidManifest(format!("Node {}: current type {} out of range", id, index))
        }),
    }
}

// =============================================================================
// Parsing and validation
// =============================================================================

impl Manifest {
    /// Parse a JSON manifest.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidManifest(format!("Parse error: {}", e)))
    }

    /// Parse a YAML manifest.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::InvalidManifest(format!("Parse error: {}", e)))
    }

    /// Load a manifest file; `.json` is read as JSON, anything else as YAML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Validate the manifest for correctness.
    pub fn validate(&self) -> Result<()> {
        if self.version != "v1" {
            return Err(Error::InvalidManifest(format!(
                "Unsupported manifest version: {}",
                self.version
            )));
        }

        if self.nodes.is_empty() {
            return Err(Error::InvalidManifest(
                "Manifest must contain at least one node".to_string(),
            ));
        }

        let mut seen_ids = HashSet::new();
        for node in &self.nodes {
            if !seen_ids.insert(node.id.as_str()) {
                return Err(Error::InvalidManifest(format!("Duplicate node ID: {}", node.id)));
            }
        }

        for conn in &self.connections {
            if !seen_ids.contains(conn.from.as_str()) {
                return Err(Error::InvalidManifest(format!(
                    "Connection references unknown source node: {}",
                    conn.from
                )));
            }
            if !seen_ids.contains(conn.to.as_str()) {
                return Err(Error::InvalidManifest(format!(
                    "Connection references unknown target node: {}",
                    conn.to
                )));
            }
        }

        for node in &self.nodes {
            if let Some(method) = &node.connect_method {
                method
                    .resolve()
                    .map_err(|e| Error::InvalidManifest(format!("Node {}: {}", node.id, e)))?;
            }
            validate_kind(&node.id, &node.kind)?;
        }

        Ok(())
    }

    /// Build the topology. Returns it with a map from manifest node ID to node.
    ///
    /// Transforms given by class are left unbound with their class id set, so
    /// the loader instantiates them from its registry.
    pub fn build(&self) -> Result<(Topology, HashMap<String, TopologyNode>)> {
        self.validate()?;

        let mut topology = Topology::new();
        if self.topology.enumerate_source_types {
            topology.set_u32(keys::ENUMERATE_SOURCE_TYPES, 1);
        }
        if self.topology.enable_xvp {
            topology.set_u32(keys::ENABLE_XVP_FOR_PLAYBACK, 1);
        }
        if let Some(mode) = self.topology.dxva_mode {
            topology.set_u32(keys::DXVA_MODE, mode.as_u32());
        }

        let mut nodes = HashMap::with_capacity(self.nodes.len());
        for manifest in &self.nodes {
            let node = build_node(manifest)?;
            topology.add_node(&node)?;
            nodes.insert(manifest.id.clone(), node);
        }

        for conn in &self.connections {
            let (Some(from), Some(to)) = (nodes.get(&conn.from), nodes.get(&conn.to)) else {
                continue;
            };
            from.connect_output(conn.output, to, conn.input)?;
        }

        tracing::debug!(
            name = %self.metadata.name,
            nodes = nodes.len(),
            connections = self.connections.len(),
            "Built topology from manifest"
        );
        Ok((topology, nodes))
    }
}

fn validate_kind(id: &str, kind: &NodeKind) -> Result<()> {
    match kind {
        NodeKind::Source(source) => {
            if source.types.is_empty() {
                return Err(Error::InvalidManifest(format!("Source {} has no media types", id)));
            }
            let types = media_types(&source.types)?;
            current_of(&types, source.current, id)?;
        }
        NodeKind::Transform(transform) => match &transform.class {
            Some(class) => {
                if transform.is_inline() {
                    return Err(Error::InvalidManifest(format!(
                        "Transform {} gives both a class and inline types",
                        id
                    )));
                }
                named_guid("transform class", class, guids::class_by_name)?;
            }
            None => {
                media_types(&transform.inputs)?;
                media_types(&transform.outputs)?;
                for spec in transform.current_input.iter().chain(&transform.current_output) {
                    spec.to_media_type()?;
                }
            }
        },
        NodeKind::Tee => {}
        NodeKind::Output(output) => {
            let types = media_types(&output.types)?;
            current_of(&types, output.current, id)?;
            if let Some(reject) = &output.reject {
                reject.to_media_type()?;
            }
        }
    }
    Ok(())
}

// =============================================================================
// Node construction
// =============================================================================

fn build_node(manifest: &NodeManifest) -> Result<TopologyNode> {
    let id = manifest.id.as_str();
    let node = match &manifest.kind {
        NodeKind::Source(spec) => build_source(id, spec)?,
        NodeKind::Transform(spec) => build_transform(spec)?,
        NodeKind::Tee => TopologyNode::new(NodeType::Tee),
        NodeKind::Output(spec) => build_output(id, spec)?,
    };

    let mut method = match &manifest.connect_method {
        Some(spec) => Some(spec.resolve()?),
        None => None,
    };
    if let NodeKind::Source(spec) = &manifest.kind {
        if spec.independent_output_types {
            method = Some(method.unwrap_or(ConnectMethod::DIRECT) | ConnectMethod::RESOLVE_INDEPENDENT_OUTPUTTYPES);
        }
    }
    if let Some(method) = method {
        node.set_u32(keys::CONNECT_METHOD, method.bits());
    }
    Ok(node)
}

fn build_source(id: &str, spec: &SourceSpec) -> Result<TopologyNode> {
    let types = media_types(&spec.types)?;
    let current = current_of(&types, spec.current, id)?;

    let mut handler = StreamTypeHandler::new(types);
    if let Some(current) = current {
        handler = handler.with_current(current);
    }
    let sd = Arc::new(StreamDescriptor::new(spec.stream_id, Arc::new(handler)));
    let pd = PresentationDescriptor::new(vec![Arc::clone(&sd)]);
    let source = Arc::new(StaticMediaSource::new(pd.clone()));
    Ok(TopologyNode::source_stream(source, pd, sd))
}

fn build_transform(spec: &TransformSpec) -> Result<TopologyNode> {
    if let Some(class) = &spec.class {
        let class_id = named_guid("transform class", class, guids::class_by_name)?;
        let node = TopologyNode::new(NodeType::Transform);
        node.set_guid(keys::TRANSFORM_OBJECTID, class_id);
        return Ok(node);
    }

    let mut transform = StaticTransform::new(media_types(&spec.inputs)?, media_types(&spec.outputs)?);
    if let Some(current) = &spec.current_input {
        transform = transform.with_current_input(current.to_media_type()?);
    }
    if let Some(current) = &spec.current_output {
        transform = transform.with_current_output(current.to_media_type()?);
    }
    if let Some(api) = spec.aware {
        transform = transform.aware_of(api);
    }
    if spec.provides_samples {
        transform = transform.with_output_flags(OutputStreamFlags::PROVIDES_SAMPLES);
    }
    if spec.refuse_device_manager {
        transform = transform.refusing_device_manager();
    }

    let class_id = transform.class_id();
    let node = TopologyNode::transform(Arc::new(transform));
    node.set_guid(keys::TRANSFORM_OBJECTID, class_id);
    Ok(node)
}

fn build_output(id: &str, spec: &OutputSpec) -> Result<TopologyNode> {
    let types = media_types(&spec.types)?;
    let current = current_of(&types, spec.current, id)?;

    let mut handler = StreamTypeHandler::new(types);
    if let Some(current) = current {
        handler = handler.with_current(current);
    }
    if spec.support_any {
        handler = handler.supporting_any();
    }
    if let Some(reject) = &spec.reject {
        handler = handler.rejecting(reject.to_media_type()?);
    }
    if !spec.enumerable {
        handler = handler.non_enumerable();
    }

    let mut sink = SimpleStreamSink::new(spec.stream_id, Arc::new(handler));
    if let Some(api) = spec.device_manager {
        sink = sink.with_device_manager(DeviceManager::new(api).token());
    }
    if spec.d3d_aware {
        sink = sink.d3d_aware();
    }
    if spec.d3d11_aware {
        sink = sink.d3d11_aware();
    }
    if spec.requires_sample_copy {
        sink.set_u32(keys::REQUIRES_SAMPLE_COPY, 1);
    }

    let node = TopologyNode::new(NodeType::Output);
    let sink = Arc::new(sink);
    let object = if spec.deferred {
        NodeObject::SinkActivate(Arc::new(DeferredSinkActivate::new(sink)))
    } else {
        NodeObject::StreamSink(sink)
    };
    node.set_object(Some(object));
    Ok(node)
}
