//! Transform insertion
//!
//! Bridges an edge that cannot connect directly by splicing a converter, a
//! decoder, or a decoder followed by a converter between its ends. The
//! whole chain is negotiated on fresh transform instances first; the
//! topology is only touched once every hop has an input and output type.

use std::sync::Arc;

use crate::guids::{class_ids, display_name, keys, Guid};
use crate::handler::enumerate_types;
use crate::ids::TopoId;
use crate::media_type::MediaType;
use crate::negotiation::{ConnectStage, Downstream, EdgeContext, Upstream};
use crate::node::TopologyNode;
use crate::registry::{TransformCategory, TransformInfo, TransformRegistry};
use crate::topology::Topology;
use crate::transform::{SetTypeFlags, Transform};
use crate::{Error, Result};

/// A transform node added to a topology during resolution.
#[derive(Debug, Clone)]
pub struct InsertedTransform {
    /// The new node
    pub node: TopologyNode,
    /// Class id of its transform
    pub class_id: Guid,
    /// Upstream end of the bridged edge
    pub upstream: TopoId,
    /// Downstream end of the bridged edge
    pub downstream: TopoId,
}

impl InsertedTransform {
    /// Whether the node was inserted as a decoder.
    pub fn is_decoder(&self) -> bool {
        self.node.get_u32(&keys::DECODER).map(|v| v != 0).unwrap_or(false)
    }
}

struct Hop {
    class_id: Guid,
    transform: Arc<dyn Transform>,
    decoder: bool,
}

/// Why a new transform could not be connected to the downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HopFailure {
    /// The downstream exposes no type to aim for and accepted no output
    NoTargets,
    /// Every target was refused
    Rejected,
}

fn category_for(stage: ConnectStage, media_type: &MediaType) -> TransformCategory {
    match (stage, media_type.is_video()) {
        (ConnectStage::Decoder, true) => TransformCategory::VideoDecoder,
        (ConnectStage::Decoder, false) => TransformCategory::AudioDecoder,
        (_, true) => TransformCategory::VideoProcessor,
        (_, false) => TransformCategory::AudioEffect,
    }
}

/// Registry candidates for `category` accepting `input`, with the video
/// processor promoted to the front when enabled and dropped otherwise.
fn candidates<'a>(
    ctx: &EdgeContext<'a>,
    category: TransformCategory,
    input: &MediaType,
) -> Vec<&'a TransformInfo> {
    let mut found = ctx.registry.enumerate(category, Some(input), None);
    match found.iter().position(|info| info.class_id == class_ids::VIDEO_PROCESSOR) {
        Some(index) if ctx.enable_xvp => {
            let xvp = found.remove(index);
            found.insert(0, xvp);
        }
        Some(index) => {
            found.remove(index);
        }
        None => {}
    }
    found
}

/// Pick an output type for `transform` that `downstream` accepts and set it.
fn connect_to_downstream(
    transform: &dyn Transform,
    downstream: &Downstream,
) -> std::result::Result<MediaType, HopFailure> {
    let outputs: Vec<MediaType> = enumerate_types(|i| transform.output_available_type(0, i)).collect();
    let settable = |t: &MediaType| transform.set_output_type(0, Some(t), SetTypeFlags::TEST_ONLY).is_ok();

    let targets = downstream.target_types();
    let chosen = if targets.is_empty() {
        outputs
            .iter()
            .find(|t| downstream.accepts(t).is_ok() && settable(t))
            .cloned()
            .ok_or(HopFailure::NoTargets)?
    } else {
        targets
            .iter()
            .find_map(|target| {
                if settable(target) && downstream.accepts(target).is_ok() {
                    return Some(target.clone());
                }
                outputs
                    .iter()
                    .find(|t| t.satisfies(target) && downstream.accepts(t).is_ok() && settable(t))
                    .cloned()
            })
            .ok_or(HopFailure::Rejected)?
    };

    transform
        .set_output_type(0, Some(&chosen), SetTypeFlags::empty())
        .map_err(|_| HopFailure::Rejected)?;
    Ok(chosen)
}

/// One transform of `category` from `input` straight to `downstream`.
fn single_hop(
    ctx: &EdgeContext<'_>,
    category: TransformCategory,
    input: &MediaType,
    downstream: &Downstream,
) -> Option<Hop> {
    candidates(ctx, category, input).into_iter().find_map(|info| {
        let transform = info.create();
        transform.set_input_type(0, Some(input), SetTypeFlags::empty()).ok()?;
        connect_to_downstream(transform.as_ref(), downstream).ok()?;
        Some(Hop {
            class_id: info.class_id,
            transform,
            decoder: false,
        })
    })
}

/// Negotiate the hops bridging `input` to `downstream` for `stage`.
fn plan_chain(
    ctx: &EdgeContext<'_>,
    stage: ConnectStage,
    input: &MediaType,
    downstream: &Downstream,
) -> Result<Vec<Hop>> {
    let category = category_for(stage, input);
    let found = candidates(ctx, category, input);
    if found.is_empty() {
        return Err(if stage == ConnectStage::Converter && input.is_compressed() {
            Error::TransformNotPossible(format!("{} needs a decoder", input))
        } else {
            Error::CodecNotFound(format!("no {:?} accepts {}", category, input))
        });
    }

    let decoder = stage == ConnectStage::Decoder;
    let mut saw_no_targets = false;
    for info in found {
        let transform = info.create();
        if let Err(e) = transform.set_input_type(0, Some(input), SetTypeFlags::empty()) {
            tracing::trace!(class = %info.name, error = %e, "Candidate refused input");
            continue;
        }
        let hop = Hop {
            class_id: info.class_id,
            transform: Arc::clone(&transform),
            decoder,
        };

        match connect_to_downstream(transform.as_ref(), downstream) {
            Ok(_) => return Ok(vec![hop]),
            Err(HopFailure::NoTargets) => saw_no_targets = true,
            Err(HopFailure::Rejected) => {}
        }
        if !decoder {
            continue;
        }

        // Decoder output that a converter can take the rest of the way.
        let decoded: Vec<MediaType> = enumerate_types(|i| transform.output_available_type(0, i)).collect();
        for media_type in decoded {
            if transform
                .set_output_type(0, Some(&media_type), SetTypeFlags::empty())
                .is_err()
            {
                continue;
            }
            let converter_category = category_for(ConnectStage::Converter, &media_type);
            if let Some(converter) = single_hop(ctx, converter_category, &media_type, downstream) {
                return Ok(vec![hop, converter]);
            }
        }
    }

    if saw_no_targets {
        Err(Error::InvalidMediaType(format!(
            "node {:#x} exposes no type and accepts no {:?} output",
            downstream.node.id(),
            category
        )))
    } else {
        Err(Error::CodecNotFound(format!(
            "no {:?} connects {} to node {:#x}",
            category,
            input,
            downstream.node.id()
        )))
    }
}

/// Bridge `upstream` to `downstream` with transforms negotiated for `input`.
///
/// On success the new nodes are added to `topology` and connected in
/// order, and both ends of the edge get their final types.
pub(crate) fn bridge(
    topology: &mut Topology,
    ctx: &EdgeContext<'_>,
    stage: ConnectStage,
    upstream: &Upstream,
    input: &MediaType,
    downstream: &Downstream,
) -> Result<Vec<InsertedTransform>> {
    let chain = plan_chain(ctx, stage, input, downstream)?;
    let last = chain
        .last()
        .ok_or_else(|| Error::CodecNotFound("empty transform chain".into()))?;
    let final_type = last.transform.output_current_type(0)?;

    let mut inserted = Vec::with_capacity(chain.len());
    for hop in &chain {
        let node = TopologyNode::transform(Arc::clone(&hop.transform));
        node.set_guid(keys::TRANSFORM_OBJECTID, hop.class_id);
        if hop.decoder {
            node.set_u32(keys::DECODER, 1);
        }
        topology.add_node(&node)?;
        inserted.push(InsertedTransform {
            node,
            class_id: hop.class_id,
            upstream: upstream.node.id(),
            downstream: downstream.node.id(),
        });
    }

    let mut previous = (upstream.node.clone(), upstream.output);
    for item in &inserted {
        previous.0.connect_output(previous.1, &item.node, 0)?;
        previous = (item.node.clone(), 0);
    }
    previous
        .0
        .connect_output(previous.1, &downstream.node, downstream.input)?;

    upstream.commit(input)?;
    downstream.commit(&final_type)?;

    for item in &inserted {
        tracing::info!(
            class = %display_name(&item.class_id),
            node = format_args!("{:#x}", item.node.id()),
            upstream = format_args!("{:#x}", item.upstream),
            downstream = format_args!("{:#x}", item.downstream),
            decoder = item.is_decoder(),
            "Inserted transform"
        );
    }
    Ok(inserted)
}
