//! Device managers and the post-negotiation passes
//!
//! After every connection is typed the loader runs two passes over the
//! resolved topology, selected by the DXVA mode:
//!
//! - `Default`: a sample copier goes in front of every device-aware sink
//!   whose feeding transform hands out its own samples, or whose sink asks
//!   for copies outright.
//! - `Full`: the sink's device manager is handed upstream to the contiguous
//!   run of transforms aware of the same API.
//!
//! `None` runs neither.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attributes::Attributes;
use crate::guids::{class_ids, keys, Guid};
use crate::ids::TopoId;
use crate::insertion::InsertedTransform;
use crate::node::{NodeType, TopologyNode};
use crate::topology::Topology;
use crate::transform::{SetTypeFlags, TransformMessage};
use crate::transforms::SampleCopier;
use crate::{Error, Result};

/// Graphics API a device manager serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceApi {
    /// Direct3D 9 device manager
    #[serde(alias = "d3d9")]
    Direct3D9,
    /// DXGI / Direct3D 11 device manager
    #[serde(alias = "d3d11")]
    Dxgi,
}

impl DeviceApi {
    /// Attribute a sink or transform sets to declare awareness of this API.
    pub fn awareness_key(self) -> Guid {
        match self {
            DeviceApi::Direct3D9 => keys::D3D_AWARE,
            DeviceApi::Dxgi => keys::D3D11_AWARE,
        }
    }

    /// Whether `attributes` declare awareness of this API.
    pub fn is_aware(self, attributes: &Attributes) -> bool {
        attributes.flag(&self.awareness_key())
    }
}

impl fmt::Display for DeviceApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceApi::Direct3D9 => f.write_str("d3d9"),
            DeviceApi::Dxgi => f.write_str("dxgi"),
        }
    }
}

/// A platform device manager.
#[derive(Debug)]
pub struct DeviceManager {
    id: Uuid,
    api: DeviceApi,
    reset_token: u32,
}

impl DeviceManager {
    /// New manager for `api`.
    pub fn new(api: DeviceApi) -> Arc<Self> {
        let id = Uuid::new_v4();
        Arc::new(Self {
            id,
            api,
            reset_token: id.as_u128() as u32,
        })
    }

    /// Identity of this manager.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Served API.
    pub fn api(&self) -> DeviceApi {
        self.api
    }

    /// Token handed out with the manager on creation.
    pub fn reset_token(&self) -> u32 {
        self.reset_token
    }

    /// Opaque token for delivery to transforms.
    pub fn token(self: &Arc<Self>) -> DeviceManagerToken {
        DeviceManagerToken(Arc::clone(self))
    }
}

/// Opaque device manager handle passed in `SetD3DManager`.
///
/// The receiver asks for the interface it needs; asking for the other API
/// fails with [`Error::NoInterface`].
#[derive(Clone)]
pub struct DeviceManagerToken(Arc<DeviceManager>);

impl DeviceManagerToken {
    /// The manager, if it serves `api`.
    pub fn query(&self, api: DeviceApi) -> Result<Arc<DeviceManager>> {
        if self.0.api == api {
            Ok(Arc::clone(&self.0))
        } else {
            Err(Error::NoInterface(format!("{} device manager", api)))
        }
    }

    /// API of the wrapped manager.
    pub fn api(&self) -> DeviceApi {
        self.0.api
    }

    /// Whether both tokens wrap the same manager.
    pub fn same_manager(&self, other: &DeviceManagerToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for DeviceManagerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceManagerToken({}, {})", self.0.api, self.0.id)
    }
}

/// Topology-wide hardware acceleration mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DxvaMode {
    /// Copier insertion only
    #[default]
    Default,
    /// No device handling at all
    None,
    /// Device manager propagation
    Full,
}

impl DxvaMode {
    /// Attribute value.
    pub fn as_u32(self) -> u32 {
        match self {
            DxvaMode::Default => 0,
            DxvaMode::None => 1,
            DxvaMode::Full => 2,
        }
    }

    /// Parse an attribute value.
    pub fn from_u32(value: u32) -> Result<Self> {
        match value {
            0 => Ok(DxvaMode::Default),
            1 => Ok(DxvaMode::None),
            2 => Ok(DxvaMode::Full),
            other => Err(Error::InvalidArgument(format!("DXVA mode {}", other))),
        }
    }

    /// Mode set on a topology; absent means `Default`.
    pub fn from_attributes(attributes: &Attributes) -> Result<Self> {
        match attributes.get_u32(&keys::DXVA_MODE) {
            Ok(value) => Self::from_u32(value),
            Err(Error::AttributeNotFound(_)) => Ok(DxvaMode::Default),
            Err(e) => Err(e),
        }
    }
}

/// Per-node progress of device manager delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// Not reached yet
    Unvisited,
    /// Walk stopped here; nothing sent
    NotAware,
    /// Aware transform about to receive the manager
    AwarePending,
    /// Manager delivered
    Delivered,
}

/// Outcome of the device manager walk for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDelivery {
    /// Node id
    pub node: TopoId,
    /// API of the delivered manager
    pub api: DeviceApi,
    /// Final state
    pub state: DeliveryState,
}

// =============================================================================
// Passes
// =============================================================================

fn sink_attributes(node: &TopologyNode) -> Option<Attributes> {
    node.stream_sink().ok().and_then(|sink| sink.attributes())
}

fn is_d3d_aware(attributes: &Attributes) -> bool {
    DeviceApi::Direct3D9.is_aware(attributes) || DeviceApi::Dxgi.is_aware(attributes)
}

fn is_sample_copier(node: &TopologyNode) -> bool {
    node.node_type() == NodeType::Transform
        && node.get_guid(&keys::TRANSFORM_OBJECTID).ok() == Some(class_ids::SAMPLE_COPIER)
}

/// Whether the node feeding a sink owns the samples it produces.
fn feeds_own_samples(upstream: &TopologyNode, output_index: u32) -> bool {
    if upstream.node_type() != NodeType::Transform {
        return false;
    }
    upstream
        .bound_transform()
        .and_then(|t| t.output_stream_info(output_index))
        .map(|info| info.allocates_samples())
        .unwrap_or(false)
}

/// Insert a sample copier in front of each device-aware sink that needs one.
///
/// The copier takes the type negotiated on the sink connection on both
/// sides. Returns the inserted copiers.
pub fn insert_sample_copiers(topology: &mut Topology) -> Result<Vec<InsertedTransform>> {
    let mut inserted = Vec::new();

    for output in topology.output_nodes() {
        let Some(attributes) = sink_attributes(&output) else {
            continue;
        };
        if !is_d3d_aware(&attributes) {
            continue;
        }
        let Ok((upstream, output_index)) = output.input(0) else {
            continue;
        };
        if is_sample_copier(&upstream) {
            continue;
        }
        let requested = attributes.flag(&keys::REQUIRES_SAMPLE_COPY);
        if !requested && !feeds_own_samples(&upstream, output_index) {
            continue;
        }

        let media_type = output.input_pref_type(0)?;
        let copier = Arc::new(SampleCopier::new());
        copier_types(&copier, &media_type)?;

        let node = TopologyNode::transform(copier);
        node.set_guid(keys::TRANSFORM_OBJECTID, class_ids::SAMPLE_COPIER);
        topology.add_node(&node)?;
        upstream.connect_output(output_index, &node, 0)?;
        node.connect_output(0, &output, 0)?;

        tracing::info!(
            copier = format_args!("{:#x}", node.id()),
            upstream = format_args!("{:#x}", upstream.id()),
            sink = format_args!("{:#x}", output.id()),
            "Inserted sample copier"
        );
        inserted.push(InsertedTransform {
            class_id: class_ids::SAMPLE_COPIER,
            upstream: upstream.id(),
            downstream: output.id(),
            node,
        });
    }

    Ok(inserted)
}

fn copier_types(copier: &SampleCopier, media_type: &crate::media_type::MediaType) -> Result<()> {
    use crate::transform::Transform;
    copier.set_input_type(0, Some(media_type), SetTypeFlags::empty())?;
    copier.set_output_type(0, Some(media_type), SetTypeFlags::empty())
}

/// Hand each sink's device manager to the aware transforms feeding it.
///
/// The walk starts at the node feeding the sink and moves upstream while
/// the node is a transform aware of the manager's API. The first node that
/// is not ends the walk and is recorded as `NotAware`. A transform that
/// rejects the message fails the whole pass.
pub fn propagate_device_managers(topology: &Topology) -> Result<Vec<DeviceDelivery>> {
    let mut deliveries = Vec::new();
    let mut visited = HashSet::new();

    for output in topology.output_nodes() {
        let Ok(sink) = output.stream_sink() else {
            continue;
        };
        let Some(token) = sink.device_manager() else {
            continue;
        };
        let api = token.api();
        let aware = sink.attributes().map(|a| api.is_aware(&a)).unwrap_or(false);
        if !aware {
            tracing::debug!(
                sink = format_args!("{:#x}", output.id()),
                %api,
                "Sink offers a device manager but is not aware of its API"
            );
            continue;
        }

        let mut current = output.input(0).ok().map(|(node, _)| node);
        while let Some(node) = current.take() {
            if !visited.insert(node.id()) {
                break;
            }
            let transform = match node.node_type() {
                NodeType::Transform => node.bound_transform().ok(),
                _ => None,
            };
            let Some(transform) = transform.filter(|t| {
                t.attributes().map(|a| api.is_aware(&a)).unwrap_or(false)
            }) else {
                deliveries.push(DeviceDelivery {
                    node: node.id(),
                    api,
                    state: DeliveryState::NotAware,
                });
                break;
            };

            let mut record = DeviceDelivery {
                node: node.id(),
                api,
                state: DeliveryState::AwarePending,
            };
            transform
                .process_message(TransformMessage::SetD3DManager(Some(token.clone())))
                .map_err(|e| Error::DeviceManagerDelivery {
                    node: node.id(),
                    reason: e.to_string(),
                })?;
            record.state = DeliveryState::Delivered;
            tracing::debug!(
                node = format_args!("{:#x}", node.id()),
                %api,
                "Delivered device manager"
            );
            deliveries.push(record);

            current = node.input(0).ok().map(|(upstream, _)| upstream);
        }
    }

    Ok(deliveries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_query_is_api_specific() {
        let manager = DeviceManager::new(DeviceApi::Direct3D9);
        let token = manager.token();
        assert!(token.query(DeviceApi::Direct3D9).is_ok());
        assert!(matches!(token.query(DeviceApi::Dxgi), Err(Error::NoInterface(_))));
        assert!(token.same_manager(&manager.token()));
        assert!(!token.same_manager(&DeviceManager::new(DeviceApi::Direct3D9).token()));
    }

    #[test]
    fn test_dxva_mode_attribute() {
        let mut attributes = Attributes::new();
        assert_eq!(DxvaMode::from_attributes(&attributes).unwrap(), DxvaMode::Default);
        attributes.set_u32(keys::DXVA_MODE, 2);
        assert_eq!(DxvaMode::from_attributes(&attributes).unwrap(), DxvaMode::Full);
        attributes.set_u32(keys::DXVA_MODE, 9);
        assert!(DxvaMode::from_attributes(&attributes).is_err());
        assert_eq!(DxvaMode::None.as_u32(), 1);
    }

    #[test]
    fn test_awareness_keys() {
        let mut attributes = Attributes::new();
        attributes.set_u32(keys::D3D11_AWARE, 1);
        assert!(DeviceApi::Dxgi.is_aware(&attributes));
        assert!(!DeviceApi::Direct3D9.is_aware(&attributes));
        assert!(is_d3d_aware(&attributes));
    }
}
