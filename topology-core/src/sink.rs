//! Stream sinks and sink activation objects

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::attributes::Attributes;
use crate::device_manager::DeviceManagerToken;
use crate::guids::{keys, Guid};
use crate::handler::MediaTypeHandler;
use crate::Result;

/// A stream of a media sink, as bound to an output node.
pub trait StreamSink: Send + Sync {
    /// Stream identifier within the owning media sink.
    fn identifier(&self) -> Result<u32>;

    /// Type handler the loader negotiates against.
    fn media_type_handler(&self) -> Result<Arc<dyn MediaTypeHandler>>;

    /// Attribute store, when the sink exposes one (device awareness flags).
    fn attributes(&self) -> Option<Attributes> {
        None
    }

    /// Device manager service, when the sink renders through a device.
    fn device_manager(&self) -> Option<DeviceManagerToken> {
        None
    }
}

/// Deferred sink creation. The loader refuses output nodes still bound to one.
pub trait SinkActivate: Send + Sync {
    /// Produce the stream sink.
    fn activate_stream_sink(&self) -> Result<Arc<dyn StreamSink>>;
}

// =============================================================================
// Built-in sink
// =============================================================================

/// Stream sink assembled from a handler plus optional attributes and device manager.
pub struct SimpleStreamSink {
    identifier: u32,
    handler: Arc<dyn MediaTypeHandler>,
    attributes: RwLock<Option<Attributes>>,
    device_manager: Option<DeviceManagerToken>,
}

impl SimpleStreamSink {
    /// Sink stream `identifier` negotiating through `handler`.
    pub fn new(identifier: u32, handler: Arc<dyn MediaTypeHandler>) -> Self {
        Self {
            identifier,
            handler,
            attributes: RwLock::new(None),
            device_manager: None,
        }
    }

    /// Expose an attribute store.
    pub fn with_attributes(self, attributes: Attributes) -> Self {
        *self.attributes.write() = Some(attributes);
        self
    }

    /// Expose a device manager service.
    pub fn with_device_manager(mut self, token: DeviceManagerToken) -> Self {
        self.device_manager = Some(token);
        self
    }

    /// Set a 32-bit attribute, creating the store if needed.
    pub fn set_u32(&self, key: Guid, value: u32) {
        self.attributes
            .write()
            .get_or_insert_with(Attributes::new)
            .set_u32(key, value);
    }

    /// Declare Direct3D 9 awareness.
    pub fn d3d_aware(self) -> Self {
        self.set_u32(keys::D3D_AWARE, 1);
        self
    }

    /// Declare Direct3D 11 awareness.
    pub fn d3d11_aware(self) -> Self {
        self.set_u32(keys::D3D11_AWARE, 1);
        self
    }
}

impl StreamSink for SimpleStreamSink {
    fn identifier(&self) -> Result<u32> {
        Ok(self.identifier)
    }

    fn media_type_handler(&self) -> Result<Arc<dyn MediaTypeHandler>> {
        Ok(Arc::clone(&self.handler))
    }

    fn attributes(&self) -> Option<Attributes> {
        self.attributes.read().clone()
    }

    fn device_manager(&self) -> Option<DeviceManagerToken> {
        self.device_manager.clone()
    }
}

impl fmt::Debug for SimpleStreamSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleStreamSink")
            .field("identifier", &self.identifier)
            .field("attributes", &*self.attributes.read())
            .field("device_manager", &self.device_manager)
            .finish()
    }
}

/// Activation object that hands out a prepared sink.
pub struct DeferredSinkActivate {
    sink: Arc<dyn StreamSink>,
}

impl DeferredSinkActivate {
    /// Wrap the sink produced on activation.
    pub fn new(sink: Arc<dyn StreamSink>) -> Self {
        Self { sink }
    }
}

impl SinkActivate for DeferredSinkActivate {
    fn activate_stream_sink(&self) -> Result<Arc<dyn StreamSink>> {
        Ok(Arc::clone(&self.sink))
    }
}
