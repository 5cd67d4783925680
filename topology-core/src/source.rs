//! Media source side: stream and presentation descriptors

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::RwLock;

use crate::attributes::Attributes;
use crate::handler::MediaTypeHandler;
use crate::{Error, Result};

/// One elementary stream of a media source.
pub struct StreamDescriptor {
    id: u32,
    handler: Arc<dyn MediaTypeHandler>,
    attributes: RwLock<Attributes>,
}

impl StreamDescriptor {
    /// Create a descriptor for stream `id`.
    pub fn new(id: u32, handler: Arc<dyn MediaTypeHandler>) -> Self {
        Self {
            id,
            handler,
            attributes: RwLock::new(Attributes::new()),
        }
    }

    /// Stream identifier.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Type handler of this stream.
    pub fn media_type_handler(&self) -> Arc<dyn MediaTypeHandler> {
        Arc::clone(&self.handler)
    }

    /// Snapshot of the descriptor attributes.
    pub fn attributes(&self) -> Attributes {
        self.attributes.read().clone()
    }

    /// Set a 32-bit descriptor attribute.
    pub fn set_u32(&self, key: crate::guids::Guid, value: u32) {
        self.attributes.write().set_u32(key, value);
    }
}

impl fmt::Debug for StreamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamDescriptor")
            .field("id", &self.id)
            .field("attributes", &*self.attributes.read())
            .finish()
    }
}

/// Set of streams a source presents, with per-stream selection.
///
/// Clones share the stream descriptors but copy the selection state.
#[derive(Debug, Clone, Default)]
pub struct PresentationDescriptor {
    streams: Vec<(Arc<StreamDescriptor>, bool)>,
    attributes: Attributes,
}

impl PresentationDescriptor {
    /// Every stream starts selected.
    pub fn new(streams: Vec<Arc<StreamDescriptor>>) -> Self {
        Self {
            streams: streams.into_iter().map(|s| (s, true)).collect(),
            attributes: Attributes::new(),
        }
    }

    /// Number of streams.
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Stream at `index` with its selection flag.
    pub fn stream_by_index(&self, index: usize) -> Result<(Arc<StreamDescriptor>, bool)> {
        self.streams
            .get(index)
            .map(|(sd, selected)| (Arc::clone(sd), *selected))
            .ok_or(Error::InvalidIndex(index as u32))
    }

    /// Select the stream at `index`.
    pub fn select_stream(&mut self, index: usize) -> Result<()> {
        self.set_selected(index, true)
    }

    /// Deselect the stream at `index`.
    pub fn deselect_stream(&mut self, index: usize) -> Result<()> {
        self.set_selected(index, false)
    }

    fn set_selected(&mut self, index: usize, selected: bool) -> Result<()> {
        let entry = self
            .streams
            .get_mut(index)
            .ok_or(Error::InvalidIndex(index as u32))?;
        entry.1 = selected;
        Ok(())
    }

    /// Presentation attributes.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }
}

bitflags! {
    /// Capabilities advertised by a media source.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SourceCharacteristics: u32 {
        /// Live source
        const IS_LIVE = 0x1;
        /// Supports seeking
        const CAN_SEEK = 0x2;
        /// Supports pausing
        const CAN_PAUSE = 0x4;
        /// Seeking is slow
        const HAS_SLOW_SEEK = 0x8;
    }
}

/// A media source as consumed by topology nodes.
pub trait MediaSource: Send + Sync {
    /// Source capabilities.
    fn characteristics(&self) -> SourceCharacteristics;

    /// Fresh copy of the source's presentation descriptor.
    fn create_presentation_descriptor(&self) -> Result<PresentationDescriptor>;
}

/// Source backed by a fixed presentation descriptor.
#[derive(Debug)]
pub struct StaticMediaSource {
    descriptor: PresentationDescriptor,
    characteristics: SourceCharacteristics,
}

impl StaticMediaSource {
    /// Create a source presenting `descriptor`.
    pub fn new(descriptor: PresentationDescriptor) -> Self {
        Self {
            descriptor,
            characteristics: SourceCharacteristics::CAN_SEEK | SourceCharacteristics::CAN_PAUSE,
        }
    }

    /// Override the advertised characteristics.
    pub fn with_characteristics(mut self, characteristics: SourceCharacteristics) -> Self {
        self.characteristics = characteristics;
        self
    }
}

impl MediaSource for StaticMediaSource {
    fn characteristics(&self) -> SourceCharacteristics {
        self.characteristics
    }

    fn create_presentation_descriptor(&self) -> Result<PresentationDescriptor> {
        Ok(self.descriptor.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::StreamTypeHandler;
    use crate::media_type::MediaType;

    fn descriptor() -> Arc<StreamDescriptor> {
        let handler = StreamTypeHandler::new(vec![MediaType::audio_pcm(44100, 1, 8)]);
        Arc::new(StreamDescriptor::new(0, Arc::new(handler)))
    }

    #[test]
    fn test_presentation_descriptor_clone_shares_streams() {
        let sd = descriptor();
        let source = StaticMediaSource::new(PresentationDescriptor::new(vec![sd.clone()]));

        let mut pd = source.create_presentation_descriptor().unwrap();
        pd.deselect_stream(0).unwrap();

        let (stream, selected) = pd.stream_by_index(0).unwrap();
        assert!(Arc::ptr_eq(&stream, &sd));
        assert!(!selected);

        let fresh = source.create_presentation_descriptor().unwrap();
        assert!(fresh.stream_by_index(0).unwrap().1);
        assert!(fresh.stream_by_index(1).is_err());
    }

    #[test]
    fn test_default_characteristics() {
        let source = StaticMediaSource::new(PresentationDescriptor::default());
        assert!(source.characteristics().contains(SourceCharacteristics::CAN_SEEK));
        assert!(!source.characteristics().contains(SourceCharacteristics::IS_LIVE));
    }
}
