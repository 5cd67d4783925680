//! Media type handlers exposed by source streams and stream sinks

use parking_lot::RwLock;

use crate::guids::Guid;
use crate::media_type::MediaType;
use crate::{Error, Result};

/// Type negotiation surface of a source stream or stream sink.
///
/// Enumeration is index based: `media_type_by_index` returns
/// [`Error::NoMoreTypes`] past the last type. Callers may restart from any
/// index.
pub trait MediaTypeHandler: Send + Sync {
    /// Check whether a type can be accepted. Fails with
    /// [`Error::InvalidMediaType`] when it cannot.
    fn is_media_type_supported(&self, media_type: &MediaType) -> Result<()>;

    /// Number of enumerable types.
    fn media_type_count(&self) -> Result<u32>;

    /// Type at `index`.
    fn media_type_by_index(&self, index: u32) -> Result<MediaType>;

    /// Make a type current.
    fn set_current_media_type(&self, media_type: &MediaType) -> Result<()>;

    /// Currently selected type.
    fn current_media_type(&self) -> Result<MediaType>;

    /// Drop the current type.
    fn clear_current_media_type(&self) -> Result<()> {
        Err(Error::NotImplemented("clearing the current type".into()))
    }

    /// Major type handled by this stream.
    fn major_type(&self) -> Result<Guid>;
}

/// Iterate an index-based type enumeration until it reports an error.
///
/// [`Error::NoMoreTypes`] is the normal terminator; any other error also ends
/// the sequence, since a stream that cannot enumerate offers nothing.
pub fn enumerate_types<F>(mut fetch: F) -> impl Iterator<Item = MediaType>
where
    F: FnMut(u32) -> Result<MediaType>,
{
    let mut index = 0u32;
    std::iter::from_fn(move || {
        let item = fetch(index).ok()?;
        index += 1;
        Some(item)
    })
}

/// Every type a handler enumerates, in order.
pub fn handler_types(handler: &dyn MediaTypeHandler) -> Vec<MediaType> {
    enumerate_types(|i| handler.media_type_by_index(i)).collect()
}

// =============================================================================
// Built-in handler
// =============================================================================

#[derive(Debug, Default)]
struct HandlerState {
    types: Vec<MediaType>,
    current: Option<MediaType>,
    support_any: bool,
    rejected: Option<MediaType>,
    enumerable: bool,
}

/// List-backed media type handler.
///
/// Support check order: an explicitly rejected type always fails, then
/// `support_any` accepts everything, then the current type, then each listed
/// type. A type is accepted when it satisfies the handler's type.
#[derive(Debug)]
pub struct StreamTypeHandler {
    state: RwLock<HandlerState>,
}

impl StreamTypeHandler {
    /// Handler enumerating `types`, with no current type.
    pub fn new(types: Vec<MediaType>) -> Self {
        Self {
            state: RwLock::new(HandlerState {
                types,
                enumerable: true,
                ..Default::default()
            }),
        }
    }

    /// Set the initial current type.
    pub fn with_current(self, media_type: MediaType) -> Self {
        self.state.write().current = Some(media_type);
        self
    }

    /// Accept any offered type not explicitly rejected.
    pub fn supporting_any(self) -> Self {
        self.state.write().support_any = true;
        self
    }

    /// Refuse offered types that satisfy `media_type`.
    pub fn rejecting(self, media_type: MediaType) -> Self {
        self.state.write().rejected = Some(media_type);
        self
    }

    /// Hide the type list from enumeration (support checks still consult it).
    pub fn non_enumerable(self) -> Self {
        self.state.write().enumerable = false;
        self
    }

    /// Drop the current type.
    pub fn clear_current(&self) {
        self.state.write().current = None;
    }
}

impl MediaTypeHandler for StreamTypeHandler {
    fn is_media_type_supported(&self, media_type: &MediaType) -> Result<()> {
        let state = self.state.read();
        if let Some(rejected) = &state.rejected {
            if media_type.satisfies(rejected) {
                return Err(Error::InvalidMediaType(format!("{} is refused", media_type)));
            }
        }
        if state.support_any {
            return Ok(());
        }
        if let Some(current) = &state.current {
            if media_type.satisfies(current) {
                return Ok(());
            }
        }
        if state.types.iter().any(|t| media_type.satisfies(t)) {
            return Ok(());
        }
        Err(Error::InvalidMediaType(format!("{} is not supported", media_type)))
    }

    fn media_type_count(&self) -> Result<u32> {
        let state = self.state.read();
        if !state.enumerable {
            return Err(Error::NotImplemented("type enumeration".into()));
        }
        Ok(state.types.len() as u32)
    }

    fn media_type_by_index(&self, index: u32) -> Result<MediaType> {
        let state = self.state.read();
        if !state.enumerable {
            return Err(Error::NotImplemented("type enumeration".into()));
        }
        state
            .types
            .get(index as usize)
            .cloned()
            .ok_or(Error::NoMoreTypes)
    }

    fn set_current_media_type(&self, media_type: &MediaType) -> Result<()> {
        self.state.write().current = Some(media_type.clone());
        Ok(())
    }

    fn current_media_type(&self) -> Result<MediaType> {
        self.state
            .read()
            .current
            .clone()
            .ok_or(Error::NotInitialized)
    }

    fn clear_current_media_type(&self) -> Result<()> {
        self.clear_current();
        Ok(())
    }

    fn major_type(&self) -> Result<Guid> {
        let state = self.state.read();
        state
            .current
            .as_ref()
            .or_else(|| state.types.first())
            .ok_or(Error::NotInitialized)?
            .major_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guids::{major_types, subtypes};

    #[test]
    fn test_enumeration_terminates_with_no_more_types() {
        let handler = StreamTypeHandler::new(vec![
            MediaType::audio_pcm(44100, 1, 8),
            MediaType::audio_pcm(48000, 1, 8),
        ]);
        assert_eq!(handler.media_type_count().unwrap(), 2);
        assert!(matches!(handler.media_type_by_index(2), Err(Error::NoMoreTypes)));
        assert_eq!(handler_types(&handler).len(), 2);
    }

    #[test]
    fn test_support_check_order() {
        let pcm48 = MediaType::audio_pcm(48000, 1, 8);
        let handler = StreamTypeHandler::new(vec![pcm48.clone()])
            .supporting_any()
            .rejecting(MediaType::video(subtypes::I420));

        assert!(handler.is_media_type_supported(&MediaType::audio_pcm(8000, 2, 16)).is_ok());
        assert!(handler
            .is_media_type_supported(&MediaType::video_frame(subtypes::I420, 640, 480))
            .is_err());
    }

    #[test]
    fn test_current_type_is_accepted_without_list() {
        let current = MediaType::audio_float(48000, 2);
        let handler = StreamTypeHandler::new(vec![]).with_current(current.clone());
        assert!(handler.is_media_type_supported(&current).is_ok());
        assert!(handler
            .is_media_type_supported(&MediaType::audio_float(44100, 2))
            .is_err());
        assert_eq!(handler.major_type().unwrap(), major_types::AUDIO);
    }

    #[test]
    fn test_non_enumerable_still_checks_list() {
        let pcm48 = MediaType::audio_pcm(48000, 1, 8);
        let handler = StreamTypeHandler::new(vec![pcm48.clone()]).non_enumerable();
        assert!(handler.media_type_by_index(0).is_err());
        assert!(handler.is_media_type_supported(&pcm48).is_ok());
        assert!(matches!(handler.current_media_type(), Err(Error::NotInitialized)));
    }
}
