//! Transform registry
//!
//! Catalogue of transforms the insertion engine may instantiate, keyed by
//! category and registered input/output types. Enumeration returns matches in
//! registration order, so the first registered transform wins a tie.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::guids::{class_ids, major_types, subtypes, Guid};
use crate::media_type::MediaType;
use crate::transform::Transform;
use crate::transforms::{AudioDecoder, ColorConverter, Resampler, SampleCopier, VideoDecoder};
use crate::{Error, Result};

// =============================================================================
// Registration records
// =============================================================================

/// Transform categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformCategory {
    /// Compressed audio to PCM/float
    AudioDecoder,
    /// Compressed video to raw video
    VideoDecoder,
    /// Raw audio to raw audio
    AudioEffect,
    /// Raw video to raw video
    VideoProcessor,
    /// Anything else (copiers)
    Other,
}

/// A registered input or output type. No subtype means any subtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRegistration {
    /// Major type
    pub major: Guid,
    /// Subtype, if restricted
    pub subtype: Option<Guid>,
}

impl TypeRegistration {
    /// Registration for one major/subtype pair.
    pub fn new(major: Guid, subtype: Guid) -> Self {
        Self {
            major,
            subtype: Some(subtype),
        }
    }

    /// Whether `media_type` falls under this registration.
    pub fn matches(&self, media_type: &MediaType) -> bool {
        if media_type.major_type().ok() != Some(self.major) {
            return false;
        }
        match self.subtype {
            Some(subtype) => media_type.subtype().ok() == Some(subtype),
            None => true,
        }
    }
}

/// Creates a fresh transform instance.
pub type TransformFactory = Arc<dyn Fn() -> Arc<dyn Transform> + Send + Sync>;

/// Registry entry.
#[derive(Clone)]
pub struct TransformInfo {
    /// Class id
    pub class_id: Guid,
    /// Readable name
    pub name: String,
    /// Category
    pub category: TransformCategory,
    /// Accepted inputs; empty accepts anything
    pub inputs: Vec<TypeRegistration>,
    /// Produced outputs; empty produces anything
    pub outputs: Vec<TypeRegistration>,
    /// Instance factory
    pub factory: TransformFactory,
}

impl TransformInfo {
    /// Entry with no type restrictions.
    pub fn new<F>(class_id: Guid, name: impl Into<String>, category: TransformCategory, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Transform> + Send + Sync + 'static,
    {
        Self {
            class_id,
            name: name.into(),
            category,
            inputs: Vec::new(),
            outputs: Vec::new(),
            factory: Arc::new(factory),
        }
    }

    /// Register input types.
    pub fn with_inputs(mut self, major: Guid, subtypes: &[Guid]) -> Self {
        self.inputs
            .extend(subtypes.iter().map(|s| TypeRegistration::new(major, *s)));
        self
    }

    /// Register output types.
    pub fn with_outputs(mut self, major: Guid, subtypes: &[Guid]) -> Self {
        self.outputs
            .extend(subtypes.iter().map(|s| TypeRegistration::new(major, *s)));
        self
    }

    fn accepts(&self, media_type: &MediaType) -> bool {
        self.inputs.is_empty() || self.inputs.iter().any(|r| r.matches(media_type))
    }

    fn produces(&self, media_type: &MediaType) -> bool {
        self.outputs.is_empty() || self.outputs.iter().any(|r| r.matches(media_type))
    }

    /// New instance.
    pub fn create(&self) -> Arc<dyn Transform> {
        (self.factory)()
    }
}

impl fmt::Debug for TransformInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformInfo")
            .field("class_id", &self.class_id)
            .field("name", &self.name)
            .field("category", &self.category)
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .finish()
    }
}

// =============================================================================
// Registry trait
// =============================================================================

/// Registry of transforms available for insertion.
pub trait TransformRegistry: Send + Sync {
    /// Add an entry after the existing ones.
    fn register(&mut self, info: TransformInfo);

    /// Entries of `category` accepting `input` and producing `output`, in
    /// registration order. `None` matches anything.
    fn enumerate(
        &self,
        category: TransformCategory,
        input: Option<&MediaType>,
        output: Option<&MediaType>,
    ) -> Vec<&TransformInfo>;

    /// Entry with class id `class_id`.
    fn find_by_class(&self, class_id: &Guid) -> Option<&TransformInfo>;

    /// Instantiate the transform with class id `class_id`.
    fn create(&self, class_id: &Guid) -> Result<Arc<dyn Transform>> {
        self.find_by_class(class_id)
            .map(|info| info.create())
            .ok_or_else(|| Error::NotFound(format!("transform class {}", crate::guids::display_name(class_id))))
    }
}

// =============================================================================
// System registry
// =============================================================================

/// Registry pre-populated with the built-in decoders and converters.
#[derive(Debug, Default)]
pub struct SystemTransformRegistry {
    entries: Vec<TransformInfo>,
}

impl SystemTransformRegistry {
    /// Registry with the built-in transforms.
    pub fn new() -> Self {
        let mut registry = Self::empty();

        registry.register(
            TransformInfo::new(class_ids::MP3_DECODER, "MP3 decoder", TransformCategory::AudioDecoder, || {
                Arc::new(AudioDecoder::mp3())
            })
            .with_inputs(major_types::AUDIO, &[subtypes::MP3])
            .with_outputs(major_types::AUDIO, &[subtypes::FLOAT, subtypes::PCM]),
        );

        registry.register(
            TransformInfo::new(class_ids::AAC_DECODER, "AAC decoder", TransformCategory::AudioDecoder, || {
                Arc::new(AudioDecoder::aac())
            })
            .with_inputs(major_types::AUDIO, &[subtypes::AAC])
            .with_outputs(major_types::AUDIO, &[subtypes::FLOAT, subtypes::PCM]),
        );

        registry.register(
            TransformInfo::new(class_ids::H264_DECODER, "H.264 decoder", TransformCategory::VideoDecoder, || {
                Arc::new(VideoDecoder::new())
            })
            .with_inputs(major_types::VIDEO, &[subtypes::H264])
            .with_outputs(major_types::VIDEO, VideoDecoder::OUTPUT_SUBTYPES),
        );

        registry.register(
            TransformInfo::new(class_ids::RESAMPLER, "Resampler", TransformCategory::AudioEffect, || {
                Arc::new(Resampler::new())
            })
            .with_inputs(major_types::AUDIO, &[subtypes::PCM, subtypes::FLOAT])
            .with_outputs(major_types::AUDIO, &[subtypes::PCM, subtypes::FLOAT]),
        );

        registry.register(
            TransformInfo::new(
                class_ids::COLOR_CONVERTER,
                "Color converter",
                TransformCategory::VideoProcessor,
                || Arc::new(ColorConverter::new()),
            )
            .with_inputs(major_types::VIDEO, ColorConverter::SUBTYPES)
            .with_outputs(major_types::VIDEO, ColorConverter::SUBTYPES),
        );

        registry.register(
            TransformInfo::new(
                class_ids::VIDEO_PROCESSOR,
                "Video processor",
                TransformCategory::VideoProcessor,
                || Arc::new(ColorConverter::video_processor()),
            )
            .with_inputs(major_types::VIDEO, ColorConverter::SUBTYPES)
            .with_outputs(major_types::VIDEO, ColorConverter::SUBTYPES),
        );

        registry.register(TransformInfo::new(
            class_ids::SAMPLE_COPIER,
            "Sample copier",
            TransformCategory::Other,
            || Arc::new(SampleCopier::new()),
        ));

        registry
    }

    /// Registry with no entries.
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop the entry with class id `class_id`, if any.
    pub fn unregister(&mut self, class_id: &Guid) -> Option<TransformInfo> {
        let index = self.entries.iter().position(|e| e.class_id == *class_id)?;
        Some(self.entries.remove(index))
    }
}

impl TransformRegistry for SystemTransformRegistry {
    fn register(&mut self, info: TransformInfo) {
        tracing::debug!(name = %info.name, category = ?info.category, "Registered transform");
        self.entries.push(info);
    }

    fn enumerate(
        &self,
        category: TransformCategory,
        input: Option<&MediaType>,
        output: Option<&MediaType>,
    ) -> Vec<&TransformInfo> {
        self.entries
            .iter()
            .filter(|e| e.category == category)
            .filter(|e| input.map(|t| e.accepts(t)).unwrap_or(true))
            .filter(|e| output.map(|t| e.produces(t)).unwrap_or(true))
            .collect()
    }

    fn find_by_class(&self, class_id: &Guid) -> Option<&TransformInfo> {
        self.entries.iter().find(|e| e.class_id == *class_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guids::keys;

    #[test]
    fn test_enumerate_in_registration_order() {
        let registry = SystemTransformRegistry::new();
        let nv12 = MediaType::video(subtypes::NV12);
        let found: Vec<Guid> = registry
            .enumerate(TransformCategory::VideoProcessor, Some(&nv12), None)
            .iter()
            .map(|e| e.class_id)
            .collect();
        assert_eq!(found, vec![class_ids::COLOR_CONVERTER, class_ids::VIDEO_PROCESSOR]);
    }

    #[test]
    fn test_enumerate_filters_by_input() {
        let registry = SystemTransformRegistry::new();
        let mp3 = MediaType::audio(subtypes::MP3).with_u32(keys::AUDIO_NUM_CHANNELS, 2);
        assert!(registry
            .enumerate(TransformCategory::AudioEffect, Some(&mp3), None)
            .is_empty());
        let decoders = registry.enumerate(TransformCategory::AudioDecoder, Some(&mp3), None);
        assert_eq!(decoders.len(), 1);
        assert_eq!(decoders[0].class_id, class_ids::MP3_DECODER);
    }

    #[test]
    fn test_create_and_unregister() {
        let mut registry = SystemTransformRegistry::new();
        assert!(registry.create(&class_ids::RESAMPLER).is_ok());
        assert!(registry.unregister(&class_ids::RESAMPLER).is_some());
        assert!(matches!(registry.create(&class_ids::RESAMPLER), Err(Error::NotFound(_))));
        assert!(SystemTransformRegistry::empty().is_empty());
    }
}
