//! Built-in transforms
//!
//! These are type-negotiation models of the system decoders and converters:
//! they enumerate and accept media types the way the real components do but
//! process no samples.

mod audio_decoder;
mod color_converter;
mod resampler;
mod sample_copier;
mod static_transform;
mod video_decoder;

pub use audio_decoder::AudioDecoder;
pub use color_converter::ColorConverter;
pub use resampler::Resampler;
pub use sample_copier::SampleCopier;
pub use static_transform::StaticTransform;
pub use video_decoder::VideoDecoder;

use crate::guids::subtypes;
use crate::media_type::MediaType;
use crate::{Error, Result};

/// Entry `index` of a computed type list.
pub(crate) fn type_at(types: Vec<MediaType>, index: u32) -> Result<MediaType> {
    types.into_iter().nth(index as usize).ok_or(Error::NoMoreTypes)
}

/// Integer PCM or float audio.
pub(crate) fn is_sample_audio(media_type: &MediaType) -> bool {
    media_type.is_audio()
        && matches!(media_type.subtype(), Ok(s) if s == subtypes::PCM || s == subtypes::FLOAT)
}

pub(crate) fn reject(media_type: &MediaType, reason: &str) -> Error {
    Error::InvalidMediaType(format!("{}: {}", media_type, reason))
}
