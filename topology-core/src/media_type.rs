//! Media types as attribute bags
//!
//! A media type is compatible with a constraint when every attribute the
//! constraint carries is present and equal in the type ("match our items").
//! Extra attributes on the candidate are ignored.
//!
//! # Example
//!
//! ```
//! use topoload_core::media_type::MediaType;
//!
//! let offered = MediaType::audio_pcm(48000, 2, 16);
//! let wanted = MediaType::audio(topoload_core::guids::subtypes::PCM)
//!     .with_u32(topoload_core::guids::keys::AUDIO_SAMPLES_PER_SECOND, 48000);
//!
//! assert!(offered.satisfies(&wanted));
//! assert!(!wanted.satisfies(&offered));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attributes::Attributes;
use crate::guids::{self, keys, major_types, subtypes, Guid};
use crate::Result;

/// Subtypes that carry uncompressed samples.
const RAW_SUBTYPES: &[Guid] = &[
    subtypes::PCM,
    subtypes::FLOAT,
    subtypes::NV12,
    subtypes::I420,
    subtypes::IYUV,
    subtypes::YV12,
    subtypes::YUY2,
    subtypes::UYVY,
    subtypes::RGB32,
    subtypes::ARGB32,
    subtypes::RGB24,
    subtypes::RGB565,
    subtypes::RGB555,
    subtypes::DMO_RGB32,
];

/// A media type description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaType {
    attributes: Attributes,
}

impl MediaType {
    /// Empty media type.
    pub fn new() -> Self {
        Self::default()
    }

    /// Media type with a major type only.
    pub fn with_major(major: Guid) -> Self {
        Self::new().with_guid(keys::MAJOR_TYPE, major)
    }

    /// Media type with major type and subtype.
    pub fn with_subtype(major: Guid, subtype: Guid) -> Self {
        Self::with_major(major).with_guid(keys::SUBTYPE, subtype)
    }

    /// Audio type with the given subtype and nothing else.
    pub fn audio(subtype: Guid) -> Self {
        Self::with_subtype(major_types::AUDIO, subtype)
    }

    /// Video type with the given subtype and nothing else.
    pub fn video(subtype: Guid) -> Self {
        Self::with_subtype(major_types::VIDEO, subtype)
    }

    /// Fully described interleaved integer PCM.
    pub fn audio_pcm(sample_rate: u32, channels: u32, bits_per_sample: u32) -> Self {
        let block = channels * bits_per_sample / 8;
        Self::audio(subtypes::PCM)
            .with_u32(keys::AUDIO_NUM_CHANNELS, channels)
            .with_u32(keys::AUDIO_SAMPLES_PER_SECOND, sample_rate)
            .with_u32(keys::AUDIO_AVG_BYTES_PER_SECOND, block * sample_rate)
            .with_u32(keys::AUDIO_BLOCK_ALIGNMENT, block)
            .with_u32(keys::AUDIO_BITS_PER_SAMPLE, bits_per_sample)
    }

    /// Fully described 32-bit float audio.
    pub fn audio_float(sample_rate: u32, channels: u32) -> Self {
        let block = channels * 4;
        Self::audio(subtypes::FLOAT)
            .with_u32(keys::AUDIO_NUM_CHANNELS, channels)
            .with_u32(keys::AUDIO_SAMPLES_PER_SECOND, sample_rate)
            .with_u32(keys::AUDIO_AVG_BYTES_PER_SECOND, block * sample_rate)
            .with_u32(keys::AUDIO_BLOCK_ALIGNMENT, block)
            .with_u32(keys::AUDIO_BITS_PER_SAMPLE, 32)
    }

    /// Video type with a frame size.
    pub fn video_frame(subtype: Guid, width: u32, height: u32) -> Self {
        Self::video(subtype).with_ratio(keys::FRAME_SIZE, width, height)
    }

    /// Wrap an attribute store.
    pub fn from_attributes(attributes: Attributes) -> Self {
        Self { attributes }
    }

    // -------------------------------------------------------------------------
    // Builders
    // -------------------------------------------------------------------------

    /// Add a 32-bit value.
    pub fn with_u32(mut self, key: Guid, value: u32) -> Self {
        self.attributes.set_u32(key, value);
        self
    }

    /// Add a GUID value.
    pub fn with_guid(mut self, key: Guid, value: Guid) -> Self {
        self.attributes.set_guid(key, value);
        self
    }

    /// Add a packed ratio.
    pub fn with_ratio(mut self, key: Guid, numerator: u32, denominator: u32) -> Self {
        self.attributes.set_ratio(key, numerator, denominator);
        self
    }

    /// Remove an attribute.
    pub fn without(mut self, key: &Guid) -> Self {
        self.attributes.delete(key);
        self
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Underlying attributes.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Mutable underlying attributes.
    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    /// Major type GUID.
    pub fn major_type(&self) -> Result<Guid> {
        self.attributes.get_guid(&keys::MAJOR_TYPE)
    }

    /// Subtype GUID.
    pub fn subtype(&self) -> Result<Guid> {
        self.attributes.get_guid(&keys::SUBTYPE)
    }

    /// Whether the major type is audio.
    pub fn is_audio(&self) -> bool {
        self.major_type().map(|m| m == major_types::AUDIO).unwrap_or(false)
    }

    /// Whether the major type is video.
    pub fn is_video(&self) -> bool {
        self.major_type().map(|m| m == major_types::VIDEO).unwrap_or(false)
    }

    /// Whether the subtype is outside the raw sample families.
    pub fn is_compressed(&self) -> bool {
        match self.subtype() {
            Ok(subtype) => !RAW_SUBTYPES.contains(&subtype),
            Err(_) => false,
        }
    }

    /// Optional 32-bit attribute.
    pub fn u32_value(&self, key: &Guid) -> Option<u32> {
        self.attributes.get_u32(key).ok()
    }

    /// Frame size, if present.
    pub fn frame_size(&self) -> Option<(u32, u32)> {
        self.attributes.get_ratio(&keys::FRAME_SIZE).ok()
    }

    /// Sample rate, if present.
    pub fn sample_rate(&self) -> Option<u32> {
        self.u32_value(&keys::AUDIO_SAMPLES_PER_SECOND)
    }

    /// Channel count, if present.
    pub fn channels(&self) -> Option<u32> {
        self.u32_value(&keys::AUDIO_NUM_CHANNELS)
    }

    /// Whether this candidate satisfies `constraint` (match-our-items on the constraint).
    pub fn satisfies(&self, constraint: &MediaType) -> bool {
        constraint.attributes.contained_in(&self.attributes)
    }

    /// Serializable description.
    pub fn summary(&self) -> MediaTypeSummary {
        let mut attributes = self.attributes.to_json();
        attributes.remove("major_type");
        attributes.remove("subtype");
        MediaTypeSummary {
            major: self.major_type().ok().map(|g| guids::display_name(&g)),
            subtype: self.subtype().ok().map(|g| guids::display_name(&g)),
            attributes,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let major = self
            .major_type()
            .map(|g| guids::display_name(&g))
            .unwrap_or_else(|_| "?".to_string());
        let subtype = self
            .subtype()
            .map(|g| guids::display_name(&g))
            .unwrap_or_else(|_| "*".to_string());
        write!(f, "{}/{}", major, subtype)?;
        if let Some(rate) = self.sample_rate() {
            write!(f, " {}Hz", rate)?;
        }
        if let Some(channels) = self.channels() {
            write!(f, " {}ch", channels)?;
        }
        if let Some(bits) = self.u32_value(&keys::AUDIO_BITS_PER_SAMPLE) {
            write!(f, " {}bit", bits)?;
        }
        if let Some((w, h)) = self.frame_size() {
            write!(f, " {}x{}", w, h)?;
        }
        Ok(())
    }
}

/// Readable media type description for reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaTypeSummary {
    /// Major type name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub major: Option<String>,
    /// Subtype name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// Remaining attributes by name
    pub attributes: serde_json::Map<String, serde_json::Value>,
}
