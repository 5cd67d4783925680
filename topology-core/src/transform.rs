//! Transform contract: decoders, converters, copiers and user transforms
//!
//! A transform exposes independently enumerable input and output types,
//! independently settable current types, per-stream output info and a
//! control message channel. Type enumeration is index based and ends with
//! [`Error::NoMoreTypes`](crate::Error::NoMoreTypes).

use bitflags::bitflags;
use parking_lot::Mutex;

use crate::attributes::Attributes;
use crate::device_manager::DeviceManagerToken;
use crate::media_type::MediaType;
use crate::{Error, Result};

bitflags! {
    /// Flags for `set_input_type` / `set_output_type`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SetTypeFlags: u32 {
        /// Validate only; leave the current type untouched
        const TEST_ONLY = 0x1;
    }
}

bitflags! {
    /// Output stream capability flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OutputStreamFlags: u32 {
        /// Each sample holds whole units
        const WHOLE_SAMPLES = 0x1;
        /// One unit per buffer
        const SINGLE_SAMPLE_PER_BUFFER = 0x2;
        /// All samples have the same size
        const FIXED_SAMPLE_SIZE = 0x4;
        /// Output may be discarded
        const DISCARDABLE = 0x8;
        /// Stream is optional
        const OPTIONAL = 0x10;
        /// Transform always allocates its own samples
        const PROVIDES_SAMPLES = 0x100;
        /// Transform may allocate its own samples
        const CAN_PROVIDE_SAMPLES = 0x200;
        /// Output can be read lazily
        const LAZY_READ = 0x400;
        /// Stream can be removed
        const REMOVABLE = 0x800;
    }
}

/// Output stream requirements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputStreamInfo {
    /// Capability flags
    pub flags: OutputStreamFlags,
    /// Minimum buffer size
    pub size: u32,
    /// Buffer alignment
    pub alignment: u32,
}

impl OutputStreamInfo {
    /// Whether output samples may be owned by the transform.
    pub fn allocates_samples(&self) -> bool {
        self.flags
            .intersects(OutputStreamFlags::PROVIDES_SAMPLES | OutputStreamFlags::CAN_PROVIDE_SAMPLES)
    }
}

/// Control messages.
#[derive(Debug, Clone)]
pub enum TransformMessage {
    /// Hand over (or revoke) a device manager
    SetD3DManager(Option<DeviceManagerToken>),
    /// Drop pending data
    CommandFlush,
    /// Produce all pending output
    CommandDrain,
    /// Streaming is about to start
    NotifyBeginStreaming,
    /// Streaming has ended
    NotifyEndStreaming,
}

/// A media transform.
pub trait Transform: Send + Sync {
    /// Input and output stream counts.
    fn stream_counts(&self) -> (u32, u32) {
        (1, 1)
    }

    /// Input type the transform can accept at `index`.
    fn input_available_type(&self, stream: u32, index: u32) -> Result<MediaType>;

    /// Output type the transform can produce at `index`.
    fn output_available_type(&self, stream: u32, index: u32) -> Result<MediaType>;

    /// Set, test or clear the input type.
    fn set_input_type(&self, stream: u32, media_type: Option<&MediaType>, flags: SetTypeFlags) -> Result<()>;

    /// Set, test or clear the output type.
    fn set_output_type(&self, stream: u32, media_type: Option<&MediaType>, flags: SetTypeFlags) -> Result<()>;

    /// Current input type, or [`Error::TypeNotSet`].
    fn input_current_type(&self, stream: u32) -> Result<MediaType>;

    /// Current output type, or [`Error::TypeNotSet`].
    fn output_current_type(&self, stream: u32) -> Result<MediaType>;

    /// Output stream requirements.
    fn output_stream_info(&self, stream: u32) -> Result<OutputStreamInfo>;

    /// Static transform attributes (device awareness, dynamic format change).
    fn attributes(&self) -> Option<Attributes> {
        None
    }

    /// Handle a control message.
    fn process_message(&self, message: TransformMessage) -> Result<()>;
}

// =============================================================================
// Current type bookkeeping
// =============================================================================

/// Current input/output types of a single-stream transform.
///
/// Clearing the input always clears the output. Setting a new input also
/// clears the output when `input_resets_output` holds, which is the case
/// for every transform whose output is not audio.
#[derive(Debug, Default)]
pub struct CurrentTypes {
    state: Mutex<(Option<MediaType>, Option<MediaType>)>,
    input_resets_output: bool,
}

impl CurrentTypes {
    /// New bookkeeping. See the type docs for `input_resets_output`.
    pub fn new(input_resets_output: bool) -> Self {
        Self {
            state: Mutex::new((None, None)),
            input_resets_output,
        }
    }

    /// Commit an input type.
    pub fn set_input(&self, media_type: Option<&MediaType>) {
        let mut state = self.state.lock();
        state.0 = media_type.cloned();
        if media_type.is_none() || self.input_resets_output {
            state.1 = None;
        }
    }

    /// Commit an output type.
    pub fn set_output(&self, media_type: Option<&MediaType>) {
        self.state.lock().1 = media_type.cloned();
    }

    /// Current input.
    pub fn input(&self) -> Result<MediaType> {
        self.state.lock().0.clone().ok_or(Error::TypeNotSet)
    }

    /// Current output.
    pub fn output(&self) -> Result<MediaType> {
        self.state.lock().1.clone().ok_or(Error::TypeNotSet)
    }
}

/// Reject any stream but 0.
pub fn check_stream(stream: u32) -> Result<()> {
    if stream == 0 {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!("invalid stream {}", stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clearing_input_clears_output() {
        let types = CurrentTypes::new(false);
        types.set_input(Some(&MediaType::audio_pcm(44100, 1, 8)));
        types.set_output(Some(&MediaType::audio_pcm(48000, 1, 8)));

        types.set_input(Some(&MediaType::audio_pcm(22050, 1, 8)));
        assert!(types.output().is_ok(), "audio output survives an input change");

        types.set_input(None);
        assert!(matches!(types.output(), Err(Error::TypeNotSet)));
    }

    #[test]
    fn test_input_change_resets_video_output() {
        let types = CurrentTypes::new(true);
        types.set_output(Some(&MediaType::video(crate::guids::subtypes::RGB32)));
        types.set_input(Some(&MediaType::video(crate::guids::subtypes::NV12)));
        assert!(types.output().is_err());
        assert!(types.input().is_ok());
    }

    #[test]
    fn test_allocates_samples() {
        let info = OutputStreamInfo {
            flags: OutputStreamFlags::CAN_PROVIDE_SAMPLES,
            ..Default::default()
        };
        assert!(info.allocates_samples());
        assert!(!OutputStreamInfo::default().allocates_samples());
    }
}
