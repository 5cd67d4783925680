//! Color converter and video processor

use crate::guids::{class_ids, subtypes, Guid};
use crate::media_type::MediaType;
use crate::transform::{
    check_stream, CurrentTypes, OutputStreamInfo, SetTypeFlags, Transform, TransformMessage,
};
use crate::Result;

use super::{reject, type_at};

/// Raw video formats both converters handle, RGB32 first.
const VIDEO_SUBTYPES: [Guid; 11] = [
    subtypes::RGB32,
    subtypes::ARGB32,
    subtypes::RGB24,
    subtypes::RGB555,
    subtypes::RGB565,
    subtypes::NV12,
    subtypes::YUY2,
    subtypes::I420,
    subtypes::YV12,
    subtypes::IYUV,
    subtypes::UYVY,
];

/// Raw video format converter.
///
/// The color converter keeps the frame size; the video processor variant
/// may also scale. Neither accepts the legacy DMO RGB32 subtype.
#[derive(Debug)]
pub struct ColorConverter {
    class_id: Guid,
    can_resize: bool,
    types: CurrentTypes,
}

impl ColorConverter {
    /// Handled subtypes, on both sides.
    pub const SUBTYPES: &'static [Guid] = &VIDEO_SUBTYPES;

    /// Color converter: format changes only.
    pub fn new() -> Self {
        Self {
            class_id: class_ids::COLOR_CONVERTER,
            can_resize: false,
            types: CurrentTypes::new(true),
        }
    }

    /// Video processor: format changes and scaling.
    pub fn video_processor() -> Self {
        Self {
            class_id: class_ids::VIDEO_PROCESSOR,
            can_resize: true,
            types: CurrentTypes::new(true),
        }
    }

    /// Class id.
    pub fn class_id(&self) -> Guid {
        self.class_id
    }

    fn check(media_type: &MediaType) -> Result<()> {
        let known = media_type
            .subtype()
            .map(|s| VIDEO_SUBTYPES.contains(&s))
            .unwrap_or(false);
        if media_type.is_video() && known {
            Ok(())
        } else {
            Err(reject(media_type, "unsupported video format"))
        }
    }
}

impl Default for ColorConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for ColorConverter {
    fn input_available_type(&self, stream: u32, index: u32) -> Result<MediaType> {
        check_stream(stream)?;
        type_at(VIDEO_SUBTYPES.iter().map(|s| MediaType::video(*s)).collect(), index)
    }

    fn output_available_type(&self, stream: u32, index: u32) -> Result<MediaType> {
        check_stream(stream)?;
        let frame_size = self.types.input().ok().and_then(|t| t.frame_size());
        let outputs = VIDEO_SUBTYPES
            .iter()
            .map(|s| match frame_size {
                Some((width, height)) => MediaType::video_frame(*s, width, height),
                None => MediaType::video(*s),
            })
            .collect();
        type_at(outputs, index)
    }

    fn set_input_type(&self, stream: u32, media_type: Option<&MediaType>, flags: SetTypeFlags) -> Result<()> {
        check_stream(stream)?;
        if let Some(media_type) = media_type {
            Self::check(media_type)?;
        }
        if !flags.contains(SetTypeFlags::TEST_ONLY) {
            self.types.set_input(media_type);
        }
        Ok(())
    }

    fn set_output_type(&self, stream: u32, media_type: Option<&MediaType>, flags: SetTypeFlags) -> Result<()> {
        check_stream(stream)?;
        if let Some(media_type) = media_type {
            Self::check(media_type)?;
            if !self.can_resize {
                let input_size = self.types.input().ok().and_then(|t| t.frame_size());
                if let (Some(wanted), Some(actual)) = (media_type.frame_size(), input_size) {
                    if wanted != actual {
                        return Err(reject(media_type, "color converter does not scale"));
                    }
                }
            }
        }
        if !flags.contains(SetTypeFlags::TEST_ONLY) {
            self.types.set_output(media_type);
        }
        Ok(())
    }

    fn input_current_type(&self, stream: u32) -> Result<MediaType> {
        check_stream(stream)?;
        self.types.input()
    }

    fn output_current_type(&self, stream: u32) -> Result<MediaType> {
        check_stream(stream)?;
        self.types.output()
    }

    fn output_stream_info(&self, stream: u32) -> Result<OutputStreamInfo> {
        check_stream(stream)?;
        Ok(OutputStreamInfo::default())
    }

    fn process_message(&self, _message: TransformMessage) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_dmo_rgb32() {
        let converter = ColorConverter::new();
        let dmo = MediaType::video_frame(subtypes::DMO_RGB32, 1280, 720);
        assert!(converter.set_output_type(0, Some(&dmo), SetTypeFlags::TEST_ONLY).is_err());
        assert!(ColorConverter::video_processor()
            .set_output_type(0, Some(&dmo), SetTypeFlags::TEST_ONLY)
            .is_err());
    }

    #[test]
    fn test_frame_size_rules() {
        let i420 = MediaType::video_frame(subtypes::I420, 1280, 720);
        let small = MediaType::video_frame(subtypes::RGB32, 1024, 576);
        let test = SetTypeFlags::TEST_ONLY;

        let converter = ColorConverter::new();
        converter.set_input_type(0, Some(&i420), SetTypeFlags::empty()).unwrap();
        assert!(converter.set_output_type(0, Some(&small), test).is_err());
        assert!(converter.set_output_type(0, Some(&MediaType::video(subtypes::RGB32)), test).is_ok());

        let processor = ColorConverter::video_processor();
        processor.set_input_type(0, Some(&i420), SetTypeFlags::empty()).unwrap();
        assert!(processor.set_output_type(0, Some(&small), test).is_ok());
    }

    #[test]
    fn test_enumerated_outputs_copy_frame_size() {
        let converter = ColorConverter::new();
        converter
            .set_input_type(0, Some(&MediaType::video_frame(subtypes::NV12, 640, 480)), SetTypeFlags::empty())
            .unwrap();
        let first = converter.output_available_type(0, 0).unwrap();
        assert_eq!(first, MediaType::video_frame(subtypes::RGB32, 640, 480));
    }
}
