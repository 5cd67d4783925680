use crate::guids::{class_ids, keys, subtypes, Guid};
use crate::media_type::MediaType;
use crate::transform::{
    check_stream, CurrentTypes, OutputStreamInfo, SetTypeFlags, Transform, TransformMessage,
};
use crate::Result;

use super::{reject, type_at};

/// Decoded subtypes in enumeration order.
const OUTPUT_SUBTYPES: [Guid; 5] = [
    subtypes::NV12,
    subtypes::YV12,
    subtypes::IYUV,
    subtypes::I420,
    subtypes::YUY2,
];

const PROGRESSIVE_OR_INTERLACED: u32 = 7;

/// H.264 video decoder.
#[derive(Debug)]
pub struct VideoDecoder {
    types: CurrentTypes,
}

impl Default for VideoDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoDecoder {
    /// Decoded subtypes, in enumeration order.
    pub const OUTPUT_SUBTYPES: &'static [Guid] = &OUTPUT_SUBTYPES;

    /// New decoder with no types set.
    pub fn new() -> Self {
        Self {
            types: CurrentTypes::new(true),
        }
    }

    /// Class id.
    pub fn class_id(&self) -> Guid {
        class_ids::H264_DECODER
    }

    fn check_input(media_type: &MediaType) -> Result<()> {
        if media_type.is_video() && media_type.subtype().ok() == Some(subtypes::H264) {
            Ok(())
        } else {
            Err(reject(media_type, "not H.264"))
        }
    }

    fn decoded_type(input: &MediaType, subtype: Guid) -> MediaType {
        let (rate_num, rate_den) = input
            .attributes()
            .get_ratio(&keys::FRAME_RATE)
            .unwrap_or((30000, 1001));
        let mut decoded = MediaType::video(subtype)
            .with_ratio(keys::FRAME_RATE, rate_num, rate_den)
            .with_ratio(keys::PIXEL_ASPECT_RATIO, 1, 1)
            .with_u32(keys::ALL_SAMPLES_INDEPENDENT, 1)
            .with_u32(keys::FIXED_SIZE_SAMPLES, 1)
            .with_u32(keys::INTERLACE_MODE, PROGRESSIVE_OR_INTERLACED);
        if let Some((width, height)) = input.frame_size() {
            let (sample_size, stride) = if subtype == subtypes::YUY2 {
                (width * height * 2, width * 2)
            } else {
                (width * height * 3 / 2, width)
            };
            decoded = decoded
                .with_ratio(keys::FRAME_SIZE, width, height)
                .with_u32(keys::SAMPLE_SIZE, sample_size)
                .with_u32(keys::DEFAULT_STRIDE, stride);
        }
        decoded
    }
}

impl Transform for VideoDecoder {
    fn input_available_type(&self, stream: u32, index: u32) -> Result<MediaType> {
        check_stream(stream)?;
        type_at(vec![MediaType::video(subtypes::H264)], index)
    }

    fn output_available_type(&self, stream: u32, index: u32) -> Result<MediaType> {
        check_stream(stream)?;
        let input = self.types.input()?;
        let decoded = OUTPUT_SUBTYPES
            .iter()
            .map(|subtype| Self::decoded_type(&input, *subtype))
            .collect();
        type_at(decoded, index)
    }

    fn set_input_type(&self, stream: u32, media_type: Option<&MediaType>, flags: SetTypeFlags) -> Result<()> {
        check_stream(stream)?;
        if let Some(media_type) = media_type {
            Self::check_input(media_type)?;
        }
        if !flags.contains(SetTypeFlags::TEST_ONLY) {
            self.types.set_input(media_type);
        }
        Ok(())
    }

    fn set_output_type(&self, stream: u32, media_type: Option<&MediaType>, flags: SetTypeFlags) -> Result<()> {
        check_stream(stream)?;
        if let Some(media_type) = media_type {
            let input = self.types.input()?;
            let subtype = media_type.subtype().ok();
            if !media_type.is_video() || !subtype.map(|s| OUTPUT_SUBTYPES.contains(&s)).unwrap_or(false) {
                return Err(reject(media_type, "not a decoded subtype"));
            }
            if let (Some(wanted), Some(actual)) = (media_type.frame_size(), input.frame_size()) {
                if wanted != actual {
                    return Err(reject(media_type, "decoder does not scale"));
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
