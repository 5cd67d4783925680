use crate::guids::{class_ids, keys, subtypes, Guid};
use crate::media_type::MediaType;
use crate::transform::{
    check_stream, CurrentTypes, OutputStreamInfo, SetTypeFlags, Transform, TransformMessage,
};
use crate::{Error, Result};

use super::{is_sample_audio, reject, type_at};

/// Compressed audio decoder (MP3 or AAC).
///
/// Decodes to float or 16-bit PCM at the input rate. Any sample format is
/// accepted on output as long as the rate matches and the channel count
/// does not grow.
#[derive(Debug)]
pub struct AudioDecoder {
    class_id: Guid,
    input_subtype: Guid,
    types: CurrentTypes,
}

impl AudioDecoder {
    /// MP3 decoder.
    pub fn mp3() -> Self {
        Self::new(class_ids::MP3_DECODER, subtypes::MP3)
    }

    /// AAC decoder.
    pub fn aac() -> Self {
        Self::new(class_ids::AAC_DECODER, subtypes::AAC)
    }

    fn new(class_id: Guid, input_subtype: Guid) -> Self {
        Self {
            class_id,
            input_subtype,
            types: CurrentTypes::new(false),
        }
    }

    /// Class id.
    pub fn class_id(&self) -> Guid {
        self.class_id
    }

    fn check_input(&self, media_type: &MediaType) -> Result<(u32, u32)> {
        if !media_type.is_audio() || media_type.subtype().ok() != Some(self.input_subtype) {
            return Err(reject(media_type, "not decodable"));
        }
        match (media_type.sample_rate(), media_type.channels()) {
            (Some(rate), Some(channels)) if channels > 0 => Ok((rate, channels)),
            _ => Err(reject(media_type, "missing rate or channel count")),
        }
    }

    fn decoded_types(rate: u32, channels: u32) -> Vec<MediaType> {
        let mut float = MediaType::audio_float(rate, channels).with_u32(keys::ALL_SAMPLES_INDEPENDENT, 1);
        if channels == 2 {
            float = float.with_u32(keys::AUDIO_CHANNEL_MASK, 3);
        }
        let pcm = MediaType::audio_pcm(rate, channels, 16).with_u32(keys::ALL_SAMPLES_INDEPENDENT, 1);
        vec![float, pcm]
    }
}

impl Transform for AudioDecoder {
    fn input_available_type(&self, stream: u32, index: u32) -> Result<MediaType> {
        check_stream(stream)?;
        type_at(vec![MediaType::audio(self.input_subtype)], index)
    }

    fn output_available_type(&self, stream: u32, index: u32) -> Result<MediaType> {
        check_stream(stream)?;
        let input = self.types.input()?;
        let (rate, channels) = self.check_input(&input)?;
        type_at(Self::decoded_types(rate, channels), index)
    }

    fn set_input_type(&self, stream: u32, media_type: Option<&MediaType>, flags: SetTypeFlags) -> Result<()> {
        check_stream(stream)?;
        if let Some(media_type) = media_type {
            self.check_input(media_type)?;
        }
        if !flags.contains(SetTypeFlags::TEST_ONLY) {
            self.types.set_input(media_type);
        }
        Ok(())
    }

    fn set_output_type(&self, stream: u32, media_type: Option<&MediaType>, flags: SetTypeFlags) -> Result<()> {
        check_stream(stream)?;
        if let Some(media_type) = media_type {
            let (rate, channels) = self.check_input(&self.types.input()?)?;
            if !is_sample_audio(media_type) {
                return Err(reject(media_type, "decoder produces PCM or float"));
            }
            if media_type.sample_rate() != Some(rate) {
                return Err(reject(media_type, "decoder does not resample"));
            }
            if media_type.channels().map(|c| c == 0 || c > channels).unwrap_or(true) {
                return Err(reject(media_type, "channel count"));
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

    fn process_message(&self, message: TransformMessage) -> Result<()> {
        match message {
            TransformMessage::SetD3DManager(_) => Err(Error::NotImplemented("audio decoder".into())),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mp3(rate: u32, channels: u32) -> MediaType {
        MediaType::audio(subtypes::MP3)
            .with_u32(keys::AUDIO_SAMPLES_PER_SECOND, rate)
            .with_u32(keys::AUDIO_NUM_CHANNELS, channels)
    }

    #[test]
    fn test_decoded_types_follow_input() {
        let decoder = AudioDecoder::mp3();
        assert!(matches!(decoder.output_available_type(0, 0), Err(Error::TypeNotSet)));

        decoder.set_input_type(0, Some(&mp3(44100, 2)), SetTypeFlags::empty()).unwrap();
        let float = decoder.output_available_type(0, 0).unwrap();
        assert_eq!(float.subtype().unwrap(), subtypes::FLOAT);
        assert_eq!(float.sample_rate(), Some(44100));
        assert_eq!(float.u32_value(&keys::AUDIO_CHANNEL_MASK), Some(3));

        let pcm = decoder.output_available_type(0, 1).unwrap();
        assert_eq!(pcm.u32_value(&keys::AUDIO_BITS_PER_SAMPLE), Some(16));
        assert!(matches!(decoder.output_available_type(0, 2), Err(Error::NoMoreTypes)));
    }

    #[test]
    fn test_output_rules() {
        let decoder = AudioDecoder::mp3();
        decoder.set_input_type(0, Some(&mp3(44100, 2)), SetTypeFlags::empty()).unwrap();

        let test = SetTypeFlags::TEST_ONLY;
        assert!(decoder.set_output_type(0, Some(&MediaType::audio_pcm(44100, 1, 16)), test).is_ok());
        assert!(decoder.set_output_type(0, Some(&MediaType::audio_float(48000, 2)), test).is_err());
        assert!(decoder.set_output_type(0, Some(&MediaType::audio_pcm(44100, 6, 16)), test).is_err());
        assert!(decoder.output_current_type(0).is_err());
    }

    #[test]
    fn test_input_rules() {
        let decoder = AudioDecoder::aac();
        let test = SetTypeFlags::TEST_ONLY;
        assert!(decoder.set_input_type(0, Some(&mp3(44100, 2)), test).is_err());
        assert!(decoder
            .set_input_type(0, Some(&MediaType::audio(subtypes::AAC)), test)
            .is_err());
        assert!(decoder.input_current_type(0).is_err());
    }
}
