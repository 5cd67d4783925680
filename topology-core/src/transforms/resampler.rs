use crate::guids::{keys, subtypes};
use crate::media_type::MediaType;
use crate::transform::{
    check_stream, CurrentTypes, OutputStreamInfo, SetTypeFlags, Transform, TransformMessage,
};
use crate::Result;

use super::{is_sample_audio, reject, type_at};

/// Audio resampler and sample format converter.
#[derive(Debug)]
pub struct Resampler {
    types: CurrentTypes,
}

impl Default for Resampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Resampler {
    /// New resampler with no types set.
    pub fn new() -> Self {
        Self {
            types: CurrentTypes::new(false),
        }
    }

    fn check(media_type: &MediaType) -> Result<(u32, u32)> {
        if !is_sample_audio(media_type) {
            return Err(reject(media_type, "resampler handles PCM or float"));
        }
        match (media_type.sample_rate(), media_type.channels()) {
            (Some(rate), Some(channels)) => Ok((rate, channels)),
            _ => Err(reject(media_type, "missing rate or channel count")),
        }
    }

    fn output_types(rate: u32, channels: u32) -> Vec<MediaType> {
        [
            MediaType::audio_float(rate, channels),
            MediaType::audio_pcm(rate, channels, 16),
            MediaType::audio_float(48000, 2),
            MediaType::audio_pcm(48000, 2, 16),
        ]
        .into_iter()
        .map(|t| {
            t.with_u32(keys::ALL_SAMPLES_INDEPENDENT, 1)
                .with_u32(keys::AUDIO_PREFER_WAVEFORMATEX, 1)
        })
        .collect()
    }
}

impl Transform for Resampler {
    fn input_available_type(&self, stream: u32, index: u32) -> Result<MediaType> {
        check_stream(stream)?;
        type_at(
            vec![MediaType::audio(subtypes::FLOAT), MediaType::audio(subtypes::PCM)],
            index,
        )
    }

    fn output_available_type(&self, stream: u32, index: u32) -> Result<MediaType> {
        check_stream(stream)?;
        let (rate, channels) = Self::check(&self.types.input()?)?;
        type_at(Self::output_types(rate, channels), index)
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
            if !is_sample_audio(media_type) {
                return Err(reject(media_type, "resampler produces PCM or float"));
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
    use crate::Error;

    #[test]
    fn test_output_accepted_before_input() {
        let resampler = Resampler::new();
        let pcm48 = MediaType::audio_pcm(48000, 1, 8);
        resampler.set_output_type(0, Some(&pcm48), SetTypeFlags::empty()).unwrap();
        assert_eq!(resampler.output_current_type(0).unwrap(), pcm48);

        resampler
            .set_input_type(0, Some(&MediaType::audio_pcm(44100, 1, 8)), SetTypeFlags::empty())
            .unwrap();
        assert_eq!(resampler.output_current_type(0).unwrap(), pcm48);
    }

    #[test]
    fn test_enumerated_outputs() {
        let resampler = Resampler::new();
        assert!(matches!(resampler.output_available_type(0, 0), Err(Error::TypeNotSet)));

        resampler
            .set_input_type(0, Some(&MediaType::audio_pcm(44100, 1, 8)), SetTypeFlags::empty())
            .unwrap();
        let first = resampler.output_available_type(0, 0).unwrap();
        assert_eq!(first.subtype().unwrap(), subtypes::FLOAT);
        assert_eq!(first.sample_rate(), Some(44100));
        assert_eq!(first.u32_value(&keys::AUDIO_PREFER_WAVEFORMATEX), Some(1));

        let last = resampler.output_available_type(0, 3).unwrap();
        assert!(last.satisfies(&MediaType::audio_pcm(48000, 2, 16)));
        assert!(matches!(resampler.output_available_type(0, 4), Err(Error::NoMoreTypes)));
    }

    #[test]
    fn test_rejects_compressed_input() {
        let resampler = Resampler::new();
        let mp3 = MediaType::audio(subtypes::MP3)
            .with_u32(keys::AUDIO_SAMPLES_PER_SECOND, 44100)
            .with_u32(keys::AUDIO_NUM_CHANNELS, 2);
        assert!(resampler.set_input_type(0, Some(&mp3), SetTypeFlags::TEST_ONLY).is_err());
    }
}
