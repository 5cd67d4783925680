use crate::attributes::Attributes;
use crate::guids::keys;
use crate::media_type::MediaType;
use crate::transform::{
    check_stream, CurrentTypes, OutputStreamInfo, SetTypeFlags, Transform, TransformMessage,
};
use crate::{Error, Result};

/// Copies samples into buffers it owns. Output type always equals input type.
#[derive(Debug)]
pub struct SampleCopier {
    types: CurrentTypes,
}

impl Default for SampleCopier {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleCopier {
    /// New copier with no types set.
    pub fn new() -> Self {
        Self {
            types: CurrentTypes::new(true),
        }
    }
}

impl Transform for SampleCopier {
    fn input_available_type(&self, stream: u32, _index: u32) -> Result<MediaType> {
        check_stream(stream)?;
        Err(Error::NoMoreTypes)
    }

    fn output_available_type(&self, stream: u32, index: u32) -> Result<MediaType> {
        check_stream(stream)?;
        let input = self.types.input()?;
        super::type_at(vec![input], index)
    }

    fn set_input_type(&self, stream: u32, media_type: Option<&MediaType>, flags: SetTypeFlags) -> Result<()> {
        check_stream(stream)?;
        if !flags.contains(SetTypeFlags::TEST_ONLY) {
            self.types.set_input(media_type);
        }
        Ok(())
    }

    fn set_output_type(&self, stream: u32, media_type: Option<&MediaType>, flags: SetTypeFlags) -> Result<()> {
        check_stream(stream)?;
        if let Some(media_type) = media_type {
            let input = self.types.input()?;
            if *media_type != input {
                return Err(super::reject(media_type, "copier output must equal its input"));
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

    fn attributes(&self) -> Option<Attributes> {
        let mut attributes = Attributes::new();
        attributes.set_u32(keys::SUPPORT_DYNAMIC_FORMAT_CHANGE, 1);
        Some(attributes)
    }

    fn process_message(&self, _message: TransformMessage) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guids::subtypes;

    #[test]
    fn test_output_mirrors_input() {
        let copier = SampleCopier::new();
        let rgb = MediaType::video_frame(subtypes::RGB32, 320, 240);
        copier.set_input_type(0, Some(&rgb), SetTypeFlags::empty()).unwrap();
        assert_eq!(copier.output_available_type(0, 0).unwrap(), rgb);
        assert!(copier
            .set_output_type(0, Some(&MediaType::video(subtypes::NV12)), SetTypeFlags::empty())
            .is_err());
        copier.set_output_type(0, Some(&rgb), SetTypeFlags::empty()).unwrap();
        assert!(copier.attributes().unwrap().flag(&keys::SUPPORT_DYNAMIC_FORMAT_CHANGE));
    }
}
