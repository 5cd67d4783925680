//! Transform built from fixed type lists
//!
//! Used for transforms described inline in manifests and as a configurable
//! stand-in for real transforms, including device awareness and sample
//! allocation flags.

use parking_lot::Mutex;
use uuid::Uuid;

use crate::attributes::Attributes;
use crate::device_manager::{DeviceApi, DeviceManagerToken};
use crate::guids::{keys, Guid};
use crate::media_type::MediaType;
use crate::transform::{
    check_stream, CurrentTypes, OutputStreamFlags, OutputStreamInfo, SetTypeFlags, Transform,
    TransformMessage,
};
use crate::{Error, Result};

use super::{reject, type_at};

/// Transform described by fixed input and output type lists.
///
/// Inputs are accepted when they satisfy a listed input type; outputs when
/// they satisfy a listed output type, or anything if no output is listed.
/// Device manager messages are recorded so callers can see which transforms
/// received one.
#[derive(Debug)]
pub struct StaticTransform {
    class_id: Guid,
    inputs: Vec<MediaType>,
    outputs: Vec<MediaType>,
    attributes: Attributes,
    output_flags: OutputStreamFlags,
    refuse_device_manager: bool,
    types: CurrentTypes,
    device_manager: Mutex<Option<DeviceManagerToken>>,
    device_manager_messages: Mutex<u32>,
}

impl StaticTransform {
    /// Transform with a random class id.
    pub fn new(inputs: Vec<MediaType>, outputs: Vec<MediaType>) -> Self {
        let audio_output = outputs.first().map(|t| t.is_audio()).unwrap_or(false);
        Self {
            class_id: Uuid::new_v4(),
            inputs,
            outputs,
            attributes: Attributes::new(),
            output_flags: OutputStreamFlags::empty(),
            refuse_device_manager: false,
            types: CurrentTypes::new(!audio_output),
            device_manager: Mutex::new(None),
            device_manager_messages: Mutex::new(0),
        }
    }

    /// Override the class id.
    pub fn with_class_id(mut self, class_id: Guid) -> Self {
        self.class_id = class_id;
        self
    }

    /// Declare awareness of a device API.
    pub fn aware_of(mut self, api: DeviceApi) -> Self {
        self.attributes.set_u32(api.awareness_key(), 1);
        self
    }

    /// Output stream flags reported by `output_stream_info`.
    pub fn with_output_flags(mut self, flags: OutputStreamFlags) -> Self {
        self.output_flags = flags;
        self
    }

    /// Start with a current output type.
    pub fn with_current_output(self, media_type: MediaType) -> Self {
        self.types.set_output(Some(&media_type));
        self
    }

    /// Start with a current input type.
    pub fn with_current_input(self, media_type: MediaType) -> Self {
        self.types.set_input(Some(&media_type));
        self
    }

    /// Fail every `SetD3DManager` message.
    pub fn refusing_device_manager(mut self) -> Self {
        self.refuse_device_manager = true;
        self
    }

    /// Class id.
    pub fn class_id(&self) -> Guid {
        self.class_id
    }

    /// Device manager received last, if any.
    pub fn device_manager(&self) -> Option<DeviceManagerToken> {
        self.device_manager.lock().clone()
    }

    /// Number of `SetD3DManager` messages received.
    pub fn device_manager_messages(&self) -> u32 {
        *self.device_manager_messages.lock()
    }

    fn aware_api(&self) -> Option<DeviceApi> {
        [DeviceApi::Direct3D9, DeviceApi::Dxgi]
            .into_iter()
            .find(|api| api.is_aware(&self.attributes))
    }
}

impl Transform for StaticTransform {
    fn input_available_type(&self, stream: u32, index: u32) -> Result<MediaType> {
        check_stream(stream)?;
        type_at(self.inputs.clone(), index)
    }

    fn output_available_type(&self, stream: u32, index: u32) -> Result<MediaType> {
        check_stream(stream)?;
        type_at(self.outputs.clone(), index)
    }

    fn set_input_type(&self, stream: u32, media_type: Option<&MediaType>, flags: SetTypeFlags) -> Result<()> {
        check_stream(stream)?;
        if let Some(media_type) = media_type {
            if !self.inputs.iter().any(|t| media_type.satisfies(t)) {
                return Err(reject(media_type, "not a listed input"));
            }
        }
        if !flags.contains(SetTypeFlags::TEST_ONLY) {
            self.types.set_input(media_type);
        }
        Ok(())
    }

    fn set_output_type(&self, stream: u32, media_type: Option<&MediaType>, flags: SetTypeFlags) -> Result<()> {
        check_stream(stream)?;
        if let Some(media_type) = media_type {
            if !self.outputs.is_empty() && !self.outputs.iter().any(|t| media_type.satisfies(t)) {
                return Err(reject(media_type, "not a listed output"));
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
        Ok(OutputStreamInfo {
            flags: self.output_flags,
            ..Default::default()
        })
    }

    fn attributes(&self) -> Option<Attributes> {
        Some(self.attributes.clone())
    }

    fn process_message(&self, message: TransformMessage) -> Result<()> {
        let TransformMessage::SetD3DManager(token) = message else {
            return Ok(());
        };
        *self.device_manager_messages.lock() += 1;
        if self.refuse_device_manager {
            return Err(Error::InvalidRequest("device manager refused".into()));
        }
        if let Some(token) = &token {
            let api = self
                .aware_api()
                .ok_or_else(|| Error::NotImplemented("transform is not device aware".into()))?;
            token.query(api)?;
        }
        *self.device_manager.lock() = token;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_manager::DeviceManager;
    use crate::guids::subtypes;

    #[test]
    fn test_input_validation_by_listed_types() {
        let transform = StaticTransform::new(
            vec![MediaType::audio(subtypes::PCM)],
            vec![MediaType::audio_pcm(48000, 1, 8)],
        );
        let test = SetTypeFlags::TEST_ONLY;
        assert!(transform.set_input_type(0, Some(&MediaType::audio_pcm(44100, 1, 8)), test).is_ok());
        assert!(transform.set_input_type(0, Some(&MediaType::audio(subtypes::FLOAT)), test).is_err());
        assert!(transform.input_current_type(0).is_err());
    }

    #[test]
    fn test_video_output_cleared_on_input_change() {
        let rgb = MediaType::video(subtypes::RGB32);
        let transform = StaticTransform::new(vec![MediaType::video(subtypes::NV12)], vec![rgb.clone()])
            .with_current_output(rgb);
        assert!(transform.output_current_type(0).is_ok());
        transform
            .set_input_type(0, Some(&MediaType::video(subtypes::NV12)), SetTypeFlags::empty())
            .unwrap();
        assert!(transform.output_current_type(0).is_err());
    }

    #[test]
    fn test_device_manager_messages() {
        let transform = StaticTransform::new(vec![], vec![]).aware_of(DeviceApi::Dxgi);
        let dxgi = DeviceManager::new(DeviceApi::Dxgi).token();
        transform
            .process_message(TransformMessage::SetD3DManager(Some(dxgi.clone())))
            .unwrap();
        assert!(transform.device_manager().unwrap().same_manager(&dxgi));

        let d3d9 = DeviceManager::new(DeviceApi::Direct3D9).token();
        assert!(transform
            .process_message(TransformMessage::SetD3DManager(Some(d3d9)))
            .is_err());
        assert_eq!(transform.device_manager_messages(), 2);

        let refusing = StaticTransform::new(vec![], vec![]).refusing_device_manager();
        assert!(refusing
            .process_message(TransformMessage::SetD3DManager(Some(dxgi)))
            .is_err());
    }

    #[test]
    fn test_output_flags() {
        let transform = StaticTransform::new(vec![], vec![])
            .with_output_flags(OutputStreamFlags::PROVIDES_SAMPLES);
        assert!(transform.output_stream_info(0).unwrap().allocates_samples());
        assert!(!transform.attributes().unwrap().flag(&keys::D3D_AWARE));
    }
}
