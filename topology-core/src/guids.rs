//! Well-known GUIDs: attribute keys, major types, subtypes and transform class ids
//!
//! Every table carries a readable name so manifests and resolution reports
//! can refer to keys and formats without spelling out GUIDs.

use uuid::Uuid;

/// GUID type used for attribute keys, formats and class ids.
pub type Guid = Uuid;

/// Subtypes built from a FOURCC or D3D format code share this tail.
const FOURCC_BASE: u128 = 0x0000_0010_8000_00aa_0038_9b71;

/// Build a FOURCC-derived format GUID.
pub const fn fourcc(code: u32) -> Guid {
    Uuid::from_u128(((code as u128) << 96) | FOURCC_BASE)
}

// =============================================================================
// Attribute keys
// =============================================================================

/// Attribute keys for media types, nodes, topologies and transforms.
#[allow(missing_docs)]
pub mod keys {
    use super::Guid;
    use uuid::Uuid;

    // Media type keys
    pub const MAJOR_TYPE: Guid = Uuid::from_u128(0x48eba18e_f8c9_4687_bf11_0a74c9f96a8f);
    pub const SUBTYPE: Guid = Uuid::from_u128(0xf7e34c9a_42e8_4714_b74b_cb29d72c35e5);
    pub const ALL_SAMPLES_INDEPENDENT: Guid = Uuid::from_u128(0xc9173739_5e56_461c_b713_46fb995cb95f);
    pub const FIXED_SIZE_SAMPLES: Guid = Uuid::from_u128(0xb8ebefaf_b718_4e04_b0a9_116775e3321b);
    pub const SAMPLE_SIZE: Guid = Uuid::from_u128(0xdad3ab78_1990_408b_bce2_eba673dacc10);
    pub const AUDIO_NUM_CHANNELS: Guid = Uuid::from_u128(0x37e48bf5_645e_4c5b_89de_ada9e29b696a);
    pub const AUDIO_SAMPLES_PER_SECOND: Guid = Uuid::from_u128(0x5faeeae7_0290_4c31_9e8a_c534f68d9dba);
    pub const AUDIO_AVG_BYTES_PER_SECOND: Guid = Uuid::from_u128(0x1aab75c8_cfef_451c_ab95_ac034b8e1731);
    pub const AUDIO_BLOCK_ALIGNMENT: Guid = Uuid::from_u128(0x322de230_9eeb_43bd_ab7a_ff412251541d);
    pub const AUDIO_BITS_PER_SAMPLE: Guid = Uuid::from_u128(0xf2deb57f_40fa_4764_aa33_ed4f2d1ff669);
    pub const AUDIO_CHANNEL_MASK: Guid = Uuid::from_u128(0x55fb5765_644a_4caf_8479_938983bb1588);
    pub const AUDIO_PREFER_WAVEFORMATEX: Guid = Uuid::from_u128(0xa901aaba_e037_458a_bdf6_545be2074042);
    pub const FRAME_SIZE: Guid = Uuid::from_u128(0x1652c33d_d6b2_4012_b834_72030849a37d);
    pub const FRAME_RATE: Guid = Uuid::from_u128(0xc459a2e8_3d2c_4e44_b132_fee5156c7bb0);
    pub const PIXEL_ASPECT_RATIO: Guid = Uuid::from_u128(0xc6376a1e_8d0a_4027_be45_6d9a0ad39bb6);
    pub const INTERLACE_MODE: Guid = Uuid::from_u128(0xe2724bb8_e676_4806_b4b2_a8d6efb44ccd);
    pub const DEFAULT_STRIDE: Guid = Uuid::from_u128(0x644b4e48_1e02_4516_b0eb_c01ca9d49ac6);

    // Topology node keys
    pub const CONNECT_METHOD: Guid = Uuid::from_u128(0x494bbcf1_b031_4e38_97c4_d5422dd618dc);
    pub const STREAMID: Guid = Uuid::from_u128(0x14932f9b_9087_4bb4_8412_5167145cbe04);
    pub const MEDIASTART: Guid = Uuid::from_u128(0x835c58ea_e075_4bc7_bcba_4de000df9ae6);
    pub const SOURCE: Guid = Uuid::from_u128(0x835c58ec_e075_4bc7_bcba_4de000df9ae6);
    pub const PRESENTATION_DESCRIPTOR: Guid = Uuid::from_u128(0x835c58ed_e075_4bc7_bcba_4de000df9ae6);
    pub const STREAM_DESCRIPTOR: Guid = Uuid::from_u128(0x835c58ee_e075_4bc7_bcba_4de000df9ae6);
    pub const TRANSFORM_OBJECTID: Guid = Uuid::from_u128(0x88dcc0c9_293e_4e8b_9aeb_0ad64cc016b0);
    pub const DECODER: Guid = Uuid::from_u128(0x494bbd02_b031_4e38_97c4_d5422dd618dc);

    // Topology keys
    pub const ENUMERATE_SOURCE_TYPES: Guid = Uuid::from_u128(0x6248c36d_5d0b_4f40_a0bb_b0b305f77698);
    pub const ENABLE_XVP_FOR_PLAYBACK: Guid = Uuid::from_u128(0x1967731f_cd78_42fc_b026_0992a56e5693);
    pub const DXVA_MODE: Guid = Uuid::from_u128(0x1e8d34f6_f5ab_4e23_bb88_874aa3a1a74d);
    pub const RESOLUTION_STATUS: Guid = Uuid::from_u128(0x494bbcde_b031_4e38_97c4_d5422dd618dc);

    // Transform and sink keys
    pub const D3D_AWARE: Guid = Uuid::from_u128(0xeaa35c29_775e_488e_9b61_b3283e49583b);
    pub const D3D11_AWARE: Guid = Uuid::from_u128(0x206b4fc8_fcf9_4c51_afe3_9764369e33a0);
    pub const SUPPORT_DYNAMIC_FORMAT_CHANGE: Guid = Uuid::from_u128(0x53476a11_3f13_49fb_ac42_ee2733c96741);
    pub const REQUIRES_SAMPLE_COPY: Guid = Uuid::from_u128(0x7d1e3a52_1f0c_4c6e_9b4b_2a7b5d0e6c11);
}

// =============================================================================
// Formats
// =============================================================================

/// Major media types.
#[allow(missing_docs)]
pub mod major_types {
    use super::{fourcc, Guid};

    pub const AUDIO: Guid = fourcc(0x7364_7561);
    pub const VIDEO: Guid = fourcc(0x7364_6976);
}

/// Media subtypes.
#[allow(missing_docs)]
pub mod subtypes {
    use super::{fourcc, Guid};
    use uuid::Uuid;

    // Audio
    pub const PCM: Guid = fourcc(0x0001);
    pub const FLOAT: Guid = fourcc(0x0003);
    pub const MP3: Guid = fourcc(0x0055);
    pub const AAC: Guid = fourcc(0x1610);

    // Compressed video
    pub const H264: Guid = fourcc(u32::from_le_bytes(*b"H264"));

    // Raw video
    pub const NV12: Guid = fourcc(u32::from_le_bytes(*b"NV12"));
    pub const I420: Guid = fourcc(u32::from_le_bytes(*b"I420"));
    pub const IYUV: Guid = fourcc(u32::from_le_bytes(*b"IYUV"));
    pub const YV12: Guid = fourcc(u32::from_le_bytes(*b"YV12"));
    pub const YUY2: Guid = fourcc(u32::from_le_bytes(*b"YUY2"));
    pub const UYVY: Guid = fourcc(u32::from_le_bytes(*b"UYVY"));
    pub const RGB32: Guid = fourcc(22);
    pub const ARGB32: Guid = fourcc(21);
    pub const RGB24: Guid = fourcc(20);
    pub const RGB565: Guid = fourcc(23);
    pub const RGB555: Guid = fourcc(24);

    /// Legacy DMO-style RGB32 subtype, not produced by the color converter.
    pub const DMO_RGB32: Guid = Uuid::from_u128(0xe436eb7e_524f_11ce_9f53_0020af0ba770);
}

/// Class ids of the built-in transforms.
#[allow(missing_docs)]
pub mod class_ids {
    use super::Guid;
    use uuid::Uuid;

    pub const MP3_DECODER: Guid = Uuid::from_u128(0xbbeea841_0a63_4f52_a7ab_a9b3a84ed38a);
    pub const AAC_DECODER: Guid = Uuid::from_u128(0x32d186a7_218f_4c75_8876_dd77273a8999);
    pub const H264_DECODER: Guid = Uuid::from_u128(0x62ce7e72_4c71_4d20_b15d_452831a87d9d);
    pub const RESAMPLER: Guid = Uuid::from_u128(0xf447b69e_1884_4a7e_8055_346f74d6edb3);
    pub const COLOR_CONVERTER: Guid = Uuid::from_u128(0x98230571_0087_4204_b020_3282538e57d3);
    pub const VIDEO_PROCESSOR: Guid = Uuid::from_u128(0x88753b26_5b24_49bd_b2e7_0c445c78c982);
    pub const SAMPLE_COPIER: Guid = Uuid::from_u128(0x9d11a5c3_0b6e_4f1d_8d0e_6b3b8f0c2a41);
}

// =============================================================================
// Name tables
// =============================================================================

static KEY_NAMES: &[(&str, Guid)] = &[
    ("major_type", keys::MAJOR_TYPE),
    ("subtype", keys::SUBTYPE),
    ("all_samples_independent", keys::ALL_SAMPLES_INDEPENDENT),
    ("fixed_size_samples", keys::FIXED_SIZE_SAMPLES),
    ("sample_size", keys::SAMPLE_SIZE),
    ("channels", keys::AUDIO_NUM_CHANNELS),
    ("sample_rate", keys::AUDIO_SAMPLES_PER_SECOND),
    ("avg_bytes_per_second", keys::AUDIO_AVG_BYTES_PER_SECOND),
    ("block_alignment", keys::AUDIO_BLOCK_ALIGNMENT),
    ("bits_per_sample", keys::AUDIO_BITS_PER_SAMPLE),
    ("channel_mask", keys::AUDIO_CHANNEL_MASK),
    ("prefer_waveformatex", keys::AUDIO_PREFER_WAVEFORMATEX),
    ("frame_size", keys::FRAME_SIZE),
    ("frame_rate", keys::FRAME_RATE),
    ("pixel_aspect_ratio", keys::PIXEL_ASPECT_RATIO),
    ("interlace_mode", keys::INTERLACE_MODE),
    ("default_stride", keys::DEFAULT_STRIDE),
    ("connect_method", keys::CONNECT_METHOD),
    ("stream_id", keys::STREAMID),
    ("media_start", keys::MEDIASTART),
    ("source", keys::SOURCE),
    ("presentation_descriptor", keys::PRESENTATION_DESCRIPTOR),
    ("stream_descriptor", keys::STREAM_DESCRIPTOR),
    ("transform_object_id", keys::TRANSFORM_OBJECTID),
    ("decoder", keys::DECODER),
    ("enumerate_source_types", keys::ENUMERATE_SOURCE_TYPES),
    ("enable_xvp_for_playback", keys::ENABLE_XVP_FOR_PLAYBACK),
    ("dxva_mode", keys::DXVA_MODE),
    ("resolution_status", keys::RESOLUTION_STATUS),
    ("d3d_aware", keys::D3D_AWARE),
    ("d3d11_aware", keys::D3D11_AWARE),
    ("support_dynamic_format_change", keys::SUPPORT_DYNAMIC_FORMAT_CHANGE),
    ("requires_sample_copy", keys::REQUIRES_SAMPLE_COPY),
];

static MAJOR_TYPE_NAMES: &[(&str, Guid)] = &[
    ("audio", major_types::AUDIO),
    ("video", major_types::VIDEO),
];

static SUBTYPE_NAMES: &[(&str, Guid)] = &[
    ("pcm", subtypes::PCM),
    ("float", subtypes::FLOAT),
    ("mp3", subtypes::MP3),
    ("aac", subtypes::AAC),
    ("h264", subtypes::H264),
    ("nv12", subtypes::NV12),
    ("i420", subtypes::I420),
    ("iyuv", subtypes::IYUV),
    ("yv12", subtypes::YV12),
    ("yuy2", subtypes::YUY2),
    ("uyvy", subtypes::UYVY),
    ("rgb32", subtypes::RGB32),
    ("argb32", subtypes::ARGB32),
    ("rgb24", subtypes::RGB24),
    ("rgb565", subtypes::RGB565),
    ("rgb555", subtypes::RGB555),
    ("dmo_rgb32", subtypes::DMO_RGB32),
];

static CLASS_NAMES: &[(&str, Guid)] = &[
    ("mp3_decoder", class_ids::MP3_DECODER),
    ("aac_decoder", class_ids::AAC_DECODER),
    ("h264_decoder", class_ids::H264_DECODER),
    ("resampler", class_ids::RESAMPLER),
    ("color_converter", class_ids::COLOR_CONVERTER),
    ("video_processor", class_ids::VIDEO_PROCESSOR),
    ("sample_copier", class_ids::SAMPLE_COPIER),
];

fn name_of(table: &[(&'static str, Guid)], guid: &Guid) -> Option<&'static str> {
    table.iter().find(|(_, g)| g == guid).map(|(n, _)| *n)
}

fn guid_of(table: &[(&'static str, Guid)], name: &str) -> Option<Guid> {
    let name = name.to_ascii_lowercase();
    table.iter().find(|(n, _)| *n == name).map(|(_, g)| *g)
}

/// Readable name of an attribute key.
pub fn key_name(key: &Guid) -> Option<&'static str> {
    name_of(KEY_NAMES, key)
}

/// Attribute key for a readable name.
pub fn key_by_name(name: &str) -> Option<Guid> {
    guid_of(KEY_NAMES, name)
}

/// Readable name of a major type.
pub fn major_type_name(guid: &Guid) -> Option<&'static str> {
    name_of(MAJOR_TYPE_NAMES, guid)
}

/// Major type for a readable name.
pub fn major_type_by_name(name: &str) -> Option<Guid> {
    guid_of(MAJOR_TYPE_NAMES, name)
}

/// Readable name of a subtype.
pub fn subtype_name(guid: &Guid) -> Option<&'static str> {
    name_of(SUBTYPE_NAMES, guid)
}

/// Subtype for a readable name.
pub fn subtype_by_name(name: &str) -> Option<Guid> {
    guid_of(SUBTYPE_NAMES, name)
}

/// Readable name of a built-in transform class.
pub fn class_name(guid: &Guid) -> Option<&'static str> {
    name_of(CLASS_NAMES, guid)
}

/// Built-in transform class for a readable name.
pub fn class_by_name(name: &str) -> Option<Guid> {
    guid_of(CLASS_NAMES, name)
}

/// Display a GUID by its table name when it has one.
pub fn display_name(guid: &Guid) -> String {
    key_name(guid)
        .or_else(|| major_type_name(guid))
        .or_else(|| subtype_name(guid))
        .or_else(|| class_name(guid))
        .map(str::to_string)
        .unwrap_or_else(|| guid.to_string())
}
