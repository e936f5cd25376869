// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Video codec families, profiles, and NAL header classification.

use serde::{Deserialize, Serialize};

use crate::error::{EncodeError, Result};

/// FourCC code for H.264/AVC ('avc1').
pub const FOURCC_H264: u32 = 0x61766331; // 'avc1' in ASCII

/// FourCC code for H.265/HEVC ('hvc1').
pub const FOURCC_HEVC: u32 = 0x68766331; // 'hvc1' in ASCII

/// H.264 IDR slice.
const H264_NAL_TYPE_IDR: u8 = 5;

/// HEVC IDR_W_RADL .. CRA_NUT.
const HEVC_NAL_TYPE_IRAP_FIRST: u8 = 19;
const HEVC_NAL_TYPE_IRAP_LAST: u8 = 21;

/// Codec family of a hardware encoder session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    /// H.264/AVC. Parameter sets: SPS, PPS.
    #[default]
    H264,
    /// H.265/HEVC. Parameter sets: VPS, SPS, PPS.
    Hevc,
}

impl VideoCodec {
    /// FourCC code for this codec.
    pub fn fourcc(&self) -> u32 {
        match self {
            VideoCodec::H264 => FOURCC_H264,
            VideoCodec::Hevc => FOURCC_HEVC,
        }
    }

    /// MIME type for this codec.
    pub fn mime_type(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "video/h264",
            VideoCodec::Hevc => "video/h265",
        }
    }

    /// Number of parameter sets a keyframe must carry.
    pub fn required_parameter_sets(&self) -> usize {
        match self {
            VideoCodec::H264 => 2,
            VideoCodec::Hevc => 3,
        }
    }

    /// Names of the required parameter sets, in emission order.
    pub fn parameter_set_names(&self) -> &'static [&'static str] {
        match self {
            VideoCodec::H264 => &["SPS", "PPS"],
            VideoCodec::Hevc => &["VPS", "SPS", "PPS"],
        }
    }

    /// NAL unit type encoded in the first header byte.
    pub fn nal_unit_type(&self, header: u8) -> u8 {
        match self {
            VideoCodec::H264 => header & 0x1F,
            VideoCodec::Hevc => (header >> 1) & 0x3F,
        }
    }

    /// Whether a NAL unit type marks a random access point for this codec.
    pub fn is_keyframe_nal_type(&self, nal_type: u8) -> bool {
        match self {
            VideoCodec::H264 => nal_type == H264_NAL_TYPE_IDR,
            VideoCodec::Hevc => {
                (HEVC_NAL_TYPE_IRAP_FIRST..=HEVC_NAL_TYPE_IRAP_LAST).contains(&nal_type)
            }
        }
    }

    /// Whether a raw NAL unit (no start code, no length prefix) is a keyframe slice.
    ///
    /// Empty units carry no header and never qualify.
    pub fn is_keyframe_nal(&self, nal_unit: &[u8]) -> bool {
        nal_unit
            .first()
            .is_some_and(|&header| self.is_keyframe_nal_type(self.nal_unit_type(header)))
    }

    /// Map a codec negotiated on the peer connection onto an encoder family.
    pub fn from_track_codec(codec: TrackCodec) -> Result<Self> {
        match codec {
            TrackCodec::H264 => Ok(VideoCodec::H264),
            TrackCodec::H265 => Ok(VideoCodec::Hevc),
            other => Err(EncodeError::UnsupportedCodec(format!(
                "{:?} has no hardware encoder mapping",
                other
            ))),
        }
    }
}

impl std::fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoCodec::H264 => write!(f, "H.264"),
            VideoCodec::Hevc => write!(f, "HEVC"),
        }
    }
}

/// Codec identifier as reported by a negotiated peer-connection track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackCodec {
    H264,
    H265,
    Vp8,
    Vp9,
    Av1,
    Opus,
}

/// H.264 encoding profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum H264Profile {
    /// Constrained Baseline - what most WebRTC peers expect (42e0xx).
    #[default]
    ConstrainedBaseline,
    /// Baseline profile - most compatible, lowest features.
    Baseline,
    /// Main profile - good balance of compatibility and features.
    Main,
    /// High profile - advanced features, requires newer decoders.
    High,
}

/// HEVC encoding profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HevcProfile {
    #[default]
    Main,
    Main10,
}

/// Platform profile/level token handed to the hardware encoder.
///
/// The level is always left to the encoder ("auto level"); only the profile
/// is pinned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileLevel {
    /// Let the encoder pick both profile and level.
    #[default]
    Auto,
    H264(H264Profile),
    Hevc(HevcProfile),
}

impl ProfileLevel {
    /// Whether this token can configure an encoder of `codec`.
    pub fn is_compatible_with(&self, codec: VideoCodec) -> bool {
        matches!(
            (self, codec),
            (ProfileLevel::Auto, _)
                | (ProfileLevel::H264(_), VideoCodec::H264)
                | (ProfileLevel::Hevc(_), VideoCodec::Hevc)
        )
    }

    /// Resolve an SDP `profile-level-id` (H.264) or `profile-id` (HEVC).
    ///
    /// For H.264 the value is the 24-bit `profile_idc | constraint_flags |
    /// level_idc` triple, e.g. `0x42e01f`. For HEVC it is the general
    /// profile id (1 = Main, 2 = Main 10). Zero means "no preference".
    pub fn from_profile_level_id(codec: VideoCodec, id: u32) -> Result<Self> {
        if id == 0 {
            return Ok(ProfileLevel::Auto);
        }

        match codec {
            VideoCodec::H264 => {
                let profile_idc = ((id >> 16) & 0xFF) as u8;
                let constraints = ((id >> 8) & 0xFF) as u8;
                let profile = match profile_idc {
                    // constraint_set1_flag marks Constrained Baseline
                    66 if constraints & 0x40 != 0 => H264Profile::ConstrainedBaseline,
                    66 => H264Profile::Baseline,
                    77 => H264Profile::Main,
                    100 => H264Profile::High,
                    other => {
                        return Err(EncodeError::UnsupportedCodec(format!(
                            "H.264 profile_idc {} (profile-level-id {:06x})",
                            other, id
                        )));
                    }
                };
                Ok(ProfileLevel::H264(profile))
            }
            VideoCodec::Hevc => match id {
                1 => Ok(ProfileLevel::Hevc(HevcProfile::Main)),
                2 => Ok(ProfileLevel::Hevc(HevcProfile::Main10)),
                other => Err(EncodeError::UnsupportedCodec(format!(
                    "HEVC profile-id {}",
                    other
                ))),
            },
        }
    }
}
