// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Encoder and publish configuration.
//!
//! `EncoderConfig` configures one hardware session. `PublishConfig` is the
//! TOML-loadable description of every layer a publish attempt may encode.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec::{ProfileLevel, VideoCodec};
use crate::error::{layer_label, EncodeError, Result};

/// Configuration of one encoder session. Immutable once the session exists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// `None` for the primary (single) track, `Some(rid)` for a simulcast layer.
    pub layer_id: Option<String>,
    /// Target width in pixels. Scaling is done by the encoder.
    pub width: u32,
    /// Target height in pixels.
    pub height: u32,
    pub codec: VideoCodec,
    pub profile_level: ProfileLevel,
    /// Expected input frame rate.
    pub fps: u32,
    /// Average bitrate in bits per second.
    pub bitrate_bps: u32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            layer_id: None,
            width: 1280,
            height: 720,
            codec: VideoCodec::H264,
            profile_level: ProfileLevel::Auto,
            fps: 30,
            bitrate_bps: 2_000_000,
        }
    }
}

impl EncoderConfig {
    /// Create a new config with specified dimensions.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    pub fn with_layer(mut self, layer_id: impl Into<String>) -> Self {
        self.layer_id = Some(layer_id.into());
        self
    }

    pub fn with_codec(mut self, codec: VideoCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_profile_level(mut self, profile_level: ProfileLevel) -> Self {
        self.profile_level = profile_level;
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_bitrate(mut self, bitrate_bps: u32) -> Self {
        self.bitrate_bps = bitrate_bps;
        self
    }

    /// Maximum distance between encoder-chosen keyframes: two seconds of frames.
    pub fn max_keyframe_interval(&self) -> u32 {
        self.fps.saturating_mul(2)
    }

    /// Layer name for log lines.
    pub fn layer_label(&self) -> String {
        layer_label(self.layer_id.as_deref())
    }

    /// Reject configs no encoder could open.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(EncodeError::Configuration(format!(
                "layer {}: dimensions must be non-zero, got {}x{}",
                self.layer_label(),
                self.width,
                self.height
            )));
        }
        if self.fps == 0 {
            return Err(EncodeError::Configuration(format!(
                "layer {}: fps must be non-zero",
                self.layer_label()
            )));
        }
        if self.bitrate_bps == 0 {
            return Err(EncodeError::Configuration(format!(
                "layer {}: bitrate must be non-zero",
                self.layer_label()
            )));
        }
        // Encoder properties are signed 32-bit numbers.
        let limit = i32::MAX as u32;
        if self.width > limit
            || self.height > limit
            || self.bitrate_bps > limit
            || self.max_keyframe_interval() > limit
        {
            return Err(EncodeError::Configuration(format!(
                "layer {}: {}x{} @ {} fps, {} bps exceeds encoder property range",
                self.layer_label(),
                self.width,
                self.height,
                self.fps,
                self.bitrate_bps
            )));
        }
        if !self.profile_level.is_compatible_with(self.codec) {
            return Err(EncodeError::UnsupportedCodec(format!(
                "profile {:?} cannot configure a {} encoder",
                self.profile_level, self.codec
            )));
        }
        Ok(())
    }
}

// ============================================================================
// PUBLISH CONFIG (TOML)
// ============================================================================

/// One output layer of a publish attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerConfig {
    /// RTP stream id. Absent for a single primary track.
    #[serde(default)]
    pub rid: Option<String>,
    pub width: u32,
    pub height: u32,
    pub bitrate_bps: u32,
    /// Overrides the publish-wide frame rate.
    #[serde(default)]
    pub fps: Option<u32>,
}

/// Every layer a publish attempt may encode.
///
/// ```toml
/// codec = "h264"
/// profile_level_id = 0x42e01f
/// fps = 30
///
/// [[layers]]
/// rid = "f"
/// width = 1280
/// height = 720
/// bitrate_bps = 2000000
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default)]
    pub codec: VideoCodec,
    /// SDP profile-level-id (H.264) or profile-id (HEVC); 0 lets the encoder choose.
    #[serde(default)]
    pub profile_level_id: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    pub layers: Vec<LayerConfig>,
}

fn default_fps() -> u32 {
    30
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self::single_layer(1280, 720, 2_000_000)
    }
}

impl PublishConfig {
    /// One primary track, no simulcast.
    pub fn single_layer(width: u32, height: u32, bitrate_bps: u32) -> Self {
        Self {
            codec: VideoCodec::H264,
            profile_level_id: 0x42e01f,
            fps: default_fps(),
            layers: vec![LayerConfig {
                rid: None,
                width,
                height,
                bitrate_bps,
                fps: None,
            }],
        }
    }

    /// Full / half / quarter resolution simulcast.
    pub fn simulcast_preset() -> Self {
        let layer = |rid: &str, width, height, bitrate_bps| LayerConfig {
            rid: Some(rid.to_string()),
            width,
            height,
            bitrate_bps,
            fps: None,
        };

        Self {
            codec: VideoCodec::H264,
            profile_level_id: 0x42e01f,
            fps: default_fps(),
            layers: vec![
                layer("f", 1280, 720, 2_000_000),
                layer("h", 640, 360, 500_000),
                layer("q", 320, 180, 150_000),
            ],
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        tracing::debug!("[Config] Loaded publish config from {}", path.display());
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| EncodeError::Configuration(e.to_string()))
    }

    pub fn is_simulcast(&self) -> bool {
        self.layers.len() > 1
    }

    pub fn layer(&self, rid: Option<&str>) -> Option<&LayerConfig> {
        self.layers.iter().find(|l| l.rid.as_deref() == rid)
    }

    /// Encoder profile token for the configured codec.
    pub fn profile_level(&self) -> Result<ProfileLevel> {
        ProfileLevel::from_profile_level_id(self.codec, self.profile_level_id)
    }

    pub fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(EncodeError::Configuration(
                "publish config has no layers".into(),
            ));
        }
        if self.fps == 0 {
            return Err(EncodeError::Configuration("fps must be non-zero".into()));
        }

        let mut seen = HashSet::new();
        for layer in &self.layers {
            if self.is_simulcast() && layer.rid.is_none() {
                return Err(EncodeError::Configuration(
                    "every simulcast layer needs a rid".into(),
                ));
            }
            if !seen.insert(layer.rid.as_deref()) {
                return Err(EncodeError::Configuration(format!(
                    "duplicate layer {}",
                    layer_label(layer.rid.as_deref())
                )));
            }
        }

        self.profile_level()?;
        for config in self.encoder_configs()? {
            config.validate()?;
        }
        Ok(())
    }

    /// Encoder config for one layer with an explicit codec/profile (as negotiated).
    pub fn encoder_config_for(
        &self,
        layer: &LayerConfig,
        codec: VideoCodec,
        profile_level: ProfileLevel,
    ) -> EncoderConfig {
        EncoderConfig {
            layer_id: layer.rid.clone(),
            width: layer.width,
            height: layer.height,
            codec,
            profile_level,
            fps: layer.fps.unwrap_or(self.fps),
            bitrate_bps: layer.bitrate_bps,
        }
    }

    /// Encoder configs for every layer using the configured codec.
    pub fn encoder_configs(&self) -> Result<Vec<EncoderConfig>> {
        let profile_level = self.profile_level()?;
        Ok(self
            .layers
            .iter()
            .map(|layer| self.encoder_config_for(layer, self.codec, profile_level))
            .collect())
    }
}
