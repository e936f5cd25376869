// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Seam between encoder sessions and the platform compression primitive.

use serde::Serialize;

use crate::codec::ProfileLevel;
use crate::config::EncoderConfig;
use crate::error::{OsStatus, Result};
use crate::frame::{CompressedSample, RawFrame};

/// Properties every backend must apply when opening a compression session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionProperties {
    pub realtime: bool,
    /// B-frames are never allowed: output order must match submission order.
    pub allow_frame_reordering: bool,
    pub average_bitrate: u32,
    pub expected_frame_rate: u32,
    pub max_keyframe_interval: u32,
    pub profile_level: ProfileLevel,
}

impl SessionProperties {
    pub fn for_config(config: &EncoderConfig) -> Self {
        Self {
            realtime: true,
            allow_frame_reordering: false,
            average_bitrate: config.bitrate_bps,
            expected_frame_rate: config.fps,
            max_keyframe_interval: config.max_keyframe_interval(),
            profile_level: config.profile_level,
        }
    }
}

/// Per-frame encode options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameOptions {
    pub force_keyframe: bool,
}

/// Result of compressing one frame, as seen by its completion handler.
///
/// The sample borrows backend memory and is only valid inside the handler.
pub type EncodeOutcome<'a> = std::result::Result<&'a dyn CompressedSample, OsStatus>;

/// Runs once per submitted frame on a backend-owned thread.
pub type CompletionHandler = Box<dyn for<'a> FnOnce(EncodeOutcome<'a>) + Send + 'static>;

/// Opens compression handles. One backend serves every layer.
pub trait CompressionBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str {
        "compression"
    }

    fn open(
        &self,
        config: &EncoderConfig,
        properties: &SessionProperties,
    ) -> Result<Box<dyn CompressionHandle>>;
}

/// One open hardware compression session.
///
/// `encode` is asynchronous: a successful return only means the frame was
/// accepted. The handler fires later at most once; frames the encoder drops
/// or that are pending at `invalidate` never complete. A synchronous failure
/// means the handler never fires.
pub trait CompressionHandle: Send {
    fn encode(
        &mut self,
        frame: &RawFrame,
        options: FrameOptions,
        on_complete: CompletionHandler,
    ) -> std::result::Result<(), OsStatus>;

    /// Block until every accepted frame's handler has run.
    fn complete_frames(&mut self);

    /// Release the session. Pending handlers may be dropped without running.
    fn invalidate(&mut self);
}
