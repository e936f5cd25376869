// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Layered hardware video encoding for real-time publishing.
//!
//! Camera frames are fanned out to one hardware encoder session per output
//! layer. Each compressed sample is repackaged from the encoder's
//! length-prefixed container into Annex-B NAL units, with the codec's
//! parameter sets attached to every keyframe.

#![allow(clippy::type_complexity)] // Completion handler types are clear in context
#![allow(clippy::missing_safety_doc)] // Safety documented in implementation comments

pub mod backend;
pub mod bitstream;
pub mod capture;
pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod keyframe;
pub mod packager;
pub mod parameter_sets;
pub mod pool;
pub mod publish;
pub mod session;
pub mod sink;

#[cfg(target_os = "macos")]
pub mod apple;

pub use crossbeam_channel;

pub use backend::{
    CompletionHandler, CompressionBackend, CompressionHandle, EncodeOutcome, FrameOptions,
    SessionProperties,
};
pub use capture::{CaptureConsumer, CaptureHub, CaptureSource, FrameDelivery};
pub use codec::{H264Profile, HevcProfile, ProfileLevel, TrackCodec, VideoCodec};
pub use config::{EncoderConfig, LayerConfig, PublishConfig};
pub use error::{EncodeError, OsStatus, Result};
pub use frame::{
    CompressedSample, EncodedFrame, ImageBuffer, MediaTime, OwnedSample, RawFrame,
    SyntheticImage,
};
pub use keyframe::{FrameCounter, FrameDecision};
pub use pool::{EncoderPool, LayerStats};
pub use publish::{NegotiatedTrack, PeerConnectionState, Publisher};
pub use session::{EncoderSession, SessionId, SessionState};
pub use sink::{ChannelSink, EncodedFrameSink, LayerFrame};

#[cfg(target_os = "macos")]
pub use apple::videotoolbox::VideoToolboxBackend;
