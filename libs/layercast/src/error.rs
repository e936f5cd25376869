// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use thiserror::Error;

use crate::codec::VideoCodec;

/// Status code reported by the hardware compression collaborator.
///
/// Mirrors the platform `OSStatus` convention: zero is success, anything else
/// is an opaque failure code.
pub type OsStatus = i32;

#[derive(Error, Debug)]
pub enum EncodeError {
    /// The hardware encoder could not be opened for a layer.
    #[error("Encoder session creation failed for layer {layer}: {reason}")]
    SessionCreationFailed { layer: String, reason: String },

    /// A single frame's compression call failed. Logged and dropped by the session.
    #[error("Frame submission failed for layer {layer}: status {status}")]
    FrameSubmissionFailed { layer: String, status: OsStatus },

    /// The length-prefixed container ended early or declared more bytes than it holds.
    #[error(
        "Malformed bitstream at offset {offset}: declared {declared} bytes, {remaining} remaining"
    )]
    MalformedBitstream {
        offset: usize,
        declared: usize,
        remaining: usize,
    },

    /// The format description reported fewer parameter sets than the codec requires.
    #[error("{codec:?} requires {expected} parameter sets, format description has {found}")]
    ParameterSetCountMismatch {
        codec: VideoCodec,
        expected: usize,
        found: usize,
    },

    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, EncodeError>;

/// Display name for a layer identifier in log lines and errors.
pub(crate) fn layer_label(layer: Option<&str>) -> String {
    layer.unwrap_or("<primary>").to_string()
}
