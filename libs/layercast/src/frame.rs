// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Frame types flowing through the pipeline: raw input, compressed sample,
//! packaged output.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::bitstream;

// ============================================================================
// TIME
// ============================================================================

/// Rational media time (`value / timescale` seconds).
///
/// A zero timescale is the invalid sentinel, which encoders read as
/// "unknown" (e.g. a duration the encoder should infer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaTime {
    pub value: i64,
    pub timescale: i32,
}

impl MediaTime {
    pub const INVALID: MediaTime = MediaTime {
        value: 0,
        timescale: 0,
    };

    pub const fn new(value: i64, timescale: i32) -> Self {
        Self { value, timescale }
    }

    pub fn from_nanos(nanos: i64) -> Self {
        Self::new(nanos, 1_000_000_000)
    }

    /// One frame interval at `fps`.
    pub fn frame_interval(fps: u32) -> Self {
        Self::new(1, fps as i32)
    }

    pub fn is_valid(&self) -> bool {
        self.timescale > 0
    }

    /// Convert to a `Duration`. Negative or invalid times yield `None`.
    pub fn to_duration(&self) -> Option<Duration> {
        if !self.is_valid() || self.value < 0 {
            return None;
        }
        let nanos = (self.value as i128 * 1_000_000_000) / self.timescale as i128;
        u64::try_from(nanos).ok().map(Duration::from_nanos)
    }
}

impl Default for MediaTime {
    fn default() -> Self {
        Self::INVALID
    }
}

impl From<Duration> for MediaTime {
    fn from(duration: Duration) -> Self {
        Self::from_nanos(duration.as_nanos().min(i64::MAX as u128) as i64)
    }
}

// ============================================================================
// RAW INPUT
// ============================================================================

/// Pixel buffer produced by the capture collaborator.
///
/// Backends downcast through `as_any` to reach their native buffer type.
pub trait ImageBuffer: Send + Sync + 'static {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn as_any(&self) -> &dyn Any;
}

/// In-memory image used for synthetic sources and tests.
#[derive(Debug, Clone)]
pub struct SyntheticImage {
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

impl SyntheticImage {
    /// Solid mid-grey BGRA frame.
    pub fn gray(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: Bytes::from(vec![128u8; (width * height * 4) as usize]),
        }
    }
}

impl ImageBuffer for SyntheticImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One captured camera frame. Clones share the underlying image.
#[derive(Clone)]
pub struct RawFrame {
    pub image: Arc<dyn ImageBuffer>,
    pub presentation_timestamp: MediaTime,
    pub duration: MediaTime,
}

impl RawFrame {
    pub fn new(
        image: Arc<dyn ImageBuffer>,
        presentation_timestamp: MediaTime,
        duration: MediaTime,
    ) -> Self {
        Self {
            image,
            presentation_timestamp,
            duration,
        }
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .field("presentation_timestamp", &self.presentation_timestamp)
            .field("duration", &self.duration)
            .finish()
    }
}

// ============================================================================
// COMPRESSED SAMPLE
// ============================================================================

/// Output of one hardware compression call.
///
/// Only valid for the duration of the completion callback that receives it.
pub trait CompressedSample {
    /// Length-prefixed NAL unit container.
    fn data(&self) -> &[u8];

    /// Number of parameter sets in the sample's format description.
    fn parameter_set_count(&self) -> usize;

    /// Raw parameter set (no start code) at `index`.
    fn parameter_set(&self, index: usize) -> Option<&[u8]>;

    fn presentation_timestamp(&self) -> MediaTime {
        MediaTime::INVALID
    }
}

/// Plain in-memory compressed sample.
#[derive(Debug, Clone, Default)]
pub struct OwnedSample {
    pub data: Bytes,
    pub parameter_sets: Vec<Bytes>,
    pub presentation_timestamp: MediaTime,
}

impl OwnedSample {
    pub fn new(data: impl Into<Bytes>, parameter_sets: Vec<Bytes>) -> Self {
        Self {
            data: data.into(),
            parameter_sets,
            presentation_timestamp: MediaTime::INVALID,
        }
    }

    /// Build the length-prefixed container from raw NAL units.
    pub fn from_nal_units(nal_units: &[&[u8]], parameter_sets: Vec<Bytes>) -> Self {
        let mut data = Vec::new();
        for unit in nal_units {
            data.extend_from_slice(&(unit.len() as u32).to_be_bytes());
            data.extend_from_slice(unit);
        }
        Self::new(data, parameter_sets)
    }

    pub fn with_presentation_timestamp(mut self, pts: MediaTime) -> Self {
        self.presentation_timestamp = pts;
        self
    }
}

impl CompressedSample for OwnedSample {
    fn data(&self) -> &[u8] {
        &self.data
    }

    fn parameter_set_count(&self) -> usize {
        self.parameter_sets.len()
    }

    fn parameter_set(&self, index: usize) -> Option<&[u8]> {
        self.parameter_sets.get(index).map(Bytes::as_ref)
    }

    fn presentation_timestamp(&self) -> MediaTime {
        self.presentation_timestamp
    }
}

// ============================================================================
// ENCODED OUTPUT
// ============================================================================

/// Packaged output of one compressed frame.
///
/// Every entry in both collections is Annex-B framed. `param_sets` is only
/// present on keyframes, and then holds the full codec-mandated set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedFrame {
    pub param_sets: Option<Vec<Bytes>>,
    pub nalus: Vec<Bytes>,
}

impl EncodedFrame {
    /// Whether this frame carries codec configuration data.
    pub fn is_keyframe(&self) -> bool {
        self.param_sets.is_some()
    }

    /// All NAL units as one Annex-B buffer.
    pub fn to_annex_b(&self) -> Bytes {
        bitstream::concat_units(&self.nalus)
    }

    /// Parameter sets as one Annex-B buffer, if present.
    pub fn param_sets_annex_b(&self) -> Option<Bytes> {
        self.param_sets.as_deref().map(bitstream::concat_units)
    }

    /// Total payload size in bytes, parameter sets included.
    pub fn byte_len(&self) -> usize {
        let params: usize = self
            .param_sets
            .iter()
            .flatten()
            .map(Bytes::len)
            .sum();
        params + self.nalus.iter().map(Bytes::len).sum::<usize>()
    }
}
