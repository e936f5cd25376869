// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Keyframe detection and parameter set (SPS/PPS, VPS/SPS/PPS) extraction.

use bytes::Bytes;

use crate::bitstream::annex_b_frame;
use crate::codec::VideoCodec;
use crate::error::{EncodeError, Result};
use crate::frame::CompressedSample;

/// Whether any unit in the batch is a keyframe slice for `codec`.
pub fn contains_keyframe(codec: VideoCodec, nal_units: &[Bytes]) -> bool {
    nal_units.iter().any(|unit| codec.is_keyframe_nal(unit))
}

/// Read the codec-mandated parameter sets from the sample's format
/// description, each prefixed with an Annex-B start code.
///
/// Fails with `ParameterSetCountMismatch` when the description reports fewer
/// sets than required or one of the required entries is unreadable. Extra
/// trailing entries are ignored.
pub fn extract(codec: VideoCodec, sample: &dyn CompressedSample) -> Result<Vec<Bytes>> {
    let expected = codec.required_parameter_sets();
    let found = sample.parameter_set_count();

    if found < expected {
        return Err(EncodeError::ParameterSetCountMismatch {
            codec,
            expected,
            found,
        });
    }

    let names = codec.parameter_set_names();
    let mut sets = Vec::with_capacity(expected);

    for index in 0..expected {
        let raw = match sample.parameter_set(index) {
            Some(raw) if !raw.is_empty() => raw,
            _ => {
                tracing::warn!(
                    "[ParameterSets] {} {} (index {}) is missing or empty",
                    codec,
                    names[index],
                    index
                );
                return Err(EncodeError::ParameterSetCountMismatch {
                    codec,
                    expected,
                    found: index,
                });
            }
        };

        tracing::trace!(
            "[ParameterSets] {} {}: {} bytes, NAL type={}",
            codec,
            names[index],
            raw.len(),
            codec.nal_unit_type(raw[0])
        );

        sets.push(annex_b_frame(raw));
    }

    Ok(sets)
}

/// Parameter sets to attach to this batch, if any.
///
/// The keyframe check covers every unit but extraction runs at most once per
/// batch. A count mismatch means "no CSD this frame": it is logged and the
/// batch goes out without parameter sets.
pub fn parameter_sets_for_batch(
    codec: VideoCodec,
    nal_units: &[Bytes],
    sample: &dyn CompressedSample,
) -> Option<Vec<Bytes>> {
    if !contains_keyframe(codec, nal_units) {
        return None;
    }

    match extract(codec, sample) {
        Ok(sets) => Some(sets),
        Err(e) => {
            tracing::warn!("[ParameterSets] Keyframe without usable CSD: {}", e);
            None
        }
    }
}
