// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Compressed sample → `EncodedFrame`.

use crate::bitstream::{annex_b_frame, extract_nal_units};
use crate::codec::VideoCodec;
use crate::frame::{CompressedSample, EncodedFrame};
use crate::parameter_sets;

/// Repackage one compressed sample as Annex-B NAL units plus, on keyframes,
/// the codec's parameter sets.
pub fn package(codec: VideoCodec, sample: &dyn CompressedSample) -> EncodedFrame {
    let nal_units = extract_nal_units(sample.data());
    let param_sets = parameter_sets::parameter_sets_for_batch(codec, &nal_units, sample);

    if param_sets.is_some() {
        tracing::debug!(
            "[Packager] {} keyframe: {} NAL units, {} bytes",
            codec,
            nal_units.len(),
            sample.data().len()
        );
    }

    EncodedFrame {
        param_sets,
        nalus: nal_units.iter().map(|unit| annex_b_frame(unit)).collect(),
    }
}
