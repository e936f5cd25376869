// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

// VideoToolbox Module
//
// Hardware compression backend on top of VTCompressionSession.
//
// ## Data flow
// ```
// RawFrame (CvPixelBuffer image)
//     ↓
// VideoToolboxHandle::encode()  (per-frame handler parked by sequence number)
//     ↓
// compression_output_callback   (VideoToolbox thread)
//     ↓
// VtSample: AVCC block buffer + H.264/HEVC parameter set table
//     ↓
// session completion handler → packager → sink
// ```

mod backend;
#[allow(non_upper_case_globals)]
mod ffi;
mod pixel_buffer;
mod sample;

pub use backend::{VideoToolboxBackend, VideoToolboxHandle};
pub use pixel_buffer::CvPixelBuffer;
