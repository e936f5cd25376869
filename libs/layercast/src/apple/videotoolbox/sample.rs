// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::marker::PhantomData;

use crate::codec::VideoCodec;
use crate::frame::{CompressedSample, MediaTime};

use super::ffi;

/// Compressed output borrowed from a `CMSampleBuffer` for the duration of
/// one output callback.
pub(super) struct VtSample<'a> {
    data: Vec<u8>,
    format: ffi::CMFormatDescriptionRef,
    codec: VideoCodec,
    parameter_set_count: usize,
    presentation_timestamp: MediaTime,
    _buffer: PhantomData<&'a ()>,
}

impl<'a> VtSample<'a> {
    /// Copy the AVCC payload out of `sample_buffer`. The parameter set table
    /// is read in place.
    ///
    /// # Safety
    /// `sample_buffer` must be a valid `CMSampleBufferRef` that outlives `'a`.
    pub(super) unsafe fn from_sample_buffer(
        sample_buffer: ffi::CMSampleBufferRef,
        codec: VideoCodec,
    ) -> Result<Self, ffi::OSStatus> {
        unsafe {
            let block_buffer = ffi::CMSampleBufferGetDataBuffer(sample_buffer);
            if block_buffer.is_null() {
                tracing::error!("[VideoToolbox] CMSampleBufferGetDataBuffer returned null");
                return Err(ffi::K_VT_PARAMETER_ERR);
            }

            let data_length = ffi::CMBlockBufferGetDataLength(block_buffer);
            let mut data = vec![0u8; data_length];
            let status =
                ffi::CMBlockBufferCopyDataBytes(block_buffer, 0, data_length, data.as_mut_ptr());
            if status != ffi::NO_ERR {
                tracing::error!("[VideoToolbox] CMBlockBufferCopyDataBytes failed: {}", status);
                return Err(status);
            }

            let format = ffi::CMSampleBufferGetFormatDescription(sample_buffer);
            let parameter_set_count = if format.is_null() {
                0
            } else {
                parameter_set_count(format, codec)
            };

            Ok(Self {
                data,
                format,
                codec,
                parameter_set_count,
                presentation_timestamp: ffi::CMSampleBufferGetPresentationTimeStamp(sample_buffer)
                    .into(),
                _buffer: PhantomData,
            })
        }
    }
}

type ParameterSetAtIndex = unsafe extern "C" fn(
    ffi::CMFormatDescriptionRef,
    usize,
    *mut *const u8,
    *mut usize,
    *mut usize,
    *mut i32,
) -> ffi::OSStatus;

fn parameter_set_getter(codec: VideoCodec) -> ParameterSetAtIndex {
    match codec {
        VideoCodec::H264 => ffi::CMVideoFormatDescriptionGetH264ParameterSetAtIndex,
        VideoCodec::Hevc => ffi::CMVideoFormatDescriptionGetHEVCParameterSetAtIndex,
    }
}

unsafe fn parameter_set_count(format: ffi::CMFormatDescriptionRef, codec: VideoCodec) -> usize {
    let mut count = 0usize;
    let status = unsafe {
        parameter_set_getter(codec)(
            format,
            0,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            &mut count,
            std::ptr::null_mut(),
        )
    };
    if status != ffi::NO_ERR {
        tracing::debug!("[VideoToolbox] Parameter set count query failed: {}", status);
        return 0;
    }
    count
}

impl CompressedSample for VtSample<'_> {
    fn data(&self) -> &[u8] {
        &self.data
    }

    fn parameter_set_count(&self) -> usize {
        self.parameter_set_count
    }

    fn parameter_set(&self, index: usize) -> Option<&[u8]> {
        if index >= self.parameter_set_count {
            return None;
        }

        let mut pointer: *const u8 = std::ptr::null();
        let mut size = 0usize;
        // SAFETY: the format description is owned by the sample buffer, which
        // outlives this borrow (see `from_sample_buffer`).
        let status = unsafe {
            parameter_set_getter(self.codec)(
                self.format,
                index,
                &mut pointer,
                &mut size,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };

        if status != ffi::NO_ERR || pointer.is_null() || size == 0 {
            return None;
        }
        Some(unsafe { std::slice::from_raw_parts(pointer, size) })
    }

    fn presentation_timestamp(&self) -> MediaTime {
        self.presentation_timestamp
    }
}
