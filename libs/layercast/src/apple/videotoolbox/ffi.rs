// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

// VideoToolbox FFI Bindings
//
// VideoToolbox, CoreMedia, CoreVideo and CoreFoundation entry points used by
// the compression backend.

use std::ffi::c_void;

use crate::frame::MediaTime;

pub(super) type OSStatus = i32;
pub(super) type VTCompressionSessionRef = *mut c_void;
pub(super) type CVPixelBufferRef = *mut c_void;
pub(super) type CMSampleBufferRef = *mut c_void;
pub(super) type CMBlockBufferRef = *mut c_void;
pub(super) type CMFormatDescriptionRef = *mut c_void;
pub(super) type CFStringRef = *const c_void;
pub(super) type CFNumberRef = *const c_void;
pub(super) type CFBooleanRef = *const c_void;
pub(super) type CFDictionaryRef = *const c_void;

const K_CMTIME_FLAGS_VALID: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub(super) struct CMTime {
    pub value: i64,
    pub timescale: i32,
    pub flags: u32,
    pub epoch: i64,
}

impl CMTime {
    pub fn invalid() -> Self {
        Self {
            value: 0,
            timescale: 0,
            flags: 0,
            epoch: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.flags & K_CMTIME_FLAGS_VALID != 0 && self.timescale > 0
    }
}

impl From<MediaTime> for CMTime {
    fn from(time: MediaTime) -> Self {
        if !time.is_valid() {
            return Self::invalid();
        }
        Self {
            value: time.value,
            timescale: time.timescale,
            flags: K_CMTIME_FLAGS_VALID,
            epoch: 0,
        }
    }
}

impl From<CMTime> for MediaTime {
    fn from(time: CMTime) -> Self {
        if time.is_valid() {
            MediaTime::new(time.value, time.timescale)
        } else {
            MediaTime::INVALID
        }
    }
}

pub(super) const NO_ERR: OSStatus = 0;
/// kVTParameterErr
pub(super) const K_VT_PARAMETER_ERR: OSStatus = -12902;
/// kVTInvalidSessionErr
pub(super) const K_VT_INVALID_SESSION_ERR: OSStatus = -12903;

pub(super) const K_CFNUMBER_SINT32_TYPE: i32 = 3;

pub(super) type VTCompressionOutputCallback = extern "C" fn(
    output_callback_ref_con: *mut c_void,
    source_frame_ref_con: *mut c_void,
    status: OSStatus,
    info_flags: u32,
    sample_buffer: CMSampleBufferRef,
);

#[link(name = "VideoToolbox", kind = "framework")]
unsafe extern "C" {
    pub(super) fn VTCompressionSessionCreate(
        allocator: *const c_void,
        width: i32,
        height: i32,
        codec_type: u32,
        encoder_specification: *const c_void,
        source_image_buffer_attributes: *const c_void,
        compressed_data_allocator: *const c_void,
        output_callback: VTCompressionOutputCallback,
        output_callback_ref_con: *mut c_void,
        compression_session_out: *mut VTCompressionSessionRef,
    ) -> OSStatus;

    pub(super) fn VTCompressionSessionPrepareToEncodeFrames(
        session: VTCompressionSessionRef,
    ) -> OSStatus;

    pub(super) fn VTCompressionSessionEncodeFrame(
        session: VTCompressionSessionRef,
        image_buffer: CVPixelBufferRef,
        presentation_time_stamp: CMTime,
        duration: CMTime,
        frame_properties: CFDictionaryRef,
        source_frame_ref_con: *mut c_void,
        info_flags_out: *mut u32,
    ) -> OSStatus;

    pub(super) fn VTCompressionSessionCompleteFrames(
        session: VTCompressionSessionRef,
        complete_until_presentation_time_stamp: CMTime,
    ) -> OSStatus;

    pub(super) fn VTCompressionSessionInvalidate(session: VTCompressionSessionRef);

    pub(super) fn VTSessionSetProperty(
        session: VTCompressionSessionRef,
        property_key: CFStringRef,
        property_value: *const c_void,
    ) -> OSStatus;

    pub(super) static kVTCompressionPropertyKey_ProfileLevel: CFStringRef;
    pub(super) static kVTCompressionPropertyKey_RealTime: CFStringRef;
    pub(super) static kVTCompressionPropertyKey_AllowFrameReordering: CFStringRef;
    pub(super) static kVTCompressionPropertyKey_MaxKeyFrameInterval: CFStringRef;
    pub(super) static kVTCompressionPropertyKey_AverageBitRate: CFStringRef;
    pub(super) static kVTCompressionPropertyKey_ExpectedFrameRate: CFStringRef;

    pub(super) static kVTProfileLevel_H264_ConstrainedBaseline_AutoLevel: CFStringRef;
    pub(super) static kVTProfileLevel_H264_Baseline_AutoLevel: CFStringRef;
    pub(super) static kVTProfileLevel_H264_Main_AutoLevel: CFStringRef;
    pub(super) static kVTProfileLevel_H264_High_AutoLevel: CFStringRef;
    pub(super) static kVTProfileLevel_HEVC_Main_AutoLevel: CFStringRef;
    pub(super) static kVTProfileLevel_HEVC_Main10_AutoLevel: CFStringRef;

    pub(super) static kVTEncodeFrameOptionKey_ForceKeyFrame: CFStringRef;
}

#[link(name = "CoreMedia", kind = "framework")]
unsafe extern "C" {
    pub(super) fn CMSampleBufferGetDataBuffer(sbuf: CMSampleBufferRef) -> CMBlockBufferRef;

    pub(super) fn CMSampleBufferGetFormatDescription(
        sbuf: CMSampleBufferRef,
    ) -> CMFormatDescriptionRef;

    pub(super) fn CMSampleBufferGetPresentationTimeStamp(sbuf: CMSampleBufferRef) -> CMTime;

    pub(super) fn CMBlockBufferGetDataLength(the_buffer: CMBlockBufferRef) -> usize;

    pub(super) fn CMBlockBufferCopyDataBytes(
        the_buffer: CMBlockBufferRef,
        offset_to_data: usize,
        data_length: usize,
        destination: *mut u8,
    ) -> OSStatus;

    pub(super) fn CMVideoFormatDescriptionGetH264ParameterSetAtIndex(
        video_desc: CMFormatDescriptionRef,
        parameter_set_index: usize,
        parameter_set_pointer_out: *mut *const u8,
        parameter_set_size_out: *mut usize,
        parameter_set_count_out: *mut usize,
        nal_unit_header_length_out: *mut i32,
    ) -> OSStatus;

    pub(super) fn CMVideoFormatDescriptionGetHEVCParameterSetAtIndex(
        video_desc: CMFormatDescriptionRef,
        parameter_set_index: usize,
        parameter_set_pointer_out: *mut *const u8,
        parameter_set_size_out: *mut usize,
        parameter_set_count_out: *mut usize,
        nal_unit_header_length_out: *mut i32,
    ) -> OSStatus;
}

#[link(name = "CoreVideo", kind = "framework")]
unsafe extern "C" {
    pub(super) fn CVPixelBufferGetWidth(pixel_buffer: CVPixelBufferRef) -> usize;
    pub(super) fn CVPixelBufferGetHeight(pixel_buffer: CVPixelBufferRef) -> usize;
}

#[link(name = "CoreFoundation", kind = "framework")]
unsafe extern "C" {
    pub(super) fn CFNumberCreate(
        allocator: *const c_void,
        the_type: i32,
        value_ptr: *const c_void,
    ) -> CFNumberRef;

    pub(super) fn CFDictionaryCreate(
        allocator: *const c_void,
        keys: *const *const c_void,
        values: *const *const c_void,
        num_values: isize,
        key_callbacks: *const c_void,
        value_callbacks: *const c_void,
    ) -> CFDictionaryRef;

    pub(super) fn CFRetain(cf: *const c_void) -> *const c_void;
    pub(super) fn CFRelease(cf: *const c_void);

    pub(super) static kCFBooleanTrue: CFBooleanRef;
    pub(super) static kCFBooleanFalse: CFBooleanRef;
}
