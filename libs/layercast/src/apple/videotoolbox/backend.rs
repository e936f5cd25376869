// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

// VideoToolbox Compression Backend
//
// One VTCompressionSession per handle. Per-frame completion handlers are
// parked in the handle's context keyed by a sequence number; the sequence
// number travels through VideoToolbox as the source frame refcon.

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{
    CompletionHandler, CompressionBackend, CompressionHandle, FrameOptions, SessionProperties,
};
use crate::codec::{H264Profile, HevcProfile, ProfileLevel, VideoCodec};
use crate::config::EncoderConfig;
use crate::error::{EncodeError, OsStatus, Result};
use crate::frame::RawFrame;

use super::ffi;
use super::pixel_buffer::CvPixelBuffer;
use super::sample::VtSample;

/// Backend opening VideoToolbox hardware encoders.
#[derive(Debug, Default, Clone, Copy)]
pub struct VideoToolboxBackend;

impl VideoToolboxBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CompressionBackend for VideoToolboxBackend {
    fn name(&self) -> &str {
        "VideoToolbox"
    }

    fn open(
        &self,
        config: &EncoderConfig,
        properties: &SessionProperties,
    ) -> Result<Box<dyn CompressionHandle>> {
        Ok(Box::new(VideoToolboxHandle::open(config, properties)?))
    }
}

/// State shared with the output callback.
struct CallbackContext {
    codec: VideoCodec,
    layer: String,
    pending: Mutex<HashMap<u64, CompletionHandler>>,
}

impl CallbackContext {
    fn take(&self, sequence: u64) -> Option<CompletionHandler> {
        self.pending.lock().remove(&sequence)
    }
}

pub struct VideoToolboxHandle {
    session: Option<ffi::VTCompressionSessionRef>,
    context: *const CallbackContext,
    next_sequence: u64,
}

// SAFETY: VTCompressionSession calls are thread-safe, and the handle is only
// driven through `&mut self` behind the session's mutex.
unsafe impl Send for VideoToolboxHandle {}

impl VideoToolboxHandle {
    pub fn open(config: &EncoderConfig, properties: &SessionProperties) -> Result<Self> {
        let (Ok(width), Ok(height)) = (i32::try_from(config.width), i32::try_from(config.height))
        else {
            return Err(EncodeError::SessionCreationFailed {
                layer: config.layer_label(),
                reason: format!(
                    "{}x{} exceeds VideoToolbox dimension range",
                    config.width, config.height
                ),
            });
        };

        let context = Arc::into_raw(Arc::new(CallbackContext {
            codec: config.codec,
            layer: config.layer_label(),
            pending: Mutex::new(HashMap::new()),
        }));

        let mut session: ffi::VTCompressionSessionRef = std::ptr::null_mut();
        let status = unsafe {
            ffi::VTCompressionSessionCreate(
                std::ptr::null(), // allocator
                width,
                height,
                config.codec.fourcc(),
                std::ptr::null(), // encoder specification
                std::ptr::null(), // source image buffer attributes
                std::ptr::null(), // compressed data allocator
                compression_output_callback,
                context as *mut c_void,
                &mut session,
            )
        };

        if status != ffi::NO_ERR || session.is_null() {
            // Reconstruct the Arc so the context is freed
            unsafe { drop(Arc::from_raw(context)) };
            return Err(EncodeError::SessionCreationFailed {
                layer: config.layer_label(),
                reason: format!("VTCompressionSessionCreate failed: {}", status),
            });
        }

        let handle = Self {
            session: Some(session),
            context,
            next_sequence: 0,
        };

        unsafe { handle.apply_properties(session, config.codec, properties) };

        let status = unsafe { ffi::VTCompressionSessionPrepareToEncodeFrames(session) };
        if status != ffi::NO_ERR {
            tracing::warn!(
                "[VideoToolbox] PrepareToEncodeFrames failed for layer {}: {}",
                config.layer_label(),
                status
            );
        }

        tracing::info!(
            "[VideoToolbox] Compression session created: layer={} {}x{} {} @ {}fps",
            config.layer_label(),
            config.width,
            config.height,
            config.codec,
            config.fps
        );

        Ok(handle)
    }

    unsafe fn apply_properties(
        &self,
        session: ffi::VTCompressionSessionRef,
        codec: VideoCodec,
        properties: &SessionProperties,
    ) {
        unsafe {
            set_boolean(
                session,
                ffi::kVTCompressionPropertyKey_RealTime,
                "real-time",
                properties.realtime,
            );
            set_boolean(
                session,
                ffi::kVTCompressionPropertyKey_AllowFrameReordering,
                "frame reordering",
                properties.allow_frame_reordering,
            );
            set_i32(
                session,
                ffi::kVTCompressionPropertyKey_AverageBitRate,
                "average bitrate",
                properties.average_bitrate,
            );
            set_i32(
                session,
                ffi::kVTCompressionPropertyKey_ExpectedFrameRate,
                "expected frame rate",
                properties.expected_frame_rate,
            );
            set_i32(
                session,
                ffi::kVTCompressionPropertyKey_MaxKeyFrameInterval,
                "max keyframe interval",
                properties.max_keyframe_interval,
            );

            if let Some(profile) = profile_level_key(properties.profile_level) {
                let status = ffi::VTSessionSetProperty(
                    session,
                    ffi::kVTCompressionPropertyKey_ProfileLevel,
                    profile,
                );
                if status != ffi::NO_ERR {
                    tracing::warn!(
                        "[VideoToolbox] Failed to set {} profile {:?}: {}",
                        codec,
                        properties.profile_level,
                        status
                    );
                }
            }
        }
    }

    fn context(&self) -> &CallbackContext {
        // SAFETY: the Arc leaked in `open` is only reclaimed in Drop.
        unsafe { &*self.context }
    }

    /// Drop handlers VideoToolbox will never call back.
    fn discard_pending(&self) {
        let dropped = std::mem::take(&mut *self.context().pending.lock());
        if !dropped.is_empty() {
            tracing::debug!(
                "[VideoToolbox] Layer {}: discarded {} pending completions",
                self.context().layer,
                dropped.len()
            );
        }
    }
}

impl CompressionHandle for VideoToolboxHandle {
    fn encode(
        &mut self,
        frame: &RawFrame,
        options: FrameOptions,
        on_complete: CompletionHandler,
    ) -> std::result::Result<(), OsStatus> {
        let Some(session) = self.session else {
            return Err(ffi::K_VT_INVALID_SESSION_ERR);
        };

        let Some(pixel_buffer) = frame.image.as_any().downcast_ref::<CvPixelBuffer>() else {
            tracing::error!("[VideoToolbox] Frame image is not a CVPixelBuffer");
            return Err(ffi::K_VT_PARAMETER_ERR);
        };

        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.context().pending.lock().insert(sequence, on_complete);

        let status = unsafe {
            let frame_properties = create_frame_properties(options.force_keyframe);

            let status = ffi::VTCompressionSessionEncodeFrame(
                session,
                pixel_buffer.as_raw(),
                frame.presentation_timestamp.into(),
                frame.duration.into(),
                frame_properties,
                sequence as usize as *mut c_void,
                std::ptr::null_mut(), // info flags out
            );

            if !frame_properties.is_null() {
                ffi::CFRelease(frame_properties);
            }
            status
        };

        if status != ffi::NO_ERR {
            // Never reached the encoder; the handler must not fire.
            self.context().take(sequence);
            return Err(status);
        }
        Ok(())
    }

    fn complete_frames(&mut self) {
        let Some(session) = self.session else {
            return;
        };

        tracing::debug!("[VideoToolbox] Waiting for all pending frames to complete...");
        let status =
            unsafe { ffi::VTCompressionSessionCompleteFrames(session, ffi::CMTime::invalid()) };
        if status != ffi::NO_ERR {
            tracing::warn!(
                "[VideoToolbox] VTCompressionSessionCompleteFrames failed: {}",
                status
            );
        }
    }

    fn invalidate(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        unsafe {
            ffi::VTCompressionSessionInvalidate(session);
            ffi::CFRelease(session as *const c_void);
        }
        self.discard_pending();
        tracing::debug!("[VideoToolbox] Layer {} session invalidated", self.context().layer);
    }
}

impl Drop for VideoToolboxHandle {
    fn drop(&mut self) {
        // Complete before invalidating so no callback is still running when
        // the context is freed.
        self.complete_frames();
        self.invalidate();

        unsafe { drop(Arc::from_raw(self.context)) };
    }
}

// ============================================================================
// PROPERTY HELPERS
// ============================================================================

fn profile_level_key(profile_level: ProfileLevel) -> Option<*const c_void> {
    let key = unsafe {
        match profile_level {
            ProfileLevel::Auto => return None,
            ProfileLevel::H264(H264Profile::ConstrainedBaseline) => {
                ffi::kVTProfileLevel_H264_ConstrainedBaseline_AutoLevel
            }
            ProfileLevel::H264(H264Profile::Baseline) => {
                ffi::kVTProfileLevel_H264_Baseline_AutoLevel
            }
            ProfileLevel::H264(H264Profile::Main) => ffi::kVTProfileLevel_H264_Main_AutoLevel,
            ProfileLevel::H264(H264Profile::High) => ffi::kVTProfileLevel_H264_High_AutoLevel,
            ProfileLevel::Hevc(HevcProfile::Main) => ffi::kVTProfileLevel_HEVC_Main_AutoLevel,
            ProfileLevel::Hevc(HevcProfile::Main10) => {
                ffi::kVTProfileLevel_HEVC_Main10_AutoLevel
            }
        }
    };
    Some(key)
}

unsafe fn set_boolean(
    session: ffi::VTCompressionSessionRef,
    key: ffi::CFStringRef,
    name: &str,
    value: bool,
) {
    unsafe {
        let value = if value {
            ffi::kCFBooleanTrue
        } else {
            ffi::kCFBooleanFalse
        };
        let status = ffi::VTSessionSetProperty(session, key, value);
        if status != ffi::NO_ERR {
            tracing::warn!("[VideoToolbox] Failed to set {}: {}", name, status);
        }
    }
}

unsafe fn set_i32(
    session: ffi::VTCompressionSessionRef,
    key: ffi::CFStringRef,
    name: &str,
    value: u32,
) {
    let Ok(value) = i32::try_from(value) else {
        tracing::warn!("[VideoToolbox] {} {} out of range, not set", name, value);
        return;
    };

    unsafe {
        let number = ffi::CFNumberCreate(
            std::ptr::null(),
            ffi::K_CFNUMBER_SINT32_TYPE,
            &value as *const i32 as *const c_void,
        );
        let status = ffi::VTSessionSetProperty(session, key, number);
        ffi::CFRelease(number);
        if status != ffi::NO_ERR {
            tracing::warn!("[VideoToolbox] Failed to set {}: {}", name, status);
        }
    }
}

/// `{kVTEncodeFrameOptionKey_ForceKeyFrame: force}`. Caller releases.
unsafe fn create_frame_properties(force_keyframe: bool) -> ffi::CFDictionaryRef {
    unsafe {
        let keys = [ffi::kVTEncodeFrameOptionKey_ForceKeyFrame];
        let values = [if force_keyframe {
            ffi::kCFBooleanTrue
        } else {
            ffi::kCFBooleanFalse
        }];

        ffi::CFDictionaryCreate(
            std::ptr::null(), // allocator (default)
            keys.as_ptr(),
            values.as_ptr(),
            1,
            std::ptr::null(), // key callbacks (default)
            std::ptr::null(), // value callbacks (default)
        )
    }
}

// ============================================================================
// VIDEOTOOLBOX CALLBACK
// ============================================================================

/// Called by VideoToolbox on its own thread once per accepted frame.
extern "C" fn compression_output_callback(
    output_callback_ref_con: *mut c_void,
    source_frame_ref_con: *mut c_void,
    status: ffi::OSStatus,
    _info_flags: u32,
    sample_buffer: ffi::CMSampleBufferRef,
) {
    // SAFETY: the context outlives the session; Drop completes frames and
    // invalidates before reclaiming it.
    let context = unsafe { &*(output_callback_ref_con as *const CallbackContext) };
    let sequence = source_frame_ref_con as usize as u64;

    let Some(on_complete) = context.take(sequence) else {
        tracing::trace!(
            "[VideoToolbox] Layer {}: no handler for frame {}",
            context.layer,
            sequence
        );
        return;
    };

    if status != ffi::NO_ERR {
        on_complete(Err(status));
        return;
    }

    // Dropped frames arrive with a success status and no buffer.
    if sample_buffer.is_null() {
        tracing::debug!("[VideoToolbox] Layer {}: frame {} dropped", context.layer, sequence);
        return;
    }

    match unsafe { VtSample::from_sample_buffer(sample_buffer, context.codec) } {
        Ok(sample) => on_complete(Ok(&sample)),
        Err(status) => on_complete(Err(status)),
    }
}
