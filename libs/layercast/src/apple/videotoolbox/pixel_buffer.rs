// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::any::Any;
use std::ffi::c_void;
use std::ptr::NonNull;

use crate::frame::ImageBuffer;

use super::ffi;

/// Retained `CVPixelBuffer` handed over by the capture source.
pub struct CvPixelBuffer {
    raw: NonNull<c_void>,
}

// SAFETY: CVPixelBuffer is a reference-counted CoreFoundation object; retain,
// release and the dimension getters are thread-safe.
unsafe impl Send for CvPixelBuffer {}
unsafe impl Sync for CvPixelBuffer {}

impl CvPixelBuffer {
    /// Retain `raw` for the lifetime of the returned wrapper.
    ///
    /// # Safety
    /// `raw` must be a valid `CVPixelBufferRef`.
    pub unsafe fn retain(raw: *mut c_void) -> Option<Self> {
        let raw = NonNull::new(raw)?;
        unsafe { ffi::CFRetain(raw.as_ptr()) };
        Some(Self { raw })
    }

    pub(super) fn as_raw(&self) -> ffi::CVPixelBufferRef {
        self.raw.as_ptr()
    }
}

impl ImageBuffer for CvPixelBuffer {
    fn width(&self) -> u32 {
        unsafe { ffi::CVPixelBufferGetWidth(self.as_raw()) as u32 }
    }

    fn height(&self) -> u32 {
        unsafe { ffi::CVPixelBufferGetHeight(self.as_raw()) as u32 }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for CvPixelBuffer {
    fn drop(&mut self) {
        unsafe { ffi::CFRelease(self.raw.as_ptr()) };
    }
}
