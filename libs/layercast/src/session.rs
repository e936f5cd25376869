// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! One hardware encoder session per output layer.
//!
//! Frames go in through [`EncoderSession::submit`]; packaged frames come out
//! of the sink on the backend's completion thread. Completions hold only a
//! `Weak` to the session so a late callback never touches a dropped session.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::backend::{
    CompletionHandler, CompressionBackend, CompressionHandle, EncodeOutcome, FrameOptions,
    SessionProperties,
};
use crate::config::EncoderConfig;
use crate::error::{EncodeError, Result};
use crate::frame::RawFrame;
use crate::keyframe::FrameCounter;
use crate::packager;
use crate::sink::EncodedFrameSink;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique session identifier, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Lifecycle phase. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Open, nothing submitted yet.
    Configured = 0,
    Encoding = 1,
    /// `stop()` is draining in-flight frames.
    Stopping = 2,
    Stopped = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Configured,
            1 => SessionState::Encoding,
            2 => SessionState::Stopping,
            _ => SessionState::Stopped,
        }
    }
}

/// State reachable from completion handlers.
struct SessionShared {
    id: SessionId,
    config: EncoderConfig,
    phase: AtomicU8,
    sink: Arc<dyn EncodedFrameSink>,
    frames_delivered: AtomicU64,
}

impl SessionShared {
    fn state(&self) -> SessionState {
        SessionState::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn handle_completion(&self, outcome: EncodeOutcome<'_>) {
        // Stopping still delivers: those are the frames stop() is draining.
        if self.state() == SessionState::Stopped {
            tracing::trace!("[EncoderSession] {} discarding late completion", self.id);
            return;
        }

        let sample = match outcome {
            Ok(sample) => sample,
            Err(status) => {
                let e = EncodeError::FrameSubmissionFailed {
                    layer: self.config.layer_label(),
                    status,
                };
                tracing::warn!("[EncoderSession] {} {}", self.id, e);
                return;
            }
        };

        let frame = packager::package(self.config.codec, sample);
        tracing::trace!(
            "[EncoderSession] {} delivering {} NAL units ({} bytes, keyframe={})",
            self.id,
            frame.nalus.len(),
            frame.byte_len(),
            frame.is_keyframe()
        );

        self.sink
            .on_compressed_frame(self.config.layer_id.as_deref(), frame);
        self.frames_delivered.fetch_add(1, Ordering::Relaxed);
    }
}

/// Hardware encoder session bound to one layer.
pub struct EncoderSession {
    shared: Arc<SessionShared>,
    handle: Mutex<Option<Box<dyn CompressionHandle>>>,
    counter: FrameCounter,
}

impl EncoderSession {
    /// Open a session for `config`, delivering packaged frames to `sink`.
    pub fn create(
        config: EncoderConfig,
        backend: &dyn CompressionBackend,
        sink: Arc<dyn EncodedFrameSink>,
    ) -> Result<Self> {
        config.validate().map_err(|e| match e {
            EncodeError::Configuration(reason) => EncodeError::SessionCreationFailed {
                layer: config.layer_label(),
                reason,
            },
            other => other,
        })?;

        let properties = SessionProperties::for_config(&config);
        let handle = backend.open(&config, &properties).map_err(|e| {
            tracing::error!(
                "[EncoderSession] {} backend failed to open layer {}: {}",
                backend.name(),
                config.layer_label(),
                e
            );
            e
        })?;

        let id = SessionId::next();
        tracing::info!(
            "[EncoderSession] {} opened: layer={} {}x{} {} @ {} fps, {} bps",
            id,
            config.layer_label(),
            config.width,
            config.height,
            config.codec,
            config.fps,
            config.bitrate_bps
        );

        Ok(Self {
            shared: Arc::new(SessionShared {
                id,
                config,
                phase: AtomicU8::new(SessionState::Configured as u8),
                sink,
                frames_delivered: AtomicU64::new(0),
            }),
            handle: Mutex::new(Some(handle)),
            counter: FrameCounter::new(),
        })
    }

    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    pub fn layer_id(&self) -> Option<&str> {
        self.shared.config.layer_id.as_deref()
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.shared.config
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Frames handed to the encoder, failed submissions included.
    pub fn frames_submitted(&self) -> u64 {
        self.counter.submitted()
    }

    /// Frames that reached the sink.
    pub fn frames_delivered(&self) -> u64 {
        self.shared.frames_delivered.load(Ordering::Relaxed)
    }

    /// Hand one frame to the encoder. Returns once the frame is queued;
    /// failures are logged and the frame is dropped.
    pub fn submit(&self, frame: &RawFrame) {
        let mut slot = self.handle.lock();
        let Some(handle) = slot.as_mut() else {
            tracing::debug!(
                "[EncoderSession] {} stopped, dropping frame",
                self.shared.id
            );
            return;
        };

        if self.state() == SessionState::Stopping {
            tracing::debug!(
                "[EncoderSession] {} stopping, dropping frame",
                self.shared.id
            );
            return;
        }

        let _ = self.shared.phase.compare_exchange(
            SessionState::Configured as u8,
            SessionState::Encoding as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );

        let decision = self.counter.next();
        if decision.force_keyframe {
            tracing::debug!(
                "[EncoderSession] {} forcing keyframe on first frame",
                self.shared.id
            );
        }

        let weak: Weak<SessionShared> = Arc::downgrade(&self.shared);
        let on_complete: CompletionHandler = Box::new(move |outcome: EncodeOutcome<'_>| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_completion(outcome);
            }
        });

        let options = FrameOptions {
            force_keyframe: decision.force_keyframe,
        };
        if let Err(status) = handle.encode(frame, options, on_complete) {
            let e = EncodeError::FrameSubmissionFailed {
                layer: self.shared.config.layer_label(),
                status,
            };
            tracing::warn!(
                "[EncoderSession] {} frame {} dropped: {}",
                self.shared.id,
                decision.index,
                e
            );
        }
    }

    /// Drain in-flight frames and release the hardware session.
    ///
    /// Idempotent and safe to call while frames are being submitted or
    /// completed on other threads.
    pub fn stop(&self) {
        let previous = self
            .shared
            .phase
            .fetch_max(SessionState::Stopping as u8, Ordering::AcqRel);
        if previous >= SessionState::Stopping as u8 {
            return;
        }

        // Waits for any submit() currently inside encode().
        let handle = self.handle.lock().take();

        if let Some(mut handle) = handle {
            handle.complete_frames();
            handle.invalidate();
        }

        self.shared
            .phase
            .store(SessionState::Stopped as u8, Ordering::Release);

        tracing::info!(
            "[EncoderSession] {} stopped: layer={} submitted={} delivered={}",
            self.shared.id,
            self.shared.config.layer_label(),
            self.frames_submitted(),
            self.frames_delivered()
        );
    }
}

impl Drop for EncoderSession {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for EncoderSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncoderSession")
            .field("id", &self.shared.id)
            .field("layer", &self.shared.config.layer_id)
            .field("state", &self.state())
            .finish()
    }
}
