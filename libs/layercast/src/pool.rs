// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Registry of live encoder sessions, one per layer, fed from a single
//! capture stream.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::CompressionBackend;
use crate::capture::CaptureConsumer;
use crate::config::EncoderConfig;
use crate::error::{layer_label, Result};
use crate::frame::RawFrame;
use crate::session::{EncoderSession, SessionId, SessionState};
use crate::sink::EncodedFrameSink;

/// Snapshot of one registered layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerStats {
    pub layer: Option<String>,
    pub session: SessionId,
    pub state: SessionState,
    pub frames_submitted: u64,
    pub frames_delivered: u64,
}

/// Layer-keyed collection of encoder sessions.
///
/// Sessions are opened and stopped outside the registry lock; the lock only
/// guards the map and the fan-out loop.
pub struct EncoderPool {
    backend: Arc<dyn CompressionBackend>,
    sessions: Mutex<HashMap<Option<String>, EncoderSession>>,
}

impl EncoderPool {
    pub fn new(backend: Arc<dyn CompressionBackend>) -> Self {
        Self {
            backend,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Open a session for `config.layer_id`. An existing session for the same
    /// layer is replaced and stopped.
    pub fn register(&self, config: EncoderConfig, sink: Arc<dyn EncodedFrameSink>) -> Result<()> {
        let layer = config.layer_id.clone();
        let session = EncoderSession::create(config, self.backend.as_ref(), sink)?;
        let id = session.id();

        let replaced = self.sessions.lock().insert(layer.clone(), session);

        if let Some(old) = replaced {
            tracing::info!(
                "[EncoderPool] Layer {} re-registered, replacing {}",
                layer_label(layer.as_deref()),
                old.id()
            );
            old.stop();
        }

        tracing::debug!(
            "[EncoderPool] Registered layer {} ({})",
            layer_label(layer.as_deref()),
            id
        );
        Ok(())
    }

    /// Remove and stop the session for `layer`. Unknown layers are ignored.
    pub fn unregister(&self, layer: Option<&str>) {
        let removed = self
            .sessions
            .lock()
            .remove(&layer.map(str::to_string));

        match removed {
            Some(session) => {
                session.stop();
                tracing::debug!("[EncoderPool] Unregistered layer {}", layer_label(layer));
            }
            None => {
                tracing::trace!(
                    "[EncoderPool] Unregister for unknown layer {}",
                    layer_label(layer)
                );
            }
        }
    }

    /// Fan one captured frame out to every registered session.
    pub fn submit_frame(&self, frame: &RawFrame) {
        let sessions = self.sessions.lock();
        for session in sessions.values() {
            session.submit(frame);
        }
    }

    /// Remove and stop every session.
    pub fn stop_all(&self) {
        let sessions = std::mem::take(&mut *self.sessions.lock());
        if sessions.is_empty() {
            return;
        }

        tracing::info!("[EncoderPool] Stopping {} sessions", sessions.len());
        for session in sessions.into_values() {
            session.stop();
        }
    }

    /// Registered layers, primary first, then by rid.
    pub fn layers(&self) -> Vec<Option<String>> {
        let mut layers: Vec<_> = self.sessions.lock().keys().cloned().collect();
        layers.sort();
        layers
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    pub fn contains(&self, layer: Option<&str>) -> bool {
        self.sessions.lock().contains_key(&layer.map(str::to_string))
    }

    pub fn stats(&self) -> Vec<LayerStats> {
        let mut stats: Vec<_> = self
            .sessions
            .lock()
            .iter()
            .map(|(layer, session)| LayerStats {
                layer: layer.clone(),
                session: session.id(),
                state: session.state(),
                frames_submitted: session.frames_submitted(),
                frames_delivered: session.frames_delivered(),
            })
            .collect();
        stats.sort_by(|a, b| a.layer.cmp(&b.layer));
        stats
    }
}

impl CaptureConsumer for EncoderPool {
    fn on_camera_frame(&self, frame: &RawFrame) {
        self.submit_frame(frame);
    }
}

impl Drop for EncoderPool {
    fn drop(&mut self) {
        self.stop_all();
    }
}

impl std::fmt::Debug for EncoderPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderPool")
            .field("backend", &self.backend.name())
            .field("layers", &self.layers())
            .finish()
    }
}
