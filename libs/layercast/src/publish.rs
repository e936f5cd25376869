// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Publish orchestration: turn the tracks a peer connection negotiated into
//! running encoder sessions fed by the shared camera.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::backend::CompressionBackend;
use crate::capture::{CaptureConsumer, CaptureHub};
use crate::codec::{ProfileLevel, TrackCodec, VideoCodec};
use crate::config::PublishConfig;
use crate::error::{layer_label, EncodeError, Result};
use crate::pool::EncoderPool;
use crate::sink::EncodedFrameSink;

/// Peer connection state as reported by the connection layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerConnectionState {
    Inactive,
    Connecting,
    Connected,
    Failed,
    Closed,
}

impl PeerConnectionState {
    /// Whether publishing must be torn down.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PeerConnectionState::Failed | PeerConnectionState::Closed)
    }
}

/// One video track the peer connection agreed to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiatedTrack {
    /// Simulcast rid, `None` for a plain single track.
    pub layer: Option<String>,
    pub codec: TrackCodec,
    pub profile_level_id: u32,
}

impl NegotiatedTrack {
    pub fn primary(codec: TrackCodec, profile_level_id: u32) -> Self {
        Self {
            layer: None,
            codec,
            profile_level_id,
        }
    }

    pub fn simulcast(rid: impl Into<String>, codec: TrackCodec, profile_level_id: u32) -> Self {
        Self {
            layer: Some(rid.into()),
            codec,
            profile_level_id,
        }
    }
}

/// Drives one publish attempt at a time.
pub struct Publisher {
    hub: Arc<CaptureHub>,
    backend: Arc<dyn CompressionBackend>,
    sink: Arc<dyn EncodedFrameSink>,
    /// Serializes start and teardown so a state change can't slip between
    /// opening the sessions and attaching them to the camera.
    lifecycle: Mutex<()>,
    active: Mutex<Option<Arc<EncoderPool>>>,
}

impl Publisher {
    pub fn new(
        hub: Arc<CaptureHub>,
        backend: Arc<dyn CompressionBackend>,
        sink: Arc<dyn EncodedFrameSink>,
    ) -> Self {
        Self {
            hub,
            backend,
            sink,
            lifecycle: Mutex::new(()),
            active: Mutex::new(None),
        }
    }

    /// Open one encoder session per negotiated track and attach them to the
    /// camera. A previous publish attempt is torn down first.
    ///
    /// A simulcast layer that can't be opened is skipped. The start fails if
    /// the primary track fails or no layer could be opened at all.
    pub fn start(&self, tracks: &[NegotiatedTrack], config: &PublishConfig) -> Result<()> {
        let _lifecycle = self.lifecycle.lock();

        self.teardown();
        config.validate()?;

        if tracks.is_empty() {
            return Err(EncodeError::Configuration(
                "peer connection negotiated no video tracks".into(),
            ));
        }

        let pool = Arc::new(EncoderPool::new(Arc::clone(&self.backend)));

        for track in tracks {
            if let Err(e) = self.open_track(&pool, track, config) {
                if track.layer.is_none() {
                    tracing::error!("[Publisher] Primary track failed: {}", e);
                    return Err(e);
                }
                tracing::warn!(
                    "[Publisher] Skipping simulcast layer {}: {}",
                    layer_label(track.layer.as_deref()),
                    e
                );
            }
        }

        if pool.is_empty() {
            return Err(EncodeError::SessionCreationFailed {
                layer: "<all>".into(),
                reason: "no negotiated layer could be opened".into(),
            });
        }

        let consumer: Arc<dyn CaptureConsumer> = pool.clone();
        self.hub.register(consumer)?;

        tracing::info!(
            "[Publisher] Publishing {} layer(s): {:?}",
            pool.len(),
            pool.layers()
        );
        *self.active.lock() = Some(pool);
        Ok(())
    }

    fn open_track(
        &self,
        pool: &EncoderPool,
        track: &NegotiatedTrack,
        config: &PublishConfig,
    ) -> Result<()> {
        let codec = VideoCodec::from_track_codec(track.codec)?;
        let profile_level = ProfileLevel::from_profile_level_id(codec, track.profile_level_id)?;

        let layer = config.layer(track.layer.as_deref()).ok_or_else(|| {
            EncodeError::Configuration(format!(
                "no layer config for {}",
                layer_label(track.layer.as_deref())
            ))
        })?;

        let encoder_config = config.encoder_config_for(layer, codec, profile_level);
        pool.register(encoder_config, Arc::clone(&self.sink))
    }

    /// Connection state callback. Tears publishing down on failure or close.
    pub fn on_state_changed(&self, state: PeerConnectionState) {
        tracing::debug!("[Publisher] Peer connection state: {:?}", state);
        if state.is_terminal() {
            self.disconnect();
        }
    }

    /// Detach from the camera and stop every session. No-op when idle.
    ///
    /// Waits for an in-progress `start` to finish, then tears it down.
    pub fn disconnect(&self) {
        let _lifecycle = self.lifecycle.lock();
        self.teardown();
    }

    fn teardown(&self) {
        let Some(pool) = self.active.lock().take() else {
            return;
        };

        let consumer: Arc<dyn CaptureConsumer> = pool.clone();
        self.hub.unregister(&consumer);
        pool.stop_all();
        tracing::info!("[Publisher] Disconnected");
    }

    pub fn is_publishing(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Layers of the current publish attempt.
    pub fn active_layers(&self) -> Vec<Option<String>> {
        self.active
            .lock()
            .as_ref()
            .map(|pool| pool.layers())
            .unwrap_or_default()
    }

    /// The running pool, if publishing.
    pub fn pool(&self) -> Option<Arc<EncoderPool>> {
        self.active.lock().clone()
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.disconnect();
    }
}
