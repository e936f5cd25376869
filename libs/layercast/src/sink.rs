// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Destinations for packaged frames.

use crossbeam_channel::{Receiver, Sender};

use crate::frame::EncodedFrame;

/// Receives every successfully compressed frame.
///
/// Called from backend completion threads, possibly for several layers at
/// once. Implementations must not block for long.
pub trait EncodedFrameSink: Send + Sync {
    fn on_compressed_frame(&self, layer: Option<&str>, frame: EncodedFrame);
}

impl<F> EncodedFrameSink for F
where
    F: Fn(Option<&str>, EncodedFrame) + Send + Sync,
{
    fn on_compressed_frame(&self, layer: Option<&str>, frame: EncodedFrame) {
        self(layer, frame)
    }
}

/// A packaged frame tagged with its layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerFrame {
    pub layer: Option<String>,
    pub frame: EncodedFrame,
}

/// Forwards frames onto a crossbeam channel.
#[derive(Clone)]
pub struct ChannelSink {
    tx: Sender<LayerFrame>,
}

impl ChannelSink {
    /// Unbounded sink plus its receiving end.
    pub fn unbounded() -> (Self, Receiver<LayerFrame>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }

    /// Bounded sink. A full channel drops the frame rather than stalling the
    /// encoder's completion thread.
    pub fn bounded(capacity: usize) -> (Self, Receiver<LayerFrame>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self { tx }, rx)
    }
}

impl EncodedFrameSink for ChannelSink {
    fn on_compressed_frame(&self, layer: Option<&str>, frame: EncodedFrame) {
        let item = LayerFrame {
            layer: layer.map(str::to_string),
            frame,
        };
        if let Err(e) = self.tx.try_send(item) {
            tracing::warn!("[ChannelSink] Dropped frame: {}", e);
        }
    }
}
