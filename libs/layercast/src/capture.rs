// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Shared camera capture with reference-counted activation.
//!
//! The source runs while at least one consumer is registered. Every captured
//! frame is handed to all consumers in registration order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::Result;
use crate::frame::RawFrame;

/// Camera (or other frame producer) driven by a [`CaptureHub`].
pub trait CaptureSource: Send + Sync {
    /// Begin producing frames into `delivery`. Called when the first consumer
    /// registers.
    fn start(&self, delivery: FrameDelivery) -> Result<()>;

    /// Stop producing frames. Called when the last consumer unregisters.
    fn stop(&self);
}

/// Receives every captured camera frame while registered.
pub trait CaptureConsumer: Send + Sync {
    fn on_camera_frame(&self, frame: &RawFrame);
}

struct HubShared {
    consumers: Mutex<Vec<Arc<dyn CaptureConsumer>>>,
}

/// Handle given to a [`CaptureSource`] for pushing frames.
///
/// Holds the hub weakly; deliveries after the hub is dropped are ignored.
#[derive(Clone)]
pub struct FrameDelivery {
    hub: Weak<HubShared>,
}

impl FrameDelivery {
    pub fn deliver(&self, frame: &RawFrame) {
        let Some(hub) = self.hub.upgrade() else {
            return;
        };

        let consumers = hub.consumers.lock();
        for consumer in consumers.iter() {
            consumer.on_camera_frame(frame);
        }
    }
}

pub struct CaptureHub {
    shared: Arc<HubShared>,
    source: Arc<dyn CaptureSource>,
    /// Serializes register/unregister so start and stop pair up.
    lifecycle: Mutex<()>,
    running: AtomicBool,
}

fn same_consumer(a: &Arc<dyn CaptureConsumer>, b: &Arc<dyn CaptureConsumer>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl CaptureHub {
    pub fn new(source: Arc<dyn CaptureSource>) -> Self {
        Self {
            shared: Arc::new(HubShared {
                consumers: Mutex::new(Vec::new()),
            }),
            source,
            lifecycle: Mutex::new(()),
            running: AtomicBool::new(false),
        }
    }

    /// Add a consumer, starting the source if it is the first one.
    /// Registering the same consumer twice is a no-op.
    pub fn register(&self, consumer: Arc<dyn CaptureConsumer>) -> Result<()> {
        let _lifecycle = self.lifecycle.lock();

        let first = {
            let mut consumers = self.shared.consumers.lock();
            if consumers.iter().any(|c| same_consumer(c, &consumer)) {
                return Ok(());
            }
            consumers.push(Arc::clone(&consumer));
            consumers.len() == 1
        };

        if first {
            tracing::info!("[CaptureHub] First consumer registered, starting capture");
            let delivery = FrameDelivery {
                hub: Arc::downgrade(&self.shared),
            };
            if let Err(e) = self.source.start(delivery) {
                tracing::error!("[CaptureHub] Capture source failed to start: {}", e);
                self.shared
                    .consumers
                    .lock()
                    .retain(|c| !same_consumer(c, &consumer));
                return Err(e);
            }
            self.running.store(true, Ordering::Release);
        }

        Ok(())
    }

    /// Remove a consumer, stopping the source once none remain.
    pub fn unregister(&self, consumer: &Arc<dyn CaptureConsumer>) {
        let _lifecycle = self.lifecycle.lock();

        let now_empty = {
            let mut consumers = self.shared.consumers.lock();
            let Some(index) = consumers.iter().position(|c| same_consumer(c, consumer)) else {
                return;
            };
            consumers.remove(index);
            consumers.is_empty()
        };

        // Outside the consumer lock: stop() may wait on a capture thread that
        // is blocked in deliver().
        if now_empty && self.running.swap(false, Ordering::AcqRel) {
            tracing::info!("[CaptureHub] Last consumer unregistered, stopping capture");
            self.source.stop();
        }
    }

    pub fn consumer_count(&self) -> usize {
        self.shared.consumers.lock().len()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for CaptureHub {
    fn drop(&mut self) {
        self.shared.consumers.lock().clear();
        if self.running.swap(false, Ordering::AcqRel) {
            self.source.stop();
        }
    }
}
