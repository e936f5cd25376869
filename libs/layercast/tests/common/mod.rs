//! Test doubles shared by the integration tests.
//!
//! `ScriptedBackend` stands in for the hardware encoder: every handle owns a
//! worker thread that turns submitted frames into length-prefixed samples and
//! runs the completion handler there, the way a platform encoder would.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use layercast::{
    CaptureSource, CompletionHandler, CompressionBackend, CompressionHandle, EncodeError,
    EncodedFrame, EncoderConfig, FrameDelivery, FrameOptions, MediaTime, OsStatus, OwnedSample,
    RawFrame, SessionProperties, SyntheticImage, VideoCodec,
};

// =============================================================================
// Scripted backend
// =============================================================================

#[derive(Default)]
pub struct Script {
    /// Layers whose `open` fails.
    pub fail_open: HashSet<Option<String>>,
    /// Synchronous status returned by every `encode`.
    pub fail_encode: Option<OsStatus>,
    /// Asynchronous status delivered to every completion.
    pub fail_completion: Option<OsStatus>,
    /// Override how many parameter sets keyframes carry.
    pub parameter_set_count: Option<usize>,
    /// Park handlers in the backend instead of completing them.
    pub hold_completions: bool,
    /// Delay before each completion runs.
    pub completion_delay: Option<Duration>,
}

/// Everything the backend observed, shared with its handles.
#[derive(Default)]
pub struct Recorder {
    pub opened: Mutex<Vec<(EncoderConfig, SessionProperties)>>,
    /// (layer, force_keyframe) per accepted encode call.
    pub encodes: Mutex<Vec<(Option<String>, bool)>>,
    pub invalidated: AtomicUsize,
    held: Mutex<Vec<(CompletionHandler, OwnedSample)>>,
}

#[derive(Clone, Copy)]
struct Knobs {
    fail_encode: Option<OsStatus>,
    fail_completion: Option<OsStatus>,
    parameter_set_count: Option<usize>,
    hold_completions: bool,
    completion_delay: Option<Duration>,
}

pub struct ScriptedBackend {
    pub script: Script,
    pub recorder: Arc<Recorder>,
}

impl ScriptedBackend {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            recorder: Arc::new(Recorder::default()),
        })
    }

    pub fn healthy() -> Arc<Self> {
        Self::new(Script::default())
    }

    pub fn opened(&self) -> Vec<(EncoderConfig, SessionProperties)> {
        self.recorder.opened.lock().clone()
    }

    pub fn invalidated(&self) -> usize {
        self.recorder.invalidated.load(Ordering::SeqCst)
    }

    pub fn forced_keyframes(&self, layer: Option<&str>) -> Vec<bool> {
        self.recorder
            .encodes
            .lock()
            .iter()
            .filter(|(l, _)| l.as_deref() == layer)
            .map(|(_, forced)| *forced)
            .collect()
    }

    pub fn held_count(&self) -> usize {
        self.recorder.held.lock().len()
    }

    /// Fire every parked handler now, as a late platform callback would.
    pub fn release_held(&self) {
        let held = std::mem::take(&mut *self.recorder.held.lock());
        for (handler, sample) in held {
            handler(Ok(&sample));
        }
    }

    fn knobs(&self) -> Knobs {
        Knobs {
            fail_encode: self.script.fail_encode,
            fail_completion: self.script.fail_completion,
            parameter_set_count: self.script.parameter_set_count,
            hold_completions: self.script.hold_completions,
            completion_delay: self.script.completion_delay,
        }
    }
}

impl CompressionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn open(
        &self,
        config: &EncoderConfig,
        properties: &SessionProperties,
    ) -> layercast::Result<Box<dyn CompressionHandle>> {
        if self.script.fail_open.contains(&config.layer_id) {
            return Err(EncodeError::SessionCreationFailed {
                layer: config.layer_label(),
                reason: "scripted failure".into(),
            });
        }

        self.recorder
            .opened
            .lock()
            .push((config.clone(), *properties));
        Ok(Box::new(ScriptedHandle::spawn(
            config,
            self.knobs(),
            Arc::clone(&self.recorder),
        )))
    }
}

enum Job {
    Encode {
        sequence: u64,
        force_keyframe: bool,
        handler: CompletionHandler,
    },
    Flush(Sender<()>),
}

struct ScriptedHandle {
    layer: Option<String>,
    knobs: Knobs,
    recorder: Arc<Recorder>,
    jobs: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    invalidated: Arc<AtomicBool>,
    next_sequence: u64,
}

impl ScriptedHandle {
    fn spawn(config: &EncoderConfig, knobs: Knobs, recorder: Arc<Recorder>) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();
        let invalidated = Arc::new(AtomicBool::new(false));
        let codec = config.codec;

        let worker = {
            let invalidated = Arc::clone(&invalidated);
            let recorder = Arc::clone(&recorder);
            std::thread::Builder::new()
                .name(format!("scripted-encoder-{}", config.layer_label()))
                .spawn(move || run_worker(rx, codec, knobs, recorder, invalidated))
                .expect("spawn scripted encoder worker")
        };

        Self {
            layer: config.layer_id.clone(),
            knobs,
            recorder,
            jobs: Some(tx),
            worker: Some(worker),
            invalidated,
            next_sequence: 0,
        }
    }
}

fn run_worker(
    rx: Receiver<Job>,
    codec: VideoCodec,
    knobs: Knobs,
    recorder: Arc<Recorder>,
    invalidated: Arc<AtomicBool>,
) {
    for job in rx {
        match job {
            Job::Encode {
                sequence,
                force_keyframe,
                handler,
            } => {
                if let Some(delay) = knobs.completion_delay {
                    std::thread::sleep(delay);
                }
                if invalidated.load(Ordering::SeqCst) {
                    continue;
                }

                let sample =
                    scripted_sample(codec, sequence, force_keyframe, knobs.parameter_set_count);
                if knobs.hold_completions {
                    recorder.held.lock().push((handler, sample));
                    continue;
                }
                match knobs.fail_completion {
                    Some(status) => handler(Err(status)),
                    None => handler(Ok(&sample)),
                }
            }
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

impl CompressionHandle for ScriptedHandle {
    fn encode(
        &mut self,
        _frame: &RawFrame,
        options: FrameOptions,
        on_complete: CompletionHandler,
    ) -> Result<(), OsStatus> {
        if let Some(status) = self.knobs.fail_encode {
            return Err(status);
        }
        let Some(jobs) = &self.jobs else {
            return Err(-12903);
        };

        self.recorder
            .encodes
            .lock()
            .push((self.layer.clone(), options.force_keyframe));

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        jobs.send(Job::Encode {
            sequence,
            force_keyframe: options.force_keyframe,
            handler: on_complete,
        })
        .map_err(|_| -12903)
    }

    fn complete_frames(&mut self) {
        let Some(jobs) = &self.jobs else {
            return;
        };
        let (tx, rx) = crossbeam_channel::bounded(1);
        if jobs.send(Job::Flush(tx)).is_ok() {
            let _ = rx.recv();
        }
    }

    fn invalidate(&mut self) {
        self.invalidated.store(true, Ordering::SeqCst);
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.recorder.invalidated.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for ScriptedHandle {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.invalidate();
        }
    }
}

// =============================================================================
// Samples
// =============================================================================

fn slice_nal(codec: VideoCodec, keyframe: bool, sequence: u64) -> Vec<u8> {
    let mut nal = match (codec, keyframe) {
        (VideoCodec::H264, true) => vec![0x65],
        (VideoCodec::H264, false) => vec![0x41],
        // IDR_W_RADL / TRAIL_R
        (VideoCodec::Hevc, true) => vec![19 << 1, 0x01],
        (VideoCodec::Hevc, false) => vec![1 << 1, 0x01],
    };
    nal.extend_from_slice(&sequence.to_be_bytes());
    nal
}

pub fn parameter_sets(codec: VideoCodec) -> Vec<Bytes> {
    match codec {
        VideoCodec::H264 => vec![
            Bytes::from_static(&[0x67, 0x42, 0xe0, 0x1f]),
            Bytes::from_static(&[0x68, 0xce, 0x3c, 0x80]),
        ],
        VideoCodec::Hevc => vec![
            Bytes::from_static(&[0x40, 0x01, 0x0c]),
            Bytes::from_static(&[0x42, 0x01, 0x01]),
            Bytes::from_static(&[0x44, 0x01, 0xc1]),
        ],
    }
}

fn scripted_sample(
    codec: VideoCodec,
    sequence: u64,
    keyframe: bool,
    parameter_set_count: Option<usize>,
) -> OwnedSample {
    let slice = slice_nal(codec, keyframe, sequence);
    let mut sets = if keyframe {
        parameter_sets(codec)
    } else {
        Vec::new()
    };
    if let (true, Some(count)) = (keyframe, parameter_set_count) {
        sets.truncate(count);
    }

    OwnedSample::from_nal_units(&[&[0x09, 0xf0], &slice], sets)
        .with_presentation_timestamp(MediaTime::new(sequence as i64, 30))
}

/// Sequence number the scripted backend embedded in a packaged frame.
pub fn frame_sequence(frame: &EncodedFrame) -> u64 {
    // nalus[1] = start code + slice header (1 or 2 bytes) + 8 byte sequence
    let slice = &frame.nalus[1];
    let tail = &slice[slice.len() - 8..];
    u64::from_be_bytes(tail.try_into().expect("8 byte sequence"))
}

// =============================================================================
// Frames and capture
// =============================================================================

pub fn raw_frame(index: i64) -> RawFrame {
    RawFrame::new(
        Arc::new(SyntheticImage::gray(8, 8)),
        MediaTime::new(index, 30),
        MediaTime::frame_interval(30),
    )
}

/// Capture source driven by the test: frames go out through `push`.
#[derive(Default)]
pub struct ManualSource {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    delivery: Mutex<Option<FrameDelivery>>,
}

impl ManualSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver one frame. Returns false when the source is stopped.
    pub fn push(&self, frame: &RawFrame) -> bool {
        let delivery = self.delivery.lock().clone();
        match delivery {
            Some(delivery) => {
                delivery.deliver(frame);
                true
            }
            None => false,
        }
    }
}

impl CaptureSource for ManualSource {
    fn start(&self, delivery: FrameDelivery) -> layercast::Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        *self.delivery.lock() = Some(delivery);
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.delivery.lock().take();
    }
}

/// Wait until `rx` has `count` items or the timeout expires.
pub fn collect<T>(rx: &Receiver<T>, count: usize, timeout: Duration) -> Vec<T> {
    let deadline = std::time::Instant::now() + timeout;
    let mut out = Vec::with_capacity(count);
    while out.len() < count {
        let remaining = deadline.saturating_duration_since(std::time::Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(item) => out.push(item),
            Err(_) => break,
        }
    }
    out
}
