// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Per-session keyframe policy: only the first submitted frame is forced.
//! Later keyframes come from the encoder's own interval.

use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome of the policy for one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDecision {
    /// Zero-based submission index within the session.
    pub index: u64,
    pub force_keyframe: bool,
}

/// Monotonic per-session submission counter. Never reset.
#[derive(Debug, Default)]
pub struct FrameCounter {
    submitted: AtomicU64,
}

impl FrameCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the next submission slot.
    pub fn next(&self) -> FrameDecision {
        let index = self.submitted.fetch_add(1, Ordering::AcqRel);
        FrameDecision {
            index,
            force_keyframe: index == 0,
        }
    }

    /// Number of submissions so far, failed ones included.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Acquire)
    }
}
