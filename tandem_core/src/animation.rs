// Copyright 2026 the Tandem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Animations waiting for their start time.
//!
//! An animation launched between two frames is not visible until the next
//! frame is drawn, and that frame may be a long way off (first renders are
//! slow). Instead of stamping itself at launch, the animation registers here
//! and the next frame stamps every pending animation with the one clock value
//! it sampled at its start. Animations launched together therefore start
//! together, at the moment they first become visible.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::time::HostTime;

/// Receives a start time exactly once.
///
/// `start` consumes the handle, so an entry can never be stamped twice.
pub trait PendingAnimation: Send {
    /// Sets the animation's start time.
    fn start(self: Box<Self>, start_time: HostTime);
}

impl<F> PendingAnimation for F
where
    F: FnOnce(HostTime) + Send,
{
    fn start(self: Box<Self>, start_time: HostTime) {
        (*self)(start_time);
    }
}

const UNSET: u64 = u64::MAX;

/// A shareable start-time slot.
///
/// Keep one clone in the animation and register another; the animation reads
/// its start with [`start_time`](Self::start_time).
#[derive(Clone, Debug)]
pub struct AnimationStart {
    nanos: Arc<AtomicU64>,
}

impl Default for AnimationStart {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimationStart {
    /// Creates an unstarted slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nanos: Arc::new(AtomicU64::new(UNSET)),
        }
    }

    /// The assigned start time, if a frame has assigned one.
    #[must_use]
    pub fn start_time(&self) -> Option<HostTime> {
        match self.nanos.load(Ordering::Acquire) {
            UNSET => None,
            nanos => Some(HostTime(nanos)),
        }
    }
}

impl PendingAnimation for AnimationStart {
    fn start(self: Box<Self>, start_time: HostTime) {
        self.nanos.store(start_time.nanos(), Ordering::Release);
    }
}

/// Animations registered since the last frame, in registration order.
#[derive(Default)]
pub struct PendingAnimationList {
    entries: Vec<Box<dyn PendingAnimation>>,
}

impl fmt::Debug for PendingAnimationList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingAnimationList")
            .field("len", &self.entries.len())
            .finish()
    }
}

impl PendingAnimationList {
    /// Creates an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends `animation`.
    pub fn register(&mut self, animation: Box<dyn PendingAnimation>) {
        self.entries.push(animation);
    }

    /// Number of animations waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Gives every waiting animation `start_time` and empties the list.
    /// Returns how many were started.
    pub fn start_all(&mut self, start_time: HostTime) -> usize {
        let started = self.entries.len();
        for animation in self.entries.drain(..) {
            animation.start(start_time);
        }
        started
    }
}
