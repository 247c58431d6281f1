// Copyright 2026 the Tandem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame production policy and render-request coalescing.
//!
//! The [`FrameScheduler`] owns the single "render requested" flag. Any number
//! of requests between two frames collapse into one: only the request that
//! flips the flag from clear to set notifies the host. The flag is cleared at
//! the top of the next frame, so a request arriving after that point asks for
//! a later frame.
//!
//! The flag is an atomic so invalidations from the control thread never touch
//! the render lock. The clear happens under the render lock.

use core::sync::atomic::{AtomicBool, Ordering};

/// How the host drives frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RenderMode {
    /// A frame is produced only after a render request.
    #[default]
    OnDemand,
    /// Frames are produced on a fixed cadence regardless of requests. Meant
    /// for profiling and frame-rate measurement.
    Continuous,
}

/// Chooses the render mode and coalesces render requests.
#[derive(Debug, Default)]
pub struct FrameScheduler {
    mode: RenderMode,
    requested: AtomicBool,
}

impl FrameScheduler {
    /// Creates a scheduler with nothing requested.
    #[must_use]
    pub const fn new(mode: RenderMode) -> Self {
        Self {
            mode,
            requested: AtomicBool::new(false),
        }
    }

    /// The configured render mode.
    #[must_use]
    pub const fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Marks a frame as requested.
    ///
    /// Returns `true` if this call set the flag, meaning the caller must
    /// notify the host. Returns `false` if a frame was already pending.
    pub fn request(&self) -> bool {
        if self.requested.load(Ordering::Acquire) {
            return false;
        }
        !self.requested.swap(true, Ordering::AcqRel)
    }

    /// Whether a frame is pending.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Clears the flag at the start of a frame. Called with the render lock
    /// held.
    pub(crate) fn begin_frame(&self) {
        self.requested.store(false, Ordering::Release);
    }
}
