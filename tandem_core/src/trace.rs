// Copyright 2026 the Tandem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Structured instrumentation for frames and idle rotations.
//!
//! The root calls a [`TraceSink`] at each stage of a frame and after each
//! idle rotation. All sink methods default to no-ops, so a sink implements
//! only the events it cares about. Install one with
//! [`RenderRoot::set_trace_sink`](crate::root::RenderRoot::set_trace_sink).
//!
//! Calls go through [`Tracer`]. With the `trace` feature **off**, every
//! `Tracer` method compiles to nothing and an installed sink never hears
//! anything. With it **on**, each method is one `Option` branch before the
//! dispatch.
//!
//! Phase timestamps are read from the time source directly, not from the
//! frame clock, which by design does not move during a frame.
//!
//! # Crate features
//!
//! - `trace`: enables the `Tracer` method bodies.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::idle::{IdleOutcome, IdleTaskId};
use crate::time::HostTime;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which stage of a frame is being measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    /// Content root layout. Only present on frames that lay out.
    Layout,
    /// Content root rendering.
    Render,
    /// Stamping pending animations.
    Animate,
}

impl PhaseKind {
    /// Every phase, in frame order.
    pub const ALL: [Self; 3] = [Self::Layout, Self::Render, Self::Animate];

    /// Short lowercase name, for exporters.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Layout => "layout",
            Self::Render => "render",
            Self::Animate => "animate",
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Layout => 0,
            Self::Render => 1,
            Self::Animate => 2,
        }
    }
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted once the frame clock has ticked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameBeginEvent {
    /// Monotonic frame counter.
    pub frame_index: u64,
    /// The frame's clock value, shared by every read in the frame.
    pub now: HostTime,
    /// Surface width in pixels.
    pub width: u32,
    /// Surface height in pixels.
    pub height: u32,
}

/// Marks the beginning of a frame phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseBeginEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Which phase is starting.
    pub phase: PhaseKind,
    /// Time source reading at the start of the phase.
    pub timestamp: HostTime,
}

/// Marks the end of a frame phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseEndEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Which phase is ending.
    pub phase: PhaseKind,
    /// Time source reading at the end of the phase.
    pub timestamp: HostTime,
}

/// Emitted after pending animations received their start time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnimationsStartedEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// The start time every animation received.
    pub start_time: HostTime,
    /// How many animations were started.
    pub count: u32,
}

/// Emitted after an idle task ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdleRotationEvent {
    /// The task that ran.
    pub task: IdleTaskId,
    /// Whether a frame was pending while it ran.
    pub render_requested: bool,
    /// Time source reading before the task ran.
    pub begin: HostTime,
    /// Time source reading after the task returned.
    pub end: HostTime,
    /// What the task asked for; `None` if it failed.
    pub outcome: Option<IdleOutcome>,
}

/// Emitted when a content-root swap cancels an open gesture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GestureCancelEvent {
    /// Index of the last frame drawn before the swap.
    pub frame_index: u64,
    /// Timestamp the cancel event carried.
    pub time: HostTime,
}

/// Per-frame timing summary produced by [`FrameSummaryBuilder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSummary {
    /// Frame counter.
    pub frame_index: u64,
    /// The frame's clock value.
    pub now: HostTime,
    /// Whether the content root was laid out.
    pub laid_out: bool,
    /// Layout duration in nanoseconds (0 if not measured).
    pub layout_nanos: u64,
    /// Render duration in nanoseconds (0 if not measured).
    pub render_nanos: u64,
    /// Animation stamping duration in nanoseconds (0 if not measured).
    pub animate_nanos: u64,
    /// Animations started by this frame.
    pub animations_started: u32,
    /// Whether the upload budget ran out, forcing another frame.
    pub upload_budget_exhausted: bool,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the root.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when a frame starts.
    fn on_frame_begin(&mut self, e: &FrameBeginEvent) {
        _ = e;
    }

    /// Called at the beginning of a frame phase.
    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        _ = e;
    }

    /// Called at the end of a frame phase.
    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        _ = e;
    }

    /// Called after pending animations were started.
    fn on_animations_started(&mut self, e: &AnimationsStartedEvent) {
        _ = e;
    }

    /// Called after an idle task ran.
    fn on_idle_rotation(&mut self, e: &IdleRotationEvent) {
        _ = e;
    }

    /// Called when a gesture was cancelled by a content-root swap.
    fn on_gesture_cancel(&mut self, e: &GestureCancelEvent) {
        _ = e;
    }

    /// Called with a per-frame timing summary.
    fn on_frame_summary(&mut self, s: &FrameSummary) {
        _ = s;
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Shared sinks
// ---------------------------------------------------------------------------

/// A sink shared with the code that reads it back. The root locks it for
/// each event.
impl<S: TraceSink + ?Sized> TraceSink for Arc<Mutex<S>> {
    fn on_frame_begin(&mut self, e: &FrameBeginEvent) {
        self.lock().on_frame_begin(e);
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        self.lock().on_phase_begin(e);
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        self.lock().on_phase_end(e);
    }

    fn on_animations_started(&mut self, e: &AnimationsStartedEvent) {
        self.lock().on_animations_started(e);
    }

    fn on_idle_rotation(&mut self, e: &IdleRotationEvent) {
        self.lock().on_idle_rotation(e);
    }

    fn on_gesture_cancel(&mut self, e: &GestureCancelEvent) {
        self.lock().on_gesture_cancel(e);
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        self.lock().on_frame_summary(s);
    }
}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        Self::from_option(Some(sink))
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self::from_option(None)
    }

    /// Creates a tracer for a sink that may not be installed.
    #[inline]
    #[must_use]
    pub fn from_option(sink: Option<&'a mut dyn TraceSink>) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Emits a [`FrameBeginEvent`].
    #[inline]
    pub fn frame_begin(&mut self, e: &FrameBeginEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_frame_begin(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`PhaseBeginEvent`].
    #[inline]
    pub fn phase_begin(&mut self, e: &PhaseBeginEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_phase_begin(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`PhaseEndEvent`].
    #[inline]
    pub fn phase_end(&mut self, e: &PhaseEndEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_phase_end(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits an [`AnimationsStartedEvent`].
    #[inline]
    pub fn animations_started(&mut self, e: &AnimationsStartedEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_animations_started(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits an [`IdleRotationEvent`].
    #[inline]
    pub fn idle_rotation(&mut self, e: &IdleRotationEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_idle_rotation(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`GestureCancelEvent`].
    #[inline]
    pub fn gesture_cancel(&mut self, e: &GestureCancelEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_gesture_cancel(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`FrameSummary`].
    #[inline]
    pub fn frame_summary(&mut self, s: &FrameSummary) {
        #[cfg(feature = "trace")]
        if let Some(sink) = &mut self.sink {
            sink.on_frame_summary(s);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = s;
        }
    }
}

// ---------------------------------------------------------------------------
// FrameSummaryBuilder
// ---------------------------------------------------------------------------

/// Collects phase timestamps during a frame and produces a [`FrameSummary`].
#[derive(Debug)]
pub struct FrameSummaryBuilder {
    frame: FrameBeginEvent,
    phase_starts: [Option<HostTime>; 3],
    phase_ends: [Option<HostTime>; 3],
    animations_started: u32,
    upload_budget_exhausted: bool,
}

impl FrameSummaryBuilder {
    /// Starts building a summary for the given frame.
    #[must_use]
    pub fn new(frame: &FrameBeginEvent) -> Self {
        Self {
            frame: *frame,
            phase_starts: [None; 3],
            phase_ends: [None; 3],
            animations_started: 0,
            upload_budget_exhausted: false,
        }
    }

    /// Records the start of a phase.
    pub fn phase_begin(&mut self, phase: PhaseKind, t: HostTime) {
        self.phase_starts[phase.index()] = Some(t);
    }

    /// Records the end of a phase.
    pub fn phase_end(&mut self, phase: PhaseKind, t: HostTime) {
        self.phase_ends[phase.index()] = Some(t);
    }

    /// Records how many animations the frame started.
    pub fn set_animations_started(&mut self, count: u32) {
        self.animations_started = count;
    }

    /// Records whether the upload budget ran out.
    pub fn set_upload_budget_exhausted(&mut self, exhausted: bool) {
        self.upload_budget_exhausted = exhausted;
    }

    /// Consumes the builder and produces the final [`FrameSummary`].
    #[must_use]
    pub fn finish(self) -> FrameSummary {
        FrameSummary {
            frame_index: self.frame.frame_index,
            now: self.frame.now,
            laid_out: self.phase_starts[PhaseKind::Layout.index()].is_some(),
            layout_nanos: self.phase_duration(PhaseKind::Layout),
            render_nanos: self.phase_duration(PhaseKind::Render),
            animate_nanos: self.phase_duration(PhaseKind::Animate),
            animations_started: self.animations_started,
            upload_budget_exhausted: self.upload_budget_exhausted,
        }
    }

    fn phase_duration(&self, phase: PhaseKind) -> u64 {
        let idx = phase.index();
        match (self.phase_starts[idx], self.phase_ends[idx]) {
            (Some(start), Some(end)) => end.saturating_duration_since(start).nanos(),
            _ => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
