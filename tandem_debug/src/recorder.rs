// Copyright 2026 the Tandem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and appends each event to a
//! `Vec<u8>` as a one-byte tag followed by fixed-size little-endian fields.
//! [`decode`] reads them back as an iterator of [`RecordedEvent`].
//!
//! To record from a live root while keeping access to the bytes, share the
//! recorder: `Arc<parking_lot::Mutex<RecorderSink>>` is itself a sink.

use tandem_core::idle::{IdleOutcome, IdleTaskId};
use tandem_core::time::HostTime;
use tandem_core::trace::{
    AnimationsStartedEvent, FrameBeginEvent, FrameSummary, GestureCancelEvent,
    IdleRotationEvent, PhaseBeginEvent, PhaseEndEvent, PhaseKind, TraceSink,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_FRAME_BEGIN: u8 = 1;
const TAG_PHASE_BEGIN: u8 = 2;
const TAG_PHASE_END: u8 = 3;
const TAG_ANIMATIONS_STARTED: u8 = 4;
const TAG_IDLE_ROTATION: u8 = 5;
const TAG_GESTURE_CANCEL: u8 = 6;
const TAG_FRAME_SUMMARY: u8 = 7;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Drops everything recorded so far.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_time(&mut self, t: HostTime) {
        self.write_u64(t.nanos());
    }

    fn write_phase(&mut self, p: PhaseKind) {
        self.write_u8(match p {
            PhaseKind::Layout => 0,
            PhaseKind::Render => 1,
            PhaseKind::Animate => 2,
        });
    }

    fn write_outcome(&mut self, o: Option<IdleOutcome>) {
        self.write_u8(match o {
            None => 0,
            Some(IdleOutcome::Done) => 1,
            Some(IdleOutcome::Reschedule) => 2,
        });
    }
}

impl TraceSink for RecorderSink {
    fn on_frame_begin(&mut self, e: &FrameBeginEvent) {
        self.write_u8(TAG_FRAME_BEGIN);
        self.write_u64(e.frame_index);
        self.write_time(e.now);
        self.write_u32(e.width);
        self.write_u32(e.height);
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        self.write_u8(TAG_PHASE_BEGIN);
        self.write_u64(e.frame_index);
        self.write_phase(e.phase);
        self.write_time(e.timestamp);
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        self.write_u8(TAG_PHASE_END);
        self.write_u64(e.frame_index);
        self.write_phase(e.phase);
        self.write_time(e.timestamp);
    }

    fn on_animations_started(&mut self, e: &AnimationsStartedEvent) {
        self.write_u8(TAG_ANIMATIONS_STARTED);
        self.write_u64(e.frame_index);
        self.write_time(e.start_time);
        self.write_u32(e.count);
    }

    fn on_idle_rotation(&mut self, e: &IdleRotationEvent) {
        self.write_u8(TAG_IDLE_ROTATION);
        self.write_u64(e.task.raw());
        self.write_bool(e.render_requested);
        self.write_time(e.begin);
        self.write_time(e.end);
        self.write_outcome(e.outcome);
    }

    fn on_gesture_cancel(&mut self, e: &GestureCancelEvent) {
        self.write_u8(TAG_GESTURE_CANCEL);
        self.write_u64(e.frame_index);
        self.write_time(e.time);
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        self.write_u8(TAG_FRAME_SUMMARY);
        self.write_u64(s.frame_index);
        self.write_time(s.now);
        self.write_bool(s.laid_out);
        self.write_u64(s.layout_nanos);
        self.write_u64(s.render_nanos);
        self.write_u64(s.animate_nanos);
        self.write_u32(s.animations_started);
        self.write_bool(s.upload_budget_exhausted);
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordedEvent {
    /// A [`FrameBeginEvent`].
    FrameBegin(FrameBeginEvent),
    /// A [`PhaseBeginEvent`].
    PhaseBegin(PhaseBeginEvent),
    /// A [`PhaseEndEvent`].
    PhaseEnd(PhaseEndEvent),
    /// An [`AnimationsStartedEvent`].
    AnimationsStarted(AnimationsStartedEvent),
    /// An [`IdleRotationEvent`].
    IdleRotation(IdleRotationEvent),
    /// A [`GestureCancelEvent`].
    GestureCancel(GestureCancelEvent),
    /// A [`FrameSummary`].
    FrameSummary(FrameSummary),
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
///
/// Iteration stops at the first unknown tag or truncated record.
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let end = self.pos.checked_add(N)?;
        let bytes = self.data.get(self.pos..end)?.try_into().ok()?;
        self.pos = end;
        Some(bytes)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[v]| v)
    }

    fn read_bool(&mut self) -> Option<bool> {
        Some(self.read_u8()? != 0)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    fn read_time(&mut self) -> Option<HostTime> {
        self.read_u64().map(HostTime)
    }

    fn read_phase(&mut self) -> Option<PhaseKind> {
        Some(match self.read_u8()? {
            0 => PhaseKind::Layout,
            1 => PhaseKind::Render,
            2 => PhaseKind::Animate,
            _ => return None,
        })
    }

    fn read_outcome(&mut self) -> Option<Option<IdleOutcome>> {
        Some(match self.read_u8()? {
            0 => None,
            1 => Some(IdleOutcome::Done),
            2 => Some(IdleOutcome::Reschedule),
            _ => return None,
        })
    }

    fn decode_frame_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::FrameBegin(FrameBeginEvent {
            frame_index: self.read_u64()?,
            now: self.read_time()?,
            width: self.read_u32()?,
            height: self.read_u32()?,
        }))
    }

    fn decode_phase_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseBegin(PhaseBeginEvent {
            frame_index: self.read_u64()?,
            phase: self.read_phase()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_phase_end(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseEnd(PhaseEndEvent {
            frame_index: self.read_u64()?,
            phase: self.read_phase()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_animations_started(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::AnimationsStarted(AnimationsStartedEvent {
            frame_index: self.read_u64()?,
            start_time: self.read_time()?,
            count: self.read_u32()?,
        }))
    }

    fn decode_idle_rotation(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::IdleRotation(IdleRotationEvent {
            task: IdleTaskId::from_raw(self.read_u64()?),
            render_requested: self.read_bool()?,
            begin: self.read_time()?,
            end: self.read_time()?,
            outcome: self.read_outcome()?,
        }))
    }

    fn decode_gesture_cancel(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::GestureCancel(GestureCancelEvent {
            frame_index: self.read_u64()?,
            time: self.read_time()?,
        }))
    }

    fn decode_frame_summary(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::FrameSummary(FrameSummary {
            frame_index: self.read_u64()?,
            now: self.read_time()?,
            laid_out: self.read_bool()?,
            layout_nanos: self.read_u64()?,
            render_nanos: self.read_u64()?,
            animate_nanos: self.read_u64()?,
            animations_started: self.read_u32()?,
            upload_budget_exhausted: self.read_bool()?,
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let event = match self.read_u8()? {
            TAG_FRAME_BEGIN => self.decode_frame_begin(),
            TAG_PHASE_BEGIN => self.decode_phase_begin(),
            TAG_PHASE_END => self.decode_phase_end(),
            TAG_ANIMATIONS_STARTED => self.decode_animations_started(),
            TAG_IDLE_ROTATION => self.decode_idle_rotation(),
            TAG_GESTURE_CANCEL => self.decode_gesture_cancel(),
            TAG_FRAME_SUMMARY => self.decode_frame_summary(),
            _ => None,
        };
        if event.is_none() {
            // Unknown tag or truncated record: nothing after it can be trusted.
            self.pos = self.data.len();
        }
        event
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
