// Copyright 2026 the Tandem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][spec] JSON to the given writer.
//!
//! Frame phases become begin/end pairs on the frame track, idle rotations
//! become complete events on their own track, and everything else is an
//! instant event.
//!
//! [spec]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use tandem_core::idle::IdleOutcome;
use tandem_core::time::HostTime;

use crate::recorder::{RecordedEvent, decode};

const FRAME_TRACK: u32 = 0;
const IDLE_TRACK: u32 = 1;

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
/// Host times are nanoseconds and are written as microseconds.
pub fn export(bytes: &[u8], writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();

    for recorded in decode(bytes) {
        let event = match recorded {
            RecordedEvent::FrameBegin(e) => json!({
                "ph": "i",
                "name": "FrameBegin",
                "cat": "Frame",
                "ts": host_us(e.now),
                "pid": 0,
                "tid": FRAME_TRACK,
                "s": "t",
                "args": {
                    "frame_index": e.frame_index,
                    "width": e.width,
                    "height": e.height,
                }
            }),
            RecordedEvent::PhaseBegin(e) => json!({
                "ph": "B",
                "name": e.phase.name(),
                "cat": "Frame",
                "ts": host_us(e.timestamp),
                "pid": 0,
                "tid": FRAME_TRACK,
                "args": {
                    "frame_index": e.frame_index,
                }
            }),
            RecordedEvent::PhaseEnd(e) => json!({
                "ph": "E",
                "name": e.phase.name(),
                "cat": "Frame",
                "ts": host_us(e.timestamp),
                "pid": 0,
                "tid": FRAME_TRACK,
                "args": {
                    "frame_index": e.frame_index,
                }
            }),
            RecordedEvent::AnimationsStarted(e) => json!({
                "ph": "i",
                "name": "AnimationsStarted",
                "cat": "Frame",
                "ts": host_us(e.start_time),
                "pid": 0,
                "tid": FRAME_TRACK,
                "s": "t",
                "args": {
                    "frame_index": e.frame_index,
                    "count": e.count,
                }
            }),
            RecordedEvent::IdleRotation(e) => json!({
                "ph": "X",
                "name": "IdleTask",
                "cat": "Idle",
                "ts": host_us(e.begin),
                "dur": nanos_to_us(e.end.saturating_duration_since(e.begin).nanos()),
                "pid": 0,
                "tid": IDLE_TRACK,
                "args": {
                    "task": e.task.raw(),
                    "render_requested": e.render_requested,
                    "outcome": outcome_name(e.outcome),
                }
            }),
            RecordedEvent::GestureCancel(e) => json!({
                "ph": "i",
                "name": "GestureCancel",
                "cat": "Input",
                "ts": host_us(e.time),
                "pid": 0,
                "tid": FRAME_TRACK,
                "s": "g",
                "args": {
                    "frame_index": e.frame_index,
                }
            }),
            RecordedEvent::FrameSummary(s) => json!({
                "ph": "i",
                "name": "FrameSummary",
                "cat": "Summary",
                "ts": host_us(s.now),
                "pid": 0,
                "tid": FRAME_TRACK,
                "s": "t",
                "args": {
                    "frame_index": s.frame_index,
                    "laid_out": s.laid_out,
                    "layout_us": nanos_to_us(s.layout_nanos),
                    "render_us": nanos_to_us(s.render_nanos),
                    "animate_us": nanos_to_us(s.animate_nanos),
                    "animations_started": s.animations_started,
                    "upload_budget_exhausted": s.upload_budget_exhausted,
                }
            }),
        };
        events.push(event);
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

fn outcome_name(outcome: Option<IdleOutcome>) -> &'static str {
    match outcome {
        Some(IdleOutcome::Done) => "done",
        Some(IdleOutcome::Reschedule) => "reschedule",
        None => "failed",
    }
}

fn host_us(t: HostTime) -> f64 {
    nanos_to_us(t.nanos())
}

fn nanos_to_us(nanos: u64) -> f64 {
    nanos as f64 / 1000.0
}
