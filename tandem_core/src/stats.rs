// Copyright 2026 the Tandem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame-rate and slow-frame diagnostics.
//!
//! Both are off unless enabled in [`RootConfig`]. They measure wall time from
//! the time source, not the frame clock.

use crate::config::RootConfig;
use crate::time::{Duration, HostTime};

/// Counts frames and reports a rate roughly once a second.
#[derive(Clone, Copy, Debug, Default)]
pub struct FpsMeter {
    window_start: Option<HostTime>,
    frames: u32,
}

impl FpsMeter {
    /// Creates a meter with no window open.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            window_start: None,
            frames: 0,
        }
    }

    /// Counts a frame drawn at `now`.
    ///
    /// The first frame opens the window. Once more than a second has passed
    /// since the window opened, returns the rate over it and opens a new
    /// window at `now`.
    pub fn record_frame(&mut self, now: HostTime) -> Option<f64> {
        let mut report = None;
        match self.window_start {
            None => self.window_start = Some(now),
            Some(start) => {
                let elapsed = now.saturating_duration_since(start);
                if elapsed > Duration::SECOND {
                    report = Some(f64::from(self.frames) / elapsed.as_secs_f64());
                    self.window_start = Some(now);
                    self.frames = 0;
                }
            }
        }
        self.frames += 1;
        report
    }

    /// Closes the window; the next frame opens a fresh one. Paused time is
    /// not counted.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// A frame that finished too long after the previous one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlowFrame {
    /// How long this frame took to draw.
    pub draw: Duration,
    /// Time between the previous frame's finish and this one's.
    pub interval: Duration,
}

/// Flags frames whose finish-to-finish interval exceeds a threshold.
#[derive(Clone, Copy, Debug)]
pub struct SlowFrameDetector {
    threshold: Duration,
    last_finish: Option<HostTime>,
}

impl SlowFrameDetector {
    /// Creates a detector with no previous frame.
    #[must_use]
    pub const fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            last_finish: None,
        }
    }

    /// Records a frame that started drawing at `draw_start` and finished at
    /// `finish`. The first frame only sets the baseline.
    pub fn record_frame(&mut self, draw_start: HostTime, finish: HostTime) -> Option<SlowFrame> {
        let last = self.last_finish.replace(finish)?;
        let interval = finish.saturating_duration_since(last);
        (interval > self.threshold).then(|| SlowFrame {
            draw: finish.saturating_duration_since(draw_start),
            interval,
        })
    }

    /// Forgets the previous frame.
    pub fn reset(&mut self) {
        self.last_finish = None;
    }
}

/// The diagnostics a root was configured with.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct FrameStats {
    fps: Option<FpsMeter>,
    slow: Option<SlowFrameDetector>,
}

impl FrameStats {
    pub(crate) fn new(config: &RootConfig) -> Self {
        Self {
            fps: config.report_fps.then(FpsMeter::new),
            slow: config.slow_frame_threshold.map(SlowFrameDetector::new),
        }
    }

    /// Records a finished frame and logs what the diagnostics noticed.
    pub(crate) fn finish_frame(&mut self, frame_index: u64, draw_start: HostTime, finish: HostTime) {
        if let Some(fps) = &mut self.fps
            && let Some(rate) = fps.record_frame(finish)
        {
            tracing::debug!(fps = rate, "frame rate");
        }
        if let Some(slow) = &mut self.slow
            && let Some(frame) = slow.record_frame(draw_start, finish)
        {
            tracing::warn!(
                frame_index,
                draw_ms = frame.draw.as_millis(),
                interval_ms = frame.interval.as_millis(),
                "slow frame"
            );
        }
    }

    /// Drops measurement windows that would otherwise span a pause.
    pub(crate) fn reset(&mut self) {
        if let Some(fps) = &mut self.fps {
            fps.reset();
        }
        if let Some(slow) = &mut self.slow {
            slow.reset();
        }
    }
}
