// Copyright 2026 the Tandem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Root configuration.

use crate::scheduler::RenderMode;
use crate::time::Duration;

/// Configuration for a [`RenderRoot`](crate::root::RenderRoot).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RootConfig {
    /// How the host should drive frames. Handed to the host when the first
    /// surface is ready.
    pub render_mode: RenderMode,
    /// Log frames-per-second about once a second.
    pub report_fps: bool,
    /// Warn when the gap between two frame finishes exceeds this.
    pub slow_frame_threshold: Option<Duration>,
}

impl RootConfig {
    /// Frames only on request, no diagnostics.
    #[must_use]
    pub const fn on_demand() -> Self {
        Self {
            render_mode: RenderMode::OnDemand,
            report_fps: false,
            slow_frame_threshold: None,
        }
    }

    /// Continuous frames with frame-rate reports and slow-frame warnings.
    #[must_use]
    pub const fn profiling() -> Self {
        Self {
            render_mode: RenderMode::Continuous,
            report_fps: true,
            // Two frames skipped at 60 Hz.
            slow_frame_threshold: Some(Duration::from_millis(34)),
        }
    }
}

impl Default for RootConfig {
    fn default() -> Self {
        Self::on_demand()
    }
}
