// Copyright 2026 the Tandem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The render thread and the host the root talks to.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Context as _;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tandem_core::RenderRoot;
use tandem_core::host::{Canvas, ContextId, RenderHost};
use tandem_core::scheduler::RenderMode;
use tracing::{debug, info, trace};

/// Cadence of continuous mode.
const FRAME_INTERVAL: StdDuration = StdDuration::from_micros(16_667);

const CONTEXT: ContextId = ContextId(1);

/// Work for the render thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Wake {
    Frame,
    Idle,
    Pause,
}

/// A [`RenderHost`] that posts wakeups to the render thread's channel.
#[derive(Debug)]
pub(crate) struct ChannelHost {
    tx: Sender<Wake>,
    mode: Mutex<RenderMode>,
}

impl ChannelHost {
    pub(crate) fn new(tx: Sender<Wake>) -> Self {
        Self {
            tx,
            mode: Mutex::new(RenderMode::OnDemand),
        }
    }

    fn mode(&self) -> RenderMode {
        *self.mode.lock()
    }

    /// Asks the render thread to pause and exit.
    pub(crate) fn pause(&self) {
        self.post(Wake::Pause);
    }

    fn post(&self, wake: Wake) {
        if self.tx.send(wake).is_err() {
            trace!(?wake, "render thread gone");
        }
    }
}

impl RenderHost for ChannelHost {
    fn request_frame(&self) {
        self.post(Wake::Frame);
    }

    fn schedule_idle(&self) {
        self.post(Wake::Idle);
    }

    fn set_render_mode(&self, mode: RenderMode) {
        info!(?mode, "render mode");
        *self.mode.lock() = mode;
    }
}

/// A canvas with nothing behind it.
#[derive(Debug, Default)]
struct SimCanvas {
    width: u32,
    height: u32,
    invalidations: u32,
}

impl Canvas for SimCanvas {
    fn set_size(&mut self, width: u32, height: u32) {
        debug!(
            from = ?(self.width, self.height),
            to = ?(width, height),
            "canvas resized"
        );
        self.width = width;
        self.height = height;
    }

    fn yield_textures(&mut self) {
        debug!("outgoing content released its textures");
    }

    fn invalidate_textures(&mut self) {
        self.invalidations += 1;
        debug!(count = self.invalidations, "textures invalidated");
    }
}

/// What the render thread did.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct RenderReport {
    pub(crate) frames: u64,
    pub(crate) idle_rotations: u64,
}

/// Owns the surface and serves wakeups until paused.
pub(crate) fn run_render_thread(
    root: &RenderRoot,
    host: &ChannelHost,
    rx: &Receiver<Wake>,
    width: u32,
    height: u32,
) -> anyhow::Result<RenderReport> {
    root.on_surface_ready(CONTEXT, Box::new(SimCanvas::default()));
    root.on_surface_resized(CONTEXT, width, height);

    let mut report = RenderReport::default();
    loop {
        let wake = match host.mode() {
            RenderMode::OnDemand => match rx.recv() {
                Ok(wake) => wake,
                Err(_) => break,
            },
            RenderMode::Continuous => match rx.recv_timeout(FRAME_INTERVAL) {
                Ok(wake) => wake,
                Err(RecvTimeoutError::Timeout) => Wake::Frame,
                Err(RecvTimeoutError::Disconnected) => break,
            },
        };
        match wake {
            Wake::Frame => {
                root.on_frame().context("frame failed")?;
                report.frames += 1;
            }
            Wake::Idle => {
                root.run_idle_rotation().context("idle task failed")?;
                report.idle_rotations += 1;
            }
            Wake::Pause => {
                root.on_pause();
                break;
            }
        }
    }
    Ok(report)
}

/// Builds a root whose host is a fresh [`ChannelHost`].
pub(crate) fn channel_root(
    config: tandem_core::RootConfig,
) -> (RenderRoot, Arc<ChannelHost>, Receiver<Wake>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let host = Arc::new(ChannelHost::new(tx));
    let root = RenderRoot::new(host.clone(), config);
    (root, host, rx)
}
