// Copyright 2026 the Tandem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A two-thread host for a `tandem_core` render root.
//!
//! A spawned render thread owns the surface and drains frame, idle, and
//! pause wakeups from a channel. The main thread plays the control thread:
//! it swaps content roots, feeds scripted pointer gestures (some of them cut
//! short by a swap), and asks for frames.
//!
//! ```text
//! cargo run -p threaded_host -- --profile --trace trace.json
//! ```
//!
//! Set `RUST_LOG=debug` to see frame-rate reports and scene callbacks.

mod host;
mod scene;

use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration as StdDuration;

use anyhow::{Context as _, anyhow};
use clap::Parser;
use kurbo::{Point, Vec2};
use parking_lot::Mutex;
use tandem_core::clock::{MonotonicSource, TimeSource};
use tandem_core::input::{PointerAction, PointerEvent};
use tandem_core::time::Duration;
use tandem_core::{RenderRoot, RootConfig};
use tandem_debug::recorder::RecorderSink;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::scene::{Prefetch, Swatch};

const SWATCHES: [&str; 3] = ["amber", "teal", "violet"];

/// Gesture script, one entry per control step, repeating.
const GESTURE: [Option<PointerAction>; 12] = [
    Some(PointerAction::Down),
    Some(PointerAction::Move),
    Some(PointerAction::Move),
    Some(PointerAction::Move),
    Some(PointerAction::Move),
    Some(PointerAction::Move),
    Some(PointerAction::Up),
    None,
    None,
    None,
    None,
    None,
];

#[derive(Parser, Debug)]
#[command(name = "threaded_host", version)]
struct Cli {
    /// Control-thread steps to run.
    #[arg(long, default_value_t = 240)]
    steps: u32,

    /// Milliseconds between control steps.
    #[arg(long, default_value_t = 8)]
    step_ms: u64,

    /// Swap the content root every this many steps.
    #[arg(long, default_value_t = 39, value_parser = clap::value_parser!(u32).range(1..))]
    swap_every: u32,

    /// Surface width in pixels.
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Surface height in pixels.
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Drive frames continuously and report the frame rate.
    #[arg(long, default_value_t = false)]
    profile: bool,

    /// Warn about gaps between frames longer than this many milliseconds.
    #[arg(long)]
    slow_frame_ms: Option<u64>,

    /// Write a Chrome trace of the run to this path.
    #[arg(long)]
    trace: Option<PathBuf>,
}

impl Cli {
    fn root_config(&self) -> RootConfig {
        let mut config = if self.profile {
            RootConfig::profiling()
        } else {
            RootConfig::on_demand()
        };
        if let Some(ms) = self.slow_frame_ms {
            config.slow_frame_threshold = Some(Duration::from_millis(ms));
        }
        config
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    let (root, channel_host, rx) = host::channel_root(cli.root_config());
    let recorder = cli.trace.as_ref().map(|_| {
        let recorder = Arc::new(Mutex::new(RecorderSink::new()));
        root.set_trace_sink(Some(Box::new(Arc::clone(&recorder))));
        recorder
    });

    let render = thread::Builder::new()
        .name("render".into())
        .spawn({
            let root = root.clone();
            let channel_host = Arc::clone(&channel_host);
            let (width, height) = (cli.width, cli.height);
            move || host::run_render_thread(&root, &channel_host, &rx, width, height)
        })
        .context("failed to spawn render thread")?;

    drive(&root, &cli);

    channel_host.pause();
    let report = render
        .join()
        .map_err(|_| anyhow!("render thread panicked"))??;
    info!(
        frames = report.frames,
        idle_rotations = report.idle_rotations,
        leftover_idle_tasks = root.clear_idle_tasks(),
        "run finished"
    );

    if let (Some(path), Some(recorder)) = (&cli.trace, &recorder) {
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        tandem_debug::chrome::export(recorder.lock().as_bytes(), &mut writer)
            .context("failed to write Chrome trace")?;
        writer.flush()?;
        info!(path = %path.display(), "wrote Chrome trace");
    }
    Ok(())
}

/// The control thread's script.
fn drive(root: &RenderRoot, cli: &Cli) {
    let clock = MonotonicSource;
    let mut swatches = SWATCHES.iter().copied().cycle();
    let center = Point::new(f64::from(cli.width) / 2.0, f64::from(cli.height) / 2.0);

    root.set_content_root(swatches.next().map(Swatch::shared));
    root.add_idle_task(Prefetch::new("atlas", 12));

    for (step, action) in (0..cli.steps).zip(GESTURE.iter().cycle()) {
        if let Some(action) = *action {
            let offset = Vec2::new(f64::from(step % 12) * 4.0, 0.0);
            let event = PointerEvent::new(action, center + offset, clock.now());
            root.dispatch_pointer_event(&event);
        }

        if step > 0 && step % cli.swap_every == 0 {
            let cancels = root.in_down_state();
            info!(step, cancels_gesture = cancels, "swapping content root");
            root.set_content_root(swatches.next().map(Swatch::shared));
        }

        if step % 4 == 0 {
            root.request_render();
        }
        thread::sleep(StdDuration::from_millis(cli.step_ms));
    }
}
