// Copyright 2026 the Tandem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A render root shared between a control thread and a render thread.
//!
//! `tandem_core` owns the boundary between the thread that mutates a scene
//! (input, layout, content swaps) and the thread that draws it. It coalesces
//! redraw requests into at most one pending frame, runs idle work on the
//! render thread without starving frames or nesting locks, and keeps gesture
//! state and animation start times consistent across the two threads.
//!
//! The scene graph, the GPU context, and the render thread itself belong to
//! the caller and are reached through the traits in [`host`].
//!
//! # Architecture
//!
//! ```text
//!   control thread                        render thread (host-owned)
//!   ──────────────                        ──────────────────────────
//!   set_content_root ─┐                   on_surface_ready / _resized
//!   dispatch_pointer ─┼─► render lock ◄── on_frame ──► layout, render,
//!   request_layout ───┘        ▲                        stamp animations
//!                              │
//!   request_render ──► FrameScheduler ──► RenderHost::request_frame
//!                        (atomic flag)
//!
//!   add_idle_task ───► IdleTaskQueue ───► RenderHost::schedule_idle
//!                      (own lock)         └─► run_idle_rotation
//! ```
//!
//! **[`root`]**: [`RenderRoot`](root::RenderRoot), which composes the rest,
//! owns the render lock, and exposes the host lifecycle.
//!
//! **[`scheduler`]**: render-request coalescing and the render mode.
//!
//! **[`idle`]**: the round-robin idle task queue.
//!
//! **[`input`]**: pointer events and gesture down-state.
//!
//! **[`animation`]**: animations waiting for a frame-synchronized start
//! time.
//!
//! **[`clock`]**: the per-frame clock and its time sources.
//!
//! **[`context`]**: [`RootContext`](context::RootContext), the root as seen
//! from inside a scene callback.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) instrumentation with a
//! zero-overhead [`Tracer`](trace::Tracer) wrapper.
//!
//! **[`stats`]**: frame-rate and slow-frame diagnostics.
//!
//! # Crate features
//!
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one
//!   branch per call site).

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod animation;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod host;
pub mod idle;
pub mod input;
mod lock;
pub mod root;
pub mod scheduler;
pub mod stats;
pub mod time;
pub mod trace;

#[cfg(test)]
mod testing;

pub use config::RootConfig;
pub use error::{BoxError, RootError};
pub use root::{RenderRoot, RenderThreadGuard, RootHandle};
