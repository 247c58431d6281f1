// Copyright 2026 the Tandem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Contracts between the render root and the code around it.
//!
//! Tandem does not own a scene graph, a GPU context, or a render thread. It
//! talks to each of them through one trait:
//!
//! - **[`SceneNode`]**: the content root. Lays out, renders, and handles
//!   pointer events. Shared with the control thread as a [`SharedNode`].
//!
//! - **[`Canvas`]**: the GPU-facing drawing object for the current surface.
//!   Owns resource deletion and the per-frame upload budget.
//!
//! - **[`RenderHost`]**: the platform glue that owns the render thread. The
//!   root asks it for frames and idle rotations; the host answers by calling
//!   [`RenderRoot::on_frame`] and [`RenderRoot::run_idle_rotation`] on that
//!   thread.
//!
//! # Host loop pseudocode
//!
//! ```rust,ignore
//! // render thread
//! root.on_surface_ready(ContextId(1), Box::new(canvas));
//! root.on_surface_resized(ContextId(1), width, height);
//! loop {
//!     match wake.recv()? {
//!         Wake::Frame => root.on_frame()?,
//!         Wake::Idle => root.run_idle_rotation()?,
//!         Wake::Pause => root.on_pause(),
//!     }
//! }
//! ```
//!
//! [`RenderRoot::on_frame`]: crate::root::RenderRoot::on_frame
//! [`RenderRoot::run_idle_rotation`]: crate::root::RenderRoot::run_idle_rotation

use core::fmt;
use core::ops::{Deref, DerefMut};
use std::sync::Arc;

use kurbo::Rect;

use crate::context::RootContext;
use crate::error::BoxError;
use crate::input::PointerEvent;
use crate::lock::{LockDomain, LockKind, OrderedGuard, OrderedMutex};
use crate::root::RootHandle;
use crate::scheduler::RenderMode;

/// Identifies the rendering context a surface was created with.
///
/// The host assigns these; the root only compares them. A resize carrying a
/// different id than the last surface-ready is a host bug.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ContextId(pub u64);

impl fmt::Debug for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextId({})", self.0)
    }
}

/// A content root shared between the control thread and the render root.
///
/// Identity is pointer identity: setting the same node twice is a no-op.
///
/// # Lock order
///
/// The node lock ranks below the render lock. The render thread locks the
/// content root while it holds the render lock, so a thread holding a
/// [`NodeGuard`] must not call into the [`RenderRoot`] that displays the
/// node; doing so panics. To change the content root from the control
/// thread, go through the root instead:
///
/// ```rust,ignore
/// let mut guard = root.lock_render_thread();
/// guard.with_content(|node, cx| {
///     // mutate `node`, then
///     cx.request_layout();
/// });
/// ```
///
/// [`RenderRoot`]: crate::root::RenderRoot
#[derive(Clone)]
pub struct SharedNode(Arc<OrderedMutex<dyn SceneNode>>);

impl fmt::Debug for SharedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedNode").finish_non_exhaustive()
    }
}

impl SharedNode {
    /// Wraps `node` for [`RenderRoot::set_content_root`](crate::root::RenderRoot::set_content_root).
    pub fn new<N: SceneNode + 'static>(node: N) -> Self {
        let node: Arc<OrderedMutex<dyn SceneNode>> =
            Arc::new(OrderedMutex::new(LockDomain::next(), LockKind::Node, node));
        Self(node)
    }

    /// Blocks until the node is available.
    ///
    /// # Panics
    ///
    /// If the calling thread already holds this node's lock.
    pub fn lock(&self) -> NodeGuard<'_> {
        NodeGuard(self.0.lock())
    }

    /// Whether both handles share one node.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Exclusive access to a [`SharedNode`]. The lock is released on drop.
pub struct NodeGuard<'a>(OrderedGuard<'a, dyn SceneNode>);

impl fmt::Debug for NodeGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeGuard").finish_non_exhaustive()
    }
}

impl Deref for NodeGuard<'_> {
    type Target = dyn SceneNode;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl DerefMut for NodeGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.0
    }
}

/// The capability set the root needs from its content.
///
/// Every method runs on whichever thread holds the render lock, with the
/// lock held. Use `cx` to request frames or layout; calling back into
/// [`RenderRoot`](crate::root::RenderRoot) from here would re-enter the lock
/// and panic. See [`SharedNode`] for the lock order seen from other threads.
pub trait SceneNode: Send {
    /// Positions the node within `bounds`, in surface pixels.
    fn layout(&mut self, bounds: Rect, cx: &mut RootContext<'_>) -> Result<(), BoxError> {
        _ = (bounds, cx);
        Ok(())
    }

    /// Draws the node.
    fn render(&mut self, canvas: &mut dyn Canvas, cx: &mut RootContext<'_>) -> Result<(), BoxError>;

    /// Handles a pointer event and returns whether it was consumed.
    fn dispatch_pointer_event(&mut self, event: &PointerEvent, cx: &mut RootContext<'_>) -> bool {
        _ = (event, cx);
        false
    }

    /// Called when the node becomes the content root.
    fn attach(&mut self, root: &RootHandle) {
        _ = root;
    }

    /// Called when the node stops being the content root.
    fn detach(&mut self) {}
}

/// The drawing object bound to the current surface.
///
/// Replaced wholesale on every surface-ready, so it may hold context-bound
/// resources freely.
pub trait Canvas: Send {
    /// Resizes the drawable area.
    fn set_size(&mut self, width: u32, height: u32);

    /// Frees GPU resources whose owners released them since the last frame.
    fn delete_recycled_resources(&mut self) {}

    /// Starts a fresh per-frame texture upload budget.
    fn reset_upload_budget(&mut self) {}

    /// Whether this frame ran out of upload budget and left work behind.
    fn upload_budget_exhausted(&self) -> bool {
        false
    }

    /// Releases textures owned by a subtree that is leaving the surface.
    fn yield_textures(&mut self) {}

    /// Forgets every uploaded texture; the surface behind them is gone.
    fn invalidate_textures(&mut self) {}
}

/// The render thread's owner.
///
/// Both notifications may arrive from any thread and must not block. They
/// are already coalesced by the root: a host receives at most one
/// `request_frame` per frame and at most one outstanding `schedule_idle`.
pub trait RenderHost: Send + Sync {
    /// Arranges for [`RenderRoot::on_frame`](crate::root::RenderRoot::on_frame)
    /// to run on the render thread.
    fn request_frame(&self);

    /// Arranges for
    /// [`RenderRoot::run_idle_rotation`](crate::root::RenderRoot::run_idle_rotation)
    /// to run on the render thread.
    fn schedule_idle(&self);

    /// Tells the host whether to drive frames on demand or continuously.
    fn set_render_mode(&self, mode: RenderMode) {
        _ = mode;
    }
}
