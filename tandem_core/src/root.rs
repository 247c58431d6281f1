// Copyright 2026 the Tandem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The render root: the boundary between the control thread and the render
//! thread.
//!
//! A [`RenderRoot`] owns the render lock and everything behind it: the
//! content root, the frame clock, gesture state, pending animations, the
//! layout flag, and the current surface. The control thread swaps content,
//! dispatches pointer events, and requests frames; the host's render thread
//! calls the lifecycle methods ([`on_surface_ready`], [`on_surface_resized`],
//! [`on_frame`], [`on_pause`]) and [`run_idle_rotation`].
//!
//! # Locks
//!
//! Two locks, never nested on one thread:
//!
//! - the **render lock**, held for every frame, every idle task, every
//!   content swap and pointer dispatch, and by [`RenderThreadGuard`];
//! - the **idle-queue lock**, held only to change queue membership.
//!
//! Neither is reentrant. Violations panic. The "render requested" flag is an
//! atomic outside both, so [`request_render`] never blocks.
//!
//! [`on_surface_ready`]: RenderRoot::on_surface_ready
//! [`on_surface_resized`]: RenderRoot::on_surface_resized
//! [`on_frame`]: RenderRoot::on_frame
//! [`on_pause`]: RenderRoot::on_pause
//! [`run_idle_rotation`]: RenderRoot::run_idle_rotation
//! [`request_render`]: RenderRoot::request_render

use core::fmt;
use core::mem;
use std::sync::{Arc, Weak};

use kurbo::Rect;
use tracing::{debug, info};

use crate::animation::PendingAnimation;
use crate::clock::{Clock, MonotonicSource, TimeSource};
use crate::config::RootConfig;
use crate::context::{PendingWork, RootContext};
use crate::error::RootError;
use crate::host::{Canvas, ContextId, RenderHost, SceneNode, SharedNode};
use crate::idle::{IdleOutcome, IdleTask, IdleTaskId, IdleTaskQueue, QueuedTask};
use crate::input::{InputDispatcher, PointerEvent};
use crate::lock::{LockDomain, LockKind, OrderedGuard, OrderedMutex};
use crate::scheduler::FrameScheduler;
use crate::stats::FrameStats;
use crate::time::HostTime;
use crate::trace::{
    AnimationsStartedEvent, FrameBeginEvent, FrameSummaryBuilder, GestureCancelEvent,
    IdleRotationEvent, PhaseBeginEvent, PhaseEndEvent, PhaseKind, TraceSink, Tracer,
};

/// The surface the host last reported.
struct Surface {
    context: ContextId,
    canvas: Box<dyn Canvas>,
    width: u32,
    height: u32,
}

/// Everything guarded by the render lock.
struct RootState {
    content: Option<SharedNode>,
    input: InputDispatcher,
    clock: Clock,
    work: PendingWork,
    surface: Option<Surface>,
    stats: FrameStats,
    trace: Option<Box<dyn TraceSink + Send>>,
}

impl RootState {
    fn tracer(&mut self) -> Tracer<'_> {
        Tracer::from_option(self.trace.as_deref_mut().map(|s| s as &mut dyn TraceSink))
    }
}

struct Inner {
    host: Arc<dyn RenderHost>,
    config: RootConfig,
    frames: FrameScheduler,
    state: OrderedMutex<RootState>,
    idle: IdleTaskQueue,
}

impl Inner {
    fn request_render(&self) {
        if self.frames.request() {
            self.host.request_frame();
        }
    }

    fn cx<'a>(
        &'a self,
        clock: &'a Clock,
        work: &'a mut PendingWork,
        has_content: bool,
    ) -> RootContext<'a> {
        RootContext::new(
            clock,
            &self.frames,
            &*self.host,
            &self.idle,
            work,
            has_content,
        )
    }

    /// Releases the render lock, then queues any idle tasks that callbacks
    /// added while it was held.
    fn release(&self, mut guard: OrderedGuard<'_, RootState>) {
        let deferred = mem::take(&mut guard.work.idle_tasks);
        drop(guard);
        self.enqueue_idle(deferred);
    }

    fn enqueue_idle(&self, tasks: Vec<QueuedTask>) {
        if !tasks.is_empty() && self.idle.extend(tasks) {
            self.host.schedule_idle();
        }
    }

    /// One frame, under the render lock.
    fn draw_frame(&self, state: &mut RootState) -> Result<(), RootError> {
        let Some(surface) = state.surface.as_mut() else {
            panic!("on_frame called before on_surface_ready");
        };
        let clock = &mut state.clock;
        let work = &mut state.work;
        let mut tracer =
            Tracer::from_option(state.trace.as_deref_mut().map(|s| s as &mut dyn TraceSink));

        let now = clock.update();
        let draw_start = clock.read_source();
        surface.canvas.delete_recycled_resources();
        surface.canvas.reset_upload_budget();
        self.frames.begin_frame();

        let frame = FrameBeginEvent {
            frame_index: clock.frame_index(),
            now,
            width: surface.width,
            height: surface.height,
        };
        tracer.frame_begin(&frame);
        let mut summary = FrameSummaryBuilder::new(&frame);
        let has_content = state.content.is_some();

        if work.layout.take()
            && surface.width > 0
            && surface.height > 0
            && let Some(node) = &state.content
        {
            info!(
                width = surface.width,
                height = surface.height,
                "laying out content root"
            );
            let bounds = Rect::new(
                0.0,
                0.0,
                f64::from(surface.width),
                f64::from(surface.height),
            );
            let t = clock.read_source();
            phase_begin(&mut tracer, &mut summary, &frame, PhaseKind::Layout, t);
            let mut cx = self.cx(clock, work, has_content);
            let laid_out = node.lock().layout(bounds, &mut cx);
            let t = clock.read_source();
            phase_end(&mut tracer, &mut summary, &frame, PhaseKind::Layout, t);
            laid_out.map_err(RootError::Layout)?;
        }

        let t = clock.read_source();
        phase_begin(&mut tracer, &mut summary, &frame, PhaseKind::Render, t);
        let rendered = match &state.content {
            Some(node) => {
                let mut cx = self.cx(clock, work, has_content);
                node.lock().render(&mut *surface.canvas, &mut cx)
            }
            None => Ok(()),
        };
        let t = clock.read_source();
        phase_end(&mut tracer, &mut summary, &frame, PhaseKind::Render, t);
        rendered.map_err(RootError::Render)?;

        let t = clock.read_source();
        phase_begin(&mut tracer, &mut summary, &frame, PhaseKind::Animate, t);
        let started = work.animations.start_all(clock.now());
        let t = clock.read_source();
        phase_end(&mut tracer, &mut summary, &frame, PhaseKind::Animate, t);
        if started > 0 {
            let count = u32::try_from(started).unwrap_or(u32::MAX);
            summary.set_animations_started(count);
            tracer.animations_started(&AnimationsStartedEvent {
                frame_index: frame.frame_index,
                start_time: clock.now(),
                count,
            });
        }

        let exhausted = surface.canvas.upload_budget_exhausted();
        if exhausted {
            self.request_render();
        }
        summary.set_upload_budget_exhausted(exhausted);

        let finish = clock.read_source();
        state.stats.finish_frame(frame.frame_index, draw_start, finish);
        tracer.frame_summary(&summary.finish());
        Ok(())
    }
}

fn phase_begin(
    tracer: &mut Tracer<'_>,
    summary: &mut FrameSummaryBuilder,
    frame: &FrameBeginEvent,
    phase: PhaseKind,
    timestamp: HostTime,
) {
    summary.phase_begin(phase, timestamp);
    tracer.phase_begin(&PhaseBeginEvent {
        frame_index: frame.frame_index,
        phase,
        timestamp,
    });
}

fn phase_end(
    tracer: &mut Tracer<'_>,
    summary: &mut FrameSummaryBuilder,
    frame: &FrameBeginEvent,
    phase: PhaseKind,
    timestamp: HostTime,
) {
    summary.phase_end(phase, timestamp);
    tracer.phase_end(&PhaseEndEvent {
        frame_index: frame.frame_index,
        phase,
        timestamp,
    });
}

/// The render-root controller.
///
/// Cloning is cheap and every clone drives the same root.
#[derive(Clone)]
pub struct RenderRoot {
    inner: Arc<Inner>,
}

impl fmt::Debug for RenderRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderRoot")
            .field("config", &self.inner.config)
            .field("render_requested", &self.inner.frames.is_requested())
            .finish_non_exhaustive()
    }
}

impl RenderRoot {
    /// Creates a root driven by `host`, timed by the monotonic clock.
    #[must_use]
    pub fn new(host: Arc<dyn RenderHost>, config: RootConfig) -> Self {
        Self::with_time_source(host, config, Arc::new(MonotonicSource))
    }

    /// Creates a root that reads time from `source`.
    #[must_use]
    pub fn with_time_source(
        host: Arc<dyn RenderHost>,
        config: RootConfig,
        source: Arc<dyn TimeSource>,
    ) -> Self {
        let domain = LockDomain::next();
        let state = RootState {
            content: None,
            input: InputDispatcher::new(),
            clock: Clock::new(source),
            work: PendingWork::new(),
            surface: None,
            stats: FrameStats::new(&config),
            trace: None,
        };
        Self {
            inner: Arc::new(Inner {
                host,
                config,
                frames: FrameScheduler::new(config.render_mode),
                state: OrderedMutex::new(domain, LockKind::Render, state),
                idle: IdleTaskQueue::new(domain),
            }),
        }
    }

    /// The configuration this root was created with.
    #[must_use]
    pub fn config(&self) -> &RootConfig {
        &self.inner.config
    }

    /// A weak handle for scene nodes and other long-lived holders.
    #[must_use]
    pub fn handle(&self) -> RootHandle {
        RootHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // -- Content --------------------------------------------------------

    /// Replaces the content root.
    ///
    /// Passing the current root again does nothing. Otherwise the outgoing
    /// root receives a cancel if it accepted an open gesture, is detached,
    /// and gives up its textures; the incoming root is attached and laid out
    /// on the next frame.
    ///
    /// `attach` and `detach` run under the render lock.
    pub fn set_content_root(&self, root: Option<SharedNode>) {
        let inner = &*self.inner;
        let mut guard = inner.state.lock();
        let state = &mut *guard;

        let unchanged = match (&state.content, &root) {
            (Some(current), Some(next)) => current.ptr_eq(next),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }

        if let Some(old) = state.content.take() {
            let now = state.clock.read_source();
            let has_content = state.content.is_some();
            let mut cx = inner.cx(&state.clock, &mut state.work, has_content);
            if state.input.cancel_gesture(&old, now, &mut cx) {
                let frame_index = state.clock.frame_index();
                state.tracer().gesture_cancel(&GestureCancelEvent {
                    frame_index,
                    time: now,
                });
            }
            old.lock().detach();
            if let Some(surface) = &mut state.surface {
                surface.canvas.yield_textures();
            }
        }

        if let Some(new) = &root {
            new.lock().attach(&self.handle());
        }
        state.content = root;
        if state.work.layout.request(state.content.is_some()) {
            inner.request_render();
        }
        inner.release(guard);
    }

    /// The current content root.
    #[must_use]
    pub fn content_root(&self) -> Option<SharedNode> {
        self.inner.state.lock().content.clone()
    }

    // -- Requests -------------------------------------------------------

    /// Asks the host for a frame. Any number of calls before the next frame
    /// starts produce one frame and one host notification.
    ///
    /// Never blocks; safe to call from any thread, including from inside a
    /// frame.
    pub fn request_render(&self) {
        self.inner.request_render();
    }

    /// Whether a frame has been requested and has not started yet.
    #[must_use]
    pub fn render_requested(&self) -> bool {
        self.inner.frames.is_requested()
    }

    /// Marks the content root for layout and requests a frame.
    ///
    /// Dropped before the first surface is ready, when there is no content,
    /// or when a layout is already pending.
    pub fn request_layout(&self) {
        let inner = &*self.inner;
        let mut guard = inner.state.lock();
        let has_content = guard.content.is_some();
        if guard.work.layout.request(has_content) {
            inner.request_render();
        }
        drop(guard);
    }

    /// Whether the next frame will lay out the content root.
    #[must_use]
    pub fn needs_layout(&self) -> bool {
        self.inner.state.lock().work.layout.needs_layout
    }

    /// Queues `animation` to receive the start time of the next frame.
    ///
    /// Does not request that frame.
    pub fn register_pending_animation(&self, animation: impl PendingAnimation + 'static) {
        self.inner
            .state
            .lock()
            .work
            .animations
            .register(Box::new(animation));
    }

    /// Number of animations waiting for the next frame.
    #[must_use]
    pub fn pending_animation_count(&self) -> usize {
        self.inner.state.lock().work.animations.len()
    }

    // -- Idle tasks -----------------------------------------------------

    /// Appends `task` to the idle queue, asking the host for a rotation if
    /// none is owed.
    ///
    /// From inside a scene callback use
    /// [`RootContext::add_idle_task`] instead; this method would take the
    /// idle-queue lock under the render lock.
    pub fn add_idle_task(&self, task: impl IdleTask + 'static) -> IdleTaskId {
        let (id, schedule) = self.inner.idle.add(Box::new(task));
        if schedule {
            self.inner.host.schedule_idle();
        }
        id
    }

    /// Removes an idle task. A task removed while it runs finishes its slice
    /// and is not queued again. Returns whether the task was found.
    pub fn remove_idle_task(&self, id: IdleTaskId) -> bool {
        self.inner.idle.remove(id)
    }

    /// Removes every idle task. Returns how many were dropped.
    pub fn clear_idle_tasks(&self) -> usize {
        self.inner.idle.clear()
    }

    /// Number of tasks waiting in the idle queue.
    #[must_use]
    pub fn idle_task_count(&self) -> usize {
        self.inner.idle.len()
    }

    /// Whether the host owes the root an idle rotation.
    #[must_use]
    pub fn idle_rotation_scheduled(&self) -> bool {
        self.inner.idle.is_scheduled()
    }

    /// Runs one idle task. Call on the render thread after
    /// [`RenderHost::schedule_idle`].
    ///
    /// The head task runs under the render lock with the current canvas and
    /// goes back to the tail if it asks to. Another rotation is requested
    /// only when work remains and no frame is pending; a pending frame
    /// requests it when it finishes. Without a surface the task keeps its
    /// place and nothing is rescheduled until the next frame.
    ///
    /// # Errors
    ///
    /// [`RootError::IdleTask`] with the task's own error. The task is dropped.
    pub fn run_idle_rotation(&self) -> Result<(), RootError> {
        let inner = &*self.inner;
        let Some(mut popped) = inner.idle.begin_rotation() else {
            return Ok(());
        };

        let result = {
            let mut guard = inner.state.lock();
            let state = &mut *guard;
            let render_requested = inner.frames.is_requested();
            let result = if let Some(surface) = state.surface.as_mut() {
                let begin = state.clock.read_source();
                let result = popped.task.on_idle(&mut *surface.canvas, render_requested);
                let end = state.clock.read_source();
                let outcome = result.as_ref().ok().copied();
                state.tracer().idle_rotation(&IdleRotationEvent {
                    task: popped.id,
                    render_requested,
                    begin,
                    end,
                    outcome,
                });
                Some(result)
            } else {
                None
            };
            inner.release(guard);
            result
        };

        match result {
            None => {
                inner.idle.restore(popped);
                Ok(())
            }
            Some(Ok(outcome)) => {
                let keep = outcome == IdleOutcome::Reschedule;
                if inner
                    .idle
                    .finish_rotation(popped, keep, inner.frames.is_requested())
                {
                    inner.host.schedule_idle();
                }
                Ok(())
            }
            Some(Err(source)) => {
                let id = popped.id;
                inner.idle.abandon(popped);
                Err(RootError::IdleTask { id, source })
            }
        }
    }

    // -- Input ----------------------------------------------------------

    /// Routes a pointer event to the content root and returns whether it was
    /// consumed.
    ///
    /// Only gestures whose down the content root consumed are forwarded past
    /// the down.
    pub fn dispatch_pointer_event(&self, event: &PointerEvent) -> bool {
        let inner = &*self.inner;
        let mut guard = inner.state.lock();
        let state = &mut *guard;
        let mut cx = inner.cx(&state.clock, &mut state.work, state.content.is_some());
        let consumed = state.input.dispatch(event, state.content.as_ref(), &mut cx);
        inner.release(guard);
        consumed
    }

    /// Whether the content root accepted the down of an open gesture.
    #[must_use]
    pub fn in_down_state(&self) -> bool {
        self.inner.state.lock().input.in_down_state()
    }

    // -- Render thread --------------------------------------------------

    /// Takes the render lock until the guard is dropped or
    /// [`unlock`](RenderThreadGuard::unlock)ed.
    ///
    /// # Panics
    ///
    /// If this thread already holds the render lock or the idle-queue lock.
    #[must_use = "the render lock is released when the guard is dropped"]
    pub fn lock_render_thread(&self) -> RenderThreadGuard<'_> {
        RenderThreadGuard {
            inner: &self.inner,
            guard: Some(self.inner.state.lock()),
        }
    }

    /// The frame clock's current value.
    #[must_use]
    pub fn now(&self) -> HostTime {
        self.inner.state.lock().clock.now()
    }

    /// Number of frames drawn so far.
    #[must_use]
    pub fn frame_index(&self) -> u64 {
        self.inner.state.lock().clock.frame_index()
    }

    /// Installs or removes the trace sink, returning the previous one.
    ///
    /// Events are only emitted with the `trace` feature enabled.
    pub fn set_trace_sink(
        &self,
        sink: Option<Box<dyn TraceSink + Send>>,
    ) -> Option<Box<dyn TraceSink + Send>> {
        mem::replace(&mut self.inner.state.lock().trace, sink)
    }

    // -- Lifecycle ------------------------------------------------------

    /// A rendering context and its canvas are ready.
    ///
    /// A second call means the context was lost and recreated: the new
    /// canvas replaces the old one and the next resize lays out again. The
    /// host is told which render mode to drive, and idle tasks left waiting
    /// for a surface get a rotation.
    pub fn on_surface_ready(&self, context: ContextId, canvas: Box<dyn Canvas>) {
        let inner = &*self.inner;
        let mut guard = inner.state.lock();
        if let Some(previous) = &guard.surface {
            info!(
                previous = ?previous.context,
                current = ?context,
                "rendering context changed; recovering"
            );
        }
        guard.surface = Some(Surface {
            context,
            canvas,
            width: 0,
            height: 0,
        });
        guard.work.layout.initialized = true;
        inner.release(guard);
        inner.host.set_render_mode(inner.config.render_mode);
        // Rotations that found no surface put their task back unscheduled.
        if inner.idle.schedule_if_waiting() {
            inner.host.schedule_idle();
        }
    }

    /// The surface now measures `width` by `height` pixels.
    ///
    /// Uploaded textures are invalidated and the canvas resized. A change of
    /// size lays out the content root again and requests a frame.
    ///
    /// # Panics
    ///
    /// Before [`on_surface_ready`](Self::on_surface_ready), or if `context`
    /// is not the context passed to it.
    pub fn on_surface_resized(&self, context: ContextId, width: u32, height: u32) {
        let inner = &*self.inner;
        let mut guard = inner.state.lock();
        let state = &mut *guard;
        let Some(surface) = state.surface.as_mut() else {
            panic!("on_surface_resized called before on_surface_ready");
        };
        assert_eq!(
            surface.context, context,
            "surface resized under a different rendering context"
        );
        info!(width, height, "surface resized");
        surface.canvas.invalidate_textures();
        surface.canvas.set_size(width, height);
        if (surface.width, surface.height) != (width, height) {
            surface.width = width;
            surface.height = height;
            state.work.layout.request(state.content.is_some());
            inner.request_render();
        }
        inner.release(guard);
    }

    /// Produces one frame.
    ///
    /// Under the render lock: ticks the clock, frees recycled resources,
    /// resets the upload budget, clears the render request, lays out if
    /// needed, renders the content root, and gives every pending animation
    /// this frame's time. A frame that ran out of upload budget requests
    /// another. After the lock is released, an idle rotation is requested if
    /// tasks are waiting.
    ///
    /// # Errors
    ///
    /// [`RootError::Layout`] or [`RootError::Render`] with the content root's
    /// own error.
    ///
    /// # Panics
    ///
    /// Before [`on_surface_ready`](Self::on_surface_ready).
    pub fn on_frame(&self) -> Result<(), RootError> {
        let inner = &*self.inner;
        let mut guard = inner.state.lock();
        let result = inner.draw_frame(&mut guard);
        inner.release(guard);
        result?;
        if inner.idle.schedule_if_waiting() {
            inner.host.schedule_idle();
        }
        Ok(())
    }

    /// The host paused rendering.
    pub fn on_pause(&self) {
        let mut guard = self.inner.state.lock();
        debug!(frame_index = guard.clock.frame_index(), "render root paused");
        guard.stats.reset();
    }
}

/// A weak reference to a [`RenderRoot`].
///
/// Given to scene nodes at attach. Holding one does not keep the root alive.
#[derive(Clone)]
pub struct RootHandle {
    inner: Weak<Inner>,
}

impl fmt::Debug for RootHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootHandle")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl RootHandle {
    /// The root, if it still exists.
    #[must_use]
    pub fn upgrade(&self) -> Option<RenderRoot> {
        self.inner.upgrade().map(|inner| RenderRoot { inner })
    }

    /// Requests a frame. Returns `false` if the root is gone.
    ///
    /// Lock-free, so safe from inside scene callbacks.
    pub fn request_render(&self) -> bool {
        match self.inner.upgrade() {
            Some(inner) => {
                inner.request_render();
                true
            }
            None => false,
        }
    }
}

/// Holds the render lock for a trusted collaborator.
///
/// Dropping the guard releases the lock on every path, including `?` and
/// unwinding.
pub struct RenderThreadGuard<'a> {
    inner: &'a Inner,
    // Only `None` while dropping.
    guard: Option<OrderedGuard<'a, RootState>>,
}

impl fmt::Debug for RenderThreadGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderThreadGuard")
            .field("locked", &self.guard.is_some())
            .finish_non_exhaustive()
    }
}

impl RenderThreadGuard<'_> {
    fn state(&mut self) -> &mut RootState {
        self.guard
            .as_deref_mut()
            .unwrap_or_else(|| unreachable!("render lock already released"))
    }

    /// The current content root.
    #[must_use]
    pub fn content_root(&self) -> Option<&SharedNode> {
        self.guard.as_deref().and_then(|state| state.content.as_ref())
    }

    /// Root services, as a scene callback would see them.
    pub fn context(&mut self) -> RootContext<'_> {
        let inner = self.inner;
        let state = self.state();
        let has_content = state.content.is_some();
        inner.cx(&state.clock, &mut state.work, has_content)
    }

    /// Runs `f` on the content root with root services. Returns `None`
    /// without content.
    pub fn with_content<R>(
        &mut self,
        f: impl FnOnce(&mut dyn SceneNode, &mut RootContext<'_>) -> R,
    ) -> Option<R> {
        let inner = self.inner;
        let state = self.state();
        let node = state.content.clone()?;
        let mut cx = inner.cx(&state.clock, &mut state.work, true);
        let mut node = node.lock();
        Some(f(&mut *node, &mut cx))
    }

    /// Releases the render lock.
    pub fn unlock(self) {}
}

impl Drop for RenderThreadGuard<'_> {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            self.inner.release(guard);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::AnimationStart;
    use crate::clock::ManualSource;
    use crate::error::BoxError;
    use crate::input::PointerAction;
    use crate::scheduler::RenderMode;
    use crate::testing::{RecordingCanvas, RecordingHost, ScriptedNode};
    use crate::time::Duration;
    use kurbo::Point;
    use parking_lot::Mutex;

    const CONTEXT: ContextId = ContextId(1);

    struct Fixture {
        root: RenderRoot,
        host: Arc<RecordingHost>,
        source: Arc<ManualSource>,
        canvas: Arc<Mutex<crate::testing::CanvasLog>>,
    }

    fn fixture_with(config: RootConfig) -> Fixture {
        let host = Arc::new(RecordingHost::default());
        let source = Arc::new(ManualSource::new(HostTime::from_millis(10)));
        let root = RenderRoot::with_time_source(host.clone(), config, source.clone());
        let (canvas, log) = RecordingCanvas::new();
        root.on_surface_ready(CONTEXT, Box::new(canvas));
        root.on_surface_resized(CONTEXT, 800, 600);
        Fixture {
            root,
            host,
            source,
            canvas: log,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(RootConfig::default())
    }

    fn pointer(action: PointerAction) -> PointerEvent {
        PointerEvent::new(action, Point::new(10.0, 10.0), HostTime::from_millis(5))
    }

    #[derive(Debug, thiserror::Error)]
    #[error("decoder stalled")]
    struct Stalled;

    #[test]
    fn end_to_end_single_frame() {
        let f = fixture();
        let (node, log) = ScriptedNode::consuming();
        f.root.set_content_root(Some(node));
        f.root.request_render();
        f.root.request_render();
        f.root.request_render();
        let requests = f.host.frame_requests();

        f.root.on_frame().unwrap();

        assert!(!f.root.needs_layout());
        assert!(!f.root.render_requested());
        assert_eq!(log.layouts(), [Rect::new(0.0, 0.0, 800.0, 600.0)]);
        assert_eq!(log.renders(), 1);
        assert_eq!(f.host.frame_requests(), requests, "no second frame");
    }

    #[test]
    fn requests_before_a_frame_coalesce() {
        let f = fixture();
        f.root.on_frame().unwrap();
        let before = f.host.frame_requests();
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..50 {
                        f.root.request_render();
                    }
                });
            }
        });
        assert_eq!(f.host.frame_requests(), before + 1);
        f.root.on_frame().unwrap();
        assert!(!f.root.render_requested());
        f.root.request_render();
        assert_eq!(f.host.frame_requests(), before + 2);
    }

    #[test]
    fn request_during_render_schedules_next_frame() {
        let f = fixture();
        let (node, log) = ScriptedNode::consuming();
        log.on_render(|cx| cx.request_render());
        f.root.set_content_root(Some(node));
        f.root.on_frame().unwrap();
        assert!(f.root.render_requested(), "captured for the next frame");
    }

    #[test]
    fn same_content_root_is_a_no_op() {
        let f = fixture();
        let (node, log) = ScriptedNode::consuming();
        f.root.set_content_root(Some(node.clone()));
        f.root.set_content_root(Some(node.clone()));
        assert_eq!(log.attaches(), 1);
        assert_eq!(log.detaches(), 0);
        assert!(f.root.content_root().is_some_and(|c| c.ptr_eq(&node)));
    }

    #[test]
    fn swap_detaches_and_yields_textures() {
        let f = fixture();
        let (a, a_log) = ScriptedNode::consuming();
        let (b, b_log) = ScriptedNode::consuming();
        f.root.set_content_root(Some(a));
        f.root.set_content_root(Some(b));
        assert_eq!(a_log.detaches(), 1);
        assert_eq!(b_log.attaches(), 1);
        assert_eq!(f.canvas.lock().yields, 1);

        f.root.set_content_root(None);
        assert_eq!(b_log.detaches(), 1);
        assert!(f.root.content_root().is_none());
    }

    #[test]
    fn swap_mid_gesture_cancels_old_root_once() {
        let f = fixture();
        let (old, old_log) = ScriptedNode::consuming();
        let (new, new_log) = ScriptedNode::consuming();
        f.root.set_content_root(Some(old));
        assert!(f.root.dispatch_pointer_event(&pointer(PointerAction::Down)));
        assert!(f.root.in_down_state());

        f.source.advance(Duration::from_millis(3));
        f.root.set_content_root(Some(new));

        assert_eq!(
            old_log.actions(),
            [PointerAction::Down, PointerAction::Cancel]
        );
        assert_eq!(old_log.last_event_time(), Some(HostTime::from_millis(13)));
        assert!(new_log.actions().is_empty());
        assert!(!f.root.in_down_state());

        // The rest of the old gesture goes nowhere.
        assert!(!f.root.dispatch_pointer_event(&pointer(PointerAction::Move)));
        assert!(new_log.actions().is_empty());
    }

    #[test]
    fn unconsumed_down_blocks_the_gesture() {
        let f = fixture();
        let (node, log) = ScriptedNode::rejecting();
        f.root.set_content_root(Some(node));
        assert!(!f.root.dispatch_pointer_event(&pointer(PointerAction::Down)));
        assert!(!f.root.dispatch_pointer_event(&pointer(PointerAction::Move)));
        assert!(!f.root.dispatch_pointer_event(&pointer(PointerAction::Up)));
        assert_eq!(log.actions(), [PointerAction::Down]);
    }

    #[test]
    fn animations_share_the_frame_time() {
        let f = fixture();
        let a = AnimationStart::new();
        let b = AnimationStart::new();
        f.root.register_pending_animation(a.clone());
        f.source.advance(Duration::from_millis(7));
        f.root.register_pending_animation(b.clone());
        assert_eq!(f.root.pending_animation_count(), 2);

        f.source.advance(Duration::from_millis(5));
        f.root.on_frame().unwrap();

        let frame_time = f.root.now();
        assert_eq!(frame_time, HostTime::from_millis(22));
        assert_eq!(a.start_time(), Some(frame_time));
        assert_eq!(b.start_time(), Some(frame_time));
        assert_eq!(f.root.pending_animation_count(), 0);
    }

    #[test]
    fn animations_registered_while_rendering_start_this_frame() {
        let f = fixture();
        let (node, log) = ScriptedNode::consuming();
        let late = AnimationStart::new();
        let slot = late.clone();
        log.on_render(move |cx| cx.register_pending_animation(slot.clone()));
        f.root.set_content_root(Some(node));

        f.root.on_frame().unwrap();
        // Registered during render, before the flush: same frame.
        assert_eq!(late.start_time(), Some(f.root.now()));
    }

    #[test]
    fn idle_rotation_is_round_robin() {
        let f = fixture();
        let runs = Arc::new(Mutex::new(Vec::new()));
        for name in ["t1", "t2", "t3"] {
            let runs = Arc::clone(&runs);
            f.root.add_idle_task(
                move |_: &mut dyn Canvas, _: bool| -> Result<IdleOutcome, BoxError> {
                    runs.lock().push(name);
                    Ok(IdleOutcome::Reschedule)
                },
            );
        }
        assert_eq!(f.host.idle_requests(), 1, "one rotation owed for three adds");

        f.root.on_frame().unwrap();
        f.root.run_idle_rotation().unwrap();
        assert_eq!(*runs.lock(), ["t1"]);
        f.root.run_idle_rotation().unwrap();
        f.root.run_idle_rotation().unwrap();
        assert_eq!(*runs.lock(), ["t1", "t2", "t3"]);
        assert_eq!(f.root.idle_task_count(), 3);
    }

    #[test]
    fn idle_rotation_defers_to_pending_frame() {
        let f = fixture();
        f.root.on_frame().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&seen);
        f.root.add_idle_task(
            move |_: &mut dyn Canvas, pending: bool| -> Result<IdleOutcome, BoxError> {
                record.lock().push(pending);
                Ok(IdleOutcome::Reschedule)
            },
        );
        let idles = f.host.idle_requests();

        f.root.request_render();
        f.root.run_idle_rotation().unwrap();
        assert_eq!(*seen.lock(), [true], "the task sees the pending frame");
        assert_eq!(f.host.idle_requests(), idles, "the frame reschedules it");
        assert!(!f.root.idle_rotation_scheduled());

        f.root.on_frame().unwrap();
        assert_eq!(f.host.idle_requests(), idles + 1);
        assert!(f.root.idle_rotation_scheduled());

        f.root.run_idle_rotation().unwrap();
        assert_eq!(*seen.lock(), [true, false]);
        assert_eq!(f.host.idle_requests(), idles + 2, "no frame pending");
    }

    #[test]
    fn idle_task_failure_is_returned_unchanged() {
        let f = fixture();
        let id = f.root.add_idle_task(
            |_: &mut dyn Canvas, _: bool| -> Result<IdleOutcome, BoxError> {
                Err(Box::new(Stalled))
            },
        );
        let err = f.root.run_idle_rotation().unwrap_err();
        assert!(matches!(err, RootError::IdleTask { id: failed, .. } if failed == id));
        assert!(err.into_source().downcast_ref::<Stalled>().is_some());
        assert_eq!(f.root.idle_task_count(), 0);
    }

    #[test]
    fn idle_task_without_surface_keeps_its_turn() {
        let host = Arc::new(RecordingHost::default());
        let root = RenderRoot::new(host.clone(), RootConfig::default());
        let runs = Arc::new(Mutex::new(0));
        let count = Arc::clone(&runs);
        root.add_idle_task(
            move |_: &mut dyn Canvas, _: bool| -> Result<IdleOutcome, BoxError> {
                *count.lock() += 1;
                Ok(IdleOutcome::Done)
            },
        );
        assert_eq!(host.idle_requests(), 1);
        root.run_idle_rotation().unwrap();
        assert_eq!(*runs.lock(), 0);
        assert_eq!(root.idle_task_count(), 1);
        assert!(!root.idle_rotation_scheduled());

        // A zero-size surface never draws a frame, so surface-ready has to
        // schedule the waiting task itself.
        let (canvas, _) = RecordingCanvas::new();
        root.on_surface_ready(CONTEXT, Box::new(canvas));
        root.on_surface_resized(CONTEXT, 0, 0);
        assert_eq!(host.idle_requests(), 2);
        assert!(root.idle_rotation_scheduled());
        root.run_idle_rotation().unwrap();
        assert_eq!(*runs.lock(), 1);
        assert_eq!(root.idle_task_count(), 0);
    }

    #[test]
    fn removing_and_clearing_idle_tasks() {
        let f = fixture();
        let noop = |_: &mut dyn Canvas, _: bool| -> Result<IdleOutcome, BoxError> {
            Ok(IdleOutcome::Reschedule)
        };
        let a = f.root.add_idle_task(noop);
        f.root.add_idle_task(noop);
        assert!(f.root.remove_idle_task(a));
        assert!(!f.root.remove_idle_task(a));
        assert_eq!(f.root.clear_idle_tasks(), 1);
        assert_eq!(f.root.idle_task_count(), 0);
        f.root.run_idle_rotation().unwrap();
    }

    #[test]
    fn idle_tasks_added_while_rendering_queue_after_the_frame() {
        let f = fixture();
        let (node, log) = ScriptedNode::consuming();
        let added = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&added);
        log.on_render(move |cx| {
            if slot.lock().is_none() {
                let id = cx.add_idle_task(
                    |_: &mut dyn Canvas, _: bool| -> Result<IdleOutcome, BoxError> {
                        Ok(IdleOutcome::Done)
                    },
                );
                *slot.lock() = Some(id);
            }
        });
        f.root.set_content_root(Some(node));
        f.root.on_frame().unwrap();

        assert!(added.lock().is_some());
        assert_eq!(f.root.idle_task_count(), 1);
        assert_eq!(f.host.idle_requests(), 1);
    }

    #[test]
    fn render_failure_is_returned_and_skips_idle_scheduling() {
        let f = fixture();
        let (node, log) = ScriptedNode::consuming();
        f.root.set_content_root(Some(node));
        f.root.add_idle_task(
            |_: &mut dyn Canvas, _: bool| -> Result<IdleOutcome, BoxError> {
                Ok(IdleOutcome::Reschedule)
            },
        );
        // A frame is pending, so the rotation leaves scheduling to it.
        f.root.run_idle_rotation().unwrap();
        assert!(!f.root.idle_rotation_scheduled());
        let idles = f.host.idle_requests();

        log.fail_render();
        let err = f.root.on_frame().unwrap_err();
        assert!(matches!(err, RootError::Render(_)));
        assert_eq!(err.to_string(), "content root render failed");
        assert_eq!(f.host.idle_requests(), idles);
        assert!(!f.root.idle_rotation_scheduled());
    }

    #[test]
    fn layout_failure_is_returned() {
        let f = fixture();
        let (node, log) = ScriptedNode::consuming();
        log.fail_layout();
        f.root.set_content_root(Some(node));
        assert!(matches!(f.root.on_frame(), Err(RootError::Layout(_))));
        assert_eq!(log.renders(), 0);
    }

    #[test]
    fn layout_requests_before_surface_are_dropped() {
        let host = Arc::new(RecordingHost::default());
        let root = RenderRoot::new(host.clone(), RootConfig::default());
        let (node, log) = ScriptedNode::consuming();
        root.set_content_root(Some(node));
        root.request_layout();
        assert_eq!(host.frame_requests(), 0, "not initialized");

        let (canvas, _) = RecordingCanvas::new();
        root.on_surface_ready(CONTEXT, Box::new(canvas));
        root.on_surface_resized(CONTEXT, 320, 200);
        root.on_frame().unwrap();
        assert_eq!(log.layouts(), [Rect::new(0.0, 0.0, 320.0, 200.0)]);

        root.request_layout();
        root.request_layout();
        assert!(root.needs_layout());
        root.on_frame().unwrap();
        assert_eq!(log.layouts().len(), 2);
    }

    #[test]
    fn zero_sized_surface_skips_layout() {
        let host = Arc::new(RecordingHost::default());
        let root = RenderRoot::new(host, RootConfig::default());
        let (canvas, _) = RecordingCanvas::new();
        root.on_surface_ready(CONTEXT, Box::new(canvas));
        let (node, log) = ScriptedNode::consuming();
        root.set_content_root(Some(node));

        root.on_frame().unwrap();
        assert!(log.layouts().is_empty());
        assert!(!root.needs_layout(), "the request is spent");
        assert_eq!(log.renders(), 1);
    }

    #[test]
    fn frame_resets_canvas_budgets() {
        let f = fixture();
        f.canvas.lock().exhaust_frames = 1;
        f.root.on_frame().unwrap();
        assert!(f.root.render_requested(), "leftover uploads need a frame");
        f.root.on_frame().unwrap();
        assert!(!f.root.render_requested());

        let log = f.canvas.lock();
        assert_eq!(log.recycled_deletes, 2);
        assert_eq!(log.budget_resets, 2);
    }

    #[test]
    fn resize_invalidates_and_relayouts() {
        let f = fixture();
        let (node, log) = ScriptedNode::consuming();
        f.root.set_content_root(Some(node));
        f.root.on_frame().unwrap();

        f.root.on_surface_resized(CONTEXT, 800, 600);
        assert!(!f.root.needs_layout(), "same size");
        f.root.on_surface_resized(CONTEXT, 1024, 768);
        assert!(f.root.needs_layout());
        assert!(f.root.render_requested());
        f.root.on_frame().unwrap();
        assert_eq!(log.layouts().last(), Some(&Rect::new(0.0, 0.0, 1024.0, 768.0)));

        let canvas = f.canvas.lock();
        assert_eq!(canvas.sizes, [(800, 600), (800, 600), (1024, 768)]);
        assert_eq!(canvas.invalidations, 3);
    }

    #[test]
    #[should_panic(expected = "different rendering context")]
    fn resize_with_foreign_context_panics() {
        let f = fixture();
        f.root.on_surface_resized(ContextId(2), 10, 10);
    }

    #[test]
    #[should_panic(expected = "before on_surface_ready")]
    fn frame_without_surface_panics() {
        let root = RenderRoot::new(Arc::new(RecordingHost::default()), RootConfig::default());
        let _ = root.on_frame();
    }

    #[test]
    fn context_loss_replaces_the_canvas() {
        let f = fixture();
        let (node, log) = ScriptedNode::consuming();
        f.root.set_content_root(Some(node));
        f.root.on_frame().unwrap();

        let (fresh, fresh_log) = RecordingCanvas::new();
        f.root.on_surface_ready(ContextId(2), Box::new(fresh));
        f.root.on_surface_resized(ContextId(2), 800, 600);
        f.root.on_frame().unwrap();

        assert_eq!(fresh_log.lock().sizes, [(800, 600)]);
        assert_eq!(log.layouts().len(), 2, "recreated surface lays out again");
    }

    #[test]
    fn surface_ready_hands_over_render_mode() {
        let f = fixture_with(RootConfig::profiling());
        assert_eq!(f.host.render_mode(), Some(RenderMode::Continuous));
        let g = fixture();
        assert_eq!(g.host.render_mode(), Some(RenderMode::OnDemand));
    }

    #[test]
    fn guard_exposes_content_and_context() {
        let f = fixture();
        let (node, log) = ScriptedNode::consuming();
        f.root.set_content_root(Some(node));
        f.root.on_frame().unwrap();

        let mut guard = f.root.lock_render_thread();
        assert!(guard.content_root().is_some());
        guard.context().request_layout();
        let consumed = guard
            .with_content(|node, cx| node.dispatch_pointer_event(&pointer(PointerAction::Down), cx));
        assert_eq!(consumed, Some(true));
        guard.unlock();

        assert!(f.root.needs_layout());
        assert_eq!(log.actions(), [PointerAction::Down]);
    }

    #[test]
    fn guard_releases_on_early_return() {
        fn fails(root: &RenderRoot) -> Result<(), Stalled> {
            let _guard = root.lock_render_thread();
            Err(Stalled)
        }
        let f = fixture();
        assert!(fails(&f.root).is_err());
        // The lock is free again.
        f.root.on_frame().unwrap();
    }

    #[test]
    #[should_panic(expected = "not reentrant")]
    fn reentering_the_render_lock_panics() {
        let f = fixture();
        let _guard = f.root.lock_render_thread();
        f.root.request_layout();
    }

    #[test]
    #[should_panic(expected = "while a scene node lock is held")]
    fn calling_the_root_under_a_node_lock_panics() {
        let f = fixture();
        let (node, _) = ScriptedNode::consuming();
        f.root.set_content_root(Some(node.clone()));
        let _node = node.lock();
        f.root.request_layout();
    }

    #[test]
    fn control_thread_edits_content_through_the_render_lock() {
        let f = fixture();
        let (node, log) = ScriptedNode::consuming();
        f.root.set_content_root(Some(node));
        std::thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..200 {
                    f.root.on_frame().unwrap();
                }
            });
            for _ in 0..200 {
                let mut guard = f.root.lock_render_thread();
                guard.with_content(|_, cx| cx.request_layout());
            }
        });
        assert!(log.renders() >= 200);
        assert!(!log.layouts().is_empty());
    }

    #[test]
    fn cancel_on_swap_does_not_lay_out_the_detached_root() {
        let f = fixture();
        let (node, log) = ScriptedNode::consuming();
        log.on_pointer(|cx| cx.request_layout());
        f.root.set_content_root(Some(node));
        f.root.on_frame().unwrap();
        assert!(f.root.dispatch_pointer_event(&pointer(PointerAction::Down)));
        f.root.on_frame().unwrap();
        assert!(!f.root.needs_layout());

        f.root.set_content_root(None);
        assert_eq!(
            log.actions(),
            [PointerAction::Down, PointerAction::Cancel]
        );
        assert!(!f.root.needs_layout());
    }

    #[test]
    fn handle_outlives_root_safely() {
        let f = fixture();
        let handle = f.root.handle();
        assert!(handle.request_render());
        assert!(handle.upgrade().is_some());
        let Fixture { root, .. } = f;
        drop(root);
        assert!(!handle.request_render());
        assert!(handle.upgrade().is_none());
    }

    #[test]
    fn pause_keeps_state() {
        let f = fixture_with(RootConfig::profiling());
        f.root.on_frame().unwrap();
        f.root.on_pause();
        assert_eq!(f.root.frame_index(), 1);
        f.root.on_frame().unwrap();
        assert_eq!(f.root.frame_index(), 2);
    }

    #[cfg(feature = "trace")]
    #[test]
    fn frames_and_rotations_are_traced() {
        use crate::trace::FrameSummary;

        #[derive(Default)]
        struct Events {
            phases: Vec<PhaseKind>,
            summaries: Vec<FrameSummary>,
            rotations: Vec<IdleRotationEvent>,
            cancels: usize,
        }

        let f = fixture();
        let events = Arc::new(Mutex::new(Events::default()));

        struct Sink(Arc<Mutex<Events>>);
        impl TraceSink for Sink {
            fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
                self.0.lock().phases.push(e.phase);
            }
            fn on_frame_summary(&mut self, s: &FrameSummary) {
                self.0.lock().summaries.push(*s);
            }
            fn on_idle_rotation(&mut self, e: &IdleRotationEvent) {
                self.0.lock().rotations.push(*e);
            }
            fn on_gesture_cancel(&mut self, _: &GestureCancelEvent) {
                self.0.lock().cancels += 1;
            }
        }
        f.root
            .set_trace_sink(Some(Box::new(Sink(Arc::clone(&events)))));

        let (node, _) = ScriptedNode::consuming();
        f.root.set_content_root(Some(node));
        f.root.register_pending_animation(AnimationStart::new());
        f.root.on_frame().unwrap();
        f.root.dispatch_pointer_event(&pointer(PointerAction::Down));
        f.root.set_content_root(None);
        f.root.add_idle_task(
            |_: &mut dyn Canvas, _: bool| -> Result<IdleOutcome, BoxError> {
                Ok(IdleOutcome::Done)
            },
        );
        f.root.run_idle_rotation().unwrap();

        let events = events.lock();
        assert_eq!(
            events.phases,
            [PhaseKind::Layout, PhaseKind::Render, PhaseKind::Animate]
        );
        assert_eq!(events.summaries.len(), 1);
        assert!(events.summaries[0].laid_out);
        assert_eq!(events.summaries[0].animations_started, 1);
        assert_eq!(events.rotations.len(), 1);
        assert_eq!(events.rotations[0].outcome, Some(IdleOutcome::Done));
        assert_eq!(events.cancels, 1);
    }

    #[cfg(feature = "trace")]
    #[test]
    fn failed_phases_are_still_closed() {
        #[derive(Default)]
        struct Balance {
            begins: Vec<PhaseKind>,
            ends: Vec<PhaseKind>,
        }

        struct Sink(Arc<Mutex<Balance>>);
        impl TraceSink for Sink {
            fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
                self.0.lock().begins.push(e.phase);
            }
            fn on_phase_end(&mut self, e: &PhaseEndEvent) {
                self.0.lock().ends.push(e.phase);
            }
        }

        let f = fixture();
        let balance = Arc::new(Mutex::new(Balance::default()));
        f.root
            .set_trace_sink(Some(Box::new(Sink(Arc::clone(&balance)))));
        let (node, log) = ScriptedNode::consuming();
        f.root.set_content_root(Some(node));

        log.fail_render();
        assert!(matches!(f.root.on_frame(), Err(RootError::Render(_))));
        {
            let balance = balance.lock();
            assert_eq!(balance.begins, [PhaseKind::Layout, PhaseKind::Render]);
            assert_eq!(balance.ends, balance.begins);
        }

        log.fail_layout();
        f.root.request_layout();
        assert!(matches!(f.root.on_frame(), Err(RootError::Layout(_))));
        let balance = balance.lock();
        assert_eq!(balance.begins.len(), 3);
        assert_eq!(balance.ends, balance.begins);
    }
}
