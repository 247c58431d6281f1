// Copyright 2026 the Tandem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Content roots and idle work for the demo.

use kurbo::Rect;
use tandem_core::BoxError;
use tandem_core::animation::AnimationStart;
use tandem_core::context::RootContext;
use tandem_core::host::{Canvas, SceneNode, SharedNode};
use tandem_core::idle::{IdleOutcome, IdleTask};
use tandem_core::input::{PointerAction, PointerEvent};
use tandem_core::root::RootHandle;
use tandem_core::time::Duration;
use tracing::{debug, trace};

/// How long a press pulse keeps frames coming.
const PULSE: Duration = Duration::from_millis(120);

/// A flat panel that pulses while pressed.
#[derive(Debug)]
pub(crate) struct Swatch {
    name: &'static str,
    bounds: Rect,
    pulse: Option<AnimationStart>,
    renders: u64,
}

impl Swatch {
    pub(crate) fn shared(name: &'static str) -> SharedNode {
        SharedNode::new(Self {
            name,
            bounds: Rect::ZERO,
            pulse: None,
            renders: 0,
        })
    }
}

impl SceneNode for Swatch {
    fn layout(&mut self, bounds: Rect, _cx: &mut RootContext<'_>) -> Result<(), BoxError> {
        debug!(
            name = self.name,
            width = bounds.width(),
            height = bounds.height(),
            "swatch laid out"
        );
        self.bounds = bounds;
        Ok(())
    }

    fn render(&mut self, _canvas: &mut dyn Canvas, cx: &mut RootContext<'_>) -> Result<(), BoxError> {
        self.renders += 1;
        match self.pulse.as_ref().map(AnimationStart::start_time) {
            None => {}
            Some(Some(start)) if cx.now().saturating_duration_since(start) >= PULSE => {
                trace!(name = self.name, "pulse finished");
                self.pulse = None;
            }
            // Unstarted pulses get this frame's time after rendering.
            Some(_) => cx.request_render(),
        }
        Ok(())
    }

    fn dispatch_pointer_event(&mut self, event: &PointerEvent, cx: &mut RootContext<'_>) -> bool {
        match event.action {
            PointerAction::Down => {
                if !self.bounds.contains(event.position) {
                    return false;
                }
                let pulse = AnimationStart::new();
                cx.register_pending_animation(pulse.clone());
                self.pulse = Some(pulse);
                cx.request_render();
            }
            PointerAction::Move => {}
            PointerAction::Up => {
                cx.add_idle_task(Prefetch::new(self.name, 3));
                cx.request_render();
            }
            PointerAction::Cancel => {
                debug!(name = self.name, "gesture cancelled");
                self.pulse = None;
            }
        }
        true
    }

    fn attach(&mut self, _root: &RootHandle) {
        debug!(name = self.name, "swatch attached");
    }

    fn detach(&mut self) {
        debug!(name = self.name, renders = self.renders, "swatch detached");
    }
}

/// Idle work done in slices, stepping aside while a frame is waiting.
#[derive(Debug)]
pub(crate) struct Prefetch {
    label: &'static str,
    remaining: u32,
}

impl Prefetch {
    pub(crate) fn new(label: &'static str, slices: u32) -> Self {
        Self {
            label,
            remaining: slices,
        }
    }
}

impl IdleTask for Prefetch {
    fn on_idle(
        &mut self,
        _canvas: &mut dyn Canvas,
        render_requested: bool,
    ) -> Result<IdleOutcome, BoxError> {
        if render_requested {
            return Ok(IdleOutcome::Reschedule);
        }
        self.remaining = self.remaining.saturating_sub(1);
        trace!(label = self.label, remaining = self.remaining, "prefetch slice");
        Ok(if self.remaining == 0 {
            IdleOutcome::Done
        } else {
            IdleOutcome::Reschedule
        })
    }
}
