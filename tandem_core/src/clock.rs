// Copyright 2026 the Tandem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame clock.
//!
//! A [`TimeSource`] reads the monotonic timeline. The [`Clock`] snapshots it
//! once per frame through [`Clock::update`]; every read of [`Clock::now`]
//! between two updates returns the same value, so all timing work inside one
//! frame agrees on "now".
//!
//! The clock is an explicit state object owned by the
//! [`RenderRoot`](crate::root::RenderRoot) and lent to whoever needs the frame
//! time. There is no global.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::time::{Duration, HostTime};

/// Reads the monotonic timeline.
pub trait TimeSource: Send + Sync {
    /// Returns the current time. Successive reads must not go backwards.
    fn now(&self) -> HostTime;
}

/// The platform monotonic clock (`CLOCK_MONOTONIC` on Unix).
#[derive(Clone, Copy, Debug, Default)]
pub struct MonotonicSource;

impl TimeSource for MonotonicSource {
    fn now(&self) -> HostTime {
        monotonic_now()
    }
}

#[cfg(unix)]
fn monotonic_now() -> HostTime {
    use rustix::time::{ClockId, clock_gettime};

    let timespec = clock_gettime(ClockId::Monotonic);
    let seconds = u64::try_from(timespec.tv_sec).unwrap_or(0);
    let nanos = u64::try_from(timespec.tv_nsec)
        .unwrap_or(0)
        .min(999_999_999);
    HostTime(
        seconds
            .saturating_mul(Duration::SECOND.nanos())
            .saturating_add(nanos),
    )
}

#[cfg(not(unix))]
fn monotonic_now() -> HostTime {
    use std::sync::OnceLock;
    use std::time::Instant;

    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    let elapsed = ORIGIN.get_or_init(Instant::now).elapsed();
    HostTime(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX))
}

/// A hand-driven time source.
///
/// Clones share the same timeline, so a test can keep one handle and give
/// another to the root.
#[derive(Clone, Debug, Default)]
pub struct ManualSource {
    nanos: Arc<AtomicU64>,
}

impl ManualSource {
    /// Creates a source that reads `start` until moved.
    #[must_use]
    pub fn new(start: HostTime) -> Self {
        Self {
            nanos: Arc::new(AtomicU64::new(start.nanos())),
        }
    }

    /// Jumps to `t`. Moving backwards is ignored.
    pub fn set(&self, t: HostTime) {
        self.nanos.fetch_max(t.nanos(), Ordering::AcqRel);
    }

    /// Moves the timeline forward by `d`.
    pub fn advance(&self, d: Duration) {
        self.nanos.fetch_add(d.nanos(), Ordering::AcqRel);
    }
}

impl TimeSource for ManualSource {
    fn now(&self) -> HostTime {
        HostTime(self.nanos.load(Ordering::Acquire))
    }
}

/// Per-frame snapshot of the timeline.
pub struct Clock {
    source: Arc<dyn TimeSource>,
    frame_time: HostTime,
    frame_index: u64,
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock")
            .field("frame_time", &self.frame_time)
            .field("frame_index", &self.frame_index)
            .finish_non_exhaustive()
    }
}

impl Clock {
    /// Creates a clock reading from `source`, snapshotted at creation.
    #[must_use]
    pub fn new(source: Arc<dyn TimeSource>) -> Self {
        let frame_time = source.now();
        Self {
            source,
            frame_time,
            frame_index: 0,
        }
    }

    /// Advances to the source's current time and starts a new frame.
    ///
    /// The snapshot never moves backwards, even if the source does.
    pub fn update(&mut self) -> HostTime {
        self.frame_time = self.source.now().max(self.frame_time);
        self.frame_index += 1;
        self.frame_time
    }

    /// The time sampled by the last [`update`](Self::update).
    #[inline]
    #[must_use]
    pub fn now(&self) -> HostTime {
        self.frame_time
    }

    /// Number of updates so far; the index of the current frame.
    #[inline]
    #[must_use]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Reads the source directly, without touching the frame snapshot.
    ///
    /// For measuring elapsed work and stamping events that happen outside a
    /// frame.
    #[must_use]
    pub fn read_source(&self) -> HostTime {
        self.source.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_are_stable_between_updates() {
        let source = ManualSource::new(HostTime(1_000));
        let mut clock = Clock::new(Arc::new(source.clone()));
        assert_eq!(clock.now(), HostTime(1_000));

        source.advance(Duration(500));
        assert_eq!(clock.now(), HostTime(1_000), "no update, no change");
        assert_eq!(clock.read_source(), HostTime(1_500));

        assert_eq!(clock.update(), HostTime(1_500));
        source.advance(Duration(500));
        assert_eq!(clock.now(), HostTime(1_500));
        assert_eq!(clock.frame_index(), 1);
    }

    #[test]
    fn update_never_goes_backwards() {
        struct Backwards(AtomicU64);
        impl TimeSource for Backwards {
            fn now(&self) -> HostTime {
                HostTime(self.0.fetch_sub(10, Ordering::Relaxed))
            }
        }

        let mut clock = Clock::new(Arc::new(Backwards(AtomicU64::new(100))));
        assert_eq!(clock.now(), HostTime(100));
        assert_eq!(clock.update(), HostTime(100));
        assert_eq!(clock.update(), HostTime(100));
        assert_eq!(clock.frame_index(), 2);
    }

    #[test]
    fn manual_source_ignores_backwards_set() {
        let source = ManualSource::new(HostTime(50));
        source.set(HostTime(20));
        assert_eq!(source.now(), HostTime(50));
        source.set(HostTime(70));
        assert_eq!(source.now(), HostTime(70));
    }

    #[test]
    fn monotonic_source_is_non_decreasing() {
        let first = MonotonicSource.now();
        let second = MonotonicSource.now();
        assert!(second >= first, "monotonic clock should not go backwards");
    }
}
