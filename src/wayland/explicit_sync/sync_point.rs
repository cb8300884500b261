use std::{cell::Cell, rc::Rc};

use tracing::trace;

#[derive(Debug, Default)]
struct TimelineInner {
    signaled: Cell<u64>,
}

/// A timeline of monotonically increasing sync points
///
/// Clones refer to the same timeline.
#[derive(Clone, Debug, Default)]
pub struct SyncTimeline(Rc<TimelineInner>);

impl PartialEq for SyncTimeline {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for SyncTimeline {}

impl SyncTimeline {
    /// Create a new timeline, with only point 0 signaled
    pub fn new() -> Self {
        Self::default()
    }

    /// Query the last signaled timeline point
    pub fn signaled_point(&self) -> u64 {
        self.0.signaled.get()
    }

    /// Signal every point up to `point`
    ///
    /// Timelines never go backwards, signaling an older point does nothing.
    pub fn signal(&self, point: u64) {
        if point > self.0.signaled.get() {
            trace!(point, "Signaling timeline");
            self.0.signaled.set(point);
        }
    }

    /// A point on this timeline
    pub fn point(&self, point: u64) -> SyncPoint {
        SyncPoint {
            timeline: self.clone(),
            point,
        }
    }
}

/// Point on a [`SyncTimeline`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncPoint {
    pub(super) timeline: SyncTimeline,
    pub(super) point: u64,
}

impl SyncPoint {
    /// Timeline of this point
    pub fn timeline(&self) -> &SyncTimeline {
        &self.timeline
    }

    /// Value of this point on its timeline
    pub fn value(&self) -> u64 {
        self.point
    }

    /// Whether the timeline reached this point
    pub fn is_signaled(&self) -> bool {
        self.timeline.signaled_point() >= self.point
    }

    /// Signal the sync point.
    pub fn signal(&self) {
        self.timeline.signal(self.point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeline_is_monotonic() {
        let timeline = SyncTimeline::new();
        let point = timeline.point(3);
        assert!(!point.is_signaled());
        assert!(timeline.point(0).is_signaled());

        timeline.point(5).signal();
        assert!(point.is_signaled());
        timeline.signal(2);
        assert_eq!(timeline.signaled_point(), 5);

        assert_ne!(SyncTimeline::new(), timeline);
        assert_eq!(point.timeline(), &timeline);
    }
}
