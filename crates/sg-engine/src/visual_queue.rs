//! Queue of step positions waiting for the audio clock to catch up.

use std::collections::VecDeque;

use sg_ir::StepEvent;

use crate::sink::StepSink;

/// FIFO of step events in scheduled order.
///
/// The scheduler pushes events ahead of time; the UI drains only those
/// whose time has been reached, so the display lags the audio and never
/// leads it.
#[derive(Clone, Debug, Default)]
pub struct VisualQueue {
    events: VecDeque<StepEvent>,
    /// Set by `clear`, reported once by the next drain.
    reset_pending: bool,
}

impl VisualQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an event; events arrive in non-decreasing time order.
    pub fn push(&mut self, event: StepEvent) {
        self.events.push_back(event);
    }

    /// Drop all pending events and queue a reset notification.
    pub fn clear(&mut self) {
        self.events.clear();
        self.reset_pending = true;
    }

    /// Surface every event with `time <= now`, in order.
    ///
    /// A pending reset is reported first as `None`.
    pub fn drain_due(&mut self, now: f64, mut on_change: impl FnMut(Option<&StepEvent>)) -> usize {
        let mut surfaced = 0;
        if self.reset_pending {
            self.reset_pending = false;
            on_change(None);
            surfaced += 1;
        }
        while self.events.front().is_some_and(|e| e.time <= now) {
            if let Some(event) = self.events.pop_front() {
                on_change(Some(&event));
                surfaced += 1;
            }
        }
        surfaced
    }

    /// Peek at the next event without removing it.
    pub fn peek(&self) -> Option<&StepEvent> {
        self.events.front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl StepSink for VisualQueue {
    fn push(&mut self, step: StepEvent) {
        VisualQueue::push(self, step);
    }

    fn clear(&mut self) {
        VisualQueue::clear(self);
    }
}
