//! Step positions for the UI, released in step with the audio clock.

use crossbeam_channel::{unbounded, Receiver, Sender};
use sg_engine::{AudioClock, StepSink, VisualQueue};
use sg_ir::StepEvent;

enum VisualMsg {
    Step(StepEvent),
    Clear,
}

/// Scheduler-side end: forwards step events to the UI thread.
#[derive(Clone)]
pub struct StepSender {
    tx: Sender<VisualMsg>,
}

impl StepSink for StepSender {
    fn push(&mut self, step: StepEvent) {
        let _ = self.tx.send(VisualMsg::Step(step));
    }

    fn clear(&mut self) {
        let _ = self.tx.send(VisualMsg::Clear);
    }
}

/// UI-side end: holds step events until the audio clock reaches them.
pub struct VisualSync<C> {
    rx: Receiver<VisualMsg>,
    queue: VisualQueue,
    clock: C,
}

/// Receiving end of a step channel, waiting for a clock.
pub struct StepReceiver {
    rx: Receiver<VisualMsg>,
}

impl StepReceiver {
    /// Start releasing steps against `clock`.
    pub fn with_clock<C: AudioClock>(self, clock: C) -> VisualSync<C> {
        VisualSync { rx: self.rx, queue: VisualQueue::new(), clock }
    }
}

/// A step channel whose consumer gets its clock later.
pub fn step_channel() -> (StepSender, StepReceiver) {
    let (tx, rx) = unbounded();
    (StepSender { tx }, StepReceiver { rx })
}

/// Create a connected sender/consumer pair reading time from `clock`.
pub fn visual_channel<C: AudioClock>(clock: C) -> (StepSender, VisualSync<C>) {
    let (tx, rx) = step_channel();
    (tx, rx.with_clock(clock))
}

impl<C: AudioClock> VisualSync<C> {
    /// Report due steps to `on_change`; `None` means the transport was reset.
    ///
    /// While `playing` is false nothing but a pending reset is reported.
    pub fn poll(&mut self, playing: bool, on_change: impl FnMut(Option<&StepEvent>)) -> usize {
        for msg in self.rx.try_iter() {
            match msg {
                VisualMsg::Step(step) => self.queue.push(step),
                VisualMsg::Clear => self.queue.clear(),
            }
        }
        let now = if playing { self.clock.now() } else { f64::NEG_INFINITY };
        self.queue.drain_due(now, on_change)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}
