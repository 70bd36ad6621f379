//! Timestamped parameter automation.
//!
//! `ParamTimeline` is the value-over-time model behind every automatable
//! node parameter: immediate sets, linear and exponential ramps, and
//! exponential approaches toward a target. Times are absolute audio-clock
//! seconds.

use serde::{Deserialize, Serialize};

/// Smallest magnitude an exponential ramp may start or end at.
const EXP_FLOOR: f32 = 1e-4;

/// A single automation event.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Automation {
    /// Jump to `value` at `time`.
    SetValue { value: f32, time: f64 },
    /// Linear ramp from the previous event, arriving at `value` at `end_time`.
    LinearRamp { value: f32, end_time: f64 },
    /// Exponential ramp from the previous event, arriving at `value` at `end_time`.
    ExponentialRamp { value: f32, end_time: f64 },
    /// Approach `target` from `start` with time-constant `time_constant`.
    SetTarget { target: f32, start: f64, time_constant: f64 },
}

impl Automation {
    /// The time the event is keyed on.
    pub fn time(&self) -> f64 {
        match *self {
            Automation::SetValue { time, .. } => time,
            Automation::LinearRamp { end_time, .. } => end_time,
            Automation::ExponentialRamp { end_time, .. } => end_time,
            Automation::SetTarget { start, .. } => start,
        }
    }
}

/// Ongoing set-target approach.
#[derive(Clone, Copy, Debug)]
struct Approach {
    from: f32,
    target: f32,
    start: f64,
    time_constant: f64,
}

impl Approach {
    fn value_at(&self, t: f64) -> f32 {
        if self.time_constant <= 0.0 {
            return self.target;
        }
        let k = libm::exp(-(t - self.start).max(0.0) / self.time_constant) as f32;
        self.target + (self.from - self.target) * k
    }
}

/// A parameter's automation curve.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamTimeline {
    /// Value in effect before the first remaining event.
    base: f32,
    /// Time `base` was reached.
    base_time: f64,
    /// Events sorted by `time()`; ties keep insertion order.
    events: Vec<Automation>,
}

impl ParamTimeline {
    pub fn new(value: f32) -> Self {
        Self { base: value, base_time: 0.0, events: Vec::new() }
    }

    /// A timeline that can hold `capacity` events before reallocating.
    pub fn with_capacity(value: f32, capacity: usize) -> Self {
        Self { base: value, base_time: 0.0, events: Vec::with_capacity(capacity) }
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Insert an event, keeping time order.
    pub fn push(&mut self, event: Automation) {
        let t = event.time();
        let pos = self.events.partition_point(|e| e.time() <= t);
        self.events.insert(pos, event);
    }

    /// Drop every event keyed at or after `time`.
    pub fn cancel_scheduled(&mut self, time: f64) {
        self.events.retain(|e| e.time() < time);
    }

    /// Freeze the curve at whatever value it has at `time`, dropping later events.
    ///
    /// A ramp still running at `time` is cut short rather than removed: it
    /// keeps its shape and ends at the held value at `time`.
    pub fn cancel_and_hold(&mut self, time: f64) {
        let held = self.value_at(time);
        let running = self.events.iter().find(|e| e.time() > time).copied();
        self.events.retain(|e| e.time() <= time);
        let hold = match running {
            Some(Automation::LinearRamp { .. }) => Automation::LinearRamp { value: held, end_time: time },
            Some(Automation::ExponentialRamp { .. }) => Automation::ExponentialRamp { value: held, end_time: time },
            _ => Automation::SetValue { value: held, time },
        };
        self.push(hold);
    }

    /// Value of the parameter at `t`.
    pub fn value_at(&self, t: f64) -> f32 {
        evaluate(self.base, self.base_time, &self.events, t)
    }

    /// Fold events that lie entirely before `t` into the base value.
    ///
    /// Keeps evaluation cheap for long-lived parameters. Never allocates.
    pub fn retire(&mut self, t: f64) {
        let done = self.events.partition_point(|e| e.time() <= t);
        if done == 0 {
            return;
        }
        let anchor = self.events[done - 1];
        let at = anchor.time();
        if let Automation::SetTarget { .. } = anchor {
            // The approach is still running: keep it, rebase on its start value.
            let from = evaluate(self.base, self.base_time, &self.events[..done - 1], at);
            self.events.drain(..done - 1);
            self.base = from;
        } else {
            let end = evaluate(self.base, self.base_time, &self.events[..done], at);
            self.events.drain(..done);
            self.base = end;
        }
        self.base_time = at;
    }
}

/// Evaluate `events` (sorted) at `t`, starting from `base` reached at `base_time`.
fn evaluate(base: f32, base_time: f64, events: &[Automation], t: f64) -> f32 {
    let mut value = base;
    let mut time = base_time;
    let mut approach: Option<Approach> = None;

    for event in events {
        if event.time() > t {
            return match *event {
                Automation::LinearRamp { value: end, end_time } => {
                    let span = end_time - time;
                    if span <= 0.0 {
                        end
                    } else {
                        let x = ((t - time) / span) as f32;
                        value + (end - value) * x.clamp(0.0, 1.0)
                    }
                }
                Automation::ExponentialRamp { value: end, end_time } => {
                    let span = (end_time - time).max(1e-12);
                    exponential(value, end, ((t - time) / span) as f32)
                }
                _ => approach.map_or(value, |a| a.value_at(t)),
            };
        }

        // The event has started; fold it into the running state.
        match *event {
            Automation::SetValue { value: v, time: at } => {
                value = v;
                time = at;
                approach = None;
            }
            Automation::LinearRamp { value: v, end_time }
            | Automation::ExponentialRamp { value: v, end_time } => {
                value = v;
                time = end_time;
                approach = None;
            }
            Automation::SetTarget { target, start, time_constant } => {
                let from = approach.map_or(value, |a| a.value_at(start));
                approach = Some(Approach { from, target, start, time_constant });
                value = from;
                time = start;
            }
        }
    }

    approach.map_or(value, |a| a.value_at(t))
}

/// Exponential interpolation; falls back to a hold when the endpoints
/// straddle or touch zero.
fn exponential(from: f32, to: f32, x: f32) -> f32 {
    let x = x.clamp(0.0, 1.0);
    if from.abs() < EXP_FLOOR || to.abs() < EXP_FLOOR || (from < 0.0) != (to < 0.0) {
        return from;
    }
    from * libm::powf(to / from, x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn constant_without_events() {
        let p = ParamTimeline::new(0.3);
        assert_eq!(p.value_at(0.0), 0.3);
        assert_eq!(p.value_at(100.0), 0.3);
    }

    #[test]
    fn set_value_then_linear_ramp() {
        let mut p = ParamTimeline::new(0.0);
        p.push(Automation::SetValue { value: 0.0, time: 1.0 });
        p.push(Automation::LinearRamp { value: 1.0, end_time: 2.0 });
        assert!(close(p.value_at(0.5), 0.0));
        assert!(close(p.value_at(1.5), 0.5));
        assert!(close(p.value_at(2.0), 1.0));
        assert!(close(p.value_at(3.0), 1.0));
    }

    #[test]
    fn attack_decay_shape() {
        let mut p = ParamTimeline::new(0.0);
        p.push(Automation::SetValue { value: 0.0, time: 0.0 });
        p.push(Automation::LinearRamp { value: 1.0, end_time: 0.1 });
        p.push(Automation::LinearRamp { value: 0.5, end_time: 0.3 });
        assert!(close(p.value_at(0.05), 0.5));
        assert!(close(p.value_at(0.1), 1.0));
        assert!(close(p.value_at(0.2), 0.75));
        assert!(close(p.value_at(1.0), 0.5));
    }

    #[test]
    fn set_target_approaches_exponentially() {
        let mut p = ParamTimeline::new(1.0);
        p.push(Automation::SetTarget { target: 0.0, start: 1.0, time_constant: 0.1 });
        assert!(close(p.value_at(1.0), 1.0));
        let one_tau = p.value_at(1.1);
        assert!((one_tau - (-1.0f32).exp()).abs() < 1e-3);
        assert!(p.value_at(2.0) < 1e-4);
    }

    #[test]
    fn exponential_ramp_midpoint_is_geometric_mean() {
        let mut p = ParamTimeline::new(1.0);
        p.push(Automation::SetValue { value: 1.0, time: 0.0 });
        p.push(Automation::ExponentialRamp { value: 0.01, end_time: 1.0 });
        assert!(close(p.value_at(0.5), 0.1));
    }

    #[test]
    fn cancel_and_hold_freezes_mid_ramp() {
        let mut p = ParamTimeline::new(0.0);
        p.push(Automation::SetValue { value: 0.0, time: 0.0 });
        p.push(Automation::LinearRamp { value: 1.0, end_time: 1.0 });
        p.cancel_and_hold(0.25);
        assert!(close(p.value_at(0.25), 0.25));
        assert!(close(p.value_at(5.0), 0.25));
    }

    #[test]
    fn cancel_and_hold_keeps_ramp_running_until_cut() {
        let mut p = ParamTimeline::new(0.0);
        p.push(Automation::SetValue { value: 0.0, time: 0.0 });
        p.push(Automation::LinearRamp { value: 1.0, end_time: 1.0 });
        p.cancel_and_hold(0.5);
        assert!(close(p.value_at(0.1), 0.1));
        assert!(close(p.value_at(0.4), 0.4));
        assert!(close(p.value_at(0.4999), 0.4999));
        assert!(close(p.value_at(0.5), 0.5));
        assert!(close(p.value_at(2.0), 0.5));
    }

    #[test]
    fn cancel_and_hold_cuts_second_segment() {
        // attack to 1.0 by 0.1, decay to 0.5 by 0.3, cut at 0.2
        let mut p = ParamTimeline::new(0.0);
        p.push(Automation::SetValue { value: 0.0, time: 0.0 });
        p.push(Automation::LinearRamp { value: 1.0, end_time: 0.1 });
        p.push(Automation::LinearRamp { value: 0.5, end_time: 0.3 });
        p.cancel_and_hold(0.2);
        assert!(close(p.value_at(0.05), 0.5));
        assert!(close(p.value_at(0.1), 1.0));
        assert!(close(p.value_at(0.15), 0.875));
        assert!(close(p.value_at(0.2), 0.75));
        assert!(close(p.value_at(1.0), 0.75));
    }

    #[test]
    fn cancel_and_hold_truncates_exponential_ramp() {
        let mut p = ParamTimeline::new(1.0);
        p.push(Automation::SetValue { value: 1.0, time: 0.0 });
        p.push(Automation::ExponentialRamp { value: 0.01, end_time: 1.0 });
        let quarter = p.value_at(0.25);
        p.cancel_and_hold(0.5);
        assert!(close(p.value_at(0.25), quarter));
        assert!(close(p.value_at(0.5), 0.1));
        assert!(close(p.value_at(3.0), 0.1));
    }

    #[test]
    fn cancel_and_hold_at_ramp_end_keeps_ramp() {
        let mut p = ParamTimeline::new(0.0);
        p.push(Automation::SetValue { value: 0.0, time: 0.0 });
        p.push(Automation::LinearRamp { value: 1.0, end_time: 1.0 });
        p.push(Automation::LinearRamp { value: 0.0, end_time: 2.0 });
        p.cancel_and_hold(1.0);
        assert!(close(p.value_at(0.5), 0.5));
        assert!(close(p.value_at(1.0), 1.0));
        assert!(close(p.value_at(1.5), 1.0));
    }

    #[test]
    fn cancel_scheduled_drops_future_only() {
        let mut p = ParamTimeline::new(0.0);
        p.push(Automation::SetValue { value: 0.5, time: 1.0 });
        p.push(Automation::SetValue { value: 0.9, time: 2.0 });
        p.cancel_scheduled(1.5);
        assert_eq!(p.len(), 1);
        assert!(close(p.value_at(3.0), 0.5));
    }

    #[test]
    fn equal_times_keep_insertion_order() {
        let mut p = ParamTimeline::new(0.0);
        p.push(Automation::SetValue { value: 0.2, time: 1.0 });
        p.push(Automation::SetValue { value: 0.7, time: 1.0 });
        assert!(close(p.value_at(1.0), 0.7));
    }

    #[test]
    fn retire_preserves_values() {
        let mut p = ParamTimeline::new(0.0);
        p.push(Automation::SetValue { value: 0.0, time: 0.0 });
        p.push(Automation::LinearRamp { value: 1.0, end_time: 1.0 });
        p.push(Automation::LinearRamp { value: 0.0, end_time: 3.0 });
        let before = p.value_at(2.0);
        p.retire(1.5);
        assert_eq!(p.len(), 1);
        assert!(close(p.value_at(2.0), before));
    }

    #[test]
    fn retire_keeps_running_approach() {
        let mut p = ParamTimeline::new(0.8);
        p.push(Automation::SetTarget { target: 0.0, start: 1.0, time_constant: 0.5 });
        let before = p.value_at(1.7);
        p.retire(1.2);
        assert_eq!(p.len(), 1);
        assert!(close(p.value_at(1.7), before));
    }
}
