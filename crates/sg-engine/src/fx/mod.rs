//! Effects-chain and mixer parameter updates.
//!
//! `FxController` compares each patch snapshot with the last one it
//! applied and glides only the parameters that changed, using
//! set-target automation starting at the current audio time.

mod curve;
mod impulse;
mod worker;

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use sg_ir::{
    Automation, FilterSettings, FxState, GraphCommand, NodeId, Param, Patch, ReverbSettings, Sends,
};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::sink::GraphSink;
use crate::synth_graph::{FxNodes, SynthGraph, TrackNodes};

pub use curve::{distortion_curve, distortion_gains, CURVE_LEN};
pub use impulse::{generate as generate_impulse, IMPULSE_SECS};
pub use worker::{ReverbWorker, DEFAULT_DEBOUNCE};

/// Smoothing time constants, in seconds.
pub const MASTER_TC: f64 = 0.01;
pub const TRACK_TC: f64 = 0.01;
pub const SEND_TC: f64 = 0.02;
pub const FILTER_TC: f64 = 0.02;
pub const DELAY_TC: f64 = 0.02;
pub const DISTORTION_TC: f64 = 0.05;

#[derive(Clone, Debug, PartialEq, Error)]
pub enum FxError {
    #[error("reverb decay must be positive and finite, got {0}")]
    BadDecay(f32),
    #[error("sample rate must be non-zero")]
    ZeroSampleRate,
    #[error("reverb worker is not running")]
    WorkerGone,
}

/// The mixer-relevant part of one track.
#[derive(Clone, Copy, Debug, PartialEq)]
struct TrackMix {
    volume: f32,
    sends: Sends,
    filter: FilterSettings,
}

/// Everything the controller has pushed to the graph so far.
#[derive(Clone, Debug, PartialEq)]
struct Applied {
    master: f32,
    tracks: Vec<TrackMix>,
    fx: FxState,
}

impl Applied {
    fn of(patch: &Patch) -> Self {
        Self {
            master: patch.transport.master_volume,
            tracks: patch
                .oscillators
                .iter()
                .map(|o| TrackMix { volume: o.effective_volume(), sends: o.sends, filter: o.filter })
                .collect(),
            fx: patch.fx.clone(),
        }
    }
}

/// Applies patch changes to the mixer and effect nodes.
pub struct FxController {
    sample_rate: u32,
    master: NodeId,
    tracks: Vec<TrackNodes>,
    nodes: FxNodes,
    last: Option<Applied>,
    worker: Option<ReverbWorker>,
    rng: StdRng,
}

impl FxController {
    /// Controller for the nodes of `graph`.
    ///
    /// Without a worker, impulse responses are generated inline.
    pub fn new(graph: &SynthGraph, sample_rate: u32, worker: Option<ReverbWorker>, seed: Option<u64>) -> Self {
        Self {
            sample_rate,
            master: graph.master,
            tracks: graph.tracks.clone(),
            nodes: graph.fx,
            last: None,
            worker,
            rng: seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64),
        }
    }

    /// Forget what was applied; the next `apply` resends everything.
    pub fn invalidate(&mut self) {
        self.last = None;
    }

    /// Glide every parameter that differs from the last applied snapshot.
    pub fn apply<G: GraphSink + ?Sized>(&mut self, patch: &Patch, now: f64, graph: &mut G) {
        let next = Applied::of(patch);
        let prev = self.last.take();
        if prev.as_ref() == Some(&next) {
            self.last = prev;
            return;
        }

        let mut glide = |node: NodeId, param: Param, target: f32, tc: f64| {
            graph.send(GraphCommand::Automate {
                node,
                param,
                event: Automation::SetTarget { target, start: now, time_constant: tc },
            });
        };

        if prev.as_ref().map(|p| p.master) != Some(next.master) {
            glide(self.master, Param::Gain, next.master, MASTER_TC);
        }

        for (i, (nodes, mix)) in self.tracks.iter().zip(&next.tracks).enumerate() {
            let old = prev.as_ref().and_then(|p| p.tracks.get(i));
            if old.map(|o| o.volume) != Some(mix.volume) {
                glide(nodes.gain, Param::Gain, mix.volume, TRACK_TC);
            }
            if old.map(|o| o.sends.delay) != Some(mix.sends.delay) {
                glide(nodes.delay_send, Param::Gain, mix.sends.delay, SEND_TC);
            }
            if old.map(|o| o.sends.disto) != Some(mix.sends.disto) {
                glide(nodes.disto_send, Param::Gain, mix.sends.disto, SEND_TC);
            }
            if old.map(|o| o.sends.reverb) != Some(mix.sends.reverb) {
                glide(nodes.reverb_send, Param::Gain, mix.sends.reverb, SEND_TC);
            }
            if old.map(|o| o.filter.freq) != Some(mix.filter.freq) {
                glide(nodes.filter, Param::Frequency, mix.filter.freq, FILTER_TC);
            }
            if old.map(|o| o.filter.res) != Some(mix.filter.res) {
                glide(nodes.filter, Param::Q, mix.filter.q(), FILTER_TC);
            }
        }

        let old_fx = prev.as_ref().map(|p| &p.fx);
        let fx = &next.fx;

        if old_fx.map(|f| f.delay.time) != Some(fx.delay.time) {
            glide(self.nodes.delay, Param::DelayTime, fx.delay.time / 1000.0, DELAY_TC);
        }
        if old_fx.map(|f| f.delay.feedback) != Some(fx.delay.feedback) {
            glide(self.nodes.delay_feedback, Param::Gain, fx.delay.feedback, DELAY_TC);
        }

        let dist = &fx.distortion;
        if old_fx.map(|f| &f.distortion) != Some(dist) {
            let (boost, atten) = distortion_gains(dist);
            glide(self.nodes.disto_input, Param::Gain, boost, DISTORTION_TC);
            glide(self.nodes.disto_output, Param::Gain, atten, DISTORTION_TC);
        }
        if old_fx.map(|f| (f.distortion.depth, f.distortion.model)) != Some((dist.depth, dist.model)) {
            let curve: Arc<[f32]> = Arc::from(distortion_curve(dist.depth, dist.model));
            graph.send(GraphCommand::SetCurve { node: self.nodes.shaper, curve });
        }

        let rev = &fx.reverb;
        if old_fx.map(|f| f.reverb.depth * f.reverb.gain) != Some(rev.depth * rev.gain) {
            graph.send(GraphCommand::Automate {
                node: self.nodes.reverb_wet,
                param: Param::Gain,
                event: Automation::SetTarget { target: rev.depth * rev.gain, start: now, time_constant: SEND_TC },
            });
        }
        if old_fx.map(|f| (f.reverb.model, f.reverb.time)) != Some((rev.model, rev.time)) {
            self.regenerate(rev, graph);
        }

        debug!(first = prev.is_none(), "applied mixer and effect changes");
        self.last = Some(next);
    }

    fn regenerate<G: GraphSink + ?Sized>(&mut self, rev: &ReverbSettings, graph: &mut G) {
        if let Some(worker) = &self.worker {
            if let Err(e) = worker.request(rev.model, rev.time) {
                warn!("could not queue reverb regeneration: {e}");
            }
            return;
        }
        match generate_impulse(rev.model, rev.time, self.sample_rate, &mut self.rng) {
            Ok(ir) => graph.send(GraphCommand::SetImpulse { node: self.nodes.convolver, impulse: Arc::new(ir) }),
            Err(e) => error!("reverb regeneration failed, keeping previous impulse: {e}"),
        }
    }

    /// Install an impulse response the worker has finished, if any.
    pub fn poll<G: GraphSink + ?Sized>(&mut self, graph: &mut G) -> bool {
        let Some(ir) = self.worker.as_ref().and_then(|w| w.try_recv()) else {
            return false;
        };
        graph.send(GraphCommand::SetImpulse { node: self.nodes.convolver, impulse: ir });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::RecordingGraph;
    use sg_ir::{DistortionModel, ReverbModel};

    fn controller(patch: &Patch) -> (SynthGraph, FxController) {
        let sg = SynthGraph::build(patch);
        let fx = FxController::new(&sg, 1_000, None, Some(4));
        (sg, fx)
    }

    fn targets(rec: &RecordingGraph, node: NodeId, param: Param) -> Vec<(f32, f64)> {
        rec.commands
            .iter()
            .filter_map(|c| match c {
                GraphCommand::Automate {
                    node: n,
                    param: p,
                    event: Automation::SetTarget { target, time_constant, .. },
                } if *n == node && *p == param => Some((*target, *time_constant)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn first_apply_sends_everything() {
        let patch = Patch::default();
        let (sg, mut fx) = controller(&patch);
        let mut rec = RecordingGraph::default();
        fx.apply(&patch, 0.0, &mut rec);
        assert_eq!(targets(&rec, sg.master, Param::Gain), vec![(0.8, MASTER_TC)]);
        assert!(rec.commands.iter().any(|c| matches!(c, GraphCommand::SetCurve { .. })));
        assert!(rec.commands.iter().any(|c| matches!(c, GraphCommand::SetImpulse { .. })));
        assert_eq!(targets(&rec, sg.tracks[2].filter, Param::Q).len(), 1);
    }

    #[test]
    fn unchanged_patch_sends_nothing() {
        let patch = Patch::default();
        let (_, mut fx) = controller(&patch);
        let mut rec = RecordingGraph::default();
        fx.apply(&patch, 0.0, &mut rec);
        rec.commands.clear();
        fx.apply(&patch, 1.0, &mut rec);
        assert!(rec.commands.is_empty());
    }

    #[test]
    fn resonance_maps_to_cubic_q() {
        let patch = Patch::default();
        let (sg, mut fx) = controller(&patch);
        let mut rec = RecordingGraph::default();
        fx.apply(&patch, 0.0, &mut rec);
        rec.commands.clear();

        fx.apply(&patch.edit(|p| p.oscillators[1].filter.res = 0.5), 2.0, &mut rec);
        let q = targets(&rec, sg.tracks[1].filter, Param::Q);
        assert_eq!(q.len(), 1);
        assert!((q[0].0 - 2.6).abs() < 1e-5);
        assert_eq!(q[0].1, FILTER_TC);
        assert_eq!(rec.commands.len(), 1);
    }

    #[test]
    fn muting_glides_track_to_zero() {
        let patch = Patch::default();
        let (sg, mut fx) = controller(&patch);
        let mut rec = RecordingGraph::default();
        fx.apply(&patch, 0.0, &mut rec);
        rec.commands.clear();
        fx.apply(&patch.edit(|p| p.oscillators[0].muted = true), 1.0, &mut rec);
        assert_eq!(targets(&rec, sg.tracks[0].gain, Param::Gain), vec![(0.0, TRACK_TC)]);
    }

    #[test]
    fn effect_changes_use_their_time_constants() {
        let patch = Patch::default();
        let (sg, mut fx) = controller(&patch);
        let mut rec = RecordingGraph::default();
        fx.apply(&patch, 0.0, &mut rec);
        rec.commands.clear();

        let next = patch.edit(|p| {
            p.fx.delay.time = 400.0;
            p.fx.distortion.level = 0.5;
            p.oscillators[0].sends.reverb = 0.7;
        });
        fx.apply(&next, 1.0, &mut rec);
        assert_eq!(targets(&rec, sg.fx.delay, Param::DelayTime), vec![(0.4, DELAY_TC)]);
        assert_eq!(targets(&rec, sg.fx.disto_output, Param::Gain).len(), 1);
        assert_eq!(targets(&rec, sg.fx.disto_output, Param::Gain)[0].1, DISTORTION_TC);
        assert_eq!(targets(&rec, sg.tracks[0].reverb_send, Param::Gain), vec![(0.7, SEND_TC)]);
        // level alone reshapes nothing
        assert!(!rec.commands.iter().any(|c| matches!(c, GraphCommand::SetCurve { .. })));
    }

    #[test]
    fn reverb_depth_only_touches_wet_gain() {
        let patch = Patch::default();
        let (sg, mut fx) = controller(&patch);
        let mut rec = RecordingGraph::default();
        fx.apply(&patch, 0.0, &mut rec);
        rec.commands.clear();

        let deeper = patch.edit(|p| p.fx.reverb.depth = 0.9);
        fx.apply(&deeper, 1.0, &mut rec);
        assert_eq!(rec.commands.len(), 1);
        assert_eq!(targets(&rec, sg.fx.reverb_wet, Param::Gain).len(), 1);

        rec.commands.clear();
        fx.apply(&deeper.edit(|p| p.fx.reverb.model = ReverbModel::Abyss), 2.0, &mut rec);
        assert!(matches!(rec.commands.as_slice(), [GraphCommand::SetImpulse { .. }]));
    }

    #[test]
    fn distortion_model_swaps_curve() {
        let patch = Patch::default();
        let (_, mut fx) = controller(&patch);
        let mut rec = RecordingGraph::default();
        fx.apply(&patch, 0.0, &mut rec);
        rec.commands.clear();
        fx.apply(&patch.edit(|p| p.fx.distortion.model = DistortionModel::Crush), 1.0, &mut rec);
        let curves = rec.commands.iter().filter(|c| matches!(c, GraphCommand::SetCurve { .. })).count();
        assert_eq!(curves, 1);
    }

    #[test]
    fn worker_results_are_installed_on_poll() {
        let patch = Patch::default();
        let sg = SynthGraph::build(&patch);
        let worker = ReverbWorker::spawn(1_000, std::time::Duration::from_millis(5), Some(2)).unwrap();
        let mut fx = FxController::new(&sg, 1_000, Some(worker), None);
        let mut rec = RecordingGraph::default();
        fx.apply(&patch, 0.0, &mut rec);
        assert!(!rec.commands.iter().any(|c| matches!(c, GraphCommand::SetImpulse { .. })));

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while !fx.poll(&mut rec) && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(matches!(rec.commands.last(), Some(GraphCommand::SetImpulse { .. })));
    }
}
