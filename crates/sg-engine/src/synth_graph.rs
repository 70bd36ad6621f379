//! Static construction of the synth's audio graph.
//!
//! The graph is built once per session from a patch; afterwards only
//! parameters change (see `fx::FxController`). Everything is mono and
//! ends in a master gain feeding the destination.

use sg_ir::{AudioGraph, NodeId, NodeKind, Param, Patch};

use crate::fx::distortion_gains;
use crate::voice_pool::{VoicePool, MAX_VOICES_PER_OSC};

/// Metronome click pitch, in Hz.
pub const CLICK_FREQ: f32 = 1000.0;
/// Level of the metronome bus into the master.
pub const METRONOME_LEVEL: f32 = 0.5;

/// Nodes belonging to one oscillator track.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackNodes {
    /// (oscillator, envelope gain) per voice.
    pub voices: Vec<(NodeId, NodeId)>,
    pub gain: NodeId,
    pub filter: NodeId,
    pub delay_send: NodeId,
    pub disto_send: NodeId,
    pub reverb_send: NodeId,
}

/// Shared effect-return nodes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FxNodes {
    pub delay_input: NodeId,
    pub delay: NodeId,
    pub delay_feedback: NodeId,
    pub disto_input: NodeId,
    pub shaper: NodeId,
    pub disto_output: NodeId,
    pub reverb_input: NodeId,
    pub reverb_wet: NodeId,
    pub convolver: NodeId,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClickNodes {
    pub osc: NodeId,
    pub gain: NodeId,
    pub bus: NodeId,
}

/// The built graph plus handles to every node the engine drives.
#[derive(Clone, Debug)]
pub struct SynthGraph {
    pub graph: AudioGraph,
    pub master: NodeId,
    pub tracks: Vec<TrackNodes>,
    pub fx: FxNodes,
    pub click: ClickNodes,
}

impl SynthGraph {
    /// Build the graph for `patch`'s tracks, with parameters at their patch values.
    pub fn build(patch: &Patch) -> Self {
        let patch = patch.sanitized();
        let mut g = AudioGraph::with_destination();
        let t = &patch.transport;
        let fx = &patch.fx;

        let master = g.add_node_with(NodeKind::Gain, &[(Param::Gain, t.master_volume)]);
        g.connect(master, 0);

        let click_osc = g.add_node_with(NodeKind::Oscillator, &[(Param::Frequency, CLICK_FREQ)]);
        let click_gain = g.add_node_with(NodeKind::Gain, &[(Param::Gain, 0.0)]);
        let bus = g.add_node_with(NodeKind::Gain, &[(Param::Gain, METRONOME_LEVEL)]);
        g.connect(click_osc, click_gain);
        g.connect(click_gain, bus);
        g.connect(bus, master);

        let delay_input = g.add_node_with(NodeKind::Gain, &[(Param::Gain, 1.0)]);
        let delay = g.add_node_with(NodeKind::Delay, &[(Param::DelayTime, fx.delay.time / 1000.0)]);
        let delay_feedback = g.add_node_with(NodeKind::Gain, &[(Param::Gain, fx.delay.feedback)]);
        g.connect(delay_input, delay);
        g.connect(delay, delay_feedback);
        g.connect(delay_feedback, delay);
        g.connect(delay, master);

        let (boost, atten) = distortion_gains(&fx.distortion);
        let disto_input = g.add_node_with(NodeKind::Gain, &[(Param::Gain, boost)]);
        let shaper = g.add_node(NodeKind::WaveShaper);
        let disto_output = g.add_node_with(NodeKind::Gain, &[(Param::Gain, atten)]);
        g.connect(disto_input, shaper);
        g.connect(shaper, disto_output);
        g.connect(disto_output, master);

        let reverb_input = g.add_node_with(NodeKind::Gain, &[(Param::Gain, 1.0)]);
        let reverb_wet =
            g.add_node_with(NodeKind::Gain, &[(Param::Gain, fx.reverb.depth * fx.reverb.gain)]);
        let convolver = g.add_node(NodeKind::Convolver);
        g.connect(reverb_input, reverb_wet);
        g.connect(reverb_wet, convolver);
        g.connect(convolver, master);

        let tracks = patch
            .oscillators
            .iter()
            .take(patch.track_count())
            .map(|osc| {
                let gain = g.add_node_with(NodeKind::Gain, &[(Param::Gain, osc.effective_volume())]);
                let filter = g.add_node_with(
                    NodeKind::Filter,
                    &[(Param::Frequency, osc.filter.freq), (Param::Q, osc.filter.q())],
                );
                let voices = (0..MAX_VOICES_PER_OSC)
                    .map(|_| {
                        let o = g.add_node(NodeKind::Oscillator);
                        let v = g.add_node_with(NodeKind::Gain, &[(Param::Gain, 0.0)]);
                        g.connect(o, v);
                        g.connect(v, gain);
                        (o, v)
                    })
                    .collect();
                g.connect(gain, filter);
                g.connect(filter, master);

                let mut send = |level: f32, to: NodeId| {
                    let s = g.add_node_with(NodeKind::Gain, &[(Param::Gain, level)]);
                    g.connect(filter, s);
                    g.connect(s, to);
                    s
                };
                let delay_send = send(osc.sends.delay, delay_input);
                let disto_send = send(osc.sends.disto, disto_input);
                let reverb_send = send(osc.sends.reverb, reverb_input);

                TrackNodes { voices, gain, filter, delay_send, disto_send, reverb_send }
            })
            .collect();

        Self {
            graph: g,
            master,
            tracks,
            fx: FxNodes {
                delay_input,
                delay,
                delay_feedback,
                disto_input,
                shaper,
                disto_output,
                reverb_input,
                reverb_wet,
                convolver,
            },
            click: ClickNodes { osc: click_osc, gain: click_gain, bus },
        }
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// One voice pool per track, driving that track's voice nodes.
    pub fn voice_pools(&self, release_margin: f64) -> Vec<VoicePool> {
        self.tracks.iter().map(|t| VoicePool::new(&t.voices, release_margin)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::topological_sort;
    use sg_ir::NUM_TRACKS;

    fn default_of(g: &AudioGraph, id: NodeId, param: Param) -> Option<f32> {
        g.node(id)?.defaults.iter().find(|(p, _)| *p == param).map(|(_, v)| *v)
    }

    #[test]
    fn one_pool_of_eight_per_track() {
        let sg = SynthGraph::build(&Patch::default());
        assert_eq!(sg.track_count(), NUM_TRACKS);
        let pools = sg.voice_pools(0.1);
        assert_eq!(pools.len(), NUM_TRACKS);
        assert!(pools.iter().all(|p| p.len() == MAX_VOICES_PER_OSC));
    }

    #[test]
    fn tracks_route_through_filter_and_sends() {
        let sg = SynthGraph::build(&Patch::default());
        let g = &sg.graph;
        let t = &sg.tracks[0];
        let (_, voice_gain) = t.voices[0];
        assert!(g.inputs_of(t.gain).any(|n| n == voice_gain));
        assert!(g.inputs_of(t.filter).any(|n| n == t.gain));
        assert!(g.inputs_of(sg.master).any(|n| n == t.filter));
        assert!(g.inputs_of(sg.fx.delay_input).any(|n| n == t.delay_send));
        assert!(g.inputs_of(sg.fx.disto_input).any(|n| n == t.disto_send));
        assert!(g.inputs_of(sg.fx.reverb_input).any(|n| n == t.reverb_send));
        assert_eq!(default_of(g, voice_gain, Param::Gain), Some(0.0));
    }

    #[test]
    fn initial_parameters_follow_the_patch() {
        let patch = Patch::default().edit(|p| {
            p.transport.master_volume = 0.3;
            p.oscillators[1].muted = true;
            p.oscillators[2].filter.res = 1.0;
            p.fx.delay.time = 250.0;
        });
        let sg = SynthGraph::build(&patch);
        let g = &sg.graph;
        assert_eq!(default_of(g, sg.master, Param::Gain), Some(0.3));
        assert_eq!(default_of(g, sg.tracks[1].gain, Param::Gain), Some(0.0));
        let q = default_of(g, sg.tracks[2].filter, Param::Q).unwrap();
        assert!((q - 20.1).abs() < 1e-4);
        assert_eq!(default_of(g, sg.fx.delay, Param::DelayTime), Some(0.25));
    }

    #[test]
    fn graph_sorts_despite_delay_feedback() {
        let sg = SynthGraph::build(&Patch::default());
        let order = topological_sort(&sg.graph);
        assert_eq!(order.len(), sg.graph.nodes.len());
        assert_eq!(order.last(), Some(&0));
        let pos = |id: NodeId| order.iter().position(|&i| i == id as usize).unwrap();
        assert!(pos(sg.fx.delay) < pos(sg.fx.delay_feedback));
        assert!(pos(sg.master) < pos(0));
    }
}
