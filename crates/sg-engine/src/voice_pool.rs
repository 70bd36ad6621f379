//! VoicePool: fixed per-track voice allocation.

use heapless::Vec as FixedVec;
use sg_ir::NodeId;

use crate::sink::GraphSink;
use crate::voice::Voice;

/// Maximum notes sounding at once on one track.
pub const MAX_VOICES_PER_OSC: usize = 8;

/// A track's voices, built once at initialization.
///
/// There is no stealing: when every voice is busy, `allocate` returns
/// `None` and the note is dropped.
#[derive(Clone, Debug)]
pub struct VoicePool {
    voices: FixedVec<Voice, MAX_VOICES_PER_OSC>,
}

impl VoicePool {
    /// Build a pool from (oscillator, gain) node pairs; extra pairs are ignored.
    pub fn new(nodes: &[(NodeId, NodeId)], release_margin: f64) -> Self {
        let mut voices = FixedVec::new();
        for &(osc, gain) in nodes.iter().take(MAX_VOICES_PER_OSC) {
            // capacity checked by take()
            let _ = voices.push(Voice::new(osc, gain, release_margin));
        }
        Self { voices }
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// First voice free at audio time `t`.
    pub fn allocate(&mut self, t: f64) -> Option<&mut Voice> {
        self.voices.iter_mut().find(|v| v.is_available(t))
    }

    /// Voices that are busy at `t`.
    pub fn sounding_count(&self, t: f64) -> usize {
        self.voices.iter().filter(|v| !v.is_available(t)).count()
    }

    /// Hard-stop every voice.
    pub fn silence_all<G: GraphSink + ?Sized>(&mut self, now: f64, graph: &mut G) {
        for voice in self.voices.iter_mut() {
            voice.silence(now, graph);
        }
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::RecordingGraph;
    use crate::voice::DEFAULT_RELEASE_MARGIN;
    use sg_ir::{Adsr, OscillatorSettings};

    fn pool() -> VoicePool {
        let nodes: Vec<(NodeId, NodeId)> = (0..MAX_VOICES_PER_OSC as NodeId).map(|i| (2 * i, 2 * i + 1)).collect();
        VoicePool::new(&nodes, DEFAULT_RELEASE_MARGIN)
    }

    #[test]
    fn new_pool_is_fully_free() {
        let p = pool();
        assert_eq!(p.len(), MAX_VOICES_PER_OSC);
        assert_eq!(p.sounding_count(0.0), 0);
    }

    #[test]
    fn ninth_note_is_dropped() {
        let mut g = RecordingGraph::default();
        let mut p = pool();
        let c4 = "C4".parse().unwrap();
        for _ in 0..MAX_VOICES_PER_OSC {
            let v = p.allocate(1.0).expect("free voice");
            v.on(c4, 0, 1.0, 1.0, &mut g);
            v.off(2.0, &mut g);
        }
        assert!(p.allocate(1.0).is_none());
        assert_eq!(p.sounding_count(1.0), MAX_VOICES_PER_OSC);
    }

    #[test]
    fn voices_return_after_release() {
        let mut g = RecordingGraph::default();
        let mut p = pool();
        let settings = OscillatorSettings { adsr: Adsr { release: 0.5, ..Adsr::default() }, ..Default::default() };
        for _ in 0..MAX_VOICES_PER_OSC {
            let v = p.allocate(0.0).unwrap();
            v.update(&settings, &mut g);
            v.on("E4".parse().unwrap(), 0, 0.0, 1.0, &mut g);
            v.off(1.0, &mut g);
        }
        assert!(p.allocate(1.55).is_none());
        assert!(p.allocate(1.7).is_some());
        assert_eq!(p.sounding_count(1.7), 0);
    }

    #[test]
    fn allocation_takes_first_free() {
        let mut g = RecordingGraph::default();
        let mut p = pool();
        let v = p.allocate(0.0).unwrap();
        v.on("C4".parse().unwrap(), 0, 0.0, 1.0, &mut g);
        v.off(10.0, &mut g);
        assert_eq!(p.allocate(0.0).unwrap().osc_node(), 2);
    }

    #[test]
    fn silence_all_frees_everything() {
        let mut g = RecordingGraph::default();
        let mut p = pool();
        while let Some(v) = p.allocate(0.0) {
            v.on("C4".parse().unwrap(), 0, 0.0, 1.0, &mut g);
            v.off(5.0, &mut g);
        }
        p.silence_all(1.0, &mut g);
        assert_eq!(p.sounding_count(1.0), 0);
    }
}
