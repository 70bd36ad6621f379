//! Software renderer for the synth's audio graph.
//!
//! Processes the graph one sample at a time in topological order. Edges
//! into delay nodes are left out of the ordering, which is what lets the
//! delay feedback loop exist: a delay emits from its buffer first and
//! takes its input after every other node has run.
//!
//! Once built, `render` and `apply` do not allocate as long as each
//! parameter stays within its preallocated event capacity. Replaced
//! curves and impulse responses are parked in a fixed-size queue so the
//! owner can drop them off the audio thread.

mod convolver;
mod node;

use std::sync::Arc;

use heapless::Deque;
use sg_ir::{AudioGraph, GraphCommand, ImpulseResponse, NodeId, NodeKind};

use crate::frame::Frame;
use crate::sink::GraphSink;

pub use convolver::{BLOCK as CONVOLVER_BLOCK, MAX_IMPULSE_SECS};
use node::NodeState;

/// Replaced shared data waiting to be dropped off the audio thread.
#[derive(Debug)]
pub enum Retired {
    Curve(Arc<[f32]>),
    Impulse(Arc<ImpulseResponse>),
}

const RETIRED_CAPACITY: usize = 16;

/// Renders an `AudioGraph` driven by `GraphCommand`s.
pub struct Renderer {
    sample_rate: u32,
    /// Frames rendered so far; the renderer's notion of "now".
    frame: u64,
    nodes: Vec<NodeState>,
    /// Input node indices per node.
    inputs: Vec<Vec<usize>>,
    /// Traversal order (sources first, destination last).
    order: Vec<usize>,
    delays: Vec<usize>,
    outputs: Vec<f32>,
    retired: Deque<Retired, RETIRED_CAPACITY>,
}

impl Renderer {
    pub fn new(graph: &AudioGraph, sample_rate: u32) -> Self {
        let n = graph.nodes.len();
        let nodes = graph.nodes.iter().map(|node| NodeState::new(node.kind, &node.defaults, sample_rate)).collect();
        let mut inputs = vec![Vec::new(); n];
        for conn in &graph.connections {
            if (conn.to as usize) < n && (conn.from as usize) < n {
                inputs[conn.to as usize].push(conn.from as usize);
            }
        }
        let delays = graph
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.kind == NodeKind::Delay)
            .map(|(i, _)| i)
            .collect();

        Self {
            sample_rate,
            frame: 0,
            nodes,
            inputs,
            order: topological_sort(graph),
            delays,
            outputs: vec![0.0; n],
            retired: Deque::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Audio time of the next frame to be rendered, in seconds.
    pub fn now(&self) -> f64 {
        self.frame as f64 / self.sample_rate as f64
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frame
    }

    /// Apply one command. Commands for unknown nodes or parameters are ignored.
    pub fn apply(&mut self, cmd: GraphCommand) {
        let Some(node) = self.nodes.get_mut(cmd.node() as usize) else {
            return;
        };
        match cmd {
            GraphCommand::Automate { param, event, .. } => {
                if let Some(tl) = node.param_mut(param) {
                    tl.push(event);
                }
            }
            GraphCommand::CancelScheduled { param, time, .. } => {
                if let Some(tl) = node.param_mut(param) {
                    tl.cancel_scheduled(time);
                }
            }
            GraphCommand::CancelAndHold { param, time, .. } => {
                if let Some(tl) = node.param_mut(param) {
                    tl.cancel_and_hold(time);
                }
            }
            GraphCommand::SetWaveform { wave, .. } => {
                if let NodeState::Oscillator(osc) = node {
                    osc.wave = wave;
                }
            }
            GraphCommand::SetCurve { curve, .. } => {
                if let NodeState::WaveShaper { curve: slot } = node {
                    if let Some(old) = slot.replace(curve) {
                        self.retire(Retired::Curve(old));
                    }
                }
            }
            GraphCommand::SetImpulse { impulse, .. } => {
                if let NodeState::Convolver(conv) = node {
                    conv.set_impulse(&impulse.samples);
                }
                self.retire(Retired::Impulse(impulse));
            }
        }
    }

    fn retire(&mut self, item: Retired) {
        // A full queue means nobody is collecting; dropping here is the fallback.
        let _ = self.retired.push_back(item);
    }

    /// Take one replaced curve or impulse so it can be dropped elsewhere.
    pub fn pop_retired(&mut self) -> Option<Retired> {
        self.retired.pop_front()
    }

    /// Render mono output into `out`, duplicated to both channels.
    pub fn render(&mut self, out: &mut [Frame]) {
        #[cfg(feature = "alloc_check")]
        assert_no_alloc::assert_no_alloc(|| self.render_block(out));
        #[cfg(not(feature = "alloc_check"))]
        self.render_block(out);
    }

    fn render_block(&mut self, out: &mut [Frame]) {
        let sr = self.sample_rate as f64;
        for frame in out.iter_mut() {
            let t = self.frame as f64 / sr;
            for &i in &self.order {
                let input: f32 = self.inputs[i].iter().map(|&src| self.outputs[src]).sum();
                self.outputs[i] = self.nodes[i].process(input, t, sr);
            }
            for &i in &self.delays {
                let input: f32 = self.inputs[i].iter().map(|&src| self.outputs[src]).sum();
                if let NodeState::Delay(line) = &mut self.nodes[i] {
                    line.write(input);
                }
            }
            let sample = self.outputs.first().copied().unwrap_or(0.0);
            *frame = Frame::mono(if sample.is_finite() { sample.clamp(-1.0, 1.0) } else { 0.0 });
            self.frame += 1;
        }
        let now = self.now();
        for node in &mut self.nodes {
            node.retire(now);
        }
    }
}

impl GraphSink for Renderer {
    fn send(&mut self, cmd: GraphCommand) {
        self.apply(cmd);
    }
}

/// Topological sort via Kahn's algorithm, ignoring edges into delay nodes.
///
/// Returns nodes ordered so that every source appears before its consumers,
/// with the destination (node 0) last. Nodes left on a cycle that contains
/// no delay are appended at the end.
pub fn topological_sort(graph: &AudioGraph) -> Vec<usize> {
    let n = graph.nodes.len();
    if n == 0 {
        return Vec::new();
    }

    let counts = |to: NodeId| (to as usize) < n && graph.nodes[to as usize].kind != NodeKind::Delay;

    let mut in_degree = vec![0u32; n];
    for conn in &graph.connections {
        if counts(conn.to) {
            in_degree[conn.to as usize] += 1;
        }
    }

    let mut queue: Vec<usize> = (0..n).filter(|&id| in_degree[id] == 0).rev().collect();
    let mut result = Vec::with_capacity(n);
    let mut placed = vec![false; n];

    while let Some(node) = queue.pop() {
        result.push(node);
        placed[node] = true;
        for conn in &graph.connections {
            if conn.from as usize == node && counts(conn.to) {
                let to = conn.to as usize;
                in_degree[to] -= 1;
                if in_degree[to] == 0 {
                    queue.push(to);
                }
            }
        }
    }

    result.extend((0..n).filter(|&i| !placed[i]));
    result
}
