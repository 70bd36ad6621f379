//! Audio graph layout and the command vocabulary that drives it.
//!
//! The layout (`AudioGraph`) is fixed once at initialization. Everything
//! that happens afterwards, from a note-on to a reverb swap, is a
//! `GraphCommand` addressed to a node.

use std::sync::Arc;

use crate::automation::Automation;
use crate::patch::Waveform;

/// Node identifier in the audio graph.
pub type NodeId = u16;

/// Kind of audio graph node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// Final output. Exactly one per graph, always node 0.
    Destination,
    /// Free-running oscillator with an automatable frequency.
    Oscillator,
    /// Scales its summed inputs by an automatable gain.
    Gain,
    /// Resonant low-pass biquad.
    Filter,
    /// Delay line; its inputs may form a feedback cycle.
    Delay,
    /// Convolution with an impulse response.
    Convolver,
    /// Memoryless transfer curve.
    WaveShaper,
}

impl NodeKind {
    /// Whether the node accepts the given parameter.
    pub fn has_param(self, param: Param) -> bool {
        matches!(
            (self, param),
            (NodeKind::Oscillator, Param::Frequency)
                | (NodeKind::Gain, Param::Gain)
                | (NodeKind::Filter, Param::Frequency)
                | (NodeKind::Filter, Param::Q)
                | (NodeKind::Delay, Param::DelayTime)
        )
    }
}

/// An automatable node parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Param {
    Gain,
    /// Hz.
    Frequency,
    Q,
    /// Seconds.
    DelayTime,
}

/// A node in the layout with its starting parameter values.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Initial values for the node's parameters.
    pub defaults: Vec<(Param, f32)>,
}

/// A directed edge; audio flows from `from` into `to`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Connection {
    pub from: NodeId,
    pub to: NodeId,
}

/// The static routing of the synth.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AudioGraph {
    pub nodes: Vec<Node>,
    pub connections: Vec<Connection>,
}

impl AudioGraph {
    /// Create a graph holding only the destination node.
    pub fn with_destination() -> Self {
        Self {
            nodes: vec![Node { id: 0, kind: NodeKind::Destination, defaults: Vec::new() }],
            connections: Vec::new(),
        }
    }

    /// Add a node and return its ID.
    pub fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.nodes.push(Node { id, kind, defaults: Vec::new() });
        id
    }

    /// Add a node with initial parameter values.
    pub fn add_node_with(&mut self, kind: NodeKind, defaults: &[(Param, f32)]) -> NodeId {
        let id = self.add_node(kind);
        self.nodes[id as usize].defaults.extend_from_slice(defaults);
        id
    }

    /// Connect two nodes.
    pub fn connect(&mut self, from: NodeId, to: NodeId) {
        self.connections.push(Connection { from, to });
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id as usize)
    }

    /// IDs of every node feeding `id`.
    pub fn inputs_of(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.connections.iter().filter(move |c| c.to == id).map(|c| c.from)
    }
}

/// A runtime instruction for the renderer.
#[derive(Clone, Debug, PartialEq)]
pub enum GraphCommand {
    /// Append an automation event to a parameter.
    Automate { node: NodeId, param: Param, event: Automation },
    /// Drop a parameter's events at or after `time`.
    CancelScheduled { node: NodeId, param: Param, time: f64 },
    /// Freeze a parameter at its value at `time`, dropping later events.
    CancelAndHold { node: NodeId, param: Param, time: f64 },
    /// Change an oscillator's waveform immediately.
    SetWaveform { node: NodeId, wave: Waveform },
    /// Replace a waveshaper's transfer curve.
    SetCurve { node: NodeId, curve: Arc<[f32]> },
    /// Replace a convolver's impulse response.
    SetImpulse { node: NodeId, impulse: Arc<ImpulseResponse> },
}

impl GraphCommand {
    /// The node the command is addressed to.
    pub fn node(&self) -> NodeId {
        match self {
            GraphCommand::Automate { node, .. }
            | GraphCommand::CancelScheduled { node, .. }
            | GraphCommand::CancelAndHold { node, .. }
            | GraphCommand::SetWaveform { node, .. }
            | GraphCommand::SetCurve { node, .. }
            | GraphCommand::SetImpulse { node, .. } => *node,
        }
    }
}

/// Mono impulse response for a convolver.
#[derive(Clone, Debug, PartialEq)]
pub struct ImpulseResponse {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl ImpulseResponse {
    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.samples.len() as f64 / self.sample_rate as f64
        }
    }
}
