//! MIDI clock output to every connected port.
//!
//! Messages carry a delay relative to the moment they are sent; a
//! dispatch thread holds each one until its deadline on the host's
//! monotonic clock.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use midir::{MidiOutput, MidiOutputConnection};
use sg_engine::MidiSink;
use sg_ir::MidiMessage;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum MidiError {
    #[error("cannot open MIDI output: {0}")]
    Init(String),
    #[error("cannot connect to MIDI port '{port}': {reason}")]
    Connect { port: String, reason: String },
}

/// Fire-and-forget sender of MIDI realtime messages.
#[derive(Default)]
pub struct MidiOut {
    tx: Option<Sender<(Instant, MidiMessage)>>,
    handle: Option<JoinHandle<()>>,
    ports: usize,
    /// Added to every delay so messages line up with buffered audio.
    latency: Duration,
}

impl MidiOut {
    /// An output that drops everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Connect to every available output port.
    pub fn connect_all(client_name: &str) -> Result<Self, MidiError> {
        let probe = MidiOutput::new(client_name).map_err(|e| MidiError::Init(e.to_string()))?;
        let ports = probe.ports();
        let mut connections = Vec::with_capacity(ports.len());
        for port in &ports {
            let name = probe.port_name(port).unwrap_or_else(|_| "unknown".to_string());
            let output = MidiOutput::new(client_name).map_err(|e| MidiError::Init(e.to_string()))?;
            let conn = output
                .connect(port, "synthgrid-clock")
                .map_err(|e| MidiError::Connect { port: name.clone(), reason: e.to_string() })?;
            info!(port = %name, "connected MIDI output");
            connections.push(conn);
        }
        if connections.is_empty() {
            debug!("no MIDI output ports");
            return Ok(Self::disabled());
        }
        let count = connections.len();

        let (tx, rx) = unbounded::<(Instant, MidiMessage)>();
        let handle = std::thread::Builder::new()
            .name("sg-midi".into())
            .spawn(move || dispatch(rx, connections))
            .map_err(|e| MidiError::Init(e.to_string()))?;
        Ok(Self { tx: Some(tx), handle: Some(handle), ports: count, latency: Duration::ZERO })
    }

    pub fn port_count(&self) -> usize {
        self.ports
    }

    /// Delay every message by the audio output latency.
    pub fn set_latency(&mut self, latency: Duration) {
        self.latency = latency;
    }
}

fn dispatch(rx: crossbeam_channel::Receiver<(Instant, MidiMessage)>, mut connections: Vec<MidiOutputConnection>) {
    // (deadline, arrival order, status byte)
    let mut pending: BinaryHeap<Reverse<(Instant, u64, u8)>> = BinaryHeap::new();
    let mut seq = 0u64;
    loop {
        let received = match pending.peek() {
            Some(Reverse((deadline, _, _))) => {
                rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
            }
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok((deadline, msg)) => {
                pending.push(Reverse((deadline, seq, msg.status())));
                seq += 1;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        let now = Instant::now();
        while let Some(Reverse((deadline, _, status))) = pending.peek().copied() {
            if deadline > now {
                break;
            }
            pending.pop();
            for conn in &mut connections {
                if let Err(e) = conn.send(&[status]) {
                    warn!("MIDI send failed: {e}");
                }
            }
        }
    }
    for conn in connections {
        conn.close();
    }
}

impl MidiSink for MidiOut {
    fn send(&mut self, msg: MidiMessage, delay: f64) {
        if let Some(tx) = &self.tx {
            let deadline = Instant::now() + self.latency + Duration::from_secs_f64(delay.max(0.0));
            let _ = tx.send((deadline, msg));
        }
    }
}

impl Drop for MidiOut {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
