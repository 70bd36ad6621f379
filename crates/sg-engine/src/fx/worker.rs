//! Background impulse-response generation.
//!
//! Requests are debounced: the worker waits until no new request has
//! arrived for the debounce window, then builds only the latest one.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sg_ir::{ImpulseResponse, ReverbModel};
use tracing::{debug, error};

use super::{impulse, FxError};

/// Default quiet period before a reverb request is built.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq)]
struct Request {
    model: ReverbModel,
    decay: f32,
}

/// Builds impulse responses on a dedicated thread.
pub struct ReverbWorker {
    requests: Option<Sender<Request>>,
    results: Receiver<Arc<ImpulseResponse>>,
    handle: Option<JoinHandle<()>>,
}

impl ReverbWorker {
    /// Start the worker thread.
    ///
    /// With `seed` set, the noise is reproducible across runs.
    pub fn spawn(sample_rate: u32, debounce: Duration, seed: Option<u64>) -> Result<Self, FxError> {
        let (req_tx, req_rx) = unbounded::<Request>();
        let (res_tx, res_rx) = unbounded();
        let handle = std::thread::Builder::new()
            .name("sg-reverb".into())
            .spawn(move || {
                let mut rng = match seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                while let Ok(mut latest) = req_rx.recv() {
                    loop {
                        match req_rx.recv_timeout(debounce) {
                            Ok(newer) => latest = newer,
                            Err(RecvTimeoutError::Timeout) => break,
                            Err(RecvTimeoutError::Disconnected) => return,
                        }
                    }
                    match impulse::generate(latest.model, latest.decay, sample_rate, &mut rng) {
                        Ok(ir) => {
                            debug!(model = ?latest.model, decay = latest.decay, "impulse response ready");
                            if res_tx.send(Arc::new(ir)).is_err() {
                                return;
                            }
                        }
                        Err(e) => error!("reverb regeneration failed, keeping previous impulse: {e}"),
                    }
                }
            })
            .map_err(|_| FxError::WorkerGone)?;

        Ok(Self { requests: Some(req_tx), results: res_rx, handle: Some(handle) })
    }

    /// Queue a regeneration; only the most recent request in a burst is built.
    pub fn request(&self, model: ReverbModel, decay: f32) -> Result<(), FxError> {
        self.requests
            .as_ref()
            .ok_or(FxError::WorkerGone)?
            .send(Request { model, decay })
            .map_err(|_| FxError::WorkerGone)
    }

    /// A finished impulse response, if one is ready. Older results are skipped.
    pub fn try_recv(&self) -> Option<Arc<ImpulseResponse>> {
        let mut latest = None;
        loop {
            match self.results.try_recv() {
                Ok(ir) => latest = Some(ir),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return latest,
            }
        }
    }

    /// Block up to `timeout` for a finished impulse response.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Arc<ImpulseResponse>> {
        self.results.recv_timeout(timeout).ok()
    }
}

impl Drop for ReverbWorker {
    fn drop(&mut self) {
        // closing the request channel ends the thread's loop
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bursts_collapse_to_the_last_request() {
        let worker = ReverbWorker::spawn(1_000, Duration::from_millis(30), Some(1)).unwrap();
        worker.request(ReverbModel::Block, 1.0).unwrap();
        worker.request(ReverbModel::Swarm, 1.0).unwrap();
        worker.request(ReverbModel::Abyss, 2.0).unwrap();
        let ir = worker.recv_timeout(Duration::from_secs(5)).expect("impulse");
        assert_eq!(ir.samples.len(), 4_000);
        assert!(worker.recv_timeout(Duration::from_millis(200)).is_none());
    }

    #[test]
    fn failures_produce_nothing() {
        let worker = ReverbWorker::spawn(1_000, Duration::from_millis(10), Some(1)).unwrap();
        worker.request(ReverbModel::Block, -1.0).unwrap();
        assert!(worker.recv_timeout(Duration::from_millis(300)).is_none());
        worker.request(ReverbModel::Block, 1.0).unwrap();
        assert!(worker.recv_timeout(Duration::from_secs(5)).is_some());
    }
}
