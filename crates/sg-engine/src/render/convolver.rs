//! Uniformly partitioned FFT convolution (overlap-save).
//!
//! The impulse response is cut into `BLOCK`-sample partitions, each
//! transformed once. Input is gathered a block at a time; every block is
//! transformed and multiplied against the partition spectra through a
//! frequency-domain delay line. Output therefore lags input by one block.
//!
//! All buffers are sized for the longest supported impulse at
//! construction, so loading a new response and processing never allocate.

use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

/// Partition and hop size in samples.
pub const BLOCK: usize = 512;
const FFT_LEN: usize = 2 * BLOCK;
const BINS: usize = BLOCK + 1;

/// Longest impulse response a convolver holds, in seconds.
pub const MAX_IMPULSE_SECS: f64 = 4.0;

pub struct Convolver {
    r2c: Arc<dyn RealToComplex<f32>>,
    c2r: Arc<dyn ComplexToReal<f32>>,
    /// Partition spectra, `max_partitions * BINS` long; only `partitions` are live.
    spectra: Vec<Complex<f32>>,
    /// Past input spectra, same layout; `head` is the newest.
    history: Vec<Complex<f32>>,
    max_partitions: usize,
    partitions: usize,
    head: usize,
    /// Previous block followed by the block being gathered.
    window: Vec<f32>,
    time_scratch: Vec<f32>,
    freq_scratch: Vec<Complex<f32>>,
    accum: Vec<Complex<f32>>,
    fft_scratch: Vec<Complex<f32>>,
    output: Vec<f32>,
    pos: usize,
}

impl Convolver {
    /// Create an empty (silent) convolver able to hold `MAX_IMPULSE_SECS` at `sample_rate`.
    pub fn new(sample_rate: u32) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let r2c = planner.plan_fft_forward(FFT_LEN);
        let c2r = planner.plan_fft_inverse(FFT_LEN);
        let scratch_len = r2c.get_scratch_len().max(c2r.get_scratch_len());

        let max_len = (MAX_IMPULSE_SECS * sample_rate as f64).ceil() as usize;
        let max_partitions = max_len.div_ceil(BLOCK).max(1);
        let zero = Complex::new(0.0, 0.0);

        Self {
            r2c,
            c2r,
            spectra: vec![zero; max_partitions * BINS],
            history: vec![zero; max_partitions * BINS],
            max_partitions,
            partitions: 0,
            head: 0,
            window: vec![0.0; FFT_LEN],
            time_scratch: vec![0.0; FFT_LEN],
            freq_scratch: vec![zero; BINS],
            accum: vec![zero; BINS],
            fft_scratch: vec![zero; scratch_len],
            output: vec![0.0; BLOCK],
            pos: 0,
        }
    }

    /// Number of live partitions.
    pub fn partitions(&self) -> usize {
        self.partitions
    }

    /// Load a new impulse response, truncated to the preallocated length.
    pub fn set_impulse(&mut self, samples: &[f32]) {
        let len = samples.len().min(self.max_partitions * BLOCK);
        let partitions = len.div_ceil(BLOCK);

        for p in 0..partitions {
            let start = p * BLOCK;
            let end = (start + BLOCK).min(len);
            self.time_scratch.fill(0.0);
            self.time_scratch[..end - start].copy_from_slice(&samples[start..end]);
            let dst = &mut self.spectra[p * BINS..(p + 1) * BINS];
            if self.r2c.process_with_scratch(&mut self.time_scratch, dst, &mut self.fft_scratch).is_err() {
                dst.fill(Complex::new(0.0, 0.0));
            }
        }
        self.partitions = partitions;
    }

    /// Feed one input sample, get one output sample (delayed by `BLOCK`).
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let out = self.output[self.pos];
        self.window[BLOCK + self.pos] = input;
        self.pos += 1;
        if self.pos == BLOCK {
            self.pos = 0;
            self.process_block();
        }
        out
    }

    fn process_block(&mut self) {
        let zero = Complex::new(0.0, 0.0);

        // Spectrum of [previous block | current block] goes into the history ring.
        self.head = if self.head == 0 { self.max_partitions - 1 } else { self.head - 1 };
        self.time_scratch.copy_from_slice(&self.window);
        let slot = &mut self.history[self.head * BINS..(self.head + 1) * BINS];
        if self.r2c.process_with_scratch(&mut self.time_scratch, slot, &mut self.fft_scratch).is_err() {
            slot.fill(zero);
        }
        self.window.copy_within(BLOCK.., 0);

        if self.partitions == 0 {
            self.output.fill(0.0);
            return;
        }

        self.accum.fill(zero);
        for p in 0..self.partitions {
            let slot = (self.head + p) % self.max_partitions;
            let x = &self.history[slot * BINS..(slot + 1) * BINS];
            let h = &self.spectra[p * BINS..(p + 1) * BINS];
            for ((acc, x), h) in self.accum.iter_mut().zip(x).zip(h) {
                *acc += x * h;
            }
        }

        self.freq_scratch.copy_from_slice(&self.accum);
        // The inverse real transform requires purely real DC and Nyquist bins.
        self.freq_scratch[0].im = 0.0;
        self.freq_scratch[BINS - 1].im = 0.0;
        if self.c2r
            .process_with_scratch(&mut self.freq_scratch, &mut self.time_scratch, &mut self.fft_scratch)
            .is_err()
        {
            self.output.fill(0.0);
            return;
        }

        let scale = 1.0 / FFT_LEN as f32;
        for (o, s) in self.output.iter_mut().zip(&self.time_scratch[BLOCK..]) {
            *o = s * scale;
        }
    }
}
