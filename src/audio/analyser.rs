// Live frequency analysis over the most recent window of microphone samples
//
// Mirrors the behaviour of a browser analyser node: a Blackman-windowed FFT
// over the last `fft_size` samples, magnitudes smoothed against the previous
// reading, converted to decibels and scaled into a byte range.

use anyhow::{bail, Result};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Decibel value mapped to byte 0
pub const MIN_DECIBELS: f32 = -100.0;
/// Decibel value mapped to byte 255
pub const MAX_DECIBELS: f32 = -30.0;
/// Weight of the previous reading in each new magnitude
pub const SMOOTHING_TIME_CONSTANT: f32 = 0.8;

const MIN_FFT_SIZE: usize = 32;
const MAX_FFT_SIZE: usize = 32768;

/// Shared handle to one analysis node
///
/// Clones refer to the same node. The recorder feeds samples in while
/// the sampler reads magnitudes out; both only hold the lock for one call.
#[derive(Clone)]
pub struct AnalyserNode {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    window: Arc<[f32]>,
    state: Arc<Mutex<AnalyserState>>,
}

struct AnalyserState {
    samples: VecDeque<f32>,
    smoothed: Vec<f32>,
    closed: bool,
}

impl AnalyserNode {
    /// `fft_size` is rounded up to a power of two within [32, 32768]
    pub fn new(fft_size: usize) -> Self {
        let fft_size = fft_size.clamp(MIN_FFT_SIZE, MAX_FFT_SIZE).next_power_of_two();
        let fft = FftPlanner::new().plan_fft_forward(fft_size);

        debug!("Analyser node opened (fft_size={})", fft_size);

        Self {
            fft,
            fft_size,
            window: blackman(fft_size).into(),
            state: Arc::new(Mutex::new(AnalyserState {
                samples: VecDeque::from(vec![0.0; fft_size]),
                smoothed: vec![0.0; fft_size / 2],
                closed: false,
            })),
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of magnitude bins produced per reading
    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Append PCM samples, keeping only the most recent `fft_size`
    pub fn push_samples(&self, samples: &[i16]) {
        let mut state = self.lock();
        if state.closed {
            return;
        }

        let skip = samples.len().saturating_sub(self.fft_size);
        for &sample in &samples[skip..] {
            state.samples.pop_front();
            state.samples.push_back(sample as f32 / i16::MAX as f32);
        }
    }

    /// Append interleaved PCM, averaging channels down to one signal
    pub fn push_interleaved(&self, samples: &[i16], channels: u16) {
        if channels <= 1 {
            return self.push_samples(samples);
        }

        let mono: Vec<i16> = samples
            .chunks(channels as usize)
            .map(|frame| (frame.iter().map(|&s| s as i32).sum::<i32>() / frame.len() as i32) as i16)
            .collect();
        self.push_samples(&mono);
    }

    /// Current magnitudes, one byte per bin
    ///
    /// A closed node reads as silence.
    pub fn byte_frequency_data(&self) -> Vec<u8> {
        let mut state = self.lock();
        let bins = self.frequency_bin_count();

        if state.closed {
            return vec![0; bins];
        }

        let mut buffer: Vec<Complex<f32>> = state
            .samples
            .iter()
            .zip(self.window.iter())
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();
        self.fft.process(&mut buffer);

        let scale = 1.0 / self.fft_size as f32;
        let range = MAX_DECIBELS - MIN_DECIBELS;

        buffer[..bins]
            .iter()
            .zip(state.smoothed.iter_mut())
            .map(|(bin, previous)| {
                let magnitude = bin.norm() * scale;
                *previous = SMOOTHING_TIME_CONSTANT * *previous
                    + (1.0 - SMOOTHING_TIME_CONSTANT) * magnitude;

                if *previous <= 0.0 {
                    return 0;
                }

                let db = 20.0 * previous.log10();
                (255.0 * (db - MIN_DECIBELS) / range).clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    /// Release the node; closing twice is an error the caller may ignore
    pub fn close(&self) -> Result<()> {
        let mut state = self.lock();
        if state.closed {
            bail!("analyser node already closed");
        }

        state.closed = true;
        state.samples.clear();
        state.smoothed.clear();

        debug!("Analyser node closed");

        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, AnalyserState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn blackman(size: usize) -> Vec<f32> {
    let n = size as f32;
    (0..size)
        .map(|i| {
            let x = 2.0 * std::f32::consts::PI * i as f32 / n;
            0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
        })
        .collect()
}
