use std::{borrow::Cow, f32::consts::PI, sync::Arc};

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use voice_domain::{AudioBuffer, DomainError, PitchTempoPort};

use crate::resample::{clamp_samples, resample_to_length};

const DEFAULT_N_FFT: usize = 2048;
const DEFAULT_HOP_LENGTH: usize = 512;
const MIN_N_FFT: usize = 512;
const MAX_N_FFT: usize = 16_384;
const SEMITONES_PER_OCTAVE: f64 = 12.0;

type Spectrum = Vec<Complex<f32>>;

/// Phase-vocoder time stretching, with pitch shifting built as
/// stretch-then-resample so duration is preserved.
pub struct PhaseVocoderAdapter {
    frame: StftFrame,
}

impl Default for PhaseVocoderAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseVocoderAdapter {
    pub fn new() -> Self {
        Self::with_frame(DEFAULT_N_FFT, DEFAULT_HOP_LENGTH)
    }

    pub fn with_frame(n_fft: usize, hop_length: usize) -> Self {
        Self {
            frame: StftFrame::new(n_fft, hop_length),
        }
    }

    /// Frame used for pitch shifting. Finer resolutions get proportionally
    /// longer windows (12 bins maps to the base frame), rounded up to a
    /// power of two, with the base overlap kept.
    fn frame_for_resolution(&self, bins_per_octave: u32) -> Cow<'_, StftFrame> {
        let scaled = (self.frame.n_fft as u64 * u64::from(bins_per_octave) / 12)
            .clamp(MIN_N_FFT as u64, MAX_N_FFT as u64) as usize;
        let n_fft = scaled.next_power_of_two().min(MAX_N_FFT);
        if n_fft == self.frame.n_fft {
            return Cow::Borrowed(&self.frame);
        }

        let overlap = (self.frame.n_fft / self.frame.hop_length).max(1);
        Cow::Owned(StftFrame::new(n_fft, n_fft / overlap))
    }
}

#[derive(Debug, Clone)]
struct StftFrame {
    n_fft: usize,
    hop_length: usize,
    window: Vec<f32>,
}

impl StftFrame {
    fn new(n_fft: usize, hop_length: usize) -> Self {
        let n_fft = n_fft.max(4);
        let hop_length = hop_length.clamp(1, n_fft);
        Self {
            n_fft,
            hop_length,
            window: hann_window(n_fft),
        }
    }

    fn bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Centered STFT: zero-pads `n_fft / 2` on both sides.
    fn stft(&self, signal: &[f32], fft: &Arc<dyn Fft<f32>>) -> Vec<Spectrum> {
        let pad = self.n_fft / 2;
        let mut padded = vec![0.0_f32; signal.len() + 2 * pad];
        padded[pad..pad + signal.len()].copy_from_slice(signal);

        let n_frames = 1 + (padded.len() - self.n_fft) / self.hop_length;
        let mut frames = Vec::with_capacity(n_frames);
        let mut scratch = vec![Complex::new(0.0, 0.0); self.n_fft];

        for frame_idx in 0..n_frames {
            let start = frame_idx * self.hop_length;
            for (i, slot) in scratch.iter_mut().enumerate() {
                *slot = Complex::new(padded[start + i] * self.window[i], 0.0);
            }
            fft.process(&mut scratch);
            frames.push(scratch[..self.bins()].to_vec());
        }

        frames
    }

    /// Resamples the frame sequence in time by `rate`, accumulating phase so
    /// partials stay coherent across frames.
    fn phase_vocoder(&self, frames: &[Spectrum], rate: f64) -> Vec<Spectrum> {
        let bins = self.bins();
        let phi_advance: Vec<f32> = (0..bins)
            .map(|k| 2.0 * PI * k as f32 * self.hop_length as f32 / self.n_fft as f32)
            .collect();
        let silent = vec![Complex::new(0.0, 0.0); bins];
        let column = |idx: usize| frames.get(idx).unwrap_or(&silent);

        let mut phase_acc: Vec<f32> = frames
            .first()
            .map(|frame| frame.iter().map(|bin| bin.arg()).collect())
            .unwrap_or_else(|| vec![0.0; bins]);

        let n_out = (frames.len() as f64 / rate).ceil() as usize;
        let mut stretched = Vec::with_capacity(n_out);

        for out_idx in 0..n_out {
            let step = out_idx as f64 * rate;
            let base = step.floor() as usize;
            let alpha = (step - base as f64) as f32;
            let left = column(base);
            let right = column(base + 1);

            let mut frame = Vec::with_capacity(bins);
            for k in 0..bins {
                let magnitude = (1.0 - alpha) * left[k].norm() + alpha * right[k].norm();
                frame.push(Complex::from_polar(magnitude, phase_acc[k]));

                let mut delta = right[k].arg() - left[k].arg() - phi_advance[k];
                delta -= 2.0 * PI * (delta / (2.0 * PI)).round();
                phase_acc[k] += phi_advance[k] + delta;
            }
            stretched.push(frame);
        }

        stretched
    }

    /// Overlap-add inverse with squared-window normalisation, trimmed to
    /// `length` samples of the uncentred signal.
    fn istft(&self, frames: &[Spectrum], length: usize, ifft: &Arc<dyn Fft<f32>>) -> Vec<f32> {
        let pad = self.n_fft / 2;
        let full_len = self.n_fft + self.hop_length * frames.len().saturating_sub(1);
        let mut signal = vec![0.0_f32; full_len];
        let mut window_sum = vec![0.0_f32; full_len];
        let mut scratch = vec![Complex::new(0.0, 0.0); self.n_fft];
        let scale = 1.0 / self.n_fft as f32;

        for (frame_idx, frame) in frames.iter().enumerate() {
            for (k, bin) in frame.iter().enumerate() {
                scratch[k] = *bin;
                if k > 0 && k < self.n_fft - k {
                    scratch[self.n_fft - k] = bin.conj();
                }
            }
            ifft.process(&mut scratch);

            let start = frame_idx * self.hop_length;
            for i in 0..self.n_fft {
                let w = self.window[i];
                signal[start + i] += scratch[i].re * scale * w;
                window_sum[start + i] += w * w;
            }
        }

        for (sample, norm) in signal.iter_mut().zip(&window_sum) {
            if *norm > f32::EPSILON {
                *sample /= norm;
            }
        }

        let mut output: Vec<f32> = signal.into_iter().skip(pad).take(length).collect();
        output.resize(length, 0.0);
        output
    }

    fn stretch(&self, samples: &[f32], rate: f64) -> Vec<f32> {
        let target_len = (samples.len() as f64 / rate).round() as usize;
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(self.n_fft);
        let ifft = planner.plan_fft_inverse(self.n_fft);

        let spectrum = self.stft(samples, &fft);
        let stretched = self.phase_vocoder(&spectrum, rate);
        self.istft(&stretched, target_len, &ifft)
    }
}

impl PitchTempoPort for PhaseVocoderAdapter {
    fn pitch_shift(
        &self,
        buffer: AudioBuffer,
        steps: f64,
        bins_per_octave: u32,
    ) -> Result<AudioBuffer, DomainError> {
        if !steps.is_finite() {
            return Err(DomainError::transform_failure(format!(
                "pitch steps must be finite, got {steps}"
            )));
        }
        if bins_per_octave == 0 {
            return Err(DomainError::transform_failure(
                "bins_per_octave must be greater than zero",
            ));
        }
        let buffer = ensure_mono(buffer)?;
        if steps == 0.0 {
            return Ok(buffer);
        }

        let rate = 2f64.powf(-steps / SEMITONES_PER_OCTAVE);
        let frame = self.frame_for_resolution(bins_per_octave);
        let original_len = buffer.samples.len();
        let stretched = frame.stretch(&buffer.samples, rate);
        let mut samples = resample_to_length(&stretched, original_len)
            .map_err(|err| DomainError::transform_failure(err.to_string()))?;
        clamp_samples(&mut samples);

        tracing::debug!(
            steps,
            bins_per_octave,
            n_fft = frame.n_fft,
            rate,
            frames = samples.len(),
            "pitch shifted"
        );

        Ok(AudioBuffer::mono(samples, buffer.sample_rate_hz))
    }

    fn time_stretch(&self, buffer: AudioBuffer, rate: f64) -> Result<AudioBuffer, DomainError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(DomainError::transform_failure(format!(
                "stretch rate must be a positive finite number, got {rate}"
            )));
        }
        let buffer = ensure_mono(buffer)?;
        if rate == 1.0 {
            return Ok(buffer);
        }

        let mut samples = self.frame.stretch(&buffer.samples, rate);
        clamp_samples(&mut samples);

        tracing::debug!(rate, frames = samples.len(), "time stretched");

        Ok(AudioBuffer::mono(samples, buffer.sample_rate_hz))
    }
}

fn ensure_mono(buffer: AudioBuffer) -> Result<AudioBuffer, DomainError> {
    if buffer.is_empty() {
        return Err(DomainError::transform_failure("audio buffer is empty"));
    }
    Ok(buffer.downmix_to_mono())
}

/// Periodic Hann window.
fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / n as f32).cos())
        .collect()
}
