use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use thiserror::Error;

const CHUNK_FRAMES: usize = 1024;

#[derive(Debug, Error)]
pub enum ResampleError {
    #[error("resampler setup failed: {0}")]
    Construction(#[from] rubato::ResamplerConstructionError),
    #[error("resampling failed: {0}")]
    Process(#[from] rubato::ResampleError),
}

/// Clamps every sample into `[-1, 1]`. Returns whether anything was clipped.
pub fn clamp_samples(samples: &mut [f32]) -> bool {
    let mut clamped_any = false;
    for sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        if clamped != *sample {
            clamped_any = true;
            *sample = clamped;
        }
    }
    clamped_any
}

/// Band-limited rate conversion. Output length is `len * target / source`.
pub fn resample(
    samples: &[f32],
    source_rate_hz: u32,
    target_rate_hz: u32,
) -> Result<Vec<f32>, ResampleError> {
    if source_rate_hz == target_rate_hz || source_rate_hz == 0 || samples.len() <= 1 {
        return Ok(samples.to_vec());
    }

    let output_len = ((samples.len() as u64 * target_rate_hz as u64) / source_rate_hz as u64)
        .max(1) as usize;
    sinc_resample(
        samples,
        target_rate_hz as f64 / source_rate_hz as f64,
        output_len,
    )
}

/// Band-limited resampling onto exactly `output_len` frames.
pub fn resample_to_length(samples: &[f32], output_len: usize) -> Result<Vec<f32>, ResampleError> {
    if output_len == samples.len() {
        return Ok(samples.to_vec());
    }
    if samples.is_empty() {
        return Ok(vec![0.0; output_len]);
    }
    if samples.len() == 1 || output_len <= 1 {
        return Ok(vec![samples[0]; output_len]);
    }

    sinc_resample(
        samples,
        output_len as f64 / samples.len() as f64,
        output_len,
    )
}

fn sinc_resample(
    samples: &[f32],
    ratio: f64,
    output_len: usize,
) -> Result<Vec<f32>, ResampleError> {
    // Offline quality: longer sinc than a real-time path would use.
    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, CHUNK_FRAMES, 1)?;

    let delay = resampler.output_delay();
    let wanted = delay + output_len;
    let mut output = Vec::with_capacity(wanted + CHUNK_FRAMES);

    let mut chunks = samples.chunks_exact(CHUNK_FRAMES);
    for chunk in chunks.by_ref() {
        let input = [chunk];
        let frames = resampler.process(input.as_slice(), None)?;
        output.extend_from_slice(&frames[0]);
    }
    let remainder = chunks.remainder();
    if !remainder.is_empty() {
        let input = [remainder];
        let frames = resampler.process_partial(Some(input.as_slice()), None)?;
        output.extend_from_slice(&frames[0]);
    }
    // Drain the filter tail so the delayed output covers the full length.
    while output.len() < wanted {
        let frames = resampler.process_partial(None::<&[&[f32]]>, None)?;
        if frames[0].is_empty() {
            break;
        }
        output.extend_from_slice(&frames[0]);
    }

    let mut output: Vec<f32> = output.into_iter().skip(delay).take(output_len).collect();
    output.resize(output_len, 0.0);

    tracing::trace!(ratio, delay, output_len, "sinc resampled");
    Ok(output)
}
