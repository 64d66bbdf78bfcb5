mod codec;
mod dsp;
mod resample;
mod storage;

pub use codec::AudioCodecAdapter;
pub use dsp::PhaseVocoderAdapter;
pub use resample::{clamp_samples, resample, resample_to_length, ResampleError};
pub use storage::{sign_params, CloudinaryBlobStore, CloudinarySettings};
