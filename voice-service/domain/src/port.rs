use async_trait::async_trait;

use crate::{AudioBuffer, DomainError, EncodeOptions, EncodedBlob, StoredAudio};

/// Container/codec conversion. Implementations are CPU-bound and synchronous.
pub trait AudioCodecPort: Send + Sync {
    /// Decodes to mono PCM at `target_sample_rate_hz`.
    fn decode(
        &self,
        blob: EncodedBlob,
        target_sample_rate_hz: u32,
    ) -> Result<AudioBuffer, DomainError>;

    fn encode(
        &self,
        buffer: &AudioBuffer,
        options: &EncodeOptions,
    ) -> Result<EncodedBlob, DomainError>;
}

pub trait PitchTempoPort: Send + Sync {
    /// Duration-preserving shift of `steps` semitones. `bins_per_octave`
    /// only sets the analysis resolution.
    fn pitch_shift(
        &self,
        buffer: AudioBuffer,
        steps: f64,
        bins_per_octave: u32,
    ) -> Result<AudioBuffer, DomainError>;

    /// Scales duration by `1 / rate` while keeping pitch.
    fn time_stretch(&self, buffer: AudioBuffer, rate: f64) -> Result<AudioBuffer, DomainError>;
}

#[async_trait]
pub trait BlobStorePort: Send + Sync {
    async fn upload(&self, blob: EncodedBlob) -> Result<StoredAudio, DomainError>;
}
