use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use uuid::Uuid;
use validator::Validate;

use voice_domain::{
    AudioBuffer, AudioCodecPort, AudioFormat, BlobStorePort, DomainError, EncodeOptions,
    EncodedBlob, PitchTempoPort, TransformParams,
};

use crate::{
    ApplicationError, OptionResolver, ProcessAudioRequest, ProcessAudioResponse, StreamedAudio,
};

#[async_trait]
pub trait ProcessAudioUseCase: Send + Sync {
    async fn process(
        &self,
        request: ProcessAudioRequest,
    ) -> Result<ProcessAudioResponse, ApplicationError>;
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub target_sample_rate_hz: u32,
    pub bins_per_octave: u32,
    pub encode: EncodeOptions,
    pub stage_timeout: Duration,
}

#[derive(Clone)]
pub enum Delivery {
    Stream { download_name: String },
    BlobStore(Arc<dyn BlobStorePort>),
}

impl Delivery {
    pub fn mode(&self) -> &'static str {
        match self {
            Delivery::Stream { .. } => "stream",
            Delivery::BlobStore(_) => "upload",
        }
    }
}

pub struct ProcessAudioUseCaseImpl {
    codec: Arc<dyn AudioCodecPort>,
    transformer: Arc<dyn PitchTempoPort>,
    options: OptionResolver,
    delivery: Delivery,
    settings: PipelineSettings,
}

impl ProcessAudioUseCaseImpl {
    pub fn new(
        codec: Arc<dyn AudioCodecPort>,
        transformer: Arc<dyn PitchTempoPort>,
        options: OptionResolver,
        delivery: Delivery,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            codec,
            transformer,
            options,
            delivery,
            settings,
        }
    }

    /// Runs a CPU-bound stage off the reactor, bounded by the stage deadline.
    async fn run_blocking<T, F>(&self, stage: &'static str, task: F) -> Result<T, ApplicationError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, DomainError> + Send + 'static,
    {
        let handle = tokio::task::spawn_blocking(task);
        match tokio::time::timeout(self.settings.stage_timeout, handle).await {
            Err(_) => Err(self.timeout(stage)),
            Ok(Err(join_error)) => Err(ApplicationError::Internal(format!(
                "{stage} task aborted: {join_error}"
            ))),
            Ok(Ok(result)) => result.map_err(ApplicationError::from),
        }
    }

    fn timeout(&self, stage: &'static str) -> ApplicationError {
        ApplicationError::Timeout {
            stage,
            timeout_ms: self.settings.stage_timeout.as_millis() as u64,
        }
    }

    async fn deliver(&self, encoded: EncodedBlob) -> Result<ProcessAudioResponse, ApplicationError> {
        match &self.delivery {
            Delivery::Stream { download_name } => {
                let file_name = format!("{download_name}.{}", encoded.format.extension());
                Ok(ProcessAudioResponse::Stream(StreamedAudio {
                    media_type: encoded.format.media_type(),
                    file_name,
                    bytes: encoded.bytes,
                }))
            }
            Delivery::BlobStore(store) => {
                let stored = tokio::time::timeout(self.settings.stage_timeout, store.upload(encoded))
                    .await
                    .map_err(|_| self.timeout("upload"))??;
                Ok(ProcessAudioResponse::Stored(stored))
            }
        }
    }
}

#[async_trait]
impl ProcessAudioUseCase for ProcessAudioUseCaseImpl {
    async fn process(
        &self,
        request: ProcessAudioRequest,
    ) -> Result<ProcessAudioResponse, ApplicationError> {
        request
            .validate()
            .map_err(|err| ApplicationError::Validation(err.to_string()))?;

        let ProcessAudioRequest { file, option } = request;
        let option_key = option.unwrap_or_else(|| self.options.default_key().to_string());
        let entry = self.options.lookup(&option_key)?;

        let file = file.ok_or(ApplicationError::MissingFile)?;
        if file.file_name.is_empty() {
            return Err(ApplicationError::MissingFile);
        }
        if file.content.is_empty() {
            return Err(ApplicationError::EmptyFile);
        }

        let params = crate::option::draw_params(entry);
        let request_id = Uuid::new_v4().to_string();
        let input_format = AudioFormat::from_file_name(&file.file_name);

        tracing::info!(
            request_id = %request_id,
            file_name = %file.file_name,
            input_format = %input_format,
            input_bytes = file.content.len(),
            option = %option_key,
            pitch_steps = params.pitch_steps,
            tempo_rate = ?params.tempo_rate,
            delivery = self.delivery.mode(),
            "starting voice transformation"
        );

        let codec = Arc::clone(&self.codec);
        let target_sample_rate_hz = self.settings.target_sample_rate_hz;
        let blob = EncodedBlob::new(file.content, input_format);
        let decoded = self
            .run_blocking("decode", move || codec.decode(blob, target_sample_rate_hz))
            .await?;

        tracing::debug!(
            request_id = %request_id,
            frames = decoded.frame_count(),
            sample_rate_hz = decoded.sample_rate_hz,
            duration_secs = decoded.duration_secs(),
            "decoded input audio"
        );

        let transformer = Arc::clone(&self.transformer);
        let bins_per_octave = self.settings.bins_per_octave;
        let transformed = self
            .run_blocking("transform", move || {
                apply_transform(transformer.as_ref(), decoded, params, bins_per_octave)
            })
            .await?;

        tracing::debug!(
            request_id = %request_id,
            frames = transformed.frame_count(),
            duration_secs = transformed.duration_secs(),
            "applied pitch/tempo transform"
        );

        let codec = Arc::clone(&self.codec);
        let encode_options = self.settings.encode.clone();
        let encoded = self
            .run_blocking("encode", move || codec.encode(&transformed, &encode_options))
            .await?;

        tracing::debug!(
            request_id = %request_id,
            output_format = %encoded.format,
            output_bytes = encoded.len(),
            "encoded output audio"
        );

        let response = self.deliver(encoded).await?;

        tracing::info!(request_id = %request_id, "voice transformation completed");
        Ok(response)
    }
}

/// Pitch shift first, then the optional time stretch.
pub fn apply_transform(
    transformer: &dyn PitchTempoPort,
    buffer: AudioBuffer,
    params: TransformParams,
    bins_per_octave: u32,
) -> Result<AudioBuffer, DomainError> {
    let shifted = transformer.pitch_shift(buffer, params.pitch_steps, bins_per_octave)?;
    match params.tempo_rate {
        Some(rate) => transformer.time_stretch(shifted, rate),
        None => Ok(shifted),
    }
}
