use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use voice_application::{
    ApplicationError, Delivery, OptionResolver, OptionTable, PipelineSettings,
    ProcessAudioRequest, ProcessAudioResponse, ProcessAudioUseCase, ProcessAudioUseCaseImpl,
    UploadedFile,
};
use voice_domain::{
    AudioBuffer, AudioCodecPort, BlobStorePort, DomainError, EncodeOptions,
    EncodedBlob, PitchTempoPort, StoredAudio,
};

#[derive(Default)]
struct CallLog {
    calls: Mutex<Vec<String>>,
}

impl CallLog {
    fn push(&self, call: impl Into<String>) {
        self.calls.lock().expect("log lock").push(call.into());
    }

    fn snapshot(&self) -> Vec<String> {
        self.calls.lock().expect("log lock").clone()
    }
}

struct MockCodec {
    log: Arc<CallLog>,
    decodes: AtomicUsize,
    decode_error: Option<DomainError>,
}

impl MockCodec {
    fn new(log: Arc<CallLog>) -> Self {
        Self {
            log,
            decodes: AtomicUsize::new(0),
            decode_error: None,
        }
    }
}

impl AudioCodecPort for MockCodec {
    fn decode(
        &self,
        blob: EncodedBlob,
        target_sample_rate_hz: u32,
    ) -> Result<AudioBuffer, DomainError> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        self.log.push(format!("decode:{}", blob.format));
        if let Some(error) = &self.decode_error {
            return Err(error.clone());
        }
        Ok(AudioBuffer::mono(
            vec![0.25; target_sample_rate_hz as usize],
            target_sample_rate_hz,
        ))
    }

    fn encode(
        &self,
        buffer: &AudioBuffer,
        options: &EncodeOptions,
    ) -> Result<EncodedBlob, DomainError> {
        self.log.push(format!("encode:{}:{}", options.format, buffer.frame_count()));
        Ok(EncodedBlob::new(vec![1, 2, 3], options.format.clone()))
    }
}

struct RecordingTransformer {
    log: Arc<CallLog>,
    delay: Option<Duration>,
}

impl PitchTempoPort for RecordingTransformer {
    fn pitch_shift(
        &self,
        buffer: AudioBuffer,
        steps: f64,
        bins_per_octave: u32,
    ) -> Result<AudioBuffer, DomainError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.log.push(format!("pitch_shift:{steps}:{bins_per_octave}"));
        Ok(buffer)
    }

    fn time_stretch(&self, buffer: AudioBuffer, rate: f64) -> Result<AudioBuffer, DomainError> {
        self.log.push(format!("time_stretch:{rate}"));
        let frames = (buffer.samples.len() as f64 / rate).round() as usize;
        Ok(AudioBuffer::mono(vec![0.0; frames], buffer.sample_rate_hz))
    }
}

struct MockStore {
    fail: bool,
    uploads: AtomicUsize,
}

#[async_trait]
impl BlobStorePort for MockStore {
    async fn upload(&self, blob: EncodedBlob) -> Result<StoredAudio, DomainError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DomainError::storage_failure("remote rejected upload"));
        }
        Ok(StoredAudio {
            url: "https://blobs.example/audio_processing/abc.mp3".to_string(),
            public_id: "audio_processing/abc".to_string(),
            format: blob.format.extension().to_string(),
            resource_type: Some("video".to_string()),
        })
    }
}

fn settings(timeout: Duration) -> PipelineSettings {
    PipelineSettings {
        target_sample_rate_hz: 16_000,
        bins_per_octave: 24,
        encode: EncodeOptions::mp3(128),
        stage_timeout: timeout,
    }
}

fn stream_delivery() -> Delivery {
    Delivery::Stream {
        download_name: "modified_audio".to_string(),
    }
}

fn request(file_name: &str, content: Vec<u8>, option: Option<&str>) -> ProcessAudioRequest {
    ProcessAudioRequest {
        file: Some(UploadedFile {
            file_name: file_name.to_string(),
            content,
        }),
        option: option.map(str::to_string),
    }
}

struct Harness {
    log: Arc<CallLog>,
    codec: Arc<MockCodec>,
    usecase: ProcessAudioUseCaseImpl,
}

fn harness(table: OptionTable, delivery: Delivery) -> Harness {
    harness_with(table, delivery, None, Duration::from_secs(5), None)
}

fn harness_with(
    table: OptionTable,
    delivery: Delivery,
    decode_error: Option<DomainError>,
    timeout: Duration,
    delay: Option<Duration>,
) -> Harness {
    let log = Arc::new(CallLog::default());
    let mut codec = MockCodec::new(log.clone());
    codec.decode_error = decode_error;
    let codec = Arc::new(codec);
    let transformer = Arc::new(RecordingTransformer {
        log: log.clone(),
        delay,
    });
    let usecase = ProcessAudioUseCaseImpl::new(
        codec.clone(),
        transformer,
        OptionResolver::new(table),
        delivery,
        settings(timeout),
    );
    Harness {
        log,
        codec,
        usecase,
    }
}

#[tokio::test]
async fn tempo_option_runs_pitch_then_stretch_and_streams_mp3() {
    let h = harness(OptionTable::pitch_tempo(), stream_delivery());

    let response = h
        .usecase
        .process(request("voice.m4a", vec![9; 64], Some("low_pitch_high_tempo")))
        .await
        .expect("pipeline succeeds");

    assert_eq!(
        h.log.snapshot(),
        vec![
            "decode:m4a".to_string(),
            "pitch_shift:-4:24".to_string(),
            "time_stretch:1.5".to_string(),
            "encode:mp3:10667".to_string(),
        ]
    );
    match response {
        ProcessAudioResponse::Stream(streamed) => {
            assert_eq!(streamed.file_name, "modified_audio.mp3");
            assert_eq!(streamed.media_type, "audio/mpeg");
            assert_eq!(streamed.bytes, vec![1, 2, 3]);
        }
        other => panic!("expected streamed audio, got {other:?}"),
    }
}

#[tokio::test]
async fn pitch_only_option_skips_time_stretch() {
    let h = harness(OptionTable::pitch(), stream_delivery());

    h.usecase
        .process(request("voice.wav", vec![9; 64], Some("0")))
        .await
        .expect("pipeline succeeds");

    let calls = h.log.snapshot();
    assert!(calls.iter().any(|call| call == "pitch_shift:4:24"));
    assert!(!calls.iter().any(|call| call.starts_with("time_stretch")));
}

#[tokio::test]
async fn missing_option_uses_table_default() {
    let h = harness(OptionTable::pitch(), stream_delivery());

    h.usecase
        .process(request("voice.wav", vec![9; 64], None))
        .await
        .expect("pipeline succeeds");

    assert!(h.log.snapshot().iter().any(|call| call == "pitch_shift:-4:24"));
}

#[tokio::test]
async fn empty_file_is_rejected_before_decode() {
    let h = harness(OptionTable::pitch(), stream_delivery());

    let error = h
        .usecase
        .process(request("voice.wav", Vec::new(), Some("1")))
        .await
        .expect_err("empty upload");

    assert!(matches!(error, ApplicationError::EmptyFile));
    assert!(error.is_client_error());
    assert_eq!(h.codec.decodes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_file_and_blank_name_are_rejected() {
    let h = harness(OptionTable::pitch(), stream_delivery());

    let missing = h
        .usecase
        .process(ProcessAudioRequest {
            file: None,
            option: None,
        })
        .await
        .expect_err("no file");
    assert!(matches!(missing, ApplicationError::MissingFile));

    let blank = h
        .usecase
        .process(request("", vec![1, 2, 3], None))
        .await
        .expect_err("blank file name");
    assert!(matches!(blank, ApplicationError::MissingFile));
    assert_eq!(h.codec.decodes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_option_fails_fast_with_valid_keys() {
    let h = harness(OptionTable::pitch(), stream_delivery());

    let error = h
        .usecase
        .process(request("voice.wav", vec![1, 2, 3], Some("7")))
        .await
        .expect_err("unknown option");

    assert_eq!(error.to_string(), "Invalid option. Choose from: 0, 1, 2");
    assert_eq!(h.codec.decodes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn decode_classification_is_preserved() {
    let h = harness_with(
        OptionTable::pitch(),
        stream_delivery(),
        Some(DomainError::unsupported_format("xyz", "no demuxer")),
        Duration::from_secs(5),
        None,
    );

    let error = h
        .usecase
        .process(request("voice.xyz", vec![1, 2, 3], Some("0")))
        .await
        .expect_err("decode fails");

    assert!(matches!(
        error,
        ApplicationError::Domain(DomainError::UnsupportedFormat { .. })
    ));
    assert!(!error.is_client_error());
    assert!(!h.log.snapshot().iter().any(|call| call.starts_with("encode")));
}

#[tokio::test]
async fn upload_delivery_returns_stored_audio() {
    let store = Arc::new(MockStore {
        fail: false,
        uploads: AtomicUsize::new(0),
    });
    let h = harness(OptionTable::pitch(), Delivery::BlobStore(store.clone()));

    let response = h
        .usecase
        .process(request("voice.wav", vec![1, 2, 3], Some("2")))
        .await
        .expect("pipeline succeeds");

    match response {
        ProcessAudioResponse::Stored(stored) => {
            assert_eq!(stored.format, "mp3");
            assert_eq!(stored.public_id, "audio_processing/abc");
        }
        other => panic!("expected stored audio, got {other:?}"),
    }
    assert_eq!(store.uploads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn upload_failure_surfaces_storage_failure() {
    let store = Arc::new(MockStore {
        fail: true,
        uploads: AtomicUsize::new(0),
    });
    let h = harness(OptionTable::pitch(), Delivery::BlobStore(store.clone()));

    let error = h
        .usecase
        .process(request("voice.wav", vec![1, 2, 3], Some("0")))
        .await
        .expect_err("upload fails");

    assert!(matches!(
        error,
        ApplicationError::Domain(DomainError::StorageFailure(_))
    ));
    assert_eq!(error.kind(), "storage_failure");
    assert_eq!(store.uploads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn slow_stage_times_out() {
    let h = harness_with(
        OptionTable::pitch(),
        stream_delivery(),
        None,
        Duration::from_millis(20),
        Some(Duration::from_millis(300)),
    );

    let error = h
        .usecase
        .process(request("voice.wav", vec![1, 2, 3], Some("0")))
        .await
        .expect_err("transform exceeds deadline");

    match error {
        ApplicationError::Timeout { stage, timeout_ms } => {
            assert_eq!(stage, "transform");
            assert_eq!(timeout_ms, 20);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn oversized_option_is_a_validation_error() {
    let h = harness(OptionTable::pitch(), stream_delivery());
    let long_option = "x".repeat(65);

    let error = h
        .usecase
        .process(request("voice.wav", vec![1], Some(&long_option)))
        .await
        .expect_err("option too long");

    assert!(matches!(error, ApplicationError::Validation(_)));
    assert_eq!(h.codec.decodes.load(Ordering::SeqCst), 0);
}
