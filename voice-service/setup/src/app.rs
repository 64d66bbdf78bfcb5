use std::{sync::Arc, time::Duration};

use anyhow::{Context, Error};
use axum::Router;
use tokio::net::TcpListener;
use voice_application::{
    Delivery, OptionResolver, OptionTable, PipelineSettings, ProcessAudioUseCase,
    ProcessAudioUseCaseImpl,
};
use voice_configuration::{AppConfig, DeliveryMode, OutputFormat, ProcessingConfig, ProcessingProfile};
use voice_domain::{AudioCodecPort, BlobStorePort, EncodeOptions, PitchTempoPort};
use voice_http_server::{build_router, AppState};
use voice_infra::{
    AudioCodecAdapter, CloudinaryBlobStore, CloudinarySettings, PhaseVocoderAdapter,
};

pub async fn build_and_run(config: AppConfig) -> Result<(), Error> {
    let app = Application::new(config).await?;
    app.run().await
}

pub struct Application {
    pub config: AppConfig,
    pub router: Router,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self, Error> {
        config.validate()?;

        let processing = &config.processing;
        tracing::info!(
            profile = ?processing.profile,
            sample_rate_hz = processing.effective_sample_rate_hz(),
            bins_per_octave = processing.effective_bins_per_octave(),
            output_format = ?processing.output_format,
            delivery = ?config.delivery.mode,
            "initializing voice transformation application"
        );

        let codec: Arc<dyn AudioCodecPort> = Arc::new(AudioCodecAdapter::new());
        let transformer: Arc<dyn PitchTempoPort> = Arc::new(PhaseVocoderAdapter::new());
        let usecase: Arc<dyn ProcessAudioUseCase> = Arc::new(ProcessAudioUseCaseImpl::new(
            codec,
            transformer,
            OptionResolver::new(option_table(processing)?),
            delivery(&config)?,
            pipeline_settings(&config),
        ));

        let router = build_router(AppState::new(usecase), &config.server, &config.cors)?;

        Ok(Self { config, router })
    }

    pub async fn run(self) -> Result<(), Error> {
        let address = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = TcpListener::bind(&address)
            .await
            .with_context(|| format!("failed to bind {address}"))?;
        self.serve(listener).await
    }

    /// Serves on an already bound listener until ctrl-c.
    pub async fn serve(self, listener: TcpListener) -> Result<(), Error> {
        let local_addr = listener.local_addr()?;
        tracing::info!(address = %local_addr, "starting voice HTTP server");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|err| anyhow::anyhow!("server failed: {err}"))
    }
}

fn option_table(processing: &ProcessingConfig) -> Result<OptionTable, Error> {
    if let Some(custom) = &processing.options {
        let table = OptionTable::new(custom.entries.clone(), custom.default_option.clone())
            .context("invalid custom option table")?;
        tracing::info!(
            options = ?table.keys(),
            default_option = %table.default_key(),
            "using custom option table"
        );
        return Ok(table);
    }

    Ok(match processing.profile {
        ProcessingProfile::Pitch => OptionTable::pitch(),
        ProcessingProfile::PitchTempo => OptionTable::pitch_tempo(),
    })
}

fn pipeline_settings(config: &AppConfig) -> PipelineSettings {
    let processing = &config.processing;
    let encode = match processing.output_format {
        OutputFormat::Mp3 => EncodeOptions::mp3(processing.mp3_bitrate_kbps),
        OutputFormat::Wav => EncodeOptions::wav(),
    };
    PipelineSettings {
        target_sample_rate_hz: processing.effective_sample_rate_hz(),
        bins_per_octave: processing.effective_bins_per_octave(),
        encode,
        stage_timeout: Duration::from_millis(processing.stage_timeout_ms),
    }
}

fn delivery(config: &AppConfig) -> Result<Delivery, Error> {
    match config.delivery.mode {
        DeliveryMode::Stream => Ok(Delivery::Stream {
            download_name: config.delivery.download_name.clone(),
        }),
        DeliveryMode::Upload => {
            let storage = &config.storage;
            let store: Arc<dyn BlobStorePort> = Arc::new(CloudinaryBlobStore::new(
                CloudinarySettings {
                    cloud_name: storage.cloud_name.clone(),
                    api_key: storage.api_key.clone(),
                    api_secret: storage.api_secret.clone(),
                    api_base_url: storage.api_base_url.clone(),
                    folder: storage.folder.clone(),
                    resource_type: storage.resource_type.clone(),
                    quality: storage.quality.clone(),
                    fetch_format: storage.fetch_format.clone(),
                    request_timeout: Duration::from_millis(storage.request_timeout_ms),
                    temp_dir: storage.temp_dir.clone(),
                },
            )?);
            tracing::info!(
                cloud_name = %storage.cloud_name,
                folder = %storage.folder,
                "blob store delivery enabled"
            );
            Ok(Delivery::BlobStore(store))
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
