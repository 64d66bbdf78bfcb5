use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use voice_domain::{mp3_bitrate_supported, TransformOption, MP3_SAMPLE_RATES_HZ};

mod logging;

pub use logging::setup_logging;

pub type AppConfig = VoiceConfig;

const CONFIG_PREFIX: &str = "VOICE_SERVICE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file `{path}`: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value `{value}` for {key}")]
    InvalidOverride { key: String, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoiceConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

/// A consistent bundle of option table, sample rate and pitch resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingProfile {
    /// Keys `0`/`1`/`2`, pitch only, 22050 Hz, 12 bins per octave.
    Pitch,
    /// Named pitch+tempo keys, 16000 Hz, 24 bins per octave.
    #[default]
    PitchTempo,
}

impl ProcessingProfile {
    pub fn default_sample_rate_hz(self) -> u32 {
        match self {
            ProcessingProfile::Pitch => 22_050,
            ProcessingProfile::PitchTempo => 16_000,
        }
    }

    pub fn default_bins_per_octave(self) -> u32 {
        match self {
            ProcessingProfile::Pitch => 12,
            ProcessingProfile::PitchTempo => 24,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp3,
    Wav,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    #[serde(default)]
    pub profile: ProcessingProfile,
    /// Overrides the profile's sample rate.
    #[serde(default)]
    pub target_sample_rate_hz: Option<u32>,
    /// Overrides the profile's pitch resolution.
    #[serde(default)]
    pub bins_per_octave: Option<u32>,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default = "default_mp3_bitrate_kbps")]
    pub mp3_bitrate_kbps: u32,
    #[serde(default = "default_stage_timeout_ms")]
    pub stage_timeout_ms: u64,
    /// Replaces the profile's option table when present.
    #[serde(default)]
    pub options: Option<CustomOptionsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomOptionsConfig {
    pub default_option: String,
    #[serde(default)]
    pub entries: Vec<TransformOption>,
}

impl ProcessingConfig {
    pub fn effective_sample_rate_hz(&self) -> u32 {
        self.target_sample_rate_hz
            .unwrap_or_else(|| self.profile.default_sample_rate_hz())
    }

    pub fn effective_bins_per_octave(&self) -> u32 {
        self.bins_per_octave
            .unwrap_or_else(|| self.profile.default_bins_per_octave())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    #[default]
    Stream,
    Upload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub mode: DeliveryMode,
    /// File stem suggested to clients in stream mode.
    #[serde(default = "default_download_name")]
    pub download_name: String,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub cloud_name: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_folder")]
    pub folder: String,
    #[serde(default = "default_resource_type")]
    pub resource_type: String,
    #[serde(default = "default_quality")]
    pub quality: String,
    #[serde(default = "default_fetch_format")]
    pub fetch_format: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Directory for staged upload files; system temp dir when unset.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn has_credentials(&self) -> bool {
        !self.cloud_name.is_empty() && !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("api_base_url", &self.api_base_url)
            .field("folder", &self.folder)
            .field("resource_type", &self.resource_type)
            .field("quality", &self.quality)
            .field("fetch_format", &self.fetch_format)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("temp_dir", &self.temp_dir)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            profile: ProcessingProfile::default(),
            target_sample_rate_hz: None,
            bins_per_octave: None,
            output_format: OutputFormat::default(),
            mp3_bitrate_kbps: default_mp3_bitrate_kbps(),
            stage_timeout_ms: default_stage_timeout_ms(),
            options: None,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::default(),
            download_name: default_download_name(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cloud_name: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            api_base_url: default_api_base_url(),
            folder: default_folder(),
            resource_type: default_resource_type(),
            quality: default_quality(),
            fetch_format: default_fetch_format(),
            request_timeout_ms: default_request_timeout_ms(),
            temp_dir: None,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl VoiceConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Applies `VOICE_SERVICE_*` overrides (and the bare `PORT` convention)
    /// read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            let key = format!("{CONFIG_PREFIX}_{suffix}");
            lookup(&key).map(|value| (key, value))
        };

        if let Some(value) = lookup("PORT") {
            self.server.port = parse_override("PORT", &value)?;
        }
        if let Some((key, value)) = var("SERVER_PORT") {
            self.server.port = parse_override(&key, &value)?;
        }
        if let Some((_, value)) = var("SERVER_HOST") {
            self.server.host = value;
        }
        if let Some((key, value)) = var("MAX_UPLOAD_BYTES") {
            self.server.max_upload_bytes = parse_override(&key, &value)?;
        }
        if let Some((_, value)) = var("LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some((key, value)) = var("PROFILE") {
            self.processing.profile = match value.as_str() {
                "pitch" => ProcessingProfile::Pitch,
                "pitch_tempo" => ProcessingProfile::PitchTempo,
                _ => return Err(ConfigError::InvalidOverride { key, value }),
            };
        }
        if let Some((key, value)) = var("OUTPUT_FORMAT") {
            self.processing.output_format = match value.as_str() {
                "mp3" => OutputFormat::Mp3,
                "wav" => OutputFormat::Wav,
                _ => return Err(ConfigError::InvalidOverride { key, value }),
            };
        }
        if let Some((key, value)) = var("STAGE_TIMEOUT_MS") {
            self.processing.stage_timeout_ms = parse_override(&key, &value)?;
        }
        if let Some((key, value)) = var("DELIVERY_MODE") {
            self.delivery.mode = match value.as_str() {
                "stream" => DeliveryMode::Stream,
                "upload" => DeliveryMode::Upload,
                _ => return Err(ConfigError::InvalidOverride { key, value }),
            };
        }
        if let Some((_, value)) = var("STORAGE_CLOUD_NAME") {
            self.storage.cloud_name = value;
        }
        if let Some((_, value)) = var("STORAGE_API_KEY") {
            self.storage.api_key = value;
        }
        if let Some((_, value)) = var("STORAGE_API_SECRET") {
            self.storage.api_secret = value;
        }
        if let Some((_, value)) = var("STORAGE_FOLDER") {
            self.storage.folder = value;
        }
        if let Some((_, value)) = var("CORS_ALLOWED_ORIGINS") {
            self.cors.allowed_origins = value
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sample_rate_hz = self.processing.effective_sample_rate_hz();
        if !MP3_SAMPLE_RATES_HZ.contains(&sample_rate_hz) {
            return Err(ConfigError::Invalid(format!(
                "target sample rate {sample_rate_hz} Hz is not one of {MP3_SAMPLE_RATES_HZ:?}"
            )));
        }
        if self.processing.effective_bins_per_octave() == 0 {
            return Err(ConfigError::Invalid(
                "bins_per_octave must be greater than zero".to_string(),
            ));
        }
        if self.processing.output_format == OutputFormat::Mp3
            && !mp3_bitrate_supported(sample_rate_hz, self.processing.mp3_bitrate_kbps)
        {
            return Err(ConfigError::Invalid(format!(
                "mp3 bitrate {} kbps is not supported at {sample_rate_hz} Hz",
                self.processing.mp3_bitrate_kbps
            )));
        }
        if let Some(options) = &self.processing.options {
            if !options
                .entries
                .iter()
                .any(|entry| entry.key == options.default_option)
            {
                return Err(ConfigError::Invalid(format!(
                    "default option `{}` is not one of the configured options",
                    options.default_option
                )));
            }
        }
        if self.processing.stage_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "stage_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.delivery.mode == DeliveryMode::Upload && !self.storage.has_credentials() {
            return Err(ConfigError::Invalid(
                "upload delivery requires storage cloud_name, api_key and api_secret".to_string(),
            ));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_upload_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidOverride {
            key: key.to_string(),
            value: value.to_string(),
        })
}

/// Loads `VOICE_SERVICE_CONFIG`, else `config/<RUN_ENV>.toml` when present,
/// else defaults; then applies environment overrides and validates.
pub fn load_config() -> Result<VoiceConfig, ConfigError> {
    let mut config = match config_file_path() {
        Some(path) => VoiceConfig::from_file(&path)?,
        None => VoiceConfig::default(),
    };
    config.apply_env_overrides(|key| env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = env::var(format!("{CONFIG_PREFIX}_CONFIG")) {
        return Some(PathBuf::from(path));
    }
    let run_env = env::var("RUN_ENV").unwrap_or_else(|_| "development".to_string());
    let candidate = PathBuf::from("config").join(format!("{run_env}.toml"));
    candidate.is_file().then_some(candidate)
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_max_upload_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_mp3_bitrate_kbps() -> u32 {
    128
}

fn default_stage_timeout_ms() -> u64 {
    60_000
}

fn default_download_name() -> String {
    "modified_audio".to_string()
}

fn default_api_base_url() -> String {
    "https://api.cloudinary.com".to_string()
}

fn default_folder() -> String {
    "audio_processing".to_string()
}

fn default_resource_type() -> String {
    "auto".to_string()
}

fn default_quality() -> String {
    "auto:low".to_string()
}

fn default_fetch_format() -> String {
    "auto".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "https://stealth-frontend.onrender.com".to_string(),
        "https://stealth-backend-kj78.onrender.com".to_string(),
        "https://voice-changer-3.onrender.com".to_string(),
    ]
}
