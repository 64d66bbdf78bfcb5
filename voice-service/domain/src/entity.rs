use std::fmt;

use serde::{Deserialize, Serialize};

/// Decoded PCM audio. Multi-channel samples are interleaved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate_hz: u32,
    pub channels: u16,
}

impl AudioBuffer {
    pub fn mono(samples: Vec<f32>, sample_rate_hz: u32) -> Self {
        Self {
            samples,
            sample_rate_hz,
            channels: 1,
        }
    }

    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate_hz == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate_hz as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Averages interleaved channels into a single channel.
    pub fn downmix_to_mono(self) -> Self {
        if self.channels <= 1 {
            return Self {
                channels: 1,
                ..self
            };
        }

        let channels = self.channels as usize;
        let samples = self
            .samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();

        Self {
            samples,
            sample_rate_hz: self.sample_rate_hz,
            channels: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Mp3,
    Aac,
    M4a,
    Flac,
    Ogg,
    Other(String),
}

impl AudioFormat {
    /// Derives the format from the lower-cased suffix after the last `.`.
    /// A name without a dot is taken as the suffix itself.
    pub fn from_file_name(file_name: &str) -> Self {
        let extension = file_name.rsplit('.').next().unwrap_or_default();
        Self::from_extension(extension)
    }

    pub fn from_extension(extension: &str) -> Self {
        match extension.trim().to_ascii_lowercase().as_str() {
            "wav" | "wave" => AudioFormat::Wav,
            "mp3" => AudioFormat::Mp3,
            "aac" => AudioFormat::Aac,
            "m4a" | "mp4" => AudioFormat::M4a,
            "flac" => AudioFormat::Flac,
            "ogg" | "oga" => AudioFormat::Ogg,
            other => AudioFormat::Other(other.to_string()),
        }
    }

    pub fn extension(&self) -> &str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Aac => "aac",
            AudioFormat::M4a => "m4a",
            AudioFormat::Flac => "flac",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Other(extension) => extension,
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Aac => "audio/aac",
            AudioFormat::M4a => "audio/mp4",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Ogg => "audio/ogg",
            AudioFormat::Other(_) => "application/octet-stream",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Compressed or container bytes tagged with their format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBlob {
    pub bytes: Vec<u8>,
    pub format: AudioFormat,
}

impl EncodedBlob {
    pub fn new(bytes: Vec<u8>, format: AudioFormat) -> Self {
        Self { bytes, format }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Sample rates an MP3 stream can carry (MPEG-1, MPEG-2 and MPEG-2.5).
pub const MP3_SAMPLE_RATES_HZ: [u32; 9] = [
    8_000, 11_025, 12_000, 16_000, 22_050, 24_000, 32_000, 44_100, 48_000,
];

/// Union of the MPEG-1 and MPEG-2 layer III bitrate tables.
pub const MP3_BITRATES_KBPS: [u32; 16] = [
    8, 16, 24, 32, 40, 48, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320,
];

/// Whether a layer III stream at `sample_rate_hz` can be encoded at `kbps`.
/// MPEG-1 rates (32 kHz and up) start at 32 kbps; lower rates stop at 160.
pub fn mp3_bitrate_supported(sample_rate_hz: u32, kbps: u32) -> bool {
    if !MP3_SAMPLE_RATES_HZ.contains(&sample_rate_hz) || !MP3_BITRATES_KBPS.contains(&kbps) {
        return false;
    }
    if sample_rate_hz >= 32_000 {
        kbps >= 32
    } else {
        kbps <= 160
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeOptions {
    pub format: AudioFormat,
    pub bitrate_kbps: u32,
    pub channels: u16,
}

impl EncodeOptions {
    pub fn mp3(bitrate_kbps: u32) -> Self {
        Self {
            format: AudioFormat::Mp3,
            bitrate_kbps,
            channels: 1,
        }
    }

    pub fn wav() -> Self {
        Self {
            format: AudioFormat::Wav,
            bitrate_kbps: 0,
            channels: 1,
        }
    }
}

/// Pitch component of an option table entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PitchParam {
    Fixed { steps: f64 },
    RandomRange { low: f64, high: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformOption {
    pub key: String,
    pub pitch: PitchParam,
    pub tempo_rate: Option<f64>,
}

impl TransformOption {
    pub fn new(key: impl Into<String>, pitch: PitchParam, tempo_rate: Option<f64>) -> Self {
        Self {
            key: key.into(),
            pitch,
            tempo_rate,
        }
    }
}

/// Concrete parameters handed to the transform stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformParams {
    pub pitch_steps: f64,
    pub tempo_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAudio {
    pub url: String,
    pub public_id: String,
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
}
