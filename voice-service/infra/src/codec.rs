use std::io::Cursor;

use mp3lame_encoder::{Bitrate, Builder, FlushNoGap, MonoPcm, Quality};
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};
use voice_domain::{
    mp3_bitrate_supported, AudioBuffer, AudioCodecPort, AudioFormat, DomainError, EncodeOptions,
    EncodedBlob,
};

use crate::resample::{clamp_samples, resample};

/// LAME wants at least this much spare room for the final flush.
const MP3_FLUSH_RESERVE: usize = 7200;

/// Decodes uploads with hound (WAV) or symphonia (everything else) and
/// encodes with hound (WAV) or LAME (MP3).
#[derive(Default)]
pub struct AudioCodecAdapter;

impl AudioCodecAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl AudioCodecPort for AudioCodecAdapter {
    fn decode(
        &self,
        blob: EncodedBlob,
        target_sample_rate_hz: u32,
    ) -> Result<AudioBuffer, DomainError> {
        if target_sample_rate_hz == 0 {
            return Err(DomainError::internal_error(
                "target sample rate must be greater than zero",
            ));
        }
        if blob.is_empty() {
            return Err(DomainError::corrupt_input("input contains no bytes"));
        }

        let input_format = blob.format.clone();
        let decoded = match input_format {
            AudioFormat::Wav => decode_wav(&blob.bytes)?,
            _ => decode_with_symphonia(blob)?,
        };
        if decoded.frame_count() == 0 || decoded.sample_rate_hz == 0 {
            return Err(DomainError::corrupt_input("no audio frames decoded"));
        }

        let source_sample_rate_hz = decoded.sample_rate_hz;
        let source_channels = decoded.channels;
        let mono = decoded.downmix_to_mono();
        let samples = resample(&mono.samples, source_sample_rate_hz, target_sample_rate_hz)
            .map_err(|err| DomainError::internal_error(err.to_string()))?;

        tracing::debug!(
            input_format = %input_format,
            source_sample_rate_hz,
            source_channels,
            target_sample_rate_hz,
            frames = samples.len(),
            "decoded audio to mono pcm"
        );

        Ok(AudioBuffer::mono(samples, target_sample_rate_hz))
    }

    fn encode(
        &self,
        buffer: &AudioBuffer,
        options: &EncodeOptions,
    ) -> Result<EncodedBlob, DomainError> {
        if buffer.is_empty() || buffer.sample_rate_hz == 0 {
            return Err(DomainError::encode_failure("no samples to encode"));
        }

        let mut output = if options.channels == 1 && buffer.channels != 1 {
            buffer.clone().downmix_to_mono()
        } else {
            buffer.clone()
        };
        if clamp_samples(&mut output.samples) {
            tracing::debug!("clipped samples outside [-1, 1] before encoding");
        }

        let bytes = match options.format {
            AudioFormat::Wav => encode_wav(&output)?,
            AudioFormat::Mp3 => encode_mp3(&output, options.bitrate_kbps)?,
            ref other => {
                return Err(DomainError::encode_failure(format!(
                    "encoding to `{other}` is not supported"
                )))
            }
        };

        Ok(EncodedBlob::new(bytes, options.format.clone()))
    }
}

fn decode_wav(bytes: &[u8]) -> Result<AudioBuffer, DomainError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes)).map_err(map_wav_error)?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_wav_error)?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 / scale))
                .collect::<Result<Vec<_>, _>>()
                .map_err(map_wav_error)?
        }
    };

    Ok(AudioBuffer {
        samples,
        sample_rate_hz: spec.sample_rate,
        channels: spec.channels,
    })
}

fn map_wav_error(err: hound::Error) -> DomainError {
    match err {
        hound::Error::Unsupported => {
            DomainError::unsupported_format("wav", "unsupported wav encoding")
        }
        other => DomainError::corrupt_input(format!("invalid wav data: {other}")),
    }
}

fn decode_with_symphonia(blob: EncodedBlob) -> Result<AudioBuffer, DomainError> {
    let format_name = blob.format.to_string();
    let mut hint = Hint::new();
    hint.with_extension(blob.format.extension());
    let mss = MediaSourceStream::new(Box::new(Cursor::new(blob.bytes)), Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions {
                enable_gapless: true,
                ..Default::default()
            },
            &MetadataOptions::default(),
        )
        .map_err(|err| DomainError::unsupported_format(&format_name, err.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
        .cloned()
        .ok_or_else(|| DomainError::unsupported_format(&format_name, "no decodable audio track"))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| DomainError::unsupported_format(&format_name, err.to_string()))?;

    let mut sample_rate_hz = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|layout| layout.count() as u16)
        .unwrap_or(1);
    let mut samples = Vec::new();
    let mut skipped_packets = 0_usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => {
                return Err(DomainError::corrupt_input(format!(
                    "{format_name} stream failed mid-decode: {err}"
                )))
            }
        };

        if packet.track_id() != track.id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate_hz = spec.rate;
                channels = spec.channels.count() as u16;
                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            Err(SymphoniaError::DecodeError(err)) => {
                skipped_packets += 1;
                tracing::debug!(error = %err, "skipping undecodable packet");
            }
            Err(err) => {
                return Err(DomainError::corrupt_input(format!(
                    "{format_name} decoder failed: {err}"
                )))
            }
        }
    }

    if skipped_packets > 0 {
        tracing::warn!(skipped_packets, input_format = %format_name, "dropped corrupt packets");
    }

    Ok(AudioBuffer {
        samples,
        sample_rate_hz,
        channels: channels.max(1),
    })
}

fn to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16
}

fn encode_wav(buffer: &AudioBuffer) -> Result<Vec<u8>, DomainError> {
    let spec = hound::WavSpec {
        channels: buffer.channels,
        sample_rate: buffer.sample_rate_hz,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let wav_error = |err: hound::Error| DomainError::encode_failure(format!("wav writer: {err}"));

    let mut cursor = Cursor::new(Vec::with_capacity(44 + buffer.samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(wav_error)?;
        for sample in &buffer.samples {
            writer.write_sample(to_pcm16(*sample)).map_err(wav_error)?;
        }
        writer.finalize().map_err(wav_error)?;
    }
    Ok(cursor.into_inner())
}

fn lame_bitrate(kbps: u32) -> Result<Bitrate, DomainError> {
    let bitrate = match kbps {
        8 => Bitrate::Kbps8,
        16 => Bitrate::Kbps16,
        24 => Bitrate::Kbps24,
        32 => Bitrate::Kbps32,
        40 => Bitrate::Kbps40,
        48 => Bitrate::Kbps48,
        64 => Bitrate::Kbps64,
        80 => Bitrate::Kbps80,
        96 => Bitrate::Kbps96,
        112 => Bitrate::Kbps112,
        128 => Bitrate::Kbps128,
        160 => Bitrate::Kbps160,
        192 => Bitrate::Kbps192,
        224 => Bitrate::Kbps224,
        256 => Bitrate::Kbps256,
        320 => Bitrate::Kbps320,
        other => {
            return Err(DomainError::encode_failure(format!(
                "unsupported mp3 bitrate {other} kbps"
            )))
        }
    };
    Ok(bitrate)
}

fn encode_mp3(buffer: &AudioBuffer, bitrate_kbps: u32) -> Result<Vec<u8>, DomainError> {
    if buffer.channels != 1 {
        return Err(DomainError::encode_failure("mp3 output is mono only"));
    }
    if !mp3_bitrate_supported(buffer.sample_rate_hz, bitrate_kbps) {
        return Err(DomainError::encode_failure(format!(
            "{bitrate_kbps} kbps is not a valid mp3 bitrate at {} Hz",
            buffer.sample_rate_hz
        )));
    }
    let lame_error = |stage: &str, detail: String| {
        DomainError::encode_failure(format!("lame {stage}: {detail}"))
    };

    let mut builder =
        Builder::new().ok_or_else(|| lame_error("init", "allocation failed".to_string()))?;
    builder
        .set_num_channels(1)
        .map_err(|err| lame_error("channels", format!("{err:?}")))?;
    builder
        .set_sample_rate(buffer.sample_rate_hz)
        .map_err(|err| lame_error("sample rate", format!("{err:?}")))?;
    builder
        .set_brate(lame_bitrate(bitrate_kbps)?)
        .map_err(|err| lame_error("bitrate", format!("{err:?}")))?;
    builder
        .set_quality(Quality::Good)
        .map_err(|err| lame_error("quality", format!("{err:?}")))?;
    let mut encoder = builder
        .build()
        .map_err(|err| lame_error("build", format!("{err:?}")))?;

    let pcm: Vec<i16> = buffer.samples.iter().copied().map(to_pcm16).collect();
    let mut output = Vec::with_capacity(mp3lame_encoder::max_required_buffer_size(pcm.len()));
    encoder
        .encode_to_vec(MonoPcm(&pcm), &mut output)
        .map_err(|err| lame_error("encode", format!("{err:?}")))?;
    output.reserve(MP3_FLUSH_RESERVE);
    encoder
        .flush_to_vec::<FlushNoGap>(&mut output)
        .map_err(|err| lame_error("flush", format!("{err:?}")))?;

    Ok(output)
}
