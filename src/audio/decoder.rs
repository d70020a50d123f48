// Audio decoding for analysis.
//
// Decodes an entire file to mono f32 PCM via symphonia. The samples stay at
// the file's native sample rate; the estimators work at any rate. Stereo and
// multichannel sources are mixed down by averaging all channels.

use std::path::Path;
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::conv::FromSample;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::warn;

/// Result of decoding an audio file: the input to all DSP analysis.
#[derive(Debug, Clone)]
pub struct MonoAudio {
    /// Mono samples in range [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate of the audio (e.g., 44100, 48000)
    pub sample_rate: u32,
}

/// Decode an entire audio file to mono f32 samples.
///
/// Reads the full file, decodes all packets, converts to f32 and mixes down
/// to mono. Corrupted packets are skipped rather than aborting the decode.
pub fn decode_to_mono(path: &Path) -> Result<MonoAudio, String> {
    let file = std::fs::File::open(path)
        .map_err(|e| format!("Failed to open audio file: {}", e))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension() {
        hint.with_extension(&ext.to_string_lossy());
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| format!("Failed to probe audio format: {}", e))?;

    let mut format_reader = probed.format;

    let track = format_reader
        .default_track()
        .ok_or_else(|| "No audio tracks found".to_string())?;

    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| format!("Failed to create decoder: {}", e))?;

    let mut all_samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break; // End of file
            }
            Err(e) => return Err(format!("Error reading packet: {}", e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(symphonia::core::errors::Error::DecodeError(msg)) => {
                warn!("Skipping corrupted packet: {}", msg);
                continue;
            }
            Err(e) => return Err(format!("Decode error: {}", e)),
        };

        let mono_chunk = convert_to_mono_f32(&decoded);
        all_samples.extend_from_slice(&mono_chunk);
    }

    Ok(MonoAudio {
        samples: all_samples,
        sample_rate,
    })
}

/// Convert a decoded buffer of any sample format to mono f32.
fn convert_to_mono_f32(decoded: &AudioBufferRef) -> Vec<f32> {
    match decoded {
        AudioBufferRef::F32(buf) => mix_to_mono_f32(buf),
        AudioBufferRef::U8(buf) => mix_to_mono_generic(buf),
        AudioBufferRef::U16(buf) => mix_to_mono_generic(buf),
        AudioBufferRef::U24(buf) => mix_to_mono_generic(buf),
        AudioBufferRef::U32(buf) => mix_to_mono_generic(buf),
        AudioBufferRef::S8(buf) => mix_to_mono_generic(buf),
        AudioBufferRef::S16(buf) => mix_to_mono_generic(buf),
        AudioBufferRef::S24(buf) => mix_to_mono_generic(buf),
        AudioBufferRef::S32(buf) => mix_to_mono_generic(buf),
        AudioBufferRef::F64(buf) => mix_to_mono_generic(buf),
    }
}

/// Mix f32 buffer channels down to mono
fn mix_to_mono_f32(buf: &symphonia::core::audio::AudioBuffer<f32>) -> Vec<f32> {
    let channels = buf.spec().channels.count();
    let frames = buf.frames();

    if channels == 0 || frames == 0 {
        return Vec::new();
    }

    if channels == 1 {
        buf.chan(0).to_vec()
    } else {
        let mut mono = vec![0.0f32; frames];
        let scale = 1.0 / channels as f32;
        for ch in 0..channels {
            let channel_data = buf.chan(ch);
            for (i, &sample) in channel_data.iter().enumerate() {
                mono[i] += sample * scale;
            }
        }
        mono
    }
}

/// Generic mixer: convert any sample format to f32 mono
fn mix_to_mono_generic<S>(buf: &symphonia::core::audio::AudioBuffer<S>) -> Vec<f32>
where
    S: symphonia::core::sample::Sample,
    f32: FromSample<S>,
{
    let channels = buf.spec().channels.count();
    let frames = buf.frames();

    if channels == 0 || frames == 0 {
        return Vec::new();
    }

    if channels == 1 {
        buf.chan(0).iter().map(|&s| f32::from_sample(s)).collect()
    } else {
        let mut mono = vec![0.0f32; frames];
        let scale = 1.0 / channels as f32;
        for ch in 0..channels {
            let channel_data = buf.chan(ch);
            for (i, &sample) in channel_data.iter().enumerate() {
                mono[i] += f32::from_sample(sample) * scale;
            }
        }
        mono
    }
}
