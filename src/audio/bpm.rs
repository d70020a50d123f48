// Tempo (BPM) estimation using aubio's Tempo tracker.
//
// Audio is fed in overlapping frames to the tracker, which performs onset
// detection plus autocorrelation and yields a tempo estimate for the whole
// signal. Rounding to an integer BPM happens in the analysis facade.

use bliss_audio_aubio_rs::{OnsetMode, Tempo};

use super::decoder::MonoAudio;

/// FFT window size for onset detection.
const BUF_SIZE: usize = 1024;

/// Hop size between frames. 512 = 50% overlap, good temporal resolution for
/// beat tracking.
const HOP_SIZE: usize = 512;

/// Estimate the tempo of decoded mono audio, in beats per minute.
///
/// Returns the raw floating-point estimate. A tracker result that is not a
/// usable tempo (zero, negative, non-finite) collapses to 0.0.
pub fn detect_bpm_from_samples(audio: &MonoAudio) -> Result<f64, String> {
    if audio.samples.is_empty() {
        return Err("No audio samples to analyze".to_string());
    }

    // SpecFlux tracks spectral changes, which holds up on complex material
    let mut tempo = Tempo::new(OnsetMode::SpecFlux, BUF_SIZE, HOP_SIZE, audio.sample_rate)
        .map_err(|e| format!("Failed to create tempo tracker: {:?}", e))?;

    let samples = &audio.samples;
    let total_hops = samples.len() / HOP_SIZE;
    for i in 0..total_hops {
        let start = i * HOP_SIZE;
        let end = start + HOP_SIZE;
        if end > samples.len() {
            break;
        }
        // Each call feeds one frame into the tracker's beat state
        tempo
            .do_result(&samples[start..end])
            .map_err(|e| format!("Tempo detection error at frame {}: {:?}", i, e))?;
    }

    let bpm = tempo.get_bpm() as f64;
    if !bpm.is_finite() || bpm <= 0.0 {
        return Ok(0.0);
    }
    Ok(bpm)
}
