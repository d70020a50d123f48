// Musical key detection: chromagram + reference-profile correlation.
//
// Algorithm:
// 1. Slide a Hanning-windowed FFT across the signal and accumulate power per
//    pitch class (C through B, 65Hz–2000Hz) into a single 12-bin vector —
//    a chromagram summed over time.
// 2. Correlate that vector (Pearson) against all 12 rotations of fixed major
//    and minor key profiles.
// 3. Report the pitch class of the best rotation. Tie-break contract: only a
//    strictly greater best-major correlation yields a Major label; equality
//    resolves to Minor.
//
// The profiles are the empirically derived 12-element weightings of the
// Krumhansl-Schmuckler family; the tonic entry carries the most weight.

use rustfft::{num_complex::Complex, FftPlanner};
use std::f64::consts::PI;

use super::decoder::MonoAudio;

/// FFT window size for chromagram computation.
/// 4096 samples gives ~10Hz resolution at 44100Hz, enough to separate
/// adjacent semitones in the lower octaves.
const FFT_SIZE: usize = 4096;

/// Hop size between consecutive FFT frames (50% overlap).
const HOP_SIZE: usize = 2048;

/// Minimum frequency considered (Hz). Below ~C2 bass rumble dominates.
const MIN_FREQ: f64 = 65.0;

/// Maximum frequency considered (Hz). Above ~2kHz harmonics rather than
/// fundamentals dominate the pitch class distribution.
const MAX_FREQ: f64 = 2000.0;

const MAJOR_PROFILE: [f64; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.32, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];

const MINOR_PROFILE: [f64; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

/// Pitch class names, indexed 0=C through 11=B.
const PITCH_CLASSES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Detect the key of decoded mono audio.
///
/// Returns one of the 24 labels `"<PitchClass> Major|Minor"`.
pub fn detect_key_from_samples(audio: &MonoAudio) -> Result<String, String> {
    if audio.samples.is_empty() {
        return Err("No audio samples to analyze".to_string());
    }

    if audio.samples.len() < FFT_SIZE {
        return Err(format!(
            "Audio too short for key detection: {} samples (need at least {})",
            audio.samples.len(),
            FFT_SIZE
        ));
    }

    let chromagram = compute_chromagram(&audio.samples, audio.sample_rate)?;
    Ok(classify_chroma(&chromagram))
}

/// Pick the key label for a summed 12-bin chroma energy vector.
///
/// `max_major > max_minor` strictly yields the Major label; otherwise —
/// including exact equality — the Minor label wins. Among equally good
/// rotations of one profile, the lowest pitch class wins.
pub fn classify_chroma(chroma: &[f64; 12]) -> String {
    let (major_root, max_major) = best_rotation(chroma, &MAJOR_PROFILE);
    let (minor_root, max_minor) = best_rotation(chroma, &MINOR_PROFILE);

    if max_major > max_minor {
        format!("{} Major", PITCH_CLASSES[major_root])
    } else {
        format!("{} Minor", PITCH_CLASSES[minor_root])
    }
}

/// Best-correlating rotation of `profile` against `chroma`:
/// (root pitch class, correlation).
fn best_rotation(chroma: &[f64; 12], profile: &[f64; 12]) -> (usize, f64) {
    let mut best_root = 0;
    let mut best_corr = f64::NEG_INFINITY;
    for root in 0..12 {
        let corr = pearson_correlation(chroma, profile, root);
        if corr > best_corr {
            best_corr = corr;
            best_root = root;
        }
    }
    (best_root, best_corr)
}

/// Compute a 12-bin chromagram summed across all FFT frames.
///
/// Each bin is the accumulated power for one pitch class, normalized so the
/// vector sums to 1.0 (removes amplitude/duration dependence).
fn compute_chromagram(samples: &[f32], sample_rate: u32) -> Result<[f64; 12], String> {
    let mut chromagram = [0.0f64; 12];
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(FFT_SIZE);

    // Precompute Hanning window coefficients
    let window: Vec<f64> = (0..FFT_SIZE)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / (FFT_SIZE - 1) as f64).cos()))
        .collect();

    // Frequency-to-pitch-class mapping per FFT bin (12-TET, A4=440Hz):
    //   semitones_from_A = 12 * log2(freq / 440)
    //   pitch_class = (round(semitones_from_A) + 9) mod 12
    // The +9 shifts A-based indexing to C-based (C=0, ..., A=9, ..., B=11).
    let bin_to_pitch_class: Vec<Option<usize>> = (0..FFT_SIZE / 2 + 1)
        .map(|bin| {
            let freq = bin as f64 * sample_rate as f64 / FFT_SIZE as f64;
            if freq < MIN_FREQ || freq > MAX_FREQ {
                None
            } else {
                let semitones_from_a = 12.0 * (freq / 440.0).log2();
                let pitch_class = ((semitones_from_a.round() as i32 + 9) % 12 + 12) % 12;
                Some(pitch_class as usize)
            }
        })
        .collect();

    let num_frames = (samples.len().saturating_sub(FFT_SIZE)) / HOP_SIZE + 1;

    for frame_idx in 0..num_frames {
        let start = frame_idx * HOP_SIZE;
        let end = start + FFT_SIZE;
        if end > samples.len() {
            break;
        }

        let mut buffer: Vec<Complex<f64>> = samples[start..end]
            .iter()
            .enumerate()
            .map(|(i, &s)| Complex::new(s as f64 * window[i], 0.0))
            .collect();

        fft.process(&mut buffer);

        for (bin, pc) in bin_to_pitch_class.iter().enumerate() {
            if let Some(pc) = pc {
                chromagram[*pc] += buffer[bin].norm_sqr();
            }
        }
    }

    let total: f64 = chromagram.iter().sum();
    if total > 0.0 {
        for val in chromagram.iter_mut() {
            *val /= total;
        }
    }

    Ok(chromagram)
}

/// Pearson correlation between the chromagram and a key profile rotated so
/// the tonic (profile index 0) aligns with pitch class `root`.
///
/// r = (n·Σxy - Σx·Σy) / sqrt((n·Σx² - (Σx)²) · (n·Σy² - (Σy)²))
fn pearson_correlation(chroma: &[f64; 12], profile: &[f64; 12], root: usize) -> f64 {
    let n = 12.0;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_x2 = 0.0;
    let mut sum_y2 = 0.0;

    for i in 0..12 {
        let x = chroma[(root + i) % 12];
        let y = profile[i];

        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_x2 += x * x;
        sum_y2 += y * y;
    }

    let numerator = n * sum_xy - sum_x * sum_y;
    let denominator = ((n * sum_x2 - sum_x * sum_x) * (n * sum_y2 - sum_y * sum_y)).sqrt();

    if denominator < 1e-10 {
        0.0 // Constant/silence input
    } else {
        numerator / denominator
    }
}
