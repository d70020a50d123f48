// Analysis facade: decode once, run both estimators, cache by content hash.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

use super::bpm::detect_bpm_from_samples;
use super::decoder::decode_to_mono;
use super::key::detect_key_from_samples;

/// Sentinel key label reported when detection is impossible.
pub const UNKNOWN_KEY: &str = "Unknown";

/// Combined analysis outcome for one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackAnalysis {
    /// Tempo in whole beats per minute, 0 when undetectable.
    pub bpm: u32,
    /// Key label such as "A Minor", or [`UNKNOWN_KEY`].
    pub key: String,
}

impl TrackAnalysis {
    fn unknown() -> Self {
        Self {
            bpm: 0,
            key: UNKNOWN_KEY.to_string(),
        }
    }
}

/// Tempo and key estimator with a process-lifetime result cache.
///
/// The cache is keyed by the SHA-256 of file content, so the same audio
/// reached through different paths is analyzed once. Entries are never
/// evicted.
#[derive(Default)]
pub struct Analyzer {
    cache: Mutex<HashMap<String, TrackAnalysis>>,
}

impl Analyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyze an audio file for BPM and key.
    ///
    /// This call never fails: any decode or estimation error collapses to
    /// `{ bpm: 0, key: "Unknown" }` so a broken source still yields a usable
    /// record. CPU-bound; callers on an async runtime should wrap this in
    /// `spawn_blocking`.
    pub fn analyze_file(&self, path: &Path) -> TrackAnalysis {
        let hash = match file_sha256(path) {
            Ok(hash) => hash,
            Err(e) => {
                warn!("Failed to hash {}: {}", path.display(), e);
                return TrackAnalysis::unknown();
            }
        };

        if let Some(cached) = self.cache.lock().unwrap().get(&hash) {
            debug!("Analysis cache hit for {}", path.display());
            return cached.clone();
        }

        let analysis = match analyze(path) {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!("Analysis failed for {}: {}", path.display(), e);
                TrackAnalysis::unknown()
            }
        };

        self.cache
            .lock()
            .unwrap()
            .insert(hash, analysis.clone());
        analysis
    }

    #[cfg(test)]
    fn cached_entries(&self) -> usize {
        self.cache.lock().unwrap().len()
    }
}

fn analyze(path: &Path) -> Result<TrackAnalysis, String> {
    let audio = decode_to_mono(path)?;
    analyze_samples(&audio)
}

fn analyze_samples(audio: &super::decoder::MonoAudio) -> Result<TrackAnalysis, String> {
    let tempo = detect_bpm_from_samples(audio)?;
    let key = detect_key_from_samples(audio)?;
    // Round half to even so e.g. 127.5 and 128.5 both land on 128
    let bpm = tempo.max(0.0).round_ties_even() as u32;
    Ok(TrackAnalysis { bpm, key })
}

/// SHA-256 of a file's content as lowercase hex.
fn file_sha256(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
