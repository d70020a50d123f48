// Media acquisition: yt-dlp audio extraction and thumbnail retrieval.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Outcome of a successful audio fetch.
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    /// Path to the extracted MP3 inside the job's working directory.
    pub audio_path: PathBuf,
    pub artist: String,
    pub title: String,
    /// The 11-character video id, when the URL carried one.
    pub video_id: Option<String>,
}

/// Extract the 11-character video id from a YouTube URL.
///
/// Handles the common URL shapes (`watch?v=`, `youtu.be/`, `/shorts/`,
/// `/embed/`). Returns None for anything else rather than guessing.
pub fn extract_video_id(url: &str) -> Option<String> {
    const MARKERS: [&str; 4] = ["v=", "youtu.be/", "/shorts/", "/embed/"];

    for marker in MARKERS {
        if let Some(pos) = url.find(marker) {
            let candidate: String = url[pos + marker.len()..]
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
                .take(11)
                .collect();
            if candidate.len() == 11 {
                return Some(candidate);
            }
        }
    }
    None
}

/// Split an uploaded title into (artist, title).
///
/// Titles of the form "Artist - Title" split on the first " - "; anything
/// else keeps the full string as the title and falls back to the uploader
/// name for the artist.
pub fn parse_video_title(raw_title: &str, uploader: &str) -> (String, String) {
    match raw_title.split_once(" - ") {
        Some((artist, title)) => (artist.trim().to_string(), title.trim().to_string()),
        None => (uploader.trim().to_string(), raw_title.trim().to_string()),
    }
}

/// Download the audio of `url` as MP3 into `workdir` via yt-dlp.
///
/// yt-dlp handles format selection and the ffmpeg transcode; we read the
/// title, uploader and final file path from its `--print` output.
pub async fn download_audio(url: &str, workdir: &Path) -> Result<FetchedMedia> {
    let output_template = workdir.join("%(id)s.%(ext)s");

    info!("Fetching audio for {}", url);
    let output = Command::new("yt-dlp")
        .arg("--no-playlist")
        .arg("-f")
        .arg("bestaudio/best")
        .arg("-x")
        .arg("--audio-format")
        .arg("mp3")
        .arg("--audio-quality")
        .arg("192K")
        .arg("-o")
        .arg(&output_template)
        .arg("--no-simulate")
        .arg("--print")
        .arg("title")
        .arg("--print")
        .arg("uploader")
        .arg("--print")
        .arg("after_move:filepath")
        .arg(url)
        .output()
        .await
        .map_err(|e| Error::Fetch(format!("failed to spawn yt-dlp: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Fetch(format!(
            "yt-dlp exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut lines = stdout.lines();
    let raw_title = lines
        .next()
        .ok_or_else(|| Error::Fetch("yt-dlp printed no title".to_string()))?;
    let uploader = lines
        .next()
        .ok_or_else(|| Error::Fetch("yt-dlp printed no uploader".to_string()))?;
    let filepath = lines
        .next()
        .ok_or_else(|| Error::Fetch("yt-dlp printed no file path".to_string()))?;

    let audio_path = PathBuf::from(filepath.trim());
    if !audio_path.is_file() {
        return Err(Error::Fetch(format!(
            "yt-dlp reported {} but the file does not exist",
            audio_path.display()
        )));
    }

    let (artist, title) = parse_video_title(raw_title, uploader);

    Ok(FetchedMedia {
        audio_path,
        artist,
        title,
        video_id: extract_video_id(url),
    })
}

/// Fetch the video's cover image into `workdir`, trying thumbnail qualities
/// from best to worst.
///
/// Any failure (timeout, HTTP error, placeholder response) is tolerated and
/// yields None; a missing cover never fails the job.
pub async fn download_thumbnail(
    video_id: &str,
    workdir: &Path,
    timeout: Duration,
) -> Option<PathBuf> {
    // YouTube serves a tiny gray placeholder for missing qualities, so a
    // 200 response alone is not enough; require a plausible image size.
    const QUALITIES: [&str; 4] = ["maxresdefault", "sddefault", "hqdefault", "0"];
    const MIN_IMAGE_BYTES: usize = 1000;

    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            warn!("Failed to build thumbnail client: {}", e);
            return None;
        }
    };

    for quality in QUALITIES {
        let url = format!("https://img.youtube.com/vi/{}/{}.jpg", video_id, quality);
        let response = match client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("Thumbnail fetch {} failed: {}", url, e);
                continue;
            }
        };
        if !response.status().is_success() {
            continue;
        }
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Thumbnail body {} failed: {}", url, e);
                continue;
            }
        };
        if bytes.len() <= MIN_IMAGE_BYTES {
            continue;
        }

        let path = workdir.join(format!("{}.jpg", video_id));
        match tokio::fs::write(&path, &bytes).await {
            Ok(()) => {
                debug!("Thumbnail saved at {} quality", quality);
                return Some(path);
            }
            Err(e) => {
                warn!("Failed to write thumbnail: {}", e);
                return None;
            }
        }
    }

    debug!("No usable thumbnail for {}", video_id);
    None
}
