// Metadata embedding: ffmpeg for cover art, lofty for text-only tagging.

use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Text tags written into the final MP3.
#[derive(Debug, Clone)]
pub struct TrackTags {
    pub artist: String,
    pub title: String,
    pub bpm: u32,
    pub key: String,
}

impl TrackTags {
    pub fn album(&self) -> String {
        format!("{} - {}", self.artist, self.title)
    }

    /// Comment carries the analysis summary so it survives players that hide
    /// custom frames.
    pub fn comment(&self) -> String {
        format!("BPM: {}, Key: {}", self.bpm, self.key)
    }
}

/// Outcome of the tagging stage.
#[derive(Debug, Clone)]
pub struct TaggedAudio {
    /// Final audio file carrying the tags (and cover, when embedded).
    pub final_path: PathBuf,
    pub cover_embedded: bool,
}

/// Write tags into `audio`, embedding `thumbnail` as attached cover art when
/// one is available.
///
/// Cover embedding requires remuxing, which is ffmpeg's job; when there is no
/// cover (or ffmpeg produces a suspiciously small file) we tag in place with
/// lofty instead.
pub async fn embed_metadata(
    audio: &Path,
    thumbnail: Option<&Path>,
    tags: &TrackTags,
) -> Result<TaggedAudio> {
    if let Some(thumbnail) = thumbnail {
        match embed_with_ffmpeg(audio, thumbnail, tags).await {
            Ok(final_path) => {
                return Ok(TaggedAudio {
                    final_path,
                    cover_embedded: true,
                })
            }
            Err(e) => {
                warn!("ffmpeg cover embed failed, tagging without cover: {}", e);
            }
        }
    }

    let path = audio.to_path_buf();
    let tags = tags.clone();
    tokio::task::spawn_blocking(move || embed_with_lofty(&path, &tags))
        .await
        .map_err(|e| Error::Tagging(format!("tagging task panicked: {}", e)))??;

    Ok(TaggedAudio {
        final_path: audio.to_path_buf(),
        cover_embedded: false,
    })
}

/// Remux with ffmpeg: copy the audio stream, attach the cover as a video
/// stream with the attached_pic disposition, and write id3v2.3 text frames.
async fn embed_with_ffmpeg(audio: &Path, thumbnail: &Path, tags: &TrackTags) -> Result<PathBuf> {
    let file_name = audio
        .file_name()
        .ok_or_else(|| Error::Tagging("audio path has no file name".to_string()))?
        .to_string_lossy();
    let output = audio.with_file_name(format!("tagged_{}", file_name));

    let status = Command::new("ffmpeg")
        .arg("-y")
        .arg("-i")
        .arg(audio)
        .arg("-i")
        .arg(thumbnail)
        .arg("-map")
        .arg("0:0")
        .arg("-map")
        .arg("1:0")
        .arg("-c:a")
        .arg("copy")
        .arg("-c:v")
        .arg("copy")
        .arg("-disposition:v")
        .arg("attached_pic")
        .arg("-id3v2_version")
        .arg("3")
        .arg("-metadata")
        .arg(format!("title={}", tags.title))
        .arg("-metadata")
        .arg(format!("artist={}", tags.artist))
        .arg("-metadata")
        .arg(format!("album={}", tags.album()))
        .arg("-metadata")
        .arg(format!("comment={}", tags.comment()))
        .arg("-metadata")
        .arg(format!("TBPM={}", tags.bpm))
        .arg("-metadata")
        .arg(format!("TKEY={}", tags.key))
        .arg("-metadata:s:v")
        .arg("title=Album cover")
        .arg("-metadata:s:v")
        .arg("comment=Cover (front)")
        .arg(&output)
        .output()
        .await
        .map_err(|e| Error::Tagging(format!("failed to spawn ffmpeg: {}", e)))?;

    if !status.status.success() {
        let stderr = String::from_utf8_lossy(&status.stderr);
        return Err(Error::Tagging(format!(
            "ffmpeg exited with {}: {}",
            status.status,
            stderr.trim()
        )));
    }

    // ffmpeg can exit 0 while writing a truncated file on a broken input
    let size = tokio::fs::metadata(&output)
        .await
        .map(|m| m.len())
        .unwrap_or(0);
    if size <= 1000 {
        let _ = tokio::fs::remove_file(&output).await;
        return Err(Error::Tagging(format!(
            "ffmpeg output implausibly small ({} bytes)",
            size
        )));
    }

    tokio::fs::remove_file(audio)
        .await
        .map_err(|e| Error::Tagging(format!("failed to remove untagged original: {}", e)))?;
    info!("Embedded cover art into {}", output.display());
    Ok(output)
}

/// Tag in place with lofty. No cover handling here.
fn embed_with_lofty(path: &Path, tags: &TrackTags) -> Result<()> {
    use lofty::config::WriteOptions;
    use lofty::prelude::*;
    use lofty::tag::{Tag, TagType};

    let mut tagged_file = lofty::read_from_path(path)
        .map_err(|e| Error::Tagging(format!("failed to read {}: {}", path.display(), e)))?;

    let tag = match tagged_file.primary_tag_mut() {
        Some(tag) => tag,
        None => {
            tagged_file.insert_tag(Tag::new(TagType::Id3v2));
            tagged_file
                .primary_tag_mut()
                .ok_or_else(|| Error::Tagging("failed to create ID3v2 tag".to_string()))?
        }
    };

    tag.set_title(tags.title.clone());
    tag.set_artist(tags.artist.clone());
    tag.set_album(tags.album());
    tag.set_comment(tags.comment());
    tag.insert_text(ItemKey::Bpm, tags.bpm.to_string());
    tag.insert_text(ItemKey::InitialKey, tags.key.clone());

    tagged_file
        .save_to_path(path, WriteOptions::default())
        .map_err(|e| Error::Tagging(format!("failed to save tags: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_album_is_artist_title_and_comment_carries_analysis() {
        let tags = TrackTags {
            artist: "Daft Punk".to_string(),
            title: "Around the World".to_string(),
            bpm: 121,
            key: "A Minor".to_string(),
        };
        assert_eq!(tags.album(), "Daft Punk - Around the World");
        assert_eq!(tags.comment(), "BPM: 121, Key: A Minor");
    }

    #[test]
    fn test_unknown_analysis_still_formats() {
        let tags = TrackTags {
            artist: "Uploader".to_string(),
            title: "Untitled".to_string(),
            bpm: 0,
            key: "Unknown".to_string(),
        };
        assert_eq!(tags.album(), "Uploader - Untitled");
        assert_eq!(tags.comment(), "BPM: 0, Key: Unknown");
    }
}
