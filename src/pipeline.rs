// Job pipeline: fetch, analyze, tag, publish.
//
// One worker task per job, spawned at submission. Each stage records its
// progress in the store before it starts, so a polling client sees the stage
// the worker is currently in, not the one it finished.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

use crate::audio::analyze::Analyzer;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::{self, FetchedMedia};
use crate::jobs::store::JobStore;
use crate::jobs::{JobResult, JobStatus, JobUpdate};
use crate::tag::{self, TaggedAudio, TrackTags};

/// External collaborators of the pipeline: the downloader, the thumbnail
/// source and the tagger. A trait so tests can run the full pipeline against
/// synthetic media without network access or spawned processes.
#[async_trait]
pub trait MediaPipeline: Send + Sync {
    /// Fetch the audio for `url` into `workdir` as an MP3.
    async fn fetch_media(&self, url: &str, workdir: &Path) -> Result<FetchedMedia>;

    /// Fetch cover art for a video id, if any is available.
    async fn fetch_thumbnail(&self, video_id: &str, workdir: &Path) -> Option<PathBuf>;

    /// Embed tags (and optionally a cover) into the fetched audio.
    async fn embed_tags(
        &self,
        audio: &Path,
        thumbnail: Option<&Path>,
        tags: &TrackTags,
    ) -> Result<TaggedAudio>;
}

/// Production pipeline: yt-dlp, img.youtube.com and ffmpeg/lofty.
pub struct ExternalPipeline {
    thumbnail_timeout: Duration,
}

impl ExternalPipeline {
    pub fn new(config: &Config) -> Self {
        Self {
            thumbnail_timeout: config.thumbnail_timeout(),
        }
    }
}

#[async_trait]
impl MediaPipeline for ExternalPipeline {
    async fn fetch_media(&self, url: &str, workdir: &Path) -> Result<FetchedMedia> {
        fetch::download_audio(url, workdir).await
    }

    async fn fetch_thumbnail(&self, video_id: &str, workdir: &Path) -> Option<PathBuf> {
        fetch::download_thumbnail(video_id, workdir, self.thumbnail_timeout).await
    }

    async fn embed_tags(
        &self,
        audio: &Path,
        thumbnail: Option<&Path>,
        tags: &TrackTags,
    ) -> Result<TaggedAudio> {
        tag::embed_metadata(audio, thumbnail, tags).await
    }
}

/// Run one job to a terminal state. Any stage failure transitions the record
/// to Error with the cause in the message; this function itself never fails.
pub async fn run_job(
    store: Arc<JobStore>,
    analyzer: Arc<Analyzer>,
    pipeline: Arc<dyn MediaPipeline>,
    temp_root: PathBuf,
    id: Uuid,
    url: String,
) {
    if let Err(e) = drive(&store, &analyzer, pipeline.as_ref(), &temp_root, id, &url).await {
        error!("Job {} failed: {}", id, e);
        let _ = store.update(
            id,
            JobUpdate {
                status: Some(JobStatus::Error),
                progress: Some(0),
                message: Some(format!("Error: {}", e)),
                ..Default::default()
            },
        );
    }
}

async fn drive(
    store: &Arc<JobStore>,
    analyzer: &Arc<Analyzer>,
    pipeline: &dyn MediaPipeline,
    temp_root: &Path,
    id: Uuid,
    url: &str,
) -> Result<()> {
    store.update(
        id,
        JobUpdate {
            status: Some(JobStatus::Downloading),
            progress: Some(10),
            message: Some("Downloading audio...".to_string()),
            ..Default::default()
        },
    )?;

    tokio::fs::create_dir_all(temp_root).await?;
    // Scratch space is removed when the TempDir drops, success or not
    let workdir = tempfile::Builder::new()
        .prefix("job-")
        .tempdir_in(temp_root)?;

    let media = pipeline.fetch_media(url, workdir.path()).await?;
    let thumbnail = match &media.video_id {
        Some(video_id) => pipeline.fetch_thumbnail(video_id, workdir.path()).await,
        None => None,
    };

    store.update(
        id,
        JobUpdate {
            status: Some(JobStatus::Analyzing),
            progress: Some(50),
            message: Some("Analyzing audio for BPM and key...".to_string()),
            artist: Some(media.artist.clone()),
            title: Some(media.title.clone()),
            ..Default::default()
        },
    )?;

    let analysis = {
        let analyzer = Arc::clone(analyzer);
        let path = media.audio_path.clone();
        tokio::task::spawn_blocking(move || analyzer.analyze_file(&path))
            .await
            .map_err(|e| Error::Internal(format!("analysis task failed: {}", e)))?
    };
    info!(
        "Job {}: {} BPM, {} ({} - {})",
        id, analysis.bpm, analysis.key, media.artist, media.title
    );

    store.update(
        id,
        JobUpdate {
            status: Some(JobStatus::Processing),
            progress: Some(75),
            message: Some("Processing metadata and finalizing...".to_string()),
            bpm: Some(analysis.bpm),
            key: Some(analysis.key.clone()),
            ..Default::default()
        },
    )?;

    let tags = TrackTags {
        artist: media.artist.clone(),
        title: media.title.clone(),
        bpm: analysis.bpm,
        key: analysis.key.clone(),
    };
    let tagged = pipeline
        .embed_tags(&media.audio_path, thumbnail.as_deref(), &tags)
        .await?;

    let data = tokio::fs::read(&tagged.final_path).await?;
    let filename = format!("{} - {}.mp3", media.artist, media.title);

    let mut metadata = BTreeMap::new();
    metadata.insert("Artist".to_string(), media.artist.clone());
    metadata.insert("Title".to_string(), media.title.clone());
    metadata.insert("Bpm".to_string(), analysis.bpm.to_string());
    metadata.insert("Key".to_string(), analysis.key.clone());
    metadata.insert(
        "Has-Cover".to_string(),
        tagged.cover_embedded.to_string(),
    );

    store.update(
        id,
        JobUpdate {
            status: Some(JobStatus::Completed),
            progress: Some(100),
            message: Some("Download ready".to_string()),
            result: Some(JobResult { data, filename }),
            metadata: Some(metadata),
            ..Default::default()
        },
    )?;
    info!("Job {} completed", id);
    Ok(())
}
