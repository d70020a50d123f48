// REST API: submit a download job, poll its status, fetch the result.

use axum::body::Body;
use axum::extract::rejection::FormRejection;
use axum::extract::{Form, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::AppState;
use crate::error::Error;
use crate::pipeline;

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Serialize)]
struct QueuedResponse {
    task_id: Uuid,
    status: &'static str,
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/download", post(start_download))
        .route("/api/status/{task_id}", get(check_status))
        .route("/api/download/{task_id}", get(get_download))
}

/// POST /api/download: validate the URL, register a Queued job and spawn its
/// worker. Responds immediately with the id to poll.
///
/// A request without a parseable form body counts as a missing URL, not a
/// 415/422 extractor rejection.
async fn start_download(
    State(state): State<Arc<AppState>>,
    request: Result<Form<DownloadRequest>, FormRejection>,
) -> Response {
    let url = request
        .map(|Form(request)| request.url.trim().to_string())
        .unwrap_or_default();
    if url.is_empty() {
        let error = Error::InvalidInput("No URL provided".to_string());
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: error.to_string(),
            }),
        )
            .into_response();
    }

    let id = Uuid::new_v4();
    if let Err(e) = state.store.create(id, &url) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response();
    }

    info!("Queued job {} for {}", id, url);
    tokio::spawn(pipeline::run_job(
        state.store.clone(),
        state.analyzer.clone(),
        state.pipeline.clone(),
        state.temp_root.clone(),
        id,
        url,
    ));

    (
        StatusCode::OK,
        Json(QueuedResponse {
            task_id: id,
            status: "queued",
            message: "Download has been queued.",
        }),
    )
        .into_response()
}

/// GET /api/status/{task_id}: current status snapshot. Malformed and unknown
/// ids both map to 404.
async fn check_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Response {
    let view = Uuid::parse_str(&task_id)
        .ok()
        .and_then(|id| state.store.get_status(id));

    match view {
        Some(view) => Json(view).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "Task not found".to_string(),
            }),
        )
            .into_response(),
    }
}

/// GET /api/download/{task_id}: the finished MP3 as an attachment. Available
/// only for Completed jobs; anything else is 404.
async fn get_download(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Response {
    let result = Uuid::parse_str(&task_id)
        .ok()
        .and_then(|id| state.store.get_result(id));

    let result = match result {
        Some(result) => result,
        None => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: "Download not found or not complete".to_string(),
                }),
            )
                .into_response()
        }
    };

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "audio/mpeg")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", result.filename),
        );
    for (name, value) in &result.metadata {
        builder = builder.header(format!("X-{}", name), value);
    }

    match builder.body(Body::from(result.data)) {
        Ok(response) => response,
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("Failed to build response: {}", e),
            }),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::analyze::Analyzer;
    use crate::jobs::store::JobStore;
    use crate::pipeline::test_support::StubPipeline;
    use crate::server::build_router;
    use axum::http::Request;
    use std::time::Duration;
    use tower::util::ServiceExt;

    fn test_app(pipeline: StubPipeline) -> (Router, tempfile::TempDir) {
        let temp = tempfile::tempdir().unwrap();
        let state = Arc::new(AppState {
            store: Arc::new(JobStore::new()),
            analyzer: Arc::new(Analyzer::new()),
            pipeline: Arc::new(pipeline),
            temp_root: temp.path().to_path_buf(),
        });
        (build_router(state), temp)
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_download(url_field: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/download")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(format!(
                "url={}",
                urlencoded(url_field)
            )))
            .unwrap()
    }

    fn urlencoded(value: &str) -> String {
        let mut out = String::new();
        for byte in value.bytes() {
            match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                    out.push(byte as char)
                }
                _ => out.push_str(&format!("%{:02X}", byte)),
            }
        }
        out
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    /// Poll the status endpoint until the job reaches a terminal state.
    async fn wait_for_terminal(app: &Router, task_id: &str) -> serde_json::Value {
        for _ in 0..600 {
            let response = app
                .clone()
                .oneshot(get_request(&format!("/api/status/{}", task_id)))
                .await
                .unwrap();
            let value = json_body(response).await;
            let status = value["status"].as_str().unwrap_or("");
            if status == "completed" || status == "error" {
                return value;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("job {} never reached a terminal state", task_id);
    }

    #[tokio::test]
    async fn test_download_rejects_missing_url() {
        let (app, _temp) = test_app(StubPipeline::default());
        let response = app.oneshot(post_download("")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let value = json_body(response).await;
        assert!(value["error"]
            .as_str()
            .unwrap()
            .contains("No URL provided"));
    }

    #[tokio::test]
    async fn test_download_rejects_body_less_post() {
        let (app, _temp) = test_app(StubPipeline::default());
        // No form body, no content-type: still the 400 error shape
        let request = Request::builder()
            .method("POST")
            .uri("/api/download")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let value = json_body(response).await;
        assert!(value["error"]
            .as_str()
            .unwrap()
            .contains("No URL provided"));
    }

    #[tokio::test]
    async fn test_status_unknown_task_is_404() {
        let (app, _temp) = test_app(StubPipeline::default());
        let response = app
            .clone()
            .oneshot(get_request(&format!("/api/status/{}", Uuid::new_v4())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // Malformed ids are indistinguishable from unknown ones
        let response = app
            .oneshot(get_request("/api/status/not-a-uuid"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_download_result_unknown_task_is_404() {
        let (app, _temp) = test_app(StubPipeline::default());
        let response = app
            .oneshot(get_request(&format!("/api/download/{}", Uuid::new_v4())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let value = json_body(response).await;
        assert_eq!(value["error"], "Download not found or not complete");
    }

    #[tokio::test]
    async fn test_full_round_trip() {
        let (app, _temp) = test_app(StubPipeline {
            with_thumbnail: true,
            ..Default::default()
        });

        let response = app
            .clone()
            .oneshot(post_download("https://www.youtube.com/watch?v=dQw4w9WgXcQ"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let queued = json_body(response).await;
        assert_eq!(queued["status"], "queued");
        let task_id = queued["task_id"].as_str().unwrap().to_string();

        // Result is not downloadable while the job runs
        let response = app
            .clone()
            .oneshot(get_request(&format!("/api/download/{}", task_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let terminal = wait_for_terminal(&app, &task_id).await;
        assert_eq!(terminal["status"], "completed");
        assert_eq!(terminal["progress"], 100);
        assert_eq!(terminal["message"], "Download ready");
        assert_eq!(terminal["artist"], "Stub Artist");
        assert!(terminal["bpm"].is_u64());
        assert!(terminal["key"].is_string());

        let response = app
            .oneshot(get_request(&format!("/api/download/{}", task_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers().clone();
        assert_eq!(headers[header::CONTENT_TYPE], "audio/mpeg");
        assert!(headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("Stub Artist - Stub Title.mp3"));
        assert!(headers.contains_key("X-Bpm"));
        assert!(headers.contains_key("X-Key"));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(!bytes.is_empty());
    }

    #[tokio::test]
    async fn test_status_sequence_follows_canonical_order() {
        // Observed states must be a prefix of the canonical progression,
        // each carrying its fixed progress value, with no backward moves
        const CANONICAL: [(&str, u64); 5] = [
            ("queued", 0),
            ("downloading", 10),
            ("analyzing", 50),
            ("processing", 75),
            ("completed", 100),
        ];

        let (app, _temp) = test_app(StubPipeline::default());
        let response = app
            .clone()
            .oneshot(post_download("https://youtu.be/dQw4w9WgXcQ"))
            .await
            .unwrap();
        let queued = json_body(response).await;
        let task_id = queued["task_id"].as_str().unwrap().to_string();

        let mut observed: Vec<(usize, u64)> = Vec::new();
        for _ in 0..2000 {
            let response = app
                .clone()
                .oneshot(get_request(&format!("/api/status/{}", task_id)))
                .await
                .unwrap();
            let value = json_body(response).await;
            let status = value["status"].as_str().unwrap().to_string();
            let progress = value["progress"].as_u64().unwrap();
            assert_ne!(status, "error", "stub job must not fail: {}", value);

            let stage = CANONICAL
                .iter()
                .position(|(name, _)| *name == status)
                .unwrap_or_else(|| panic!("unexpected status {:?}", status));
            assert_eq!(progress, CANONICAL[stage].1, "wrong progress in {}", status);
            observed.push((stage, progress));

            if status == "completed" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        assert_eq!(observed.last().map(|(stage, _)| *stage), Some(4));
        for pair in observed.windows(2) {
            assert!(
                pair[1].0 >= pair[0].0,
                "status moved backward: {:?} -> {:?}",
                CANONICAL[pair[0].0].0,
                CANONICAL[pair[1].0].0
            );
            assert!(pair[1].1 >= pair[0].1, "progress decreased: {:?}", pair);
        }
    }

    #[tokio::test]
    async fn test_failed_fetch_surfaces_as_error_status() {
        let (app, _temp) = test_app(StubPipeline {
            fail_fetch: true,
            ..Default::default()
        });

        let response = app
            .clone()
            .oneshot(post_download("https://youtu.be/dQw4w9WgXcQ"))
            .await
            .unwrap();
        let queued = json_body(response).await;
        let task_id = queued["task_id"].as_str().unwrap().to_string();

        let terminal = wait_for_terminal(&app, &task_id).await;
        assert_eq!(terminal["status"], "error");
        assert_eq!(terminal["progress"], 0);
        assert!(terminal["message"]
            .as_str()
            .unwrap()
            .starts_with("Error: "));

        let response = app
            .oneshot(get_request(&format!("/api/download/{}", task_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
