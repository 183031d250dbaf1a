use anikura::clients::drive::extract_folder_id;
use anikura::config::Config;
use anikura::models::transfer::RemoteFile;
use anikura::services::source::select_video_files;
use anikura::services::{ByteStream, ObjectStorage, RemoteSource, SourceError, StorageError};
use anikura::state::SharedState;
use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream};
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const FOLDER: &str = "1AbCdEfGhIjKlMnOpQrStUvWxYz";
const API_KEY: &str = "test-admin-key";

struct StaticFolder;

#[async_trait]
impl RemoteSource for StaticFolder {
    fn normalize_folder_ref(&self, reference: &str) -> String {
        extract_folder_id(reference)
    }

    async fn list_video_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>, SourceError> {
        let file = |name: &str, mime: &str| RemoteFile {
            id: name.to_string(),
            name: name.to_string(),
            size: Some(16),
            mime_type: mime.to_string(),
        };
        match folder_id {
            FOLDER => Ok(select_video_files(vec![
                file("[Group] Show - 02.mkv", "video/x-matroska"),
                file("[Group] Show - 01.mkv", "video/x-matroska"),
                file("cover.jpg", "image/jpeg"),
            ])),
            "empty-folder-id-000000000000" => Ok(Vec::new()),
            "plain-file" => Err(SourceError::NotAFolder(folder_id.to_string())),
            "broken" => Err(SourceError::Other("quota exceeded".to_string())),
            _ => Err(SourceError::NotFound(folder_id.to_string())),
        }
    }

    async fn open_stream(&self, _file_id: &str) -> Result<ByteStream, SourceError> {
        Ok(stream::iter(vec![Ok(Bytes::from_static(b"0123456789abcdef"))]).boxed())
    }
}

struct AcceptAll;

#[async_trait]
impl ObjectStorage for AcceptAll {
    async fn upload_stream(
        &self,
        path: &str,
        body: ByteStream,
        _content_length: Option<u64>,
    ) -> Result<String, StorageError> {
        let _: Vec<Bytes> = body
            .try_collect()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;
        Ok(format!("https://cdn.test/{path}"))
    }
}

async fn spawn_app(api_keys: Vec<String>) -> Router {
    let db_path =
        std::env::temp_dir().join(format!("anikura-api-test-{}.db", uuid::Uuid::new_v4()));

    let mut config = Config::default();
    config.general.database_path = format!("sqlite:{}", db_path.display());
    config.server.api_keys = api_keys;

    let shared = SharedState::with_backends(config, Arc::new(StaticFolder), Arc::new(AcceptAll))
        .await
        .expect("Failed to create shared state");
    let state = anikura::api::create_app_state(Arc::new(shared), None);
    anikura::api::router(state).await
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn create_show(app: &Router) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/anime",
        Some(serde_json::json!({
            "title": { "romaji": "Demo Show" },
            "coverImage": "https://img.test/demo.jpg",
            "seasons": [1]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_api_key_required_when_configured() {
    let app = spawn_app(vec![API_KEY.to_string()]).await;

    let (status, _) = send(&app, "GET", "/api/anime", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/anime")
                .header("X-Api-Key", API_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/anime")
                .header("Authorization", format!("Bearer {API_KEY}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, _) = send(&app, "GET", "/api/system/health/live", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_catalog_routes() {
    let app = spawn_app(Vec::new()).await;
    let id = create_show(&app).await;

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/anime/{id}/seasons"),
        Some(serde_json::json!({ "seasonNumber": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let episode = serde_json::json!({
        "episodeNumber": 4,
        "videoSources": [
            { "url": "https://www.youtube.com/watch?v=x", "quality": "1080p" }
        ]
    });
    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/anime/{id}/seasons/1/episodes"),
        Some(episode.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let source = &body["data"]["seasons"][0]["episodes"][0]["videoSources"][0];
    assert_eq!(source["source"], "youtube");
    assert!(source["sourceId"].as_str().unwrap().starts_with("youtube-"));

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/anime/{id}/seasons/1/episodes"),
        Some(episode),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&app, "GET", "/api/anime", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["episodeCount"], 1);

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/anime/{id}/seasons/1/episodes/4"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "GET", "/api/anime/unknown", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bulk_upload_flow() {
    let app = spawn_app(Vec::new()).await;
    let id = create_show(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/anime/{id}/bulk-upload"),
        Some(serde_json::json!({
            "seasonNumber": 1,
            "folderId": format!("https://drive.google.com/drive/folders/{FOLDER}?usp=sharing"),
            "quality": "1080p",
            "fansub": "group-1"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["totalFiles"], 2);
    assert_eq!(body["data"]["files"][0], "[Group] Show - 01.mkv");
    let batch_id = body["data"]["batchId"].as_str().unwrap().to_string();

    let mut batch = serde_json::Value::Null;
    for _ in 0..100 {
        let (status, body) = send(&app, "GET", &format!("/api/transfers/{batch_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        batch = body["data"].clone();
        if batch["state"] != "running" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(batch["state"], "completed");
    assert_eq!(batch["stats"]["successful"], 2);
    assert_eq!(batch["stats"]["processed"], 2);

    let (_, body) = send(&app, "GET", &format!("/api/anime/{id}"), None).await;
    let episodes = &body["data"]["seasons"][0]["episodes"];
    assert_eq!(episodes[0]["episodeNumber"], 1);
    assert_eq!(episodes[0]["title"], "Bölüm 1");
    assert_eq!(
        episodes[1]["videoSources"][0]["url"],
        "https://cdn.test/demo-show/sezon-1/2.mp4"
    );
    assert_eq!(episodes[1]["videoSources"][0]["fansub"], "group-1");

    let (status, body) = send(&app, "GET", "/api/transfers", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_bulk_upload_rejections() {
    let app = spawn_app(Vec::new()).await;
    let id = create_show(&app).await;
    let upload = |season: i32, folder: &str| {
        serde_json::json!({ "seasonNumber": season, "folderId": folder })
    };
    let uri = format!("/api/anime/{id}/bulk-upload");

    let (status, _) = send(&app, "POST", &uri, Some(upload(2, FOLDER))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        "POST",
        "/api/anime/missing/bulk-upload",
        Some(upload(1, FOLDER)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, "POST", &uri, Some(upload(1, "gone"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "folder not found or inaccessible");

    let (status, _) = send(&app, "POST", &uri, Some(upload(1, "plain-file"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        &uri,
        Some(upload(1, "empty-folder-id-000000000000")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "POST", &uri, Some(upload(1, "broken"))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (status, _) = send(&app, "GET", "/api/transfers/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_folder_preview() {
    let app = spawn_app(Vec::new()).await;

    let (status, body) = send(&app, "GET", &format!("/api/drive/files?folder={FOLDER}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["folderId"], FOLDER);
    assert_eq!(body["data"]["files"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["files"][1]["episodeNumber"], 2);
}
