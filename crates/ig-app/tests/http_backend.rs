use std::io::Cursor;
use std::time::Duration;
use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use ig_app::error::SubmissionError;
use ig_app::{AppError, ClientConfig, GenEvent, Generator, SessionId};
use ig_core::{Catalog, GenerationSettings, Mode};
use image::{ImageFormat, RgbImage};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn config(server: &MockServer) -> ClientConfig {
    let mut config = ClientConfig::for_origin(server.base_url());
    config.poll_interval = Duration::from_millis(10);
    config
}

fn cat_settings() -> GenerationSettings {
    GenerationSettings {
        mode: Mode::Txt2img,
        prompt: "a cat".into(),
        model: "m.safetensors".into(),
        ..GenerationSettings::default()
    }
}

fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    RgbImage::new(width, height)
        .write_to(&mut out, ImageFormat::Jpeg)
        .unwrap();
    out.into_inner()
}

#[tokio::test]
async fn txt2img_runs_against_http_backend() {
    let server = MockServer::start_async().await;
    let generate = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/generate")
                .body_includes("\"mode\":\"txt2img\"")
                .body_includes("\"prompt\":\"a cat\"")
                .body_includes("\"seed\":-1");
            then.status(200)
                .header("content-type", "application/json")
                .body(json!({"success": true, "prompt_id": "123"}).to_string());
        })
        .await;
    let status = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/status/123");
            then.status(200)
                .body(json!({"prompt_id": "123", "status": "completed"}).to_string());
        })
        .await;
    let history = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/history/123");
            then.status(200).body(
                json!({"prompt_id": "123", "outputs": [{"filename": "out.png", "subfolder": "", "type": "output"}]})
                    .to_string(),
            );
        })
        .await;

    let generator = Generator::new(config(&server)).unwrap();
    let mut events = Vec::new();
    let images = generator
        .run(SessionId::new(), &cat_settings(), None, &CancellationToken::new(), |e| events.push(e))
        .await
        .unwrap();

    generate.assert_async().await;
    status.assert_async().await;
    history.assert_async().await;
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].reference, format!("{}/api/preview/out.png", server.base_url()));
    assert!(matches!(events.last(), Some(GenEvent::Completed { .. })));
}

#[tokio::test]
async fn colocated_references_stay_relative() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/generate");
            then.status(200).body(json!({"success": true, "prompt_id": "42"}).to_string());
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/status/42");
            then.status(200).body(json!({"status": "completed"}).to_string());
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/history/42");
            then.status(200).body(json!({"outputs": [{"filename": "a.png"}]}).to_string());
        })
        .await;

    let mut config = config(&server);
    config.colocated = true;
    let images = Generator::new(config)
        .unwrap()
        .run(SessionId::new(), &cat_settings(), None, &CancellationToken::new(), |_| {})
        .await
        .unwrap();

    assert_eq!(images[0].reference, "/api/preview/a.png");
}

#[tokio::test]
async fn rejected_submission_surfaces_backend_detail() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/generate");
            then.status(500)
                .body(json!({"detail": "ComfyUI returned status 400"}).to_string());
        })
        .await;
    let status = server
        .mock_async(|when, then| {
            when.method(GET).path_includes("/api/status/");
            then.status(200).body(json!({"status": "completed"}).to_string());
        })
        .await;

    let generator = Generator::new(config(&server)).unwrap();
    let session = SessionId::new();
    let err = generator
        .run(session, &cat_settings(), None, &CancellationToken::new(), |_| {})
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::Submission(SubmissionError::Rejected(ref message)) if message == "ComfyUI returned status 400"
    ));
    status.assert_calls_async(0).await;
    assert!(!generator.is_running(session));
}

#[tokio::test]
async fn upload_sends_multipart_file() {
    let server = MockServer::start_async().await;
    let upload = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/upload")
                .body_includes("name=\"file\"")
                .body_includes("filename=\"photo.jpg\"")
                .body_includes("image/jpeg");
            then.status(200).body(
                json!({
                    "success": true,
                    "image": "data:image/png;base64,AAAA",
                    "width": 640,
                    "height": 480
                })
                .to_string(),
            );
        })
        .await;

    let uploaded = Generator::new(config(&server))
        .unwrap()
        .upload("photo.jpg", jpeg_bytes(64, 48))
        .await
        .unwrap();

    upload.assert_async().await;
    assert_eq!(uploaded.width, 640);
    assert_eq!(uploaded.height, 480);
    assert_eq!(uploaded.reference, "data:image/png;base64,AAAA");
}

#[tokio::test]
async fn non_image_upload_never_reaches_backend() {
    let server = MockServer::start_async().await;
    let upload = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/upload");
            then.status(200).body(json!({"success": true}).to_string());
        })
        .await;

    let err = Generator::new(config(&server))
        .unwrap()
        .upload("notes.txt", b"just some text".to_vec())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Upload(_)));
    upload.assert_calls_async(0).await;
}

#[tokio::test]
async fn catalog_falls_back_per_list() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/models");
            then.status(500).body(json!({"detail": "ComfyUI unreachable"}).to_string());
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/samplers");
            then.status(200).body(json!({"samplers": ["euler", "dpmpp_2m"]}).to_string());
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/loras");
            then.status(200)
                .body(json!({"loras": [{"name": "detail.safetensors", "type": "lora"}]}).to_string());
        })
        .await;

    let catalog = Generator::new(config(&server)).unwrap().load_catalog().await;

    assert_eq!(catalog.models, Catalog::builtin_models());
    assert_eq!(catalog.samplers, vec!["euler", "dpmpp_2m"]);
    assert_eq!(catalog.schedulers, Catalog::builtin_schedulers());
    assert_eq!(catalog.loras[0].name, "detail.safetensors");
}

#[tokio::test]
async fn preview_bytes_are_downloaded() {
    let server = MockServer::start_async().await;
    let preview = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/preview/out.png");
            then.status(200).header("content-type", "image/png").body([1u8, 2, 3]);
        })
        .await;

    let image = ig_core::GeneratedImage {
        reference: format!("{}/api/preview/out.png", server.base_url()),
        filename: "out.png".into(),
        metadata: Default::default(),
    };
    let bytes = Generator::new(config(&server))
        .unwrap()
        .fetch_preview(&image)
        .await
        .unwrap();

    preview.assert_async().await;
    assert_eq!(bytes, vec![1, 2, 3]);
}

#[tokio::test]
async fn health_reports_backend_state() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/health");
            then.status(200).body(
                json!({"status": "unhealthy", "comfyui_connected": false, "error": "connection refused"})
                    .to_string(),
            );
        })
        .await;

    let health = Generator::new(config(&server)).unwrap().health().await.unwrap();
    assert!(!health.is_healthy());
    assert_eq!(health.error.as_deref(), Some("connection refused"));
}
