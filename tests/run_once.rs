use axum::{http::header, routing::get, routing::post, Json, Router};
use plate_inspector::{
    app::save_asset,
    assets::{AssetStatus, Diagnosis},
    config::{build_configuration, Config, Environment},
    run_once,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use tempfile::TempDir;
use tokio::net::TcpListener;

async fn spawn_service(detect_response: Value) -> String {
    let router = Router::new()
        .route(
            "/detect-license-plate/",
            post(move || {
                let body = detect_response.clone();
                async move { Json(body) }
            }),
        )
        .route(
            "/media/out.jpg",
            get(|| async { ([(header::CONTENT_TYPE, "image/jpeg")], vec![0xff_u8, 0xd8, 0xff]) }),
        )
        .route("/static/test.txt", get(|| async { "static files are served" }));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn config_for(dir: &TempDir, base_url: &str) -> Config {
    let mut config = build_configuration(dir.path(), Environment::Local).unwrap();
    config.detection_service.base_url = base_url.to_string();
    config.detection_service.timeout_ms = 5_000;
    config.assets.base_url = base_url.to_string();
    config.assets.timeout_ms = 2_000;
    config
}

fn image_in(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("rider.jpg");
    std::fs::write(&path, [0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10]).unwrap();
    path
}

#[tokio::test(flavor = "multi_thread")]
async fn clean_scene_loads_rendered_image() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_service(json!({
        "success": true,
        "image_url": "/media/out.jpg",
        "detections": "plate:AB-123",
        "riders_without_helmets": [],
        "processing_time": 42
    }))
    .await;

    let report = run_once(&config_for(&dir, &base), &image_in(&dir)).await.unwrap();

    assert!(report.outcome.succeeded());
    assert_eq!(report.outcome.processing_time_ms(), Some(42));
    let AssetStatus::Loaded(asset) = &report.asset else {
        panic!("expected the rendered image to load");
    };
    assert_eq!(asset.url, format!("{base}/media/out.jpg"));

    let text = report.to_string();
    assert!(text.contains("Status: All Clear"));
    assert!(text.contains("Processing time: 42ms"));

    let saved = dir.path().join("out.jpg");
    assert!(save_asset(&report, &saved).unwrap());
    assert_eq!(std::fs::read(saved).unwrap(), [0xff, 0xd8, 0xff]);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_locator_keeps_detection_text() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_service(json!({
        "success": true,
        "image_url": "",
        "detections": "2 riders",
        "riders_without_helmets": ["rider_1"]
    }))
    .await;

    let report = run_once(&config_for(&dir, &base), &image_in(&dir)).await.unwrap();

    assert_eq!(report.asset, AssetStatus::NoAsset);
    let text = report.to_string();
    assert!(text.contains("Status: Violations Detected"));
    assert!(text.contains("Raw detections: 2 riders"));
    assert!(text.contains("No image available"));
    assert!(!save_asset(&report, &dir.path().join("none.jpg")).unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn broken_locator_exhausts_after_asset_and_probe() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_service(json!({
        "success": true,
        "image_url": "media/missing.jpg",
        "detections": "plate:ZZ-1"
    }))
    .await;

    let report = run_once(&config_for(&dir, &base), &image_in(&dir)).await.unwrap();

    assert!(report.outcome.succeeded());
    let AssetStatus::Exhausted(exhaustion) = &report.asset else {
        panic!("expected exhaustion");
    };
    let urls: Vec<_> = exhaustion.attempts.iter().map(|a| a.url.clone()).collect();
    assert_eq!(
        urls,
        [
            format!("{base}/media/missing.jpg"),
            format!("{base}/static/test.txt")
        ]
    );
    assert_eq!(exhaustion.diagnosis(), Diagnosis::AssetMissing);
    assert!(report.to_string().contains("Raw detections: plate:ZZ-1"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_service_is_a_failed_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let report = run_once(&config_for(&dir, &base), &image_in(&dir)).await.unwrap();

    assert!(!report.outcome.succeeded());
    assert!(report.outcome.error_message().is_some());
    assert_eq!(report.asset, AssetStatus::NoAsset);
    assert!(report.to_string().contains("Status: Analysis failed"));
}

#[tokio::test]
async fn empty_image_file_is_rejected_before_any_call() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.jpg");
    std::fs::write(&path, b"").unwrap();

    let result = run_once(&config_for(&dir, "http://127.0.0.1:9"), &path).await;

    assert!(result.is_err());
}
