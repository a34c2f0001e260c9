//! Integration tests for imagery fetch against a mock search API.

#![allow(clippy::unwrap_used)]

use httpmock::prelude::*;
use roadwatch::error::{Error, FetchFailure};
use roadwatch::imagery::{Coverage, FetchRequest, FetchSettings, fetch_imagery};
use roadwatch::metadata::MetadataStore;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn settings(server: &MockServer) -> FetchSettings {
    FetchSettings {
        api_url: server.url("/images"),
        max_images: 50,
        high_res: false,
        page_delay: Duration::ZERO,
        download_delay: Duration::ZERO,
        timeout: Duration::from_secs(5),
        progress: false,
    }
}

fn seed_previous_fetch(images_dir: &Path) {
    std::fs::create_dir_all(images_dir).unwrap();
    std::fs::write(images_dir.join("old_1600000000000.jpg"), b"old").unwrap();
    std::fs::write(
        images_dir.join("metadata.json"),
        r#"[{"id": "old", "latitude": 1.0, "longitude": 2.0}]"#,
    )
    .unwrap();
}

fn file_names(dir: &Path) -> BTreeSet<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn test_fetch_replaces_previous_images() {
    let server = MockServer::start_async().await;
    let page = serde_json::json!({
        "data": [
            {
                "id": "101",
                "thumb_1024_url": server.url("/thumb/101.jpg"),
                "captured_at": 1_700_000_000_000_u64,
                "compass_angle": 90.0,
                "geometry": {"type": "Point", "coordinates": [2.35, 48.85]}
            },
            {
                "id": "102",
                "thumb_1024_url": server.url("/thumb/102.jpg"),
                "captured_at": 1_700_000_100_000_u64,
                "geometry": {"type": "Point", "coordinates": [2.36, 48.86]}
            }
        ]
    });
    let search = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/images")
                .query_param("access_token", "test-key");
            then.status(200).json_body(page);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path_contains("/thumb/");
            then.status(200).body(b"jpeg-bytes");
        })
        .await;

    let temp = TempDir::new().unwrap();
    let images_dir = temp.path().join("images");
    seed_previous_fetch(&images_dir);

    let request = FetchRequest::new(48.85, 2.35, 1.0).unwrap();
    let report = fetch_imagery(&request, Some("test-key"), &images_dir, &settings(&server))
        .await
        .unwrap();

    search.assert_async().await;
    assert_eq!(report.coverage, Coverage::Fetched);
    assert_eq!(report.image_count, 2);
    assert_eq!(report.failed, 0);

    let names = file_names(&images_dir);
    assert_eq!(
        names,
        BTreeSet::from([
            "101_1700000000000.jpg".to_string(),
            "102_1700000100000.jpg".to_string(),
            "metadata.json".to_string(),
        ])
    );

    let metadata = MetadataStore::load(&images_dir.join("metadata.json")).unwrap();
    let ids: Vec<&str> = metadata.ids().collect();
    assert_eq!(ids, vec!["101", "102"]);
    assert!(metadata.get("old").is_none());
}

#[tokio::test]
async fn test_failed_download_is_skipped() {
    let server = MockServer::start_async().await;
    let page = serde_json::json!({
        "data": [
            {
                "id": "201",
                "thumb_1024_url": server.url("/thumb/ok.jpg"),
                "captured_at": 1,
                "geometry": {"type": "Point", "coordinates": [10.0, 50.0]}
            },
            {
                "id": "202",
                "thumb_1024_url": server.url("/thumb/missing.jpg"),
                "captured_at": 2,
                "geometry": {"type": "Point", "coordinates": [10.0, 50.0]}
            }
        ]
    });
    server
        .mock_async(|when, then| {
            when.method(GET).path("/images");
            then.status(200).json_body(page);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/thumb/ok.jpg");
            then.status(200).body(b"jpeg");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/thumb/missing.jpg");
            then.status(404);
        })
        .await;

    let temp = TempDir::new().unwrap();
    let images_dir = temp.path().join("images");
    let request = FetchRequest::new(50.0, 10.0, 0.5).unwrap();
    let report = fetch_imagery(&request, Some("k"), &images_dir, &settings(&server))
        .await
        .unwrap();

    assert_eq!(report.image_count, 1);
    assert_eq!(report.found, 2);
    assert_eq!(report.failed, 1);
    assert!(!images_dir.join("202_2.jpg").exists());
    let metadata = MetadataStore::load(&images_dir.join("metadata.json")).unwrap();
    assert_eq!(metadata.ids().collect::<Vec<_>>(), vec!["201"]);
}

#[tokio::test]
async fn test_path_like_ids_never_leave_images_dir() {
    let server = MockServer::start_async().await;
    let page = serde_json::json!({
        "data": [
            {
                "id": "../../escaped",
                "thumb_1024_url": server.url("/thumb/x.jpg"),
                "captured_at": 1,
                "geometry": {"type": "Point", "coordinates": [10.0, 50.0]}
            },
            {
                "id": "301",
                "thumb_1024_url": server.url("/thumb/x.jpg"),
                "captured_at": "../../up",
                "geometry": {"type": "Point", "coordinates": [10.0, 50.0]}
            }
        ]
    });
    server
        .mock_async(|when, then| {
            when.method(GET).path("/images");
            then.status(200).json_body(page);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/thumb/x.jpg");
            then.status(200).body(b"jpeg");
        })
        .await;

    let temp = TempDir::new().unwrap();
    let images_dir = temp.path().join("data").join("images");
    let request = FetchRequest::new(50.0, 10.0, 0.5).unwrap();
    let report = fetch_imagery(&request, Some("k"), &images_dir, &settings(&server))
        .await
        .unwrap();

    assert_eq!(report.image_count, 1);
    assert_eq!(report.failed, 1);
    assert!(!temp.path().join("escaped_1.jpg").exists());
    assert!(!temp.path().join("up.jpg").exists());
    assert_eq!(
        file_names(&images_dir),
        BTreeSet::from(["301_------up.jpg".to_string(), "metadata.json".to_string()])
    );
    assert_eq!(
        file_names(&temp.path().join("data")),
        BTreeSet::from(["images".to_string()])
    );
}

#[tokio::test]
async fn test_empty_area_is_no_coverage() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/images");
            then.status(200).json_body(serde_json::json!({"data": []}));
        })
        .await;

    let temp = TempDir::new().unwrap();
    let images_dir = temp.path().join("images");
    seed_previous_fetch(&images_dir);

    let request = FetchRequest::new(0.0, -160.0, 5.0).unwrap();
    let report = fetch_imagery(&request, Some("k"), &images_dir, &settings(&server))
        .await
        .unwrap();

    assert_eq!(report.coverage, Coverage::NoCoverage);
    assert_eq!(report.image_count, 0);
    assert_eq!(
        file_names(&images_dir),
        BTreeSet::from(["metadata.json".to_string()])
    );
    let metadata = MetadataStore::load(&images_dir.join("metadata.json")).unwrap();
    assert!(metadata.is_empty());
}

#[tokio::test]
async fn test_unauthorized_leaves_images_untouched() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/images");
            then.status(401).body("invalid token");
        })
        .await;

    let temp = TempDir::new().unwrap();
    let images_dir = temp.path().join("images");
    seed_previous_fetch(&images_dir);

    let request = FetchRequest::new(48.85, 2.35, 1.0).unwrap();
    let result = fetch_imagery(&request, Some("bad"), &images_dir, &settings(&server)).await;

    assert!(matches!(
        result,
        Err(Error::Fetch(FetchFailure::Unauthorized { status: 401 }))
    ));
    assert_eq!(
        file_names(&images_dir),
        BTreeSet::from([
            "metadata.json".to_string(),
            "old_1600000000000.jpg".to_string()
        ])
    );
}

#[tokio::test]
async fn test_missing_key_fails_before_network() {
    let server = MockServer::start_async().await;
    let search = server
        .mock_async(|when, then| {
            when.method(GET).path("/images");
            then.status(200).json_body(serde_json::json!({"data": []}));
        })
        .await;

    let temp = TempDir::new().unwrap();
    let request = FetchRequest::new(48.85, 2.35, 1.0).unwrap();
    let result = fetch_imagery(&request, None, temp.path(), &settings(&server)).await;

    assert!(matches!(
        result,
        Err(Error::Fetch(FetchFailure::MissingCredential))
    ));
    search.assert_hits_async(0).await;
}
