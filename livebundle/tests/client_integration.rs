use std::path::Path;

use assert_cmd::Command;
use bytes::Bytes;
use livebundle::client::ApiClient;
use livebundle_core::contract::{
    ArtifactStatus, BundleResource, BundleUpdate, NewBundle, NewBundleFile, UploadedPart,
};
use livebundle_core::package::ArtifactType;
use predicates::prelude::*;
use serde_json::json;
use tempfile::tempdir;
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const APP: &str = "app-1";
const TOKEN: &str = "test-token";

fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(&server.uri(), TOKEN, APP).expect("client builds")
}

#[tokio::test]
async fn create_bundle_posts_metadata_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/apps/app-1/bundles"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_json(json!({ "artifactType": "manifest", "rollout": 0.5 })))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({ "id": "b-1", "appDeploymentId": "d-1" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let bundle = client(&server)
        .create_bundle(NewBundle {
            artifact_type: ArtifactType::Manifest,
            rollout: Some(0.5),
            ..NewBundle::default()
        })
        .await
        .unwrap();

    assert_eq!(bundle.id, "b-1");
    assert_eq!(bundle.app_deployment_id.as_deref(), Some("d-1"));
}

#[tokio::test]
async fn create_file_sends_multipart_form_with_inline_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/apps/app-1/bundles/b-1/files"))
        .and(body_string_contains("name=\"checksum\""))
        .and(body_string_contains("name=\"sizeInBytes\""))
        .and(body_string_contains("name=\"href\""))
        .and(body_string_contains("name=\"file\""))
        .and(body_string_contains("console.log('hi')"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "f-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let payload = Bytes::from_static(b"console.log('hi')");
    let file = client(&server)
        .create_file(
            "b-1",
            NewBundleFile {
                checksum: "abc".to_string(),
                mime_type: "text/javascript".to_string(),
                name: "app.js".to_string(),
                href: Some("js/app.js".to_string()),
                signature: None,
                size_in_bytes: payload.len() as u64,
                inline_bytes: Some(payload),
            },
        )
        .await
        .unwrap();

    assert_eq!(file.id, "f-1");
}

#[tokio::test]
async fn multipart_protocol_uses_upload_actions() {
    let server = MockServer::start().await;
    let upload_path = "/v1/apps/app-1/bundles/b-1/files/f-1/upload";

    Mock::given(method("POST"))
        .and(path(upload_path))
        .and(query_param("action", "mpu-create"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "uploadId": "u-1", "key": "k-1" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(upload_path))
        .and(query_param("action", "mpu-uploadpart"))
        .and(query_param("uploadId", "u-1"))
        .and(query_param("partNumber", "2"))
        .and(body_string_contains("name=\"blob\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "etag": "e-2" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(upload_path))
        .and(query_param("action", "mpu-complete"))
        .and(query_param("uploadId", "u-1"))
        .and(body_json(json!({
            "parts": [
                { "partNumber": 1, "etag": "e-1" },
                { "partNumber": 2, "etag": "e-2" }
            ]
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server);
    let session = api.create_multipart_upload("b-1", "f-1").await.unwrap();
    assert_eq!(session.upload_id, "u-1");
    assert_eq!(session.key, "k-1");

    let part = api
        .upload_part("b-1", "f-1", "u-1", 2, Bytes::from(vec![7u8; 64]))
        .await
        .unwrap();
    assert_eq!(
        part,
        UploadedPart {
            part_number: 2,
            etag: "e-2".to_string()
        }
    );

    let parts = vec![
        UploadedPart {
            part_number: 1,
            etag: "e-1".to_string(),
        },
        part,
    ];
    api.complete_multipart_upload("b-1", "f-1", "u-1", parts)
        .await
        .unwrap();
}

#[tokio::test]
async fn update_bundle_patches_status() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/v1/apps/app-1/bundles/b-1"))
        .and(body_json(json!({ "artifactStatus": "ready", "channelName": "beta" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .update_bundle(
            "b-1",
            BundleUpdate {
                artifact_status: ArtifactStatus::Ready,
                channel_name: Some("beta".to_string()),
                rollout: None,
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn error_status_carries_code_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/apps/app-1/bundles"))
        .respond_with(ResponseTemplate::new(422).set_body_string("rollout out of range"))
        .mount(&server)
        .await;

    let err = client(&server)
        .create_bundle(NewBundle::default())
        .await
        .unwrap_err();
    let message = err.to_string();

    assert!(message.contains("422"), "got: {message}");
    assert!(message.contains("rollout out of range"), "got: {message}");
}

fn write_site(root: &Path) {
    std::fs::create_dir_all(root.join("js")).unwrap();
    std::fs::write(root.join("index.html"), "<html><script src=js/app.js></script></html>").unwrap();
    std::fs::write(root.join("js/app.js"), "console.log('live');").unwrap();
    std::fs::write(root.join("style.css"), "body { margin: 0 }").unwrap();
}

async fn mount_bundle_routes(server: &MockServer, updates: u64) {
    Mock::given(method("POST"))
        .and(path("/v1/apps/app-1/bundles"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "b-1" })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/v1/apps/app-1/bundles/b-1"))
        .and(body_string_contains("\"artifactStatus\":\"ready\""))
        .respond_with(ResponseTemplate::new(200))
        .expect(updates)
        .mount(server)
        .await;
}

fn run_cli(server: &MockServer, args: Vec<String>) -> assert_cmd::assert::Assert {
    let uri = server.uri();
    let mut cmd = Command::cargo_bin("livebundle").expect("Binary exists");
    cmd.env("LIVEBUNDLE_TOKEN", TOKEN)
        .env("LIVEBUNDLE_API_URL", uri)
        .env("RUST_LOG", "warn")
        .args(args);
    cmd.assert()
}

fn upload_args(dir: &Path, extra: &[&str]) -> Vec<String> {
    let mut args = vec![
        "upload".to_string(),
        "--app-id".to_string(),
        APP.to_string(),
        "--path".to_string(),
        dir.display().to_string(),
    ];
    args.extend(extra.iter().map(|s| s.to_string()));
    args
}

#[tokio::test(flavor = "multi_thread")]
async fn cli_zip_upload_creates_one_inline_file() {
    let server = MockServer::start().await;
    mount_bundle_routes(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/v1/apps/app-1/bundles/b-1/files"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "f-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    write_site(dir.path());
    let args = upload_args(dir.path(), &["--channel", "production"]);

    let assert = tokio::task::block_in_place(|| run_cli(&server, args));
    assert
        .success()
        .stdout(predicate::str::contains("Bundle b-1 uploaded: 1 file(s)"));
}

#[tokio::test(flavor = "multi_thread")]
async fn cli_manifest_upload_creates_one_file_per_asset() {
    let server = MockServer::start().await;
    mount_bundle_routes(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/v1/apps/app-1/bundles/b-1/files"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "f-n" })))
        .expect(4)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    write_site(dir.path());
    let args = upload_args(dir.path(), &["--artifact-type", "manifest"]);

    let assert = tokio::task::block_in_place(|| run_cli(&server, args));
    assert
        .success()
        .stdout(predicate::str::contains("4 file(s)"));
    assert!(dir.path().join("manifest.json").is_file());
}

#[tokio::test(flavor = "multi_thread")]
async fn cli_exits_with_error_when_retry_also_fails() {
    let server = MockServer::start().await;
    mount_bundle_routes(&server, 0).await;
    Mock::given(method("POST"))
        .and(path("/v1/apps/app-1/bundles/b-1/files"))
        .respond_with(ResponseTemplate::new(503).set_body_string("storage unavailable"))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    write_site(dir.path());
    let args = upload_args(dir.path(), &[]);

    let assert = tokio::task::block_in_place(|| run_cli(&server, args));
    assert.failure().code(1).stderr(
        predicate::str::contains("[ERROR] create_file failed")
            .and(predicate::str::contains("storage unavailable")),
    );
}
