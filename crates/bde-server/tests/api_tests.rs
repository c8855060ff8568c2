//! HTTP API tests driving the feature router over in-memory repositories.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use bde_server::config::Config;
use bde_server::features::{self, FeatureState};
use bde_server::models::{Job, Resource, User, ValidationError};
use bde_server::repository::memory::{
    MemoryArticleRepository, MemoryCommentRepository, MemoryJobRepository, MemoryUserRepository,
};
use bde_server::repository::{memory, Repositories};

const BOUNDARY: &str = "bde-test-boundary";

struct TestApp {
    app: Router,
    repos: Arc<Repositories>,
    upload_dir: PathBuf,
    _dir: TempDir,
}

fn test_app_with(repos: Arc<Repositories>) -> TestApp {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.import.upload_dir = dir.path().join("uploads");

    let upload_dir = config.import.upload_dir.clone();
    let state = FeatureState::new(repos.clone(), Arc::new(config));
    TestApp {
        app: features::router(state),
        repos,
        upload_dir,
        _dir: dir,
    }
}

fn test_app() -> TestApp {
    test_app_with(Arc::new(memory::repositories()))
}

fn multipart_request(
    resource: &str,
    filename: &str,
    content: &str,
    idempotency_key: Option<&str>,
) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"resource\"\r\n\r\n\
         {resource}\r\n\
         --{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n\
         {content}\r\n\
         --{BOUNDARY}--\r\n"
    );

    let mut builder = Request::builder()
        .method("POST")
        .uri("/v1/imports")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(key) = idempotency_key {
        builder = builder.header("Idempotency-Key", key);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

const USERS_CSV: &str = "id,email,name,role,active,created_at\n\
    11111111-1111-1111-1111-111111111111,a@x.io,A,admin,true,2024-01-01T00:00:00Z\n";

#[tokio::test]
async fn post_import_stages_file_and_returns_202() {
    let test = test_app();

    let response = test
        .app
        .clone()
        .oneshot(multipart_request("users", "users.csv", USERS_CSV, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["resource"], "users");
    let job_id: Uuid = body["job_id"].as_str().unwrap().parse().unwrap();

    // The job row exists and the upload is staged on disk.
    let job = test.repos.jobs.get(job_id).await.unwrap().unwrap();
    assert_eq!(job.resource, Resource::Users);
    let staged: Vec<_> = fs::read_dir(&test.upload_dir).unwrap().collect();
    assert_eq!(staged.len(), 1);
}

#[tokio::test]
async fn idempotency_key_replay_returns_first_job_without_staging() {
    let test = test_app();

    let first = test
        .app
        .clone()
        .oneshot(multipart_request(
            "users",
            "users.csv",
            USERS_CSV,
            Some("retry-1"),
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::ACCEPTED);
    let first_id = json_body(first).await["job_id"].as_str().unwrap().to_string();

    // Same key, different file: the prior job comes back and nothing new is
    // staged or processed.
    let second = test
        .app
        .clone()
        .oneshot(multipart_request(
            "users",
            "other.csv",
            "id,email\nnot,even-valid\n",
            Some("retry-1"),
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let body = json_body(second).await;
    assert_eq!(body["job_id"].as_str().unwrap(), first_id);

    let staged: Vec<_> = fs::read_dir(&test.upload_dir).unwrap().collect();
    assert_eq!(staged.len(), 1);
}

#[tokio::test]
async fn post_import_rejects_bad_requests() {
    let test = test_app();

    // Unknown resource.
    let response = test
        .app
        .clone()
        .oneshot(multipart_request("gadgets", "g.csv", "x", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Extension does not match the resource.
    let response = test
        .app
        .clone()
        .oneshot(multipart_request("users", "users.ndjson", "{}", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = test
        .app
        .clone()
        .oneshot(multipart_request("articles", "articles.csv", "x", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // No resource at all.
    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"users.csv\"\r\n\r\n\
         {USERS_CSV}\r\n\
         --{BOUNDARY}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/v1/imports")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    let response = test.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_import_status_returns_404_for_unknown_jobs() {
    let test = test_app();

    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/v1/imports/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/imports/not-a-uuid")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn job_status_includes_errors_and_report_url() {
    let test = test_app();

    let mut job = Job::new_import(Resource::Users, None, PathBuf::from("/tmp/u.csv"));
    job.failed_count = 1;
    test.repos.jobs.create(&job).await.unwrap();
    test.repos
        .jobs
        .append_errors(
            job.id,
            &[ValidationError {
                line: 3,
                field: "email".to_string(),
                message: "duplicate email".to_string(),
                value: Some("a@x.io".to_string()),
            }],
        )
        .await
        .unwrap();

    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/v1/imports/{}", job.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["failed"], 1);
    assert_eq!(body["error_count"], 1);
    assert_eq!(body["errors"][0]["line"], 3);
    assert_eq!(
        body["error_report_url"],
        format!("/v1/imports/{}/errors", job.id)
    );
}

#[tokio::test]
async fn error_report_streams_as_json_and_csv() {
    let test = test_app();

    let job = Job::new_import(Resource::Users, None, PathBuf::from("/tmp/u.csv"));
    test.repos.jobs.create(&job).await.unwrap();
    test.repos
        .jobs
        .append_errors(
            job.id,
            &[ValidationError {
                line: 2,
                field: "role".to_string(),
                message: "role is required".to_string(),
                value: None,
            }],
        )
        .await
        .unwrap();

    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/v1/imports/{}/errors", job.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["error_count"], 1);
    assert_eq!(body["errors"][0]["field"], "role");

    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/v1/imports/{}/errors?format=csv", job.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE].to_str().unwrap(),
        "text/csv"
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.starts_with("line,field,message,value\n"));
    assert!(text.contains("2,role,role is required,"));
}

fn seeded_users(count: u32) -> Arc<Repositories> {
    let users: Vec<User> = (0..count)
        .map(|n| User {
            id: format!("{:08x}-1111-1111-1111-111111111111", n),
            email: format!("u{n}@x.io"),
            name: format!("User {n}"),
            role: "viewer".to_string(),
            active: true,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        })
        .collect();
    Arc::new(Repositories {
        users: Arc::new(MemoryUserRepository::with_rows(users)),
        articles: Arc::new(MemoryArticleRepository::default()),
        comments: Arc::new(MemoryCommentRepository::default()),
        jobs: Arc::new(MemoryJobRepository::default()),
    })
}

#[tokio::test]
async fn export_streams_ndjson_body() {
    let test = test_app_with(seeded_users(3));

    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/exports?resource=users&format=ndjson")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE].to_str().unwrap(),
        "application/x-ndjson"
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert_eq!(text.lines().count(), 3);
}

#[tokio::test]
async fn export_defaults_to_ndjson_and_validates_parameters() {
    let test = test_app_with(seeded_users(1));

    // Default format.
    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/exports?resource=users")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE].to_str().unwrap(),
        "application/x-ndjson"
    );

    // Missing resource.
    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/exports")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Unknown format.
    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/exports?resource=users&format=xml")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // CSV is users-only.
    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/exports?resource=articles&format=csv")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn export_users_csv_over_http() {
    let test = test_app_with(seeded_users(2));

    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/exports?resource=users&format=csv")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE].to_str().unwrap(),
        "text/csv"
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.starts_with("id,email,name,role,active,created_at,updated_at\n"));
    assert_eq!(text.lines().count(), 3);
}
