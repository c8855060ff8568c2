//! Export streaming tests over in-memory repositories.

use chrono::{TimeZone, Utc};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use bde_server::config::ImportConfig;
use bde_server::export::{BufferSink, ExportFormat, ExportService};
use bde_server::ingest::ImportPipeline;
use bde_server::models::{Article, Comment, Job, JobStatus, Resource, User};
use bde_server::repository::memory::{
    MemoryArticleRepository, MemoryCommentRepository, MemoryJobRepository, MemoryUserRepository,
};
use bde_server::repository::{memory, Repositories};

fn user(n: u32) -> User {
    User {
        id: format!("{:08x}-1111-1111-1111-111111111111", n),
        email: format!("u{n}@x.io"),
        name: format!("User {n}"),
        role: "viewer".to_string(),
        active: n % 2 == 0,
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap(),
    }
}

fn service_with_users(count: u32) -> ExportService {
    let users: Vec<User> = (0..count).map(user).collect();
    let repos = Arc::new(Repositories {
        users: Arc::new(MemoryUserRepository::with_rows(users)),
        articles: Arc::new(MemoryArticleRepository::default()),
        comments: Arc::new(MemoryCommentRepository::default()),
        jobs: Arc::new(MemoryJobRepository::default()),
    });
    ExportService::new(repos)
}

#[tokio::test]
async fn ndjson_emits_one_object_per_line() {
    let service = service_with_users(3);
    let mut sink = BufferSink::default();

    service
        .stream(Resource::Users, ExportFormat::Ndjson, &mut sink)
        .await
        .unwrap();

    let text = String::from_utf8(sink.bytes).unwrap();
    assert!(text.ends_with('\n'));
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    for line in &lines {
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert!(value.get("email").is_some());
        assert!(value.get("created_at").is_some());
    }
    // End-of-stream flush.
    assert_eq!(sink.flushes, 1);
}

#[tokio::test]
async fn ndjson_flushes_every_hundred_rows() {
    let service = service_with_users(250);
    let mut sink = BufferSink::default();

    service
        .stream(Resource::Users, ExportFormat::Ndjson, &mut sink)
        .await
        .unwrap();

    let text = String::from_utf8(sink.bytes).unwrap();
    assert_eq!(text.lines().count(), 250);
    // At rows 100 and 200, plus the final flush.
    assert_eq!(sink.flushes, 3);
}

#[tokio::test]
async fn json_array_has_no_trailing_comma_and_empty_is_brackets() {
    let service = service_with_users(2);
    let mut sink = BufferSink::default();
    service
        .stream(Resource::Users, ExportFormat::Json, &mut sink)
        .await
        .unwrap();

    let text = String::from_utf8(sink.bytes).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value.as_array().unwrap().len(), 2);

    let service = service_with_users(0);
    let mut sink = BufferSink::default();
    service
        .stream(Resource::Users, ExportFormat::Json, &mut sink)
        .await
        .unwrap();
    assert_eq!(String::from_utf8(sink.bytes).unwrap(), "[]");
}

#[tokio::test]
async fn users_csv_header_booleans_and_timestamps() {
    let service = service_with_users(2);
    let mut sink = BufferSink::default();

    service
        .stream(Resource::Users, ExportFormat::Csv, &mut sink)
        .await
        .unwrap();

    let text = String::from_utf8(sink.bytes).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "id,email,name,role,active,created_at,updated_at");
    assert_eq!(lines.len(), 3);

    // user(0) is active, user(1) is not.
    assert!(lines[1].contains(",true,"));
    assert!(lines[2].contains(",false,"));
    assert!(lines[1].contains("2024-01-01T00:00:00Z"));
    assert!(lines[1].contains("2024-06-01T12:30:00Z"));
}

#[tokio::test]
async fn csv_is_rejected_for_non_users() {
    let service = service_with_users(1);
    let mut sink = BufferSink::default();

    let err = service
        .stream(Resource::Articles, ExportFormat::Csv, &mut sink)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("CSV format only supported"));
    // Nothing was written before the rejection.
    assert!(sink.bytes.is_empty());
}

#[tokio::test]
async fn articles_and_comments_stream_ndjson() {
    let article = Article {
        id: "22222222-2222-2222-2222-222222222222".to_string(),
        slug: "first-post".to_string(),
        title: "First".to_string(),
        body: "Body".to_string(),
        author_id: "11111111-1111-1111-1111-111111111111".to_string(),
        tags: vec!["intro".to_string()],
        status: "draft".to_string(),
        published_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    let comment = Comment {
        id: "cm_1".to_string(),
        article_id: article.id.clone(),
        user_id: article.author_id.clone(),
        body: "hello".to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    let repos = Arc::new(Repositories {
        users: Arc::new(MemoryUserRepository::default()),
        articles: Arc::new(MemoryArticleRepository::with_rows(vec![article])),
        comments: Arc::new(MemoryCommentRepository::with_rows(vec![comment])),
        jobs: Arc::new(MemoryJobRepository::default()),
    });
    let service = ExportService::new(repos);

    let mut sink = BufferSink::default();
    service
        .stream(Resource::Articles, ExportFormat::Ndjson, &mut sink)
        .await
        .unwrap();
    let value: serde_json::Value =
        serde_json::from_str(String::from_utf8(sink.bytes).unwrap().trim()).unwrap();
    assert_eq!(value["slug"], "first-post");
    // Draft article: published_at is omitted entirely.
    assert!(value.get("published_at").is_none());

    let mut sink = BufferSink::default();
    service
        .stream(Resource::Comments, ExportFormat::Ndjson, &mut sink)
        .await
        .unwrap();
    let value: serde_json::Value =
        serde_json::from_str(String::from_utf8(sink.bytes).unwrap().trim()).unwrap();
    assert_eq!(value["id"], "cm_1");
}

/// Exporting users to CSV and importing the file into a fresh store keeps
/// every record: successful equals the exported count, failed is zero.
#[tokio::test]
async fn users_csv_round_trip_is_lossless() {
    let service = service_with_users(120);
    let mut sink = BufferSink::default();
    service
        .stream(Resource::Users, ExportFormat::Csv, &mut sink)
        .await
        .unwrap();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("users.csv");
    fs::write(&path, &sink.bytes).unwrap();

    let fresh = Arc::new(memory::repositories());
    let mut job = Job::new_import(Resource::Users, None, path);
    fresh.jobs.create(&job).await.unwrap();
    let pipeline = ImportPipeline::new(fresh.clone(), ImportConfig::default());
    pipeline
        .process(&mut job, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_records, 120);
    assert_eq!(job.successful_count, 120);
    assert_eq!(job.failed_count, 0);
    assert_eq!(fresh.users.count().await.unwrap(), 120);
}
