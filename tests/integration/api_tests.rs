// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::create_test_app;
use axum::http::StatusCode;
use metasync::domain::models::metadata::MetadataSnapshot;
use serde_json::{json, Value};

/// 测试健康检查端点
#[tokio::test]
async fn test_health_check() {
    let app = create_test_app().await;

    let response = app.server.get("/health").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.text(), "OK");
}

/// 测试变更事件入队并通过排空接口同步到下游
#[tokio::test]
async fn test_event_is_enqueued_and_drained() {
    let app = create_test_app().await;
    app.source.put(
        "s-1",
        MetadataSnapshot::new("Heat").with_path("/movies/heat.mkv"),
    );

    let response = app
        .server
        .post("/v1/events")
        .json(&json!({ "subject_id": "s-1", "change": "updated" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert_eq!(body["result"], "enqueued");
    assert!(body["job_id"].is_string());

    let status: Value = app.server.get("/v1/status").await.json();
    assert_eq!(status["queue"]["pending"], 1);
    assert_eq!(status["pending_subjects"], 1);

    let report: Value = app.server.post("/v1/queue/drain").await.json();
    assert_eq!(report["completed"], 1);
    assert_eq!(app.catalog.applied_keys(), vec!["42".to_string()]);

    let status: Value = app.server.get("/v1/status").await.json();
    assert_eq!(status["queue"]["pending"], 0);
    assert_eq!(status["pending_subjects"], 0);
    assert_eq!(status["circuit"]["state"], "closed");
}

/// 测试同一主体的重复事件合并为一个任务，且下游收到最新快照
#[tokio::test]
async fn test_duplicate_events_are_merged() {
    let app = create_test_app().await;
    app.source.put("s-1", MetadataSnapshot::new("Heat"));

    let first: Value = app
        .server
        .post("/v1/events")
        .json(&json!({ "subject_id": "s-1", "change": "created" }))
        .await
        .json();

    app.source.put(
        "s-1",
        MetadataSnapshot::new("Heat").with_field("rating", json!(9)),
    );
    let second = app
        .server
        .post("/v1/events")
        .json(&json!({ "subject_id": "s-1", "change": "updated" }))
        .await;
    assert_eq!(second.status_code(), StatusCode::ACCEPTED);
    let second: Value = second.json();

    assert_eq!(second["result"], "merged");
    assert_eq!(first["job_id"], second["job_id"]);

    let report: Value = app.server.post("/v1/queue/drain").await.json();
    assert_eq!(report["completed"], 1);

    let applied = app.catalog.applied.lock();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].1.fields["rating"], 9);
}

/// 测试删除事件和已不存在的源对象被忽略
#[tokio::test]
async fn test_deleted_and_missing_subjects_are_ignored() {
    let app = create_test_app().await;
    app.source.put("s-1", MetadataSnapshot::new("Heat"));

    let deleted = app
        .server
        .post("/v1/events")
        .json(&json!({ "subject_id": "s-1", "change": "deleted" }))
        .await;
    assert_eq!(deleted.status_code(), StatusCode::OK);
    assert_eq!(deleted.json::<Value>()["result"], "ignored");

    let missing = app
        .server
        .post("/v1/events")
        .json(&json!({ "subject_id": "gone", "change": "updated" }))
        .await;
    assert_eq!(missing.status_code(), StatusCode::OK);
    assert_eq!(missing.json::<Value>()["result"], "ignored");

    let status: Value = app.server.get("/v1/status").await.json();
    assert_eq!(status["queue"]["pending"], 0);
}

/// 测试空的主体标识被拒绝
#[tokio::test]
async fn test_empty_subject_is_rejected() {
    let app = create_test_app().await;

    let response = app
        .server
        .post("/v1/events")
        .json(&json!({ "subject_id": "", "change": "updated" }))
        .expect_failure()
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

/// 测试歧义匹配在严格模式下直接进入死信队列
#[tokio::test]
async fn test_ambiguous_match_is_dead_lettered() {
    let app = create_test_app().await;
    app.source.put("s-2", MetadataSnapshot::new("Alien"));

    app.server
        .post("/v1/events")
        .json(&json!({ "subject_id": "s-2", "change": "updated" }))
        .await;
    let report: Value = app.server.post("/v1/queue/drain").await.json();
    assert_eq!(report["dead_lettered"], 1);
    assert!(app.catalog.applied_keys().is_empty());

    let status: Value = app.server.get("/v1/status").await.json();
    assert_eq!(status["dlq"]["total"], 1);
    assert_eq!(status["dlq"]["by_error_type"][0]["error_type"], "ambiguous_match");
    // 永久错误不计入熔断
    assert_eq!(status["circuit"]["consecutive_failures"], 0);

    let entries: Value = app.server.get("/v1/dlq").await.json();
    let entry = &entries[0];
    assert_eq!(entry["subject_id"], "s-2");
    assert_eq!(entry["error_type"], "ambiguous_match");
    assert_eq!(entry["retry_count_at_failure"], 0);
    let message = entry["error_message"].as_str().unwrap();
    assert!(message.contains("43") && message.contains("44"));

    let bad_page = app
        .server
        .get("/v1/dlq")
        .add_query_param("limit", 0)
        .expect_failure()
        .await;
    assert_eq!(bad_page.status_code(), StatusCode::BAD_REQUEST);
}

/// 测试恢复接口拒绝永久错误类型和未知错误类型
#[tokio::test]
async fn test_recover_rejects_invalid_error_types() {
    let app = create_test_app().await;

    let permanent = app
        .server
        .post("/v1/dlq/recover")
        .json(&json!({ "error_types": ["auth_error"] }))
        .expect_failure()
        .await;
    assert_eq!(permanent.status_code(), StatusCode::BAD_REQUEST);

    let unknown = app
        .server
        .post("/v1/dlq/recover")
        .json(&json!({ "error_types": ["solar_flare"] }))
        .expect_failure()
        .await;
    assert_eq!(unknown.status_code(), StatusCode::BAD_REQUEST);

    let half_window = app
        .server
        .post("/v1/dlq/recover")
        .json(&json!({ "started_at": "2025-01-01T00:00:00Z" }))
        .expect_failure()
        .await;
    assert_eq!(half_window.status_code(), StatusCode::BAD_REQUEST);
}

/// 测试没有已结束的故障时恢复返回 404
#[tokio::test]
async fn test_recover_without_outage_is_not_found() {
    let app = create_test_app().await;

    let response = app
        .server
        .post("/v1/dlq/recover")
        .json(&json!({}))
        .expect_failure()
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

/// 测试清空队列与死信队列
#[tokio::test]
async fn test_clear_queue_and_dlq() {
    let app = create_test_app().await;
    app.source.put("s-1", MetadataSnapshot::new("Heat"));
    app.source.put("s-2", MetadataSnapshot::new("Alien"));

    for subject in ["s-1", "s-2"] {
        app.server
            .post("/v1/events")
            .json(&json!({ "subject_id": subject, "change": "updated" }))
            .await;
    }

    let cleared: Value = app.server.delete("/v1/queue").await.json();
    assert_eq!(cleared["removed"], 2);

    let status: Value = app.server.get("/v1/status").await.json();
    assert_eq!(status["pending_subjects"], 0);

    // 清空后重新提交会创建新任务
    let again: Value = app
        .server
        .post("/v1/events")
        .json(&json!({ "subject_id": "s-2", "change": "updated" }))
        .await
        .json();
    assert_eq!(again["result"], "enqueued");
    app.server.post("/v1/queue/drain").await;

    let purged: Value = app
        .server
        .post("/v1/dlq/purge")
        .json(&json!({ "older_than_days": 1 }))
        .await
        .json();
    assert_eq!(purged["removed"], 0);

    let cleared: Value = app.server.delete("/v1/dlq").await.json();
    assert_eq!(cleared["removed"], 1);
}

/// 测试负的保留天数被拒绝
#[tokio::test]
async fn test_purge_rejects_negative_retention() {
    let app = create_test_app().await;

    let response = app
        .server
        .post("/v1/dlq/purge")
        .json(&json!({ "older_than_days": -1 }))
        .expect_failure()
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}
