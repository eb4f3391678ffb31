// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{create_test_app, TestApp};
use axum::http::StatusCode;
use chrono::{Duration as ChronoDuration, Utc};
use metasync::domain::models::circuit::CircuitStatus;
use metasync::domain::models::metadata::MetadataSnapshot;
use metasync::resilience::recovery_scheduler::TickOutcome;
use metasync::workers::manager::WorkerManager;
use serde_json::{json, Value};
use std::time::Duration;

async fn submit(app: &TestApp, subject_id: &str) {
    let response = app
        .server
        .post("/v1/events")
        .json(&json!({ "subject_id": subject_id, "change": "updated" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
}

/// 测试完整的故障周期：熔断打开、任务被短路、探测恢复、死信回放
#[tokio::test]
async fn test_outage_cycle_with_dead_letter_replay() {
    let app = create_test_app().await;
    app.source.put(
        "s-1",
        MetadataSnapshot::new("Heat").with_path("/movies/heat.mkv"),
    );
    app.source.put("s-2", MetadataSnapshot::new("Ronin"));
    submit(&app, "s-1").await;
    submit(&app, "s-2").await;

    app.catalog.go_down();
    let report: Value = app.server.post("/v1/queue/drain").await.json();
    assert_eq!(report["dead_lettered"], 1);
    assert_eq!(report["short_circuited"], 1);

    let status: Value = app.server.get("/v1/status").await.json();
    assert_eq!(status["circuit"]["state"], "open");
    assert_eq!(status["outages"]["ongoing"], true);
    assert_eq!(status["outages"]["total_jobs_affected"], 1);
    assert_eq!(status["dlq"]["by_error_type"][0]["error_type"], "downstream_unreachable");

    // 故障尚未结束
    let early = app
        .server
        .post("/v1/dlq/recover")
        .json(&json!({}))
        .expect_failure()
        .await;
    assert_eq!(early.status_code(), StatusCode::NOT_FOUND);

    app.catalog.come_back();
    let outcome = app
        .components
        .scheduler
        .tick_at(Utc::now() + ChronoDuration::hours(2))
        .await
        .unwrap();
    assert_eq!(outcome, TickOutcome::Recovered);
    assert_eq!(
        app.components.circuit.snapshot().await.unwrap().state,
        CircuitStatus::Closed
    );

    let recovered: Value = app
        .server
        .post("/v1/dlq/recover")
        .json(&json!({}))
        .await
        .json();
    assert_eq!(recovered["examined"], 1);
    assert_eq!(recovered["requeued"].as_array().unwrap().len(), 1);

    // 再次恢复不会重复入队
    let again: Value = app
        .server
        .post("/v1/dlq/recover")
        .json(&json!({}))
        .await
        .json();
    assert_eq!(again["requeued"].as_array().unwrap().len(), 0);
    assert_eq!(again["skipped_in_queue"], 1);

    let report: Value = app.server.post("/v1/queue/drain").await.json();
    assert_eq!(report["completed"], 2);

    let mut keys = app.catalog.applied_keys();
    keys.sort();
    assert_eq!(keys, vec!["42".to_string(), "45".to_string()]);

    let status: Value = app.server.get("/v1/status").await.json();
    assert_eq!(status["outages"]["total_outages"], 1);
    assert_eq!(status["outages"]["ongoing"], false);
    assert!(status["outages"]["mttr_secs"].is_number());
    assert_eq!(status["recovery"]["recovery_count"], 1);
}

/// 测试下游不可用时恢复整批中止
#[tokio::test]
async fn test_recovery_aborts_while_downstream_unhealthy() {
    let app = create_test_app().await;
    app.source.put("s-1", MetadataSnapshot::new("Heat"));
    submit(&app, "s-1").await;

    app.catalog.go_down();
    app.server.post("/v1/queue/drain").await;

    let now = Utc::now();
    let response = app
        .server
        .post("/v1/dlq/recover")
        .json(&json!({
            "started_at": now - ChronoDuration::hours(1),
            "ended_at": now + ChronoDuration::hours(1),
        }))
        .expect_failure()
        .await;

    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    let status: Value = app.server.get("/v1/status").await.json();
    assert_eq!(status["queue"]["pending"], 0);
}

/// 测试恢复跳过已在上游删除的主体
#[tokio::test]
async fn test_recovery_skips_subjects_deleted_upstream() {
    let app = create_test_app().await;
    app.source.put("s-1", MetadataSnapshot::new("Heat"));
    submit(&app, "s-1").await;

    app.catalog.go_down();
    app.server.post("/v1/queue/drain").await;
    app.catalog.come_back();
    app.components
        .scheduler
        .tick_at(Utc::now() + ChronoDuration::hours(2))
        .await
        .unwrap();

    app.source.delete("s-1");
    let report: Value = app
        .server
        .post("/v1/dlq/recover")
        .json(&json!({ "error_types": ["downstream_unreachable"] }))
        .await
        .json();

    assert_eq!(report["examined"], 1);
    assert_eq!(report["skipped_missing_source"], 1);
    assert_eq!(report["requeued"].as_array().unwrap().len(), 0);
}

/// 测试目标未出现时按长退避重试，耗尽后进入死信队列且不影响熔断
#[tokio::test]
async fn test_not_found_retries_then_dead_letters() {
    let app = create_test_app().await;
    app.source.put("s-9", MetadataSnapshot::new("Not Yet Imported"));
    submit(&app, "s-9").await;

    let report: Value = app.server.post("/v1/queue/drain").await.json();
    assert_eq!(report["retried"], 2);
    assert_eq!(report["dead_lettered"], 1);

    let status: Value = app.server.get("/v1/status").await.json();
    assert_eq!(status["circuit"]["state"], "closed");
    assert_eq!(status["circuit"]["consecutive_failures"], 0);
    assert_eq!(status["dlq"]["by_error_type"][0]["error_type"], "not_found");
}

/// 测试后台工作器处理新任务并响应关闭信号
#[tokio::test]
async fn test_background_worker_processes_events() {
    let app = create_test_app().await;
    app.source.put("s-1", MetadataSnapshot::new("Ronin"));

    let mut manager = WorkerManager::new();
    manager.start(app.components.worker.clone());

    submit(&app, "s-1").await;

    let mut synced = false;
    for _ in 0..200 {
        if !app.catalog.applied_keys().is_empty() {
            synced = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    manager.shutdown().await;

    assert!(synced, "worker did not process the job");
    assert_eq!(app.catalog.applied_keys(), vec!["45".to_string()]);
}
