// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{create_test_app_with, test_settings};
use metasync::domain::models::circuit::CircuitStatus;
use metasync::domain::models::metadata::MetadataSnapshot;
use serde_json::{json, Value};

/// 测试重启后熔断状态、故障记录和排队任务保持不变
#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("state.db").display());

    {
        let app = create_test_app_with(test_settings(&url)).await;
        app.source.put("s-1", MetadataSnapshot::new("Heat"));
        app.source.put("s-2", MetadataSnapshot::new("Ronin"));
        for subject in ["s-1", "s-2"] {
            app.server
                .post("/v1/events")
                .json(&json!({ "subject_id": subject, "change": "updated" }))
                .await;
        }

        app.catalog.go_down();
        let report: Value = app.server.post("/v1/queue/drain").await.json();
        assert_eq!(report["short_circuited"], 1);
    }

    let app = create_test_app_with(test_settings(&url)).await;

    let circuit = app.components.circuit.snapshot().await.unwrap();
    assert_eq!(circuit.state, CircuitStatus::Open);
    assert!(!app.components.circuit.allow_request().await.unwrap());

    let status: Value = app.server.get("/v1/status").await.json();
    assert_eq!(status["queue"]["pending"], 1);
    assert_eq!(status["dlq"]["total"], 1);
    assert_eq!(status["outages"]["ongoing"], true);
    // 内存中的待处理标记不随进程保留
    assert_eq!(status["pending_subjects"], 0);

    // 重启后仍按主体合并到已排队的任务
    app.source.put("s-2", MetadataSnapshot::new("Ronin"));
    let merged: Value = app
        .server
        .post("/v1/events")
        .json(&json!({ "subject_id": "s-2", "change": "updated" }))
        .await
        .json();
    assert_eq!(merged["result"], "merged");
}
