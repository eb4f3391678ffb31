// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

/// 初始化指标系统
///
/// 在 `listen_addr` 上启动 Prometheus 抓取端点并注册同步引擎的各类指标。
/// 未初始化时所有指标记录都是空操作。
pub fn init_metrics(listen_addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(listen_addr)
        .install()?;

    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    // Queue Metrics
    describe_counter!("sync_jobs_enqueued_total", "Total number of sync jobs enqueued");
    describe_counter!(
        "sync_jobs_deduplicated_total",
        "Total number of enqueue requests merged into an existing pending job"
    );
    describe_counter!(
        "sync_jobs_completed_total",
        "Total number of sync jobs applied downstream and acknowledged"
    );
    describe_counter!(
        "sync_jobs_retried_total",
        "Total number of sync job attempts scheduled for retry, by error type"
    );
    describe_counter!(
        "sync_jobs_dead_lettered_total",
        "Total number of sync jobs promoted to the dead letter queue, by error type"
    );
    describe_counter!(
        "sync_jobs_short_circuited_total",
        "Total number of sync job attempts skipped because the circuit was open"
    );
    describe_counter!(
        "dlq_recovered_total",
        "Total number of dead letter entries re-queued by outage recovery"
    );

    // Circuit Breaker Metrics
    describe_counter!(
        "circuit_breaker_requests_total",
        "Total number of outcomes recorded by the circuit breaker"
    );
    describe_counter!(
        "circuit_breaker_failures_total",
        "Total number of failures recorded by the circuit breaker"
    );
    describe_counter!(
        "circuit_breaker_successes_total",
        "Total number of successes recorded by the circuit breaker"
    );
    describe_counter!(
        "circuit_breaker_rejected_total",
        "Total number of attempts rejected by an open circuit breaker"
    );
    describe_gauge!(
        "circuit_breaker_status",
        "Current status of circuit breaker (0=Closed, 0.5=HalfOpen, 1=Open)"
    );

    // Recovery Metrics
    describe_counter!(
        "recovery_probes_total",
        "Total number of downstream health probes, by result"
    );
    describe_counter!("outages_total", "Total number of recorded downstream outages");
    describe_gauge!("sync_queue_depth", "Number of jobs in the sync queue, by state");
    describe_gauge!("dlq_entries", "Number of entries in the dead letter queue");
}
