// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use axum_test::TestServer;
use metasync::application::bootstrap::Components;
use metasync::clients::traits::{DownstreamClient, DownstreamError, SourceClient, SourceError};
use metasync::config::settings::{
    CircuitBreakerSettings, ClientSettings, DatabaseSettings, DlqSettings, MatchingSettings,
    MetricsSettings, QueueSettings, RecoverySettings, RetrySettings, ServerSettings, Settings,
};
use metasync::domain::models::matching::CatalogItem;
use metasync::domain::models::metadata::MetadataSnapshot;
use metasync::domain::services::confidence_matcher::MatchMode;
use metasync::infrastructure::database::connection;
use metasync::presentation::routes;
use parking_lot::Mutex;
use sea_orm::DatabaseConnection;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 可控的下游目录
pub struct FakeCatalog {
    items: Vec<CatalogItem>,
    failure: Mutex<Option<DownstreamError>>,
    healthy: AtomicBool,
    pub applied: Mutex<Vec<(String, MetadataSnapshot)>>,
    pub calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn new(items: Vec<CatalogItem>) -> Self {
        Self {
            items,
            failure: Mutex::new(None),
            healthy: AtomicBool::new(true),
            applied: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// 模拟下游宕机
    pub fn go_down(&self) {
        *self.failure.lock() = Some(DownstreamError::Unreachable("connection refused".into()));
        self.healthy.store(false, Ordering::SeqCst);
    }

    pub fn come_back(&self) {
        *self.failure.lock() = None;
        self.healthy.store(true, Ordering::SeqCst);
    }

    pub fn applied_keys(&self) -> Vec<String> {
        self.applied.lock().iter().map(|(k, _)| k.clone()).collect()
    }

    fn check(&self) -> Result<(), DownstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failure.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DownstreamClient for FakeCatalog {
    async fn search(&self, _: &str, title: &str) -> Result<Vec<CatalogItem>, DownstreamError> {
        self.check()?;
        Ok(self
            .items
            .iter()
            .filter(|i| i.title.eq_ignore_ascii_case(title))
            .cloned()
            .collect())
    }

    async fn scan(&self, _: &str) -> Result<Vec<CatalogItem>, DownstreamError> {
        self.check()?;
        Ok(self.items.clone())
    }

    async fn apply_metadata(
        &self,
        key: &str,
        snapshot: &MetadataSnapshot,
    ) -> Result<(), DownstreamError> {
        self.check()?;
        self.applied.lock().push((key.to_string(), snapshot.clone()));
        Ok(())
    }

    async fn health_check(&self, _: Duration) -> Result<(), DownstreamError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DownstreamError::Unreachable("connection refused".into()))
        }
    }
}

/// 内存中的上游数据源
#[derive(Default)]
pub struct FakeSource {
    subjects: Mutex<HashMap<String, MetadataSnapshot>>,
}

impl FakeSource {
    pub fn put(&self, subject_id: &str, snapshot: MetadataSnapshot) {
        self.subjects.lock().insert(subject_id.to_string(), snapshot);
    }

    pub fn delete(&self, subject_id: &str) {
        self.subjects.lock().remove(subject_id);
    }
}

#[async_trait]
impl SourceClient for FakeSource {
    async fn fetch_snapshot(
        &self,
        subject_id: &str,
    ) -> Result<Option<MetadataSnapshot>, SourceError> {
        Ok(self.subjects.lock().get(subject_id).cloned())
    }
}

pub fn catalog_items() -> Vec<CatalogItem> {
    vec![
        CatalogItem {
            key: "42".into(),
            title: "Heat".into(),
            file_paths: vec!["/movies/heat.mkv".into()],
        },
        CatalogItem {
            key: "43".into(),
            title: "Alien".into(),
            file_paths: vec!["/movies/alien.mkv".into()],
        },
        CatalogItem {
            key: "44".into(),
            title: "Alien".into(),
            file_paths: vec!["/movies/alien-directors-cut.mkv".into()],
        },
        CatalogItem {
            key: "45".into(),
            title: "Ronin".into(),
            file_paths: vec!["/movies/ronin.mkv".into()],
        },
    ]
}

/// 测试配置
///
/// 退避延迟为零，恢复探测只在显式推进时间时到期。
pub fn test_settings(database_url: &str) -> Settings {
    Settings {
        database: DatabaseSettings {
            url: database_url.to_string(),
            max_connections: Some(1),
            min_connections: Some(1),
            connect_timeout: Some(5),
            idle_timeout: None,
        },
        server: ServerSettings {
            host: "127.0.0.1".into(),
            port: 0,
        },
        metrics: MetricsSettings {
            enabled: false,
            listen_addr: "127.0.0.1:0".into(),
        },
        queue: QueueSettings {
            lease_timeout_secs: 60,
            lease_wait_ms: 0,
            poll_interval_ms: 5,
            circuit_open_requeue_secs: 0,
        },
        retry: RetrySettings {
            standard_base_secs: 0,
            standard_cap_secs: 0,
            standard_max_attempts: 0,
            not_found_base_secs: 0,
            not_found_cap_secs: 0,
            not_found_max_attempts: 2,
        },
        circuit_breaker: CircuitBreakerSettings {
            failure_threshold: 1,
            recovery_timeout_secs: 3600,
        },
        recovery: RecoverySettings {
            probe_floor_secs: 3600,
            probe_cap_secs: 3600,
            probe_timeout_secs: 1,
            outage_history_capacity: 10,
            default_error_types: vec!["downstream_unreachable".into()],
        },
        dlq: DlqSettings {
            retention_days: 30,
            maintenance_interval_secs: 60,
        },
        matching: MatchingSettings {
            mode: MatchMode::Strict,
            library: "movies".into(),
        },
        downstream: ClientSettings {
            base_url: "http://127.0.0.1:1".into(),
            token: None,
            request_timeout_secs: 1,
        },
        source: ClientSettings {
            base_url: "http://127.0.0.1:1".into(),
            token: None,
            request_timeout_secs: 1,
        },
    }
}

#[allow(dead_code)]
pub struct TestApp {
    pub server: TestServer,
    pub components: Components,
    pub catalog: Arc<FakeCatalog>,
    pub source: Arc<FakeSource>,
    pub db: Arc<DatabaseConnection>,
    pub settings: Settings,
}

/// 基于内存数据库启动完整应用
pub async fn create_test_app() -> TestApp {
    create_test_app_with(test_settings("sqlite::memory:")).await
}

pub async fn create_test_app_with(settings: Settings) -> TestApp {
    let db = Arc::new(
        connection::connect_and_migrate(&settings.database)
            .await
            .expect("Failed to set up database"),
    );
    let catalog = Arc::new(FakeCatalog::new(catalog_items()));
    let source = Arc::new(FakeSource::default());

    let components = Components::build(&settings, db.clone(), catalog.clone(), source.clone())
        .expect("Failed to build components");
    let app = routes::routes(components.enqueuer.clone(), components.admin.clone());
    let server = TestServer::new(app).expect("Failed to start test server");

    TestApp {
        server,
        components,
        catalog,
        source,
        db,
        settings,
    }
}
