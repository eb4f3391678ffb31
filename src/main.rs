// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::net::SocketAddr;
use std::sync::Arc;

use metasync::application::bootstrap::Components;
use metasync::clients::catalog_client::HttpCatalogClient;
use metasync::clients::source_client::HttpSourceClient;
use metasync::clients::traits::{DownstreamClient, SourceClient};
use metasync::config::settings::Settings;
use metasync::domain::models::circuit::CircuitStatus;
use metasync::infrastructure::database::connection;
use metasync::infrastructure::observability::metrics::init_metrics;
use metasync::presentation::routes;
use metasync::utils::telemetry;
use metasync::workers::manager::WorkerManager;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// 主函数
///
/// 应用程序入口点，负责初始化所有组件并启动服务
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();
    info!("Starting metasync...");

    // 2. Load configuration
    let settings = Settings::new()?;
    info!("Configuration loaded");

    if settings.metrics.enabled {
        let addr: SocketAddr = settings.metrics.listen_addr.parse()?;
        init_metrics(addr)?;
        info!("Prometheus exporter listening on {}", addr);
    }

    // 3. Connect to database and apply migrations
    let db = Arc::new(connection::connect_and_migrate(&settings.database).await?);
    info!("Database connection established");

    // 4. Initialize clients and components
    let downstream: Arc<dyn DownstreamClient> =
        Arc::new(HttpCatalogClient::new(&settings.downstream)?);
    let source: Arc<dyn SourceClient> = Arc::new(HttpSourceClient::new(&settings.source)?);
    let components = Components::build(&settings, db, downstream, source)?;

    let circuit = components.circuit.snapshot().await?;
    if circuit.state != CircuitStatus::Closed {
        warn!(
            "Circuit breaker restored in {} state ({} consecutive failures)",
            circuit.state, circuit.consecutive_failures
        );
    }

    // 5. Start workers
    let mut manager = WorkerManager::new();
    manager.start(components.worker.clone());
    let maintenance = components
        .maintenance(&settings)
        .start(manager.subscribe());

    // 6. Start HTTP server
    let app = routes::routes(components.enqueuer.clone(), components.admin.clone());
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        })
        .await?;

    manager.shutdown().await;
    if let Err(e) = maintenance.await {
        warn!("Maintenance task ended abnormally: {}", e);
    }
    info!("metasync stopped");

    Ok(())
}
