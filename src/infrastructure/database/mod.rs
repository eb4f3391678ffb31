// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod connection;
pub mod entities;

/// 单元测试用的内存数据库
#[cfg(test)]
pub(crate) async fn memory_db() -> std::sync::Arc<sea_orm::DatabaseConnection> {
    use crate::config::settings::DatabaseSettings;

    let settings = DatabaseSettings {
        url: "sqlite::memory:".to_string(),
        max_connections: Some(1),
        min_connections: Some(1),
        connect_timeout: Some(5),
        idle_timeout: None,
    };
    std::sync::Arc::new(
        connection::connect_and_migrate(&settings)
            .await
            .expect("failed to set up in-memory database"),
    )
}
