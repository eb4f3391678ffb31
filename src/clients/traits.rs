// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::domain::models::error_type::ErrorType;
use crate::domain::models::matching::CatalogItem;
use crate::domain::models::metadata::MetadataSnapshot;

/// 下游调用错误
///
/// 客户端必须把传输层的失败归入以下类别之一
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DownstreamError {
    /// 连接失败或超时
    #[error("Downstream unreachable: {0}")]
    Unreachable(String),
    /// 被限流
    #[error("Rate limited by downstream: {0}")]
    RateLimited(String),
    /// 5xx
    #[error("Downstream server error {status}: {message}")]
    Server { status: u16, message: String },
    /// 对象不存在
    #[error("Not found downstream: {0}")]
    NotFound(String),
    /// 认证或权限错误
    #[error("Downstream rejected credentials: {0}")]
    Auth(String),
    /// 请求或响应格式错误
    #[error("Malformed request: {0}")]
    Malformed(String),
    /// 其他错误
    #[error("Downstream error: {0}")]
    Other(String),
}

impl DownstreamError {
    /// 对应的错误分类
    pub fn error_type(&self) -> ErrorType {
        match self {
            DownstreamError::Unreachable(_) => ErrorType::DownstreamUnreachable,
            DownstreamError::RateLimited(_) => ErrorType::RateLimited,
            DownstreamError::Server { .. } => ErrorType::ServerError,
            DownstreamError::NotFound(_) => ErrorType::NotFound,
            DownstreamError::Auth(_) => ErrorType::AuthError,
            DownstreamError::Malformed(_) => ErrorType::MalformedRequest,
            DownstreamError::Other(_) => ErrorType::Unknown,
        }
    }
}

/// 上游数据源错误
#[derive(Error, Debug)]
pub enum SourceError {
    /// 请求失败
    #[error("Source request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// 非预期的状态码
    #[error("Source returned status {0}")]
    Status(u16),
    /// 配置的地址无效
    #[error("Invalid source url: {0}")]
    InvalidUrl(String),
}

/// 下游目录客户端特质
#[async_trait]
pub trait DownstreamClient: Send + Sync {
    /// 在库中按标题搜索
    async fn search(&self, library: &str, title: &str)
        -> Result<Vec<CatalogItem>, DownstreamError>;
    /// 列出库中的全部对象
    async fn scan(&self, library: &str) -> Result<Vec<CatalogItem>, DownstreamError>;
    /// 把元数据快照写入一个对象
    async fn apply_metadata(
        &self,
        key: &str,
        snapshot: &MetadataSnapshot,
    ) -> Result<(), DownstreamError>;
    /// 轻量健康检查，使用独立的短超时
    async fn health_check(&self, timeout: Duration) -> Result<(), DownstreamError>;
}

/// 上游数据源客户端特质
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// 读取主体的元数据快照，主体已删除时返回 `None`
    async fn fetch_snapshot(
        &self,
        subject_id: &str,
    ) -> Result<Option<MetadataSnapshot>, SourceError>;

    /// 主体是否仍然存在
    async fn exists(&self, subject_id: &str) -> Result<bool, SourceError> {
        Ok(self.fetch_snapshot(subject_id).await?.is_some())
    }
}
