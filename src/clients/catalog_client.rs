// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;
use url::Url;

use crate::clients::traits::{DownstreamClient, DownstreamError};
use crate::config::settings::ClientSettings;
use crate::domain::models::matching::CatalogItem;
use crate::domain::models::metadata::MetadataSnapshot;

/// 下游目录的 HTTP 客户端
///
/// 基于reqwest实现，把状态码和传输错误映射到错误分类
pub struct HttpCatalogClient {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpCatalogClient {
    /// 创建客户端
    ///
    /// # 参数
    ///
    /// * `settings` - 地址、令牌和请求超时
    pub fn new(settings: &ClientSettings) -> Result<Self, DownstreamError> {
        let base_url = Url::parse(&settings.base_url)
            .map_err(|e| DownstreamError::Malformed(format!("invalid base url: {}", e)))?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("metasync/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| DownstreamError::Other(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            token: settings.token.clone(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, DownstreamError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DownstreamError::Malformed("base url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, DownstreamError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, body))
    }

    async fn fetch_items(&self, request: RequestBuilder) -> Result<Vec<CatalogItem>, DownstreamError> {
        self.send(request)
            .await?
            .json::<Vec<CatalogItem>>()
            .await
            .map_err(|e| DownstreamError::Malformed(format!("invalid catalog response: {}", e)))
    }
}

fn classify_transport(err: reqwest::Error) -> DownstreamError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        DownstreamError::Unreachable(err.to_string())
    } else if err.is_decode() || err.is_body() {
        DownstreamError::Malformed(err.to_string())
    } else {
        DownstreamError::Other(err.to_string())
    }
}

fn classify_status(status: StatusCode, body: String) -> DownstreamError {
    let message = if body.is_empty() {
        status.to_string()
    } else {
        body
    };

    match status {
        StatusCode::TOO_MANY_REQUESTS => DownstreamError::RateLimited(message),
        StatusCode::NOT_FOUND => DownstreamError::NotFound(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DownstreamError::Auth(message),
        s if s.is_server_error() => DownstreamError::Server {
            status: s.as_u16(),
            message,
        },
        s if s.is_client_error() => DownstreamError::Malformed(message),
        _ => DownstreamError::Other(message),
    }
}

#[async_trait]
impl DownstreamClient for HttpCatalogClient {
    async fn search(
        &self,
        library: &str,
        title: &str,
    ) -> Result<Vec<CatalogItem>, DownstreamError> {
        let url = self.endpoint(&["libraries", library, "search"])?;
        self.fetch_items(self.client.get(url).query(&[("title", title)]))
            .await
    }

    async fn scan(&self, library: &str) -> Result<Vec<CatalogItem>, DownstreamError> {
        let url = self.endpoint(&["libraries", library, "items"])?;
        self.fetch_items(self.client.get(url)).await
    }

    async fn apply_metadata(
        &self,
        key: &str,
        snapshot: &MetadataSnapshot,
    ) -> Result<(), DownstreamError> {
        let url = self.endpoint(&["items", key, "metadata"])?;
        self.send(self.client.put(url).json(snapshot)).await?;
        Ok(())
    }

    async fn health_check(&self, timeout: Duration) -> Result<(), DownstreamError> {
        let url = self.endpoint(&["health"])?;
        self.send(self.client.get(url).timeout(timeout)).await?;
        Ok(())
    }
}
