// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use reqwest::StatusCode;
use url::Url;

use crate::clients::traits::{SourceClient, SourceError};
use crate::config::settings::ClientSettings;
use crate::domain::models::metadata::MetadataSnapshot;

/// 上游数据源的 HTTP 客户端
pub struct HttpSourceClient {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpSourceClient {
    pub fn new(settings: &ClientSettings) -> Result<Self, SourceError> {
        let base_url = Url::parse(&settings.base_url)
            .map_err(|e| SourceError::InvalidUrl(e.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url,
            token: settings.token.clone(),
        })
    }
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    async fn fetch_snapshot(
        &self,
        subject_id: &str,
    ) -> Result<Option<MetadataSnapshot>, SourceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SourceError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["subjects", subject_id]);

        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(None),
            s if s.is_success() => Ok(Some(response.json().await?)),
            s => Err(SourceError::Status(s.as_u16())),
        }
    }
}
