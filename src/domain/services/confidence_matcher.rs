// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::clients::traits::{DownstreamClient, DownstreamError};
use crate::domain::models::error_type::ErrorType;
use crate::domain::models::matching::{CatalogItem, Confidence, MatchCandidate, MatchResult};
use crate::domain::models::metadata::MetadataSnapshot;

/// 低置信度时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// 多个候选时拒绝同步
    #[default]
    Strict,
    /// 多个候选时取第一个并记录全部候选
    Permissive,
}

/// 待匹配的源对象
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSubject {
    pub title: String,
    pub path: Option<String>,
}

impl From<&MetadataSnapshot> for MatchSubject {
    fn from(snapshot: &MetadataSnapshot) -> Self {
        Self {
            title: snapshot.title.clone(),
            path: snapshot.path.clone(),
        }
    }
}

/// 匹配失败
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("No downstream object matches '{0}'")]
    NotFound(String),

    #[error("Ambiguous match for '{title}': candidates {keys:?}")]
    Ambiguous { title: String, keys: Vec<String> },

    #[error(transparent)]
    Downstream(#[from] DownstreamError),
}

impl MatchError {
    pub fn error_type(&self) -> ErrorType {
        match self {
            MatchError::NotFound(_) => ErrorType::NotFound,
            MatchError::Ambiguous { .. } => ErrorType::AmbiguousMatch,
            MatchError::Downstream(e) => e.error_type(),
        }
    }
}

/// 搜索策略
#[async_trait]
pub trait SearchStrategy: Send + Sync {
    /// 策略名称，记录在候选上
    fn name(&self) -> &'static str;

    async fn search(
        &self,
        subject: &MatchSubject,
        library: &str,
    ) -> Result<Vec<CatalogItem>, DownstreamError>;
}

fn same_title(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// 按标题精确搜索
pub struct TitleSearchStrategy {
    client: Arc<dyn DownstreamClient>,
}

impl TitleSearchStrategy {
    pub fn new(client: Arc<dyn DownstreamClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SearchStrategy for TitleSearchStrategy {
    fn name(&self) -> &'static str {
        "title_search"
    }

    async fn search(
        &self,
        subject: &MatchSubject,
        library: &str,
    ) -> Result<Vec<CatalogItem>, DownstreamError> {
        let items = self.client.search(library, &subject.title).await?;
        // 下游搜索可能是模糊匹配
        Ok(items
            .into_iter()
            .filter(|item| same_title(&item.title, &subject.title))
            .collect())
    }
}

/// 全量扫描资料库，按文件路径匹配，没有路径时退回标题匹配
pub struct LibraryScanStrategy {
    client: Arc<dyn DownstreamClient>,
}

impl LibraryScanStrategy {
    pub fn new(client: Arc<dyn DownstreamClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SearchStrategy for LibraryScanStrategy {
    fn name(&self) -> &'static str {
        "library_scan"
    }

    async fn search(
        &self,
        subject: &MatchSubject,
        library: &str,
    ) -> Result<Vec<CatalogItem>, DownstreamError> {
        let items = self.client.scan(library).await?;
        Ok(items
            .into_iter()
            .filter(|item| match &subject.path {
                Some(path) => item.file_paths.iter().any(|p| p == path),
                None => same_title(&item.title, &subject.title),
            })
            .collect())
    }
}

/// 置信度匹配器
///
/// 按注册顺序执行全部策略，以下游身份键去重（保留首次出现），再按候选数量分级。
pub struct ConfidenceMatcher {
    strategies: Vec<Box<dyn SearchStrategy>>,
    mode: MatchMode,
    library: String,
}

impl ConfidenceMatcher {
    pub fn new(mode: MatchMode, library: impl Into<String>) -> Self {
        Self {
            strategies: Vec::new(),
            mode,
            library: library.into(),
        }
    }

    /// 标题搜索加全量扫描的默认组合
    pub fn with_default_strategies(
        client: Arc<dyn DownstreamClient>,
        mode: MatchMode,
        library: impl Into<String>,
    ) -> Self {
        Self::new(mode, library)
            .with_strategy(TitleSearchStrategy::new(client.clone()))
            .with_strategy(LibraryScanStrategy::new(client))
    }

    pub fn with_strategy<S: SearchStrategy + 'static>(mut self, strategy: S) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// 收集全部策略的候选并分级
    ///
    /// 任一策略出错即返回该错误，下游不可用时不应把部分结果当作完整结果。
    pub async fn resolve(&self, subject: &MatchSubject) -> Result<MatchResult, DownstreamError> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for strategy in &self.strategies {
            let items = strategy.search(subject, &self.library).await?;
            debug!(
                "Strategy {} returned {} items for '{}'",
                strategy.name(),
                items.len(),
                subject.title
            );
            for item in items {
                if seen.insert(item.key.clone()) {
                    candidates.push(MatchCandidate::from_item(item, strategy.name()));
                }
            }
        }

        Ok(MatchResult::classify(candidates))
    }

    /// 根据分级结果和模式选出目标对象
    ///
    /// # 返回值
    ///
    /// * `Ok(MatchCandidate)` - 高置信度候选，或宽松模式下的第一个候选
    /// * `Err(MatchError::NotFound)` - 没有候选，属于可重试错误
    /// * `Err(MatchError::Ambiguous)` - 严格模式下存在多个候选
    pub fn decide(
        &self,
        subject: &MatchSubject,
        result: MatchResult,
    ) -> Result<MatchCandidate, MatchError> {
        let MatchResult {
            confidence,
            best,
            candidates,
        } = result;

        match (confidence, best) {
            (Some(Confidence::High), Some(best)) => Ok(best),
            (Some(Confidence::Low), Some(best)) if self.mode == MatchMode::Permissive => {
                for alt in &candidates {
                    warn!(
                        "Ambiguous match for '{}': candidate {} ({}) via {}",
                        subject.title, alt.key, alt.title, alt.strategy
                    );
                }
                warn!("Proceeding with first candidate {}", best.key);
                Ok(best)
            }
            (Some(Confidence::Low), Some(_)) => Err(MatchError::Ambiguous {
                title: subject.title.clone(),
                keys: candidates.into_iter().map(|c| c.key).collect(),
            }),
            _ => Err(MatchError::NotFound(subject.title.clone())),
        }
    }

    /// 解析并决策
    pub async fn find_target(&self, subject: &MatchSubject) -> Result<MatchCandidate, MatchError> {
        let result = self.resolve(subject).await?;
        self.decide(subject, result)
    }
}
