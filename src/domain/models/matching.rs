// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::Serialize;

/// 下游目录中的对象
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct CatalogItem {
    /// 下游系统的稳定身份键
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub file_paths: Vec<String>,
}

/// 匹配候选对象
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchCandidate {
    pub key: String,
    pub title: String,
    pub paths: Vec<String>,
    /// 找到该候选的搜索策略
    pub strategy: String,
}

impl MatchCandidate {
    pub fn from_item(item: CatalogItem, strategy: &str) -> Self {
        Self {
            key: item.key,
            title: item.title,
            paths: item.file_paths,
            strategy: strategy.to_string(),
        }
    }
}

/// 置信度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    /// 唯一候选
    High,
    /// 多个候选
    Low,
}

/// 身份匹配结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    /// 没有候选时为空
    pub confidence: Option<Confidence>,
    pub best: Option<MatchCandidate>,
    pub candidates: Vec<MatchCandidate>,
}

impl MatchResult {
    /// 按去重后的候选数量分级
    pub fn classify(candidates: Vec<MatchCandidate>) -> Self {
        let confidence = match candidates.len() {
            0 => None,
            1 => Some(Confidence::High),
            _ => Some(Confidence::Low),
        };
        Self {
            confidence,
            best: candidates.first().cloned(),
            candidates,
        }
    }
}
