// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 上游元数据快照
///
/// 上游系统在某一时刻对某个主体给出的扁平元数据，`title` 与 `path`
/// 参与下游身份匹配，其余字段原样写入下游。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MetadataSnapshot {
    /// 标题
    pub title: String,
    /// 源文件路径
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// 其余字段（自由文本、分类列表、时间戳）
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl MetadataSnapshot {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            path: None,
            fields: Map::new(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}
