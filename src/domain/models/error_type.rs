// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 同步失败的错误分类
///
/// 两个维度决定失败的处理方式：是否可重试（瞬时/永久），
/// 以及是否说明下游系统不可用（是否计入熔断器）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// 连接失败或超时
    DownstreamUnreachable,
    /// 被下游限流
    RateLimited,
    /// 下游 5xx
    ServerError,
    /// 目标对象尚未在下游出现
    NotFound,
    /// 认证或权限错误
    AuthError,
    /// 请求格式错误
    MalformedRequest,
    /// 匹配到多个候选对象（严格模式）
    AmbiguousMatch,
    /// 未分类错误
    Unknown,
}

impl ErrorType {
    pub const ALL: [ErrorType; 8] = [
        ErrorType::DownstreamUnreachable,
        ErrorType::RateLimited,
        ErrorType::ServerError,
        ErrorType::NotFound,
        ErrorType::AuthError,
        ErrorType::MalformedRequest,
        ErrorType::AmbiguousMatch,
        ErrorType::Unknown,
    ];

    /// 是否为瞬时错误（可重试）
    ///
    /// 未分类错误按瞬时处理
    pub fn is_transient(&self) -> bool {
        !self.is_permanent()
    }

    /// 是否为永久错误
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ErrorType::AuthError | ErrorType::MalformedRequest | ErrorType::AmbiguousMatch
        )
    }

    /// 是否说明下游不可用（计入熔断器失败）
    pub fn is_circuit_relevant(&self) -> bool {
        matches!(
            self,
            ErrorType::DownstreamUnreachable | ErrorType::ServerError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::DownstreamUnreachable => "downstream_unreachable",
            ErrorType::RateLimited => "rate_limited",
            ErrorType::ServerError => "server_error",
            ErrorType::NotFound => "not_found",
            ErrorType::AuthError => "auth_error",
            ErrorType::MalformedRequest => "malformed_request",
            ErrorType::AmbiguousMatch => "ambiguous_match",
            ErrorType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 未知的错误类型名称
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown error type: {0}")]
pub struct ParseErrorTypeError(pub String);

impl FromStr for ErrorType {
    type Err = ParseErrorTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseErrorTypeError(s.to_string()))
    }
}
