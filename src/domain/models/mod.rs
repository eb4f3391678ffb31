// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 该模块定义了同步引擎的核心实体：
/// - 同步任务（job）及其重试元数据
/// - 死信条目（dead_letter）
/// - 熔断器状态（circuit）、故障记录（outage）、恢复状态（recovery）
/// - 身份匹配结果（matching）
pub mod circuit;
pub mod dead_letter;
pub mod error_type;
pub mod job;
pub mod matching;
pub mod metadata;
pub mod outage;
pub mod recovery;
