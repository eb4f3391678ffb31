// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// 包含的服务：
/// - 置信度匹配（confidence_matcher）：把源对象解析为下游对象并评估匹配置信度
pub mod confidence_matcher;
