// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// 该模块包含同步引擎的核心业务逻辑，包括：
/// - 领域模型（models）：任务、死信、熔断与故障状态
/// - 仓库接口（repositories）：数据持久化抽象接口
/// - 服务（services）：身份匹配
///
/// 领域层不依赖于任何外部实现。
pub mod models;
pub mod repositories;
pub mod services;
