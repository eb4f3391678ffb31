// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 应用程序模块
///
/// 包含入队、故障恢复、运维用例以及组件装配
pub mod application;

/// 外部客户端模块
///
/// 下游目录与上游数据源的 HTTP 客户端
pub mod clients;

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 领域模块
///
/// 包含核心业务实体、服务和仓库接口
pub mod domain;

/// 基础设施模块
///
/// 提供数据库、仓库实现和指标
pub mod infrastructure;

/// 表示层模块
///
/// 处理HTTP请求和响应，包括路由和处理器
pub mod presentation;

/// 队列模块
///
/// 持久化任务队列、待处理标记和维护调度
pub mod queue;

/// 弹性模块
///
/// 熔断器、故障历史和恢复探测
pub mod resilience;

/// 工具模块
///
/// 提供重试策略、错误类型和日志初始化
pub mod utils;

/// 工作器模块
///
/// 实现后台任务处理和工作器管理
pub mod workers;
