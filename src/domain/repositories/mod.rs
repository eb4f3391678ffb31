// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库接口模块
///
/// 该模块定义了领域层的仓库接口，具体实现由基础设施层提供。
///
/// 包含的仓库接口：
/// - 任务仓库（job_repository）：队列中的任务行，租约与确认
/// - 死信仓库（dead_letter_repository）：永久失败的任务
/// - 熔断器状态仓库（circuit_state_repository）：单行状态记录
/// - 故障记录仓库（outage_repository）：有界的故障窗口列表
/// - 恢复状态仓库（recovery_state_repository）：探测调度的单行记录
pub mod circuit_state_repository;
pub mod dead_letter_repository;
pub mod job_repository;
pub mod outage_repository;
pub mod recovery_state_repository;
