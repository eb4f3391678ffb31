// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 应用用例模块
///
/// 负责协调队列、熔断器与客户端完成入队、故障恢复和运维操作
pub mod enqueue_sync;
pub mod operations;
pub mod recover_outage_jobs;
