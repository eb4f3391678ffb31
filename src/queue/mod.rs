// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 队列模块
///
/// 提供持久化任务队列、待处理主体表和队列维护调度
pub mod job_queue;
pub mod pending_set;
pub mod scheduler;
