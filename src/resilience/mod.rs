// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 熔断器、故障历史与恢复调度
pub mod circuit_breaker;
pub mod outage_history;
pub mod recovery_scheduler;
