// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// HTTP请求处理器模块
///
/// 事件入口与运维端点的处理逻辑
pub mod admin_handler;
pub mod sync_handler;
