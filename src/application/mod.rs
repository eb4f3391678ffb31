// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 应用程序模块
///
/// 包含入队、故障恢复和运维用例，HTTP 请求的数据传输对象，以及组件装配
pub mod bootstrap;
pub mod dto;
pub mod usecases;
