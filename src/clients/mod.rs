// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 下游目录与上游数据源的客户端
pub mod catalog_client;
pub mod source_client;
pub mod traits;
