// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm_migration::prelude::*;

/// 主函数
///
/// 迁移命令行入口
///
/// 在 `migration/` 下执行，例如 `DATABASE_URL=sqlite://../data/metasync.db?mode=rwc cargo run -- up`
#[async_std::main]
async fn main() {
    cli::run_cli(migration::Migrator).await;
}
