// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod circuit_breaker_state;
pub mod dead_letter;
pub mod outage_record;
pub mod recovery_state;
pub mod sync_job;
