// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod circuit_state_repo_impl;
pub mod dead_letter_repo_impl;
pub mod job_repo_impl;
pub mod outage_repo_impl;
pub mod recovery_state_repo_impl;
