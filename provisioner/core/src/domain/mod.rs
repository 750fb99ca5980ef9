// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Value objects, aggregates, pure rules and the ports the application layer
//! drives.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Server, deployment and modpack model

pub mod config;
pub mod deploy_task;
pub mod files;
pub mod java_runtime;
pub mod modpack;
pub mod path_guard;
pub mod repository;
pub mod runtime;
pub mod server;
