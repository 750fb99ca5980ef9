// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Anchor CLI

pub mod config;
pub mod daemon;
pub mod files;
pub mod pack;
pub mod server;

pub use self::config::ConfigCommand;
pub use self::daemon::DaemonArgs;
pub use self::files::FilesCommand;
pub use self::pack::PackCommand;
pub use self::server::ServerCommand;
