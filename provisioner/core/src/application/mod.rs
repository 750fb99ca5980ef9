// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod deploy_tracker;
pub mod file_manager;
pub mod modpack_installer;
pub mod port_allocator;
pub mod repository_factory;
pub mod server_lifecycle;

pub use deploy_tracker::{DeployTaskTracker, ProgressStream, Subscription, TrackerError};
pub use file_manager::FileManager;
pub use modpack_installer::{ClientUpload, ModpackInstaller};
pub use port_allocator::PortAllocator;
pub use repository_factory::create_server_repository;
pub use server_lifecycle::{
    CreateServerRequest, DeletionReport, LifecycleSettings, ProvisionError, ServerLifecycleService,
};
