// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::runtime::{
    ContainerInspection, ContainerRuntime, ContainerSpec, RuntimeError, RuntimeErrorKind,
};
use crate::domain::server::ContainerId;
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::service::{HostConfig, PortBinding};
use bollard::Docker;
use futures::StreamExt;
use std::collections::HashMap;
use tracing::info;

const DOCKER_HINT: &str = "Ensure Docker is running:\n\
     - On Windows: Start Docker Desktop\n\
     - On Linux: sudo systemctl start docker\n\
     - On macOS: Start Docker Desktop\n\n\
     Verify with: docker ps";

pub struct DockerRuntime {
    docker: Docker,
    stop_timeout_secs: i64,
}

impl DockerRuntime {
    pub fn new(socket_path: Option<String>, stop_timeout_secs: u64) -> Result<Self, RuntimeError> {
        // Connect to Docker daemon (custom socket or auto-detect)
        let docker = if let Some(path) = socket_path {
            #[cfg(unix)]
            let result = Docker::connect_with_unix(&path, 120, bollard::API_DEFAULT_VERSION);

            #[cfg(windows)]
            let result = Docker::connect_with_named_pipe(&path, 120, bollard::API_DEFAULT_VERSION);

            result.map_err(|e| {
                RuntimeError::unavailable(format!(
                    "Failed to connect to Docker at {}: {}\n\n\
                     Ensure Docker is running and the socket path is correct.",
                    path, e
                ))
            })?
        } else {
            Docker::connect_with_local_defaults().map_err(|e| {
                RuntimeError::unavailable(format!(
                    "Failed to connect to Docker: {}\n\n\
                     Common causes:\n\
                     - Docker daemon not running (check: docker ps)\n\
                     - Permission denied accessing Docker socket\n\
                     - On Linux: Current user not in 'docker' group\n\n\
                     Try:\n\
                     - Start Docker: systemctl start docker (Linux) or Docker Desktop (Windows/Mac)\n\
                     - Check permissions: ls -la /var/run/docker.sock",
                    e
                ))
            })?
        };

        Ok(Self {
            docker,
            stop_timeout_secs: i64::try_from(stop_timeout_secs).unwrap_or(i64::MAX),
        })
    }
}

/// Map a bollard error onto the runtime error taxonomy
fn classify(err: bollard::errors::Error, context: &str) -> RuntimeError {
    use bollard::errors::Error as DockerError;

    let kind = match &err {
        DockerError::DockerResponseServerError { status_code: 404, .. } => RuntimeErrorKind::NotFound,
        DockerError::DockerResponseServerError { status_code: 304, .. } => RuntimeErrorKind::AlreadyInState,
        DockerError::DockerResponseServerError { .. } => RuntimeErrorKind::Other,
        DockerError::RequestTimeoutError | DockerError::IOError { .. } => RuntimeErrorKind::Unavailable,
        _ => RuntimeErrorKind::Other,
    };
    RuntimeError::new(kind, format!("{}: {}", context, err))
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker.ping().await.map_err(|e| {
            RuntimeError::unavailable(format!(
                "Cannot connect to Docker daemon: {}\n\n{}",
                e, DOCKER_HINT
            ))
        })?;
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        info!("Pulling image: {}", image);
        let options = Some(CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            if let Err(e) = result {
                return Err(classify(e, &format!("Failed to pull image {}", image)));
            }
        }
        info!("Successfully pulled image: {}", image);
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) => {
                let err = classify(e, &format!("Failed to inspect image {}", image));
                if err.is(RuntimeErrorKind::NotFound) {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerId, RuntimeError> {
        let port_key = spec.port_key();

        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            port_key.clone(),
            Some(vec![PortBinding {
                host_ip: None,
                host_port: Some(spec.host_port.to_string()),
            }]),
        );

        let host_config = HostConfig {
            binds: Some(vec![spec.data_bind()]),
            port_bindings: Some(port_bindings),
            ..Default::default()
        };

        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(port_key, HashMap::new());

        let mut env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        env.sort();

        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(env),
            exposed_ports: Some(exposed_ports),
            tty: Some(spec.tty),
            open_stdin: Some(spec.open_stdin),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let res = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| classify(e, &format!("Failed to create container {}", spec.name)))?;

        for warning in &res.warnings {
            tracing::warn!(container = %spec.name, "Docker warning: {}", warning);
        }

        info!(container_id = %res.id, name = %spec.name, "Created server container");
        Ok(ContainerId::new(res.id))
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), RuntimeError> {
        self.docker
            .start_container(id.as_str(), None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| classify(e, &format!("Failed to start container {}", id)))?;
        info!(container_id = %id, "Started server container");
        Ok(())
    }

    async fn stop_container(&self, id: &ContainerId) -> Result<(), RuntimeError> {
        let options = StopContainerOptions { t: self.stop_timeout_secs };
        self.docker
            .stop_container(id.as_str(), Some(options))
            .await
            .map_err(|e| classify(e, &format!("Failed to stop container {}", id)))?;
        info!(container_id = %id, "Stopped server container");
        Ok(())
    }

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInspection, RuntimeError> {
        let inspect = self
            .docker
            .inspect_container(id.as_str(), None::<InspectContainerOptions>)
            .await
            .map_err(|e| classify(e, &format!("Failed to inspect container {}", id)))?;

        let state = inspect
            .state
            .and_then(|s| s.status)
            .map(|status| status.to_string())
            .filter(|status| !status.is_empty());

        Ok(ContainerInspection {
            id: ContainerId::new(inspect.id.unwrap_or_else(|| id.to_string())),
            state,
        })
    }

    async fn remove_container(&self, id: &ContainerId) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        self.docker
            .remove_container(id.as_str(), Some(options))
            .await
            .map_err(|e| classify(e, &format!("Failed to remove container {}", id)))?;

        info!(container_id = %id, "Removed server container");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status_codes() {
        let not_found = bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "No such container".into(),
        };
        assert_eq!(classify(not_found, "inspect").kind, RuntimeErrorKind::NotFound);

        let not_modified = bollard::errors::Error::DockerResponseServerError {
            status_code: 304,
            message: String::new(),
        };
        assert_eq!(classify(not_modified, "start").kind, RuntimeErrorKind::AlreadyInState);

        let conflict = bollard::errors::Error::DockerResponseServerError {
            status_code: 409,
            message: "conflict".into(),
        };
        assert_eq!(classify(conflict, "remove").kind, RuntimeErrorKind::Other);

        assert_eq!(
            classify(bollard::errors::Error::RequestTimeoutError, "ping").kind,
            RuntimeErrorKind::Unavailable
        );
    }
}
