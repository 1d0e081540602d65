//! Raw container strategy.
//!
//! Builds the container request by hand: image, exposed port, environment,
//! command, and each init script copied into `/docker-entrypoint-initdb.d`.

use async_trait::async_trait;
use testcontainers_modules::testcontainers::{
    ContainerRequest,
    GenericImage,
    ImageExt,
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
};
use tracing::debug;

use super::container::ContainerDeployment;
use crate::{
    error::ProvisionError,
    init_scripts::InitScripts,
    provisioner::{Backend, Deployment},
    request::{POSTGRES_PORT, ProvisionRequest},
};

/// Drives a [`GenericImage`] directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericContainerBackend;

impl GenericContainerBackend {
    fn container_request(
        request: &ProvisionRequest,
        scripts: &InitScripts,
    ) -> ContainerRequest<GenericImage> {
        // Readiness is polled by the provisioner, so the runner must not block
        // on the temporary init server's log line.
        let image = GenericImage::new(request.image().name(), request.image().tag())
            .with_exposed_port(POSTGRES_PORT.tcp())
            .with_wait_for(WaitFor::Nothing);
        let mut container: ContainerRequest<GenericImage> =
            image.with_startup_timeout(request.startup_timeout());
        if !request.command().is_empty() {
            container = container.with_cmd(request.command().to_vec());
        }
        for (key, value) in request.container_env() {
            container = container.with_env_var(key, value);
        }
        for script in scripts.scripts() {
            container = container.with_copy_to(script.container_path(), script.contents().to_vec());
        }
        container
    }
}

#[async_trait]
impl Backend for GenericContainerBackend {
    fn name(&self) -> &'static str { "generic" }

    async fn prepare(&self, request: &ProvisionRequest) -> Result<(), ProvisionError> {
        GenericImage::new(request.image().name(), request.image().tag())
            .pull_image()
            .await
            .map_err(|e| ProvisionError::unavailable("pulling image", e))?;
        Ok(())
    }

    async fn start(
        &self,
        request: &ProvisionRequest,
        scripts: &InitScripts,
    ) -> Result<Box<dyn Deployment>, ProvisionError> {
        let container = Self::container_request(request, scripts)
            .start()
            .await
            .map_err(|e| ProvisionError::backend("starting generic container", e))?;
        debug!(id = container.id(), image = %request.image(), "generic container started");
        Ok(Box::new(ContainerDeployment::new(
            container,
            request.readiness_command(),
        )))
    }
}
