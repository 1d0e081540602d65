//! Dedicated `PostgreSQL` module strategy.
//!
//! Uses the community `Postgres` image helper for credentials and its own
//! startup wait, then layers the request's tag, environment, command, and init
//! scripts on top.

use async_trait::async_trait;
use testcontainers_modules::{
    postgres::Postgres,
    testcontainers::{ContainerRequest, ImageExt, runners::AsyncRunner},
};
use tracing::debug;

use super::container::ContainerDeployment;
use crate::{
    error::ProvisionError,
    init_scripts::InitScripts,
    provisioner::{Backend, Deployment},
    request::ProvisionRequest,
};

/// Drives the `testcontainers-modules` [`Postgres`] helper.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresModuleBackend;

fn container_request(request: &ProvisionRequest, scripts: &InitScripts) -> ContainerRequest<Postgres> {
    let module = Postgres::default()
        .with_db_name(request.database())
        .with_user(request.user())
        .with_password(request.password());
    let mut container = module
        .with_name(request.image().name())
        .with_tag(request.image().tag())
        .with_startup_timeout(request.startup_timeout());
    if !request.command().is_empty() {
        container = container.with_cmd(request.command().to_vec());
    }
    for (key, value) in request.env() {
        container = container.with_env_var(key.as_str(), value.as_str());
    }
    for script in scripts.scripts() {
        container = container.with_copy_to(script.container_path(), script.contents().to_vec());
    }
    container
}

#[async_trait]
impl Backend for PostgresModuleBackend {
    fn name(&self) -> &'static str { "module" }

    async fn prepare(&self, request: &ProvisionRequest) -> Result<(), ProvisionError> {
        Postgres::default()
            .with_name(request.image().name())
            .with_tag(request.image().tag())
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
        let container = container_request(request, scripts)
            .start()
            .await
            .map_err(|e| ProvisionError::backend("starting postgres module container", e))?;
        debug!(id = container.id(), image = %request.image(), "postgres module container started");
        Ok(Box::new(ContainerDeployment::new(
            container,
            request.readiness_command(),
        )))
    }
}
