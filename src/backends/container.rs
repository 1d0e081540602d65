//! Deployment shared by the two testcontainers-driven strategies.

use async_trait::async_trait;
use testcontainers_modules::testcontainers::{
    ContainerAsync,
    Image,
    core::{CmdWaitFor, ExecCommand},
};
use tracing::debug;

use crate::{
    error::ProvisionError,
    provisioner::{Deployment, Endpoint},
    readiness::ReadinessProbe,
    request::POSTGRES_PORT,
};

/// A single running container.
///
/// Dropping the wrapped [`ContainerAsync`] removes the container, which
/// covers the case where [`Deployment::terminate`] is never called.
pub(crate) struct ContainerDeployment<I: Image> {
    id: String,
    container: Option<ContainerAsync<I>>,
    probe: Vec<String>,
}

impl<I: Image> ContainerDeployment<I> {
    pub(crate) fn new(container: ContainerAsync<I>, probe: Vec<String>) -> Self {
        Self {
            id: container.id().to_owned(),
            container: Some(container),
            probe,
        }
    }

    fn running(&self) -> Result<&ContainerAsync<I>, ProvisionError> {
        self.container.as_ref().ok_or_else(|| {
            ProvisionError::backend("accessing container", "container already removed")
        })
    }
}

#[async_trait]
impl<I: Image> ReadinessProbe for ContainerDeployment<I> {
    async fn ping(&self) -> Result<bool, ProvisionError> {
        let container = self.running()?;
        let command =
            ExecCommand::new(self.probe.clone()).with_cmd_ready_condition(CmdWaitFor::exit());
        let mut result = container
            .exec(command)
            .await
            .map_err(|e| ProvisionError::backend("running readiness probe", e))?;
        let code = result
            .exit_code()
            .await
            .map_err(|e| ProvisionError::backend("reading readiness probe status", e))?;
        debug!(id = %self.id, ?code, "readiness probe finished");
        Ok(code == Some(0))
    }
}

#[async_trait]
impl<I: Image> Deployment for ContainerDeployment<I> {
    fn id(&self) -> &str { &self.id }

    async fn endpoint(&self) -> Result<Endpoint, ProvisionError> {
        let container = self.running()?;
        let host = container
            .get_host()
            .await
            .map_err(|e| ProvisionError::backend("resolving container host", e))?;
        let port = container
            .get_host_port_ipv4(POSTGRES_PORT)
            .await
            .map_err(|e| ProvisionError::backend("resolving mapped port", e))?;
        Ok(Endpoint {
            host: unbracket(&host.to_string()).to_owned(),
            port,
        })
    }

    async fn terminate(&mut self) -> Result<(), ProvisionError> {
        let Some(container) = self.container.take() else {
            return Ok(());
        };
        container
            .rm()
            .await
            .map_err(|e| ProvisionError::backend("removing container", e))
    }
}

/// Strip the brackets an IPv6 host carries in URL form.
pub(crate) fn unbracket(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}
