//! The three interchangeable provisioning strategies.
//!
//! All of them satisfy the same [`Backend`] contract, so callers pick one with
//! [`Strategy`] and drive it through [`Provisioner`].

mod compose;
mod container;
mod generic;
mod module;

use std::{fmt, str::FromStr};

use async_trait::async_trait;
use camino::Utf8Path;
use serde::{Deserialize, Serialize};

pub use self::{
    compose::{ComposeBackend, DEFAULT_COMPOSE_FILE, DEFAULT_SERVICE, stack_env},
    generic::GenericContainerBackend,
    module::PostgresModuleBackend,
};
use crate::{
    error::ProvisionError,
    init_scripts::InitScripts,
    provisioner::{Backend, Deployment, Instance, Provisioner},
    request::ProvisionRequest,
};

/// Selects how the database process is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Hand-built container request.
    #[default]
    Generic,
    /// Dedicated `PostgreSQL` module image.
    Module,
    /// `docker compose` stack.
    Compose,
}

impl Strategy {
    /// Every strategy, in declaration order.
    pub const ALL: [Self; 3] = [Self::Generic, Self::Module, Self::Compose];

    /// Lowercase name, as accepted by [`FromStr`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Module => "module",
            Self::Compose => "compose",
        }
    }

    /// Build the backend for this strategy.
    ///
    /// `compose_file` is only consulted by [`Strategy::Compose`].
    #[must_use]
    pub fn backend(self, compose_file: &Utf8Path) -> Box<dyn Backend> {
        match self {
            Self::Generic => Box::new(GenericContainerBackend),
            Self::Module => Box::new(PostgresModuleBackend),
            Self::Compose => Box::new(ComposeBackend::new(compose_file)),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Error for [`Strategy::from_str`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown provisioning strategy '{0}' (expected generic, module, or compose)")]
pub struct UnknownStrategy(pub String);

impl FromStr for Strategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownStrategy(s.to_owned()))
    }
}

#[async_trait]
impl<B: Backend + ?Sized> Backend for Box<B> {
    fn name(&self) -> &'static str { (**self).name() }

    async fn prepare(&self, request: &ProvisionRequest) -> Result<(), ProvisionError> {
        (**self).prepare(request).await
    }

    async fn start(
        &self,
        request: &ProvisionRequest,
        scripts: &InitScripts,
    ) -> Result<Box<dyn Deployment>, ProvisionError> {
        (**self).start(request, scripts).await
    }
}

/// Provision one instance with `strategy`.
///
/// # Errors
///
/// Propagates any [`ProvisionError`] from [`Provisioner::provision`].
pub async fn provision(
    strategy: Strategy,
    request: &ProvisionRequest,
    compose_file: &Utf8Path,
) -> Result<Instance, ProvisionError> {
    Provisioner::new(strategy.backend(compose_file))
        .provision(request)
        .await
}
