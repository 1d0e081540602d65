//! Layered configuration for provisioning.
//!
//! Values come from `EPHEMERAL_PG_*` environment variables, configuration
//! files, and command-line flags, merged by [`OrthoConfig`]. Every field is
//! optional; unset fields fall back to the [`ProvisionRequest`] defaults.

#![expect(
    non_snake_case,
    reason = "OrthoConfig derive macro generates helper modules with uppercase names"
)]
#![allow(
    missing_docs,
    reason = "OrthoConfig derive macro generates items that cannot be documented"
)]
#![allow(
    unfulfilled_lint_expectations,
    reason = "derive macros conditionally generate items"
)]

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

use crate::{
    backends::{ComposeBackend, DEFAULT_COMPOSE_FILE, Strategy},
    error::ProvisionError,
    provisioner::Backend,
    request::ProvisionRequest,
};

/// Provisioning settings as loaded from the environment and config files.
#[derive(Debug, Clone, Serialize, Deserialize, OrthoConfig, Default, PartialEq, Eq)]
#[ortho_config(prefix = "EPHEMERAL_PG_")]
pub struct ProvisionConfig {
    /// Provisioning strategy: `generic`, `module`, or `compose`.
    pub strategy: Option<Strategy>,
    /// Container image, e.g. `postgres:17-alpine`.
    pub image: Option<String>,
    /// Database created at startup.
    pub database: Option<String>,
    /// Connecting role.
    pub user: Option<String>,
    /// Password for the connecting role.
    pub password: Option<String>,
    /// Directory holding `*.sql` init scripts.
    pub schema_dir: Option<Utf8PathBuf>,
    /// Stack file for the compose strategy.
    pub compose_file: Option<Utf8PathBuf>,
    /// Database service inside the compose stack.
    pub compose_service: Option<String>,
    /// Docker CLI binary used by the compose strategy.
    pub docker: Option<String>,
    /// Value for `TZ`.
    pub timezone: Option<String>,
    /// Value for `LANG`.
    pub locale: Option<String>,
    /// Value for `POSTGRES_HOST_AUTH_METHOD`, e.g. `trust` or `scram-sha-256`.
    pub auth_method: Option<String>,
    /// Value for `POSTGRES_INITDB_ARGS`.
    pub initdb_args: Option<String>,
    /// Readiness timeout in seconds.
    pub startup_timeout_secs: Option<u64>,
    /// Readiness poll interval in milliseconds.
    pub poll_interval_ms: Option<u64>,
}

impl ProvisionConfig {
    /// Configured strategy, defaulting to [`Strategy::Generic`].
    #[must_use]
    pub fn strategy(&self) -> Strategy { self.strategy.unwrap_or_default() }

    /// Stack file for the compose strategy.
    #[must_use]
    pub fn compose_file(&self) -> Utf8PathBuf {
        self.compose_file
            .clone()
            .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_COMPOSE_FILE))
    }

    /// Backend for the configured strategy.
    ///
    /// Compose settings apply only to [`Strategy::Compose`].
    #[must_use]
    pub fn backend(&self) -> Box<dyn Backend> {
        let strategy = self.strategy();
        if strategy != Strategy::Compose {
            return strategy.backend(&self.compose_file());
        }
        let mut backend = ComposeBackend::new(self.compose_file());
        if let Some(ref service) = self.compose_service {
            backend = backend.with_service(service.as_str());
        }
        if let Some(ref docker) = self.docker {
            backend = backend.with_docker(docker.as_str());
        }
        Box::new(backend)
    }

    /// Convert into a fully formed [`ProvisionRequest`].
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::InvalidRequest`] when a value fails
    /// validation (bad database name, zero poll interval, ...).
    pub fn to_request(&self) -> Result<ProvisionRequest, ProvisionError> {
        let mut builder = ProvisionRequest::builder();

        if let Some(ref image) = self.image {
            builder = builder.image(image.as_str());
        }
        if let Some(ref database) = self.database {
            builder = builder.database(database.as_str());
        }
        if let Some(ref user) = self.user {
            builder = builder.user(user.as_str());
        }
        if let Some(ref password) = self.password {
            builder = builder.password(password.as_str());
        }
        if let Some(ref dir) = self.schema_dir {
            builder = builder.schema_dir(dir.clone());
        }
        if let Some(ref tz) = self.timezone {
            builder = builder.env("TZ", tz.as_str());
        }
        if let Some(ref locale) = self.locale {
            builder = builder.env("LANG", locale.as_str());
        }
        if let Some(ref method) = self.auth_method {
            builder = builder.env("POSTGRES_HOST_AUTH_METHOD", method.as_str());
        }
        if let Some(ref args) = self.initdb_args {
            builder = builder.env("POSTGRES_INITDB_ARGS", args.as_str());
        }
        if let Some(secs) = self.startup_timeout_secs {
            builder = builder.startup_timeout(Duration::from_secs(secs));
        }
        if let Some(ms) = self.poll_interval_ms {
            builder = builder.poll_interval(Duration::from_millis(ms));
        }

        builder.build()
    }
}
