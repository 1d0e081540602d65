//! Docker availability checks.

use std::{
    process::{Command, Stdio},
    sync::OnceLock,
    time::Duration,
};

use ephemeral_pg::{Instance, ProvisionError, ProvisionRequest, Strategy, provision};
use tracing::warn;
use wait_timeout::ChildExt;

use crate::{AnyError, fixtures::compose_file};

const DOCKER_INFO_TIMEOUT: Duration = Duration::from_secs(10);

/// Error indicating that no Docker daemon could be reached.
#[derive(Debug)]
pub struct DockerUnavailable;

impl std::fmt::Display for DockerUnavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Docker daemon unreachable")
    }
}

impl std::error::Error for DockerUnavailable {}

/// Returns `true` when `docker info` succeeds within a few seconds.
///
/// The result is computed once per test binary.
#[must_use]
pub fn docker_available() -> bool {
    static AVAILABLE: OnceLock<bool> = OnceLock::new();
    *AVAILABLE.get_or_init(probe_docker)
}

fn probe_docker() -> bool {
    let Ok(mut child) = Command::new("docker")
        .arg("info")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    else {
        return false;
    };
    match child.wait_timeout(DOCKER_INFO_TIMEOUT) {
        Ok(Some(status)) => status.success(),
        Ok(None) | Err(_) => {
            if let Err(err) = child.kill() {
                warn!(error = %err, "failed to kill stalled `docker info`");
            }
            if let Err(err) = child.wait() {
                warn!(error = %err, "failed to reap `docker info`");
            }
            false
        }
    }
}

/// Provision an instance or skip if Docker is unavailable.
///
/// Returns `Ok(None)` (after logging a warning) when no Docker daemon is
/// reachable or the backend reports the runtime as unavailable, for example
/// because the image cannot be pulled offline.
///
/// # Errors
///
/// Returns every other provisioning error, including containers that start
/// but crash or never become ready.
pub async fn provision_or_skip(
    strategy: Strategy,
    request: &ProvisionRequest,
) -> Result<Option<Instance>, AnyError> {
    if !docker_available() {
        warn!(%strategy, "skipping test: {DockerUnavailable}");
        return Ok(None);
    }
    skip_if_unavailable(strategy, provision(strategy, request, &compose_file()).await)
}

fn skip_if_unavailable<T>(
    strategy: Strategy,
    result: Result<T, ProvisionError>,
) -> Result<Option<T>, AnyError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_unavailable() => {
            warn!(%strategy, "skipping test: {err}");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;

    use super::*;

    #[rstest]
    fn unavailable_runtime_skips() {
        let result: Result<(), _> =
            Err(ProvisionError::unavailable("pulling image", "daemon not running"));
        let outcome = skip_if_unavailable(Strategy::Generic, result).expect("should skip");
        assert!(outcome.is_none());
    }

    #[rstest]
    #[case(ProvisionError::backend("starting container", "exited with code 1"))]
    #[case(ProvisionError::ProvisioningTimeout { timeout: Duration::from_secs(1) })]
    fn real_failures_are_not_skipped(#[case] err: ProvisionError) {
        let result: Result<(), _> = Err(err);
        assert!(skip_if_unavailable(Strategy::Compose, result).is_err());
    }

    #[rstest]
    fn success_passes_through() {
        let outcome = skip_if_unavailable(Strategy::Module, Ok(7)).expect("should succeed");
        assert_eq!(outcome, Some(7));
    }
}
