//! Utilities for integration tests.
//!
//! The `test-util` crate locates the workspace fixtures (`schema/` and
//! `compose.yaml`), checks whether a Docker daemon is reachable, and offers
//! rstest fixtures plus a provision-or-skip helper so container-backed tests
//! degrade to a warning on machines without Docker.

pub mod docker;
pub mod fixtures;

pub use docker::{DockerUnavailable, docker_available, provision_or_skip};
pub use fixtures::{compose_file, empty_schema_dir, request, schema_dir, workspace_root};

/// Error type used throughout the test helpers.
pub type AnyError = anyhow::Error;
