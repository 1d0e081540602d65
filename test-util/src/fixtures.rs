//! Paths and rstest fixtures shared by the integration tests.

// Note: The rstest #[fixture] macro generates sibling items that cannot be
// individually annotated, requiring this module-level suppression.
#![expect(
    missing_docs,
    reason = "rstest #[fixture] macro generates undocumented helper items"
)]

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ephemeral_pg::ProvisionRequest;
use rstest::fixture;
use tempfile::TempDir;

/// Root of the workspace, where `schema/` and `compose.yaml` live.
#[must_use]
pub fn workspace_root() -> Utf8PathBuf {
    Utf8Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map_or_else(|| Utf8PathBuf::from(".."), Utf8Path::to_path_buf)
}

/// Directory of init scripts creating and seeding the `sample` table.
#[must_use]
pub fn schema_dir() -> Utf8PathBuf { workspace_root().join("schema") }

/// Stack file used by the compose strategy.
#[must_use]
pub fn compose_file() -> Utf8PathBuf { workspace_root().join("compose.yaml") }

/// rstest fixture providing a request seeded from the workspace schema.
///
/// The startup timeout is raised to leave room for image pulls on cold CI
/// runners.
///
/// # Panics
///
/// Panics if the default request fails validation.
#[fixture]
#[expect(clippy::expect_used, reason = "fixtures fail loudly")]
pub fn request() -> ProvisionRequest {
    ProvisionRequest::builder()
        .schema_dir(schema_dir())
        .startup_timeout(Duration::from_secs(120))
        .build()
        .expect("default request is valid")
}

/// rstest fixture providing an existing directory with no init scripts.
///
/// # Panics
///
/// Panics if the temporary directory cannot be created.
#[fixture]
#[expect(clippy::expect_used, reason = "fixtures fail loudly")]
pub fn empty_schema_dir() -> TempDir {
    let dir = tempfile::tempdir().expect("create temp dir");
    std::fs::write(dir.path().join("README.txt"), "not an init script")
        .expect("write non-sql file");
    dir
}
