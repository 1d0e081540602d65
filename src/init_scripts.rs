//! Discovery of `*.sql` initialization scripts.
//!
//! The official `postgres` image runs every script in
//! `/docker-entrypoint-initdb.d` on first start. Scripts are collected from a
//! single schema directory (not recursively) and kept in lexical file-name
//! order, the same order a `*.sql` glob produces.

use std::{fs, io};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::error::ProvisionError;

/// Directory the `postgres` image executes init scripts from.
pub const INITDB_DIR: &str = "/docker-entrypoint-initdb.d";

/// One script to run at container startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitScript {
    file_name: String,
    contents: Vec<u8>,
}

impl InitScript {
    /// Bare file name, reused inside the container.
    #[must_use]
    pub fn file_name(&self) -> &str { &self.file_name }

    /// Absolute path the script is copied to inside the container.
    #[must_use]
    pub fn container_path(&self) -> String { format!("{INITDB_DIR}/{}", self.file_name) }

    /// Raw script bytes.
    #[must_use]
    pub fn contents(&self) -> &[u8] { &self.contents }
}

/// Ordered, non-empty set of init scripts from one directory.
#[derive(Debug, Clone)]
pub struct InitScripts {
    dir: Utf8PathBuf,
    scripts: Vec<InitScript>,
}

impl InitScripts {
    /// Collect every `*.sql` file directly inside `dir`.
    ///
    /// # Errors
    ///
    /// - [`ProvisionError::SchemaDirectoryMissing`] if `dir` does not exist or
    ///   is not a directory.
    /// - [`ProvisionError::NoInitScriptsFound`] if it holds no `*.sql` files.
    /// - [`ProvisionError::InitScriptRead`] if a script or the directory
    ///   cannot be read.
    pub fn discover(dir: &Utf8Path) -> Result<Self, ProvisionError> {
        if !dir.is_dir() {
            return Err(ProvisionError::SchemaDirectoryMissing {
                path: dir.to_owned(),
            });
        }
        let read_err = |source: io::Error| ProvisionError::InitScriptRead {
            path: dir.to_owned(),
            source,
        };

        let mut paths = Vec::new();
        for entry in dir.read_dir_utf8().map_err(read_err)? {
            let entry = entry.map_err(read_err)?;
            let path = entry.path();
            if path.extension() == Some("sql") && path.is_file() {
                paths.push(path.to_owned());
            }
        }
        if paths.is_empty() {
            return Err(ProvisionError::NoInitScriptsFound {
                path: dir.to_owned(),
            });
        }
        paths.sort();

        let scripts = paths
            .into_iter()
            .map(load_script)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(dir = %dir, count = scripts.len(), "discovered init scripts");
        Ok(Self {
            dir: dir.to_owned(),
            scripts,
        })
    }

    /// Directory the scripts were read from.
    #[must_use]
    pub fn dir(&self) -> &Utf8Path { &self.dir }

    /// Scripts in execution order.
    #[must_use]
    pub fn scripts(&self) -> &[InitScript] { &self.scripts }

    /// Number of scripts found.
    #[must_use]
    pub const fn len(&self) -> usize { self.scripts.len() }

    /// Always `false`; discovery never yields an empty set.
    #[must_use]
    pub const fn is_empty(&self) -> bool { self.scripts.is_empty() }
}

fn load_script(path: Utf8PathBuf) -> Result<InitScript, ProvisionError> {
    let contents = fs::read(&path).map_err(|source| ProvisionError::InitScriptRead {
        path: path.clone(),
        source,
    })?;
    let file_name = path.file_name().unwrap_or_default().to_owned();
    Ok(InitScript {
        file_name,
        contents,
    })
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;

    #[fixture]
    fn schema_dir() -> TempDir { TempDir::new().expect("temp dir should be created") }

    fn utf8(dir: &TempDir) -> &Utf8Path {
        Utf8Path::from_path(dir.path()).expect("temp dir path should be UTF-8")
    }

    #[rstest]
    fn missing_directory_is_reported() {
        let err = InitScripts::discover(Utf8Path::new("/definitely/not/here"))
            .expect_err("missing directory should fail");
        assert!(matches!(err, ProvisionError::SchemaDirectoryMissing { .. }));
    }

    #[rstest]
    fn directory_without_sql_is_rejected(schema_dir: TempDir) {
        fs::write(schema_dir.path().join("README.md"), "docs").expect("write file");
        fs::write(schema_dir.path().join("schema.sql.bak"), "old").expect("write file");
        let err = InitScripts::discover(utf8(&schema_dir)).expect_err("no scripts should fail");
        assert!(matches!(err, ProvisionError::NoInitScriptsFound { .. }));
    }

    #[rstest]
    fn scripts_are_sorted_by_file_name(schema_dir: TempDir) {
        for name in ["010_data.sql", "001_tables.sql", "002_index.sql", "notes.txt"] {
            fs::write(schema_dir.path().join(name), name).expect("write file");
        }
        let scripts = InitScripts::discover(utf8(&schema_dir)).expect("scripts found");
        let names: Vec<_> = scripts.scripts().iter().map(InitScript::file_name).collect();
        assert_eq!(names, ["001_tables.sql", "002_index.sql", "010_data.sql"]);
        assert_eq!(scripts.len(), 3);
        let first = scripts.scripts().first().expect("first script");
        assert_eq!(first.contents(), b"001_tables.sql");
        assert_eq!(
            first.container_path(),
            "/docker-entrypoint-initdb.d/001_tables.sql"
        );
    }

    #[rstest]
    fn nested_directories_are_ignored(schema_dir: TempDir) {
        let nested = schema_dir.path().join("nested.sql");
        fs::create_dir(&nested).expect("create dir");
        fs::write(nested.join("inner.sql"), "select 1").expect("write file");
        let err = InitScripts::discover(utf8(&schema_dir)).expect_err("nested only");
        assert!(matches!(err, ProvisionError::NoInitScriptsFound { .. }));
    }
}
