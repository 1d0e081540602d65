//! Compose stack strategy.
//!
//! Shells out to `docker compose` with a fresh project name per instance so
//! concurrent stacks never share containers, volumes, or networks. The stack
//! file reads its settings from the process environment; every strategy uses
//! the same `POSTGRES_*` keys.
//!
//! Only the discovered `*.sql` scripts are visible to the container: they are
//! copied into a private staging directory that lives as long as the stack,
//! and that directory is mounted in place of the schema directory.

use std::{
    collections::BTreeMap,
    fs,
    process::{Command as StdCommand, Output, Stdio},
    time::Duration,
};

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;
use tokio::{process::Command, time::timeout};
use tracing::{debug, warn};
use uuid::Uuid;
use wait_timeout::ChildExt;

use crate::{
    error::ProvisionError,
    init_scripts::InitScripts,
    provisioner::{Backend, Deployment, Endpoint},
    readiness::ReadinessProbe,
    request::{POSTGRES_PORT, ProvisionRequest},
};

/// Stack file used when none is configured.
pub const DEFAULT_COMPOSE_FILE: &str = "compose.yaml";
/// Service holding the database.
pub const DEFAULT_SERVICE: &str = "postgres";

const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);
const DOWN_TIMEOUT: Duration = Duration::from_secs(60);

/// Drives a compose stack through the `docker compose` CLI.
#[derive(Debug, Clone)]
pub struct ComposeBackend {
    compose_file: Utf8PathBuf,
    service: String,
    docker: String,
}

impl Default for ComposeBackend {
    fn default() -> Self { Self::new(DEFAULT_COMPOSE_FILE) }
}

impl ComposeBackend {
    /// Use the stack defined in `compose_file`.
    pub fn new(compose_file: impl Into<Utf8PathBuf>) -> Self {
        Self {
            compose_file: compose_file.into(),
            service: DEFAULT_SERVICE.to_owned(),
            docker: "docker".to_owned(),
        }
    }

    /// Name of the database service inside the stack.
    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Docker CLI binary to invoke.
    #[must_use]
    pub fn with_docker(mut self, docker: impl Into<String>) -> Self {
        self.docker = docker.into();
        self
    }

    fn require_compose_file(&self) -> Result<(), ProvisionError> {
        if self.compose_file.is_file() {
            return Ok(());
        }
        Err(ProvisionError::backend(
            "locating compose file",
            format!("compose file not found: {}", self.compose_file),
        ))
    }
}

/// Environment handed to `docker compose` for interpolation.
///
/// `schema_dir` is the host directory mounted at the init script location.
#[must_use]
pub fn stack_env(request: &ProvisionRequest, schema_dir: &Utf8Path) -> BTreeMap<String, String> {
    let mut env = request.container_env();
    env.insert("POSTGRES_IMAGE".to_owned(), request.image().to_string());
    env.insert("SCHEMA_DIR".to_owned(), schema_dir.as_str().to_owned());
    env
}

/// Init scripts copied into a private directory for mounting.
#[derive(Debug)]
struct StagedScripts {
    path: Utf8PathBuf,
    _dir: TempDir,
}

/// Copy exactly the discovered scripts into a fresh temporary directory.
///
/// The `postgres` entrypoint also runs `*.sh` and compressed SQL files it
/// finds, so the schema directory itself is never mounted.
fn stage_scripts(scripts: &InitScripts) -> Result<StagedScripts, ProvisionError> {
    let stage_err = |e: std::io::Error| ProvisionError::backend("staging init scripts", e);
    let dir = tempfile::Builder::new()
        .prefix("ephemeral-pg-initdb-")
        .tempdir()
        .map_err(stage_err)?;
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).map_err(|p| {
        ProvisionError::backend(
            "staging init scripts",
            format!("temporary directory is not UTF-8: {}", p.display()),
        )
    })?;
    for script in scripts.scripts() {
        let target = path.join(script.file_name());
        fs::write(&target, script.contents()).map_err(stage_err)?;
        readable_by_container(target.as_std_path(), 0o644).map_err(stage_err)?;
    }
    // The entrypoint reads scripts as the unprivileged `postgres` user.
    readable_by_container(path.as_std_path(), 0o755).map_err(stage_err)?;
    debug!(dir = %path, count = scripts.len(), "staged init scripts");
    Ok(StagedScripts { path, _dir: dir })
}

#[cfg(unix)]
fn readable_by_container(path: &std::path::Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn readable_by_container(_path: &std::path::Path, _mode: u32) -> std::io::Result<()> { Ok(()) }

#[async_trait]
impl Backend for ComposeBackend {
    fn name(&self) -> &'static str { "compose" }

    async fn prepare(&self, request: &ProvisionRequest) -> Result<(), ProvisionError> {
        self.require_compose_file()?;
        let image = request.image().to_string();
        debug!(%image, docker = %self.docker, "pulling image");
        let output = Command::new(&self.docker)
            .args(["pull", image.as_str()])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProvisionError::unavailable("pulling image", e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProvisionError::unavailable(
                "pulling image",
                format!("docker pull exited with {}: {}", output.status, stderr.trim()),
            ));
        }
        Ok(())
    }

    async fn start(
        &self,
        request: &ProvisionRequest,
        scripts: &InitScripts,
    ) -> Result<Box<dyn Deployment>, ProvisionError> {
        self.require_compose_file()?;
        let staged = stage_scripts(scripts)?;
        let mut stack = ComposeStack {
            docker: self.docker.clone(),
            file: self.compose_file.clone(),
            project: format!("ephemeral_pg_{}", Uuid::now_v7().simple()),
            service: self.service.clone(),
            env: stack_env(request, &staged.path),
            probe: request.readiness_command(),
            running: true,
            _staged: staged,
        };
        debug!(project = %stack.project, file = %stack.file, "starting compose stack");

        // Bounded by the caller's startup deadline; dropping this future
        // kills `up` and the stack's Drop removes what it created.
        let up = stack.args(["up", "-d", "--wait", stack.service.as_str()]);
        let result = stack
            .output(&up)
            .await
            .and_then(|out| require_success("starting compose stack", &out));
        if let Err(err) = result {
            if let Err(down_err) = stack.down().await {
                warn!(project = %stack.project, error = %down_err, "failed to remove partial stack");
            }
            return Err(err);
        }
        Ok(Box::new(stack))
    }
}

/// One running compose project.
struct ComposeStack {
    docker: String,
    file: Utf8PathBuf,
    project: String,
    service: String,
    env: BTreeMap<String, String>,
    probe: Vec<String>,
    running: bool,
    _staged: StagedScripts,
}

impl ComposeStack {
    fn args<'a>(&self, extra: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut args: Vec<String> = [
            "compose",
            "-f",
            self.file.as_str(),
            "-p",
            self.project.as_str(),
        ]
        .into_iter()
        .map(str::to_owned)
        .collect();
        args.extend(extra.into_iter().map(str::to_owned));
        args
    }

    async fn output(&self, args: &[String]) -> Result<Output, ProvisionError> {
        let mut command = Command::new(&self.docker);
        command
            .args(args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
            .output()
            .await
            .map_err(|e| ProvisionError::backend("running docker compose", e))
    }

    async fn bounded_output(&self, args: &[String]) -> Result<Output, ProvisionError> {
        timeout(COMMAND_TIMEOUT, self.output(args))
            .await
            .map_err(|e| ProvisionError::backend("waiting for docker compose", e))?
    }

    async fn down(&mut self) -> Result<(), ProvisionError> {
        let args = self.args(["down", "-v", "--remove-orphans"]);
        let output = self.bounded_output(&args).await?;
        require_success("removing compose stack", &output)?;
        self.running = false;
        Ok(())
    }
}

#[async_trait]
impl ReadinessProbe for ComposeStack {
    async fn ping(&self) -> Result<bool, ProvisionError> {
        let mut args = self.args(["exec", "-T", self.service.as_str()]);
        args.extend(self.probe.iter().cloned());
        // A hung `exec` means the server is not answering yet.
        let Ok(output) = timeout(COMMAND_TIMEOUT, self.output(&args)).await else {
            debug!(project = %self.project, "readiness check timed out");
            return Ok(false);
        };
        let output = output?;
        debug!(project = %self.project, status = %output.status, "readiness check finished");
        Ok(output.status.success())
    }
}

#[async_trait]
impl Deployment for ComposeStack {
    fn id(&self) -> &str { &self.project }

    async fn endpoint(&self) -> Result<Endpoint, ProvisionError> {
        let port = POSTGRES_PORT.to_string();
        let args = self.args(["port", self.service.as_str(), port.as_str()]);
        let output = self.bounded_output(&args).await?;
        require_success("resolving mapped port", &output)?;
        let published = String::from_utf8_lossy(&output.stdout);
        parse_published_port(&published).ok_or_else(|| {
            ProvisionError::backend(
                "resolving mapped port",
                format!("unexpected `docker compose port` output: {published:?}"),
            )
        })
    }

    async fn terminate(&mut self) -> Result<(), ProvisionError> {
        if !self.running {
            return Ok(());
        }
        self.down().await
    }
}

impl Drop for ComposeStack {
    fn drop(&mut self) {
        if !self.running {
            return;
        }
        let args = self.args(["down", "-v", "--remove-orphans"]);
        let spawned = StdCommand::new(&self.docker)
            .args(&args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(err) => {
                warn!(project = %self.project, error = %err, "could not spawn compose teardown");
                return;
            }
        };
        match child.wait_timeout(DOWN_TIMEOUT) {
            Ok(Some(status)) if status.success() => {}
            Ok(Some(status)) => {
                warn!(project = %self.project, %status, "compose teardown failed");
            }
            Ok(None) => {
                warn!(project = %self.project, "compose teardown timed out");
                if let Err(err) = child.kill() {
                    warn!(project = %self.project, error = %err, "failed to kill compose teardown");
                }
            }
            Err(err) => {
                warn!(project = %self.project, error = %err, "failed to wait for compose teardown");
            }
        }
    }
}

fn require_success(context: &'static str, output: &Output) -> Result<(), ProvisionError> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(ProvisionError::backend(
        context,
        format!("docker compose exited with {}: {}", output.status, stderr.trim()),
    ))
}

/// Parse `docker compose port` output such as `0.0.0.0:49153` or `[::]:49153`.
///
/// Wildcard bind addresses are reported as the loopback address of the same
/// family. Only the first line is considered.
pub(crate) fn parse_published_port(output: &str) -> Option<Endpoint> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let (raw_host, raw_port) = line.rsplit_once(':')?;
    let port = raw_port.parse().ok()?;
    let bind = raw_host.trim_start_matches('[').trim_end_matches(']');
    let host = match bind {
        "" | "0.0.0.0" => "127.0.0.1",
        "::" => "::1",
        other => other,
    };
    Some(Endpoint {
        host: host.to_owned(),
        port,
    })
}
