//! Provisioning requests.
//!
//! A [`ProvisionRequest`] captures everything a backend needs to bring up a
//! disposable `PostgreSQL` instance. Requests are assembled with
//! [`ProvisionRequestBuilder`] and are immutable afterwards.

use std::{collections::BTreeMap, fmt, ops::Deref, time::Duration};

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::ProvisionError;

/// Image used when the request does not name one.
pub const DEFAULT_IMAGE: &str = "postgres:17-alpine";
/// Port the server listens on inside the container.
pub const POSTGRES_PORT: u16 = 5432;
/// Directory searched for init scripts when none is configured.
pub const DEFAULT_SCHEMA_DIR: &str = "schema";
/// How long provisioning may take before giving up.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);
/// Delay between readiness checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

const DEFAULT_CREDENTIAL: &str = "test";
const MAX_NAME_LEN: usize = 63;

/// A validated `PostgreSQL` database name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseName(String);

/// Validation error for [`DatabaseName::new`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DatabaseNameError {
    /// Database name is empty or contains only whitespace.
    #[error("database name cannot be empty")]
    Empty,
    /// Database name exceeds `PostgreSQL`'s 63-character limit.
    #[error("database name cannot exceed 63 characters")]
    TooLong,
    /// Database name contains non-ASCII-alphanumeric characters (except underscores).
    #[error("database name contains invalid characters")]
    InvalidCharacters,
}

impl DatabaseName {
    /// Creates a new validated database name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, exceeds 63 characters, or
    /// contains non-alphanumeric characters (except underscores).
    pub fn new(name: impl Into<String>) -> Result<Self, DatabaseNameError> {
        let value = name.into();
        if value.trim().is_empty() {
            return Err(DatabaseNameError::Empty);
        }
        if value.len() > MAX_NAME_LEN {
            return Err(DatabaseNameError::TooLong);
        }
        if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(DatabaseNameError::InvalidCharacters);
        }
        Ok(Self(value))
    }
}

impl Deref for DatabaseName {
    type Target = str;
    fn deref(&self) -> &Self::Target { &self.0 }
}

impl AsRef<str> for DatabaseName {
    fn as_ref(&self) -> &str { &self.0 }
}

impl fmt::Display for DatabaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

/// Container image split into repository and tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    name: String,
    tag: String,
}

impl ImageRef {
    /// Parse `name[:tag]`, defaulting the tag to `latest`.
    ///
    /// A colon inside a registry host (`host:5000/postgres`) is not treated as
    /// a tag separator.
    #[must_use]
    pub fn parse(image: &str) -> Self {
        match image.rsplit_once(':') {
            Some((name, tag)) if !tag.contains('/') => Self {
                name: name.to_owned(),
                tag: tag.to_owned(),
            },
            _ => Self {
                name: image.to_owned(),
                tag: "latest".to_owned(),
            },
        }
    }

    /// Repository part of the reference.
    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    /// Tag part of the reference.
    #[must_use]
    pub fn tag(&self) -> &str { &self.tag }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

/// Everything needed to provision one instance.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    image: ImageRef,
    database: DatabaseName,
    user: String,
    password: String,
    schema_dir: Utf8PathBuf,
    env: BTreeMap<String, String>,
    command: Vec<String>,
    readiness_command: Option<Vec<String>>,
    startup_timeout: Duration,
    poll_interval: Duration,
}

impl ProvisionRequest {
    /// Start building a request from the defaults.
    #[must_use]
    pub fn builder() -> ProvisionRequestBuilder { ProvisionRequestBuilder::default() }

    /// Image the backend runs.
    #[must_use]
    pub const fn image(&self) -> &ImageRef { &self.image }

    /// Name of the database created at startup.
    #[must_use]
    pub const fn database(&self) -> &DatabaseName { &self.database }

    /// Role used to connect.
    #[must_use]
    pub fn user(&self) -> &str { &self.user }

    /// Password for [`Self::user`].
    #[must_use]
    pub fn password(&self) -> &str { &self.password }

    /// Directory holding the `*.sql` init scripts.
    #[must_use]
    pub fn schema_dir(&self) -> &Utf8Path { &self.schema_dir }

    /// Extra environment passed to the server, without the credential keys.
    #[must_use]
    pub const fn env(&self) -> &BTreeMap<String, String> { &self.env }

    /// Full container environment: [`Self::env`] plus the credential keys.
    ///
    /// The credential keys always win over entries of the same name in
    /// [`Self::env`].
    #[must_use]
    pub fn container_env(&self) -> BTreeMap<String, String> {
        let mut env = self.env.clone();
        env.insert("POSTGRES_DB".to_owned(), self.database.to_string());
        env.insert("POSTGRES_USER".to_owned(), self.user.clone());
        env.insert("POSTGRES_PASSWORD".to_owned(), self.password.clone());
        env
    }

    /// Server command line.
    #[must_use]
    pub fn command(&self) -> &[String] { &self.command }

    /// Readiness probe command run inside the container.
    ///
    /// Defaults to `pg_isready` over TCP so the temporary server used while
    /// init scripts run (which only listens on a Unix socket) is not mistaken
    /// for the final one.
    #[must_use]
    pub fn readiness_command(&self) -> Vec<String> {
        self.readiness_command.clone().unwrap_or_else(|| {
            vec![
                "pg_isready".to_owned(),
                "-h".to_owned(),
                "127.0.0.1".to_owned(),
                "-p".to_owned(),
                POSTGRES_PORT.to_string(),
                "-U".to_owned(),
                self.user.clone(),
                "-d".to_owned(),
                self.database.to_string(),
            ]
        })
    }

    /// Upper bound on the time spent waiting for readiness.
    #[must_use]
    pub const fn startup_timeout(&self) -> Duration { self.startup_timeout }

    /// Delay between readiness checks.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration { self.poll_interval }
}

/// Builder for [`ProvisionRequest`].
#[derive(Debug, Clone)]
pub struct ProvisionRequestBuilder {
    image: String,
    database: String,
    user: String,
    password: String,
    schema_dir: Utf8PathBuf,
    env: BTreeMap<String, String>,
    command: Vec<String>,
    readiness_command: Option<Vec<String>>,
    startup_timeout: Duration,
    poll_interval: Duration,
}

impl Default for ProvisionRequestBuilder {
    fn default() -> Self {
        let env = [
            ("TZ", "UTC"),
            ("LANG", "ja_JP.UTF-8"),
            ("POSTGRES_INITDB_ARGS", "--encoding=UTF-8"),
            ("POSTGRES_HOST_AUTH_METHOD", "trust"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();
        Self {
            image: DEFAULT_IMAGE.to_owned(),
            database: DEFAULT_CREDENTIAL.to_owned(),
            user: DEFAULT_CREDENTIAL.to_owned(),
            password: DEFAULT_CREDENTIAL.to_owned(),
            schema_dir: Utf8PathBuf::from(DEFAULT_SCHEMA_DIR),
            env,
            command: ["postgres", "-c", "log_statement=all"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            readiness_command: None,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ProvisionRequestBuilder {
    /// Container image, as `name[:tag]`.
    #[must_use]
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Database created at startup.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Connecting role.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Password for the connecting role.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Directory searched for `*.sql` init scripts.
    #[must_use]
    pub fn schema_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.schema_dir = dir.into();
        self
    }

    /// Add or replace one environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Replace the server command line.
    #[must_use]
    pub fn command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the readiness probe command.
    #[must_use]
    pub fn readiness_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.readiness_command = Some(command.into_iter().map(Into::into).collect());
        self
    }

    /// Upper bound on readiness polling.
    #[must_use]
    pub const fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Delay between readiness checks.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Validate and freeze the request.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::InvalidRequest`] if the database name is
    /// invalid, the user is empty, the readiness command is empty, or the
    /// poll interval is zero.
    pub fn build(self) -> Result<ProvisionRequest, ProvisionError> {
        let database = DatabaseName::new(self.database)?;
        if self.user.trim().is_empty() {
            return Err(ProvisionError::InvalidRequest("user cannot be empty".to_owned()));
        }
        if self.poll_interval.is_zero() {
            return Err(ProvisionError::InvalidRequest(
                "poll interval must be greater than zero".to_owned(),
            ));
        }
        if self.readiness_command.as_ref().is_some_and(Vec::is_empty) {
            return Err(ProvisionError::InvalidRequest(
                "readiness command cannot be empty".to_owned(),
            ));
        }
        Ok(ProvisionRequest {
            image: ImageRef::parse(&self.image),
            database,
            user: self.user,
            password: self.password,
            schema_dir: self.schema_dir,
            env: self.env,
            command: self.command,
            readiness_command: self.readiness_command,
            startup_timeout: self.startup_timeout,
            poll_interval: self.poll_interval,
        })
    }
}
