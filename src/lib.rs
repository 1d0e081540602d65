//! Disposable `PostgreSQL` instances for integration tests.
//!
//! A [`Provisioner`] starts a database through one of three interchangeable
//! [`Strategy`] backends (a hand-built container, the dedicated `PostgreSQL`
//! module image, or a `docker compose` stack), seeds it from a directory of
//! `*.sql` init scripts, waits until the server accepts connections, and
//! returns an [`Instance`] exposing a connection string. Teardown is
//! idempotent and also happens when the instance is dropped.
//!
//! The [`db`] module offers a small Diesel layer used to exercise a
//! provisioned database.

pub mod backends;
pub mod cli;
pub mod config;
pub mod db;
pub mod dsn;
pub mod error;
pub mod init_scripts;
pub mod logging;
pub mod provisioner;
pub mod readiness;
pub mod request;

pub use backends::{Strategy, provision};
pub use config::ProvisionConfig;
pub use dsn::DatabaseUrl;
pub use error::ProvisionError;
pub use provisioner::{Instance, Provisioner};
pub use request::{ProvisionRequest, ProvisionRequestBuilder};
