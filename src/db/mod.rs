//! Minimal schema-access layer used to exercise provisioned databases.
//!
//! The provisioner only hands out a connection string; this module turns it
//! into a Diesel connection pool and offers the insert/select pair the
//! end-to-end checks run against the `sample` table.

mod connection;
pub mod models;
mod samples;
pub mod schema;

pub use self::{
    connection::{DbConnection, DbPool, establish_pool},
    models::{NewSample, Sample},
    samples::{QueryError, create_sample, insert_sample, list_samples, select_samples},
};
