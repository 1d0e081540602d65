//! Binary entry point for `ephemeral-pg`.
//!
//! All logic lives in `ephemeral_pg::cli`; this binary only delegates.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> { ephemeral_pg::cli::run().await }
