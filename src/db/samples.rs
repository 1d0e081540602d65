//! Sample record helpers.

use diesel::{prelude::*, result::QueryResult};
use diesel_async::{RunQueryDsl, pooled_connection::bb8::RunError};
use thiserror::Error;

use super::{
    connection::{DbConnection, DbPool},
    models::{NewSample, Sample},
};

/// Failure while running a pooled query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// No connection could be checked out of the pool.
    #[error("failed to check out a connection: {0}")]
    Pool(#[from] RunError),
    /// The query itself failed.
    #[error(transparent)]
    Diesel(#[from] diesel::result::Error),
}

/// Insert a sample row and return it as stored.
///
/// # Errors
/// Returns any error produced by the insertion query.
#[must_use = "handle the result"]
pub async fn create_sample(conn: &mut DbConnection, name: &str) -> QueryResult<Sample> {
    use super::schema::sample::dsl::sample;
    diesel::insert_into(sample)
        .values(&NewSample { name })
        .returning(Sample::as_returning())
        .get_result(conn)
        .await
}

/// Load every sample row ordered by id.
///
/// # Errors
/// Returns any error produced by the underlying database query.
#[must_use = "handle the result"]
pub async fn list_samples(conn: &mut DbConnection) -> QueryResult<Vec<Sample>> {
    use super::schema::sample::dsl::{id, sample};
    sample
        .order(id.asc())
        .select(Sample::as_select())
        .load(conn)
        .await
}

/// Insert a sample row through `pool`.
///
/// # Errors
/// Returns [`QueryError::Pool`] when no connection is available and
/// [`QueryError::Diesel`] when the insert fails.
pub async fn insert_sample(pool: &DbPool, name: &str) -> Result<Sample, QueryError> {
    let mut conn = pool.get().await?;
    Ok(create_sample(&mut conn, name).await?)
}

/// Load every sample row through `pool`.
///
/// # Errors
/// Returns [`QueryError::Pool`] when no connection is available and
/// [`QueryError::Diesel`] when the query fails.
pub async fn select_samples(pool: &DbPool) -> Result<Vec<Sample>, QueryError> {
    let mut conn = pool.get().await?;
    Ok(list_samples(&mut conn).await?)
}
