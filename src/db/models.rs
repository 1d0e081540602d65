//! Row types for the `sample` table.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// A stored sample row.
#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = super::schema::sample)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Sample {
    /// Primary key.
    pub id: i32,
    /// Label supplied on insert.
    pub name: String,
    /// Insertion time.
    pub created_at: NaiveDateTime,
}

/// Values for a new sample row.
#[derive(Insertable, Debug)]
#[diesel(table_name = super::schema::sample)]
pub struct NewSample<'a> {
    /// Label to store.
    pub name: &'a str,
}
