//! Diesel table definitions matching `schema/*.sql`.

diesel::table! {
    /// Rows written by the end-to-end checks.
    sample (id) {
        /// Identity primary key.
        id -> Integer,
        /// Free-form label.
        name -> Text,
        /// Insertion time, filled by the database.
        created_at -> Timestamp,
    }
}
