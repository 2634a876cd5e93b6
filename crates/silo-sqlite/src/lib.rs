//! # Silo SQLite
//!
//! The indexed relational backend: a mirror of the entry model over an
//! embedded SQLite file.
//!
//! ## Layout
//!
//! A single database file holds a `schema` table (one row of grammar
//! tokens, one TEXT column per field) and a `records` table (one column
//! per field, NUMERIC affinity for Boolean/Number/Date, TEXT otherwise,
//! `PRIMARY KEY` on the index field).
//!
//! ## Write discipline
//!
//! `put` calls are serialized through a store-level single-slot queue.
//! Each task opens the database, resolves the schema, validates, then
//! emits chunked multi-row `INSERT ... ON CONFLICT DO NOTHING` statements
//! sized under SQLite's 999-parameter cap, and closes the connection on
//! every exit path. The conflict clause makes duplicate keys first-wins.

pub mod error;
pub mod store;

pub use error::{Result, SqliteError};
pub use store::SqliteStore;
