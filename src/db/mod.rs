//! Database module
//!
//! Pooled sqlx connections for MySQL, PostgreSQL and SQLite, exposed to the
//! self-correction loop through the session boundary in `crate::execution`.

pub mod connection;
pub mod decode;

pub use connection::{init_pool, ping, DbPool, PooledSession};
