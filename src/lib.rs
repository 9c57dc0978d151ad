//! pgfront: a PostgreSQL v3 wire-protocol server front end.
//!
//! The crate speaks the frontend/backend protocol to standard PostgreSQL
//! clients (psql, JDBC, ODBC, libpq) and hands the actual query work to a
//! pluggable [`engine::QueryEngine`]. Both the Simple Query and the Extended
//! Query (Parse/Bind/Describe/Execute/Close/Sync) sub-protocols are
//! supported, along with out-of-band query cancellation keyed by
//! `(pid, secret)`.

pub mod engine;
pub mod protocol;
pub mod server;
pub mod sql;
