//! # sqlx-sqlite-conn-mgr
//!
//! Opens a SQLite database file as the two process-wide connection handles a
//! read/write split needs.
//!
//! ## Core Types
//!
//! - **[`SqliteDatabase`]**: owns a primary (read-write) pool and a replica (read-only) pool
//! - **[`SqliteDatabaseConfig`]**: configuration for pool sizing and idle timeouts
//! - **[`Error`]**: error type for connection management
//!
//! ## Architecture
//!
//! - **Primary**: single-connection read-write pool, so writes are serialized
//! - **Replica**: read-only pool (max 6 connections by default) for concurrent reads
//! - **WAL mode**: enabled when the primary is opened so readers never block the writer

mod config;
mod database;
mod error;

pub use config::SqliteDatabaseConfig;
pub use database::SqliteDatabase;
pub use error::{Error, Result};
