//! Connection manager errors

use std::path::PathBuf;

/// Failures while opening, handing out or removing a database.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Creating directories or removing database files failed.
   #[error("IO error: {0}")]
   Io(#[from] std::io::Error),

   /// Opening or closing a pool failed.
   #[error("Sqlx error: {0}")]
   Sqlx(#[from] sqlx::Error),

   /// The path cannot back both a primary and a replica, e.g. an empty path
   /// or `:memory:`.
   #[error("cannot share database path between primary and replica: {0:?}")]
   InvalidPath(PathBuf),

   /// The replica needs at least one connection.
   #[error("max_read_connections must be at least 1")]
   NoReadConnections,

   /// The pools were requested after [`SqliteDatabase::close`](crate::SqliteDatabase::close).
   #[error("Database has been closed")]
   DatabaseClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
