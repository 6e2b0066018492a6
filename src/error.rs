/// Result type alias for accessor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for accessor operations.
///
/// Only [`Error::ResourceNotFound`] is produced by the accessor itself; every
/// other failure from the database is passed through unchanged. Transaction
/// lifecycle misuse is not an error value at all: it panics.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// A single-row fetch matched zero rows.
   #[error("resource not found")]
   ResourceNotFound,

   /// Error from SQLx operations.
   #[error(transparent)]
   Sqlx(#[from] sqlx::Error),

   /// Error from the connection manager.
   #[error(transparent)]
   ConnectionManager(#[from] sqlx_sqlite_conn_mgr::Error),

   /// A record reported a different number of values than columns.
   #[error("record for table {table} has {columns} columns but {values} values")]
   ColumnMismatch {
      table: &'static str,
      columns: usize,
      values: usize,
   },

   /// The deletion timestamp could not be formatted.
   #[error("failed to format deletion timestamp: {0}")]
   Timestamp(#[from] time::error::Format),
}

impl Error {
   /// Whether this is the not-found sentinel.
   pub fn is_not_found(&self) -> bool {
      matches!(self, Error::ResourceNotFound)
   }

   /// Extract a structured error code from the error type.
   ///
   /// This provides machine-readable error codes for error handling.
   pub fn error_code(&self) -> String {
      match self {
         Error::ResourceNotFound => "RESOURCE_NOT_FOUND".to_string(),
         Error::Sqlx(e) => {
            if let Some(code) = e.as_database_error().and_then(|db_err| db_err.code()) {
               return format!("SQLITE_{}", code);
            }
            "SQLX_ERROR".to_string()
         }
         Error::ConnectionManager(_) => "CONNECTION_ERROR".to_string(),
         Error::ColumnMismatch { .. } => "COLUMN_MISMATCH".to_string(),
         Error::Timestamp(_) => "TIMESTAMP_ERROR".to_string(),
      }
   }
}
