//! Configuration for SQLite database connection pools

use std::time::Duration;

use serde::Deserialize;

/// Configuration for SqliteDatabase connection pools
///
/// # Examples
///
/// ```
/// use sqlx_sqlite_conn_mgr::SqliteDatabaseConfig;
/// use std::time::Duration;
///
/// // Use defaults
/// let config = SqliteDatabaseConfig::default();
///
/// // Override just one field
/// let config = SqliteDatabaseConfig {
///     max_read_connections: 3,
///     ..Default::default()
/// };
/// assert_eq!(config.idle_timeout, Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SqliteDatabaseConfig {
   /// Maximum number of concurrent replica (read-only) connections
   ///
   /// Default: 6
   pub max_read_connections: u32,

   /// Idle timeout for replica connections and for primary connections
   /// beyond the one that is kept open
   ///
   /// Default: 30 seconds
   pub idle_timeout: Duration,
}

impl Default for SqliteDatabaseConfig {
   fn default() -> Self {
      Self {
         max_read_connections: 6,
         idle_timeout: Duration::from_secs(30),
      }
   }
}
