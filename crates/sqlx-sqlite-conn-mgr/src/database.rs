//! SQLite database opened as a primary pool and a replica pool

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tracing::debug;

use crate::{Error, Result, SqliteDatabaseConfig};

/// SQLite database exposing a write-capable primary and a read-only replica.
///
/// ## Architecture
///
/// The database maintains two connection pools over the same file:
/// - **`write_conn`**: single-connection read-write pool (the primary). One
///   connection is kept open so the WAL index stays available to readers.
/// - **`read_pool`**: pool of read-only connections (the replica)
///
/// ## State Management
///
/// - **`closed`**: prevents handing out pools after the database has been closed
/// - **`path`**: database file path for cleanup operations
///
/// ## Usage Pattern
///
/// ```text
/// 1. Connect to database (opens both pools, enables WAL)
/// 2. Hand write_pool() to write-bound accessors, read_pool() to readers
/// 3. Close database when done
/// ```
#[derive(Debug)]
pub struct SqliteDatabase {
   /// Pool of read-only connections (defaults to max_connections=6) for concurrent reads
   read_pool: Pool<Sqlite>,

   /// Single read-write connection pool (max_connections=1) for serialized writes
   write_conn: Pool<Sqlite>,

   /// Marks database as closed to prevent further operations
   closed: AtomicBool,

   /// Path to database file (used for cleanup)
   path: PathBuf,
}

impl SqliteDatabase {
   /// Open (creating if missing) the database at `path`.
   ///
   /// The primary is connected first so that the file exists and is in WAL
   /// mode before any read-only connection is opened against it.
   pub async fn connect(
      path: impl AsRef<Path>,
      custom_config: Option<SqliteDatabaseConfig>,
   ) -> Result<Arc<Self>> {
      let path = path.as_ref().to_path_buf();
      let config = custom_config.unwrap_or_default();

      if path.as_os_str().is_empty() || path.to_str().is_some_and(|p| p.contains(":memory:")) {
         return Err(Error::InvalidPath(path));
      }
      if config.max_read_connections == 0 {
         return Err(Error::NoReadConnections);
      }

      if let Some(parent) = path.parent()
         && !parent.as_os_str().is_empty()
      {
         tokio::fs::create_dir_all(parent).await?;
      }

      let write_options = SqliteConnectOptions::new()
         .filename(&path)
         .create_if_missing(true)
         .journal_mode(SqliteJournalMode::Wal);

      let write_conn = SqlitePoolOptions::new()
         .max_connections(1)
         .min_connections(1)
         .idle_timeout(config.idle_timeout)
         .connect_with(write_options)
         .await?;

      let read_options = SqliteConnectOptions::new().filename(&path).read_only(true);

      let read_pool = SqlitePoolOptions::new()
         .max_connections(config.max_read_connections)
         .idle_timeout(config.idle_timeout)
         .connect_with(read_options)
         .await?;

      debug!(
         "Opened database {} (replica connections: {})",
         path.display(),
         config.max_read_connections
      );

      Ok(Arc::new(Self {
         read_pool,
         write_conn,
         closed: AtomicBool::new(false),
         path,
      }))
   }

   /// Read-only replica pool
   pub fn read_pool(&self) -> Result<&Pool<Sqlite>> {
      self.ensure_open()?;
      Ok(&self.read_pool)
   }

   /// Write-capable primary pool
   pub fn write_pool(&self) -> Result<&Pool<Sqlite>> {
      self.ensure_open()?;
      Ok(&self.write_conn)
   }

   /// Path of the database file
   pub fn path(&self) -> &Path {
      &self.path
   }

   /// Close both pools. Further calls to `read_pool`/`write_pool` fail with
   /// [`Error::DatabaseClosed`]. Closing twice is a no-op.
   pub async fn close(&self) -> Result<()> {
      if self.closed.swap(true, Ordering::SeqCst) {
         return Ok(());
      }

      self.read_pool.close().await;
      self.write_conn.close().await;
      debug!("Closed database {}", self.path.display());
      Ok(())
   }

   /// Close the database and delete its file along with the WAL and shared
   /// memory side files.
   pub async fn remove(&self) -> Result<()> {
      self.close().await?;

      let mut files = vec![self.path.clone()];
      for suffix in ["-wal", "-shm"] {
         let mut side = self.path.clone().into_os_string();
         side.push(suffix);
         files.push(PathBuf::from(side));
      }

      for file in files {
         match tokio::fs::remove_file(&file).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
         }
      }

      debug!("Removed database {}", self.path.display());
      Ok(())
   }

   fn ensure_open(&self) -> Result<()> {
      if self.closed.load(Ordering::SeqCst) {
         return Err(Error::DatabaseClosed);
      }
      Ok(())
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use tempfile::TempDir;

   async fn create_test_db() -> (Arc<SqliteDatabase>, TempDir) {
      let temp_dir = TempDir::new().expect("Failed to create temp directory");
      let db = SqliteDatabase::connect(temp_dir.path().join("test.db"), None)
         .await
         .expect("Failed to connect to test database");

      (db, temp_dir)
   }

   #[tokio::test]
   async fn test_connect_creates_file() {
      let (db, _temp) = create_test_db().await;

      assert!(db.path().exists());

      db.remove().await.unwrap();
   }

   #[tokio::test]
   async fn test_connect_rejects_unshareable_paths() {
      for path in ["", ":memory:"] {
         let err = SqliteDatabase::connect(path, None).await.unwrap_err();
         assert!(matches!(err, Error::InvalidPath(_)), "{path:?} gave {err}");
      }
   }

   #[tokio::test]
   async fn test_connect_rejects_empty_replica() {
      let temp_dir = TempDir::new().unwrap();
      let config = SqliteDatabaseConfig {
         max_read_connections: 0,
         ..Default::default()
      };

      let err = SqliteDatabase::connect(temp_dir.path().join("app.db"), Some(config))
         .await
         .unwrap_err();

      assert!(matches!(err, Error::NoReadConnections));
      assert!(!temp_dir.path().join("app.db").exists());
   }

   #[tokio::test]
   async fn test_connect_creates_missing_parent_dirs() {
      let temp_dir = TempDir::new().unwrap();
      let path = temp_dir.path().join("nested").join("dir").join("app.db");

      let db = SqliteDatabase::connect(&path, None).await.unwrap();
      assert!(path.exists());

      db.remove().await.unwrap();
   }

   #[tokio::test]
   async fn test_replica_sees_primary_writes() {
      let (db, _temp) = create_test_db().await;
      let primary = db.write_pool().unwrap();

      sqlx::query("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)")
         .execute(primary)
         .await
         .unwrap();
      sqlx::query("INSERT INTO t (name) VALUES ('Alice')")
         .execute(primary)
         .await
         .unwrap();

      let count: i64 = sqlx::query_scalar("SELECT count(*) FROM t")
         .fetch_one(db.read_pool().unwrap())
         .await
         .unwrap();

      assert_eq!(count, 1);

      db.remove().await.unwrap();
   }

   #[tokio::test]
   async fn test_replica_rejects_writes() {
      let (db, _temp) = create_test_db().await;

      let result = sqlx::query("CREATE TABLE t (id INTEGER PRIMARY KEY)")
         .execute(db.read_pool().unwrap())
         .await;

      assert!(result.is_err());

      db.remove().await.unwrap();
   }

   #[tokio::test]
   async fn test_closed_database_hands_out_no_pools() {
      let (db, _temp) = create_test_db().await;

      db.close().await.unwrap();
      // Second close is a no-op
      db.close().await.unwrap();

      assert!(matches!(db.read_pool(), Err(Error::DatabaseClosed)));
      assert!(matches!(db.write_pool(), Err(Error::DatabaseClosed)));
   }

   #[tokio::test]
   async fn test_remove_deletes_files() {
      let (db, _temp) = create_test_db().await;
      let path = db.path().to_path_buf();

      db.remove().await.unwrap();

      assert!(!path.exists());
   }
}
