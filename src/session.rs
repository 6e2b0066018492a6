//! Connection handle bound to an accessor

use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteArguments, SqliteQueryResult};
use sqlx::{Arguments, Sqlite, SqlitePool, Transaction};
use tracing::debug;

use crate::Result;
use crate::query::Statement;
use crate::record::Record;

/// The handle statements run on. Replaced, not mutated, on every
/// transaction transition.
pub(crate) enum Session {
   /// Autocommit statements on a pooled connection.
   Pool(SqlitePool),
   /// Statements inside an open transaction. The pool is kept so the
   /// session can fall back to it once the transaction concludes.
   Transaction {
      pool: SqlitePool,
      tx: Transaction<'static, Sqlite>,
   },
}

impl Session {
   pub(crate) fn pool(&self) -> &SqlitePool {
      match self {
         Session::Pool(pool) => pool,
         Session::Transaction { pool, .. } => pool,
      }
   }

   pub(crate) fn in_transaction(&self) -> bool {
      matches!(self, Session::Transaction { .. })
   }

   /// Open a transaction on the pool and switch to it.
   pub(crate) async fn begin(&mut self) -> Result<()> {
      let pool = self.pool().clone();
      let tx = pool.begin().await?;
      *self = Session::Transaction { pool, tx };
      Ok(())
   }

   /// Conclude the open transaction, if any, and fall back to the pool.
   ///
   /// The session is back on the pool even when the database reports a
   /// failure: the transaction handle is consumed either way, and a failed
   /// commit leaves it to be rolled back on drop.
   pub(crate) async fn finish(&mut self, commit: bool) -> Result<()> {
      let pool = self.pool().clone();
      match std::mem::replace(self, Session::Pool(pool)) {
         Session::Transaction { tx, .. } if commit => tx.commit().await?,
         Session::Transaction { tx, .. } => tx.rollback().await?,
         Session::Pool(_) => {}
      }
      Ok(())
   }

   pub(crate) async fn fetch_optional<R: Record>(&mut self, stmt: Statement) -> Result<Option<R>> {
      debug!("Fetching one: {}", stmt.sql);
      let query = sqlx::query_as_with::<Sqlite, R, _>(&stmt.sql, arguments(stmt.values)?);
      let row = match self {
         Session::Pool(pool) => query.fetch_optional(&*pool).await?,
         Session::Transaction { tx, .. } => query.fetch_optional(&mut **tx).await?,
      };
      Ok(row)
   }

   pub(crate) async fn fetch_all<R: Record>(&mut self, stmt: Statement) -> Result<Vec<R>> {
      debug!("Fetching all: {}", stmt.sql);
      let query = sqlx::query_as_with::<Sqlite, R, _>(&stmt.sql, arguments(stmt.values)?);
      let rows = match self {
         Session::Pool(pool) => query.fetch_all(&*pool).await?,
         Session::Transaction { tx, .. } => query.fetch_all(&mut **tx).await?,
      };
      Ok(rows)
   }

   /// Run a statement returning a single integer column, e.g. `count(*)`.
   /// `None` when no row comes back.
   pub(crate) async fn fetch_scalar(&mut self, stmt: Statement) -> Result<Option<i64>> {
      debug!("Fetching scalar: {}", stmt.sql);
      let query = sqlx::query_scalar_with::<Sqlite, i64, _>(&stmt.sql, arguments(stmt.values)?);
      let value = match self {
         Session::Pool(pool) => query.fetch_optional(&*pool).await?,
         Session::Transaction { tx, .. } => query.fetch_optional(&mut **tx).await?,
      };
      Ok(value)
   }

   pub(crate) async fn execute(&mut self, stmt: Statement) -> Result<SqliteQueryResult> {
      debug!("Executing: {}", stmt.sql);
      let query = sqlx::query_with(&stmt.sql, arguments(stmt.values)?);
      let result = match self {
         Session::Pool(pool) => query.execute(&*pool).await?,
         Session::Transaction { tx, .. } => query.execute(&mut **tx).await?,
      };
      Ok(result)
   }
}

/// Convert JSON bind values into SQLite arguments.
pub(crate) fn arguments<'q>(values: Vec<JsonValue>) -> Result<SqliteArguments<'q>> {
   let mut args = SqliteArguments::default();
   for value in values {
      bind_value(&mut args, value).map_err(sqlx::Error::Encode)?;
   }
   Ok(args)
}

fn bind_value(
   args: &mut SqliteArguments<'_>,
   value: JsonValue,
) -> std::result::Result<(), sqlx::error::BoxDynError> {
   match value {
      JsonValue::Null => args.add(None::<JsonValue>),
      JsonValue::String(s) => args.add(s),
      JsonValue::Bool(b) => args.add(b),
      JsonValue::Number(number) => {
         // Preserve integer precision by binding as i64 when possible
         if let Some(int_val) = number.as_i64() {
            args.add(int_val)
         } else if let Some(uint_val) = number.as_u64() {
            // Value too large for i64 (SQLite's INTEGER type), use f64 (will lose precision)
            args.add(uint_val as f64)
         } else {
            args.add(number.as_f64().unwrap_or_default())
         }
      }
      // Arrays and objects are stored as JSON text
      value => args.add(value),
   }
}
