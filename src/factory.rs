//! Accessor factory choosing between primary and replica

use std::sync::Arc;

use sqlx::SqlitePool;
use sqlx_sqlite_conn_mgr::SqliteDatabase;
use tracing::Span;

use crate::Result;
use crate::accessor::{Accessor, Reader, Writer};
use crate::txn::TxnState;

/// The two process-wide connection handles.
///
/// Both may be the same pool when there is no separate replica.
#[derive(Debug, Clone)]
pub struct DatabasePools {
   /// Write-capable pool backing writers.
   pub primary: SqlitePool,
   /// Read-only pool backing readers.
   pub replica: SqlitePool,
}

impl DatabasePools {
   /// Take the primary and replica pools of an open database.
   pub fn from_database(db: &SqliteDatabase) -> Result<Self> {
      Ok(Self {
         primary: db.write_pool()?.clone(),
         replica: db.read_pool()?.clone(),
      })
   }
}

/// Handle holder passed to the injection hook before an accessor is built.
///
/// The hook may swap the pool (e.g. for one with per-request connect
/// options) or attach a request-scoped span that every operation of the
/// accessor runs in.
#[derive(Debug, Clone)]
pub struct Injector {
   pub pool: SqlitePool,
   pub span: Span,
}

/// Per-request customization of the handle holder.
pub type InjectorFn<C> = Arc<dyn Fn(&C, &mut Injector) + Send + Sync>;

/// Chooses which accessor a caller gets.
pub trait DbSelector<C> {
   /// Read-only accessor bound to the replica.
   fn reader(&self, ctx: &C) -> Reader;

   /// Read-write accessor bound to the primary, ready to begin a transaction.
   fn writer(&self, ctx: &C) -> Writer;
}

/// Builds readers and writers for a request context `C`.
///
/// Construction does no I/O and cannot fail; failures surface through the
/// accessors' operations.
///
/// ```no_run
/// use sqlx_sqlite_accessor::{DatabasePools, Factory};
/// use sqlx_sqlite_conn_mgr::SqliteDatabase;
///
/// struct RequestContext {
///    request_id: String,
/// }
///
/// # async fn example() -> sqlx_sqlite_accessor::Result<()> {
/// let db = SqliteDatabase::connect("app.db", None).await?;
/// let factory = Factory::new(DatabasePools::from_database(&db)?).with_injector(
///    |ctx: &RequestContext, injector| {
///       injector.span = tracing::debug_span!("request", id = %ctx.request_id);
///    },
/// );
///
/// let ctx = RequestContext { request_id: "abc".into() };
/// let mut writer = factory.writer(&ctx);
/// writer.begin().await?;
/// // ...
/// writer.commit().await?;
/// # Ok(())
/// # }
/// ```
pub struct Factory<C = ()> {
   primary: SqlitePool,
   replica: SqlitePool,
   injector: Option<InjectorFn<C>>,
}

impl<C> Factory<C> {
   /// Factory with a no-op injection hook.
   pub fn new(pools: DatabasePools) -> Self {
      Self {
         primary: pools.primary,
         replica: pools.replica,
         injector: None,
      }
   }

   /// Replace the injection hook.
   pub fn with_injector<F>(mut self, injector: F) -> Self
   where
      F: Fn(&C, &mut Injector) + Send + Sync + 'static,
   {
      self.injector = Some(Arc::new(injector));
      self
   }

   /// Read-only accessor on the replica, in [`TxnState::After`].
   pub fn reader(&self, ctx: &C) -> Reader {
      self.build(ctx, self.replica.clone(), TxnState::After)
   }

   /// Read-write accessor on the primary, in [`TxnState::Before`].
   pub fn writer(&self, ctx: &C) -> Writer {
      self.build(ctx, self.primary.clone(), TxnState::Before)
   }

   fn build<M: crate::accessor::AccessMode>(
      &self,
      ctx: &C,
      pool: SqlitePool,
      state: TxnState,
   ) -> Accessor<M> {
      let mut injector = Injector {
         pool,
         span: Span::none(),
      };
      if let Some(inject) = &self.injector {
         inject(ctx, &mut injector);
      }
      Accessor::new(injector.pool, state, injector.span)
   }
}

impl<C> Clone for Factory<C> {
   fn clone(&self) -> Self {
      Self {
         primary: self.primary.clone(),
         replica: self.replica.clone(),
         injector: self.injector.clone(),
      }
   }
}

impl<C> DbSelector<C> for Factory<C> {
   fn reader(&self, ctx: &C) -> Reader {
      Factory::reader(self, ctx)
   }

   fn writer(&self, ctx: &C) -> Writer {
      Factory::writer(self, ctx)
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use std::sync::Mutex;

   async fn memory_pool() -> SqlitePool {
      sqlx::sqlite::SqlitePoolOptions::new()
         .max_connections(1)
         .connect("sqlite::memory:")
         .await
         .expect("Failed to open in-memory database")
   }

   #[tokio::test]
   async fn test_initial_states() {
      let pool = memory_pool().await;
      let factory: Factory = Factory::new(DatabasePools {
         primary: pool.clone(),
         replica: pool,
      });

      assert_eq!(factory.reader(&()).txn_state(), TxnState::After);
      assert_eq!(factory.writer(&()).txn_state(), TxnState::Before);
   }

   #[tokio::test]
   async fn test_injector_runs_for_every_accessor() {
      let pool = memory_pool().await;
      let seen = Arc::new(Mutex::new(Vec::new()));

      let recorder = Arc::clone(&seen);
      let factory = Factory::new(DatabasePools {
         primary: pool.clone(),
         replica: pool,
      })
      .with_injector(move |ctx: &String, _injector: &mut Injector| {
         recorder.lock().unwrap().push(ctx.clone());
      });

      let _reader = factory.reader(&"req-1".to_string());
      let _writer = factory.writer(&"req-2".to_string());

      assert_eq!(*seen.lock().unwrap(), vec!["req-1", "req-2"]);
   }
}
