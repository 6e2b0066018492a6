//! # sqlx-sqlite-accessor
//!
//! Uniform CRUD accessors over SQLx for SQLite, with a read/write split and a
//! strict transaction lifecycle.
//!
//! ## Core Types
//!
//! - **[`Factory`]**: hands out a [`Reader`] bound to the replica or a
//!   [`Writer`] bound to the primary, per request context
//! - **[`Accessor`]**: `count`, `find`, `find_many`, plus `save`, `delete`,
//!   `begin`, `commit` and `rollback` on writers
//! - **[`QueryOption`]** / **[`QueryOptions`]**: composable filters, ordering,
//!   pagination, lock hints and soft-delete visibility
//! - **[`Record`]**: what a persisted entity type provides
//! - **[`Error`]**: with [`Error::ResourceNotFound`] as the one not-found value
//!
//! ## Transaction lifecycle
//!
//! ```text
//! Before --begin--> Active --commit/rollback--> After
//! ```
//!
//! Writers start in `Before`, readers in `After`. Calling `begin` or
//! `commit` out of order, or `rollback` before `begin`, panics. `rollback`
//! after the transaction concluded does nothing.
//!
//! ## Example
//!
//! ```no_run
//! use serde_json::json;
//! use sqlx_sqlite_accessor::{DatabasePools, Factory, Record, filter};
//! use sqlx_sqlite_conn_mgr::SqliteDatabase;
//!
//! #[derive(Debug, Default, sqlx::FromRow)]
//! struct User {
//!    id: i64,
//!    name: String,
//! }
//!
//! impl Record for User {
//!    fn table_name() -> &'static str {
//!       "users"
//!    }
//!
//!    fn columns() -> &'static [&'static str] {
//!       &["id", "name"]
//!    }
//!
//!    fn values(&self) -> Vec<serde_json::Value> {
//!       vec![json!(self.id), json!(self.name)]
//!    }
//! }
//!
//! # async fn example() -> sqlx_sqlite_accessor::Result<()> {
//! let db = SqliteDatabase::connect("app.db", None).await?;
//! let factory: Factory = Factory::new(DatabasePools::from_database(&db)?);
//!
//! let mut writer = factory.writer(&());
//! writer.begin().await?;
//! let result = writer
//!    .save(&mut User { id: 123, name: "hoge".into() }, &[])
//!    .await;
//! match result {
//!    Ok(()) => writer.commit().await?,
//!    Err(_) => writer.rollback().await?,
//! }
//!
//! let mut user = User::default();
//! let mut reader = factory.reader(&());
//! reader.find(&mut user, &[filter("id = ?", vec![json!(123)])]).await?;
//! # Ok(())
//! # }
//! ```

mod accessor;
mod error;
mod factory;
mod options;
mod query;
mod record;
mod session;
mod txn;

pub use accessor::{AccessMode, Accessor, ReadOnly, ReadWrite, Reader, Writer};
pub use error::{Error, Result};
pub use factory::{DatabasePools, DbSelector, Factory, Injector, InjectorFn};
pub use options::{
   QueryOption, QueryOptions, filter, for_update, ignore_soft_delete, limit, offset, order,
   reorder,
};
pub use query::{Condition, PendingQuery};
pub use record::Record;
pub use txn::{TxnMisuse, TxnOp, TxnState};
