//! Read and write accessors

use std::marker::PhantomData;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{Instrument, Span, debug};
use uuid::Uuid;

use crate::options::{QueryOption, apply_all};
use crate::query::{PendingQuery, Statement};
use crate::record::{Record, Table, is_blank_key};
use crate::session::Session;
use crate::txn::{RollbackAction, TxnState};
use crate::{Error, Result};

mod sealed {
   pub trait Sealed {}
}

/// Access mode of an [`Accessor`].
pub trait AccessMode: sealed::Sealed + Send + 'static {
   #[doc(hidden)]
   const NAME: &'static str;
}

/// Queries only, bound to the replica.
#[derive(Debug)]
pub enum ReadOnly {}

/// Queries, commands and transactions, bound to the primary.
#[derive(Debug)]
pub enum ReadWrite {}

impl sealed::Sealed for ReadOnly {}
impl sealed::Sealed for ReadWrite {}

impl AccessMode for ReadOnly {
   const NAME: &'static str = "reader";
}

impl AccessMode for ReadWrite {
   const NAME: &'static str = "writer";
}

/// Read-only accessor handed out by [`Factory::reader`](crate::Factory::reader).
pub type Reader = Accessor<ReadOnly>;

/// Read-write accessor handed out by [`Factory::writer`](crate::Factory::writer).
pub type Writer = Accessor<ReadWrite>;

/// A connection handle and a transaction state, bound together for one unit
/// of work.
///
/// Every operation applies its options in order, then runs on whatever
/// handle is currently bound: the pool, or the open transaction after
/// [`Writer::begin`]. Operations never look at or change the transaction
/// state themselves.
///
/// Accessors take `&mut self` throughout and are meant to be used from one
/// task at a time.
pub struct Accessor<M: AccessMode> {
   session: Session,
   state: TxnState,
   span: Span,
   transaction_id: Option<Uuid>,
   _mode: PhantomData<M>,
}

impl<M: AccessMode> Accessor<M> {
   pub(crate) fn new(pool: sqlx::SqlitePool, state: TxnState, span: Span) -> Self {
      Self {
         session: Session::Pool(pool),
         state,
         span,
         transaction_id: None,
         _mode: PhantomData,
      }
   }

   /// Current transaction state.
   pub fn txn_state(&self) -> TxnState {
      self.state
   }

   /// Count rows of `R`'s table matching the options.
   ///
   /// A non-blank primary key on `record` restricts the count to that row.
   pub async fn count<R: Record>(&mut self, record: &R, options: &[QueryOption]) -> Result<i64> {
      let table = Table::of::<R>();
      let key = record_key(record);
      let stmt = pending(options).count(&table, key.as_ref());

      let span = self.span.clone();
      let count = self.session.fetch_scalar(stmt).instrument(span).await?;
      Ok(count.unwrap_or_default())
   }

   /// Load the first matching row into `record`.
   ///
   /// Returns [`Error::ResourceNotFound`] when nothing matches, in which case
   /// `record` is left as it was. A non-blank primary key on `record` is
   /// used as a filter.
   pub async fn find<R: Record>(&mut self, record: &mut R, options: &[QueryOption]) -> Result<()> {
      let table = Table::of::<R>();
      let key = record_key(record);
      let query = pending(options);
      log_lock_hint(&query, &table);
      let stmt = query.select_first(&table, key.as_ref());

      let span = self.span.clone();
      match self.session.fetch_optional::<R>(stmt).instrument(span).await {
         Ok(Some(row)) => {
            *record = row;
            Ok(())
         }
         Ok(None) | Err(Error::Sqlx(sqlx::Error::RowNotFound)) => Err(Error::ResourceNotFound),
         Err(e) => Err(e),
      }
   }

   /// Replace the contents of `records` with every matching row. No match
   /// leaves `records` empty and is not an error.
   pub async fn find_many<R: Record>(
      &mut self,
      records: &mut Vec<R>,
      options: &[QueryOption],
   ) -> Result<()> {
      let table = Table::of::<R>();
      let query = pending(options);
      log_lock_hint(&query, &table);
      let stmt = query.select_all(&table);

      let span = self.span.clone();
      *records = self.session.fetch_all::<R>(stmt).instrument(span).await?;
      Ok(())
   }
}

impl Accessor<ReadWrite> {
   /// Start a transaction on the primary.
   ///
   /// # Panics
   ///
   /// Panics unless the state is [`TxnState::Before`]: beginning twice, or
   /// after the unit of work concluded, is a bug in the caller.
   pub async fn begin(&mut self) -> Result<()> {
      if let Err(misuse) = self.state.check_begin() {
         panic!("{}", misuse);
      }

      let span = self.span.clone();
      self.session.begin().instrument(span).await?;

      let transaction_id = Uuid::new_v4();
      debug!(parent: &self.span, "Transaction begun, tx_id: {}", transaction_id);
      self.transaction_id = Some(transaction_id);
      self.state = TxnState::Active;
      Ok(())
   }

   /// Commit the open transaction.
   ///
   /// The state moves to [`TxnState::After`] even if the database rejects the
   /// commit; the transaction is then rolled back.
   ///
   /// # Panics
   ///
   /// Panics unless the state is [`TxnState::Active`].
   pub async fn commit(&mut self) -> Result<()> {
      if let Err(misuse) = self.state.check_commit() {
         panic!("{}", misuse);
      }

      self.state = TxnState::After;
      let span = self.span.clone();
      self.session.finish(true).instrument(span).await?;
      debug!(parent: &self.span, "Transaction committed, tx_id: {}", self.tx_label());
      Ok(())
   }

   /// Roll back the open transaction. A no-op once the transaction has been
   /// committed or rolled back, so it is safe in cleanup paths.
   ///
   /// # Panics
   ///
   /// Panics in [`TxnState::Before`], where there is nothing to roll back.
   pub async fn rollback(&mut self) -> Result<()> {
      match self.state.check_rollback() {
         Ok(RollbackAction::Perform) => {}
         Ok(RollbackAction::Skip) => return Ok(()),
         Err(misuse) => panic!("{}", misuse),
      }

      self.state = TxnState::After;
      let span = self.span.clone();
      self.session.finish(false).instrument(span).await?;
      debug!(parent: &self.span, "Transaction rolled back, tx_id: {}", self.tx_label());
      Ok(())
   }

   /// Update `record` by primary key, inserting it when no row is updated
   /// and none exists.
   ///
   /// A record with a blank key is inserted directly and receives the new
   /// rowid through [`Record::set_primary_key`]. Filters in `options` narrow
   /// the update. When they exclude a row that does exist, nothing is
   /// written and `record` is overwritten with the stored row. Without
   /// [`ignore_soft_delete`](crate::ignore_soft_delete) soft-deleted rows are
   /// invisible to both the update and that lookup.
   pub async fn save<R: Record>(&mut self, record: &mut R, options: &[QueryOption]) -> Result<()> {
      let table = Table::of::<R>();
      let columns = R::columns();
      let values = record.values();
      if columns.len() != values.len() {
         return Err(Error::ColumnMismatch {
            table: table.name,
            columns: columns.len(),
            values: values.len(),
         });
      }

      let span = self.span.clone();
      let key = record.primary_key_value();

      if is_blank_key(&key) {
         let (columns, values): (Vec<&str>, Vec<_>) = columns
            .iter()
            .copied()
            .zip(values)
            .filter(|(column, _)| *column != table.primary_key)
            .unzip();
         let stmt = PendingQuery::insert(&table, &columns, values);
         let result = self.session.execute(stmt).instrument(span).await?;
         record.set_primary_key(result.last_insert_rowid());
         return Ok(());
      }

      let query = pending(options);
      let assignments: Vec<(&str, _)> = columns
         .iter()
         .copied()
         .zip(values.iter().cloned())
         .filter(|(column, _)| *column != table.primary_key)
         .collect();

      if let Some(stmt) = query.update(&table, assignments, &key) {
         let result = self.session.execute(stmt).instrument(span.clone()).await?;
         if result.rows_affected() > 0 {
            return Ok(());
         }
      }

      // The row may exist but be excluded by the caller's filters; the
      // record then takes on what is stored
      let stmt = query.select_stored(&table, &key);
      let stored = self
         .session
         .fetch_optional::<R>(stmt)
         .instrument(span.clone())
         .await?;
      if let Some(stored) = stored {
         *record = stored;
         return Ok(());
      }

      let stmt = PendingQuery::insert(&table, columns, values);
      self.session.execute(stmt).instrument(span).await?;
      Ok(())
   }

   /// Delete matching rows, returning how many were affected.
   ///
   /// Soft-deletable tables get their deletion timestamp set unless
   /// [`ignore_soft_delete`](crate::ignore_soft_delete) is supplied, in which
   /// case rows are removed. A non-blank primary key on `record` restricts
   /// the delete to that row; with no key and no filters every visible row
   /// is affected.
   pub async fn delete<R: Record>(&mut self, record: &R, options: &[QueryOption]) -> Result<u64> {
      let table = Table::of::<R>();
      let key = record_key(record);
      let query = pending(options);

      let stmt: Statement = match query.soft_delete_column(&table) {
         Some(column) => {
            let deleted_at = OffsetDateTime::now_utc().format(&Rfc3339)?;
            query.soft_delete(&table, column, key.as_ref(), deleted_at)
         }
         None => query.hard_delete(&table, key.as_ref()),
      };

      let span = self.span.clone();
      let result = self.session.execute(stmt).instrument(span).await?;
      Ok(result.rows_affected())
   }

   fn tx_label(&self) -> String {
      self
         .transaction_id
         .map(|id| id.to_string())
         .unwrap_or_default()
   }
}

impl<M: AccessMode> Drop for Accessor<M> {
   fn drop(&mut self) {
      if self.session.in_transaction() {
         // Dropping the sqlx transaction queues a ROLLBACK on its connection
         debug!(
            parent: &self.span,
            "Dropping {} with open transaction, tx_id: {} (will auto-rollback)",
            M::NAME,
            self.transaction_id.map(|id| id.to_string()).unwrap_or_default()
         );
      }
   }
}

fn pending(options: &[QueryOption]) -> PendingQuery {
   apply_all(options, PendingQuery::default())
}

fn record_key<R: Record>(record: &R) -> Option<serde_json::Value> {
   Some(record.primary_key_value()).filter(|key| !is_blank_key(key))
}

fn log_lock_hint(query: &PendingQuery, table: &Table) {
   if query.is_for_update() {
      debug!(
         "Row lock requested on {}; SQLite locks the whole database for the writer instead",
         table.name
      );
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use serde_json::{Value as JsonValue, json};
   use sqlx::SqlitePool;

   #[derive(Debug, Default, PartialEq, sqlx::FromRow)]
   struct Item {
      id: i64,
      label: String,
   }

   impl Record for Item {
      fn table_name() -> &'static str {
         "items"
      }

      fn columns() -> &'static [&'static str] {
         &["id", "label"]
      }

      fn values(&self) -> Vec<JsonValue> {
         vec![json!(self.id), json!(self.label)]
      }

      fn set_primary_key(&mut self, id: i64) {
         self.id = id;
      }
   }

   /// Record whose values do not line up with its columns
   #[derive(Debug, Default, sqlx::FromRow)]
   struct Broken {
      id: i64,
   }

   impl Record for Broken {
      fn table_name() -> &'static str {
         "items"
      }

      fn columns() -> &'static [&'static str] {
         &["id", "label"]
      }

      fn values(&self) -> Vec<JsonValue> {
         vec![json!(self.id)]
      }
   }

   async fn create_writer() -> Writer {
      let pool: SqlitePool = sqlx::sqlite::SqlitePoolOptions::new()
         .max_connections(1)
         .connect("sqlite::memory:")
         .await
         .expect("Failed to open in-memory database");

      sqlx::query("CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT NOT NULL)")
         .execute(&pool)
         .await
         .unwrap();

      Accessor::new(pool, TxnState::Before, Span::none())
   }

   #[tokio::test]
   async fn test_save_rejects_misaligned_values() {
      let mut writer = create_writer().await;

      let err = writer.save(&mut Broken { id: 1 }, &[]).await.unwrap_err();

      assert!(matches!(
         err,
         Error::ColumnMismatch {
            table: "items",
            columns: 2,
            values: 1
         }
      ));
   }

   #[tokio::test]
   async fn test_save_and_find_by_record_key() {
      let mut writer = create_writer().await;

      let mut item = Item {
         id: 0,
         label: "first".into(),
      };
      writer.save(&mut item, &[]).await.unwrap();
      assert_eq!(item.id, 1);

      // The key on the output record acts as the filter
      let mut found = Item {
         id: 1,
         label: String::new(),
      };
      writer.find(&mut found, &[]).await.unwrap();
      assert_eq!(found.label, "first");

      let mut missing = Item {
         id: 2,
         label: "untouched".into(),
      };
      let err = writer.find(&mut missing, &[]).await.unwrap_err();
      assert!(err.is_not_found());
      assert_eq!(missing.label, "untouched");
   }

   #[tokio::test]
   async fn test_save_filtered_out_row_loads_stored_row() {
      let mut writer = create_writer().await;
      writer
         .save(
            &mut Item {
               id: 5,
               label: "a".into(),
            },
            &[],
         )
         .await
         .unwrap();

      // The filter excludes the row from the update; the existing row is
      // loaded back instead of being inserted again
      let options = [crate::filter("label = ?", vec![json!("zzz")])];
      let mut item = Item {
         id: 5,
         label: "b".into(),
      };
      writer.save(&mut item, &options).await.unwrap();
      assert_eq!(
         item,
         Item {
            id: 5,
            label: "a".into()
         }
      );

      let mut stored = Item {
         id: 5,
         label: String::new(),
      };
      writer.find(&mut stored, &[]).await.unwrap();
      assert_eq!(stored.label, "a");
      assert_eq!(writer.count(&Item::default(), &[]).await.unwrap(), 1);
   }

   #[tokio::test]
   async fn test_operations_do_not_touch_state() {
      let mut writer = create_writer().await;

      writer.count(&Item::default(), &[]).await.unwrap();
      writer.find_many::<Item>(&mut Vec::new(), &[]).await.unwrap();
      writer.delete(&Item::default(), &[]).await.unwrap();

      assert_eq!(writer.txn_state(), TxnState::Before);
   }
}
