//! Contracts for persisted entity types

use serde_json::Value as JsonValue;
use sqlx::FromRow;
use sqlx::sqlite::SqliteRow;

/// A value representing one persisted row.
///
/// Decoding goes through [`sqlx::FromRow`], so most records derive it and
/// implement the three required methods by hand:
///
/// ```
/// use serde_json::{Value as JsonValue, json};
/// use sqlx_sqlite_accessor::Record;
///
/// #[derive(Debug, Default, sqlx::FromRow)]
/// struct User {
///    id: i64,
///    name: String,
/// }
///
/// impl Record for User {
///    fn table_name() -> &'static str {
///       "users"
///    }
///
///    fn columns() -> &'static [&'static str] {
///       &["id", "name"]
///    }
///
///    fn values(&self) -> Vec<JsonValue> {
///       vec![json!(self.id), json!(self.name)]
///    }
///
///    fn set_primary_key(&mut self, id: i64) {
///       self.id = id;
///    }
/// }
/// ```
pub trait Record: for<'r> FromRow<'r, SqliteRow> + Send + Unpin {
   /// Storage table name.
   fn table_name() -> &'static str;

   /// Persisted columns, including the primary key and excluding the
   /// soft-delete column, which is managed by the accessor.
   fn columns() -> &'static [&'static str];

   /// Bind values in [`Record::columns`] order.
   fn values(&self) -> Vec<JsonValue>;

   fn primary_key() -> &'static str {
      "id"
   }

   /// Current primary key value. A blank key (null, 0 or "") means the
   /// record has not been stored yet.
   fn primary_key_value(&self) -> JsonValue {
      let pk = Self::primary_key();
      Self::columns()
         .iter()
         .position(|column| *column == pk)
         .and_then(|index| self.values().into_iter().nth(index))
         .unwrap_or(JsonValue::Null)
   }

   /// Nullable timestamp column marking the row as deleted. `None` means
   /// deletes are always physical.
   fn soft_delete_column() -> Option<&'static str> {
      None
   }

   /// Receives the rowid assigned when a record with a blank key is inserted.
   fn set_primary_key(&mut self, _id: i64) {}
}

/// Static table metadata gathered from a [`Record`] type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Table {
   pub(crate) name: &'static str,
   pub(crate) primary_key: &'static str,
   pub(crate) soft_delete: Option<&'static str>,
}

impl Table {
   pub(crate) fn of<R: Record>() -> Self {
      Self {
         name: R::table_name(),
         primary_key: R::primary_key(),
         soft_delete: R::soft_delete_column(),
      }
   }
}

/// Whether a primary key value marks a record that has not been stored.
pub(crate) fn is_blank_key(value: &JsonValue) -> bool {
   match value {
      JsonValue::Null => true,
      JsonValue::Number(n) => n.as_i64() == Some(0) || n.as_f64() == Some(0.0),
      JsonValue::String(s) => s.is_empty(),
      _ => false,
   }
}
