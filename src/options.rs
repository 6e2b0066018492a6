//! Composable query options

use std::ops::Deref;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::query::PendingQuery;

/// A single modification applied to a pending query.
///
/// Options are plain values so that each one can be inspected and tested on
/// its own. They take effect in the order they are supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryOption {
   /// Filter predicate. Placeholders use SQLite `?` syntax and are bound from `args` in order.
   Filter {
      clause: String,
      #[serde(default)]
      args: Vec<JsonValue>,
   },
   /// Ordering expression, appended to existing ones unless `reorder` is set.
   Order {
      expr: String,
      #[serde(default)]
      reorder: bool,
   },
   /// Maximum number of rows.
   Limit { count: u64 },
   /// Number of rows to skip.
   Offset { count: u64 },
   /// Row-locking read hint.
   ForUpdate,
   /// Disable the soft-delete visibility filter: soft-deleted rows become
   /// visible and deletes become physical.
   IgnoreSoftDelete,
}

impl QueryOption {
   /// Apply this option to a pending query, returning the modified query.
   pub fn apply(&self, query: PendingQuery) -> PendingQuery {
      match self {
         QueryOption::Filter { clause, args } => query.filter(clause.clone(), args.clone()),
         QueryOption::Order { expr, reorder } => query.order(expr.clone(), *reorder),
         QueryOption::Limit { count } => query.limit(*count),
         QueryOption::Offset { count } => query.offset(*count),
         QueryOption::ForUpdate => query.for_update(),
         QueryOption::IgnoreSoftDelete => query.unscoped(),
      }
   }
}

/// Filter rows with a SQL predicate, e.g. `filter("id = ?", vec![json!(123)])`.
pub fn filter(clause: impl Into<String>, args: Vec<JsonValue>) -> QueryOption {
   QueryOption::Filter {
      clause: clause.into(),
      args,
   }
}

/// Append an ordering expression, e.g. `order("id DESC")`.
pub fn order(expr: impl Into<String>) -> QueryOption {
   QueryOption::Order {
      expr: expr.into(),
      reorder: false,
   }
}

/// Replace every ordering applied so far with `expr`.
pub fn reorder(expr: impl Into<String>) -> QueryOption {
   QueryOption::Order {
      expr: expr.into(),
      reorder: true,
   }
}

/// Return at most `count` rows. The last limit applied wins.
pub fn limit(count: u64) -> QueryOption {
   QueryOption::Limit { count }
}

/// Skip the first `count` matching rows.
pub fn offset(count: u64) -> QueryOption {
   QueryOption::Offset { count }
}

/// Request a row-locking read (`SELECT ... FOR UPDATE`).
///
/// SQLite has no row locks, so the hint is recorded but not rendered; reads
/// inside a writer's transaction already hold the database write lock once
/// the transaction has written.
pub fn for_update() -> QueryOption {
   QueryOption::ForUpdate
}

/// Make soft-deleted rows visible and turn deletes into physical deletes.
pub fn ignore_soft_delete() -> QueryOption {
   QueryOption::IgnoreSoftDelete
}

/// Ordered list of query options.
///
/// [`QueryOptions::add`] never modifies the receiver; it returns a new list
/// with the given options appended.
///
/// ```
/// use serde_json::json;
/// use sqlx_sqlite_accessor::{QueryOptions, filter, ignore_soft_delete, order};
///
/// let base = QueryOptions::new().add([filter("age > ?", vec![json!(20)])]);
/// let sorted = base.add([order("age DESC"), ignore_soft_delete()]);
///
/// assert_eq!(base.len(), 1);
/// assert_eq!(sorted.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryOptions(Vec<QueryOption>);

impl QueryOptions {
   pub fn new() -> Self {
      Self::default()
   }

   /// Return a new list equal to this one with `options` appended in order.
   pub fn add(&self, options: impl IntoIterator<Item = QueryOption>) -> Self {
      let mut list = self.0.clone();
      list.extend(options);
      Self(list)
   }

   /// Fold every option over `query`, first to last.
   pub fn apply(&self, query: PendingQuery) -> PendingQuery {
      apply_all(&self.0, query)
   }

   pub fn as_slice(&self) -> &[QueryOption] {
      &self.0
   }
}

impl Deref for QueryOptions {
   type Target = [QueryOption];

   fn deref(&self) -> &Self::Target {
      &self.0
   }
}

impl From<Vec<QueryOption>> for QueryOptions {
   fn from(options: Vec<QueryOption>) -> Self {
      Self(options)
   }
}

impl FromIterator<QueryOption> for QueryOptions {
   fn from_iter<I: IntoIterator<Item = QueryOption>>(iter: I) -> Self {
      Self(iter.into_iter().collect())
   }
}

impl<'a> IntoIterator for &'a QueryOptions {
   type Item = &'a QueryOption;
   type IntoIter = std::slice::Iter<'a, QueryOption>;

   fn into_iter(self) -> Self::IntoIter {
      self.0.iter()
   }
}

pub(crate) fn apply_all(options: &[QueryOption], query: PendingQuery) -> PendingQuery {
   options.iter().fold(query, |query, option| option.apply(query))
}
