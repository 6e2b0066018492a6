//! Pending query state and SQLite statement rendering

use serde_json::Value as JsonValue;

use crate::record::Table;

/// Filter predicate with its bind values.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
   pub clause: String,
   pub args: Vec<JsonValue>,
}

/// The query an operation will run, as shaped by its options.
///
/// Table, primary key and soft-delete column come from the record type at
/// render time, so a pending query can be built and inspected without one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingQuery {
   conditions: Vec<Condition>,
   orders: Vec<String>,
   limit: Option<u64>,
   offset: Option<u64>,
   for_update: bool,
   unscoped: bool,
}

/// Rendered SQL plus positional bind values.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Statement {
   pub(crate) sql: String,
   pub(crate) values: Vec<JsonValue>,
}

impl PendingQuery {
   pub fn filter(mut self, clause: String, args: Vec<JsonValue>) -> Self {
      self.conditions.push(Condition { clause, args });
      self
   }

   pub fn order(mut self, expr: String, reorder: bool) -> Self {
      if reorder {
         self.orders.clear();
      }
      self.orders.push(expr);
      self
   }

   pub fn limit(mut self, count: u64) -> Self {
      self.limit = Some(count);
      self
   }

   pub fn offset(mut self, count: u64) -> Self {
      self.offset = Some(count);
      self
   }

   pub fn for_update(mut self) -> Self {
      self.for_update = true;
      self
   }

   pub fn unscoped(mut self) -> Self {
      self.unscoped = true;
      self
   }

   pub fn conditions(&self) -> &[Condition] {
      &self.conditions
   }

   /// Bind values of every condition, in application order.
   pub fn bind_values(&self) -> Vec<JsonValue> {
      self
         .conditions
         .iter()
         .flat_map(|c| c.args.iter().cloned())
         .collect()
   }

   pub fn orders(&self) -> &[String] {
      &self.orders
   }

   pub fn limit_count(&self) -> Option<u64> {
      self.limit
   }

   pub fn offset_count(&self) -> Option<u64> {
      self.offset
   }

   pub fn is_for_update(&self) -> bool {
      self.for_update
   }

   pub fn ignores_soft_delete(&self) -> bool {
      self.unscoped
   }

   /// Soft-delete column to filter on, if the table has one and it has not
   /// been switched off.
   pub(crate) fn soft_delete_column(&self, table: &Table) -> Option<&'static str> {
      if self.unscoped { None } else { table.soft_delete }
   }

   /// `SELECT *` for at most one row, ordered by primary key after any
   /// caller-supplied ordering.
   pub(crate) fn select_first(&self, table: &Table, key: Option<&JsonValue>) -> Statement {
      let mut values = Vec::new();
      let mut sql = format!("SELECT * FROM {}", quote_ident(table.name));
      sql.push_str(&self.where_sql(table, key, &mut values));

      let mut orders = self.orders.clone();
      orders.push(format!("{} ASC", qualify(table.name, table.primary_key)));
      sql.push_str(" ORDER BY ");
      sql.push_str(&orders.join(", "));
      sql.push_str(&page_sql(Some(1), self.offset));

      Statement { sql, values }
   }

   pub(crate) fn select_all(&self, table: &Table) -> Statement {
      let mut values = Vec::new();
      let mut sql = format!("SELECT * FROM {}", quote_ident(table.name));
      sql.push_str(&self.where_sql(table, None, &mut values));

      if !self.orders.is_empty() {
         sql.push_str(" ORDER BY ");
         sql.push_str(&self.orders.join(", "));
      }
      sql.push_str(&page_sql(self.limit, self.offset));

      Statement { sql, values }
   }

   /// Ordering and pagination do not apply to counts.
   pub(crate) fn count(&self, table: &Table, key: Option<&JsonValue>) -> Statement {
      let mut values = Vec::new();
      let mut sql = format!("SELECT count(*) FROM {}", quote_ident(table.name));
      sql.push_str(&self.where_sql(table, key, &mut values));

      Statement { sql, values }
   }

   /// Update the given columns of the row identified by `key`. Returns
   /// `None` when there is nothing to set.
   pub(crate) fn update(
      &self,
      table: &Table,
      assignments: Vec<(&str, JsonValue)>,
      key: &JsonValue,
   ) -> Option<Statement> {
      if assignments.is_empty() {
         return None;
      }

      let (columns, mut values): (Vec<&str>, Vec<JsonValue>) = assignments.into_iter().unzip();
      let sets: Vec<String> = columns
         .iter()
         .map(|column| format!("{} = ?", quote_ident(column)))
         .collect();

      let mut sql = format!("UPDATE {} SET {}", quote_ident(table.name), sets.join(", "));
      sql.push_str(&self.where_sql(table, Some(key), &mut values));

      Some(Statement { sql, values })
   }

   /// Load the stored row identified by `key`. Only soft-delete visibility
   /// carries over; caller conditions, ordering and offset do not.
   pub(crate) fn select_stored(&self, table: &Table, key: &JsonValue) -> Statement {
      let visibility = PendingQuery {
         unscoped: self.unscoped,
         ..PendingQuery::default()
      };
      visibility.select_first(table, Some(key))
   }

   pub(crate) fn insert(table: &Table, columns: &[&str], values: Vec<JsonValue>) -> Statement {
      let names: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
      let placeholders = vec!["?"; columns.len()];

      let sql = format!(
         "INSERT INTO {} ({}) VALUES ({})",
         quote_ident(table.name),
         names.join(", "),
         placeholders.join(", ")
      );

      Statement { sql, values }
   }

   /// Mark matching rows deleted by setting `column` to `deleted_at`.
   pub(crate) fn soft_delete(
      &self,
      table: &Table,
      column: &str,
      key: Option<&JsonValue>,
      deleted_at: String,
   ) -> Statement {
      let mut values = vec![JsonValue::String(deleted_at)];
      let mut sql = format!(
         "UPDATE {} SET {} = ?",
         quote_ident(table.name),
         quote_ident(column)
      );
      sql.push_str(&self.where_sql(table, key, &mut values));

      Statement { sql, values }
   }

   pub(crate) fn hard_delete(&self, table: &Table, key: Option<&JsonValue>) -> Statement {
      let mut values = Vec::new();
      let mut sql = format!("DELETE FROM {}", quote_ident(table.name));
      sql.push_str(&self.where_sql(table, key, &mut values));

      Statement { sql, values }
   }

   /// Render the WHERE clause: soft-delete visibility, then the primary key,
   /// then caller conditions in order. Bind values are appended to `values`.
   fn where_sql(
      &self,
      table: &Table,
      key: Option<&JsonValue>,
      values: &mut Vec<JsonValue>,
   ) -> String {
      let mut parts = Vec::new();

      if let Some(column) = self.soft_delete_column(table) {
         parts.push(format!("{} IS NULL", qualify(table.name, column)));
      }

      if let Some(key) = key {
         parts.push(format!("{} = ?", qualify(table.name, table.primary_key)));
         values.push(key.clone());
      }

      for condition in &self.conditions {
         parts.push(format!("({})", condition.clause));
         values.extend(condition.args.iter().cloned());
      }

      if parts.is_empty() {
         String::new()
      } else {
         format!(" WHERE {}", parts.join(" AND "))
      }
   }
}

/// SQLite only accepts OFFSET after a LIMIT; `LIMIT -1` means unbounded.
fn page_sql(limit: Option<u64>, offset: Option<u64>) -> String {
   match (limit, offset) {
      (Some(limit), Some(offset)) => format!(" LIMIT {} OFFSET {}", limit, offset),
      (Some(limit), None) => format!(" LIMIT {}", limit),
      (None, Some(offset)) => format!(" LIMIT -1 OFFSET {}", offset),
      (None, None) => String::new(),
   }
}

fn quote_ident(name: &str) -> String {
   format!("\"{}\"", name.replace('"', "\"\""))
}

fn qualify(table: &str, column: &str) -> String {
   format!("{}.{}", quote_ident(table), quote_ident(column))
}

#[cfg(test)]
mod tests {
   use super::*;
   use serde_json::json;

   const USERS: Table = Table {
      name: "users",
      primary_key: "id",
      soft_delete: Some("deleted_at"),
   };

   const TAGS: Table = Table {
      name: "tags",
      primary_key: "id",
      soft_delete: None,
   };

   fn by_id(id: i64) -> PendingQuery {
      PendingQuery::default().filter("id = ?".into(), vec![json!(id)])
   }

   #[test]
   fn test_select_first_defaults() {
      let stmt = by_id(123).select_first(&USERS, None);

      assert_eq!(
         stmt.sql,
         r#"SELECT * FROM "users" WHERE "users"."deleted_at" IS NULL AND (id = ?) ORDER BY "users"."id" ASC LIMIT 1"#
      );
      assert_eq!(stmt.values, vec![json!(123)]);
   }

   #[test]
   fn test_select_first_with_key_and_unscoped() {
      let stmt = by_id(123).unscoped().select_first(&USERS, Some(&json!(7)));

      assert_eq!(
         stmt.sql,
         r#"SELECT * FROM "users" WHERE "users"."id" = ? AND (id = ?) ORDER BY "users"."id" ASC LIMIT 1"#
      );
      assert_eq!(stmt.values, vec![json!(7), json!(123)]);
   }

   #[test]
   fn test_select_first_keeps_caller_order_first() {
      let stmt = PendingQuery::default()
         .order("name DESC".into(), false)
         .offset(2)
         .select_first(&TAGS, None);

      assert_eq!(
         stmt.sql,
         r#"SELECT * FROM "tags" ORDER BY name DESC, "tags"."id" ASC LIMIT 1 OFFSET 2"#
      );
   }

   #[test]
   fn test_select_all_with_pagination() {
      let stmt = PendingQuery::default()
         .filter("id in (?, ?)".into(), vec![json!(123), json!(456)])
         .order("id DESC".into(), false)
         .limit(10)
         .offset(3)
         .unscoped()
         .select_all(&USERS);

      assert_eq!(
         stmt.sql,
         r#"SELECT * FROM "users" WHERE (id in (?, ?)) ORDER BY id DESC LIMIT 10 OFFSET 3"#
      );
      assert_eq!(stmt.values, vec![json!(123), json!(456)]);
   }

   #[test]
   fn test_select_all_offset_without_limit() {
      let stmt = PendingQuery::default().offset(5).select_all(&TAGS);

      assert_eq!(stmt.sql, r#"SELECT * FROM "tags" LIMIT -1 OFFSET 5"#);
   }

   #[test]
   fn test_count_ignores_ordering_and_pagination() {
      let stmt = by_id(123).order("id".into(), false).limit(1).count(&USERS, None);

      assert_eq!(
         stmt.sql,
         r#"SELECT count(*) FROM "users" WHERE "users"."deleted_at" IS NULL AND (id = ?)"#
      );
   }

   #[test]
   fn test_for_update_is_not_rendered() {
      let plain = by_id(1).select_first(&TAGS, None);
      let locked = by_id(1).for_update().select_first(&TAGS, None);

      assert_eq!(plain, locked);
   }

   #[test]
   fn test_update_binds_sets_before_conditions() {
      let stmt = PendingQuery::default()
         .unscoped()
         .update(&USERS, vec![("name", json!("hoge"))], &json!(123))
         .unwrap();

      assert_eq!(
         stmt.sql,
         r#"UPDATE "users" SET "name" = ? WHERE "users"."id" = ?"#
      );
      assert_eq!(stmt.values, vec![json!("hoge"), json!(123)]);
   }

   #[test]
   fn test_update_with_nothing_to_set() {
      assert!(PendingQuery::default().update(&USERS, vec![], &json!(1)).is_none());
   }

   #[test]
   fn test_select_stored_and_insert() {
      let stored = by_id(9)
         .order("name DESC".into(), false)
         .offset(3)
         .select_stored(&USERS, &json!(123));
      assert_eq!(
         stored.sql,
         r#"SELECT * FROM "users" WHERE "users"."deleted_at" IS NULL AND "users"."id" = ? ORDER BY "users"."id" ASC LIMIT 1"#
      );
      assert_eq!(stored.values, vec![json!(123)]);

      let stored = PendingQuery::default().unscoped().select_stored(&USERS, &json!(123));
      assert_eq!(
         stored.sql,
         r#"SELECT * FROM "users" WHERE "users"."id" = ? ORDER BY "users"."id" ASC LIMIT 1"#
      );

      let insert = PendingQuery::insert(&USERS, &["id", "name"], vec![json!(123), json!("hoge")]);
      assert_eq!(
         insert.sql,
         r#"INSERT INTO "users" ("id", "name") VALUES (?, ?)"#
      );
      assert_eq!(insert.values, vec![json!(123), json!("hoge")]);
   }

   #[test]
   fn test_soft_delete() {
      let stmt = by_id(123).soft_delete(&USERS, "deleted_at", None, "2024-01-01T00:00:00Z".into());

      assert_eq!(
         stmt.sql,
         r#"UPDATE "users" SET "deleted_at" = ? WHERE "users"."deleted_at" IS NULL AND (id = ?)"#
      );
      assert_eq!(stmt.values, vec![json!("2024-01-01T00:00:00Z"), json!(123)]);
   }

   #[test]
   fn test_hard_delete() {
      let stmt = by_id(123).unscoped().hard_delete(&USERS, None);

      assert_eq!(stmt.sql, r#"DELETE FROM "users" WHERE (id = ?)"#);
      assert_eq!(stmt.values, vec![json!(123)]);
   }

   #[test]
   fn test_identifiers_are_escaped() {
      assert_eq!(quote_ident(r#"we"ird"#), r#""we""ird""#);
   }
}
