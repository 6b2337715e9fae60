//! SQLite storage implementation
//!
//! Raw, parameterized primitives over the two result tables. Everything
//! here speaks rows and columns; value (de)serialization and row shaping
//! live in the access API on top.

use super::schema;
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, ToSql, params};
use std::path::Path;

/// SQLite-backed storage for results and their variables
pub struct SqliteStore {
    conn: Connection,
}

/// Column of the results table that carries related data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultField {
    TestTaker,
    Delivery,
}

impl ResultField {
    pub fn as_column(&self) -> &'static str {
        match self {
            ResultField::TestTaker => "test_taker",
            ResultField::Delivery => "delivery",
        }
    }
}

/// Scope of a variable, selecting which call-id column applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableScope {
    Item,
    Test,
}

impl VariableScope {
    pub fn call_id_column(&self) -> &'static str {
        match self {
            VariableScope::Item => "call_id_item",
            VariableScope::Test => "call_id_test",
        }
    }
}

/// Whitelisted sort columns for result listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderField {
    Delivery,
    TestTaker,
    ResultId,
}

impl OrderField {
    pub fn as_column(&self) -> &'static str {
        match self {
            OrderField::Delivery => "delivery",
            OrderField::TestTaker => "test_taker",
            OrderField::ResultId => "result_id",
        }
    }

    /// Parse a caller-supplied column name; unknown names yield `None`
    /// so the caller can drop them silently.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "delivery" => Some(OrderField::Delivery),
            "test_taker" => Some(OrderField::TestTaker),
            "result_id" => Some(OrderField::ResultId),
            _ => None,
        }
    }
}

/// Sort direction for result listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDir {
    #[default]
    Asc,
    Desc,
}

impl OrderDir {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OrderDir::Asc => "ASC",
            OrderDir::Desc => "DESC",
        }
    }

    /// Case-insensitive parse; unknown directions yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Some(OrderDir::Asc),
            "desc" => Some(OrderDir::Desc),
            _ => None,
        }
    }
}

/// A result row as persisted
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ResultRow {
    pub result_id: String,
    pub test_taker: Option<String>,
    pub delivery: Option<String>,
}

/// A variable row as persisted (surrogate id assigned by the engine)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableRow {
    pub variable_id: i64,
    pub result_id: String,
    pub test: String,
    pub item: Option<String>,
    pub call_id_item: Option<String>,
    pub call_id_test: Option<String>,
    pub identifier: String,
    pub value: String,
}

/// A variable row prepared for insertion
#[derive(Debug, Clone)]
pub struct NewVariableRow {
    pub result_id: String,
    pub test: String,
    pub item: Option<String>,
    pub call_id_item: Option<String>,
    pub call_id_test: Option<String>,
    pub identifier: String,
    pub value: String,
}

const VARIABLE_COLUMNS: &str =
    "variable_id, results_result_id, test, item, call_id_item, call_id_test, identifier, value";

impl SqliteStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        Ok(())
    }

    // ========== Variable Operations ==========

    /// Insert a batch of variable rows as a single statement.
    ///
    /// All rows of one store call commit as one unit; N rows never turn
    /// into N round trips.
    pub fn insert_variables(&self, rows: &[NewVariableRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let values = vec!["(?, ?, ?, ?, ?, ?, ?)"; rows.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} (results_result_id, test, item, call_id_item, call_id_test, identifier, value) VALUES {}",
            schema::VARIABLES_TABLE,
            values
        );

        let mut binds: Vec<&dyn ToSql> = Vec::with_capacity(rows.len() * 7);
        for row in rows {
            binds.push(&row.result_id);
            binds.push(&row.test);
            binds.push(&row.item);
            binds.push(&row.call_id_item);
            binds.push(&row.call_id_test);
            binds.push(&row.identifier);
            binds.push(&row.value);
        }

        self.conn.execute(&sql, binds.as_slice())?;
        Ok(())
    }

    /// Select variables whose item or test call id is in the given set,
    /// ordered by surrogate id
    pub fn variables_by_call_ids(&self, call_ids: &[&str]) -> Result<Vec<VariableRow>> {
        if call_ids.is_empty() {
            return Ok(Vec::new());
        }

        let marks = placeholders(call_ids.len());
        let sql = format!(
            "SELECT {} FROM {} WHERE call_id_item IN ({}) OR call_id_test IN ({}) ORDER BY variable_id",
            VARIABLE_COLUMNS,
            schema::VARIABLES_TABLE,
            marks,
            marks
        );

        let mut binds: Vec<&dyn ToSql> = Vec::with_capacity(call_ids.len() * 2);
        for id in call_ids {
            binds.push(id);
        }
        for id in call_ids {
            binds.push(id);
        }

        self.query_variable_rows(&sql, binds.as_slice())
    }

    /// Select variables belonging to the given results, ordered by surrogate id
    pub fn variables_by_result_ids(&self, result_ids: &[&str]) -> Result<Vec<VariableRow>> {
        if result_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {} FROM {} WHERE {} IN ({}) ORDER BY variable_id",
            VARIABLE_COLUMNS,
            schema::VARIABLES_TABLE,
            schema::VARIABLES_FK_COLUMN,
            placeholders(result_ids.len())
        );

        let binds: Vec<&dyn ToSql> = result_ids.iter().map(|id| id as &dyn ToSql).collect();
        self.query_variable_rows(&sql, binds.as_slice())
    }

    /// Select variables for one call id (either scope) and identifier
    pub fn variables_by_call_id_and_identifier(
        &self,
        call_id: &str,
        identifier: &str,
    ) -> Result<Vec<VariableRow>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE (call_id_item = ?1 OR call_id_test = ?1) AND identifier = ?2 ORDER BY variable_id",
            VARIABLE_COLUMNS,
            schema::VARIABLES_TABLE
        );

        self.query_variable_rows(&sql, params![call_id, identifier])
    }

    /// Fetch the serialized value of a single variable row
    pub fn variable_value(&self, variable_id: i64) -> Result<Option<String>> {
        let sql = format!(
            "SELECT value FROM {} WHERE variable_id = ?1",
            schema::VARIABLES_TABLE
        );
        self.conn
            .query_row(&sql, [variable_id], |row| row.get(0))
            .optional()
            .map_err(Into::into)
    }

    /// Distinct (call_id_item, call_id_test, result_id) tuples over the
    /// whole variables table. Full scan; reporting use only.
    pub fn distinct_call_id_tuples(
        &self,
    ) -> Result<Vec<(Option<String>, Option<String>, String)>> {
        let sql = format!(
            "SELECT DISTINCT call_id_item, call_id_test, {} FROM {}",
            schema::VARIABLES_FK_COLUMN,
            schema::VARIABLES_TABLE
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let tuples = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tuples)
    }

    /// Distinct, non-empty call ids of one scope for a given result
    pub fn distinct_call_ids(&self, result_id: &str, scope: VariableScope) -> Result<Vec<String>> {
        let column = scope.call_id_column();
        let sql = format!(
            "SELECT DISTINCT {column} FROM {} WHERE {} = ?1 AND {column} IS NOT NULL AND {column} <> ''",
            schema::VARIABLES_TABLE,
            schema::VARIABLES_FK_COLUMN
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let ids = stmt
            .query_map([result_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// Count all variable rows
    pub fn count_variables(&self) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", schema::VARIABLES_TABLE);
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Helper to convert a row to a VariableRow
    fn row_to_variable(row: &rusqlite::Row) -> rusqlite::Result<VariableRow> {
        Ok(VariableRow {
            variable_id: row.get(0)?,
            result_id: row.get(1)?,
            test: row.get(2)?,
            item: row.get(3)?,
            call_id_item: row.get(4)?,
            call_id_test: row.get(5)?,
            identifier: row.get(6)?,
            value: row.get(7)?,
        })
    }

    fn query_variable_rows<P: rusqlite::Params>(
        &self,
        sql: &str,
        binds: P,
    ) -> Result<Vec<VariableRow>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(binds, |row| Self::row_to_variable(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ========== Result Operations ==========

    /// Atomically set one related field, inserting the result row on
    /// first touch and updating the field thereafter.
    ///
    /// A constraint violation the upsert clause cannot absorb surfaces
    /// as [`Error::Conflict`].
    pub fn upsert_result_field(
        &self,
        result_id: &str,
        field: ResultField,
        value: &str,
    ) -> Result<()> {
        let column = field.as_column();
        let sql = format!(
            "INSERT INTO {} (result_id, {column}) VALUES (?1, ?2) \
             ON CONFLICT(result_id) DO UPDATE SET {column} = excluded.{column}",
            schema::RESULTS_TABLE
        );

        self.conn
            .execute(&sql, params![result_id, value])
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Error::Conflict(result_id.to_string())
                }
                other => Error::Storage(other),
            })?;
        Ok(())
    }

    /// Fetch one related field of a result row; absent row and unset
    /// field both come back as `None`.
    pub fn result_field(&self, result_id: &str, field: ResultField) -> Result<Option<String>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE result_id = ?1",
            field.as_column(),
            schema::RESULTS_TABLE
        );
        let value: Option<Option<String>> = self
            .conn
            .query_row(&sql, [result_id], |row| row.get(0))
            .optional()?;
        Ok(value.flatten())
    }

    /// Project (result_id, field) over all result rows. Full scan.
    pub fn result_ids_with(&self, field: ResultField) -> Result<Vec<(String, Option<String>)>> {
        let sql = format!(
            "SELECT result_id, {} FROM {}",
            field.as_column(),
            schema::RESULTS_TABLE
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let pairs = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(pairs)
    }

    /// Select result rows filtered by delivery, with whitelisted ordering
    /// and offset/limit pagination. An empty filter selects all rows.
    pub fn results_by_delivery(
        &self,
        deliveries: &[&str],
        order: Option<(OrderField, OrderDir)>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ResultRow>> {
        let mut sql = format!(
            "SELECT result_id, test_taker, delivery FROM {}",
            schema::RESULTS_TABLE
        );
        let mut binds: Vec<&dyn ToSql> = Vec::new();

        if !deliveries.is_empty() {
            sql.push_str(&format!(
                " WHERE delivery IN ({})",
                placeholders(deliveries.len())
            ));
            for delivery in deliveries {
                binds.push(delivery);
            }
        }

        if let Some((field, dir)) = order {
            sql.push_str(&format!(" ORDER BY {} {}", field.as_column(), dir.as_sql()));
        }

        let limit = limit as i64;
        let offset = offset as i64;
        sql.push_str(" LIMIT ? OFFSET ?");
        binds.push(&limit);
        binds.push(&offset);

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(binds.as_slice(), |row| {
                Ok(ResultRow {
                    result_id: row.get(0)?,
                    test_taker: row.get(1)?,
                    delivery: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Count result rows matching the delivery filter; an empty filter
    /// counts all rows.
    pub fn count_results_by_delivery(&self, deliveries: &[&str]) -> Result<u64> {
        let mut sql = format!("SELECT COUNT(*) FROM {}", schema::RESULTS_TABLE);
        let mut binds: Vec<&dyn ToSql> = Vec::new();

        if !deliveries.is_empty() {
            sql.push_str(&format!(
                " WHERE delivery IN ({})",
                placeholders(deliveries.len())
            ));
            for delivery in deliveries {
                binds.push(delivery);
            }
        }

        let count: i64 = self
            .conn
            .query_row(&sql, binds.as_slice(), |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Count all result rows
    pub fn count_results(&self) -> Result<u64> {
        self.count_results_by_delivery(&[])
    }

    /// Delete a result and its variables as one transaction.
    ///
    /// Variables go first; a failure at either step rolls the whole
    /// delete back, so a partial delete cannot orphan variable rows.
    pub fn delete_result(&mut self, result_id: &str) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1",
                schema::VARIABLES_TABLE,
                schema::VARIABLES_FK_COLUMN
            ),
            [result_id],
        )?;
        tx.execute(
            &format!("DELETE FROM {} WHERE result_id = ?1", schema::RESULTS_TABLE),
            [result_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            results: self.count_results()?,
            variables: self.count_variables()?,
        })
    }
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub results: u64,
    pub variables: u64,
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Results: {}", self.results)?;
        writeln!(f, "  Variables: {}", self.variables)
    }
}

/// Comma-joined `?` placeholders for an `IN (...)` clause
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}
