use rusqlite::{params, params_from_iter, Connection};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::schema::{fts_table_name, quote_ident, ColumnType, TableSchema};
use super::values::{from_sql, to_sql};
use super::StoreError;

pub type Row = Map<String, Value>;

pub const DEFAULT_DATETIME_COLUMN: &str = "Date Created";

/// An open SQLite database plus the tables declared on it in this session.
///
/// The connection lives as long as the value; call [`Database::close`] to
/// surface close errors instead of dropping.
pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
    tables: HashMap<String, TableSchema>,
}

impl Database {
    /// Open `dir/name`, creating `dir` if needed. With `fresh`, an existing
    /// database file is deleted first.
    pub fn open<P: AsRef<Path>>(dir: P, name: &str, fresh: bool) -> Result<Self, StoreError> {
        fs::create_dir_all(dir.as_ref())?;
        let path = dir.as_ref().join(name);

        if fresh && path.exists() {
            fs::remove_file(&path)?;
            info!("Removed existing database {}", path.display());
        }

        let conn = Connection::open(&path)?;
        debug!("Opened {}", path.display());

        Ok(Self {
            conn,
            path: Some(path),
            tables: HashMap::new(),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
            path: None,
            tables: HashMap::new(),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn schema(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    pub fn create_table(&mut self, schema: TableSchema) -> Result<(), StoreError> {
        schema.validate()?;

        self.conn.execute_batch(&schema.create_sql())?;
        if let Some(fts_sql) = schema.fts_sql() {
            self.conn.execute_batch(&fts_sql)?;
            debug!("Enabled FTS5 on {}", schema.fts_table());
        }

        info!("Created table {}", schema.name);
        self.tables.insert(schema.name.clone(), schema);
        Ok(())
    }

    /// Bulk insert `<source_dir>/<name>.json`. Rows are appended; nothing is
    /// deduplicated.
    pub fn insert_json_into_table(&self, name: &str) -> Result<usize, StoreError> {
        let rows = self.load_source(name)?;
        let written = self.insert_rows(name, &rows)?;
        info!("Inserted {} rows into {}", written, name);
        Ok(written)
    }

    /// Upsert `<source_dir>/<name>.json` on the table's declared primary key.
    pub fn upsert_data_into_table(&self, name: &str) -> Result<usize, StoreError> {
        let pk = self
            .tables
            .get(name)
            .ok_or_else(|| StoreError::UnknownTable(name.to_string()))?
            .primary_key
            .clone()
            .ok_or_else(|| StoreError::MissingPrimaryKey(name.to_string()))?;

        let rows = self.load_source(name)?;
        let written = self.upsert_rows(name, &rows, &pk)?;
        info!("Upserted {} rows into {}", written, name);
        Ok(written)
    }

    /// Set `column_name` to the current local time on every row. The key
    /// columns must exist but need not carry a unique constraint.
    pub fn add_datetime_column(
        &self,
        name: &str,
        primary_key: &[&str],
        column_name: &str,
    ) -> Result<usize, StoreError> {
        if !self.table_exists(name)? {
            return Err(StoreError::UnknownTable(name.to_string()));
        }
        if primary_key.is_empty() {
            return Err(StoreError::MissingPrimaryKey(name.to_string()));
        }
        let existing = table_columns(&self.conn, name)?;
        if let Some(missing) = primary_key.iter().find(|c| !existing.iter().any(|e| e == *c)) {
            return Err(StoreError::MissingKeyValue {
                table: name.to_string(),
                column: missing.to_string(),
            });
        }

        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

        let tx = self.conn.unchecked_transaction()?;
        if !existing.iter().any(|c| c == column_name) {
            add_column(&tx, name, column_name, ColumnType::Text)?;
        }
        let written = tx.execute(
            &format!("UPDATE {} SET {} = ?1", quote_ident(name), quote_ident(column_name)),
            params![now],
        )?;
        tx.commit()?;

        info!("Stamped {} rows of {} with {} = {}", written, name, column_name, now);
        Ok(written)
    }

    /// Returns whether the table existed.
    pub fn drop_table(&mut self, name: &str) -> Result<bool, StoreError> {
        let existed = self.table_exists(name)?;
        self.tables.remove(name);

        if !existed {
            info!("Table {} does not exist", name);
            return Ok(false);
        }

        self.conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {};\nDROP TABLE IF EXISTS {};",
            quote_ident(&fts_table_name(name)),
            quote_ident(name)
        ))?;
        info!("Dropped table {}", name);
        Ok(true)
    }

    pub fn table_exists(&self, name: &str) -> Result<bool, StoreError> {
        let exists: bool = self.conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn columns(&self, name: &str) -> Result<Vec<String>, StoreError> {
        table_columns(&self.conn, name)
    }

    pub fn count_rows(&self, name: &str) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(name)),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn rows(&self, name: &str) -> Result<Vec<Row>, StoreError> {
        self.query_rows(&format!("SELECT * FROM {}", quote_ident(name)), None)
    }

    /// Rows whose full-text columns match an FTS5 query, best match first.
    pub fn search(&self, name: &str, query: &str) -> Result<Vec<Row>, StoreError> {
        let fts = fts_table_name(name);
        if !self.table_exists(&fts)? {
            return Err(StoreError::NoFullTextIndex(name.to_string()));
        }

        let table = quote_ident(name);
        let fts = quote_ident(&fts);
        let sql = format!(
            "SELECT {table}.* FROM {fts} JOIN {table} ON {table}.rowid = {fts}.rowid \
             WHERE {fts} MATCH ?1 ORDER BY {fts}.rank"
        );
        self.query_rows(&sql, Some(query))
    }

    pub fn insert_rows(&self, name: &str, rows: &[Row]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.unchecked_transaction()?;
        {
            ensure_columns(&tx, name, rows)?;
            for row in rows {
                let sql = if row.is_empty() {
                    format!("INSERT INTO {} DEFAULT VALUES", quote_ident(name))
                } else {
                    format!(
                        "INSERT INTO {} ({}) VALUES ({})",
                        quote_ident(name),
                        column_list(row),
                        placeholders(row.len())
                    )
                };
                let mut stmt = tx.prepare_cached(&sql)?;
                stmt.execute(params_from_iter(row.values().map(to_sql)))?;
            }
        }
        tx.commit()?;

        Ok(rows.len())
    }

    /// Insert-or-update keyed on `pk`, adding any columns the rows introduce.
    pub fn upsert_rows(&self, name: &str, rows: &[Row], pk: &[String]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        for row in rows {
            if let Some(missing) = pk.iter().find(|col| !row.contains_key(col.as_str())) {
                return Err(StoreError::MissingKeyValue {
                    table: name.to_string(),
                    column: missing.clone(),
                });
            }
        }
        if !has_unique_key(&self.conn, name, pk)? {
            return Err(StoreError::MissingPrimaryKey(name.to_string()));
        }

        let conflict: Vec<String> = pk.iter().map(|c| quote_ident(c)).collect();
        let conflict = conflict.join(", ");

        let tx = self.conn.unchecked_transaction()?;
        {
            ensure_columns(&tx, name, rows)?;
            for row in rows {
                let updates: Vec<String> = row
                    .keys()
                    .filter(|col| !pk.contains(col))
                    .map(|col| format!("{0} = excluded.{0}", quote_ident(col)))
                    .collect();
                let action = if updates.is_empty() {
                    "NOTHING".to_string()
                } else {
                    format!("UPDATE SET {}", updates.join(", "))
                };

                let sql = format!(
                    "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO {}",
                    quote_ident(name),
                    column_list(row),
                    placeholders(row.len()),
                    conflict,
                    action
                );
                let mut stmt = tx.prepare_cached(&sql)?;
                stmt.execute(params_from_iter(row.values().map(to_sql)))?;
            }
        }
        tx.commit()?;

        Ok(rows.len())
    }

    pub fn close(self) -> Result<(), StoreError> {
        self.conn.close().map_err(|(_, e)| StoreError::Database(e))
    }

    fn load_source(&self, name: &str) -> Result<Vec<Row>, StoreError> {
        let schema = self
            .tables
            .get(name)
            .ok_or_else(|| StoreError::UnknownTable(name.to_string()))?;

        let path = schema.source_file();
        if !path.is_file() {
            return Err(StoreError::SourceNotFound(path));
        }

        let file = File::open(&path)?;
        let data: Value = serde_json::from_reader(BufReader::new(file))?;

        match data {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) => Ok(map),
                    _ => Err(StoreError::UnsupportedShape(path.clone())),
                })
                .collect(),
            Value::Object(map) => Ok(vec![map]),
            _ => Err(StoreError::UnsupportedShape(path)),
        }
    }

    fn query_rows(&self, sql: &str, param: Option<&str>) -> Result<Vec<Row>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = match param {
            Some(p) => stmt.query(params![p])?,
            None => stmt.query([])?,
        };

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (idx, column) in names.iter().enumerate() {
                record.insert(column.clone(), from_sql(row.get_ref(idx)?));
            }
            out.push(record);
        }

        Ok(out)
    }
}

fn table_columns(conn: &Connection, name: &str) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare_cached("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let columns = stmt
        .query_map(params![name], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

/// Whether `key` is exactly the table's primary key or the column set of one
/// of its unique indexes, i.e. usable as an `ON CONFLICT` target.
fn has_unique_key(conn: &Connection, name: &str, key: &[String]) -> Result<bool, StoreError> {
    let wanted: HashSet<&str> = key.iter().map(String::as_str).collect();
    let matches = |cols: Vec<String>| {
        cols.len() == wanted.len() && cols.iter().all(|c| wanted.contains(c.as_str()))
    };

    let mut stmt =
        conn.prepare_cached("SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk")?;
    let pk = stmt
        .query_map(params![name], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    if matches(pk) {
        return Ok(true);
    }

    let mut stmt =
        conn.prepare_cached("SELECT name FROM pragma_index_list(?1) WHERE \"unique\" = 1")?;
    let indexes = stmt
        .query_map(params![name], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare_cached("SELECT name FROM pragma_index_info(?1)")?;
    for index in indexes {
        let cols = stmt
            .query_map(params![index], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        if matches(cols) {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Add columns present in `rows` but missing from the table, typed by the
/// first non-null value seen. Run it on the loading transaction so a rollback
/// also drops the new columns.
fn ensure_columns(conn: &Connection, name: &str, rows: &[Row]) -> Result<(), StoreError> {
    let existing = table_columns(conn, name)?;
    if existing.is_empty() {
        return Err(StoreError::UnknownTable(name.to_string()));
    }
    let mut known: HashSet<String> = existing.into_iter().collect();

    for row in rows {
        for key in row.keys() {
            if known.contains(key) {
                continue;
            }
            let column_type = rows
                .iter()
                .filter_map(|r| r.get(key))
                .find(|v| !v.is_null())
                .map(ColumnType::infer)
                .unwrap_or(ColumnType::Text);

            add_column(conn, name, key, column_type)?;
            known.insert(key.clone());
        }
    }

    Ok(())
}

fn add_column(
    conn: &Connection,
    table: &str,
    column: &str,
    column_type: ColumnType,
) -> Result<(), StoreError> {
    conn.execute_batch(&format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        quote_ident(table),
        quote_ident(column),
        column_type.sql()
    ))?;
    debug!("Added column {} {} to {}", column, column_type.sql(), table);
    Ok(())
}

fn column_list(row: &Row) -> String {
    let cols: Vec<String> = row.keys().map(|c| quote_ident(c)).collect();
    cols.join(", ")
}

fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}
