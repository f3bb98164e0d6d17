use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Integer,
    Float,
    Blob,
}

impl ColumnType {
    pub fn sql(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer => "INTEGER",
            Self::Float => "FLOAT",
            Self::Blob => "BLOB",
        }
    }

    /// Column type for a newly seen JSON value.
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Bool(_) => Self::Integer,
            Value::Number(n) if n.is_i64() || n.is_u64() => Self::Integer,
            Value::Number(_) => Self::Float,
            _ => Self::Text,
        }
    }
}

/// Declared shape of one table and where its JSON source lives.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub source_dir: PathBuf,
    pub columns: Vec<(String, ColumnType)>,
    pub primary_key: Option<Vec<String>>,
    pub full_text: Option<Vec<String>>,
}

impl TableSchema {
    pub fn new<P: AsRef<Path>>(name: &str, source_dir: P) -> Self {
        Self {
            name: name.to_string(),
            source_dir: source_dir.as_ref().to_path_buf(),
            columns: Vec::new(),
            primary_key: None,
            full_text: None,
        }
    }

    pub fn column(mut self, name: &str, column_type: ColumnType) -> Self {
        self.columns.push((name.to_string(), column_type));
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn full_text(mut self, columns: &[&str]) -> Self {
        self.full_text = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// `<source_dir>/<name>.json`
    pub fn source_file(&self) -> PathBuf {
        self.source_dir.join(format!("{}.json", self.name))
    }

    pub fn fts_table(&self) -> String {
        fts_table_name(&self.name)
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        let invalid = |reason: String| StoreError::InvalidSchema {
            table: self.name.clone(),
            reason,
        };

        if self.name.is_empty() {
            return Err(invalid("empty table name".to_string()));
        }
        if self.columns.is_empty() {
            return Err(invalid("no columns declared".to_string()));
        }

        let declared = |col: &str| self.columns.iter().any(|(name, _)| name == col);
        for (kind, list) in [("primary key", &self.primary_key), ("full-text", &self.full_text)] {
            if let Some(cols) = list {
                if cols.is_empty() {
                    return Err(invalid(format!("empty {} column list", kind)));
                }
                if let Some(missing) = cols.iter().find(|c| !declared(c.as_str())) {
                    return Err(invalid(format!("{} column `{}` is not declared", kind, missing)));
                }
            }
        }

        Ok(())
    }

    pub fn create_sql(&self) -> String {
        let mut defs: Vec<String> = self
            .columns
            .iter()
            .map(|(name, ty)| format!("{} {}", quote_ident(name), ty.sql()))
            .collect();

        if let Some(pk) = &self.primary_key {
            let cols: Vec<String> = pk.iter().map(|c| quote_ident(c)).collect();
            defs.push(format!("PRIMARY KEY ({})", cols.join(", ")));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            quote_ident(&self.name),
            defs.join(",\n    ")
        )
    }

    /// External-content FTS5 table over the full-text columns, kept in sync by
    /// triggers and rebuilt from the rows already present.
    pub fn fts_sql(&self) -> Option<String> {
        let cols = self.full_text.as_ref()?;
        let table = quote_ident(&self.name);
        let fts = quote_ident(&self.fts_table());
        let fts_cols: Vec<String> = cols.iter().map(|c| quote_ident(c)).collect();
        let fts_cols = fts_cols.join(", ");
        let new_values: Vec<String> = cols.iter().map(|c| format!("new.{}", quote_ident(c))).collect();
        let new_values = new_values.join(", ");
        let old_values: Vec<String> = cols.iter().map(|c| format!("old.{}", quote_ident(c))).collect();
        let old_values = old_values.join(", ");
        let trigger = |suffix: &str| quote_ident(&format!("{}_{}", self.name, suffix));

        Some(format!(
            r#"
            CREATE VIRTUAL TABLE IF NOT EXISTS {fts} USING fts5({fts_cols}, content={content});
            CREATE TRIGGER IF NOT EXISTS {ai} AFTER INSERT ON {table} BEGIN
                INSERT INTO {fts} (rowid, {fts_cols}) VALUES (new.rowid, {new_values});
            END;
            CREATE TRIGGER IF NOT EXISTS {ad} AFTER DELETE ON {table} BEGIN
                INSERT INTO {fts} ({fts}, rowid, {fts_cols}) VALUES ('delete', old.rowid, {old_values});
            END;
            CREATE TRIGGER IF NOT EXISTS {au} AFTER UPDATE ON {table} BEGIN
                INSERT INTO {fts} ({fts}, rowid, {fts_cols}) VALUES ('delete', old.rowid, {old_values});
                INSERT INTO {fts} (rowid, {fts_cols}) VALUES (new.rowid, {new_values});
            END;
            INSERT INTO {fts} ({fts}) VALUES ('rebuild');
            "#,
            content = quote_literal(&self.name),
            ai = trigger("ai"),
            ad = trigger("ad"),
            au = trigger("au"),
        ))
    }
}

pub(crate) fn fts_table_name(table: &str) -> String {
    format!("{}_fts", table)
}

/// Double-quoted SQL identifier; column names such as `mods.title` need it.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn works_schema() -> TableSchema {
        TableSchema::new("works", "data")
            .column("id", ColumnType::Text)
            .column("title", ColumnType::Text)
            .primary_key(&["id"])
            .full_text(&["title"])
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("mods.title"), "\"mods.title\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(quote_literal("it's"), "'it''s'");
    }

    #[test]
    fn test_create_sql_includes_primary_key() {
        let sql = works_schema().create_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"works\""));
        assert!(sql.contains("\"id\" TEXT"));
        assert!(sql.contains("PRIMARY KEY (\"id\")"));
    }

    #[test]
    fn test_fts_sql_only_when_requested() {
        assert!(works_schema().fts_sql().unwrap().contains("USING fts5(\"title\", content='works')"));

        let mut plain = works_schema();
        plain.full_text = None;
        assert!(plain.fts_sql().is_none());
    }

    #[test]
    fn test_validate_rejects_undeclared_columns() {
        let schema = works_schema().full_text(&["abstract"]);
        assert!(matches!(schema.validate(), Err(StoreError::InvalidSchema { .. })));

        let schema = TableSchema::new("empty", "data");
        assert!(schema.validate().is_err());

        assert!(works_schema().validate().is_ok());
    }

    #[test]
    fn test_infer_column_type() {
        assert_eq!(ColumnType::infer(&serde_json::json!(true)), ColumnType::Integer);
        assert_eq!(ColumnType::infer(&serde_json::json!(3)), ColumnType::Integer);
        assert_eq!(ColumnType::infer(&serde_json::json!(1.5)), ColumnType::Float);
        assert_eq!(ColumnType::infer(&serde_json::json!("x")), ColumnType::Text);
        assert_eq!(ColumnType::infer(&serde_json::json!({"a": 1})), ColumnType::Text);
    }
}
