use clap::Args;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CATALOG_URL: &str = "http://127.0.0.1:8001/test/test_table.json?_sort=PID&mods.type_of_resource__contains=Journal&mods.sm_digital_object_identifier__notblank=1&_shape=array";
pub const DEFAULT_DOI_FIELD: &str = "mods.sm_digital_object_identifier";
pub const DEFAULT_OPENALEX_URL: &str = "https://api.openalex.org/works";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Settings for one pipeline run.
///
/// Every field has a default so a partial TOML file only needs the values it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Catalog endpoint returning a JSON array, paged with `Link: rel="next"`.
    pub catalog_url: String,
    /// Field of each catalog record holding the DOI.
    pub doi_field: String,
    /// OpenAlex works endpoint.
    pub openalex_url: String,
    /// Contact email sent as `mailto` for the polite pool.
    pub mailto: String,
    /// Only query the first N DOIs of the catalog.
    pub max_dois: Option<usize>,
    /// Per-request HTTP timeout in seconds.
    pub timeout_secs: u64,
    pub works_file: String,
    pub authorships_file: String,
    pub works_dir: PathBuf,
    pub authorships_dir: PathBuf,
    pub db_name: String,
    pub db_dir: PathBuf,
    /// Delete the database file before opening it.
    pub fresh_db: bool,
    /// Upsert on the primary key instead of plain inserts.
    pub upsert: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            doi_field: DEFAULT_DOI_FIELD.to_string(),
            openalex_url: DEFAULT_OPENALEX_URL.to_string(),
            mailto: String::new(),
            max_dois: None,
            timeout_secs: 30,
            works_file: "main_open_alex_table.json".to_string(),
            authorships_file: "author_open_alex_table.json".to_string(),
            works_dir: PathBuf::from("data"),
            authorships_dir: PathBuf::from("data"),
            db_name: "openalex.db".to_string(),
            db_dir: PathBuf::from("."),
            fresh_db: false,
            upsert: false,
        }
    }
}

impl PipelineConfig {
    pub fn works_table(&self) -> &str {
        table_name(&self.works_file)
    }

    pub fn authorships_table(&self) -> &str {
        table_name(&self.authorships_file)
    }
}

fn table_name(file_name: &str) -> &str {
    file_name.strip_suffix(".json").unwrap_or(file_name)
}

pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<PipelineConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Flags shared by every subcommand. Values given here override the TOML file.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// TOML file with pipeline settings
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Catalog endpoint returning a JSON array
    #[arg(long)]
    pub catalog_url: Option<String>,

    /// OpenAlex works endpoint
    #[arg(long)]
    pub openalex_url: Option<String>,

    /// Contact email for the OpenAlex polite pool
    #[arg(short, long)]
    pub mailto: Option<String>,

    /// Only query the first N DOIs
    #[arg(long)]
    pub max_dois: Option<usize>,

    /// Request timeout in seconds
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Directory for the flattened JSON files
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Directory holding the SQLite database
    #[arg(long)]
    pub db_dir: Option<PathBuf>,

    /// SQLite database file name
    #[arg(long)]
    pub db_name: Option<String>,
}

impl ConfigArgs {
    pub fn resolve(&self) -> Result<PipelineConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_from_path(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(url) = &self.catalog_url {
            config.catalog_url = url.clone();
        }
        if let Some(url) = &self.openalex_url {
            config.openalex_url = url.clone();
        }
        if let Some(mailto) = &self.mailto {
            config.mailto = mailto.clone();
        }
        if self.max_dois.is_some() {
            config.max_dois = self.max_dois;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        if let Some(output) = &self.output {
            config.works_dir = output.clone();
            config.authorships_dir = output.clone();
        }
        if let Some(dir) = &self.db_dir {
            config.db_dir = dir.clone();
        }
        if let Some(name) = &self.db_name {
            config.db_name = name.clone();
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names_strip_json_suffix() {
        let config = PipelineConfig::default();
        assert_eq!(config.works_table(), "main_open_alex_table");
        assert_eq!(config.authorships_table(), "author_open_alex_table");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, "mailto = \"someone@example.org\"\nmax_dois = 115\n").unwrap();

        let config = load_from_path(&path).unwrap();

        assert_eq!(config.mailto, "someone@example.org");
        assert_eq!(config.max_dois, Some(115));
        assert_eq!(config.doi_field, DEFAULT_DOI_FIELD);
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_cli_values_override_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, "mailto = \"file@example.org\"\ndb_name = \"file.db\"\n").unwrap();

        let args = ConfigArgs {
            config: Some(path),
            mailto: Some("cli@example.org".to_string()),
            output: Some(PathBuf::from("out")),
            ..Default::default()
        };
        let config = args.resolve().unwrap();

        assert_eq!(config.mailto, "cli@example.org");
        assert_eq!(config.db_name, "file.db");
        assert_eq!(config.works_dir, PathBuf::from("out"));
        assert_eq!(config.authorships_dir, PathBuf::from("out"));
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "timeout_secs = \"soon\"").unwrap();

        assert!(matches!(load_from_path(&path), Err(ConfigError::Parse { .. })));
    }
}
