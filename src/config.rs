//! Layered settings for the compiler, execution and introspection.
//!
//! Values come from `docql.toml` when present, then from environment
//! variables (optionally loaded from `.env`):
//!
//! - `DOCQL_TIMEOUT_MS` - Execution deadline in milliseconds
//! - `DOCQL_SAMPLE_SIZE` - Documents sampled per collection
//! - `DOCQL_DATABASE` - Default database name
//! - `DOCQL_SMART_SUBSTITUTION` - `true`/`false`

use crate::datasource::DatasourceConfig;
use docql_core::{Delimiters, QueryCompiler};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "docql.toml";

/// Environment variable names
pub const ENV_TIMEOUT_MS: &str = "DOCQL_TIMEOUT_MS";
pub const ENV_SAMPLE_SIZE: &str = "DOCQL_SAMPLE_SIZE";
pub const ENV_DATABASE: &str = "DOCQL_DATABASE";
pub const ENV_SMART_SUBSTITUTION: &str = "DOCQL_SMART_SUBSTITUTION";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub compiler: CompilerSettings,
    #[serde(default)]
    pub execution: ExecutionSettings,
    #[serde(default)]
    pub structure: StructureSettings,
    #[serde(default)]
    pub datasource: DatasourceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilerSettings {
    #[serde(default = "default_true")]
    pub smart_substitution: bool,
    #[serde(default = "default_open_delimiter")]
    pub open_delimiter: String,
    #[serde(default = "default_close_delimiter")]
    pub close_delimiter: String,
    #[serde(default = "default_find_limit")]
    pub default_find_limit: i64,
}

fn default_true() -> bool {
    true
}

fn default_open_delimiter() -> String {
    "{{".to_string()
}

fn default_close_delimiter() -> String {
    "}}".to_string()
}

fn default_find_limit() -> i64 {
    10
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            smart_substitution: true,
            open_delimiter: default_open_delimiter(),
            close_delimiter: default_close_delimiter(),
            default_find_limit: default_find_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSettings {
    /// Deadline for one backend call
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureSettings {
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
}

fn default_sample_size() -> usize {
    10
}

impl Default for StructureSettings {
    fn default() -> Self {
        Self {
            sample_size: default_sample_size(),
        }
    }
}

impl Settings {
    /// Load settings.
    ///
    /// An explicit `path` must exist. Without one, `docql.toml` in the
    /// working directory is used if present, otherwise defaults apply.
    /// Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut settings = match path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Configuration file not found: {}", path.display());
                }
                Self::from_file(path)?
            }
            None => {
                let default_path = Path::new(CONFIG_FILE_NAME);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        settings.apply_env_overrides();
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from any variable source. Empty or unparsable values
    /// are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(timeout) = lookup(ENV_TIMEOUT_MS).and_then(|v| v.parse::<u64>().ok()) {
            self.execution.timeout_ms = timeout;
        }

        if let Some(size) = lookup(ENV_SAMPLE_SIZE).and_then(|v| v.parse::<usize>().ok()) {
            self.structure.sample_size = size;
        }

        if let Some(database) = lookup(ENV_DATABASE) {
            if !database.is_empty() {
                self.datasource.database = database;
            }
        }

        if let Some(smart) = lookup(ENV_SMART_SUBSTITUTION).and_then(|v| v.parse::<bool>().ok()) {
            self.compiler.smart_substitution = smart;
        }
    }

    /// Compiler configured from these settings.
    pub fn compiler(&self) -> QueryCompiler {
        QueryCompiler::new()
            .with_smart_substitution(self.compiler.smart_substitution)
            .with_delimiters(Delimiters::new(
                &self.compiler.open_delimiter,
                &self.compiler.close_delimiter,
            ))
            .with_default_find_limit(self.compiler.default_find_limit)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.execution.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::SslMode;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_empty_file_uses_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.timeout(), Duration::from_secs(10));
        assert_eq!(settings.structure.sample_size, 10);
        assert!(settings.compiler.smart_substitution);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[compiler]
smart_substitution = false
open_delimiter = "<%"
close_delimiter = "%>"

[execution]
timeout_ms = 250

[datasource]
database = "app"
ssl = "disabled"
"#
        )
        .unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert!(!settings.compiler.smart_substitution);
        assert_eq!(settings.compiler.default_find_limit, 10);
        assert_eq!(settings.timeout(), Duration::from_millis(250));
        assert_eq!(settings.datasource.database, "app");
        assert_eq!(settings.datasource.ssl, Some(SslMode::Disabled));

        let compiler = settings.compiler();
        assert_eq!(compiler.delimiters.open, "<%");
        assert!(!compiler.smart_substitution);
    }

    #[test]
    fn test_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join(CONFIG_FILE_NAME);
        assert!(Settings::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_TIMEOUT_MS, "500"),
            (ENV_SAMPLE_SIZE, "not-a-number"),
            (ENV_DATABASE, "analytics"),
            (ENV_SMART_SUBSTITUTION, "false"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings.apply_overrides_from(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(settings.execution.timeout_ms, 500);
        assert_eq!(settings.structure.sample_size, 10);
        assert_eq!(settings.datasource.database, "analytics");
        assert!(!settings.compiler.smart_substitution);
    }
}
