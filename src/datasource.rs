//! Datasource form validation and the "test connectivity" path.

use crate::backend::CommandBackend;
use crate::translator;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const SSL_CONFIGURATION_MISSING: &str = "The server has failed to fetch SSL configuration from datasource configuration form. Please reach out to customer support to resolve this.";
pub const DATABASE_NAME_MISSING: &str = "Missing default database name.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SslMode {
    Default,
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasourceConfig {
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub ssl: Option<SslMode>,
}

fn default_database() -> String {
    "test".to_string()
}

impl Default for DatasourceConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            ssl: Some(SslMode::Default),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasourceTestResult {
    pub success: bool,
    pub invalids: Vec<String>,
}

/// Sentences describing everything wrong with the configuration.
pub fn validate_datasource(config: &DatasourceConfig) -> Vec<String> {
    let mut invalids = Vec::new();
    if config.ssl.is_none() {
        invalids.push(SSL_CONFIGURATION_MISSING.to_string());
    }
    if config.database.trim().is_empty() {
        invalids.push(DATABASE_NAME_MISSING.to_string());
    }
    invalids
}

/// Validate the configuration, then ping under `deadline`. Never fails;
/// problems are reported in `invalids`.
pub async fn test_datasource<B: CommandBackend + ?Sized>(
    backend: &B,
    config: &DatasourceConfig,
    deadline: Duration,
) -> DatasourceTestResult {
    let invalids = validate_datasource(config);
    if !invalids.is_empty() {
        return DatasourceTestResult {
            success: false,
            invalids,
        };
    }

    let invalids = match tokio::time::timeout(deadline, backend.ping()).await {
        Ok(Ok(())) => Vec::new(),
        Ok(Err(err)) => vec![translator::translate(&err).message().to_string()],
        Err(_) => {
            tracing::warn!(
                deadline_ms = deadline.as_millis() as u64,
                "Datasource ping timed out"
            );
            vec![translator::CONNECTION_TIMEOUT.to_string()]
        }
    };

    tracing::info!(
        database = %config.database,
        success = invalids.is_empty(),
        "Tested datasource"
    );
    DatasourceTestResult {
        success: invalids.is_empty(),
        invalids,
    }
}
