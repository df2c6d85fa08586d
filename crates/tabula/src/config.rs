//! Session configuration

use serde::{Deserialize, Serialize};

use tabula_core::query::DEFAULT_BATCH_SIZE;

/// Settings shared by every query of a [`SessionContext`](crate::SessionContext).
///
/// # Examples
///
/// ```rust
/// use tabula::SessionConfig;
///
/// let config = SessionConfig::new()
///     .with_batch_size(1024)
///     .with_target_partitions(4);
/// assert_eq!(config.batch_size, 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Catalog name used to qualify relations
    pub default_catalog: String,
    /// Schema name used to qualify relations
    pub default_schema: String,
    /// Maximum rows per produced record batch
    pub batch_size: usize,
    /// Worker threads used to scan multi-file sources
    pub target_partitions: usize,
    /// Pruning used by Parquet sources that leave it unset
    pub parquet_pruning: bool,
    /// Expose `information_schema.tables` to SQL
    pub information_schema: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_catalog: "tabula".to_string(),
            default_schema: "public".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            target_partitions: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            parquet_pruning: true,
            information_schema: false,
        }
    }
}

impl SessionConfig {
    /// Create config with the defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the catalog and schema that qualify relation names
    pub fn with_default_catalog_and_schema(
        mut self,
        catalog: impl Into<String>,
        schema: impl Into<String>,
    ) -> Self {
        self.default_catalog = catalog.into();
        self.default_schema = schema.into();
        self
    }

    /// Set the maximum rows per batch (at least 1)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the scan thread count (at least 1)
    pub fn with_target_partitions(mut self, target_partitions: usize) -> Self {
        self.target_partitions = target_partitions.max(1);
        self
    }

    /// Set the pruning default for Parquet sources
    pub fn with_parquet_pruning(mut self, enabled: bool) -> Self {
        self.parquet_pruning = enabled;
        self
    }

    /// Enable or disable the `information_schema.tables` view
    pub fn with_information_schema(mut self, enabled: bool) -> Self {
        self.information_schema = enabled;
        self
    }
}
