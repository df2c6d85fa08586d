//! Table registry: maps relation names to providers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use arrow::array::{ArrayRef, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use tracing::debug;

use crate::error::{Error, Result};
use crate::provider::{MemTable, TableProvider};

/// Schema holding the read-only metadata views.
pub const INFORMATION_SCHEMA: &str = "information_schema";

/// A possibly qualified relation name as written in SQL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableReference {
    /// Catalog part of `c.s.t`, if written
    pub catalog: Option<String>,
    /// Schema part of `s.t` or `c.s.t`, if written
    pub schema: Option<String>,
    /// The relation name itself
    pub table: String,
}

impl TableReference {
    /// An unqualified reference.
    pub fn bare(table: impl Into<String>) -> Self {
        Self {
            catalog: None,
            schema: None,
            table: table.into(),
        }
    }

    /// Builds a reference from dotted name parts (`t`, `s.t` or `c.s.t`).
    pub fn from_parts(parts: &[String]) -> Result<Self> {
        match parts {
            [table] => Ok(Self::bare(table.clone())),
            [schema, table] => Ok(Self {
                catalog: None,
                schema: Some(schema.clone()),
                table: table.clone(),
            }),
            [catalog, schema, table] => Ok(Self {
                catalog: Some(catalog.clone()),
                schema: Some(schema.clone()),
                table: table.clone(),
            }),
            _ => Err(Error::plan(format!(
                "Unsupported compound identifier '{}'",
                parts.join(".")
            ))),
        }
    }
}

impl fmt::Display for TableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(catalog) = &self.catalog {
            write!(f, "{}.", catalog)?;
        }
        if let Some(schema) = &self.schema {
            write!(f, "{}.", schema)?;
        }
        write!(f, "{}", self.table)
    }
}

/// The registry of a single session.
///
/// Names are case-sensitive and unique; registering a taken name fails.
/// With the information schema enabled, `information_schema.tables` lists
/// the registered names as of planning time.
#[derive(Debug)]
pub struct Catalog {
    catalog_name: String,
    schema_name: String,
    tables: BTreeMap<String, Arc<dyn TableProvider>>,
    information_schema: bool,
}

impl Catalog {
    /// Creates an empty registry whose tables live in `catalog_name.schema_name`.
    pub fn new(catalog_name: impl Into<String>, schema_name: impl Into<String>) -> Self {
        Self {
            catalog_name: catalog_name.into(),
            schema_name: schema_name.into(),
            tables: BTreeMap::new(),
            information_schema: false,
        }
    }

    /// Exposes or hides `information_schema.tables`.
    pub fn with_information_schema(mut self, enabled: bool) -> Self {
        self.information_schema = enabled;
        self
    }

    /// Name of the default catalog.
    pub fn catalog_name(&self) -> &str {
        &self.catalog_name
    }

    /// Name of the default schema.
    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    /// `<catalog>.<schema>.<table>` for a table of this registry.
    pub fn qualified_name(&self, table: &str) -> String {
        format!("{}.{}.{}", self.catalog_name, self.schema_name, table)
    }

    fn not_found(&self, reference: &TableReference) -> Error {
        let catalog = reference.catalog.as_deref().unwrap_or(&self.catalog_name);
        let schema = reference.schema.as_deref().unwrap_or(&self.schema_name);
        Error::plan(format!(
            "'{}.{}.{}' not found",
            catalog, schema, reference.table
        ))
    }

    /// Adds a provider under `name`.
    pub fn register_table(&mut self, name: &str, provider: Arc<dyn TableProvider>) -> Result<()> {
        if self.tables.contains_key(name) {
            return Err(Error::plan(format!("The table {} already exists", name)));
        }
        debug!(table = name, kind = provider.kind(), "Registering table");
        self.tables.insert(name.to_string(), provider);
        Ok(())
    }

    /// Removes and returns the provider registered under `name`.
    pub fn deregister_table(&mut self, name: &str) -> Result<Arc<dyn TableProvider>> {
        match self.tables.remove(name) {
            Some(provider) => {
                debug!(table = name, "Deregistered table");
                Ok(provider)
            }
            None => Err(self.not_found(&TableReference::bare(name))),
        }
    }

    /// Resolves a SQL relation reference.
    pub fn table(&self, reference: &TableReference) -> Result<Arc<dyn TableProvider>> {
        let catalog_ok = reference
            .catalog
            .as_deref()
            .map_or(true, |c| c == self.catalog_name);
        if self.information_schema
            && catalog_ok
            && reference.schema.as_deref() == Some(INFORMATION_SCHEMA)
        {
            return match reference.table.as_str() {
                "tables" => Ok(Arc::new(self.tables_view()?)),
                _ => Err(self.not_found(reference)),
            };
        }
        let schema_ok = reference
            .schema
            .as_deref()
            .map_or(true, |s| s == self.schema_name);
        if !(catalog_ok && schema_ok) {
            return Err(self.not_found(reference));
        }
        self.tables
            .get(&reference.table)
            .cloned()
            .ok_or_else(|| self.not_found(reference))
    }

    /// True if `name` is registered.
    pub fn table_exist(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Snapshot of `information_schema.tables`: one row per registered
    /// table, then the view itself.
    fn tables_view(&self) -> Result<MemTable> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("table_catalog", DataType::Utf8, false),
            Field::new("table_schema", DataType::Utf8, false),
            Field::new("table_name", DataType::Utf8, false),
            Field::new("table_type", DataType::Utf8, false),
        ]));

        let mut rows: Vec<(&str, &str, &str)> = self
            .tables
            .keys()
            .map(|name| (self.schema_name.as_str(), name.as_str(), "BASE TABLE"))
            .collect();
        rows.push((INFORMATION_SCHEMA, "tables", "VIEW"));

        let column = |values: Vec<&str>| -> ArrayRef { Arc::new(StringArray::from(values)) };
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                column(vec![self.catalog_name.as_str(); rows.len()]),
                column(rows.iter().map(|r| r.0).collect()),
                column(rows.iter().map(|r| r.1).collect()),
                column(rows.iter().map(|r| r.2).collect()),
            ],
        )?;
        MemTable::try_new(schema, vec![batch])
    }
}
