use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::MergeError;

/// A single declared column of a CRR (conflict-free replicated relation).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
}

/// Read-only description of one CRR, as produced by the schema-introspection
/// collaborator (out of scope to reimplement here).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableInfo {
    pub tbl_name: String,
    pub pks: Vec<ColumnInfo>,
    pub base_cols: Vec<ColumnInfo>,
}

impl TableInfo {
    pub fn base_cols_len(&self) -> i32 {
        self.base_cols.len() as i32
    }

    pub fn pk_names(&self) -> Vec<String> {
        self.pks.iter().map(|c| c.name.clone()).collect()
    }

    /// The clock shadow table name ABI: `"<tbl>__crsql_clock"`.
    pub fn clock_table_name(&self) -> String {
        clock_table_name(&self.tbl_name)
    }
}

/// The clock shadow table name ABI shared between the merge engine and the
/// schema-introspection collaborator: `"<tbl>__crsql_clock"`.
pub fn clock_table_name(tbl_name: &str) -> String {
    format!("{tbl_name}__crsql_clock")
}

/// Collaborator the merge engine consults to resolve a table name to its
/// `TableInfo`. Stands in for the schema-introspection service this crate
/// scopes out of this crate.
pub trait TableInfoProvider {
    /// Refresh whatever backing directory this provider draws from. Must
    /// fail with a descriptive error if refresh is not possible; the engine
    /// maps this to `MergeError::Schema`.
    fn refresh(&mut self) -> Result<(), String>;

    fn table_info(&self, tbl_name: &str) -> Option<&TableInfo>;
}

/// Simple in-memory directory, sufficient for embedders that refresh their
/// schema directory out of band (e.g. on DDL change) and for this crate's
/// own tests. `refresh` is a no-op since the directory is supplied wholesale
/// up front.
#[derive(Debug, Default)]
pub struct StaticTableInfoProvider {
    tables: HashMap<String, TableInfo>,
}

impl StaticTableInfoProvider {
    pub fn new(tables: Vec<TableInfo>) -> Self {
        Self {
            tables: tables.into_iter().map(|t| (t.tbl_name.clone(), t)).collect(),
        }
    }

    pub fn insert(&mut self, table: TableInfo) {
        self.tables.insert(table.tbl_name.clone(), table);
    }
}

impl TableInfoProvider for StaticTableInfoProvider {
    fn refresh(&mut self) -> Result<(), String> {
        Ok(())
    }

    fn table_info(&self, tbl_name: &str) -> Option<&TableInfo> {
        self.tables.get(tbl_name)
    }
}

pub(crate) fn resolve<'a, P: TableInfoProvider>(
    provider: &'a P,
    tbl_name: &str,
) -> Result<&'a TableInfo, MergeError> {
    provider
        .table_info(tbl_name)
        .ok_or_else(|| MergeError::UnknownTable(tbl_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TableInfo {
        TableInfo {
            tbl_name: "t".to_string(),
            pks: vec![ColumnInfo { name: "id".to_string() }],
            base_cols: vec![ColumnInfo { name: "name".to_string() }],
        }
    }

    #[test]
    fn clock_table_name_convention() {
        assert_eq!(clock_table_name("t"), "t__crsql_clock");
        assert_eq!(sample().clock_table_name(), "t__crsql_clock");
    }

    #[test]
    fn static_provider_resolves_known_tables() {
        let provider = StaticTableInfoProvider::new(vec![sample()]);
        assert!(provider.table_info("t").is_some());
        assert!(provider.table_info("missing").is_none());
    }
}
