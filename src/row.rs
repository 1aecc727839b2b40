//! Rows and result sets.

use std::sync::Arc;

use crate::error::{Error, Result};

/// Column metadata reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnInfo {
    /// Column name (or alias)
    pub name: String,
    /// Original column name
    pub org_name: String,
    /// MySQL field type number
    pub column_type: u8,
    /// Field flags (NOT_NULL, PRI_KEY, ...)
    pub flags: u16,
    /// Character set number
    pub charset: u16,
    /// Table name (or alias)
    pub table: String,
    /// Original table name
    pub org_table: String,
    /// Database name
    pub db: String,
}

/// One data row.
///
/// Rows built for `use_array: false` queries carry their column names and can
/// be indexed by name; positional rows only by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    columns: Option<Arc<[String]>>,
    values: Vec<Option<String>>,
}

impl Row {
    /// A row addressable by column name.
    pub fn named(columns: Arc<[String]>, values: Vec<Option<String>>) -> Self {
        Self {
            columns: Some(columns),
            values,
        }
    }

    /// A row addressable by index only.
    pub fn positional(values: Vec<Option<String>>) -> Self {
        Self {
            columns: None,
            values,
        }
    }

    /// Column names, for named rows.
    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    /// Returns true if the row can be indexed by column name.
    pub fn is_named(&self) -> bool {
        self.columns.is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `idx`; `None` for NULL or out of range.
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.values.get(idx).and_then(|v| v.as_deref())
    }

    /// Value of the column `name`; `None` for NULL, unknown columns and positional rows.
    ///
    /// With duplicate column names the last one wins, like a name-keyed map.
    pub fn get_by_name(&self, name: &str) -> Option<&str> {
        let columns = self.columns.as_ref()?;
        let idx = columns.iter().rposition(|c| c == name)?;
        self.get(idx)
    }

    /// Returns true if the value at `idx` is NULL.
    pub fn is_null(&self, idx: usize) -> bool {
        matches!(self.values.get(idx), Some(None))
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Option<String>> {
        self.values
    }
}

/// Counters and metadata of one statement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResultInfo {
    /// Rows returned
    pub num_rows: u64,
    /// Rows changed by INSERT/UPDATE/DELETE
    pub affected_rows: u64,
    /// AUTO_INCREMENT id of the last insert
    pub insert_id: u64,
    /// Column metadata, when requested
    pub metadata: Option<Arc<[ColumnInfo]>>,
}

/// The rows and counters of one statement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResultSet {
    pub rows: Vec<Row>,
    pub info: ResultInfo,
}

/// Outcome of a buffered query.
///
/// A single-statement query yields `Single`. A multi-statement query yields
/// `Multi` with one entry per statement; a failed statement occupies its
/// position as an `Err` while the overall outcome is still `Ok`.
#[derive(Debug, Clone)]
pub enum Response {
    Single(ResultSet),
    Multi(Vec<Result<ResultSet>>),
}

impl Response {
    /// Collapse the per-statement results into the first error, if any.
    pub fn into_results(self) -> Result<Vec<ResultSet>> {
        match self {
            Response::Single(rs) => Ok(vec![rs]),
            Response::Multi(results) => results.into_iter().collect(),
        }
    }

    /// The only result set, or an error for multi-statement responses.
    pub fn into_single(self) -> Result<ResultSet> {
        match self {
            Response::Single(rs) => Ok(rs),
            Response::Multi(results) => Err(Error::InvalidUsage(format!(
                "expected a single result set, got {}",
                results.len()
            ))),
        }
    }

    /// Rows of a single-statement response.
    pub fn rows(&self) -> &[Row] {
        match self {
            Response::Single(rs) => &rs.rows,
            Response::Multi(_) => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_row() {
        let columns: Arc<[String]> = vec!["col1".to_string(), "col2".to_string()].into();
        let row = Row::named(columns, vec![Some("hello".into()), None]);
        assert_eq!(row.get_by_name("col1"), Some("hello"));
        assert_eq!(row.get_by_name("col2"), None);
        assert!(row.is_null(1));
        assert_eq!(row.get_by_name("nope"), None);
    }

    #[test]
    fn test_positional_row_has_no_names() {
        let row = Row::positional(vec![Some("1".into())]);
        assert!(!row.is_named());
        assert_eq!(row.get(0), Some("1"));
        assert_eq!(row.get_by_name("0"), None);
    }

    #[test]
    fn test_multi_into_results_surfaces_error() {
        let response = Response::Multi(vec![
            Ok(ResultSet::default()),
            Err(Error::NotConnected),
        ]);
        assert!(response.into_results().is_err());
    }
}
