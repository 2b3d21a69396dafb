//! Data source seam.
//!
//! The engine only ever sees records of string fields. How they are fetched
//! and stored is up to the implementation; the workspace ships
//! [`SqliteSource`] over the catalog tables filled by `catalog.importCsv`.

use std::collections::BTreeMap;

use rusqlite::{Connection, OptionalExtension};

use crate::benchmark::normalize;
use crate::error::DataUnavailable;

pub type Record = BTreeMap<String, String>;

/// Reads a field by column name, ignoring header casing and padding.
pub fn record_get<'a>(rec: &'a Record, column: &str) -> Option<&'a str> {
    if let Some(v) = rec.get(column) {
        return Some(v.as_str());
    }
    rec.iter()
        .find(|(k, _)| normalize(k) == column)
        .map(|(_, v)| v.as_str())
}

/// First non-empty field among several accepted header names.
pub fn record_get_any<'a>(rec: &'a Record, columns: &[&str]) -> Option<&'a str> {
    columns
        .iter()
        .filter_map(|c| record_get(rec, c))
        .find(|v| !v.trim().is_empty())
}

pub trait DataSource {
    fn test_definition(&self, test_type: &str) -> Result<Option<Record>, DataUnavailable>;
    fn test_definitions(&self) -> Result<Vec<Record>, DataUnavailable>;
    /// `None` when no threshold table exists for the test.
    fn benchmark_rows(&self, test_type: &str) -> Result<Option<Vec<Record>>, DataUnavailable>;
    fn endpoint_rows(&self, test_type: &str) -> Result<Vec<Record>, DataUnavailable>;
    fn weight_entries(&self) -> Result<Vec<Record>, DataUnavailable>;
}

pub struct SqliteSource<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSource<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

fn unavailable(e: rusqlite::Error) -> DataUnavailable {
    DataUnavailable(e.to_string())
}

fn definition_record(r: &rusqlite::Row<'_>) -> rusqlite::Result<Record> {
    let mut rec = Record::new();
    rec.insert("value".into(), r.get::<_, String>(0)?);
    rec.insert("label".into(), r.get::<_, String>(1)?);
    rec.insert("description".into(), r.get::<_, String>(2)?);
    rec.insert("input_format".into(), r.get::<_, String>(3)?);
    Ok(rec)
}

impl DataSource for SqliteSource<'_> {
    fn test_definition(&self, test_type: &str) -> Result<Option<Record>, DataUnavailable> {
        self.conn
            .query_row(
                "SELECT test_type, title, description, input_format
                 FROM test_definitions
                 WHERE test_type = ?",
                [test_type],
                definition_record,
            )
            .optional()
            .map_err(unavailable)
    }

    fn test_definitions(&self) -> Result<Vec<Record>, DataUnavailable> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT test_type, title, description, input_format
                 FROM test_definitions
                 ORDER BY sort_order",
            )
            .map_err(unavailable)?;
        stmt.query_map([], definition_record)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(unavailable)
    }

    fn benchmark_rows(&self, test_type: &str) -> Result<Option<Vec<Record>>, DataUnavailable> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT row_idx, column_name, value
                 FROM benchmark_cells
                 WHERE test_type = ?
                 ORDER BY row_idx",
            )
            .map_err(unavailable)?;
        let cells = stmt
            .query_map([test_type], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                ))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(unavailable)?;
        if cells.is_empty() {
            return Ok(None);
        }

        let mut rows: Vec<Record> = Vec::new();
        let mut current_idx: Option<i64> = None;
        for (row_idx, column, value) in cells {
            if current_idx != Some(row_idx) {
                rows.push(Record::new());
                current_idx = Some(row_idx);
            }
            if let Some(rec) = rows.last_mut() {
                rec.insert(column, value);
            }
        }
        Ok(Some(rows))
    }

    fn endpoint_rows(&self, test_type: &str) -> Result<Vec<Record>, DataUnavailable> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT gender, grade, top_score, bottom_score
                 FROM endpoint_rows
                 WHERE test_type = ?
                 ORDER BY sort_order",
            )
            .map_err(unavailable)?;
        stmt.query_map([test_type], |r| {
            let mut rec = Record::new();
            rec.insert("gender".into(), r.get::<_, String>(0)?);
            rec.insert("grade".into(), r.get::<_, String>(1)?);
            rec.insert("top_score".into(), r.get::<_, String>(2)?);
            rec.insert("bottom_score".into(), r.get::<_, String>(3)?);
            Ok(rec)
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(unavailable)
    }

    fn weight_entries(&self) -> Result<Vec<Record>, DataUnavailable> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT test_type, gender, weight_percent, label
                 FROM test_weights
                 ORDER BY sort_order",
            )
            .map_err(unavailable)?;
        stmt.query_map([], |r| {
            let mut rec = Record::new();
            rec.insert("test_type".into(), r.get::<_, String>(0)?);
            rec.insert(
                "gender".into(),
                r.get::<_, Option<String>>(1)?.unwrap_or_default(),
            );
            rec.insert("weight_percent".into(), r.get::<_, String>(2)?);
            rec.insert("label".into(), r.get::<_, String>(3)?);
            Ok(rec)
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(unavailable)
    }
}

#[cfg(test)]
pub fn record(fields: &[(&str, &str)]) -> Record {
    fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// In-memory source for engine tests. Counts reads so caching can be checked.
#[cfg(test)]
#[derive(Default)]
pub struct MemorySource {
    pub definitions: Vec<Record>,
    pub tables: std::collections::HashMap<String, Vec<Record>>,
    pub endpoints: Vec<Record>,
    pub weights: Vec<Record>,
    pub fail_tables: std::cell::Cell<u32>,
    pub table_reads: std::cell::Cell<u32>,
}

#[cfg(test)]
impl DataSource for MemorySource {
    fn test_definition(&self, test_type: &str) -> Result<Option<Record>, DataUnavailable> {
        Ok(self
            .definitions
            .iter()
            .find(|r| record_get(r, "value") == Some(test_type))
            .cloned())
    }

    fn test_definitions(&self) -> Result<Vec<Record>, DataUnavailable> {
        Ok(self.definitions.clone())
    }

    fn benchmark_rows(&self, test_type: &str) -> Result<Option<Vec<Record>>, DataUnavailable> {
        self.table_reads.set(self.table_reads.get() + 1);
        if self.fail_tables.get() > 0 {
            self.fail_tables.set(self.fail_tables.get() - 1);
            return Err(DataUnavailable("simulated fetch failure".into()));
        }
        Ok(self.tables.get(test_type).cloned())
    }

    fn endpoint_rows(&self, test_type: &str) -> Result<Vec<Record>, DataUnavailable> {
        Ok(self
            .endpoints
            .iter()
            .filter(|r| record_get(r, "test_type") == Some(test_type))
            .cloned()
            .collect())
    }

    fn weight_entries(&self) -> Result<Vec<Record>, DataUnavailable> {
        Ok(self.weights.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_get_ignores_header_casing() {
        let r = record(&[(" Final_Score ", "100"), ("label", "")]);
        assert_eq!(record_get(&r, "final_score"), Some("100"));
        assert_eq!(record_get_any(&r, &["label", "final_score"]), Some("100"));
        assert_eq!(record_get(&r, "missing"), None);
    }
}
