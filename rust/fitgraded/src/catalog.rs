//! CSV catalog import.
//!
//! A catalog folder holds the tables the grading engine reads, as exported
//! from a spreadsheet:
//!
//! - `options.csv`: `field,value,label` drop-down entries
//! - `fields.csv`: `value,label,description,input_format` test definitions
//! - `scores.csv`: `test_type,gender,grade,top_score,bottom_score` endpoints
//! - `scores/<test_type>.csv`: `final_score,<gender>_grade<grade>,...`
//! - `test_weights.csv`: `test_type,gender,weight_percent,label`
//!
//! Every file is optional but the folder must contain at least one. The
//! whole catalog is replaced in one transaction.

use anyhow::{anyhow, bail, Context};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use crate::benchmark::normalize;
use crate::model::{TestDefinition, WeightEntry};
use crate::source::{record_get, record_get_any, Record};

const OPTIONS_FILE: &str = "options.csv";
const FIELDS_FILE: &str = "fields.csv";
const ENDPOINTS_FILE: &str = "scores.csv";
const WEIGHTS_FILE: &str = "test_weights.csv";
const TABLES_DIR: &str = "scores";

#[derive(Debug, Default)]
pub struct CatalogFiles {
    pub options: Option<PathBuf>,
    pub fields: Option<PathBuf>,
    pub endpoints: Option<PathBuf>,
    pub weights: Option<PathBuf>,
    /// `(test_type, path)` sorted by test type.
    pub tables: Vec<(String, PathBuf)>,
}

impl CatalogFiles {
    fn all_paths(&self) -> Vec<&Path> {
        let mut out: Vec<&Path> = [&self.options, &self.fields, &self.endpoints, &self.weights]
            .into_iter()
            .flatten()
            .map(PathBuf::as_path)
            .collect();
        out.extend(self.tables.iter().map(|(_, p)| p.as_path()));
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub import_id: String,
    pub unchanged: bool,
    pub digest: String,
    pub imported_at: String,
    pub option_count: i64,
    pub test_count: i64,
    pub benchmark_table_count: i64,
    pub endpoint_row_count: i64,
    pub weight_count: i64,
}

fn file_if_present(folder: &Path, name: &str) -> Option<PathBuf> {
    let p = folder.join(name);
    p.is_file().then_some(p)
}

pub fn discover(folder: &Path) -> anyhow::Result<CatalogFiles> {
    if !folder.is_dir() {
        bail!("catalog folder not found: {}", folder.to_string_lossy());
    }
    let mut files = CatalogFiles {
        options: file_if_present(folder, OPTIONS_FILE),
        fields: file_if_present(folder, FIELDS_FILE),
        endpoints: file_if_present(folder, ENDPOINTS_FILE),
        weights: file_if_present(folder, WEIGHTS_FILE),
        tables: Vec::new(),
    };

    let tables_dir = folder.join(TABLES_DIR);
    if tables_dir.is_dir() {
        for ent in std::fs::read_dir(&tables_dir)
            .with_context(|| format!("failed to list {}", tables_dir.to_string_lossy()))?
        {
            let p = ent?.path();
            if !p.is_file() {
                continue;
            }
            let is_csv = p
                .extension()
                .and_then(|s| s.to_str())
                .map(|s| s.eq_ignore_ascii_case("csv"))
                .unwrap_or(false);
            let Some(stem) = p.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if is_csv {
                files.tables.push((stem.to_string(), p.clone()));
            }
        }
        files.tables.sort();
    }

    if files.all_paths().is_empty() {
        bail!(
            "no catalog files found in {}",
            folder.to_string_lossy()
        );
    }
    Ok(files)
}

/// Reads a CSV file into records keyed by normalized header. Short rows are
/// padded with empty strings so a trailing blank cell is still a gap.
pub fn read_csv_records(path: &Path) -> anyhow::Result<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.to_string_lossy()))?;
    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("failed to read header of {}", path.to_string_lossy()))?
        .iter()
        .map(|h| normalize(h.trim_start_matches('\u{feff}')))
        .collect();

    let mut out = Vec::new();
    for (idx, row) in reader.records().enumerate() {
        let row = row.with_context(|| {
            format!("{} line {} is not valid CSV", path.to_string_lossy(), idx + 2)
        })?;
        if row.iter().all(|v| v.is_empty()) {
            continue;
        }
        let rec: Record = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !h.is_empty())
            .map(|(i, h)| (h.clone(), row.get(i).unwrap_or("").to_string()))
            .collect();
        out.push(rec);
    }
    Ok(out)
}

pub fn digest_files(files: &CatalogFiles, folder: &Path) -> anyhow::Result<String> {
    let mut hasher = Sha256::new();
    for p in files.all_paths() {
        let rel = p.strip_prefix(folder).unwrap_or(p);
        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        let bytes =
            std::fs::read(p).with_context(|| format!("failed to read {}", p.to_string_lossy()))?;
        hasher.update(&bytes);
        hasher.update([0u8]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

struct ParsedCatalog {
    options: Vec<(String, String, String)>,
    definitions: Vec<TestDefinition>,
    endpoints: Vec<Record>,
    weights: Vec<Record>,
    tables: Vec<(String, Vec<Record>)>,
}

fn parse_catalog(files: &CatalogFiles) -> anyhow::Result<ParsedCatalog> {
    let option_records = match &files.options {
        Some(p) => read_csv_records(p)?,
        None => Vec::new(),
    };
    let options: Vec<(String, String, String)> = option_records
        .iter()
        .filter_map(|r| {
            let field = record_get(r, "field")?.trim().to_string();
            let value = record_get(r, "value")?.trim().to_string();
            let label = record_get_any(r, &["label"]).unwrap_or(value.as_str()).to_string();
            Some((field, value, label))
        })
        .collect();

    // fields.csv wins; options rows with field=test_type fill in the rest.
    let mut definitions: Vec<TestDefinition> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    if let Some(p) = &files.fields {
        for r in read_csv_records(p)? {
            if let Some(d) = TestDefinition::from_record(&r) {
                if seen.insert(d.test_type.clone()) {
                    definitions.push(d);
                }
            }
        }
    }
    for r in &option_records {
        if record_get(r, "field").map(str::trim) != Some("test_type") {
            continue;
        }
        if let Some(d) = TestDefinition::from_record(r) {
            if seen.insert(d.test_type.clone()) {
                definitions.push(d);
            }
        }
    }

    let endpoints = match &files.endpoints {
        Some(p) => read_csv_records(p)?,
        None => Vec::new(),
    };

    let weights = match &files.weights {
        Some(p) => read_csv_records(p)?,
        None => Vec::new(),
    };
    for w in &weights {
        WeightEntry::from_record(w).map_err(|e| anyhow!("{}: {}", WEIGHTS_FILE, e))?;
    }

    let mut tables = Vec::with_capacity(files.tables.len());
    for (test_type, p) in &files.tables {
        tables.push((test_type.clone(), read_csv_records(p)?));
    }

    Ok(ParsedCatalog {
        options,
        definitions,
        endpoints,
        weights,
        tables,
    })
}

fn last_import(conn: &Connection) -> anyhow::Result<Option<ImportSummary>> {
    let row = conn
        .query_row(
            "SELECT id, digest, imported_at, option_count, test_count,
                    benchmark_table_count, endpoint_row_count, weight_count
             FROM catalog_imports
             ORDER BY imported_at DESC
             LIMIT 1",
            [],
            |r| {
                Ok(ImportSummary {
                    import_id: r.get(0)?,
                    unchanged: false,
                    digest: r.get(1)?,
                    imported_at: r.get(2)?,
                    option_count: r.get(3)?,
                    test_count: r.get(4)?,
                    benchmark_table_count: r.get(5)?,
                    endpoint_row_count: r.get(6)?,
                    weight_count: r.get(7)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub fn catalog_status(conn: &Connection) -> anyhow::Result<Option<ImportSummary>> {
    last_import(conn)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionEntry {
    pub field: String,
    pub value: String,
    pub label: String,
}

/// Drop-down entries in import order, optionally for one field only.
pub fn list_options(conn: &Connection, field: Option<&str>) -> anyhow::Result<Vec<OptionEntry>> {
    let mut stmt = conn.prepare(
        "SELECT field, value, label
         FROM options
         WHERE ?1 IS NULL OR field = ?1
         ORDER BY sort_order",
    )?;
    let rows = stmt
        .query_map([field], |r| {
            Ok(OptionEntry {
                field: r.get(0)?,
                value: r.get(1)?,
                label: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn import_catalog(conn: &Connection, folder: &Path) -> anyhow::Result<ImportSummary> {
    let files = discover(folder)?;
    let digest = digest_files(&files, folder)?;

    if let Some(prev) = last_import(conn)? {
        if prev.digest == digest {
            info!(folder = %folder.to_string_lossy(), "catalog unchanged, skipping import");
            return Ok(ImportSummary {
                unchanged: true,
                ..prev
            });
        }
    }

    let parsed = parse_catalog(&files)?;

    let tx = conn
        .unchecked_transaction()
        .context("failed to start catalog transaction")?;
    for table in [
        "options",
        "test_definitions",
        "benchmark_cells",
        "endpoint_rows",
        "test_weights",
    ] {
        tx.execute(&format!("DELETE FROM {}", table), [])
            .with_context(|| format!("failed to clear {}", table))?;
    }

    for (i, (field, value, label)) in parsed.options.iter().enumerate() {
        tx.execute(
            "INSERT INTO options(field, value, label, sort_order) VALUES(?, ?, ?, ?)",
            (field, value, label, i as i64),
        )
        .context("failed to insert option")?;
    }

    for (i, d) in parsed.definitions.iter().enumerate() {
        tx.execute(
            "INSERT INTO test_definitions(test_type, title, description, input_format, sort_order)
             VALUES(?, ?, ?, ?, ?)",
            (&d.test_type, &d.title, &d.description, &d.input_format, i as i64),
        )
        .with_context(|| format!("failed to insert test definition {}", d.test_type))?;
    }

    for (test_type, rows) in &parsed.tables {
        for (row_idx, rec) in rows.iter().enumerate() {
            for (column, value) in rec {
                tx.execute(
                    "INSERT INTO benchmark_cells(test_type, row_idx, column_name, value)
                     VALUES(?, ?, ?, ?)",
                    (test_type, row_idx as i64, column, value),
                )
                .with_context(|| format!("failed to insert benchmark cell for {}", test_type))?;
            }
        }
        debug!(test_type = %test_type, rows = rows.len(), "imported benchmark table");
    }

    let mut endpoint_row_count = 0_i64;
    for (i, rec) in parsed.endpoints.iter().enumerate() {
        let (Some(test_type), Some(gender), Some(grade)) = (
            record_get(rec, "test_type"),
            record_get(rec, "gender"),
            record_get(rec, "grade"),
        ) else {
            continue;
        };
        tx.execute(
            "INSERT INTO endpoint_rows(test_type, gender, grade, top_score, bottom_score, sort_order)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                test_type,
                gender,
                grade,
                record_get(rec, "top_score").unwrap_or(""),
                record_get(rec, "bottom_score").unwrap_or(""),
                i as i64,
            ),
        )
        .context("failed to insert endpoint row")?;
        endpoint_row_count += 1;
    }

    let mut weight_count = 0_i64;
    for (i, rec) in parsed.weights.iter().enumerate() {
        let Some(test_type) = record_get_any(rec, &["test_type", "value", "testtype"]) else {
            continue;
        };
        let gender = record_get_any(rec, &["gender"]);
        let weight = record_get_any(rec, &["weight_percent", "weight"]).unwrap_or("0");
        let label = record_get_any(rec, &["label"]).unwrap_or(test_type);
        tx.execute(
            "INSERT INTO test_weights(test_type, gender, weight_percent, label, sort_order)
             VALUES(?, ?, ?, ?, ?)",
            (test_type, gender, weight, label, i as i64),
        )
        .context("failed to insert test weight")?;
        weight_count += 1;
    }

    let summary = ImportSummary {
        import_id: Uuid::new_v4().to_string(),
        unchanged: false,
        digest,
        imported_at: chrono::Utc::now().to_rfc3339(),
        option_count: parsed.options.len() as i64,
        test_count: parsed.definitions.len() as i64,
        benchmark_table_count: parsed.tables.len() as i64,
        endpoint_row_count,
        weight_count,
    };
    tx.execute(
        "INSERT INTO catalog_imports(id, folder, digest, imported_at, option_count, test_count,
                                     benchmark_table_count, endpoint_row_count, weight_count)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            summary.import_id,
            folder.to_string_lossy().to_string(),
            summary.digest,
            summary.imported_at,
            summary.option_count,
            summary.test_count,
            summary.benchmark_table_count,
            summary.endpoint_row_count,
            summary.weight_count,
        ],
    )
    .context("failed to record catalog import")?;
    tx.commit().context("failed to commit catalog import")?;

    info!(
        folder = %folder.to_string_lossy(),
        tests = summary.test_count,
        tables = summary.benchmark_table_count,
        weights = summary.weight_count,
        "catalog imported"
    );
    Ok(summary)
}
