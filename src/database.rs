use crate::models::*;
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SECTOR_HARM_TABLE: &str = "stockracialharm";
pub const CODE_EXPLANATION_TABLE: &str = "stockharmdef2";
pub const KEYWORD_RESPONSE_TABLE: &str = "adasina";

const SECTOR_COLUMNS: &str = "Sector, Description, Primary_Subsector, Subsector_Weight, \
     Harm_Magnitude, Population_Impact, Directional_Movement, Total_Score";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("reference database not found at {0}")]
    Missing(PathBuf),

    #[error("failed to open reference database at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("reference query failed: {0}")]
    Query(#[from] rusqlite::Error),
}

/// Read-only handle on the reference database file.
///
/// Holds only the path. Each lookup opens its own connection and drops it
/// before returning, so no connection outlives a single call.
#[derive(Debug, Clone)]
pub struct ReferenceStore {
    path: PathBuf,
}

impl ReferenceStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        // Read-only open of a missing file only reports a generic CANTOPEN.
        if !self.path.exists() {
            return Err(StoreError::Missing(self.path.clone()));
        }
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|source| StoreError::Open {
            path: self.path.clone(),
            source,
        })?;
        conn.execute_batch("PRAGMA query_only=ON;")?;
        Ok(conn)
    }

    /// Every record whose `Sector` contains `fragment`, case-sensitively.
    ///
    /// `instr` keeps `%` and `_` literal and does not fold ASCII case the way
    /// `LIKE` does. An empty fragment matches every row.
    pub fn fetch_sector_records(
        &self,
        fragment: &str,
    ) -> Result<Vec<SectorHarmRecord>, StoreError> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {SECTOR_COLUMNS} FROM {SECTOR_HARM_TABLE}
             WHERE ?1 = '' OR instr(Sector, ?1) > 0
             ORDER BY rowid"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![fragment], map_sector_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        debug!(
            "Matched {} sector record(s) for fragment {:?}",
            records.len(),
            fragment
        );
        Ok(records)
    }

    pub fn list_distinct_sectors(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT DISTINCT Sector FROM {SECTOR_HARM_TABLE}
             WHERE Sector IS NOT NULL
             ORDER BY Sector"
        );
        collect_text_column(&conn, &sql)
    }

    pub fn list_distinct_values(&self, column: KeywordColumn) -> Result<Vec<String>, StoreError> {
        let conn = self.connect()?;
        let name = column.column();
        let sql = format!(
            "SELECT DISTINCT \"{name}\" FROM {KEYWORD_RESPONSE_TABLE}
             WHERE \"{name}\" IS NOT NULL AND \"{name}\" != ''
             ORDER BY \"{name}\""
        );
        collect_text_column(&conn, &sql)
    }

    pub fn resolve_code_explanation(
        &self,
        category: ExplanationCategory,
        code: i64,
    ) -> Result<String, StoreError> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT \"{}\" FROM {CODE_EXPLANATION_TABLE} WHERE Key = ?1 ORDER BY rowid LIMIT 1",
            category.column()
        );
        let text = conn
            .query_row(&sql, params![code], |row| row.get::<_, Value>(0))
            .optional()?
            .and_then(value_to_text);
        Ok(text.unwrap_or_else(|| CODE_NOT_FOUND.to_string()))
    }

    pub fn resolve_keyword_response(
        &self,
        keyword1: &str,
        keyword2: &str,
    ) -> Result<String, StoreError> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT Response FROM {KEYWORD_RESPONSE_TABLE}
             WHERE Keyword1 = ?1 AND Keyword2 = ?2
             ORDER BY rowid LIMIT 1"
        );
        let text = conn
            .query_row(&sql, params![keyword1, keyword2], |row| row.get::<_, Value>(0))
            .optional()?
            .and_then(value_to_text);
        Ok(text.unwrap_or_else(|| KEYWORD_RESPONSE_NOT_FOUND.to_string()))
    }

    /// Resolves all three scoring codes of a record.
    pub fn explain_record(
        &self,
        record: &SectorHarmRecord,
    ) -> Result<ExplainedSectorRecord, StoreError> {
        let mut explanations = Vec::with_capacity(ExplanationCategory::ALL.len());
        for category in ExplanationCategory::ALL {
            let code = record.code_for(category);
            let text = match code {
                Some(code) => self.resolve_code_explanation(category, code)?,
                None => CODE_NOT_FOUND.to_string(),
            };
            explanations.push(CodeExplanation {
                category,
                code,
                text,
            });
        }
        Ok(ExplainedSectorRecord {
            record: record.clone(),
            explanations,
        })
    }
}

fn collect_text_column(conn: &Connection, sql: &str) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| row.get::<_, Value>(0))?;
    // SQL DISTINCT keeps 5 and '5' apart, but both render as "5".
    let mut values = BTreeSet::new();
    for row in rows {
        if let Some(text) = value_to_text(row?) {
            values.insert(text);
        }
    }
    Ok(values.into_iter().collect())
}

fn map_sector_row(row: &Row<'_>) -> rusqlite::Result<SectorHarmRecord> {
    Ok(SectorHarmRecord {
        sector: value_to_text(row.get(0)?).unwrap_or_default(),
        description: value_to_text(row.get(1)?),
        primary_subsector: value_to_text(row.get(2)?),
        subsector_weight: value_to_f64(row.get(3)?),
        harm_magnitude: value_to_i64(row.get(4)?),
        population_impact: value_to_i64(row.get(5)?),
        directional_movement: value_to_i64(row.get(6)?),
        total_score: value_to_f64(row.get(7)?),
    })
}

// Reference tables are loosely typed, so cells are coerced rather than
// trusted to match their declared affinity.

fn value_to_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(number) => Some(number.to_string()),
        Value::Real(number) => Some(number.to_string()),
        Value::Text(text) => Some(text),
        Value::Blob(bytes) => String::from_utf8(bytes).ok(),
    }
}

fn value_to_f64(value: Value) -> Option<f64> {
    match value {
        Value::Integer(number) => Some(number as f64),
        Value::Real(number) => Some(number),
        Value::Text(text) => text.trim().parse::<f64>().ok(),
        Value::Null | Value::Blob(_) => None,
    }
    .filter(|number| number.is_finite())
}

fn value_to_i64(value: Value) -> Option<i64> {
    match value {
        Value::Integer(number) => Some(number),
        Value::Real(number) if number.is_finite() && number.fract() == 0.0 => Some(number as i64),
        Value::Text(text) => {
            let trimmed = text.trim();
            trimmed.parse::<i64>().ok().or_else(|| {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|number| number.is_finite() && number.fract() == 0.0)
                    .map(|number| number as i64)
            })
        }
        _ => None,
    }
}
