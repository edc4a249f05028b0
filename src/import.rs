use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

use crate::classify::role_family_from_title;
use crate::db::{Database, NewPosting};
use crate::engine::features::RoleFilter;

/// One posting as normalized by an ATS connector. Ids and timestamps come
/// through as whatever JSON type the board used.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportRow {
    #[serde(default)]
    pub source_job_id: Option<Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub apply_url: Option<String>,
    #[serde(default)]
    pub role_family: Option<String>,
    #[serde(default)]
    pub created_at: Option<Value>,
    #[serde(default)]
    pub updated_at: Option<Value>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub rows: usize,
    pub imported: usize,
    pub skipped_no_id: usize,
    pub skipped_role: usize,
}

pub fn load_rows(path: &Path) -> Result<Vec<ImportRow>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read postings file: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Postings file is not a JSON array of postings: {}", path.display()))
}

/// Upserts `rows` for one company. Rows without an id are skipped; rows
/// outside `only_role` are skipped when a filter is given.
pub fn import_postings(
    db: &Database,
    company_id: i64,
    rows: &[ImportRow],
    only_role: Option<&RoleFilter>,
    now: DateTime<Utc>,
) -> Result<ImportStats> {
    let mut stats = ImportStats {
        rows: rows.len(),
        ..ImportStats::default()
    };

    for (index, row) in rows.iter().enumerate() {
        let Some(posting) = normalize_row(row, now) else {
            tracing::warn!(index, "skipping posting without source_job_id");
            stats.skipped_no_id += 1;
            continue;
        };
        if let Some(filter) = only_role {
            if !filter.matches(posting.role_family.as_deref()) {
                stats.skipped_role += 1;
                continue;
            }
        }
        db.upsert_posting(company_id, &posting)
            .with_context(|| format!("Failed to store posting {}", posting.source_job_id))?;
        stats.imported += 1;
    }

    tracing::info!(
        company_id,
        rows = stats.rows,
        imported = stats.imported,
        skipped_no_id = stats.skipped_no_id,
        skipped_role = stats.skipped_role,
        "imported postings"
    );
    Ok(stats)
}

/// Fills gaps the way ingestion always has: creation falls back to the
/// import time, update falls back to creation, and a missing role family is
/// classified from the title.
pub fn normalize_row(row: &ImportRow, now: DateTime<Utc>) -> Option<NewPosting> {
    let source_job_id = match row.source_job_id.as_ref()? {
        Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    let title = row
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("Untitled")
        .to_string();
    let role_family = row
        .role_family
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .or_else(|| role_family_from_title(&title).map(str::to_string));

    let created_at = row
        .created_at
        .as_ref()
        .and_then(parse_timestamp_value)
        .unwrap_or(now);
    let updated_at = row
        .updated_at
        .as_ref()
        .and_then(parse_timestamp_value)
        .or(Some(created_at));

    Some(NewPosting {
        source_job_id,
        title,
        department: row.department.clone(),
        location: row.location.clone(),
        apply_url: row.apply_url.clone(),
        role_family,
        created_at,
        updated_at,
    })
}

fn parse_timestamp_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(from_epoch),
        Value::String(s) => parse_timestamp(s),
        _ => None,
    }
}

/// Epoch seconds, epoch milliseconds (anything past 10^10), RFC 3339, or a
/// naive date/datetime taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(epoch) = value.parse::<i64>() {
        return from_epoch(epoch);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn from_epoch(epoch: i64) -> Option<DateTime<Utc>> {
    let seconds = if epoch > 10_000_000_000 { epoch / 1000 } else { epoch };
    Utc.timestamp_opt(seconds, 0).single()
}
