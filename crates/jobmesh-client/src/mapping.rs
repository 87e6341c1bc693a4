//! Loose JSON job payloads to [`JobRecord`]s.
//!
//! Feeds disagree on field names, so each record field is looked up through a
//! short list of aliases. The original object is always kept in `raw`.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use jobmesh_core::{AppError, JobRecord, SourceType};

const ID_KEYS: &[&str] = &["id", "job_id", "jobId", "uuid", "slug"];
const TITLE_KEYS: &[&str] = &["title", "job_title", "position", "name"];
const COMPANY_KEYS: &[&str] = &["company", "company_name", "employer", "organization"];
const LOCATION_KEYS: &[&str] = &["location", "candidate_required_location", "city", "region"];
const URL_KEYS: &[&str] = &["url", "link", "apply_url", "redirect_url", "job_url"];
const DESCRIPTION_KEYS: &[&str] = &["description", "summary", "snippet"];
const SALARY_KEYS: &[&str] = &["salary", "salary_range", "compensation"];
const DATE_KEYS: &[&str] = &["date_posted", "posted_at", "publication_date", "created", "date"];

/// Accepts either a top-level array or an object with a `jobs` array.
pub fn parse_jobs(
    body: Value,
    source: &str,
    source_type: SourceType,
) -> Result<Vec<JobRecord>, AppError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("jobs") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(AppError::Generic(format!(
                    "{source}: expected a JSON array or an object with a \"jobs\" array"
                )));
            }
        },
        _ => {
            return Err(AppError::Generic(format!(
                "{source}: expected a JSON array or an object with a \"jobs\" array"
            )));
        }
    };

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(obj) => match record_from_object(obj, index, source, source_type) {
                Some(record) => records.push(record),
                None => tracing::debug!(%source, %index, "Skipping posting without a title"),
            },
            other => {
                tracing::debug!(%source, %index, kind = %json_kind(&other), "Skipping non-object posting");
            }
        }
    }
    Ok(records)
}

/// Map one posting object, or `None` when it has no usable title.
///
/// A missing company becomes `"Unknown"`. Deduplication also matches on the
/// lower-cased `(title, company)` pair, so company-less postings sharing a
/// title collapse into one record even when their URLs differ.
fn record_from_object(
    obj: Map<String, Value>,
    index: usize,
    source: &str,
    source_type: SourceType,
) -> Option<JobRecord> {
    let title = first_text(&obj, TITLE_KEYS)?;
    let company = first_text(&obj, COMPANY_KEYS).unwrap_or_else(|| "Unknown".to_string());
    let url = first_text(&obj, URL_KEYS);
    let id = first_text(&obj, ID_KEYS)
        .or_else(|| url.clone())
        .unwrap_or_else(|| format!("{source}-{index}"));

    let mut record = JobRecord::new(id, source, source_type, title, company);
    record.url = url;
    record.location = first_text(&obj, LOCATION_KEYS);
    record.description = first_text(&obj, DESCRIPTION_KEYS);
    record.salary = first_text(&obj, SALARY_KEYS).or_else(|| salary_range(&obj));
    record.date_posted = DATE_KEYS
        .iter()
        .find_map(|k| obj.get(*k).and_then(parse_date));
    record.raw = Value::Object(obj);
    Some(record)
}

/// First alias holding a usable scalar. Nested objects contribute their
/// `display_name` or `name` (e.g. `{"company": {"display_name": "Acme"}}`).
fn first_text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| obj.get(*k).and_then(as_text))
}

fn as_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Object(inner) => return first_text(inner, &["display_name", "name", "title"]),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn salary_range(obj: &Map<String, Value>) -> Option<String> {
    let min = obj.get("salary_min").and_then(as_text);
    let max = obj.get("salary_max").and_then(as_text);
    match (min, max) {
        (Some(min), Some(max)) => Some(format!("{min}-{max}")),
        (Some(only), None) | (None, Some(only)) => Some(only),
        (None, None) => None,
    }
}

/// RFC 3339 strings, plain `YYYY-MM-DD` dates, or unix timestamps in seconds.
fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|d| d.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                chrono::NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|d| d.and_utc())
            }),
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
