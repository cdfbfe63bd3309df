//! Record shaping for the extraction and validation artifacts
//!
//! [`enforce_records`] turns whatever the validation agent produced into a list
//! of [`ExtractedRecord`]s. Entries are repaired where the intent is clear and
//! dropped otherwise; every change is noted in the [`ValidationReport`].
//!
//! [`reconcile_extraction`] makes sure no discovery candidate silently
//! disappears between stage 1 and stage 2.

use crate::pipeline::record::{
    Candidate, ExtractedRecord, COMPANY_WEBSITE, DEADLINE, POSITION_TITLE, RECORD_KEYS, ROLE,
};
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{info, warn};
use url::Url;

static RECORD_VALIDATOR: Lazy<jsonschema::Validator> = Lazy::new(|| {
    jsonschema::validator_for(&ExtractedRecord::json_schema()).expect("record schema compiles")
});

/// Keys that commonly wrap the record list in an object reply
const WRAPPER_KEYS: [&str; 6] = ["records", "data", "results", "items", "entries", "jobs"];

/// Placeholder strings models use for "unknown"
const NULL_WORDS: [&str; 8] = [
    "n/a",
    "na",
    "none",
    "null",
    "unknown",
    "not available",
    "not specified",
    "not provided",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteKind {
    Repaired,
    Warning,
    Dropped,
}

/// One change made to one input entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryNote {
    pub index: usize,
    pub kind: NoteKind,
    pub message: String,
}

/// What the enforcer did to the input
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub input_entries: usize,
    pub kept: usize,
    pub notes: Vec<EntryNote>,
}

impl ValidationReport {
    pub fn dropped(&self) -> usize {
        self.count(NoteKind::Dropped)
    }

    pub fn count(&self, kind: NoteKind) -> usize {
        self.notes.iter().filter(|n| n.kind == kind).count()
    }

    fn note(&mut self, index: usize, kind: NoteKind, message: impl Into<String>) {
        let message = message.into();
        if kind == NoteKind::Dropped {
            warn!(entry = index, reason = %message, "Dropped validation entry");
        }
        self.notes.push(EntryNote {
            index,
            kind,
            message,
        });
    }

    /// Log a one-line summary
    pub fn log_summary(&self) {
        info!(
            input_entries = self.input_entries,
            kept = self.kept,
            repaired = self.count(NoteKind::Repaired),
            warnings = self.count(NoteKind::Warning),
            dropped = self.dropped(),
            "Schema enforcement finished"
        );
    }
}

/// Input could not be read as a sequence of entries at all
#[derive(Debug, thiserror::Error)]
#[error("Expected a JSON array of records, got {0}")]
pub struct NotASequence(pub &'static str);

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Unwrap the list of entries from an agent reply.
///
/// Accepts a bare array, an object wrapping one array (under a known key or
/// as its only array field), or a single record-shaped object.
pub fn record_entries(value: Value) -> Result<Vec<Value>, NotASequence> {
    match value {
        Value::Array(entries) => Ok(entries),
        Value::Object(mut object) => {
            for key in WRAPPER_KEYS {
                if matches!(object.get(key), Some(Value::Array(_))) {
                    if let Some(Value::Array(entries)) = object.remove(key) {
                        return Ok(entries);
                    }
                }
            }

            let array_fields: Vec<String> = object
                .iter()
                .filter(|(_, v)| v.is_array())
                .map(|(k, _)| k.clone())
                .collect();
            if let [only] = array_fields.as_slice() {
                if let Some(Value::Array(entries)) = object.remove(only) {
                    return Ok(entries);
                }
            }

            if object.keys().any(|k| canonical_key(k).is_some()) {
                return Ok(vec![Value::Object(object)]);
            }
            Err(NotASequence("an object without records"))
        }
        other => Err(NotASequence(type_name(&other))),
    }
}

/// Reduce a key to lowercase alphanumerics
fn squash(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Map a key to its canonical record key, if it is one or a known alias
pub fn canonical_key(key: &str) -> Option<&'static str> {
    match squash(key).as_str() {
        "companywebsite" | "website" | "companysite" | "companyurl" | "url" | "link" | "site"
        | "homepage" | "careerspage" | "careersurl" | "joburl" | "joblink" | "postingurl"
        | "applicationurl" | "applicationlink" | "companywebsiteurl" => Some(COMPANY_WEBSITE),
        "role" | "jobrole" | "roletype" | "function" | "jobfunction" | "department"
        | "category" | "field" => Some(ROLE),
        "positiontitle" | "position" | "title" | "jobtitle" | "positionname" | "jobname"
        | "opening" => Some(POSITION_TITLE),
        "deadline" | "applicationdeadline" | "applydeadline" | "applyby" | "closingdate"
        | "duedate" | "deadlinedate" | "lastdatetoapply" => Some(DEADLINE),
        _ => None,
    }
}

/// Normalize one value; `Err` means the entry is malformed
fn scalar_text(value: &Value) -> Result<(Option<String>, bool), &'static str> {
    match value {
        Value::Null => Ok((None, false)),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || NULL_WORDS.contains(&trimmed.to_lowercase().as_str()) {
                Ok((None, !s.is_empty()))
            } else {
                Ok((Some(trimmed.to_string()), trimmed.len() != s.len()))
            }
        }
        Value::Bool(b) => Ok((Some(b.to_string()), true)),
        Value::Number(n) => Ok((Some(n.to_string()), true)),
        Value::Array(_) => Err("an array"),
        Value::Object(_) => Err("an object"),
    }
}

/// Accepts full URLs and bare domains such as `a.com`
pub fn looks_like_url(text: &str) -> bool {
    let parsed = if text.contains("://") {
        Url::parse(text)
    } else {
        Url::parse(&format!("https://{text}"))
    };
    match parsed {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().is_some_and(|h| h.contains('.') || h == "localhost")
                && !text.contains(char::is_whitespace)
        }
        Err(_) => false,
    }
}

fn shape_entry(
    index: usize,
    object: &Map<String, Value>,
    report: &mut ValidationReport,
) -> Option<ExtractedRecord> {
    let mut record = ExtractedRecord::default();
    let mut filled: HashSet<&'static str> = HashSet::new();

    for (key, value) in object {
        let Some(canonical) = canonical_key(key) else {
            report.note(index, NoteKind::Repaired, format!("removed extra key '{key}'"));
            continue;
        };

        let (text, changed) = match scalar_text(value) {
            Ok(result) => result,
            Err(kind) => {
                report.note(
                    index,
                    NoteKind::Dropped,
                    format!("value of '{key}' is {kind}"),
                );
                return None;
            }
        };

        if filled.contains(canonical) {
            if text.is_some() {
                report.note(
                    index,
                    NoteKind::Repaired,
                    format!("ignored '{key}', '{canonical}' already set"),
                );
            }
            continue;
        }

        if key != canonical {
            report.note(
                index,
                NoteKind::Repaired,
                format!("renamed '{key}' to '{canonical}'"),
            );
        }
        if changed {
            report.note(
                index,
                NoteKind::Repaired,
                format!("normalized value of '{canonical}'"),
            );
        }

        // Null values don't claim the slot, a later alias may still fill it
        if text.is_some() {
            filled.insert(canonical);
        }
        if let Some(slot) = record.slot_mut(canonical) {
            *slot = text;
        }
    }

    for key in RECORD_KEYS {
        if !object.keys().any(|k| canonical_key(k) == Some(key)) {
            report.note(index, NoteKind::Repaired, format!("filled missing '{key}' with null"));
        }
    }

    if record.is_empty() {
        report.note(index, NoteKind::Dropped, "all fields are empty");
        return None;
    }

    if let Some(website) = &record.company_website {
        if !looks_like_url(website) {
            report.note(
                index,
                NoteKind::Warning,
                format!("'{COMPANY_WEBSITE}' is not a URL: {website}"),
            );
        }
    }

    Some(record)
}

/// Enforce the four-key record schema on an agent reply
pub fn enforce_records(value: Value) -> Result<(Vec<ExtractedRecord>, ValidationReport), NotASequence> {
    let entries = record_entries(value)?;
    let mut report = ValidationReport {
        input_entries: entries.len(),
        ..Default::default()
    };

    let mut records: Vec<ExtractedRecord> = Vec::new();
    let mut seen: HashSet<ExtractedRecord> = HashSet::new();

    for (index, entry) in entries.iter().enumerate() {
        let Value::Object(object) = entry else {
            report.note(
                index,
                NoteKind::Dropped,
                format!("entry is {}, not an object", type_name(entry)),
            );
            continue;
        };

        let Some(record) = shape_entry(index, object, &mut report) else {
            continue;
        };

        if !seen.insert(record.clone()) {
            report.note(index, NoteKind::Dropped, "duplicate record");
            continue;
        }

        let instance = serde_json::to_value(&record).unwrap_or(Value::Null);
        if let Err(error) = RECORD_VALIDATOR.validate(&instance) {
            let reasons: Vec<String> = error.map(|e| e.to_string()).collect();
            report.note(
                index,
                NoteKind::Dropped,
                format!("schema check failed: {}", reasons.join("; ")),
            );
            continue;
        }

        records.push(record);
    }

    report.kept = records.len();
    Ok((records, report))
}

/// Comparable form of a URL: no scheme, no `www.`, no trailing slash, lowercase
fn url_key(text: &str) -> String {
    let lower = text.trim().to_lowercase();
    let without_scheme = lower
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(&lower);
    without_scheme
        .trim_start_matches("www.")
        .trim_end_matches('/')
        .to_string()
}

fn text_key(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Append a placeholder record for every candidate the extraction output does not mention.
///
/// A candidate with a URL counts as represented when any string value of any
/// entry is the same URL. A candidate without one is matched on its title.
/// Returns the entries and the number appended.
pub fn reconcile_extraction(mut entries: Vec<Value>, candidates: &[Candidate]) -> (Vec<Value>, usize) {
    let values: Vec<&str> = entries
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|object| object.values())
        .filter_map(Value::as_str)
        .collect();
    let mentioned_urls: HashSet<String> = values.iter().map(|v| url_key(v)).collect();
    let mentioned_texts: HashSet<String> = values.iter().map(|v| text_key(v)).collect();

    let mut appended = 0;
    let mut added_urls: HashSet<String> = HashSet::new();
    let mut added_titles: HashSet<String> = HashSet::new();
    for candidate in candidates {
        let title = Some(candidate.title.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        let key = url_key(&candidate.url);

        let website = if !key.is_empty() {
            if mentioned_urls.contains(&key) || !added_urls.insert(key) {
                continue;
            }
            Value::String(candidate.url.clone())
        } else if let Some(title) = &title {
            let key = text_key(title);
            if mentioned_texts.contains(&key) || !added_titles.insert(key) {
                continue;
            }
            Value::Null
        } else {
            warn!(
                company = candidate.company.as_deref().unwrap_or(""),
                "Discovery candidate has neither title nor URL, skipped"
            );
            continue;
        };

        let mut record = Map::new();
        record.insert(COMPANY_WEBSITE.to_string(), website);
        record.insert(ROLE.to_string(), Value::Null);
        record.insert(
            POSITION_TITLE.to_string(),
            title.map(Value::String).unwrap_or(Value::Null),
        );
        record.insert(DEADLINE.to_string(), Value::Null);
        entries.push(Value::Object(record));
        appended += 1;
    }

    if appended > 0 {
        warn!(appended, "Extraction output missed candidates, placeholders appended");
    }
    (entries, appended)
}
