//! Read-side normalisation of documents written by older clients.
//!
//! The store may hand back two historical shapes: backend timestamp objects
//! instead of RFC 3339 strings, and several spellings for the same enum
//! value. Both are folded into the canonical shape here so the domain types
//! stay alias-free. Timestamps held in calendar-date fields become
//! `YYYY-MM-DD` in UTC; every other timestamp becomes an RFC 3339 instant.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::habit::{Habit, HabitLog};
use crate::journal::JournalEntry;
use crate::repository::Record;
use crate::task::Task;

/// Rewrite `doc` in place into the shape the domain types deserialise.
pub fn normalize_document(collection: &str, doc: &mut Value) {
    if let Some(fields) = doc.as_object_mut() {
        convert_dates(fields, date_fields(collection));
        if collection == Habit::COLLECTION {
            if let Some(Value::Object(frequency)) = fields.get_mut("frequency") {
                convert_dates(frequency, &["anchor"]);
            }
        }
    }
    convert_timestamps(doc);
    let Some(fields) = doc.as_object_mut() else {
        return;
    };
    if collection == Habit::COLLECTION {
        rename_field(fields, "habitType", "type");
        canonicalize(fields, "type", habit_type_alias);
        canonicalize(fields, "comparison", comparison_alias);
    } else if collection == HabitLog::COLLECTION {
        rename_field(fields, "completedItemIds", "completedItems");
        canonicalize(fields, "status", log_status_alias);
    }
}

/// Backend timestamp object (`{seconds, nanoseconds}`) as a UTC instant.
pub fn timestamp_from_object(fields: &Map<String, Value>) -> Option<DateTime<Utc>> {
    let seconds = fields
        .get("seconds")
        .or_else(|| fields.get("_seconds"))?
        .as_i64()?;
    let nanos = fields
        .get("nanoseconds")
        .or_else(|| fields.get("_nanoseconds"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let known = fields.keys().all(|key| {
        matches!(
            key.as_str(),
            "seconds" | "_seconds" | "nanoseconds" | "_nanoseconds"
        )
    });
    if !known {
        return None;
    }
    DateTime::from_timestamp(seconds, u32::try_from(nanos).ok()?)
}

fn date_fields(collection: &str) -> &'static [&'static str] {
    if collection == Task::COLLECTION {
        &["dueDate"]
    } else if collection == HabitLog::COLLECTION || collection == JournalEntry::COLLECTION {
        &["date"]
    } else {
        &[]
    }
}

fn convert_dates(fields: &mut Map<String, Value>, keys: &[&str]) {
    for key in keys {
        let Some(value) = fields.get_mut(*key) else {
            continue;
        };
        let instant = match value {
            Value::Object(stamp) => timestamp_from_object(stamp),
            Value::String(raw) => DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|instant| instant.with_timezone(&Utc)),
            _ => None,
        };
        if let Some(instant) = instant {
            *value = Value::String(instant.date_naive().format("%Y-%m-%d").to_string());
        }
    }
}

fn convert_timestamps(value: &mut Value) {
    match value {
        Value::Object(fields) => {
            if let Some(instant) = timestamp_from_object(fields) {
                *value = Value::String(instant.to_rfc3339_opts(SecondsFormat::AutoSi, true));
                return;
            }
            for child in fields.values_mut() {
                convert_timestamps(child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(convert_timestamps),
        _ => {}
    }
}

fn rename_field(fields: &mut Map<String, Value>, from: &str, to: &str) {
    if fields.contains_key(to) {
        return;
    }
    if let Some(value) = fields.remove(from) {
        fields.insert(to.to_string(), value);
    }
}

fn canonicalize(
    fields: &mut Map<String, Value>,
    key: &str,
    alias: fn(&str) -> Option<&'static str>,
) {
    let Some(Value::String(raw)) = fields.get_mut(key) else {
        return;
    };
    if let Some(canonical) = alias(raw) {
        if raw.as_str() != canonical {
            tracing::debug!(field = key, from = %raw, to = canonical, "mapped legacy value");
            *raw = canonical.to_string();
        }
    }
}

fn squash(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '>' | '<' | '='))
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn habit_type_alias(raw: &str) -> Option<&'static str> {
    match squash(raw).as_str() {
        "binary" | "boolean" | "yesno" | "check" => Some("binary"),
        "count" | "counter" | "number" | "quantity" => Some("count"),
        "duration" | "time" | "timer" | "minutes" => Some("duration"),
        "checklist" | "list" | "subtasks" => Some("checklist"),
        _ => None,
    }
}

fn comparison_alias(raw: &str) -> Option<&'static str> {
    match squash(raw).as_str() {
        "greaterthan" | "gt" | ">" | "morethan" => Some("greaterThan"),
        "atleast" | "gte" | ">=" | "min" | "minimum" => Some("atLeast"),
        "lessthan" | "lt" | "<" | "under" => Some("lessThan"),
        "exactly" | "eq" | "=" | "==" | "equals" => Some("exactly"),
        "anyvalue" | "any" | "anynonzero" => Some("anyValue"),
        _ => None,
    }
}

fn log_status_alias(raw: &str) -> Option<&'static str> {
    match squash(raw).as_str() {
        "done" | "complete" | "completed" | "success" => Some("done"),
        "partial" | "partiallycompleted" | "inprogress" => Some("partial"),
        "none" | "pending" | "skipped" | "notdone" | "" => Some("none"),
        _ => None,
    }
}
