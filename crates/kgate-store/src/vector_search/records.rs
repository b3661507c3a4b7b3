//! Mapping between data-object payloads and knowledge records.
//!
//! Reads are lenient: missing fields fall back to their defaults and
//! timestamps that fail to parse are treated as absent.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use kgate_core::{ArchivedKnowledge, Knowledge, Result, DEFAULT_USER_ID};

/// Data fields as stored in a collection; every field optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DataFields {
    id: String,
    title: String,
    content: String,
    tags: Vec<String>,
    user_id: Option<String>,
    source: Option<String>,
    status: Option<String>,
    github_path: String,
    pr_url: String,
    promoted_from_id: String,
    created_at: Option<String>,
    updated_at: Option<String>,
    archived_at: Option<String>,
    promoted_to_id: String,
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value.filter(|v| !v.is_empty())?;
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

pub(crate) fn timestamp(value: Option<DateTime<Utc>>) -> Value {
    value.map_or(Value::Null, |t| Value::String(t.to_rfc3339()))
}

/// Last segment of a resource name like `.../dataObjects/{id}`.
pub(crate) fn id_from_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Data payload for a knowledge record. `score` is never stored.
pub(crate) fn knowledge_data(k: &Knowledge) -> Value {
    json!({
        "id": k.id,
        "title": k.title,
        "content": k.content,
        "tags": k.tags,
        "user_id": k.user_id,
        "source": k.source.as_str(),
        "status": k.status.as_str(),
        "github_path": k.github_path,
        "pr_url": k.pr_url,
        "promoted_from_id": k.promoted_from_id,
        "created_at": timestamp(k.created_at),
        "updated_at": timestamp(k.updated_at),
    })
}

pub(crate) fn archived_data(a: &ArchivedKnowledge) -> Value {
    json!({
        "id": a.id,
        "title": a.title,
        "content": a.content,
        "tags": a.tags,
        "user_id": a.user_id,
        "source": a.source.as_str(),
        "status": a.status.as_str(),
        "github_path": a.github_path,
        "pr_url": a.pr_url,
        "promoted_from_id": a.promoted_from_id,
        "created_at": timestamp(a.created_at),
        "updated_at": timestamp(a.updated_at),
        "archived_at": timestamp(a.archived_at),
        "promoted_to_id": a.promoted_to_id,
    })
}

/// Decode a data object (`{"name": ..., "data": {...}}`).
///
/// The id falls back to the object name when the payload lacks one.
fn data_fields(object: &Value) -> Result<DataFields> {
    let data = object
        .get("data")
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));
    // Nulls are written for unset timestamps; treat them like missing keys.
    let data = match data {
        Value::Object(map) => Value::Object(map.into_iter().filter(|(_, v)| !v.is_null()).collect()),
        other => other,
    };
    let mut fields: DataFields = serde_json::from_value(data)?;
    if fields.id.is_empty() {
        if let Some(name) = object.get("name").and_then(Value::as_str) {
            fields.id = id_from_name(name).to_string();
        }
    }
    Ok(fields)
}

pub(crate) fn knowledge_from_object(object: &Value) -> Result<Knowledge> {
    let f = data_fields(object)?;
    Ok(Knowledge {
        id: f.id,
        title: f.title,
        content: f.content,
        tags: f.tags,
        user_id: f.user_id.unwrap_or_else(|| DEFAULT_USER_ID.to_string()),
        source: f.source.as_deref().map(str::parse).transpose()?.unwrap_or_default(),
        status: f.status.as_deref().map(str::parse).transpose()?.unwrap_or_default(),
        github_path: f.github_path,
        pr_url: f.pr_url,
        promoted_from_id: f.promoted_from_id,
        created_at: parse_timestamp(f.created_at.as_deref()),
        updated_at: parse_timestamp(f.updated_at.as_deref()),
        score: None,
    })
}

pub(crate) fn archived_from_object(object: &Value) -> Result<ArchivedKnowledge> {
    let f = data_fields(object)?;
    Ok(ArchivedKnowledge {
        id: f.id,
        title: f.title,
        content: f.content,
        tags: f.tags,
        user_id: f.user_id.unwrap_or_else(|| DEFAULT_USER_ID.to_string()),
        source: f.source.as_deref().map(str::parse).transpose()?.unwrap_or_default(),
        status: f.status.as_deref().map(str::parse).transpose()?.unwrap_or_default(),
        github_path: f.github_path,
        pr_url: f.pr_url,
        promoted_from_id: f.promoted_from_id,
        created_at: parse_timestamp(f.created_at.as_deref()),
        updated_at: parse_timestamp(f.updated_at.as_deref()),
        archived_at: parse_timestamp(f.archived_at.as_deref()),
        promoted_to_id: f.promoted_to_id,
    })
}
