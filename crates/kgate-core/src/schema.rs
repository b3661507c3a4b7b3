//! Collection schemas for the managed vector-search backend.
//!
//! Describes the data fields of the `knowledge` and `archived-knowledge`
//! collections and the auto-embedding attached to the searchable one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Name of the vector field semantic search runs against.
pub const EMBEDDING_FIELD: &str = "content_embedding";

/// Field types supported in collection data schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    #[serde(rename = "string[]")]
    StringArray,
}

impl FieldType {
    fn json_schema(self) -> Value {
        match self {
            Self::String => json!({"type": "string"}),
            Self::StringArray => json!({"type": "array", "items": {"type": "string"}}),
        }
    }
}

/// Server-side embedding generated from record text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingSpec {
    pub field: String,
    pub dimensions: u32,
    pub model_id: String,
    /// Template over data fields, e.g. `"{title} {content}"`.
    pub text_template: String,
    pub task_type: String,
}

impl Default for EmbeddingSpec {
    fn default() -> Self {
        Self {
            field: EMBEDDING_FIELD.to_string(),
            dimensions: 768,
            model_id: "gemini-embedding-001".to_string(),
            text_template: "{title} {content}".to_string(),
            task_type: "RETRIEVAL_DOCUMENT".to_string(),
        }
    }
}

/// A collection definition: data fields plus an optional embedding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub fields: BTreeMap<String, FieldType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<EmbeddingSpec>,
}

const KNOWLEDGE_FIELDS: &[(&str, FieldType)] = &[
    ("id", FieldType::String),
    ("title", FieldType::String),
    ("content", FieldType::String),
    ("tags", FieldType::StringArray),
    ("user_id", FieldType::String),
    ("source", FieldType::String),
    ("status", FieldType::String),
    ("github_path", FieldType::String),
    ("pr_url", FieldType::String),
    ("promoted_from_id", FieldType::String),
    ("created_at", FieldType::String),
    ("updated_at", FieldType::String),
];

impl CollectionSchema {
    /// Searchable collection holding active knowledge.
    #[must_use]
    pub fn knowledge(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Self::field_map(KNOWLEDGE_FIELDS),
            embedding: Some(EmbeddingSpec::default()),
        }
    }

    /// Audit collection for promotion snapshots. Not embedded, not searchable.
    #[must_use]
    pub fn archived_knowledge(name: impl Into<String>) -> Self {
        let mut fields = Self::field_map(KNOWLEDGE_FIELDS);
        fields.insert("archived_at".to_string(), FieldType::String);
        fields.insert("promoted_to_id".to_string(), FieldType::String);
        Self {
            name: name.into(),
            fields,
            embedding: None,
        }
    }

    /// Field names in schema order, for search `outputFields`.
    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    /// JSON Schema object describing the data fields.
    #[must_use]
    pub fn data_schema(&self) -> Value {
        let properties: serde_json::Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, ty)| (name.clone(), ty.json_schema()))
            .collect();
        json!({"type": "object", "properties": properties})
    }

    /// Vector schema with the auto-embedding config, if this collection has one.
    #[must_use]
    pub fn vector_schema(&self) -> Option<Value> {
        self.embedding.as_ref().map(|e| {
            let mut vectors = serde_json::Map::new();
            vectors.insert(
                e.field.clone(),
                json!({
                    "denseVector": {
                        "dimensions": e.dimensions,
                        "vertexEmbeddingConfig": {
                            "modelId": e.model_id,
                            "textTemplate": e.text_template,
                            "taskType": e.task_type,
                        }
                    }
                }),
            );
            Value::Object(vectors)
        })
    }

    fn field_map(fields: &[(&str, FieldType)]) -> BTreeMap<String, FieldType> {
        fields
            .iter()
            .map(|(name, ty)| ((*name).to_string(), *ty))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn knowledge_schema_covers_every_stored_field() {
        let schema = CollectionSchema::knowledge("knowledge");
        let data = schema.data_schema();
        let props = data["properties"].as_object().unwrap();

        for field in ["id", "title", "content", "status", "github_path", "pr_url", "promoted_from_id"] {
            assert!(props.contains_key(field), "missing {field}");
        }
        assert_eq!(props["tags"]["type"], "array");
        assert!(!props.contains_key("score"));
    }

    #[test]
    fn knowledge_schema_embeds_title_and_content() {
        let vectors = CollectionSchema::knowledge("knowledge").vector_schema().unwrap();
        let config = &vectors[EMBEDDING_FIELD]["denseVector"];
        assert_eq!(config["dimensions"], 768);
        assert_eq!(config["vertexEmbeddingConfig"]["textTemplate"], "{title} {content}");
    }

    #[test]
    fn archive_schema_has_no_embedding() {
        let schema = CollectionSchema::archived_knowledge("archived-knowledge");
        assert!(schema.vector_schema().is_none());
        assert!(schema.fields.contains_key("promoted_to_id"));
        assert!(schema.fields.contains_key("archived_at"));
    }

    #[test]
    fn string_array_field_type_wire_name() {
        let json = serde_json::to_string(&FieldType::StringArray).unwrap();
        assert_eq!(json, "\"string[]\"");
    }
}
