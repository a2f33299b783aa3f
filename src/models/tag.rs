//! Tag model and the request shapes of the tag endpoints.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Document;

/// Collection holding tag documents.
pub const TAG_COLLECTION: &str = "tag";

/// Suffix of the per-type reference arrays stored on a tag.
const REFERENCE_SUFFIX: &str = "_id";

/// Name of the array field that holds references of `resource_type`.
pub fn reference_field(resource_type: &str) -> String {
    format!("{}{}", resource_type, REFERENCE_SUFFIX)
}

/// A tag whose id is the slug of its name, fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Reference arrays keyed by their stored field name (`news_id`, `device_id`, ...).
    #[serde(flatten)]
    pub references: BTreeMap<String, Vec<String>>,
}

impl Tag {
    /// Ids of `resource_type` carrying this tag.
    pub fn refer_ids(&self, resource_type: &str) -> &[String] {
        self.references
            .get(&reference_field(resource_type))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl From<Document> for Tag {
    fn from(doc: Document) -> Self {
        let references = doc
            .fields
            .keys()
            .filter(|k| k.ends_with(REFERENCE_SUFFIX) && doc.fields[k.as_str()].is_array())
            .map(|k| (k.clone(), doc.string_array(k)))
            .collect();

        Tag {
            name: doc.str_field("name").unwrap_or_default().to_string(),
            description: doc.str_field("description").map(str::to_string),
            id: doc.id,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
            references,
        }
    }
}

/// Request body for creating a new tag.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTagRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Request body for updating an existing tag.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTagRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Request body for linking a resource to a tag.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddReferenceRequest {
    #[serde(default)]
    pub tag_id: String,
    #[serde(default, rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub refer_id: String,
}

/// Request body for unlinking a resource; the tag comes from the path.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveReferenceRequest {
    #[serde(default, rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub refer_id: String,
}

/// Request body for replacing the full tag set of one resource.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReferencesRequest {
    #[serde(default, rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub refer_id: String,
    #[serde(default)]
    pub tag_ids: Vec<String>,
}

/// Query of `GET /api/tags`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagQuery {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub resource_type: Option<String>,
    pub limit: Option<i64>,
}

/// Query of `GET /api/tag-references`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagLookupQuery {
    #[serde(default, rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub refer_id: String,
}

/// Result of reconciling one resource's tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// Plain `{ message }` payload.
#[derive(Debug, Clone, Serialize)]
pub struct MessageBody {
    pub message: String,
}

impl MessageBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
