//! Tag reference index.
//!
//! A tag document keeps one `<type>_id` array per resource type listing the
//! resources carrying it. Resources hold no back-reference, so "tags of a
//! resource" is a reverse scan over the tag collection.

use std::collections::HashSet;

use serde_json::Value;

use super::slug::slugify;
use super::store::{ArrayOp, ArrayOpKind, DocumentStore};
use crate::config::TagConflictPolicy;
use crate::errors::AppError;
use crate::models::{
    reference_field, Fields, Filter, ListOptions, SyncOutcome, Tag, UpdateTagRequest,
    TAG_COLLECTION,
};

const MAX_TYPE_LEN: usize = 64;

/// Tag persistence and tag-to-resource references.
#[derive(Clone)]
pub struct TagIndex {
    store: DocumentStore,
    conflict: TagConflictPolicy,
}

impl TagIndex {
    pub fn new(store: DocumentStore, conflict: TagConflictPolicy) -> Self {
        Self { store, conflict }
    }

    /// Create a tag whose id is the slug of `name`.
    pub async fn create_tag(&self, name: &str, description: Option<&str>) -> Result<Tag, AppError> {
        let name = require(name, "Tag name")?;
        let id = slugify(name);
        if id.is_empty() {
            return Err(AppError::Validation(
                "Tag name must contain at least one letter or digit".to_string(),
            ));
        }

        let mut fields = Fields::new();
        fields.insert("name".to_string(), Value::from(name));
        if let Some(description) = description.map(str::trim).filter(|d| !d.is_empty()) {
            fields.insert("description".to_string(), Value::from(description));
        }

        match self.store.create(TAG_COLLECTION, fields, Some(id.as_str())).await {
            Ok(doc) => {
                tracing::info!(tag = %doc.id, "tag created");
                Ok(Tag::from(doc))
            }
            Err(AppError::DuplicateId(_)) => match self.conflict {
                TagConflictPolicy::Reject => Err(AppError::TagAlreadyExists(format!(
                    "Tag {} already exists",
                    id
                ))),
                TagConflictPolicy::Reuse => self
                    .get_tag(&id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Tag {} not found", id))),
            },
            Err(e) => Err(e),
        }
    }

    /// Get a tag by id.
    pub async fn get_tag(&self, id: &str) -> Result<Option<Tag>, AppError> {
        Ok(self
            .store
            .get_by_id(TAG_COLLECTION, id)
            .await?
            .map(Tag::from))
    }

    /// Edit name and/or description. The id stays what it was at creation.
    pub async fn update_tag(&self, id: &str, request: &UpdateTagRequest) -> Result<bool, AppError> {
        let mut fields = Fields::new();
        if let Some(name) = &request.name {
            fields.insert(
                "name".to_string(),
                Value::from(require(name, "Tag name")?),
            );
        }
        if let Some(description) = &request.description {
            // Blank clears it; json_patch drops null members
            let description = match description.trim() {
                "" => Value::Null,
                trimmed => Value::from(trimmed),
            };
            fields.insert("description".to_string(), description);
        }

        self.store.update_by_id(TAG_COLLECTION, id, fields).await
    }

    /// Delete a tag. References held by it go with it; nothing else is touched.
    pub async fn delete_tag(&self, id: &str) -> Result<bool, AppError> {
        self.store.delete_by_id(TAG_COLLECTION, id).await
    }

    /// Newest tags first.
    pub async fn list_tags(&self, limit: i64) -> Result<Vec<Tag>, AppError> {
        let docs = self
            .store
            .list(TAG_COLLECTION, &ListOptions::newest(limit))
            .await?;
        Ok(docs.into_iter().map(Tag::from).collect())
    }

    /// Ids of `resource_type` carrying the tag; empty when tag or field is absent.
    pub async fn refer_ids(&self, tag_id: &str, resource_type: &str) -> Result<Vec<String>, AppError> {
        validate_resource_type(resource_type)?;
        Ok(self
            .get_tag(tag_id)
            .await?
            .map(|tag| tag.refer_ids(resource_type).to_vec())
            .unwrap_or_default())
    }

    /// Ids of every tag applied to one resource.
    pub async fn tag_ids_for_resource(
        &self,
        resource_id: &str,
        resource_type: &str,
    ) -> Result<Vec<String>, AppError> {
        validate_resource_type(resource_type)?;
        self.store
            .ids_containing(TAG_COLLECTION, &reference_field(resource_type), resource_id)
            .await
    }

    /// Link a resource to a tag. Returns `false` when the tag does not exist.
    pub async fn add_reference(
        &self,
        tag_id: &str,
        resource_type: &str,
        resource_id: &str,
    ) -> Result<bool, AppError> {
        let (tag_id, resource_id) = validate_reference(tag_id, resource_type, resource_id)?;
        self.store
            .add_to_set(TAG_COLLECTION, tag_id, &reference_field(resource_type), resource_id)
            .await
    }

    /// Unlink a resource from a tag. Returns `false` when the tag does not exist.
    pub async fn remove_reference(
        &self,
        tag_id: &str,
        resource_type: &str,
        resource_id: &str,
    ) -> Result<bool, AppError> {
        let (tag_id, resource_id) = validate_reference(tag_id, resource_type, resource_id)?;
        self.store
            .pull(TAG_COLLECTION, tag_id, &reference_field(resource_type), resource_id)
            .await
    }

    /// Make `desired` the exact tag set of one resource.
    ///
    /// The diff against the current reverse scan is applied in one
    /// transaction; a missing tag aborts the whole sync.
    pub async fn sync_references(
        &self,
        resource_id: &str,
        resource_type: &str,
        desired: &[String],
    ) -> Result<SyncOutcome, AppError> {
        validate_resource_type(resource_type)?;
        let resource_id = require(resource_id, "referId")?;

        let mut seen = HashSet::new();
        let desired: Vec<&str> = desired
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty() && seen.insert(*id))
            .collect();

        let current = self.tag_ids_for_resource(resource_id, resource_type).await?;

        let outcome = SyncOutcome {
            added: desired
                .iter()
                .filter(|id| !current.iter().any(|c| c.as_str() == **id))
                .map(|id| id.to_string())
                .collect(),
            removed: current
                .iter()
                .filter(|c| !desired.contains(&c.as_str()))
                .cloned()
                .collect(),
        };

        let field = reference_field(resource_type);
        let op = |tag_id: &String, kind| ArrayOp {
            id: tag_id.clone(),
            field: field.clone(),
            value: resource_id.to_string(),
            kind,
        };
        let ops: Vec<ArrayOp> = outcome
            .added
            .iter()
            .map(|id| op(id, ArrayOpKind::AddToSet))
            .chain(outcome.removed.iter().map(|id| op(id, ArrayOpKind::Pull)))
            .collect();

        if !ops.is_empty() {
            self.store
                .apply_array_ops(TAG_COLLECTION, &ops)
                .await
                .map_err(|e| match e {
                    AppError::NotFound(_) => {
                        AppError::NotFound("One or more tags not found".to_string())
                    }
                    other => other,
                })?;
        }

        tracing::info!(
            resource = resource_id,
            resource_type,
            added = outcome.added.len(),
            removed = outcome.removed.len(),
            "tag references synced"
        );
        Ok(outcome)
    }

    /// Ids of the same type sharing at least one tag with the resource.
    pub async fn related_ids(
        &self,
        resource_id: &str,
        resource_type: &str,
    ) -> Result<Vec<String>, AppError> {
        let tag_ids = self.tag_ids_for_resource(resource_id, resource_type).await?;
        if tag_ids.is_empty() {
            return Ok(Vec::new());
        }

        let tags = self
            .store
            .list(
                TAG_COLLECTION,
                &ListOptions {
                    filter: Filter::new().is_in("id", tag_ids),
                    ..ListOptions::default()
                },
            )
            .await?;

        let mut seen = HashSet::new();
        seen.insert(resource_id.to_string());
        Ok(tags
            .into_iter()
            .map(Tag::from)
            .flat_map(|tag| tag.refer_ids(resource_type).to_vec())
            .filter(|id| seen.insert(id.clone()))
            .collect())
    }
}

/// Resource types become field names, so they are restricted to `[a-z][a-z0-9_]*`.
pub fn validate_resource_type(resource_type: &str) -> Result<(), AppError> {
    let mut chars = resource_type.chars();
    let valid = resource_type.len() <= MAX_TYPE_LEN
        && chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if valid {
        Ok(())
    } else if resource_type.is_empty() {
        Err(AppError::Validation("type is required".to_string()))
    } else {
        Err(AppError::Validation(format!(
            "Invalid resource type: {:?}",
            resource_type
        )))
    }
}

fn require<'a>(value: &'a str, what: &str) -> Result<&'a str, AppError> {
    let value = value.trim();
    if value.is_empty() {
        Err(AppError::Validation(format!("{} is required", what)))
    } else {
        Ok(value)
    }
}

fn validate_reference<'a>(
    tag_id: &'a str,
    resource_type: &str,
    resource_id: &'a str,
) -> Result<(&'a str, &'a str), AppError> {
    let tag_id = require(tag_id, "tagId")?;
    validate_resource_type(resource_type)?;
    let resource_id = require(resource_id, "referId")?;
    Ok((tag_id, resource_id))
}
