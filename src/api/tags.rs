//! Tag API endpoints.

use axum::extract::{Path, State};
use serde::Serialize;

use super::extract::{Json, Query};
use super::{created, error, page_limit, success, ApiResult};
use crate::errors::AppError;
use crate::models::{
    AddReferenceRequest, CreateTagRequest, MessageBody, RemoveReferenceRequest, SyncOutcome,
    SyncReferencesRequest, Tag, TagLookupQuery, TagQuery, UpdateTagRequest,
};
use crate::AppState;

const DEFAULT_TAG_LIMIT: i64 = 100;
const MAX_TAG_LIMIT: i64 = 1000;

/// Payload of `GET /api/tags`, depending on the query.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum TagListing {
    All(Vec<Tag>),
    One(Tag),
    ReferIds(Vec<String>),
}

/// GET /api/tags - List tags, fetch one (`id`), or its references of one `type`.
pub async fn get_tags(
    State(state): State<AppState>,
    Query(query): Query<TagQuery>,
) -> ApiResult<TagListing> {
    match (query.id.as_deref(), query.resource_type.as_deref()) {
        (Some(id), Some(resource_type)) => match state.tags.refer_ids(id, resource_type).await {
            Ok(ids) => success(TagListing::ReferIds(ids)),
            Err(e) => error(e),
        },
        (Some(id), None) => match state.tags.get_tag(id).await {
            Ok(Some(tag)) => success(TagListing::One(tag)),
            Ok(None) => error(AppError::NotFound(format!("Tag {} not found", id))),
            Err(e) => error(e),
        },
        (None, Some(_)) => error(AppError::Validation(
            "id is required when type is given".to_string(),
        )),
        (None, None) => {
            let limit = page_limit(query.limit, DEFAULT_TAG_LIMIT, MAX_TAG_LIMIT);
            match state.tags.list_tags(limit).await {
                Ok(tags) => success(TagListing::All(tags)),
                Err(e) => error(e),
            }
        }
    }
}

/// POST /api/tags - Create a tag keyed by the slug of its name.
pub async fn create_tag(
    State(state): State<AppState>,
    Json(request): Json<CreateTagRequest>,
) -> ApiResult<Tag> {
    match state
        .tags
        .create_tag(&request.name, request.description.as_deref())
        .await
    {
        Ok(tag) => created(tag),
        Err(e) => error(e),
    }
}

/// PUT /api/tags/{id} - Rename or re-describe a tag.
pub async fn update_tag(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateTagRequest>,
) -> ApiResult<Tag> {
    match state.tags.update_tag(&id, &request).await {
        Ok(true) => {}
        Ok(false) => return error(AppError::NotFound(format!("Tag {} not found", id))),
        Err(e) => return error(e),
    }

    match state.tags.get_tag(&id).await {
        Ok(Some(tag)) => success(tag),
        Ok(None) => error(AppError::NotFound(format!("Tag {} not found", id))),
        Err(e) => error(e),
    }
}

/// DELETE /api/tags/{id} - Delete a tag.
pub async fn delete_tag(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<MessageBody> {
    match state.tags.delete_tag(&id).await {
        Ok(true) => {
            tracing::info!(tag = %id, "tag deleted");
            success(MessageBody::new("Tag deleted"))
        }
        Ok(false) => error(AppError::NotFound(format!("Tag {} not found", id))),
        Err(e) => error(e),
    }
}

/// POST /api/tag-references - Link a resource to a tag.
pub async fn add_reference(
    State(state): State<AppState>,
    Json(request): Json<AddReferenceRequest>,
) -> ApiResult<MessageBody> {
    match state
        .tags
        .add_reference(&request.tag_id, &request.resource_type, &request.refer_id)
        .await
    {
        Ok(true) => success(MessageBody::new("Reference added")),
        Ok(false) => error(AppError::NotFound(format!(
            "Tag {} not found",
            request.tag_id
        ))),
        Err(e) => error(e),
    }
}

/// DELETE /api/tags/{id}/references - Unlink a resource from a tag.
pub async fn remove_reference(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RemoveReferenceRequest>,
) -> ApiResult<MessageBody> {
    match state
        .tags
        .remove_reference(&id, &request.resource_type, &request.refer_id)
        .await
    {
        Ok(true) => success(MessageBody::new("Reference removed")),
        Ok(false) => error(AppError::NotFound(format!("Tag {} not found", id))),
        Err(e) => error(e),
    }
}

/// GET /api/tag-references - Ids of the tags applied to one resource.
pub async fn lookup_tags(
    State(state): State<AppState>,
    Query(query): Query<TagLookupQuery>,
) -> ApiResult<Vec<String>> {
    if query.refer_id.trim().is_empty() {
        return error(AppError::Validation("referId is required".to_string()));
    }

    match state
        .tags
        .tag_ids_for_resource(query.refer_id.trim(), &query.resource_type)
        .await
    {
        Ok(ids) => success(ids),
        Err(e) => error(e),
    }
}

/// PUT /api/tag-references - Replace the full tag set of one resource.
pub async fn sync_tags(
    State(state): State<AppState>,
    Json(request): Json<SyncReferencesRequest>,
) -> ApiResult<SyncOutcome> {
    match state
        .tags
        .sync_references(&request.refer_id, &request.resource_type, &request.tag_ids)
        .await
    {
        Ok(outcome) => success(outcome),
        Err(e) => error(e),
    }
}
