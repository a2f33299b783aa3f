//! Generic CRUD endpoints for every portal resource kind.

use std::collections::HashMap;

use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::extract::{Json, Query};
use super::{created, error, page_limit, success, ApiResult};
use crate::db::slug::{slug_with_suffix, slugify};
use crate::db::{generate_id, validate_field_name};
use crate::errors::AppError;
use crate::models::{Document, Fields, Filter, ListOptions, MessageBody, ResourceKind, SortKey};
use crate::AppState;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

/// Payload key carrying the desired tag ids; applied to tags, never stored.
const TAG_IDS_FIELD: &str = "tagIds";
const SLUG_FIELD: &str = "slug";

/// One page of a resource listing.
#[derive(Debug, Serialize)]
pub struct ResourcePage {
    pub items: Vec<Document>,
    pub total: i64,
    pub skip: i64,
    pub limit: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct RelatedQuery {
    pub limit: Option<i64>,
}

/// GET /api/resources/{kind} - Page through a collection.
pub async fn list_resources(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<ResourcePage> {
    match list_page(&state, &kind, params).await {
        Ok(page) => success(page),
        Err(e) => error(e),
    }
}

/// POST /api/resources/{kind} - Create a resource.
pub async fn create_resource(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(payload): Json<Value>,
) -> ApiResult<Document> {
    match create_document(&state, &kind, payload).await {
        Ok(doc) => created(doc),
        Err(e) => error(e),
    }
}

/// GET /api/resources/{kind}/{id} - Get a resource by id.
pub async fn get_resource(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<Document> {
    let kind: ResourceKind = match kind.parse() {
        Ok(kind) => kind,
        Err(e) => return error(e),
    };

    match state.store.get_by_id(kind.collection(), &id).await {
        Ok(Some(doc)) => success(kind.present(doc)),
        Ok(None) => error(not_found(kind, &id)),
        Err(e) => error(e),
    }
}

/// GET /api/resources/{kind}/slug/{slug} - Get a resource by its slug.
pub async fn get_resource_by_slug(
    State(state): State<AppState>,
    Path((kind, slug)): Path<(String, String)>,
) -> ApiResult<Document> {
    let kind: ResourceKind = match kind.parse() {
        Ok(kind) => kind,
        Err(e) => return error(e),
    };

    match state.store.get_by_slug(kind.collection(), &slug).await {
        Ok(Some(doc)) => success(kind.present(doc)),
        Ok(None) => error(AppError::NotFound(format!(
            "No {} with slug {}",
            kind, slug
        ))),
        Err(e) => error(e),
    }
}

/// PUT /api/resources/{kind}/{id} - Merge changes into a resource.
pub async fn update_resource(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    Json(payload): Json<Value>,
) -> ApiResult<Document> {
    match update_document(&state, &kind, &id, payload).await {
        Ok(doc) => success(doc),
        Err(e) => error(e),
    }
}

/// DELETE /api/resources/{kind}/{id} - Delete a resource and unlink its tags.
pub async fn delete_resource(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<MessageBody> {
    let kind: ResourceKind = match kind.parse() {
        Ok(kind) => kind,
        Err(e) => return error(e),
    };

    match state.store.delete_by_id(kind.collection(), &id).await {
        Ok(true) => {}
        Ok(false) => return error(not_found(kind, &id)),
        Err(e) => return error(e),
    }

    if let Err(e) = state.tags.sync_references(&id, kind.as_str(), &[]).await {
        tracing::warn!("Failed to unlink tags of deleted {} {}: {}", kind, id, e);
    }

    tracing::info!(kind = %kind, id = %id, "resource deleted");
    success(MessageBody::new(format!("{} deleted", kind)))
}

/// GET /api/resources/{kind}/{id}/related - Resources sharing a tag with this one.
pub async fn related_resources(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    Query(query): Query<RelatedQuery>,
) -> ApiResult<Vec<Document>> {
    match related_documents(&state, &kind, &id, query).await {
        Ok(docs) => success(docs),
        Err(e) => error(e),
    }
}

async fn list_page(
    state: &AppState,
    kind: &str,
    params: HashMap<String, String>,
) -> Result<ResourcePage, AppError> {
    let kind: ResourceKind = kind.parse()?;
    let options = list_options(kind, params)?;

    let items = state.store.list(kind.collection(), &options).await?;
    let total = state.store.count(kind.collection(), &options.filter).await?;

    Ok(ResourcePage {
        items,
        total,
        skip: options.skip,
        limit: options.limit.unwrap_or(DEFAULT_PAGE_SIZE),
    })
}

/// Build list options from the query string: `skip`, `limit`, `sort`, and
/// equality filters for every other key.
fn list_options(
    kind: ResourceKind,
    params: HashMap<String, String>,
) -> Result<ListOptions, AppError> {
    let mut options = ListOptions {
        projection: kind.list_projection(),
        ..ListOptions::default()
    };
    let mut limit = None;

    for (key, value) in params {
        match key.as_str() {
            "skip" => options.skip = parse_number(&key, &value)?,
            "limit" => limit = Some(parse_number(&key, &value)?),
            "sort" => options.sort = SortKey::parse_list(&value),
            _ => {
                validate_field_name(&key)?;
                if kind.hides(&key) {
                    return Err(AppError::Validation(format!(
                        "Cannot filter {} by {}",
                        kind, key
                    )));
                }
                options.filter = options.filter.eq(key, value);
            }
        }
    }

    if options.skip < 0 {
        return Err(AppError::Validation("skip must not be negative".to_string()));
    }
    options.limit = Some(page_limit(limit, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE));
    Ok(options)
}

fn parse_number(key: &str, value: &str) -> Result<i64, AppError> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::Validation(format!("{} must be an integer", key)))
}

async fn create_document(
    state: &AppState,
    kind: &str,
    payload: Value,
) -> Result<Document, AppError> {
    let kind: ResourceKind = kind.parse()?;
    let mut fields = into_fields(payload)?;
    let tag_ids = take_tag_ids(&mut fields)?;
    normalize_slug(&mut fields)?;
    kind.validate_new(&fields)?;

    // The id is fixed up front so the slug can carry a fragment of it.
    let id = generate_id();
    if let Some(source) = kind.slug_source() {
        if !fields.contains_key(SLUG_FIELD) {
            let title = fields.get(source).and_then(Value::as_str).unwrap_or_default();
            let slug = slug_with_suffix(title, &id);
            fields.insert(SLUG_FIELD.to_string(), Value::from(slug));
        }
    }

    let doc = state
        .store
        .create(kind.collection(), fields, Some(id.as_str()))
        .await?;

    if let Some(tag_ids) = tag_ids.filter(|ids| !ids.is_empty()) {
        if let Err(e) = state.tags.sync_references(&doc.id, kind.as_str(), &tag_ids).await {
            if let Err(cleanup) = state.store.delete_by_id(kind.collection(), &doc.id).await {
                tracing::warn!("Failed to roll back {} {}: {}", kind, doc.id, cleanup);
            }
            return Err(e);
        }
    }

    tracing::info!(kind = %kind, id = %doc.id, "resource created");
    Ok(kind.present(doc))
}

async fn update_document(
    state: &AppState,
    kind: &str,
    id: &str,
    payload: Value,
) -> Result<Document, AppError> {
    let kind: ResourceKind = kind.parse()?;
    let mut fields = into_fields(payload)?;
    let tag_ids = take_tag_ids(&mut fields)?;
    normalize_slug(&mut fields)?;
    kind.validate_patch(&fields)?;

    if state.store.get_by_id(kind.collection(), id).await?.is_none() {
        return Err(not_found(kind, id));
    }

    // Tags first: a failed sync leaves the document untouched.
    if let Some(tag_ids) = tag_ids {
        state.tags.sync_references(id, kind.as_str(), &tag_ids).await?;
    }

    if !state.store.update_by_id(kind.collection(), id, fields).await? {
        return Err(not_found(kind, id));
    }

    state
        .store
        .get_by_id(kind.collection(), id)
        .await?
        .map(|doc| kind.present(doc))
        .ok_or_else(|| not_found(kind, id))
}

async fn related_documents(
    state: &AppState,
    kind: &str,
    id: &str,
    query: RelatedQuery,
) -> Result<Vec<Document>, AppError> {
    let kind: ResourceKind = kind.parse()?;
    if state.store.get_by_id(kind.collection(), id).await?.is_none() {
        return Err(not_found(kind, id));
    }

    let ids = state.tags.related_ids(id, kind.as_str()).await?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let options = ListOptions {
        limit: Some(page_limit(query.limit, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE)),
        filter: Filter::new().is_in("id", ids),
        projection: kind.list_projection(),
        ..ListOptions::default()
    };
    state.store.list(kind.collection(), &options).await
}

fn into_fields(payload: Value) -> Result<Fields, AppError> {
    match payload {
        Value::Object(fields) => Ok(fields),
        _ => Err(AppError::Validation(
            "Request body must be a JSON object".to_string(),
        )),
    }
}

/// Remove `tagIds` from the payload. `None` when absent or null.
fn take_tag_ids(fields: &mut Fields) -> Result<Option<Vec<String>>, AppError> {
    let invalid = || AppError::Validation(format!("{} must be an array of strings", TAG_IDS_FIELD));

    match fields.remove(TAG_IDS_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(id) => Ok(id),
                _ => Err(invalid()),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(invalid()),
    }
}

/// Caller-supplied slugs are normalized; one that normalizes to nothing is rejected.
fn normalize_slug(fields: &mut Fields) -> Result<(), AppError> {
    let Some(value) = fields.get_mut(SLUG_FIELD) else {
        return Ok(());
    };
    let slug = value.as_str().map(slugify).unwrap_or_default();
    if slug.is_empty() {
        return Err(AppError::Validation(
            "slug must contain at least one letter or digit".to_string(),
        ));
    }
    *value = Value::from(slug);
    Ok(())
}

fn not_found(kind: ResourceKind, id: &str) -> AppError {
    AppError::NotFound(format!("{} {} not found", kind, id))
}
