//! Collection-agnostic document store.
//!
//! Every document lives in the single `documents` table keyed by
//! `(collection, id)`. Bodies are JSON text; field access, merge and array
//! mutation run inside SQLite through the JSON1 functions, so each operation is
//! one statement and atomic on its own.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::init_database;
use crate::errors::AppError;
use crate::models::{strip_envelope, Condition, Document, Fields, Filter, ListOptions, SortDirection};

const MAX_FIELD_NAME_LEN: usize = 64;

const SELECT_DOCUMENT: &str = "SELECT id, data, created_at, updated_at FROM documents";

/// Kind of in-place array mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayOpKind {
    /// Append the value unless already present.
    AddToSet,
    /// Remove every occurrence of the value.
    Pull,
}

/// One array mutation against one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayOp {
    pub id: String,
    pub field: String,
    pub value: String,
    pub kind: ArrayOpKind,
}

/// Document store over a SQLite pool.
///
/// Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (or create) the database at `db_path` and run migrations.
    pub async fn connect(db_path: &Path) -> Result<Self, AppError> {
        let pool = init_database(db_path).await?;
        Ok(Self::new(pool))
    }

    /// Wait for in-flight queries and close every connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Insert a document.
    ///
    /// `explicit_id` is used verbatim when given, otherwise a UUID v4 is
    /// generated. Envelope keys inside `payload` are ignored.
    pub async fn create(
        &self,
        collection: &str,
        payload: Fields,
        explicit_id: Option<&str>,
    ) -> Result<Document, AppError> {
        validate_field_name(collection)?;
        let id = match explicit_id.map(str::trim) {
            Some("") => return Err(AppError::Validation("Document id must not be empty".to_string())),
            Some(id) => id.to_string(),
            None => generate_id(),
        };

        let fields = strip_envelope(payload);
        let now = timestamp_now();
        let stamp = format_timestamp(&now);
        let data = serde_json::to_string(&fields)?;

        let result = sqlx::query(
            "INSERT INTO documents (collection, id, data, created_at, updated_at) VALUES (?, ?, ?, ?, ?) ON CONFLICT(collection, id) DO NOTHING",
        )
        .bind(collection)
        .bind(&id)
        .bind(&data)
        .bind(&stamp)
        .bind(&stamp)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::DuplicateId(format!(
                "Document {} already exists in {}",
                id, collection
            )));
        }

        tracing::debug!(collection, id = %id, "document created");

        Ok(Document {
            id,
            created_at: now,
            updated_at: now,
            fields,
        })
    }

    /// Get a document by id.
    pub async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>, AppError> {
        let row = sqlx::query(&format!("{} WHERE collection = ? AND id = ?", SELECT_DOCUMENT))
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(document_from_row).transpose()
    }

    /// Get a document by its `slug` field.
    pub async fn get_by_slug(
        &self,
        collection: &str,
        slug: &str,
    ) -> Result<Option<Document>, AppError> {
        let row = sqlx::query(&format!(
            "{} WHERE collection = ? AND json_extract(data, '$.slug') = ? ORDER BY created_at, rowid LIMIT 1",
            SELECT_DOCUMENT
        ))
        .bind(collection)
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(document_from_row).transpose()
    }

    /// Merge `partial` into a document (JSON merge-patch: `null` removes a field).
    ///
    /// Returns `false` when no document matched. `id` and `createdAt` never change.
    pub async fn update_by_id(
        &self,
        collection: &str,
        id: &str,
        partial: Fields,
    ) -> Result<bool, AppError> {
        let patch = serde_json::to_string(&strip_envelope(partial))?;
        let stamp = format_timestamp(&timestamp_now());

        let result = sqlx::query(
            "UPDATE documents SET data = json_patch(data, ?), updated_at = ? WHERE collection = ? AND id = ?",
        )
        .bind(&patch)
        .bind(&stamp)
        .bind(collection)
        .bind(id)
        .execute(&self.pool)
        .await?;

        let matched = result.rows_affected() > 0;
        tracing::debug!(collection, id, matched, "document updated");
        Ok(matched)
    }

    /// Delete a document. Returns `false` when nothing was removed.
    pub async fn delete_by_id(&self, collection: &str, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() > 0;
        tracing::debug!(collection, id, removed, "document deleted");
        Ok(removed)
    }

    /// List documents with paging, sorting, filtering and projection.
    pub async fn list(
        &self,
        collection: &str,
        options: &ListOptions,
    ) -> Result<Vec<Document>, AppError> {
        if options.skip < 0 || options.limit.is_some_and(|l| l < 0) {
            return Err(AppError::Validation(
                "skip and limit must not be negative".to_string(),
            ));
        }

        let mut qb = QueryBuilder::<Sqlite>::new(SELECT_DOCUMENT);
        push_where(&mut qb, collection, &options.filter)?;

        qb.push(" ORDER BY ");
        let tie_break = match options.sort.last() {
            None => {
                qb.push("created_at DESC, ");
                SortDirection::Desc
            }
            Some(last) => {
                for key in &options.sort {
                    qb.push(field_expr(&key.field)?);
                    qb.push(" ");
                    qb.push(key.direction.as_sql());
                    qb.push(", ");
                }
                last.direction
            }
        };
        qb.push("rowid ");
        qb.push(tie_break.as_sql());

        qb.push(" LIMIT ");
        qb.push_bind(options.limit.unwrap_or(-1));
        qb.push(" OFFSET ");
        qb.push_bind(options.skip);

        let rows = qb.build().fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| document_from_row(row).map(|doc| doc.project(&options.projection)))
            .collect()
    }

    /// Count documents matching `filter`.
    pub async fn count(&self, collection: &str, filter: &Filter) -> Result<i64, AppError> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS total FROM documents");
        push_where(&mut qb, collection, filter)?;
        let row = qb.build().fetch_one(&self.pool).await?;
        Ok(row.try_get("total")?)
    }

    /// Ids of documents whose array `field` contains `value`, newest first.
    pub async fn ids_containing(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<String>, AppError> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT id FROM documents");
        push_where(&mut qb, collection, &Filter::new().contains(field, value))?;
        qb.push(" ORDER BY created_at DESC, rowid DESC");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("id").map_err(AppError::from))
            .collect()
    }

    /// Atomically add `value` to the array `field` unless present.
    ///
    /// Returns `false` when the document does not exist.
    pub async fn add_to_set(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, AppError> {
        let op = ArrayOp {
            id: id.to_string(),
            field: field.to_string(),
            value: value.to_string(),
            kind: ArrayOpKind::AddToSet,
        };
        let mut conn = self.pool.acquire().await?;
        run_array_op(&mut conn, collection, &op).await
    }

    /// Atomically remove `value` from the array `field`.
    ///
    /// Returns `false` only when the document does not exist.
    pub async fn pull(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, AppError> {
        let op = ArrayOp {
            id: id.to_string(),
            field: field.to_string(),
            value: value.to_string(),
            kind: ArrayOpKind::Pull,
        };
        let mut conn = self.pool.acquire().await?;
        run_array_op(&mut conn, collection, &op).await
    }

    /// Apply several array mutations in one transaction.
    ///
    /// If any targeted document is missing nothing is applied.
    pub async fn apply_array_ops(&self, collection: &str, ops: &[ArrayOp]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        for op in ops {
            if !run_array_op(&mut tx, collection, op).await? {
                return Err(AppError::NotFound(format!(
                    "Document {} not found in {}",
                    op.id, collection
                )));
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

async fn run_array_op(
    conn: &mut SqliteConnection,
    collection: &str,
    op: &ArrayOp,
) -> Result<bool, AppError> {
    let path = json_path(&op.field)?;
    let stamp = format_timestamp(&timestamp_now());

    let sql = match op.kind {
        ArrayOpKind::AddToSet => {
            r#"UPDATE documents SET
                data = CASE
                    WHEN json_type(data, ?1) = 'array'
                        AND EXISTS (SELECT 1 FROM json_each(documents.data, ?1) WHERE json_each.value = ?2)
                    THEN data
                    ELSE json_set(
                        data,
                        ?1,
                        json_insert(
                            CASE WHEN json_type(data, ?1) = 'array' THEN json_extract(data, ?1) ELSE '[]' END,
                            '$[#]',
                            ?2
                        )
                    )
                END,
                updated_at = ?3
            WHERE collection = ?4 AND id = ?5"#
        }
        ArrayOpKind::Pull => {
            r#"UPDATE documents SET
                data = CASE
                    WHEN json_type(data, ?1) = 'array'
                    THEN json_set(
                        data,
                        ?1,
                        json((SELECT json_group_array(json_each.value)
                                FROM json_each(documents.data, ?1)
                               WHERE json_each.value IS NOT ?2))
                    )
                    ELSE data
                END,
                updated_at = ?3
            WHERE collection = ?4 AND id = ?5"#
        }
    };

    let result = sqlx::query(sql)
        .bind(&path)
        .bind(&op.value)
        .bind(&stamp)
        .bind(collection)
        .bind(&op.id)
        .execute(&mut *conn)
        .await?;

    let matched = result.rows_affected() > 0;
    tracing::debug!(collection, id = %op.id, field = %op.field, kind = ?op.kind, matched, "array op");
    Ok(matched)
}

/// Append `WHERE collection = ? AND <conditions>` to a query.
fn push_where(
    qb: &mut QueryBuilder<'_, Sqlite>,
    collection: &str,
    filter: &Filter,
) -> Result<(), AppError> {
    qb.push(" WHERE collection = ");
    qb.push_bind(collection.to_string());

    for condition in &filter.conditions {
        qb.push(" AND ");
        match condition {
            Condition::Eq { field, value } => {
                qb.push(field_expr(field)?);
                if value.is_null() {
                    qb.push(" IS NULL");
                } else {
                    qb.push(" = ");
                    push_scalar(qb, value)?;
                }
            }
            Condition::In { field, values } => {
                if values.is_empty() {
                    qb.push("0");
                    continue;
                }
                qb.push(field_expr(field)?);
                qb.push(" IN (");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        qb.push(", ");
                    }
                    push_scalar(qb, value)?;
                }
                qb.push(")");
            }
            Condition::Contains { field, value } => {
                let path = json_path(field)?;
                qb.push(format!(
                    "json_type(documents.data, '{path}') = 'array' AND EXISTS (SELECT 1 FROM json_each(documents.data, '{path}') WHERE json_each.value = "
                ));
                push_scalar(qb, value)?;
                qb.push(")");
            }
        }
        tracing::trace!(field = condition.field(), "filter condition");
    }

    Ok(())
}

fn push_scalar(qb: &mut QueryBuilder<'_, Sqlite>, value: &Value) -> Result<(), AppError> {
    match value {
        Value::String(s) => {
            qb.push_bind(s.clone());
        }
        Value::Bool(b) => {
            // json_extract yields 1/0 for JSON booleans
            qb.push_bind(i64::from(*b));
        }
        Value::Number(n) => match n.as_i64() {
            Some(i) => {
                qb.push_bind(i);
            }
            None => {
                qb.push_bind(n.as_f64().unwrap_or_default());
            }
        },
        Value::Null | Value::Array(_) | Value::Object(_) => {
            return Err(AppError::Validation(
                "Only string, number or boolean values can be compared".to_string(),
            ));
        }
    }
    Ok(())
}

/// SQL expression reading `field`: an envelope column or a JSON path.
fn field_expr(field: &str) -> Result<String, AppError> {
    Ok(match field {
        "id" => "id".to_string(),
        "createdAt" => "created_at".to_string(),
        "updatedAt" => "updated_at".to_string(),
        other => format!("json_extract(data, '{}')", json_path(other)?),
    })
}

fn json_path(field: &str) -> Result<String, AppError> {
    validate_field_name(field)?;
    Ok(format!("$.{}", field))
}

/// Accept identifiers only: `[A-Za-z_][A-Za-z0-9_]*`, at most 64 bytes.
pub fn validate_field_name(name: &str) -> Result<(), AppError> {
    let mut chars = name.chars();
    let valid = name.len() <= MAX_FIELD_NAME_LEN
        && chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(AppError::Validation(format!("Invalid field name: {:?}", name)))
    }
}

/// Fresh opaque document id.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current time at the precision timestamps are stored with.
fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

// Fixed width so text order equals time order.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AppError::Storage(format!("Corrupt timestamp {:?}: {}", raw, e)))
}

fn document_from_row(row: &SqliteRow) -> Result<Document, AppError> {
    let data: String = row.try_get("data")?;
    let fields: Fields = serde_json::from_str(&data)
        .map_err(|e| AppError::Storage(format!("Corrupt document body: {}", e)))?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Document {
        id: row.try_get("id")?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        fields,
    })
}
