//! Local-disk storage for uploaded files.
//!
//! Blobs are written under a generated name; their metadata is a document in
//! the `file` collection, and the metadata id is what resources store.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::db::{generate_id, DocumentStore};
use crate::errors::AppError;
use crate::models::{Fields, FileMeta, FILE_COLLECTION};

/// Accepted content types and the extension stored files get.
const ALLOWED_TYPES: [(&str, &str); 5] = [
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("application/pdf", "pdf"),
];

const MAX_NAME_LEN: usize = 255;

/// File store rooted at the configured upload directory.
#[derive(Clone)]
pub struct FileStore {
    root: PathBuf,
    max_bytes: usize,
    store: DocumentStore,
}

impl FileStore {
    /// Create the upload directory if needed.
    pub async fn open(
        root: impl Into<PathBuf>,
        max_bytes: usize,
        store: DocumentStore,
    ) -> Result<Self, AppError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            max_bytes,
            store,
        })
    }

    /// Persist a blob and its metadata; returns the metadata.
    pub async fn save(
        &self,
        bytes: &[u8],
        content_type: &str,
        original_name: Option<&str>,
    ) -> Result<FileMeta, AppError> {
        if bytes.is_empty() {
            return Err(AppError::Validation("Uploaded file is empty".to_string()));
        }
        if bytes.len() > self.max_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "File exceeds the {} byte limit",
                self.max_bytes
            )));
        }
        let content_type = normalize_content_type(content_type);
        let extension = extension_for(&content_type).ok_or_else(|| {
            AppError::Validation(format!("Unsupported file type: {}", content_type))
        })?;

        let id = generate_id();
        let stored_name = format!("{}.{}", id, extension);
        let original_name = original_name
            .map(sanitize_name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| stored_name.clone());

        let path = self.root.join(&stored_name);
        tokio::fs::write(&path, bytes).await?;

        let mut fields = Fields::new();
        fields.insert("originalName".to_string(), Value::from(original_name));
        fields.insert("storedName".to_string(), Value::from(stored_name));
        fields.insert("contentType".to_string(), Value::from(content_type));
        fields.insert("size".to_string(), Value::from(bytes.len() as u64));

        match self.store.create(FILE_COLLECTION, fields, Some(id.as_str())).await {
            Ok(doc) => {
                tracing::info!(file = %doc.id, size = bytes.len(), "file stored");
                Ok(FileMeta::from(doc))
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&path).await {
                    tracing::warn!("Failed to remove orphaned upload {:?}: {}", path, cleanup);
                }
                Err(e)
            }
        }
    }

    /// Metadata of a stored file.
    pub async fn get(&self, id: &str) -> Result<Option<FileMeta>, AppError> {
        Ok(self
            .store
            .get_by_id(FILE_COLLECTION, id)
            .await?
            .map(FileMeta::from))
    }

    /// Metadata and content of a stored file.
    pub async fn read(&self, id: &str) -> Result<Option<(FileMeta, Vec<u8>)>, AppError> {
        let Some(meta) = self.get(id).await? else {
            return Ok(None);
        };
        let bytes = tokio::fs::read(self.blob_path(&meta)?).await?;
        Ok(Some((meta, bytes)))
    }

    /// Remove metadata and blob. Returns `false` when the id is unknown.
    pub async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let Some(meta) = self.get(id).await? else {
            return Ok(false);
        };
        let removed = self.store.delete_by_id(FILE_COLLECTION, id).await?;

        let path = self.blob_path(&meta)?;
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!("Failed to remove upload {:?}: {}", path, e);
        }
        Ok(removed)
    }

    fn blob_path(&self, meta: &FileMeta) -> Result<PathBuf, AppError> {
        // Stored names are generated, but metadata is editable through the store.
        let name = Path::new(&meta.stored_name);
        match name.file_name() {
            Some(file_name) if file_name == name.as_os_str() => Ok(self.root.join(file_name)),
            _ => Err(AppError::Storage(format!(
                "Invalid stored name for file {}",
                meta.id
            ))),
        }
    }
}

fn normalize_content_type(raw: &str) -> String {
    raw.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn extension_for(content_type: &str) -> Option<&'static str> {
    ALLOWED_TYPES
        .iter()
        .find(|(mime, _)| *mime == content_type)
        .map(|(_, ext)| *ext)
}

/// Keep only the final path component and drop control characters.
fn sanitize_name(raw: &str) -> String {
    raw.rsplit(&['/', '\\'][..])
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NAME_LEN)
        .collect::<String>()
        .trim()
        .to_string()
}
