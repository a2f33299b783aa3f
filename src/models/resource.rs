//! Resource kinds served by the portal and their per-kind policies.

use std::fmt;
use std::str::FromStr;

use super::{Document, Projection};
use crate::errors::AppError;

/// A collection of portal content addressed through `/api/resources/{kind}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Account,
    Party,
    News,
    Course,
    Device,
    Publication,
    Message,
    Dataset,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 8] = [
        ResourceKind::Account,
        ResourceKind::Party,
        ResourceKind::News,
        ResourceKind::Course,
        ResourceKind::Device,
        ResourceKind::Publication,
        ResourceKind::Message,
        ResourceKind::Dataset,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Account => "account",
            ResourceKind::Party => "party",
            ResourceKind::News => "news",
            ResourceKind::Course => "course",
            ResourceKind::Device => "device",
            ResourceKind::Publication => "publication",
            ResourceKind::Message => "message",
            ResourceKind::Dataset => "dataset",
        }
    }

    /// Collection name; also the reference type used on tags.
    pub fn collection(&self) -> &'static str {
        self.as_str()
    }

    /// Fields that must be non-empty strings on create.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::Account => &["username"],
            ResourceKind::Party | ResourceKind::Device | ResourceKind::Dataset => &["name"],
            ResourceKind::News | ResourceKind::Course | ResourceKind::Publication => &["title"],
            ResourceKind::Message => &["email", "content"],
        }
    }

    /// Field a slug is derived from, for kinds exposed under a readable path.
    pub fn slug_source(&self) -> Option<&'static str> {
        match self {
            ResourceKind::News | ResourceKind::Course | ResourceKind::Publication => Some("title"),
            ResourceKind::Device => Some("name"),
            _ => None,
        }
    }

    /// Projection applied to list views.
    pub fn list_projection(&self) -> Projection {
        match self {
            ResourceKind::Account => Projection::exclude(["password"]),
            ResourceKind::News
            | ResourceKind::Course
            | ResourceKind::Device
            | ResourceKind::Publication => Projection::exclude(["content"]),
            _ => Projection::All,
        }
    }

    /// Projection applied to single-document reads.
    pub fn detail_projection(&self) -> Projection {
        match self {
            ResourceKind::Account => Projection::exclude(["password"]),
            _ => Projection::All,
        }
    }

    /// Whether `field` is withheld from every read of this kind.
    pub fn hides(&self, field: &str) -> bool {
        matches!(self.detail_projection(), Projection::Exclude(hidden) if hidden.iter().any(|h| h == field))
    }

    /// Check that every required field is present and non-blank.
    pub fn validate_new(&self, fields: &super::Fields) -> Result<(), AppError> {
        for name in self.required_fields() {
            let present = fields
                .get(*name)
                .and_then(|v| v.as_str())
                .is_some_and(|s| !s.trim().is_empty());
            if !present {
                return Err(AppError::Validation(format!(
                    "Field '{}' is required for {}",
                    name,
                    self.as_str()
                )));
            }
        }
        Ok(())
    }

    /// A partial update may omit required fields but must not blank them.
    pub fn validate_patch(&self, fields: &super::Fields) -> Result<(), AppError> {
        for name in self.required_fields() {
            let Some(value) = fields.get(*name) else {
                continue;
            };
            if !value.as_str().is_some_and(|s| !s.trim().is_empty()) {
                return Err(AppError::Validation(format!(
                    "Field '{}' cannot be empty for {}",
                    name,
                    self.as_str()
                )));
            }
        }
        Ok(())
    }

    /// Strip fields that must never leave the server for this kind.
    pub fn present(&self, doc: Document) -> Document {
        doc.project(&self.detail_projection())
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| AppError::NotFound(format!("Unknown resource kind: {}", s)))
    }
}
