//! Generic document envelope and list query options.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form document body: field name to JSON value.
pub type Fields = Map<String, Value>;

/// Envelope keys owned by the store. Callers cannot set them through a payload.
pub const ENVELOPE_FIELDS: [&str; 3] = ["id", "createdAt", "updatedAt"];

/// One persisted record within a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Document {
    /// Borrow a string field.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Read an array field as strings, skipping non-string entries.
    pub fn string_array(&self, name: &str) -> Vec<String> {
        self.fields
            .get(name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Apply a projection, keeping the envelope intact.
    pub fn project(mut self, projection: &Projection) -> Self {
        match projection {
            Projection::All => {}
            Projection::Include(keep) => self.fields.retain(|k, _| keep.iter().any(|f| f == k)),
            Projection::Exclude(drop) => self.fields.retain(|k, _| !drop.iter().any(|f| f == k)),
        }
        self
    }
}

/// Remove store-owned keys from a caller payload.
pub fn strip_envelope(mut fields: Fields) -> Fields {
    for key in ENVELOPE_FIELDS {
        fields.remove(key);
    }
    fields
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    /// Parse a comma separated sort expression such as `-createdAt,title`.
    pub fn parse_list(expr: &str) -> Vec<SortKey> {
        expr.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| match part.strip_prefix('-') {
                Some(field) => SortKey::desc(field),
                None => SortKey::asc(part.trim_start_matches('+')),
            })
            .collect()
    }
}

/// A single predicate on a document field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field equals the value.
    Eq { field: String, value: Value },
    /// Field equals one of the values.
    In { field: String, values: Vec<Value> },
    /// Array field contains the value.
    Contains { field: String, value: Value },
}

impl Condition {
    pub fn field(&self) -> &str {
        match self {
            Condition::Eq { field, .. }
            | Condition::In { field, .. }
            | Condition::Contains { field, .. } => field,
        }
    }
}

/// Conjunction of conditions. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn is_in<V: Into<Value>>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.conditions.push(Condition::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn contains(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Contains {
            field: field.into(),
            value: value.into(),
        });
        self
    }
}

/// Which body fields a read returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    #[default]
    All,
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl Projection {
    pub fn exclude<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection::Exclude(fields.into_iter().map(Into::into).collect())
    }
}

/// Paging, ordering, filtering and projection for a list query.
#[derive(Debug, Clone, PartialEq)]
pub struct ListOptions {
    pub skip: i64,
    /// `None` returns every match.
    pub limit: Option<i64>,
    /// Empty means newest first.
    pub sort: Vec<SortKey>,
    pub filter: Filter,
    pub projection: Projection,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: None,
            sort: Vec::new(),
            filter: Filter::default(),
            projection: Projection::All,
        }
    }
}

impl ListOptions {
    pub fn newest(limit: i64) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }
}
