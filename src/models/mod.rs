//! Data models for the portal backend.
//!
//! Field names on the wire are camelCase to match the admin UI.

mod document;
mod file;
mod resource;
mod tag;

pub use document::*;
pub use file::*;
pub use resource::*;
pub use tag::*;
