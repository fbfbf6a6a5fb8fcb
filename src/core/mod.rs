//! Core module - fundamental types and utilities

pub mod config;
pub mod entity;
pub mod identity;
pub mod loader;
pub mod project;
pub mod store;

pub use config::{ComplianceConfig, Config};
pub use entity::Entity;
pub use identity::{EntityId, EntityPrefix, IdParseError};
pub use project::{CatalogKind, Project, ProjectError};
pub use store::{MemoryStore, SqliteStore, StoreError, SubmissionStore};
