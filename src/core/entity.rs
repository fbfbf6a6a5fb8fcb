//! Entity trait - common interface for catalog and submission records

use serde::{de::DeserializeOwned, Serialize};

use crate::core::identity::EntityId;

/// Common trait for all FCT records that carry a prefixed identity
pub trait Entity: Serialize + DeserializeOwned {
    /// The record type prefix (e.g., "FORM", "MTR")
    const PREFIX: &'static str;

    /// Get the record's unique ID
    fn id(&self) -> &EntityId;

    /// Get a human-readable title
    fn title(&self) -> &str;
}
