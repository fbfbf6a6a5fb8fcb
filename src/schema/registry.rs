//! Embedded JSON schemas for catalog files

use rust_embed::Embed;
use std::collections::HashMap;

use crate::core::project::CatalogKind;

#[derive(Embed)]
#[folder = "schemas/"]
struct EmbeddedSchemas;

/// JSON schema sources by catalog kind
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: HashMap<CatalogKind, String>,
}

impl SchemaRegistry {
    /// File name of the schema for a kind
    pub fn file_name(kind: CatalogKind) -> String {
        format!("{}.schema.json", kind.schema_name())
    }

    /// Schema source for a kind
    pub fn get(&self, kind: CatalogKind) -> Option<&str> {
        self.schemas.get(&kind).map(|s| s.as_str())
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        let mut schemas = HashMap::new();
        for kind in CatalogKind::all() {
            let name = Self::file_name(*kind);
            if let Some(file) = EmbeddedSchemas::get(&name) {
                match std::str::from_utf8(&file.data) {
                    Ok(text) => {
                        schemas.insert(*kind, text.to_string());
                    }
                    Err(e) => log::warn!("embedded schema {} is not UTF-8: {}", name, e),
                }
            }
        }
        Self { schemas }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_a_schema() {
        let registry = SchemaRegistry::default();
        for kind in CatalogKind::all() {
            let source = registry.get(*kind).unwrap();
            let json: serde_json::Value = serde_json::from_str(source).unwrap();
            assert_eq!(json["type"], "object");
        }
    }
}
