//! Catalog loading utilities
//!
//! Loads every file of one catalog kind, keeping parse failures alongside
//! the records so callers can decide whether a bad file is fatal.

use serde::de::DeserializeOwned;
use std::path::PathBuf;

use crate::core::project::{CatalogKind, Project};
use crate::yaml::{parse_yaml_file, YamlError};

/// Records of one catalog kind plus the files that failed to parse
#[derive(Debug)]
pub struct Loaded<T> {
    pub records: Vec<(PathBuf, T)>,
    pub failures: Vec<(PathBuf, YamlError)>,
}

impl<T> Default for Loaded<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<T> Loaded<T> {
    /// Drop paths and failures, keeping only the parsed records
    pub fn into_records(self) -> Vec<T> {
        self.records.into_iter().map(|(_, r)| r).collect()
    }
}

/// Load all records of type T from a project's catalog directory
pub fn load_all<T: DeserializeOwned>(project: &Project, kind: CatalogKind) -> Loaded<T> {
    let mut loaded = Loaded::default();

    for path in project.iter_catalog_files(kind) {
        match parse_yaml_file::<T>(&path) {
            Ok(record) => loaded.records.push((path, record)),
            Err(e) => {
                log::warn!("skipping {}: {}", path.display(), e);
                loaded.failures.push((path, e));
            }
        }
    }

    loaded
}

/// Find a record whose ID matches `query` exactly or by unique prefix
pub fn find_by_id<'a, T>(
    records: &'a [T],
    query: &str,
    id_of: impl Fn(&T) -> String,
) -> Option<&'a T> {
    if let Some(exact) = records.iter().find(|r| id_of(r) == query) {
        return Some(exact);
    }

    let query_upper = query.to_uppercase();
    let mut matches = records
        .iter()
        .filter(|r| id_of(r).to_uppercase().starts_with(&query_upper));
    let first = matches.next()?;
    if matches.next().is_some() {
        return None;
    }
    Some(first)
}
