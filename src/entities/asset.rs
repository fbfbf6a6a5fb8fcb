//! Assets and jobs as seen by the compliance core
//!
//! Both are owned by the surrounding CRM; the core only reads them through
//! the asset directory.

use serde::{Deserialize, Serialize};

use crate::core::entity::Entity;
use crate::core::identity::EntityId;

/// A physical asset that can be tested
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: EntityId,

    /// Operator-facing label (e.g. "DB-2 Circuit 4")
    pub label: String,

    /// Where the asset is, within its site
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Site the asset is installed at
    pub site: String,
}

impl Entity for Asset {
    const PREFIX: &'static str = "AST";

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn title(&self) -> &str {
        &self.label
    }
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} ({})", self.label, location),
            None => write!(f, "{}", self.label),
        }
    }
}

/// A CRM job: a visit to a site during which tests are performed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Job reference as issued by the CRM (e.g. "J-1042")
    pub id: String,

    pub title: String,

    /// Site the job is carried out at
    pub site: String,

    /// Restrict the job to these assets; empty means every asset on the site
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<EntityId>,
}

impl Job {
    /// Whether the asset falls within this job's scope
    pub fn covers(&self, asset: &Asset) -> bool {
        asset.site == self.site && (self.assets.is_empty() || self.assets.contains(&asset.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::EntityPrefix;

    fn asset(site: &str) -> Asset {
        Asset {
            id: EntityId::new(EntityPrefix::Ast),
            label: "Fire panel".to_string(),
            location: Some("Plant room".to_string()),
            site: site.to_string(),
        }
    }

    #[test]
    fn test_job_covers_site_assets() {
        let a = asset("north-depot");
        let job = Job {
            id: "J-1".to_string(),
            title: "Annual".to_string(),
            site: "north-depot".to_string(),
            assets: vec![],
        };
        assert!(job.covers(&a));
        assert!(!job.covers(&asset("south-depot")));
    }

    #[test]
    fn test_job_asset_restriction() {
        let a = asset("north-depot");
        let b = asset("north-depot");
        let job = Job {
            id: "J-2".to_string(),
            title: "Remedial".to_string(),
            site: "north-depot".to_string(),
            assets: vec![a.id.clone()],
        };
        assert!(job.covers(&a));
        assert!(!job.covers(&b));
    }

    #[test]
    fn test_asset_display() {
        assert_eq!(asset("s").to_string(), "Fire panel (Plant room)");
    }
}
