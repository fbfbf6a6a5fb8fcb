//! Submission records: the test session, its entity instances and readings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::core::entity::Entity;
use crate::core::identity::{EntityId, EntityPrefix};

/// Field answers of one instance, keyed by field id
pub type Answers = BTreeMap<String, Value>;

/// Lifecycle state of a submission
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    /// Created, no instances yet
    #[default]
    Draft,
    /// Instances exist; answers and readings may be written
    Active,
    /// Finalised; read-only
    Submitted,
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmissionStatus::Draft => write!(f, "draft"),
            SubmissionStatus::Active => write!(f, "active"),
            SubmissionStatus::Submitted => write!(f, "submitted"),
        }
    }
}

impl std::str::FromStr for SubmissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(SubmissionStatus::Draft),
            "active" => Ok(SubmissionStatus::Active),
            "submitted" => Ok(SubmissionStatus::Submitted),
            _ => Err(format!("Unknown submission status: {}", s)),
        }
    }
}

/// Classification of a single captured value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
    #[serde(rename = "not_applicable")]
    NotApplicable,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Pass => write!(f, "pass"),
            Verdict::Fail => write!(f, "fail"),
            Verdict::NotApplicable => write!(f, "n/a"),
        }
    }
}

/// Submission-level rollup of all classified values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallResult {
    Pass,
    Fail,
    /// Nothing classifiable has been captured yet
    Incomplete,
}

impl std::fmt::Display for OverallResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverallResult::Pass => write!(f, "PASS"),
            OverallResult::Fail => write!(f, "FAIL"),
            OverallResult::Incomplete => write!(f, "INCOMPLETE"),
        }
    }
}

/// One test session for a (job, form version) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: EntityId,

    /// CRM job the session belongs to
    pub job_id: String,

    pub form_version_id: EntityId,

    #[serde(default)]
    pub status: SubmissionStatus,

    /// Final aggregates; zero until submitted
    #[serde(default)]
    pub pass_count: u32,

    #[serde(default)]
    pub fail_count: u32,

    #[serde(default)]
    pub na_count: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_result: Option<OverallResult>,

    pub created: DateTime<Utc>,

    /// Who started the session
    pub author: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_by: Option<String>,

    /// SHA-256 over the sealed instances and readings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_digest: Option<String>,
}

impl Entity for Submission {
    const PREFIX: &'static str = "SUB";

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn title(&self) -> &str {
        &self.job_id
    }
}

impl Submission {
    /// Create a new draft submission
    pub fn new(job_id: impl Into<String>, form_version_id: EntityId, author: String) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Sub),
            job_id: job_id.into(),
            form_version_id,
            status: SubmissionStatus::Draft,
            pass_count: 0,
            fail_count: 0,
            na_count: 0,
            overall_result: None,
            created: Utc::now(),
            author,
            submitted_at: None,
            submitted_by: None,
            record_digest: None,
        }
    }

    pub fn is_submitted(&self) -> bool {
        self.status == SubmissionStatus::Submitted
    }
}

/// True when a value carries no operator input
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// One concrete occurrence of a template within a submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityInstance {
    pub id: EntityId,

    pub submission_id: EntityId,

    pub template_id: EntityId,

    /// Absent for general (non-repeating) instances
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<EntityId>,

    #[serde(default)]
    pub answers: Answers,

    pub updated: DateTime<Utc>,
}

impl EntityInstance {
    pub fn new(submission_id: EntityId, template_id: EntityId, asset_id: Option<EntityId>) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Inst),
            submission_id,
            template_id,
            asset_id,
            answers: Answers::new(),
            updated: Utc::now(),
        }
    }

    pub fn key(&self) -> InstanceKey {
        InstanceKey {
            template_id: self.template_id.clone(),
            asset_id: self.asset_id.clone(),
        }
    }

    /// Whether any answer carries operator input
    pub fn has_answers(&self) -> bool {
        self.answers.values().any(|v| !is_blank(v))
    }

    /// Answer for a field, treating blanks as missing
    pub fn answer(&self, field_id: &str) -> Option<&Value> {
        self.answers.get(field_id).filter(|v| !is_blank(v))
    }
}

/// Composite key identifying an instance within one submission
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceKey {
    pub template_id: EntityId,
    pub asset_id: Option<EntityId>,
}

impl InstanceKey {
    pub fn general(template_id: EntityId) -> Self {
        Self {
            template_id,
            asset_id: None,
        }
    }

    pub fn for_asset(template_id: EntityId, asset_id: EntityId) -> Self {
        Self {
            template_id,
            asset_id: Some(asset_id),
        }
    }
}

/// Instances of a submission indexed by their composite key
///
/// The instances live in an arena; the key map points into it so lookups
/// by (template, asset) stay constant time as asset counts grow.
#[derive(Debug, Default)]
pub struct InstanceIndex {
    arena: Vec<EntityInstance>,
    by_key: HashMap<InstanceKey, usize>,
}

impl InstanceIndex {
    pub fn new(instances: Vec<EntityInstance>) -> Self {
        let mut index = Self::default();
        for instance in instances {
            index.insert(instance);
        }
        index
    }

    /// Insert an instance unless its key is taken; returns the stored instance
    pub fn insert(&mut self, instance: EntityInstance) -> &EntityInstance {
        let key = instance.key();
        let slot = match self.by_key.get(&key) {
            Some(&slot) => slot,
            None => {
                self.arena.push(instance);
                let slot = self.arena.len() - 1;
                self.by_key.insert(key, slot);
                slot
            }
        };
        &self.arena[slot]
    }

    pub fn get(&self, key: &InstanceKey) -> Option<&EntityInstance> {
        self.by_key.get(key).map(|&slot| &self.arena[slot])
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityInstance> {
        self.arena.iter()
    }

    pub fn into_vec(self) -> Vec<EntityInstance> {
        self.arena
    }
}

/// A metered value tied to a meter and a calibration snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: EntityId,

    pub instance_id: EntityId,

    /// Field of the instance's template this reading answers
    pub field_id: String,

    pub meter_id: EntityId,

    /// Calibration bound at capture time; never re-resolved
    pub calibration_id: EntityId,

    /// Expiry of the bound calibration, as it stood at capture time
    pub calibration_expires_at: DateTime<Utc>,

    /// Raw value as entered
    pub value: Value,

    pub captured_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_submission_starts_as_draft() {
        let form = EntityId::new(EntityPrefix::Form);
        let sub = Submission::new("J-1042", form.clone(), "sam".to_string());
        assert!(sub.id.to_string().starts_with("SUB-"));
        assert_eq!(sub.status, SubmissionStatus::Draft);
        assert_eq!(sub.form_version_id, form);
        assert!(sub.overall_result.is_none());
        assert!(!sub.is_submitted());
    }

    #[test]
    fn test_status_serialization() {
        let mut sub = Submission::new("J-1", EntityId::new(EntityPrefix::Form), "a".to_string());
        sub.status = SubmissionStatus::Submitted;
        sub.overall_result = Some(OverallResult::Incomplete);
        let yaml = serde_yml::to_string(&sub).unwrap();
        assert!(yaml.contains("status: submitted"));
        assert!(yaml.contains("overall_result: incomplete"));
    }

    #[test]
    fn test_blank_values() {
        assert!(is_blank(&Value::Null));
        assert!(is_blank(&json!("   ")));
        assert!(is_blank(&json!([])));
        assert!(!is_blank(&json!(0)));
        assert!(!is_blank(&json!(false)));
        assert!(!is_blank(&json!("x")));
    }

    #[test]
    fn test_has_answers_ignores_blanks() {
        let mut inst = EntityInstance::new(
            EntityId::new(EntityPrefix::Sub),
            EntityId::new(EntityPrefix::Tmpl),
            None,
        );
        assert!(!inst.has_answers());
        inst.answers.insert("note".to_string(), json!(""));
        assert!(!inst.has_answers());
        assert!(inst.answer("note").is_none());
        inst.answers.insert("ok".to_string(), json!(true));
        assert!(inst.has_answers());
    }

    #[test]
    fn test_index_collapses_duplicate_keys() {
        let sub = EntityId::new(EntityPrefix::Sub);
        let tmpl = EntityId::new(EntityPrefix::Tmpl);
        let asset = EntityId::new(EntityPrefix::Ast);

        let first = EntityInstance::new(sub.clone(), tmpl.clone(), Some(asset.clone()));
        let second = EntityInstance::new(sub.clone(), tmpl.clone(), Some(asset.clone()));
        let general = EntityInstance::new(sub, tmpl.clone(), None);

        let mut index = InstanceIndex::default();
        let first_id = index.insert(first).id.clone();
        let kept = index.insert(second).id.clone();
        index.insert(general);

        assert_eq!(first_id, kept);
        assert_eq!(index.len(), 2);
        assert!(index
            .get(&InstanceKey::for_asset(tmpl.clone(), asset))
            .is_some());
        assert!(index.get(&InstanceKey::general(tmpl)).is_some());
    }
}
