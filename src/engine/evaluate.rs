//! Pass/fail classification and aggregation
//!
//! Verdicts are never stored. They are recomputed from the current field
//! definition and the current value every time, so editing a threshold
//! after capture changes the verdict instead of leaving a stale one behind.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;

use crate::entities::submission::is_blank;
use crate::entities::{
    EntityInstance, FieldDefinition, FieldType, FormVersion, OverallResult, Reading, Verdict,
};

/// Classify a value against a field definition
pub fn classify(field: &FieldDefinition, value: &Value) -> Verdict {
    if is_blank(value) {
        return Verdict::NotApplicable;
    }

    match field.field_type {
        FieldType::PassFail => classify_pass_fail(value),
        FieldType::Number => match parse_number(value) {
            Some(number) => classify_number(field, number),
            None => Verdict::NotApplicable,
        },
        // Presence-only: no threshold concept for these types
        FieldType::Text | FieldType::Boolean | FieldType::Select => Verdict::Pass,
    }
}

fn classify_pass_fail(value: &Value) -> Verdict {
    match value {
        Value::Bool(true) => Verdict::Pass,
        Value::Bool(false) => Verdict::Fail,
        Value::String(s) if s == "pass" => Verdict::Pass,
        Value::String(s) if s == "fail" => Verdict::Fail,
        _ => Verdict::NotApplicable,
    }
}

/// Both bounds are inclusive; an absent bound is open
fn classify_number(field: &FieldDefinition, number: f64) -> Verdict {
    if let Some(upper) = field.fail_threshold {
        if number > upper {
            return Verdict::Fail;
        }
    }
    if let Some(lower) = field.pass_threshold {
        if number < lower {
            return Verdict::Fail;
        }
    }
    Verdict::Pass
}

/// Numeric value of a JSON number or numeric string; non-finite counts as unparsable
pub fn parse_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

/// Verdict counts for a submission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub pass_count: u32,
    pub fail_count: u32,
    pub na_count: u32,
}

impl Tally {
    pub fn add(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Pass => self.pass_count += 1,
            Verdict::Fail => self.fail_count += 1,
            Verdict::NotApplicable => self.na_count += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.pass_count + self.fail_count + self.na_count
    }

    /// FAIL if anything failed, else PASS if anything passed, else INCOMPLETE
    pub fn overall(&self) -> OverallResult {
        if self.fail_count > 0 {
            OverallResult::Fail
        } else if self.pass_count > 0 {
            OverallResult::Pass
        } else {
            OverallResult::Incomplete
        }
    }
}

impl FromIterator<Verdict> for Tally {
    fn from_iter<I: IntoIterator<Item = Verdict>>(iter: I) -> Self {
        let mut tally = Tally::default();
        for verdict in iter {
            tally.add(verdict);
        }
        tally
    }
}

/// One classified value, for display
#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedValue<'a> {
    pub instance: &'a EntityInstance,
    pub field: &'a FieldDefinition,
    pub value: &'a Value,
    pub verdict: Verdict,
}

/// Classify every reading plus every answered pass_fail field
///
/// A pass_fail answer that also has a reading is counted once, through the
/// reading. Readings whose field no longer exists on the template are N/A.
pub fn classified_values<'a>(
    form: &'a FormVersion,
    instances: &'a [EntityInstance],
    readings: &'a [Reading],
) -> Vec<ClassifiedValue<'a>> {
    classify_all(form, instances, readings).0
}

/// Classified values plus the number of readings that could not be bound
/// to an instance field
fn classify_all<'a>(
    form: &'a FormVersion,
    instances: &'a [EntityInstance],
    readings: &'a [Reading],
) -> (Vec<ClassifiedValue<'a>>, u32) {
    let by_id: HashMap<_, _> = instances.iter().map(|i| (&i.id, i)).collect();
    let mut out = Vec::new();
    let mut orphaned = 0;
    let mut read_fields = HashSet::new();

    for reading in readings {
        let Some(instance) = by_id.get(&reading.instance_id) else {
            orphaned += 1;
            continue;
        };
        read_fields.insert((&reading.instance_id, reading.field_id.as_str()));
        let field = form
            .template(&instance.template_id)
            .and_then(|t| t.field(&reading.field_id));
        match field {
            Some(field) => out.push(ClassifiedValue {
                instance,
                field,
                value: &reading.value,
                verdict: classify(field, &reading.value),
            }),
            None => {
                log::debug!(
                    "reading {} refers to unknown field '{}'",
                    reading.id,
                    reading.field_id
                );
                orphaned += 1;
            }
        }
    }

    for instance in instances {
        let Some(template) = form.template(&instance.template_id) else {
            continue;
        };
        for field in template
            .fields
            .iter()
            .filter(|f| f.field_type == FieldType::PassFail)
        {
            if read_fields.contains(&(&instance.id, field.id.as_str())) {
                continue;
            }
            if let Some(value) = instance.answer(&field.id) {
                out.push(ClassifiedValue {
                    instance,
                    field,
                    value,
                    verdict: classify(field, value),
                });
            }
        }
    }

    (out, orphaned)
}

/// Aggregate counts over readings and answered pass_fail fields
pub fn aggregate(form: &FormVersion, instances: &[EntityInstance], readings: &[Reading]) -> Tally {
    let (values, orphaned) = classify_all(form, instances, readings);
    let mut tally: Tally = values.into_iter().map(|c| c.verdict).collect();
    tally.na_count += orphaned;
    tally
}
