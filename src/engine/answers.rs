//! Answer capture

use serde_json::Value;

use super::{Engine, EngineError, Result};
use crate::core::identity::EntityId;
use crate::core::store::SubmissionStore;
use crate::entities::submission::is_blank;
use crate::entities::{Answers, EntityInstance, EntityTemplate, FieldType};

/// Check that every key names a field and select values are among the options
pub(super) fn validate_answers(template: &EntityTemplate, answers: &Answers) -> Result<()> {
    for (field_id, value) in answers {
        let field = template.field(field_id).ok_or_else(|| {
            EngineError::Validation(format!(
                "'{}' is not a field of template '{}'",
                field_id, template.title
            ))
        })?;

        if field.field_type == FieldType::Select && !field.options.is_empty() && !is_blank(value) {
            let allowed = match value {
                Value::String(s) => field.options.iter().any(|o| o == s),
                _ => false,
            };
            if !allowed {
                return Err(EngineError::Validation(format!(
                    "{} is not an option of '{}' (expected one of: {})",
                    value,
                    field.id,
                    field.options.join(", ")
                )));
            }
        }
    }
    Ok(())
}

/// Merge `incoming` into `current`; null clears a field
pub(super) fn merge_answers(current: &mut Answers, incoming: &Answers) {
    for (field_id, value) in incoming {
        if value.is_null() {
            current.remove(field_id);
        } else {
            current.insert(field_id.clone(), value.clone());
        }
    }
}

impl<S: SubmissionStore> Engine<'_, S> {
    /// Write answers to an instance, field by field (last write wins)
    pub fn save_answers(
        &mut self,
        instance_id: &EntityId,
        answers: &Answers,
    ) -> Result<EntityInstance> {
        let mut instance = self.instance(instance_id)?;
        let submission = self.submission(&instance.submission_id)?;
        self.ensure_writable(&submission)?;

        let form = self.form_for(&submission)?;
        let template = form
            .template(&instance.template_id)
            .ok_or_else(|| EngineError::not_found("template", &instance.template_id))?;
        validate_answers(template, answers)?;

        merge_answers(&mut instance.answers, answers);
        self.store.save_answers(&instance.id, &instance.answers)?;
        log::debug!("saved {} answer(s) on {}", answers.len(), instance.id);

        self.instance(instance_id)
    }
}
