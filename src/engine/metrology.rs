//! Metered readings and calibration traceability
//!
//! A reading is bound to the meter's calibration as it stands at capture
//! time. The calibration's expiry is copied onto the reading so it stays
//! interpretable after the meter is recalibrated. Stale or expiring
//! calibrations only produce warnings; missing identifiers are errors.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use super::{Engine, EngineError, Result, Warning};
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::store::SubmissionStore;
use crate::entities::{Answers, CalibrationState, FieldType, Reading};

/// A reading as submitted by the caller
#[derive(Debug, Clone, Default)]
pub struct ReadingCapture {
    pub instance_id: Option<EntityId>,
    pub meter_id: Option<EntityId>,
    pub calibration_id: Option<EntityId>,
    /// Field to record against; defaults to the template's first number field
    pub field_id: Option<String>,
    pub value: Value,
}

impl ReadingCapture {
    pub fn new(instance_id: EntityId, value: impl Into<Value>) -> Self {
        Self {
            instance_id: Some(instance_id),
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn meter(mut self, meter_id: EntityId) -> Self {
        self.meter_id = Some(meter_id);
        self
    }

    pub fn calibration(mut self, calibration_id: EntityId) -> Self {
        self.calibration_id = Some(calibration_id);
        self
    }

    pub fn field(mut self, field_id: impl Into<String>) -> Self {
        self.field_id = Some(field_id.into());
        self
    }
}

/// A stored reading with its advisory warnings
#[derive(Debug, Clone, Serialize)]
pub struct ReadingOutcome {
    pub reading: Reading,
    pub warnings: Vec<Warning>,
}

fn required<'c>(id: &'c Option<EntityId>, what: &str) -> Result<&'c EntityId> {
    id.as_ref()
        .ok_or_else(|| EngineError::Validation(format!("{} is required", what)))
}

impl<S: SubmissionStore> Engine<'_, S> {
    /// Record a metered value against an instance
    pub fn save_reading(&mut self, capture: ReadingCapture) -> Result<ReadingOutcome> {
        let instance_id = required(&capture.instance_id, "instance id")?;
        let meter_id = required(&capture.meter_id, "meter id")?;
        let calibration_id = required(&capture.calibration_id, "calibration id")?;

        let instance = self.instance(instance_id)?;
        let submission = self.submission(&instance.submission_id)?;
        self.ensure_writable(&submission)?;

        let form = self.form_for(&submission)?;
        let template = form
            .template(&instance.template_id)
            .ok_or_else(|| EngineError::not_found("template", &instance.template_id))?;
        let field = match &capture.field_id {
            Some(field_id) => template.field(field_id).ok_or_else(|| {
                EngineError::Validation(format!(
                    "'{}' is not a field of template '{}'",
                    field_id, template.title
                ))
            })?,
            None => template.primary_numeric_field().ok_or_else(|| {
                EngineError::Validation(format!(
                    "template '{}' has no number field to record a reading against",
                    template.title
                ))
            })?,
        };
        if field.field_type == FieldType::Text {
            return Err(EngineError::Validation(format!(
                "'{}' is a text field and cannot hold a reading",
                field.id
            )));
        }
        let mut incoming = Answers::new();
        incoming.insert(field.id.clone(), capture.value.clone());
        super::answers::validate_answers(template, &incoming)?;

        // Always re-resolve the meter: the caller's calibration may be stale
        let meter = self.meters.get_meter(meter_id)?;
        let active = meter.current_calibration().ok_or_else(|| {
            EngineError::Validation(format!(
                "{} has no active calibration",
                meter.identity()
            ))
        })?;
        if &active.id != calibration_id {
            return Err(EngineError::StaleCalibration {
                meter: meter.identity(),
                supplied: calibration_id.clone(),
                active: active.id.clone(),
            });
        }

        let now = Utc::now();
        let candidate = Reading {
            id: EntityId::new(EntityPrefix::Rdg),
            instance_id: instance.id.clone(),
            field_id: field.id.clone(),
            meter_id: meter.id.clone(),
            calibration_id: active.id.clone(),
            calibration_expires_at: active.expires_at,
            value: capture.value.clone(),
            captured_at: now,
            captured_by: Some(self.settings.operator.clone()),
        };
        // Mirror into answers so completeness and required checks see it
        let mut answers = instance.answers.clone();
        super::answers::merge_answers(&mut answers, &incoming);
        let reading = self.store.record_reading(&candidate, &answers)?;

        let mut warnings = Vec::new();
        match active.state_at(now, self.settings.calibration_warning_days) {
            CalibrationState::Expired => {
                log::warn!(
                    "reading {} captured with expired calibration {} of {}",
                    reading.id,
                    active.id,
                    meter.identity()
                );
                warnings.push(Warning::CalibrationExpired {
                    meter: meter.identity(),
                    expired_at: active.expires_at,
                });
            }
            CalibrationState::ExpiringSoon { days_left } => {
                warnings.push(Warning::CalibrationExpiringSoon {
                    meter: meter.identity(),
                    expires_at: active.expires_at,
                    days_left,
                });
            }
            CalibrationState::Valid => {}
        }

        log::debug!(
            "recorded {} = {} on {} with {}",
            reading.field_id,
            reading.value,
            reading.instance_id,
            reading.meter_id
        );
        Ok(ReadingOutcome { reading, warnings })
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::super::{EngineSettings, ErrorKind};
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::core::store::MemoryStore;
    use crate::entities::{Calibration, EntityInstance};
    use chrono::Duration;
    use serde_json::json;

    fn setup(meter_days: i64) -> (StaticCatalog, crate::entities::Meter) {
        let form = form(vec![circuit_template(), checklist_template()]);
        let meter = meter_expiring_in(meter_days);
        let catalog = catalog(&form, &[asset("DB-1")], &[meter.clone()]);
        (catalog, meter)
    }

    fn circuit_instance(engine: &mut Engine<'_, MemoryStore>) -> EntityInstance {
        let form_id = engine.templates.list_versions().unwrap()[0].id.clone();
        let sub = engine.start_submission(JOB, &form_id).unwrap();
        engine
            .instantiate(&sub.id)
            .unwrap()
            .instances
            .into_iter()
            .find(|i| i.asset_id.is_some())
            .unwrap()
    }

    #[test]
    fn test_missing_calibration_writes_nothing() {
        let (catalog, meter) = setup(200);
        let mut engine = Engine::with_catalog(MemoryStore::new(), &catalog);
        let inst = circuit_instance(&mut engine);

        let err = engine
            .save_reading(ReadingCapture::new(inst.id.clone(), 15).meter(meter.id.clone()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("calibration id"));

        let err = engine
            .save_reading(
                ReadingCapture::new(inst.id.clone(), 15)
                    .calibration(meter.active_calibration.clone().unwrap()),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert!(engine
            .store()
            .readings(&inst.submission_id)
            .unwrap()
            .is_empty());
        assert!(engine.instance(&inst.id).unwrap().answers.is_empty());
    }

    #[test]
    fn test_expired_calibration_warns_but_records() {
        init_logging();
        let (catalog, meter) = setup(-3);
        let mut engine = Engine::with_catalog(MemoryStore::new(), &catalog);
        let inst = circuit_instance(&mut engine);

        let outcome = engine
            .save_reading(
                ReadingCapture::new(inst.id.clone(), 15)
                    .meter(meter.id.clone())
                    .calibration(meter.active_calibration.clone().unwrap()),
            )
            .unwrap();

        assert_eq!(outcome.warnings.len(), 1);
        let text = outcome.warnings[0].to_string();
        assert!(text.contains("expired"));
        assert!(text.contains(&meter.identity()));
        assert_eq!(
            engine.store().readings(&inst.submission_id).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_expiring_soon_warning_respects_horizon() {
        let (catalog, meter) = setup(10);
        let capture = |inst: &EntityInstance| {
            ReadingCapture::new(inst.id.clone(), 12.5)
                .meter(meter.id.clone())
                .calibration(meter.active_calibration.clone().unwrap())
        };

        let mut engine = Engine::with_catalog(MemoryStore::new(), &catalog);
        let inst = circuit_instance(&mut engine);
        let outcome = engine.save_reading(capture(&inst)).unwrap();
        assert!(matches!(
            outcome.warnings.as_slice(),
            [Warning::CalibrationExpiringSoon { .. }]
        ));

        let mut engine = Engine::with_catalog(MemoryStore::new(), &catalog).settings(EngineSettings {
            calibration_warning_days: 0,
            ..EngineSettings::default()
        });
        let inst = circuit_instance(&mut engine);
        let outcome = engine.save_reading(capture(&inst)).unwrap();
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_snapshot_survives_recalibration() {
        let (mut catalog, meter) = setup(100);
        let old_cal = meter.active_calibration.clone().unwrap();
        let old_expiry = meter.current_calibration().unwrap().expires_at;

        let (inst, store) = {
            let mut engine = Engine::with_catalog(MemoryStore::new(), &catalog);
            let inst = circuit_instance(&mut engine);
            engine
                .save_reading(
                    ReadingCapture::new(inst.id.clone(), 14)
                        .meter(meter.id.clone())
                        .calibration(old_cal.clone()),
                )
                .unwrap();
            (inst, engine.into_store())
        };

        let mut recalibrated = meter.clone();
        let fresh = Calibration {
            id: EntityId::new(EntityPrefix::Cal),
            calibrated_at: Utc::now(),
            expires_at: Utc::now() + Duration::days(365),
            certificate: None,
        };
        recalibrated.active_calibration = Some(fresh.id.clone());
        recalibrated.calibrations.push(fresh.clone());
        catalog.replace_meter(recalibrated);

        let mut engine = Engine::with_catalog(store, &catalog);
        let readings = engine.store().readings(&inst.submission_id).unwrap();
        assert_eq!(readings[0].calibration_id, old_cal);
        assert_eq!(readings[0].calibration_expires_at, old_expiry);

        // a page still holding the old calibration is refused
        let err = engine
            .save_reading(
                ReadingCapture::new(inst.id.clone(), 16)
                    .meter(meter.id.clone())
                    .calibration(old_cal),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::StaleCalibration { .. }));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_recapture_overwrites_and_mirrors_answer() {
        let (catalog, meter) = setup(200);
        let mut engine = Engine::with_catalog(MemoryStore::new(), &catalog);
        let inst = circuit_instance(&mut engine);
        let capture = |value: f64| {
            ReadingCapture::new(inst.id.clone(), value)
                .meter(meter.id.clone())
                .calibration(meter.active_calibration.clone().unwrap())
                .field("ir")
        };

        let first = engine.save_reading(capture(9.0)).unwrap().reading;
        let second = engine.save_reading(capture(15.0)).unwrap().reading;
        assert_eq!(first.id, second.id);

        let readings = engine.store().readings(&inst.submission_id).unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].value, json!(15.0));
        assert_eq!(
            engine.instance(&inst.id).unwrap().answers.get("ir"),
            Some(&json!(15.0))
        );
    }

    #[test]
    fn test_unknown_meter_and_field() {
        let (catalog, meter) = setup(200);
        let mut engine = Engine::with_catalog(MemoryStore::new(), &catalog);
        let inst = circuit_instance(&mut engine);

        let err = engine
            .save_reading(
                ReadingCapture::new(inst.id.clone(), 15)
                    .meter(EntityId::new(EntityPrefix::Mtr))
                    .calibration(EntityId::new(EntityPrefix::Cal)),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = engine
            .save_reading(
                ReadingCapture::new(inst.id.clone(), 15)
                    .meter(meter.id.clone())
                    .calibration(meter.active_calibration.clone().unwrap())
                    .field("colour"),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_reading_respects_select_options() {
        let (catalog, meter) = setup(200);
        let mut engine = Engine::with_catalog(MemoryStore::new(), &catalog);
        let form_id = engine.templates.list_versions().unwrap()[0].id.clone();
        let sub = engine.start_submission(JOB, &form_id).unwrap();
        let checklist = engine
            .instantiate(&sub.id)
            .unwrap()
            .instances
            .into_iter()
            .find(|i| i.asset_id.is_none())
            .unwrap();
        let capture = |value: &str| {
            ReadingCapture::new(checklist.id.clone(), value)
                .meter(meter.id.clone())
                .calibration(meter.active_calibration.clone().unwrap())
                .field("earthing")
        };

        let err = engine.save_reading(capture("IT")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("TN-C-S"));
        assert!(engine.store().readings(&sub.id).unwrap().is_empty());
        assert!(engine.instance(&checklist.id).unwrap().answers.is_empty());

        engine.save_reading(capture("TT")).unwrap();
        assert_eq!(
            engine.instance(&checklist.id).unwrap().answers.get("earthing"),
            Some(&json!("TT"))
        );
    }
}
