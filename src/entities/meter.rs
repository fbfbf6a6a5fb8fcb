//! Test meters and their calibration history

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::Entity;
use crate::core::identity::EntityId;

/// A time-bounded certification of a meter's accuracy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calibration {
    pub id: EntityId,

    pub calibrated_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,

    /// Certificate number or document reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
}

/// Where a calibration stands at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    Valid,
    /// Still valid but expires within the warning horizon
    ExpiringSoon { days_left: i64 },
    Expired,
}

impl Calibration {
    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        self.expires_at < at
    }

    /// Classify against `at`, warning `horizon_days` ahead of expiry (0 disables)
    pub fn state_at(&self, at: DateTime<Utc>, horizon_days: i64) -> CalibrationState {
        if self.is_expired_at(at) {
            return CalibrationState::Expired;
        }
        if horizon_days > 0 && self.expires_at < at + Duration::days(horizon_days) {
            return CalibrationState::ExpiringSoon {
                days_left: (self.expires_at - at).num_days(),
            };
        }
        CalibrationState::Valid
    }
}

/// A test instrument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meter {
    pub id: EntityId,

    pub name: String,

    pub serial_number: String,

    /// The calibration currently in force
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_calibration: Option<EntityId>,

    /// All calibrations, including historical ones
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub calibrations: Vec<Calibration>,
}

impl Entity for Meter {
    const PREFIX: &'static str = "MTR";

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn title(&self) -> &str {
        &self.name
    }
}

impl Meter {
    /// The calibration currently in force, if any
    pub fn current_calibration(&self) -> Option<&Calibration> {
        let active = self.active_calibration.as_ref()?;
        self.calibrations.iter().find(|c| &c.id == active)
    }

    /// Look up any calibration (current or historical)
    pub fn calibration(&self, id: &EntityId) -> Option<&Calibration> {
        self.calibrations.iter().find(|c| &c.id == id)
    }

    /// Name plus serial, used in operator-facing messages
    pub fn identity(&self) -> String {
        format!("{} (s/n {})", self.name, self.serial_number)
    }
}
