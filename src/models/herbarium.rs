//! Typed views handed to callers of the directories.
//!
//! Rows from `db::models` carry raw type codes; these structs carry the
//! decoded enums and the composed greenhouse/plant views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::{self as dbm, actuator_codes, sensor_codes};
use crate::error::HerbariumError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    Moisture,
    Light,
    Tank,
}

impl SensorType {
    pub fn code(self) -> &'static str {
        match self {
            SensorType::Moisture => sensor_codes::MOISTURE,
            SensorType::Light => sensor_codes::LIGHT,
            SensorType::Tank => sensor_codes::TANK,
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            sensor_codes::MOISTURE => Some(SensorType::Moisture),
            sensor_codes::LIGHT => Some(SensorType::Light),
            sensor_codes::TANK => Some(SensorType::Tank),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorType {
    Valve,
    LightStrip,
    Pump,
}

impl ActuatorType {
    pub fn code(self) -> &'static str {
        match self {
            ActuatorType::Valve => actuator_codes::VALVE,
            ActuatorType::LightStrip => actuator_codes::LIGHT_STRIP,
            ActuatorType::Pump => actuator_codes::PUMP,
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            actuator_codes::VALVE => Some(ActuatorType::Valve),
            actuator_codes::LIGHT_STRIP => Some(ActuatorType::LightStrip),
            actuator_codes::PUMP => Some(ActuatorType::Pump),
            _ => None,
        }
    }
}

/// A sensor observation as submitted by a greenhouse, before it is tagged
/// with the greenhouse that reported it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingInput {
    #[serde(rename = "type")]
    pub kind: SensorType,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub plant: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorInput {
    #[serde(rename = "type")]
    pub kind: ActuatorType,
    pub status: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub plant: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub greenhouse: Uuid,
    pub plant: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: SensorType,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorState {
    pub greenhouse: Uuid,
    pub plant: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: ActuatorType,
    pub status: bool,
    pub timestamp: DateTime<Utc>,
}

impl TryFrom<dbm::SensorDataRow> for SensorReading {
    type Error = HerbariumError;

    fn try_from(row: dbm::SensorDataRow) -> Result<Self, Self::Error> {
        let kind = SensorType::from_code(&row.kind)
            .ok_or_else(|| HerbariumError::ConstraintViolation(format!("unknown sensor type code {:?}", row.kind)))?;
        Ok(SensorReading {
            greenhouse: row.greenhouse_uuid,
            plant: row.plant_uuid,
            kind,
            value: row.value,
            timestamp: row.timestamp,
        })
    }
}

impl TryFrom<dbm::ActuatorStateRow> for ActuatorState {
    type Error = HerbariumError;

    fn try_from(row: dbm::ActuatorStateRow) -> Result<Self, Self::Error> {
        let kind = ActuatorType::from_code(&row.kind)
            .ok_or_else(|| HerbariumError::ConstraintViolation(format!("unknown actuator type code {:?}", row.kind)))?;
        Ok(ActuatorState {
            greenhouse: row.greenhouse_uuid,
            plant: row.plant_uuid,
            kind,
            status: row.status,
            timestamp: row.timestamp,
        })
    }
}

impl ReadingInput {
    pub fn into_row(self, greenhouse: Uuid) -> dbm::NewSensorData {
        dbm::NewSensorData {
            greenhouse_uuid: greenhouse,
            kind: self.kind.code().to_string(),
            value: self.value,
            timestamp: self.timestamp,
            plant_uuid: self.plant,
        }
    }
}

impl ActuatorInput {
    pub fn into_row(self, greenhouse: Uuid) -> dbm::NewActuatorState {
        dbm::NewActuatorState {
            greenhouse_uuid: greenhouse,
            kind: self.kind.code().to_string(),
            status: self.status,
            timestamp: self.timestamp,
            plant_uuid: self.plant,
        }
    }
}

/// A plant with its type and the latest known sensor/actuator values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantView {
    pub uuid: Uuid,
    pub alias_of: Option<Uuid>,
    pub greenhouse: Uuid,
    pub position: i32,
    #[serde(rename = "type")]
    pub plant_type: dbm::PlantType,
    pub planted_at: DateTime<Utc>,
    pub override_moisture_goal: Option<f64>,
    pub override_light_exposure_min_duration: Option<f64>,
    /// Override when set, otherwise the plant type's goal.
    pub moisture_goal: f64,
    pub light_exposure_min_duration: f64,
    pub moisture_last_reading: Option<SensorReading>,
    /// Greenhouse-wide light sensor; identical for every plant of a greenhouse.
    pub light_last_reading: Option<SensorReading>,
    pub valve_status: Option<ActuatorState>,
    pub light_strip_status: Option<ActuatorState>,
    pub removed: bool,
    pub removed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct PlantEnrichment {
    pub moisture: Option<SensorReading>,
    pub light: Option<SensorReading>,
    pub valve: Option<ActuatorState>,
    pub light_strip: Option<ActuatorState>,
}

impl PlantView {
    pub fn compose(plant: dbm::Plant, plant_type: dbm::PlantType, enrichment: PlantEnrichment) -> Self {
        let moisture_goal = plant.override_moisture_goal.unwrap_or(plant_type.moisture_goal);
        let light_exposure_min_duration = plant
            .override_light_exposure_min_duration
            .unwrap_or(plant_type.light_exposure_min_duration);
        PlantView {
            uuid: plant.uuid,
            alias_of: plant.alias_of,
            greenhouse: plant.greenhouse_uuid,
            position: plant.position,
            plant_type,
            planted_at: plant.planted_at,
            override_moisture_goal: plant.override_moisture_goal,
            override_light_exposure_min_duration: plant.override_light_exposure_min_duration,
            moisture_goal,
            light_exposure_min_duration,
            moisture_last_reading: enrichment.moisture,
            light_last_reading: enrichment.light,
            valve_status: enrichment.valve,
            light_strip_status: enrichment.light_strip,
            removed: plant.removed,
            removed_at: plant.removed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GreenhouseView {
    pub uuid: Uuid,
    pub name: String,
    pub owner: String,
    pub plants: Vec<PlantView>,
    pub tank_level: Option<SensorReading>,
    /// Timestamp of the most recent reading, or `created_at` when none exists.
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl GreenhouseView {
    pub fn compose(
        row: dbm::Greenhouse,
        tank_level: Option<SensorReading>,
        last_reading_at: Option<DateTime<Utc>>,
        plants: Vec<PlantView>,
    ) -> Self {
        GreenhouseView {
            uuid: row.uuid,
            name: row.name,
            owner: row.user_uuid,
            plants,
            tank_level,
            last_seen: last_reading_at.unwrap_or(row.created_at),
            created_at: row.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn plant_type() -> dbm::PlantType {
        dbm::PlantType {
            id: 1,
            name: "default".to_string(),
            moisture_goal: 80.0,
            light_exposure_min_duration: 14.0,
            germination_time: 0,
            growing_time: 0,
        }
    }

    fn plant(override_moisture: Option<f64>, override_light: Option<f64>) -> dbm::Plant {
        dbm::Plant {
            uuid: Uuid::new_v4(),
            alias_of: None,
            greenhouse_uuid: Uuid::new_v4(),
            type_id: 1,
            position: 3,
            override_moisture_goal: override_moisture,
            override_light_exposure_min_duration: override_light,
            planted_at: Utc.with_ymd_and_hms(2024, 4, 1, 8, 0, 0).unwrap(),
            removed: false,
            removed_at: None,
        }
    }

    #[test]
    fn type_codes_match_check_constraints() {
        for kind in [SensorType::Moisture, SensorType::Light, SensorType::Tank] {
            assert_eq!(SensorType::from_code(kind.code()), Some(kind));
        }
        for kind in [ActuatorType::Valve, ActuatorType::LightStrip, ActuatorType::Pump] {
            assert_eq!(ActuatorType::from_code(kind.code()), Some(kind));
        }
        assert_eq!(SensorType::from_code("X"), None);
        assert_eq!(ActuatorType::from_code("M"), None);
    }

    #[test]
    fn unknown_code_in_row_is_a_constraint_violation() {
        let row = dbm::SensorDataRow {
            id: 1,
            greenhouse_uuid: Uuid::new_v4(),
            kind: "Q".to_string(),
            value: 1.0,
            timestamp: Utc::now(),
            plant_uuid: None,
        };
        let err = SensorReading::try_from(row).unwrap_err();
        assert!(matches!(err, HerbariumError::ConstraintViolation(_)));
    }

    #[test]
    fn effective_goals_prefer_overrides() {
        let view = PlantView::compose(plant(Some(55.0), None), plant_type(), PlantEnrichment::default());
        assert_eq!(view.moisture_goal, 55.0);
        assert_eq!(view.light_exposure_min_duration, 14.0);
        assert_eq!(view.override_light_exposure_min_duration, None);
    }

    #[test]
    fn last_seen_falls_back_to_creation_time() {
        let created_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let row = dbm::Greenhouse {
            uuid: Uuid::new_v4(),
            name: "Balcony".to_string(),
            user_uuid: "u1".to_string(),
            created_at,
        };
        let view = GreenhouseView::compose(row.clone(), None, None, Vec::new());
        assert_eq!(view.last_seen, created_at);
        assert!(view.tank_level.is_none());

        let later = created_at + chrono::Duration::hours(5);
        let view = GreenhouseView::compose(row, None, Some(later), Vec::new());
        assert_eq!(view.last_seen, later);
    }

    #[test]
    fn reading_input_uses_snake_case_type_names() {
        let json = r#"{"type":"tank","value":42.5,"timestamp":"2024-05-01T10:00:00Z"}"#;
        let input: ReadingInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.kind, SensorType::Tank);
        assert_eq!(input.plant, None);
        let row = input.into_row(Uuid::nil());
        assert_eq!(row.kind, "T");
    }
}
