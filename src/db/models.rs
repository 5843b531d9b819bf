//! Diesel model structs for the directory tables and the sensor/actuator logs.
//!
//! Sensor and actuator type codes are stored as single characters; see
//! [`sensor_codes`] and [`actuator_codes`]. The conversion to the typed enums
//! lives in `models::herbarium`.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema;

// Values accepted by the `sensors_data.type` check constraint.
pub mod sensor_codes {
    pub const MOISTURE: &str = "M";
    pub const LIGHT: &str = "L";
    pub const TANK: &str = "T";
}

// Values accepted by the `actuators_state.type` check constraint.
pub mod actuator_codes {
    pub const VALVE: &str = "V";
    pub const LIGHT_STRIP: &str = "L";
    pub const PUMP: &str = "P";
}

pub const DEFAULT_PLANT_TYPE_ID: i32 = 1;
pub const DEFAULT_PLANT_TYPE_NAME: &str = "default";
pub const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::users)]
#[diesel(primary_key(uuid))]
pub struct User {
    pub uuid: String,
    pub display_name: String,
    pub email: String,
    pub language: String,
    pub joined_on: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::users)]
pub struct NewUser {
    pub uuid: String,
    pub display_name: String,
    pub email: String,
    pub language: String,
    pub joined_on: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::greenhouses)]
#[diesel(primary_key(uuid))]
#[diesel(belongs_to(User, foreign_key = user_uuid))]
pub struct Greenhouse {
    pub uuid: Uuid,
    pub name: String,
    pub user_uuid: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::greenhouses)]
pub struct NewGreenhouse {
    pub uuid: Uuid,
    pub name: String,
    pub user_uuid: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::plant_types)]
pub struct PlantType {
    pub id: i32,
    pub name: String,
    pub moisture_goal: f64,
    pub light_exposure_min_duration: f64,
    pub germination_time: i32,
    pub growing_time: i32,
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::plant_types)]
pub struct NewPlantType {
    pub name: String,
    pub moisture_goal: f64,
    pub light_exposure_min_duration: f64,
    pub germination_time: i32,
    pub growing_time: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::plants)]
#[diesel(primary_key(uuid))]
#[diesel(belongs_to(Greenhouse, foreign_key = greenhouse_uuid))]
#[diesel(belongs_to(PlantType, foreign_key = type_id))]
pub struct Plant {
    pub uuid: Uuid,
    /// Identifier the plant was known under before a re-registration.
    pub alias_of: Option<Uuid>,
    pub greenhouse_uuid: Uuid,
    pub type_id: i32,
    pub position: i32,
    pub override_moisture_goal: Option<f64>,
    pub override_light_exposure_min_duration: Option<f64>,
    pub planted_at: DateTime<Utc>,
    pub removed: bool,
    pub removed_at: Option<DateTime<Utc>>,
}

// `type`, overrides and removal columns take their table defaults.
#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::plants)]
pub struct NewPlant {
    pub uuid: Uuid,
    pub greenhouse_uuid: Uuid,
    pub position: i32,
    pub planted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = schema::plants)]
#[diesel(treat_none_as_null = true)]
pub struct PlantChangeset {
    pub type_id: i32,
    pub override_moisture_goal: Option<f64>,
    pub override_light_exposure_min_duration: Option<f64>,
}

// Append-only log: sensors_data
#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::sensors_data)]
#[diesel(belongs_to(Greenhouse, foreign_key = greenhouse_uuid))]
pub struct SensorDataRow {
    pub id: i64,
    pub greenhouse_uuid: Uuid,
    pub kind: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub plant_uuid: Option<Uuid>,
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::sensors_data)]
pub struct NewSensorData {
    pub greenhouse_uuid: Uuid,
    pub kind: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub plant_uuid: Option<Uuid>,
}

// Append-only log: actuators_state
#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::actuators_state)]
#[diesel(belongs_to(Greenhouse, foreign_key = greenhouse_uuid))]
pub struct ActuatorStateRow {
    pub id: i64,
    pub greenhouse_uuid: Uuid,
    pub kind: String,
    pub status: bool,
    pub timestamp: DateTime<Utc>,
    pub plant_uuid: Option<Uuid>,
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::actuators_state)]
pub struct NewActuatorState {
    pub greenhouse_uuid: Uuid,
    pub kind: String,
    pub status: bool,
    pub timestamp: DateTime<Utc>,
    pub plant_uuid: Option<Uuid>,
}
