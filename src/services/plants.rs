//! Plants and plant types.
//!
//! A plant occupies one position of a greenhouse until it is removed. Removal
//! is a one-way soft delete: the row stays, `removed` is set and the position
//! becomes free again. Plants may carry a prior identifier (`alias_of`); every
//! lookup by id accepts either.

use crate::db::models::{
    DEFAULT_PLANT_TYPE_ID, DEFAULT_PLANT_TYPE_NAME, NewPlant, NewPlantType, Plant, PlantChangeset, PlantType,
};
use crate::db::pool::Database;
use crate::error::{HerbariumError, Result};
use crate::models::herbarium::{ActuatorType, PlantEnrichment, PlantView, SensorType};
use crate::schema;
use crate::services::{timeseries, users};
use chrono::{DateTime, Utc};
use diesel::PgConnection;
use diesel::prelude::*;
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

pub const MOISTURE_GOAL_RANGE: (f64, f64) = (0.0, 100.0);
pub const LIGHT_EXPOSURE_RANGE: (f64, f64) = (0.0, 24.0);
pub const MAX_PLANT_TYPE_NAME_LEN: usize = 512;

fn check_range(field: &str, value: Option<f64>, (min, max): (f64, f64)) -> Result<()> {
    match value {
        Some(v) if !(min..=max).contains(&v) => Err(HerbariumError::ConstraintViolation(format!(
            "{field} must be within {min}..={max}, got {v}"
        ))),
        _ => Ok(()),
    }
}

/// Reject override values the table check constraints would refuse anyway.
pub fn validate_overrides(moisture_goal: Option<f64>, light_exposure_min_duration: Option<f64>) -> Result<()> {
    check_range("moisture goal", moisture_goal, MOISTURE_GOAL_RANGE)?;
    check_range("light exposure minimum", light_exposure_min_duration, LIGHT_EXPOSURE_RANGE)
}

/// Optional attributes of a new plant type; unset fields take table defaults.
#[derive(Debug, Clone, Default)]
pub struct PlantTypeSpec {
    pub name: String,
    pub moisture_goal: Option<f64>,
    pub light_exposure_min_duration: Option<f64>,
    pub germination_time: Option<i32>,
    pub growing_time: Option<i32>,
}

impl PlantTypeSpec {
    pub fn into_row(self) -> Result<NewPlantType> {
        users::check_length("plant type name", &self.name, MAX_PLANT_TYPE_NAME_LEN)?;
        validate_overrides(self.moisture_goal, self.light_exposure_min_duration)?;
        let germination_time = self.germination_time.unwrap_or(0);
        let growing_time = self.growing_time.unwrap_or(0);
        if germination_time < 0 || growing_time < 0 {
            return Err(HerbariumError::ConstraintViolation(
                "germination and growing times must not be negative".to_string(),
            ));
        }
        Ok(NewPlantType {
            name: self.name,
            moisture_goal: self.moisture_goal.unwrap_or(80.0),
            light_exposure_min_duration: self.light_exposure_min_duration.unwrap_or(14.0),
            germination_time,
            growing_time,
        })
    }
}

/// Insert the `default` plant type (id 1) when it is missing.
pub fn ensure_default_plant_type(conn: &mut PgConnection) -> Result<bool> {
    use schema::plant_types::dsl as T;

    let inserted = diesel::insert_into(T::plant_types)
        .values((
            T::id.eq(DEFAULT_PLANT_TYPE_ID),
            T::name.eq(DEFAULT_PLANT_TYPE_NAME),
        ))
        .on_conflict(T::id)
        .do_nothing()
        .execute(conn)?;

    // An explicit id does not advance the serial sequence.
    diesel::sql_query(
        "SELECT setval(pg_get_serial_sequence('plant_types', 'id'), \
         GREATEST((SELECT MAX(id) FROM plant_types), 1))",
    )
    .execute(conn)?;

    Ok(inserted > 0)
}

pub fn list_plant_types(conn: &mut PgConnection) -> Result<Vec<PlantType>> {
    use schema::plant_types::dsl as T;

    Ok(T::plant_types
        .select(PlantType::as_select())
        .order(T::id.asc())
        .load(conn)?)
}

pub fn get_plant_type(conn: &mut PgConnection, id: i32) -> Result<PlantType> {
    use schema::plant_types::dsl as T;

    T::plant_types
        .find(id)
        .select(PlantType::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| HerbariumError::not_found(format!("plant type {id}")))
}

pub fn add_plant_type(conn: &mut PgConnection, spec: PlantTypeSpec) -> Result<i32> {
    use schema::plant_types::dsl as T;

    let row = spec.into_row()?;
    let id = diesel::insert_into(T::plant_types)
        .values(&row)
        .returning(T::id)
        .get_result(conn)?;
    info!("Plant type {} ({}) created", id, row.name);
    Ok(id)
}

/// Find a plant by id or by its prior identifier.
pub fn find_plant(conn: &mut PgConnection, id: Uuid) -> Result<Option<Plant>> {
    use schema::plants::dsl as P;

    let matches: Vec<Plant> = P::plants
        .filter(P::uuid.eq(id).or(P::alias_of.eq(id)))
        .select(Plant::as_select())
        .load(conn)?;
    let exact = matches.iter().position(|p| p.uuid == id);
    Ok(match exact {
        Some(index) => matches.into_iter().nth(index),
        None => matches.into_iter().next(),
    })
}

fn require_plant(conn: &mut PgConnection, id: Uuid) -> Result<Plant> {
    find_plant(conn, id)?.ok_or_else(|| HerbariumError::not_found(format!("plant {id}")))
}

pub fn exists(conn: &mut PgConnection, id: Uuid) -> Result<bool> {
    Ok(find_plant(conn, id)?.is_some())
}

/// Return the ids from `ids` that match no plant (optionally within `greenhouse`).
pub fn exists_batch(conn: &mut PgConnection, ids: &[Uuid], greenhouse: Option<Uuid>) -> Result<Vec<Uuid>> {
    use schema::plants::dsl as P;

    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut query = P::plants
        .filter(P::uuid.eq_any(ids.to_vec()).or(P::alias_of.eq_any(ids.to_vec())))
        .select((P::uuid, P::alias_of))
        .into_boxed();
    if let Some(greenhouse) = greenhouse {
        query = query.filter(P::greenhouse_uuid.eq(greenhouse));
    }

    let found: Vec<(Uuid, Option<Uuid>)> = query.load(conn)?;
    let known: HashSet<Uuid> = found
        .into_iter()
        .flat_map(|(uuid, alias)| std::iter::once(uuid).chain(alias))
        .collect();
    Ok(ids.iter().copied().filter(|id| !known.contains(id)).collect())
}

/// True iff no active plant sits at `position` in `greenhouse`.
pub fn position_free(conn: &mut PgConnection, greenhouse: Uuid, position: i32) -> Result<bool> {
    use schema::plants::dsl as P;

    let occupied: i64 = P::plants
        .filter(P::greenhouse_uuid.eq(greenhouse))
        .filter(P::position.eq(position))
        .filter(P::removed.eq(false))
        .count()
        .get_result(conn)?;
    Ok(occupied == 0)
}

pub fn add_plant(conn: &mut PgConnection, greenhouse: Uuid, position: i32, planted_at: DateTime<Utc>) -> Result<Uuid> {
    if !crate::services::greenhouses::exists(conn, greenhouse)? {
        return Err(HerbariumError::not_found(format!("greenhouse {greenhouse}")));
    }
    if !position_free(conn, greenhouse, position)? {
        return Err(HerbariumError::PositionOccupied { greenhouse, position });
    }

    let row = NewPlant {
        uuid: Uuid::new_v4(),
        greenhouse_uuid: greenhouse,
        position,
        planted_at,
    };
    insert_plant(conn, &row)?;

    info!("Plant {} added to greenhouse {} at position {}", row.uuid, greenhouse, position);
    Ok(row.uuid)
}

/// Insert without the `position_free` pre-check. A concurrent writer may
/// have taken the slot since; the active-position index turns that into
/// `PositionOccupied`.
fn insert_plant(conn: &mut PgConnection, row: &NewPlant) -> Result<()> {
    use schema::plants::dsl as P;

    diesel::insert_into(P::plants)
        .values(row)
        .execute(conn)
        .map_err(HerbariumError::from)
        .map_err(|e| {
            if e.is_position_conflict() {
                HerbariumError::PositionOccupied {
                    greenhouse: row.greenhouse_uuid,
                    position: row.position,
                }
            } else {
                e
            }
        })?;
    Ok(())
}

pub fn update_plant(
    conn: &mut PgConnection,
    id: Uuid,
    type_id: i32,
    override_moisture_goal: Option<f64>,
    override_light_exposure_min_duration: Option<f64>,
) -> Result<()> {
    use schema::plants::dsl as P;

    let plant = require_plant(conn, id)?;
    get_plant_type(conn, type_id)?;
    validate_overrides(override_moisture_goal, override_light_exposure_min_duration)?;

    let changes = PlantChangeset {
        type_id,
        override_moisture_goal,
        override_light_exposure_min_duration,
    };
    diesel::update(P::plants.find(plant.uuid)).set(&changes).execute(conn)?;
    info!("Plant {} updated (type={})", plant.uuid, type_id);
    Ok(())
}

pub fn remove_plant(conn: &mut PgConnection, id: Uuid) -> Result<DateTime<Utc>> {
    use schema::plants::dsl as P;

    let plant = require_plant(conn, id)?;
    if plant.removed {
        return Err(HerbariumError::AlreadyRemoved(plant.uuid));
    }

    let removed_at = Utc::now();
    let updated = diesel::update(P::plants.find(plant.uuid).filter(P::removed.eq(false)))
        .set((P::removed.eq(true), P::removed_at.eq(Some(removed_at))))
        .execute(conn)?;
    // A concurrent removal committed between the check and the update.
    if updated == 0 {
        return Err(HerbariumError::AlreadyRemoved(plant.uuid));
    }
    info!("Plant {} removed from greenhouse {}", plant.uuid, plant.greenhouse_uuid);
    Ok(removed_at)
}

pub fn greenhouse_of_plant(conn: &mut PgConnection, id: Uuid) -> Result<Uuid> {
    Ok(require_plant(conn, id)?.greenhouse_uuid)
}

/// Record `alias` as a prior identifier of plant `id`.
pub fn set_plant_alias(conn: &mut PgConnection, id: Uuid, alias: Uuid) -> Result<()> {
    use schema::plants::dsl as P;

    let plant = require_plant(conn, id)?;
    if let Some(other) = find_plant(conn, alias)?
        && other.uuid != plant.uuid
    {
        return Err(HerbariumError::AlreadyExists(format!("plant alias {alias}")));
    }

    diesel::update(P::plants.find(plant.uuid))
        .set(P::alias_of.eq(Some(alias)))
        .execute(conn)?;
    info!("Plant {} now also answers to {}", plant.uuid, alias);
    Ok(())
}

fn enrich(conn: &mut PgConnection, greenhouse: Uuid, rows: Vec<(Plant, PlantType)>) -> Result<Vec<PlantView>> {
    let ids: Vec<Uuid> = rows.iter().map(|(p, _)| p.uuid).collect();

    let mut moisture: HashMap<Uuid, _> =
        timeseries::latest_readings_batch(conn, None, Some(&ids), Some(SensorType::Moisture))?
            .into_iter()
            .filter_map(|r| r.plant.map(|p| (p, r)))
            .collect();
    let mut valves: HashMap<Uuid, _> =
        timeseries::latest_actuator_states_batch(conn, None, Some(&ids), Some(ActuatorType::Valve))?
            .into_iter()
            .filter_map(|s| s.plant.map(|p| (p, s)))
            .collect();
    let mut light_strips: HashMap<Uuid, _> =
        timeseries::latest_actuator_states_batch(conn, None, Some(&ids), Some(ActuatorType::LightStrip))?
            .into_iter()
            .filter_map(|s| s.plant.map(|p| (p, s)))
            .collect();
    let light = timeseries::latest_reading(conn, Some(greenhouse), None, Some(SensorType::Light))?;

    debug!(
        "Enriched {} plant(s) of greenhouse {} (moisture={}, valves={}, light_strips={})",
        rows.len(),
        greenhouse,
        moisture.len(),
        valves.len(),
        light_strips.len()
    );

    Ok(rows
        .into_iter()
        .map(|(plant, plant_type)| {
            let enrichment = PlantEnrichment {
                moisture: moisture.remove(&plant.uuid),
                light: light.clone(),
                valve: valves.remove(&plant.uuid),
                light_strip: light_strips.remove(&plant.uuid),
            };
            PlantView::compose(plant, plant_type, enrichment)
        })
        .collect())
}

/// Plants of a greenhouse with their latest readings, ordered by position.
pub fn list_by_greenhouse(conn: &mut PgConnection, greenhouse: Uuid, include_removed: bool) -> Result<Vec<PlantView>> {
    use schema::plant_types::dsl as T;
    use schema::plants::dsl as P;

    let mut query = P::plants
        .inner_join(T::plant_types)
        .filter(P::greenhouse_uuid.eq(greenhouse))
        .select((Plant::as_select(), PlantType::as_select()))
        .order((P::position.asc(), P::planted_at.asc()))
        .into_boxed();
    if !include_removed {
        query = query.filter(P::removed.eq(false));
    }

    let rows: Vec<(Plant, PlantType)> = query.load(conn)?;
    enrich(conn, greenhouse, rows)
}

pub fn get_plant(conn: &mut PgConnection, id: Uuid) -> Result<PlantView> {
    let plant = require_plant(conn, id)?;
    let plant_type = get_plant_type(conn, plant.type_id)?;
    let greenhouse = plant.greenhouse_uuid;
    let mut views = enrich(conn, greenhouse, vec![(plant, plant_type)])?;
    views
        .pop()
        .ok_or_else(|| HerbariumError::not_found(format!("plant {id}")))
}

#[derive(Debug, Clone)]
pub struct PlantDirectory {
    db: Database,
}

impl PlantDirectory {
    pub fn new(db: Database) -> Self {
        PlantDirectory { db }
    }

    pub fn exists(&self, id: Uuid) -> Result<bool> {
        self.db.transaction(|conn| exists(conn, id))
    }

    pub fn exists_batch(&self, ids: &[Uuid], greenhouse: Option<Uuid>) -> Result<Vec<Uuid>> {
        self.db.transaction(|conn| exists_batch(conn, ids, greenhouse))
    }

    pub fn position_free(&self, greenhouse: Uuid, position: i32) -> Result<bool> {
        self.db.transaction(|conn| position_free(conn, greenhouse, position))
    }

    pub fn add_plant(&self, greenhouse: Uuid, position: i32, planted_at: DateTime<Utc>) -> Result<Uuid> {
        self.db
            .transaction(|conn| add_plant(conn, greenhouse, position, planted_at))
    }

    pub fn update_plant(
        &self,
        id: Uuid,
        type_id: i32,
        override_moisture_goal: Option<f64>,
        override_light_exposure_min_duration: Option<f64>,
    ) -> Result<()> {
        self.db.transaction(|conn| {
            update_plant(
                conn,
                id,
                type_id,
                override_moisture_goal,
                override_light_exposure_min_duration,
            )
        })
    }

    pub fn remove_plant(&self, id: Uuid) -> Result<DateTime<Utc>> {
        self.db.transaction(|conn| remove_plant(conn, id))
    }

    pub fn list_by_greenhouse(&self, greenhouse: Uuid, include_removed: bool) -> Result<Vec<PlantView>> {
        self.db
            .transaction(|conn| list_by_greenhouse(conn, greenhouse, include_removed))
    }

    pub fn get_plant(&self, id: Uuid) -> Result<PlantView> {
        self.db.transaction(|conn| get_plant(conn, id))
    }

    pub fn greenhouse_of_plant(&self, id: Uuid) -> Result<Uuid> {
        self.db.transaction(|conn| greenhouse_of_plant(conn, id))
    }

    pub fn set_plant_alias(&self, id: Uuid, alias: Uuid) -> Result<()> {
        self.db.transaction(|conn| set_plant_alias(conn, id, alias))
    }

    pub fn list_plant_types(&self) -> Result<Vec<PlantType>> {
        self.db.transaction(list_plant_types)
    }

    pub fn get_plant_type(&self, id: i32) -> Result<PlantType> {
        self.db.transaction(|conn| get_plant_type(conn, id))
    }

    pub fn add_plant_type(&self, spec: PlantTypeSpec) -> Result<i32> {
        self.db.transaction(|conn| add_plant_type(conn, spec))
    }
}
