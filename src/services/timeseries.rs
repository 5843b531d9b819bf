//! Append-only sensor readings and actuator state changes.
//!
//! The dominant read is "last known value", either for one filter
//! combination ([`latest_reading`]) or one per plant/greenhouse
//! ([`latest_readings_batch`]). Batch lookups scan matching rows newest first
//! and keep the first row seen per group, see [`latest_per_key`].

use crate::db::models::{ActuatorStateRow, NewActuatorState, NewSensorData, SensorDataRow};
use crate::db::pool::Database;
use crate::error::Result;
use crate::models::herbarium::{ActuatorInput, ActuatorState, ActuatorType, ReadingInput, SensorReading, SensorType};
use crate::schema;
use diesel::PgConnection;
use diesel::prelude::*;
use log::debug;
use std::collections::HashSet;
use std::hash::Hash;
use uuid::Uuid;

/// Entity a batch lookup groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    Plant,
    Greenhouse,
}

/// Keep only the first element seen for every key.
///
/// `rows` must already be ordered newest first, so the survivor of each group
/// is its maximum-timestamp row. Relative order of survivors is preserved.
pub fn latest_per_key<T, K, F>(rows: impl IntoIterator<Item = T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    rows.into_iter().filter(|row| seen.insert(key(row))).collect()
}

/// Work out which ids to filter on and how to group.
///
/// Plant ids take precedence: when both lists are given the greenhouse list
/// is ignored and results are grouped per plant.
fn batch_plan<'a>(greenhouses: Option<&'a [Uuid]>, plants: Option<&'a [Uuid]>) -> (Grouping, Option<&'a [Uuid]>) {
    match (plants, greenhouses) {
        (Some(plants), _) => (Grouping::Plant, Some(plants)),
        (None, Some(greenhouses)) => (Grouping::Greenhouse, Some(greenhouses)),
        (None, None) => (Grouping::Greenhouse, None),
    }
}

pub fn append_readings(conn: &mut PgConnection, greenhouse: Uuid, readings: Vec<ReadingInput>) -> Result<usize> {
    if readings.is_empty() {
        return Ok(0);
    }

    use schema::sensors_data::dsl as S;

    let rows: Vec<NewSensorData> = readings.into_iter().map(|r| r.into_row(greenhouse)).collect();
    let inserted = diesel::insert_into(S::sensors_data).values(&rows).execute(conn)?;
    debug!("Stored {} sensor reading(s) for greenhouse {}", inserted, greenhouse);
    Ok(inserted)
}

pub fn append_actuator_states(conn: &mut PgConnection, greenhouse: Uuid, states: Vec<ActuatorInput>) -> Result<usize> {
    if states.is_empty() {
        return Ok(0);
    }

    use schema::actuators_state::dsl as A;

    let rows: Vec<NewActuatorState> = states.into_iter().map(|s| s.into_row(greenhouse)).collect();
    let inserted = diesel::insert_into(A::actuators_state).values(&rows).execute(conn)?;
    debug!("Stored {} actuator state(s) for greenhouse {}", inserted, greenhouse);
    Ok(inserted)
}

/// Most recent reading matching every given filter.
pub fn latest_reading(
    conn: &mut PgConnection,
    greenhouse: Option<Uuid>,
    plant: Option<Uuid>,
    kind: Option<SensorType>,
) -> Result<Option<SensorReading>> {
    use schema::sensors_data::dsl as S;

    let mut query = S::sensors_data.select(SensorDataRow::as_select()).into_boxed();
    if let Some(greenhouse) = greenhouse {
        query = query.filter(S::greenhouse_uuid.eq(greenhouse));
    }
    if let Some(plant) = plant {
        query = query.filter(S::plant_uuid.eq(plant));
    }
    if let Some(kind) = kind {
        query = query.filter(S::kind.eq(kind.code()));
    }

    let row = query
        .order((S::timestamp.desc(), S::id.desc()))
        .first::<SensorDataRow>(conn)
        .optional()?;
    row.map(SensorReading::try_from).transpose()
}

/// Latest reading per plant (when `plants` is given) or per greenhouse.
pub fn latest_readings_batch(
    conn: &mut PgConnection,
    greenhouses: Option<&[Uuid]>,
    plants: Option<&[Uuid]>,
    kind: Option<SensorType>,
) -> Result<Vec<SensorReading>> {
    use schema::sensors_data::dsl as S;

    let (grouping, ids) = batch_plan(greenhouses, plants);
    if ids.is_some_and(|ids| ids.is_empty()) {
        return Ok(Vec::new());
    }

    let mut query = S::sensors_data.select(SensorDataRow::as_select()).into_boxed();
    match (grouping, ids) {
        (Grouping::Plant, Some(ids)) => query = query.filter(S::plant_uuid.eq_any(ids.to_vec())),
        (Grouping::Greenhouse, Some(ids)) => query = query.filter(S::greenhouse_uuid.eq_any(ids.to_vec())),
        (_, None) => {}
    }
    if let Some(kind) = kind {
        query = query.filter(S::kind.eq(kind.code()));
    }

    let rows = query
        .order((S::timestamp.desc(), S::id.desc()))
        .load::<SensorDataRow>(conn)?;
    let latest = match grouping {
        Grouping::Plant => latest_per_key(rows, |r| r.plant_uuid),
        Grouping::Greenhouse => latest_per_key(rows, |r| r.greenhouse_uuid),
    };
    latest.into_iter().map(SensorReading::try_from).collect()
}

/// Most recent actuator state matching every given filter.
pub fn latest_actuator_state(
    conn: &mut PgConnection,
    greenhouse: Option<Uuid>,
    plant: Option<Uuid>,
    kind: Option<ActuatorType>,
) -> Result<Option<ActuatorState>> {
    use schema::actuators_state::dsl as A;

    let mut query = A::actuators_state.select(ActuatorStateRow::as_select()).into_boxed();
    if let Some(greenhouse) = greenhouse {
        query = query.filter(A::greenhouse_uuid.eq(greenhouse));
    }
    if let Some(plant) = plant {
        query = query.filter(A::plant_uuid.eq(plant));
    }
    if let Some(kind) = kind {
        query = query.filter(A::kind.eq(kind.code()));
    }

    let row = query
        .order((A::timestamp.desc(), A::id.desc()))
        .first::<ActuatorStateRow>(conn)
        .optional()?;
    row.map(ActuatorState::try_from).transpose()
}

/// Latest actuator state per plant (when `plants` is given) or per greenhouse.
pub fn latest_actuator_states_batch(
    conn: &mut PgConnection,
    greenhouses: Option<&[Uuid]>,
    plants: Option<&[Uuid]>,
    kind: Option<ActuatorType>,
) -> Result<Vec<ActuatorState>> {
    use schema::actuators_state::dsl as A;

    let (grouping, ids) = batch_plan(greenhouses, plants);
    if ids.is_some_and(|ids| ids.is_empty()) {
        return Ok(Vec::new());
    }

    let mut query = A::actuators_state.select(ActuatorStateRow::as_select()).into_boxed();
    match (grouping, ids) {
        (Grouping::Plant, Some(ids)) => query = query.filter(A::plant_uuid.eq_any(ids.to_vec())),
        (Grouping::Greenhouse, Some(ids)) => query = query.filter(A::greenhouse_uuid.eq_any(ids.to_vec())),
        (_, None) => {}
    }
    if let Some(kind) = kind {
        query = query.filter(A::kind.eq(kind.code()));
    }

    let rows = query
        .order((A::timestamp.desc(), A::id.desc()))
        .load::<ActuatorStateRow>(conn)?;
    let latest = match grouping {
        Grouping::Plant => latest_per_key(rows, |r| r.plant_uuid),
        Grouping::Greenhouse => latest_per_key(rows, |r| r.greenhouse_uuid),
    };
    latest.into_iter().map(ActuatorState::try_from).collect()
}

/// Transactional front for the functions above.
#[derive(Debug, Clone)]
pub struct TimeSeriesStore {
    db: Database,
}

impl TimeSeriesStore {
    pub fn new(db: Database) -> Self {
        TimeSeriesStore { db }
    }

    pub fn append_readings(&self, greenhouse: Uuid, readings: Vec<ReadingInput>) -> Result<usize> {
        self.db.transaction(|conn| append_readings(conn, greenhouse, readings))
    }

    pub fn append_actuator_states(&self, greenhouse: Uuid, states: Vec<ActuatorInput>) -> Result<usize> {
        self.db.transaction(|conn| append_actuator_states(conn, greenhouse, states))
    }

    pub fn latest_reading(
        &self,
        greenhouse: Option<Uuid>,
        plant: Option<Uuid>,
        kind: Option<SensorType>,
    ) -> Result<Option<SensorReading>> {
        self.db.transaction(|conn| latest_reading(conn, greenhouse, plant, kind))
    }

    pub fn latest_readings_batch(
        &self,
        greenhouses: Option<&[Uuid]>,
        plants: Option<&[Uuid]>,
        kind: Option<SensorType>,
    ) -> Result<Vec<SensorReading>> {
        self.db
            .transaction(|conn| latest_readings_batch(conn, greenhouses, plants, kind))
    }

    pub fn latest_actuator_state(
        &self,
        greenhouse: Option<Uuid>,
        plant: Option<Uuid>,
        kind: Option<ActuatorType>,
    ) -> Result<Option<ActuatorState>> {
        self.db
            .transaction(|conn| latest_actuator_state(conn, greenhouse, plant, kind))
    }

    pub fn latest_actuator_states_batch(
        &self,
        greenhouses: Option<&[Uuid]>,
        plants: Option<&[Uuid]>,
        kind: Option<ActuatorType>,
    ) -> Result<Vec<ActuatorState>> {
        self.db
            .transaction(|conn| latest_actuator_states_batch(conn, greenhouses, plants, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HerbariumError;
    use crate::testing;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn latest_per_key_keeps_first_seen() {
        let rows = vec![("a", 30), ("b", 20), ("a", 10), ("c", 5), ("b", 1)];
        let latest = latest_per_key(rows, |r| r.0);
        assert_eq!(latest, vec![("a", 30), ("b", 20), ("c", 5)]);
    }

    #[test]
    fn latest_per_key_on_empty_input() {
        let latest = latest_per_key(Vec::<(u8, u8)>::new(), |r| r.0);
        assert!(latest.is_empty());
    }

    #[test]
    fn plant_filter_takes_precedence() {
        let g = [Uuid::new_v4()];
        let p = [Uuid::new_v4(), Uuid::new_v4()];
        let (grouping, ids) = batch_plan(Some(&g), Some(&p));
        assert_eq!(grouping, Grouping::Plant);
        assert_eq!(ids, Some(&p[..]));

        let (grouping, ids) = batch_plan(Some(&g), None);
        assert_eq!(grouping, Grouping::Greenhouse);
        assert_eq!(ids, Some(&g[..]));

        let (grouping, ids) = batch_plan(None, None);
        assert_eq!(grouping, Grouping::Greenhouse);
        assert_eq!(ids, None);
    }

    #[test]
    fn latest_tank_reading_is_the_newest_one() {
        let Some(ctx) = testing::context() else { return };
        let greenhouse = ctx.greenhouse("tank");
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let store = &ctx.store;

        assert_eq!(store.latest_reading(Some(greenhouse), None, Some(SensorType::Tank)).unwrap(), None);

        store
            .append_readings(
                greenhouse,
                vec![
                    testing::reading(SensorType::Tank, 40.0, base, None),
                    testing::reading(SensorType::Tank, 70.0, base + Duration::hours(2), None),
                    testing::reading(SensorType::Tank, 55.0, base + Duration::hours(1), None),
                    testing::reading(SensorType::Light, 900.0, base + Duration::hours(3), None),
                ],
            )
            .unwrap();

        let tank = store
            .latest_reading(Some(greenhouse), None, Some(SensorType::Tank))
            .unwrap()
            .unwrap();
        assert_eq!(tank.value, 70.0);
        assert_eq!(tank.timestamp, base + Duration::hours(2));

        let any = store.latest_reading(Some(greenhouse), None, None).unwrap().unwrap();
        assert_eq!(any.kind, SensorType::Light);
    }

    #[test]
    fn batch_returns_one_reading_per_plant() {
        let Some(ctx) = testing::context() else { return };
        let greenhouse = ctx.greenhouse("batch");
        let p1 = ctx.plant(greenhouse, 0);
        let p2 = ctx.plant(greenhouse, 1);
        let p3 = ctx.plant(greenhouse, 2);
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        ctx.store
            .append_readings(
                greenhouse,
                vec![
                    testing::reading(SensorType::Moisture, 10.0, base, Some(p1)),
                    testing::reading(SensorType::Moisture, 12.0, base + Duration::minutes(15), Some(p1)),
                    testing::reading(SensorType::Moisture, 30.0, base + Duration::minutes(5), Some(p2)),
                    testing::reading(SensorType::Moisture, 99.0, base + Duration::hours(1), Some(p3)),
                ],
            )
            .unwrap();

        let mut latest = ctx
            .store
            .latest_readings_batch(None, Some(&[p1, p2]), Some(SensorType::Moisture))
            .unwrap();
        latest.sort_by_key(|r| r.value as i64);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].plant, Some(p1));
        assert_eq!(latest[0].value, 12.0);
        assert_eq!(latest[1].plant, Some(p2));
        assert_eq!(latest[1].value, 30.0);

        let none = ctx.store.latest_readings_batch(None, Some(&[]), None).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn actuator_batch_groups_per_greenhouse_without_plant_ids() {
        let Some(ctx) = testing::context() else { return };
        let g1 = ctx.greenhouse("pumps-1");
        let g2 = ctx.greenhouse("pumps-2");
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        ctx.store
            .append_actuator_states(
                g1,
                vec![
                    testing::actuator(ActuatorType::Pump, true, base, None),
                    testing::actuator(ActuatorType::Pump, false, base + Duration::minutes(10), None),
                ],
            )
            .unwrap();
        ctx.store
            .append_actuator_states(g2, vec![testing::actuator(ActuatorType::Pump, true, base, None)])
            .unwrap();

        let states = ctx
            .store
            .latest_actuator_states_batch(Some(&[g1, g2]), None, Some(ActuatorType::Pump))
            .unwrap();
        assert_eq!(states.len(), 2);
        let g1_state = states.iter().find(|s| s.greenhouse == g1).unwrap();
        assert!(!g1_state.status);
        let g2_state = states.iter().find(|s| s.greenhouse == g2).unwrap();
        assert!(g2_state.status);
    }

    #[test]
    fn malformed_value_aborts_whole_batch() {
        let Some(ctx) = testing::context() else { return };
        let greenhouse = ctx.greenhouse("nan");
        let now = Utc::now();

        let err = ctx
            .store
            .append_readings(
                greenhouse,
                vec![
                    testing::reading(SensorType::Light, 100.0, now, None),
                    testing::reading(SensorType::Light, f64::NAN, now, None),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, HerbariumError::ConstraintViolation(_)));
        assert_eq!(ctx.store.latest_reading(Some(greenhouse), None, None).unwrap(), None);
    }
}
