//! Synthetic greenhouse history for local development and dashboards.

use crate::db::models::Greenhouse;
use crate::error::{HerbariumError, Result};
use crate::models::herbarium::{ActuatorInput, ActuatorType, ReadingInput, SensorType};
use crate::schema;
use crate::services::{plants, timeseries, users};
use chrono::{DateTime, Duration, Timelike, Utc};
use diesel::PgConnection;
use diesel::prelude::*;
use log::info;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use uuid::Uuid;

const STEP_MINUTES: i64 = 15;
const PLANT_COUNT: i32 = 4;
pub const DEMO_GREENHOUSE_NAME: &str = "Demo greenhouse";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoSummary {
    pub greenhouse: Uuid,
    pub readings: usize,
    pub actuator_states: usize,
}

/// Per-plant simulation state carried between steps.
struct PlantSim {
    id: Uuid,
    moisture: f64,
    goal: f64,
    watering: bool,
}

pub fn run(conn: &mut PgConnection, user: &str, days: u32) -> Result<DemoSummary> {
    ensure_user(conn, user)?;
    let greenhouse = ensure_greenhouse(conn, user)?;

    if timeseries::latest_reading(conn, Some(greenhouse), None, None)?.is_some() {
        info!("Demo data: greenhouse {} already has readings; skipping", greenhouse);
        return Ok(DemoSummary {
            greenhouse,
            readings: 0,
            actuator_states: 0,
        });
    }

    let plant_ids = ensure_plants(conn, greenhouse)?;
    let now = Utc::now();
    let end = align_to_step(now)?;
    let start = end - Duration::days(i64::from(days));

    let mut rng = SmallRng::seed_from_u64(0x6EE2_400A_5EED_CAFEu64);
    let mut sims: Vec<PlantSim> = Vec::with_capacity(plant_ids.len());
    for (index, id) in plant_ids.into_iter().enumerate() {
        let view = plants::get_plant(conn, id)?;
        sims.push(PlantSim {
            id,
            moisture: 55.0 + index as f64 * 5.0,
            goal: view.moisture_goal.min(65.0),
            watering: false,
        });
    }
    info!(
        "Demo data: generating {} day(s) for greenhouse {} from {} to {} (plants={})",
        days,
        greenhouse,
        start,
        end,
        sims.len()
    );

    let mut readings = Vec::with_capacity(samples_per_day() * (sims.len() + 2));
    let mut states = Vec::with_capacity(samples_per_day() * (sims.len() * 2 + 1));
    let mut summary = DemoSummary {
        greenhouse,
        readings: 0,
        actuator_states: 0,
    };
    let mut tank = 95.0;
    let mut current_day = start.date_naive();
    let step = Duration::minutes(STEP_MINUTES);
    let mut ts = start;

    while ts < end {
        if ts.date_naive() != current_day {
            flush(conn, greenhouse, &mut readings, &mut states, &mut summary)?;
            current_day = ts.date_naive();
        }

        let day_fraction = ts.time().num_seconds_from_midnight() as f64 / 86_400.0;
        let daylight = compute_daylight(day_fraction, &mut rng);
        let strip_on = daylight < 25.0 && (0.25..0.85).contains(&day_fraction);
        let mut pumping = false;

        for sim in sims.iter_mut() {
            step_plant(sim, daylight, &mut tank, &mut rng);
            pumping |= sim.watering;

            readings.push(reading(SensorType::Moisture, sim.moisture, ts, Some(sim.id)));
            states.push(actuator(ActuatorType::Valve, sim.watering, ts, Some(sim.id)));
            states.push(actuator(ActuatorType::LightStrip, strip_on, ts, Some(sim.id)));
        }

        if tank < 10.0 {
            tank = 95.0;
        }
        // One light sensor and one tank gauge per greenhouse.
        readings.push(reading(SensorType::Light, daylight, ts, None));
        readings.push(reading(SensorType::Tank, tank, ts, None));
        states.push(actuator(ActuatorType::Pump, pumping, ts, None));

        ts += step;
    }
    flush(conn, greenhouse, &mut readings, &mut states, &mut summary)?;

    info!(
        "Demo data: complete (readings={}, actuator_states={})",
        summary.readings, summary.actuator_states
    );
    Ok(summary)
}

fn ensure_user(conn: &mut PgConnection, user: &str) -> Result<()> {
    if !users::exists(conn, user)? {
        users::insert_user(conn, user, "Demo Gardener", "demo@herbarium.local", None)?;
    }
    Ok(())
}

fn ensure_greenhouse(conn: &mut PgConnection, user: &str) -> Result<Uuid> {
    use crate::services::greenhouses;
    use schema::greenhouses::dsl as G;

    let existing: Option<Greenhouse> = G::greenhouses
        .filter(G::user_uuid.eq(user).and(G::name.eq(DEMO_GREENHOUSE_NAME)))
        .select(Greenhouse::as_select())
        .order(G::created_at.asc())
        .first(conn)
        .optional()?;
    match existing {
        Some(row) => Ok(row.uuid),
        None => greenhouses::add_greenhouse(conn, user, Uuid::new_v4(), DEMO_GREENHOUSE_NAME),
    }
}

fn ensure_plants(conn: &mut PgConnection, greenhouse: Uuid) -> Result<Vec<Uuid>> {
    let mut ids = Vec::with_capacity(PLANT_COUNT as usize);
    let active = plants::list_by_greenhouse(conn, greenhouse, false)?;
    for position in 0..PLANT_COUNT {
        let id = match active.iter().find(|p| p.position == position) {
            Some(p) => p.uuid,
            None => plants::add_plant(conn, greenhouse, position, Utc::now())?,
        };
        ids.push(id);
    }
    Ok(ids)
}

fn flush(
    conn: &mut PgConnection,
    greenhouse: Uuid,
    readings: &mut Vec<ReadingInput>,
    states: &mut Vec<ActuatorInput>,
    summary: &mut DemoSummary,
) -> Result<()> {
    if !readings.is_empty() {
        summary.readings += timeseries::append_readings(conn, greenhouse, std::mem::take(readings))?;
    }
    if !states.is_empty() {
        summary.actuator_states += timeseries::append_actuator_states(conn, greenhouse, std::mem::take(states))?;
    }
    Ok(())
}

fn reading(kind: SensorType, value: f64, timestamp: DateTime<Utc>, plant: Option<Uuid>) -> ReadingInput {
    ReadingInput {
        kind,
        value,
        timestamp,
        plant,
    }
}

fn actuator(kind: ActuatorType, status: bool, timestamp: DateTime<Utc>, plant: Option<Uuid>) -> ActuatorInput {
    ActuatorInput {
        kind,
        status,
        timestamp,
        plant,
    }
}

fn align_to_step(ts: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let step_seconds = STEP_MINUTES * 60;
    let aligned = (ts.timestamp() / step_seconds) * step_seconds;
    DateTime::<Utc>::from_timestamp(aligned, 0)
        .ok_or_else(|| HerbariumError::ConstraintViolation(format!("timestamp {aligned} out of range")))
}

fn samples_per_day() -> usize {
    (24 * 60 / STEP_MINUTES) as usize
}

/// Percentage of full daylight, zero at night.
fn compute_daylight(day_fraction: f64, rng: &mut SmallRng) -> f64 {
    let sun = ((day_fraction - 0.5) * 2.0 * PI).cos().max(0.0);
    let cloud_cover = rng.random_range(0.4..=1.0);
    (sun * 100.0 * cloud_cover).clamp(0.0, 100.0)
}

/// Soil dries faster in bright light; the valve opens below goal and
/// closes once the plant is comfortably above it.
fn step_plant(sim: &mut PlantSim, daylight: f64, tank: &mut f64, rng: &mut SmallRng) {
    if sim.watering {
        sim.moisture += rng.random_range(4.0..=7.0);
        *tank -= rng.random_range(0.2..=0.5);
    } else {
        sim.moisture -= 0.15 + daylight * 0.004 + rng.random_range(0.0..=0.1);
    }
    sim.moisture = sim.moisture.clamp(5.0, 100.0);

    if sim.moisture < sim.goal - 10.0 {
        sim.watering = true;
    } else if sim.moisture > sim.goal + 5.0 {
        sim.watering = false;
    }
}
