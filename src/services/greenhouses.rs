//! Greenhouses, their ownership and the composed greenhouse view.

use crate::db::models::{Greenhouse, NewGreenhouse};
use crate::db::pool::Database;
use crate::error::{HerbariumError, Result};
use crate::models::herbarium::{GreenhouseView, SensorType};
use crate::schema;
use crate::services::{plants, timeseries, users};
use chrono::Utc;
use diesel::PgConnection;
use diesel::prelude::*;
use log::{debug, info};
use uuid::Uuid;

pub const MAX_GREENHOUSE_NAME_LEN: usize = 256;

pub fn exists(conn: &mut PgConnection, id: Uuid) -> Result<bool> {
    use schema::greenhouses::dsl as G;

    Ok(diesel::select(diesel::dsl::exists(G::greenhouses.find(id))).get_result(conn)?)
}

pub fn is_owned_by(conn: &mut PgConnection, id: Uuid, user: &str) -> Result<bool> {
    use schema::greenhouses::dsl as G;

    Ok(diesel::select(diesel::dsl::exists(
        G::greenhouses.filter(G::uuid.eq(id).and(G::user_uuid.eq(user))),
    ))
    .get_result(conn)?)
}

/// Base row + tank level + last-seen + plant list.
fn compose(conn: &mut PgConnection, row: Greenhouse, include_removed_plants: bool) -> Result<GreenhouseView> {
    let tank_level = timeseries::latest_reading(conn, Some(row.uuid), None, Some(SensorType::Tank))?;
    let last_reading_at = timeseries::latest_reading(conn, Some(row.uuid), None, None)?.map(|r| r.timestamp);
    let plants = plants::list_by_greenhouse(conn, row.uuid, include_removed_plants)?;
    debug!(
        "Composed greenhouse {} (plants={}, last_reading={:?})",
        row.uuid,
        plants.len(),
        last_reading_at
    );
    Ok(GreenhouseView::compose(row, tank_level, last_reading_at, plants))
}

pub fn get_greenhouse(conn: &mut PgConnection, id: Uuid) -> Result<GreenhouseView> {
    use schema::greenhouses::dsl as G;

    let row = G::greenhouses
        .find(id)
        .select(Greenhouse::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| HerbariumError::not_found(format!("greenhouse {id}")))?;
    compose(conn, row, false)
}

pub fn list_by_user(conn: &mut PgConnection, user: &str, include_removed_plants: bool) -> Result<Vec<GreenhouseView>> {
    use schema::greenhouses::dsl as G;

    let rows: Vec<Greenhouse> = G::greenhouses
        .filter(G::user_uuid.eq(user))
        .select(Greenhouse::as_select())
        .order((G::created_at.asc(), G::uuid.asc()))
        .load(conn)?;
    rows.into_iter()
        .map(|row| compose(conn, row, include_removed_plants))
        .collect()
}

pub fn add_greenhouse(conn: &mut PgConnection, user: &str, id: Uuid, name: &str) -> Result<Uuid> {
    use schema::greenhouses::dsl as G;

    users::check_length("greenhouse name", name, MAX_GREENHOUSE_NAME_LEN)?;
    if exists(conn, id)? {
        return Err(HerbariumError::AlreadyExists(format!("greenhouse {id}")));
    }
    if !users::exists(conn, user)? {
        return Err(HerbariumError::not_found(format!("user {user}")));
    }

    let row = NewGreenhouse {
        uuid: id,
        name: name.to_string(),
        user_uuid: user.to_string(),
        created_at: Utc::now(),
    };
    diesel::insert_into(G::greenhouses).values(&row).execute(conn)?;
    info!("Greenhouse {} ({}) registered for user {}", id, name, user);
    Ok(id)
}

pub fn update_details(conn: &mut PgConnection, id: Uuid, name: &str) -> Result<()> {
    use schema::greenhouses::dsl as G;

    users::check_length("greenhouse name", name, MAX_GREENHOUSE_NAME_LEN)?;
    let updated = diesel::update(G::greenhouses.find(id))
        .set(G::name.eq(name))
        .execute(conn)?;
    if updated == 0 {
        return Err(HerbariumError::not_found(format!("greenhouse {id}")));
    }
    info!("Greenhouse {} renamed to {}", id, name);
    Ok(())
}

/// Delete a greenhouse; plants, readings and actuator states go with it
/// through the foreign-key cascades.
pub fn delete_greenhouse(conn: &mut PgConnection, id: Uuid) -> Result<()> {
    use schema::greenhouses::dsl as G;

    let deleted = diesel::delete(G::greenhouses.find(id)).execute(conn)?;
    if deleted == 0 {
        return Err(HerbariumError::not_found(format!("greenhouse {id}")));
    }
    info!("Greenhouse {} deleted", id);
    Ok(())
}

#[derive(Debug, Clone)]
pub struct GreenhouseDirectory {
    db: Database,
}

impl GreenhouseDirectory {
    pub fn new(db: Database) -> Self {
        GreenhouseDirectory { db }
    }

    pub fn exists(&self, id: Uuid) -> Result<bool> {
        self.db.transaction(|conn| exists(conn, id))
    }

    pub fn is_owned_by(&self, id: Uuid, user: &str) -> Result<bool> {
        self.db.transaction(|conn| is_owned_by(conn, id, user))
    }

    pub fn get_greenhouse(&self, id: Uuid) -> Result<GreenhouseView> {
        self.db.transaction(|conn| get_greenhouse(conn, id))
    }

    pub fn list_by_user(&self, user: &str, include_removed_plants: bool) -> Result<Vec<GreenhouseView>> {
        self.db
            .transaction(|conn| list_by_user(conn, user, include_removed_plants))
    }

    pub fn add_greenhouse(&self, user: &str, id: Uuid, name: &str) -> Result<Uuid> {
        self.db.transaction(|conn| add_greenhouse(conn, user, id, name))
    }

    pub fn update_details(&self, id: Uuid, name: &str) -> Result<()> {
        self.db.transaction(|conn| update_details(conn, id, name))
    }

    pub fn delete_greenhouse(&self, id: Uuid) -> Result<()> {
        self.db.transaction(|conn| delete_greenhouse(conn, id))
    }
}
