//! Helpers for tests that need PostgreSQL.
//!
//! Set `TEST_DATABASE_URL` to run them. Migrations are applied once per test
//! binary; every [`context`] then gets its own single-connection pool whose
//! connection sits inside a test transaction, so nothing is committed.

use crate::db::pool::Database;
use crate::models::herbarium::{ActuatorInput, ActuatorType, ReadingInput, SensorType};
use crate::services::greenhouses::GreenhouseDirectory;
use crate::services::plants::{self, PlantDirectory};
use crate::services::timeseries::TimeSeriesStore;
use crate::services::users::UserDirectory;
use chrono::{DateTime, Utc};
use diesel::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::CustomizeConnection;
use diesel_migrations::MigrationHarness;
use std::num::NonZeroU32;
use std::sync::OnceLock;
use uuid::Uuid;

pub const TEST_DATABASE_URL_VAR: &str = "TEST_DATABASE_URL";

#[derive(Debug)]
struct TestTransaction;

impl CustomizeConnection<PgConnection, diesel::r2d2::Error> for TestTransaction {
    fn on_acquire(&self, conn: &mut PgConnection) -> Result<(), diesel::r2d2::Error> {
        conn.begin_test_transaction().map_err(diesel::r2d2::Error::QueryError)
    }
}

fn prepare_schema(url: &str) -> Result<(), String> {
    let mut conn = PgConnection::establish(url).map_err(|e| format!("connect failed: {}", e))?;
    conn.run_pending_migrations(crate::MIGRATIONS)
        .map_err(|e| format!("migrations failed: {}", e))?;
    plants::ensure_default_plant_type(&mut conn).map_err(|e| format!("seeding plant types failed: {}", e))?;
    Ok(())
}

pub struct TestContext {
    pub db: Database,
    pub store: TimeSeriesStore,
    pub plants: PlantDirectory,
    pub greenhouses: GreenhouseDirectory,
    pub users: UserDirectory,
    /// User owning the greenhouses created through [`TestContext::greenhouse`].
    pub owner: String,
}

/// URL of a migrated test database, or `None` when none is configured.
///
/// Work done on connections opened directly from this URL is committed;
/// tests using it must clean up after themselves.
pub fn database_url() -> Option<String> {
    let Ok(url) = std::env::var(TEST_DATABASE_URL_VAR) else {
        eprintln!("{} not set; skipping database test", TEST_DATABASE_URL_VAR);
        return None;
    };

    static SCHEMA: OnceLock<Result<(), String>> = OnceLock::new();
    if let Err(e) = SCHEMA.get_or_init(|| prepare_schema(&url)) {
        panic!("test database unusable: {}", e);
    }
    Some(url)
}

/// A fresh context, or `None` when no test database is configured.
pub fn context() -> Option<TestContext> {
    let url = database_url()?;

    let db = Database::with_customizer(&url, NonZeroU32::MIN, TestTransaction).expect("test pool");
    let owner = format!("owner-{}", Uuid::new_v4());
    let users = UserDirectory::new(db.clone());
    users
        .insert_user(&owner, "Test Owner", "owner@example.com", None)
        .expect("insert owner");

    Some(TestContext {
        store: TimeSeriesStore::new(db.clone()),
        plants: PlantDirectory::new(db.clone()),
        greenhouses: GreenhouseDirectory::new(db.clone()),
        users,
        owner,
        db,
    })
}

impl TestContext {
    pub fn greenhouse(&self, name: &str) -> Uuid {
        self.greenhouses
            .add_greenhouse(&self.owner, Uuid::new_v4(), name)
            .expect("add greenhouse")
    }

    pub fn plant(&self, greenhouse: Uuid, position: i32) -> Uuid {
        self.plants
            .add_plant(greenhouse, position, Utc::now())
            .expect("add plant")
    }
}

pub fn reading(kind: SensorType, value: f64, timestamp: DateTime<Utc>, plant: Option<Uuid>) -> ReadingInput {
    ReadingInput {
        kind,
        value,
        timestamp,
        plant,
    }
}

pub fn actuator(kind: ActuatorType, status: bool, timestamp: DateTime<Utc>, plant: Option<Uuid>) -> ActuatorInput {
    ActuatorInput {
        kind,
        status,
        timestamp,
        plant,
    }
}
