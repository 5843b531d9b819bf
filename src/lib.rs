pub mod models {
    pub mod herbarium;
}

pub mod config;
pub mod db {
    pub mod models;
    pub mod pool;
}
pub mod error;
pub mod schema;
pub mod services {
    pub mod demo;
    pub mod greenhouses;
    pub mod ingest;
    pub mod plants;
    pub mod report;
    pub mod timeseries;
    pub mod users;
}

#[cfg(test)]
pub mod testing;

use crate::config::Config;
use crate::db::pool::Database;
use crate::services::greenhouses::GreenhouseDirectory;
use crate::services::ingest::{self, Ingestor};
use crate::services::plants::{self, PlantDirectory};
use crate::services::timeseries::TimeSeriesStore;
use crate::services::users::UserDirectory;
use crate::services::{demo, report};
use diesel::PgConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use log::{info, warn};
use std::path::{Path, PathBuf};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Work requested on the command line beyond the startup routine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub ingest_file: Option<PathBuf>,
    pub report_user: Option<String>,
}

/// The four directories over one shared pool.
#[derive(Debug, Clone)]
pub struct Services {
    pub store: TimeSeriesStore,
    pub plants: PlantDirectory,
    pub greenhouses: GreenhouseDirectory,
    pub users: UserDirectory,
    pub ingestor: Ingestor,
}

impl Services {
    pub fn new(db: Database) -> Self {
        Services {
            store: TimeSeriesStore::new(db.clone()),
            plants: PlantDirectory::new(db.clone()),
            greenhouses: GreenhouseDirectory::new(db.clone()),
            users: UserDirectory::new(db.clone()),
            ingestor: Ingestor::new(db),
        }
    }
}

pub fn apply_database_migrations(conn: &mut PgConnection) -> Result<(), String> {
    match conn.run_pending_migrations(MIGRATIONS) {
        Ok(applied) => {
            if applied.is_empty() {
                info!("Database schema is up to date; no migrations were applied");
            } else {
                let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
                info!("Applied {} database migration(s): {}", applied.len(), names);
            }
            Ok(())
        }
        Err(e) => Err(format!("Applying database migrations failed: {}", e)),
    }
}

fn ingest_file(services: &Services, path: &Path) -> Result<(), String> {
    let raw = std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let uploads = ingest::parse_uploads(&raw).map_err(|e| format!("{}: {}", path.display(), e))?;
    if uploads.is_empty() {
        warn!("{} contains no uploads", path.display());
        return Ok(());
    }

    let total = uploads.len();
    let (mut readings, mut states) = (0usize, 0usize);
    for (index, upload) in uploads.into_iter().enumerate() {
        let summary = services
            .ingestor
            .ingest(upload)
            .map_err(|e| format!("upload {}/{} rejected: {}", index + 1, total, e))?;
        readings += summary.readings;
        states += summary.actuator_states;
    }
    info!(
        "Ingested {} upload(s) from {} (readings={}, actuator_states={})",
        total,
        path.display(),
        readings,
        states
    );
    Ok(())
}

pub fn run(options: &RunOptions) -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (pool_size={}, demo_data_enabled={}, demo_data_days={}, demo_user={})",
        cfg.pool_size.get(),
        cfg.demo_data_enabled,
        cfg.demo_data_days.get(),
        cfg.demo_user_id
    );

    // 2) Connect DB
    let db = Database::connect(&cfg.database_url, cfg.pool_size).map_err(|e| format!("DB connection failed: {}", e))?;
    info!("Connected to database");

    // 3) Apply pending database migrations
    db.with_connection(|conn| Ok(apply_database_migrations(conn)))
        .map_err(|e| format!("DB connection failed: {}", e))??;

    // 4) Reference data
    let inserted = db
        .transaction(plants::ensure_default_plant_type)
        .map_err(|e| format!("Seeding default plant type failed: {}", e))?;
    if inserted {
        info!("Inserted default plant type");
    }

    let services = Services::new(db.clone());

    // 5) Demo data
    if cfg.demo_data_enabled {
        let days = cfg.demo_data_days.get();
        let summary = db
            .transaction(|conn| demo::run(conn, &cfg.demo_user_id, days))
            .map_err(|e| format!("Demo data generation failed: {}", e))?;
        info!("Demo greenhouse {} ready for user {}", summary.greenhouse, cfg.demo_user_id);
    } else {
        info!("Demo data disabled via DEMO_DATA_ENABLED={}", cfg.demo_data_enabled);
    }

    // 6) Ingest uploads from file
    if let Some(path) = options.ingest_file.as_ref() {
        ingest_file(&services, path)?;
    }

    // 7) Report
    if let Some(user) = options.report_user.as_deref() {
        db.transaction(|conn| report::log_user_report(conn, user))
            .map_err(|e| format!("Report for {} failed: {}", user, e))?;
    }

    Ok(())
}
