//! Connection pool and scoped transactions.
//!
//! Every directory operation runs through [`Database::transaction`], which
//! checks a connection out of the pool, commits when the closure returns `Ok`
//! and rolls back otherwise. The pooled connection is returned on drop, so the
//! resource is released on every exit path. Calls nested inside an open
//! transaction become savepoints.

use diesel::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use log::debug;
use std::num::NonZeroU32;

use crate::error::{HerbariumError, Result};

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn connect(database_url: &str, max_size: NonZeroU32) -> Result<Self> {
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = Pool::builder().max_size(max_size.get()).build(manager)?;
        debug!("Connection pool ready (max_size={})", max_size);
        Ok(Database { pool })
    }

    /// Build a pool whose connections are prepared by `customizer` on creation.
    pub fn with_customizer<C>(database_url: &str, max_size: NonZeroU32, customizer: C) -> Result<Self>
    where
        C: CustomizeConnection<PgConnection, diesel::r2d2::Error> + 'static,
    {
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(max_size.get())
            .connection_customizer(Box::new(customizer))
            .build(manager)?;
        Ok(Database { pool })
    }

    /// Run `f` inside a transaction on a pooled connection.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T>,
    {
        let mut pooled = self.pool.get()?;
        let conn: &mut PgConnection = &mut pooled;
        conn.transaction::<T, HerbariumError, _>(f)
    }

    /// Run `f` on a pooled connection without opening a transaction.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T>,
    {
        let mut pooled = self.pool.get()?;
        let conn: &mut PgConnection = &mut pooled;
        f(conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.pool.state();
        f.debug_struct("Database")
            .field("connections", &state.connections)
            .field("idle_connections", &state.idle_connections)
            .finish()
    }
}
