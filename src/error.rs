//! Error taxonomy shared by the directories and the time-series store.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;
use uuid::Uuid;

/// Name of the partial unique index guarding active plant positions.
pub const ACTIVE_POSITION_INDEX: &str = "plants_active_position_idx";

#[derive(Debug, Error)]
pub enum HerbariumError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("position {position} in greenhouse {greenhouse} is already occupied")]
    PositionOccupied { greenhouse: Uuid, position: i32 },
    #[error("plant {0} was already removed")]
    AlreadyRemoved(Uuid),
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("connection pool error: {0}")]
    Pool(String),
    #[error("database error: {0}")]
    Database(DieselError),
}

pub type Result<T, E = HerbariumError> = std::result::Result<T, E>;

impl From<DieselError> for HerbariumError {
    fn from(value: DieselError) -> Self {
        match value {
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::CheckViolation
                | DatabaseErrorKind::ForeignKeyViolation
                | DatabaseErrorKind::NotNullViolation => HerbariumError::ConstraintViolation(info.message().to_string()),
                DatabaseErrorKind::UniqueViolation => {
                    let target = info
                        .constraint_name()
                        .or_else(|| info.table_name())
                        .unwrap_or("record")
                        .to_string();
                    HerbariumError::AlreadyExists(target)
                }
                other => HerbariumError::Database(DieselError::DatabaseError(other, info)),
            },
            other => HerbariumError::Database(other),
        }
    }
}

impl From<diesel::r2d2::PoolError> for HerbariumError {
    fn from(value: diesel::r2d2::PoolError) -> Self {
        HerbariumError::Pool(value.to_string())
    }
}

impl HerbariumError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        HerbariumError::NotFound(what.to_string())
    }

    /// True when a unique violation came from the active-position index.
    pub fn is_position_conflict(&self) -> bool {
        matches!(self, HerbariumError::AlreadyExists(target) if target == ACTIVE_POSITION_INDEX)
    }
}
