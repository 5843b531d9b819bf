use crate::db::models::{DEFAULT_LANGUAGE, NewUser, User};
use crate::db::pool::Database;
use crate::error::{HerbariumError, Result};
use crate::schema;
use chrono::Utc;
use diesel::PgConnection;
use diesel::prelude::*;
use log::info;

pub const MAX_USER_ID_LEN: usize = 128;
pub const MAX_DISPLAY_NAME_LEN: usize = 256;
pub const MAX_EMAIL_LEN: usize = 512;

/// Reject empty text or text longer than `max` characters (the column width).
pub fn check_length(field: &str, value: &str, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len == 0 || len > max {
        return Err(HerbariumError::ConstraintViolation(format!(
            "{field} must be 1..={max} characters, got {len}"
        )));
    }
    Ok(())
}

/// Language codes are two ASCII letters, stored lowercase.
pub fn normalize_language(language: Option<&str>) -> Result<String> {
    let Some(raw) = language.map(str::trim).filter(|l| !l.is_empty()) else {
        return Ok(DEFAULT_LANGUAGE.to_string());
    };
    if raw.len() != 2 || !raw.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(HerbariumError::ConstraintViolation(format!(
            "language must be a 2-letter code, got {raw:?}"
        )));
    }
    Ok(raw.to_ascii_lowercase())
}

pub fn exists(conn: &mut PgConnection, id: &str) -> Result<bool> {
    use schema::users::dsl as U;

    Ok(diesel::select(diesel::dsl::exists(U::users.find(id))).get_result(conn)?)
}

pub fn get_user(conn: &mut PgConnection, id: &str) -> Result<User> {
    use schema::users::dsl as U;

    U::users
        .find(id)
        .select(User::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| HerbariumError::not_found(format!("user {id}")))
}

pub fn insert_user(
    conn: &mut PgConnection,
    id: &str,
    display_name: &str,
    email: &str,
    language: Option<&str>,
) -> Result<()> {
    use schema::users::dsl as U;

    check_length("user id", id, MAX_USER_ID_LEN)?;
    check_length("display name", display_name, MAX_DISPLAY_NAME_LEN)?;
    check_length("email", email, MAX_EMAIL_LEN)?;
    if exists(conn, id)? {
        return Err(HerbariumError::AlreadyExists(format!("user {id}")));
    }

    let row = NewUser {
        uuid: id.to_string(),
        display_name: display_name.to_string(),
        email: email.to_string(),
        language: normalize_language(language)?,
        joined_on: Utc::now(),
    };
    diesel::insert_into(U::users).values(&row).execute(conn)?;
    info!("User {} registered (language={})", id, row.language);
    Ok(())
}

#[derive(Debug, Clone)]
pub struct UserDirectory {
    db: Database,
}

impl UserDirectory {
    pub fn new(db: Database) -> Self {
        UserDirectory { db }
    }

    pub fn exists(&self, id: &str) -> Result<bool> {
        self.db.transaction(|conn| exists(conn, id))
    }

    pub fn get_user(&self, id: &str) -> Result<User> {
        self.db.transaction(|conn| get_user(conn, id))
    }

    pub fn insert_user(&self, id: &str, display_name: &str, email: &str, language: Option<&str>) -> Result<()> {
        self.db
            .transaction(|conn| insert_user(conn, id, display_name, email, language))
    }
}
