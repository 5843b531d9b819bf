use crate::error::Result;
use crate::models::herbarium::{ActuatorState, GreenhouseView, PlantView, SensorReading};
use crate::services::{greenhouses, users};
use diesel::PgConnection;
use log::info;

fn fmt_reading(r: &Option<SensorReading>) -> String {
    r.as_ref()
        .map(|r| format!("{:.1} @ {}", r.value, r.timestamp.format("%Y-%m-%d %H:%M")))
        .unwrap_or_else(|| "-".to_string())
}

fn fmt_state(s: &Option<ActuatorState>) -> String {
    match s {
        Some(s) if s.status => "on".to_string(),
        Some(_) => "off".to_string(),
        None => "-".to_string(),
    }
}

pub fn plant_line(plant: &PlantView) -> String {
    format!(
        "#{} {} [{}] moisture={} (goal {:.0}) light={} valve={} light_strip={}",
        plant.position,
        plant.uuid,
        plant.plant_type.name,
        fmt_reading(&plant.moisture_last_reading),
        plant.moisture_goal,
        fmt_reading(&plant.light_last_reading),
        fmt_state(&plant.valve_status),
        fmt_state(&plant.light_strip_status),
    )
}

pub fn greenhouse_line(view: &GreenhouseView) -> String {
    format!(
        "{} \"{}\" last_seen={} tank={} plants={}",
        view.uuid,
        view.name,
        view.last_seen.format("%Y-%m-%d %H:%M:%S"),
        fmt_reading(&view.tank_level),
        view.plants.len()
    )
}

/// Log every greenhouse owned by `user` with its plants' latest state.
pub fn log_user_report(conn: &mut PgConnection, user: &str) -> Result<Vec<GreenhouseView>> {
    let profile = users::get_user(conn, user)?;
    let views = greenhouses::list_by_user(conn, user, false)?;
    info!(
        "Report for {} <{}> ({} greenhouse(s))",
        profile.display_name,
        profile.email,
        views.len()
    );
    for view in &views {
        info!("  {}", greenhouse_line(view));
        for plant in &view.plants {
            info!("    {}", plant_line(plant));
        }
    }
    Ok(views)
}
