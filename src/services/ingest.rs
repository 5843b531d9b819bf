//! Data uploads sent by greenhouses: a batch of sensor readings and actuator
//! states, validated and stored atomically.

use crate::db::pool::Database;
use crate::error::{HerbariumError, Result};
use crate::models::herbarium::{ActuatorInput, ReadingInput};
use crate::services::{greenhouses, plants, timeseries};
use diesel::PgConnection;
use log::info;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataUpload {
    pub greenhouse: Uuid,
    #[serde(default)]
    pub sensors: Vec<ReadingInput>,
    #[serde(default)]
    pub actuators: Vec<ActuatorInput>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub readings: usize,
    pub actuator_states: usize,
}

fn invalid<E: std::fmt::Display>(context: &str, err: E) -> HerbariumError {
    if context.is_empty() {
        HerbariumError::InvalidPayload(err.to_string())
    } else {
        HerbariumError::InvalidPayload(format!("{}: {}", context, err))
    }
}

/// Deserialize exactly one JSON document of type `T`; trailing input is an error.
fn parse_document<T: DeserializeOwned>(input: &str, context: &str) -> Result<T> {
    let mut de = serde_json::Deserializer::from_str(input);
    let value: T = serde_path_to_error::deserialize(&mut de).map_err(|e| {
        let path = e.path().to_string();
        invalid(context, format!("{}: {}", path, e.into_inner()))
    })?;
    de.end().map_err(|e| invalid(context, e))?;
    Ok(value)
}

/// Parse a single upload, an array of uploads, or one upload per line.
pub fn parse_uploads(input: &str) -> Result<Vec<DataUpload>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return parse_document(trimmed, "");
    }

    // Split the stream into documents first, then decode each on its own so
    // errors carry the field path.
    let mut documents = serde_json::Deserializer::from_str(trimmed).into_iter::<IgnoredAny>();
    let mut uploads = Vec::new();
    let mut start = 0;
    while let Some(next) = documents.next() {
        let context = format!("upload {}", uploads.len() + 1);
        next.map_err(|e| invalid(&context, e))?;
        let end = documents.byte_offset();
        uploads.push(parse_document(&trimmed[start..end], &context)?);
        start = end;
    }
    Ok(uploads)
}

fn referenced_plants(upload: &DataUpload) -> Vec<Uuid> {
    let ids: BTreeSet<Uuid> = upload
        .sensors
        .iter()
        .filter_map(|r| r.plant)
        .chain(upload.actuators.iter().filter_map(|a| a.plant))
        .collect();
    ids.into_iter().collect()
}

pub fn ingest_upload(conn: &mut PgConnection, upload: DataUpload) -> Result<IngestSummary> {
    let greenhouse = upload.greenhouse;
    if !greenhouses::exists(conn, greenhouse)? {
        return Err(HerbariumError::not_found(format!("greenhouse {greenhouse}")));
    }

    let unknown = plants::exists_batch(conn, &referenced_plants(&upload), Some(greenhouse))?;
    if !unknown.is_empty() {
        let ids = unknown.iter().map(Uuid::to_string).collect::<Vec<_>>().join(", ");
        return Err(HerbariumError::not_found(format!("plant(s) {ids} in greenhouse {greenhouse}")));
    }

    // Readings may name a plant by its prior identifier; store the current one.
    let mut sensors = upload.sensors;
    for reading in sensors.iter_mut() {
        if let Some(plant) = reading.plant {
            reading.plant = plants::find_plant(conn, plant)?.map(|p| p.uuid);
        }
    }
    let mut actuators = upload.actuators;
    for state in actuators.iter_mut() {
        if let Some(plant) = state.plant {
            state.plant = plants::find_plant(conn, plant)?.map(|p| p.uuid);
        }
    }

    let summary = IngestSummary {
        readings: timeseries::append_readings(conn, greenhouse, sensors)?,
        actuator_states: timeseries::append_actuator_states(conn, greenhouse, actuators)?,
    };
    info!(
        "Ingested upload for greenhouse {} (readings={}, actuator_states={})",
        greenhouse, summary.readings, summary.actuator_states
    );
    Ok(summary)
}

#[derive(Debug, Clone)]
pub struct Ingestor {
    db: Database,
}

impl Ingestor {
    pub fn new(db: Database) -> Self {
        Ingestor { db }
    }

    /// Store one upload; nothing is written if any part of it is rejected.
    pub fn ingest(&self, upload: DataUpload) -> Result<IngestSummary> {
        self.db.transaction(|conn| ingest_upload(conn, upload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::herbarium::{ActuatorType, SensorType};
    use crate::testing;
    use chrono::{TimeZone, Utc};

    const SINGLE: &str = r#"{
        "greenhouse": "6f1c2b38-3c1e-4a5e-9d4f-0b7e6f6d2a11",
        "sensors": [
            {"type": "tank", "value": 71.5, "timestamp": "2024-05-01T10:00:00Z"},
            {"type": "moisture", "value": 40.0, "timestamp": "2024-05-01T10:00:00Z",
             "plant": "0d8a7f3e-2b7c-4a2b-8c3d-5e6f7a8b9c0d"}
        ],
        "actuators": [
            {"type": "light_strip", "status": true, "timestamp": "2024-05-01T10:00:00Z"}
        ]
    }"#;

    #[test]
    fn parses_single_upload() {
        let uploads = parse_uploads(SINGLE).unwrap();
        assert_eq!(uploads.len(), 1);
        let upload = &uploads[0];
        assert_eq!(upload.sensors.len(), 2);
        assert_eq!(upload.sensors[0].kind, SensorType::Tank);
        assert_eq!(upload.actuators[0].kind, ActuatorType::LightStrip);
        assert_eq!(upload.actuators[0].timestamp, Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        assert_eq!(referenced_plants(upload).len(), 1);
    }

    #[test]
    fn parses_arrays_and_json_lines() {
        let g = Uuid::new_v4();
        let array = format!(r#"[{{"greenhouse":"{g}"}},{{"greenhouse":"{g}","sensors":[]}}]"#);
        assert_eq!(parse_uploads(&array).unwrap().len(), 2);

        let lines = format!("{{\"greenhouse\":\"{g}\"}}\n\n{{\"greenhouse\":\"{g}\"}}\n");
        let uploads = parse_uploads(&lines).unwrap();
        assert_eq!(uploads.len(), 2);
        assert!(uploads.iter().all(|u| u.sensors.is_empty() && u.actuators.is_empty()));

        assert!(parse_uploads("   ").unwrap().is_empty());
    }

    #[test]
    fn json_lines_keep_every_upload_in_order() {
        let (g1, g2) = (Uuid::new_v4(), Uuid::new_v4());
        let lines = format!(
            "{{\"greenhouse\":\"{g1}\"}}\n{{\"greenhouse\":\"{g2}\",\"sensors\":[{{\"type\":\"light\",\"value\":5,\"timestamp\":\"2024-05-01T10:00:00Z\"}}]}}\n"
        );
        let uploads = parse_uploads(&lines).unwrap();
        assert_eq!(uploads.iter().map(|u| u.greenhouse).collect::<Vec<_>>(), vec![g1, g2]);
        assert_eq!(uploads[1].sensors[0].kind, SensorType::Light);
    }

    #[test]
    fn trailing_input_is_rejected() {
        let g = Uuid::new_v4();
        let single = format!(r#"{{"greenhouse":"{g}"}} trailing garbage"#);
        assert!(matches!(parse_uploads(&single), Err(HerbariumError::InvalidPayload(_))));

        let array = format!(r#"[{{"greenhouse":"{g}"}}] ]"#);
        assert!(matches!(parse_uploads(&array), Err(HerbariumError::InvalidPayload(_))));
    }

    #[test]
    fn json_lines_errors_name_the_upload_and_field() {
        let g = Uuid::new_v4();
        let lines = format!(
            "{{\"greenhouse\":\"{g}\"}}\n{{\"greenhouse\":\"{g}\",\"actuators\":[{{\"type\":\"fan\",\"status\":true,\"timestamp\":\"2024-05-01T10:00:00Z\"}}]}}\n"
        );
        let err = parse_uploads(&lines).unwrap_err();
        let HerbariumError::InvalidPayload(msg) = err else {
            panic!("expected invalid payload, got {err:?}");
        };
        assert!(msg.starts_with("upload 2: "), "{msg}");
        assert!(msg.contains("actuators[0].type"), "{msg}");
    }

    #[test]
    fn parse_errors_name_the_offending_field() {
        let bad = r#"[{"greenhouse":"6f1c2b38-3c1e-4a5e-9d4f-0b7e6f6d2a11",
                       "sensors":[{"type":"humidity","value":1,"timestamp":"2024-05-01T10:00:00Z"}]}]"#;
        let err = parse_uploads(bad).unwrap_err();
        let HerbariumError::InvalidPayload(msg) = err else {
            panic!("expected invalid payload, got {err:?}");
        };
        assert!(msg.contains("sensors[0].type"), "{msg}");
    }

    #[test]
    fn upload_with_foreign_plant_stores_nothing() {
        let Some(ctx) = testing::context() else { return };
        let ingestor = Ingestor::new(ctx.db.clone());
        let home = ctx.greenhouse("home");
        let elsewhere = ctx.greenhouse("elsewhere");
        let own = ctx.plant(home, 0);
        let foreign = ctx.plant(elsewhere, 0);
        let now = Utc::now();

        let upload = DataUpload {
            greenhouse: home,
            sensors: vec![
                testing::reading(SensorType::Moisture, 30.0, now, Some(own)),
                testing::reading(SensorType::Moisture, 31.0, now, Some(foreign)),
            ],
            actuators: Vec::new(),
        };
        let err = ingestor.ingest(upload).unwrap_err();
        assert!(matches!(err, HerbariumError::NotFound(_)));
        assert_eq!(ctx.store.latest_reading(Some(home), None, None).unwrap(), None);
    }

    #[test]
    fn upload_is_stored_and_aliases_are_resolved() {
        let Some(ctx) = testing::context() else { return };
        let ingestor = Ingestor::new(ctx.db.clone());
        let home = ctx.greenhouse("home");
        let plant = ctx.plant(home, 0);
        let legacy = Uuid::new_v4();
        ctx.plants.set_plant_alias(plant, legacy).unwrap();
        let now = Utc::now();

        let summary = ingestor
            .ingest(DataUpload {
                greenhouse: home,
                sensors: vec![
                    testing::reading(SensorType::Moisture, 52.0, now, Some(legacy)),
                    testing::reading(SensorType::Tank, 80.0, now, None),
                ],
                actuators: vec![testing::actuator(ActuatorType::Pump, true, now, None)],
            })
            .unwrap();
        assert_eq!(
            summary,
            IngestSummary {
                readings: 2,
                actuator_states: 1
            }
        );

        let moisture = ctx
            .store
            .latest_reading(None, Some(plant), Some(SensorType::Moisture))
            .unwrap()
            .unwrap();
        assert_eq!(moisture.value, 52.0);
    }

    #[test]
    fn upload_for_unknown_greenhouse_is_not_found() {
        let Some(ctx) = testing::context() else { return };
        let ingestor = Ingestor::new(ctx.db.clone());
        let err = ingestor
            .ingest(DataUpload {
                greenhouse: Uuid::new_v4(),
                sensors: Vec::new(),
                actuators: Vec::new(),
            })
            .unwrap_err();
        assert!(matches!(err, HerbariumError::NotFound(_)));
    }
}
