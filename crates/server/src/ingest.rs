//! Ingestion orchestration: one inbound submission is resolved, normalized,
//! persisted twice (current reading + current status) and fanned out.
//!
//! No retries and no rollback: the sensor re-submits on failure, and a
//! reading persisted without its status is an accepted inconsistency window.

use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;

use crate::db::{Db, Device, StatusRecord, TelemetryReading};
use crate::engine::StatusEngine;
use crate::events::EventPublisher;
use crate::resolve;

// ---------------------------------------------------------------------------
// Request payload
// ---------------------------------------------------------------------------

/// An analog value as submitted by sensor firmware: some units send numbers,
/// older ones send strings. Unparseable text coerces to 0 rather than
/// failing the reading.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AnalogValue {
    Number(f64),
    Text(String),
}

impl AnalogValue {
    pub fn to_f64(&self) -> f64 {
        match self {
            Self::Number(v) => *v,
            Self::Text(s) => s.trim().parse().unwrap_or(0.0),
        }
    }
}

/// The ingest request body. The three readings are required; everything
/// else refines device/plant resolution.
#[derive(Debug, Default, Deserialize)]
pub struct SensorPayload {
    pub temperature: Option<AnalogValue>,
    pub light: Option<AnalogValue>,
    pub soil_moisture: Option<AnalogValue>,
    pub plant_id: Option<i64>,
    pub device_serial: Option<String>,
    pub device_model: Option<String>,
    pub device_location: Option<String>,
    pub foundation_id: Option<i64>,
}

impl SensorPayload {
    /// Check the required readings are present and coerce them. Reported
    /// field names cover everything missing, not just the first.
    fn require_readings(&self) -> Result<(f64, f64, f64), IngestError> {
        match (&self.temperature, &self.light, &self.soil_moisture) {
            (Some(t), Some(l), Some(m)) => Ok((t.to_f64(), l.to_f64(), m.to_f64())),
            _ => {
                let mut missing = Vec::new();
                if self.temperature.is_none() {
                    missing.push("temperature");
                }
                if self.light.is_none() {
                    missing.push("light");
                }
                if self.soil_moisture.is_none() {
                    missing.push("soil_moisture");
                }
                Err(IngestError::MissingFields(missing.join(", ")))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum IngestError {
    /// Required readings absent from the request. No store access happens.
    #[error("missing required fields: {0}")]
    MissingFields(String),
    /// No plant determinable, or the requested plant does not exist.
    #[error("no plant resolved; supply plant_id or adopt a plant")]
    PlantNotFound,
    /// Any persistence failure. Uniqueness conflicts never surface here;
    /// the store recovers them internally.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Everything a successful ingest produced.
#[derive(Debug)]
pub struct IngestOutcome {
    pub stats: TelemetryReading,
    pub status: StatusRecord,
    pub device: Option<Device>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Run one submission through the pipeline: validate, resolve device, resolve
/// plant, normalize, persist reading, compute and persist status, publish.
pub async fn ingest(
    db: &Db,
    engine: &StatusEngine,
    publisher: &EventPublisher,
    payload: &SensorPayload,
) -> Result<IngestOutcome, IngestError> {
    let (temperature, light, soil_moisture) = payload.require_readings()?;

    let now = OffsetDateTime::now_utc().unix_timestamp();

    let device = resolve::resolve_device(
        db,
        payload.device_serial.as_deref(),
        payload.device_model.as_deref(),
        payload.device_location.as_deref(),
        payload.foundation_id,
        now,
    )
    .await?;

    let plant = resolve::resolve_plant(db, payload.plant_id, device.as_ref())
        .await?
        .ok_or(IngestError::PlantNotFound)?;

    let sample = engine.normalize(temperature, light, soil_moisture);
    let stats = db.upsert_reading(plant.id, &sample, now).await?;

    let mood = engine.compute(sample.temperature, sample.light, sample.soil_moisture);
    let status = db.upsert_status(plant.id, &mood, now).await?;

    tracing::info!(
        plant_id = plant.id,
        status = mood.category.as_str(),
        mood_index = mood.mood_index,
        "telemetry ingested"
    );

    publisher.publish_ingest(&stats, &status, device.as_ref());

    Ok(IngestOutcome {
        stats,
        status,
        device,
    })
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::test_db;
    use crate::engine::Category;

    fn num(v: f64) -> Option<AnalogValue> {
        Some(AnalogValue::Number(v))
    }

    fn payload(t: f64, l: f64, m: f64) -> SensorPayload {
        SensorPayload {
            temperature: num(t),
            light: num(l),
            soil_moisture: num(m),
            ..SensorPayload::default()
        }
    }

    async fn count(db: &Db, sql: &str) -> i64 {
        sqlx::query_scalar(sql).fetch_one(db.pool()).await.unwrap()
    }

    // -- payload coercion ---------------------------------------------------

    #[test]
    fn analog_values_coerce_strings() {
        assert_eq!(AnalogValue::Number(23.5).to_f64(), 23.5);
        assert_eq!(AnalogValue::Text("23.5".into()).to_f64(), 23.5);
        assert_eq!(AnalogValue::Text(" 42 ".into()).to_f64(), 42.0);
        assert_eq!(AnalogValue::Text("garbage".into()).to_f64(), 0.0);
        assert_eq!(AnalogValue::Text("".into()).to_f64(), 0.0);
    }

    #[test]
    fn payload_deserializes_mixed_types() {
        let p: SensorPayload = serde_json::from_str(
            r#"{"temperature": "21.5", "light": 0.6, "soil_moisture": 44, "device_serial": "SN-1"}"#,
        )
        .unwrap();
        let (t, l, m) = p.require_readings().unwrap();
        assert_eq!(t, 21.5);
        assert_eq!(l, 0.6);
        assert_eq!(m, 44.0);
        assert_eq!(p.device_serial.as_deref(), Some("SN-1"));
    }

    #[test]
    fn missing_fields_are_all_reported() {
        let p = SensorPayload {
            light: num(0.5),
            ..SensorPayload::default()
        };
        let err = p.require_readings().unwrap_err();
        match err {
            IngestError::MissingFields(fields) => {
                assert!(fields.contains("temperature"));
                assert!(fields.contains("soil_moisture"));
                assert!(!fields.contains("light"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    // -- orchestration ------------------------------------------------------

    #[tokio::test]
    async fn full_ingest_persists_reading_and_status() {
        let db = test_db("ingest_full").await;
        let plant = db.insert_plant("fern", None, true).await.unwrap();
        let engine = StatusEngine::default();
        let publisher = EventPublisher::disabled();

        let outcome = ingest(&db, &engine, &publisher, &payload(25.0, 500.0, 50.0))
            .await
            .unwrap();

        assert_eq!(outcome.stats.plant_id, plant);
        assert_eq!(outcome.status.status, Category::Healthy);
        assert!(outcome.device.is_none());
        assert_eq!(count(&db, "SELECT COUNT(*) FROM plant_stats").await, 1);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM plant_status").await, 1);
    }

    #[tokio::test]
    async fn resubmission_updates_rather_than_appends() {
        let db = test_db("ingest_idempotent").await;
        db.insert_plant("fern", None, true).await.unwrap();
        let engine = StatusEngine::default();
        let publisher = EventPublisher::disabled();

        let first = ingest(&db, &engine, &publisher, &payload(25.0, 500.0, 50.0))
            .await
            .unwrap();
        let second = ingest(&db, &engine, &publisher, &payload(25.0, 500.0, 75.0))
            .await
            .unwrap();

        assert_eq!(second.stats.id, first.stats.id);
        assert_eq!(second.status.id, first.status.id);
        assert_eq!(second.status.status, Category::Recovering);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM plant_stats").await, 1);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM plant_status").await, 1);
    }

    #[tokio::test]
    async fn ingest_normalizes_before_computing() {
        let db = test_db("ingest_normalizes").await;
        db.insert_plant("fern", None, true).await.unwrap();
        let engine = StatusEngine::default();
        let publisher = EventPublisher::disabled();

        // Fractional light is rescaled onto the device scale before both
        // persistence and status derivation.
        let outcome = ingest(&db, &engine, &publisher, &payload(25.0, 0.5, 50.0))
            .await
            .unwrap();
        assert_eq!(outcome.stats.light, 511.5);
        assert_eq!(outcome.status.status, Category::Healthy);
    }

    #[tokio::test]
    async fn ingest_without_any_plant_fails_not_found() {
        let db = test_db("ingest_no_plant").await;
        let engine = StatusEngine::default();
        let publisher = EventPublisher::disabled();

        let err = ingest(&db, &engine, &publisher, &payload(25.0, 500.0, 50.0))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::PlantNotFound));
        assert_eq!(count(&db, "SELECT COUNT(*) FROM plant_stats").await, 0);
    }

    #[tokio::test]
    async fn ingest_with_serial_registers_the_device() {
        let db = test_db("ingest_device").await;
        db.insert_plant("fern", None, true).await.unwrap();
        let engine = StatusEngine::default();
        let publisher = EventPublisher::disabled();

        let mut p = payload(25.0, 500.0, 50.0);
        p.device_serial = Some("SN-42".into());
        p.device_model = Some("esp32-soil".into());

        let outcome = ingest(&db, &engine, &publisher, &p).await.unwrap();
        let device = outcome.device.unwrap();
        assert_eq!(device.serial_number, "SN-42");
        assert_eq!(device.model, "esp32-soil");

        // Same serial again: still one device row.
        ingest(&db, &engine, &publisher, &p).await.unwrap();
        assert_eq!(count(&db, "SELECT COUNT(*) FROM devices").await, 1);
    }

    #[tokio::test]
    async fn explicit_plant_id_overrides_fallback() {
        let db = test_db("ingest_explicit").await;
        db.insert_plant("adopted", None, true).await.unwrap();
        let target = db.insert_plant("mine", None, false).await.unwrap();
        let engine = StatusEngine::default();
        let publisher = EventPublisher::disabled();

        let mut p = payload(25.0, 500.0, 50.0);
        p.plant_id = Some(target);

        let outcome = ingest(&db, &engine, &publisher, &p).await.unwrap();
        assert_eq!(outcome.stats.plant_id, target);
    }

    #[tokio::test]
    async fn dangling_explicit_plant_id_fails_not_found() {
        let db = test_db("ingest_dangling").await;
        db.insert_plant("adopted", None, true).await.unwrap();
        let engine = StatusEngine::default();
        let publisher = EventPublisher::disabled();

        let mut p = payload(25.0, 500.0, 50.0);
        p.plant_id = Some(999);

        let err = ingest(&db, &engine, &publisher, &p).await.unwrap_err();
        assert!(matches!(err, IngestError::PlantNotFound));
    }
}
