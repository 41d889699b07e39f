use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, Pool, Sqlite};
use std::str::FromStr;

use crate::engine::{Category, Mood, Sample};

#[derive(Clone)]
pub struct Db {
    pool: Pool<Sqlite>,
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A physical sensor unit, identified by its stable serial number.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Device {
    pub id: i64,
    pub serial_number: String,
    pub model: String,
    pub location: String,
    pub foundation_id: Option<i64>,
    pub last_connection: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Plant {
    pub id: i64,
    pub name: String,
    pub species: Option<String>,
    pub is_adopted: bool,
    pub user_id: Option<i64>,
    pub device_id: Option<i64>,
}

/// The current (latest) sensor sample for a plant. One row per plant,
/// updated in place on every ingest.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TelemetryReading {
    pub id: i64,
    pub plant_id: i64,
    pub soil_moisture: f64,
    pub temperature: f64,
    pub light: f64,
    pub recorded_at: i64,
}

/// The current derived health classification for a plant. One row per
/// plant, enforced by UNIQUE(plant_id).
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StatusRecord {
    pub id: i64,
    pub plant_id: i64,
    pub status: Category,
    pub mood_index: f64,
    pub mood_face: String,
    pub recorded_at: i64,
}

/// Fields for creating a device record.
#[derive(Debug, Clone)]
pub struct NewDevice {
    pub serial_number: String,
    pub model: String,
    pub location: String,
    pub foundation_id: Option<i64>,
    pub last_connection: i64,
}

/// Partial device update: `None` fields keep their stored value;
/// `last_connection` is always refreshed.
#[derive(Debug, Clone, Default)]
pub struct DeviceUpdate {
    pub model: Option<String>,
    pub location: Option<String>,
    pub foundation_id: Option<i64>,
    pub last_connection: i64,
}

impl Db {
    /// db_url examples:
    /// - "sqlite:plantcare.db?mode=rwc"
    /// - "sqlite:file:testdb?mode=memory&cache=shared" (tests)
    pub async fn connect(db_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("invalid sqlite connection string: {db_url}"))?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to connect to sqlite db: {db_url}"))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Runs SQLx migrations from ./migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to run migrations")?;
        Ok(())
    }

    // ----------------------------
    // Foundations + users
    // ----------------------------

    pub async fn insert_foundation(&self, name: &str, created_at: i64) -> Result<i64> {
        let done = sqlx::query("INSERT INTO foundations (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(created_at)
            .execute(&self.pool)
            .await
            .context("insert_foundation failed")?;
        Ok(done.last_insert_rowid())
    }

    pub async fn foundation_by_name(&self, name: &str) -> Result<Option<i64>> {
        sqlx::query_scalar("SELECT id FROM foundations WHERE name = ? LIMIT 1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("foundation_by_name failed")
    }

    pub async fn foundation_name(&self, id: i64) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT name FROM foundations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("foundation_name failed")
    }

    pub async fn insert_user(&self, name: &str, created_at: i64) -> Result<i64> {
        let done = sqlx::query("INSERT INTO users (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(created_at)
            .execute(&self.pool)
            .await
            .context("insert_user failed")?;
        Ok(done.last_insert_rowid())
    }

    pub async fn user_by_name(&self, name: &str) -> Result<Option<i64>> {
        sqlx::query_scalar("SELECT id FROM users WHERE name = ? LIMIT 1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("user_by_name failed")
    }

    pub async fn user_name(&self, id: i64) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT name FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("user_name failed")
    }

    // ----------------------------
    // Plants
    // ----------------------------

    pub async fn insert_plant(
        &self,
        name: &str,
        species: Option<&str>,
        is_adopted: bool,
    ) -> Result<i64> {
        let done = sqlx::query("INSERT INTO plants (name, species, is_adopted) VALUES (?, ?, ?)")
            .bind(name)
            .bind(species)
            .bind(is_adopted)
            .execute(&self.pool)
            .await
            .context("insert_plant failed")?;
        Ok(done.last_insert_rowid())
    }

    pub async fn plant_by_id(&self, id: i64) -> Result<Option<Plant>> {
        sqlx::query_as::<_, Plant>(
            "SELECT id, name, species, is_adopted, user_id, device_id FROM plants WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("plant_by_id failed")
    }

    pub async fn plant_by_name(&self, name: &str) -> Result<Option<Plant>> {
        sqlx::query_as::<_, Plant>(
            "SELECT id, name, species, is_adopted, user_id, device_id \
             FROM plants WHERE name = ? ORDER BY id LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("plant_by_name failed")
    }

    /// The plant linked to a device. At most one plant links a given device;
    /// the lowest id wins if data ever violates that.
    pub async fn plant_by_device(&self, device_id: i64) -> Result<Option<Plant>> {
        sqlx::query_as::<_, Plant>(
            "SELECT id, name, species, is_adopted, user_id, device_id \
             FROM plants WHERE device_id = ? ORDER BY id LIMIT 1",
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
        .context("plant_by_device failed")
    }

    /// Deterministic adopted-plant fallback: earliest-created adopted plant.
    pub async fn first_adopted_plant(&self) -> Result<Option<Plant>> {
        sqlx::query_as::<_, Plant>(
            "SELECT id, name, species, is_adopted, user_id, device_id \
             FROM plants WHERE is_adopted = 1 ORDER BY id LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .context("first_adopted_plant failed")
    }

    pub async fn attach_device(&self, plant_id: i64, device_id: i64) -> Result<()> {
        sqlx::query("UPDATE plants SET device_id = ? WHERE id = ?")
            .bind(device_id)
            .bind(plant_id)
            .execute(&self.pool)
            .await
            .context("attach_device failed")?;
        Ok(())
    }

    // ----------------------------
    // Devices
    // ----------------------------

    pub async fn device_by_serial(&self, serial: &str) -> Result<Option<Device>> {
        sqlx::query_as::<_, Device>(
            "SELECT id, serial_number, model, location, foundation_id, last_connection \
             FROM devices WHERE serial_number = ?",
        )
        .bind(serial)
        .fetch_optional(&self.pool)
        .await
        .context("device_by_serial failed")
    }

    pub async fn device_by_id(&self, id: i64) -> Result<Option<Device>> {
        sqlx::query_as::<_, Device>(
            "SELECT id, serial_number, model, location, foundation_id, last_connection \
             FROM devices WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("device_by_id failed")
    }

    pub async fn insert_device(&self, d: &NewDevice) -> Result<Device> {
        let done = sqlx::query(
            "INSERT INTO devices (serial_number, model, location, foundation_id, last_connection) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&d.serial_number)
        .bind(&d.model)
        .bind(&d.location)
        .bind(d.foundation_id)
        .bind(d.last_connection)
        .execute(&self.pool)
        .await
        .context("insert_device failed")?;

        Ok(Device {
            id: done.last_insert_rowid(),
            serial_number: d.serial_number.clone(),
            model: d.model.clone(),
            location: d.location.clone(),
            foundation_id: d.foundation_id,
            last_connection: d.last_connection,
        })
    }

    /// Partial in-place update: only supplied fields overwrite, the
    /// last-contact timestamp is always refreshed.
    pub async fn update_device(&self, id: i64, up: &DeviceUpdate) -> Result<Device> {
        sqlx::query(
            "UPDATE devices SET \
               model = COALESCE(?, model), \
               location = COALESCE(?, location), \
               foundation_id = COALESCE(?, foundation_id), \
               last_connection = ? \
             WHERE id = ?",
        )
        .bind(&up.model)
        .bind(&up.location)
        .bind(up.foundation_id)
        .bind(up.last_connection)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("update_device failed")?;

        self.device_by_id(id)
            .await?
            .context("device row missing after update")
    }

    // ----------------------------
    // Telemetry readings (current-value upsert)
    // ----------------------------

    pub async fn reading_for_plant(&self, plant_id: i64) -> Result<Option<TelemetryReading>> {
        sqlx::query_as::<_, TelemetryReading>(
            "SELECT id, plant_id, soil_moisture, temperature, light, recorded_at \
             FROM plant_stats WHERE plant_id = ? ORDER BY id LIMIT 1",
        )
        .bind(plant_id)
        .fetch_optional(&self.pool)
        .await
        .context("reading_for_plant failed")
    }

    /// Update the plant's current reading in place, or insert it if the
    /// plant has no reading yet. Keeps at most one current row per plant no
    /// matter how often telemetry is re-submitted.
    pub async fn upsert_reading(
        &self,
        plant_id: i64,
        sample: &Sample,
        recorded_at: i64,
    ) -> Result<TelemetryReading> {
        if let Some(current) = self.reading_for_plant(plant_id).await? {
            sqlx::query(
                "UPDATE plant_stats SET soil_moisture = ?, temperature = ?, light = ?, \
                 recorded_at = ? WHERE id = ?",
            )
            .bind(sample.soil_moisture)
            .bind(sample.temperature)
            .bind(sample.light)
            .bind(recorded_at)
            .bind(current.id)
            .execute(&self.pool)
            .await
            .context("update plant_stats failed")?;

            return Ok(TelemetryReading {
                id: current.id,
                plant_id,
                soil_moisture: sample.soil_moisture,
                temperature: sample.temperature,
                light: sample.light,
                recorded_at,
            });
        }

        let done = sqlx::query(
            "INSERT INTO plant_stats (plant_id, soil_moisture, temperature, light, recorded_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(plant_id)
        .bind(sample.soil_moisture)
        .bind(sample.temperature)
        .bind(sample.light)
        .bind(recorded_at)
        .execute(&self.pool)
        .await
        .context("insert plant_stats failed")?;

        Ok(TelemetryReading {
            id: done.last_insert_rowid(),
            plant_id,
            soil_moisture: sample.soil_moisture,
            temperature: sample.temperature,
            light: sample.light,
            recorded_at,
        })
    }

    // ----------------------------
    // Status records (duplicate-safe upsert)
    // ----------------------------

    /// Cheap existence probe; avoids pulling the full row when the caller
    /// only needs to pick a path.
    pub async fn status_exists(&self, plant_id: i64) -> Result<bool> {
        let exists: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM plant_status WHERE plant_id = ?)")
                .bind(plant_id)
                .fetch_one(&self.pool)
                .await
                .context("status_exists failed")?;
        Ok(exists != 0)
    }

    pub async fn status_for_plant(&self, plant_id: i64) -> Result<Option<StatusRecord>> {
        sqlx::query_as::<_, StatusRecord>(
            "SELECT id, plant_id, status, mood_index, mood_face, recorded_at \
             FROM plant_status WHERE plant_id = ?",
        )
        .bind(plant_id)
        .fetch_optional(&self.pool)
        .await
        .context("status_for_plant failed")
    }

    /// Persist the plant's current status, updating in place when a record
    /// already exists. Near-simultaneous submissions for the same plant
    /// (device reconnect storms) can race on the first insert; the unique
    /// constraint on plant_id picks a winner and the loser recovers by
    /// updating the winner's row.
    pub async fn upsert_status(
        &self,
        plant_id: i64,
        mood: &Mood,
        recorded_at: i64,
    ) -> Result<StatusRecord> {
        if self.status_exists(plant_id).await? {
            if let Some(current) = self.status_for_plant(plant_id).await? {
                return self
                    .update_status(current.id, plant_id, mood, recorded_at)
                    .await;
            }
            // Row removed between probe and fetch; the insert below covers it.
        }
        self.insert_status_or_recover(plant_id, mood, recorded_at).await
    }

    /// Insert a status row; on a uniqueness conflict (a concurrent insert
    /// won) fetch the surviving row and update it instead. Any other
    /// failure propagates.
    pub async fn insert_status_or_recover(
        &self,
        plant_id: i64,
        mood: &Mood,
        recorded_at: i64,
    ) -> Result<StatusRecord> {
        let inserted = sqlx::query(
            "INSERT INTO plant_status (plant_id, status, mood_index, mood_face, recorded_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(plant_id)
        .bind(mood.category)
        .bind(mood.mood_index)
        .bind(&mood.mood_face)
        .bind(recorded_at)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(done) => Ok(StatusRecord {
                id: done.last_insert_rowid(),
                plant_id,
                status: mood.category,
                mood_index: mood.mood_index,
                mood_face: mood.mood_face.clone(),
                recorded_at,
            }),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                tracing::debug!(plant_id, "lost status insert race, updating winner row");
                let current = self
                    .status_for_plant(plant_id)
                    .await?
                    .context("status row missing after unique conflict")?;
                self.update_status(current.id, plant_id, mood, recorded_at)
                    .await
            }
            Err(e) => Err(e).context("insert plant_status failed"),
        }
    }

    async fn update_status(
        &self,
        id: i64,
        plant_id: i64,
        mood: &Mood,
        recorded_at: i64,
    ) -> Result<StatusRecord> {
        sqlx::query(
            "UPDATE plant_status SET status = ?, mood_index = ?, mood_face = ?, recorded_at = ? \
             WHERE id = ?",
        )
        .bind(mood.category)
        .bind(mood.mood_index)
        .bind(&mood.mood_face)
        .bind(recorded_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("update plant_status failed")?;

        Ok(StatusRecord {
            id,
            plant_id,
            status: mood.category,
            mood_index: mood.mood_index,
            mood_face: mood.mood_face.clone(),
            recorded_at,
        })
    }
}

// ===========================================================================
// Tests
// ===========================================================================
