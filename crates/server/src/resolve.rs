//! Identity resolution for inbound telemetry: which physical device sent
//! this reading, and which plant does it belong to.

use anyhow::Result;

use crate::db::{Db, Device, DeviceUpdate, NewDevice, Plant};

/// Model recorded for devices that never report one.
const DEFAULT_MODEL: &str = "generic sensor";

/// Location recorded for devices nothing else can place.
const DEFAULT_LOCATION: &str = "Unknown";

// ---------------------------------------------------------------------------
// Device identity
// ---------------------------------------------------------------------------

/// Resolve the human-readable location for a device. An owning-organization
/// id is tried against a user record first, then a foundation record; the
/// submitted location string is only used when neither yields a name.
async fn resolve_location(
    db: &Db,
    foundation_id: Option<i64>,
    supplied: Option<&str>,
) -> Result<Option<String>> {
    if let Some(fid) = foundation_id {
        if let Some(name) = db.user_name(fid).await? {
            return Ok(Some(name));
        }
        if let Some(name) = db.foundation_name(fid).await? {
            return Ok(Some(name));
        }
    }
    Ok(supplied.map(str::to_string))
}

/// Find or create the device record for a submission. No serial means the
/// submission is anonymous and no device is touched. Store failures are
/// fatal for the request; there is no retry here.
pub async fn resolve_device(
    db: &Db,
    serial: Option<&str>,
    model: Option<&str>,
    location: Option<&str>,
    foundation_id: Option<i64>,
    now: i64,
) -> Result<Option<Device>> {
    let Some(serial) = serial else {
        return Ok(None);
    };

    let resolved_location = resolve_location(db, foundation_id, location).await?;

    let device = match db.device_by_serial(serial).await? {
        Some(existing) => {
            // Known unit phoning home: refresh metadata in place. Absent
            // fields keep their stored values so a bare heartbeat does not
            // erase a previously learned model or location.
            db.update_device(
                existing.id,
                &DeviceUpdate {
                    model: model.map(str::to_string),
                    location: resolved_location,
                    foundation_id,
                    last_connection: now,
                },
            )
            .await?
        }
        None => {
            tracing::info!(serial, "registering new device");
            db.insert_device(&NewDevice {
                serial_number: serial.to_string(),
                model: model.unwrap_or(DEFAULT_MODEL).to_string(),
                location: resolved_location.unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
                foundation_id,
                last_connection: now,
            })
            .await?
        }
    };

    Ok(Some(device))
}

// ---------------------------------------------------------------------------
// Plant resolution
// ---------------------------------------------------------------------------

/// Determine which plant a submission targets:
///
/// 1. an explicit plant id in the request,
/// 2. else the plant linked to the resolved device,
/// 3. else the earliest-created adopted plant.
///
/// Returns `Ok(None)` when no candidate exists or the explicit id is
/// dangling; the caller turns that into a not-found outcome.
pub async fn resolve_plant(
    db: &Db,
    explicit: Option<i64>,
    device: Option<&Device>,
) -> Result<Option<Plant>> {
    if let Some(id) = explicit {
        return db.plant_by_id(id).await;
    }

    if let Some(device) = device {
        if let Some(plant) = db.plant_by_device(device.id).await? {
            return Ok(Some(plant));
        }
    }

    db.first_adopted_plant().await
}

// ===========================================================================
// Tests
// ===========================================================================
