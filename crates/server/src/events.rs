//! Real-time event fan-out over MQTT.
//!
//! Publication is strictly best-effort: the persisted rows are the source of
//! truth, so a broker outage must never fail an ingest. Every publish error
//! is logged and swallowed.

use rumqttc::{AsyncClient, QoS};
use serde_json::json;

use crate::db::{Device, StatusRecord, TelemetryReading};
use crate::display;

/// Firehose topic carrying every ingested reading.
pub const GLOBAL_TOPIC: &str = "plants/telemetry";

pub fn plant_telemetry_topic(plant_id: i64) -> String {
    format!("plants/{plant_id}/telemetry")
}

pub fn plant_mood_topic(plant_id: i64) -> String {
    format!("plants/{plant_id}/mood")
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// MQTT-backed publisher. Constructed without a client when no broker is
/// configured, in which case every publish is a no-op.
pub struct EventPublisher {
    client: Option<AsyncClient>,
}

impl EventPublisher {
    pub fn new(client: AsyncClient) -> Self {
        Self {
            client: Some(client),
        }
    }

    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Emit the three post-ingest notifications: the global firehose, the
    /// per-plant feed (same payload), and the lighter per-plant mood update.
    ///
    /// Uses `try_publish` so a full request queue (broker outage) drops the
    /// event instead of stalling the ingest response.
    pub fn publish_ingest(
        &self,
        stats: &TelemetryReading,
        status: &StatusRecord,
        device: Option<&Device>,
    ) {
        let Some(client) = &self.client else {
            return;
        };

        let matrix = display::matrix_for(status.status, Some(status.mood_index));

        let full = json!({
            "type": "telemetry_received",
            "data": {
                "stats": stats,
                "status": status,
                "device": device,
                "matrix": matrix,
            },
            "ts": status.recorded_at,
        });
        publish_json(client, GLOBAL_TOPIC, &full);
        publish_json(client, &plant_telemetry_topic(stats.plant_id), &full);

        let mood = json!({
            "type": "mood_changed",
            "data": {
                "status": status.status,
                "mood_index": status.mood_index,
                "mood_face": status.mood_face,
                "matrix": matrix,
            },
            "ts": status.recorded_at,
        });
        publish_json(client, &plant_mood_topic(stats.plant_id), &mood);
    }
}

fn publish_json(client: &AsyncClient, topic: &str, payload: &serde_json::Value) {
    let bytes = match serde_json::to_vec(payload) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(topic, "failed to encode event payload: {e}");
            return;
        }
    };

    if let Err(e) = client.try_publish(topic, QoS::AtLeastOnce, false, bytes) {
        tracing::warn!(topic, "event publish failed: {e}");
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Category;
    use rumqttc::MqttOptions;

    fn stats() -> TelemetryReading {
        TelemetryReading {
            id: 1,
            plant_id: 7,
            soil_moisture: 50.0,
            temperature: 25.0,
            light: 500.0,
            recorded_at: 1_700_000_000,
        }
    }

    fn status() -> StatusRecord {
        StatusRecord {
            id: 1,
            plant_id: 7,
            status: Category::Healthy,
            mood_index: 1.0,
            mood_face: "😊".to_string(),
            recorded_at: 1_700_000_000,
        }
    }

    // -- topic builders -----------------------------------------------------

    #[test]
    fn per_plant_topics_embed_the_id() {
        assert_eq!(plant_telemetry_topic(7), "plants/7/telemetry");
        assert_eq!(plant_mood_topic(7), "plants/7/mood");
    }

    #[test]
    fn global_topic_is_not_plant_scoped() {
        assert!(!GLOBAL_TOPIC.contains("{"));
        assert_ne!(GLOBAL_TOPIC, plant_telemetry_topic(0));
    }

    // -- best-effort behaviour ----------------------------------------------

    #[test]
    fn disabled_publisher_is_a_silent_noop() {
        let publisher = EventPublisher::disabled();
        assert!(!publisher.is_enabled());
        publisher.publish_ingest(&stats(), &status(), None);
    }

    #[test]
    fn publish_without_broker_does_not_fail() {
        // An unpolled client buffers; a dead one errors. Either way the
        // publisher must swallow it.
        let opts = MqttOptions::new("test-publisher", "127.0.0.1", 1883);
        let (client, _eventloop) = AsyncClient::new(opts, 10);
        let publisher = EventPublisher::new(client);
        assert!(publisher.is_enabled());
        publisher.publish_ingest(&stats(), &status(), None);
    }
}
