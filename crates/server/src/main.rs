mod config;
mod db;
mod display;
mod engine;
mod events;
mod ingest;
mod resolve;
mod web;

use anyhow::Result;
use rumqttc::{AsyncClient, MqttOptions};
use std::{env, sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use db::Db;
use engine::StatusEngine;
use events::EventPublisher;
use web::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Database ────────────────────────────────────────────────────
    let db_url =
        env::var("DB_URL").unwrap_or_else(|_| "sqlite:plantcare.db?mode=rwc".to_string());
    let db = Db::connect(&db_url).await?;
    db.migrate().await?;

    // ── Config file (engine thresholds + optional seed) ─────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::load(&config_path)?;
    config::apply(&cfg, &db).await?;
    let engine = StatusEngine::new(cfg.engine);

    // ── Event fan-out ───────────────────────────────────────────────
    // The broker is optional: persisted rows are authoritative, fan-out is
    // best-effort.
    let publisher = match env::var("MQTT_HOST") {
        Ok(broker) => {
            let port: u16 = env::var("MQTT_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1883);

            let mut mqttoptions = MqttOptions::new("plantcare-server", broker, port);
            mqttoptions.set_keep_alive(Duration::from_secs(30));

            let (client, mut eventloop) = AsyncClient::new(mqttoptions, 20);
            tokio::spawn(async move {
                loop {
                    if let Err(e) = eventloop.poll().await {
                        tracing::warn!("mqtt error: {e}. reconnecting...");
                        sleep(Duration::from_secs(2)).await;
                    }
                }
            });
            tracing::info!("mqtt event fan-out enabled");
            EventPublisher::new(client)
        }
        Err(_) => {
            tracing::info!("MQTT_HOST not set, event fan-out disabled");
            EventPublisher::disabled()
        }
    };

    // ── Web server ──────────────────────────────────────────────────
    let state = AppState {
        db,
        engine: Arc::new(engine),
        publisher: Arc::new(publisher),
    };
    web::serve(state).await
}
