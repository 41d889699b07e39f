//! Sensor-unit companion binary: samples the (simulated) sensor suite,
//! submits readings to the backend, and mirrors the plant's mood bitmap in
//! the terminal the way the LED matrix on the real unit would show it.

mod sim;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{env, time::Duration};

use sim::{PlantSim, SampleSet, Scenario};

/// Fallback face shown when the backend is unreachable.
const DEFAULT_FACE: [[u8; 8]; 8] = [
    [0, 0, 1, 1, 1, 1, 0, 0],
    [0, 1, 0, 0, 0, 0, 1, 0],
    [1, 0, 1, 0, 0, 1, 0, 1],
    [1, 0, 0, 0, 0, 0, 0, 1],
    [1, 0, 0, 0, 0, 0, 0, 1],
    [1, 0, 1, 1, 1, 1, 0, 1],
    [0, 1, 0, 0, 0, 0, 1, 0],
    [0, 0, 1, 1, 1, 1, 0, 0],
];

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ReadingPayload<'a> {
    temperature: f64,
    light: f64,
    soil_moisture: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    plant_id: Option<i64>,
    device_serial: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_location: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    foundation_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct EmojiResponse {
    matrix: Vec<Vec<u8>>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    mood_face: Option<String>,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

struct NodeConfig {
    backend_url: String,
    plant_id: Option<i64>,
    serial: String,
    model: Option<String>,
    location: Option<String>,
    foundation_id: Option<i64>,
    sample_every_s: u64,
    display_every_s: u64,
    scenario: Scenario,
}

impl NodeConfig {
    fn from_env() -> Self {
        let backend_url = env::var("BACKEND_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string())
            .trim_end_matches('/')
            .to_string();

        Self {
            backend_url,
            plant_id: env::var("PLANT_ID").ok().and_then(|s| s.parse().ok()),
            serial: env::var("DEVICE_SERIAL").unwrap_or_else(|_| "plantcare-node-1".to_string()),
            model: env::var("DEVICE_MODEL").ok(),
            location: env::var("DEVICE_LOCATION").ok(),
            foundation_id: env::var("FOUNDATION_ID").ok().and_then(|s| s.parse().ok()),
            sample_every_s: env::var("SAMPLE_EVERY_S")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
            display_every_s: env::var("DISPLAY_EVERY_S")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            scenario: Scenario::from_str_lossy(
                &env::var("SIM_SCENARIO").unwrap_or_default(),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Backend calls
// ---------------------------------------------------------------------------

async fn send_reading(client: &reqwest::Client, cfg: &NodeConfig, s: &SampleSet) -> Result<()> {
    let payload = ReadingPayload {
        temperature: s.temperature,
        light: s.light,
        soil_moisture: s.soil_moisture,
        plant_id: cfg.plant_id,
        device_serial: &cfg.serial,
        device_model: cfg.model.as_deref(),
        device_location: cfg.location.as_deref(),
        foundation_id: cfg.foundation_id,
    };

    let resp = client
        .post(format!("{}/sensor-data", cfg.backend_url))
        .json(&payload)
        .send()
        .await
        .context("sending reading")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        bail!("backend rejected reading: {status} {body}");
    }

    let body: serde_json::Value = resp.json().await.context("parsing ingest response")?;
    tracing::info!(
        status = body["data"]["status"]["status"].as_str().unwrap_or("?"),
        mood_index = body["data"]["status"]["mood_index"].as_f64().unwrap_or(0.0),
        "reading accepted"
    );
    Ok(())
}

async fn fetch_face(client: &reqwest::Client, cfg: &NodeConfig) -> Result<EmojiResponse> {
    let mut url = format!("{}/emoji", cfg.backend_url);
    if let Some(id) = cfg.plant_id {
        url = format!("{url}?plant_id={id}");
    }

    let resp = client
        .get(url)
        .send()
        .await
        .context("fetching face")?
        .error_for_status()
        .context("face endpoint returned an error")?;

    resp.json().await.context("parsing face response")
}

// ---------------------------------------------------------------------------
// Terminal "LED matrix"
// ---------------------------------------------------------------------------

fn render_matrix<R: AsRef<[u8]>>(matrix: &[R]) -> String {
    matrix
        .iter()
        .map(|row| {
            row.as_ref()
                .iter()
                .map(|&px| if px != 0 { "██" } else { "  " })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn show_face(resp: &EmojiResponse) {
    let label = match (&resp.status, &resp.mood_face) {
        (Some(status), Some(face)) => format!("{face} {status}"),
        _ => "(no status)".to_string(),
    };
    println!("\n{label}\n{}", render_matrix(&resp.matrix));
}

// ---------------------------------------------------------------------------
// Main loop
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cfg = NodeConfig::from_env();
    tracing::info!(
        backend = %cfg.backend_url,
        serial = %cfg.serial,
        scenario = %cfg.scenario,
        sample_every_s = cfg.sample_every_s,
        "node started"
    );

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("building http client")?;

    let mut sim = PlantSim::new(cfg.scenario, 86_400.0, cfg.sample_every_s as f64);

    let mut sample_tick = tokio::time::interval(Duration::from_secs(cfg.sample_every_s));
    let mut display_tick = tokio::time::interval(Duration::from_secs(cfg.display_every_s));

    loop {
        tokio::select! {
            _ = sample_tick.tick() => {
                let s = sim.sample();
                tracing::info!(
                    temperature = s.temperature,
                    light = s.light,
                    soil_moisture = s.soil_moisture,
                    "sampled sensors"
                );
                if let Err(e) = send_reading(&client, &cfg, &s).await {
                    tracing::warn!("reading not delivered: {e:#}");
                }
            }
            _ = display_tick.tick() => {
                match fetch_face(&client, &cfg).await {
                    Ok(face) => show_face(&face),
                    Err(e) => {
                        tracing::warn!("no face from backend, using default: {e:#}");
                        println!("\n(offline)\n{}", render_matrix(&DEFAULT_FACE));
                    }
                }
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
