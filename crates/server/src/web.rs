use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::db::Db;
use crate::display;
use crate::engine::StatusEngine;
use crate::events::EventPublisher;
use crate::ingest::{self, IngestError, SensorPayload};

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub engine: Arc<StatusEngine>,
    pub publisher: Arc<EventPublisher>,
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/sensor-data", post(receive_sensor_data))
        .route("/emoji", get(get_emoji))
        .route("/health", get(health))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            IngestError::MissingFields(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            IngestError::PlantNotFound => (StatusCode::NOT_FOUND, self.to_string()),
            IngestError::Store(e) => {
                tracing::error!("store failure: {e:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        let body = Json(json!({ "success": false, "message": message }));
        (status, body).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /sensor-data: ingest one reading from a sensor unit.
async fn receive_sensor_data(
    State(state): State<AppState>,
    Json(payload): Json<SensorPayload>,
) -> Result<impl IntoResponse, IngestError> {
    let outcome = ingest::ingest(&state.db, &state.engine, &state.publisher, &payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "sensor data received and processed",
            "data": {
                "stats": outcome.stats,
                "status": outcome.status,
                "device": outcome.device,
            },
        })),
    ))
}

#[derive(Debug, Deserialize)]
struct EmojiParams {
    plant_id: Option<i64>,
}

/// GET /emoji: the current 8×8 display bitmap for a plant. Read-only; a
/// plant with no telemetry yet (or no plant at all) gets the neutral
/// default instead of an error, so the physical display always has
/// something to show.
async fn get_emoji(
    State(state): State<AppState>,
    Query(params): Query<EmojiParams>,
) -> Result<Json<serde_json::Value>, IngestError> {
    let plant_id = match params.plant_id {
        Some(id) => Some(id),
        None => state
            .db
            .first_adopted_plant()
            .await
            .map_err(IngestError::Store)?
            .map(|p| p.id),
    };

    let status = match plant_id {
        Some(id) => state
            .db
            .status_for_plant(id)
            .await
            .map_err(IngestError::Store)?,
        None => None,
    };

    let body = match status {
        Some(st) => {
            let matrix = display::matrix_for(st.status, Some(st.mood_index));
            json!({
                "success": true,
                "matrix": matrix,
                "status": st.status,
                "mood_face": st.mood_face,
                "mood_index": st.mood_index,
                "plant_id": st.plant_id,
            })
        }
        None => {
            let mood = state.engine.default_mood();
            let matrix = display::matrix_for(mood.category, Some(mood.mood_index));
            json!({
                "success": true,
                "matrix": matrix,
                "status": mood.category,
                "mood_face": mood.mood_face,
                "mood_index": mood.mood_index,
                "plant_id": plant_id,
                "message": "no status available, using default",
            })
        }
    };

    Ok(Json(body))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let port: u16 = env::var("WEB_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    tracing::info!("listening on http://{addr}");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
