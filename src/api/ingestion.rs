use crate::ingest::{map_hub_event, map_sensor_event, HubEventMessage, SensorEventMessage};
use crate::log::EventPublisher;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub event_publisher: EventPublisher,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create API router with ingestion endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/events/sensors", post(collect_sensor_event))
        .route("/api/events/hubs", post(collect_hub_event))
        .with_state(Arc::new(state))
}

/// POST /api/events/sensors - Map and publish one sensor reading
async fn collect_sensor_event(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let message: SensorEventMessage = serde_json::from_slice(&body)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    let event = map_sensor_event(&message).map_err(|e| {
        warn!(hub_id = %message.hub_id, sensor_id = %message.id, error = %e, "Rejected sensor event");
        AppError::MappingError(e.to_string())
    })?;

    debug!(
        hub_id = %event.hub_id,
        sensor_id = %event.id,
        timestamp = %event.timestamp,
        "Collected sensor event"
    );

    state
        .event_publisher
        .publish_sensor_event(&event)
        .await
        .map_err(|e| {
            error!(error = %e, hub_id = %event.hub_id, "Failed to publish sensor event");
            AppError::PublishError(format!("{:#}", e))
        })?;

    Ok(StatusCode::OK)
}

/// POST /api/events/hubs - Map and publish one hub lifecycle event
async fn collect_hub_event(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let message: HubEventMessage = serde_json::from_slice(&body)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    let event = map_hub_event(&message).map_err(|e| {
        warn!(hub_id = %message.hub_id, error = %e, "Rejected hub event");
        AppError::MappingError(e.to_string())
    })?;

    let Some(event_type) = event.event_type() else {
        debug!(hub_id = %event.hub_id, "Hub event without payload acknowledged, not published");
        return Ok(StatusCode::OK);
    };

    info!(hub_id = %event.hub_id, event_type = %event_type, "Collected hub event");

    state
        .event_publisher
        .publish_hub_event(&event)
        .await
        .map_err(|e| {
            error!(error = %e, hub_id = %event.hub_id, "Failed to publish hub event");
            AppError::PublishError(format!("{:#}", e))
        })?;

    Ok(StatusCode::OK)
}

/// Application error type
enum AppError {
    ValidationError(String),
    MappingError(String),
    PublishError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::MappingError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::PublishError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        let body = Json(ErrorResponse {
            error: error_message,
        });
        (status, body).into_response()
    }
}
