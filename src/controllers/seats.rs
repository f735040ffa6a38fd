use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{Seat, SeatStatus};
use crate::services::{LockError, UnlockOutcome};
use crate::AppState;

pub const MSG_ALREADY_RESOLVED: &str = "Seat was already unlocked or sold";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events/{event_id}/seats", get(list_seats))
        .route("/events/{event_id}/seats/{seat_id}/lock", post(lock_seat))
        .route("/events/{event_id}/seats/{seat_id}/unlock", post(unlock_seat))
}

/* ---------- helpers ---------- */

// Path<i64> отдал бы текстовый rejection axum, а клиенту нужен `{"error": ...}`
fn parse_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().filter(|id| *id > 0)
}

fn parse_ids(event_id: &str, seat_id: &str) -> Result<(i64, i64), ApiError> {
    match (parse_id(event_id), parse_id(seat_id)) {
        (Some(event_id), Some(seat_id)) => Ok((event_id, seat_id)),
        _ => Err(ApiError::BadRequest("Invalid event or seat id".to_string())),
    }
}

#[derive(Debug, Default, Deserialize)]
struct HolderRequest {
    user_id: Option<Uuid>,
}

// тело необязательно: пустой запрос = анонимная блокировка
fn parse_holder(body: &Bytes) -> Result<Option<Uuid>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice::<HolderRequest>(body)
        .map(|req| req.user_id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {e}")))
}

#[derive(Debug, Serialize)]
struct SeatResponse {
    id: i64,
    status: SeatStatus,
    locked_at: Option<DateTime<Utc>>,
}

impl From<&Seat> for SeatResponse {
    fn from(seat: &Seat) -> Self {
        Self { id: seat.id, status: seat.status, locked_at: seat.locked_at }
    }
}

/* ---------- SEATS ---------- */

// GET /events/{event_id}/seats
async fn list_seats(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let event_id =
        parse_id(&event_id).ok_or_else(|| ApiError::BadRequest("Invalid event id".to_string()))?;

    let seats = state.locks.list(event_id).await.map_err(|e| {
        tracing::error!("list_seats store error: {:?}", e);
        ApiError::Internal("Failed to fetch seats")
    })?;

    Ok((StatusCode::OK, Json(json!({ "seats": seats }))))
}

// POST /events/{event_id}/seats/{seat_id}/lock
async fn lock_seat(
    State(state): State<Arc<AppState>>,
    Path((event_id, seat_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let (event_id, seat_id) = parse_ids(&event_id, &seat_id)?;
    let user_id = parse_holder(&body)?;

    match state.locks.lock(event_id, seat_id, user_id).await {
        Ok(seat) => Ok((
            StatusCode::OK,
            Json(json!({ "success": true, "seat": SeatResponse::from(&seat) })),
        )),
        Err(LockError::Conflict { .. }) => Err(ApiError::Conflict),
        Err(LockError::Store(e)) => {
            tracing::error!("lock_seat store error: {:?}", e);
            Err(ApiError::Internal("Failed to lock seat"))
        }
    }
}

// POST /events/{event_id}/seats/{seat_id}/unlock
async fn unlock_seat(
    State(state): State<Arc<AppState>>,
    Path((event_id, seat_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let (event_id, seat_id) = parse_ids(&event_id, &seat_id)?;
    let user_id = parse_holder(&body)?;

    let outcome = state.locks.unlock(event_id, seat_id, user_id).await.map_err(|e| {
        tracing::error!("unlock_seat store error: {:?}", e);
        ApiError::Internal("Failed to unlock seat")
    })?;

    // гонки клиента никогда не превращаются в ошибку
    let payload = match outcome {
        UnlockOutcome::Released(seat) => json!({ "success": true, "seat": SeatResponse::from(&seat) }),
        UnlockOutcome::AlreadyResolved => json!({ "success": true, "message": MSG_ALREADY_RESOLVED }),
    };
    Ok((StatusCode::OK, Json(payload)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, Config, DatabaseConfig, ReservationConfig};
    use crate::store::{InMemorySeatStore, SeatStore};
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    fn app() -> (Router, Arc<InMemorySeatStore>) {
        let store = Arc::new(InMemorySeatStore::new());
        store.insert(Seat::new(42, 1, "VIP", "A", 1));
        let config = Config {
            app: AppConfig {
                host: "127.0.0.1".into(),
                port: 0,
                grpc_port: 0,
                rust_log: "off".into(),
                log_json: false,
            },
            database: DatabaseConfig { url: String::new(), pool_size: 1 },
            reservation: ReservationConfig::default(),
        };
        let state = AppState::new(store.clone(), config);
        (crate::controllers::routes().with_state(state), store)
    }

    async fn post(app: &Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let response = app
            .clone()
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn lock_conflict_is_409() {
        let (app, _store) = app();
        let a = json!({ "user_id": Uuid::new_v4() });
        let b = json!({ "user_id": Uuid::new_v4() });

        let (status, body) = post(&app, "/events/1/seats/42/lock", a).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["seat"]["status"], "LOCKED");
        assert!(body["seat"]["locked_at"].is_string());

        let (status, body) = post(&app, "/events/1/seats/42/lock", b).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Seat not available to lock");
    }

    #[tokio::test]
    async fn unlock_never_fails_for_resolved_seat() {
        let (app, store) = app();
        let user = json!({ "user_id": Uuid::new_v4() });
        post(&app, "/events/1/seats/42/lock", user.clone()).await;

        let (status, body) = post(&app, "/events/1/seats/42/unlock", user.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["seat"]["status"], "AVAILABLE");
        assert!(body["seat"]["locked_at"].is_null());

        let (status, body) = post(&app, "/events/1/seats/42/unlock", user).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], MSG_ALREADY_RESOLVED);
        assert_eq!(store.get(42).unwrap().status, SeatStatus::Available);
    }

    #[tokio::test]
    async fn empty_body_means_anonymous_lock() {
        let (app, store) = app();
        let response = app
            .clone()
            .oneshot(Request::post("/events/1/seats/42/lock").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(store.get(42).unwrap().locked_by_user_id.is_none());
    }

    #[tokio::test]
    async fn rejects_bad_ids_and_body() {
        let (app, _store) = app();
        let (status, _) = post(&app, "/events/0/seats/42/lock", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post(&app, "/events/1/seats/42/lock", json!({ "user_id": "nope" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn non_numeric_ids_get_json_error() {
        let (app, _store) = app();
        let (status, body) = post(&app, "/events/abc/seats/42/lock", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid event or seat id");

        let (status, body) = post(&app, "/events/1/seats/x1/unlock", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid event or seat id");

        let response = app
            .clone()
            .oneshot(Request::get("/events/nope/seats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Invalid event id");
    }

    #[tokio::test]
    async fn lists_all_seats_of_event() {
        let (app, store) = app();
        store.insert(Seat::new(43, 1, "VIP", "A", 2));
        store.lock_seat(1, 43, None).await.unwrap();

        let response = app
            .clone()
            .oneshot(Request::get("/events/1/seats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let seats = body["seats"].as_array().unwrap();
        assert_eq!(seats.len(), 2);
        assert_eq!(seats[1]["status"], "LOCKED");
    }
}
