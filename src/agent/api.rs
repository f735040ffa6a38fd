use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AgentError;
use crate::models::Seat;

/// Сетевая сторона агента: REST сервиса блокировок.
#[async_trait]
pub trait SeatApi: Send + Sync {
    async fn lock(&self, event_id: i64, seat_id: i64) -> Result<(), AgentError>;
    async fn unlock(&self, event_id: i64, seat_id: i64) -> Result<(), AgentError>;
    async fn list_seats(&self, event_id: i64) -> Result<Vec<Seat>, AgentError>;
}

#[derive(Clone)]
pub struct HttpSeatApi {
    http: reqwest::Client,
    base_url: String,
    user_id: Option<Uuid>,
    bearer_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SeatsPayload {
    seats: Vec<Seat>,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: Option<String>,
    message: Option<String>,
}

impl HttpSeatApi {
    pub fn new(base_url: &str, user_id: Option<Uuid>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id,
            bearer_token: None,
        }
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    fn post(&self, url: String) -> reqwest::RequestBuilder {
        let request = self.http.post(url).json(&json!({ "user_id": self.user_id }));
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, AgentError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::CONFLICT {
            return Err(AgentError::Conflict);
        }
        let text = match response.json::<ErrorPayload>().await {
            Ok(body) => body.error.or(body.message).unwrap_or_default(),
            Err(_) => String::new(),
        };
        Err(AgentError::Status(status.as_u16(), text))
    }
}

#[async_trait]
impl SeatApi for HttpSeatApi {
    async fn lock(&self, event_id: i64, seat_id: i64) -> Result<(), AgentError> {
        let url = format!("{}/events/{}/seats/{}/lock", self.base_url, event_id, seat_id);
        let response = self.post(url).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn unlock(&self, event_id: i64, seat_id: i64) -> Result<(), AgentError> {
        let url = format!("{}/events/{}/seats/{}/unlock", self.base_url, event_id, seat_id);
        let response = self.post(url).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn list_seats(&self, event_id: i64) -> Result<Vec<Seat>, AgentError> {
        let url = format!("{}/events/{}/seats", self.base_url, event_id);
        let mut request = self.http.get(url);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        let response = Self::check(request.send().await?).await?;
        let payload: SeatsPayload = response
            .json()
            .await
            .map_err(|e| AgentError::Decode(e.to_string()))?;
        Ok(payload.seats)
    }
}

/// Разблокировка "отправил и забыл".
///
/// UI не ждёт результата и не показывает его, ошибки только логируются:
/// если запрос потеряется, место всё равно вернёт свипер на сервере.
#[derive(Debug)]
#[must_use = "call detach() to fire and forget explicitly"]
pub struct BestEffortUnlock {
    seat_id: i64,
    handle: JoinHandle<()>,
    released: watch::Receiver<()>,
}

impl BestEffortUnlock {
    pub fn spawn(api: Arc<dyn SeatApi>, event_id: i64, seat_id: i64) -> Self {
        let (done, released) = watch::channel(());
        let handle = tokio::spawn(async move {
            let _done = done;
            match api.unlock(event_id, seat_id).await {
                Ok(()) => debug!(event_id, seat_id, "best-effort unlock delivered"),
                Err(e) => warn!(event_id, seat_id, "best-effort unlock failed: {}", e),
            }
        });
        Self { seat_id, handle, released }
    }

    pub fn seat_id(&self) -> i64 {
        self.seat_id
    }

    /// Закрывается, когда запрос завершён (успешно или нет).
    pub fn release_signal(&self) -> watch::Receiver<()> {
        self.released.clone()
    }

    pub fn detach(self) {}

    /// Дождаться отправки (нужно тестам и при завершении процесса).
    pub async fn settled(self) {
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn lock_sends_user_and_maps_conflict() {
        let server = MockServer::start().await;
        let user = Uuid::new_v4();

        Mock::given(method("POST"))
            .and(path("/events/1/seats/42/lock"))
            .and(body_json(json!({ "user_id": user })))
            .respond_with(
                ResponseTemplate::new(409).set_body_json(json!({ "error": "Seat not available to lock" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpSeatApi::new(&server.uri(), Some(user));
        let err = api.lock(1, 42).await.unwrap_err();
        assert!(matches!(err, AgentError::Conflict));
    }

    #[tokio::test]
    async fn unlock_carries_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/events/1/seats/42/unlock"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "message": "Seat was already unlocked or sold"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpSeatApi::new(&format!("{}/", server.uri()), None).with_bearer_token("secret");
        api.unlock(1, 42).await.unwrap();
    }

    #[tokio::test]
    async fn server_error_keeps_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/events/1/seats/42/lock"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "Failed to lock seat" })))
            .mount(&server)
            .await;

        let api = HttpSeatApi::new(&server.uri(), None);
        match api.lock(1, 42).await {
            Err(AgentError::Status(500, msg)) => assert_eq!(msg, "Failed to lock seat"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn list_seats_decodes_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events/3/seats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "seats": [{
                    "id": 1, "event_id": 3, "section": "VIP", "row": "A", "seat_number": 1,
                    "status": "LOCKED", "locked_at": "2026-01-01T10:00:00Z", "locked_by_user_id": null
                }]
            })))
            .mount(&server)
            .await;

        let seats = HttpSeatApi::new(&server.uri(), None).list_seats(3).await.unwrap();
        assert_eq!(seats.len(), 1);
        assert_eq!(seats[0].status, crate::models::SeatStatus::Locked);
    }
}
