//! client.rs
//!
//! Клиент `CommitSeat` для воркера заказов.
//!
//! Вместо глобального флага "подключено" клиент сам отвечает на вопрос о
//! состоянии соединения (`state()`), а переподключение - это один цикл с
//! ограниченным экспоненциальным backoff и явным терминальным состоянием
//! `GaveUp`.

use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tonic::transport::{Channel, Endpoint};
use tonic::Code;
use tracing::{error, info, warn};

use super::pb::inventory_service_client::InventoryServiceClient;
use super::pb::CommitSeatRequest;
use crate::services::CommitResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting { attempt: u32 },
    Connected,
    /// Терминальное: попытки исчерпаны, вызовы сразу возвращают ошибку.
    GaveUp,
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 6,
        }
    }
}

impl BackoffPolicy {
    /// Задержка после неудачной попытки `attempt` (нумерация с 1).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommitClientError {
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] tonic::transport::Error),
    #[error("rpc failed: {0}")]
    Rpc(#[from] tonic::Status),
    #[error("gave up connecting after {attempts} attempts")]
    GaveUp { attempts: u32 },
}

pub struct CommitClient {
    endpoint: Endpoint,
    backoff: BackoffPolicy,
    state: watch::Sender<ConnectionState>,
    client: Mutex<Option<InventoryServiceClient<Channel>>>,
}

impl CommitClient {
    pub fn new(address: &str, backoff: BackoffPolicy) -> Result<Self, CommitClientError> {
        let endpoint = Endpoint::from_shared(address.to_string())?
            .connect_timeout(Duration::from_secs(5));
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Ok(Self {
            endpoint,
            backoff,
            state,
            client: Mutex::new(None),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_replace(next);
    }

    /// Подключается, повторяя попытки с backoff. После исчерпания попыток
    /// клиент остаётся в `GaveUp`.
    pub async fn connect(&self) -> Result<(), CommitClientError> {
        let mut slot = self.client.lock().await;
        if slot.is_some() {
            return Ok(());
        }
        if self.state() == ConnectionState::GaveUp {
            return Err(CommitClientError::GaveUp { attempts: self.backoff.max_attempts });
        }

        for attempt in 1..=self.backoff.max_attempts {
            self.set_state(ConnectionState::Connecting { attempt });

            match self.endpoint.connect().await {
                Ok(channel) => {
                    *slot = Some(InventoryServiceClient::new(channel));
                    self.set_state(ConnectionState::Connected);
                    info!("✓ Connected to inventory service (attempt {})", attempt);
                    return Ok(());
                }
                Err(e) if attempt < self.backoff.max_attempts => {
                    let delay = self.backoff.delay_after(attempt);
                    warn!(
                        "Inventory service connect failed (attempt {}/{}): {}. Retrying in {:?}",
                        attempt, self.backoff.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!("Inventory service unreachable, giving up: {}", e);
                }
            }
        }

        self.set_state(ConnectionState::GaveUp);
        Err(CommitClientError::GaveUp { attempts: self.backoff.max_attempts })
    }

    pub async fn commit_seat(&self, seat_id: i64) -> Result<CommitResult, CommitClientError> {
        self.connect().await?;

        // клиент tonic дешево клонируется, мьютекс не держим во время вызова
        let cached = self.client.lock().await.clone();
        let mut client = match cached {
            Some(client) => client,
            None => return Err(CommitClientError::Rpc(tonic::Status::unavailable("not connected"))),
        };

        match client.commit_seat(CommitSeatRequest { seat_id }).await {
            Ok(response) => {
                let response = response.into_inner();
                Ok(CommitResult {
                    success: response.success,
                    message: Some(response.message).filter(|m| !m.is_empty()),
                })
            }
            Err(status) => {
                if status.code() == Code::Unavailable {
                    // следующий вызов переподключится
                    *self.client.lock().await = None;
                    self.set_state(ConnectionState::Disconnected);
                }
                Err(status.into())
            }
        }
    }
}
