//! locking.rs
//!
//! Синхронные переходы AVAILABLE <-> LOCKED для REST слоя.
//!
//! Захват - одна условная операция: кто первым закоммитил UPDATE, тот и
//! держит место, остальные получают конфликт. Снятие блокировки для
//! вызывающего никогда не является ошибкой: место уже свободно, продано или
//! заблокировано другим - все три случая означают "ничего делать не нужно".
//!
//! Проверка владельца мягкая: блокировку без `user_id` может снять любой.
//! Так работают анонимные/гостевые сценарии.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::Seat;
use crate::store::SeatStore;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("seat {seat_id} is not available to lock")]
    Conflict { seat_id: i64 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Результат снятия блокировки. Оба варианта - успех для вызывающего.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum UnlockOutcome {
    Released(Seat),
    AlreadyResolved,
}

#[derive(Clone)]
pub struct LockService {
    store: Arc<dyn SeatStore>,
}

impl LockService {
    pub fn new(store: Arc<dyn SeatStore>) -> Self {
        Self { store }
    }

    pub async fn lock(
        &self,
        event_id: i64,
        seat_id: i64,
        user_id: Option<Uuid>,
    ) -> Result<Seat, LockError> {
        match self.store.lock_seat(event_id, seat_id, user_id).await? {
            Some(seat) => {
                info!(event_id, seat_id, user_id = ?user_id, "🔒 Seat locked");
                Ok(seat)
            }
            None => {
                debug!(event_id, seat_id, "Seat lock conflict");
                Err(LockError::Conflict { seat_id })
            }
        }
    }

    pub async fn unlock(
        &self,
        event_id: i64,
        seat_id: i64,
        user_id: Option<Uuid>,
    ) -> Result<UnlockOutcome, StoreError> {
        match self.store.unlock_seat(event_id, seat_id, user_id).await? {
            Some(seat) => {
                info!(event_id, seat_id, "🔓 Seat unlocked");
                Ok(UnlockOutcome::Released(seat))
            }
            None => {
                debug!(event_id, seat_id, "Unlock was a no-op");
                Ok(UnlockOutcome::AlreadyResolved)
            }
        }
    }

    pub async fn list(&self, event_id: i64) -> Result<Vec<Seat>, StoreError> {
        self.store.list_seats(event_id).await
    }
}
