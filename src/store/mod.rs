//! Хранилище мест.
//!
//! Каждое изменение статуса - одна атомарная условная операция в самом
//! хранилище (условный UPDATE или транзакция с `FOR UPDATE`). Код приложения
//! никогда не делает read-modify-write в памяти.

use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Seat, SeatStatus};

pub mod memory;
pub mod postgres;

pub use memory::{Clock, InMemorySeatStore, ManualClock, SystemClock};
pub use postgres::PgSeatStore;

/// Можно ли продать место, у которого блокировка уже истекла.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPolicy {
    /// LOCKED и AVAILABLE переводятся в SOLD.
    AllowAvailable,
    /// Только LOCKED переводится в SOLD.
    RequireLock,
}

impl CommitPolicy {
    pub fn from_config(requires_lock: bool) -> Self {
        if requires_lock {
            CommitPolicy::RequireLock
        } else {
            CommitPolicy::AllowAvailable
        }
    }

    /// Решение по текущему статусу строки, прочитанному под блокировкой.
    pub fn decide(&self, status: Option<SeatStatus>) -> CommitOutcome {
        match (status, self) {
            (None, _) => CommitOutcome::NotFound,
            (Some(SeatStatus::Sold), _) => CommitOutcome::AlreadySold,
            (Some(SeatStatus::Locked), _) => CommitOutcome::Committed,
            (Some(SeatStatus::Available), CommitPolicy::AllowAvailable) => CommitOutcome::Committed,
            (Some(status @ SeatStatus::Available), CommitPolicy::RequireLock) => {
                CommitOutcome::NotEligible(status)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    NotFound,
    AlreadySold,
    NotEligible(SeatStatus),
}

#[async_trait]
pub trait SeatStore: Send + Sync {
    /// AVAILABLE -> LOCKED. `None`, если место не свободно или не принадлежит событию.
    async fn lock_seat(
        &self,
        event_id: i64,
        seat_id: i64,
        user_id: Option<Uuid>,
    ) -> Result<Option<Seat>, StoreError>;

    /// LOCKED -> AVAILABLE с проверкой владельца. `None` - ничего не изменилось.
    async fn unlock_seat(
        &self,
        event_id: i64,
        seat_id: i64,
        user_id: Option<Uuid>,
    ) -> Result<Option<Seat>, StoreError>;

    /// Массовый возврат просроченных блокировок. Возвращает число мест.
    async fn release_expired(&self, ttl: Duration) -> Result<u64, StoreError>;

    /// Транзакционный перевод в SOLD.
    async fn commit_seat(&self, seat_id: i64, policy: CommitPolicy)
        -> Result<CommitOutcome, StoreError>;

    async fn list_seats(&self, event_id: i64) -> Result<Vec<Seat>, StoreError>;

    async fn is_connected(&self) -> bool;
}
