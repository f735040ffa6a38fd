//! Хранилище в памяти с той же семантикой условных обновлений, что и у Postgres.
//!
//! Каждая операция выполняется целиком под одним мьютексом, что соответствует
//! атомарности одного UPDATE (или транзакции с `FOR UPDATE` для коммита).
//! Используется в тестах и для локального запуска без базы.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

use super::{CommitOutcome, CommitPolicy, SeatStore};
use crate::error::StoreError;
use crate::models::{Seat, SeatStatus};

/// Источник "текущего времени" хранилища (аналог `NOW()` в базе).
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Часы, которые двигаются только вручную.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

pub struct InMemorySeatStore {
    seats: Mutex<HashMap<i64, Seat>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemorySeatStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySeatStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            seats: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Засеять место (каталог вне зоны ответственности этого сервиса).
    pub fn insert(&self, seat: Seat) {
        self.rows().insert(seat.id, seat);
    }

    pub fn get(&self, seat_id: i64) -> Option<Seat> {
        self.rows().get(&seat_id).cloned()
    }

    fn rows(&self) -> MutexGuard<'_, HashMap<i64, Seat>> {
        // паника внутри критической секции не оставляет строку наполовину изменённой
        self.seats.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn release(seat: &mut Seat) {
    seat.status = SeatStatus::Available;
    seat.locked_at = None;
    seat.locked_by_user_id = None;
}

#[async_trait]
impl SeatStore for InMemorySeatStore {
    async fn lock_seat(
        &self,
        event_id: i64,
        seat_id: i64,
        user_id: Option<Uuid>,
    ) -> Result<Option<Seat>, StoreError> {
        let now = self.clock.now();
        let mut rows = self.rows();
        match rows.get_mut(&seat_id) {
            Some(seat) if seat.event_id == event_id && seat.status == SeatStatus::Available => {
                seat.status = SeatStatus::Locked;
                seat.locked_at = Some(now);
                seat.locked_by_user_id = user_id;
                Ok(Some(seat.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn unlock_seat(
        &self,
        event_id: i64,
        seat_id: i64,
        user_id: Option<Uuid>,
    ) -> Result<Option<Seat>, StoreError> {
        let mut rows = self.rows();
        let Some(seat) = rows.get_mut(&seat_id) else {
            return Ok(None);
        };

        let owner_ok = match (user_id, seat.locked_by_user_id) {
            (None, _) | (_, None) => true,
            (Some(caller), Some(holder)) => caller == holder,
        };

        if seat.event_id == event_id && seat.status == SeatStatus::Locked && owner_ok {
            release(seat);
            Ok(Some(seat.clone()))
        } else {
            Ok(None)
        }
    }

    async fn release_expired(&self, ttl: Duration) -> Result<u64, StoreError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StoreError::Corrupt(format!("ttl out of range: {e}")))?;
        let cutoff = self.clock.now() - ttl;

        let mut released = 0;
        for seat in self.rows().values_mut() {
            let expired = seat.status == SeatStatus::Locked
                && seat.locked_at.is_some_and(|at| at < cutoff);
            if expired {
                release(seat);
                released += 1;
            }
        }
        Ok(released)
    }

    async fn commit_seat(
        &self,
        seat_id: i64,
        policy: CommitPolicy,
    ) -> Result<CommitOutcome, StoreError> {
        let mut rows = self.rows();
        let outcome = policy.decide(rows.get(&seat_id).map(|s| s.status));
        if outcome == CommitOutcome::Committed {
            if let Some(seat) = rows.get_mut(&seat_id) {
                release(seat);
                seat.status = SeatStatus::Sold;
            }
        }
        Ok(outcome)
    }

    async fn list_seats(&self, event_id: i64) -> Result<Vec<Seat>, StoreError> {
        let mut seats: Vec<Seat> = self
            .rows()
            .values()
            .filter(|s| s.event_id == event_id)
            .cloned()
            .collect();
        seats.sort_by(|a, b| {
            (&a.section, &a.row, a.seat_number).cmp(&(&b.section, &b.row, b.seat_number))
        });
        Ok(seats)
    }

    async fn is_connected(&self) -> bool {
        true
    }
}
