use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::error::StoreError;
use crate::store::SeatStore;

const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Возвращает в продажу места, чья блокировка пережила TTL.
///
/// Рассчитан на один экземпляр. Два параллельных свипера безопасны (каждая
/// строка обновляется атомарно), просто делают лишнюю работу.
pub struct ExpirySweeper {
    store: Arc<dyn SeatStore>,
    ttl: Duration,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(store: Arc<dyn SeatStore>, ttl: Duration, interval: Duration) -> Self {
        // tokio::time::interval паникует на нулевом периоде
        let interval = interval.max(MIN_INTERVAL);
        Self { store, ttl, interval }
    }

    /// Один проход. Количество мест нужно только для логов.
    pub async fn sweep_once(&self) -> Result<u64, StoreError> {
        self.store.release_expired(self.ttl).await
    }

    /// Первый проход сразу при старте, дальше по интервалу. Ошибки только логируются.
    pub async fn run(self) {
        info!(
            "🧹 Expiry sweeper started (ttl={}s, interval={}s)",
            self.ttl.as_secs(),
            self.interval.as_secs()
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.sweep_once().await {
                Ok(0) => {}
                Ok(released) => info!("🧹 Released {} expired seat locks", released),
                Err(e) => error!("🧹 Sweep failed, will retry on next tick: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Seat, SeatStatus};
    use crate::store::{InMemorySeatStore, ManualClock};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    const TTL: Duration = Duration::from_secs(300);

    fn setup() -> (ExpirySweeper, Arc<InMemorySeatStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(InMemorySeatStore::with_clock(clock.clone()));
        store.insert(Seat::new(99, 1, "GENERAL", "Z", 99));
        let sweeper = ExpirySweeper::new(store.clone(), TTL, Duration::from_secs(60));
        (sweeper, store, clock)
    }

    #[tokio::test]
    async fn lock_survives_until_ttl() {
        let (sweeper, store, clock) = setup();
        store.lock_seat(1, 99, None).await.unwrap();

        clock.advance(TTL - Duration::from_secs(1));
        assert_eq!(sweeper.sweep_once().await.unwrap(), 0);
        assert_eq!(store.get(99).unwrap().status, SeatStatus::Locked);
    }

    #[tokio::test]
    async fn abandoned_lock_is_reclaimed_after_ttl() {
        let (sweeper, store, clock) = setup();
        store.lock_seat(1, 99, None).await.unwrap();

        clock.advance(TTL + Duration::from_secs(60));
        assert_eq!(sweeper.sweep_once().await.unwrap(), 1);

        let seat = store.get(99).unwrap();
        assert_eq!(seat.status, SeatStatus::Available);
        assert!(seat.locked_at.is_none());
        assert!(seat.lock_columns_consistent());
    }

    #[tokio::test]
    async fn sold_seats_are_never_touched() {
        let (sweeper, store, clock) = setup();
        store.lock_seat(1, 99, None).await.unwrap();
        store
            .commit_seat(99, crate::store::CommitPolicy::AllowAvailable)
            .await
            .unwrap();

        clock.advance(TTL * 2);
        assert_eq!(sweeper.sweep_once().await.unwrap(), 0);
        assert_eq!(store.get(99).unwrap().status, SeatStatus::Sold);
    }

    struct FlakyStore {
        calls: AtomicU32,
    }

    #[async_trait]
    impl SeatStore for FlakyStore {
        async fn lock_seat(&self, _: i64, _: i64, _: Option<uuid::Uuid>) -> Result<Option<Seat>, StoreError> {
            Ok(None)
        }
        async fn unlock_seat(&self, _: i64, _: i64, _: Option<uuid::Uuid>) -> Result<Option<Seat>, StoreError> {
            Ok(None)
        }
        async fn release_expired(&self, _: Duration) -> Result<u64, StoreError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(StoreError::Database(sqlx::Error::PoolTimedOut))
            } else {
                Ok(0)
            }
        }
        async fn commit_seat(
            &self,
            _: i64,
            _: crate::store::CommitPolicy,
        ) -> Result<crate::store::CommitOutcome, StoreError> {
            Ok(crate::store::CommitOutcome::NotFound)
        }
        async fn list_seats(&self, _: i64) -> Result<Vec<Seat>, StoreError> {
            Ok(vec![])
        }
        async fn is_connected(&self) -> bool {
            false
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_sweep_does_not_stop_the_loop() {
        let store = Arc::new(FlakyStore { calls: AtomicU32::new(0) });
        let sweeper = ExpirySweeper::new(store.clone(), TTL, Duration::from_secs(60));
        let handle = tokio::spawn(sweeper.run());

        // проход при старте + два по таймеру
        tokio::time::sleep(Duration::from_secs(121)).await;
        assert!(store.calls.load(Ordering::SeqCst) >= 3);
        assert!(!handle.is_finished());
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_keeps_sweeping() {
        let (_, store, clock) = setup();
        store.lock_seat(1, 99, None).await.unwrap();
        let sweeper = ExpirySweeper::new(store.clone(), TTL, Duration::ZERO);
        let handle = tokio::spawn(sweeper.run());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!handle.is_finished());

        clock.advance(TTL * 2);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.get(99).unwrap().status, SeatStatus::Available);
        handle.abort();
    }
}
