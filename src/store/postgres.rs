use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error};
use uuid::Uuid;

use super::{CommitOutcome, CommitPolicy, SeatStore};
use crate::database::Database;
use crate::error::StoreError;
use crate::models::{Seat, SeatStatus};

const SEAT_COLUMNS: &str =
    r#"id, event_id, section, "row", seat_number, status, locked_at, locked_by_user_id"#;

#[derive(Clone)]
pub struct PgSeatStore {
    db: Database,
}

impl PgSeatStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SeatStore for PgSeatStore {
    async fn lock_seat(
        &self,
        event_id: i64,
        seat_id: i64,
        user_id: Option<Uuid>,
    ) -> Result<Option<Seat>, StoreError> {
        // одна условная операция: выигрывает первая закоммиченная транзакция
        let seat = sqlx::query_as::<_, Seat>(&format!(
            r#"
            UPDATE seats
            SET status = 'LOCKED', locked_at = NOW(), locked_by_user_id = $3
            WHERE id = $1 AND event_id = $2 AND status = 'AVAILABLE'
            RETURNING {SEAT_COLUMNS}
            "#
        ))
        .bind(seat_id)
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(&self.db.pool)
        .await?;

        Ok(seat)
    }

    async fn unlock_seat(
        &self,
        event_id: i64,
        seat_id: i64,
        user_id: Option<Uuid>,
    ) -> Result<Option<Seat>, StoreError> {
        // анонимную блокировку может снять кто угодно
        let seat = sqlx::query_as::<_, Seat>(&format!(
            r#"
            UPDATE seats
            SET status = 'AVAILABLE', locked_at = NULL, locked_by_user_id = NULL
            WHERE id = $1 AND event_id = $2 AND status = 'LOCKED'
              AND ($3::uuid IS NULL OR locked_by_user_id IS NULL OR locked_by_user_id = $3)
            RETURNING {SEAT_COLUMNS}
            "#
        ))
        .bind(seat_id)
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(&self.db.pool)
        .await?;

        Ok(seat)
    }

    async fn release_expired(&self, ttl: Duration) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE seats
            SET status = 'AVAILABLE', locked_at = NULL, locked_by_user_id = NULL
            WHERE status = 'LOCKED'
              AND locked_at < NOW() - make_interval(secs => $1)
            "#,
        )
        .bind(ttl.as_secs_f64())
        .execute(&self.db.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn commit_seat(
        &self,
        seat_id: i64,
        policy: CommitPolicy,
    ) -> Result<CommitOutcome, StoreError> {
        let mut tx = self.db.pool.begin().await?;

        // FOR UPDATE сериализует конкурирующие lock/unlock/commit на этой строке
        let status = match sqlx::query_scalar::<_, SeatStatus>(
            "SELECT status FROM seats WHERE id = $1 FOR UPDATE",
        )
        .bind(seat_id)
        .fetch_optional(&mut *tx)
        .await
        {
            Ok(status) => status,
            Err(e) => {
                let _ = tx.rollback().await;
                return Err(e.into());
            }
        };

        let outcome = policy.decide(status);
        if outcome != CommitOutcome::Committed {
            debug!(seat_id, ?outcome, "commit rejected, rolling back");
            tx.rollback().await?;
            return Ok(outcome);
        }

        let updated = sqlx::query(
            "UPDATE seats SET status = 'SOLD', locked_at = NULL, locked_by_user_id = NULL WHERE id = $1",
        )
        .bind(seat_id)
        .execute(&mut *tx)
        .await;

        if let Err(e) = updated {
            error!(seat_id, "failed to mark seat sold: {:?}", e);
            let _ = tx.rollback().await;
            return Err(e.into());
        }

        tx.commit().await?;
        Ok(CommitOutcome::Committed)
    }

    async fn list_seats(&self, event_id: i64) -> Result<Vec<Seat>, StoreError> {
        let seats = sqlx::query_as::<_, Seat>(&format!(
            "SELECT {SEAT_COLUMNS} FROM seats WHERE event_id = $1 ORDER BY section, \"row\", seat_number"
        ))
        .bind(event_id)
        .fetch_all(&self.db.pool)
        .await?;

        Ok(seats)
    }

    async fn is_connected(&self) -> bool {
        self.db.is_connected().await
    }
}
