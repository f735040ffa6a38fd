//! Те же инварианты на настоящем Postgres.
//!
//! Нужен `DATABASE_URL` с правом создавать базы:
//! `cargo test --test postgres_store -- --ignored`

use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use seat_inventory::database::Database;
use seat_inventory::models::SeatStatus;
use seat_inventory::store::{CommitOutcome, CommitPolicy, PgSeatStore, SeatStore};

async fn seed(pool: &PgPool, event_id: i64, count: i32) -> Vec<i64> {
    let mut ids = Vec::new();
    for n in 1..=count {
        let id: i64 = sqlx::query_scalar(
            r#"INSERT INTO seats (event_id, section, "row", seat_number) VALUES ($1, 'VIP', 'A', $2) RETURNING id"#,
        )
        .bind(event_id)
        .bind(n)
        .fetch_one(pool)
        .await
        .unwrap();
        ids.push(id);
    }
    ids
}

fn store(pool: PgPool) -> PgSeatStore {
    PgSeatStore::new(Database { pool })
}

#[ignore]
#[sqlx::test(migrations = "./src/migrations")]
async fn lock_is_exclusive_and_unlock_checks_owner(pool: PgPool) {
    let ids = seed(&pool, 1, 1).await;
    let store = store(pool);
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

    let seat = store.lock_seat(1, ids[0], Some(alice)).await.unwrap().unwrap();
    assert_eq!(seat.status, SeatStatus::Locked);
    assert!(seat.locked_at.is_some());
    assert!(store.lock_seat(1, ids[0], Some(bob)).await.unwrap().is_none());

    assert!(store.unlock_seat(1, ids[0], Some(bob)).await.unwrap().is_none());
    let seat = store.unlock_seat(1, ids[0], Some(alice)).await.unwrap().unwrap();
    assert_eq!(seat.status, SeatStatus::Available);
    assert!(seat.locked_by_user_id.is_none());
}

#[ignore]
#[sqlx::test(migrations = "./src/migrations")]
async fn wrong_event_is_never_locked(pool: PgPool) {
    let ids = seed(&pool, 1, 1).await;
    let store = store(pool);

    assert!(store.lock_seat(2, ids[0], None).await.unwrap().is_none());
}

#[ignore]
#[sqlx::test(migrations = "./src/migrations")]
async fn concurrent_locks_have_one_winner(pool: PgPool) {
    let ids = seed(&pool, 1, 1).await;
    let store = std::sync::Arc::new(store(pool));

    let attempts = (0..10).map(|_| {
        let store = store.clone();
        let seat_id = ids[0];
        tokio::spawn(async move { store.lock_seat(1, seat_id, Some(Uuid::new_v4())).await })
    });
    let winners = futures::future::join_all(attempts)
        .await
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(Some(_)))))
        .count();
    assert_eq!(winners, 1);
}

#[ignore]
#[sqlx::test(migrations = "./src/migrations")]
async fn sweep_releases_only_expired_locks(pool: PgPool) {
    let ids = seed(&pool, 1, 2).await;
    sqlx::query("UPDATE seats SET status = 'LOCKED', locked_at = NOW() - INTERVAL '301 seconds' WHERE id = $1")
        .bind(ids[0])
        .execute(&pool)
        .await
        .unwrap();
    let store = store(pool);
    store.lock_seat(1, ids[1], None).await.unwrap();

    assert_eq!(store.release_expired(Duration::from_secs(300)).await.unwrap(), 1);

    let seats = store.list_seats(1).await.unwrap();
    assert_eq!(seats[0].status, SeatStatus::Available);
    assert_eq!(seats[1].status, SeatStatus::Locked);
}

#[ignore]
#[sqlx::test(migrations = "./src/migrations")]
async fn commit_is_terminal(pool: PgPool) {
    let ids = seed(&pool, 1, 1).await;
    let store = store(pool);
    store.lock_seat(1, ids[0], None).await.unwrap();

    let policy = CommitPolicy::AllowAvailable;
    assert_eq!(store.commit_seat(ids[0], policy).await.unwrap(), CommitOutcome::Committed);
    assert_eq!(store.commit_seat(ids[0], policy).await.unwrap(), CommitOutcome::AlreadySold);
    assert_eq!(store.commit_seat(-1, policy).await.unwrap(), CommitOutcome::NotFound);

    assert!(store.lock_seat(1, ids[0], None).await.unwrap().is_none());
    assert!(store.unlock_seat(1, ids[0], None).await.unwrap().is_none());
    assert_eq!(store.release_expired(Duration::ZERO).await.unwrap(), 0);

    let seat = &store.list_seats(1).await.unwrap()[0];
    assert_eq!(seat.status, SeatStatus::Sold);
    assert!(seat.locked_at.is_none());
}
