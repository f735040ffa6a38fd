//! commit.rs
//!
//! Окончательная продажа места. Вызывается воркером заказов через RPC после
//! того, как заказ признан успешным.
//!
//! Результат всегда структурный (`success` + `message`), а не ошибка транспорта:
//! воркер должен детерминированно отличать "уже продано" (повторная доставка
//! сообщения) от настоящего сбоя.

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::store::{CommitOutcome, CommitPolicy, SeatStore};

pub const MSG_SEAT_ID_REQUIRED: &str = "seat_id is required";
pub const MSG_NOT_FOUND: &str = "Seat not found";
pub const MSG_ALREADY_SOLD: &str = "Seat already sold";
pub const MSG_NOT_ELIGIBLE: &str = "Seat not eligible for commit";
pub const MSG_INTERNAL: &str = "Internal error";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitResult {
    pub success: bool,
    pub message: Option<String>,
}

impl CommitResult {
    fn ok() -> Self {
        Self { success: true, message: None }
    }

    fn failed(message: &str) -> Self {
        Self { success: false, message: Some(message.to_string()) }
    }
}

#[derive(Clone)]
pub struct CommitService {
    store: Arc<dyn SeatStore>,
    policy: CommitPolicy,
}

impl CommitService {
    pub fn new(store: Arc<dyn SeatStore>, policy: CommitPolicy) -> Self {
        Self { store, policy }
    }

    pub async fn commit_seat(&self, seat_id: i64) -> CommitResult {
        if seat_id <= 0 {
            return CommitResult::failed(MSG_SEAT_ID_REQUIRED);
        }

        match self.store.commit_seat(seat_id, self.policy).await {
            Ok(CommitOutcome::Committed) => {
                info!(seat_id, "🎫 Seat committed as SOLD");
                CommitResult::ok()
            }
            Ok(CommitOutcome::NotFound) => {
                warn!(seat_id, "Commit failed: seat not found");
                CommitResult::failed(MSG_NOT_FOUND)
            }
            Ok(CommitOutcome::AlreadySold) => {
                // обычно повторная доставка того же заказа
                warn!(seat_id, "Commit ignored: seat already sold");
                CommitResult::failed(MSG_ALREADY_SOLD)
            }
            Ok(CommitOutcome::NotEligible(status)) => {
                warn!(seat_id, %status, "Commit rejected: seat not eligible");
                CommitResult::failed(MSG_NOT_ELIGIBLE)
            }
            Err(e) => {
                error!(seat_id, "Commit failed, transaction rolled back: {}", e);
                CommitResult::failed(MSG_INTERNAL)
            }
        }
    }
}
