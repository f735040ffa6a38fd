use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Статус места. SOLD - терминальный.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "seat_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SeatStatus {
    Available,
    Locked,
    Sold,
}

impl SeatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatStatus::Available => "AVAILABLE",
            SeatStatus::Locked => "LOCKED",
            SeatStatus::Sold => "SOLD",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SeatStatus::Sold)
    }
}

impl fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Seat {
    pub id: i64,
    pub event_id: i64,
    pub section: String,
    pub row: String,
    pub seat_number: i32,
    pub status: SeatStatus,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by_user_id: Option<Uuid>,
}

impl Seat {
    pub fn new(id: i64, event_id: i64, section: &str, row: &str, seat_number: i32) -> Self {
        Self {
            id,
            event_id,
            section: section.to_string(),
            row: row.to_string(),
            seat_number,
            status: SeatStatus::Available,
            locked_at: None,
            locked_by_user_id: None,
        }
    }

    // Колонки блокировки заполнены только у LOCKED
    pub fn lock_columns_consistent(&self) -> bool {
        match self.status {
            SeatStatus::Locked => self.locked_at.is_some(),
            SeatStatus::Available | SeatStatus::Sold => {
                self.locked_at.is_none() && self.locked_by_user_id.is_none()
            }
        }
    }
}
