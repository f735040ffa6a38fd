use std::collections::BTreeMap;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::models::{Seat, SeatStatus};

pub type OpId = u64;

/// Фаза места на клиенте. Отсутствие записи = Idle.
///
/// `Idle -> Locking -> Locked -> Unlocking -> Idle`. `Locking` держит
/// `AbortHandle`: новое действие над тем же местом отменяет запрос блокировки.
/// Разблокировку не отменяем никогда, вытесняется только ожидание её ответа.
#[derive(Debug)]
pub enum SeatPhase {
    Locking {
        op: OpId,
        since: Instant,
        task: AbortHandle,
    },
    Locked {
        since: Instant,
        offline: bool,
    },
    Unlocking {
        op: OpId,
    },
}

impl SeatPhase {
    pub fn is_selected(&self) -> bool {
        matches!(self, SeatPhase::Locking { .. } | SeatPhase::Locked { .. })
    }

    pub fn op(&self) -> Option<OpId> {
        match self {
            SeatPhase::Locking { op, .. } | SeatPhase::Unlocking { op, .. } => Some(*op),
            SeatPhase::Locked { .. } => None,
        }
    }

    pub fn abort(&self) {
        match self {
            SeatPhase::Locking { task, .. } => task.abort(),
            SeatPhase::Locked { .. } | SeatPhase::Unlocking { .. } => {}
        }
    }
}

/// Сигнал завершения разблокировки: отправитель живёт внутри задачи запроса
/// и закрывается вместе с ней.
pub type ReleaseSignal = watch::Receiver<()>;

/// Локальный учёт блокировки места (клиентские часы).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSeatTracking {
    pub locked_at: Instant,
    pub confirmed: bool,
    pub offline: bool,
}

#[derive(Debug, Default)]
pub struct AgentState {
    pub seats: BTreeMap<i64, Seat>,
    pub phases: BTreeMap<i64, SeatPhase>,
    pub offline: bool,
    /// Незавершённые разблокировки: новый lock по месту ждёт их.
    releases: BTreeMap<i64, ReleaseSignal>,
    next_op: OpId,
}

impl AgentState {
    pub fn next_op(&mut self) -> OpId {
        self.next_op += 1;
        self.next_op
    }

    pub fn track_release(&mut self, seat_id: i64, signal: ReleaseSignal) {
        self.releases.insert(seat_id, signal);
    }

    /// Сигнал последней разблокировки места, если она ещё в полёте.
    pub fn pending_release(&mut self, seat_id: i64) -> Option<ReleaseSignal> {
        let signal = self.releases.remove(&seat_id)?;
        // закрытый канал = запрос уже завершился
        if signal.has_changed().is_err() {
            return None;
        }
        self.releases.insert(seat_id, signal.clone());
        Some(signal)
    }

    pub fn status(&self, seat_id: i64) -> Option<SeatStatus> {
        self.seats.get(&seat_id).map(|s| s.status)
    }

    pub fn set_status(&mut self, seat_id: i64, status: SeatStatus) {
        if let Some(seat) = self.seats.get_mut(&seat_id) {
            seat.status = status;
        }
    }

    /// Текущая фаза всё ещё принадлежит операции `op`.
    pub fn is_current(&self, seat_id: i64, op: OpId) -> bool {
        self.phases.get(&seat_id).and_then(SeatPhase::op) == Some(op)
    }

    pub fn tracking(&self, seat_id: i64) -> Option<ClientSeatTracking> {
        match self.phases.get(&seat_id)? {
            SeatPhase::Locking { since, .. } => Some(ClientSeatTracking {
                locked_at: *since,
                confirmed: false,
                offline: false,
            }),
            SeatPhase::Locked { since, offline } => Some(ClientSeatTracking {
                locked_at: *since,
                confirmed: !offline,
                offline: *offline,
            }),
            SeatPhase::Unlocking { .. } => None,
        }
    }

    pub fn selection(&self) -> Vec<i64> {
        self.phases
            .iter()
            .filter(|(_, phase)| phase.is_selected())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Подменить вид свежим списком с сервера, сохранив собственный выбор.
    ///
    /// Проданное место из выбора выпадает: SOLD сервера важнее локальной копии.
    /// Возвращает такие места.
    pub fn replace_seats(&mut self, seats: Vec<Seat>) -> Vec<i64> {
        self.seats = seats.into_iter().map(|s| (s.id, s)).collect();

        let mut dropped = Vec::new();
        for seat_id in self.selection() {
            if self.status(seat_id) == Some(SeatStatus::Sold) {
                if let Some(phase) = self.phases.remove(&seat_id) {
                    phase.abort();
                }
                dropped.push(seat_id);
            } else {
                self.set_status(seat_id, SeatStatus::Locked);
            }
        }
        dropped
    }
}
