//! Клиентский агент бронирования.
//!
//! Держит оптимистичную копию схемы зала: выбор места сразу отражается
//! локально, а запрос к сервису блокировок идёт фоном. Источник истины -
//! сервер, агент только сверяется с ним:
//!
//! - отказ в блокировке откатывает локальное изменение и перечитывает весь
//!   список мест;
//! - снятие выбора в первые секунды (`grace_period`), пока сервер не
//!   подтвердил блокировку, отправляет разблокировку без ожидания ответа;
//! - подтверждённая блокировка снимается с ожиданием, ошибка не фатальна;
//! - собственный таймер истечения нужен только для честного UI, решает
//!   всё равно свипер на сервере.
//!
//! Действия над одним местом вытесняют друг друга: незавершённый lock
//! отменяется, а unlock всегда доходит до сервера раньше следующего lock.
//! Действия над разными местами независимы.

pub mod api;
pub mod state;

pub use api::{BestEffortUnlock, HttpSeatApi, SeatApi};
pub use state::{ClientSeatTracking, SeatPhase};

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::models::{Seat, SeatStatus};
use state::{AgentState, OpId};

const MIN_COUNTDOWN_TICK: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy)]
pub struct AgentConfig {
    /// Окно, в котором неподтверждённую блокировку можно бросить без ожидания.
    pub grace_period: Duration,
    /// Оценка TTL для отображения. Сервер считает своё время сам.
    pub lock_ttl: Duration,
    pub countdown_tick: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(2),
            lock_ttl: Duration::from_secs(300),
            countdown_tick: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentNotice {
    /// Место уже занято, выбор откатан.
    SeatUnavailable { seat_id: i64 },
    /// Места освобождены локальным таймером.
    SeatsExpired { seat_ids: Vec<i64> },
    ResyncFailed,
}

#[derive(Debug)]
pub enum SelectOutcome {
    Confirmed,
    /// Офлайн: место выбрано только локально.
    LocalOnly,
    Rejected(AgentError),
    /// Вытеснено более новым действием над тем же местом.
    Superseded,
    Ignored,
}

#[derive(Debug)]
pub enum DeselectOutcome {
    Released,
    /// Сервер не ответил, место вернёт свипер.
    ReleaseFailed(AgentError),
    BestEffort(BestEffortUnlock),
    LocalOnly,
    /// Разблокировка дошла, но место тем временем выбрано снова.
    Superseded,
    Ignored,
}

#[derive(Debug)]
pub enum ToggleOutcome {
    Selected(SelectOutcome),
    Deselected(DeselectOutcome),
}

enum ReleasePlan {
    LocalOnly,
    BestEffort(BestEffortUnlock),
    Wait(OpId, JoinHandle<Result<(), AgentError>>),
}

struct Inner {
    event_id: i64,
    api: Arc<dyn SeatApi>,
    config: AgentConfig,
    state: Mutex<AgentState>,
    notices: broadcast::Sender<AgentNotice>,
}

#[derive(Clone)]
pub struct ReservationAgent {
    inner: Arc<Inner>,
}

impl ReservationAgent {
    pub fn new(event_id: i64, api: Arc<dyn SeatApi>, config: AgentConfig) -> Self {
        let (notices, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                event_id,
                api,
                config,
                state: Mutex::new(AgentState::default()),
                notices,
            }),
        }
    }

    pub fn event_id(&self) -> i64 {
        self.inner.event_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentNotice> {
        self.inner.notices.subscribe()
    }

    // мьютекс никогда не держится через await
    fn state(&self) -> MutexGuard<'_, AgentState> {
        self.inner.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn notify(&self, notice: AgentNotice) {
        // подписчиков может не быть
        let _ = self.inner.notices.send(notice);
    }

    // сигнал регистрируется под тем же локом, что и смена фазы
    fn spawn_unlock_task(
        &self,
        st: &mut AgentState,
        seat_id: i64,
    ) -> JoinHandle<Result<(), AgentError>> {
        let api = self.inner.api.clone();
        let event_id = self.inner.event_id;
        let (done, released) = watch::channel(());
        let handle = tokio::spawn(async move {
            let _done = done;
            api.unlock(event_id, seat_id).await
        });
        st.track_release(seat_id, released);
        handle
    }

    fn best_effort_unlock(&self, st: &mut AgentState, seat_id: i64) -> BestEffortUnlock {
        let unlock = BestEffortUnlock::spawn(self.inner.api.clone(), self.inner.event_id, seat_id);
        st.track_release(seat_id, unlock.release_signal());
        unlock
    }

    /// Перечитать список мест с сервера целиком.
    pub async fn refresh(&self) -> Result<(), AgentError> {
        match self.inner.api.list_seats(self.inner.event_id).await {
            Ok(seats) => {
                let sold = self.state().replace_seats(seats);
                if !sold.is_empty() {
                    info!(?sold, "Selected seats were sold, dropped from selection");
                }
                Ok(())
            }
            Err(e) => {
                warn!(event_id = self.inner.event_id, "Seat list refresh failed: {}", e);
                self.notify(AgentNotice::ResyncFailed);
                Err(e)
            }
        }
    }

    /* ---------- snapshots ---------- */

    pub fn seats(&self) -> Vec<Seat> {
        self.state().seats.values().cloned().collect()
    }

    pub fn seat_status(&self, seat_id: i64) -> Option<SeatStatus> {
        self.state().status(seat_id)
    }

    pub fn selection(&self) -> Vec<i64> {
        self.state().selection()
    }

    pub fn is_selected(&self, seat_id: i64) -> bool {
        self.state().phases.get(&seat_id).is_some_and(SeatPhase::is_selected)
    }

    pub fn tracking(&self, seat_id: i64) -> Option<ClientSeatTracking> {
        self.state().tracking(seat_id)
    }

    /// Идёт ожидаемое снятие блокировки (индикатор "освобождается").
    pub fn is_releasing(&self, seat_id: i64) -> bool {
        matches!(self.state().phases.get(&seat_id), Some(SeatPhase::Unlocking { .. }))
    }

    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    pub fn is_offline(&self) -> bool {
        self.state().offline
    }

    /* ---------- actions ---------- */

    pub async fn toggle(&self, seat_id: i64) -> ToggleOutcome {
        if self.is_selected(seat_id) {
            ToggleOutcome::Deselected(self.deselect(seat_id).await)
        } else {
            ToggleOutcome::Selected(self.select(seat_id).await)
        }
    }

    pub async fn select(&self, seat_id: i64) -> SelectOutcome {
        let (op, handle) = {
            let mut st = self.state();
            if st.phases.get(&seat_id).is_some_and(SeatPhase::is_selected) {
                return SelectOutcome::Ignored;
            }
            if st.status(seat_id) != Some(SeatStatus::Available) {
                return SelectOutcome::Ignored;
            }
            // ожидание незавершённого unlock вытесняется, сам запрос - нет
            st.phases.remove(&seat_id);

            st.set_status(seat_id, SeatStatus::Locked);
            let since = Instant::now();

            if st.offline {
                st.phases.insert(seat_id, SeatPhase::Locked { since, offline: true });
                debug!(seat_id, "Seat selected locally (offline)");
                return SelectOutcome::LocalOnly;
            }

            let op = st.next_op();
            let release = st.pending_release(seat_id);
            let api = self.inner.api.clone();
            let event_id = self.inner.event_id;
            let handle = tokio::spawn(async move {
                // lock не должен обогнать собственный unlock на сервере
                if let Some(mut released) = release {
                    let _ = released.changed().await;
                }
                api.lock(event_id, seat_id).await
            });
            st.phases.insert(
                seat_id,
                SeatPhase::Locking { op, since, task: handle.abort_handle() },
            );
            (op, handle)
        };

        match handle.await {
            Ok(Ok(())) => self.confirm(seat_id, op),
            Ok(Err(e)) => self.roll_back(seat_id, op, e).await,
            Err(e) if e.is_cancelled() => SelectOutcome::Superseded,
            Err(e) => self.roll_back(seat_id, op, AgentError::Task(e.to_string())).await,
        }
    }

    fn confirm(&self, seat_id: i64, op: OpId) -> SelectOutcome {
        let mut st = self.state();
        if !st.is_current(seat_id, op) {
            return SelectOutcome::Superseded;
        }
        let since = match st.phases.get(&seat_id) {
            Some(SeatPhase::Locking { since, .. }) => *since,
            _ => Instant::now(),
        };
        st.phases.insert(seat_id, SeatPhase::Locked { since, offline: false });
        info!(seat_id, "🔒 Seat lock confirmed");
        SelectOutcome::Confirmed
    }

    async fn roll_back(&self, seat_id: i64, op: OpId, error: AgentError) -> SelectOutcome {
        {
            let mut st = self.state();
            if !st.is_current(seat_id, op) {
                return SelectOutcome::Superseded;
            }
            st.phases.remove(&seat_id);
            st.set_status(seat_id, SeatStatus::Available);
        }

        warn!(seat_id, "Seat lock rejected, rolling back: {}", error);
        self.notify(AgentNotice::SeatUnavailable { seat_id });

        // конфликт обычно означает, что устарел весь вид, а не одно место
        let _ = self.refresh().await;
        SelectOutcome::Rejected(error)
    }

    pub async fn deselect(&self, seat_id: i64) -> DeselectOutcome {
        let plan = {
            let mut st = self.state();
            let Some(phase) = st.phases.remove(&seat_id) else {
                return DeselectOutcome::Ignored;
            };
            if !phase.is_selected() {
                st.phases.insert(seat_id, phase);
                return DeselectOutcome::Ignored;
            }

            phase.abort();
            st.set_status(seat_id, SeatStatus::Available);

            let (since, confirmed, local) = match phase {
                SeatPhase::Locking { since, .. } => (since, false, false),
                SeatPhase::Locked { since, offline } => (since, !offline, offline),
                SeatPhase::Unlocking { .. } => return DeselectOutcome::Ignored,
            };

            if st.offline || local {
                ReleasePlan::LocalOnly
            } else if !confirmed && since.elapsed() < self.inner.config.grace_period {
                // запрос блокировки мог уже дойти до сервера
                ReleasePlan::BestEffort(self.best_effort_unlock(&mut st, seat_id))
            } else {
                let op = st.next_op();
                let handle = self.spawn_unlock_task(&mut st, seat_id);
                st.phases.insert(seat_id, SeatPhase::Unlocking { op });
                ReleasePlan::Wait(op, handle)
            }
        };

        let (op, handle) = match plan {
            ReleasePlan::LocalOnly => {
                debug!(seat_id, "Seat deselected locally");
                return DeselectOutcome::LocalOnly;
            }
            ReleasePlan::BestEffort(unlock) => return DeselectOutcome::BestEffort(unlock),
            ReleasePlan::Wait(op, handle) => (op, handle),
        };

        let result = handle
            .await
            .unwrap_or_else(|e| Err(AgentError::Task(e.to_string())));
        let current = {
            let mut st = self.state();
            let current = st.is_current(seat_id, op);
            if current {
                st.phases.remove(&seat_id);
            }
            current
        };

        match result {
            Ok(()) if current => DeselectOutcome::Released,
            Ok(()) => DeselectOutcome::Superseded,
            Err(e) => {
                warn!(seat_id, "Seat unlock failed, server expiry will reclaim it: {}", e);
                DeselectOutcome::ReleaseFailed(e)
            }
        }
    }

    /// Освободить выбранные места, чей локальный таймер истёк.
    pub fn expire_due(&self) -> Vec<i64> {
        let ttl = self.inner.config.lock_ttl;
        let seat_ids = {
            let mut st = self.state();
            let expired: Vec<(i64, bool)> = st
                .phases
                .iter()
                .filter_map(|(id, phase)| match phase {
                    SeatPhase::Locked { since, offline } if since.elapsed() >= ttl => {
                        Some((*id, *offline))
                    }
                    _ => None,
                })
                .collect();

            let online = !st.offline;
            for (seat_id, offline) in &expired {
                st.phases.remove(seat_id);
                st.set_status(*seat_id, SeatStatus::Available);
                if online && !offline {
                    self.best_effort_unlock(&mut st, *seat_id).detach();
                }
            }
            expired.into_iter().map(|(id, _)| id).collect::<Vec<i64>>()
        };

        if seat_ids.is_empty() {
            return seat_ids;
        }

        info!("⏰ {} seat(s) released by local countdown", seat_ids.len());
        self.notify(AgentNotice::SeatsExpired { seat_ids: seat_ids.clone() });
        seat_ids
    }

    /// Фоновый тикер для `expire_due`. Остановить - `abort()` на хэндле.
    pub fn spawn_countdown(&self) -> JoinHandle<()> {
        let agent = self.clone();
        // interval паникует на нулевом периоде
        let tick = agent.inner.config.countdown_tick.max(MIN_COUNTDOWN_TICK);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                agent.expire_due();
            }
        })
    }

    /// Завершение сессии: отменить незавершённые блокировки и отпустить
    /// подтверждённые.
    pub fn release_all(&self) -> Vec<BestEffortUnlock> {
        let mut st = self.state();
        let phases = std::mem::take(&mut st.phases);
        let online = !st.offline;

        let mut unlocks = Vec::new();
        for (seat_id, phase) in phases {
            st.set_status(seat_id, SeatStatus::Available);
            match phase {
                SeatPhase::Locking { task, .. } => task.abort(),
                SeatPhase::Locked { offline: false, .. } if online => {
                    unlocks.push(self.best_effort_unlock(&mut st, seat_id));
                }
                _ => {}
            }
        }
        unlocks
    }
}
