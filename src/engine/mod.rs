mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod store;

pub use availability::free_slots;
pub use error::{EngineError, StorageFault};

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::{mpsc, oneshot, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{error, info, warn};

use crate::calendar::{BusinessHours, Clock};
use crate::limits::MAX_RELOCK_ATTEMPTS;
use crate::model::*;
use crate::wal::Wal;

use store::Tables;

pub type SharedDayState = Arc<RwLock<DayState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }
                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        error!("WAL flush of {} events failed: {e}", batch.len());
    }
    respond_batch(batch, &result);
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());
    // Every sender is told the batch failed, so none of it may survive.
    if result.is_err()
        && let Err(e) = wal.rollback()
    {
        error!("WAL rollback failed: {e}");
    }
    result
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_snapshot(wal.path(), &events).and_then(|()| wal.install_snapshot());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let mut batch = vec![(event, response)];
            commit_batch(wal, &mut batch);
        }
    }
}

// ── Engine ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub hours: BusinessHours,
    /// Upper bound on waiting for day locks before a write gives up.
    pub lock_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            hours: BusinessHours::default(),
            lock_timeout: Duration::from_millis(2000),
        }
    }
}

/// The appointment store: in-memory day states backed by the WAL.
pub struct Engine {
    pub(super) tables: Tables,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Writers share it; compaction takes it exclusively.
    gate: Arc<RwLock<()>>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) hours: BusinessHours,
    lock_timeout: Duration,
}

/// Write locks held for one operation. Dropping it ends the transaction.
pub(super) struct WriteSet {
    _gate: OwnedRwLockReadGuard<()>,
    pub(super) days: BTreeMap<NaiveDate, OwnedRwLockWriteGuard<DayState>>,
}

impl WriteSet {
    pub(super) fn day(&self, date: &NaiveDate) -> Option<&DayState> {
        self.days.get(date).map(|g| &**g)
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, settings: EngineSettings, clock: Arc<dyn Clock>) -> io::Result<Self> {
        let events = Wal::recover(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            tables: Tables::new(),
            wal_tx,
            gate: Arc::new(RwLock::new(())),
            clock,
            hours: settings.hours,
            lock_timeout: settings.lock_timeout,
        };

        // Nothing else holds these day states yet, so try_write never
        // contends. Never block here: we may be inside the runtime.
        for event in &events {
            let mut days = engine.tables.lock_uncontended(&event.dates())?;
            engine.tables.apply(&mut days, event);
        }
        if !events.is_empty() {
            info!(
                "replayed {} events from {}, {} appointments",
                events.len(),
                wal_path.display(),
                engine.tables.appointment_count()
            );
        }
        Ok(engine)
    }

    pub fn hours(&self) -> BusinessHours {
        self.hours
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StorageFault::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StorageFault::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StorageFault::Wal(e.to_string()).into())
    }

    pub(super) async fn wal_request<T>(
        &self,
        cmd: WalCommand,
        rx: oneshot::Receiver<T>,
    ) -> Result<T, EngineError> {
        self.wal_tx
            .send(cmd)
            .await
            .map_err(|_| StorageFault::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StorageFault::Wal("WAL writer dropped response".into()).into())
    }

    /// WAL first, then memory. A failed append leaves memory untouched.
    pub(super) async fn persist_and_apply(&self, set: &mut WriteSet, event: &Event) -> Result<(), EngineError> {
        if let Err(e) = self.wal_append(event).await {
            error!("write rolled back: {e}");
            return Err(e);
        }
        self.tables.apply(&mut set.days, event);
        Ok(())
    }

    /// Write-lock `dates` in ascending order, bounded by the lock timeout.
    pub(super) async fn lock_days(&self, dates: &[NaiveDate]) -> Result<WriteSet, EngineError> {
        let mut dates = dates.to_vec();
        dates.sort();
        dates.dedup();

        let acquire = async {
            let gate = self.gate.clone().read_owned().await;
            let mut days = BTreeMap::new();
            for date in dates {
                let day = self.tables.day(date);
                days.insert(date, day.write_owned().await);
            }
            WriteSet { _gate: gate, days }
        };
        match tokio::time::timeout(self.lock_timeout, acquire).await {
            Ok(set) => Ok(set),
            Err(_) => Err(self.lock_timed_out()),
        }
    }

    /// Lock the day currently holding `id` (plus `also`, if given).
    /// Retries when the appointment moves to another day while we wait.
    pub(super) async fn lock_appointment(
        &self,
        id: AppointmentId,
        also: Option<NaiveDate>,
    ) -> Result<(NaiveDate, WriteSet), EngineError> {
        for _ in 0..MAX_RELOCK_ATTEMPTS {
            let current = self.tables.date_of(id).ok_or(EngineError::NotFound(id))?;
            let mut dates = vec![current];
            dates.extend(also);
            let set = self.lock_days(&dates).await?;
            if set.day(&current).is_some_and(|ds| ds.get(id).is_some()) {
                return Ok((current, set));
            }
        }
        Err(self.lock_timed_out())
    }

    /// Shared lock on one day, if the day exists. Bounded like writes.
    pub(super) async fn read_day(
        &self,
        date: &NaiveDate,
    ) -> Result<Option<OwnedRwLockReadGuard<DayState>>, EngineError> {
        let Some(day) = self.tables.existing_day(date) else {
            return Ok(None);
        };
        match tokio::time::timeout(self.lock_timeout, day.read_owned()).await {
            Ok(guard) => Ok(Some(guard)),
            Err(_) => Err(self.lock_timed_out()),
        }
    }

    fn lock_timed_out(&self) -> EngineError {
        metrics::counter!(crate::observability::LOCK_TIMEOUTS_TOTAL).increment(1);
        warn!("gave up waiting for day locks after {:?}", self.lock_timeout);
        StorageFault::LockTimeout(self.lock_timeout).into()
    }

    /// Hold the compaction gate exclusively; no writer can start meanwhile.
    pub(super) async fn exclusive(&self) -> tokio::sync::RwLockWriteGuard<'_, ()> {
        self.gate.write().await
    }
}
