use chrono::{Days, NaiveDate, NaiveTime};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_day_capacity, check_no_conflict, validate_field_value, validate_lengths};
use super::{Engine, EngineError, StorageFault, WalCommand};

impl Engine {
    /// Atomic "insert if no active conflict". Conflict check, id
    /// assignment, persist and client upsert all happen under the day lock.
    pub async fn insert(&self, new: NewAppointment) -> Result<AppointmentId, EngineError> {
        validate_lengths(&new)?;
        let mut set = self.lock_days(&[new.date]).await?;
        if let Some(day) = set.day(&new.date) {
            check_day_capacity(day)?;
            if let Err(e) = check_no_conflict(day, new.time, None) {
                warn!("booking {} {} rejected: {e}", new.date, new.time);
                return Err(e);
            }
        }

        let id = self.tables.allocate_id();
        let now = self.clock.now();
        let event = Event::AppointmentBooked {
            appointment: Appointment {
                id,
                client_name: new.client_name,
                client_ref: new.client_ref,
                phone: new.phone,
                date: new.date,
                time: new.time,
                service: new.service,
                status: Status::Active,
                created_at: now,
                updated_at: now,
            },
        };
        self.persist_and_apply(&mut set, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_TOTAL, "op" => "book").increment(1);
        info!("booked appointment {id} on {} at {}", new.date, new.time);
        Ok(id)
    }

    /// Move an active appointment to `(date, time)` if that slot is free.
    /// `date: None` keeps the row's date as read under the lock.
    /// `precondition` sees the current row under the same locks.
    pub async fn update_schedule<F>(
        &self,
        id: AppointmentId,
        date: Option<NaiveDate>,
        time: NaiveTime,
        precondition: F,
    ) -> Result<(), EngineError>
    where
        F: FnOnce(&Appointment) -> Result<(), EngineError>,
    {
        self.move_appointment(id, date, time, precondition).await
    }

    /// Same-day move. The active-slot constraint still holds: a move onto
    /// an occupied slot is rejected rather than applied.
    pub async fn update_time(&self, id: AppointmentId, time: NaiveTime) -> Result<(), EngineError> {
        self.move_appointment(id, None, time, |_| Ok(())).await
    }

    async fn move_appointment<F>(
        &self,
        id: AppointmentId,
        date: Option<NaiveDate>,
        time: NaiveTime,
        precondition: F,
    ) -> Result<(), EngineError>
    where
        F: FnOnce(&Appointment) -> Result<(), EngineError>,
    {
        let (from, mut set) = self.lock_appointment(id, date).await?;
        let date = date.unwrap_or(from);
        {
            let current = set
                .day(&from)
                .and_then(|ds| ds.get(id))
                .filter(|a| a.is_active())
                .ok_or(EngineError::NotFound(id))?;
            precondition(current)?;
            if current.date == date && current.time == time {
                debug!("appointment {id} already at {date} {time}");
                return Ok(());
            }
            if let Some(target) = set.day(&date) {
                if date != from {
                    check_day_capacity(target)?;
                }
                if let Err(e) = check_no_conflict(target, time, Some(id)) {
                    warn!("moving appointment {id} to {date} {time} rejected: {e}");
                    return Err(e);
                }
            }
        }

        let event = Event::AppointmentMoved {
            id,
            from,
            date,
            time,
            at: self.clock.now(),
        };
        self.persist_and_apply(&mut set, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_TOTAL, "op" => "reschedule").increment(1);
        info!("moved appointment {id} from {from} to {date} {time}");
        Ok(())
    }

    /// Edit `client_name` or `service` of an active row.
    pub async fn update_field(
        &self,
        id: AppointmentId,
        field: AppointmentField,
        value: String,
    ) -> Result<(), EngineError> {
        validate_field_value(field, &value)?;
        let (date, mut set) = self.lock_appointment(id, None).await?;
        if !set.day(&date).and_then(|ds| ds.get(id)).is_some_and(|a| a.is_active()) {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::AppointmentEdited {
            id,
            date,
            field,
            value,
            at: self.clock.now(),
        };
        self.persist_and_apply(&mut set, &event).await?;
        info!("appointment {id}: updated {}", field.as_str());
        Ok(())
    }

    pub async fn set_status(&self, id: AppointmentId, status: Status) -> Result<(), EngineError> {
        self.set_status_checked(id, status, |_| Ok(())).await
    }

    /// Status transition with a caller check run under the lock. Illegal
    /// transitions report `NotFound` and change nothing.
    pub async fn set_status_checked<F>(
        &self,
        id: AppointmentId,
        status: Status,
        precondition: F,
    ) -> Result<(), EngineError>
    where
        F: FnOnce(&Appointment) -> Result<(), EngineError>,
    {
        let (date, mut set) = self.lock_appointment(id, None).await?;
        let previous = {
            let current = set
                .day(&date)
                .and_then(|ds| ds.get(id))
                .ok_or(EngineError::NotFound(id))?;
            if !current.status.can_transition_to(status) {
                debug!("appointment {id}: refused {} -> {status}", current.status);
                return Err(EngineError::NotFound(id));
            }
            precondition(current)?;
            current.status
        };

        let event = Event::StatusChanged {
            id,
            date,
            status,
            at: self.clock.now(),
        };
        self.persist_and_apply(&mut set, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_TOTAL, "op" => status.as_str()).increment(1);
        info!("appointment {id}: {previous} -> {status}");
        Ok(())
    }

    /// Archive cancelled/deleted rows dated more than `age_days` before
    /// today. Active rows are never touched. Returns the number archived.
    pub async fn archive_stale(&self, age_days: u32) -> Result<usize, EngineError> {
        if age_days > MAX_ARCHIVE_AGE_DAYS {
            return Err(EngineError::LimitExceeded("archive age too large"));
        }
        let Some(cutoff) = self.clock.today().checked_sub_days(Days::new(u64::from(age_days))) else {
            return Ok(0);
        };

        let mut candidates = Vec::new();
        for date in self.tables.sorted_dates().into_iter().take_while(|d| *d < cutoff) {
            if let Some(ds) = self.read_day(&date).await?
                && ds.appointments.iter().any(|a| a.status.is_retired())
            {
                candidates.push(date);
            }
        }
        if candidates.is_empty() {
            debug!("archive sweep: nothing older than {cutoff}");
            return Ok(0);
        }

        let mut set = self.lock_days(&candidates).await?;
        // Re-check under the write locks; the read scan may be stale.
        let entries: Vec<(AppointmentId, NaiveDate)> = set
            .days
            .iter()
            .flat_map(|(date, ds)| {
                ds.appointments
                    .iter()
                    .filter(|a| a.status.is_retired())
                    .map(move |a| (a.id, *date))
            })
            .collect();
        if entries.is_empty() {
            return Ok(0);
        }

        let count = entries.len();
        let event = Event::Archived {
            entries,
            at: self.clock.now(),
        };
        self.persist_and_apply(&mut set, &event).await?;
        metrics::counter!(crate::observability::ARCHIVED_TOTAL).increment(count as u64);
        info!("archived {count} appointments dated before {cutoff}");
        Ok(count)
    }

    /// Rewrite the WAL as a snapshot of the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _exclusive = self.exclusive().await;

        let mut events: Vec<Event> = self
            .tables
            .clients()
            .into_iter()
            .map(|client| Event::ClientRestored { client })
            .collect();
        for date in self.tables.sorted_dates() {
            if let Some(ds) = self.read_day(&date).await? {
                events.extend(
                    ds.appointments
                        .iter()
                        .map(|a| Event::AppointmentRestored { appointment: a.clone() }),
                );
            }
        }

        let records = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_request(WalCommand::Compact { events, response: tx }, rx)
            .await?
            .map_err(|e| StorageFault::Wal(e.to_string()))?;
        info!("compacted WAL to {records} records");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        self.wal_request(WalCommand::AppendsSinceCompact { response: tx }, rx)
            .await
            .unwrap_or(0)
    }
}
