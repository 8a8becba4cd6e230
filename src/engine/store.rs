use std::collections::BTreeMap;
use std::io;
use std::ops::DerefMut;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use crate::model::*;

use super::SharedDayState;

/// In-memory tables: one day state per date plus the secondary indexes.
pub struct Tables {
    days: DashMap<NaiveDate, SharedDayState>,
    /// Index on id: which date currently holds the row.
    appointment_dates: DashMap<AppointmentId, NaiveDate>,
    /// Index on client_ref. Ids only ever get appended.
    client_appointments: DashMap<String, Vec<AppointmentId>>,
    clients: DashMap<String, Client>,
    next_id: AtomicU64,
}

impl Default for Tables {
    fn default() -> Self {
        Self::new()
    }
}

impl Tables {
    pub fn new() -> Self {
        Self {
            days: DashMap::new(),
            appointment_dates: DashMap::new(),
            client_appointments: DashMap::new(),
            clients: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    // ── Days ─────────────────────────────────────────────────

    /// Day state for `date`, created empty on first use.
    pub fn day(&self, date: NaiveDate) -> SharedDayState {
        if let Some(entry) = self.days.get(&date) {
            return entry.value().clone();
        }
        self.days
            .entry(date)
            .or_insert_with(|| Arc::new(RwLock::new(DayState::new(date))))
            .value()
            .clone()
    }

    pub fn existing_day(&self, date: &NaiveDate) -> Option<SharedDayState> {
        self.days.get(date).map(|e| e.value().clone())
    }

    pub fn sorted_dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.days.iter().map(|e| *e.key()).collect();
        dates.sort();
        dates
    }

    /// Write-lock days nobody else can see yet (startup replay).
    pub fn lock_uncontended(
        &self,
        dates: &[NaiveDate],
    ) -> io::Result<BTreeMap<NaiveDate, OwnedRwLockWriteGuard<DayState>>> {
        let mut locked = BTreeMap::new();
        for &date in dates {
            let guard = self
                .day(date)
                .try_write_owned()
                .map_err(|_| io::Error::other(format!("replay: day {date} already locked")))?;
            locked.insert(date, guard);
        }
        Ok(locked)
    }

    // ── Indexes ──────────────────────────────────────────────

    pub fn date_of(&self, id: AppointmentId) -> Option<NaiveDate> {
        self.appointment_dates.get(&id).map(|e| *e.value())
    }

    pub fn appointment_ids_for(&self, client_ref: &str) -> Vec<AppointmentId> {
        self.client_appointments
            .get(client_ref)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    pub fn client(&self, client_ref: &str) -> Option<Client> {
        self.clients.get(client_ref).map(|e| e.value().clone())
    }

    pub fn clients(&self) -> Vec<Client> {
        let mut all: Vec<Client> = self.clients.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.client_ref.cmp(&b.client_ref));
        all
    }

    pub fn appointment_count(&self) -> usize {
        self.appointment_dates.len()
    }

    /// Reserve the next id. Burned if the write that takes it fails.
    pub fn allocate_id(&self) -> AppointmentId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    // ── Event application ────────────────────────────────────

    /// Apply an already-durable event. `days` must hold every date in
    /// `event.dates()`, locked by the caller.
    pub fn apply<G>(&self, days: &mut BTreeMap<NaiveDate, G>, event: &Event)
    where
        G: DerefMut<Target = DayState>,
    {
        match event {
            Event::AppointmentBooked { appointment } => {
                self.restore(days, appointment);
                if let Some(client_ref) = &appointment.client_ref {
                    self.clients
                        .entry(client_ref.clone())
                        .and_modify(|c| c.record_booking(appointment))
                        .or_insert_with(|| Client::first_booking(appointment, client_ref));
                }
            }
            Event::AppointmentRestored { appointment } => self.restore(days, appointment),
            Event::ClientRestored { client } => {
                self.clients.insert(client.client_ref.clone(), client.clone());
            }
            Event::AppointmentMoved { id, from, date, time, at } => {
                let Some(mut moved) = days.get_mut(from).and_then(|ds| ds.remove(*id)) else {
                    return;
                };
                moved.date = *date;
                moved.time = *time;
                moved.updated_at = *at;
                if let Some(ds) = days.get_mut(date) {
                    ds.insert(moved);
                    self.appointment_dates.insert(*id, *date);
                }
            }
            Event::AppointmentEdited { id, date, field, value, at } => {
                if let Some(ds) = days.get_mut(date) {
                    ds.set_field(*id, *field, value, *at);
                }
            }
            Event::StatusChanged { id, date, status, at } => {
                if let Some(ds) = days.get_mut(date) {
                    ds.set_status(*id, *status, *at);
                }
            }
            Event::Archived { entries, at } => {
                for (id, date) in entries {
                    if let Some(ds) = days.get_mut(date) {
                        ds.set_status(*id, Status::Archived, *at);
                    }
                }
            }
        }
    }

    fn restore<G>(&self, days: &mut BTreeMap<NaiveDate, G>, appointment: &Appointment)
    where
        G: DerefMut<Target = DayState>,
    {
        if let Some(ds) = days.get_mut(&appointment.date) {
            ds.insert(appointment.clone());
        }
        self.appointment_dates.insert(appointment.id, appointment.date);
        if let Some(client_ref) = &appointment.client_ref {
            self.client_appointments
                .entry(client_ref.clone())
                .or_default()
                .push(appointment.id);
        }
        self.next_id.fetch_max(appointment.id + 1, Ordering::SeqCst);
    }
}
