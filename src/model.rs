use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Appointment ids are assigned once and never reused.
pub type AppointmentId = u64;

/// Lifecycle of an appointment. `Active` is the only status that occupies
/// a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Active,
    CancelledByClient,
    Deleted,
    Archived,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::CancelledByClient => "cancelled_by_client",
            Status::Deleted => "deleted",
            Status::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Status> {
        match s.trim().to_lowercase().as_str() {
            "active" => Some(Status::Active),
            "cancelled_by_client" => Some(Status::CancelledByClient),
            "deleted" => Some(Status::Deleted),
            "archived" => Some(Status::Archived),
            _ => None,
        }
    }

    /// The whole transition table. Nothing leaves `Archived`, nothing
    /// enters `Active`.
    pub fn can_transition_to(self, next: Status) -> bool {
        matches!(
            (self, next),
            (Status::Active, Status::CancelledByClient)
                | (Status::Active, Status::Deleted)
                | (Status::CancelledByClient, Status::Archived)
                | (Status::Deleted, Status::Archived)
        )
    }

    /// Cancelled or deleted: waiting for the retention sweep.
    pub fn is_retired(self) -> bool {
        matches!(self, Status::CancelledByClient | Status::Deleted)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Columns an administrator may edit in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentField {
    ClientName,
    Service,
}

impl AppointmentField {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentField::ClientName => "client_name",
            AppointmentField::Service => "service",
        }
    }

    pub fn parse(s: &str) -> Option<AppointmentField> {
        match s {
            "client_name" => Some(AppointmentField::ClientName),
            "service" => Some(AppointmentField::Service),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub client_name: String,
    pub client_ref: Option<String>,
    pub phone: Option<String>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub service: String,
    pub status: Status,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Appointment {
    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }

    pub fn is_owned_by(&self, client_ref: &str) -> bool {
        self.client_ref.as_deref() == Some(client_ref)
    }
}

/// Fields supplied by the caller when booking; the store fills in the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAppointment {
    pub client_name: String,
    pub client_ref: Option<String>,
    pub phone: Option<String>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub service: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub client_ref: String,
    pub name: String,
    pub phone: Option<String>,
    pub first_visit: NaiveDate,
    pub last_visit: NaiveDate,
    pub total_visits: u32,
    pub notes: Option<String>,
}

impl Client {
    pub fn first_booking(appointment: &Appointment, client_ref: &str) -> Self {
        Self {
            client_ref: client_ref.to_string(),
            name: appointment.client_name.clone(),
            phone: appointment.phone.clone(),
            first_visit: appointment.date,
            last_visit: appointment.date,
            total_visits: 1,
            notes: None,
        }
    }

    /// Fold a later booking into the record. A booking without a phone keeps
    /// the known one.
    pub fn record_booking(&mut self, appointment: &Appointment) {
        self.name = appointment.client_name.clone();
        if appointment.phone.is_some() {
            self.phone = appointment.phone.clone();
        }
        self.first_visit = self.first_visit.min(appointment.date);
        self.last_visit = appointment.date;
        self.total_visits += 1;
    }
}

/// Every appointment row for one calendar date.
#[derive(Debug, Clone)]
pub struct DayState {
    pub date: NaiveDate,
    /// All rows regardless of status, sorted by `(time, id)`.
    pub appointments: Vec<Appointment>,
    /// Active rows by time: at most one per slot.
    active: BTreeMap<NaiveTime, AppointmentId>,
}

impl DayState {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            appointments: Vec::new(),
            active: BTreeMap::new(),
        }
    }

    /// Insert keeping `(time, id)` order. An active row claims its slot.
    pub fn insert(&mut self, appointment: Appointment) {
        debug_assert_eq!(appointment.date, self.date);
        let key = (appointment.time, appointment.id);
        let pos = self
            .appointments
            .binary_search_by_key(&key, |a| (a.time, a.id))
            .unwrap_or_else(|e| e);
        if appointment.is_active() {
            self.active.insert(appointment.time, appointment.id);
        }
        self.appointments.insert(pos, appointment);
    }

    pub fn remove(&mut self, id: AppointmentId) -> Option<Appointment> {
        let pos = self.appointments.iter().position(|a| a.id == id)?;
        let removed = self.appointments.remove(pos);
        self.release_slot(&removed);
        Some(removed)
    }

    pub fn get(&self, id: AppointmentId) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == id)
    }

    /// The active appointment holding `time`, if any.
    pub fn holder_of(&self, time: NaiveTime) -> Option<&Appointment> {
        let id = self.active.get(&time)?;
        self.get(*id)
    }

    pub fn active(&self) -> impl Iterator<Item = &Appointment> {
        self.appointments.iter().filter(|a| a.is_active())
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn set_status(&mut self, id: AppointmentId, status: Status, at: NaiveDateTime) {
        let Some(pos) = self.appointments.iter().position(|a| a.id == id) else {
            return;
        };
        let appointment = &mut self.appointments[pos];
        appointment.status = status;
        appointment.updated_at = at;
        if status != Status::Active {
            let snapshot = appointment.clone();
            self.release_slot(&snapshot);
        }
    }

    pub fn set_field(&mut self, id: AppointmentId, field: AppointmentField, value: &str, at: NaiveDateTime) {
        if let Some(appointment) = self.appointments.iter_mut().find(|a| a.id == id) {
            match field {
                AppointmentField::ClientName => appointment.client_name = value.to_string(),
                AppointmentField::Service => appointment.service = value.to_string(),
            }
            appointment.updated_at = at;
        }
    }

    fn release_slot(&mut self, appointment: &Appointment) {
        if self.active.get(&appointment.time) == Some(&appointment.id) {
            self.active.remove(&appointment.time);
        }
    }
}

/// Flat event records; this is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// New active row; also upserts the client when `client_ref` is set.
    AppointmentBooked {
        appointment: Appointment,
    },
    AppointmentMoved {
        id: AppointmentId,
        from: NaiveDate,
        date: NaiveDate,
        time: NaiveTime,
        at: NaiveDateTime,
    },
    AppointmentEdited {
        id: AppointmentId,
        date: NaiveDate,
        field: AppointmentField,
        value: String,
        at: NaiveDateTime,
    },
    StatusChanged {
        id: AppointmentId,
        date: NaiveDate,
        status: Status,
        at: NaiveDateTime,
    },
    /// One retention sweep, applied as a unit.
    Archived {
        entries: Vec<(AppointmentId, NaiveDate)>,
        at: NaiveDateTime,
    },
    /// Snapshot records written by WAL compaction.
    ClientRestored {
        client: Client,
    },
    AppointmentRestored {
        appointment: Appointment,
    },
}

impl Event {
    /// Every date whose day state the event touches.
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates = match self {
            Event::AppointmentBooked { appointment } | Event::AppointmentRestored { appointment } => {
                vec![appointment.date]
            }
            Event::AppointmentMoved { from, date, .. } => vec![*from, *date],
            Event::AppointmentEdited { date, .. } | Event::StatusChanged { date, .. } => vec![*date],
            Event::Archived { entries, .. } => entries.iter().map(|(_, d)| *d).collect(),
            Event::ClientRestored { .. } => Vec::new(),
        };
        dates.sort();
        dates.dedup();
        dates
    }
}

// ── Query result types ───────────────────────────────────────────

/// Active-appointment counts for the start screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScheduleStats {
    pub today: usize,
    pub tomorrow: usize,
    /// `[today, today + 7]` inclusive.
    pub week: usize,
    pub total: usize,
}
