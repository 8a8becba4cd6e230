use std::collections::BTreeSet;

use chrono::{Days, NaiveDate, NaiveTime};

use crate::calendar::{format_time, is_past};
use crate::limits::*;
use crate::model::*;

use super::conflict::find_conflict_in;
use super::{Engine, EngineError};

impl Engine {
    /// The row with `id`, whatever its status.
    pub async fn find_by_id(&self, id: AppointmentId) -> Result<Appointment, EngineError> {
        // The row can move days between the index lookup and the read.
        for _ in 0..MAX_RELOCK_ATTEMPTS {
            let date = self.tables.date_of(id).ok_or(EngineError::NotFound(id))?;
            if let Some(ds) = self.read_day(&date).await?
                && let Some(appointment) = ds.get(id)
            {
                return Ok(appointment.clone());
            }
        }
        Err(EngineError::NotFound(id))
    }

    /// Name of the client whose active appointment holds `(date, time)`.
    pub async fn find_conflict(
        &self,
        time: NaiveTime,
        date: NaiveDate,
        exclude: Option<AppointmentId>,
    ) -> Result<Option<String>, EngineError> {
        Ok(self
            .read_day(&date)
            .await?
            .and_then(|ds| find_conflict_in(&ds, time, exclude)))
    }

    /// All-digit terms look up an id; anything else matches a substring
    /// of the client name (case-insensitive) or the `HH:MM` time. Active
    /// rows only, ordered by `(date, time)`.
    pub async fn search(&self, term: &str) -> Result<Vec<Appointment>, EngineError> {
        let term = term.trim();
        if term.len() > MAX_SEARCH_TERM_LEN {
            return Err(EngineError::LimitExceeded("search term too long"));
        }
        if term.is_empty() {
            return Ok(Vec::new());
        }

        if term.bytes().all(|b| b.is_ascii_digit()) {
            let Ok(id) = term.parse::<AppointmentId>() else {
                return Ok(Vec::new());
            };
            return match self.find_by_id(id).await {
                Ok(a) if a.is_active() => Ok(vec![a]),
                Ok(_) | Err(EngineError::NotFound(_)) => Ok(Vec::new()),
                Err(e) => Err(e),
            };
        }

        let needle = term.to_lowercase();
        let mut found = Vec::new();
        for date in self.tables.sorted_dates() {
            if let Some(ds) = self.read_day(&date).await? {
                found.extend(
                    ds.active()
                        .filter(|a| {
                            a.client_name.to_lowercase().contains(&needle)
                                || format_time(a.time).contains(&needle)
                        })
                        .cloned(),
                );
            }
        }
        Ok(found)
    }

    /// Active appointments on `date`, by time.
    pub async fn list_for_date(&self, date: NaiveDate) -> Result<Vec<Appointment>, EngineError> {
        Ok(self
            .read_day(&date)
            .await?
            .map(|ds| ds.active().cloned().collect())
            .unwrap_or_default())
    }

    /// Active appointments of one client by `(date, time)`. Without
    /// `include_past`, slots that have already started are left out.
    pub async fn list_for_client(
        &self,
        client_ref: &str,
        include_past: bool,
    ) -> Result<Vec<Appointment>, EngineError> {
        let dates: BTreeSet<NaiveDate> = self
            .tables
            .appointment_ids_for(client_ref)
            .into_iter()
            .filter_map(|id| self.tables.date_of(id))
            .collect();
        let now = self.clock.now();

        let mut rows = Vec::new();
        for date in dates {
            if let Some(ds) = self.read_day(&date).await? {
                rows.extend(
                    ds.active()
                        .filter(|a| a.is_owned_by(client_ref))
                        .filter(|a| include_past || !is_past(a.date, a.time, now))
                        .cloned(),
                );
            }
        }
        Ok(rows)
    }

    pub fn get_client(&self, client_ref: &str) -> Option<Client> {
        self.tables.client(client_ref)
    }

    pub async fn count_for_date(&self, date: NaiveDate) -> Result<usize, EngineError> {
        Ok(self
            .read_day(&date)
            .await?
            .map(|ds| ds.active_count())
            .unwrap_or(0))
    }

    pub async fn stats(&self) -> Result<ScheduleStats, EngineError> {
        let today = self.clock.today();
        let tomorrow = today.checked_add_days(Days::new(1));
        let week_end = today.checked_add_days(Days::new(7));

        let mut stats = ScheduleStats::default();
        for date in self.tables.sorted_dates() {
            let Some(ds) = self.read_day(&date).await? else {
                continue;
            };
            let n = ds.active_count();
            stats.total += n;
            if date == today {
                stats.today += n;
            }
            if Some(date) == tomorrow {
                stats.tomorrow += n;
            }
            if date >= today && week_end.is_some_and(|end| date <= end) {
                stats.week += n;
            }
        }
        Ok(stats)
    }
}
