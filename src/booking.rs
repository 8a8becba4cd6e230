use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime};
use tracing::debug;

use crate::calendar::{format_time, is_past};
use crate::engine::{Engine, EngineError};
use crate::limits::*;
use crate::model::*;

/// The only path through which appointment state changes. Validates input
/// at the boundary, then hands the atomic part to the store.
pub struct BookingManager {
    engine: Arc<Engine>,
}

impl BookingManager {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Book a slot. Conflict check, client upsert and visit count are one
    /// store operation.
    pub async fn book(&self, request: NewAppointment) -> Result<AppointmentId, EngineError> {
        let request = normalize(request)?;
        self.check_slot(request.date, request.time)?;
        self.engine.insert(request).await
    }

    /// Move an active appointment. A `requester` marks a client call, which
    /// may only move the client's own appointment; administrators pass `None`.
    /// Without a `date` the row stays on whatever day it holds under the lock.
    pub async fn reschedule(
        &self,
        id: AppointmentId,
        date: Option<NaiveDate>,
        time: NaiveTime,
        requester: Option<&str>,
    ) -> Result<(), EngineError> {
        if let Some(date) = date {
            self.check_slot(date, time)?;
        }
        self.engine
            .update_schedule(id, date, time, |current| {
                check_owner(current, requester)?;
                match date {
                    Some(_) => Ok(()),
                    None => self.check_slot(current.date, time),
                }
            })
            .await
    }

    pub async fn cancel_by_client(&self, id: AppointmentId, client_ref: &str) -> Result<(), EngineError> {
        self.engine
            .set_status_checked(id, Status::CancelledByClient, |current| {
                check_owner(current, Some(client_ref))
            })
            .await
    }

    /// Administrator removal. The row is kept with status `deleted`.
    pub async fn delete(&self, id: AppointmentId) -> Result<(), EngineError> {
        self.engine.set_status(id, Status::Deleted).await
    }

    pub async fn change_field(
        &self,
        id: AppointmentId,
        field: AppointmentField,
        value: &str,
    ) -> Result<(), EngineError> {
        let value = match field {
            AppointmentField::ClientName => required_text("client name", value, MIN_NAME_LEN, MAX_NAME_LEN)?,
            AppointmentField::Service => required_text("service", value, MIN_SERVICE_LEN, MAX_SERVICE_LEN)?,
        };
        self.engine.update_field(id, field, value).await
    }

    /// A bookable target: a working slot, not yet started, within the horizon.
    fn check_slot(&self, date: NaiveDate, time: NaiveTime) -> Result<(), EngineError> {
        if !self.engine.hours().is_working_slot(time) {
            return Err(EngineError::Validation(format!(
                "{} is not a working slot",
                format_time(time)
            )));
        }
        let now = self.engine.clock().now();
        if is_past(date, time, now) {
            return Err(EngineError::Validation(format!(
                "slot {date} {} has already passed",
                format_time(time)
            )));
        }
        let horizon = now.date().checked_add_signed(Duration::days(MAX_BOOKING_HORIZON_DAYS));
        if horizon.is_none_or(|last| date > last) {
            return Err(EngineError::Validation(format!(
                "cannot book more than {MAX_BOOKING_HORIZON_DAYS} days ahead"
            )));
        }
        Ok(())
    }
}

fn check_owner(appointment: &Appointment, requester: Option<&str>) -> Result<(), EngineError> {
    match requester {
        Some(client_ref) if !appointment.is_owned_by(client_ref) => {
            debug!("client {client_ref} denied access to appointment {}", appointment.id);
            Err(EngineError::Forbidden(appointment.id))
        }
        _ => Ok(()),
    }
}

/// Trimmed text of at least `min` characters.
fn required_text(what: &str, value: &str, min: usize, max: usize) -> Result<String, EngineError> {
    let trimmed = value.trim();
    if trimmed.chars().count() < min {
        return Err(EngineError::Validation(format!(
            "{what} must be at least {min} characters"
        )));
    }
    if trimmed.len() > max {
        return Err(EngineError::LimitExceeded("text field too long"));
    }
    Ok(trimmed.to_string())
}

fn optional_text(value: Option<String>, max: usize, what: &'static str) -> Result<Option<String>, EngineError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.len() > max {
        return Err(EngineError::LimitExceeded(what));
    }
    Ok(Some(trimmed.to_string()))
}

fn normalize(request: NewAppointment) -> Result<NewAppointment, EngineError> {
    Ok(NewAppointment {
        client_name: required_text("client name", &request.client_name, MIN_NAME_LEN, MAX_NAME_LEN)?,
        service: required_text("service", &request.service, MIN_SERVICE_LEN, MAX_SERVICE_LEN)?,
        phone: optional_text(request.phone, MAX_PHONE_LEN, "phone too long")?,
        client_ref: optional_text(request.client_ref, MAX_CLIENT_REF_LEN, "client_ref too long")?,
        date: request.date,
        time: request.time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::NaiveDateTime;
    use tokio_test::assert_ok;

    use crate::calendar::ManualClock;
    use crate::engine::EngineSettings;

    fn test_wal_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("slotwise_test_booking");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn june10() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        june10().and_hms_opt(h, m, 0).unwrap()
    }

    fn manager(name: &str) -> (BookingManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(at(8, 0)));
        let engine = Engine::new(test_wal_path(name), EngineSettings::default(), clock.clone()).unwrap();
        (BookingManager::new(Arc::new(engine)), clock)
    }

    fn request(name: &str, client_ref: &str, time: NaiveTime) -> NewAppointment {
        NewAppointment {
            client_name: name.into(),
            client_ref: Some(client_ref.into()),
            phone: None,
            date: june10(),
            time,
            service: "Haircut".into(),
        }
    }

    #[tokio::test]
    async fn book_trims_and_stores() {
        let (bm, _) = manager("book_trim.wal");
        let mut req = request("  Anna  ", " 1 ", t(10, 0));
        req.phone = Some("   ".into());
        let id = bm.book(req).await.unwrap();

        let row = bm.engine().find_by_id(id).await.unwrap();
        assert_eq!(row.client_name, "Anna");
        assert_eq!(row.client_ref.as_deref(), Some("1"));
        assert_eq!(row.phone, None);
    }

    #[tokio::test]
    async fn book_rejects_short_name_and_service() {
        let (bm, _) = manager("book_short.wal");
        let short_name = bm.book(request(" A ", "1", t(10, 0))).await;
        assert!(matches!(short_name, Err(EngineError::Validation(_))));

        let mut req = request("Anna", "1", t(10, 0));
        req.service = "x".into();
        assert!(matches!(bm.book(req).await, Err(EngineError::Validation(_))));
        assert!(bm.engine().list_for_date(june10()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn book_rejects_break_and_after_hours() {
        let (bm, _) = manager("book_hours.wal");
        for time in [t(13, 0), t(13, 30), t(18, 0), t(8, 30)] {
            let result = bm.book(request("Anna", "1", time)).await;
            assert!(matches!(result, Err(EngineError::Validation(_))), "{time} accepted");
        }
    }

    #[tokio::test]
    async fn book_rejects_past_slot() {
        let (bm, clock) = manager("book_past.wal");
        clock.set(at(11, 0));
        assert!(matches!(
            bm.book(request("Anna", "1", t(11, 0))).await,
            Err(EngineError::Validation(_))
        ));
        assert_ok!(bm.book(request("Anna", "1", t(11, 30))).await);
    }

    #[tokio::test]
    async fn book_rejects_far_future() {
        let (bm, _) = manager("book_horizon.wal");
        let mut req = request("Anna", "1", t(10, 0));
        req.date = june10() + Duration::days(MAX_BOOKING_HORIZON_DAYS + 1);
        assert!(matches!(bm.book(req).await, Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn client_cannot_move_foreign_appointment() {
        let (bm, _) = manager("move_foreign.wal");
        let id = bm.book(request("Anna", "1", t(10, 0))).await.unwrap();

        let result = bm.reschedule(id, Some(june10()), t(11, 0), Some("2")).await;
        assert!(matches!(result, Err(EngineError::Forbidden(_))));
        assert_eq!(bm.engine().find_by_id(id).await.unwrap().time, t(10, 0));

        assert_ok!(bm.reschedule(id, Some(june10()), t(11, 0), Some("1")).await);
        // administrators move anything
        assert_ok!(bm.reschedule(id, Some(june10()), t(12, 0), None).await);
        assert_eq!(bm.engine().find_by_id(id).await.unwrap().time, t(12, 0));
    }

    #[tokio::test]
    async fn reschedule_checks_order() {
        let (bm, _) = manager("move_order.wal");
        let anna = bm.book(request("Anna", "1", t(10, 0))).await.unwrap();
        bm.book(request("Boris", "2", t(11, 0))).await.unwrap();

        // unknown id first
        assert!(matches!(
            bm.reschedule(999, Some(june10()), t(11, 0), Some("2")).await,
            Err(EngineError::NotFound(999))
        ));
        // ownership before conflict
        assert!(matches!(
            bm.reschedule(anna, Some(june10()), t(11, 0), Some("2")).await,
            Err(EngineError::Forbidden(_))
        ));
        assert!(matches!(
            bm.reschedule(anna, Some(june10()), t(11, 0), Some("1")).await,
            Err(EngineError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn same_day_move_uses_current_date() {
        let (bm, clock) = manager("move_same_day.wal");
        let mut req = request("Anna", "1", t(10, 0));
        req.date = june10() + Duration::days(1);
        let id = bm.book(req).await.unwrap();

        assert_ok!(bm.reschedule(id, None, t(9, 0), Some("1")).await);
        let row = bm.engine().find_by_id(id).await.unwrap();
        assert_eq!((row.date, row.time), (june10() + Duration::days(1), t(9, 0)));

        assert!(matches!(bm.reschedule(id, None, t(9, 30), Some("2")).await, Err(EngineError::Forbidden(_))));

        // past-slot check runs against the row's own day
        let today = bm.book(request("Boris", "2", t(12, 0))).await.unwrap();
        clock.set(at(11, 0));
        assert!(matches!(
            bm.reschedule(today, None, t(10, 30), Some("2")).await,
            Err(EngineError::Validation(_))
        ));
        assert_ok!(bm.reschedule(today, None, t(11, 30), Some("2")).await);
        assert!(matches!(
            bm.reschedule(today, None, t(13, 0), None).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn cancel_requires_owner_and_active_row() {
        let (bm, _) = manager("cancel.wal");
        let id = bm.book(request("Anna", "1", t(10, 0))).await.unwrap();

        assert!(matches!(bm.cancel_by_client(id, "2").await, Err(EngineError::Forbidden(_))));
        assert_eq!(bm.engine().find_by_id(id).await.unwrap().status, Status::Active);

        assert_ok!(bm.cancel_by_client(id, "1").await);
        assert_eq!(bm.engine().find_by_id(id).await.unwrap().status, Status::CancelledByClient);
        assert!(matches!(bm.cancel_by_client(id, "1").await, Err(EngineError::NotFound(_))));
        assert!(matches!(bm.delete(id).await, Err(EngineError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_frees_slot_for_rebooking() {
        let (bm, _) = manager("delete.wal");
        let id = bm.book(request("Anna", "1", t(10, 0))).await.unwrap();
        assert!(matches!(
            bm.book(request("Boris", "2", t(10, 0))).await,
            Err(EngineError::Conflict { .. })
        ));
        bm.delete(id).await.unwrap();
        assert_ok!(bm.book(request("Boris", "2", t(10, 0))).await);
    }

    #[tokio::test]
    async fn change_field_validates_value() {
        let (bm, _) = manager("change_field.wal");
        let id = bm.book(request("Anna", "1", t(10, 0))).await.unwrap();

        assert!(matches!(
            bm.change_field(id, AppointmentField::Service, " ").await,
            Err(EngineError::Validation(_))
        ));
        bm.change_field(id, AppointmentField::ClientName, " Anna Petrova ").await.unwrap();
        assert_eq!(bm.engine().find_by_id(id).await.unwrap().client_name, "Anna Petrova");
    }
}
