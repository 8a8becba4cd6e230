use chrono::NaiveTime;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Name of the active appointment holding `time`, ignoring `exclude`.
pub(crate) fn find_conflict_in(
    day: &DayState,
    time: NaiveTime,
    exclude: Option<AppointmentId>,
) -> Option<String> {
    day.holder_of(time)
        .filter(|holder| Some(holder.id) != exclude)
        .map(|holder| holder.client_name.clone())
}

pub(crate) fn check_no_conflict(
    day: &DayState,
    time: NaiveTime,
    exclude: Option<AppointmentId>,
) -> Result<(), EngineError> {
    match find_conflict_in(day, time, exclude) {
        Some(client_name) => {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            Err(EngineError::Conflict { client_name })
        }
        None => Ok(()),
    }
}

pub(crate) fn check_day_capacity(day: &DayState) -> Result<(), EngineError> {
    if day.appointments.len() >= MAX_ROWS_PER_DAY {
        return Err(EngineError::LimitExceeded("too many appointments on one day"));
    }
    Ok(())
}

/// Size caps on everything the store persists. Shape rules (minimum
/// length, working slot) live with the booking manager.
pub(crate) fn validate_lengths(new: &NewAppointment) -> Result<(), EngineError> {
    if new.client_name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("client name too long"));
    }
    if new.service.len() > MAX_SERVICE_LEN {
        return Err(EngineError::LimitExceeded("service name too long"));
    }
    if new.phone.as_ref().is_some_and(|p| p.len() > MAX_PHONE_LEN) {
        return Err(EngineError::LimitExceeded("phone too long"));
    }
    if new.client_ref.as_ref().is_some_and(|r| r.len() > MAX_CLIENT_REF_LEN) {
        return Err(EngineError::LimitExceeded("client_ref too long"));
    }
    Ok(())
}

pub(crate) fn validate_field_value(field: AppointmentField, value: &str) -> Result<(), EngineError> {
    let max = match field {
        AppointmentField::ClientName => MAX_NAME_LEN,
        AppointmentField::Service => MAX_SERVICE_LEN,
    };
    if value.len() > max {
        return Err(EngineError::LimitExceeded("field value too long"));
    }
    Ok(())
}
