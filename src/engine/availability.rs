use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::calendar::{is_past, BusinessHours};
use crate::model::AppointmentId;

use super::{Engine, EngineError};

/// Template slots for `date` minus `busy`, minus anything already past at
/// `now`. Empty for dates before today.
pub fn free_slots(
    hours: &BusinessHours,
    date: NaiveDate,
    busy: &BTreeSet<NaiveTime>,
    now: NaiveDateTime,
) -> Vec<NaiveTime> {
    if date < now.date() {
        return Vec::new();
    }
    hours
        .enumerate_slots(date)
        .into_iter()
        .filter(|slot| !busy.contains(slot))
        .filter(|slot| !is_past(date, *slot, now))
        .collect()
}

impl Engine {
    /// Bookable slots on `date`, ascending. `exclude` keeps the appointment
    /// being rescheduled from blocking its own slot.
    ///
    /// A snapshot: a slot listed here can be taken before the caller commits,
    /// which is why booking re-checks under the day lock.
    pub async fn available_slots(
        &self,
        date: NaiveDate,
        exclude: Option<AppointmentId>,
    ) -> Result<Vec<NaiveTime>, EngineError> {
        let now = self.clock.now();
        if date < now.date() {
            return Ok(Vec::new());
        }
        let busy: BTreeSet<NaiveTime> = self
            .list_for_date(date)
            .await?
            .into_iter()
            .filter(|a| Some(a.id) != exclude)
            .map(|a| a.time)
            .collect();
        Ok(free_slots(&self.hours, date, &busy, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
    }

    #[test]
    fn empty_day_yields_full_template() {
        let now = day().and_hms_opt(8, 0, 0).unwrap();
        let slots = free_slots(&BusinessHours::default(), day(), &BTreeSet::new(), now);
        assert_eq!(slots.len(), 16);
        assert_eq!(slots[7], t(12, 30));
        assert_eq!(slots[8], t(14, 0));
    }

    #[test]
    fn busy_slots_are_removed() {
        let now = day().and_hms_opt(8, 0, 0).unwrap();
        let busy: BTreeSet<_> = [t(9, 0), t(15, 30)].into_iter().collect();
        let slots = free_slots(&BusinessHours::default(), day(), &busy, now);
        assert_eq!(slots.len(), 14);
        assert!(!slots.contains(&t(9, 0)));
        assert!(!slots.contains(&t(15, 30)));
        assert_eq!(slots.first(), Some(&t(9, 30)));
    }

    #[test]
    fn today_prunes_started_slots() {
        let now = day().and_hms_opt(14, 10, 0).unwrap();
        let slots = free_slots(&BusinessHours::default(), day(), &BTreeSet::new(), now);
        assert_eq!(slots.first(), Some(&t(14, 30)));
        assert_eq!(slots.len(), 7);
    }

    #[test]
    fn past_date_is_empty() {
        let now = day().and_hms_opt(8, 0, 0).unwrap();
        let yesterday = NaiveDate::from_ymd_opt(2024, 6, 9).unwrap();
        assert!(free_slots(&BusinessHours::default(), yesterday, &BTreeSet::new(), now).is_empty());
    }

    #[test]
    fn after_closing_today_is_empty() {
        let now = day().and_hms_opt(17, 30, 0).unwrap();
        assert!(free_slots(&BusinessHours::default(), day(), &BTreeSet::new(), now).is_empty());
    }
}
