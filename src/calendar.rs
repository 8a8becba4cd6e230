use std::sync::Mutex;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Slot granularity in minutes. Every bookable time sits on this grid.
pub const SLOT_MINUTES: u32 = 30;

/// Human-entry date format used on the wire.
pub const DATE_FORMAT: &str = "%d.%m.%Y";
pub const TIME_FORMAT: &str = "%H:%M";

// ── Clock ─────────────────────────────────────────────────────────

/// Source of "now" for everything that prunes past slots.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Local wall clock of the business.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Settable clock for tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ── Business hours ────────────────────────────────────────────────

/// Daily working template: slots run over `[start, end)` minus the break
/// `[break_start, break_end)`. An empty break (`break_start == break_end`)
/// means no break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub break_start: NaiveTime,
    pub break_end: NaiveTime,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            start: hm(9, 0),
            end: hm(18, 0),
            break_start: hm(13, 0),
            break_end: hm(14, 0),
        }
    }
}

impl BusinessHours {
    pub fn new(
        start: NaiveTime,
        end: NaiveTime,
        break_start: NaiveTime,
        break_end: NaiveTime,
    ) -> Result<Self, CalendarError> {
        for t in [start, end, break_start, break_end] {
            if !on_grid(t) {
                return Err(CalendarError::OffGrid(t));
            }
        }
        if start >= end {
            return Err(CalendarError::InvalidHours("opening time must be before closing time"));
        }
        if break_start > break_end {
            return Err(CalendarError::InvalidHours("break must start before it ends"));
        }
        if break_start < break_end && (break_start < start || break_end > end) {
            return Err(CalendarError::InvalidHours("break must lie within working hours"));
        }
        Ok(Self {
            start,
            end,
            break_start,
            break_end,
        })
    }

    /// All slot start times for `date`, ascending. Every date shares the
    /// same template.
    pub fn enumerate_slots(&self, _date: NaiveDate) -> Vec<NaiveTime> {
        let open = minute_of_day(self.start);
        let close = minute_of_day(self.end);
        let (pause_from, pause_to) = (minute_of_day(self.break_start), minute_of_day(self.break_end));

        let mut slots = Vec::new();
        let mut m = open;
        while m + SLOT_MINUTES <= close {
            let overlaps_break = m < pause_to && pause_from < m + SLOT_MINUTES;
            if !overlaps_break {
                slots.push(from_minute_of_day(m));
            }
            m += SLOT_MINUTES;
        }
        slots
    }

    /// True if `time` is one of the template's slots.
    pub fn is_working_slot(&self, time: NaiveTime) -> bool {
        if !on_grid(time) {
            return false;
        }
        let m = minute_of_day(time);
        let inside = m >= minute_of_day(self.start) && m + SLOT_MINUTES <= minute_of_day(self.end);
        let in_break = m < minute_of_day(self.break_end)
            && minute_of_day(self.break_start) < m + SLOT_MINUTES;
        inside && !in_break
    }
}

/// True if the slot at `date`/`time` can no longer be taken at `now`:
/// the date is before today, or it is today and the slot does not start
/// strictly after the current time.
pub fn is_past(date: NaiveDate, time: NaiveTime, now: NaiveDateTime) -> bool {
    let today = now.date();
    date < today || (date == today && time <= now.time())
}

// ── Parsing / formatting ──────────────────────────────────────────

pub fn parse_date(input: &str) -> Result<NaiveDate, CalendarError> {
    let trimmed = input.trim();
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .map_err(|_| CalendarError::BadDate(trimmed.to_string()))
}

/// Parse `HH:MM` (24-hour). The result must sit on the slot grid.
pub fn parse_time(input: &str) -> Result<NaiveTime, CalendarError> {
    let trimmed = input.trim();
    let time = NaiveTime::parse_from_str(trimmed, TIME_FORMAT)
        .map_err(|_| CalendarError::BadTime(trimmed.to_string()))?;
    if !on_grid(time) {
        return Err(CalendarError::OffGrid(time));
    }
    Ok(time)
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn format_time(time: NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

fn minute_of_day(t: NaiveTime) -> u32 {
    t.hour() * 60 + t.minute()
}

fn from_minute_of_day(m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(m / 60, m % 60, 0).unwrap_or(NaiveTime::MIN)
}

fn on_grid(t: NaiveTime) -> bool {
    t.second() == 0 && t.nanosecond() == 0 && minute_of_day(t) % SLOT_MINUTES == 0
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}

// ── Errors ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarError {
    BadDate(String),
    BadTime(String),
    OffGrid(NaiveTime),
    InvalidHours(&'static str),
}

impl std::fmt::Display for CalendarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalendarError::BadDate(s) => write!(f, "invalid date '{s}', expected DD.MM.YYYY"),
            CalendarError::BadTime(s) => write!(f, "invalid time '{s}', expected HH:MM"),
            CalendarError::OffGrid(t) => write!(
                f,
                "time {} is not on the {SLOT_MINUTES}-minute slot grid",
                format_time(*t)
            ),
            CalendarError::InvalidHours(msg) => write!(f, "invalid business hours: {msg}"),
        }
    }
}

impl std::error::Error for CalendarError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(d: NaiveDate, h: u32, m: u32) -> NaiveDateTime {
        d.and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn default_template_has_sixteen_slots() {
        let slots = BusinessHours::default().enumerate_slots(date(2024, 6, 10));
        assert_eq!(slots.len(), 16);
        assert_eq!(slots.first(), Some(&hm(9, 0)));
        assert_eq!(slots.last(), Some(&hm(17, 30)));
        assert!(!slots.contains(&hm(13, 0)));
        assert!(!slots.contains(&hm(13, 30)));
        assert!(slots.contains(&hm(12, 30)));
        assert!(slots.contains(&hm(14, 0)));
    }

    #[test]
    fn slots_are_ascending() {
        let slots = BusinessHours::default().enumerate_slots(date(2024, 6, 10));
        assert!(slots.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn no_break_template() {
        let hours = BusinessHours::new(hm(10, 0), hm(12, 0), hm(10, 0), hm(10, 0)).unwrap();
        assert_eq!(
            hours.enumerate_slots(date(2024, 6, 10)),
            vec![hm(10, 0), hm(10, 30), hm(11, 0), hm(11, 30)]
        );
    }

    #[test]
    fn hours_validation() {
        assert!(matches!(
            BusinessHours::new(hm(18, 0), hm(9, 0), hm(13, 0), hm(14, 0)),
            Err(CalendarError::InvalidHours(_))
        ));
        assert!(matches!(
            BusinessHours::new(hm(9, 0), hm(18, 0), hm(8, 0), hm(9, 30)),
            Err(CalendarError::InvalidHours(_))
        ));
        assert!(matches!(
            BusinessHours::new(hm(9, 15), hm(18, 0), hm(13, 0), hm(14, 0)),
            Err(CalendarError::OffGrid(_))
        ));
    }

    #[test]
    fn working_slot_checks() {
        let hours = BusinessHours::default();
        assert!(hours.is_working_slot(hm(9, 0)));
        assert!(hours.is_working_slot(hm(17, 30)));
        assert!(!hours.is_working_slot(hm(18, 0)));
        assert!(!hours.is_working_slot(hm(8, 30)));
        assert!(!hours.is_working_slot(hm(13, 30)));
        assert!(!hours.is_working_slot(hm(10, 15)));
    }

    #[test]
    fn past_detection() {
        let today = date(2024, 6, 10);
        let now = at(today, 11, 0);
        assert!(is_past(date(2024, 6, 9), hm(17, 0), now));
        assert!(is_past(today, hm(10, 30), now));
        // a slot starting exactly now is already gone
        assert!(is_past(today, hm(11, 0), now));
        assert!(!is_past(today, hm(11, 30), now));
        assert!(!is_past(date(2024, 6, 11), hm(9, 0), now));
    }

    #[test]
    fn parse_and_format_roundtrip_formats() {
        let d = parse_date("10.06.2024").unwrap();
        assert_eq!(d, date(2024, 6, 10));
        assert_eq!(format_date(d), "10.06.2024");
        let t = parse_time(" 09:30 ").unwrap();
        assert_eq!(format_time(t), "09:30");
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(matches!(parse_date("2024-06-10"), Err(CalendarError::BadDate(_))));
        assert!(matches!(parse_date("31.02.2024"), Err(CalendarError::BadDate(_))));
        assert!(matches!(parse_time("25:00"), Err(CalendarError::BadTime(_))));
        assert!(matches!(parse_time("noon"), Err(CalendarError::BadTime(_))));
        assert!(matches!(parse_time("10:15"), Err(CalendarError::OffGrid(_))));
    }

    #[test]
    fn manual_clock_moves() {
        let clock = ManualClock::new(at(date(2024, 6, 10), 8, 0));
        assert_eq!(clock.today(), date(2024, 6, 10));
        clock.advance(chrono::Duration::hours(20));
        assert_eq!(clock.today(), date(2024, 6, 11));
        clock.set(at(date(2025, 1, 1), 0, 0));
        assert_eq!(clock.now(), at(date(2025, 1, 1), 0, 0));
    }
}
