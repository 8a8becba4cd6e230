//! Hard caps on caller-supplied input. Anything beyond these is rejected
//! before it reaches the store.

pub const MAX_NAME_LEN: usize = 128;
pub const MIN_NAME_LEN: usize = 2;

pub const MAX_SERVICE_LEN: usize = 128;
pub const MIN_SERVICE_LEN: usize = 2;

pub const MAX_PHONE_LEN: usize = 32;
pub const MAX_CLIENT_REF_LEN: usize = 64;
pub const MAX_SEARCH_TERM_LEN: usize = 128;

/// Rows kept per calendar date, all statuses included.
pub const MAX_ROWS_PER_DAY: usize = 4096;

/// How far ahead a slot may be booked.
pub const MAX_BOOKING_HORIZON_DAYS: i64 = 366;

/// Upper bound for the retention sweep age.
pub const MAX_ARCHIVE_AGE_DAYS: u32 = 36_500;

/// Times a writer re-resolves an appointment that moved while it waited for locks.
pub const MAX_RELOCK_ATTEMPTS: usize = 8;

/// Largest WAL payload replay will read. A longer length word is corruption.
pub const MAX_WAL_RECORD_LEN: usize = 1 << 20;
