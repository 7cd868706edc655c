//! Hard input ceilings. Everything user-supplied is bounded.

use std::time::Duration;

pub const MAX_INTERVIEWERS: usize = 10_000;
pub const MAX_CANDIDATES: usize = 100_000;
pub const MAX_NAME_LEN: usize = 255;
pub const MAX_EMAIL_LEN: usize = 320;
pub const MAX_PHONE_LEN: usize = 32;
pub const MAX_NOTES_LEN: usize = 2_000;

/// Weekly-pattern entries per interviewer.
pub const MAX_AVAILABILITY_ENTRIES: usize = 50;

/// Horizon ceiling for a single generate call.
pub const MAX_WEEKS_TO_GENERATE: u32 = 26;

/// Total slots one interviewer may accumulate.
pub const MAX_SLOTS_PER_INTERVIEWER: usize = 50_000;

pub const MAX_PAGE_SIZE: u32 = 200;

/// Allowed slot durations in minutes.
pub const ALLOWED_SLOT_DURATIONS: [u32; 6] = [15, 30, 45, 60, 90, 120];

/// Weekly booking cap ceiling (sanity bound, not a business rule).
pub const MAX_INTERVIEWS_PER_WEEK: u32 = 500;

/// Bound on waiting for a per-interviewer write lock. Exceeding it surfaces
/// as a retryable timeout instead of a stalled request.
pub const LOCK_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
