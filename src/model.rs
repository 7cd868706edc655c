use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Minutes since midnight. Weekly-pattern boundaries are wall-clock times,
/// serialized as `"HH:MM"` (the format the UI sends).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub const MINUTES_PER_DAY: u16 = 24 * 60;

    pub fn from_minutes(minutes: u16) -> Option<Self> {
        (minutes < Self::MINUTES_PER_DAY).then_some(Self(minutes))
    }

    pub fn new(hour: u16, minute: u16) -> Option<Self> {
        if hour >= 24 || minute >= 60 {
            return None;
        }
        Some(Self(hour * 60 + minute))
    }

    pub fn minutes(&self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl std::str::FromStr for TimeOfDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, m) = s
            .split_once(':')
            .ok_or_else(|| format!("invalid time of day: {s:?}"))?;
        let hour: u16 = h.parse().map_err(|_| format!("invalid hour: {h:?}"))?;
        let minute: u16 = m.parse().map_err(|_| format!("invalid minute: {m:?}"))?;
        TimeOfDay::new(hour, minute).ok_or_else(|| format!("time of day out of range: {s:?}"))
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    /// 0 for Monday .. 6 for Sunday (ISO week layout).
    pub fn offset_from_monday(&self) -> i64 {
        match self {
            DayOfWeek::Monday => 0,
            DayOfWeek::Tuesday => 1,
            DayOfWeek::Wednesday => 2,
            DayOfWeek::Thursday => 3,
            DayOfWeek::Friday => 4,
            DayOfWeek::Saturday => 5,
            DayOfWeek::Sunday => 6,
        }
    }
}

/// One recurring day-of-week window an interviewer is open to interviewing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyAvailability {
    pub day_of_week: DayOfWeek,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interviewer {
    pub id: Ulid,
    pub name: String,
    pub email: String,
    pub max_interviews_per_week: u32,
    pub slot_duration_minutes: u32,
    pub weekly_availabilities: Vec<WeeklyAvailability>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    Available,
    Booked,
    Confirmed,
    Cancelled,
    Expired,
}

/// A concrete, dated interview window. Created only by generation, never
/// deleted — status transitions are the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub id: Ulid,
    pub interviewer_id: Ulid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: SlotStatus,
}

impl Slot {
    pub fn is_available(&self) -> bool {
        self.status == SlotStatus::Available
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: Ulid,
    pub name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl BookingStatus {
    /// Active bookings hold their slot and count against the weekly cap.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

/// A candidate's claim on a slot. Owns the slot's status while active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Ulid,
    pub slot_id: Ulid,
    pub candidate_id: Ulid,
    pub status: BookingStatus,
    pub booking_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Booking {
    pub fn new(
        slot_id: Ulid,
        candidate_id: Ulid,
        booking_notes: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Ulid::new(),
            slot_id,
            candidate_id,
            status: BookingStatus::Pending,
            booking_notes,
            created_at,
            updated_at: None,
            confirmed_at: None,
            cancelled_at: None,
        }
    }
}

/// ISO week key (Monday-based): `(iso_year, iso_week)`. The weekly cap is
/// evaluated per key of the slot's start time.
pub type IsoWeekKey = (i32, u32);

pub fn iso_week_key(t: DateTime<Utc>) -> IsoWeekKey {
    let iw = t.date_naive().iso_week();
    (iw.year(), iw.week())
}

/// Everything belonging to one interviewer, guarded by a single lock: the
/// profile, every slot ever generated, and every booking ever made.
#[derive(Debug, Clone)]
pub struct InterviewerState {
    pub profile: Interviewer,
    /// Sorted by `start_time`.
    pub slots: Vec<Slot>,
    /// Creation order.
    pub bookings: Vec<Booking>,
}

impl InterviewerState {
    pub fn new(profile: Interviewer) -> Self {
        Self {
            profile,
            slots: Vec::new(),
            bookings: Vec::new(),
        }
    }

    /// Insert a slot maintaining sort order by start time.
    pub fn insert_slot(&mut self, slot: Slot) {
        let pos = self
            .slots
            .binary_search_by_key(&slot.start_time, |s| s.start_time)
            .unwrap_or_else(|e| e);
        self.slots.insert(pos, slot);
    }

    pub fn slot(&self, id: &Ulid) -> Option<&Slot> {
        self.slots.iter().find(|s| s.id == *id)
    }

    pub fn slot_mut(&mut self, id: &Ulid) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.id == *id)
    }

    pub fn booking(&self, id: &Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == *id)
    }

    pub fn booking_mut(&mut self, id: &Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == *id)
    }

    /// Count of active (PENDING/CONFIRMED) bookings whose slot falls in the
    /// given ISO week.
    pub fn active_bookings_in_week(&self, week: IsoWeekKey) -> u32 {
        self.bookings
            .iter()
            .filter(|b| b.status.is_active())
            .filter(|b| {
                self.slot(&b.slot_id)
                    .is_some_and(|s| iso_week_key(s.start_time) == week)
            })
            .count() as u32
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
/// Every event carries the owning interviewer id so replay can route it
/// without consulting indexes that don't exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    InterviewerCreated {
        interviewer: Interviewer,
    },
    AvailabilityReplaced {
        interviewer_id: Ulid,
        entries: Vec<WeeklyAvailability>,
    },
    CandidateCreated {
        candidate: Candidate,
    },
    /// Newly generated slots (all AVAILABLE) — or, during compaction, the
    /// full slot set with current statuses.
    SlotsGenerated {
        interviewer_id: Ulid,
        slots: Vec<Slot>,
    },
    /// Slot claimed: slot → BOOKED, booking inserted in PENDING.
    SlotBooked {
        interviewer_id: Ulid,
        booking: Booking,
    },
    BookingConfirmed {
        interviewer_id: Ulid,
        booking_id: Ulid,
        at: DateTime<Utc>,
    },
    /// `slot_released` records the outcome decided at cancel time:
    /// true → slot back to AVAILABLE, false → slot EXPIRED. Replay must not
    /// re-derive this from the clock.
    BookingCancelled {
        interviewer_id: Ulid,
        booking_id: Ulid,
        slot_released: bool,
        at: DateTime<Utc>,
    },
    BookingNotesUpdated {
        interviewer_id: Ulid,
        booking_id: Ulid,
        notes: Option<String>,
        at: DateTime<Utc>,
    },
    BookingCompleted {
        interviewer_id: Ulid,
        booking_id: Ulid,
        at: DateTime<Utc>,
    },
    BookingNoShow {
        interviewer_id: Ulid,
        booking_id: Ulid,
        at: DateTime<Utc>,
    },
    SlotExpired {
        interviewer_id: Ulid,
        slot_id: Ulid,
        at: DateTime<Utc>,
    },
    /// Compaction-only: reinsert a booking verbatim without touching its slot.
    BookingRestored {
        interviewer_id: Ulid,
        booking: Booking,
    },
}

impl Event {
    /// The interviewer whose state this event mutates, if any.
    pub fn interviewer_id(&self) -> Option<Ulid> {
        match self {
            Event::InterviewerCreated { interviewer } => Some(interviewer.id),
            Event::CandidateCreated { .. } => None,
            Event::AvailabilityReplaced { interviewer_id, .. }
            | Event::SlotsGenerated { interviewer_id, .. }
            | Event::SlotBooked { interviewer_id, .. }
            | Event::BookingConfirmed { interviewer_id, .. }
            | Event::BookingCancelled { interviewer_id, .. }
            | Event::BookingNotesUpdated { interviewer_id, .. }
            | Event::BookingCompleted { interviewer_id, .. }
            | Event::BookingNoShow { interviewer_id, .. }
            | Event::SlotExpired { interviewer_id, .. }
            | Event::BookingRestored { interviewer_id, .. } => Some(*interviewer_id),
        }
    }
}

// ── Query result types ───────────────────────────────────────────

/// Slot as the API returns it, joined with interviewer display fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    pub id: Ulid,
    pub interviewer_id: Ulid,
    pub interviewer_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: SlotStatus,
    pub week_number: u32,
    pub year: i32,
}

impl SlotView {
    pub fn from_slot(slot: &Slot, interviewer_name: &str) -> Self {
        let (year, week_number) = iso_week_key(slot.start_time);
        Self {
            id: slot.id,
            interviewer_id: slot.interviewer_id,
            interviewer_name: interviewer_name.to_string(),
            start_time: slot.start_time,
            end_time: slot.end_time,
            status: slot.status,
            week_number,
            year,
        }
    }
}

/// Booking joined with slot and participant display fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    pub id: Ulid,
    pub slot_id: Ulid,
    pub candidate_id: Ulid,
    pub candidate_name: String,
    pub candidate_email: String,
    pub interviewer_id: Ulid,
    pub interviewer_name: String,
    pub slot_start_time: DateTime<Utc>,
    pub slot_end_time: DateTime<Utc>,
    pub status: BookingStatus,
    pub booking_notes: Option<String>,
    pub week_number: u32,
    pub year: i32,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OffsetPage<T> {
    pub data: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: u64,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_previous: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPage<T> {
    pub data: Vec<T>,
    pub next_cursor: Option<Ulid>,
    pub has_next: bool,
}
