use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::availability::{expand_weekly, validate_entries, validate_slot_duration};
use super::{Engine, EngineError, WalCommand, now};

/// A due transition discovered by a sweep scan. Collected under read locks,
/// then applied one by one under write locks with a re-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepAction {
    ExpireSlot {
        interviewer_id: Ulid,
        slot_id: Ulid,
    },
    CompleteBooking {
        interviewer_id: Ulid,
        booking_id: Ulid,
    },
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::Validation(format!("{field} must not be empty")));
    }
    if value.len() > max {
        return Err(EngineError::Validation(format!(
            "{field} exceeds {max} bytes"
        )));
    }
    Ok(())
}

impl Engine {
    // ── Interviewers ─────────────────────────────────────

    pub async fn create_interviewer(
        &self,
        name: String,
        email: String,
        max_interviews_per_week: u32,
        slot_duration_minutes: u32,
        weekly_availabilities: Vec<WeeklyAvailability>,
    ) -> Result<Interviewer, EngineError> {
        check_len("name", &name, MAX_NAME_LEN)?;
        check_len("email", &email, MAX_EMAIL_LEN)?;
        validate_slot_duration(slot_duration_minutes)?;
        if max_interviews_per_week == 0 || max_interviews_per_week > MAX_INTERVIEWS_PER_WEEK {
            return Err(EngineError::Validation(format!(
                "maxInterviewsPerWeek must be between 1 and {MAX_INTERVIEWS_PER_WEEK}"
            )));
        }
        let entries = validate_entries(&weekly_availabilities, slot_duration_minutes)?;
        if self.state.len() >= MAX_INTERVIEWERS {
            return Err(EngineError::LimitExceeded("too many interviewers"));
        }

        let _commit = self.commit_gate.read().await;
        let interviewer = Interviewer {
            id: Ulid::new(),
            name,
            email,
            max_interviews_per_week,
            slot_duration_minutes,
            weekly_availabilities: entries,
            created_at: now(),
        };

        let event = Event::InterviewerCreated {
            interviewer: interviewer.clone(),
        };
        self.wal_append(&event).await?;
        self.state.insert(
            interviewer.id,
            std::sync::Arc::new(tokio::sync::RwLock::new(InterviewerState::new(
                interviewer.clone(),
            ))),
        );
        self.notify.send(interviewer.id, &event);
        Ok(interviewer)
    }

    /// Replace the weekly pattern wholesale. Already generated slots are
    /// untouched — the new pattern only affects future generate calls.
    pub async fn set_weekly_availability(
        &self,
        interviewer_id: Ulid,
        entries: Vec<WeeklyAvailability>,
    ) -> Result<Interviewer, EngineError> {
        let _commit = self.commit_gate.read().await;
        let mut st = self.write_interviewer(&interviewer_id).await?;
        let entries = validate_entries(&entries, st.profile.slot_duration_minutes)?;
        let event = Event::AvailabilityReplaced {
            interviewer_id,
            entries,
        };
        self.persist_and_apply(interviewer_id, &mut st, &event)
            .await?;
        Ok(st.profile.clone())
    }

    // ── Candidates ───────────────────────────────────────

    pub async fn create_candidate(
        &self,
        name: String,
        email: String,
        phone_number: Option<String>,
    ) -> Result<Candidate, EngineError> {
        check_len("name", &name, MAX_NAME_LEN)?;
        check_len("email", &email, MAX_EMAIL_LEN)?;
        if let Some(phone) = &phone_number {
            check_len("phoneNumber", phone, MAX_PHONE_LEN)?;
        }
        if self.candidates.len() >= MAX_CANDIDATES {
            return Err(EngineError::LimitExceeded("too many candidates"));
        }

        let _commit = self.commit_gate.read().await;
        let candidate = Candidate {
            id: Ulid::new(),
            name,
            email,
            phone_number,
            created_at: now(),
        };

        // Claim the email first so two concurrent registrations can't both
        // pass the uniqueness check.
        match self.candidate_emails.entry(candidate.email.clone()) {
            Entry::Occupied(_) => {
                return Err(EngineError::AlreadyExists(candidate.email));
            }
            Entry::Vacant(v) => {
                v.insert(candidate.id);
            }
        }

        let event = Event::CandidateCreated {
            candidate: candidate.clone(),
        };
        if let Err(e) = self.wal_append(&event).await {
            self.candidate_emails.remove(&candidate.email);
            return Err(e);
        }
        self.candidates.insert(candidate.id, candidate.clone());
        Ok(candidate)
    }

    // ── Slot generation ──────────────────────────────────

    pub async fn generate_slots(
        &self,
        interviewer_id: Ulid,
        weeks_to_generate: u32,
    ) -> Result<Vec<Slot>, EngineError> {
        self.generate_slots_at(interviewer_id, weeks_to_generate, now())
            .await
    }

    /// Expand the weekly pattern into concrete slots for `weeks_to_generate`
    /// weeks starting at `at`'s week boundary. Idempotent: a candidate
    /// interval that overlaps any existing slot (any status, same start time
    /// included) is skipped, so repeated and overlapping calls converge on
    /// the union and a pattern replaced mid-horizon cannot produce two slots
    /// covering the same wall-clock time. Returns only the newly created
    /// slots.
    pub async fn generate_slots_at(
        &self,
        interviewer_id: Ulid,
        weeks_to_generate: u32,
        at: DateTime<Utc>,
    ) -> Result<Vec<Slot>, EngineError> {
        if weeks_to_generate == 0 {
            return Err(EngineError::Validation(
                "weeksToGenerate must be at least 1".into(),
            ));
        }
        if weeks_to_generate > MAX_WEEKS_TO_GENERATE {
            return Err(EngineError::LimitExceeded("weeksToGenerate too large"));
        }

        let _commit = self.commit_gate.read().await;
        let mut st = self.write_interviewer(&interviewer_id).await?;
        let intervals = expand_weekly(
            &st.profile.weekly_availabilities,
            st.profile.slot_duration_minutes,
            weeks_to_generate,
            at,
        );

        let existing: Vec<(DateTime<Utc>, DateTime<Utc>)> = st
            .slots
            .iter()
            .map(|s| (s.start_time, s.end_time))
            .collect();
        let new_slots: Vec<Slot> = intervals
            .into_iter()
            .filter(|(start, end)| {
                !existing
                    .iter()
                    .any(|(s_start, s_end)| *s_start < *end && *start < *s_end)
            })
            .map(|(start, end)| Slot {
                id: Ulid::new(),
                interviewer_id,
                start_time: start,
                end_time: end,
                status: SlotStatus::Available,
            })
            .collect();

        if st.slots.len() + new_slots.len() > MAX_SLOTS_PER_INTERVIEWER {
            return Err(EngineError::LimitExceeded("too many slots for interviewer"));
        }
        if new_slots.is_empty() {
            return Ok(Vec::new());
        }

        let event = Event::SlotsGenerated {
            interviewer_id,
            slots: new_slots.clone(),
        };
        self.persist_and_apply(interviewer_id, &mut st, &event)
            .await?;
        metrics::counter!(observability::SLOTS_GENERATED_TOTAL).increment(new_slots.len() as u64);
        Ok(new_slots)
    }

    // ── Booking lifecycle ────────────────────────────────

    pub async fn book_slot(
        &self,
        slot_id: Ulid,
        candidate_id: Ulid,
        booking_notes: Option<String>,
    ) -> Result<Booking, EngineError> {
        self.book_slot_at(slot_id, candidate_id, booking_notes, now())
            .await
    }

    /// Claim an AVAILABLE slot for a candidate. The availability check, the
    /// weekly-cap count and the status flip all happen under one write guard,
    /// so concurrent claims on the same slot resolve to exactly one winner.
    pub async fn book_slot_at(
        &self,
        slot_id: Ulid,
        candidate_id: Ulid,
        booking_notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Booking, EngineError> {
        if let Some(notes) = &booking_notes
            && notes.len() > MAX_NOTES_LEN
        {
            return Err(EngineError::Validation(format!(
                "bookingNotes exceeds {MAX_NOTES_LEN} bytes"
            )));
        }
        if self.get_candidate(&candidate_id).is_none() {
            return Err(EngineError::NotFound(candidate_id));
        }
        let interviewer_id = self
            .interviewer_for_slot(&slot_id)
            .ok_or(EngineError::NotFound(slot_id))?;
        let _commit = self.commit_gate.read().await;
        let mut st = self.write_interviewer(&interviewer_id).await?;

        let slot = st.slot(&slot_id).ok_or(EngineError::NotFound(slot_id))?;
        if !slot.is_available() || slot.start_time <= at {
            metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::SlotUnavailable(slot_id));
        }
        let week = iso_week_key(slot.start_time);
        let cap = st.profile.max_interviews_per_week;
        if st.active_bookings_in_week(week) >= cap {
            metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::CapacityExceeded(cap));
        }

        let booking = Booking::new(slot_id, candidate_id, booking_notes, at);
        let event = Event::SlotBooked {
            interviewer_id,
            booking: booking.clone(),
        };
        self.persist_and_apply(interviewer_id, &mut st, &event)
            .await?;
        metrics::counter!(observability::BOOKINGS_TOTAL).increment(1);
        Ok(booking)
    }

    /// PENDING → CONFIRMED; the slot follows to CONFIRMED.
    pub async fn confirm_booking(&self, booking_id: Ulid) -> Result<Booking, EngineError> {
        let at = now();
        let _commit = self.commit_gate.read().await;
        let (interviewer_id, mut st) = self.resolve_booking_write(&booking_id).await?;
        let booking = st
            .booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        if booking.status != BookingStatus::Pending {
            return Err(EngineError::InvalidState(format!(
                "cannot confirm a booking in {:?} state",
                booking.status
            )));
        }
        let event = Event::BookingConfirmed {
            interviewer_id,
            booking_id,
            at,
        };
        self.persist_and_apply(interviewer_id, &mut st, &event)
            .await?;
        Ok(st.booking(&booking_id).cloned().expect("booking exists"))
    }

    pub async fn cancel_booking(&self, booking_id: Ulid) -> Result<Booking, EngineError> {
        self.cancel_booking_at(booking_id, now()).await
    }

    /// PENDING/CONFIRMED → CANCELLED. A future slot is released back to
    /// AVAILABLE for rebooking; a slot whose start has passed goes to
    /// EXPIRED. The outcome is decided here and recorded in the event.
    pub async fn cancel_booking_at(
        &self,
        booking_id: Ulid,
        at: DateTime<Utc>,
    ) -> Result<Booking, EngineError> {
        let _commit = self.commit_gate.read().await;
        let (interviewer_id, mut st) = self.resolve_booking_write(&booking_id).await?;
        let booking = st
            .booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        if !booking.status.is_active() {
            return Err(EngineError::InvalidState(format!(
                "cannot cancel a booking in {:?} state",
                booking.status
            )));
        }
        let slot_released = st
            .slot(&booking.slot_id)
            .is_some_and(|s| s.start_time > at);
        let event = Event::BookingCancelled {
            interviewer_id,
            booking_id,
            slot_released,
            at,
        };
        self.persist_and_apply(interviewer_id, &mut st, &event)
            .await?;
        Ok(st.booking(&booking_id).cloned().expect("booking exists"))
    }

    /// Notes are mutable on any non-terminal booking; nothing else is.
    pub async fn update_booking_notes(
        &self,
        booking_id: Ulid,
        notes: Option<String>,
    ) -> Result<Booking, EngineError> {
        if let Some(n) = &notes
            && n.len() > MAX_NOTES_LEN
        {
            return Err(EngineError::Validation(format!(
                "bookingNotes exceeds {MAX_NOTES_LEN} bytes"
            )));
        }
        let _commit = self.commit_gate.read().await;
        let (interviewer_id, mut st) = self.resolve_booking_write(&booking_id).await?;
        let booking = st
            .booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        if booking.status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "cannot update a booking in {:?} state",
                booking.status
            )));
        }
        let event = Event::BookingNotesUpdated {
            interviewer_id,
            booking_id,
            notes,
            at: now(),
        };
        self.persist_and_apply(interviewer_id, &mut st, &event)
            .await?;
        Ok(st.booking(&booking_id).cloned().expect("booking exists"))
    }

    /// CONFIRMED → NO_SHOW, only once the slot has started.
    pub async fn mark_no_show(&self, booking_id: Ulid) -> Result<Booking, EngineError> {
        self.mark_no_show_at(booking_id, now()).await
    }

    pub async fn mark_no_show_at(
        &self,
        booking_id: Ulid,
        at: DateTime<Utc>,
    ) -> Result<Booking, EngineError> {
        let _commit = self.commit_gate.read().await;
        let (interviewer_id, mut st) = self.resolve_booking_write(&booking_id).await?;
        let booking = st
            .booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        if booking.status != BookingStatus::Confirmed {
            return Err(EngineError::InvalidState(format!(
                "cannot mark no-show on a booking in {:?} state",
                booking.status
            )));
        }
        let started = st
            .slot(&booking.slot_id)
            .is_some_and(|s| s.start_time <= at);
        if !started {
            return Err(EngineError::InvalidState(
                "cannot mark no-show before the slot starts".into(),
            ));
        }
        let event = Event::BookingNoShow {
            interviewer_id,
            booking_id,
            at,
        };
        self.persist_and_apply(interviewer_id, &mut st, &event)
            .await?;
        Ok(st.booking(&booking_id).cloned().expect("booking exists"))
    }

    // ── Time-based sweeps ────────────────────────────────

    /// Scan all interviewers for transitions due at `at`. Read-only and
    /// lock-tolerant: a state currently write-locked is skipped and will be
    /// caught on the next sweep.
    pub fn collect_due_transitions(&self, at: DateTime<Utc>) -> Vec<SweepAction> {
        let mut actions = Vec::new();
        for entry in self.state.iter() {
            let interviewer_id = *entry.key();
            let Ok(st) = entry.value().try_read() else {
                continue;
            };
            for slot in &st.slots {
                if slot.status == SlotStatus::Available && slot.start_time <= at {
                    actions.push(SweepAction::ExpireSlot {
                        interviewer_id,
                        slot_id: slot.id,
                    });
                }
            }
            for booking in &st.bookings {
                if booking.status == BookingStatus::Confirmed
                    && st
                        .slot(&booking.slot_id)
                        .is_some_and(|s| s.end_time <= at)
                {
                    actions.push(SweepAction::CompleteBooking {
                        interviewer_id,
                        booking_id: booking.id,
                    });
                }
            }
        }
        actions
    }

    /// AVAILABLE → EXPIRED once the start time has passed. Re-checks under
    /// the write lock; returns Ok(false) if the transition no longer applies
    /// (e.g. the slot got booked between scan and apply).
    pub async fn expire_slot(
        &self,
        interviewer_id: Ulid,
        slot_id: Ulid,
        at: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let _commit = self.commit_gate.read().await;
        let mut st = self.write_interviewer(&interviewer_id).await?;
        let still_due = st
            .slot(&slot_id)
            .is_some_and(|s| s.status == SlotStatus::Available && s.start_time <= at);
        if !still_due {
            return Ok(false);
        }
        let event = Event::SlotExpired {
            interviewer_id,
            slot_id,
            at,
        };
        self.persist_and_apply(interviewer_id, &mut st, &event)
            .await?;
        Ok(true)
    }

    /// CONFIRMED → COMPLETED once the slot's end time has passed.
    pub async fn complete_booking(
        &self,
        interviewer_id: Ulid,
        booking_id: Ulid,
        at: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let _commit = self.commit_gate.read().await;
        let mut st = self.write_interviewer(&interviewer_id).await?;
        let still_due = st.booking(&booking_id).is_some_and(|b| {
            b.status == BookingStatus::Confirmed
                && st.slot(&b.slot_id).is_some_and(|s| s.end_time <= at)
        });
        if !still_due {
            return Ok(false);
        }
        let event = Event::BookingCompleted {
            interviewer_id,
            booking_id,
            at,
        };
        self.persist_and_apply(interviewer_id, &mut st, &event)
            .await?;
        Ok(true)
    }

    // ── WAL compaction ───────────────────────────────────

    /// Rewrite the WAL as a minimal snapshot of current state: one create
    /// per interviewer and candidate, one SlotsGenerated carrying all slots
    /// with their current statuses, and one BookingRestored per booking.
    ///
    /// Holds the commit gate exclusively from snapshot collection until the
    /// swapped file is durable. No event can commit inside that window, so
    /// an acknowledged write is either in the snapshot or appended to the
    /// new file — never stranded in the discarded one.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _fence = self.commit_gate.write().await;
        let mut events = Vec::new();
        for entry in self.candidates.iter() {
            events.push(Event::CandidateCreated {
                candidate: entry.value().clone(),
            });
        }
        let arcs: Vec<(Ulid, super::SharedInterviewerState)> = self
            .state
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        for (interviewer_id, arc) in arcs {
            let st = arc.read().await;
            events.push(Event::InterviewerCreated {
                interviewer: st.profile.clone(),
            });
            if !st.slots.is_empty() {
                events.push(Event::SlotsGenerated {
                    interviewer_id,
                    slots: st.slots.clone(),
                });
            }
            for booking in &st.bookings {
                events.push(Event::BookingRestored {
                    interviewer_id,
                    booking: booking.clone(),
                });
            }
        }

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// How many events were appended since the last compaction.
    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = tokio::sync::oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
