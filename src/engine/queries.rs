use chrono::{DateTime, Utc};
use ulid::Ulid;

use crate::limits::MAX_PAGE_SIZE;
use crate::model::*;

use super::{Engine, EngineError, now};

fn validate_page_size(size: u32) -> Result<(), EngineError> {
    if size == 0 || size > MAX_PAGE_SIZE {
        return Err(EngineError::Validation(format!(
            "page size must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    Ok(())
}

fn booking_view(st: &InterviewerState, booking: &Booking, candidate: &Candidate) -> BookingView {
    let slot = st.slot(&booking.slot_id);
    let (slot_start, slot_end) = slot
        .map(|s| (s.start_time, s.end_time))
        .unwrap_or((booking.created_at, booking.created_at));
    let (year, week_number) = iso_week_key(slot_start);
    BookingView {
        id: booking.id,
        slot_id: booking.slot_id,
        candidate_id: booking.candidate_id,
        candidate_name: candidate.name.clone(),
        candidate_email: candidate.email.clone(),
        interviewer_id: st.profile.id,
        interviewer_name: st.profile.name.clone(),
        slot_start_time: slot_start,
        slot_end_time: slot_end,
        status: booking.status,
        booking_notes: booking.booking_notes.clone(),
        week_number,
        year,
        created_at: booking.created_at,
        confirmed_at: booking.confirmed_at,
        cancelled_at: booking.cancelled_at,
    }
}

impl Engine {
    // ── Directory reads ──────────────────────────────────

    pub async fn list_interviewers(&self) -> Vec<Interviewer> {
        let arcs: Vec<super::SharedInterviewerState> =
            self.state.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(arcs.len());
        for arc in arcs {
            out.push(arc.read().await.profile.clone());
        }
        out.sort_by_key(|i| i.id);
        out
    }

    pub async fn get_interviewer(&self, id: &Ulid) -> Result<Interviewer, EngineError> {
        let st = self.get_state(id).ok_or(EngineError::NotFound(*id))?;
        Ok(st.read().await.profile.clone())
    }

    pub fn list_candidates(&self) -> Vec<Candidate> {
        let mut out: Vec<Candidate> = self.candidates.iter().map(|e| e.value().clone()).collect();
        out.sort_by_key(|c| c.id);
        out
    }

    // ── Slot listings ────────────────────────────────────

    /// All currently bookable slots, joined and ordered by start time. Only
    /// AVAILABLE slots with a start time in the future appear — EXPIRED and
    /// claimed ones never do.
    async fn bookable_slots(
        &self,
        interviewer_filter: Option<Ulid>,
        at: DateTime<Utc>,
    ) -> Vec<SlotView> {
        let arcs: Vec<super::SharedInterviewerState> = match interviewer_filter {
            Some(id) => self.get_state(&id).into_iter().collect(),
            None => self.state.iter().map(|e| e.value().clone()).collect(),
        };
        let mut out = Vec::new();
        for arc in arcs {
            let st = arc.read().await;
            for slot in &st.slots {
                if slot.is_available() && slot.start_time > at {
                    out.push(SlotView::from_slot(slot, &st.profile.name));
                }
            }
        }
        out
    }

    /// Offset pagination, Spring-style zero-based pages.
    pub async fn list_available_slots(
        &self,
        page: u32,
        size: u32,
        interviewer_filter: Option<Ulid>,
    ) -> Result<OffsetPage<SlotView>, EngineError> {
        self.list_available_slots_at(page, size, interviewer_filter, now())
            .await
    }

    pub async fn list_available_slots_at(
        &self,
        page: u32,
        size: u32,
        interviewer_filter: Option<Ulid>,
        at: DateTime<Utc>,
    ) -> Result<OffsetPage<SlotView>, EngineError> {
        validate_page_size(size)?;
        let mut slots = self.bookable_slots(interviewer_filter, at).await;
        slots.sort_by_key(|s| (s.start_time, s.id));

        let total_elements = slots.len() as u64;
        let total_pages = total_elements.div_ceil(size as u64) as u32;
        let data: Vec<SlotView> = slots
            .into_iter()
            .skip(page as usize * size as usize)
            .take(size as usize)
            .collect();

        Ok(OffsetPage {
            data,
            page,
            size,
            total_elements,
            total_pages,
            has_next: page + 1 < total_pages,
            has_previous: page > 0 && total_elements > 0,
        })
    }

    /// Cursor pagination over slot ids. Stable under concurrent booking:
    /// ids already returned are never re-returned because the cursor is an
    /// exclusive lower bound on an immutable ordering.
    pub async fn list_available_slots_cursor(
        &self,
        cursor: Option<Ulid>,
        limit: u32,
        interviewer_filter: Option<Ulid>,
    ) -> Result<CursorPage<SlotView>, EngineError> {
        self.list_available_slots_cursor_at(cursor, limit, interviewer_filter, now())
            .await
    }

    pub async fn list_available_slots_cursor_at(
        &self,
        cursor: Option<Ulid>,
        limit: u32,
        interviewer_filter: Option<Ulid>,
        at: DateTime<Utc>,
    ) -> Result<CursorPage<SlotView>, EngineError> {
        validate_page_size(limit)?;
        let mut slots = self.bookable_slots(interviewer_filter, at).await;
        slots.sort_by_key(|s| s.id);
        if let Some(after) = cursor {
            slots.retain(|s| s.id > after);
        }

        let has_next = slots.len() > limit as usize;
        slots.truncate(limit as usize);
        let next_cursor = if has_next {
            slots.last().map(|s| s.id)
        } else {
            None
        };

        Ok(CursorPage {
            data: slots,
            next_cursor,
            has_next,
        })
    }

    // ── Booking reads ────────────────────────────────────

    pub async fn get_booking(&self, booking_id: &Ulid) -> Result<BookingView, EngineError> {
        let interviewer_id = self
            .interviewer_for_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let arc = self
            .get_state(&interviewer_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let st = arc.read().await;
        let booking = st
            .booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let candidate = self
            .get_candidate(&booking.candidate_id)
            .ok_or(EngineError::NotFound(booking.candidate_id))?;
        Ok(booking_view(&st, booking, &candidate))
    }

    /// Full booking history for a candidate, most recently created first.
    pub async fn list_bookings_by_candidate(
        &self,
        candidate_id: &Ulid,
    ) -> Result<Vec<BookingView>, EngineError> {
        let candidate = self
            .get_candidate(candidate_id)
            .ok_or(EngineError::NotFound(*candidate_id))?;
        let arcs: Vec<super::SharedInterviewerState> =
            self.state.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for arc in arcs {
            let st = arc.read().await;
            for booking in &st.bookings {
                if booking.candidate_id == *candidate_id {
                    out.push(booking_view(&st, booking, &candidate));
                }
            }
        }
        // Ids are ULIDs, so descending id is reverse creation order.
        out.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(out)
    }

    /// Full booking history for an interviewer, most recently created first.
    pub async fn list_bookings_by_interviewer(
        &self,
        interviewer_id: &Ulid,
    ) -> Result<Vec<BookingView>, EngineError> {
        let arc = self
            .get_state(interviewer_id)
            .ok_or(EngineError::NotFound(*interviewer_id))?;
        let st = arc.read().await;
        let mut out = Vec::new();
        for booking in &st.bookings {
            let candidate = self
                .get_candidate(&booking.candidate_id)
                .ok_or(EngineError::NotFound(booking.candidate_id))?;
            out.push(booking_view(&st, booking, &candidate));
        }
        out.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(out)
    }
}
