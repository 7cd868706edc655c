mod availability;
mod error;
mod mutations;
mod queries;

pub use availability::{expand_weekly, validate_entries, validate_slot_duration, week_start};
pub use error::EngineError;
pub use mutations::SweepAction;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::limits::LOCK_ACQUIRE_TIMEOUT;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedInterviewerState = Arc<RwLock<InterviewerState>>;

pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

// ── Engine ───────────────────────────────────────────────

/// The slot & booking store. One lock per interviewer guards that
/// interviewer's profile, slots and bookings together, so the
/// AVAILABLE→BOOKED claim and the weekly-capacity count form one atomic
/// unit, and slot generation is serialized per interviewer.
pub struct Engine {
    pub(super) state: DashMap<Ulid, SharedInterviewerState>,
    pub(super) candidates: DashMap<Ulid, Candidate>,
    /// Unique-email index for candidates.
    pub(super) candidate_emails: DashMap<String, Ulid>,
    /// Reverse lookup: slot id → interviewer id.
    pub(super) slot_owner: DashMap<Ulid, Ulid>,
    /// Reverse lookup: booking id → interviewer id.
    pub(super) booking_owner: DashMap<Ulid, Ulid>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Compaction fence. Every event commit (WAL append + apply) holds it
    /// shared; `compact_wal` holds it exclusively from snapshot collection
    /// until the file swap, so the snapshot covers every acknowledged event
    /// and nothing acknowledged afterwards can land in the discarded file.
    /// Lock order: gate first, then the interviewer lock.
    pub(super) commit_gate: RwLock<()>,
    pub notify: Arc<NotifyHub>,
}

/// Apply an event directly to an InterviewerState (no locking — caller holds
/// the lock). Index maps are updated alongside.
fn apply_to_state(
    st: &mut InterviewerState,
    event: &Event,
    slot_owner: &DashMap<Ulid, Ulid>,
    booking_owner: &DashMap<Ulid, Ulid>,
) {
    match event {
        Event::AvailabilityReplaced { entries, .. } => {
            st.profile.weekly_availabilities = entries.clone();
        }
        Event::SlotsGenerated {
            interviewer_id,
            slots,
        } => {
            for slot in slots {
                if st.slot(&slot.id).is_none() {
                    slot_owner.insert(slot.id, *interviewer_id);
                    st.insert_slot(slot.clone());
                }
            }
        }
        Event::SlotBooked {
            interviewer_id,
            booking,
        } => {
            if let Some(slot) = st.slot_mut(&booking.slot_id) {
                slot.status = SlotStatus::Booked;
            }
            booking_owner.insert(booking.id, *interviewer_id);
            st.bookings.push(booking.clone());
        }
        Event::BookingConfirmed { booking_id, at, .. } => {
            let slot_id = st.booking(booking_id).map(|b| b.slot_id);
            if let Some(b) = st.booking_mut(booking_id) {
                b.status = BookingStatus::Confirmed;
                b.confirmed_at = Some(*at);
                b.updated_at = Some(*at);
            }
            if let Some(sid) = slot_id
                && let Some(slot) = st.slot_mut(&sid)
            {
                slot.status = SlotStatus::Confirmed;
            }
        }
        Event::BookingCancelled {
            booking_id,
            slot_released,
            at,
            ..
        } => {
            let slot_id = st.booking(booking_id).map(|b| b.slot_id);
            if let Some(b) = st.booking_mut(booking_id) {
                b.status = BookingStatus::Cancelled;
                b.cancelled_at = Some(*at);
                b.updated_at = Some(*at);
            }
            if let Some(sid) = slot_id
                && let Some(slot) = st.slot_mut(&sid)
            {
                slot.status = if *slot_released {
                    SlotStatus::Available
                } else {
                    SlotStatus::Expired
                };
            }
        }
        Event::BookingNotesUpdated {
            booking_id,
            notes,
            at,
            ..
        } => {
            if let Some(b) = st.booking_mut(booking_id) {
                b.booking_notes = notes.clone();
                b.updated_at = Some(*at);
            }
        }
        Event::BookingCompleted { booking_id, at, .. } => {
            if let Some(b) = st.booking_mut(booking_id) {
                b.status = BookingStatus::Completed;
                b.updated_at = Some(*at);
            }
        }
        Event::BookingNoShow { booking_id, at, .. } => {
            if let Some(b) = st.booking_mut(booking_id) {
                b.status = BookingStatus::NoShow;
                b.updated_at = Some(*at);
            }
        }
        Event::SlotExpired { slot_id, .. } => {
            if let Some(slot) = st.slot_mut(slot_id) {
                slot.status = SlotStatus::Expired;
            }
        }
        Event::BookingRestored {
            interviewer_id,
            booking,
        } => {
            booking_owner.insert(booking.id, *interviewer_id);
            st.bookings.push(booking.clone());
        }
        // Handled at the DashMap level, not here
        Event::InterviewerCreated { .. } | Event::CandidateCreated { .. } => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            candidates: DashMap::new(),
            candidate_emails: DashMap::new(),
            slot_owner: DashMap::new(),
            booking_owner: DashMap::new(),
            wal_tx,
            commit_gate: RwLock::new(()),
            notify,
        };

        // Replay — we're the sole owner of these Arcs, so try_write always
        // succeeds instantly. Never block here: this may run inside an async
        // context.
        for event in &events {
            match event {
                Event::InterviewerCreated { interviewer } => {
                    engine.state.insert(
                        interviewer.id,
                        Arc::new(RwLock::new(InterviewerState::new(interviewer.clone()))),
                    );
                }
                Event::CandidateCreated { candidate } => {
                    engine
                        .candidate_emails
                        .insert(candidate.email.clone(), candidate.id);
                    engine.candidates.insert(candidate.id, candidate.clone());
                }
                other => {
                    if let Some(interviewer_id) = other.interviewer_id()
                        && let Some(entry) = engine.state.get(&interviewer_id)
                    {
                        let st_arc = entry.value().clone();
                        let mut guard = st_arc.try_write().expect("replay: uncontended write");
                        apply_to_state(
                            &mut guard,
                            other,
                            &engine.slot_owner,
                            &engine.booking_owner,
                        );
                    }
                }
            }
        }

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_state(&self, id: &Ulid) -> Option<SharedInterviewerState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn get_candidate(&self, id: &Ulid) -> Option<Candidate> {
        self.candidates.get(id).map(|e| e.value().clone())
    }

    pub fn interviewer_for_slot(&self, slot_id: &Ulid) -> Option<Ulid> {
        self.slot_owner.get(slot_id).map(|e| *e.value())
    }

    pub fn interviewer_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_owner.get(booking_id).map(|e| *e.value())
    }

    /// WAL-append + apply + notify in one call.
    pub(super) async fn persist_and_apply(
        &self,
        interviewer_id: Ulid,
        st: &mut InterviewerState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_state(st, event, &self.slot_owner, &self.booking_owner);
        self.notify.send(interviewer_id, event);
        Ok(())
    }

    /// Acquire the interviewer's write lock within the timeout bound.
    pub(super) async fn write_interviewer(
        &self,
        id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<InterviewerState>, EngineError> {
        let st = self.get_state(id).ok_or(EngineError::NotFound(*id))?;
        tokio::time::timeout(LOCK_ACQUIRE_TIMEOUT, st.write_owned())
            .await
            .map_err(|_| EngineError::Timeout)
    }

    /// Lookup booking → interviewer, acquire write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, OwnedRwLockWriteGuard<InterviewerState>), EngineError> {
        let interviewer_id = self
            .interviewer_for_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let guard = self.write_interviewer(&interviewer_id).await?;
        Ok((interviewer_id, guard))
    }
}
