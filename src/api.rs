use std::sync::Arc;
use std::time::Instant;

use axum::extract::{MatchedPath, Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use ulid::Ulid;

use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability;

pub struct AppState {
    pub engine: Arc<Engine>,
}

/// HTTP-facing wrapper so engine errors map onto status codes in one place.
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Validation(_) | EngineError::LimitExceeded(_) => StatusCode::BAD_REQUEST,
            EngineError::AlreadyExists(_)
            | EngineError::SlotUnavailable(_)
            | EngineError::CapacityExceeded(_)
            | EngineError::InvalidState(_) => StatusCode::CONFLICT,
            EngineError::Timeout | EngineError::WalError(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = Json(json!({
            "kind": self.0.kind(),
            "error": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

// ── Request DTOs ────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CreateInterviewerRequest {
    name: String,
    email: String,
    max_interviews_per_week: u32,
    slot_duration_minutes: u32,
    #[serde(default)]
    weekly_availabilities: Vec<WeeklyAvailability>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct AvailabilityRequest {
    weekly_availabilities: Vec<WeeklyAvailability>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CreateCandidateRequest {
    name: String,
    email: String,
    phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct GenerateSlotsRequest {
    interviewer_id: Ulid,
    weeks_to_generate: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct BookSlotRequest {
    slot_id: Ulid,
    candidate_id: Ulid,
    booking_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct UpdateBookingRequest {
    booking_notes: Option<String>,
}

fn default_page_size() -> u32 {
    20
}

fn default_cursor_limit() -> u32 {
    50
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlotsQuery {
    #[serde(default)]
    page: u32,
    #[serde(default = "default_page_size")]
    size: u32,
    interviewer_id: Option<Ulid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CursorQuery {
    cursor: Option<Ulid>,
    #[serde(default = "default_cursor_limit")]
    limit: u32,
    interviewer_id: Option<Ulid>,
}

// ── Handlers ────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn create_interviewer(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateInterviewerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let interviewer = state
        .engine
        .create_interviewer(
            req.name,
            req.email,
            req.max_interviews_per_week,
            req.slot_duration_minutes,
            req.weekly_availabilities,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(interviewer)))
}

async fn list_interviewers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.list_interviewers().await)
}

async fn get_interviewer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Ulid>,
) -> Result<Json<Interviewer>, ApiError> {
    Ok(Json(state.engine.get_interviewer(&id).await?))
}

async fn set_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Ulid>,
    Json(req): Json<AvailabilityRequest>,
) -> Result<Json<Interviewer>, ApiError> {
    Ok(Json(
        state
            .engine
            .set_weekly_availability(id, req.weekly_availabilities)
            .await?,
    ))
}

async fn create_candidate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCandidateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let candidate = state
        .engine
        .create_candidate(req.name, req.email, req.phone_number)
        .await?;
    Ok((StatusCode::CREATED, Json(candidate)))
}

async fn list_candidates(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.list_candidates())
}

async fn generate_slots(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateSlotsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let slots = state
        .engine
        .generate_slots(req.interviewer_id, req.weeks_to_generate)
        .await?;
    let interviewer = state.engine.get_interviewer(&req.interviewer_id).await?;
    let views: Vec<SlotView> = slots
        .iter()
        .map(|s| SlotView::from_slot(s, &interviewer.name))
        .collect();
    Ok((StatusCode::CREATED, Json(views)))
}

async fn list_available_slots(
    State(state): State<Arc<AppState>>,
    Query(q): Query<SlotsQuery>,
) -> Result<Json<OffsetPage<SlotView>>, ApiError> {
    Ok(Json(
        state
            .engine
            .list_available_slots(q.page, q.size, q.interviewer_id)
            .await?,
    ))
}

async fn list_available_slots_cursor(
    State(state): State<Arc<AppState>>,
    Query(q): Query<CursorQuery>,
) -> Result<Json<CursorPage<SlotView>>, ApiError> {
    Ok(Json(
        state
            .engine
            .list_available_slots_cursor(q.cursor, q.limit, q.interviewer_id)
            .await?,
    ))
}

async fn book_slot(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BookSlotRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = state
        .engine
        .book_slot(req.slot_id, req.candidate_id, req.booking_notes)
        .await?;
    let view = state.engine.get_booking(&booking.id).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Ulid>,
) -> Result<Json<BookingView>, ApiError> {
    Ok(Json(state.engine.get_booking(&id).await?))
}

async fn confirm_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Ulid>,
) -> Result<Json<BookingView>, ApiError> {
    state.engine.confirm_booking(id).await?;
    Ok(Json(state.engine.get_booking(&id).await?))
}

async fn mark_no_show(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Ulid>,
) -> Result<Json<BookingView>, ApiError> {
    state.engine.mark_no_show(id).await?;
    Ok(Json(state.engine.get_booking(&id).await?))
}

async fn update_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Ulid>,
    Json(req): Json<UpdateBookingRequest>,
) -> Result<Json<BookingView>, ApiError> {
    state
        .engine
        .update_booking_notes(id, req.booking_notes)
        .await?;
    Ok(Json(state.engine.get_booking(&id).await?))
}

async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Ulid>,
) -> Result<Json<BookingView>, ApiError> {
    state.engine.cancel_booking(id).await?;
    Ok(Json(state.engine.get_booking(&id).await?))
}

async fn bookings_by_candidate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Ulid>,
) -> Result<Json<Vec<BookingView>>, ApiError> {
    Ok(Json(state.engine.list_bookings_by_candidate(&id).await?))
}

async fn bookings_by_interviewer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Ulid>,
) -> Result<Json<Vec<BookingView>>, ApiError> {
    Ok(Json(state.engine.list_bookings_by_interviewer(&id).await?))
}

// ── Router ──────────────────────────────────────────────

async fn track_metrics(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());
    let start = Instant::now();
    let response = next.run(req).await;
    let status = response.status().as_u16().to_string();
    metrics::counter!(observability::REQUESTS_TOTAL, "route" => route.clone(), "status" => status)
        .increment(1);
    metrics::histogram!(observability::REQUEST_DURATION_SECONDS, "route" => route)
        .record(start.elapsed().as_secs_f64());
    response
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/interviewers",
            get(list_interviewers).post(create_interviewer),
        )
        .route("/api/interviewers/:id", get(get_interviewer))
        .route("/api/interviewers/:id/availability", put(set_availability))
        .route(
            "/api/candidates",
            get(list_candidates).post(create_candidate),
        )
        .route("/api/slots/generate", post(generate_slots))
        .route("/api/slots/available", get(list_available_slots))
        .route(
            "/api/slots/available/cursor",
            get(list_available_slots_cursor),
        )
        .route("/api/bookings", post(book_slot))
        .route(
            "/api/bookings/:id",
            get(get_booking).put(update_booking).delete(cancel_booking),
        )
        .route("/api/bookings/:id/confirm", post(confirm_booking))
        .route("/api/bookings/:id/no-show", post(mark_no_show))
        .route("/api/bookings/candidate/:id", get(bookings_by_candidate))
        .route("/api/bookings/interviewer/:id", get(bookings_by_interviewer))
        .layer(middleware::from_fn(track_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
