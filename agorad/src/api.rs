//! HTTP API for the Agora daemon.
//!
//! Provides REST endpoints for:
//! - Health check
//! - Jobs (in-process registry) and their candidate lists
//! - Wallets: open, fund, withdraw, transaction log, audit
//! - Negotiations: open, counter-offer, accept, reject, expire
//! - Escrows: release, refund
//! - Notification inbox
//!
//! The acting user comes from the `x-actor-id` header, set by the session
//! layer in front of the daemon and trusted as is.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use agora_domain::{
    Currency, Escrow, Job, Negotiation, NotificationId, OfferDraft, Party, Transaction, UserId, Wallet,
};
use agora_engine::{CandidateView, Clock, EngineError, ErrorKind, Marketplace, MemoryJobRegistry, OpenNegotiation};
use agora_ledger::{AuditReport, LedgerReceipt};
use agora_store::Store;

use crate::error::DaemonError;
use crate::notifications::{InboxEntry, NotificationInbox};

/// Header carrying the authenticated user id.
pub const ACTOR_HEADER: &str = "x-actor-id";

// =============================================================================
// API State
// =============================================================================

/// Shared state for API handlers.
pub struct ApiState<S: Store + 'static> {
    pub marketplace: Arc<Marketplace<S>>,
    pub jobs: Arc<MemoryJobRegistry>,
    pub inbox: Arc<NotificationInbox>,
    pub clock: Arc<dyn Clock>,
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Request to register a job.
#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub buyer_id: UserId,
    pub title: String,
    pub budget: Decimal,
    #[serde(default = "Currency::usd")]
    pub currency: Currency,
    pub deadline: DateTime<Utc>,
}

/// Request to open a wallet.
#[derive(Debug, Deserialize)]
pub struct OpenWalletRequest {
    pub owner_id: UserId,
    #[serde(default = "Currency::usd")]
    pub currency: Currency,
    pub daily_limit: Decimal,
    pub per_job_limit: Decimal,
}

/// Deposit or withdrawal.
#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: Decimal,
    /// Caller's reference; repeating it replays the recorded movement
    pub reference: String,
}

/// Request to open a negotiation. The actor must be the buyer or the seller;
/// the first offer is theirs.
#[derive(Debug, Deserialize)]
pub struct OpenNegotiationRequest {
    pub job_id: Uuid,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub initial_offer: OfferDraft,
    #[serde(default)]
    pub max_rounds: Option<u32>,
}

/// Result of an acceptance.
#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptResponse {
    pub negotiation: Negotiation,
    pub escrow: Escrow,
}

/// Inbox filter.
#[derive(Debug, Default, Deserialize)]
pub struct InboxQuery {
    #[serde(default)]
    pub unread: bool,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// Router
// =============================================================================

/// Create the API router.
pub fn create_router<S>(state: Arc<ApiState<S>>) -> Router
where
    S: Store + 'static,
{
    Router::new()
        .route("/health", get(health_handler))
        .route("/jobs", post(create_job_handler::<S>))
        .route("/jobs/:id", get(get_job_handler::<S>))
        .route("/jobs/:id/candidates", get(candidates_handler::<S>))
        .route("/wallets", post(open_wallet_handler::<S>))
        .route("/wallets/:id", get(get_wallet_handler::<S>))
        .route("/wallets/:id/deposit", post(deposit_handler::<S>))
        .route("/wallets/:id/withdraw", post(withdraw_handler::<S>))
        .route("/wallets/:id/transactions", get(transactions_handler::<S>))
        .route("/wallets/:id/audit", get(audit_handler::<S>))
        .route("/negotiations", post(open_negotiation_handler::<S>))
        .route("/negotiations/:id", get(get_negotiation_handler::<S>))
        .route("/negotiations/:id/offers", post(counter_offer_handler::<S>))
        .route("/negotiations/:id/accept", post(accept_handler::<S>))
        .route("/negotiations/:id/reject", post(reject_handler::<S>))
        .route("/negotiations/:id/expire", post(expire_handler::<S>))
        .route("/escrows/:id", get(get_escrow_handler::<S>))
        .route("/escrows/:id/release", post(release_handler::<S>))
        .route("/escrows/:id/refund", post(refund_handler::<S>))
        .route("/users/:id/notifications", get(notifications_handler::<S>))
        .route("/notifications/:id/read", post(mark_read_handler::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// -----------------------------------------------------------------------------
// Jobs
// -----------------------------------------------------------------------------

async fn create_job_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Json(req): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    if req.budget <= Decimal::ZERO {
        return Err(to_error_response(EngineError::Validation(format!(
            "Budget must be positive, got {}",
            req.budget
        ))));
    }
    if req.deadline <= state.clock.now() {
        return Err(to_error_response(EngineError::Validation(
            "Deadline must be in the future".to_string(),
        )));
    }

    let mut job = Job::new(req.buyer_id, req.title, req.budget, req.currency, req.deadline);
    job.created_at = state.clock.now();
    state.jobs.register(job.clone());

    Ok((StatusCode::CREATED, Json(job)))
}

async fn get_job_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Job>> {
    state
        .jobs
        .job(id)
        .map(Json)
        .ok_or_else(|| to_error_response(EngineError::not_found("Job", id)))
}

async fn candidates_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<CandidateView>>> {
    let rows = state.marketplace.candidates(id).await.map_err(to_error_response)?;
    Ok(Json(rows))
}

// -----------------------------------------------------------------------------
// Wallets
// -----------------------------------------------------------------------------

async fn open_wallet_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Json(req): Json<OpenWalletRequest>,
) -> ApiResult<(StatusCode, Json<Wallet>)> {
    let wallet = state
        .marketplace
        .open_wallet(req.owner_id, req.currency, req.daily_limit, req.per_job_limit)
        .await
        .map_err(to_error_response)?;

    Ok((StatusCode::CREATED, Json(wallet)))
}

async fn get_wallet_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Wallet>> {
    let wallet = state.marketplace.get_wallet(id).await.map_err(to_error_response)?;
    Ok(Json(wallet))
}

async fn deposit_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(id): Path<Uuid>,
    Json(req): Json<AmountRequest>,
) -> ApiResult<Json<LedgerReceipt>> {
    let receipt = state
        .marketplace
        .deposit(id, req.amount, &req.reference)
        .await
        .map_err(to_error_response)?;
    Ok(Json(receipt))
}

async fn withdraw_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(id): Path<Uuid>,
    Json(req): Json<AmountRequest>,
) -> ApiResult<Json<LedgerReceipt>> {
    let receipt = state
        .marketplace
        .withdraw(id, req.amount, &req.reference)
        .await
        .map_err(to_error_response)?;
    Ok(Json(receipt))
}

async fn transactions_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Transaction>>> {
    let log = state.marketplace.wallet_transactions(id).await.map_err(to_error_response)?;
    Ok(Json(log))
}

async fn audit_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AuditReport>> {
    let report = state.marketplace.audit_wallet(id).await.map_err(to_error_response)?;
    Ok(Json(report))
}

// -----------------------------------------------------------------------------
// Negotiations
// -----------------------------------------------------------------------------

async fn open_negotiation_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    headers: HeaderMap,
    Json(req): Json<OpenNegotiationRequest>,
) -> ApiResult<(StatusCode, Json<Negotiation>)> {
    let actor = actor_id(&headers)?;
    let opened_by = if actor == req.buyer_id {
        Party::Buyer
    } else if actor == req.seller_id {
        Party::Seller
    } else {
        return Err(to_error_response(EngineError::Validation(format!(
            "User {} is neither the buyer nor the seller",
            actor
        ))));
    };

    let negotiation = state
        .marketplace
        .open_negotiation(OpenNegotiation {
            job_id: req.job_id,
            buyer_id: req.buyer_id,
            seller_id: req.seller_id,
            initial_offer: req.initial_offer,
            max_rounds: req.max_rounds,
            opened_by,
        })
        .await
        .map_err(to_error_response)?;

    Ok((StatusCode::CREATED, Json(negotiation)))
}

async fn get_negotiation_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Negotiation>> {
    let negotiation = state.marketplace.get_negotiation(id).await.map_err(to_error_response)?;
    Ok(Json(negotiation))
}

async fn counter_offer_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(offer): Json<OfferDraft>,
) -> ApiResult<Json<Negotiation>> {
    let actor = actor_id(&headers)?;
    let negotiation = state
        .marketplace
        .submit_counter_offer(id, offer, actor)
        .await
        .map_err(to_error_response)?;
    Ok(Json(negotiation))
}

async fn accept_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<AcceptResponse>> {
    let actor = actor_id(&headers)?;
    let (negotiation, escrow) = state.marketplace.accept_offer(id, actor).await.map_err(to_error_response)?;
    Ok(Json(AcceptResponse { negotiation, escrow }))
}

async fn reject_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<Negotiation>> {
    let actor = actor_id(&headers)?;
    let negotiation = state.marketplace.reject_offer(id, actor).await.map_err(to_error_response)?;
    Ok(Json(negotiation))
}

/// System-triggered; no actor required.
async fn expire_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Negotiation>> {
    let negotiation = state.marketplace.expire_negotiation(id).await.map_err(to_error_response)?;
    Ok(Json(negotiation))
}

// -----------------------------------------------------------------------------
// Escrows
// -----------------------------------------------------------------------------

async fn get_escrow_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Escrow>> {
    let escrow = state.marketplace.get_escrow(id).await.map_err(to_error_response)?;
    Ok(Json(escrow))
}

async fn release_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Escrow>> {
    let escrow = state.marketplace.release_escrow(id).await.map_err(to_error_response)?;
    Ok(Json(escrow))
}

async fn refund_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Escrow>> {
    let escrow = state.marketplace.refund_escrow(id).await.map_err(to_error_response)?;
    Ok(Json(escrow))
}

// -----------------------------------------------------------------------------
// Notifications
// -----------------------------------------------------------------------------

async fn notifications_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<InboxQuery>,
) -> Json<Vec<InboxEntry>> {
    let entries = if query.unread {
        state.inbox.unread_for_user(user_id).await
    } else {
        state.inbox.for_user(user_id).await
    };
    Json(entries)
}

async fn mark_read_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(id): Path<NotificationId>,
    headers: HeaderMap,
) -> ApiResult<Json<InboxEntry>> {
    let user_id = actor_id(&headers)?;
    let entry = state.inbox.mark_read_for(user_id, id).await.map_err(to_error_response)?;
    Ok(Json(entry))
}

// =============================================================================
// Helpers
// =============================================================================

fn actor_id(headers: &HeaderMap) -> ApiResult<UserId> {
    let value = headers
        .get(ACTOR_HEADER)
        .ok_or_else(|| to_error_response(DaemonError::BadRequest(format!("Missing {} header", ACTOR_HEADER))))?;

    value
        .to_str()
        .ok()
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .ok_or_else(|| to_error_response(DaemonError::BadRequest(format!("Invalid {} header", ACTOR_HEADER))))
}

fn to_error_response(error: impl Into<DaemonError>) -> ApiError {
    let error = error.into();

    let (status, kind) = match &error {
        DaemonError::Engine(e) => {
            let kind = e.kind();
            let status = match kind {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::State | ErrorKind::RoundLimitExceeded => StatusCode::CONFLICT,
                ErrorKind::InsufficientBalance | ErrorKind::DailyLimitExceeded | ErrorKind::PerJobLimitExceeded => {
                    StatusCode::UNPROCESSABLE_ENTITY
                },
                ErrorKind::Conflict => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, kind_name(kind))
        },
        DaemonError::NotificationNotFound(_) => (StatusCode::NOT_FOUND, "not_found".to_string()),
        DaemonError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request".to_string()),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal".to_string()),
    };

    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            kind,
        }),
    )
}

fn kind_name(kind: ErrorKind) -> String {
    serde_json::to_value(kind)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "internal".to_string())
}

// =============================================================================
// Tests
// =============================================================================
