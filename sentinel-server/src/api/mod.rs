//! Membership API handlers.
//!
//! The thin HTTP surface over the ledger subsystem:
//!
//! - `GET  /membership/{wallet}`          – membership snapshot
//! - `GET  /membership/{wallet}/badges`   – badge rows
//! - `GET  /membership/{wallet}/billing`  – billing history
//! - `POST /membership/{wallet}/sync`     – manual on-chain reconciliation
//!
//! Nothing here mutates the ledger except the sync trigger, and that
//! only through the reconciliation scanner.

use crate::state::AppState;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use sentinel_core::entities::{BadgeRecord, BillingEntry, MembershipRecord, WalletAddress};
use sentinel_core::ledger::{LedgerError, MembershipSnapshot, load_snapshot};
use sentinel_core::processors::ReconcileOutcome;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// Build the membership API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/membership/{wallet}", get(get_membership))
        .route("/membership/{wallet}/badges", get(get_badges))
        .route("/membership/{wallet}/billing", get(get_billing))
        .route("/membership/{wallet}/sync", post(sync_membership))
}

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

/// Errors that can occur in membership API handlers.
#[derive(Debug)]
enum ApiError {
    NotFound,
    Ledger(LedgerError),
}

impl From<LedgerError> for ApiError {
    fn from(value: LedgerError) -> Self {
        ApiError::Ledger(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "membership not found"),
            ApiError::Ledger(e) => {
                tracing::error!(error = %e, "Ledger read failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Response models
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MembershipResponse {
    id: Uuid,
    wallet: String,
    tier: String,
    expiry_date: Option<i64>,
    member_since: i64,
    updated_at: i64,
    active: bool,
    badges: Vec<BadgeResponse>,
    billing: Vec<BillingResponse>,
}

impl MembershipResponse {
    fn from_snapshot(snapshot: &MembershipSnapshot) -> Self {
        let record: &MembershipRecord = &snapshot.membership;
        Self {
            id: record.id,
            wallet: record.wallet.to_string(),
            tier: record.tier.to_string(),
            expiry_date: record.expiry_date.map(OffsetDateTime::unix_timestamp),
            member_since: record.member_since.unix_timestamp(),
            updated_at: record.updated_at.unix_timestamp(),
            active: record.is_active(OffsetDateTime::now_utc()),
            badges: snapshot.badges.iter().map(BadgeResponse::from_record).collect(),
            billing: snapshot.billing.iter().map(BillingResponse::from_entry).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct BadgeResponse {
    badge_id: u32,
    earned: bool,
    earned_at: Option<i64>,
    nft_minted: bool,
    minted_at: Option<i64>,
}

impl BadgeResponse {
    fn from_record(record: &BadgeRecord) -> Self {
        Self {
            badge_id: record.badge_id.0,
            earned: record.earned,
            earned_at: record.earned_at.map(OffsetDateTime::unix_timestamp),
            nft_minted: record.nft_minted,
            minted_at: record.minted_at.map(OffsetDateTime::unix_timestamp),
        }
    }
}

#[derive(Debug, Serialize)]
struct BillingResponse {
    tx_hash: String,
    plan: &'static str,
    months: u32,
    price: String,
    date: i64,
}

impl BillingResponse {
    fn from_entry(entry: &BillingEntry) -> Self {
        Self {
            tx_hash: entry.tx_hash.clone(),
            plan: entry.plan,
            months: entry.months,
            price: entry.price.clone(),
            date: entry.date.unix_timestamp(),
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /membership/{wallet}` — current membership snapshot.
async fn get_membership(
    state: State<AppState>,
    Path(wallet): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let wallet = WalletAddress::new(wallet);
    let snapshot = load_snapshot(state.ledger.as_ref(), &wallet)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(MembershipResponse::from_snapshot(&snapshot)))
}

/// `GET /membership/{wallet}/badges` — badge rows for the wallet.
async fn get_badges(
    state: State<AppState>,
    Path(wallet): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let wallet = WalletAddress::new(wallet);
    let badges = state.ledger.badges(&wallet).await?;
    let response: Vec<BadgeResponse> = badges.iter().map(BadgeResponse::from_record).collect();
    Ok(Json(response))
}

/// `GET /membership/{wallet}/billing` — billing history for the wallet.
async fn get_billing(
    state: State<AppState>,
    Path(wallet): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let wallet = WalletAddress::new(wallet);
    let billing = state.ledger.billing(&wallet).await?;
    let response: Vec<BillingResponse> = billing.iter().map(BillingResponse::from_entry).collect();
    Ok(Json(response))
}

/// `POST /membership/{wallet}/sync` — verify membership against chain
/// history and restore it if the live feed missed the payment.
async fn sync_membership(
    state: State<AppState>,
    Path(wallet): Path<String>,
) -> impl IntoResponse {
    let wallet = WalletAddress::new(wallet);
    match state.scanner.reconcile(&wallet).await {
        Ok(ReconcileOutcome::Restored) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "message": "Membership restored from chain history.",
            })),
        ),
        Ok(ReconcileOutcome::Expired) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": false,
                "message": "Membership expired.",
            })),
        ),
        Ok(ReconcileOutcome::NoHistory) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": false,
                "message": "No payment history found on-chain.",
            })),
        ),
        Err(e) => {
            tracing::error!(%wallet, error = %e, "Reconciliation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Internal Server Error" })),
            )
        }
    }
}
