//! HTTP surface: the gateway's browser callback plus a small JSON API used
//! by the chat front end.

use crate::application::engine::SettlementEngine;
use crate::domain::customer::Phone;
use crate::domain::payment::{OriginRef, Settlement};
use crate::domain::ports::{CustomerStoreRef, PaymentLedgerRef};
use crate::error::PaymentError;
use crate::interfaces::csv::customer_reader::import_customers;
use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

pub const ACK_PROCESSED: &str = "پردازش شد.";
pub const ACK_FAILED: &str = "پرداخت ناموفق.";

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SettlementEngine>,
    pub customers: CustomerStoreRef,
    pub ledger: PaymentLedgerRef,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/callback", get(handle_callback))
        .route("/attempts", post(handle_start_attempt))
        .route("/customers/identify", post(handle_identify))
        .route("/customers/import", post(handle_import))
        .route("/customers/{phone}/payments", get(handle_history))
        .with_state(state)
}

async fn handle_health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    #[serde(rename = "Authority")]
    authority: Option<String>,
    #[serde(rename = "Status")]
    status: Option<String>,
}

/// GET /callback: where the gateway sends the payer's browser back.
async fn handle_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let (Some(authority), Some(status)) = (query.authority, query.status) else {
        return (StatusCode::BAD_REQUEST, ACK_FAILED).into_response();
    };

    match state.engine.handle_callback(&authority, &status).await {
        Ok(outcome) => match outcome.settlement {
            Settlement::Failed(_) => ACK_FAILED.into_response(),
            Settlement::Settled | Settlement::InFlight => ACK_PROCESSED.into_response(),
        },
        Err(e) => {
            warn!(token = %authority, error = %e, "callback not reconciled");
            ACK_FAILED.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct StartAttemptBody {
    phone: String,
    origin: String,
}

#[derive(Debug, Serialize)]
struct StartAttemptReply {
    token: String,
    redirect_url: String,
    amount: u64,
    installment_id: String,
}

/// POST /attempts: opens a payment for the customer behind `phone`.
async fn handle_start_attempt(
    State(state): State<AppState>,
    Json(body): Json<StartAttemptBody>,
) -> Response {
    let phone = match Phone::parse(&body.phone) {
        Ok(phone) => phone,
        Err(e) => return error_reply(&e),
    };
    let customer = match state.customers.lookup(&phone).await {
        Ok(Some(customer)) => customer,
        Ok(None) => return error_reply(&PaymentError::CustomerNotFound(phone.to_string())),
        Err(e) => return error_reply(&e),
    };

    match state
        .engine
        .start_attempt(
            customer.phone,
            customer.amount,
            &customer.installment_id,
            OriginRef::new(body.origin),
        )
        .await
    {
        Ok(ticket) => Json(StartAttemptReply {
            token: ticket.token,
            redirect_url: ticket.redirect_url,
            amount: customer.amount.value(),
            installment_id: customer.installment_id,
        })
        .into_response(),
        Err(e) => error_reply(&e),
    }
}

#[derive(Debug, Deserialize)]
struct IdentifyBody {
    phone: String,
    origin: String,
}

#[derive(Debug, Serialize)]
struct IdentifyReply {
    name: String,
    amount: u64,
    due_date: String,
    installment_id: String,
}

/// POST /customers/identify: the customer shared their phone in chat.
async fn handle_identify(
    State(state): State<AppState>,
    Json(body): Json<IdentifyBody>,
) -> Response {
    let phone = match Phone::parse(&body.phone) {
        Ok(phone) => phone,
        Err(e) => return error_reply(&e),
    };
    match state
        .engine
        .identify(state.customers.as_ref(), &phone, OriginRef::new(body.origin))
        .await
    {
        Ok(customer) => Json(IdentifyReply {
            name: customer.name,
            amount: customer.amount.value(),
            due_date: customer.due_date.format("%Y/%m/%d").to_string(),
            installment_id: customer.installment_id,
        })
        .into_response(),
        Err(e) => error_reply(&e),
    }
}

/// POST /customers/import: CSV body, same layout as the `import` command.
async fn handle_import(State(state): State<AppState>, body: String) -> Response {
    match import_customers(state.customers.as_ref(), body.as_bytes()).await {
        Ok(imported) => Json(json!({ "imported": imported })).into_response(),
        Err(e) => error_reply(&e),
    }
}

/// GET /customers/{phone}/payments
async fn handle_history(State(state): State<AppState>, Path(phone): Path<String>) -> Response {
    let phone = match Phone::parse(&phone) {
        Ok(phone) => phone,
        Err(e) => return error_reply(&e),
    };
    match state.ledger.history_for(&phone).await {
        Ok(history) => Json(history).into_response(),
        Err(e) => error_reply(&e),
    }
}

fn error_reply(err: &PaymentError) -> Response {
    let (status, message) = match err {
        PaymentError::ValidationError(_) => {
            (StatusCode::BAD_REQUEST, "اطلاعات ارسالی نامعتبر است.".to_string())
        }
        PaymentError::MissingColumns(_) | PaymentError::InvalidRow { .. } => (
            StatusCode::BAD_REQUEST,
            format!("فایل مشتریان نامعتبر است: {err}"),
        ),
        PaymentError::CustomerNotFound(_) => (
            StatusCode::NOT_FOUND,
            "شماره شما در سیستم ثبت نشده است.".to_string(),
        ),
        PaymentError::GatewayUnavailable(detail) => (
            StatusCode::BAD_GATEWAY,
            format!("خطا در ارتباط با زرین‌پال: {detail}"),
        ),
        PaymentError::GatewayRejected(detail) => (
            StatusCode::BAD_GATEWAY,
            format!("خطا در ایجاد لینک پرداخت: {detail}"),
        ),
        other => {
            error!(error = %other, "request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "خطای داخلی رخ داد.".to_string(),
            )
        }
    };
    (status, Json(json!({ "error": message }))).into_response()
}
