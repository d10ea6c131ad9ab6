//! Zarinpal v4 payment gateway client.

use crate::domain::customer::Amount;
use crate::domain::gateway::{GatewayError, GatewayErrorKind, PaymentRequest, PaymentTicket};
use crate::domain::ports::PaymentGateway;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

/// Amounts are kept in Toman; the gateway charges in Rial.
pub const RIAL_PER_TOMAN: u64 = 10;

pub const SANDBOX_URL: &str = "https://sandbox.zarinpal.com";

const CODE_OK: i64 = 100;
const CODE_ALREADY_VERIFIED: i64 = 101;

/// Fails instead of wrapping so an oversized amount is never charged short.
pub fn to_rial(amount: Amount) -> std::result::Result<u64, GatewayError> {
    amount.value().checked_mul(RIAL_PER_TOMAN).ok_or_else(|| {
        GatewayError::new(
            GatewayErrorKind::Rejected,
            format!("amount {} Toman overflows the Rial range", amount.value()),
        )
    })
}

#[derive(Clone)]
pub struct ZarinpalClient {
    base_url: String,
    merchant_id: String,
    client: reqwest::Client,
}

impl ZarinpalClient {
    pub fn new(
        base_url: impl Into<String>,
        merchant_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentError::InternalError(Box::new(e)))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            merchant_id: merchant_id.into(),
            client,
        })
    }

    pub fn start_pay_url(&self, authority: &str) -> String {
        format!("{}/pg/StartPay/{authority}", self.base_url)
    }

    async fn post(&self, path: &str, body: Value) -> std::result::Result<Value, GatewayError> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::new(GatewayErrorKind::Transport, e.to_string()))?;

        let status = resp.status();
        let payload = resp.json::<Value>().await.map_err(|e| {
            GatewayError::new(
                GatewayErrorKind::InvalidResponse,
                format!("HTTP {status}: unreadable body: {e}"),
            )
        })?;
        debug!(%url, %status, "gateway answered");
        Ok(payload)
    }
}

#[async_trait]
impl PaymentGateway for ZarinpalClient {
    async fn request_payment(
        &self,
        request: PaymentRequest,
    ) -> std::result::Result<PaymentTicket, GatewayError> {
        let body = json!({
            "merchant_id": self.merchant_id,
            "amount": to_rial(request.amount)?,
            "description": request.description,
            "callback_url": request.callback_url,
            "metadata": { "mobile": request.mobile.as_str() },
        });
        let payload = self.post("/pg/v4/payment/request.json", body).await?;
        let authority = interpret_request(&payload)?;
        Ok(PaymentTicket {
            redirect_url: self.start_pay_url(&authority),
            token: authority,
        })
    }

    async fn verify_payment(
        &self,
        amount: Amount,
        token: &str,
    ) -> std::result::Result<(), GatewayError> {
        let body = json!({
            "merchant_id": self.merchant_id,
            "amount": to_rial(amount)?,
            "authority": token,
        });
        let payload = self.post("/pg/v4/payment/verify.json", body).await?;
        interpret_verify(&payload)
    }
}

/// Pulls the authority out of a `request.json` answer.
pub fn interpret_request(payload: &Value) -> std::result::Result<String, GatewayError> {
    match data_code(payload) {
        Some(CODE_OK) => payload
            .pointer("/data/authority")
            .and_then(Value::as_str)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                GatewayError::new(GatewayErrorKind::InvalidResponse, "missing authority")
            }),
        Some(code) => Err(rejection(payload, code)),
        None => Err(business_error(payload)),
    }
}

/// Accepts `100` and `101`; the latter is a repeat verify of a paid attempt.
pub fn interpret_verify(payload: &Value) -> std::result::Result<(), GatewayError> {
    match data_code(payload) {
        Some(CODE_OK) | Some(CODE_ALREADY_VERIFIED) => Ok(()),
        Some(code) => Err(rejection(payload, code)),
        None => Err(business_error(payload)),
    }
}

fn data_code(payload: &Value) -> Option<i64> {
    payload.pointer("/data/code").and_then(Value::as_i64)
}

fn rejection(payload: &Value, code: i64) -> GatewayError {
    let message = payload
        .pointer("/errors/message")
        .or_else(|| payload.pointer("/data/message"))
        .and_then(Value::as_str)
        .unwrap_or("no message");
    GatewayError::new(GatewayErrorKind::Rejected, format!("code {code}: {message}"))
}

/// On failure the gateway answers with `data: []` and an `errors` object.
fn business_error(payload: &Value) -> GatewayError {
    let code = payload.pointer("/errors/code").and_then(Value::as_i64);
    let message = payload.pointer("/errors/message").and_then(Value::as_str);
    match (code, message) {
        (Some(code), Some(message)) => {
            GatewayError::new(GatewayErrorKind::Rejected, format!("code {code}: {message}"))
        }
        (None, Some(message)) => GatewayError::new(GatewayErrorKind::Rejected, message),
        _ => GatewayError::new(
            GatewayErrorKind::InvalidResponse,
            format!("unexpected answer: {payload}"),
        ),
    }
}
