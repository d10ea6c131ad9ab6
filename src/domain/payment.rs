use super::customer::{Amount, Phone};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger status of a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Initiated,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PaymentStatus::Initiated)
    }
}

/// The two statuses an attempt may end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalStatus {
    Success,
    Failed,
}

impl From<TerminalStatus> for PaymentStatus {
    fn from(status: TerminalStatus) -> Self {
        match status {
            TerminalStatus::Success => PaymentStatus::Success,
            TerminalStatus::Failed => PaymentStatus::Failed,
        }
    }
}

/// One durable row of the payment ledger, keyed by the gateway token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub phone: Phone,
    pub amount: Amount,
    pub installment_id: String,
    pub status: PaymentStatus,
    pub token: String,
    /// When the attempt was opened.
    pub timestamp: DateTime<Utc>,
    /// Failure reason, kept for manual follow-up. The status stays binary.
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PaymentRecord {
    pub fn initiated(
        phone: Phone,
        amount: Amount,
        installment_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            phone,
            amount,
            installment_id: installment_id.into(),
            status: PaymentStatus::Initiated,
            token: token.into(),
            timestamp: Utc::now(),
            reason: None,
            updated_at: None,
        }
    }

    /// Reconstructs the outcome recorded for a terminal row.
    pub fn outcome(&self, delivery: Delivery) -> Option<Outcome> {
        let settlement = match self.status {
            PaymentStatus::Initiated => return None,
            PaymentStatus::Success => Settlement::Settled,
            PaymentStatus::Failed => Settlement::Failed(FailureReason::from_recorded(
                self.reason.as_deref().unwrap_or_default(),
            )),
        };
        Some(Outcome {
            token: self.token.clone(),
            phone: self.phone.clone(),
            installment_id: self.installment_id.clone(),
            amount: self.amount,
            settlement,
            delivery,
        })
    }
}

/// Opaque handle the notifier uses to reach the chat session that opened an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OriginRef(String);

impl OriginRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OriginRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

const EXPIRED_REASON: &str = "expired";
const CANCELLED_PREFIX: &str = "gateway status: ";
const UNAVAILABLE_PREFIX: &str = "verification unavailable: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The redirect-side status was not `OK`; carries the status received.
    Cancelled(String),
    /// The gateway denied settlement; carries its message.
    VerificationFailed(String),
    /// Verification could not reach the gateway.
    GatewayUnavailable(String),
    /// No callback arrived within the session TTL.
    Expired,
}

impl FailureReason {
    /// Text stored in the ledger's `reason` column.
    pub fn to_recorded(&self) -> String {
        match self {
            FailureReason::Cancelled(status) => format!("{CANCELLED_PREFIX}{status}"),
            FailureReason::VerificationFailed(message) => message.clone(),
            FailureReason::GatewayUnavailable(message) => {
                format!("{UNAVAILABLE_PREFIX}{message}")
            }
            FailureReason::Expired => EXPIRED_REASON.to_string(),
        }
    }

    pub fn from_recorded(recorded: &str) -> Self {
        if recorded == EXPIRED_REASON {
            FailureReason::Expired
        } else if let Some(status) = recorded.strip_prefix(CANCELLED_PREFIX) {
            FailureReason::Cancelled(status.to_string())
        } else if let Some(message) = recorded.strip_prefix(UNAVAILABLE_PREFIX) {
            FailureReason::GatewayUnavailable(message.to_string())
        } else {
            FailureReason::VerificationFailed(recorded.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Settled,
    Failed(FailureReason),
    /// Another delivery of the same callback is still verifying.
    InFlight,
}

impl Settlement {
    pub fn terminal_status(&self) -> Option<TerminalStatus> {
        match self {
            Settlement::Settled => Some(TerminalStatus::Success),
            Settlement::Failed(_) => Some(TerminalStatus::Failed),
            Settlement::InFlight => None,
        }
    }
}

/// Whether this callback delivery did the work or replayed an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    First,
    Duplicate,
}

/// Result of handling one gateway callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub token: String,
    pub phone: Phone,
    pub installment_id: String,
    pub amount: Amount,
    pub settlement: Settlement,
    pub delivery: Delivery,
}

impl Outcome {
    pub fn is_settled(&self) -> bool {
        self.settlement == Settlement::Settled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: PaymentStatus, reason: Option<&str>) -> PaymentRecord {
        let mut record = PaymentRecord::initiated(
            Phone::parse("09121234567").unwrap(),
            Amount::new(500000).unwrap(),
            "INS-7",
            "T1",
        );
        record.status = status;
        record.reason = reason.map(str::to_string);
        record
    }

    #[test]
    fn test_initiated_record_has_no_outcome() {
        assert!(record(PaymentStatus::Initiated, None)
            .outcome(Delivery::Duplicate)
            .is_none());
    }

    #[test]
    fn test_failure_reason_survives_the_ledger() {
        for reason in [
            FailureReason::Expired,
            FailureReason::Cancelled("NOK".into()),
            FailureReason::GatewayUnavailable("timeout".into()),
            FailureReason::VerificationFailed("code -51".into()),
        ] {
            let recorded = reason.to_recorded();
            let row = record(PaymentStatus::Failed, Some(&recorded));
            let outcome = row.outcome(Delivery::Duplicate).unwrap();
            assert_eq!(outcome.settlement, Settlement::Failed(reason));
        }
    }

    #[test]
    fn test_success_record_replays_as_settled() {
        let outcome = record(PaymentStatus::Success, None)
            .outcome(Delivery::Duplicate)
            .unwrap();
        assert!(outcome.is_settled());
        assert_eq!(outcome.delivery, Delivery::Duplicate);
        assert_eq!(outcome.token, "T1");
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&PaymentStatus::Success).unwrap();
        assert_eq!(json, "\"success\"");
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(!PaymentStatus::Initiated.is_terminal());
    }
}
