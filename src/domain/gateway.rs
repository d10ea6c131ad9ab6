use super::customer::{Amount, Phone};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    /// The gateway could not be reached or did not answer in time.
    Transport,
    /// The gateway answered with a business error.
    Rejected,
    /// The gateway answered with something we cannot interpret.
    InvalidResponse,
}

impl fmt::Display for GatewayErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GatewayErrorKind::Transport => "transport",
            GatewayErrorKind::Rejected => "rejected",
            GatewayErrorKind::InvalidResponse => "invalid response",
        };
        f.write_str(name)
    }
}

/// Every failure of the gateway client, normalized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub message: String,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// What the engine asks the gateway to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub amount: Amount,
    pub description: String,
    pub callback_url: String,
    pub mobile: Phone,
}

/// A payment opened at the gateway: the correlation token and where to send the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentTicket {
    pub token: String,
    pub redirect_url: String,
}
