use super::customer::{Amount, Customer, Phone};
use super::gateway::{GatewayError, PaymentRequest, PaymentTicket};
use super::notice::Notice;
use super::payment::{OriginRef, PaymentRecord, TerminalStatus};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Durable phone -> customer mapping. Encryption at rest is the store's concern.
#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn lookup(&self, phone: &Phone) -> Result<Option<Customer>>;
    async fn upsert(&self, customer: Customer) -> Result<()>;
    async fn list_all(&self) -> Result<Vec<Customer>>;
}

/// Append-only log of payment attempts keyed by gateway token.
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Fails if a row with the same token already exists.
    async fn append_initiated(&self, record: PaymentRecord) -> Result<()>;
    /// Returns `false` without touching the row when it is already terminal.
    async fn update_terminal(
        &self,
        token: &str,
        status: TerminalStatus,
        reason: Option<String>,
    ) -> Result<bool>;
    async fn find_by_token(&self, token: &str) -> Result<Option<PaymentRecord>>;
    /// Rows of one customer, oldest first.
    async fn history_for(&self, phone: &Phone) -> Result<Vec<PaymentRecord>>;
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn request_payment(
        &self,
        request: PaymentRequest,
    ) -> std::result::Result<PaymentTicket, GatewayError>;
    async fn verify_payment(
        &self,
        amount: Amount,
        token: &str,
    ) -> std::result::Result<(), GatewayError>;
}

/// Delivers a notice to the chat session behind `origin`.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, origin: &OriginRef, notice: &Notice) -> Result<()>;
}

pub type CustomerStoreRef = Arc<dyn CustomerStore>;
pub type PaymentLedgerRef = Arc<dyn PaymentLedger>;
pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
pub type NotifierRef = Arc<dyn Notifier>;
