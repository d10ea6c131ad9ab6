use super::reminders::ContactBook;
use super::sessions::{PaymentSession, SessionRegistry};
use crate::domain::customer::{Amount, Customer, Phone};
use crate::domain::gateway::{GatewayError, GatewayErrorKind, PaymentRequest, PaymentTicket};
use crate::domain::notice::Notice;
use crate::domain::payment::{
    Delivery, FailureReason, OriginRef, Outcome, PaymentRecord, Settlement,
};
use crate::domain::ports::{CustomerStore, NotifierRef, PaymentGatewayRef, PaymentLedgerRef};
use crate::error::{PaymentError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Redirect-side status the gateway reports for a completed payment page.
pub const GATEWAY_STATUS_OK: &str = "OK";

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Where the gateway sends the user (and the callback) when the payment page closes.
    pub callback_url: String,
    /// How long a session may stay Pending before the sweep expires it.
    pub session_ttl: Duration,
    /// Upper bound for each individual gateway call.
    pub gateway_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            callback_url: "http://localhost:8443/callback".to_string(),
            session_ttl: Duration::from_secs(30 * 60),
            gateway_timeout: Duration::from_secs(15),
        }
    }
}

/// What one sweep did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    /// Terminal sessions whose earlier ledger write failed and now succeeded.
    pub recovered: usize,
}

/// Reconciles gateway callbacks with the payment attempts that produced them.
///
/// The engine owns the live session table. Each attempt is keyed by the token
/// the gateway issues, and the token is claimed at most once for verification.
/// The ledger is written before the session is considered live and before any
/// notification is sent. Notifications are delivered in the background so a
/// slow chat transport never holds up a callback reply.
pub struct SettlementEngine {
    gateway: PaymentGatewayRef,
    ledger: PaymentLedgerRef,
    notifier: NotifierRef,
    sessions: SessionRegistry,
    contacts: ContactBook,
    notifications: Mutex<JoinSet<()>>,
    settings: EngineSettings,
}

impl SettlementEngine {
    pub fn new(
        gateway: PaymentGatewayRef,
        ledger: PaymentLedgerRef,
        notifier: NotifierRef,
        settings: EngineSettings,
    ) -> Self {
        Self {
            gateway,
            ledger,
            notifier,
            sessions: SessionRegistry::new(),
            contacts: ContactBook::new(),
            notifications: Mutex::new(JoinSet::new()),
            settings,
        }
    }

    pub fn contacts(&self) -> &ContactBook {
        &self.contacts
    }

    pub async fn live_sessions(&self) -> usize {
        self.sessions.len().await
    }

    /// Looks the customer up and remembers which chat session they came from.
    ///
    /// Reminders can only reach customers the engine has an origin for.
    pub async fn identify(
        &self,
        customers: &dyn CustomerStore,
        phone: &Phone,
        origin: OriginRef,
    ) -> Result<Customer> {
        let Some(customer) = customers.lookup(phone).await? else {
            info!(phone = %phone, "identification for unknown phone");
            return Err(PaymentError::CustomerNotFound(phone.to_string()));
        };
        self.contacts.remember(customer.phone.clone(), origin).await;
        info!(
            phone = %phone,
            installment_id = %customer.installment_id,
            "customer identified"
        );
        Ok(customer)
    }

    /// Opens a payment attempt at the gateway and registers it under the issued token.
    ///
    /// Nothing is recorded unless the gateway issues a token.
    pub async fn start_attempt(
        &self,
        phone: Phone,
        amount: Amount,
        installment_id: &str,
        origin: OriginRef,
    ) -> Result<PaymentTicket> {
        if installment_id.trim().is_empty() {
            return Err(PaymentError::ValidationError(
                "Installment id must not be empty".to_string(),
            ));
        }

        let request = PaymentRequest {
            amount,
            description: format!("پرداخت قسط {installment_id} برای شماره {phone}"),
            callback_url: self.settings.callback_url.clone(),
            mobile: phone.clone(),
        };

        let ticket = match timeout(
            self.settings.gateway_timeout,
            self.gateway.request_payment(request),
        )
        .await
        {
            Ok(result) => result.inspect_err(|e| {
                warn!(phone = %phone, installment_id, error = %e, "payment request failed");
            })?,
            Err(_) => {
                warn!(phone = %phone, installment_id, "payment request timed out");
                return Err(PaymentError::GatewayUnavailable(
                    "payment request timed out".to_string(),
                ));
            }
        };

        self.ledger
            .append_initiated(PaymentRecord::initiated(
                phone.clone(),
                amount,
                installment_id,
                ticket.token.clone(),
            ))
            .await?;

        self.sessions
            .insert(PaymentSession::new(
                ticket.token.clone(),
                phone.clone(),
                installment_id.to_string(),
                amount,
                origin.clone(),
            ))
            .await?;
        self.contacts.remember(phone.clone(), origin).await;

        info!(
            token = %ticket.token,
            phone = %phone,
            installment_id,
            amount = amount.value(),
            "payment attempt opened"
        );
        Ok(ticket)
    }

    /// Handles one (possibly duplicated, possibly unknown) gateway callback.
    ///
    /// Once the token is claimed, verification and the ledger write run on
    /// their own task. Dropping the returned future does not abandon them.
    pub async fn handle_callback(
        self: &Arc<Self>,
        token: &str,
        gateway_status: &str,
    ) -> Result<Outcome> {
        debug!(token, gateway_status, "callback received");

        let Some(session) = self.sessions.get(token).await else {
            return self.replay_from_ledger(token).await;
        };

        if !session.try_begin_verification() {
            warn!(
                token,
                phone = %session.phone,
                state = ?session.state(),
                "duplicate callback"
            );
            return Ok(session.outcome(Delivery::Duplicate));
        }

        let engine = Arc::clone(self);
        let gateway_status = gateway_status.to_string();
        tokio::spawn(async move { engine.settle(session, &gateway_status).await })
            .await
            .map_err(|e| PaymentError::InternalError(Box::new(e)))?
    }

    async fn settle(&self, session: Arc<PaymentSession>, gateway_status: &str) -> Result<Outcome> {
        let settlement = if gateway_status != GATEWAY_STATUS_OK {
            Settlement::Failed(FailureReason::Cancelled(gateway_status.to_string()))
        } else {
            self.verify(&session).await
        };
        session.finish(settlement);

        self.commit(&session).await
    }

    async fn verify(&self, session: &PaymentSession) -> Settlement {
        let verified = match timeout(
            self.settings.gateway_timeout,
            self.gateway.verify_payment(session.amount, &session.token),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(GatewayError::new(
                GatewayErrorKind::Transport,
                "verification timed out",
            )),
        };

        match verified {
            Ok(()) => Settlement::Settled,
            Err(e) => {
                warn!(token = %session.token, phone = %session.phone, error = %e, "verification failed");
                match e.kind {
                    GatewayErrorKind::Rejected => {
                        Settlement::Failed(FailureReason::VerificationFailed(e.message))
                    }
                    GatewayErrorKind::Transport | GatewayErrorKind::InvalidResponse => {
                        Settlement::Failed(FailureReason::GatewayUnavailable(e.message))
                    }
                }
            }
        }
    }

    async fn replay_from_ledger(&self, token: &str) -> Result<Outcome> {
        match self.ledger.find_by_token(token).await? {
            Some(record) => match record.outcome(Delivery::Duplicate) {
                Some(outcome) => {
                    warn!(token, phone = %record.phone, "duplicate callback for settled token");
                    match self.contacts.origin_for(&record.phone).await {
                        Some(origin) => {
                            let notice = Notice::Outcome(outcome.clone());
                            self.notify(token, &record.phone, origin, notice).await;
                        }
                        None => debug!(token, "no origin known; duplicate not re-notified"),
                    }
                    Ok(outcome)
                }
                None => {
                    warn!(
                        token,
                        phone = %record.phone,
                        "callback for initiated attempt without a live session; needs manual reconciliation"
                    );
                    Err(PaymentError::OrphanedAttempt(token.to_string()))
                }
            },
            None => {
                warn!(token, "callback for unknown token");
                Err(PaymentError::UnknownToken(token.to_string()))
            }
        }
    }

    /// Writes a terminal session to the ledger, then evicts it and notifies its origin.
    async fn commit(&self, session: &Arc<PaymentSession>) -> Result<Outcome> {
        let outcome = session.outcome(Delivery::First);
        let Some(status) = outcome.settlement.terminal_status() else {
            return Ok(outcome);
        };
        let reason = match &outcome.settlement {
            Settlement::Failed(reason) => Some(reason.to_recorded()),
            _ => None,
        };

        let updated = match self
            .ledger
            .update_terminal(&session.token, status, reason)
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                error!(
                    token = %session.token,
                    phone = %session.phone,
                    error = %e,
                    "ledger write failed; session kept for retry"
                );
                return Err(e);
            }
        };
        session.mark_recorded();
        self.sessions.remove(&session.token).await;

        if !updated {
            // Someone else already committed this token.
            return Ok(outcome);
        }

        info!(
            token = %session.token,
            phone = %session.phone,
            installment_id = %session.installment_id,
            status = ?status,
            "payment settled"
        );
        self.notify(
            &session.token,
            &session.phone,
            session.origin.clone(),
            Notice::Outcome(outcome.clone()),
        )
        .await;
        Ok(outcome)
    }

    /// Hands the notice to a background task. Failures are logged, never retried.
    async fn notify(&self, token: &str, phone: &Phone, origin: OriginRef, notice: Notice) {
        let notifier = Arc::clone(&self.notifier);
        let token = token.to_string();
        let phone = phone.clone();

        let mut tasks = self.notifications.lock().await;
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            if let Err(e) = notifier.notify(&origin, &notice).await {
                warn!(
                    token = %token,
                    phone = %phone,
                    origin = %origin,
                    error = %e,
                    "notification failed; manual follow-up required"
                );
            }
        });
    }

    /// Waits for every notification handed off so far.
    pub async fn drain_notifications(&self) {
        let mut tasks = self.notifications.lock().await;
        while tasks.join_next().await.is_some() {}
    }

    /// Expires Pending sessions older than the TTL and retries failed ledger writes.
    ///
    /// Never calls the gateway.
    pub async fn expire_stale(&self) -> SweepReport {
        let mut report = SweepReport::default();

        for session in self.sessions.snapshot().await {
            if session.awaits_record() {
                if self.commit(&session).await.is_ok() {
                    report.recovered += 1;
                }
                continue;
            }

            if session.is_expired(self.settings.session_ttl) && session.try_expire() {
                info!(token = %session.token, phone = %session.phone, "payment session expired");
                if self.commit(&session).await.is_ok() {
                    report.expired += 1;
                }
            }
        }

        report
    }
}
