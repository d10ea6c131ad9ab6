use crate::domain::customer::{Amount, Phone};
use crate::domain::payment::{Delivery, FailureReason, OriginRef, Outcome, Settlement};
use crate::error::{PaymentError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Pending = 0,
    Verifying = 1,
    Settled = 2,
    Failed = 3,
    Expired = 4,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Pending,
            1 => SessionState::Verifying,
            2 => SessionState::Settled,
            3 => SessionState::Failed,
            _ => SessionState::Expired,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Settled | SessionState::Failed | SessionState::Expired
        )
    }
}

/// A live payment attempt waiting for its gateway callback.
///
/// The state lives in an atomic so that the Pending -> Verifying (or
/// Pending -> Expired) claim is a single compare-and-swap per token.
#[derive(Debug)]
pub struct PaymentSession {
    pub token: String,
    pub phone: Phone,
    pub installment_id: String,
    pub amount: Amount,
    pub origin: OriginRef,
    pub created_at: Instant,
    state: AtomicU8,
    settlement: OnceLock<Settlement>,
    recorded: AtomicBool,
}

impl PaymentSession {
    pub fn new(
        token: String,
        phone: Phone,
        installment_id: String,
        amount: Amount,
        origin: OriginRef,
    ) -> Self {
        Self {
            token,
            phone,
            installment_id,
            amount,
            origin,
            created_at: Instant::now(),
            state: AtomicU8::new(SessionState::Pending as u8),
            settlement: OnceLock::new(),
            recorded: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn claim(&self, next: SessionState) -> bool {
        self.state
            .compare_exchange(
                SessionState::Pending as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Only the caller that wins this transition may call the gateway.
    pub fn try_begin_verification(&self) -> bool {
        self.claim(SessionState::Verifying)
    }

    pub fn try_expire(&self) -> bool {
        if self.claim(SessionState::Expired) {
            let _ = self
                .settlement
                .set(Settlement::Failed(FailureReason::Expired));
            true
        } else {
            false
        }
    }

    /// Moves a verifying session to its terminal state.
    pub fn finish(&self, settlement: Settlement) {
        let next = match settlement {
            Settlement::Settled => SessionState::Settled,
            _ => SessionState::Failed,
        };
        let _ = self.settlement.set(settlement);
        let _ = self.state.compare_exchange(
            SessionState::Verifying as u8,
            next as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() >= ttl
    }

    pub fn mark_recorded(&self) {
        self.recorded.store(true, Ordering::Release);
    }

    pub fn is_recorded(&self) -> bool {
        self.recorded.load(Ordering::Acquire)
    }

    /// Terminal sessions whose ledger write has not succeeded yet.
    pub fn awaits_record(&self) -> bool {
        self.state().is_terminal() && !self.is_recorded()
    }

    pub fn outcome(&self, delivery: Delivery) -> Outcome {
        let settlement = if self.state().is_terminal() {
            self.settlement.get().cloned().unwrap_or(Settlement::InFlight)
        } else {
            Settlement::InFlight
        };
        Outcome {
            token: self.token.clone(),
            phone: self.phone.clone(),
            installment_id: self.installment_id.clone(),
            amount: self.amount,
            settlement,
            delivery,
        }
    }
}

/// Live sessions keyed by gateway token.
///
/// The map lock is only held to insert, look up or remove an entry, never
/// across a gateway call.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<PaymentSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: PaymentSession) -> Result<Arc<PaymentSession>> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.token) {
            return Err(PaymentError::ValidationError(format!(
                "Session for token {} already exists",
                session.token
            )));
        }
        let session = Arc::new(session);
        sessions.insert(session.token.clone(), Arc::clone(&session));
        Ok(session)
    }

    pub async fn get(&self, token: &str) -> Option<Arc<PaymentSession>> {
        self.sessions.read().await.get(token).cloned()
    }

    pub async fn remove(&self, token: &str) -> Option<Arc<PaymentSession>> {
        self.sessions.write().await.remove(token)
    }

    pub async fn snapshot(&self) -> Vec<Arc<PaymentSession>> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(token: &str) -> PaymentSession {
        PaymentSession::new(
            token.to_string(),
            Phone::parse("09121234567").unwrap(),
            "INS-7".to_string(),
            Amount::new(500000).unwrap(),
            OriginRef::new("chat-1"),
        )
    }

    #[test]
    fn test_verification_claim_is_exclusive() {
        let s = session("T1");
        assert!(s.try_begin_verification());
        assert!(!s.try_begin_verification());
        assert!(!s.try_expire());
        assert_eq!(s.state(), SessionState::Verifying);
        assert_eq!(s.outcome(Delivery::Duplicate).settlement, Settlement::InFlight);
    }

    #[test]
    fn test_expired_session_cannot_be_verified() {
        let s = session("T1");
        assert!(s.try_expire());
        assert!(!s.try_begin_verification());
        assert_eq!(s.state(), SessionState::Expired);
        assert_eq!(
            s.outcome(Delivery::Duplicate).settlement,
            Settlement::Failed(FailureReason::Expired)
        );
    }

    #[test]
    fn test_finish_records_settlement() {
        let s = session("T1");
        assert!(s.try_begin_verification());
        s.finish(Settlement::Settled);
        assert_eq!(s.state(), SessionState::Settled);
        assert!(s.awaits_record());
        s.mark_recorded();
        assert!(!s.awaits_record());
        assert!(s.outcome(Delivery::First).is_settled());
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let s = Arc::new(session("T1"));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let s = Arc::clone(&s);
                std::thread::spawn(move || s.try_begin_verification())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_registry_rejects_duplicate_token() {
        let registry = SessionRegistry::new();
        registry.insert(session("T1")).await.unwrap();
        assert!(registry.insert(session("T1")).await.is_err());
        assert_eq!(registry.len().await, 1);

        assert!(registry.remove("T1").await.is_some());
        assert!(registry.get("T1").await.is_none());
        assert!(registry.is_empty().await);
    }
}
