use crate::domain::customer::{Customer, Phone};
use crate::domain::payment::{PaymentRecord, TerminalStatus};
use crate::domain::ports::{CustomerStore, PaymentLedger};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for customers.
///
/// Uses `Arc<RwLock<HashMap<Phone, Customer>>>` to allow shared concurrent access.
/// Nothing is persisted, so nothing needs encrypting.
#[derive(Default, Clone)]
pub struct InMemoryCustomerStore {
    customers: Arc<RwLock<HashMap<Phone, Customer>>>,
}

impl InMemoryCustomerStore {
    /// Creates a new, empty in-memory customer store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CustomerStore for InMemoryCustomerStore {
    async fn lookup(&self, phone: &Phone) -> Result<Option<Customer>> {
        let customers = self.customers.read().await;
        Ok(customers.get(phone).cloned())
    }

    async fn upsert(&self, customer: Customer) -> Result<()> {
        let mut customers = self.customers.write().await;
        customers.insert(customer.phone.clone(), customer);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Customer>> {
        let customers = self.customers.read().await;
        let mut all: Vec<Customer> = customers.values().cloned().collect();
        all.sort_by(|a, b| a.phone.cmp(&b.phone));
        Ok(all)
    }
}

#[derive(Default)]
struct LedgerState {
    /// Rows in append order.
    records: Vec<PaymentRecord>,
    by_token: HashMap<String, usize>,
}

/// A thread-safe in-memory payment ledger.
///
/// Rows are kept in append order and indexed by token.
#[derive(Default, Clone)]
pub struct InMemoryPaymentLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryPaymentLedger {
    /// Creates a new, empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentLedger for InMemoryPaymentLedger {
    async fn append_initiated(&self, record: PaymentRecord) -> Result<()> {
        let mut state = self.state.write().await;
        if state.by_token.contains_key(&record.token) {
            return Err(PaymentError::ValidationError(format!(
                "Ledger already holds token {}",
                record.token
            )));
        }
        let index = state.records.len();
        state.by_token.insert(record.token.clone(), index);
        state.records.push(record);
        Ok(())
    }

    async fn update_terminal(
        &self,
        token: &str,
        status: TerminalStatus,
        reason: Option<String>,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let index = *state.by_token.get(token).ok_or_else(|| {
            PaymentError::ValidationError(format!("No ledger row for token {token}"))
        })?;
        let record = &mut state.records[index];
        if record.status.is_terminal() {
            return Ok(false);
        }
        record.status = status.into();
        record.reason = reason;
        record.updated_at = Some(Utc::now());
        Ok(true)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<PaymentRecord>> {
        let state = self.state.read().await;
        Ok(state
            .by_token
            .get(token)
            .map(|&index| state.records[index].clone()))
    }

    async fn history_for(&self, phone: &Phone) -> Result<Vec<PaymentRecord>> {
        let state = self.state.read().await;
        let mut history: Vec<PaymentRecord> = state
            .records
            .iter()
            .filter(|r| &r.phone == phone)
            .cloned()
            .collect();
        // Stable, so rows with equal timestamps keep append order.
        history.sort_by_key(|r| r.timestamp);
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::customer::Amount;
    use crate::domain::payment::PaymentStatus;
    use chrono::NaiveDate;

    fn customer(phone: &str, amount: u64) -> Customer {
        Customer {
            phone: Phone::parse(phone).unwrap(),
            name: "Sara".into(),
            amount: Amount::new(amount).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            installment_id: "INS-7".into(),
        }
    }

    fn record(token: &str) -> PaymentRecord {
        PaymentRecord::initiated(
            Phone::parse("09121234567").unwrap(),
            Amount::new(500000).unwrap(),
            "INS-7",
            token,
        )
    }

    #[tokio::test]
    async fn test_in_memory_customer_store_upsert_replaces() {
        let store = InMemoryCustomerStore::new();
        store.upsert(customer("09121234567", 100)).await.unwrap();
        store.upsert(customer("+989121234567", 200)).await.unwrap();

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].amount.value(), 200);

        let phone = Phone::parse("09121234567").unwrap();
        assert!(store.lookup(&phone).await.unwrap().is_some());
        let other = Phone::parse("09120000000").unwrap();
        assert!(store.lookup(&other).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_ledger_terminal_update_is_once() {
        let ledger = InMemoryPaymentLedger::new();
        ledger.append_initiated(record("T1")).await.unwrap();

        assert!(
            ledger
                .update_terminal("T1", TerminalStatus::Success, None)
                .await
                .unwrap()
        );
        assert!(
            !ledger
                .update_terminal("T1", TerminalStatus::Failed, Some("late".into()))
                .await
                .unwrap()
        );

        let stored = ledger.find_by_token("T1").await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Success);
        assert_eq!(stored.reason, None);
    }

    #[tokio::test]
    async fn test_in_memory_ledger_rejects_duplicate_and_unknown_tokens() {
        let ledger = InMemoryPaymentLedger::new();
        ledger.append_initiated(record("T1")).await.unwrap();
        assert!(ledger.append_initiated(record("T1")).await.is_err());
        assert!(
            ledger
                .update_terminal("T2", TerminalStatus::Success, None)
                .await
                .is_err()
        );
        assert!(ledger.find_by_token("T2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_ledger_history_is_ordered() {
        let ledger = InMemoryPaymentLedger::new();
        let mut late = record("T2");
        late.timestamp += chrono::Duration::seconds(10);
        ledger.append_initiated(late).await.unwrap();
        ledger.append_initiated(record("T1")).await.unwrap();

        let phone = Phone::parse("09121234567").unwrap();
        let tokens: Vec<String> = ledger
            .history_for(&phone)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.token)
            .collect();
        assert_eq!(tokens, vec!["T1", "T2"]);
    }
}
