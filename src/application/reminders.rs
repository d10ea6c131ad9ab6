use crate::domain::customer::{Customer, Phone};
use crate::domain::notice::Notice;
use crate::domain::payment::OriginRef;
use crate::domain::ports::{CustomerStore, Notifier};
use crate::error::Result;
use chrono::{Days, NaiveDate};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Last chat session seen for each phone.
#[derive(Default)]
pub struct ContactBook {
    origins: RwLock<HashMap<Phone, OriginRef>>,
}

impl ContactBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn remember(&self, phone: Phone, origin: OriginRef) {
        self.origins.write().await.insert(phone, origin);
    }

    pub async fn origin_for(&self, phone: &Phone) -> Option<OriginRef> {
        self.origins.read().await.get(phone).cloned()
    }
}

/// Whether `due_date` falls within `[today, today + window_days]`.
pub fn is_due_soon(due_date: NaiveDate, today: NaiveDate, window_days: u64) -> bool {
    let horizon = today
        .checked_add_days(Days::new(window_days))
        .unwrap_or(NaiveDate::MAX);
    due_date >= today && due_date <= horizon
}

pub fn due_soon(customers: &[Customer], today: NaiveDate, window_days: u64) -> Vec<&Customer> {
    customers
        .iter()
        .filter(|c| is_due_soon(c.due_date, today, window_days))
        .collect()
}

/// Sends a reminder to every reachable customer with an installment due soon.
///
/// Returns how many reminders were delivered.
pub async fn send_reminders(
    customers: &dyn CustomerStore,
    contacts: &ContactBook,
    notifier: &dyn Notifier,
    today: NaiveDate,
    window_days: u64,
) -> Result<usize> {
    let all = customers.list_all().await?;
    let mut delivered = 0;

    for customer in due_soon(&all, today, window_days) {
        let Some(origin) = contacts.origin_for(&customer.phone).await else {
            continue;
        };
        let notice = Notice::Reminder {
            installment_id: customer.installment_id.clone(),
            amount: customer.amount,
            due_date: customer.due_date,
        };
        match notifier.notify(&origin, &notice).await {
            Ok(()) => delivered += 1,
            Err(e) => warn!(phone = %customer.phone, error = %e, "reminder not delivered"),
        }
    }

    info!(delivered, "reminders sent");
    Ok(delivered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::customer::Amount;
    use crate::infrastructure::in_memory::InMemoryCustomerStore;
    use crate::infrastructure::notifier::LogNotifier;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn customer(phone: &str, due: NaiveDate) -> Customer {
        Customer {
            phone: Phone::parse(phone).unwrap(),
            name: "Sara".into(),
            amount: Amount::new(500000).unwrap(),
            due_date: due,
            installment_id: "INS-7".into(),
        }
    }

    #[test]
    fn test_due_window_is_inclusive() {
        let today = date(2024, 5, 1);
        assert!(is_due_soon(today, today, 3));
        assert!(is_due_soon(date(2024, 5, 4), today, 3));
        assert!(!is_due_soon(date(2024, 5, 5), today, 3));
        assert!(!is_due_soon(date(2024, 4, 30), today, 3));
    }

    #[tokio::test]
    async fn test_reminders_skip_unknown_origins() {
        let today = date(2024, 5, 1);
        let store = InMemoryCustomerStore::new();
        store
            .upsert(customer("09121234567", date(2024, 5, 2)))
            .await
            .unwrap();
        store
            .upsert(customer("09129999999", date(2024, 5, 3)))
            .await
            .unwrap();
        store
            .upsert(customer("09120000000", date(2024, 6, 1)))
            .await
            .unwrap();

        let contacts = ContactBook::new();
        contacts
            .remember(Phone::parse("09121234567").unwrap(), OriginRef::new("chat-1"))
            .await;
        contacts
            .remember(Phone::parse("09120000000").unwrap(), OriginRef::new("chat-3"))
            .await;

        let delivered = send_reminders(&store, &contacts, &LogNotifier, today, 3)
            .await
            .unwrap();
        assert_eq!(delivered, 1);
    }
}
