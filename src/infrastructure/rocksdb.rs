use crate::domain::customer::{Amount, Customer, Phone};
use crate::domain::payment::{PaymentRecord, PaymentStatus, TerminalStatus};
use crate::domain::ports::{CustomerStore, PaymentLedger};
use crate::error::{PaymentError, Result};
use crate::infrastructure::cipher::FieldCipher;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for customer records, keyed by the phone's blind index.
pub const CF_CUSTOMERS: &str = "customers";
/// Column Family for ledger rows, keyed by gateway token.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family indexing ledger rows by phone and time.
pub const CF_PAYMENTS_BY_PHONE: &str = "payments_by_phone";

const INDEX_LEN: usize = 32;

/// Customer as written to disk. The phone is sealed.
#[derive(Serialize, Deserialize)]
struct StoredCustomer {
    phone: String,
    name: String,
    amount: Amount,
    due_date: NaiveDate,
    installment_id: String,
}

/// Ledger row as written to disk. The phone is sealed.
#[derive(Serialize, Deserialize)]
struct StoredPayment {
    phone: String,
    phone_index: String,
    amount: Amount,
    installment_id: String,
    status: PaymentStatus,
    token: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// A persistent store implementation using RocksDB.
///
/// Serves both the customer store and the payment ledger from one database
/// using separate Column Families. Phone numbers never reach disk in the
/// clear: values hold them encrypted and keys hold a keyed blind index.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    cipher: Arc<FieldCipher>,
    /// Serializes ledger read-modify-write cycles.
    ledger_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the three column families exist.
    pub fn open<P: AsRef<Path>>(path: P, cipher: FieldCipher) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_CUSTOMERS, CF_PAYMENTS, CF_PAYMENTS_BY_PHONE]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            cipher: Arc::new(cipher),
            ledger_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            PaymentError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn seal_customer(&self, customer: Customer) -> Result<StoredCustomer> {
        Ok(StoredCustomer {
            phone: self.cipher.encrypt(customer.phone.as_str())?,
            name: customer.name,
            amount: customer.amount,
            due_date: customer.due_date,
            installment_id: customer.installment_id,
        })
    }

    fn open_customer(&self, stored: StoredCustomer) -> Result<Customer> {
        Ok(Customer {
            phone: Phone::parse(&self.cipher.decrypt(&stored.phone)?)?,
            name: stored.name,
            amount: stored.amount,
            due_date: stored.due_date,
            installment_id: stored.installment_id,
        })
    }

    fn seal_payment(&self, record: PaymentRecord, index: &[u8; INDEX_LEN]) -> Result<StoredPayment> {
        Ok(StoredPayment {
            phone: self.cipher.encrypt(record.phone.as_str())?,
            phone_index: hex::encode(index),
            amount: record.amount,
            installment_id: record.installment_id,
            status: record.status,
            token: record.token,
            timestamp: record.timestamp,
            reason: record.reason,
            updated_at: record.updated_at,
        })
    }

    fn open_payment(&self, stored: StoredPayment) -> Result<PaymentRecord> {
        Ok(PaymentRecord {
            phone: Phone::parse(&self.cipher.decrypt(&stored.phone)?)?,
            amount: stored.amount,
            installment_id: stored.installment_id,
            status: stored.status,
            token: stored.token,
            timestamp: stored.timestamp,
            reason: stored.reason,
            updated_at: stored.updated_at,
        })
    }

    fn read_payment(&self, token: &str) -> Result<Option<StoredPayment>> {
        let cf = self.cf(CF_PAYMENTS)?;
        match self.db.get_cf(cf, token.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

/// `index ++ millis (big-endian) ++ token`, so a prefix scan yields one
/// customer's rows in time order.
fn history_key(index: &[u8; INDEX_LEN], timestamp: DateTime<Utc>, token: &str) -> Vec<u8> {
    let millis = u64::try_from(timestamp.timestamp_millis()).unwrap_or(0);
    let mut key = Vec::with_capacity(INDEX_LEN + 8 + token.len());
    key.extend_from_slice(index);
    key.extend_from_slice(&millis.to_be_bytes());
    key.extend_from_slice(token.as_bytes());
    key
}

#[async_trait]
impl CustomerStore for RocksDBStore {
    async fn lookup(&self, phone: &Phone) -> Result<Option<Customer>> {
        let cf = self.cf(CF_CUSTOMERS)?;
        let key = self.cipher.blind_index(phone.as_str())?;

        match self.db.get_cf(cf, key)? {
            Some(bytes) => {
                let stored: StoredCustomer = serde_json::from_slice(&bytes)?;
                Ok(Some(self.open_customer(stored)?))
            }
            None => Ok(None),
        }
    }

    async fn upsert(&self, customer: Customer) -> Result<()> {
        let cf = self.cf(CF_CUSTOMERS)?;
        let key = self.cipher.blind_index(customer.phone.as_str())?;
        let value = serde_json::to_vec(&self.seal_customer(customer)?)?;

        self.db.put_cf(cf, key, value)?;

        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Customer>> {
        let cf = self.cf(CF_CUSTOMERS)?;

        let mut customers = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let stored: StoredCustomer = serde_json::from_slice(&value)?;
            customers.push(self.open_customer(stored)?);
        }
        customers.sort_by(|a, b| a.phone.cmp(&b.phone));

        Ok(customers)
    }
}

#[async_trait]
impl PaymentLedger for RocksDBStore {
    async fn append_initiated(&self, record: PaymentRecord) -> Result<()> {
        let _guard = self.ledger_lock.lock().await;
        let payments = self.cf(CF_PAYMENTS)?;
        let by_phone = self.cf(CF_PAYMENTS_BY_PHONE)?;

        if self.db.get_pinned_cf(payments, record.token.as_bytes())?.is_some() {
            return Err(PaymentError::ValidationError(format!(
                "Ledger already holds token {}",
                record.token
            )));
        }

        let index = self.cipher.blind_index(record.phone.as_str())?;
        let token = record.token.clone();
        let history = history_key(&index, record.timestamp, &token);
        let value = serde_json::to_vec(&self.seal_payment(record, &index)?)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(payments, token.as_bytes(), value);
        batch.put_cf(by_phone, history, token.as_bytes());
        self.db.write(batch)?;

        Ok(())
    }

    async fn update_terminal(
        &self,
        token: &str,
        status: TerminalStatus,
        reason: Option<String>,
    ) -> Result<bool> {
        let _guard = self.ledger_lock.lock().await;
        let mut stored = self.read_payment(token)?.ok_or_else(|| {
            PaymentError::ValidationError(format!("No ledger row for token {token}"))
        })?;
        if stored.status.is_terminal() {
            return Ok(false);
        }

        stored.status = status.into();
        stored.reason = reason;
        stored.updated_at = Some(Utc::now());
        let cf = self.cf(CF_PAYMENTS)?;
        self.db.put_cf(cf, token.as_bytes(), serde_json::to_vec(&stored)?)?;

        Ok(true)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<PaymentRecord>> {
        self.read_payment(token)?
            .map(|stored| self.open_payment(stored))
            .transpose()
    }

    async fn history_for(&self, phone: &Phone) -> Result<Vec<PaymentRecord>> {
        let by_phone = self.cf(CF_PAYMENTS_BY_PHONE)?;
        let index = self.cipher.blind_index(phone.as_str())?;

        let mut history = Vec::new();
        let iter = self
            .db
            .iterator_cf(by_phone, IteratorMode::From(&index, Direction::Forward));
        for item in iter {
            let (key, token) = item?;
            if !key.starts_with(&index) {
                break;
            }
            let token = String::from_utf8_lossy(&token);
            if let Some(stored) = self.read_payment(&token)? {
                history.push(self.open_payment(stored)?);
            }
        }

        Ok(history)
    }
}
