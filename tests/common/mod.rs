#![allow(dead_code)]

use async_trait::async_trait;
use settlepay::application::engine::{EngineSettings, SettlementEngine};
use settlepay::domain::customer::{Amount, Phone};
use settlepay::domain::gateway::{GatewayError, PaymentRequest, PaymentTicket};
use settlepay::domain::notice::Notice;
use settlepay::domain::payment::{OriginRef, PaymentRecord, TerminalStatus};
use settlepay::domain::ports::{Notifier, PaymentGateway, PaymentLedger};
use settlepay::error::{PaymentError, Result};
use settlepay::infrastructure::in_memory::InMemoryPaymentLedger;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A gateway whose answers are scripted by the test.
///
/// Tokens are issued as `T1`, `T2`, ... in request order.
#[derive(Default)]
pub struct MockGateway {
    issued: AtomicUsize,
    verifies: AtomicUsize,
    verify_delay: Duration,
    request_error: Mutex<Option<GatewayError>>,
    verify_error: Mutex<Option<GatewayError>>,
    requests: Mutex<Vec<PaymentRequest>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verify_delay(delay: Duration) -> Self {
        Self {
            verify_delay: delay,
            ..Self::default()
        }
    }

    pub fn fail_requests(&self, err: GatewayError) {
        *self.request_error.lock().unwrap() = Some(err);
    }

    pub fn fail_verification(&self, err: GatewayError) {
        *self.verify_error.lock().unwrap() = Some(err);
    }

    pub fn verify_calls(&self) -> usize {
        self.verifies.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<PaymentRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn request_payment(
        &self,
        request: PaymentRequest,
    ) -> std::result::Result<PaymentTicket, GatewayError> {
        if let Some(err) = self.request_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.requests.lock().unwrap().push(request);
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("T{n}");
        Ok(PaymentTicket {
            redirect_url: format!("https://gateway.test/pg/StartPay/{token}"),
            token,
        })
    }

    async fn verify_payment(
        &self,
        _amount: Amount,
        _token: &str,
    ) -> std::result::Result<(), GatewayError> {
        self.verifies.fetch_add(1, Ordering::SeqCst);
        if !self.verify_delay.is_zero() {
            tokio::time::sleep(self.verify_delay).await;
        }
        match self.verify_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Captures every notice; can be told to fail or stall delivery.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(OriginRef, Notice)>>,
    failing: bool,
    delay: Duration,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(OriginRef, Notice)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, origin: &OriginRef, notice: &Notice) -> Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.sent
            .lock()
            .unwrap()
            .push((origin.clone(), notice.clone()));
        if self.failing {
            return Err(PaymentError::NotificationError("chat unreachable".into()));
        }
        Ok(())
    }
}

/// In-memory ledger whose next `failures` terminal updates fail.
pub struct FlakyLedger {
    inner: InMemoryPaymentLedger,
    failures: AtomicUsize,
}

impl FlakyLedger {
    pub fn failing_updates(failures: usize) -> Self {
        Self {
            inner: InMemoryPaymentLedger::new(),
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl PaymentLedger for FlakyLedger {
    async fn append_initiated(&self, record: PaymentRecord) -> Result<()> {
        self.inner.append_initiated(record).await
    }

    async fn update_terminal(
        &self,
        token: &str,
        status: TerminalStatus,
        reason: Option<String>,
    ) -> Result<bool> {
        let fail = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(PaymentError::IoError(Error::other("disk full")));
        }
        self.inner.update_terminal(token, status, reason).await
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<PaymentRecord>> {
        self.inner.find_by_token(token).await
    }

    async fn history_for(&self, phone: &Phone) -> Result<Vec<PaymentRecord>> {
        self.inner.history_for(phone).await
    }
}

pub struct Harness {
    pub engine: Arc<SettlementEngine>,
    pub gateway: Arc<MockGateway>,
    pub ledger: Arc<InMemoryPaymentLedger>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn harness(gateway: MockGateway, notifier: RecordingNotifier, settings: EngineSettings) -> Harness {
    let gateway = Arc::new(gateway);
    let ledger = Arc::new(InMemoryPaymentLedger::new());
    let notifier = Arc::new(notifier);
    let engine = Arc::new(SettlementEngine::new(
        gateway.clone(),
        ledger.clone(),
        notifier.clone(),
        settings,
    ));
    Harness {
        engine,
        gateway,
        ledger,
        notifier,
    }
}

pub fn default_harness() -> Harness {
    harness(MockGateway::new(), RecordingNotifier::new(), EngineSettings::default())
}

/// Writes `rows` valid customers with Persian headers.
pub fn generate_customers_csv(path: &Path, rows: usize) -> std::result::Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(["نام مشتری", "شماره موبایل", "مبلغ قسط", "موعد قسط", "شناسه قسط"])?;

    for i in 1..=rows {
        wtr.write_record([
            format!("Customer {i}"),
            format!("0912{i:07}"),
            (100_000 * i).to_string(),
            "2024/05/01".to_string(),
            format!("INS-{i}"),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
