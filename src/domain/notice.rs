//! Messages delivered to customers, rendered in Persian.

use super::customer::Amount;
use super::payment::{FailureReason, Outcome, Settlement};
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Final result of a payment attempt.
    Outcome(Outcome),
    /// An installment falls due soon.
    Reminder {
        installment_id: String,
        amount: Amount,
        due_date: NaiveDate,
    },
}

impl Notice {
    pub fn render(&self) -> String {
        match self {
            Notice::Outcome(outcome) => render_outcome(outcome),
            Notice::Reminder {
                installment_id,
                amount,
                due_date,
            } => format!(
                "یادآوری: قسط {installment_id} به مبلغ {amount} تومان تا تاریخ {} باید پرداخت شود.",
                due_date.format("%Y/%m/%d")
            ),
        }
    }
}

fn render_outcome(outcome: &Outcome) -> String {
    let id = &outcome.installment_id;
    match &outcome.settlement {
        Settlement::Settled => format!("پرداخت قسط {id} موفق بود."),
        Settlement::InFlight => format!("پرداخت قسط {id} در حال بررسی است."),
        Settlement::Failed(reason) => {
            format!("پرداخت قسط {id} ناموفق بود.\n{}", failure_text(reason))
        }
    }
}

fn failure_text(reason: &FailureReason) -> String {
    match reason {
        FailureReason::Cancelled(_) => "پرداخت توسط درگاه لغو شد.".to_string(),
        FailureReason::VerificationFailed(message) => {
            format!("خطا در تأیید پرداخت: {message}")
        }
        FailureReason::GatewayUnavailable(message) => {
            format!("خطا در ارتباط با زرین‌پال: {message}")
        }
        FailureReason::Expired => "مهلت پرداخت به پایان رسید.".to_string(),
    }
}
