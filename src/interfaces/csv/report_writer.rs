use crate::domain::customer::Customer;
use crate::domain::payment::{PaymentRecord, PaymentStatus};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// Uses the import headers so a report can be fed back to `import`.
#[derive(Serialize)]
struct CustomerRow<'a> {
    #[serde(rename = "نام مشتری")]
    name: &'a str,
    #[serde(rename = "شماره موبایل")]
    mobile: &'a str,
    #[serde(rename = "مبلغ قسط")]
    amount: u64,
    #[serde(rename = "موعد قسط")]
    due_date: String,
    #[serde(rename = "شناسه قسط")]
    installment_id: &'a str,
}

#[derive(Serialize)]
struct PaymentRow<'a> {
    token: &'a str,
    phone: &'a str,
    installment_id: &'a str,
    amount: u64,
    status: PaymentStatus,
    timestamp: String,
    updated_at: Option<String>,
    reason: Option<&'a str>,
}

/// Writes admin reports as CSV to any sink (usually stdout).
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_customers(&mut self, customers: &[Customer]) -> Result<()> {
        for customer in customers {
            self.writer.serialize(CustomerRow {
                name: &customer.name,
                mobile: customer.phone.as_str(),
                amount: customer.amount.value(),
                due_date: customer.due_date.format("%Y/%m/%d").to_string(),
                installment_id: &customer.installment_id,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn write_payments(&mut self, records: &[PaymentRecord]) -> Result<()> {
        for record in records {
            self.writer.serialize(PaymentRow {
                token: &record.token,
                phone: record.phone.as_str(),
                installment_id: &record.installment_id,
                amount: record.amount.value(),
                status: record.status,
                timestamp: record.timestamp.to_rfc3339(),
                updated_at: record.updated_at.map(|t| t.to_rfc3339()),
                reason: record.reason.as_deref(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
