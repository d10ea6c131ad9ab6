use crate::domain::customer::{Amount, Customer, Phone};
use crate::domain::ports::CustomerStore;
use crate::error::{PaymentError, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::io::Read;
use tracing::info;

/// Required columns as `(canonical header, English alias)`.
pub const REQUIRED_COLUMNS: [(&str, &str); 5] = [
    ("نام مشتری", "name"),
    ("شماره موبایل", "mobile"),
    ("مبلغ قسط", "amount"),
    ("موعد قسط", "due_date"),
    ("شناسه قسط", "installment_id"),
];

const BOM: char = '\u{feff}';

/// One row as it appears in the file, before validation.
#[derive(Debug, Deserialize)]
struct ImportRow {
    #[serde(rename = "نام مشتری", alias = "name")]
    name: String,
    #[serde(rename = "شماره موبایل", alias = "mobile")]
    mobile: String,
    #[serde(rename = "مبلغ قسط", alias = "amount")]
    amount: String,
    #[serde(rename = "موعد قسط", alias = "due_date")]
    due_date: String,
    #[serde(rename = "شناسه قسط", alias = "installment_id")]
    installment_id: String,
}

/// Reads installment customers from a CSV export of the admin spreadsheet.
///
/// Headers may be the Persian originals or their English aliases. The whole
/// file is validated before anything is returned, so a bad row never leaves
/// a partial import behind.
pub struct CustomerReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CustomerReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn customers(mut self) -> Result<Vec<Customer>> {
        let headers = self.reader.headers()?.clone();
        let cleaned: csv::StringRecord = headers
            .iter()
            .map(|h| h.trim_start_matches(BOM).trim())
            .collect();
        check_columns(&cleaned)?;
        self.reader.set_headers(cleaned);

        let mut customers = Vec::new();
        for (i, row) in self.reader.into_deserialize::<ImportRow>().enumerate() {
            let row_number = i + 1;
            let row = row.map_err(|e| PaymentError::InvalidRow {
                row: row_number,
                message: e.to_string(),
            })?;
            let customer = validate_row(row).map_err(|e| PaymentError::InvalidRow {
                row: row_number,
                message: e.to_string(),
            })?;
            customers.push(customer);
        }
        Ok(customers)
    }
}

fn check_columns(headers: &csv::StringRecord) -> Result<()> {
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|(persian, alias)| !headers.iter().any(|h| h == *persian || h == *alias))
        .map(|(persian, _)| persian.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PaymentError::MissingColumns(missing))
    }
}

fn validate_row(row: ImportRow) -> Result<Customer> {
    let name = row.name.trim().to_string();
    if name.is_empty() {
        return Err(PaymentError::ValidationError("name is empty".to_string()));
    }
    let installment_id = row.installment_id.trim().to_string();
    if installment_id.is_empty() {
        return Err(PaymentError::ValidationError(
            "installment id is empty".to_string(),
        ));
    }
    Ok(Customer {
        phone: Phone::parse(&ascii_digits(&row.mobile))?,
        name,
        amount: parse_amount(&row.amount)?,
        due_date: parse_due_date(&row.due_date)?,
        installment_id,
    })
}

/// Folds Persian and Arabic-Indic digits to ASCII.
fn ascii_digits(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '۰'..='۹' => char::from(b'0' + (c as u32 - '۰' as u32) as u8),
            '٠'..='٩' => char::from(b'0' + (c as u32 - '٠' as u32) as u8),
            _ => c,
        })
        .collect()
}

/// Whole Toman. Thousands separators and a zero fraction (`500000.0`) are accepted.
pub fn parse_amount(raw: &str) -> Result<Amount> {
    let digits: String = ascii_digits(raw)
        .chars()
        .filter(|c| !matches!(c, ',' | '٬' | ' '))
        .collect();
    let whole = match digits.split_once('.') {
        Some((whole, fraction)) if fraction.chars().all(|c| c == '0') => whole,
        Some(_) => {
            return Err(PaymentError::ValidationError(format!(
                "amount {raw:?} is not a whole number"
            )));
        }
        None => digits.as_str(),
    };
    let value: u64 = whole
        .parse()
        .map_err(|_| PaymentError::ValidationError(format!("amount {raw:?} is not a number")))?;
    Amount::new(value)
}

/// `YYYY/MM/DD` or `YYYY-MM-DD`, optionally followed by a time part.
pub fn parse_due_date(raw: &str) -> Result<NaiveDate> {
    let normalized = ascii_digits(raw);
    let date_part = normalized.split_whitespace().next().unwrap_or_default();
    NaiveDate::parse_from_str(date_part, "%Y/%m/%d")
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%Y-%m-%d"))
        .map_err(|_| PaymentError::ValidationError(format!("due date {raw:?} is not a date")))
}

/// Validates the whole file, then upserts every row by normalized phone.
///
/// Returns the number of imported rows.
pub async fn import_customers<R: Read>(store: &dyn CustomerStore, source: R) -> Result<usize> {
    let customers = CustomerReader::new(source).customers()?;
    let count = customers.len();
    for customer in customers {
        store.upsert(customer).await?;
    }
    info!(count, "customers imported");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERSIAN: &str = "نام مشتری,شماره موبایل,مبلغ قسط,موعد قسط,شناسه قسط\n\
        سارا,+989121234567,500000,2024/05/01,INS-7\n\
        علی,09127654321,\"1,200,000\",2024-06-10 00:00:00,INS-8\n";

    #[test]
    fn test_reader_persian_headers() {
        let customers = CustomerReader::new(PERSIAN.as_bytes()).customers().unwrap();
        assert_eq!(customers.len(), 2);
        assert_eq!(customers[0].phone.as_str(), "09121234567");
        assert_eq!(customers[0].amount.value(), 500000);
        assert_eq!(
            customers[0].due_date,
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
        );
        assert_eq!(customers[1].amount.value(), 1_200_000);
        assert_eq!(customers[1].installment_id, "INS-8");
    }

    #[test]
    fn test_reader_english_aliases_and_bom() {
        let data = "\u{feff}name, mobile, amount, due_date, installment_id\n\
            Sara, ۰۹۱۲۱۲۳۴۵۶۷, 500000.0, 2024-05-01, INS-7\n";
        let customers = CustomerReader::new(data.as_bytes()).customers().unwrap();
        assert_eq!(customers[0].phone.as_str(), "09121234567");
        assert_eq!(customers[0].amount.value(), 500000);
    }

    #[test]
    fn test_reader_names_missing_columns() {
        let data = "name,mobile,amount\nSara,09121234567,500000\n";
        match CustomerReader::new(data.as_bytes()).customers() {
            Err(PaymentError::MissingColumns(missing)) => {
                assert_eq!(missing, vec!["موعد قسط", "شناسه قسط"]);
            }
            other => panic!("expected missing columns, got {other:?}"),
        }
    }

    #[test]
    fn test_reader_reports_bad_row_number() {
        let data = "name,mobile,amount,due_date,installment_id\n\
            Sara,09121234567,500000,2024/05/01,INS-7\n\
            Ali,12345,500000,2024/05/01,INS-8\n";
        assert!(matches!(
            CustomerReader::new(data.as_bytes()).customers(),
            Err(PaymentError::InvalidRow { row: 2, .. })
        ));
    }

    #[test]
    fn test_amount_and_date_rules() {
        assert!(parse_amount("0").is_err());
        assert!(parse_amount("12.5").is_err());
        assert!(parse_amount("-3").is_err());
        assert_eq!(parse_amount("۲۵۰٬۰۰۰").unwrap().value(), 250000);
        assert!(parse_due_date("01/05/2024").is_err());
        assert!(parse_due_date("2024/13/01").is_err());
    }
}
