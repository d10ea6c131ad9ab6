use crate::error::PaymentError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Country calling code prefixes that are folded into the domestic leading zero.
const COUNTRY_PREFIXES: [&str; 3] = ["+98", "0098", "98"];
/// Length of a domestic mobile number, leading zero included.
const DOMESTIC_LEN: usize = 11;

/// A mobile number in canonical domestic form (`09xxxxxxxxx`).
///
/// Normalization happens once, at construction. Every store key and every
/// comparison inside the crate uses this canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Phone(String);

impl Phone {
    pub fn parse(raw: &str) -> Result<Self, PaymentError> {
        let compact: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();

        let mut domestic = compact.clone();
        for prefix in COUNTRY_PREFIXES {
            if let Some(rest) = compact.strip_prefix(prefix)
                && rest.len() == DOMESTIC_LEN - 1
            {
                domestic = format!("0{rest}");
                break;
            }
        }
        // Spreadsheets drop the leading zero of numeric cells.
        if domestic.len() == DOMESTIC_LEN - 1 && domestic.starts_with('9') {
            domestic.insert(0, '0');
        }

        if domestic.len() != DOMESTIC_LEN
            || !domestic.starts_with('0')
            || !domestic.chars().all(|c| c.is_ascii_digit())
        {
            return Err(PaymentError::ValidationError(format!(
                "Invalid mobile number: {raw}"
            )));
        }
        Ok(Self(domestic))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Phone {
    type Error = PaymentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Phone> for String {
    fn from(phone: Phone) -> Self {
        phone.0
    }
}

/// A positive amount in the displayed currency unit (Toman).
///
/// Conversion to the gateway's unit is the gateway client's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Amount(u64);

impl Amount {
    pub fn new(value: u64) -> Result<Self, PaymentError> {
        if value > 0 {
            Ok(Self(value))
        } else {
            Err(PaymentError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for Amount {
    type Error = PaymentError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for u64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    /// Formats with thousands separators, e.g. `500,000`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.0.to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(c);
        }
        f.write_str(&grouped)
    }
}

/// A customer with one outstanding installment.
///
/// Created or replaced by the bulk import, keyed by `phone`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub phone: Phone,
    pub name: String,
    /// Owed amount of the current installment.
    pub amount: Amount,
    pub due_date: NaiveDate,
    pub installment_id: String,
}
