//! Transaction domain model

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on monetary magnitude accepted anywhere in the app
pub const MAX_AMOUNT: i64 = 1_000_000_000;

/// Upper bound on user-supplied description length
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// Validate a monetary amount before it reaches the encryption boundary.
///
/// Runs on write, before encryption, so a ciphertext can never smuggle an
/// invalid value past validation.
pub fn validate_amount(amount: Decimal, field: &str) -> crate::domain::result::Result<()> {
    if amount < Decimal::ZERO {
        return Err(crate::domain::result::Error::validation(format!(
            "{} must not be negative",
            field
        )));
    }
    if amount > Decimal::from(MAX_AMOUNT) {
        return Err(crate::domain::result::Error::validation(format!(
            "{} exceeds the maximum allowed value",
            field
        )));
    }
    Ok(())
}

/// Validate user-supplied free text before encryption
pub fn validate_text(text: &str, field: &str) -> crate::domain::result::Result<()> {
    if text.len() > MAX_DESCRIPTION_LEN {
        return Err(crate::domain::result::Error::validation(format!(
            "{} is too long (max {} characters)",
            field, MAX_DESCRIPTION_LEN
        )));
    }
    Ok(())
}

/// A single financial transaction belonging to a user
///
/// `amount` and `description` are plaintext in memory and encrypted at rest
/// by the repository adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub description: Option<String>,
    pub transaction_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(user_id: Uuid, amount: Decimal, transaction_date: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount,
            description: None,
            transaction_date,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> crate::domain::result::Result<()> {
        validate_amount(self.amount, "transaction amount")?;
        if let Some(desc) = &self.description {
            validate_text(desc, "transaction description")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_amount_rejected() {
        let tx = Transaction::new(
            Uuid::new_v4(),
            Decimal::new(-5000, 2),
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
        );
        assert!(tx.validate().is_err());
    }

    #[test]
    fn test_bounded_magnitude() {
        let tx = Transaction::new(
            Uuid::new_v4(),
            Decimal::from(MAX_AMOUNT) + Decimal::ONE,
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
        );
        assert!(tx.validate().is_err());
    }

    #[test]
    fn test_valid_transaction_passes() {
        let mut tx = Transaction::new(
            Uuid::new_v4(),
            Decimal::new(1234, 2),
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
        );
        tx.description = Some("Groceries".to_string());
        assert!(tx.validate().is_ok());
    }

    #[test]
    fn test_oversized_description_rejected() {
        let mut tx = Transaction::new(
            Uuid::new_v4(),
            Decimal::new(100, 2),
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
        );
        tx.description = Some("x".repeat(MAX_DESCRIPTION_LEN + 1));
        assert!(tx.validate().is_err());
    }
}
