//! Budget domain model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::transaction::{validate_amount, validate_text};

/// A monthly spending budget for a category
///
/// `category`, `limit_amount` and `spent_amount` are encrypted at rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category: String,
    pub limit_amount: Decimal,
    pub spent_amount: Decimal,
    /// Month the budget applies to, formatted YYYY-MM
    pub month: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Budget {
    pub fn new(user_id: Uuid, category: impl Into<String>, limit_amount: Decimal, month: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            category: category.into(),
            limit_amount,
            spent_amount: Decimal::ZERO,
            month: month.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> crate::domain::result::Result<()> {
        validate_text(&self.category, "budget category")?;
        validate_amount(self.limit_amount, "budget limit")?;
        validate_amount(self.spent_amount, "budget spent amount")?;
        Ok(())
    }

    /// Percentage of the limit consumed, capped at 100
    pub fn percent_used(&self) -> Decimal {
        if self.limit_amount.is_zero() {
            return Decimal::ZERO;
        }
        let pct = self.spent_amount / self.limit_amount * Decimal::from(100);
        pct.min(Decimal::from(100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_used() {
        let mut b = Budget::new(Uuid::new_v4(), "food", Decimal::from(200), "2025-08");
        b.spent_amount = Decimal::from(50);
        assert_eq!(b.percent_used(), Decimal::from(25));
    }

    #[test]
    fn test_percent_used_caps_at_100() {
        let mut b = Budget::new(Uuid::new_v4(), "food", Decimal::from(100), "2025-08");
        b.spent_amount = Decimal::from(250);
        assert_eq!(b.percent_used(), Decimal::from(100));
    }

    #[test]
    fn test_zero_limit_is_zero_percent() {
        let b = Budget::new(Uuid::new_v4(), "food", Decimal::ZERO, "2025-08");
        assert_eq!(b.percent_used(), Decimal::ZERO);
    }

    #[test]
    fn test_negative_limit_rejected() {
        let b = Budget::new(Uuid::new_v4(), "food", Decimal::from(-10), "2025-08");
        assert!(b.validate().is_err());
    }
}
