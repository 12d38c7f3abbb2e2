//! Savings goal domain model

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::transaction::{validate_amount, validate_text};

/// A savings goal
///
/// `name`, `target_amount` and `current_amount` are encrypted at rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub target_amount: Decimal,
    pub current_amount: Decimal,
    pub target_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Goal {
    pub fn new(user_id: Uuid, name: impl Into<String>, target_amount: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            name: name.into(),
            target_amount,
            current_amount: Decimal::ZERO,
            target_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> crate::domain::result::Result<()> {
        validate_text(&self.name, "goal name")?;
        validate_amount(self.target_amount, "goal target")?;
        validate_amount(self.current_amount, "goal progress amount")?;
        Ok(())
    }

    /// Progress toward the target as a fraction in [0, 1]
    pub fn progress(&self) -> Decimal {
        if self.target_amount.is_zero() {
            return Decimal::ZERO;
        }
        (self.current_amount / self.target_amount).min(Decimal::ONE)
    }

    pub fn is_reached(&self) -> bool {
        !self.target_amount.is_zero() && self.current_amount >= self.target_amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress() {
        let mut g = Goal::new(Uuid::new_v4(), "Vacation", Decimal::from(1000));
        g.current_amount = Decimal::from(250);
        assert_eq!(g.progress(), Decimal::new(25, 2));
        assert!(!g.is_reached());
    }

    #[test]
    fn test_progress_caps_at_one() {
        let mut g = Goal::new(Uuid::new_v4(), "Vacation", Decimal::from(100));
        g.current_amount = Decimal::from(150);
        assert_eq!(g.progress(), Decimal::ONE);
        assert!(g.is_reached());
    }

    #[test]
    fn test_negative_target_rejected() {
        let g = Goal::new(Uuid::new_v4(), "Vacation", Decimal::from(-5));
        assert!(g.validate().is_err());
    }
}
