use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Customer, Loan};
use crate::{LendingError, LendingResult};

/// Sum of outstanding balances over a customer's pending and active loans.
pub fn total_debt<'a, I>(loans: I) -> Decimal
where
    I: IntoIterator<Item = &'a Loan>,
{
    loans
        .into_iter()
        .filter(|loan| loan.status.is_open())
        .map(|loan| loan.outstanding)
        .sum()
}

/// Rejects a new loan that would push open debt above the credit line.
/// Landing exactly on the line is allowed.
pub fn check_credit_line(
    score: Decimal,
    existing_debt: Decimal,
    requested: Decimal,
) -> LendingResult<()> {
    if existing_debt + requested > score {
        tracing::debug!(%score, %existing_debt, %requested, "credit line exceeded");
        return Err(LendingError::CreditLineExceeded);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerBalance {
    pub external_id: String,
    pub score: Decimal,
    pub total_debt: Decimal,
    pub available_amount: Decimal,
}

impl CustomerBalance {
    /// `available_amount` goes negative when the score was lowered below existing debt.
    pub fn compute<'a, I>(customer: &Customer, loans: I) -> Self
    where
        I: IntoIterator<Item = &'a Loan>,
    {
        Self::from_debt(customer, total_debt(loans))
    }

    pub fn from_debt(customer: &Customer, mut debt: Decimal) -> Self {
        debt.rescale(2);
        let mut available = customer.score - debt;
        available.rescale(2);
        Self {
            external_id: customer.external_id.clone(),
            score: customer.score,
            total_debt: debt,
            available_amount: available,
        }
    }
}
