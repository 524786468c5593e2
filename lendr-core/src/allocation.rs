//! FIFO distribution of a lump payment across a customer's open loans.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::cmp::Ordering;

use crate::credit::total_debt;
use crate::models::{Loan, LoanStatus, PaymentDetail};

#[derive(Debug, Clone, PartialEq)]
pub enum AllocationOutcome {
    /// Payment exceeded the open debt. Nothing was applied.
    Rejected { total_debt: Decimal },
    /// Payment was fully applied. Details follow loan order.
    Completed { details: Vec<PaymentDetail> },
}

impl AllocationOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, AllocationOutcome::Completed { .. })
    }

    pub fn details(&self) -> &[PaymentDetail] {
        match self {
            AllocationOutcome::Completed { details } => details,
            AllocationOutcome::Rejected { .. } => &[],
        }
    }
}

/// Oldest origination first. Loans never taken sort last; ties fall back to
/// creation time and then external id so the order is total.
pub fn fifo_order(a: &Loan, b: &Loan) -> Ordering {
    let taken = |loan: &Loan| -> (bool, Option<DateTime<Utc>>) {
        (loan.taken_at.is_none(), loan.taken_at)
    };
    taken(a)
        .cmp(&taken(b))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.external_id.cmp(&b.external_id))
}

impl Loan {
    /// Reduce the outstanding balance. Zero means paid, anything else keeps the loan active.
    pub fn apply_payment(&mut self, amount: Decimal, now: DateTime<Utc>) {
        self.outstanding -= amount;
        self.status = if self.outstanding.is_zero() {
            LoanStatus::Paid
        } else {
            LoanStatus::Active
        };
        self.updated_at = now;
    }
}

/// Apply `total` to `loans` oldest first.
///
/// `loans` is reordered in place and every loan that received money is
/// mutated; callers persist exactly the loans named in the returned details.
/// Closed loans in the slice are ignored.
pub fn allocate_fifo(total: Decimal, loans: &mut [Loan], now: DateTime<Utc>) -> AllocationOutcome {
    let debt = total_debt(loans.iter());
    if total > debt {
        return AllocationOutcome::Rejected { total_debt: debt };
    }

    loans.sort_by(fifo_order);

    let mut remaining = total;
    let mut details = Vec::new();
    for loan in loans.iter_mut().filter(|loan| loan.status.is_open()) {
        if remaining <= Decimal::ZERO {
            break;
        }
        if loan.outstanding.is_zero() {
            continue;
        }

        let applied = remaining.min(loan.outstanding);
        loan.apply_payment(applied, now);
        remaining -= applied;

        details.push(PaymentDetail {
            loan_id: loan.id,
            loan_external_id: loan.external_id.clone(),
            amount: applied,
        });
    }

    AllocationOutcome::Completed { details }
}
