use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Loan, LoanStatus};
use crate::{LendingError, LendingResult};

/// Manual transitions available on a pending loan
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoanAction {
    Activate,
    Reject,
}

impl LoanAction {
    pub fn past_tense(self) -> &'static str {
        match self {
            LoanAction::Activate => "activated",
            LoanAction::Reject => "rejected",
        }
    }
}

impl Loan {
    /// Transition: Pending → Active. Stamps `taken_at` with the activation time.
    pub fn activate(&mut self, now: DateTime<Utc>) -> LendingResult<()> {
        self.ensure_pending(LoanAction::Activate)?;
        self.status = LoanStatus::Active;
        self.taken_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Transition: Pending → Rejected
    pub fn reject(&mut self, now: DateTime<Utc>) -> LendingResult<()> {
        self.ensure_pending(LoanAction::Reject)?;
        self.status = LoanStatus::Rejected;
        self.updated_at = now;
        Ok(())
    }

    pub fn transition(&mut self, action: LoanAction, now: DateTime<Utc>) -> LendingResult<()> {
        match action {
            LoanAction::Activate => self.activate(now),
            LoanAction::Reject => self.reject(now),
        }
    }

    fn ensure_pending(&self, action: LoanAction) -> LendingResult<()> {
        if self.status != LoanStatus::Pending {
            return Err(LendingError::InvalidTransition {
                action,
                from: self.status,
            });
        }
        Ok(())
    }
}
