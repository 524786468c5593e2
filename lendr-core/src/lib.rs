pub mod models;
pub mod credit;
pub mod allocation;
pub mod lifecycle;
pub mod validation;
pub mod repository;

pub use models::{
    Customer, CustomerStatus, Loan, LoanStatus, NewCustomer, NewLoan, NewPayment, Payment,
    PaymentDetail, PaymentStatus,
};
pub use credit::CustomerBalance;
pub use allocation::{allocate_fifo, AllocationOutcome};
pub use repository::{LendingRepository, StoreError, StoreResult};

pub use lifecycle::LoanAction;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LendingError {
    #[error("{field}: {message}")]
    Validation { field: String, message: String },
    #[error("This loan would exceed the customer's available credit line.")]
    CreditLineExceeded,
    #[error("Only loans in 'pending' may be {}.", .action.past_tense())]
    InvalidTransition { action: LoanAction, from: LoanStatus },
}

impl LendingError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Field the error is attached to, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            LendingError::Validation { field, .. } => Some(field),
            LendingError::CreditLineExceeded => Some("amount"),
            LendingError::InvalidTransition { .. } => None,
        }
    }

    /// Message without the field prefix.
    pub fn message(&self) -> String {
        match self {
            LendingError::Validation { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

pub type LendingResult<T> = Result<T, LendingError>;
