use async_trait::async_trait;

use crate::credit::CustomerBalance;
use crate::lifecycle::LoanAction;
use crate::models::{Customer, Loan, NewCustomer, NewLoan, NewPayment, Payment};
use crate::LendingError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found: {external_id}")]
    NotFound {
        entity: &'static str,
        external_id: String,
    },
    #[error("{entity} with this external_id already exists: {external_id}")]
    Conflict {
        entity: &'static str,
        external_id: String,
    },
    #[error(transparent)]
    Domain(#[from] LendingError),
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, external_id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            external_id: external_id.into(),
        }
    }

    pub fn conflict(entity: &'static str, external_id: impl Into<String>) -> Self {
        Self::Conflict {
            entity,
            external_id: external_id.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for customers, loans and payments.
///
/// Every mutating method is atomic: it either commits completely or leaves
/// the store unchanged. Inputs are validated by the implementation.
#[async_trait]
pub trait LendingRepository: Send + Sync {
    async fn create_customer(&self, input: NewCustomer) -> StoreResult<Customer>;

    async fn get_customer(&self, external_id: &str) -> StoreResult<Option<Customer>>;

    /// Newest first.
    async fn list_customers(&self) -> StoreResult<Vec<Customer>>;

    async fn customer_balance(&self, external_id: &str) -> StoreResult<Option<CustomerBalance>>;

    /// Credit check and insert happen under a lock on the customer.
    async fn create_loan(&self, input: NewLoan) -> StoreResult<Loan>;

    async fn get_loan(&self, external_id: &str) -> StoreResult<Option<Loan>>;

    /// Newest first, optionally restricted to one customer.
    async fn list_loans(&self, customer_external_id: Option<&str>) -> StoreResult<Vec<Loan>>;

    async fn transition_loan(&self, external_id: &str, action: LoanAction) -> StoreResult<Loan>;

    async fn activate_loan(&self, external_id: &str) -> StoreResult<Loan> {
        self.transition_loan(external_id, LoanAction::Activate).await
    }

    async fn reject_loan(&self, external_id: &str) -> StoreResult<Loan> {
        self.transition_loan(external_id, LoanAction::Reject).await
    }

    /// Records the payment as completed (allocated FIFO) or rejected.
    async fn create_payment(&self, input: NewPayment) -> StoreResult<Payment>;

    async fn get_payment(&self, external_id: &str) -> StoreResult<Option<Payment>>;

    /// Newest first, optionally restricted to one customer.
    async fn list_payments(&self, customer_external_id: Option<&str>) -> StoreResult<Vec<Payment>>;
}
