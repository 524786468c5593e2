use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use lendr_core::allocation::{allocate_fifo, AllocationOutcome};
use lendr_core::credit::{check_credit_line, total_debt, CustomerBalance};
use lendr_core::lifecycle::LoanAction;
use lendr_core::{
    Customer, LendingError, LendingRepository, Loan, NewCustomer, NewLoan, NewPayment, Payment,
    PaymentStatus, StoreError, StoreResult,
};

#[derive(Default)]
struct Tables {
    // Insertion order; listings walk these backwards for newest first.
    customers: Vec<Customer>,
    loans: Vec<Loan>,
    payments: Vec<Payment>,
}

impl Tables {
    fn customer(&self, external_id: &str) -> Option<&Customer> {
        self.customers.iter().find(|c| c.external_id == external_id)
    }

    fn loan_mut(&mut self, id: Uuid) -> Option<&mut Loan> {
        self.loans.iter_mut().find(|l| l.id == id)
    }

    fn open_loans(&self, customer_id: Uuid) -> Vec<Loan> {
        self.loans
            .iter()
            .filter(|l| l.customer_id == customer_id && l.status.is_open())
            .cloned()
            .collect()
    }
}

/// Process-local store. A single lock over all tables makes every operation atomic.
#[derive(Default)]
pub struct InMemoryLendingRepository {
    tables: RwLock<Tables>,
}

impl InMemoryLendingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn unknown_customer() -> StoreError {
    LendingError::validation(
        "customer_external_id",
        "Customer with that external_id does not exist.",
    )
    .into()
}

#[async_trait]
impl LendingRepository for InMemoryLendingRepository {
    async fn create_customer(&self, input: NewCustomer) -> StoreResult<Customer> {
        let input = input.validated()?;
        let mut tables = self.tables.write().await;

        if tables.customer(&input.external_id).is_some() {
            return Err(StoreError::conflict("customer", input.external_id));
        }

        let customer = Customer::new(input);
        tables.customers.push(customer.clone());
        Ok(customer)
    }

    async fn get_customer(&self, external_id: &str) -> StoreResult<Option<Customer>> {
        Ok(self.tables.read().await.customer(external_id).cloned())
    }

    async fn list_customers(&self) -> StoreResult<Vec<Customer>> {
        Ok(self.tables.read().await.customers.iter().rev().cloned().collect())
    }

    async fn customer_balance(&self, external_id: &str) -> StoreResult<Option<CustomerBalance>> {
        let tables = self.tables.read().await;
        Ok(tables.customer(external_id).map(|customer| {
            let loans = tables.loans.iter().filter(|l| l.customer_id == customer.id);
            CustomerBalance::compute(customer, loans)
        }))
    }

    async fn create_loan(&self, input: NewLoan) -> StoreResult<Loan> {
        let input = input.validated()?;
        let mut tables = self.tables.write().await;

        let customer = tables
            .customer(&input.customer_external_id)
            .cloned()
            .ok_or_else(unknown_customer)?;

        let debt = total_debt(&tables.open_loans(customer.id));
        check_credit_line(customer.score, debt, input.amount)?;

        if tables.loans.iter().any(|l| l.external_id == input.external_id) {
            return Err(StoreError::conflict("loan", input.external_id));
        }

        let loan = Loan::originate(&customer, input);
        tables.loans.push(loan.clone());
        Ok(loan)
    }

    async fn get_loan(&self, external_id: &str) -> StoreResult<Option<Loan>> {
        let tables = self.tables.read().await;
        Ok(tables.loans.iter().find(|l| l.external_id == external_id).cloned())
    }

    async fn list_loans(&self, customer_external_id: Option<&str>) -> StoreResult<Vec<Loan>> {
        let tables = self.tables.read().await;
        Ok(tables
            .loans
            .iter()
            .rev()
            .filter(|l| customer_external_id.map_or(true, |c| l.customer_external_id == c))
            .cloned()
            .collect())
    }

    async fn transition_loan(&self, external_id: &str, action: LoanAction) -> StoreResult<Loan> {
        let mut tables = self.tables.write().await;
        let loan = tables
            .loans
            .iter_mut()
            .find(|l| l.external_id == external_id)
            .ok_or_else(|| StoreError::not_found("loan", external_id))?;

        loan.transition(action, Utc::now())?;
        Ok(loan.clone())
    }

    async fn create_payment(&self, input: NewPayment) -> StoreResult<Payment> {
        let input = input.validated()?;
        let mut tables = self.tables.write().await;

        let customer = tables
            .customer(&input.customer_external_id)
            .cloned()
            .ok_or_else(unknown_customer)?;

        if tables.payments.iter().any(|p| p.external_id == input.external_id) {
            return Err(StoreError::conflict("payment", input.external_id));
        }

        let now = Utc::now();
        let mut loans = tables.open_loans(customer.id);
        let outcome = allocate_fifo(input.total_amount, &mut loans, now);

        let payment = match outcome {
            AllocationOutcome::Rejected { total_debt: debt } => {
                tracing::info!(
                    payment = %input.external_id,
                    total = %input.total_amount,
                    debt = %debt,
                    "payment exceeds debt, rejecting"
                );
                Payment {
                    id: Uuid::new_v4(),
                    external_id: input.external_id,
                    customer_id: customer.id,
                    customer_external_id: customer.external_id,
                    total_amount: input.total_amount,
                    status: PaymentStatus::Rejected,
                    paid_at: None,
                    created_at: now,
                    details: Vec::new(),
                }
            }
            AllocationOutcome::Completed { details } => {
                for updated in loans.into_iter() {
                    if let Some(stored) = tables.loan_mut(updated.id) {
                        *stored = updated;
                    }
                }
                Payment {
                    id: Uuid::new_v4(),
                    external_id: input.external_id,
                    customer_id: customer.id,
                    customer_external_id: customer.external_id,
                    total_amount: input.total_amount,
                    status: PaymentStatus::Completed,
                    paid_at: Some(now),
                    created_at: now,
                    details,
                }
            }
        };

        tables.payments.push(payment.clone());
        Ok(payment)
    }

    async fn get_payment(&self, external_id: &str) -> StoreResult<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables.payments.iter().find(|p| p.external_id == external_id).cloned())
    }

    async fn list_payments(&self, customer_external_id: Option<&str>) -> StoreResult<Vec<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .iter()
            .rev()
            .filter(|p| customer_external_id.map_or(true, |c| p.customer_external_id == c))
            .cloned()
            .collect())
    }
}
