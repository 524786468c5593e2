use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use lendr_core::allocation::{allocate_fifo, AllocationOutcome};
use lendr_core::credit::{check_credit_line, CustomerBalance};
use lendr_core::lifecycle::LoanAction;
use lendr_core::{
    Customer, LendingError, LendingRepository, Loan, NewCustomer, NewLoan, NewPayment, Payment,
    PaymentDetail, PaymentStatus, StoreError, StoreResult,
};

pub struct PgLendingRepository {
    pool: PgPool,
}

impl PgLendingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: Uuid,
    external_id: String,
    status: String,
    score: Decimal,
    preapproved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct LoanRow {
    id: Uuid,
    external_id: String,
    customer_id: Uuid,
    customer_external_id: String,
    amount: Decimal,
    outstanding: Decimal,
    status: String,
    contract_version: String,
    taken_at: Option<DateTime<Utc>>,
    maximum_payment_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    external_id: String,
    customer_id: Uuid,
    customer_external_id: String,
    total_amount: Decimal,
    status: String,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct DetailRow {
    payment_id: Uuid,
    loan_id: Uuid,
    loan_external_id: String,
    amount: Decimal,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = StoreError;

    fn try_from(row: CustomerRow) -> Result<Self, Self::Error> {
        Ok(Customer {
            id: row.id,
            external_id: row.external_id,
            status: row.status.parse().map_err(|e| StoreError::Backend(format!("{e}")))?,
            score: row.score,
            preapproved_at: row.preapproved_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<LoanRow> for Loan {
    type Error = StoreError;

    fn try_from(row: LoanRow) -> Result<Self, Self::Error> {
        Ok(Loan {
            id: row.id,
            external_id: row.external_id,
            customer_id: row.customer_id,
            customer_external_id: row.customer_external_id,
            amount: row.amount,
            outstanding: row.outstanding,
            status: row.status.parse().map_err(|e| StoreError::Backend(format!("{e}")))?,
            contract_version: row.contract_version,
            taken_at: row.taken_at,
            maximum_payment_date: row.maximum_payment_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl PaymentRow {
    fn into_payment(self, details: Vec<PaymentDetail>) -> StoreResult<Payment> {
        Ok(Payment {
            id: self.id,
            external_id: self.external_id,
            customer_id: self.customer_id,
            customer_external_id: self.customer_external_id,
            total_amount: self.total_amount,
            status: self.status.parse().map_err(|e| StoreError::Backend(format!("{e}")))?,
            paid_at: self.paid_at,
            created_at: self.created_at,
            details,
        })
    }
}

const CUSTOMER_COLUMNS: &str =
    "id, external_id, status, score, preapproved_at, created_at, updated_at";

const LOAN_SELECT: &str = r#"
    SELECT l.id, l.external_id, l.customer_id, c.external_id AS customer_external_id,
           l.amount, l.outstanding, l.status, l.contract_version, l.taken_at,
           l.maximum_payment_date, l.created_at, l.updated_at
    FROM loans l
    JOIN customers c ON c.id = l.customer_id
"#;

const PAYMENT_SELECT: &str = r#"
    SELECT p.id, p.external_id, p.customer_id, c.external_id AS customer_external_id,
           p.total_amount, p.status, p.paid_at, p.created_at
    FROM payments p
    JOIN customers c ON c.id = p.customer_id
"#;

const OPEN_STATUSES: [&str; 2] = ["PENDING", "ACTIVE"];

fn backend(err: sqlx::Error) -> StoreError {
    tracing::error!("Database error: {}", err);
    StoreError::Backend(err.to_string())
}

/// Maps a unique-key violation to a conflict on `external_id`.
fn insert_error<'a>(
    entity: &'static str,
    external_id: &'a str,
) -> impl FnOnce(sqlx::Error) -> StoreError + 'a {
    move |err| {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return StoreError::conflict(entity, external_id);
            }
        }
        backend(err)
    }
}

/// `TIMESTAMPTZ` keeps microseconds; values returned from writes must match later reads.
fn db_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn db_precision(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}

fn unknown_customer() -> StoreError {
    LendingError::validation(
        "customer_external_id",
        "Customer with that external_id does not exist.",
    )
    .into()
}

impl PgLendingRepository {
    async fn lock_customer(
        tx: &mut Transaction<'_, Postgres>,
        external_id: &str,
    ) -> StoreResult<Customer> {
        let row = sqlx::query_as::<_, CustomerRow>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE external_id = $1 FOR UPDATE"
        ))
        .bind(external_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(backend)?;

        row.ok_or_else(unknown_customer)?.try_into()
    }

    async fn open_debt(tx: &mut Transaction<'_, Postgres>, customer_id: Uuid) -> StoreResult<Decimal> {
        sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(SUM(outstanding), 0) FROM loans WHERE customer_id = $1 AND status = ANY($2)",
        )
        .bind(customer_id)
        .bind(&OPEN_STATUSES[..])
        .fetch_one(&mut **tx)
        .await
        .map_err(backend)
    }

    async fn load_details(&self, payment_ids: &[Uuid]) -> StoreResult<HashMap<Uuid, Vec<PaymentDetail>>> {
        let rows = sqlx::query_as::<_, DetailRow>(
            r#"
            SELECT d.payment_id, d.loan_id, l.external_id AS loan_external_id, d.amount
            FROM payment_details d
            JOIN loans l ON l.id = d.loan_id
            WHERE d.payment_id = ANY($1)
            ORDER BY d.payment_id, d.position
            "#,
        )
        .bind(payment_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut by_payment: HashMap<Uuid, Vec<PaymentDetail>> = HashMap::new();
        for row in rows {
            by_payment.entry(row.payment_id).or_default().push(PaymentDetail {
                loan_id: row.loan_id,
                loan_external_id: row.loan_external_id,
                amount: row.amount,
            });
        }
        Ok(by_payment)
    }

    async fn hydrate_payments(&self, rows: Vec<PaymentRow>) -> StoreResult<Vec<Payment>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut details = self.load_details(&ids).await?;
        rows.into_iter()
            .map(|row| {
                let own = details.remove(&row.id).unwrap_or_default();
                row.into_payment(own)
            })
            .collect()
    }
}

#[async_trait]
impl LendingRepository for PgLendingRepository {
    async fn create_customer(&self, input: NewCustomer) -> StoreResult<Customer> {
        let input = input.validated()?;
        let mut customer = Customer::new(input);
        customer.created_at = db_precision(customer.created_at);
        customer.updated_at = db_precision(customer.updated_at);
        customer.preapproved_at = customer.preapproved_at.map(db_precision);

        sqlx::query(
            r#"
            INSERT INTO customers (id, external_id, status, score, preapproved_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(customer.id)
        .bind(&customer.external_id)
        .bind(customer.status.as_str())
        .bind(customer.score)
        .bind(customer.preapproved_at)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await
        .map_err(insert_error("customer", &customer.external_id))?;

        Ok(customer)
    }

    async fn get_customer(&self, external_id: &str) -> StoreResult<Option<Customer>> {
        let row = sqlx::query_as::<_, CustomerRow>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE external_id = $1"
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(Customer::try_from).transpose()
    }

    async fn list_customers(&self) -> StoreResult<Vec<Customer>> {
        let rows = sqlx::query_as::<_, CustomerRow>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers ORDER BY created_at DESC, external_id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(Customer::try_from).collect()
    }

    async fn customer_balance(&self, external_id: &str) -> StoreResult<Option<CustomerBalance>> {
        let Some(customer) = self.get_customer(external_id).await? else {
            return Ok(None);
        };

        let debt = sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(SUM(outstanding), 0) FROM loans WHERE customer_id = $1 AND status = ANY($2)",
        )
        .bind(customer.id)
        .bind(&OPEN_STATUSES[..])
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        Ok(Some(CustomerBalance::from_debt(&customer, debt)))
    }

    async fn create_loan(&self, input: NewLoan) -> StoreResult<Loan> {
        let input = input.validated()?;
        let mut tx = self.pool.begin().await.map_err(backend)?;

        // Serializes concurrent originations for the same customer.
        let customer = Self::lock_customer(&mut tx, &input.customer_external_id).await?;
        let debt = Self::open_debt(&mut tx, customer.id).await?;
        check_credit_line(customer.score, debt, input.amount)?;

        let mut loan = Loan::originate(&customer, input);
        loan.created_at = db_precision(loan.created_at);
        loan.updated_at = db_precision(loan.updated_at);
        loan.taken_at = loan.taken_at.map(db_precision);
        loan.maximum_payment_date = loan.maximum_payment_date.map(db_precision);
        sqlx::query(
            r#"
            INSERT INTO loans (id, external_id, customer_id, amount, outstanding, status,
                               contract_version, taken_at, maximum_payment_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(loan.id)
        .bind(&loan.external_id)
        .bind(loan.customer_id)
        .bind(loan.amount)
        .bind(loan.outstanding)
        .bind(loan.status.as_str())
        .bind(&loan.contract_version)
        .bind(loan.taken_at)
        .bind(loan.maximum_payment_date)
        .bind(loan.created_at)
        .bind(loan.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(insert_error("loan", &loan.external_id))?;

        tx.commit().await.map_err(backend)?;
        Ok(loan)
    }

    async fn get_loan(&self, external_id: &str) -> StoreResult<Option<Loan>> {
        let row = sqlx::query_as::<_, LoanRow>(&format!("{LOAN_SELECT} WHERE l.external_id = $1"))
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        row.map(Loan::try_from).transpose()
    }

    async fn list_loans(&self, customer_external_id: Option<&str>) -> StoreResult<Vec<Loan>> {
        let rows = sqlx::query_as::<_, LoanRow>(&format!(
            "{LOAN_SELECT} WHERE ($1::text IS NULL OR c.external_id = $1) ORDER BY l.created_at DESC, l.external_id DESC"
        ))
        .bind(customer_external_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(Loan::try_from).collect()
    }

    async fn transition_loan(&self, external_id: &str, action: LoanAction) -> StoreResult<Loan> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let row = sqlx::query_as::<_, LoanRow>(&format!(
            "{LOAN_SELECT} WHERE l.external_id = $1 FOR UPDATE OF l"
        ))
        .bind(external_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?
        .ok_or_else(|| StoreError::not_found("loan", external_id))?;

        let mut loan = Loan::try_from(row)?;
        loan.transition(action, db_now())?;

        sqlx::query("UPDATE loans SET status = $2, taken_at = $3, updated_at = $4 WHERE id = $1")
            .bind(loan.id)
            .bind(loan.status.as_str())
            .bind(loan.taken_at)
            .bind(loan.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        tracing::info!(loan = %loan.external_id, status = %loan.status, "loan transitioned");
        Ok(loan)
    }

    async fn create_payment(&self, input: NewPayment) -> StoreResult<Payment> {
        let input = input.validated()?;
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let customer = Self::lock_customer(&mut tx, &input.customer_external_id).await?;

        let rows = sqlx::query_as::<_, LoanRow>(&format!(
            "{LOAN_SELECT} WHERE l.customer_id = $1 AND l.status = ANY($2) FOR UPDATE OF l"
        ))
        .bind(customer.id)
        .bind(&OPEN_STATUSES[..])
        .fetch_all(&mut *tx)
        .await
        .map_err(backend)?;
        let mut loans = rows
            .into_iter()
            .map(Loan::try_from)
            .collect::<StoreResult<Vec<_>>>()?;

        let now = db_now();
        let outcome = allocate_fifo(input.total_amount, &mut loans, now);
        let (status, paid_at) = match &outcome {
            AllocationOutcome::Completed { .. } => (PaymentStatus::Completed, Some(now)),
            AllocationOutcome::Rejected { total_debt } => {
                tracing::info!(
                    payment = %input.external_id,
                    total = %input.total_amount,
                    debt = %total_debt,
                    "payment exceeds debt, rejecting"
                );
                (PaymentStatus::Rejected, None)
            }
        };

        let payment_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO payments (id, external_id, customer_id, total_amount, status, paid_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(payment_id)
        .bind(&input.external_id)
        .bind(customer.id)
        .bind(input.total_amount)
        .bind(status.as_str())
        .bind(paid_at)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(insert_error("payment", &input.external_id))?;

        for (position, detail) in outcome.details().iter().enumerate() {
            sqlx::query(
                "INSERT INTO payment_details (id, payment_id, loan_id, position, amount) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::new_v4())
            .bind(payment_id)
            .bind(detail.loan_id)
            .bind(position as i32)
            .bind(detail.amount)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        for loan in loans.iter().filter(|l| outcome.details().iter().any(|d| d.loan_id == l.id)) {
            sqlx::query("UPDATE loans SET outstanding = $2, status = $3, updated_at = $4 WHERE id = $1")
                .bind(loan.id)
                .bind(loan.outstanding)
                .bind(loan.status.as_str())
                .bind(loan.updated_at)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)?;

        let details = match outcome {
            AllocationOutcome::Completed { details } => details,
            AllocationOutcome::Rejected { .. } => Vec::new(),
        };
        Ok(Payment {
            id: payment_id,
            external_id: input.external_id,
            customer_id: customer.id,
            customer_external_id: customer.external_id,
            total_amount: input.total_amount,
            status,
            paid_at,
            created_at: now,
            details,
        })
    }

    async fn get_payment(&self, external_id: &str) -> StoreResult<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!("{PAYMENT_SELECT} WHERE p.external_id = $1"))
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        match row {
            Some(row) => Ok(self.hydrate_payments(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_payments(&self, customer_external_id: Option<&str>) -> StoreResult<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "{PAYMENT_SELECT} WHERE ($1::text IS NULL OR c.external_id = $1) ORDER BY p.created_at DESC, p.external_id DESC"
        ))
        .bind(customer_external_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        self.hydrate_payments(rows).await
    }
}
