use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use lendr_core::{Loan, LoanStatus, NewLoan};

use crate::{error::AppError, state::AppState, ApiJson, CustomerFilter};

#[derive(Debug, Serialize, Deserialize)]
pub struct LoanResponse {
    pub external_id: String,
    pub customer_external_id: String,
    pub amount: Decimal,
    pub outstanding: Decimal,
    pub status: LoanStatus,
    pub contract_version: String,
    pub taken_at: Option<DateTime<Utc>>,
    pub maximum_payment_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Loan> for LoanResponse {
    fn from(l: Loan) -> Self {
        Self {
            external_id: l.external_id,
            customer_external_id: l.customer_external_id,
            amount: l.amount,
            outstanding: l.outstanding,
            status: l.status,
            contract_version: l.contract_version,
            taken_at: l.taken_at,
            maximum_payment_date: l.maximum_payment_date,
            created_at: l.created_at,
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/loans", get(list_loans).post(create_loan))
        .route("/loans/{external_id}", get(get_loan))
        .route("/loans/{external_id}/activate", post(activate_loan))
        .route("/loans/{external_id}/reject", post(reject_loan))
}

/// GET /loans?customer_external_id=
async fn list_loans(
    State(state): State<AppState>,
    Query(filter): Query<CustomerFilter>,
) -> Result<Json<Vec<LoanResponse>>, AppError> {
    let loans = state.repo.list_loans(filter.as_deref()).await?;
    Ok(Json(loans.into_iter().map(LoanResponse::from).collect()))
}

/// POST /loans
async fn create_loan(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<NewLoan>,
) -> Result<(StatusCode, Json<LoanResponse>), AppError> {
    let loan = state.repo.create_loan(req).await?;

    tracing::info!(
        loan = %loan.external_id,
        customer = %loan.customer_external_id,
        amount = %loan.amount,
        "loan created"
    );
    Ok((StatusCode::CREATED, Json(loan.into())))
}

/// GET /loans/{external_id}
async fn get_loan(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> Result<Json<LoanResponse>, AppError> {
    let loan = state
        .repo
        .get_loan(&external_id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("loan {external_id}")))?;

    Ok(Json(loan.into()))
}

/// POST /loans/{external_id}/activate
async fn activate_loan(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> Result<Json<LoanResponse>, AppError> {
    let loan = state
        .repo
        .activate_loan(&external_id)
        .await?;

    tracing::info!(loan = %loan.external_id, "loan activated");
    Ok(Json(loan.into()))
}

/// POST /loans/{external_id}/reject
async fn reject_loan(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.repo.reject_loan(&external_id).await?;

    tracing::info!(loan = %external_id, "loan rejected");
    Ok(StatusCode::NO_CONTENT)
}
